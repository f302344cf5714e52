use std::{error::Error, fs, path::PathBuf, process};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use taskmaster::{
    Address, GenesisConfig, Identity, LedgerSnapshot, RewardCall, Runtime, DEFAULT_GAS_LIMIT,
    DEFAULT_OWNER_FUNDING,
};

/// Persisted chain file: the contract owner plus the ledger snapshot.
#[derive(Serialize, Deserialize)]
struct ChainFile {
    version: u8,
    owner: Address,
    snapshot: LedgerSnapshot,
}

const CHAIN_FILE_VERSION: u8 = 1;

#[derive(Parser)]
#[command(name = "taskmaster", version, about = "Owner-funded reward ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an ed25519 identity and write its secret key hex to a file
    Keygen {
        /// Key file to create
        #[arg(long)]
        out: PathBuf,
    },
    /// Create a chain file with the funded owner
    Deploy {
        /// Owner's key file
        #[arg(long)]
        owner_key: PathBuf,
        /// Genesis funding for the owner, in base units
        #[arg(long, default_value_t = DEFAULT_OWNER_FUNDING)]
        funding: u64,
        /// Chain file to create
        #[arg(long)]
        state: PathBuf,
    },
    /// Print an account balance (zero for unknown accounts)
    Balance {
        /// Account address, 40 hex chars
        address: String,
        #[arg(long)]
        state: PathBuf,
    },
    /// Sign and execute a reward call, persisting the new snapshot
    Reward {
        /// Recipient address, 40 hex chars
        recipient: String,
        /// Amount in base units
        amount: u64,
        /// Caller's key file
        #[arg(long)]
        caller_key: PathBuf,
        /// Gas limit for the call
        #[arg(long, default_value_t = DEFAULT_GAS_LIMIT)]
        gas: u64,
        #[arg(long)]
        state: PathBuf,
    },
    /// Dump the event log as JSON
    Events {
        #[arg(long)]
        state: PathBuf,
    },
    /// Print the snapshot merkle root hex
    Root {
        #[arg(long)]
        state: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Keygen { out } => {
            let mut rng = rand::rngs::OsRng;
            let identity = Identity::generate(&mut rng);
            fs::write(&out, identity.secret_hex())?;
            println!("{}", identity.address());
        }
        Command::Deploy {
            owner_key,
            funding,
            state,
        } => {
            let owner = load_identity(&owner_key)?;
            let runtime = Runtime::deploy(GenesisConfig {
                owner: owner.address(),
                owner_funding: funding,
            });
            store_chain(&state, &runtime)?;
            println!("{}", owner.address());
        }
        Command::Balance { address, state } => {
            let runtime = load_chain(&state)?;
            let account: Address = address.parse()?;
            println!("{}", runtime.balance(&account));
        }
        Command::Reward {
            recipient,
            amount,
            caller_key,
            gas,
            state,
        } => {
            let runtime = load_chain(&state)?;
            let caller = load_identity(&caller_key)?;
            let call = RewardCall {
                recipient: recipient.parse()?,
                amount,
            };
            let receipt = runtime.execute(&caller.sign_call(call), gas)?;
            store_chain(&state, &runtime)?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::Events { state } => {
            let runtime = load_chain(&state)?;
            println!("{}", serde_json::to_string_pretty(&runtime.events())?);
        }
        Command::Root { state } => {
            let runtime = load_chain(&state)?;
            println!("{}", hex::encode(runtime.snapshot().merkle_root));
        }
    }
    Ok(())
}

fn load_identity(path: &PathBuf) -> Result<Identity, Box<dyn Error>> {
    let encoded = fs::read_to_string(path)?;
    Ok(Identity::from_secret_hex(&encoded)?)
}

fn load_chain(path: &PathBuf) -> Result<Runtime, Box<dyn Error>> {
    let raw = fs::read_to_string(path)?;
    let chain: ChainFile = serde_json::from_str(&raw)?;
    if chain.version != CHAIN_FILE_VERSION {
        return Err(format!("unsupported chain file version {}", chain.version).into());
    }
    Ok(Runtime::restore(chain.owner, chain.snapshot))
}

fn store_chain(path: &PathBuf, runtime: &Runtime) -> Result<(), Box<dyn Error>> {
    let chain = ChainFile {
        version: CHAIN_FILE_VERSION,
        owner: runtime.owner(),
        snapshot: runtime.snapshot(),
    };
    fs::write(path, serde_json::to_string_pretty(&chain)?)?;
    Ok(())
}
