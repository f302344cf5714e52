use std::sync::Mutex;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::contract::{ContractError, RewardCall, TaskMaster};
use crate::ledger::{Address, Amount, LedgerError, LedgerEvent, LedgerSnapshot, LedgerState};

pub const DEFAULT_OWNER_FUNDING: Amount = 10_000;

/// Caller identity: an ed25519 signing key and the address derived from it.
#[derive(Debug)]
pub struct Identity {
    signing: SigningKey,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("secret key must be 64 hex chars")]
    BadLength,
    #[error("invalid hex in secret key: {0}")]
    Hex(#[from] hex::FromHexError),
}

impl Identity {
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        Self {
            signing: SigningKey::generate(rng),
        }
    }

    /// Imports a secret key from the 64-hex-char key file format.
    pub fn from_secret_hex(encoded: &str) -> Result<Self, IdentityError> {
        let raw = hex::decode(encoded.trim())?;
        let bytes: [u8; 32] = raw.try_into().map_err(|_| IdentityError::BadLength)?;
        Ok(Self {
            signing: SigningKey::from_bytes(&bytes),
        })
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn address(&self) -> Address {
        Address::from_verifying_key(&self.signing.verifying_key())
    }

    pub fn sign_call(&self, call: RewardCall) -> SignedCall {
        let signature = self.signing.sign(&call.digest());
        SignedCall {
            call,
            caller_key: self.signing.verifying_key(),
            signature,
        }
    }
}

/// A reward call plus the caller's key and signature over the call digest.
///
/// The caller address is derived from the verifying key, never supplied
/// separately, so a call cannot claim an identity its signature does not
/// prove.
#[derive(Clone, Copy, Debug)]
pub struct SignedCall {
    pub call: RewardCall,
    pub caller_key: VerifyingKey,
    pub signature: Signature,
}

impl SignedCall {
    pub fn caller(&self) -> Address {
        Address::from_verifying_key(&self.caller_key)
    }
}

/// Gas pricing, EVM-flavoured: a base charge per call, a value-transfer
/// charge per moved balance pair, and a charge per emitted event.
#[derive(Clone, Copy, Debug)]
pub struct GasSchedule {
    pub call_base: u64,
    pub value_transfer: u64,
    pub log_event: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            call_base: 21_000,
            value_transfer: 9_000,
            log_event: 1_500,
        }
    }
}

impl GasSchedule {
    /// Full charge for a reward call. Balance reads are free.
    pub fn reward_cost(&self) -> u64 {
        self.call_base + self.value_transfer + self.log_event
    }
}

pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("call signature does not verify for {caller}")]
    BadSignature { caller: Address },
    #[error("out of gas: limit {limit}, required {required}")]
    OutOfGas { limit: u64, required: u64 },
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Confirmation of a committed call: the authenticated caller, the events
/// emitted by exactly this call, and the gas charged.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub caller: Address,
    pub events: Vec<LedgerEvent>,
    pub gas_used: u64,
}

/// Deployment input: the owner account and its one-time genesis funding.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenesisConfig {
    pub owner: Address,
    pub owner_funding: Amount,
}

impl GenesisConfig {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            owner_funding: DEFAULT_OWNER_FUNDING,
        }
    }
}

/// Host environment for the reward contract.
///
/// Owns the ledger behind a mutex so calls execute as indivisible units:
/// concurrent `execute` and `balance` interleavings are serializable and a
/// reader never observes a half-applied reward.
pub struct Runtime {
    ledger: Mutex<LedgerState>,
    contract: TaskMaster,
    gas: GasSchedule,
}

impl Runtime {
    /// Deploys a fresh instance: funds the owner and fixes the contract
    /// owner for the lifetime of the runtime.
    pub fn deploy(config: GenesisConfig) -> Self {
        let mut ledger = LedgerState::new();
        ledger
            .apply_mutations(&[crate::ledger::LedgerMutation::Fund {
                to: config.owner,
                amount: config.owner_funding,
            }])
            .expect("genesis funding is a pure credit");
        tracing::debug!(owner = %config.owner, funding = config.owner_funding, "deployed");
        Self {
            ledger: Mutex::new(ledger),
            contract: TaskMaster::new(config.owner),
            gas: GasSchedule::default(),
        }
    }

    /// Rebuilds a runtime from a persisted snapshot.
    pub fn restore(owner: Address, snapshot: LedgerSnapshot) -> Self {
        Self {
            ledger: Mutex::new(LedgerState::restore(snapshot)),
            contract: TaskMaster::new(owner),
            gas: GasSchedule::default(),
        }
    }

    pub fn owner(&self) -> Address {
        self.contract.owner()
    }

    pub fn gas_schedule(&self) -> GasSchedule {
        self.gas
    }

    /// Current balance; zero for unknown accounts. Free, callable by anyone.
    pub fn balance(&self, account: &Address) -> Amount {
        self.lock().balance(account)
    }

    /// Full event log in call order.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.lock().events().to_vec()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.lock().snapshot()
    }

    /// Executes a signed reward call against the ledger.
    ///
    /// Verification order: signature, authorization, gas ceiling, balance
    /// sufficiency. Every failure is terminal and leaves the ledger exactly
    /// as it was; on success the receipt carries the events of this call.
    pub fn execute(&self, signed: &SignedCall, gas_limit: u64) -> Result<Receipt, CallError> {
        let caller = signed.caller();
        signed
            .caller_key
            .verify_strict(&signed.call.digest(), &signed.signature)
            .map_err(|_| CallError::BadSignature { caller })?;

        let mutations = self.contract.apply_call(caller, &signed.call)?;

        let required = self.gas.reward_cost();
        if required > gas_limit {
            return Err(CallError::OutOfGas {
                limit: gas_limit,
                required,
            });
        }

        let events = self.lock().apply_mutations(&mutations)?;
        tracing::info!(
            caller = %caller,
            recipient = %signed.call.recipient,
            amount = signed.call.amount,
            gas_used = required,
            "reward committed"
        );
        Ok(Receipt {
            caller,
            events,
            gas_used: required,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.ledger.lock().expect("ledger lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::OsRng;

    fn deployed() -> (Runtime, Identity, Identity) {
        let mut rng = OsRng;
        let owner = Identity::generate(&mut rng);
        let recipient = Identity::generate(&mut rng);
        let runtime = Runtime::deploy(GenesisConfig::new(owner.address()));
        (runtime, owner, recipient)
    }

    #[test]
    fn identity_secret_hex_round_trip() {
        let mut rng = OsRng;
        let id = Identity::generate(&mut rng);
        let restored = Identity::from_secret_hex(&id.secret_hex()).unwrap();
        assert_eq!(restored.address(), id.address());
    }

    #[test]
    fn identity_rejects_short_secret() {
        let err = Identity::from_secret_hex("abcd").unwrap_err();
        match err {
            IdentityError::BadLength => {}
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn deploy_funds_owner_and_logs_event() {
        let (runtime, owner, recipient) = deployed();
        assert_eq!(runtime.balance(&owner.address()), DEFAULT_OWNER_FUNDING);
        assert_eq!(runtime.balance(&recipient.address()), 0);
        assert_eq!(
            runtime.events(),
            vec![LedgerEvent::OwnerFunded {
                owner: owner.address(),
                amount: DEFAULT_OWNER_FUNDING,
            }]
        );
    }

    #[test]
    fn receipt_reports_schedule_cost() {
        let (runtime, owner, recipient) = deployed();
        let call = RewardCall {
            recipient: recipient.address(),
            amount: 50,
        };
        let receipt = runtime
            .execute(&owner.sign_call(call), DEFAULT_GAS_LIMIT)
            .unwrap();
        assert_eq!(receipt.caller, owner.address());
        assert_eq!(receipt.gas_used, runtime.gas_schedule().reward_cost());
    }

    #[test]
    fn forged_signature_is_rejected() {
        let (runtime, owner, recipient) = deployed();
        let mut rng = OsRng;
        let attacker = Identity::generate(&mut rng);
        let call = RewardCall {
            recipient: attacker.address(),
            amount: 50,
        };
        // Signature from the attacker's key, claiming the owner's identity.
        let mut forged = attacker.sign_call(call);
        forged.caller_key = owner.verifying_key();
        let err = runtime.execute(&forged, DEFAULT_GAS_LIMIT).unwrap_err();
        match err {
            CallError::BadSignature { caller } => assert_eq!(caller, owner.address()),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runtime.balance(&owner.address()), DEFAULT_OWNER_FUNDING);
        assert_eq!(runtime.balance(&recipient.address()), 0);
    }

    #[test]
    fn gas_limit_below_cost_aborts_without_state_change() {
        let (runtime, owner, recipient) = deployed();
        let call = RewardCall {
            recipient: recipient.address(),
            amount: 50,
        };
        let cost = runtime.gas_schedule().reward_cost();
        let err = runtime
            .execute(&owner.sign_call(call), cost - 1)
            .unwrap_err();
        match err {
            CallError::OutOfGas { limit, required } => {
                assert_eq!(limit, cost - 1);
                assert_eq!(required, cost);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runtime.balance(&owner.address()), DEFAULT_OWNER_FUNDING);
        assert_eq!(runtime.events().len(), 1);
    }

    #[test]
    fn restore_preserves_owner_and_balances() {
        let (runtime, owner, recipient) = deployed();
        let call = RewardCall {
            recipient: recipient.address(),
            amount: 50,
        };
        runtime
            .execute(&owner.sign_call(call), DEFAULT_GAS_LIMIT)
            .unwrap();
        let snapshot = runtime.snapshot();
        let restored = Runtime::restore(runtime.owner(), snapshot.clone());
        assert_eq!(restored.owner(), owner.address());
        assert_eq!(restored.balance(&owner.address()), 9_950);
        assert_eq!(restored.balance(&recipient.address()), 50);
        assert_eq!(restored.snapshot(), snapshot);
    }
}
