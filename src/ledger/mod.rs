use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

mod address;

pub use address::{Address, AddressParseError};

pub type Amount = u64;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds in account {account}: have {available}, need {required}")]
    InsufficientFunds {
        account: Address,
        available: Amount,
        required: Amount,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    OwnerFunded {
        owner: Address,
        amount: Amount,
    },
    RecipientRewarded {
        recipient: Address,
        reward_amount: Amount,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerMutation {
    /// Genesis credit. Creates supply; only issued at deployment.
    Fund { to: Address, amount: Amount },
    /// Value transfer. Debits `from` before crediting `to`, so supply is
    /// conserved and a failed debit leaves both sides untouched.
    Transfer {
        from: Address,
        to: Address,
        amount: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub accounts: BTreeMap<Address, Amount>,
    pub events: Vec<LedgerEvent>,
    pub merkle_root: [u8; 32],
}

/// Account balance table plus the append-only event log.
///
/// Balances are non-negative by construction: `debit_account` is the only
/// path that lowers a balance and it refuses to cross zero. Unknown accounts
/// read as zero rather than erroring, so any address is a valid recipient.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerState {
    accounts: BTreeMap<Address, Amount>,
    events: Vec<LedgerEvent>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &Address) -> Amount {
        self.accounts.get(account).copied().unwrap_or(0)
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn credit_account(&mut self, account: &Address, amount: Amount) {
        let balance = self.accounts.entry(*account).or_insert(0);
        *balance += amount;
    }

    pub fn debit_account(
        &mut self,
        account: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let available = self.balance(account);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account: *account,
                available,
                required: amount,
            });
        }
        // `available >= amount`, so the entry exists unless amount is 0.
        if amount > 0 {
            if let Some(balance) = self.accounts.get_mut(account) {
                *balance -= amount;
            }
        }
        Ok(())
    }

    /// Applies a batch of mutations all-or-nothing.
    ///
    /// The batch runs against a scratch copy of the table; the live table is
    /// replaced only once every mutation succeeded. Emitted events are
    /// appended to the log and returned so callers can hand them back with
    /// the call result.
    pub fn apply_mutations(
        &mut self,
        mutations: &[LedgerMutation],
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut scratch = self.clone();
        let mut emitted = Vec::with_capacity(mutations.len());

        for mutation in mutations {
            match mutation {
                LedgerMutation::Fund { to, amount } => {
                    scratch.credit_account(to, *amount);
                    emitted.push(LedgerEvent::OwnerFunded {
                        owner: *to,
                        amount: *amount,
                    });
                }
                LedgerMutation::Transfer { from, to, amount } => {
                    scratch.debit_account(from, *amount)?;
                    scratch.credit_account(to, *amount);
                    emitted.push(LedgerEvent::RecipientRewarded {
                        recipient: *to,
                        reward_amount: *amount,
                    });
                }
            }
        }

        scratch.events.extend(emitted.iter().copied());
        *self = scratch;
        tracing::debug!(
            mutations = mutations.len(),
            events = emitted.len(),
            "batch committed"
        );
        Ok(emitted)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            accounts: self.accounts.clone(),
            events: self.events.clone(),
            merkle_root: compute_merkle_root(&self.accounts),
        }
    }

    pub fn restore(snapshot: LedgerSnapshot) -> Self {
        Self {
            accounts: snapshot.accounts,
            events: snapshot.events,
        }
    }
}

fn compute_merkle_root(accounts: &BTreeMap<Address, Amount>) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (account, balance) in accounts {
        let mut hasher = Sha256::new();
        hasher.update(b"acct");
        hasher.update(account.to_bytes());
        hasher.update(balance.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"taskmaster-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
