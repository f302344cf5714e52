use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ledger::{Address, Amount, LedgerMutation};

/// Domain separator mixed into every signed call digest.
const CALL_DOMAIN_TAG: &[u8] = b"taskmaster-reward-v1";

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("caller {caller} is not the ledger owner")]
    Unauthorized { caller: Address },
}

/// The single call the contract accepts: move `amount` base units from the
/// owner to `recipient`. The recipient may be any address, the owner
/// included.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardCall {
    pub recipient: Address,
    pub amount: Amount,
}

impl RewardCall {
    /// Digest signed by callers and checked by the runtime.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(CALL_DOMAIN_TAG);
        hasher.update(self.recipient.to_bytes());
        hasher.update(self.amount.to_le_bytes());
        hasher.finalize().into()
    }
}

/// Reward rules: a fixed owner account funded at deployment, allowed to move
/// its own balance to any recipient. Ownership is not transferable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskMaster {
    owner: Address,
}

impl TaskMaster {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Lowers an authorized call into ledger mutations.
    ///
    /// Authorization is the contract's check; sufficiency of the owner's
    /// balance is enforced by the ledger debit when the mutations are
    /// applied. Either failure aborts the call with no state change.
    pub fn apply_call(
        &self,
        caller: Address,
        call: &RewardCall,
    ) -> Result<Vec<LedgerMutation>, ContractError> {
        if caller != self.owner {
            return Err(ContractError::Unauthorized { caller });
        }
        Ok(vec![LedgerMutation::Transfer {
            from: self.owner,
            to: call.recipient,
            amount: call.amount,
        }])
    }
}
