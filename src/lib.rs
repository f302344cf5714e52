//! Owner-funded reward ledger.
//!
//! One account (the owner) is funded at deployment and may move parts of its
//! balance to any recipient through signed `reward` calls. Every committed
//! call emits a `RecipientRewarded` event and returns a receipt carrying it.
//!
//! ## Modules
//!
//! - [`ledger`] — balance table, events, mutations, snapshots
//! - [`contract`] — reward rules (owner check, call lowering)
//! - [`runtime`] — host environment: identities, signed calls, gas, atomic
//!   execution

pub mod contract;
pub mod ledger;
pub mod runtime;

pub use contract::{ContractError, RewardCall, TaskMaster};
pub use ledger::{
    Address, AddressParseError, Amount, LedgerError, LedgerEvent, LedgerMutation, LedgerSnapshot,
    LedgerState,
};
pub use runtime::{
    CallError, GasSchedule, GenesisConfig, Identity, IdentityError, Receipt, Runtime, SignedCall,
    DEFAULT_GAS_LIMIT, DEFAULT_OWNER_FUNDING,
};
