//! Tally Core: records, netting, contract rules and the coordination
//! state machine shared by every party evaluating a settlement.

pub mod config;
pub mod contract;
pub mod coordination;
pub mod error;
pub mod netting;
pub mod records;
pub mod transaction;
pub mod types;

pub use config::ProtocolConfig;
pub use contract::SettlementContract;
pub use coordination::{
    CoordinationEvent, CoordinationState, CoordinationStateMachine, Participants, Role,
};
pub use error::{ContractError, CoreError};
pub use netting::{net, total_owed_to, NetPosition};
pub use records::{ObligationRecord, SettlementRecord};
pub use transaction::{Action, LedgerState, Transaction, TransactionBuilder};
pub use types::{OwningKey, Party, RecordId, TransactionId};
