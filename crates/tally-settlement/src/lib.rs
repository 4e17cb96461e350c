//! Tally Settlement Layer
//!
//! Runs the multi-party coordination protocol: the proposer task that
//! collects signatures in role order, the responder task that re-validates
//! and signs, and the in-process collaborators they talk to (party
//! directory, session network, per-party vaults and the local notary).

pub mod coordinator;
pub mod directory;
pub mod error;
pub mod network;
pub mod node;
pub mod notary;
pub mod responder;
pub mod session;
pub mod traits;
pub mod types;
pub mod vault;

pub use coordinator::{Coordinator, Proposal};
pub use directory::InMemoryDirectory;
pub use error::SettlementError;
pub use network::LocalNetwork;
pub use node::SettlementNode;
pub use notary::{CommitEvent, LocalNotary};
pub use responder::Responder;
pub use session::{Session, SessionMessage};
pub use traits::{FinalityService, PartyDirectory, RecordQuery, SessionOpener};
pub use types::{DateRange, ObligationFilter, PartyRole, RecordStatus, SignedTransaction};
pub use vault::Vault;
