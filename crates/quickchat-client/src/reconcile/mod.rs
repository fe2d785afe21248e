//! Client reconciliation
//!
//! One synchronous state machine folds REST snapshots, pushed live events and
//! local actions into a single per-conversation view. It performs no I/O;
//! every operation returns the [`Effect`]s the driver must carry out.

mod store;
mod types;

pub use store::{ReconciliationStore, LOCAL_ID_PREFIX};
pub use types::{
    ConversationStatus, Effect, HistoryEntry, PeerCacheState, SendToken, TranslationJob,
};
