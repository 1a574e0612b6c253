//! Block lifecycle: per-block flush state, retention, and the flush coordinator.

pub mod flush;
pub mod flush_state;
pub mod retention;

pub use flush::{FlushCycleStatus, FlushManager, FlushStats};
pub use flush_state::{FlushState, FlushStateTable, FlushStatus};
pub use retention::{DefaultRetentionPolicy, RetentionPolicy};
