// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Owner-scoped, expiring transactions over the resource store and the search
// index, the registry that tracks them and the reaper that ends the ones
// nobody finished.
//
// ============================================================================

pub mod reaper;
pub mod registry;
pub mod session;
pub mod state;

pub use reaper::{TransactionReaper, spawn_reaper};
pub use registry::{ReapReport, TransactionRegistry};
pub use session::{DetachedSession, NoVersioning, ResourceSession, VersionService};
pub use state::{Transaction, TransactionId, TransactionState, TransactionWriteGuard};
