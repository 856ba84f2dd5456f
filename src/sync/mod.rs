pub mod backend;
pub mod optimistic;
pub mod sync_engine;

pub use backend::{BackendApi, BackendError, RestClient};
pub use optimistic::{MutationError, MutationKey, MutationState, Optimistic, PendingMutations};
pub use sync_engine::{SyncEngine, SyncError};
