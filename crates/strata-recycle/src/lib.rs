//! Strata Recycle - background reclamation of backend storage
//!
//! When an object is deleted or overwritten, metadata stops referencing the
//! old generation first; the location is then handed to the [`Recycler`],
//! which asks the owning backend cluster to release the bytes. Failures are
//! retried with capped exponential backoff and end up as [`DeadLetter`]
//! records once the retry budget is spent.

pub mod recovery;
pub mod recycler;
pub mod retry;
pub mod task;

pub use recovery::{GarbageSource, StaticGarbageSource};
pub use recycler::{Recycler, RecyclerStats};
pub use retry::BackoffPolicy;
pub use task::{DeadLetter, RecycleTask, TaskState};
