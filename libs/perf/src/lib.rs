//! Performance primitives for the hot paths
//!
//! Everything the pinned engine threads share lives here: the
//! single-producer/single-consumer ring queue used at every thread
//! boundary, fixed-capacity object pools backing the order-book
//! arenas, and CPU affinity pinning.
//!
//! # Modules
//! - `spsc`: bounded lock-free ring with move-only endpoints
//! - `pool`: fixed-capacity slab with handle-based access
//! - `affinity`: pin the current thread to one core

pub mod affinity;
pub mod pool;
pub mod spsc;

pub use pool::{Handle, Pool};
pub use spsc::{ring, Consumer, Producer};
