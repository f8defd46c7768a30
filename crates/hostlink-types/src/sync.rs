//! Unified synchronization types shared by the bridge crates.
//!
//! We use parking_lot because:
//! - It has no poisoning (a panicking module must not wedge the registry).
//! - Its `Condvar` works directly with `MutexGuard`.

pub use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
pub use std::sync::{Arc, Weak};
