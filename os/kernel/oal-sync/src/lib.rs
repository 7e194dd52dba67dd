//! # Synchronization for the memory pool manager
//!
//! The allocator tables are guarded by one [`SpinLock`] each. The OS-specific
//! mutex shims of the abstraction layer are out of scope here.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
