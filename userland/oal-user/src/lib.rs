//! # Pool manager client library
//!
//! User-space side of the physical memory pool manager.
//!
//! | Type | Role |
//! |------|------|
//! | [`DriverClient`] | Typed wrappers over the driver commands. |
//! | [`VirtMemManager`] | Shared, reference-counted virtual views. |
//! | [`Memory`] | Allocation handles, lazy mapping and token sharing. |
//!
//! A chunk id of [`CHUNK_ID_AUTO`](oal_abi::flags::CHUNK_ID_AUTO) in the
//! allocation flags asks the driver for its least loaded autobalanced chunk.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod client;
mod memory;
mod vmem;

pub use client::DriverClient;
pub use memory::{Memory, MemoryHandle};
pub use vmem::VirtMemManager;
