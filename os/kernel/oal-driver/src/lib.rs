//! # Pool manager driver
//!
//! The kernel-side entry points around [`oal_alloc::MemoryAllocator`]:
//!
//! * [`probe`] turns decoded `fsl,oal-mem-reg` device-tree nodes into managed
//!   regions.
//! * [`Dispatcher`] answers the numbered commands of [`oal_abi::Command`]. It
//!   implements [`oal_abi::Transport`], so a client can talk to it in-process
//!   just as it would through an ioctl or message-passing channel.
//!
//! ```text
//!   client ──Transport::call──► Dispatcher ──► MemoryAllocator
//!                                                 ▲
//!   device tree ──RegionNode──► probe ────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod dispatcher;
pub mod probe;

pub use dispatcher::Dispatcher;
pub use probe::{COMPATIBLE, RegionNode, ReservedMemory, descriptor_from_node};
