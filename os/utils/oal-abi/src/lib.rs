//! # Pool manager driver ABI
//!
//! Command numbers, `#[repr(C)]` records and status codes exchanged between
//! the kernel-side pool manager and its user-space clients.
//!
//! A request is one [`Command`] plus the bytes of its record. The reply is
//! either the number of bytes written into the reply buffer or a [`Status`].
//! The medium in between (ioctl, message passing, in-process call) is
//! abstracted by [`Transport`].

#![cfg_attr(not(any(test, doctest)), no_std)]

mod access;
mod command;
pub mod flags;
mod records;
mod status;

pub use access::MemoryAccess;
pub use command::Command;
pub use flags::AllocFlags;
pub use records::{
    AllocRequest, FreeRequest, REGION_NAME_LEN, RegionName, ReservedRegion, TokenRequest,
    WireRecord,
};
pub use status::Status;

/// Carries one command to the driver and its reply back.
pub trait Transport {
    /// Send `command` with `request` bytes; the driver writes its reply into
    /// `reply` and the number of bytes written is returned.
    ///
    /// # Errors
    /// The driver's [`Status`] for the failed command.
    fn call(&self, command: Command, request: &[u8], reply: &mut [u8]) -> Result<usize, Status>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn call(&self, command: Command, request: &[u8], reply: &mut [u8]) -> Result<usize, Status> {
        (**self).call(command, request, reply)
    }
}
