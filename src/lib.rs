//! Circular event log persisted in NOR flash.
//!
//! Entries are fixed-size slots laid out after a small region header. When the
//! ring fills up, appending the next entry erases one erase unit's worth of
//! the oldest entries, because NOR flash cannot be erased in smaller steps.
//! The logical state of the log is rebuilt by scanning slot metadata on every
//! open, so entries survive reboots and reflashing without any separate index.
//!
//! The flash itself is reached through the blocking
//! [`embedded_storage::nor_flash`] traits; pass an owned driver or a `&mut`
//! borrow of one.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod layout;
pub mod partition;

mod ring;
mod slot_log;

#[cfg(any(test, feature = "mock-flash"))]
pub mod mock_flash;

pub use error::Error;
pub use slot_log::FlashLog;
