//! Security utilities for memory protection and secure handling
//!
//! This module provides:
//! - Memory zeroization to securely erase key material
//! - Memory locking to keep recovered content keys out of swap

pub mod mlock;
pub mod zeroize;

pub use mlock::{can_lock_memory, setup_memory_protection, LockedMemory};
pub use self::zeroize::SecureBytes;
