//! Virtualization Manager Adapters
//!
//! Provides the Proxmox VE adapter.

pub mod proxmox;

#[cfg(test)]
pub(crate) mod memory;

pub use proxmox::*;
