//! Domain layer - Port definitions and the naming scheme
//!
//! This module defines the core traits (ports) that the Proxmox and ONTAP
//! adapters implement, plus the pure naming functions that correlate objects
//! across both systems.

pub mod naming;
pub mod ports;

pub use ports::*;
