//! Control Plane Module
//!
//! Correlates Proxmox storage pools with ONTAP volumes and drives the
//! snapshot, mount and disk clone operations across both systems.

pub mod backends;
pub mod disk_clone;
pub mod mount;
pub mod orchestrator;
pub mod platform;
pub mod retry;
pub mod snapshots;
pub mod steps;

pub use backends::*;
pub use disk_clone::*;
pub use mount::*;
pub use orchestrator::*;
pub use platform::*;
