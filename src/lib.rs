//! pve-ontap-snapshot - ONTAP snapshots for Proxmox VE storage
//!
//! Lets an operator take, list, restore and mount NetApp ONTAP volume
//! snapshots of the NFS storage pools a Proxmox VE cluster uses, and clone
//! single VM disks copy-on-write, without file-level snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          CLI (vm / storage)                                  │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                            Orchestrator                                      │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │    Snapshot     │  │  Mount/Unmount  │  │      VM Disk Clone          │  │
//! │  │    Lifecycle    │  │  (step runner)  │  │   (paused VM guard)         │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           └────────────────────┼─────────────────────────┘                   │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │   Naming/Correlation  │                                │
//! │                    │   (pool <-> volume)   │                                │
//! │                    └───────────────────────┘                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────────┐   │
//! │  │   Proxmox VE REST client    │  │       ONTAP REST client             │   │
//! │  │ (VMs, storage registration) │  │ (volumes, snapshots, FlexClones)    │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No local state is kept. The pool id, volume name and clone names are the
//! only link between the two systems, see [`domain::naming`].
//!
//! # Modules
//!
//! - [`controlplane`]: orchestrator, operations and the two REST clients
//! - [`domain`]: ports and the naming scheme
//! - [`config`]: TOML configuration
//! - [`cli`]: command line surface
//! - [`output`]: result rendering
//! - [`error`]: error types and exit codes

pub mod cli;
pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod output;

// Re-export commonly used types
pub use config::{Config, ControllerAccess, ProxmoxAccess};

pub use controlplane::{
    BackendFactory, ClonedDisk, MountedSnapshot, OntapClient, Orchestrator, PauseMode,
    ProxmoxClient, ResolvedPool, UnmountedSnapshot,
};

pub use domain::ports::{
    ControllerProvider, SnapshotInfo, StorageController, StoragePool, VirtualizationManager,
    VmDisk, VmInfo, VmStatus, VolumeRef,
};

pub use error::{Error, Result};

pub use output::{Outcome, OutputFormat};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
