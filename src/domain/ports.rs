//! Domain Ports - Core trait definitions for the snapshot orchestrator
//!
//! These traits define the boundaries between the orchestration logic and the
//! two external systems. Adapters implement these traits against the real
//! REST APIs; test doubles implement them in memory.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Storage Controller Types
// =============================================================================

/// A volume as seen by the storage controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRef {
    /// Controller-assigned UUID
    pub uuid: String,
    /// Volume name, unique per controller
    pub name: String,
    /// Storage VM owning the volume
    pub svm: String,
    /// NFS junction path, if mounted in the namespace
    pub export_path: Option<String>,
    /// Whether this volume is a FlexClone of another volume's snapshot
    pub is_flexclone: bool,
}

/// A volume snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub uuid: String,
    pub name: String,
    pub comment: Option<String>,
    pub create_time: Option<String>,
}

/// Request to create a writable clone from a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneRequest {
    /// Name of the new clone volume
    pub name: String,
    /// Parent volume the snapshot belongs to
    pub parent: VolumeRef,
    /// Parent snapshot name
    pub snapshot: String,
    /// NFS junction path for the clone
    pub export_path: String,
}

// =============================================================================
// Virtualization Manager Types
// =============================================================================

/// Run state of a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Running,
    Stopped,
    Paused,
    Unknown,
}

impl VmStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "running" => VmStatus::Running,
            "stopped" => VmStatus::Stopped,
            "paused" | "suspended" => VmStatus::Paused,
            _ => VmStatus::Unknown,
        }
    }
}

impl std::fmt::Display for VmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmStatus::Running => write!(f, "running"),
            VmStatus::Stopped => write!(f, "stopped"),
            VmStatus::Paused => write!(f, "paused"),
            VmStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A disk image attached to a VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDisk {
    /// Config slot, e.g. `scsi0`
    pub slot: String,
    /// Storage pool holding the image
    pub pool: String,
    /// Image path relative to the pool's `images/` directory, e.g. `100/vm-100-disk-0.qcow2`
    pub path: String,
}

/// A VM located on a cluster node, with its disks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInfo {
    pub id: u32,
    pub node: String,
    pub name: String,
    pub status: VmStatus,
    pub disks: Vec<VmDisk>,
}

/// A storage pool registered in the virtualization manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePool {
    pub id: String,
    /// Pool type, e.g. `nfs`
    pub pool_type: String,
    /// NFS server address
    pub server: Option<String>,
    /// NFS export path
    pub export: Option<String>,
    /// Comma-separated content types, e.g. `images,iso`
    pub content: Option<String>,
}

// =============================================================================
// Ports
// =============================================================================

/// Storage controller owning volumes, snapshots and clones
#[async_trait]
pub trait StorageController: Send + Sync {
    /// Find all volumes with the given name
    async fn find_volumes(&self, name: &str) -> Result<Vec<VolumeRef>>;

    /// Full metadata of a volume, for display
    async fn describe_volume(&self, volume: &VolumeRef) -> Result<serde_json::Value>;

    /// List snapshots of a volume
    async fn list_snapshots(&self, volume: &VolumeRef) -> Result<Vec<SnapshotInfo>>;

    /// Create a snapshot
    async fn create_snapshot(&self, volume: &VolumeRef, name: &str, comment: &str) -> Result<()>;

    /// Delete a snapshot
    async fn delete_snapshot(&self, volume: &VolumeRef, snapshot: &SnapshotInfo) -> Result<()>;

    /// Revert the volume's live state to a snapshot. Destructive.
    async fn restore_snapshot(&self, volume: &VolumeRef, snapshot: &SnapshotInfo) -> Result<()>;

    /// Create a writable clone volume from a snapshot
    async fn create_clone(&self, request: &CloneRequest) -> Result<VolumeRef>;

    /// Destroy a clone volume
    async fn delete_clone(&self, clone: &VolumeRef) -> Result<()>;

    /// Copy-on-write clone of a single file inside a volume
    async fn object_clone(&self, volume: &VolumeRef, source: &str, destination: &str)
        -> Result<()>;

    /// Human-readable controller identity, for logs
    fn controller_name(&self) -> &str;
}

/// Virtualization manager owning VM definitions and storage pool registrations
#[async_trait]
pub trait VirtualizationManager: Send + Sync {
    /// Locate a VM in the cluster and list its disk images
    async fn list_vm_disks(&self, vm_id: u32) -> Result<VmInfo>;

    /// Suspend a VM to disk
    async fn suspend_vm(&self, vm: &VmInfo) -> Result<()>;

    /// Cleanly shut down a VM
    async fn shutdown_vm(&self, vm: &VmInfo) -> Result<()>;

    /// Start a suspended or stopped VM
    async fn resume_vm(&self, vm: &VmInfo) -> Result<()>;

    /// Register an NFS storage pool
    async fn register_storage_pool(&self, pool: &StoragePool) -> Result<()>;

    /// Remove a storage pool registration. Data on the export is untouched.
    async fn unregister_storage_pool(&self, id: &str) -> Result<()>;

    async fn list_storage_pools(&self) -> Result<Vec<StoragePool>>;

    /// Describe a single pool, failing with `NotFound` if it is absent
    async fn describe_storage_pool(&self, id: &str) -> Result<StoragePool>;

    fn platform_name(&self) -> &str;
}

/// Hands out the storage controller backing a given storage pool
pub trait ControllerProvider: Send + Sync {
    fn controller_for(&self, pool_id: &str) -> Result<Arc<dyn StorageController>>;
}
