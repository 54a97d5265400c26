//! Snapshot mount and unmount
//!
//! Mount promotes a snapshot into a writable FlexClone registered as the
//! storage pool `<pool>-CLONE`:
//!
//! ```text
//! unmounted -> cloning -> registering -> mounted
//! ```
//!
//! A failed registration deletes the clone again. Unmount runs the reverse:
//!
//! ```text
//! mounted -> unregistering -> destroying -> unmounted
//! ```
//!
//! The pool registration is removed first and never restored, so a failed
//! destroy is reported as a partial failure naming the orphaned clone.

use super::orchestrator::Orchestrator;
use super::snapshots::find_snapshot;
use super::steps::{Step, StepSequence};
use crate::domain::naming;
use crate::domain::ports::{
    CloneRequest, StorageController, StoragePool, VirtualizationManager, VolumeRef,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

/// Result of a successful mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountedSnapshot {
    pub pool: String,
    pub snapshot: String,
    pub clone_pool: String,
    pub clone_volume: String,
    pub export: String,
}

/// Result of a successful unmount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmountedSnapshot {
    pub clone_pool: String,
    pub clone_volume: String,
}

impl Orchestrator {
    pub async fn mount_snapshot(&self, pool_id: &str, snapshot: &str) -> Result<MountedSnapshot> {
        if naming::is_clone_pool_id(pool_id) {
            return Err(Error::resolution(
                pool_id,
                "pool is itself a mounted snapshot clone",
            ));
        }

        let resolved = self.resolve_pool(pool_id).await?;
        find_snapshot(&resolved, snapshot).await?;

        let clone_pool = naming::clone_pool_id(pool_id);
        let clone_volume = naming::clone_volume_name(&resolved.volume.name, snapshot);
        let export = naming::clone_export_path(&clone_volume);

        let pools = self.manager.list_storage_pools().await?;
        if pools.iter().any(|p| p.id == clone_pool) {
            return Err(Error::conflict("StoragePool", clone_pool));
        }
        if !resolved.controller.find_volumes(&clone_volume).await?.is_empty() {
            return Err(Error::conflict("Volume", clone_volume));
        }

        let cloning = CloneStep {
            controller: resolved.controller.as_ref(),
            request: CloneRequest {
                name: clone_volume.clone(),
                parent: resolved.volume.clone(),
                snapshot: snapshot.to_string(),
                export_path: export.clone(),
            },
            created: OnceCell::new(),
        };
        let registering = RegisterStep {
            manager: self.manager.as_ref(),
            pool: StoragePool {
                id: clone_pool.clone(),
                pool_type: resolved.pool.pool_type.clone(),
                server: resolved.pool.server.clone(),
                export: Some(export.clone()),
                content: resolved.pool.content.clone(),
            },
        };

        StepSequence::new(format!("mount {} of {}", snapshot, pool_id))
            .then(cloning)
            .then(registering)
            .run()
            .await?;

        info!(
            pool = %pool_id,
            snapshot = %snapshot,
            clone_pool = %clone_pool,
            "mounted snapshot"
        );
        Ok(MountedSnapshot {
            pool: pool_id.to_string(),
            snapshot: snapshot.to_string(),
            clone_pool,
            clone_volume,
            export,
        })
    }

    pub async fn unmount_snapshot(&self, clone_pool_id: &str) -> Result<UnmountedSnapshot> {
        if !naming::is_clone_pool_id(clone_pool_id) {
            return Err(Error::resolution(
                clone_pool_id,
                format!(
                    "not a mounted snapshot clone (expected suffix '{}')",
                    naming::CLONE_POOL_SUFFIX
                ),
            ));
        }

        let resolved = self.resolve_pool(clone_pool_id).await?;
        if !resolved.volume.is_flexclone {
            return Err(Error::resolution(
                clone_pool_id,
                format!("backing volume '{}' is not a FlexClone", resolved.volume.name),
            ));
        }
        self.check_clone_origin(clone_pool_id, &resolved.volume).await?;

        let clone_volume = resolved.volume.name.clone();
        StepSequence::new(format!("unmount {}", clone_pool_id))
            .then(UnregisterStep {
                manager: self.manager.as_ref(),
                pool_id: clone_pool_id,
            })
            .then(DestroyStep {
                controller: resolved.controller.as_ref(),
                clone: &resolved.volume,
            })
            .run()
            .await?;

        info!(clone_pool = %clone_pool_id, volume = %clone_volume, "unmounted snapshot");
        Ok(UnmountedSnapshot {
            clone_pool: clone_pool_id.to_string(),
            clone_volume,
        })
    }

    /// Require the clone volume to be named after the volume of its source pool
    async fn check_clone_origin(&self, clone_pool_id: &str, clone: &VolumeRef) -> Result<()> {
        let source_pool = naming::source_pool_id(clone_pool_id)
            .ok_or_else(|| Error::resolution(clone_pool_id, "not a mounted snapshot clone"))?;
        let source = self.resolve_pool(source_pool).await?;

        match naming::clone_source_volume(&clone.name) {
            Some(origin) if origin == source.volume.name => Ok(()),
            _ => Err(Error::resolution(
                clone_pool_id,
                format!(
                    "volume '{}' was not cloned from '{}' of pool {}",
                    clone.name, source.volume.name, source_pool
                ),
            )),
        }
    }
}

// =============================================================================
// Steps
// =============================================================================

struct CloneStep<'a> {
    controller: &'a dyn StorageController,
    request: CloneRequest,
    created: OnceCell<VolumeRef>,
}

#[async_trait]
impl Step for CloneStep<'_> {
    fn name(&self) -> &str {
        "cloning"
    }

    fn resource(&self) -> String {
        format!("clone volume {}", self.request.name)
    }

    async fn apply(&self) -> Result<()> {
        let clone = self.controller.create_clone(&self.request).await?;
        let _ = self.created.set(clone);
        Ok(())
    }

    fn reversible(&self) -> bool {
        true
    }

    async fn compensate(&self) -> Result<()> {
        match self.created.get() {
            Some(clone) => self.controller.delete_clone(clone).await,
            None => Ok(()),
        }
    }
}

struct RegisterStep<'a> {
    manager: &'a dyn VirtualizationManager,
    pool: StoragePool,
}

#[async_trait]
impl Step for RegisterStep<'_> {
    fn name(&self) -> &str {
        "registering"
    }

    fn resource(&self) -> String {
        format!("storage pool {}", self.pool.id)
    }

    async fn apply(&self) -> Result<()> {
        self.manager.register_storage_pool(&self.pool).await
    }

    fn reversible(&self) -> bool {
        true
    }

    async fn compensate(&self) -> Result<()> {
        self.manager.unregister_storage_pool(&self.pool.id).await
    }
}

struct UnregisterStep<'a> {
    manager: &'a dyn VirtualizationManager,
    pool_id: &'a str,
}

#[async_trait]
impl Step for UnregisterStep<'_> {
    fn name(&self) -> &str {
        "unregistering"
    }

    fn resource(&self) -> String {
        format!("storage pool {}", self.pool_id)
    }

    async fn apply(&self) -> Result<()> {
        self.manager.unregister_storage_pool(self.pool_id).await
    }
}

struct DestroyStep<'a> {
    controller: &'a dyn StorageController,
    clone: &'a VolumeRef,
}

#[async_trait]
impl Step for DestroyStep<'_> {
    fn name(&self) -> &str {
        "destroying"
    }

    fn resource(&self) -> String {
        format!("clone volume {}", self.clone.name)
    }

    async fn apply(&self) -> Result<()> {
        self.controller.delete_clone(self.clone).await
    }
}
