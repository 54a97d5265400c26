//! Main Orchestrator
//!
//! Owns one handle to each external system and correlates them. Every
//! operation starts by resolving a Proxmox storage pool to the ONTAP volume
//! behind it. The per-operation logic lives in the sibling modules
//! (`snapshots`, `mount`, `disk_clone`) as further `impl Orchestrator` blocks.

use crate::domain::naming;
use crate::domain::ports::{
    ControllerProvider, StorageController, StoragePool, VirtualizationManager, VolumeRef,
};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Resolved Pool
// =============================================================================

/// A storage pool correlated with its backing volume
pub struct ResolvedPool {
    pub pool: StoragePool,
    pub volume: VolumeRef,
    pub controller: Arc<dyn StorageController>,
}

impl std::fmt::Debug for ResolvedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPool")
            .field("pool", &self.pool)
            .field("volume", &self.volume)
            .field("controller", &self.controller.controller_name())
            .finish()
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Coordinates the virtualization manager and the storage controllers
pub struct Orchestrator {
    pub(crate) manager: Arc<dyn VirtualizationManager>,
    pub(crate) controllers: Arc<dyn ControllerProvider>,
}

impl Orchestrator {
    pub fn new(
        manager: Arc<dyn VirtualizationManager>,
        controllers: Arc<dyn ControllerProvider>,
    ) -> Self {
        Self {
            manager,
            controllers,
        }
    }

    /// Resolve a storage pool id to exactly one backing volume.
    ///
    /// The pool must exist, export an NFS path naming a single volume, and
    /// that volume must exist exactly once on the pool's controller with a
    /// matching junction path. Read-only.
    pub async fn resolve_pool(&self, pool_id: &str) -> Result<ResolvedPool> {
        debug!(pool = %pool_id, platform = self.manager.platform_name(), "resolving storage pool");
        let pool = self.manager.describe_storage_pool(pool_id).await?;

        let export = pool.export.as_deref().ok_or_else(|| {
            Error::resolution(
                pool_id,
                format!("pool of type '{}' has no NFS export path", pool.pool_type),
            )
        })?;
        let volume_name = naming::volume_name_from_export(export).ok_or_else(|| {
            Error::resolution(pool_id, format!("export path '{}' does not name a volume", export))
        })?;

        let controller = self.controllers.controller_for(pool_id)?;
        let mut volumes = controller.find_volumes(&volume_name).await?;
        let volume = match volumes.len() {
            1 => volumes.remove(0),
            0 => {
                return Err(Error::resolution(
                    pool_id,
                    format!(
                        "no volume named '{}' on controller {}",
                        volume_name,
                        controller.controller_name()
                    ),
                ))
            }
            n => {
                return Err(Error::resolution(
                    pool_id,
                    format!("{} volumes named '{}' found, expected exactly one", n, volume_name),
                ))
            }
        };

        match volume.export_path.as_deref() {
            Some(path) if same_path(path, export) => {}
            Some(path) => {
                return Err(Error::resolution(
                    pool_id,
                    format!(
                        "volume '{}' is mounted at '{}' but the pool exports '{}'",
                        volume.name, path, export
                    ),
                ))
            }
            None => {
                return Err(Error::resolution(
                    pool_id,
                    format!("volume '{}' has no junction path", volume.name),
                ))
            }
        }

        info!(
            pool = %pool_id,
            volume = %volume.name,
            svm = %volume.svm,
            "resolved storage pool"
        );
        Ok(ResolvedPool {
            pool,
            volume,
            controller,
        })
    }
}

fn same_path(a: &str, b: &str) -> bool {
    a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/')
}
