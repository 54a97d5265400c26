//! VM disk clone
//!
//! Copy-on-write clones every file-based disk of a VM next to its source.
//! When asked, the VM is paused (suspended to disk or shut down) for the
//! duration of the clone loop. Once paused it is always started again,
//! whether the loop succeeds, fails or is interrupted with Ctrl-C.
//!
//! The cloned files are not attached to any VM. Proxmox only sees them after
//! a `qm disk rescan` run by the operator.

use super::orchestrator::{Orchestrator, ResolvedPool};
use crate::domain::naming;
use crate::domain::ports::{VirtualizationManager, VmInfo, VmStatus};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{error, info, warn};

/// How to quiesce a VM while its disks are cloned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseMode {
    /// Suspend to disk, keeping RAM state
    Suspend,
    /// Clean guest shutdown
    Shutdown,
}

/// One disk clone produced by `clone_vm_disks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonedDisk {
    pub slot: String,
    pub pool: String,
    pub volume: String,
    pub source: String,
    pub destination: String,
}

// =============================================================================
// Paused VM Guard
// =============================================================================

/// A VM held in a paused state until `scope` finishes
pub struct PausedVm<'a> {
    manager: &'a dyn VirtualizationManager,
    vm: VmInfo,
    mode: PauseMode,
    released: bool,
}

impl<'a> PausedVm<'a> {
    /// Pause the VM. Nothing needs releasing if this fails.
    pub async fn acquire(
        manager: &'a dyn VirtualizationManager,
        vm: &VmInfo,
        mode: PauseMode,
    ) -> Result<PausedVm<'a>> {
        info!(vm = vm.id, mode = ?mode, "pausing VM");
        match mode {
            PauseMode::Suspend => manager.suspend_vm(vm).await?,
            PauseMode::Shutdown => manager.shutdown_vm(vm).await?,
        }
        Ok(PausedVm {
            manager,
            vm: vm.clone(),
            mode,
            released: false,
        })
    }

    /// Run `body` while paused, then start the VM exactly once.
    ///
    /// Ctrl-C abandons `body` and yields `Interrupted` after the restart.
    /// The body's error takes precedence over a failed restart.
    pub async fn scope<T, F>(self, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        self.scope_until(body, ctrl_c).await
    }

    /// Like `scope`, with `interrupt` standing in for Ctrl-C
    pub async fn scope_until<T, F, I>(mut self, body: F, interrupt: I) -> Result<T>
    where
        F: Future<Output = Result<T>>,
        I: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            result = body => result,
            () = interrupt => {
                warn!(vm = self.vm.id, "interrupted, starting VM before exit");
                Err(Error::Interrupted)
            }
        };

        let released = self.release().await;
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                error!(vm = self.vm.id, error = %release_err, "failed to start VM");
                Err(err)
            }
        }
    }

    async fn release(&mut self) -> Result<()> {
        self.released = true;
        info!(vm = self.vm.id, mode = ?self.mode, "starting VM");
        self.manager.resume_vm(&self.vm).await
    }
}

impl Drop for PausedVm<'_> {
    fn drop(&mut self) {
        if !self.released {
            error!(
                vm = self.vm.id,
                node = %self.vm.node,
                "VM left paused, start it manually"
            );
        }
    }
}

// =============================================================================
// Operation
// =============================================================================

struct DiskTarget<'a> {
    slot: &'a str,
    source: String,
    destination: String,
    resolved: &'a ResolvedPool,
}

impl Orchestrator {
    pub async fn clone_vm_disks(
        &self,
        vm_id: u32,
        pause: Option<PauseMode>,
    ) -> Result<Vec<ClonedDisk>> {
        self.clone_vm_disks_at(vm_id, pause, Utc::now()).await
    }

    /// Clone all disks of a VM, naming every clone with the timestamp `at`
    pub async fn clone_vm_disks_at(
        &self,
        vm_id: u32,
        pause: Option<PauseMode>,
        at: DateTime<Utc>,
    ) -> Result<Vec<ClonedDisk>> {
        let vm = self.manager.list_vm_disks(vm_id).await?;
        if vm.disks.is_empty() {
            warn!(vm = vm_id, "VM has no file-based disks, nothing to clone");
            return Ok(Vec::new());
        }

        // Resolve every pool before pausing, so a bad pool never costs downtime
        let mut pools: BTreeMap<&str, ResolvedPool> = BTreeMap::new();
        for disk in &vm.disks {
            if !pools.contains_key(disk.pool.as_str()) {
                let resolved = self.resolve_pool(&disk.pool).await?;
                pools.insert(disk.pool.as_str(), resolved);
            }
        }

        let stamp = naming::timestamp(at);
        let mut targets = Vec::with_capacity(vm.disks.len());
        for disk in &vm.disks {
            let resolved = pools
                .get(disk.pool.as_str())
                .ok_or_else(|| Error::resolution(&disk.pool, "pool was not resolved"))?;
            targets.push(DiskTarget {
                slot: &disk.slot,
                source: naming::disk_image_path(&disk.path),
                destination: naming::disk_clone_path(&disk.path, &stamp),
                resolved,
            });
        }

        match pause {
            Some(mode) if vm.status != VmStatus::Stopped => {
                let paused = PausedVm::acquire(self.manager.as_ref(), &vm, mode).await?;
                paused.scope(clone_disks(&vm, &targets)).await
            }
            Some(_) => {
                info!(vm = vm_id, "VM is stopped, no pause needed");
                clone_disks(&vm, &targets).await
            }
            None => {
                if vm.status == VmStatus::Running {
                    warn!(
                        vm = vm_id,
                        "cloning disks of a running VM, clones may be crash-inconsistent"
                    );
                }
                clone_disks(&vm, &targets).await
            }
        }
    }
}

async fn clone_disks(vm: &VmInfo, targets: &[DiskTarget<'_>]) -> Result<Vec<ClonedDisk>> {
    let mut cloned = Vec::with_capacity(targets.len());
    for target in targets {
        let volume = &target.resolved.volume;
        target
            .resolved
            .controller
            .object_clone(volume, &target.source, &target.destination)
            .await?;

        info!(
            vm = vm.id,
            slot = %target.slot,
            volume = %volume.name,
            destination = %target.destination,
            "cloned disk"
        );
        cloned.push(ClonedDisk {
            slot: target.slot.to_string(),
            pool: target.resolved.pool.id.clone(),
            volume: volume.name.clone(),
            source: target.source.clone(),
            destination: target.destination.clone(),
        });
    }
    Ok(cloned)
}
