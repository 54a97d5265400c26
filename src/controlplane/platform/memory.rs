//! In-memory virtualization manager used by the orchestration tests

use crate::domain::ports::{StoragePool, VirtualizationManager, VmInfo, VmStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

pub(crate) struct MemoryManager {
    pools: RwLock<BTreeMap<String, StoragePool>>,
    vms: RwLock<BTreeMap<u32, VmInfo>>,
    calls: RwLock<Vec<String>>,
    failing: RwLock<BTreeSet<String>>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(BTreeMap::new()),
            vms: RwLock::new(BTreeMap::new()),
            calls: RwLock::new(Vec::new()),
            failing: RwLock::new(BTreeSet::new()),
        }
    }

    /// Register an NFS pool exporting `/<volume>`
    pub async fn add_pool(&self, id: &str, volume: &str) {
        self.pools.write().await.insert(
            id.to_string(),
            StoragePool {
                id: id.to_string(),
                pool_type: "nfs".to_string(),
                server: Some("10.0.0.5".to_string()),
                export: Some(format!("/{}", volume)),
                content: Some("images".to_string()),
            },
        );
    }

    pub async fn add_vm(&self, vm: VmInfo) {
        self.vms.write().await.insert(vm.id, vm);
    }

    pub async fn fail_on(&self, operation: &str) {
        self.failing.write().await.insert(operation.to_string());
    }

    pub async fn pool_ids(&self) -> Vec<String> {
        self.pools.read().await.keys().cloned().collect()
    }

    pub async fn pool(&self, id: &str) -> Option<StoragePool> {
        self.pools.read().await.get(id).cloned()
    }

    pub async fn vm_status(&self, id: u32) -> Option<VmStatus> {
        self.vms.read().await.get(&id).map(|vm| vm.status)
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls.read().await.iter().filter(|c| *c == operation).count()
    }

    async fn record(&self, operation: &str) -> Result<()> {
        self.calls.write().await.push(operation.to_string());
        if self.failing.read().await.contains(operation) {
            return Err(Error::remote("memory", operation, "injected failure"));
        }
        Ok(())
    }

    async fn set_status(&self, id: u32, status: VmStatus) {
        if let Some(vm) = self.vms.write().await.get_mut(&id) {
            vm.status = status;
        }
    }
}

#[async_trait]
impl VirtualizationManager for MemoryManager {
    async fn list_vm_disks(&self, vm_id: u32) -> Result<VmInfo> {
        self.record("list_vm_disks").await?;
        self.vms
            .read()
            .await
            .get(&vm_id)
            .cloned()
            .ok_or_else(|| Error::not_found("VM", vm_id.to_string()))
    }

    async fn suspend_vm(&self, vm: &VmInfo) -> Result<()> {
        self.record("suspend_vm").await?;
        self.set_status(vm.id, VmStatus::Paused).await;
        Ok(())
    }

    async fn shutdown_vm(&self, vm: &VmInfo) -> Result<()> {
        self.record("shutdown_vm").await?;
        self.set_status(vm.id, VmStatus::Stopped).await;
        Ok(())
    }

    async fn resume_vm(&self, vm: &VmInfo) -> Result<()> {
        self.record("resume_vm").await?;
        self.set_status(vm.id, VmStatus::Running).await;
        Ok(())
    }

    async fn register_storage_pool(&self, pool: &StoragePool) -> Result<()> {
        self.record("register_storage_pool").await?;
        let mut pools = self.pools.write().await;
        if pools.contains_key(&pool.id) {
            return Err(Error::remote("memory", "register_storage_pool", "storage exists"));
        }
        pools.insert(pool.id.clone(), pool.clone());
        Ok(())
    }

    async fn unregister_storage_pool(&self, id: &str) -> Result<()> {
        self.record("unregister_storage_pool").await?;
        self.pools
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("StoragePool", id))
    }

    async fn list_storage_pools(&self) -> Result<Vec<StoragePool>> {
        self.record("list_storage_pools").await?;
        Ok(self.pools.read().await.values().cloned().collect())
    }

    async fn describe_storage_pool(&self, id: &str) -> Result<StoragePool> {
        self.record("describe_storage_pool").await?;
        self.pools
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("StoragePool", id))
    }

    fn platform_name(&self) -> &str {
        "memory"
    }
}
