//! In-memory storage controller used by the orchestration tests
//!
//! Tracks volumes, snapshots and files in a `BTreeMap`, records every call,
//! and can be told to fail a given operation.

use crate::domain::ports::{
    CloneRequest, ControllerProvider, SnapshotInfo, StorageController, VolumeRef,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

const MUTATIONS: &[&str] = &[
    "create_snapshot",
    "delete_snapshot",
    "restore_snapshot",
    "create_clone",
    "delete_clone",
    "object_clone",
];

#[derive(Debug, Clone)]
struct VolumeState {
    volume: VolumeRef,
    snapshots: Vec<SnapshotInfo>,
    files: BTreeSet<String>,
    restored_to: Option<String>,
}

pub(crate) struct MemoryController {
    volumes: RwLock<BTreeMap<String, VolumeState>>,
    calls: RwLock<Vec<String>>,
    failing: RwLock<BTreeSet<String>>,
}

impl MemoryController {
    pub fn new() -> Self {
        Self {
            volumes: RwLock::new(BTreeMap::new()),
            calls: RwLock::new(Vec::new()),
            failing: RwLock::new(BTreeSet::new()),
        }
    }

    pub async fn add_volume(&self, name: &str) {
        let volume = VolumeRef {
            uuid: format!("uuid-{}", name),
            name: name.to_string(),
            svm: "svm1".to_string(),
            export_path: Some(format!("/{}", name)),
            is_flexclone: false,
        };
        self.volumes.write().await.insert(
            name.to_string(),
            VolumeState {
                volume,
                snapshots: Vec::new(),
                files: BTreeSet::new(),
                restored_to: None,
            },
        );
    }

    pub async fn add_snapshot(&self, volume: &str, snapshot: &str) {
        if let Some(state) = self.volumes.write().await.get_mut(volume) {
            state.snapshots.push(SnapshotInfo {
                uuid: format!("uuid-{}", snapshot),
                name: snapshot.to_string(),
                comment: None,
                create_time: None,
            });
        }
    }

    /// Mark a volume as a FlexClone without a parent snapshot on record
    pub async fn mark_flexclone(&self, volume: &str) {
        if let Some(state) = self.volumes.write().await.get_mut(volume) {
            state.volume.is_flexclone = true;
        }
    }

    pub async fn add_file(&self, volume: &str, path: &str) {
        if let Some(state) = self.volumes.write().await.get_mut(volume) {
            state.files.insert(path.to_string());
        }
    }

    /// Make every future call of `operation` fail
    pub async fn fail_on(&self, operation: &str) {
        self.failing.write().await.insert(operation.to_string());
    }

    pub async fn volume_names(&self) -> Vec<String> {
        self.volumes.read().await.keys().cloned().collect()
    }

    pub async fn snapshot_names(&self, volume: &str) -> Vec<String> {
        self.volumes
            .read()
            .await
            .get(volume)
            .map(|s| s.snapshots.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn files(&self, volume: &str) -> Vec<String> {
        self.volumes
            .read()
            .await
            .get(volume)
            .map(|s| s.files.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn restored_to(&self, volume: &str) -> Option<String> {
        self.volumes.read().await.get(volume).and_then(|s| s.restored_to.clone())
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls.read().await.iter().filter(|c| *c == operation).count()
    }

    pub async fn mutation_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| MUTATIONS.contains(&c.as_str()))
            .count()
    }

    async fn record(&self, operation: &str) -> Result<()> {
        self.calls.write().await.push(operation.to_string());
        if self.failing.read().await.contains(operation) {
            return Err(Error::remote("memory", operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageController for MemoryController {
    async fn find_volumes(&self, name: &str) -> Result<Vec<VolumeRef>> {
        self.record("find_volumes").await?;
        Ok(self
            .volumes
            .read()
            .await
            .get(name)
            .map(|s| vec![s.volume.clone()])
            .unwrap_or_default())
    }

    async fn describe_volume(&self, volume: &VolumeRef) -> Result<serde_json::Value> {
        self.record("describe_volume").await?;
        Ok(json!({ "uuid": volume.uuid, "name": volume.name, "svm": { "name": volume.svm } }))
    }

    async fn list_snapshots(&self, volume: &VolumeRef) -> Result<Vec<SnapshotInfo>> {
        self.record("list_snapshots").await?;
        let volumes = self.volumes.read().await;
        let state = volumes
            .get(&volume.name)
            .ok_or_else(|| Error::not_found("Volume", &volume.name))?;
        Ok(state.snapshots.clone())
    }

    async fn create_snapshot(&self, volume: &VolumeRef, name: &str, comment: &str) -> Result<()> {
        self.record("create_snapshot").await?;
        let mut volumes = self.volumes.write().await;
        let state = volumes
            .get_mut(&volume.name)
            .ok_or_else(|| Error::not_found("Volume", &volume.name))?;
        if state.snapshots.iter().any(|s| s.name == name) {
            return Err(Error::remote("memory", "create_snapshot", "duplicate name"));
        }
        state.snapshots.push(SnapshotInfo {
            uuid: format!("uuid-{}", name),
            name: name.to_string(),
            comment: Some(comment.to_string()),
            create_time: None,
        });
        Ok(())
    }

    async fn delete_snapshot(&self, volume: &VolumeRef, snapshot: &SnapshotInfo) -> Result<()> {
        self.record("delete_snapshot").await?;
        let mut volumes = self.volumes.write().await;
        if let Some(state) = volumes.get_mut(&volume.name) {
            state.snapshots.retain(|s| s.uuid != snapshot.uuid);
        }
        Ok(())
    }

    async fn restore_snapshot(&self, volume: &VolumeRef, snapshot: &SnapshotInfo) -> Result<()> {
        self.record("restore_snapshot").await?;
        let mut volumes = self.volumes.write().await;
        if let Some(state) = volumes.get_mut(&volume.name) {
            state.restored_to = Some(snapshot.name.clone());
        }
        Ok(())
    }

    async fn create_clone(&self, request: &CloneRequest) -> Result<VolumeRef> {
        self.record("create_clone").await?;
        let mut volumes = self.volumes.write().await;
        if volumes.contains_key(&request.name) {
            return Err(Error::remote("memory", "create_clone", "volume exists"));
        }
        let clone = VolumeRef {
            uuid: format!("uuid-{}", request.name),
            name: request.name.clone(),
            svm: request.parent.svm.clone(),
            export_path: Some(request.export_path.clone()),
            is_flexclone: true,
        };
        volumes.insert(
            request.name.clone(),
            VolumeState {
                volume: clone.clone(),
                snapshots: Vec::new(),
                files: BTreeSet::new(),
                restored_to: None,
            },
        );
        Ok(clone)
    }

    async fn delete_clone(&self, clone: &VolumeRef) -> Result<()> {
        self.record("delete_clone").await?;
        self.volumes.write().await.remove(&clone.name);
        Ok(())
    }

    async fn object_clone(
        &self,
        volume: &VolumeRef,
        source: &str,
        destination: &str,
    ) -> Result<()> {
        self.record("object_clone").await?;
        let mut volumes = self.volumes.write().await;
        let state = volumes
            .get_mut(&volume.name)
            .ok_or_else(|| Error::not_found("Volume", &volume.name))?;
        if !state.files.contains(source) {
            return Err(Error::remote("memory", "object_clone", "source missing"));
        }
        state.files.insert(destination.to_string());
        Ok(())
    }

    fn controller_name(&self) -> &str {
        "memory"
    }
}

/// Provider handing out one shared controller for every pool
pub(crate) struct SharedController(pub Arc<MemoryController>);

impl ControllerProvider for SharedController {
    fn controller_for(&self, _pool_id: &str) -> Result<Arc<dyn StorageController>> {
        Ok(self.0.clone())
    }
}
