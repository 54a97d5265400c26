//! Storage snapshot lifecycle
//!
//! Create, list, delete and restore volume snapshots of a storage pool.
//! Delete and restore look the snapshot up first, so a missing name fails
//! with `NotFound` before anything is mutated.

use super::orchestrator::{Orchestrator, ResolvedPool};
use crate::domain::naming;
use crate::domain::ports::SnapshotInfo;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

impl Orchestrator {
    /// Take a snapshot of the pool's volume, named after the current time
    pub async fn create_snapshot(&self, pool_id: &str) -> Result<String> {
        self.create_snapshot_at(pool_id, Utc::now()).await
    }

    pub async fn create_snapshot_at(&self, pool_id: &str, at: DateTime<Utc>) -> Result<String> {
        let resolved = self.resolve_pool(pool_id).await?;
        let name = naming::snapshot_name(at);

        resolved
            .controller
            .create_snapshot(&resolved.volume, &name, &naming::snapshot_comment(pool_id))
            .await?;

        info!(pool = %pool_id, snapshot = %name, "created snapshot");
        Ok(name)
    }

    /// Snapshots created by this tool, oldest first
    pub async fn list_snapshots(&self, pool_id: &str) -> Result<Vec<SnapshotInfo>> {
        let resolved = self.resolve_pool(pool_id).await?;
        let mut snapshots: Vec<SnapshotInfo> = resolved
            .controller
            .list_snapshots(&resolved.volume)
            .await?
            .into_iter()
            .filter(|s| naming::is_managed_snapshot(&s.name))
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(snapshots)
    }

    pub async fn delete_snapshot(&self, pool_id: &str, snapshot: &str) -> Result<()> {
        let resolved = self.resolve_pool(pool_id).await?;
        let found = find_snapshot(&resolved, snapshot).await?;

        resolved.controller.delete_snapshot(&resolved.volume, &found).await?;
        info!(pool = %pool_id, snapshot = %snapshot, "deleted snapshot");
        Ok(())
    }

    /// Revert the pool's volume to a snapshot.
    ///
    /// Every write made after the snapshot is lost. Confirmation is the
    /// caller's job.
    pub async fn restore_snapshot(&self, pool_id: &str, snapshot: &str) -> Result<()> {
        let resolved = self.resolve_pool(pool_id).await?;
        let found = find_snapshot(&resolved, snapshot).await?;

        warn!(
            pool = %pool_id,
            volume = %resolved.volume.name,
            snapshot = %snapshot,
            "restoring volume to snapshot"
        );
        resolved.controller.restore_snapshot(&resolved.volume, &found).await?;
        info!(pool = %pool_id, snapshot = %snapshot, "restored snapshot");
        Ok(())
    }

    /// Raw controller metadata of the pool's backing volume
    pub async fn show_volume(&self, pool_id: &str) -> Result<serde_json::Value> {
        let resolved = self.resolve_pool(pool_id).await?;
        resolved.controller.describe_volume(&resolved.volume).await
    }
}

/// Look a snapshot up by name on the resolved volume
pub(crate) async fn find_snapshot(resolved: &ResolvedPool, name: &str) -> Result<SnapshotInfo> {
    resolved
        .controller
        .list_snapshots(&resolved.volume)
        .await?
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| {
            Error::not_found("Snapshot", format!("{} on volume {}", name, resolved.volume.name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::orchestrator::testing::fixture;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_in_creation_order() {
        let (orchestrator, _, controller) = fixture().await;
        controller.add_snapshot("vol_a", "hourly.2024-01-01_0005").await;

        let later = orchestrator.create_snapshot_at("nfs-a", at(1_700_000_100)).await.unwrap();
        let earlier = orchestrator.create_snapshot_at("nfs-a", at(1_700_000_000)).await.unwrap();

        let listed: Vec<String> = orchestrator
            .list_snapshots("nfs-a")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(listed, vec![earlier, later]);
    }

    #[tokio::test]
    async fn test_create_records_comment() {
        let (orchestrator, _, controller) = fixture().await;

        orchestrator.create_snapshot("nfs-a").await.unwrap();

        assert_eq!(controller.call_count("create_snapshot").await, 1);
        let snapshots = orchestrator.list_snapshots("nfs-a").await.unwrap();
        assert_eq!(
            snapshots[0].comment.as_deref(),
            Some("Snapshot of Proxmox storage nfs-a")
        );
    }

    #[tokio::test]
    async fn test_delete_snapshot() {
        let (orchestrator, _, controller) = fixture().await;
        let name = orchestrator.create_snapshot("nfs-a").await.unwrap();

        orchestrator.delete_snapshot("nfs-a", &name).await.unwrap();

        assert!(controller.snapshot_names("vol_a").await.is_empty());
    }

    #[tokio::test]
    async fn test_restore_snapshot() {
        let (orchestrator, _, controller) = fixture().await;
        let name = orchestrator.create_snapshot("nfs-a").await.unwrap();

        orchestrator.restore_snapshot("nfs-a", &name).await.unwrap();

        assert_eq!(controller.restored_to("vol_a").await, Some(name.clone()));
        assert_eq!(controller.snapshot_names("vol_a").await, vec![name]);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_not_found_without_mutation() {
        let (orchestrator, _, controller) = fixture().await;

        let err = orchestrator.delete_snapshot("nfs-a", "proxmox_snapshot_nope").await.unwrap_err();
        assert_matches!(err, Error::NotFound { .. });

        let err = orchestrator.restore_snapshot("nfs-a", "proxmox_snapshot_nope").await.unwrap_err();
        assert_matches!(err, Error::NotFound { .. });

        assert_eq!(controller.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn test_unresolvable_pool_mutates_nothing() {
        let (orchestrator, manager, controller) = fixture().await;
        manager.add_pool("nfs-b", "vol_b").await;

        let err = orchestrator.create_snapshot("nfs-b").await.unwrap_err();
        assert_matches!(err, Error::Resolution { .. });
        assert_eq!(controller.mutation_count().await, 0);
    }

    #[tokio::test]
    async fn test_show_volume() {
        let (orchestrator, _, _) = fixture().await;

        let shown = orchestrator.show_volume("nfs-a").await.unwrap();
        assert_eq!(shown["name"], "vol_a");
    }
}
