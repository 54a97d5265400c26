//! ONTAP Storage Controller Adapter
//!
//! Issues volume, snapshot, FlexClone and file clone calls against the ONTAP
//! REST API. Long-running calls answer with a job reference which is polled
//! until it completes.

use crate::config::{self, ControllerAccess};
use crate::controlplane::retry::{retry_reads, transport_error};
use crate::domain::ports::{CloneRequest, SnapshotInfo, StorageController, VolumeRef};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

const SYSTEM: &str = "ONTAP";

/// Fields requested for every volume lookup
const VOLUME_FIELDS: &str = "uuid,name,svm.name,nas.path,clone.is_flexclone";

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Records<T> {
    #[serde(default)]
    records: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct NasRecord {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CloneRecord {
    #[serde(default)]
    is_flexclone: bool,
}

#[derive(Debug, Deserialize)]
struct VolumeRecord {
    uuid: String,
    name: String,
    svm: Option<NamedRef>,
    nas: Option<NasRecord>,
    clone: Option<CloneRecord>,
}

impl From<VolumeRecord> for VolumeRef {
    fn from(record: VolumeRecord) -> Self {
        VolumeRef {
            uuid: record.uuid,
            name: record.name,
            svm: record.svm.map(|s| s.name).unwrap_or_default(),
            export_path: record.nas.and_then(|n| n.path),
            is_flexclone: record.clone.map(|c| c.is_flexclone).unwrap_or(false),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotRecord {
    uuid: String,
    name: String,
    comment: Option<String>,
    create_time: Option<String>,
}

impl From<SnapshotRecord> for SnapshotInfo {
    fn from(record: SnapshotRecord) -> Self {
        SnapshotInfo {
            uuid: record.uuid,
            name: record.name,
            comment: record.comment,
            create_time: record.create_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobRecord {
    state: String,
    message: Option<String>,
}

// =============================================================================
// ONTAP Client
// =============================================================================

/// REST client for one ONTAP cluster
pub struct OntapClient {
    host: String,
    base_url: String,
    user: String,
    password: String,
    client: reqwest::Client,
    job_timeout: Duration,
    retry_window: Duration,
    poll_interval: Duration,
}

impl OntapClient {
    /// Create a client from the pool's controller access section
    pub fn new(access: &ControllerAccess) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!access.verify)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            host: access.host.clone(),
            base_url: format!("{}/api", config::base_url(&access.host, None)),
            user: access.user.clone(),
            password: access.password.clone(),
            client,
            job_timeout: access.job_timeout(),
            retry_window: access.retry_window(),
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Override the job polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Idempotent GET, retried on transport failures
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        retry_reads(self.retry_window, || async move {
            let response = self
                .client
                .get(self.url(path))
                .basic_auth(&self.user, Some(&self.password))
                .query(query)
                .send()
                .await
                .map_err(|e| transport_error(SYSTEM, operation, e))?;
            let body = check_status(operation, response).await?;
            Ok(serde_json::from_value(body)?)
        })
        .await
    }

    /// Mutating call, never retried. Waits for the job if one is returned.
    async fn submit(
        &self,
        method: Method,
        operation: &str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<()> {
        debug!(operation, path, "submitting ONTAP request");

        let mut request = self
            .client
            .request(method, self.url(path))
            .basic_auth(&self.user, Some(&self.password))
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(SYSTEM, operation, e))?;
        let body = check_status(operation, response).await?;

        match body.pointer("/job/uuid").and_then(Value::as_str) {
            Some(job) => self.wait_for_job(operation, job).await,
            None => Ok(()),
        }
    }

    /// Poll a cluster job until it reaches a terminal state
    async fn wait_for_job(&self, operation: &str, job_uuid: &str) -> Result<()> {
        let deadline = Instant::now() + self.job_timeout;
        let path = format!("/cluster/jobs/{}", job_uuid);
        debug!(operation, job = job_uuid, "waiting for ONTAP job");

        loop {
            let job: JobRecord = self
                .get_json(operation, &path, &[("fields", "state,message")])
                .await?;

            match job.state.as_str() {
                "success" => return Ok(()),
                "failure" | "error" => {
                    return Err(Error::remote(
                        SYSTEM,
                        operation,
                        job.message.unwrap_or_else(|| format!("job {} failed", job_uuid)),
                    ))
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(Error::remote(
                    SYSTEM,
                    operation,
                    format!(
                        "job {} still {} after {}s",
                        job_uuid,
                        job.state,
                        self.job_timeout.as_secs()
                    ),
                ));
            }
            sleep(self.poll_interval).await;
        }
    }
}

/// Turn a non-success status into a remote call error, otherwise return the JSON body
async fn check_status(operation: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(SYSTEM, operation, e))?;

    if !status.is_success() {
        let reason = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
            .unwrap_or(text);
        return Err(Error::remote(SYSTEM, operation, format!("{}: {}", status, reason)));
    }

    if text.trim().is_empty() || status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl StorageController for OntapClient {
    async fn find_volumes(&self, name: &str) -> Result<Vec<VolumeRef>> {
        let operation = format!("look up volume {}", name);
        let records: Records<VolumeRecord> = self
            .get_json(
                &operation,
                "/storage/volumes",
                &[("name", name), ("fields", VOLUME_FIELDS)],
            )
            .await?;

        Ok(records.records.into_iter().map(VolumeRef::from).collect())
    }

    async fn describe_volume(&self, volume: &VolumeRef) -> Result<Value> {
        self.get_json(
            &format!("describe volume {}", volume.name),
            &format!("/storage/volumes/{}", volume.uuid),
            &[("fields", "*")],
        )
        .await
    }

    async fn list_snapshots(&self, volume: &VolumeRef) -> Result<Vec<SnapshotInfo>> {
        let records: Records<SnapshotRecord> = self
            .get_json(
                &format!("list snapshots of volume {}", volume.name),
                &format!("/storage/volumes/{}/snapshots", volume.uuid),
                &[("fields", "name,comment,create_time")],
            )
            .await?;

        Ok(records.records.into_iter().map(SnapshotInfo::from).collect())
    }

    async fn create_snapshot(&self, volume: &VolumeRef, name: &str, comment: &str) -> Result<()> {
        info!(volume = %volume.name, snapshot = name, "creating ONTAP snapshot");
        self.submit(
            Method::POST,
            &format!("create snapshot {} of volume {}", name, volume.name),
            &format!("/storage/volumes/{}/snapshots", volume.uuid),
            &[],
            Some(json!({ "name": name, "comment": comment })),
        )
        .await
    }

    async fn delete_snapshot(&self, volume: &VolumeRef, snapshot: &SnapshotInfo) -> Result<()> {
        info!(volume = %volume.name, snapshot = %snapshot.name, "deleting ONTAP snapshot");
        self.submit(
            Method::DELETE,
            &format!("delete snapshot {} of volume {}", snapshot.name, volume.name),
            &format!("/storage/volumes/{}/snapshots/{}", volume.uuid, snapshot.uuid),
            &[],
            None,
        )
        .await
    }

    async fn restore_snapshot(&self, volume: &VolumeRef, snapshot: &SnapshotInfo) -> Result<()> {
        info!(volume = %volume.name, snapshot = %snapshot.name, "restoring volume from snapshot");
        self.submit(
            Method::PATCH,
            &format!("restore volume {} to snapshot {}", volume.name, snapshot.name),
            &format!("/storage/volumes/{}", volume.uuid),
            &[],
            Some(json!({ "restore_to": { "snapshot": { "name": snapshot.name } } })),
        )
        .await
    }

    async fn create_clone(&self, request: &CloneRequest) -> Result<VolumeRef> {
        let operation = format!(
            "create clone {} from {}@{}",
            request.name, request.parent.name, request.snapshot
        );
        info!(clone = %request.name, snapshot = %request.snapshot, "creating FlexClone");

        self.submit(
            Method::POST,
            &operation,
            "/storage/volumes",
            &[],
            Some(json!({
                "name": request.name,
                "svm": { "name": request.parent.svm },
                "clone": {
                    "parent_volume": { "name": request.parent.name },
                    "parent_snapshot": { "name": request.snapshot },
                    "is_flexclone": true,
                    "type": "rw",
                },
                "nas": { "path": request.export_path },
            })),
        )
        .await?;

        let mut found = self.find_volumes(&request.name).await?;
        match found.len() {
            1 => Ok(found.remove(0)),
            n => Err(Error::remote(
                SYSTEM,
                operation,
                format!("expected one clone volume named {} after creation, found {}", request.name, n),
            )),
        }
    }

    async fn delete_clone(&self, clone: &VolumeRef) -> Result<()> {
        info!(clone = %clone.name, "deleting FlexClone volume");
        self.submit(
            Method::DELETE,
            &format!("delete clone volume {}", clone.name),
            &format!("/storage/volumes/{}", clone.uuid),
            &[("force", "true")],
            None,
        )
        .await
    }

    async fn object_clone(
        &self,
        volume: &VolumeRef,
        source: &str,
        destination: &str,
    ) -> Result<()> {
        info!(volume = %volume.name, source, destination, "cloning file");
        self.submit(
            Method::POST,
            &format!("clone file {} to {} on volume {}", source, destination, volume.name),
            "/storage/file/clone",
            &[],
            Some(json!({
                "volume": { "name": volume.name, "uuid": volume.uuid },
                "source_path": source,
                "destination_path": destination,
                "overwrite_destination": false,
            })),
        )
        .await
    }

    fn controller_name(&self) -> &str {
        &self.host
    }
}
