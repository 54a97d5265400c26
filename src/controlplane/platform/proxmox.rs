//! Proxmox VE Platform Adapter
//!
//! Talks to the Proxmox VE JSON API (`/api2/json`) with a ticket session.
//! VM power operations return a task UPID which is polled until the task
//! stops.

use crate::config::{self, ProxmoxAccess};
use crate::controlplane::retry::{retry_reads, transport_error};
use crate::domain::ports::{StoragePool, VirtualizationManager, VmDisk, VmInfo, VmStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

const SYSTEM: &str = "Proxmox VE";

/// Default Proxmox VE API port
pub const DEFAULT_PORT: u16 = 8006;

/// Config key prefixes of disk slots
const DISK_BUSES: &[&str] = &["ide", "sata", "scsi", "virtio"];

/// Image formats that can be cloned at file level
const DISK_FORMATS: &[&str] = &["qcow2", "raw", "vmdk"];

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct TicketData {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf_token: String,
}

#[derive(Debug, Deserialize)]
struct ClusterResource {
    vmid: Option<u32>,
    node: Option<String>,
    name: Option<String>,
    status: Option<String>,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct StorageRecord {
    storage: String,
    #[serde(rename = "type")]
    pool_type: String,
    server: Option<String>,
    export: Option<String>,
    content: Option<String>,
}

impl From<StorageRecord> for StoragePool {
    fn from(record: StorageRecord) -> Self {
        StoragePool {
            id: record.storage,
            pool_type: record.pool_type,
            server: record.server,
            export: record.export,
            content: record.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
    exitstatus: Option<String>,
}

/// Authenticated session
struct Session {
    ticket: String,
    csrf_token: String,
}

// =============================================================================
// Proxmox Client
// =============================================================================

/// Client for a Proxmox VE cluster
pub struct ProxmoxClient {
    base_url: String,
    client: reqwest::Client,
    session: Session,
    task_timeout: Duration,
    retry_window: Duration,
    poll_interval: Duration,
}

impl ProxmoxClient {
    /// Log in and open a session
    pub async fn connect(access: &ProxmoxAccess) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!access.verify)
            .timeout(Duration::from_secs(60))
            .build()?;
        let base_url = format!("{}/api2/json", config::base_url(&access.host, Some(DEFAULT_PORT)));

        let user = if access.user.contains('@') {
            access.user.clone()
        } else {
            format!("{}@pam", access.user)
        };

        debug!(url = %base_url, user = %user, "logging in to Proxmox VE");
        let operation = format!("log in as {}", user);
        let ticket: TicketData = retry_reads(access.retry_window(), || {
            let request = client
                .post(format!("{}/access/ticket", base_url))
                .form(&[("username", user.as_str()), ("password", access.password.as_str())]);
            let operation = operation.as_str();
            async move { send_for_data(operation, request).await }
        })
        .await?;

        Ok(Self {
            base_url,
            client,
            session: Session {
                ticket: ticket.ticket,
                csrf_token: ticket.csrf_token,
            },
            task_timeout: access.task_timeout(),
            retry_window: access.retry_window(),
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Override the task polling interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mutating = method != Method::GET;
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Cookie", format!("PVEAuthCookie={}", self.session.ticket));
        if mutating {
            request = request.header("CSRFPreventionToken", self.session.csrf_token.as_str());
        }
        request
    }

    /// Idempotent GET, retried on transport failures
    async fn get_data<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T> {
        retry_reads(self.retry_window, || {
            let request = self.request(Method::GET, path);
            async move { send_for_data(operation, request).await }
        })
        .await
    }

    /// Mutating call, never retried
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        operation: &str,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T> {
        debug!(operation, path, "submitting Proxmox VE request");
        let mut request = self.request(method, path);
        if !form.is_empty() {
            request = request.form(form);
        }
        send_for_data(operation, request).await
    }

    /// Poll a task until it stops; a non-OK exit status is an error
    async fn wait_for_task(&self, operation: &str, node: &str, upid: &str) -> Result<()> {
        let deadline = Instant::now() + self.task_timeout;
        let path = format!("/nodes/{}/tasks/{}/status", node, urlencoding::encode(upid));
        debug!(operation, upid, "waiting for Proxmox VE task");

        loop {
            let task: TaskStatus = self.get_data(operation, &path).await?;
            if task.status == "stopped" {
                return match task.exitstatus.as_deref() {
                    Some("OK") | None => Ok(()),
                    Some(exit) => Err(Error::remote(
                        SYSTEM,
                        operation,
                        format!("task {} failed: {}", upid, exit),
                    )),
                };
            }
            if Instant::now() >= deadline {
                return Err(Error::remote(
                    SYSTEM,
                    operation,
                    format!(
                        "task {} still {} after {}s",
                        upid,
                        task.status,
                        self.task_timeout.as_secs()
                    ),
                ));
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Run a VM power action and wait for its task
    async fn power_action(&self, vm: &VmInfo, action: &str, form: &[(&str, &str)]) -> Result<()> {
        let operation = format!("{} vm {} ({})", action, vm.id, vm.name);
        info!(vm = vm.id, node = %vm.node, action, "running VM power action");

        let upid: String = self
            .call(
                Method::POST,
                &operation,
                &format!("/nodes/{}/qemu/{}/status/{}", vm.node, vm.id, action),
                form,
            )
            .await?;
        self.wait_for_task(&operation, &vm.node, &upid).await
    }
}

async fn send_for_data<T: DeserializeOwned>(operation: &str, request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(SYSTEM, operation, e))?;
    let envelope: Envelope<T> = serde_json::from_value(check_status(operation, response).await?)?;
    Ok(envelope.data)
}

async fn check_status(operation: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(SYSTEM, operation, e))?;
    if !status.is_success() {
        let reason = if text.trim().is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, text.trim())
        };
        return Err(Error::remote(SYSTEM, operation, reason));
    }
    Ok(serde_json::from_str(&text)?)
}

/// Parse a VM config entry into a disk, if it is a clonable disk image.
///
/// `scsi0: nfs-data:100/vm-100-disk-0.qcow2,size=32G` yields pool `nfs-data`
/// and path `100/vm-100-disk-0.qcow2`. CD-ROM drives, empty drives and
/// non-file volumes are skipped.
pub fn parse_disk(slot: &str, value: &str) -> Option<VmDisk> {
    let bus = DISK_BUSES.iter().find(|bus| slot.starts_with(*bus))?;
    let index = &slot[bus.len()..];
    if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut parts = value.split(',');
    let volume = parts.next()?.trim();
    if parts.any(|opt| opt.trim() == "media=cdrom") {
        return None;
    }

    let (pool, path) = volume.split_once(':')?;
    let ext = path.rsplit_once('.').map(|(_, ext)| ext)?;
    if pool.is_empty() || !DISK_FORMATS.contains(&ext) {
        return None;
    }

    Some(VmDisk {
        slot: slot.to_string(),
        pool: pool.to_string(),
        path: path.to_string(),
    })
}

#[async_trait]
impl VirtualizationManager for ProxmoxClient {
    async fn list_vm_disks(&self, vm_id: u32) -> Result<VmInfo> {
        let resources: Vec<ClusterResource> = self
            .get_data("list cluster VMs", "/cluster/resources?type=vm")
            .await?;

        let resource = resources
            .into_iter()
            .find(|r| r.kind == "qemu" && r.vmid == Some(vm_id))
            .ok_or_else(|| Error::not_found("VM", vm_id.to_string()))?;
        let node = resource.node.ok_or_else(|| {
            Error::remote(SYSTEM, "list cluster VMs", format!("vm {} has no node", vm_id))
        })?;

        let config: BTreeMap<String, Value> = self
            .get_data(
                &format!("read config of vm {}", vm_id),
                &format!("/nodes/{}/qemu/{}/config", node, vm_id),
            )
            .await?;

        let disks = config
            .iter()
            .filter_map(|(slot, value)| value.as_str().and_then(|v| parse_disk(slot, v)))
            .collect();

        Ok(VmInfo {
            id: vm_id,
            node,
            name: resource.name.unwrap_or_else(|| format!("vm-{}", vm_id)),
            status: resource
                .status
                .as_deref()
                .map(VmStatus::parse)
                .unwrap_or(VmStatus::Unknown),
            disks,
        })
    }

    async fn suspend_vm(&self, vm: &VmInfo) -> Result<()> {
        self.power_action(vm, "suspend", &[("todisk", "1")]).await
    }

    async fn shutdown_vm(&self, vm: &VmInfo) -> Result<()> {
        self.power_action(vm, "shutdown", &[]).await
    }

    async fn resume_vm(&self, vm: &VmInfo) -> Result<()> {
        self.power_action(vm, "start", &[]).await
    }

    async fn register_storage_pool(&self, pool: &StoragePool) -> Result<()> {
        info!(pool = %pool.id, export = ?pool.export, "registering storage pool");

        let mut form = vec![("storage", pool.id.as_str()), ("type", pool.pool_type.as_str())];
        let optional = [
            ("server", &pool.server),
            ("export", &pool.export),
            ("content", &pool.content),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                form.push((key, value.as_str()));
            }
        }

        let _: Value = self
            .call(Method::POST, &format!("register storage {}", pool.id), "/storage", &form)
            .await?;
        Ok(())
    }

    async fn unregister_storage_pool(&self, id: &str) -> Result<()> {
        info!(pool = id, "unregistering storage pool");
        let _: Value = self
            .call(
                Method::DELETE,
                &format!("unregister storage {}", id),
                &format!("/storage/{}", urlencoding::encode(id)),
                &[],
            )
            .await?;
        Ok(())
    }

    async fn list_storage_pools(&self) -> Result<Vec<StoragePool>> {
        let records: Vec<StorageRecord> = self.get_data("list storage", "/storage").await?;
        Ok(records.into_iter().map(StoragePool::from).collect())
    }

    async fn describe_storage_pool(&self, id: &str) -> Result<StoragePool> {
        self.list_storage_pools()
            .await?
            .into_iter()
            .find(|pool| pool.id == id)
            .ok_or_else(|| Error::not_found("StoragePool", id))
    }

    fn platform_name(&self) -> &str {
        SYSTEM
    }
}
