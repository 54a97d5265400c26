//! Command results and their rendering on stdout

use crate::controlplane::{ClonedDisk, MountedSnapshot, UnmountedSnapshot};
use crate::domain::ports::SnapshotInfo;
use crate::error::{Error, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt::Write;

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Result of one command
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Outcome {
    SnapshotCreated { pool: String, snapshot: String },
    SnapshotList { pool: String, snapshots: Vec<SnapshotInfo> },
    SnapshotDeleted { pool: String, snapshot: String },
    SnapshotRestored { pool: String, snapshot: String },
    Mounted(MountedSnapshot),
    Unmounted(UnmountedSnapshot),
    Volume { pool: String, volume: serde_json::Value },
    DisksCloned { vm: u32, disks: Vec<ClonedDisk> },
}

impl Outcome {
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => self.render_text(),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Yaml => serde_yaml::to_string(self).map_err(|e| Error::Output(e.to_string())),
        }
    }

    fn render_text(&self) -> Result<String> {
        let text = match self {
            Outcome::SnapshotCreated { pool, snapshot } => {
                format!("Created snapshot {} of storage {}", snapshot, pool)
            }
            Outcome::SnapshotList { pool, snapshots } => {
                if snapshots.is_empty() {
                    format!("No snapshots of storage {}", pool)
                } else {
                    let mut text = String::new();
                    for snapshot in snapshots {
                        let _ = writeln!(
                            text,
                            "{}\t{}",
                            snapshot.name,
                            snapshot.create_time.as_deref().unwrap_or("-")
                        );
                    }
                    text.trim_end().to_string()
                }
            }
            Outcome::SnapshotDeleted { pool, snapshot } => {
                format!("Deleted snapshot {} of storage {}", snapshot, pool)
            }
            Outcome::SnapshotRestored { pool, snapshot } => {
                format!("Restored storage {} to snapshot {}", pool, snapshot)
            }
            Outcome::Mounted(mounted) => format!(
                "Mounted snapshot {} of storage {} as storage {} (volume {}, export {})",
                mounted.snapshot, mounted.pool, mounted.clone_pool, mounted.clone_volume, mounted.export
            ),
            Outcome::Unmounted(unmounted) => format!(
                "Unmounted storage {} and destroyed volume {}",
                unmounted.clone_pool, unmounted.clone_volume
            ),
            Outcome::Volume { volume, .. } => serde_json::to_string_pretty(volume)?,
            Outcome::DisksCloned { vm, disks } => {
                if disks.is_empty() {
                    format!("VM {} has no disks to clone", vm)
                } else {
                    let mut text = String::new();
                    for disk in disks {
                        let _ = writeln!(text, "{}\t{}:{}", disk.slot, disk.pool, disk.destination);
                    }
                    let _ = write!(
                        text,
                        "Run 'qm disk rescan --vmid {}' to make the clones visible in Proxmox",
                        vm
                    );
                    text
                }
            }
        };
        Ok(text)
    }
}
