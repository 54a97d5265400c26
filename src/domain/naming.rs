//! Naming and correlation scheme
//!
//! No local database exists, so the names below are the only place where the
//! relationship between Proxmox storage pools and ONTAP volumes, snapshots and
//! clones is recorded. All functions are pure and deterministic given their
//! inputs; timestamps are always passed in by the caller.

use chrono::{DateTime, Utc};

/// Suffix appended to a pool id to form the id of its mounted clone pool
pub const CLONE_POOL_SUFFIX: &str = "-CLONE";

/// Infix between a volume name and the snapshot it was cloned from
pub const CLONE_VOLUME_INFIX: &str = "_clone_";

/// Prefix of every snapshot created by this tool
pub const SNAPSHOT_PREFIX: &str = "proxmox_snapshot_";

/// Marker inserted into cloned disk file names
pub const DISK_CLONE_MARKER: &str = "-snapshot-";

/// Directory under a pool's export holding VM disk images
pub const IMAGES_DIR: &str = "images";

/// Sortable UTC timestamp used in snapshot and disk clone names
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S+0000";

/// Format a timestamp for use in generated names.
///
/// Fixed width and zero padded, so lexical order equals chronological order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Volume name backing a pool, derived from the pool's NFS export path
pub fn volume_name_from_export(export: &str) -> Option<String> {
    let name = export.trim().trim_matches('/');
    if name.is_empty() || name.contains('/') {
        None
    } else {
        Some(name.to_string())
    }
}

/// Id of the clone pool a mounted snapshot of `pool_id` is registered under
pub fn clone_pool_id(pool_id: &str) -> String {
    format!("{}{}", pool_id, CLONE_POOL_SUFFIX)
}

/// Source pool id of a clone pool, or `None` if the id is not a clone pool id
pub fn source_pool_id(clone_pool_id: &str) -> Option<&str> {
    clone_pool_id
        .strip_suffix(CLONE_POOL_SUFFIX)
        .filter(|source| !source.is_empty())
}

pub fn is_clone_pool_id(pool_id: &str) -> bool {
    source_pool_id(pool_id).is_some()
}

/// Config section holding controller credentials for a pool.
///
/// Clone pools share the credentials of the pool they were mounted from.
pub fn config_section(pool_id: &str) -> &str {
    source_pool_id(pool_id).unwrap_or(pool_id)
}

/// Name of the clone volume created when mounting `snapshot` of `volume`.
///
/// ONTAP volume names accept only ASCII alphanumerics and underscores, so
/// every other snapshot character is replaced by `_`.
pub fn clone_volume_name(volume: &str, snapshot: &str) -> String {
    let snapshot: String = snapshot
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{}{}{}", volume, CLONE_VOLUME_INFIX, snapshot)
}

/// Source volume a clone volume was created from, or `None` if the name does
/// not follow the clone volume scheme
pub fn clone_source_volume(clone_volume: &str) -> Option<&str> {
    clone_volume
        .rsplit_once(CLONE_VOLUME_INFIX)
        .filter(|(source, snapshot)| !source.is_empty() && !snapshot.is_empty())
        .map(|(source, _)| source)
}

/// NFS junction path of a clone volume
pub fn clone_export_path(clone_volume: &str) -> String {
    format!("/{}", clone_volume)
}

/// Name of a storage snapshot taken at `at`
pub fn snapshot_name(at: DateTime<Utc>) -> String {
    format!("{}{}", SNAPSHOT_PREFIX, timestamp(at))
}

pub fn snapshot_comment(pool_id: &str) -> String {
    format!("Snapshot of Proxmox storage {}", pool_id)
}

/// Whether a snapshot was created by this tool
pub fn is_managed_snapshot(name: &str) -> bool {
    name.starts_with(SNAPSHOT_PREFIX)
}

/// Path of a disk image relative to the volume root
pub fn disk_image_path(disk: &str) -> String {
    format!("{}/{}", IMAGES_DIR, disk)
}

/// Volume-relative path of the copy-on-write clone of `disk` taken at `stamp`.
///
/// `100/vm-100-disk-0.qcow2` becomes
/// `images/100/vm-100-disk-0-snapshot-<stamp>.qcow2`, next to the source.
pub fn disk_clone_path(disk: &str, stamp: &str) -> String {
    let (dir, file) = match disk.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, disk),
    };
    let (stem, ext) = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file, None),
    };

    let mut name = format!("{}{}{}", stem, DISK_CLONE_MARKER, stamp);
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(ext);
    }

    match dir {
        Some(dir) => format!("{}/{}/{}", IMAGES_DIR, dir, name),
        None => format!("{}/{}", IMAGES_DIR, name),
    }
}
