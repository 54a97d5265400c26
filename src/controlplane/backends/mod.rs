//! Storage Controller Adapters
//!
//! Provides the ONTAP adapter and the factory that hands out one client per
//! storage pool, built from that pool's config section.

pub mod ontap;

#[cfg(test)]
pub(crate) mod memory;

pub use ontap::*;

use crate::config::Config;
use crate::domain::ports::{ControllerProvider, StorageController};
use crate::error::Result;
use std::sync::Arc;
use tracing::debug;

/// Factory for creating storage controller clients from configuration
pub struct BackendFactory {
    config: Arc<Config>,
}

impl BackendFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl ControllerProvider for BackendFactory {
    fn controller_for(&self, pool_id: &str) -> Result<Arc<dyn StorageController>> {
        let access = self.config.controller_access(pool_id)?;
        debug!(pool = pool_id, controller = %access.host, "creating ONTAP client");
        Ok(Arc::new(OntapClient::new(access)?))
    }
}
