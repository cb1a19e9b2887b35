//! Region-keyed client pool
//!
//! One `ClientPool` owns every open provider client for a process. Clients
//! are opened lazily on first use of a region, health-checked before reuse,
//! and disposed explicitly on shutdown. A handle that reports itself
//! unhealthy is disposed and reopened through the factory; there is no
//! implicit rebuild path.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::CloudResult;
use crate::region::Region;
use crate::traits::{CloudClient, CloudClientFactory};

/// Region-keyed cache of open provider clients.
pub struct ClientPool {
    factory: Arc<dyn CloudClientFactory>,
    clients: RwLock<HashMap<Region, Arc<dyn CloudClient>>>,
}

impl ClientPool {
    /// Create a pool backed by the given factory.
    pub fn new(factory: Arc<dyn CloudClientFactory>) -> Self {
        Self {
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Get the client for a region, opening it on first use.
    ///
    /// A cached client is health-checked before being handed out; an
    /// unhealthy one is disposed and a fresh client opened in its place.
    pub async fn client(&self, region: &Region) -> CloudResult<Arc<dyn CloudClient>> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(region) {
                if client.is_healthy() {
                    return Ok(client.clone());
                }
            }
        }

        let mut clients = self.clients.write().await;
        // A concurrent caller may have opened the client while we waited on
        // the write lock.
        if let Some(client) = clients.get(region) {
            if client.is_healthy() {
                return Ok(client.clone());
            }
            debug!(region = %region, "Disposing unhealthy client");
            if let Err(e) = client.dispose().await {
                warn!(region = %region, error = %e, "Failed to dispose unhealthy client");
            }
            clients.remove(region);
        }

        debug!(region = %region, "Opening cloud client");
        let client = self.factory.open(region).await?;
        clients.insert(region.clone(), client.clone());
        Ok(client)
    }

    /// Number of currently open clients.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Check whether any clients are open.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Dispose every open client and clear the pool.
    pub async fn shutdown(&self) {
        let mut clients = self.clients.write().await;
        for (region, client) in clients.drain() {
            if let Err(e) = client.dispose().await {
                warn!(region = %region, error = %e, "Failed to dispose client on shutdown");
            }
        }
    }
}
