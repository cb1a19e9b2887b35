//! Cloud client traits
//!
//! The seam between the engine and a concrete provider SDK. A
//! [`CloudClient`] is an authenticated, region-scoped handle; resource
//! mappers downcast it through [`CloudClient::as_any`] to reach the concrete
//! provider API surface they were written against.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CloudResult;
use crate::region::Region;

/// An authenticated handle to one provider region.
///
/// Implementations wrap a concrete provider SDK client. Construction and
/// credential acquisition live behind [`CloudClientFactory`].
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// The region this client is scoped to.
    fn region(&self) -> &Region;

    /// Test the connection to the provider.
    async fn test_connection(&self) -> CloudResult<()>;

    /// Dispose of client resources.
    ///
    /// Called when the client is being removed from the pool.
    async fn dispose(&self) -> CloudResult<()>;

    /// Check if the client is currently healthy.
    ///
    /// This is a lightweight check, different from `test_connection` which
    /// may perform a more thorough validation.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Downcast support for resource mappers that need the concrete client.
    fn as_any(&self) -> &dyn Any;
}

/// Factory for opening region-scoped clients.
///
/// The pool calls this on first use of a region and again when a cached
/// client reports itself unhealthy.
#[async_trait]
pub trait CloudClientFactory: Send + Sync {
    /// Open an authenticated client for the given region.
    async fn open(&self, region: &Region) -> CloudResult<Arc<dyn CloudClient>>;
}
