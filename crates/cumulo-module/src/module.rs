//! Module descriptors and RPCs
//!
//! A module is a named, versioned bundle of entities, mappers and RPCs with
//! a declared dependency list and the SQL run on install/uninstall. Modules
//! are plain values registered at process start; nothing is discovered at
//! runtime.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::error::ModuleResult;
use crate::mapper::Mapper;

/// Lock behavior checked before an RPC runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreTransactionCheck {
    /// Run regardless of transaction state.
    NoCheck,
    /// Wait until the per-database lock is available, then take it.
    WaitForLock,
    /// Fail unless the caller already holds the lock.
    FailIfNotLocked,
}

/// Lock behavior applied after an RPC completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostTransactionCheck {
    /// Leave the lock as-is.
    NoCheck,
    /// Release the lock only when the RPC succeeded.
    UnlockIfSucceed,
    /// Release the lock regardless of outcome.
    UnlockAlways,
}

/// A remote-callable procedure exposed by a module.
#[async_trait]
pub trait Rpc: Send + Sync {
    /// The SQL-visible function name (snake_case).
    fn name(&self) -> &str;

    /// Lock check before the call.
    fn pre_transaction_check(&self) -> PreTransactionCheck {
        PreTransactionCheck::NoCheck
    }

    /// Lock behavior after the call.
    fn post_transaction_check(&self) -> PostTransactionCheck {
        PostTransactionCheck::NoCheck
    }

    /// Execute the procedure. Returns one JSON object per output row.
    async fn call(&self, ctx: &Context, args: &[Value]) -> ModuleResult<Vec<Value>>;
}

/// A named, versioned bundle of entities, mappers and RPCs.
pub struct ModuleDescriptor {
    name: String,
    version: String,
    dependencies: Vec<String>,
    tables: Vec<String>,
    mappers: Vec<Arc<dyn Mapper>>,
    rpcs: Vec<Arc<dyn Rpc>>,
    install_sql: Vec<String>,
    remove_sql: Vec<String>,
}

impl ModuleDescriptor {
    /// Create an empty module descriptor.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
            tables: Vec::new(),
            mappers: Vec::new(),
            rpcs: Vec::new(),
            install_sql: Vec::new(),
            remove_sql: Vec::new(),
        }
    }

    /// Declare a dependency on another module.
    ///
    /// An unversioned name is pinned to the platform version at
    /// registration time.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Declare a table this module provides.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.tables.push(table.into());
        self
    }

    /// Attach a mapper.
    #[must_use]
    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.mappers.push(mapper);
        self
    }

    /// Attach an RPC.
    #[must_use]
    pub fn with_rpc(mut self, rpc: Arc<dyn Rpc>) -> Self {
        self.rpcs.push(rpc);
        self
    }

    /// Add a statement to run on install, in order.
    #[must_use]
    pub fn with_install_sql(mut self, sql: impl Into<String>) -> Self {
        self.install_sql.push(sql.into());
        self
    }

    /// Add a statement to run on uninstall, in order.
    #[must_use]
    pub fn with_remove_sql(mut self, sql: impl Into<String>) -> Self {
        self.remove_sql.push(sql.into());
        self
    }

    /// The bare module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The `name@version` form used everywhere modules are referenced.
    #[must_use]
    pub fn versioned_name(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Declared dependencies (versioned after registration).
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub(crate) fn set_dependencies(&mut self, dependencies: Vec<String>) {
        self.dependencies = dependencies;
    }

    /// Tables this module provides.
    #[must_use]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// The module's mappers.
    #[must_use]
    pub fn mappers(&self) -> &[Arc<dyn Mapper>] {
        &self.mappers
    }

    /// The module's RPCs.
    #[must_use]
    pub fn rpcs(&self) -> &[Arc<dyn Rpc>] {
        &self.rpcs
    }

    /// Statements run on install.
    #[must_use]
    pub fn install_sql(&self) -> &[String] {
        &self.install_sql
    }

    /// Statements run on uninstall.
    #[must_use]
    pub fn remove_sql(&self) -> &[String] {
        &self.remove_sql
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .field("tables", &self.tables)
            .field("mappers", &self.mappers.len())
            .field("rpcs", &self.rpcs.len())
            .finish()
    }
}
