//! # Module Framework
//!
//! The contract every cloud resource kind plugs into: a typed entity, a
//! bidirectional mapper between its database table and its provider API, and
//! a module bundling entities, mappers and RPCs behind a declared dependency
//! list.
//!
//! ## Architecture
//!
//! - [`Entity`] - one row of desired/observed state for one resource kind
//! - [`EntityMapper`] - the typed db/cloud CRUD + diff contract for one kind
//! - [`Mapper`] - the erased, object-safe form the engine walks
//! - [`ModuleDescriptor`] - a named, versioned bundle with dependencies
//! - [`ModuleRegistry`] - the static registry built at process start
//! - [`sort_modules`] - stable topological install/uninstall ordering
//! - [`Context`] - the per-operation handle with memoized snapshots
//! - [`find_diff`] - the three-way diff between the two sides
//!
//! Modules register explicitly at startup; there is no runtime discovery.
//! Everything an engine pass touches flows through the [`Context`], which is
//! built fresh per operation and never shared between operations.

pub mod compare;
pub mod context;
pub mod depsort;
pub mod diff;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod module;
pub mod record;
pub mod registry;

pub use compare::json_eq_normalized;
pub use context::{Context, Memo, Side};
pub use depsort::sort_modules;
pub use diff::{find_diff, ChangedPair, Diff};
pub use entity::{generate_id, id_fields, Entity, EntityId, IdFields};
pub use error::{ModuleError, ModuleResult};
pub use mapper::{EntityMapper, Mapper, SourceOfTruth, TypedMapper, UpdateOrReplace};
pub use module::{ModuleDescriptor, PostTransactionCheck, PreTransactionCheck, Rpc};
pub use record::Record;
pub use registry::{ModuleRegistry, PLATFORM_MODULE};
