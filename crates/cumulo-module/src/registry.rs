//! Static module registry
//!
//! The registry is built once at process start from an explicit list of
//! module descriptors. Lookups are by versioned name; bare names resolve
//! against the platform version. Unknown names come back with a
//! closest-match suggestion.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ModuleError, ModuleResult};
use crate::module::ModuleDescriptor;

/// The platform module every other module implicitly depends on.
pub const PLATFORM_MODULE: &str = "cumulo_platform";

/// Registry of every module compiled into this process.
pub struct ModuleRegistry {
    platform_version: String,
    modules: Vec<Arc<ModuleDescriptor>>,
    by_name: HashMap<String, usize>,
}

impl ModuleRegistry {
    /// Create an empty registry for the given platform version.
    pub fn new(platform_version: impl Into<String>) -> Self {
        Self {
            platform_version: platform_version.into(),
            modules: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// The platform version bare dependency names are pinned to.
    #[must_use]
    pub fn platform_version(&self) -> &str {
        &self.platform_version
    }

    /// Register a module.
    ///
    /// Unversioned dependency names are pinned to the platform version, and
    /// every module other than the platform module itself gains an implicit
    /// platform dependency.
    pub fn register(&mut self, mut module: ModuleDescriptor) -> ModuleResult<()> {
        let platform_dep = format!("{PLATFORM_MODULE}@{}", self.platform_version);
        let mut dependencies: Vec<String> = module
            .dependencies()
            .iter()
            .map(|dep| {
                if dep.contains('@') {
                    dep.clone()
                } else {
                    format!("{dep}@{}", self.platform_version)
                }
            })
            .collect();
        if module.name() != PLATFORM_MODULE && !dependencies.contains(&platform_dep) {
            dependencies.push(platform_dep);
        }
        module.set_dependencies(dependencies);

        let versioned = module.versioned_name();
        if self.by_name.contains_key(&versioned) {
            return Err(ModuleError::DuplicateModule { name: versioned });
        }
        self.by_name.insert(versioned, self.modules.len());
        self.modules.push(Arc::new(module));
        Ok(())
    }

    /// Look up a module by its exact versioned name.
    #[must_use]
    pub fn get(&self, versioned_name: &str) -> Option<&Arc<ModuleDescriptor>> {
        self.by_name
            .get(versioned_name)
            .map(|idx| &self.modules[*idx])
    }

    /// Resolve a bare or versioned name to a registered module.
    ///
    /// Unknown names fail with the closest registered name as a suggestion.
    pub fn resolve(&self, name: &str) -> ModuleResult<Arc<ModuleDescriptor>> {
        let versioned = if name.contains('@') {
            name.to_string()
        } else {
            format!("{name}@{}", self.platform_version)
        };
        match self.get(&versioned) {
            Some(module) => Ok(module.clone()),
            None => Err(ModuleError::ModuleNotFound {
                name: versioned.clone(),
                suggestion: self.closest_name(&versioned),
            }),
        }
    }

    /// Every registered module, in registration order.
    #[must_use]
    pub fn all(&self) -> &[Arc<ModuleDescriptor>] {
        &self.modules
    }

    fn closest_name(&self, name: &str) -> Option<String> {
        self.modules
            .iter()
            .map(|m| m.versioned_name())
            .min_by_key(|candidate| levenshtein(name, candidate))
    }
}

/// Edit distance between two names, for unknown-module suggestions.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new("0.4.0");
        registry
            .register(ModuleDescriptor::new(PLATFORM_MODULE, "0.4.0"))
            .unwrap();
        for name in names {
            registry
                .register(ModuleDescriptor::new(*name, "0.4.0"))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_resolve_bare_and_versioned() {
        let registry = registry_with(&["object_storage"]);
        assert_eq!(
            registry.resolve("object_storage").unwrap().versioned_name(),
            "object_storage@0.4.0"
        );
        assert!(registry.resolve("object_storage@0.4.0").is_ok());
        assert!(registry.resolve("object_storage@0.3.0").is_err());
    }

    #[test]
    fn test_unknown_name_gets_suggestion() {
        let registry = registry_with(&["object_storage", "message_queue"]);
        let err = registry.resolve("object_storge").unwrap_err();
        match err {
            ModuleError::ModuleNotFound { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("object_storage@0.4.0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_platform_dependency_implicit() {
        let registry = registry_with(&["object_storage"]);
        let module = registry.resolve("object_storage").unwrap();
        assert!(module
            .dependencies()
            .contains(&format!("{PLATFORM_MODULE}@0.4.0")));

        let platform = registry.resolve(PLATFORM_MODULE).unwrap();
        assert!(platform.dependencies().is_empty());
    }

    #[test]
    fn test_bare_dependency_pinned() {
        let mut registry = ModuleRegistry::new("0.4.0");
        registry
            .register(ModuleDescriptor::new("account", "0.4.0"))
            .unwrap();
        registry
            .register(ModuleDescriptor::new("object_storage", "0.4.0").with_dependency("account"))
            .unwrap();
        let module = registry.resolve("object_storage").unwrap();
        assert!(module.dependencies().contains(&"account@0.4.0".to_string()));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = registry_with(&["object_storage"]);
        let err = registry
            .register(ModuleDescriptor::new("object_storage", "0.4.0"))
            .unwrap_err();
        assert!(matches!(err, ModuleError::DuplicateModule { .. }));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
