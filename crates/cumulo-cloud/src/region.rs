//! Region types
//!
//! A `Region` names one provider region; a `RegionSet` is the set of regions
//! enabled for an account together with the account default. Entities whose
//! key shape includes a region fall back to the account default when none is
//! set on the row.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CloudError, CloudResult};

/// A provider region name (e.g. `us-east-2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Create a region from its provider name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the region name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Region {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Region {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// The set of regions enabled for an account, with one account default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSet {
    enabled: Vec<Region>,
    default_region: Region,
}

impl RegionSet {
    /// Create a region set.
    ///
    /// The default region must be one of the enabled regions.
    pub fn new(enabled: Vec<Region>, default_region: Region) -> CloudResult<Self> {
        if !enabled.contains(&default_region) {
            return Err(CloudError::RegionNotEnabled {
                region: default_region,
            });
        }
        Ok(Self {
            enabled,
            default_region,
        })
    }

    /// Create a region set with a single enabled region, used as the default.
    pub fn single(region: impl Into<Region>) -> Self {
        let region = region.into();
        Self {
            enabled: vec![region.clone()],
            default_region: region,
        }
    }

    /// The account default region.
    #[must_use]
    pub fn default_region(&self) -> &Region {
        &self.default_region
    }

    /// All enabled regions.
    #[must_use]
    pub fn enabled(&self) -> &[Region] {
        &self.enabled
    }

    /// Check whether a region is enabled.
    #[must_use]
    pub fn is_enabled(&self, region: &Region) -> bool {
        self.enabled.contains(region)
    }

    /// Iterate over the enabled regions.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.enabled.iter()
    }
}
