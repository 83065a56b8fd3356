use crate::error::WatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of backend record being monitored.
///
/// Each variant carries its own entry in the interval table
/// (see [`crate::domain::policy`]); there is no catch-all variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Flight,
    Hotel,
    Visa,
    Insurance,
    Package,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 5] = [
        ResourceCategory::Flight,
        ResourceCategory::Hotel,
        ResourceCategory::Visa,
        ResourceCategory::Insurance,
        ResourceCategory::Package,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Flight => "flight",
            ResourceCategory::Hotel => "hotel",
            ResourceCategory::Visa => "visa",
            ResourceCategory::Insurance => "insurance",
            ResourceCategory::Package => "package",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceCategory {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| WatchError::UnknownCategory(trimmed.to_string()))
    }
}
