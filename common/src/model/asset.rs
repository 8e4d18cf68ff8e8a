use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::network::target::TargetScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Network,
    List,
    Single,
}

impl From<&TargetScope> for AssetKind {
    fn from(scope: &TargetScope) -> Self {
        match scope {
            TargetScope::Network(_) => Self::Network,
            TargetScope::HostList(_) => Self::List,
            TargetScope::Single(_) => Self::Single,
        }
    }
}

/// A named group of targets within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(alias = "asset_id")]
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub target: String,
    #[serde(default, alias = "associated_host")]
    pub host_ids: BTreeSet<u32>,
}
