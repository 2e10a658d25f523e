use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{ModelError, NodeId};

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeRole {
    /// Holds shard copies.
    Data,
    /// Runs ingest pipelines.
    Ingest,
    /// Eligible to be elected master.
    Master,
}

impl NodeRole {
    /// Single-letter abbreviation used in node descriptions.
    pub fn abbreviation(&self) -> char {
        match self {
            NodeRole::Data => 'd',
            NodeRole::Ingest => 'i',
            NodeRole::Master => 'm',
        }
    }
}

impl FromStr for NodeRole {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data" => Ok(NodeRole::Data),
            "ingest" => Ok(NodeRole::Ingest),
            "master" => Ok(NodeRole::Master),
            _ => Err(ModelError::UnknownRole(s.to_string())),
        }
    }
}

/// A member of the cluster as seen by the coordination layer.
///
/// Equality is structural: a node that restarted with a different address is
/// a different node even if it kept its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryNode {
    pub id: NodeId,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub roles: BTreeSet<NodeRole>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl DiscoveryNode {
    pub fn new(id: NodeId, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            roles: BTreeSet::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.roles.insert(role);
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = NodeRole>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_data_node(&self) -> bool {
        self.roles.contains(&NodeRole::Data)
    }

    /// Compact description used in log lines and task descriptions.
    ///
    /// Format: `{name}{id}{address}{roles}`.
    pub fn describe_without_attributes(&self) -> String {
        let mut out = String::new();
        self.append_description_without_attributes(&mut out);
        out
    }

    pub fn append_description_without_attributes(&self, out: &mut String) {
        out.push('{');
        out.push_str(&self.name);
        out.push_str("}{");
        out.push_str(self.id.as_str());
        out.push_str("}{");
        out.push_str(&self.address);
        out.push_str("}{");
        out.extend(self.roles.iter().map(NodeRole::abbreviation));
        out.push('}');
    }
}

impl fmt::Display for DiscoveryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe_without_attributes())?;
        if !self.attributes.is_empty() {
            f.write_str("{")?;
            for (i, (k, v)) in self.attributes.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}
