use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A resource instance reconstructed from the IaC tool's state file.
///
/// Never authoritative: it reflects the state file at the moment it was read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeployedResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub provider: String,
    pub attributes: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployedState {
    pub resources: Vec<DeployedResource>,
    pub outputs: BTreeMap<String, Value>,
}

impl DeployedState {
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a DeployedResource> + 'a {
        self.resources.iter().filter(move |resource| resource.resource_type == resource_type)
    }
}
