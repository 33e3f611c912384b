use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One provisioned resource in the service-dependency graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(rename = "from")]
    pub source: String,
    #[serde(rename = "to")]
    pub target: String,
    #[serde(default)]
    pub label: String,
}

impl GraphEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self { source: source.into(), target: target.into(), label: label.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl ArchitectureGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Generated IaC files keyed by filename.
///
/// Fragments merged into an existing filename are appended after a newline, so the
/// final text preserves the order in which capabilities produced them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IacBundle {
    files: BTreeMap<String, String>,
}

impl IacBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }

    pub fn merge_fragment(&mut self, filename: &str, fragment: &str) {
        match self.files.get_mut(filename) {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(fragment);
            }
            None => {
                self.files.insert(filename.to_string(), fragment.to_string());
            }
        }
    }

    /// Replaces a whole file, used for boilerplate that is generated once per bundle.
    pub fn insert(&mut self, filename: impl Into<String>, content: impl Into<String>) {
        self.files.insert(filename.into(), content.into());
    }

    pub fn get(&self, filename: &str) -> Option<&str> {
        self.files.get(filename).map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(name, content)| (name.as_str(), content.as_str()))
    }

    pub fn filenames(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_files(self) -> BTreeMap<String, String> {
        self.files
    }
}

/// Immutable snapshot of one synthesis or edit. Edits always produce a new version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureVersion {
    pub project_id: ProjectId,
    pub version: u32,
    pub graph: ArchitectureGraph,
    pub bundle: IacBundle,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ArchitectureGraph, GraphEdge, IacBundle};

    #[test]
    fn fragments_for_same_file_concatenate_in_order() {
        let mut bundle = IacBundle::new();
        bundle.merge_fragment("database.tf", "resource \"a\" \"one\" {}");
        bundle.merge_fragment("storage.tf", "resource \"b\" \"two\" {}");
        bundle.merge_fragment("database.tf", "resource \"a\" \"three\" {}");

        assert_eq!(
            bundle.get("database.tf"),
            Some("resource \"a\" \"one\" {}\nresource \"a\" \"three\" {}")
        );
        assert_eq!(bundle.filenames(), vec!["database.tf".to_string(), "storage.tf".to_string()]);
    }

    #[test]
    fn edges_serialize_with_from_and_to_keys() {
        let edge = GraphEdge::new("api", "fn", "invokes");
        let encoded = serde_json::to_value(&edge).expect("encode edge");
        assert_eq!(encoded, json!({"from": "api", "to": "fn", "label": "invokes"}));
    }

    #[test]
    fn graph_decodes_node_type_field() {
        let graph: ArchitectureGraph = serde_json::from_value(json!({
            "nodes": [{"id": "assets", "type": "aws_s3", "label": "Assets"}],
            "edges": []
        }))
        .expect("decode graph");

        let node = graph.node("assets").expect("node present");
        assert_eq!(node.node_type, "aws_s3");
        assert!(node.config.is_empty());
    }
}
