//! Graph assembly and structural validation.
//!
//! Validation never rejects a graph on its own. It returns the complete list of issues and
//! leaves the decision to the caller (see `ValidationConfig::strict`).

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::architecture::{ArchitectureGraph, GraphEdge, GraphNode};

/// Node types accepted regardless of which capabilities are registered.
pub const BASELINE_ALLOWED_TYPES: &[&str] = &[
    "aws_lambda",
    "aws_apigatewayv2",
    "aws_dynamodb",
    "aws_sqs",
    "aws_ecs",
    "aws_rds",
    "aws_elasticache",
    "aws_s3",
    "aws_vpc",
    "aws_cloudfront",
    "aws_sns",
    "aws_iam_role",
    "aws_security_group",
    "aws_route53",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DisallowedType,
    DuplicateNodeId,
    MissingSource,
    MissingTarget,
    SelfLoop,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    /// Offending node id, or the edge endpoint that triggered the issue.
    pub subject: String,
    /// Position of the edge in the input list for edge issues.
    pub edge_index: Option<usize>,
    pub message: String,
}

impl ValidationIssue {
    fn node(kind: IssueKind, subject: &str, message: String) -> Self {
        Self { kind, subject: subject.to_string(), edge_index: None, message }
    }

    fn edge(kind: IssueKind, index: usize, subject: &str, message: String) -> Self {
        Self { kind, subject: subject.to_string(), edge_index: Some(index), message }
    }
}

#[derive(Clone, Debug)]
pub struct GraphValidator {
    allowed_types: BTreeSet<String>,
}

impl Default for GraphValidator {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl GraphValidator {
    /// The allow-list is the baseline set plus any extra types, usually the node types
    /// of every registered capability.
    pub fn new<I, S>(extra_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed_types: BTreeSet<String> =
            BASELINE_ALLOWED_TYPES.iter().map(|value| value.to_string()).collect();
        allowed_types.extend(extra_types.into_iter().map(Into::into));
        Self { allowed_types }
    }

    pub fn is_allowed(&self, node_type: &str) -> bool {
        self.allowed_types.contains(node_type)
    }

    pub fn allowed_types(&self) -> impl Iterator<Item = &str> {
        self.allowed_types.iter().map(String::as_str)
    }

    pub fn assemble(
        &self,
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
    ) -> (ArchitectureGraph, Vec<ValidationIssue>) {
        let graph = ArchitectureGraph { nodes, edges };
        let issues = self.validate(&graph);
        (graph, issues)
    }

    /// Nodes are checked first, then edges, each in input order.
    pub fn validate(&self, graph: &ArchitectureGraph) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut seen: HashSet<&str> = HashSet::with_capacity(graph.nodes.len());

        for node in &graph.nodes {
            if !self.is_allowed(&node.node_type) {
                issues.push(ValidationIssue::node(
                    IssueKind::DisallowedType,
                    &node.id,
                    format!("Node '{}' uses disallowed service type: {}", node.id, node.node_type),
                ));
            }
            if !seen.insert(node.id.as_str()) {
                issues.push(ValidationIssue::node(
                    IssueKind::DuplicateNodeId,
                    &node.id,
                    format!("Duplicate node ID: {}", node.id),
                ));
            }
        }

        for (index, edge) in graph.edges.iter().enumerate() {
            if !seen.contains(edge.source.as_str()) {
                issues.push(ValidationIssue::edge(
                    IssueKind::MissingSource,
                    index,
                    &edge.source,
                    format!("Edge references non-existent source node: {}", edge.source),
                ));
            }
            if !seen.contains(edge.target.as_str()) {
                issues.push(ValidationIssue::edge(
                    IssueKind::MissingTarget,
                    index,
                    &edge.target,
                    format!("Edge references non-existent target node: {}", edge.target),
                ));
            }
            if edge.source == edge.target {
                issues.push(ValidationIssue::edge(
                    IssueKind::SelfLoop,
                    index,
                    &edge.source,
                    format!("Self-loop detected on node: {}", edge.source),
                ));
            }
        }

        if issues.is_empty() {
            tracing::debug!(
                event_name = "graph.validation.passed",
                nodes = graph.nodes.len(),
                edges = graph.edges.len(),
                "graph validation passed"
            );
        } else {
            tracing::warn!(
                event_name = "graph.validation.issues",
                issue_count = issues.len(),
                "graph validation found issues"
            );
        }

        issues
    }
}
