use std::sync::Arc;

use serde_json::{json, Value};
use stratus_core::config::AgentConfig;
use stratus_core::domain::architecture::{ArchitectureGraph, GraphEdge, GraphNode, IacBundle};
use stratus_core::naming::sanitize_project_name;
use stratus_core::validation::{GraphValidator, ValidationIssue};

use crate::capability::Capability;
use crate::conversation::{
    edit_prompt, rebuild_prompt, system_prompt, tool_results_message, user_prompt,
    EDIT_SYSTEM_PROMPT,
};
use crate::llm::{ChatMessage, LlmClient, LlmError};
use crate::parser::{InvocationExtractor, ToolInvocation};
use crate::registry::CapabilityRegistry;

pub const PROVIDERS_FILE: &str = "providers.tf";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentSettings {
    pub max_rounds: u32,
    pub max_tools: usize,
    pub default_project_name: String,
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_rounds: config.max_rounds,
            max_tools: config.max_tools,
            default_project_name: config.default_project_name.clone(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&AgentConfig {
            max_rounds: 30,
            max_tools: 20,
            default_project_name: "stratus-project".to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub prompt: String,
    pub region: String,
    pub project_name: String,
}

/// A modification of an existing architecture. The result is a complete new graph and
/// bundle; the current version is only read.
#[derive(Clone, Debug, PartialEq)]
pub struct EditRequest {
    pub prompt: String,
    pub region: String,
    pub project_name: String,
    pub current: ArchitectureGraph,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SynthesisOutcome {
    pub graph: ArchitectureGraph,
    pub issues: Vec<ValidationIssue>,
    pub bundle: IacBundle,
    pub invocation_count: usize,
    pub rounds: u32,
    /// True when the round ceiling stopped the loop; the graph and bundle are partial.
    pub ceiling_reached: bool,
    pub project_name: String,
    pub summary: String,
}

/// Nodes, edges, and file fragments folded in from capability results, in invocation order.
#[derive(Debug, Default)]
struct Accumulator {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    bundle: IacBundle,
    invocations: usize,
}

impl Accumulator {
    fn apply(&mut self, registry: &CapabilityRegistry, invocation: &ToolInvocation) -> Value {
        self.invocations += 1;
        let Some(capability) = registry.lookup(&invocation.name) else {
            tracing::warn!(
                event_name = "agent.invocation.unknown",
                capability = %invocation.name,
                "model called an unknown capability"
            );
            return json!({"error": format!("Unknown tool: {}", invocation.name)});
        };

        match capability.execute(&invocation.parameters) {
            Ok(result) => {
                let edge_only = result.is_edge_only();
                for (filename, fragment) in &result.files {
                    self.bundle.merge_fragment(filename, fragment);
                }
                self.edges.extend(result.edges);

                let payload = json!({
                    "status": "success",
                    "node_id": result.node.id,
                    "node_type": result.node.node_type,
                    "message": format!(
                        "Successfully created {} ({})",
                        result.node.label, result.node.node_type
                    ),
                });
                if !edge_only {
                    self.nodes.push(result.node);
                }
                payload
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.invocation.failed",
                    capability = %invocation.name,
                    error = %error,
                    "capability execution failed"
                );
                json!({"status": "error", "message": error.to_string()})
            }
        }
    }
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    registry: CapabilityRegistry,
    extractor: InvocationExtractor,
    settings: AgentSettings,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, registry: CapabilityRegistry, settings: AgentSettings) -> Self {
        Self { llm, registry, extractor: InvocationExtractor::default(), settings }
    }

    pub fn with_extractor(mut self, extractor: InvocationExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Drives the model until it stops proposing invocations or the round ceiling is hit.
    ///
    /// Capability failures and unknown names are reported back to the model; only a failed
    /// model call aborts the run.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisOutcome, LlmError> {
        let project_name =
            sanitize_project_name(&request.project_name, &self.settings.default_project_name);
        let offered = self.registry.relevant_subset(&request.prompt, self.settings.max_tools);

        tracing::info!(
            event_name = "agent.synthesis.start",
            project_name = %project_name,
            region = %request.region,
            offered_capabilities = offered.len(),
            "starting synthesis"
        );

        let opening = user_prompt(&request.prompt, &request.region, &project_name);
        self.run_loop(&offered, opening, &request.region, project_name).await
    }

    /// Edits an existing architecture in two steps: the model first returns the modified
    /// graph as JSON, then the tool loop provisions that target graph from scratch so the
    /// new bundle matches it.
    pub async fn edit(&self, request: &EditRequest) -> Result<SynthesisOutcome, LlmError> {
        let project_name =
            sanitize_project_name(&request.project_name, &self.settings.default_project_name);

        let reply = self
            .llm
            .complete_json(EDIT_SYSTEM_PROMPT, &edit_prompt(&request.current, &request.prompt))
            .await?;
        let target: ArchitectureGraph = serde_json::from_value(reply)
            .map_err(|error| LlmError::Malformed(format!("edited graph: {error}")))?;

        let selection = target
            .nodes
            .iter()
            .fold(request.prompt.clone(), |text, node| format!("{text} {}", node.node_type));
        let offered = self.registry.relevant_subset(&selection, self.settings.max_tools);

        tracing::info!(
            event_name = "agent.edit.start",
            project_name = %project_name,
            region = %request.region,
            current_nodes = request.current.nodes.len(),
            target_nodes = target.nodes.len(),
            target_edges = target.edges.len(),
            offered_capabilities = offered.len(),
            "starting architecture edit"
        );

        let opening = rebuild_prompt(&target, &request.prompt, &request.region, &project_name);
        let outcome = self.run_loop(&offered, opening, &request.region, project_name).await?;

        let missing = target
            .nodes
            .iter()
            .filter(|node| outcome.graph.node(&node.id).is_none())
            .map(|node| node.id.as_str())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            tracing::warn!(
                event_name = "agent.edit.incomplete",
                missing = ?missing,
                "rebuilt architecture lacks nodes from the edited graph"
            );
        }
        Ok(outcome)
    }

    async fn run_loop(
        &self,
        offered: &[&dyn Capability],
        opening: String,
        region: &str,
        project_name: String,
    ) -> Result<SynthesisOutcome, LlmError> {
        let mut messages =
            vec![ChatMessage::system(system_prompt(offered)), ChatMessage::user(opening)];
        let mut state = Accumulator::default();
        let mut rounds = 0;
        let mut final_reply = None;

        while rounds < self.settings.max_rounds {
            rounds += 1;
            let reply = self.llm.complete(&messages).await?;
            let invocations = self.extractor.extract(&reply);
            tracing::debug!(
                event_name = "agent.round.complete",
                round = rounds,
                invocation_count = invocations.len(),
                "model round complete"
            );

            if invocations.is_empty() {
                final_reply = Some(reply.trim().to_string());
                break;
            }

            let results = invocations
                .iter()
                .map(|invocation| (invocation.name.clone(), state.apply(&self.registry, invocation)))
                .collect::<Vec<_>>();
            messages.push(ChatMessage::assistant(reply));
            messages.push(ChatMessage::user(tool_results_message(&results)));
        }

        let ceiling_reached = final_reply.is_none();
        let summary = final_reply.unwrap_or_else(|| {
            tracing::warn!(
                event_name = "agent.synthesis.ceiling",
                rounds,
                "round ceiling reached before the model finished"
            );
            format!(
                "Stopped after {rounds} rounds without a final summary; the architecture is partial."
            )
        });

        let mut bundle = state.bundle;
        bundle.insert(PROVIDERS_FILE, providers_boilerplate(region, &project_name));

        let validator = GraphValidator::new(self.registry.node_types());
        let (graph, issues) = validator.assemble(state.nodes, state.edges);

        tracing::info!(
            event_name = "agent.synthesis.complete",
            project_name = %project_name,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            files = bundle.len(),
            issues = issues.len(),
            rounds,
            "synthesis complete"
        );

        Ok(SynthesisOutcome {
            graph,
            issues,
            bundle,
            invocation_count: state.invocations,
            rounds,
            ceiling_reached,
            project_name,
            summary,
        })
    }
}

/// Provider block plus the `region` and `project_name` variables every fragment uses.
pub fn providers_boilerplate(region: &str, project_name: &str) -> String {
    format!(
        r#"terraform {{
  required_version = ">= 1.0"
  required_providers {{
    aws = {{
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }}
  }}
}}

provider "aws" {{
  region = var.region
}}

variable "region" {{
  type    = string
  default = "{region}"
}}

variable "project_name" {{
  type    = string
  default = "{project_name}"
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use stratus_core::validation::IssueKind;

    use stratus_core::domain::architecture::{ArchitectureGraph, GraphNode};

    use super::{AgentRuntime, AgentSettings, EditRequest, SynthesisRequest, PROVIDERS_FILE};
    use crate::conversation::EDIT_SYSTEM_PROMPT;
    use crate::llm::{ChatMessage, LlmClient, LlmError, Role};
    use crate::registry::CapabilityRegistry;

    /// Replays canned replies, repeating the last one once the script runs out.
    struct ScriptedLlm {
        replies: Mutex<VecDeque<String>>,
        last: String,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
                last: replies.last().map(|reply| reply.to_string()).unwrap_or_default(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().expect("calls lock").len()
        }

        fn last_messages(&self) -> Vec<ChatMessage> {
            self.calls.lock().expect("calls lock").last().cloned().unwrap_or_default()
        }

        fn messages(&self, call: usize) -> Vec<ChatMessage> {
            self.calls.lock().expect("calls lock").get(call).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            self.calls.lock().expect("calls lock").push(messages.to_vec());
            let next = self.replies.lock().expect("replies lock").pop_front();
            Ok(next.unwrap_or_else(|| self.last.clone()))
        }
    }

    fn request(prompt: &str) -> SynthesisRequest {
        SynthesisRequest {
            prompt: prompt.to_string(),
            region: "us-west-2".to_string(),
            project_name: "Demo Shop".to_string(),
        }
    }

    fn runtime(llm: Arc<ScriptedLlm>, max_rounds: u32) -> AgentRuntime {
        AgentRuntime::new(
            llm,
            CapabilityRegistry::with_builtins(),
            AgentSettings { max_rounds, ..AgentSettings::default() },
        )
    }

    #[tokio::test]
    async fn single_bucket_round_produces_node_and_storage_file() {
        let llm = ScriptedLlm::new(&[
            r#"[{"name":"create_s3_bucket","parameters":{"bucket_id":"assets","label":"Assets"}}]"#,
            "Created an assets bucket.",
        ]);
        let outcome = runtime(llm.clone(), 30).synthesize(&request("a bucket")).await.expect("run");

        assert_eq!(outcome.graph.nodes.len(), 1);
        assert_eq!(outcome.graph.nodes[0].id, "assets");
        assert_eq!(outcome.graph.nodes[0].node_type, "aws_s3");
        let storage = outcome.bundle.get("storage.tf").expect("storage file");
        assert!(storage.contains(r#"resource "aws_s3_bucket" "assets""#));
        assert_eq!(outcome.summary, "Created an assets bucket.");
        assert_eq!(outcome.invocation_count, 1);
        assert!(!outcome.ceiling_reached);
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn fragments_for_same_file_concatenate_in_invocation_order() {
        let llm = ScriptedLlm::new(&[
            r#"[{"name":"create_dynamodb","parameters":{"table_id":"users","label":"Users"}},
                {"name":"create_elasticache","parameters":{"cache_id":"sessions","label":"Sessions"}}]"#,
            "done",
        ]);
        let outcome = runtime(llm, 30).synthesize(&request("database and cache")).await.expect("run");

        let file = outcome.bundle.get("databases.tf").expect("databases file");
        let users = file.find(r#"resource "aws_dynamodb_table" "users""#).expect("first fragment");
        let sessions =
            file.find(r#"resource "aws_elasticache_cluster" "sessions""#).expect("second fragment");
        assert!(users < sessions);
    }

    #[tokio::test]
    async fn loop_stops_at_round_ceiling_with_partial_result() {
        let llm = ScriptedLlm::new(&[
            r#"[{"name":"create_sqs_queue","parameters":{"queue_id":"jobs","label":"Jobs"}}]"#,
        ]);
        let outcome = runtime(llm.clone(), 3).synthesize(&request("a queue")).await.expect("run");

        assert_eq!(llm.call_count(), 3);
        assert_eq!(outcome.rounds, 3);
        assert!(outcome.ceiling_reached);
        assert!(outcome.summary.contains("partial"));
        assert_eq!(outcome.invocation_count, 3);
        assert!(outcome.issues.iter().any(|issue| issue.kind == IssueKind::DuplicateNodeId));
    }

    #[tokio::test]
    async fn unknown_and_failing_invocations_are_reported_not_fatal() {
        let llm = ScriptedLlm::new(&[
            r#"[{"name":"create_mainframe","parameters":{}},
                {"name":"create_s3_bucket","parameters":{"label":"No id"}},
                {"name":"create_vpc","parameters":{"vpc_id":"main_vpc","label":"Main"}}]"#,
            "finished",
        ]);
        let outcome = runtime(llm.clone(), 30).synthesize(&request("vpc")).await.expect("run");

        assert_eq!(outcome.graph.nodes.len(), 1);
        let feedback = llm.last_messages().last().map(|message| message.content.clone());
        let feedback = feedback.expect("tool results message");
        assert!(feedback.contains("Unknown tool: create_mainframe"));
        assert!(feedback.contains(r#""status":"error""#));
        assert!(feedback.contains("Successfully created Main (aws_vpc)"));
    }

    #[tokio::test]
    async fn edge_only_results_add_edges_but_no_node() {
        let llm = ScriptedLlm::new(&[
            r#"[{"name":"create_lambda_function","parameters":{"function_id":"api_fn","label":"API"}},
                {"name":"create_s3_bucket","parameters":{"bucket_id":"assets","label":"Assets"}},
                {"name":"connect_services","parameters":{"from_service_id":"api_fn","to_service_id":"assets","relationship":"writes to"}}]"#,
            "done",
        ]);
        let outcome = runtime(llm, 30).synthesize(&request("lambda writes to bucket")).await.expect("run");

        assert_eq!(outcome.graph.nodes.len(), 2);
        assert_eq!(outcome.graph.edges.len(), 1);
        assert_eq!(outcome.graph.edges[0].label, "writes to");
        assert!(outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn providers_file_uses_region_and_sanitized_name() {
        let llm = ScriptedLlm::new(&["Nothing to build."]);
        let outcome = runtime(llm, 30).synthesize(&request("hi")).await.expect("run");

        assert_eq!(outcome.project_name, "demo-shop");
        let providers = outcome.bundle.get(PROVIDERS_FILE).expect("providers file");
        assert!(providers.contains(r#"default = "us-west-2""#));
        assert!(providers.contains(r#"default = "demo-shop""#));
        assert!(outcome.graph.is_empty());
    }

    fn bucket_only_graph() -> ArchitectureGraph {
        ArchitectureGraph {
            nodes: vec![GraphNode {
                id: "assets".to_string(),
                node_type: "aws_s3".to_string(),
                label: "Assets".to_string(),
                config: Default::default(),
            }],
            edges: Vec::new(),
        }
    }

    fn edit_request(prompt: &str) -> EditRequest {
        EditRequest {
            prompt: prompt.to_string(),
            region: "us-west-2".to_string(),
            project_name: "Demo Shop".to_string(),
            current: bucket_only_graph(),
        }
    }

    #[tokio::test]
    async fn edit_rebuilds_the_edited_graph_with_tools() {
        let llm = ScriptedLlm::new(&[
            "```json\n{\"nodes\":[{\"id\":\"assets\",\"type\":\"aws_s3\",\"label\":\"Assets\"},\
             {\"id\":\"jobs\",\"type\":\"aws_sqs\",\"label\":\"Jobs\"}],\"edges\":[]}\n```",
            r#"[{"name":"create_s3_bucket","parameters":{"bucket_id":"assets","label":"Assets"}},
                {"name":"create_sqs_queue","parameters":{"queue_id":"jobs","label":"Jobs"}}]"#,
            "Added a jobs queue next to the bucket.",
        ]);
        let outcome =
            runtime(llm.clone(), 30).edit(&edit_request("add a jobs queue")).await.expect("edit");

        let ids = outcome.graph.nodes.iter().map(|node| node.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["assets", "jobs"]);
        assert!(outcome.bundle.get("storage.tf").is_some());
        assert!(outcome.bundle.get("messaging.tf").is_some());
        assert!(outcome.bundle.get(PROVIDERS_FILE).is_some_and(|file| file.contains("demo-shop")));
        assert_eq!(outcome.summary, "Added a jobs queue next to the bucket.");

        let planning = llm.messages(0);
        assert_eq!(planning[0].content, EDIT_SYSTEM_PROMPT);
        assert!(planning[1].content.starts_with("## Current Architecture"));
        assert!(planning[1].content.contains(r#""id": "assets""#));
        assert!(planning[1].content.ends_with("add a jobs queue"));

        let rebuild = llm.messages(1);
        assert_eq!(rebuild[1].role, Role::User);
        assert!(rebuild[1].content.starts_with("## Target Architecture"));
        assert!(rebuild[1].content.contains(r#""id": "jobs""#));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn edit_rejects_a_reply_that_is_not_a_graph() {
        let llm = ScriptedLlm::new(&["I would rather not change anything."]);
        let error = runtime(llm.clone(), 30)
            .edit(&edit_request("remove everything"))
            .await
            .expect_err("prose is not a graph");

        assert!(matches!(error, LlmError::Malformed(_)));
        assert_eq!(llm.call_count(), 1);
    }
}
