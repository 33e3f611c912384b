//! Prompt text exchanged with the model during orchestration.

use serde_json::Value;
use stratus_core::domain::architecture::ArchitectureGraph;

use crate::capability::Capability;

const SYSTEM_PREAMBLE: &str = "You are a senior AWS solutions architect. You design infrastructure \
by calling provisioning tools. Each tool creates one AWS service, emits its Terraform, and adds a \
node to the architecture graph. Use short snake_case ids and reuse them when connecting services.";

const CALLING_CONVENTION: &str = r#"## How to call tools

Reply with a JSON array of tool calls inside a ```json fenced block:

```json
[
  {"name": "create_s3_bucket", "parameters": {"bucket_id": "assets", "label": "Assets"}},
  {"name": "connect_services", "parameters": {"from_service_id": "api_fn", "to_service_id": "assets", "relationship": "writes to"}}
]
```

You will receive one result per call. Fix any call that reports an error and call tools again as needed.
When the architecture is complete, reply with a plain-text summary and no JSON."#;

/// Instructions for the graph-editing call, which answers with JSON instead of tool calls.
pub const EDIT_SYSTEM_PROMPT: &str = r#"You are a senior AWS solutions architect editing an existing architecture graph.
Apply the requested modification and keep every unaffected node, edge, and id unchanged.
Reply with only the complete modified graph as JSON, no prose:

{"nodes": [{"id": "assets", "type": "aws_s3", "label": "Assets", "config": {}}],
 "edges": [{"from": "api_fn", "to": "assets", "label": "writes to"}]}

Node types use the `aws_*` names already present in the graph (for example aws_lambda, aws_s3,
aws_dynamodb, aws_sqs, aws_apigatewayv2). Every edge must reference node ids in the graph."#;

/// System instructions listing the offered capabilities and the textual calling convention.
pub fn system_prompt(capabilities: &[&dyn Capability]) -> String {
    let mut prompt = String::from(SYSTEM_PREAMBLE);
    prompt.push_str("\n\n## Available tools\n");

    for capability in capabilities {
        let schema = serde_json::to_string(&capability.parameter_schema())
            .unwrap_or_else(|_| "{}".to_string());
        prompt.push_str(&format!(
            "\n### {}\nCategory: {}\n{}\nParameters: {}\n",
            capability.name(),
            capability.category().as_str(),
            capability.description(),
            schema
        ));
    }

    prompt.push('\n');
    prompt.push_str(CALLING_CONVENTION);
    prompt
}

pub fn user_prompt(request: &str, region: &str, project_name: &str) -> String {
    format!(
        "## User Request\n\n{request}\n\n\
         ## Configuration\n\n\
         - AWS Region: {region}\n\
         - Project Name: {project_name}\n\n\
         Design and provision the complete AWS architecture by calling the appropriate tools. \
         After creating all services, use `connect_services` to define how they interact. \
         When done, provide a summary of the architecture you built."
    )
}

/// The current graph and the modification request for the graph-editing call.
pub fn edit_prompt(current: &ArchitectureGraph, request: &str) -> String {
    format!(
        "## Current Architecture\n\n```json\n{}\n```\n\n## Modification Request\n\n{request}",
        graph_json(current)
    )
}

/// Asks the tool loop to provision an already-edited target graph from scratch.
pub fn rebuild_prompt(
    target: &ArchitectureGraph,
    request: &str,
    region: &str,
    project_name: &str,
) -> String {
    format!(
        "## Target Architecture\n\n```json\n{}\n```\n\n\
         ## Modification Request\n\n{request}\n\n\
         ## Configuration\n\n\
         - AWS Region: {region}\n\
         - Project Name: {project_name}\n\n\
         The target architecture already includes the requested modification. Call the tools \
         to provision every node in it with the same ids, then use `connect_services` for each \
         edge. When done, summarize what changed compared to the previous architecture.",
        graph_json(target)
    )
}

fn graph_json(graph: &ArchitectureGraph) -> String {
    serde_json::to_string_pretty(graph).unwrap_or_else(|_| "{}".to_string())
}

/// The synthesized message that feeds one round's invocation results back to the model.
pub fn tool_results_message(results: &[(String, Value)]) -> String {
    let mut message = String::from("## Tool results\n");
    for (name, payload) in results {
        message.push_str(&format!("\n- {name}: {payload}"));
    }
    message.push_str("\n\nContinue calling tools, or reply with the final summary if the architecture is complete.");
    message
}
