use stratus_core::safety::SafetyFinding;
use stratus_core::validation::ValidationIssue;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent<'a> {
    /// Writing a synthesized architecture to the workspace and provisioning it.
    Provision {
        project_id: &'a str,
        issues: &'a [ValidationIssue],
        findings: &'a [SafetyFinding],
    },
}

impl GuardrailIntent<'_> {
    pub fn project_id(&self) -> &str {
        match self {
            Self::Provision { project_id, .. } => project_id,
        }
    }

    pub fn action_key(&self) -> &'static str {
        match self {
            Self::Provision { .. } => "provision.write_workspace",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }

    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { user_message, .. } | Self::Degrade { user_message, .. } => {
                Some(user_message)
            }
        }
    }
}

/// Graph issues and unsafe IaC only warn by default; `strict` turns them into a denial.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub strict: bool,
}

impl GuardrailPolicy {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn evaluate(&self, intent: &GuardrailIntent<'_>) -> GuardrailDecision {
        let GuardrailIntent::Provision { project_id, issues, findings } = intent;
        if issues.is_empty() && findings.is_empty() {
            return GuardrailDecision::Allow;
        }

        let reason_code = match (issues.is_empty(), findings.is_empty()) {
            (false, true) => "graph_validation_issues",
            (true, false) => "unsafe_iac_constructs",
            _ => "graph_and_iac_findings",
        };
        let user_message = describe(issues, findings);

        tracing::warn!(
            event_name = "agent.guardrail.findings",
            project_id = %project_id,
            reason_code,
            issue_count = issues.len(),
            finding_count = findings.len(),
            strict = self.strict,
            "architecture has validation findings"
        );

        if self.strict {
            GuardrailDecision::Deny {
                reason_code,
                user_message,
                fallback_path: "revise_architecture",
            }
        } else {
            GuardrailDecision::Degrade {
                reason_code,
                user_message,
                fallback_path: "provision_with_warnings",
            }
        }
    }
}

fn describe(issues: &[ValidationIssue], findings: &[SafetyFinding]) -> String {
    let mut lines = issues.iter().map(|issue| issue.message.clone()).collect::<Vec<_>>();
    lines.extend(findings.iter().map(|finding| {
        format!("{} line {}: {}", finding.filename, finding.line, finding.pattern)
    }));
    lines.join("; ")
}

#[cfg(test)]
mod tests {
    use stratus_core::domain::architecture::IacBundle;
    use stratus_core::safety::scan_bundle;
    use stratus_core::validation::GraphValidator;
    use stratus_core::{GraphEdge, GraphNode};

    use super::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};

    fn node(id: &str, node_type: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            node_type: node_type.to_string(),
            label: id.to_string(),
            config: Default::default(),
        }
    }

    #[test]
    fn clean_architecture_is_allowed() {
        let decision = GuardrailPolicy::new(true).evaluate(&GuardrailIntent::Provision {
            project_id: "demo",
            issues: &[],
            findings: &[],
        });
        assert_eq!(decision, GuardrailDecision::Allow);
        assert!(decision.user_message().is_none());
    }

    #[test]
    fn issues_only_warn_by_default() {
        let (_, issues) = GraphValidator::default()
            .assemble(vec![node("api", "aws_lambda")], vec![GraphEdge::new("api", "ghost", "calls")]);

        let decision = GuardrailPolicy::default().evaluate(&GuardrailIntent::Provision {
            project_id: "demo",
            issues: &issues,
            findings: &[],
        });

        let (reason_code, user_message, fallback_path) = match decision {
            GuardrailDecision::Degrade { reason_code, user_message, fallback_path } => {
                (reason_code, user_message, fallback_path)
            }
            _ => ("", String::new(), ""),
        };
        assert_eq!(reason_code, "graph_validation_issues");
        assert!(user_message.contains("Edge references non-existent target node: ghost"));
        assert_eq!(fallback_path, "provision_with_warnings");
    }

    #[test]
    fn strict_mode_denies_unsafe_iac() {
        let mut bundle = IacBundle::new();
        bundle.insert("compute.tf", "resource \"null_resource\" \"x\" {\n  provisioner \"local-exec\" {}\n}\n");
        let findings = scan_bundle(&bundle);

        let intent = GuardrailIntent::Provision { project_id: "demo", issues: &[], findings: &findings };
        let decision = GuardrailPolicy::new(true).evaluate(&intent);

        assert!(decision.is_blocking());
        assert_eq!(intent.action_key(), "provision.write_workspace");
        assert_eq!(intent.project_id(), "demo");
        assert!(matches!(
            decision,
            GuardrailDecision::Deny { reason_code: "unsafe_iac_constructs", .. }
        ));
    }
}
