use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::architecture::IacBundle;

/// Constructs in generated IaC that can reach outside the cloud provider API.
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    ("local-exec provisioner", r#"(?i)provisioner\s+"local-exec""#),
    ("remote-exec provisioner", r#"(?i)provisioner\s+"remote-exec""#),
    ("external data source", r#"(?i)data\s+"external""#),
    ("null_resource", r"(?i)\bnull_resource\b"),
    ("local_file", r"(?i)\blocal_file\b"),
    ("template_file", r"(?i)\btemplate_file\b"),
    ("file() function", r"(?i)\bfile\s*\("),
    ("templatefile() function", r"(?i)\btemplatefile\s*\("),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyFinding {
    pub filename: String,
    pub pattern: String,
    pub line: usize,
}

fn compiled() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DANGEROUS_PATTERNS
            .iter()
            .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|regex| (*name, regex)))
            .collect()
    })
}

/// Reports every dangerous construct per file and line. An empty result means the bundle is clean.
pub fn scan_bundle(bundle: &IacBundle) -> Vec<SafetyFinding> {
    let mut findings = Vec::new();
    for (filename, content) in bundle.files() {
        findings.extend(scan_text(filename, content));
    }

    if !findings.is_empty() {
        tracing::warn!(
            event_name = "iac.safety.findings",
            finding_count = findings.len(),
            "dangerous constructs found in generated IaC"
        );
    }
    findings
}

pub fn scan_text(filename: &str, content: &str) -> Vec<SafetyFinding> {
    let mut findings = Vec::new();
    for (index, line) in content.lines().enumerate() {
        for (name, regex) in compiled() {
            if regex.is_match(line) {
                findings.push(SafetyFinding {
                    filename: filename.to_string(),
                    pattern: (*name).to_string(),
                    line: index + 1,
                });
            }
        }
    }
    findings
}
