use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::capability::{Capability, Category};
use crate::catalog::{self, CONNECT_SERVICES};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("capability `{0}` is already registered")]
    DuplicateCapability(String),
}

/// Categories always offered to the model, whatever the prompt says.
const CORE_CATEGORIES: &[Category] = &[Category::Compute, Category::Networking];

/// Substring keywords and the categories they pull in.
const KEYWORDS: &[(&[&str], &[Category])] = &[
    (&["lambda"], &[Category::Compute, Category::Monitoring]),
    (&["serverless"], &[Category::Compute, Category::Messaging, Category::Databases]),
    (&["api"], &[Category::Compute, Category::Networking, Category::Application]),
    (
        &["ec2", "instance", "container", "ecs", "fargate", "docker"],
        &[Category::Compute, Category::Networking],
    ),
    (&["s3", "storage", "bucket"], &[Category::Storage]),
    (&["database", "rds", "dynamo", "postgre", "mysql", "redis", "cache"], &[Category::Databases]),
    (&["elastic"], &[Category::Databases, Category::Analytics]),
    (&["sqs", "sns", "queue", "notification", "event"], &[Category::Messaging]),
    (&["kinesis"], &[Category::Messaging, Category::Analytics]),
    (
        &[
            "vpc",
            "network",
            "load balancer",
            "alb",
            "cloudfront",
            "cdn",
            "route53",
            "dns",
            "domain",
        ],
        &[Category::Networking],
    ),
    (&["iam", "auth", "cognito", "security", "kms", "encrypt", "waf"], &[Category::Security]),
    (&["monitor", "cloudwatch", "alarm", "log"], &[Category::Monitoring]),
    (&["cicd", "codepipeline", "codebuild", "deploy"], &[Category::Devops]),
    (&["pipeline"], &[Category::Devops, Category::Analytics]),
    (&["glue", "athena", "redshift", "analytics"], &[Category::Analytics]),
    (&["data"], &[Category::Analytics, Category::Storage]),
    (&["web", "website"], &[Category::Compute, Category::Networking, Category::Storage]),
    (&["static"], &[Category::Storage, Category::Networking]),
    (&["microservice"], &[Category::Compute, Category::Networking, Category::Messaging]),
];

#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<&'static str, Box<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the full built-in catalog.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_all(catalog::builtin());
        registry
    }

    pub fn register(&mut self, capability: Box<dyn Capability>) -> Result<(), RegistryError> {
        let name = capability.name();
        if self.capabilities.contains_key(name) {
            return Err(RegistryError::DuplicateCapability(name.to_string()));
        }
        self.capabilities.insert(name, capability);
        Ok(())
    }

    /// Registers each capability, logging and skipping duplicates.
    pub fn register_all(&mut self, capabilities: Vec<Box<dyn Capability>>) {
        for capability in capabilities {
            if let Err(error) = self.register(capability) {
                tracing::warn!(
                    event_name = "agent.registry.duplicate",
                    error = %error,
                    "skipping capability registration"
                );
            }
        }
        tracing::debug!(
            event_name = "agent.registry.loaded",
            capabilities = self.capabilities.len(),
            "capability registry loaded"
        );
    }

    pub fn lookup(&self, name: &str) -> Option<&dyn Capability> {
        self.capabilities.get(name).map(|capability| &**capability)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.capabilities.keys().copied()
    }

    /// Node types any registered capability can produce.
    pub fn node_types(&self) -> BTreeSet<&'static str> {
        self.capabilities.values().filter_map(|capability| capability.node_type()).collect()
    }

    /// Capabilities worth showing the model for this prompt: the core categories, every
    /// category a keyword in the prompt maps to, and the connective capability.
    ///
    /// The connective capability sorts first, the rest by name, then the list is capped.
    pub fn relevant_subset(&self, prompt: &str, max_count: usize) -> Vec<&dyn Capability> {
        let categories = matched_categories(prompt);

        let mut selected = self
            .capabilities
            .values()
            .filter(|capability| {
                capability.name() == CONNECT_SERVICES || categories.contains(&capability.category())
            })
            .map(|capability| &**capability)
            .collect::<Vec<&dyn Capability>>();

        selected.sort_by_key(|capability| (capability.name() != CONNECT_SERVICES, capability.name()));
        selected.truncate(max_count);
        selected
    }
}

pub fn matched_categories(prompt: &str) -> BTreeSet<Category> {
    let lowered = prompt.to_lowercase();
    let mut categories = CORE_CATEGORIES.iter().copied().collect::<BTreeSet<_>>();
    for (keywords, mapped) in KEYWORDS {
        if keywords.iter().any(|keyword| lowered.contains(keyword)) {
            categories.extend(mapped.iter().copied());
        }
    }
    categories
}
