//! Extraction of proposed capability invocations from free-form model output.
//!
//! Not every model backend supports structured function calling, so the model is asked to
//! emit JSON and this module digs it back out. Strategies run in order and the first one
//! that yields invocations wins; results are never merged across strategies.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default = "empty_object", alias = "arguments")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

pub trait InvocationParser: Send + Sync {
    fn name(&self) -> &'static str;
    /// `None` when this strategy finds nothing it can accept.
    fn parse(&self, text: &str) -> Option<Vec<ToolInvocation>>;
}

/// A JSON array inside a fenced code block.
pub struct FencedArray;

impl InvocationParser for FencedArray {
    fn name(&self) -> &'static str {
        "fenced_array"
    }

    fn parse(&self, text: &str) -> Option<Vec<ToolInvocation>> {
        static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
        let fence = FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok());
        let fence = fence.as_ref()?;

        fence
            .captures_iter(text)
            .filter_map(|captures| captures.get(1))
            .map(|body| body.as_str().trim())
            .filter(|body| body.starts_with('['))
            .find_map(|body| serde_json::from_str::<Value>(body).ok().and_then(invocation_array))
    }
}

/// The first bare JSON array in the text whose elements all name a capability.
pub struct BareArray;

impl InvocationParser for BareArray {
    fn name(&self) -> &'static str {
        "bare_array"
    }

    fn parse(&self, text: &str) -> Option<Vec<ToolInvocation>> {
        leading_values(text, '[').find_map(invocation_array)
    }
}

/// A single JSON object carrying a `name` key.
pub struct SingleObject;

impl InvocationParser for SingleObject {
    fn name(&self) -> &'static str {
        "single_object"
    }

    fn parse(&self, text: &str) -> Option<Vec<ToolInvocation>> {
        leading_values(text, '{').find_map(|value| invocation(&value).map(|found| vec![found]))
    }
}

/// Runs parser strategies in order.
pub struct InvocationExtractor {
    strategies: Vec<Box<dyn InvocationParser>>,
}

impl Default for InvocationExtractor {
    fn default() -> Self {
        Self { strategies: vec![Box::new(FencedArray), Box::new(BareArray), Box::new(SingleObject)] }
    }
}

impl InvocationExtractor {
    pub fn new(strategies: Vec<Box<dyn InvocationParser>>) -> Self {
        Self { strategies }
    }

    /// Appends a strategy tried after the existing ones.
    pub fn with_strategy(mut self, strategy: Box<dyn InvocationParser>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Empty when no strategy matched, which means the text is the model's final summary.
    pub fn extract(&self, text: &str) -> Vec<ToolInvocation> {
        for strategy in &self.strategies {
            if let Some(invocations) = strategy.parse(text) {
                tracing::debug!(
                    event_name = "agent.parser.matched",
                    strategy = strategy.name(),
                    invocation_count = invocations.len(),
                    "parsed capability invocations"
                );
                return invocations;
            }
        }
        Vec::new()
    }
}

/// JSON values that start at each occurrence of `open`, ignoring whatever trails them.
fn leading_values(text: &str, open: char) -> impl Iterator<Item = Value> + '_ {
    text.match_indices(open).filter_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>().next()?.ok()
    })
}

/// Accepted only when non-empty and every element is an object with a string `name`.
fn invocation_array(value: Value) -> Option<Vec<ToolInvocation>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items.iter().map(invocation).collect()
}

fn invocation(value: &Value) -> Option<ToolInvocation> {
    value.as_object()?.get("name")?.as_str()?;
    serde_json::from_value(value.clone()).ok()
}
