//! Agent runtime: turns a natural-language request into an architecture graph and IaC bundle.
//!
//! The loop in `runtime` sends the request plus a filtered capability list to the model,
//! extracts proposed invocations from the reply (`parser`), executes them against the
//! `registry`, and feeds the results back until the model answers with a plain summary.
//!
//! # Key Types
//!
//! - `AgentRuntime` - the orchestration loop
//! - `Capability` - one resource generator, see `catalog` for the built-in set
//! - `LlmClient` - pluggable model boundary, `OpenAiCompatibleClient` in production
//! - `GuardrailPolicy` - decides whether findings block provisioning

pub mod capability;
pub mod catalog;
pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod parser;
pub mod registry;
pub mod runtime;

pub use capability::{Capability, CapabilityError, CapabilityResult, Category};
pub use guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
pub use llm::{ChatMessage, LlmClient, LlmError, OpenAiCompatibleClient};
pub use registry::{CapabilityRegistry, RegistryError};
pub use runtime::{AgentRuntime, AgentSettings, EditRequest, SynthesisOutcome, SynthesisRequest};
