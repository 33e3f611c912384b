use serde_json::Value;
use stratus_core::domain::architecture::GraphEdge;

use crate::capability::{Capability, CapabilityError, CapabilityResult, Category, ParamSpec, Params};

pub const CONNECT_SERVICES: &str = "connect_services";

const PARAMS: &[ParamSpec] = &[
    ParamSpec::id(
        "from_service_id",
        "The ID of the source service (the one initiating the connection).",
    ),
    ParamSpec::id(
        "to_service_id",
        "The ID of the target service (the one receiving the connection).",
    ),
    ParamSpec::required(
        "relationship",
        "Description of the relationship (e.g. 'invokes', 'reads from', 'writes to', 'routes to').",
    ),
];

/// Links two already-created resources. Produces an edge and no node.
pub struct ConnectServices;

impl Capability for ConnectServices {
    fn name(&self) -> &'static str {
        CONNECT_SERVICES
    }

    fn description(&self) -> &'static str {
        "Define a connection/dependency between two AWS services in the architecture. Use this after creating services to specify how they interact (e.g. an API Gateway routes to a Lambda, a Lambda writes to DynamoDB)."
    }

    fn category(&self) -> Category {
        Category::Utility
    }

    fn node_type(&self) -> Option<&'static str> {
        None
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(PARAMS, params)?;
        let relationship = params.opt_str("relationship").unwrap_or("connects to");
        Ok(CapabilityResult::edge_only(GraphEdge::new(
            params.str("from_service_id"),
            params.str("to_service_id"),
            relationship,
        )))
    }
}
