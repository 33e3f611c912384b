use serde_json::Value;

use super::compute::bounded;
use crate::capability::{Capability, CapabilityError, CapabilityResult, Category, ParamSpec, Params};

const SQS_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("queue_id", "Unique identifier (e.g. 'jobs')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::boolean("fifo", "Create a FIFO queue.", false),
    ParamSpec::integer("visibility_timeout", "Visibility timeout in seconds.", 30),
    ParamSpec::integer("message_retention", "Retention in seconds (60-1209600).", 345_600),
];

pub struct CreateSqsQueue;

impl Capability for CreateSqsQueue {
    fn name(&self) -> &'static str {
        "create_sqs_queue"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon SQS message queue (standard or FIFO) for decoupling services and background jobs."
    }

    fn category(&self) -> Category {
        Category::Messaging
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_sqs")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        SQS_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(SQS_PARAMS, params)?;
        let id = params.str("queue_id");
        let fifo = params.bool("fifo");
        let visibility = bounded(&params, "visibility_timeout", 0, 43_200)?;
        let retention = bounded(&params, "message_retention", 60, 1_209_600)?;
        let (suffix, fifo_line) = if fifo { (".fifo", "\n  fifo_queue                 = true") } else { ("", "") };

        let code = format!(
            r#"resource "aws_sqs_queue" "{id}" {{
  name                       = "${{var.project_name}}-{id}{suffix}"{fifo_line}
  visibility_timeout_seconds = {visibility}
  message_retention_seconds  = {retention}
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_sqs", params.label_or(id))
            .with_config("fifo", fifo)
            .with_config("visibility_timeout", visibility)
            .with_file("messaging.tf", code))
    }
}

const SNS_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("topic_id", "Unique identifier (e.g. 'alerts')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::boolean("fifo_topic", "Create a FIFO topic.", false),
];

pub struct CreateSnsTopic;

impl Capability for CreateSnsTopic {
    fn name(&self) -> &'static str {
        "create_sns_topic"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon SNS topic for pub/sub messaging and notifications."
    }

    fn category(&self) -> Category {
        Category::Messaging
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_sns")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        SNS_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(SNS_PARAMS, params)?;
        let id = params.str("topic_id");
        let fifo = params.bool("fifo_topic");
        let (suffix, fifo_line) = if fifo { (".fifo", "\n  fifo_topic = true") } else { ("", "") };

        let code = format!(
            r#"resource "aws_sns_topic" "{id}" {{
  name       = "${{var.project_name}}-{id}{suffix}"{fifo_line}
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_sns", params.label_or(id))
            .with_config("fifo", fifo)
            .with_file("messaging.tf", code))
    }
}

const EVENTBRIDGE_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("rule_id", "Unique identifier (e.g. 'nightly')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string("schedule", "Schedule expression such as 'rate(5 minutes)'.", ""),
    ParamSpec::string("event_pattern", "JSON event pattern, used when no schedule is given.", ""),
    ParamSpec::string("target_lambda_id", "Optional Lambda function id to invoke.", "").reference(),
];

/// A rule needs a schedule or an event pattern. A target Lambda adds an invoke permission
/// and a `triggers` edge.
pub struct CreateEventBridgeRule;

impl Capability for CreateEventBridgeRule {
    fn name(&self) -> &'static str {
        "create_eventbridge_rule"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon EventBridge rule on a schedule or event pattern, optionally targeting a Lambda function."
    }

    fn category(&self) -> Category {
        Category::Messaging
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_eventbridge")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        EVENTBRIDGE_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(EVENTBRIDGE_PARAMS, params)?;
        let id = params.str("rule_id");

        let trigger = match (params.opt_str("schedule"), params.opt_str("event_pattern")) {
            (Some(_), _) => format!("  schedule_expression = \"{}\"", params.hcl("schedule")),
            (None, Some(pattern)) => {
                let pattern: Value = serde_json::from_str(pattern).map_err(|error| {
                    CapabilityError::InvalidValue {
                        name: "event_pattern",
                        reason: format!("not valid JSON: {error}"),
                    }
                })?;
                let encoded = pattern.to_string().replace("${", "$${").replace("%{", "%%{");
                format!("  event_pattern = <<PATTERN\n{encoded}\nPATTERN")
            }
            (None, None) => {
                return Err(CapabilityError::InvalidValue {
                    name: "schedule",
                    reason: "either `schedule` or `event_pattern` is required".to_string(),
                })
            }
        };

        let mut code = format!(
            r#"resource "aws_cloudwatch_event_rule" "{id}" {{
  name = "${{var.project_name}}-{id}"
{trigger}
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        let mut result = CapabilityResult::resource(id, "aws_eventbridge", params.label_or(id))
            .with_config("schedule", params.str("schedule"));

        if let Some(target) = params.opt_str("target_lambda_id") {
            code.push_str(&format!(
                r#"
resource "aws_cloudwatch_event_target" "{id}_target" {{
  rule      = aws_cloudwatch_event_rule.{id}.name
  target_id = "{id}-target"
  arn       = aws_lambda_function.{target}.arn
}}

resource "aws_lambda_permission" "{id}_invoke" {{
  statement_id  = "AllowEventBridge-{id}"
  action        = "lambda:InvokeFunction"
  function_name = aws_lambda_function.{target}.function_name
  principal     = "events.amazonaws.com"
  source_arn    = aws_cloudwatch_event_rule.{id}.arn
}}
"#
            ));
            result = result.with_edge(id, target, "triggers");
        }

        Ok(result.with_file("messaging.tf", code))
    }
}
