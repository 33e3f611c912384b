use serde_json::Value;

use super::compute::bounded;
use crate::capability::{
    hcl_escape, Capability, CapabilityError, CapabilityResult, Category, ParamSpec, Params,
};

const COMPARISON_OPERATORS: &[&str] = &[
    "GreaterThanThreshold",
    "GreaterThanOrEqualToThreshold",
    "LessThanThreshold",
    "LessThanOrEqualToThreshold",
];

const ALARM_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("alarm_id", "Unique identifier (e.g. 'high_cpu')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string("metric_name", "Metric name.", "CPUUtilization"),
    ParamSpec::string("namespace", "Metric namespace.", "AWS/EC2"),
    ParamSpec::number("threshold", "Alarm threshold.", 80.0),
    ParamSpec::string("comparison_operator", "Comparison operator.", "GreaterThanThreshold"),
    ParamSpec::integer("evaluation_periods", "Periods to evaluate.", 2),
    ParamSpec::integer("period", "Period in seconds.", 300),
    ParamSpec::string("alarm_topic_id", "Optional SNS topic id notified on alarm.", "").reference(),
];

pub struct CreateCloudWatchAlarm;

impl Capability for CreateCloudWatchAlarm {
    fn name(&self) -> &'static str {
        "create_cloudwatch_alarm"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon CloudWatch metric alarm, optionally notifying an SNS topic."
    }

    fn category(&self) -> Category {
        Category::Monitoring
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_cloudwatch")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        ALARM_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(ALARM_PARAMS, params)?;
        let id = params.str("alarm_id");
        let operator = params.str("comparison_operator");
        if !COMPARISON_OPERATORS.contains(&operator) {
            return Err(CapabilityError::InvalidValue {
                name: "comparison_operator",
                reason: format!("unsupported operator `{operator}`"),
            });
        }
        let evaluation_periods = bounded(&params, "evaluation_periods", 1, 100)?;
        let period = bounded(&params, "period", 10, 86_400)?;
        let threshold = params.num("threshold");
        let metric = params.hcl("metric_name");
        let namespace = params.hcl("namespace");
        let label = params.label_or(id);
        let description = hcl_escape(&label);
        let topic = params.opt_str("alarm_topic_id");
        let actions = topic
            .map(|topic| format!("\n  alarm_actions       = [aws_sns_topic.{topic}.arn]"))
            .unwrap_or_default();

        let code = format!(
            r#"resource "aws_cloudwatch_metric_alarm" "{id}" {{
  alarm_name          = "${{var.project_name}}-{id}"
  comparison_operator = "{operator}"
  evaluation_periods  = {evaluation_periods}
  metric_name         = "{metric}"
  namespace           = "{namespace}"
  period              = {period}
  statistic           = "Average"
  threshold           = {threshold}
  alarm_description   = "{description}"{actions}
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        let mut result = CapabilityResult::resource(id, "aws_cloudwatch", label)
            .with_config("metric_name", params.str("metric_name"))
            .with_config("threshold", threshold)
            .with_file("monitoring.tf", code);
        if let Some(topic) = topic {
            result = result.with_edge(id, topic, "notifies");
        }
        Ok(result)
    }
}

const LOG_GROUP_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("log_id", "Unique identifier (e.g. 'app_logs')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::integer("retention_days", "Retention in days.", 14),
];

const RETENTION_DAYS: &[i64] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

pub struct CreateLogGroup;

impl Capability for CreateLogGroup {
    fn name(&self) -> &'static str {
        "create_log_group"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon CloudWatch log group with a retention policy."
    }

    fn category(&self) -> Category {
        Category::Monitoring
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_cloudwatch_logs")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        LOG_GROUP_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(LOG_GROUP_PARAMS, params)?;
        let id = params.str("log_id");
        let retention = params.int("retention_days");
        if !RETENTION_DAYS.contains(&retention) {
            return Err(CapabilityError::InvalidValue {
                name: "retention_days",
                reason: format!("{retention} is not a CloudWatch retention period"),
            });
        }

        let code = format!(
            r#"resource "aws_cloudwatch_log_group" "{id}" {{
  name              = "/custom/${{var.project_name}}/{id}"
  retention_in_days = {retention}
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_cloudwatch_logs", params.label_or(id))
            .with_config("retention_days", retention)
            .with_file("monitoring.tf", code))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CreateCloudWatchAlarm, CreateLogGroup};
    use crate::capability::{Capability, CapabilityError};

    #[test]
    fn alarm_with_topic_notifies_it() {
        let result = CreateCloudWatchAlarm
            .execute(&json!({
                "alarm_id": "high_cpu",
                "label": "High CPU",
                "threshold": 90,
                "alarm_topic_id": "alerts"
            }))
            .expect("valid alarm");

        let code = result.files.get("monitoring.tf").expect("monitoring file");
        assert!(code.contains("threshold           = 90"));
        assert!(code.contains("aws_sns_topic.alerts.arn"));
        assert_eq!(result.edges[0].label, "notifies");
    }

    #[test]
    fn log_group_retention_must_be_supported() {
        let error = CreateLogGroup
            .execute(&json!({"log_id": "app_logs", "label": "App", "retention_days": 10}))
            .expect_err("unsupported retention");
        assert!(matches!(error, CapabilityError::InvalidValue { name: "retention_days", .. }));
    }
}
