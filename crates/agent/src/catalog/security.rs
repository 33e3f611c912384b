use serde_json::Value;

use super::compute::bounded;
use crate::capability::{
    hcl_escape, Capability, CapabilityError, CapabilityResult, Category, ParamSpec, Params,
};

const IAM_ROLE_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("role_id", "Unique identifier (e.g. 'worker_role')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string(
        "trusted_service",
        "AWS service principal (e.g. 'lambda.amazonaws.com').",
        "lambda.amazonaws.com",
    )
    .mandatory(),
    ParamSpec::string_list("managed_policy_arns", "Managed policy ARNs to attach.", &[]),
];

pub struct CreateIamRole;

impl Capability for CreateIamRole {
    fn name(&self) -> &'static str {
        "create_iam_role"
    }

    fn description(&self) -> &'static str {
        "Create an AWS IAM role assumable by a service, with optional managed policy attachments."
    }

    fn category(&self) -> Category {
        Category::Security
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_iam_role")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        IAM_ROLE_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(IAM_ROLE_PARAMS, params)?;
        let id = params.str("role_id");
        let service = params.hcl("trusted_service");
        let policies = params.str_list("managed_policy_arns");

        let mut code = format!(
            r#"resource "aws_iam_role" "{id}" {{
  name = "${{var.project_name}}-{id}"
  assume_role_policy = jsonencode({{
    Version = "2012-10-17"
    Statement = [{{
      Action = "sts:AssumeRole"
      Effect = "Allow"
      Principal = {{ Service = "{service}" }}
    }}]
  }})
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );
        for (index, arn) in policies.iter().enumerate() {
            let arn = hcl_escape(arn);
            code.push_str(&format!(
                r#"
resource "aws_iam_role_policy_attachment" "{id}_policy_{index}" {{
  role       = aws_iam_role.{id}.name
  policy_arn = "{arn}"
}}
"#
            ));
        }

        Ok(CapabilityResult::resource(id, "aws_iam_role", params.label_or(id))
            .with_config("trusted_service", params.str("trusted_service"))
            .with_config("policy_count", policies.len())
            .with_file("security.tf", code))
    }
}

const COGNITO_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("pool_id", "Unique identifier (e.g. 'user_pool')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string_list("auto_verify", "Attributes verified automatically.", &["email"]),
    ParamSpec::integer("password_min_length", "Minimum password length.", 8),
    ParamSpec::boolean("mfa_enabled", "Require MFA for login.", false),
];

pub struct CreateCognitoUserPool;

impl Capability for CreateCognitoUserPool {
    fn name(&self) -> &'static str {
        "create_cognito_user_pool"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon Cognito user pool with an app client for user sign-up and authentication."
    }

    fn category(&self) -> Category {
        Category::Security
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_cognito")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        COGNITO_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(COGNITO_PARAMS, params)?;
        let id = params.str("pool_id");
        let auto_verify = params
            .str_list("auto_verify")
            .iter()
            .map(|attribute| match attribute.as_str() {
                "email" | "phone_number" => Ok(format!("\"{attribute}\"")),
                other => Err(CapabilityError::InvalidValue {
                    name: "auto_verify",
                    reason: format!("`{other}` is not email or phone_number"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let min_length = bounded(&params, "password_min_length", 6, 99)?;
        let mfa = params.bool("mfa_enabled");
        let mfa_line = if mfa { "\n  mfa_configuration        = \"ON\"\n  software_token_mfa_configuration {\n    enabled = true\n  }" } else { "" };

        let code = format!(
            r#"resource "aws_cognito_user_pool" "{id}" {{
  name                     = "${{var.project_name}}-{id}"
  auto_verified_attributes = [{auto_verify}]{mfa_line}
  password_policy {{
    minimum_length = {min_length}
  }}
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}

resource "aws_cognito_user_pool_client" "{id}_client" {{
  name                = "${{var.project_name}}-{id}-client"
  user_pool_id        = aws_cognito_user_pool.{id}.id
  explicit_auth_flows = ["ALLOW_USER_PASSWORD_AUTH", "ALLOW_REFRESH_TOKEN_AUTH"]
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_cognito", params.label_or(id))
            .with_config("mfa_enabled", mfa)
            .with_file("security.tf", code))
    }
}
