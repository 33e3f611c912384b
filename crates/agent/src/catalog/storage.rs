use serde_json::Value;

use crate::capability::{Capability, CapabilityError, CapabilityResult, Category, ParamSpec, Params};

const S3_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("bucket_id", "Unique identifier (e.g. 'assets')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::boolean("versioning", "Enable object versioning.", true),
    ParamSpec::string("encryption", "'AES256' or 'aws:kms'.", "AES256"),
    ParamSpec::boolean("block_public_access", "Block all public access.", true),
];

pub struct CreateS3Bucket;

impl Capability for CreateS3Bucket {
    fn name(&self) -> &'static str {
        "create_s3_bucket"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon S3 bucket for object storage with versioning, encryption, and access control."
    }

    fn category(&self) -> Category {
        Category::Storage
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_s3")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        S3_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(S3_PARAMS, params)?;
        let id = params.str("bucket_id");
        let encryption = params.str("encryption");
        if encryption != "AES256" && encryption != "aws:kms" {
            return Err(CapabilityError::InvalidValue {
                name: "encryption",
                reason: format!("expected AES256 or aws:kms, got `{encryption}`"),
            });
        }
        let versioning = params.bool("versioning");
        let status = if versioning { "Enabled" } else { "Disabled" };
        let block = params.bool("block_public_access");

        let code = format!(
            r#"resource "aws_s3_bucket" "{id}" {{
  bucket = "${{var.project_name}}-{id}"
  tags   = {{ Name = "${{var.project_name}}-{id}" }}
}}

resource "aws_s3_bucket_versioning" "{id}_versioning" {{
  bucket = aws_s3_bucket.{id}.id
  versioning_configuration {{ status = "{status}" }}
}}

resource "aws_s3_bucket_server_side_encryption_configuration" "{id}_enc" {{
  bucket = aws_s3_bucket.{id}.id
  rule {{
    apply_server_side_encryption_by_default {{ sse_algorithm = "{encryption}" }}
  }}
}}

resource "aws_s3_bucket_public_access_block" "{id}_pab" {{
  bucket                  = aws_s3_bucket.{id}.id
  block_public_acls       = {block}
  block_public_policy     = {block}
  ignore_public_acls      = {block}
  restrict_public_buckets = {block}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_s3", params.label_or(id))
            .with_config("versioning", versioning)
            .with_config("encryption", encryption)
            .with_file("storage.tf", code))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::CreateS3Bucket;
    use crate::capability::{Capability, CapabilityError};

    #[test]
    fn bucket_emits_storage_file_with_named_block() {
        let result = CreateS3Bucket
            .execute(&json!({"bucket_id": "assets", "label": "Assets"}))
            .expect("valid bucket");

        assert_eq!(result.node.id, "assets");
        assert_eq!(result.node.node_type, "aws_s3");
        let code = result.files.get("storage.tf").expect("storage file");
        assert!(code.contains(r#"resource "aws_s3_bucket" "assets" {"#));
        assert!(code.contains(r#"bucket = "${var.project_name}-assets""#));
        assert!(code.contains(r#"status = "Enabled""#));
    }

    #[test]
    fn unknown_encryption_is_rejected() {
        let error = CreateS3Bucket
            .execute(&json!({"bucket_id": "assets", "label": "Assets", "encryption": "rot13"}))
            .expect_err("bad encryption");
        assert!(matches!(error, CapabilityError::InvalidValue { name: "encryption", .. }));
    }
}
