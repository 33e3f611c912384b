use serde_json::Value;

use super::compute::bounded;
use crate::capability::{Capability, CapabilityError, CapabilityResult, Category, ParamSpec, Params};

const RDS_ENGINES: &[&str] = &["mysql", "postgres", "mariadb", "sqlserver-ex", "oracle-ee"];

const RDS_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("db_id", "Unique identifier (e.g. 'app_db')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string(
        "engine",
        "'mysql', 'postgres', 'mariadb', 'sqlserver-ex' or 'oracle-ee'.",
        "postgres",
    ),
    ParamSpec::string("engine_version", "Engine version.", "16.3"),
    ParamSpec::string("instance_class", "Instance class.", "db.t3.micro"),
    ParamSpec::integer("allocated_storage", "Storage in GB.", 20),
    ParamSpec::boolean("multi_az", "Deploy a standby in a second AZ.", false),
    ParamSpec::string("db_name", "Initial database name.", "appdb"),
    ParamSpec::string("username", "Master username.", "admin"),
];

/// Relational database instance. The master password is a sensitive variable keyed by id.
pub struct CreateRdsInstance;

impl Capability for CreateRdsInstance {
    fn name(&self) -> &'static str {
        "create_rds_instance"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon RDS relational database instance (PostgreSQL, MySQL, MariaDB, SQL Server or Oracle) with encrypted storage."
    }

    fn category(&self) -> Category {
        Category::Databases
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_rds")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        RDS_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(RDS_PARAMS, params)?;
        let id = params.str("db_id");
        let engine = params.str("engine");
        if !RDS_ENGINES.contains(&engine) {
            return Err(CapabilityError::InvalidValue {
                name: "engine",
                reason: format!("unsupported engine `{engine}`"),
            });
        }
        let engine_version = params.hcl("engine_version");
        let instance_class = params.hcl("instance_class");
        let storage = bounded(&params, "allocated_storage", 20, 65_536)?;
        let multi_az = params.bool("multi_az");
        let db_name = params.hcl("db_name");
        let username = params.hcl("username");

        let code = format!(
            r#"resource "aws_db_instance" "{id}" {{
  identifier          = "${{var.project_name}}-{id}"
  engine              = "{engine}"
  engine_version      = "{engine_version}"
  instance_class      = "{instance_class}"
  allocated_storage   = {storage}
  db_name             = "{db_name}"
  username            = "{username}"
  password            = var.{id}_password
  multi_az            = {multi_az}
  skip_final_snapshot = true
  storage_encrypted   = true
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}

variable "{id}_password" {{
  type      = string
  sensitive = true
  default   = "ChangeMe123!"
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_rds", params.label_or(id))
            .with_config("engine", engine)
            .with_config("instance_type", params.str("instance_class"))
            .with_config("allocated_storage", storage)
            .with_file("database.tf", code))
    }
}

const DYNAMODB_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("table_id", "Unique identifier (e.g. 'user_table')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string("table_name", "Table name. Defaults to '<project>-<table_id>'.", ""),
    ParamSpec::string("partition_key", "Partition key attribute name.", "id"),
    ParamSpec::string("sort_key", "Optional sort key attribute name.", ""),
    ParamSpec::string("billing_mode", "PAY_PER_REQUEST or PROVISIONED.", "PAY_PER_REQUEST"),
    ParamSpec::boolean("enable_streams", "Enable DynamoDB Streams.", false),
    ParamSpec::boolean("enable_point_in_time_recovery", "Enable PITR backup.", true),
];

pub struct CreateDynamoDb;

impl Capability for CreateDynamoDb {
    fn name(&self) -> &'static str {
        "create_dynamodb"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon DynamoDB NoSQL table with partition and optional sort keys. Use for key-value and document workloads."
    }

    fn category(&self) -> Category {
        Category::Databases
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_dynamodb")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        DYNAMODB_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(DYNAMODB_PARAMS, params)?;
        let id = params.str("table_id");
        let table_name = match params.opt_str("table_name") {
            Some(_) => params.hcl("table_name"),
            None => format!("${{var.project_name}}-{id}"),
        };
        let partition_key = params.hcl("partition_key");
        let billing = params.str("billing_mode");
        let billing_block = match billing {
            "PAY_PER_REQUEST" => "",
            "PROVISIONED" => "\n  read_capacity  = 5\n  write_capacity = 5",
            other => {
                return Err(CapabilityError::InvalidValue {
                    name: "billing_mode",
                    reason: format!("expected PAY_PER_REQUEST or PROVISIONED, got `{other}`"),
                })
            }
        };

        let (range_key, sort_attribute) = match params.opt_str("sort_key") {
            Some(_) => {
                let sort_key = params.hcl("sort_key");
                (
                    format!("\n  range_key    = \"{sort_key}\""),
                    format!("\n\n  attribute {{\n    name = \"{sort_key}\"\n    type = \"S\"\n  }}"),
                )
            }
            None => (String::new(), String::new()),
        };
        let streams = params.bool("enable_streams");
        let streams_block = if streams {
            "\n  stream_enabled   = true\n  stream_view_type = \"NEW_AND_OLD_IMAGES\""
        } else {
            ""
        };
        let pitr = params.bool("enable_point_in_time_recovery");

        let code = format!(
            r#"resource "aws_dynamodb_table" "{id}" {{
  name         = "{table_name}"
  billing_mode = "{billing}"{billing_block}
  hash_key     = "{partition_key}"{range_key}{streams_block}

  attribute {{
    name = "{partition_key}"
    type = "S"
  }}{sort_attribute}

  point_in_time_recovery {{
    enabled = {pitr}
  }}

  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_dynamodb", params.label_or(id))
            .with_config("billing_mode", billing)
            .with_config("pk", params.str("partition_key"))
            .with_config("streams", streams)
            .with_file("databases.tf", code))
    }
}

const ELASTICACHE_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("cache_id", "Unique identifier (e.g. 'session_cache')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string("engine", "redis or memcached.", "redis"),
    ParamSpec::string("node_type", "Instance type.", "cache.t3.micro"),
    ParamSpec::integer("num_nodes", "Number of cache nodes.", 1),
    ParamSpec::string("vpc_id", "VPC to deploy into.", "main_vpc").reference(),
];

pub struct CreateElastiCache;

impl Capability for CreateElastiCache {
    fn name(&self) -> &'static str {
        "create_elasticache"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon ElastiCache cluster (Redis or Memcached) in a VPC's private subnet. Use for caching and session storage."
    }

    fn category(&self) -> Category {
        Category::Databases
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_elasticache")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        ELASTICACHE_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(ELASTICACHE_PARAMS, params)?;
        let id = params.str("cache_id");
        let engine = params.str("engine");
        let (port, parameter_group) = match engine {
            "redis" => (6379, "default.redis7"),
            "memcached" => (11211, "default.memcached1.6"),
            other => {
                return Err(CapabilityError::InvalidValue {
                    name: "engine",
                    reason: format!("expected redis or memcached, got `{other}`"),
                })
            }
        };
        let node_type = params.hcl("node_type");
        let num_nodes = bounded(&params, "num_nodes", 1, 40)?;
        let vpc = params.str("vpc_id");

        let code = format!(
            r#"resource "aws_elasticache_subnet_group" "{id}_subnet_group" {{
  name       = "${{var.project_name}}-{id}-subnet"
  subnet_ids = [aws_subnet.{vpc}_private_0.id]
}}

resource "aws_elasticache_cluster" "{id}" {{
  cluster_id           = "${{var.project_name}}-{id}"
  engine               = "{engine}"
  node_type            = "{node_type}"
  num_cache_nodes      = {num_nodes}
  parameter_group_name = "{parameter_group}"
  port                 = {port}
  subnet_group_name    = aws_elasticache_subnet_group.{id}_subnet_group.name
  tags                 = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_elasticache", params.label_or(id))
            .with_config("engine", engine)
            .with_config("node_type", params.str("node_type"))
            .with_file("databases.tf", code))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CreateDynamoDb, CreateElastiCache, CreateRdsInstance};
    use crate::capability::{Capability, CapabilityError};

    #[test]
    fn rds_writes_database_file_with_keyed_password_variable() {
        let result = CreateRdsInstance
            .execute(&json!({"db_id": "app_db", "label": "App DB"}))
            .expect("valid rds");

        assert_eq!(result.node.node_type, "aws_rds");
        let code = result.files.get("database.tf").expect("database file");
        assert!(code.contains("password            = var.app_db_password"));
        assert!(code.contains(r#"variable "app_db_password" {"#));
    }

    #[test]
    fn dynamodb_defaults_table_name_and_omits_sort_key() {
        let result = CreateDynamoDb
            .execute(&json!({"table_id": "users", "label": "Users"}))
            .expect("valid table");

        let code = result.files.get("databases.tf").expect("databases file");
        assert!(code.contains(r#"name         = "${var.project_name}-users""#));
        assert!(!code.contains("range_key"));
        assert!(code.contains("enabled = true"));
    }

    #[test]
    fn dynamodb_sort_key_adds_attribute() {
        let result = CreateDynamoDb
            .execute(&json!({
                "table_id": "orders",
                "label": "Orders",
                "sort_key": "created_at",
                "billing_mode": "PROVISIONED"
            }))
            .expect("valid table");

        let code = result.files.get("databases.tf").expect("databases file");
        assert!(code.contains(r#"range_key    = "created_at""#));
        assert!(code.contains(r#"name = "created_at""#));
        assert!(code.contains("read_capacity  = 5"));
    }

    #[test]
    fn elasticache_rejects_unknown_engine() {
        let error = CreateElastiCache
            .execute(&json!({"cache_id": "c", "label": "C", "engine": "valkey"}))
            .expect_err("unknown engine");
        assert!(matches!(error, CapabilityError::InvalidValue { name: "engine", .. }));
    }
}
