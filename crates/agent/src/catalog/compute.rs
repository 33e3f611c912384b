use serde_json::Value;

use crate::capability::{
    hcl_escape, Capability, CapabilityError, CapabilityResult, Category, ParamSpec, Params,
};

const LAMBDA_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("function_id", "Unique identifier (e.g. 'orders_fn')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string("runtime", "Lambda runtime (e.g. 'python3.12', 'nodejs20.x').", "python3.12"),
    ParamSpec::integer("memory", "Memory in MB (128-10240).", 256),
    ParamSpec::integer("timeout", "Timeout in seconds (1-900).", 30),
    ParamSpec::string("handler", "Handler function path.", "index.handler"),
];

/// Lambda functions reference a `<id>.zip` deployment package that the workspace
/// manager synthesizes when it is missing.
pub struct CreateLambdaFunction;

impl Capability for CreateLambdaFunction {
    fn name(&self) -> &'static str {
        "create_lambda_function"
    }

    fn description(&self) -> &'static str {
        "Create an AWS Lambda function with an execution role and log group. Use for serverless compute, API backends, and event handlers."
    }

    fn category(&self) -> Category {
        Category::Compute
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_lambda")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        LAMBDA_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(LAMBDA_PARAMS, params)?;
        let id = params.str("function_id");
        let runtime = params.hcl("runtime");
        let handler = params.hcl("handler");
        let memory = bounded(&params, "memory", 128, 10_240)?;
        let timeout = bounded(&params, "timeout", 1, 900)?;

        let code = format!(
            r#"resource "aws_lambda_function" "{id}" {{
  function_name = "${{var.project_name}}-{id}"
  role          = aws_iam_role.{id}_role.arn
  handler       = "{handler}"
  runtime       = "{runtime}"
  memory_size   = {memory}
  timeout       = {timeout}
  filename      = "{id}.zip"

  tags = {{
    Name = "${{var.project_name}}-{id}"
  }}
}}

resource "aws_iam_role" "{id}_role" {{
  name = "${{var.project_name}}-{id}-role"

  assume_role_policy = jsonencode({{
    Version = "2012-10-17"
    Statement = [{{
      Action = "sts:AssumeRole"
      Effect = "Allow"
      Principal = {{ Service = "lambda.amazonaws.com" }}
    }}]
  }})
}}

resource "aws_iam_role_policy_attachment" "{id}_basic" {{
  role       = aws_iam_role.{id}_role.name
  policy_arn = "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
}}

resource "aws_cloudwatch_log_group" "{id}_logs" {{
  name              = "/aws/lambda/${{var.project_name}}-{id}"
  retention_in_days = 14
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_lambda", params.label_or(id))
            .with_config("runtime", params.str("runtime"))
            .with_config("memory", memory)
            .with_config("timeout", timeout)
            .with_config("handler", params.str("handler"))
            .with_file("compute.tf", code))
    }
}

const EC2_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("instance_id", "Unique identifier (e.g. 'web_server')."),
    ParamSpec::required("label", "Human-readable label (e.g. 'Web Server')."),
    ParamSpec::string("instance_type", "EC2 instance type (e.g. 't3.micro', 'm5.large').", "t3.micro"),
    ParamSpec::string(
        "ami",
        "AMI ID or one of 'amazon-linux-2', 'ubuntu-22.04'.",
        "amazon-linux-2",
    ),
    ParamSpec::integer("storage_gb", "Root EBS volume size in GB.", 20),
    ParamSpec::boolean("associate_public_ip", "Assign a public IP address.", true),
    ParamSpec::string("key_pair_name", "SSH key pair name. Leave empty to skip.", ""),
];

pub struct CreateEc2Instance;

impl Capability for CreateEc2Instance {
    fn name(&self) -> &'static str {
        "create_ec2_instance"
    }

    fn description(&self) -> &'static str {
        "Provision an Amazon EC2 virtual server instance with configurable instance type, AMI, key pair, and storage. Use for traditional server workloads."
    }

    fn category(&self) -> Category {
        Category::Compute
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_ec2")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        EC2_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(EC2_PARAMS, params)?;
        let id = params.str("instance_id");
        let instance_type = params.hcl("instance_type");
        let ami = params.str("ami");
        let storage_gb = bounded(&params, "storage_gb", 8, 16_384)?;
        let public_ip = params.bool("associate_public_ip");

        // AMI data sources are keyed by instance so two instances never redeclare one.
        let (ami_ref, data_block) = match ami_lookup(ami) {
            Some((owner, pattern)) => {
                let source = format!("{}_{id}", ami.replace(['-', '.'], "_"));
                (
                    format!("data.aws_ami.{source}.id"),
                    format!(
                        r#"data "aws_ami" "{source}" {{
  most_recent = true
  owners      = ["{owner}"]

  filter {{
    name   = "name"
    values = ["{pattern}"]
  }}
}}
"#
                    ),
                )
            }
            None => (format!("\"{}\"", hcl_escape(ami)), String::new()),
        };

        let key_line = params
            .opt_str("key_pair_name")
            .map(|key| format!("  key_name      = \"{}\"\n", hcl_escape(key)))
            .unwrap_or_default();

        let code = format!(
            r#"resource "aws_instance" "{id}" {{
  ami           = {ami_ref}
  instance_type = "{instance_type}"
{key_line}
  root_block_device {{
    volume_size = {storage_gb}
    volume_type = "gp3"
  }}

  associate_public_ip_address = {public_ip}

  tags = {{
    Name = "${{var.project_name}}-{id}"
  }}
}}
"#
        );
        let code = if data_block.is_empty() { code } else { format!("{data_block}\n{code}") };

        Ok(CapabilityResult::resource(id, "aws_ec2", params.label_or(id))
            .with_config("instance_type", params.str("instance_type"))
            .with_config("ami", ami)
            .with_config("storage_gb", storage_gb)
            .with_file("compute.tf", code))
    }
}

const ECS_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("service_id", "Unique identifier (e.g. 'api_service')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::integer("cpu", "Task CPU units (256, 512, 1024, 2048, 4096).", 256),
    ParamSpec::integer("memory", "Task memory in MB.", 512),
    ParamSpec::integer("container_port", "Container port to expose.", 80),
    ParamSpec::integer("desired_count", "Number of tasks to run.", 2),
    ParamSpec::string("image", "Docker image URI.", "nginx:latest"),
    ParamSpec::string("vpc_id", "VPC whose public subnets host the tasks.", "main_vpc").reference(),
];

pub struct CreateEcsService;

impl Capability for CreateEcsService {
    fn name(&self) -> &'static str {
        "create_ecs_service"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon ECS Fargate service with cluster, task definition, execution role, and logging. Use for containerized applications."
    }

    fn category(&self) -> Category {
        Category::Compute
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_ecs")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        ECS_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(ECS_PARAMS, params)?;
        let id = params.str("service_id");
        let cpu = params.int("cpu");
        if ![256, 512, 1024, 2048, 4096].contains(&cpu) {
            return Err(CapabilityError::InvalidValue {
                name: "cpu",
                reason: format!("{cpu} is not a Fargate CPU size"),
            });
        }
        let memory = bounded(&params, "memory", 512, 30_720)?;
        let port = bounded(&params, "container_port", 1, 65_535)?;
        let count = bounded(&params, "desired_count", 0, 100)?;
        let image = params.hcl("image");
        let vpc = params.str("vpc_id");

        let code = format!(
            r#"resource "aws_ecs_cluster" "{id}_cluster" {{
  name = "${{var.project_name}}-{id}"
}}

resource "aws_ecs_task_definition" "{id}_task" {{
  family                   = "${{var.project_name}}-{id}"
  network_mode             = "awsvpc"
  requires_compatibilities = ["FARGATE"]
  cpu                      = "{cpu}"
  memory                   = "{memory}"
  execution_role_arn       = aws_iam_role.{id}_execution_role.arn

  container_definitions = jsonencode([{{
    name      = "{id}"
    image     = "{image}"
    cpu       = {cpu}
    memory    = {memory}
    essential = true
    portMappings = [{{
      containerPort = {port}
      protocol      = "tcp"
    }}]
    logConfiguration = {{
      logDriver = "awslogs"
      options = {{
        "awslogs-group"         = "/ecs/${{var.project_name}}-{id}"
        "awslogs-region"        = var.region
        "awslogs-stream-prefix" = "ecs"
      }}
    }}
  }}])
}}

resource "aws_ecs_service" "{id}" {{
  name            = "${{var.project_name}}-{id}"
  cluster         = aws_ecs_cluster.{id}_cluster.id
  task_definition = aws_ecs_task_definition.{id}_task.arn
  desired_count   = {count}
  launch_type     = "FARGATE"

  network_configuration {{
    assign_public_ip = true
    subnets          = [aws_subnet.{vpc}_public_0.id, aws_subnet.{vpc}_public_1.id]
  }}
}}

resource "aws_iam_role" "{id}_execution_role" {{
  name = "${{var.project_name}}-{id}-exec-role"
  assume_role_policy = jsonencode({{
    Version = "2012-10-17"
    Statement = [{{
      Action = "sts:AssumeRole"
      Effect = "Allow"
      Principal = {{ Service = "ecs-tasks.amazonaws.com" }}
    }}]
  }})
}}

resource "aws_iam_role_policy_attachment" "{id}_exec_policy" {{
  role       = aws_iam_role.{id}_execution_role.name
  policy_arn = "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy"
}}

resource "aws_cloudwatch_log_group" "{id}_logs" {{
  name              = "/ecs/${{var.project_name}}-{id}"
  retention_in_days = 14
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_ecs", params.label_or(id))
            .with_config("cpu", cpu)
            .with_config("memory", memory)
            .with_config("container_port", port)
            .with_config("desired_count", count)
            .with_config("image", params.str("image"))
            .with_file("compute.tf", code))
    }
}

fn ami_lookup(alias: &str) -> Option<(&'static str, &'static str)> {
    match alias {
        "amazon-linux-2" => Some(("amazon", "amzn2-ami-hvm-*-x86_64-gp2")),
        "ubuntu-22.04" => {
            Some(("099720109477", "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-amd64-server-*"))
        }
        _ => None,
    }
}

/// Reads an integer parameter and rejects values outside `min..=max`.
pub(crate) fn bounded(
    params: &Params,
    name: &'static str,
    min: i64,
    max: i64,
) -> Result<i64, CapabilityError> {
    let value = params.int(name);
    if value < min || value > max {
        return Err(CapabilityError::InvalidValue {
            name,
            reason: format!("{value} is outside {min}..={max}"),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CreateEc2Instance, CreateEcsService, CreateLambdaFunction};
    use crate::capability::{Capability, CapabilityError};

    #[test]
    fn lambda_references_its_deployment_archive() {
        let result = CreateLambdaFunction
            .execute(&json!({"function_id": "orders_fn", "label": "Orders"}))
            .expect("valid lambda");

        assert_eq!(result.node.node_type, "aws_lambda");
        assert_eq!(result.node.config["runtime"], json!("python3.12"));
        let code = result.files.get("compute.tf").expect("compute file");
        assert!(code.contains(r#"filename      = "orders_fn.zip""#));
        assert!(code.contains("aws_iam_role.orders_fn_role.arn"));
    }

    #[test]
    fn lambda_memory_bounds_are_enforced() {
        let error = CreateLambdaFunction
            .execute(&json!({"function_id": "f", "label": "F", "memory": 64}))
            .expect_err("memory too small");
        assert!(matches!(error, CapabilityError::InvalidValue { name: "memory", .. }));
    }

    #[test]
    fn ec2_alias_ami_emits_keyed_data_source() {
        let result = CreateEc2Instance
            .execute(&json!({"instance_id": "web", "label": "Web"}))
            .expect("valid instance");

        let code = result.files.get("compute.tf").expect("compute file");
        assert!(code.contains("ami           = data.aws_ami.amazon_linux_2_web.id"));
        assert!(code.contains(r#"data "aws_ami" "amazon_linux_2_web" {"#));
    }

    #[test]
    fn ec2_literal_ami_has_no_data_source() {
        let result = CreateEc2Instance
            .execute(&json!({"instance_id": "web", "label": "Web", "ami": "ami-123"}))
            .expect("valid instance");

        let code = result.files.get("compute.tf").expect("compute file");
        assert!(code.contains(r#"ami           = "ami-123""#));
        assert!(!code.contains("data \"aws_ami\""));
    }

    #[test]
    fn ecs_rejects_non_fargate_cpu() {
        let error = CreateEcsService
            .execute(&json!({"service_id": "api", "label": "API", "cpu": 300}))
            .expect_err("bad cpu");
        assert!(matches!(error, CapabilityError::InvalidValue { name: "cpu", .. }));
    }
}
