use serde_json::{Map, Value};

use super::compute::bounded;
use crate::capability::{
    hcl_escape, Capability, CapabilityError, CapabilityResult, Category, ParamSpec, Params,
};

const VPC_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("vpc_id", "Unique identifier (e.g. 'main_vpc')."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string("cidr_block", "VPC CIDR block.", "10.0.0.0/16"),
    ParamSpec::integer("availability_zones", "Number of AZs (2 or 3).", 2),
    ParamSpec::boolean("enable_nat", "Create a NAT gateway for private subnets.", true),
];

/// A VPC with an internet gateway and one public plus one private subnet per AZ.
pub struct CreateVpc;

impl Capability for CreateVpc {
    fn name(&self) -> &'static str {
        "create_vpc"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon VPC with public and private subnets across availability zones, an internet gateway, and an optional NAT gateway."
    }

    fn category(&self) -> Category {
        Category::Networking
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_vpc")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        VPC_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(VPC_PARAMS, params)?;
        let id = params.str("vpc_id");
        let cidr = params.hcl("cidr_block");
        let azs = bounded(&params, "availability_zones", 1, 6)?;
        let nat = params.bool("enable_nat");

        let mut code = format!(
            r#"data "aws_availability_zones" "available" {{
  state = "available"
}}

resource "aws_vpc" "{id}" {{
  cidr_block           = "{cidr}"
  enable_dns_support   = true
  enable_dns_hostnames = true
  tags = {{ Name = "${{var.project_name}}-vpc" }}
}}

resource "aws_internet_gateway" "{id}_igw" {{
  vpc_id = aws_vpc.{id}.id
  tags = {{ Name = "${{var.project_name}}-igw" }}
}}

resource "aws_route_table" "{id}_public" {{
  vpc_id = aws_vpc.{id}.id
  route {{
    cidr_block = "0.0.0.0/0"
    gateway_id = aws_internet_gateway.{id}_igw.id
  }}
  tags = {{ Name = "${{var.project_name}}-public-rt" }}
}}
"#
        );

        for index in 0..azs {
            let private = index + 10;
            code.push_str(&format!(
                r#"
resource "aws_subnet" "{id}_public_{index}" {{
  vpc_id                  = aws_vpc.{id}.id
  cidr_block              = cidrsubnet(aws_vpc.{id}.cidr_block, 8, {index})
  availability_zone       = data.aws_availability_zones.available.names[{index}]
  map_public_ip_on_launch = true
  tags = {{ Name = "${{var.project_name}}-public-{index}" }}
}}

resource "aws_subnet" "{id}_private_{index}" {{
  vpc_id            = aws_vpc.{id}.id
  cidr_block        = cidrsubnet(aws_vpc.{id}.cidr_block, 8, {private})
  availability_zone = data.aws_availability_zones.available.names[{index}]
  tags = {{ Name = "${{var.project_name}}-private-{index}" }}
}}
"#
            ));
        }

        if nat {
            code.push_str(&format!(
                r#"
resource "aws_eip" "{id}_nat_eip" {{
  domain = "vpc"
  tags = {{ Name = "${{var.project_name}}-nat-eip" }}
}}

resource "aws_nat_gateway" "{id}_nat" {{
  allocation_id = aws_eip.{id}_nat_eip.id
  subnet_id     = aws_subnet.{id}_public_0.id
  tags = {{ Name = "${{var.project_name}}-nat" }}
}}

resource "aws_route_table" "{id}_private" {{
  vpc_id = aws_vpc.{id}.id
  route {{
    cidr_block     = "0.0.0.0/0"
    nat_gateway_id = aws_nat_gateway.{id}_nat.id
  }}
  tags = {{ Name = "${{var.project_name}}-private-rt" }}
}}
"#
            ));
        }

        Ok(CapabilityResult::resource(id, "aws_vpc", params.label_or(id))
            .with_config("cidr_block", params.str("cidr_block"))
            .with_config("azs", azs)
            .with_config("nat", nat)
            .with_file("networking.tf", code))
    }
}

const SUBNET_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("subnet_id", "Unique identifier."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::id("vpc_id", "VPC resource id this subnet belongs to."),
    ParamSpec::string("cidr_block", "Subnet CIDR block.", "10.0.100.0/24").mandatory(),
    ParamSpec::boolean("is_public", "Map public IPs on launch.", false),
    ParamSpec::integer("az_index", "AZ index (0, 1, 2).", 0),
];

pub struct CreateSubnet;

impl Capability for CreateSubnet {
    fn name(&self) -> &'static str {
        "create_subnet"
    }

    fn description(&self) -> &'static str {
        "Create an additional subnet inside an existing VPC."
    }

    fn category(&self) -> Category {
        Category::Networking
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_subnet")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        SUBNET_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(SUBNET_PARAMS, params)?;
        let id = params.str("subnet_id");
        let vpc = params.str("vpc_id");
        let cidr = params.hcl("cidr_block");
        let public = params.bool("is_public");
        let az_index = bounded(&params, "az_index", 0, 5)?;

        let code = format!(
            r#"resource "aws_subnet" "{id}" {{
  vpc_id                  = aws_vpc.{vpc}.id
  cidr_block              = "{cidr}"
  availability_zone       = data.aws_availability_zones.available.names[{az_index}]
  map_public_ip_on_launch = {public}
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_subnet", params.label_or(id))
            .with_config("cidr_block", params.str("cidr_block"))
            .with_config("is_public", public)
            .with_file("networking.tf", code)
            .with_edge(vpc, id, "contains"))
    }
}

const SECURITY_GROUP_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("sg_id", "Unique identifier."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::id("vpc_id", "VPC resource id."),
    ParamSpec::object_list(
        "ingress_rules",
        "Ingress rules with from_port, to_port, protocol, cidr_blocks and description. Defaults to HTTPS from anywhere.",
    ),
];

pub struct CreateSecurityGroup;

impl Capability for CreateSecurityGroup {
    fn name(&self) -> &'static str {
        "create_security_group"
    }

    fn description(&self) -> &'static str {
        "Create a VPC security group with ingress rules and open egress."
    }

    fn category(&self) -> Category {
        Category::Networking
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_security_group")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        SECURITY_GROUP_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(SECURITY_GROUP_PARAMS, params)?;
        let id = params.str("sg_id");
        let vpc = params.str("vpc_id");
        let label = params.label_or(id);

        let mut rules = params.objects("ingress_rules");
        if rules.is_empty() {
            rules.push(Map::new());
        }
        let ingress = rules.iter().map(ingress_block).collect::<Result<Vec<_>, _>>()?.concat();
        let description = hcl_escape(&label);

        let code = format!(
            r#"resource "aws_security_group" "{id}" {{
  name        = "${{var.project_name}}-{id}"
  description = "{description}"
  vpc_id      = aws_vpc.{vpc}.id
{ingress}
  egress {{
    from_port   = 0
    to_port     = 0
    protocol    = "-1"
    cidr_blocks = ["0.0.0.0/0"]
  }}

  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_security_group", label)
            .with_config("vpc_id", vpc)
            .with_config("rules_count", rules.len())
            .with_file("networking.tf", code)
            .with_edge(vpc, id, "contains"))
    }
}

/// Missing rule fields fall back to HTTPS over TCP from anywhere.
fn ingress_block(rule: &Map<String, Value>) -> Result<String, CapabilityError> {
    let port = |key: &'static str| -> Result<i64, CapabilityError> {
        match rule.get(key) {
            None | Some(Value::Null) => Ok(443),
            Some(value) => value
                .as_i64()
                .filter(|port| (0..=65_535).contains(port))
                .ok_or(CapabilityError::InvalidValue {
                    name: "ingress_rules",
                    reason: format!("`{key}` must be a port number"),
                }),
        }
    };
    let from_port = port("from_port")?;
    let to_port = port("to_port")?;
    let protocol = hcl_escape(rule.get("protocol").and_then(Value::as_str).unwrap_or("tcp"));
    let description = hcl_escape(rule.get("description").and_then(Value::as_str).unwrap_or(""));
    let cidrs = match rule.get("cidr_blocks").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|cidr| format!("\"{}\"", hcl_escape(cidr)))
            .collect::<Vec<_>>()
            .join(", "),
        None => "\"0.0.0.0/0\"".to_string(),
    };

    Ok(format!(
        r#"
  ingress {{
    from_port   = {from_port}
    to_port     = {to_port}
    protocol    = "{protocol}"
    cidr_blocks = [{cidrs}]
    description = "{description}"
  }}
"#
    ))
}

const API_GATEWAY_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("gateway_id", "Unique identifier."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string("api_type", "'HTTP' or 'REST'.", "HTTP"),
    ParamSpec::boolean("cors_enabled", "Allow cross-origin requests.", true),
    ParamSpec::string("stage_name", "Deployment stage name.", "prod"),
];

pub struct CreateApiGateway;

impl Capability for CreateApiGateway {
    fn name(&self) -> &'static str {
        "create_api_gateway"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon API Gateway (HTTP or REST) with a deployment stage. Use as the public entry point for APIs."
    }

    fn category(&self) -> Category {
        Category::Networking
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_apigatewayv2")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        API_GATEWAY_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(API_GATEWAY_PARAMS, params)?;
        let id = params.str("gateway_id");
        let stage = params.hcl("stage_name");
        let api_type = params.str("api_type").to_ascii_uppercase();

        let code = match api_type.as_str() {
            "HTTP" => {
                let cors = if params.bool("cors_enabled") {
                    r#"
  cors_configuration {
    allow_origins = ["*"]
    allow_methods = ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
    allow_headers = ["*"]
    max_age       = 3600
  }
"#
                } else {
                    ""
                };
                format!(
                    r#"resource "aws_apigatewayv2_api" "{id}" {{
  name          = "${{var.project_name}}-{id}"
  protocol_type = "HTTP"{cors}
}}

resource "aws_apigatewayv2_stage" "{id}_stage" {{
  api_id      = aws_apigatewayv2_api.{id}.id
  name        = "{stage}"
  auto_deploy = true
}}
"#
                )
            }
            "REST" => format!(
                r#"resource "aws_api_gateway_rest_api" "{id}" {{
  name = "${{var.project_name}}-{id}"
}}

resource "aws_api_gateway_deployment" "{id}_deploy" {{
  rest_api_id = aws_api_gateway_rest_api.{id}.id
}}

resource "aws_api_gateway_stage" "{id}_stage" {{
  rest_api_id   = aws_api_gateway_rest_api.{id}.id
  deployment_id = aws_api_gateway_deployment.{id}_deploy.id
  stage_name    = "{stage}"
}}
"#
            ),
            other => {
                return Err(CapabilityError::InvalidValue {
                    name: "api_type",
                    reason: format!("expected HTTP or REST, got `{other}`"),
                })
            }
        };

        Ok(CapabilityResult::resource(id, "aws_apigatewayv2", params.label_or(id))
            .with_config("api_type", api_type)
            .with_file("networking.tf", code))
    }
}

const LOAD_BALANCER_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("lb_id", "Unique identifier."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::string("type", "'application' (ALB) or 'network' (NLB).", "application"),
    ParamSpec::boolean("internal", "Internal-only load balancer.", false),
    ParamSpec::integer("listener_port", "Listener port.", 80),
    ParamSpec::integer("target_port", "Target group port.", 80),
    ParamSpec::string("health_check_path", "Health check path.", "/"),
    ParamSpec::string("vpc_id", "VPC whose public subnets host the load balancer.", "main_vpc")
        .reference(),
];

pub struct CreateLoadBalancer;

impl Capability for CreateLoadBalancer {
    fn name(&self) -> &'static str {
        "create_load_balancer"
    }

    fn description(&self) -> &'static str {
        "Create an Elastic Load Balancer (application or network) with a listener and target group."
    }

    fn category(&self) -> Category {
        Category::Networking
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_lb")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        LOAD_BALANCER_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(LOAD_BALANCER_PARAMS, params)?;
        let id = params.str("lb_id");
        let lb_type = params.str("type");
        let protocol = match lb_type {
            "application" => "HTTP",
            "network" => "TCP",
            other => {
                return Err(CapabilityError::InvalidValue {
                    name: "type",
                    reason: format!("expected application or network, got `{other}`"),
                })
            }
        };
        let internal = params.bool("internal");
        let listener_port = bounded(&params, "listener_port", 1, 65_535)?;
        let target_port = bounded(&params, "target_port", 1, 65_535)?;
        let health_path = params.hcl("health_check_path");
        let vpc = params.str("vpc_id");

        let code = format!(
            r#"resource "aws_lb" "{id}" {{
  name               = "${{var.project_name}}-{id}"
  internal           = {internal}
  load_balancer_type = "{lb_type}"
  subnets            = [aws_subnet.{vpc}_public_0.id, aws_subnet.{vpc}_public_1.id]
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}

resource "aws_lb_target_group" "{id}_tg" {{
  name     = "${{var.project_name}}-{id}-tg"
  port     = {target_port}
  protocol = "{protocol}"
  vpc_id   = aws_vpc.{vpc}.id
  health_check {{
    path                = "{health_path}"
    healthy_threshold   = 3
    unhealthy_threshold = 3
  }}
}}

resource "aws_lb_listener" "{id}_listener" {{
  load_balancer_arn = aws_lb.{id}.arn
  port              = {listener_port}
  protocol          = "{protocol}"
  default_action {{
    type             = "forward"
    target_group_arn = aws_lb_target_group.{id}_tg.arn
  }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_lb", params.label_or(id))
            .with_config("lb_type", lb_type)
            .with_config("internal", internal)
            .with_file("networking.tf", code))
    }
}

const CLOUDFRONT_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("cf_id", "Unique identifier."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::required("origin_domain", "Origin domain name or S3 bucket domain."),
    ParamSpec::integer("default_ttl", "Default cache TTL in seconds.", 86_400),
    ParamSpec::string("price_class", "CloudFront price class.", "PriceClass_100"),
];

pub struct CreateCloudFrontDistribution;

impl Capability for CreateCloudFrontDistribution {
    fn name(&self) -> &'static str {
        "create_cloudfront_distribution"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon CloudFront CDN distribution in front of an origin such as an S3 bucket or load balancer."
    }

    fn category(&self) -> Category {
        Category::Networking
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_cloudfront")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        CLOUDFRONT_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(CLOUDFRONT_PARAMS, params)?;
        let id = params.str("cf_id");
        let origin = params.hcl("origin_domain");
        let ttl = bounded(&params, "default_ttl", 0, 31_536_000)?;
        let price_class = params.hcl("price_class");

        let code = format!(
            r#"resource "aws_cloudfront_distribution" "{id}" {{
  enabled             = true
  default_root_object = "index.html"
  price_class         = "{price_class}"

  origin {{
    domain_name = "{origin}"
    origin_id   = "{id}-origin"
  }}

  default_cache_behavior {{
    allowed_methods        = ["GET", "HEAD"]
    cached_methods         = ["GET", "HEAD"]
    target_origin_id       = "{id}-origin"
    viewer_protocol_policy = "redirect-to-https"
    default_ttl            = {ttl}

    forwarded_values {{
      query_string = false
      cookies {{ forward = "none" }}
    }}
  }}

  restrictions {{
    geo_restriction {{ restriction_type = "none" }}
  }}

  viewer_certificate {{
    cloudfront_default_certificate = true
  }}

  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_cloudfront", params.label_or(id))
            .with_config("origin_domain", params.str("origin_domain"))
            .with_file("networking.tf", code))
    }
}

const ROUTE53_PARAMS: &[ParamSpec] = &[
    ParamSpec::id("zone_id", "Unique identifier."),
    ParamSpec::required("label", "Human-readable label."),
    ParamSpec::required("domain_name", "Domain name (e.g. 'example.com')."),
    ParamSpec::boolean("is_private", "Private hosted zone.", false),
];

pub struct CreateRoute53Zone;

impl Capability for CreateRoute53Zone {
    fn name(&self) -> &'static str {
        "create_route53_zone"
    }

    fn description(&self) -> &'static str {
        "Create an Amazon Route 53 hosted zone for a domain."
    }

    fn category(&self) -> Category {
        Category::Networking
    }

    fn node_type(&self) -> Option<&'static str> {
        Some("aws_route53")
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        ROUTE53_PARAMS
    }

    fn execute(&self, params: &Value) -> Result<CapabilityResult, CapabilityError> {
        let params = Params::parse(ROUTE53_PARAMS, params)?;
        let id = params.str("zone_id");
        let domain = params.hcl("domain_name");

        let code = format!(
            r#"resource "aws_route53_zone" "{id}" {{
  name = "{domain}"
  tags = {{ Name = "${{var.project_name}}-{id}" }}
}}
"#
        );

        Ok(CapabilityResult::resource(id, "aws_route53", params.label_or(id))
            .with_config("domain", params.str("domain_name"))
            .with_config("is_private", params.bool("is_private"))
            .with_file("networking.tf", code))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{CreateApiGateway, CreateSecurityGroup, CreateSubnet, CreateVpc};
    use crate::capability::{Capability, CapabilityError};

    #[test]
    fn vpc_emits_subnets_per_availability_zone() {
        let result = CreateVpc
            .execute(&json!({"vpc_id": "main_vpc", "label": "Main", "availability_zones": 3}))
            .expect("valid vpc");

        let code = result.files.get("networking.tf").expect("networking file");
        assert!(code.contains(r#"resource "aws_subnet" "main_vpc_public_2" {"#));
        assert!(code.contains(r#"resource "aws_nat_gateway" "main_vpc_nat" {"#));
        assert!(result.edges.is_empty());
    }

    #[test]
    fn subnet_is_contained_by_its_vpc() {
        let result = CreateSubnet
            .execute(&json!({
                "subnet_id": "data_subnet",
                "label": "Data",
                "vpc_id": "main_vpc",
                "cidr_block": "10.0.50.0/24"
            }))
            .expect("valid subnet");

        assert_eq!(result.edges.len(), 1);
        assert_eq!(result.edges[0].source, "main_vpc");
        assert_eq!(result.edges[0].target, "data_subnet");
        assert_eq!(result.edges[0].label, "contains");
    }

    #[test]
    fn security_group_defaults_to_https_ingress() {
        let result = CreateSecurityGroup
            .execute(&json!({"sg_id": "web_sg", "label": "Web", "vpc_id": "main_vpc"}))
            .expect("valid group");

        let code = result.files.get("networking.tf").expect("networking file");
        assert!(code.contains("from_port   = 443"));
        assert!(code.contains(r#"cidr_blocks = ["0.0.0.0/0"]"#));
        assert_eq!(result.node.config["rules_count"], json!(1));
    }

    #[test]
    fn security_group_rejects_bad_ports() {
        let error = CreateSecurityGroup
            .execute(&json!({
                "sg_id": "web_sg",
                "label": "Web",
                "vpc_id": "main_vpc",
                "ingress_rules": [{"from_port": "http"}]
            }))
            .expect_err("bad port");
        assert!(matches!(error, CapabilityError::InvalidValue { name: "ingress_rules", .. }));
    }

    #[test]
    fn api_gateway_supports_rest_flavour() {
        let result = CreateApiGateway
            .execute(&json!({"gateway_id": "api", "label": "API", "api_type": "rest"}))
            .expect("valid gateway");

        let code = result.files.get("networking.tf").expect("networking file");
        assert!(code.contains(r#"resource "aws_api_gateway_rest_api" "api" {"#));
        assert_eq!(result.node.node_type, "aws_apigatewayv2");
    }
}
