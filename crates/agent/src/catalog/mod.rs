//! Built-in capability catalog, one capability per resource kind.

pub mod compute;
pub mod connect;
pub mod databases;
pub mod messaging;
pub mod monitoring;
pub mod networking;
pub mod security;
pub mod storage;

use crate::capability::Capability;

pub use connect::CONNECT_SERVICES;

/// Every built-in capability, in registration order.
pub fn builtin() -> Vec<Box<dyn Capability>> {
    vec![
        Box::new(connect::ConnectServices),
        Box::new(compute::CreateLambdaFunction),
        Box::new(compute::CreateEc2Instance),
        Box::new(compute::CreateEcsService),
        Box::new(networking::CreateVpc),
        Box::new(networking::CreateSubnet),
        Box::new(networking::CreateSecurityGroup),
        Box::new(networking::CreateApiGateway),
        Box::new(networking::CreateLoadBalancer),
        Box::new(networking::CreateCloudFrontDistribution),
        Box::new(networking::CreateRoute53Zone),
        Box::new(storage::CreateS3Bucket),
        Box::new(databases::CreateRdsInstance),
        Box::new(databases::CreateDynamoDb),
        Box::new(databases::CreateElastiCache),
        Box::new(messaging::CreateSqsQueue),
        Box::new(messaging::CreateSnsTopic),
        Box::new(messaging::CreateEventBridgeRule),
        Box::new(security::CreateIamRole),
        Box::new(security::CreateCognitoUserPool),
        Box::new(monitoring::CreateCloudWatchAlarm),
        Box::new(monitoring::CreateLogGroup),
    ]
}
