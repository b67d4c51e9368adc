//! EC2 networking resource schema definitions

use learnings_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// IP protocol of a security group rule ("-1" is all traffic)
pub fn ip_protocol() -> AttributeType {
    types::one_of(&["tcp", "udp", "icmp", "-1"])
}

fn rule_fields(peer_field: &str) -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("IpProtocol", ip_protocol()).required(),
        AttributeSchema::new("CidrIp", types::cidr()),
        AttributeSchema::new("FromPort", AttributeType::Int),
        AttributeSchema::new("ToPort", AttributeType::Int),
        AttributeSchema::new("Description", AttributeType::String),
        AttributeSchema::new(peer_field, AttributeType::String),
    ]
}

/// AWS::EC2::VPC
///
/// See: https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-resource-ec2-vpc.html
pub fn vpc_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::VPC")
        .with_description("Virtual network of the stack")
        .attribute(
            AttributeSchema::new("CidrBlock", types::cidr())
                .required()
                .with_description("The IPv4 network range for the VPC, in CIDR notation"),
        )
        .attribute(
            AttributeSchema::new("EnableDnsHostnames", AttributeType::Bool).with_description(
                "Indicates whether instances launched in the VPC get DNS hostnames. Default: false",
            ),
        )
        .attribute(
            AttributeSchema::new("EnableDnsSupport", AttributeType::Bool).with_description(
                "Indicates whether the DNS resolution is supported for the VPC. Default: true",
            ),
        )
        .attribute(
            AttributeSchema::new(
                "InstanceTenancy",
                types::one_of(&["default", "dedicated", "host"]),
            )
            .with_description("The allowed tenancy of instances launched into the VPC"),
        )
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("CidrBlock")
        .returns("DefaultSecurityGroup")
        .returns("VpcId")
}

/// AWS::EC2::Subnet
pub fn subnet_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::Subnet")
        .with_description("Subnet in one availability zone")
        .attribute(
            AttributeSchema::new("VpcId", AttributeType::String)
                .required()
                .with_description("VPC the subnet belongs to"),
        )
        .attribute(
            AttributeSchema::new("CidrBlock", types::cidr())
                .required()
                .with_description("IPv4 block carved out of the VPC block"),
        )
        .attribute(AttributeSchema::new("AvailabilityZone", AttributeType::String))
        .attribute(AttributeSchema::new("MapPublicIpOnLaunch", AttributeType::Bool))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("SubnetId")
        .returns("AvailabilityZone")
}

/// AWS::EC2::InternetGateway
pub fn internet_gateway_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::InternetGateway")
        .with_description("Internet gateway attached to the VPC")
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("InternetGatewayId")
}

pub fn gateway_attachment_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::VPCGatewayAttachment")
        .attribute(AttributeSchema::new("VpcId", AttributeType::String).required())
        .attribute(AttributeSchema::new("InternetGatewayId", AttributeType::String))
}

/// AWS::EC2::RouteTable
pub fn route_table_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::RouteTable")
        .with_description("Route table of one subnet")
        .attribute(AttributeSchema::new("VpcId", AttributeType::String).required())
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("RouteTableId")
}

pub fn route_table_association_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::SubnetRouteTableAssociation")
        .attribute(AttributeSchema::new("RouteTableId", AttributeType::String).required())
        .attribute(AttributeSchema::new("SubnetId", AttributeType::String).required())
        .returns("Id")
}

/// AWS::EC2::Route
pub fn route_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::Route")
        .with_description("A route in a VPC route table")
        .attribute(AttributeSchema::new("RouteTableId", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("DestinationCidrBlock", types::cidr())
                .with_description("The IPv4 CIDR block used for the destination match"),
        )
        .attribute(
            AttributeSchema::new("GatewayId", AttributeType::String)
                .with_description("The ID of an internet gateway"),
        )
        .attribute(
            AttributeSchema::new("NatGatewayId", AttributeType::String)
                .with_description("The ID of a NAT gateway"),
        )
}

pub fn eip_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::EIP")
        .attribute(AttributeSchema::new("Domain", types::one_of(&["vpc", "standard"])))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("AllocationId")
        .returns("PublicIp")
}

pub fn nat_gateway_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::NatGateway")
        .attribute(AttributeSchema::new("SubnetId", AttributeType::String).required())
        .attribute(AttributeSchema::new("AllocationId", AttributeType::String))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("NatGatewayId")
}

/// AWS::EC2::SecurityGroup
pub fn security_group_schema() -> ResourceSchema {
    ResourceSchema::new("AWS::EC2::SecurityGroup")
        .with_description("Stateful firewall for ENIs in the VPC")
        .attribute(
            AttributeSchema::new("GroupDescription", AttributeType::String)
                .required()
                .with_description("A description for the security group"),
        )
        .attribute(AttributeSchema::new("GroupName", AttributeType::String))
        .attribute(AttributeSchema::new("VpcId", AttributeType::String))
        .attribute(AttributeSchema::new(
            "SecurityGroupIngress",
            AttributeType::List(Box::new(types::structure(
                "Ingress",
                rule_fields("SourceSecurityGroupId"),
            ))),
        ))
        .attribute(AttributeSchema::new(
            "SecurityGroupEgress",
            AttributeType::List(Box::new(types::structure(
                "Egress",
                rule_fields("DestinationSecurityGroupId"),
            ))),
        ))
        .attribute(AttributeSchema::new("Tags", types::tags()))
        .returns("GroupId")
        .returns("VpcId")
}

/// Standalone ingress rule between security groups
pub fn security_group_ingress_schema() -> ResourceSchema {
    rule_fields("SourceSecurityGroupId").into_iter().fold(
        ResourceSchema::new("AWS::EC2::SecurityGroupIngress")
            .with_description("An inbound rule of a security group")
            .attribute(AttributeSchema::new("GroupId", AttributeType::String).required()),
        ResourceSchema::attribute,
    )
}

/// Standalone egress rule between security groups
pub fn security_group_egress_schema() -> ResourceSchema {
    rule_fields("DestinationSecurityGroupId").into_iter().fold(
        ResourceSchema::new("AWS::EC2::SecurityGroupEgress")
            .with_description("An outbound rule of a security group")
            .attribute(AttributeSchema::new("GroupId", AttributeType::String).required()),
        ResourceSchema::attribute,
    )
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        vpc_schema(),
        subnet_schema(),
        internet_gateway_schema(),
        gateway_attachment_schema(),
        route_table_schema(),
        route_table_association_schema(),
        route_schema(),
        eip_schema(),
        nat_gateway_schema(),
        security_group_schema(),
        security_group_ingress_schema(),
        security_group_egress_schema(),
    ]
}
