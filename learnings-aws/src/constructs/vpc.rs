//! VPC construct: subnets, gateways and routes across availability zones

use std::net::Ipv4Addr;

use learnings_core::resource::{Resource, Value};
use learnings_core::schema::parse_cidr;
use learnings_core::stack::Stack;

use super::{child, name_tag, tag};
use crate::error::BuildError;

/// Smallest subnet AWS allows
const MIN_SUBNET_PREFIX: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetType {
    Public,
    Private,
}

impl SubnetType {
    pub fn name(&self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::Private => "Private",
        }
    }
}

/// Split a CIDR block into `count` equal subnets
///
/// The prefix grows by the number of bits needed to address `count` blocks,
/// so six subnets of `10.1.0.0/16` are `/19` blocks starting at `10.1.0.0`,
/// `10.1.32.0`, `10.1.64.0`, and so on.
pub fn split_cidr(cidr: &str, count: usize) -> Result<Vec<String>, BuildError> {
    let error = |reason: String| BuildError::SubnetSplit {
        cidr: cidr.to_string(),
        count,
        reason,
    };

    let (address, prefix) = parse_cidr(cidr).map_err(error)?;
    let prefix = u32::from(prefix);
    if count == 0 {
        return Err(error("at least one subnet is required".to_string()));
    }

    let extra_bits = (count as u32).next_power_of_two().trailing_zeros();
    let subnet_prefix = prefix + extra_bits;
    if subnet_prefix > MIN_SUBNET_PREFIX {
        return Err(error("subnets would be smaller than /28".to_string()));
    }

    let base = u32::from(address) & mask(prefix);
    let size = 1u32 << (32 - subnet_prefix);
    Ok((0..count as u32)
        .map(|i| format!("{}/{}", Ipv4Addr::from(base + i * size), subnet_prefix))
        .collect())
}

fn mask(prefix: u32) -> u32 {
    if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) }
}

#[derive(Debug, Clone)]
pub struct VpcProps {
    pub cidr: String,
    pub max_azs: usize,
}

/// A subnet and the resources routing its traffic
#[derive(Debug, Clone)]
pub struct Subnet {
    pub logical_id: String,
    pub subnet_type: SubnetType,
    pub route_table: String,
    /// Default route; internet-facing resources wait for the public ones
    pub default_route: String,
    pub nat_gateway: Option<String>,
}

impl Subnet {
    pub fn subnet_id(&self) -> Value {
        Value::ref_to(&self.logical_id)
    }
}

/// A declared VPC
#[derive(Debug, Clone)]
pub struct Vpc {
    logical_id: String,
    pub public_subnets: Vec<Subnet>,
    pub private_subnets: Vec<Subnet>,
}

impl Vpc {
    /// Declare a VPC with one public and one private subnet per availability zone
    ///
    /// Each public subnet holds a NAT gateway that the private subnet of the
    /// same zone routes through.
    pub fn new(stack: &mut Stack, id: &str, props: VpcProps) -> Result<Self, BuildError> {
        let blocks = split_cidr(&props.cidr, props.max_azs * 2)?;
        let (public_blocks, private_blocks) = blocks.split_at(props.max_azs);

        let vpc = Resource::at_path("AWS::EC2::VPC", child(id, "Resource"))
            .with_attribute("CidrBlock", props.cidr.as_str())
            .with_attribute("EnableDnsHostnames", true)
            .with_attribute("EnableDnsSupport", true)
            .with_attribute("InstanceTenancy", "default")
            .with_attribute("Tags", name_tag(stack, id));
        let logical_id = stack.add(vpc)?;

        let igw_path = child(id, "IGW");
        let igw = stack.add(
            Resource::at_path("AWS::EC2::InternetGateway", &igw_path)
                .with_attribute("Tags", name_tag(stack, id)),
        )?;
        let attachment = stack.add(
            Resource::at_path("AWS::EC2::VPCGatewayAttachment", child(id, "VPCGW"))
                .with_attribute("VpcId", Value::ref_to(&logical_id))
                .with_attribute("InternetGatewayId", Value::ref_to(&igw)),
        )?;

        let mut vpc = Self {
            logical_id,
            public_subnets: Vec::new(),
            private_subnets: Vec::new(),
        };

        for (az, block) in public_blocks.iter().enumerate() {
            let subnet = vpc.add_subnet(stack, id, SubnetType::Public, az, block, |route| {
                route
                    .with_attribute("GatewayId", Value::ref_to(&igw))
                    .with_dependency(&attachment)
            })?;
            vpc.public_subnets.push(subnet);
        }

        for (az, block) in private_blocks.iter().enumerate() {
            let nat = vpc.public_subnets[az].nat_gateway.clone().ok_or_else(|| {
                BuildError::MissingConstruct(format!("{}/PublicSubnet{}/NATGateway", id, az + 1))
            })?;
            let subnet = vpc.add_subnet(stack, id, SubnetType::Private, az, block, |route| {
                route.with_attribute("NatGatewayId", Value::ref_to(&nat))
            })?;
            vpc.private_subnets.push(subnet);
        }

        log::debug!(
            "{}: {} public and {} private subnets",
            id,
            vpc.public_subnets.len(),
            vpc.private_subnets.len()
        );
        Ok(vpc)
    }

    fn add_subnet(
        &self,
        stack: &mut Stack,
        vpc_id: &str,
        subnet_type: SubnetType,
        az: usize,
        block: &str,
        route_target: impl FnOnce(Resource) -> Resource,
    ) -> Result<Subnet, BuildError> {
        let path = child(vpc_id, &format!("{}Subnet{}", subnet_type.name(), az + 1));

        let subnet = stack.add(
            Resource::at_path("AWS::EC2::Subnet", child(&path, "Subnet"))
                .with_attribute("VpcId", self.vpc_id())
                .with_attribute("CidrBlock", block)
                .with_attribute("AvailabilityZone", Value::availability_zone(az))
                .with_attribute("MapPublicIpOnLaunch", subnet_type == SubnetType::Public)
                .with_attribute(
                    "Tags",
                    Value::List(vec![
                        tag("Name", format!("{}/{}", stack.name, path)),
                        tag("learnings:subnet-type", subnet_type.name()),
                    ]),
                ),
        )?;
        let route_table = stack.add(
            Resource::at_path("AWS::EC2::RouteTable", child(&path, "RouteTable"))
                .with_attribute("VpcId", self.vpc_id())
                .with_attribute("Tags", name_tag(stack, &path)),
        )?;
        let association = stack.add(
            Resource::at_path(
                "AWS::EC2::SubnetRouteTableAssociation",
                child(&path, "RouteTableAssociation"),
            )
            .with_attribute("RouteTableId", Value::ref_to(&route_table))
            .with_attribute("SubnetId", Value::ref_to(&subnet)),
        )?;
        let default_route = stack.add(route_target(
            Resource::at_path("AWS::EC2::Route", child(&path, "DefaultRoute"))
                .with_attribute("RouteTableId", Value::ref_to(&route_table))
                .with_attribute("DestinationCidrBlock", "0.0.0.0/0"),
        ))?;

        let nat_gateway = match subnet_type {
            SubnetType::Public => {
                let eip = stack.add(
                    Resource::at_path("AWS::EC2::EIP", child(&path, "EIP"))
                        .with_attribute("Domain", "vpc")
                        .with_attribute("Tags", name_tag(stack, &path)),
                )?;
                let nat = stack.add(
                    Resource::at_path("AWS::EC2::NatGateway", child(&path, "NATGateway"))
                        .with_attribute("SubnetId", Value::ref_to(&subnet))
                        .with_attribute("AllocationId", Value::get_att(&eip, "AllocationId"))
                        .with_attribute("Tags", name_tag(stack, &path))
                        .with_dependency(&default_route)
                        .with_dependency(&association),
                )?;
                Some(nat)
            }
            SubnetType::Private => None,
        };

        Ok(Subnet {
            logical_id: subnet,
            subnet_type,
            route_table,
            default_route,
            nat_gateway,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn vpc_id(&self) -> Value {
        Value::ref_to(&self.logical_id)
    }

    pub fn public_subnet_ids(&self) -> Vec<Value> {
        self.public_subnets.iter().map(Subnet::subnet_id).collect()
    }

    pub fn private_subnet_ids(&self) -> Vec<Value> {
        self.private_subnets.iter().map(Subnet::subnet_id).collect()
    }

    /// Default routes of the public subnets, which internet-facing resources depend on
    pub fn internet_routes(&self) -> Vec<String> {
        self.public_subnets
            .iter()
            .map(|s| s.default_route.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_subnets_of_a_slash_16() {
        let blocks = split_cidr("10.1.0.0/16", 6).unwrap();
        assert_eq!(
            blocks,
            vec![
                "10.1.0.0/19",
                "10.1.32.0/19",
                "10.1.64.0/19",
                "10.1.96.0/19",
                "10.1.128.0/19",
                "10.1.160.0/19",
            ]
        );
    }

    #[test]
    fn split_normalizes_host_bits_and_rejects_tiny_subnets() {
        assert_eq!(split_cidr("10.0.0.5/24", 2).unwrap(), vec!["10.0.0.0/25", "10.0.0.128/25"]);
        assert_eq!(split_cidr("10.0.0.0/16", 1).unwrap(), vec!["10.0.0.0/16"]);
        assert!(split_cidr("10.0.0.0/27", 4).is_err());
        assert!(split_cidr("10.0.0.0/16", 0).is_err());
        assert!(split_cidr("10.0.0/16", 2).is_err());
    }

    #[test]
    fn one_public_and_one_private_subnet_per_zone() {
        let mut stack = Stack::new("CdkStack");
        let vpc = Vpc::new(
            &mut stack,
            "Network",
            VpcProps {
                cidr: "10.1.0.0/16".to_string(),
                max_azs: 3,
            },
        )
        .unwrap();

        assert_eq!(vpc.logical_id(), "Network");
        assert_eq!(vpc.public_subnets.len(), 3);
        assert_eq!(vpc.private_subnets.len(), 3);
        assert_eq!(stack.resources_of_type("AWS::EC2::Subnet").count(), 6);
        assert_eq!(stack.resources_of_type("AWS::EC2::NatGateway").count(), 3);
        assert_eq!(stack.resources_of_type("AWS::EC2::InternetGateway").count(), 1);

        let second = stack.find("NetworkPublicSubnet2Subnet").unwrap();
        assert_eq!(
            second.attribute("AvailabilityZone"),
            Some(&Value::availability_zone(1))
        );
        assert_eq!(
            second.attribute("CidrBlock"),
            Some(&Value::string("10.1.32.0/19"))
        );

        let private_route = stack.find("NetworkPrivateSubnet2DefaultRoute").unwrap();
        assert_eq!(
            private_route.attribute("NatGatewayId"),
            Some(&Value::ref_to("NetworkPublicSubnet2NATGateway"))
        );
        let public_route = stack.find("NetworkPublicSubnet1DefaultRoute").unwrap();
        assert_eq!(
            public_route.attribute("GatewayId"),
            Some(&Value::ref_to("NetworkIGW"))
        );
        assert_eq!(public_route.depends_on, vec!["NetworkVPCGW"]);
    }
}
