//! Security group construct

use learnings_core::resource::{Resource, Value};
use learnings_core::stack::Stack;

use super::child;
use super::vpc::Vpc;
use crate::error::BuildError;

pub const SECURITY_GROUP_TYPE: &str = "AWS::EC2::SecurityGroup";

const ALL_IPV4: &str = "0.0.0.0/0";

/// Protocol and port range of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub protocol: &'static str,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl Port {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: "tcp",
            from: Some(port.into()),
            to: Some(port.into()),
        }
    }

    pub fn all_traffic() -> Self {
        Self {
            protocol: "-1",
            from: None,
            to: None,
        }
    }

    pub fn label(&self) -> String {
        match (self.protocol, self.from) {
            ("-1", _) => "ALL TRAFFIC".to_string(),
            (_, Some(port)) => port.to_string(),
            (protocol, None) => protocol.to_string(),
        }
    }

    fn fields(&self) -> Vec<(&'static str, Value)> {
        let mut fields = vec![("IpProtocol", Value::string(self.protocol))];
        if let Some(from) = self.from {
            fields.push(("FromPort", Value::Int(from)));
        }
        if let Some(to) = self.to {
            fields.push(("ToPort", Value::Int(to)));
        }
        fields
    }
}

/// Source or destination of a rule
#[derive(Debug, Clone)]
pub enum Peer {
    Ipv4(String),
    SecurityGroup(SecurityGroup),
}

impl Peer {
    pub fn any_ipv4() -> Self {
        Peer::Ipv4(ALL_IPV4.to_string())
    }

    fn label(&self) -> String {
        match self {
            Peer::Ipv4(cidr) => cidr.clone(),
            Peer::SecurityGroup(group) => group.logical_id.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityGroupProps<'a> {
    pub vpc: &'a Vpc,
    pub description: Option<String>,
    pub allow_all_outbound: bool,
}

/// A declared security group
#[derive(Debug, Clone)]
pub struct SecurityGroup {
    path: String,
    logical_id: String,
    allow_all_outbound: bool,
}

impl SecurityGroup {
    pub fn new(stack: &mut Stack, id: &str, props: SecurityGroupProps) -> Result<Self, BuildError> {
        let description = props
            .description
            .unwrap_or_else(|| format!("{}/{}", stack.name, id));
        let egress = if props.allow_all_outbound {
            Value::map([
                ("CidrIp", Value::string(ALL_IPV4)),
                ("Description", Value::string("Allow all outbound traffic by default")),
                ("IpProtocol", Value::string("-1")),
            ])
        } else {
            disallow_all_placeholder()
        };

        let resource = Resource::at_path(SECURITY_GROUP_TYPE, child(id, "Resource"))
            .with_attribute("GroupDescription", description)
            .with_attribute("VpcId", props.vpc.vpc_id())
            .with_attribute("SecurityGroupEgress", Value::List(vec![egress]));
        let logical_id = stack.add(resource)?;

        Ok(Self {
            path: id.to_string(),
            logical_id,
            allow_all_outbound: props.allow_all_outbound,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn group_id(&self) -> Value {
        Value::get_att(&self.logical_id, "GroupId")
    }

    /// Allow inbound traffic
    ///
    /// CIDR peers become inline rules; security group peers become standalone
    /// `AWS::EC2::SecurityGroupIngress` resources. A rule that already exists
    /// for the same peer and port is not declared twice.
    pub fn add_ingress_rule(
        &self,
        stack: &mut Stack,
        peer: Peer,
        port: Port,
        description: Option<&str>,
    ) -> Result<(), BuildError> {
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("from {}:{}", peer.label(), port.label()));
        match peer {
            Peer::Ipv4(cidr) => self.add_inline_rule(stack, "SecurityGroupIngress", cidr, port, description),
            Peer::SecurityGroup(source) => {
                let path = child(&self.path, &format!("from {}:{}", source.logical_id, port.label()));
                self.add_standalone_rule(
                    stack,
                    "AWS::EC2::SecurityGroupIngress",
                    path,
                    ("SourceSecurityGroupId", source.group_id()),
                    port,
                    description,
                )
            }
        }
    }

    /// Allow outbound traffic; a no-op when all outbound traffic is already allowed
    pub fn add_egress_rule(
        &self,
        stack: &mut Stack,
        peer: Peer,
        port: Port,
        description: Option<&str>,
    ) -> Result<(), BuildError> {
        if self.allow_all_outbound {
            return Ok(());
        }
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("to {}:{}", peer.label(), port.label()));
        match peer {
            Peer::Ipv4(cidr) => {
                self.remove_placeholder_egress(stack)?;
                self.add_inline_rule(stack, "SecurityGroupEgress", cidr, port, description)
            }
            Peer::SecurityGroup(destination) => {
                let path = child(&self.path, &format!("to {}:{}", destination.logical_id, port.label()));
                self.add_standalone_rule(
                    stack,
                    "AWS::EC2::SecurityGroupEgress",
                    path,
                    ("DestinationSecurityGroupId", destination.group_id()),
                    port,
                    description,
                )
            }
        }
    }

    fn add_inline_rule(
        &self,
        stack: &mut Stack,
        property: &str,
        cidr: String,
        port: Port,
        description: String,
    ) -> Result<(), BuildError> {
        let resource = stack
            .find_mut(&self.logical_id)
            .ok_or_else(|| BuildError::MissingConstruct(self.path.clone()))?;

        let mut fields = port.fields();
        fields.push(("CidrIp", Value::string(cidr)));
        let key: Vec<_> = fields.clone();
        fields.push(("Description", Value::string(description)));
        let rule = Value::map(fields);

        let mut rules = resource
            .attribute(property)
            .and_then(Value::as_list)
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        let duplicate = rules
            .iter()
            .any(|existing| key.iter().all(|(k, v)| existing.get(k) == Some(v)));
        if !duplicate {
            rules.push(rule);
            resource.attributes.insert(property.to_string(), Value::List(rules));
        }
        Ok(())
    }

    fn add_standalone_rule(
        &self,
        stack: &mut Stack,
        resource_type: &str,
        path: String,
        peer: (&str, Value),
        port: Port,
        description: String,
    ) -> Result<(), BuildError> {
        if stack.find(&learnings_core::resource::logical_id(&path)).is_some() {
            return Ok(());
        }
        let mut resource = Resource::at_path(resource_type, path)
            .with_attribute("GroupId", self.group_id())
            .with_attribute(peer.0, peer.1)
            .with_attribute("Description", description);
        for (key, value) in port.fields() {
            resource = resource.with_attribute(key, value);
        }
        stack.add(resource)?;
        Ok(())
    }

    fn remove_placeholder_egress(&self, stack: &mut Stack) -> Result<(), BuildError> {
        let resource = stack
            .find_mut(&self.logical_id)
            .ok_or_else(|| BuildError::MissingConstruct(self.path.clone()))?;
        if let Some(Value::List(rules)) = resource.attributes.get_mut("SecurityGroupEgress") {
            let placeholder = disallow_all_placeholder();
            rules.retain(|rule| *rule != placeholder);
        }
        Ok(())
    }
}

/// Egress rule matching no traffic, so the default allow-all rule is not created
fn disallow_all_placeholder() -> Value {
    Value::map([
        ("CidrIp", Value::string("255.255.255.255/32")),
        ("Description", Value::string("Disallow all traffic")),
        ("FromPort", Value::Int(252)),
        ("IpProtocol", Value::string("icmp")),
        ("ToPort", Value::Int(86)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::vpc::VpcProps;

    fn setup() -> (Stack, Vpc) {
        let mut stack = Stack::new("CdkStack");
        let vpc = Vpc::new(
            &mut stack,
            "Vpc",
            VpcProps {
                cidr: "10.0.0.0/16".to_string(),
                max_azs: 1,
            },
        )
        .unwrap();
        (stack, vpc)
    }

    #[test]
    fn cidr_ingress_is_inline_and_deduplicated() {
        let (mut stack, vpc) = setup();
        let sg = SecurityGroup::new(
            &mut stack,
            "Web",
            SecurityGroupProps {
                vpc: &vpc,
                description: None,
                allow_all_outbound: true,
            },
        )
        .unwrap();
        sg.add_ingress_rule(&mut stack, Peer::any_ipv4(), Port::tcp(80), None)
            .unwrap();
        sg.add_ingress_rule(&mut stack, Peer::any_ipv4(), Port::tcp(80), Some("again"))
            .unwrap();

        let resource = stack.find("Web").unwrap();
        assert_eq!(
            resource.attribute("GroupDescription"),
            Some(&Value::string("CdkStack/Web"))
        );
        let rules = resource
            .attribute("SecurityGroupIngress")
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].get("Description"), Some(&Value::string("from 0.0.0.0/0:80")));
    }

    #[test]
    fn group_peers_become_standalone_rules() {
        let (mut stack, vpc) = setup();
        let props = SecurityGroupProps {
            vpc: &vpc,
            description: None,
            allow_all_outbound: false,
        };
        let lb = SecurityGroup::new(&mut stack, "Lb", props.clone()).unwrap();
        let app = SecurityGroup::new(&mut stack, "App", props).unwrap();

        lb.add_egress_rule(&mut stack, Peer::SecurityGroup(app.clone()), Port::tcp(80), None)
            .unwrap();
        app.add_ingress_rule(&mut stack, Peer::SecurityGroup(lb.clone()), Port::tcp(80), None)
            .unwrap();

        let egress = stack.find("LbtoApp80").unwrap();
        assert_eq!(egress.id.resource_type, "AWS::EC2::SecurityGroupEgress");
        assert_eq!(
            egress.attribute("DestinationSecurityGroupId"),
            Some(&Value::get_att("App", "GroupId"))
        );
        let ingress = stack.find("AppfromLb80").unwrap();
        assert_eq!(ingress.attribute("GroupId"), Some(&Value::get_att("App", "GroupId")));
    }

    #[test]
    fn cidr_egress_replaces_placeholder() {
        let (mut stack, vpc) = setup();
        let sg = SecurityGroup::new(
            &mut stack,
            "Locked",
            SecurityGroupProps {
                vpc: &vpc,
                description: Some("locked".to_string()),
                allow_all_outbound: false,
            },
        )
        .unwrap();
        sg.add_egress_rule(&mut stack, Peer::Ipv4("10.0.0.0/8".to_string()), Port::tcp(443), None)
            .unwrap();

        let rules = stack
            .find("Locked")
            .and_then(|r| r.attribute("SecurityGroupEgress"))
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].get("CidrIp"), Some(&Value::string("10.0.0.0/8")));
    }
}
