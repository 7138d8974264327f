//! Attribute types shared by the resource schemas

use std::sync::LazyLock;

use keel_core::resource::Value;
use keel_core::schema::AttributeType;
use regex::Regex;

/// Valid AWS regions
const VALID_REGIONS: &[&str] = &[
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-south-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "ca-central-1",
    "sa-east-1",
];

static AMI_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ami-[0-9a-f]{8,17}$").expect("AMI id pattern"));

static ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws[a-z-]*:[a-z0-9-]+:[a-z0-9-]*:(\d{12}|aws)?:.+$")
        .expect("ARN pattern")
});

static DOMAIN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}\.?$")
        .expect("domain name pattern")
});

/// Availability zone: a valid region followed by a single letter
pub fn availability_zone() -> AttributeType {
    AttributeType::Custom {
        name: "AvailabilityZone".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value {
                let region = s.trim_end_matches(|c: char| c.is_ascii_lowercase());
                if s.len() == region.len() + 1 && VALID_REGIONS.contains(&region) {
                    Ok(())
                } else {
                    Err(format!(
                        "Invalid availability zone '{}', expected a region followed by a zone letter (e.g., us-east-1a)",
                        s
                    ))
                }
            } else {
                Err("Expected string".to_string())
            }
        },
    }
}

/// Machine image id (e.g., ami-0abcdef1234567890)
pub fn ami_id() -> AttributeType {
    AttributeType::Custom {
        name: "AmiId".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value
                && AMI_ID.is_match(s)
            {
                Ok(())
            } else {
                Err(format!("Invalid AMI id {}, expected ami-<hex>", value))
            }
        },
    }
}

/// Amazon Resource Name
pub fn arn() -> AttributeType {
    AttributeType::Custom {
        name: "Arn".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value
                && ARN.is_match(s)
            {
                Ok(())
            } else {
                Err(format!("Invalid ARN {}", value))
            }
        },
    }
}

/// Domain name, with or without the trailing dot
pub fn domain_name() -> AttributeType {
    AttributeType::Custom {
        name: "DomainName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value
                && DOMAIN_NAME.is_match(s)
            {
                Ok(())
            } else {
                Err(format!("Invalid domain name {}", value))
            }
        },
    }
}

/// IP protocol of a security rule; "-1" means every protocol
pub fn protocol() -> AttributeType {
    AttributeType::Enum(vec![
        "tcp".to_string(),
        "udp".to_string(),
        "icmp".to_string(),
        "-1".to_string(),
    ])
}

/// Nested block whose fields have mixed types
pub fn object() -> AttributeType {
    AttributeType::Custom {
        name: "Object".to_string(),
        base: Box::new(AttributeType::Map(Box::new(AttributeType::String))),
        validate: |value| match value {
            Value::Map(_) => Ok(()),
            other => Err(format!("Expected a block, got {}", other)),
        },
    }
}

pub fn object_list() -> AttributeType {
    AttributeType::List(Box::new(object()))
}

/// Tags (map of strings)
pub fn tags_type() -> AttributeType {
    AttributeType::Map(Box::new(AttributeType::String))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_zone_needs_a_known_region() {
        let t = availability_zone();
        assert!(t.validate(&Value::from("us-east-1a")).is_ok());
        assert!(t.validate(&Value::from("us-east-1")).is_err());
        assert!(t.validate(&Value::from("mars-north-1a")).is_err());
    }

    #[test]
    fn patterns_compile() {
        for pattern in [&AMI_ID, &ARN, &DOMAIN_NAME] {
            LazyLock::force(pattern);
        }
    }

    #[test]
    fn ami_id_format() {
        let t = ami_id();
        assert!(t.validate(&Value::from("ami-0abcdef1234567890")).is_ok());
        assert!(t.validate(&Value::from("ubuntu-22.04")).is_err());
    }

    #[test]
    fn arn_format() {
        let t = arn();
        assert!(
            t.validate(&Value::from(
                "arn:aws:acm:us-east-1:123456789012:certificate/abc"
            ))
            .is_ok()
        );
        assert!(
            t.validate(&Value::from("arn:aws:iam::aws:policy/CloudWatchAgentServerPolicy"))
                .is_ok()
        );
        assert!(t.validate(&Value::from("certificate/abc")).is_err());
    }

    #[test]
    fn domain_name_format() {
        let t = domain_name();
        assert!(t.validate(&Value::from("demo.example.com")).is_ok());
        assert!(t.validate(&Value::from("demo.example.com.")).is_ok());
        assert!(t.validate(&Value::from("not a domain")).is_err());
    }

    #[test]
    fn object_accepts_any_block() {
        let t = object_list();
        let block = Value::map([("from_port", Value::Int(22)), ("protocol", Value::from("tcp"))]);
        assert!(t.validate(&Value::List(vec![block])).is_ok());
        assert!(t.validate(&Value::List(vec![Value::from("tcp")])).is_err());
    }
}
