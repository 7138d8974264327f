//! Traffic distribution - Load balancer, autoscaling group and CPU alarms

use keel_core::resource::{Resource, Value};

use crate::compute::Compute;
use crate::config::StackConfig;
use crate::network::Network;
use crate::security::{APPLICATION_PORT, HTTPS_PORT, SecurityPolicy};

pub const COMPONENT: &str = "traffic";

pub const AUTOSCALING_GROUP_NAME: &str = "auto_scaling_group";

pub const HEALTH_CHECK_PATH: &str = "/healthz";

/// Instance counts of the autoscaling group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub min: i64,
    pub desired: i64,
    pub max: i64,
}

pub const CAPACITY: Capacity = Capacity {
    min: 1,
    desired: 1,
    max: 3,
};

/// Simple scaling step applied by an alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingStep {
    pub name: &'static str,
    pub adjustment: i64,
    pub cooldown: i64,
}

pub const SCALE_UP: ScalingStep = ScalingStep {
    name: "scaleup",
    adjustment: 1,
    cooldown: 60,
};

pub const SCALE_DOWN: ScalingStep = ScalingStep {
    name: "scaledown",
    adjustment: -1,
    cooldown: 30,
};

/// Average CPU alarm over the autoscaling group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuAlarm {
    pub name: &'static str,
    pub comparison: &'static str,
    pub threshold: i64,
    pub description: &'static str,
}

pub const CPU_HIGH: CpuAlarm = CpuAlarm {
    name: "cpuHigh",
    comparison: "GreaterThanThreshold",
    threshold: 5,
    description: "Scale up when average CPU utilization is above 5%",
};

pub const CPU_LOW: CpuAlarm = CpuAlarm {
    name: "cpuLow",
    comparison: "LessThanThreshold",
    threshold: 3,
    description: "Scale down when average CPU utilization is below 3%",
};

const ALARM_PERIOD_SECONDS: i64 = 60;
const ALARM_EVALUATION_PERIODS: i64 = 2;

#[derive(Debug, Clone)]
pub struct Traffic {
    pub target_group: Resource,
    pub load_balancer: Resource,
    pub listener: Resource,
    pub autoscaling_group: Resource,
    pub scale_up: Resource,
    pub scale_down: Resource,
    pub cpu_high: Resource,
    pub cpu_low: Resource,
}

impl Traffic {
    pub fn dns_name(&self) -> Value {
        self.load_balancer.output("dns_name")
    }

    pub fn zone_id(&self) -> Value {
        self.load_balancer.output("zone_id")
    }

    pub fn resources(&self) -> Vec<Resource> {
        vec![
            self.target_group.clone(),
            self.load_balancer.clone(),
            self.listener.clone(),
            self.autoscaling_group.clone(),
            self.scale_up.clone(),
            self.scale_down.clone(),
            self.cpu_high.clone(),
            self.cpu_low.clone(),
        ]
    }
}

fn scaling_policy(step: ScalingStep, group: &Resource) -> Resource {
    Resource::new("aws.autoscaling.policy", step.name)
        .with_attribute("autoscaling_group_name", group.output("name"))
        .with_attribute("adjustment_type", "ChangeInCapacity")
        .with_attribute("scaling_adjustment", step.adjustment)
        .with_attribute("cooldown", step.cooldown)
        .with_component(COMPONENT)
}

fn cpu_alarm(alarm: CpuAlarm, group: &Resource, policy: &Resource) -> Resource {
    Resource::new("aws.cloudwatch.metric_alarm", alarm.name)
        .with_attribute("comparison_operator", alarm.comparison)
        .with_attribute("threshold", alarm.threshold)
        .with_attribute("evaluation_periods", ALARM_EVALUATION_PERIODS)
        .with_attribute("period", ALARM_PERIOD_SECONDS)
        .with_attribute("metric_name", "CPUUtilization")
        .with_attribute("namespace", "AWS/EC2")
        .with_attribute("statistic", "Average")
        .with_attribute("alarm_description", alarm.description)
        .with_attribute(
            "dimensions",
            Value::map([("AutoScalingGroupName", group.output("name"))]),
        )
        .with_attribute("alarm_actions", Value::List(vec![policy.output("arn")]))
        .with_component(COMPONENT)
}

pub fn build_traffic(
    config: &StackConfig,
    network: &Network,
    security: &SecurityPolicy,
    compute: &Compute,
) -> Traffic {
    let target_group = Resource::new("aws.lb.target_group", "webapp-target-group")
        .with_attribute("port", APPLICATION_PORT)
        .with_attribute("protocol", "HTTP")
        .with_attribute("vpc_id", network.vpc_id())
        .with_attribute("target_type", "instance")
        .with_attribute("slow_start", 60_i64)
        .with_attribute(
            "health_check",
            Value::map([
                ("enabled", Value::Bool(true)),
                ("path", Value::from(HEALTH_CHECK_PATH)),
                ("interval", Value::Int(20)),
                ("timeout", Value::Int(3)),
                ("healthy_threshold", Value::Int(2)),
                ("unhealthy_threshold", Value::Int(2)),
            ]),
        )
        .with_component(COMPONENT);

    let load_balancer = Resource::new("aws.lb.load_balancer", "webapp-lb")
        .with_attribute("load_balancer_type", "application")
        .with_attribute("internal", false)
        .with_attribute("subnets", network.public_subnet_ids())
        .with_attribute(
            "security_groups",
            Value::List(vec![security.load_balancer_id()]),
        )
        .with_component(COMPONENT);

    let listener = Resource::new("aws.lb.listener", "https-listener")
        .with_attribute("load_balancer_arn", load_balancer.output("arn"))
        .with_attribute("port", HTTPS_PORT)
        .with_attribute("protocol", "HTTPS")
        .with_attribute("certificate_arn", config.certificate_arn.as_str())
        .with_attribute(
            "default_actions",
            Value::List(vec![Value::map([
                ("type", Value::from("forward")),
                ("target_group_arn", target_group.output("arn")),
            ])]),
        )
        .with_component(COMPONENT);

    let autoscaling_group = Resource::new("aws.autoscaling.group", AUTOSCALING_GROUP_NAME)
        .with_attribute("name", AUTOSCALING_GROUP_NAME)
        .with_attribute("min_size", CAPACITY.min)
        .with_attribute("desired_capacity", CAPACITY.desired)
        .with_attribute("max_size", CAPACITY.max)
        .with_attribute("default_cooldown", 60_i64)
        .with_attribute("default_instance_warmup", 60_i64)
        .with_attribute("health_check_type", "EC2")
        .with_attribute(
            "launch_template",
            Value::map([
                ("id", compute.launch_template_id()),
                ("version", Value::from("$Latest")),
            ]),
        )
        .with_attribute(
            "target_group_arns",
            Value::List(vec![target_group.output("arn")]),
        )
        .with_attribute("vpc_zone_identifiers", network.public_subnet_ids())
        .with_attribute(
            "tags",
            Value::List(vec![Value::map([
                ("key", Value::from("instanceType")),
                ("value", Value::from("webapp")),
                ("propagate_at_launch", Value::Bool(true)),
            ])]),
        )
        .with_component(COMPONENT);

    let scale_up = scaling_policy(SCALE_UP, &autoscaling_group);
    let scale_down = scaling_policy(SCALE_DOWN, &autoscaling_group);
    let cpu_high = cpu_alarm(CPU_HIGH, &autoscaling_group, &scale_up);
    let cpu_low = cpu_alarm(CPU_LOW, &autoscaling_group, &scale_down);

    log::debug!(
        "Derived load balancer {} and autoscaling group {} ({}..{})",
        load_balancer.name(),
        AUTOSCALING_GROUP_NAME,
        CAPACITY.min,
        CAPACITY.max
    );

    Traffic {
        target_group,
        load_balancer,
        listener,
        autoscaling_group,
        scale_up,
        scale_down,
        cpu_high,
        cpu_low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::build_compute;
    use crate::config::test_config;
    use crate::database::build_database;
    use crate::network::build_network;
    use crate::security::build_security;

    fn traffic() -> (Network, Traffic) {
        let config = test_config();
        let network = build_network(&config).unwrap();
        let security = build_security(&config, &network);
        let database = build_database(&config, &network, &security);
        let topic = Resource::new("aws.sns.topic", "my-topic");
        let compute = build_compute(&config, &security, &database, &topic);
        let traffic = build_traffic(&config, &network, &security, &compute);
        (network, traffic)
    }

    fn int(resource: &Resource, key: &str) -> i64 {
        resource.get(key).and_then(Value::as_int).unwrap()
    }

    fn text<'a>(resource: &'a Resource, key: &str) -> &'a str {
        resource.get(key).and_then(Value::as_str).unwrap()
    }

    #[test]
    fn capacity_is_one_one_three() {
        let (_, traffic) = traffic();
        let group = &traffic.autoscaling_group;
        assert_eq!(int(group, "min_size"), 1);
        assert_eq!(int(group, "desired_capacity"), 1);
        assert_eq!(int(group, "max_size"), 3);
        assert_eq!(int(group, "default_cooldown"), 60);
        assert_eq!(int(group, "default_instance_warmup"), 60);
        assert_eq!(text(group, "health_check_type"), "EC2");
    }

    #[test]
    fn scaling_steps_are_not_swapped() {
        let (_, traffic) = traffic();
        assert_eq!(int(&traffic.scale_up, "scaling_adjustment"), 1);
        assert_eq!(int(&traffic.scale_up, "cooldown"), 60);
        assert_eq!(int(&traffic.scale_down, "scaling_adjustment"), -1);
        assert_eq!(int(&traffic.scale_down, "cooldown"), 30);
        for policy in [&traffic.scale_up, &traffic.scale_down] {
            assert_eq!(text(policy, "adjustment_type"), "ChangeInCapacity");
        }
    }

    #[test]
    fn alarms_trigger_the_matching_policy() {
        let (_, traffic) = traffic();
        assert_eq!(text(&traffic.cpu_high, "comparison_operator"), "GreaterThanThreshold");
        assert_eq!(int(&traffic.cpu_high, "threshold"), 5);
        assert_eq!(
            traffic.cpu_high.get("alarm_actions"),
            Some(&Value::List(vec![Value::reference("scaleup", "arn")]))
        );

        assert_eq!(text(&traffic.cpu_low, "comparison_operator"), "LessThanThreshold");
        assert_eq!(int(&traffic.cpu_low, "threshold"), 3);
        assert_eq!(
            traffic.cpu_low.get("alarm_actions"),
            Some(&Value::List(vec![Value::reference("scaledown", "arn")]))
        );

        for alarm in [&traffic.cpu_high, &traffic.cpu_low] {
            assert_eq!(int(alarm, "evaluation_periods"), 2);
            assert_eq!(int(alarm, "period"), 60);
            assert_eq!(text(alarm, "metric_name"), "CPUUtilization");
            assert_eq!(text(alarm, "namespace"), "AWS/EC2");
            assert_eq!(text(alarm, "statistic"), "Average");
            let dimensions = alarm.get("dimensions").and_then(Value::as_map).unwrap();
            assert_eq!(
                dimensions["AutoScalingGroupName"],
                Value::reference("auto_scaling_group", "name")
            );
        }
    }

    #[test]
    fn load_balancer_spans_public_subnets() {
        let (network, traffic) = traffic();
        assert_eq!(
            traffic.load_balancer.get("subnets"),
            Some(&network.public_subnet_ids())
        );
        assert_eq!(
            traffic.autoscaling_group.get("vpc_zone_identifiers"),
            Some(&network.public_subnet_ids())
        );
        assert_eq!(
            traffic.load_balancer.get("internal"),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn listener_forwards_https_to_the_target_group() {
        let (_, traffic) = traffic();
        let listener = &traffic.listener;
        assert_eq!(int(listener, "port"), 443);
        assert_eq!(text(listener, "protocol"), "HTTPS");
        assert_eq!(
            text(listener, "certificate_arn"),
            "arn:aws:acm:us-east-1:123456789012:certificate/abc"
        );
        let action = &listener.get("default_actions").and_then(Value::as_list).unwrap()[0];
        let action = action.as_map().unwrap();
        assert_eq!(action["type"], Value::from("forward"));
        assert_eq!(
            action["target_group_arn"],
            Value::reference("webapp-target-group", "arn")
        );
    }

    #[test]
    fn target_group_health_check() {
        let (_, traffic) = traffic();
        let target_group = &traffic.target_group;
        assert_eq!(int(target_group, "port"), 8080);
        assert_eq!(int(target_group, "slow_start"), 60);
        let check = target_group.get("health_check").and_then(Value::as_map).unwrap();
        assert_eq!(check["path"], Value::from("/healthz"));
        assert_eq!(check["interval"], Value::Int(20));
        assert_eq!(check["timeout"], Value::Int(3));
        assert_eq!(check["healthy_threshold"], Value::Int(2));
        assert_eq!(check["unhealthy_threshold"], Value::Int(2));
    }

    #[test]
    fn group_uses_the_latest_launch_template() {
        let (_, traffic) = traffic();
        let template = traffic
            .autoscaling_group
            .get("launch_template")
            .and_then(Value::as_map)
            .unwrap();
        assert_eq!(template["id"], Value::reference("ami_launch_template", "id"));
        assert_eq!(template["version"], Value::from("$Latest"));
    }
}
