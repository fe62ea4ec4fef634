//! Managed firewall rules for router and firewall nodes.
//!
//! Rules live in a dedicated iptables chain that `FORWARD` jumps to first,
//! so the managed policy can be flushed and rewritten without touching
//! anything else on the node. Rendering produces exec commands for node
//! start-up; parsing reads `iptables -S <chain>` output back into rules.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Any,
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "tcp" => Self::Tcp,
            "udp" => Self::Udp,
            "icmp" => Self::Icmp,
            _ => Self::Any,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }

    fn has_ports(&self) -> bool {
        matches!(self, Self::Tcp | Self::Udp)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Accept,
    Drop,
}

impl Action {
    fn target(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Drop => "DROP",
        }
    }
}

fn any() -> String {
    "any".to_string()
}

fn no_port() -> String {
    "-".to_string()
}

/// One forwarding rule. `"any"` and `"-"` mean "unrestricted".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    #[serde(default = "any")]
    pub source: String,
    #[serde(default = "any")]
    pub destination: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "no_port")]
    pub port: String,
    #[serde(default)]
    pub action: Action,
}

impl Default for FirewallRule {
    fn default() -> Self {
        Self {
            source: any(),
            destination: any(),
            protocol: Protocol::Any,
            port: no_port(),
            action: Action::Accept,
        }
    }
}

fn is_unrestricted(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("any")
}

/// iptables arguments appending `rule` to `chain`.
pub fn rule_args(chain: &str, rule: &FirewallRule) -> Vec<String> {
    let mut args = vec!["iptables".to_string(), "-A".to_string(), chain.to_string()];
    if !is_unrestricted(&rule.source) {
        args.extend(["-s".to_string(), rule.source.trim().to_string()]);
    }
    if !is_unrestricted(&rule.destination) {
        args.extend(["-d".to_string(), rule.destination.trim().to_string()]);
    }
    if rule.protocol != Protocol::Any {
        args.extend(["-p".to_string(), rule.protocol.as_str().to_string()]);
    }
    let port = rule.port.trim();
    if rule.protocol.has_ports() && !port.is_empty() && port != "-" {
        args.extend(["--dport".to_string(), port.to_string()]);
    }
    args.extend(["-j".to_string(), rule.action.target().to_string()]);
    args
}

/// Start-up commands creating the managed chain and installing `rules` in order.
pub fn rule_commands(chain: &str, rules: &[FirewallRule]) -> Vec<String> {
    let mut commands = vec![
        format!("sh -c \"iptables -N {chain} 2>/dev/null || true\""),
        format!(
            "sh -c \"iptables -C FORWARD -j {chain} >/dev/null 2>&1 || iptables -I FORWARD 1 -j {chain}\""
        ),
        format!("iptables -F {chain}"),
    ];
    commands.extend(rules.iter().map(|rule| rule_args(chain, rule).join(" ")));
    commands
}

/// Parse `iptables -S <chain>` output, keeping only `-A <chain>` lines.
pub fn parse_chain_rules(chain: &str, output: &str) -> Vec<FirewallRule> {
    let prefix = format!("-A {} ", chain);
    let mut rules = Vec::new();

    for line in output.lines().map(str::trim) {
        if !line.starts_with(&prefix) {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let mut rule = FirewallRule::default();
        let mut i = 0;
        while i < parts.len() {
            let next = parts.get(i + 1).copied();
            match (parts[i], next) {
                ("-s", Some(value)) => rule.source = value.to_string(),
                ("-d", Some(value)) => rule.destination = value.to_string(),
                ("-p", Some(value)) => rule.protocol = Protocol::parse(value),
                ("--dport", Some(value)) => rule.port = value.to_string(),
                ("-j", Some(value)) => {
                    rule.action = if value.eq_ignore_ascii_case("drop") {
                        Action::Drop
                    } else {
                        Action::Accept
                    }
                }
                _ => {
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        if !rule.protocol.has_ports() {
            rule.port = no_port();
        }
        rules.push(rule);
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_args_skip_unrestricted_fields() {
        let rule = FirewallRule {
            source: "10.0.1.0/24".to_string(),
            protocol: Protocol::Tcp,
            port: "443".to_string(),
            action: Action::Drop,
            ..Default::default()
        };
        assert_eq!(
            rule_args("AE3GIS-FW", &rule).join(" "),
            "iptables -A AE3GIS-FW -s 10.0.1.0/24 -p tcp --dport 443 -j DROP"
        );

        let icmp = FirewallRule {
            protocol: Protocol::Icmp,
            port: "22".to_string(),
            ..Default::default()
        };
        assert_eq!(
            rule_args("AE3GIS-FW", &icmp).join(" "),
            "iptables -A AE3GIS-FW -p icmp -j ACCEPT"
        );
    }

    #[test]
    fn test_rule_commands_prepare_chain_first() {
        let commands = rule_commands("FW", &[FirewallRule::default()]);
        assert_eq!(commands.len(), 4);
        assert!(commands[0].contains("iptables -N FW"));
        assert!(commands[1].contains("-I FORWARD 1 -j FW"));
        assert_eq!(commands[2], "iptables -F FW");
        assert_eq!(commands[3], "iptables -A FW -j ACCEPT");
    }

    #[test]
    fn test_parse_chain_rules() {
        let output = "-N AE3GIS-FW\n\
                      -A AE3GIS-FW -s 10.0.1.0/24 -d 10.0.2.5/32 -p tcp -m tcp --dport 80 -j DROP\n\
                      -A AE3GIS-FW -p icmp -j ACCEPT\n\
                      -A OTHER -j DROP\n";
        let rules = parse_chain_rules("AE3GIS-FW", output);

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].source, "10.0.1.0/24");
        assert_eq!(rules[0].destination, "10.0.2.5/32");
        assert_eq!(rules[0].protocol, Protocol::Tcp);
        assert_eq!(rules[0].port, "80");
        assert_eq!(rules[0].action, Action::Drop);
        assert_eq!(rules[1].protocol, Protocol::Icmp);
        assert_eq!(rules[1].port, "-");
        assert_eq!(rules[1].source, "any");
    }

    #[test]
    fn test_rule_json_defaults() {
        let rule: FirewallRule = serde_json::from_str(r#"{"protocol": "udp", "port": "53"}"#).unwrap();
        assert_eq!(rule.source, "any");
        assert_eq!(rule.action, Action::Accept);
        assert_eq!(rule.protocol, Protocol::Udp);
    }
}
