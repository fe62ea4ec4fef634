use crate::clab::ClabConfig;
use crate::config::CompilerConfig;
use crate::topology::{Edit, Topology};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load and validate the compiler configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<CompilerConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration '{}'", config_path.display()))?;
    let config: CompilerConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration '{}'", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Configuration from `path`, or the defaults when no file is given
pub fn load_config_or_default(path: Option<&Path>) -> Result<CompilerConfig> {
    match path {
        Some(path) => load_config(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(CompilerConfig::default())
        }
    }
}

/// Load a topology document (the editor's JSON shape)
pub fn load_topology(path: &Path) -> Result<Topology> {
    info!("Loading topology from: {:?}", path);

    let file = File::open(path).wrap_err_with(|| format!("Failed to open topology '{}'", path.display()))?;
    let topology: Topology = serde_json::from_reader(BufReader::new(file))
        .wrap_err_with(|| format!("Failed to parse topology '{}'", path.display()))?;

    if topology.sites.is_empty() {
        warn!("Topology '{}' has no sites", path.display());
    }
    Ok(topology)
}

/// Load a JSON array of edits
pub fn load_edits(path: &Path) -> Result<Vec<Edit>> {
    info!("Loading edits from: {:?}", path);

    let file = File::open(path).wrap_err_with(|| format!("Failed to open edits '{}'", path.display()))?;
    let edits: Vec<Edit> = serde_json::from_reader(BufReader::new(file))
        .wrap_err_with(|| format!("Failed to parse edits '{}'", path.display()))?;
    Ok(edits)
}

/// Load a containerlab descriptor for import
pub fn load_clab(path: &Path) -> Result<ClabConfig> {
    info!("Loading containerlab file from: {:?}", path);

    let file = File::open(path)
        .wrap_err_with(|| format!("Failed to open containerlab file '{}'", path.display()))?;
    let clab: ClabConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse containerlab file '{}'", path.display()))?;
    Ok(clab)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let yaml = r#"
default_topology_name: "refinery"
bridge_name: "lan0"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.default_topology_name, "refinery");
        assert_eq!(config.bridge_name, "lan0");
        assert_eq!(config.node_kind, "linux");
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "firewall_chain: \"BAD CHAIN\"\n").unwrap();

        let err = load_config(temp_file.path()).unwrap_err();
        assert!(format!("{:?}", err).contains("firewall_chain"));
    }

    #[test]
    fn test_load_topology() {
        let json = r#"{
            "name": "plant",
            "sites": [{
                "id": "hq",
                "name": "HQ",
                "subnets": [{
                    "id": "net1",
                    "name": "Control",
                    "cidr": "10.0.1.0/24",
                    "gateway": "10.0.1.1",
                    "containers": [
                        {"id": "r1", "name": "Router", "type": "router", "ip": "10.0.1.1"},
                        {"id": "p1", "name": "PLC", "type": "plc", "ip": "10.0.1.20", "status": "running"}
                    ],
                    "connections": [{"from": "p1", "to": "r1", "fromInterface": "eth3"}]
                }],
                "subnetConnections": []
            }],
            "siteConnections": []
        }"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", json).unwrap();

        let topology = load_topology(temp_file.path()).unwrap();
        assert_eq!(topology.name.as_deref(), Some("plant"));
        let subnet = &topology.sites[0].subnets[0];
        assert_eq!(subnet.containers.len(), 2);
        assert_eq!(subnet.connections[0].from_interface.as_deref(), Some("eth3"));
    }

    #[test]
    fn test_load_topology_rejects_unknown_type() {
        let json = r#"{"sites": [{"id": "s", "name": "S", "subnets": [{"id": "n", "name": "N",
            "cidr": "10.0.0.0/24", "containers": [{"id": "c", "name": "C", "type": "toaster", "ip": "10.0.0.5"}]}]}]}"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", json).unwrap();

        assert!(load_topology(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_edits() {
        let json = r#"[
            {"type": "ADD_SITE", "payload": {"name": "HQ"}},
            {"type": "CONNECT_SITES", "payload": {"from": "a", "to": "b", "label": "wan"}}
        ]"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", json).unwrap();

        let edits = load_edits(temp_file.path()).unwrap();
        assert_eq!(edits.len(), 2);
        assert!(matches!(edits[1], Edit::ConnectSites { ref label, .. } if label.as_deref() == Some("wan")));
    }

    #[test]
    fn test_default_config_without_path() {
        let config = load_config_or_default(None).unwrap();
        assert_eq!(config, CompilerConfig::default());
    }
}
