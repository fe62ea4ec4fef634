//! Compilation orchestrator.
//!
//! This module coordinates the generation pass from a loaded topology to the
//! files handed to containerlab: validation, address planning, per-node
//! synthesis and descriptor emission. Every stage runs on the full topology
//! and any fatal error aborts the pass before anything is written, so a
//! partial descriptor never reaches disk.

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::clab::{build_descriptor, to_yaml, ClabConfig, DeploymentTarget};
use crate::config::CompilerConfig;
use crate::node::{synthesize, NodeConfig};
use crate::plan::{plan, AddressPlan};
use crate::topology::{Edit, IdGenerator, Outcome, Topology};
use crate::utils::validation::validate_topology;

/// Result of one generation pass.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub descriptor: ClabConfig,
    pub plan: AddressPlan,
    pub nodes: Vec<NodeConfig>,
}

impl Compiled {
    pub fn degraded_nodes(&self) -> impl Iterator<Item = &NodeConfig> {
        self.nodes.iter().filter(|n| n.is_degraded())
    }

    /// JSON document describing the plan next to the descriptor.
    pub fn report(&self) -> PlanReport<'_> {
        PlanReport {
            deployment: &self.descriptor.name,
            plan: &self.plan,
            nodes: &self.nodes,
        }
    }
}

/// Serialized form of the address plan.
#[derive(Debug, Serialize)]
pub struct PlanReport<'a> {
    pub deployment: &'a str,
    pub plan: &'a AddressPlan,
    pub nodes: &'a [NodeConfig],
}

/// Run validation, planning, synthesis and emission.
pub fn compile(topology: &Topology, target: DeploymentTarget<'_>, config: &CompilerConfig) -> Result<Compiled> {
    validate_topology(topology).wrap_err("Topology validation failed")?;

    let plan = plan(topology, &config.planner_options()).wrap_err("Address planning failed")?;

    let mut nodes = Vec::with_capacity(plan.containers.len());
    for (_, container) in topology.containers() {
        let container_plan = plan
            .container(&container.id)
            .ok_or_else(|| eyre!("No plan produced for container {}", container.id))?;
        nodes.push(synthesize(container, container_plan, target.topology_id, config));
    }

    let descriptor = build_descriptor(topology, &plan, &nodes, target, config)
        .wrap_err("Failed to build containerlab descriptor")?;

    let compiled = Compiled {
        descriptor,
        plan,
        nodes,
    };

    let degraded = compiled.degraded_nodes().count();
    if degraded > 0 {
        warn!("{} nodes were configured in degraded mode", degraded);
    }
    for warning in &compiled.plan.warnings {
        warn!("Plan warning: {:?}", warning);
    }

    Ok(compiled)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("Failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Write `contents` to `path`, creating parent directories as needed.
pub fn write_output(path: &Path, contents: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, contents).wrap_err_with(|| format!("Failed to write '{}'", path.display()))?;
    Ok(())
}

/// Compile and write the descriptor (and optionally the plan report).
///
/// Nothing is written unless the whole pass succeeds.
pub fn generate_to_files(
    topology: &Topology,
    target: DeploymentTarget<'_>,
    config: &CompilerConfig,
    output: &Path,
    plan_output: Option<&Path>,
) -> Result<Compiled> {
    let compiled = compile(topology, target, config)?;

    let yaml = to_yaml(&compiled.descriptor).wrap_err("Failed to serialize containerlab descriptor")?;
    let report = match plan_output {
        Some(_) => Some(
            serde_json::to_string_pretty(&compiled.report()).wrap_err("Failed to serialize plan report")?,
        ),
        None => None,
    };

    write_output(output, &yaml)?;
    info!("Generated containerlab descriptor: {:?}", output);

    if let (Some(path), Some(report)) = (plan_output, report) {
        write_output(path, &report)?;
        info!("Wrote address plan: {:?}", path);
    }

    Ok(compiled)
}

/// Apply `edits` in order, stopping at the first rejected one.
///
/// Ignored edits are reported but do not stop the run.
pub fn apply_edits(topology: &mut Topology, edits: Vec<Edit>, ids: &mut dyn IdGenerator) -> Result<Vec<Outcome>> {
    let total = edits.len();
    let mut outcomes = Vec::with_capacity(total);
    for (index, edit) in edits.into_iter().enumerate() {
        let outcome = topology
            .apply(edit, ids)
            .wrap_err_with(|| format!("Edit {} of {} was rejected", index + 1, total))?;
        if let Outcome::Ignored { reason } = &outcome {
            info!("Edit {} of {} ignored: {}", index + 1, total, reason);
        }
        outcomes.push(outcome);
    }

    let applied = outcomes.iter().filter(|o| o.is_applied()).count();
    info!("Applied {} of {} edits", applied, total);
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SequentialIds;
    use tempfile::TempDir;

    const TOPOLOGY_ID: &str = "c0ffee00aabbccddeeff001122334455";

    fn target() -> DeploymentTarget<'static> {
        DeploymentTarget {
            topology_id: TOPOLOGY_ID,
            attempt: 0,
        }
    }

    fn built() -> Topology {
        let mut topology = Topology::default();
        let mut ids = SequentialIds::new("t");
        let edits: Vec<Edit> = serde_json::from_str(
            r#"[
                {"type": "ADD_SITE", "payload": {"name": "HQ"}},
                {"type": "ADD_SUBNET", "payload": {"siteId": "t1", "name": "A", "cidr": "10.0.1.0/24"}},
                {"type": "ADD_SUBNET", "payload": {"siteId": "t1", "name": "B", "cidr": "10.0.2.0/24"}},
                {"type": "CONNECT_SUBNETS", "payload": {"siteId": "t1", "from": "t2", "to": "t5"}}
            ]"#,
        )
        .unwrap();
        apply_edits(&mut topology, edits, &mut ids).unwrap();
        topology
    }

    #[test]
    fn test_compile_pipeline() {
        let compiled = compile(&built(), target(), &CompilerConfig::default()).unwrap();
        assert_eq!(compiled.descriptor.name, "ae3gis-topology-c0ffee00");
        assert_eq!(compiled.nodes.len(), 4);
        assert_eq!(compiled.plan.point_to_point_links().count(), 1);
        assert_eq!(compiled.descriptor.topology.links.len(), 3);
    }

    #[test]
    fn test_invalid_topology_aborts() {
        let mut topology = built();
        topology.sites[0].subnets[0].containers[0].ip = "172.16.0.1".to_string();
        let err = compile(&topology, target(), &CompilerConfig::default()).unwrap_err();
        assert!(format!("{:?}", err).contains("Topology validation failed"));
    }

    #[test]
    fn test_generate_writes_files() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out").join("lab.clab.yml");
        let plan_path = dir.path().join("out").join("plan.json");

        generate_to_files(&built(), target(), &CompilerConfig::default(), &output, Some(&plan_path)).unwrap();

        let yaml = fs::read_to_string(&output).unwrap();
        assert!(yaml.contains("name: ae3gis-topology-c0ffee00"));
        let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&plan_path).unwrap()).unwrap();
        assert_eq!(report["deployment"], "ae3gis-topology-c0ffee00");
        assert!(report["plan"]["links"].is_array());
    }

    #[test]
    fn test_failed_generation_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("lab.clab.yml");
        let config = CompilerConfig {
            point_to_point_block: "10.255.0.0/31".parse().unwrap(),
            ..Default::default()
        };

        assert!(generate_to_files(&built(), target(), &config, &output, None).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_apply_edits_reports_ignored() {
        let mut topology = Topology::default();
        let edits: Vec<Edit> =
            serde_json::from_str(r#"[{"type": "DELETE_SITE", "payload": {"id": "missing"}}]"#).unwrap();
        let outcomes = apply_edits(&mut topology, edits, &mut SequentialIds::new("x")).unwrap();
        assert!(!outcomes[0].is_applied());
    }
}
