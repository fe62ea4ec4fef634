use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::path::{Path, PathBuf};

use netlab::clab::{
    self, deployment_name, management_ipv4_subnet, management_ipv6_subnet, management_network_name,
    DeploymentTarget,
};
use netlab::config_loader;
use netlab::orchestrator;
use netlab::topology::RandomIds;
use netlab::utils::validation::validate_topology;

/// Topology compiler producing containerlab deployments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a topology into a containerlab descriptor
    Generate {
        /// Path to the topology JSON file
        #[arg(short, long)]
        topology: PathBuf,

        /// Topology record id (hex); drives deployment and network names
        #[arg(long)]
        topology_id: String,

        /// Output path for the containerlab descriptor
        #[arg(short, long, default_value = "topology.clab.yml")]
        output: PathBuf,

        /// Also write the address plan as JSON
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Compiler configuration YAML
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Management subnet retry attempt
        #[arg(long, default_value_t = 0)]
        mgmt_attempt: u32,
    },

    /// Validate a topology without generating anything
    Validate {
        #[arg(short, long)]
        topology: PathBuf,
    },

    /// Apply a JSON array of edits to a topology
    Apply {
        #[arg(short, long)]
        topology: PathBuf,

        /// JSON array of edits
        #[arg(short, long)]
        edits: PathBuf,

        /// Where to write the edited topology (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild a topology from an existing containerlab file
    Import {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value = "imported-topology.json")]
        output: PathBuf,
    },

    /// Print the deterministic deployment and management names
    Names {
        #[arg(long)]
        topology_id: String,

        /// Topology name (the configured default when omitted)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value_t = 0)]
        attempt: u32,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match args.command {
        Command::Generate {
            topology,
            topology_id,
            output,
            plan,
            config,
            mgmt_attempt,
        } => {
            info!("Topology file: {:?}", topology);
            info!("Output file: {:?}", output);

            let config = config_loader::load_config_or_default(config.as_deref())?;
            let topology = config_loader::load_topology(&topology)?;
            let target = DeploymentTarget {
                topology_id: &topology_id,
                attempt: mgmt_attempt,
            };

            let compiled =
                orchestrator::generate_to_files(&topology, target, &config, &output, plan.as_deref())?;

            info!(
                "Ready to deploy '{}' with: containerlab deploy -t {:?}",
                compiled.descriptor.name, output
            );
        }
        Command::Validate { topology } => {
            let topology = config_loader::load_topology(&topology)?;
            validate_topology(&topology).wrap_err("Topology validation failed")?;
            info!("Topology is valid");
        }
        Command::Apply { topology, edits, output } => {
            let mut model = config_loader::load_topology(&topology)?;
            let edits = config_loader::load_edits(&edits)?;

            orchestrator::apply_edits(&mut model, edits, &mut RandomIds)?;

            let output = output.unwrap_or(topology);
            write_json(&output, &model)?;
            info!("Wrote edited topology: {:?}", output);
        }
        Command::Import { input, output } => {
            let descriptor = config_loader::load_clab(&input)?;
            let topology = clab::import(&descriptor, &mut RandomIds);
            write_json(&output, &topology)?;
            info!("Wrote imported topology: {:?}", output);
        }
        Command::Names {
            topology_id,
            name,
            attempt,
            config,
        } => {
            let config = config_loader::load_config_or_default(config.as_deref())?;
            let name = config.topology_name(name.as_deref());

            println!("deployment: {}", deployment_name(name, &topology_id, config.id_prefix_len)?);
            println!(
                "mgmt-network: {}",
                management_network_name(&config.management.network_prefix, &topology_id, config.id_prefix_len)?
            );
            println!("mgmt-ipv4: {}", management_ipv4_subnet(&topology_id, attempt)?);
            println!("mgmt-ipv6: {}", management_ipv6_subnet(&topology_id, attempt)?);
        }
    }

    info!("Done");
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).wrap_err("Failed to serialize topology")?;
    orchestrator::write_output(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_parsing() {
        let args = Args::parse_from([
            "netlab",
            "generate",
            "--topology", "topo.json",
            "--topology-id", "deadbeef",
        ]);

        match args.command {
            Command::Generate { topology, topology_id, output, plan, mgmt_attempt, .. } => {
                assert_eq!(topology, PathBuf::from("topo.json"));
                assert_eq!(topology_id, "deadbeef");
                assert_eq!(output, PathBuf::from("topology.clab.yml"));
                assert!(plan.is_none());
                assert_eq!(mgmt_attempt, 0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_apply_parsing() {
        let args = Args::parse_from([
            "netlab",
            "apply",
            "-t", "topo.json",
            "-e", "edits.json",
            "-o", "out.json",
        ]);

        match args.command {
            Command::Apply { edits, output, .. } => {
                assert_eq!(edits, PathBuf::from("edits.json"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_names_parsing() {
        let args = Args::parse_from(["netlab", "names", "--topology-id", "00000a05", "--attempt", "2"]);
        assert!(matches!(args.command, Command::Names { attempt: 2, .. }));
    }

    #[test]
    fn test_generate_requires_topology_id() {
        assert!(Args::try_parse_from(["netlab", "generate", "--topology", "t.json"]).is_err());
    }
}
