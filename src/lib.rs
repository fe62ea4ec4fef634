//! # Netlab - Topology compiler for containerlab
//!
//! This library turns an editable network topology (sites holding subnets
//! holding containers, plus the connections between them) into a
//! containerlab deployment descriptor with concrete interfaces, addresses,
//! bridges and static routes.
//!
//! ## Overview
//!
//! A topology is edited through discrete operations that keep it routable at
//! all times: every new subnet gets a gateway router and a switch, and every
//! subnet or site link is anchored on a concrete router or firewall. The
//! compiler then derives all addressing from scratch on each pass, so the
//! same topology always yields the same descriptor.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `topology`: Data model, id generation and the structural edit engine
//! - `ip`: Host arithmetic, `/30` link allocation and interface naming
//! - `plan`: Address & interface planner (interfaces, p2p links, routes)
//! - `node`: Role dispatch, image selection, start-up commands, firewall rules
//! - `clab`: Containerlab descriptor types, naming contract, emitter and importer
//! - `config` / `config_loader`: Compiler configuration and file loading
//! - `utils`: Pre-planning topology validation
//! - `orchestrator`: High-level generation pipeline and file output
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use netlab::clab::DeploymentTarget;
//! use netlab::{config_loader, orchestrator};
//! use std::path::Path;
//!
//! let topology = config_loader::load_topology(Path::new("topology.json"))?;
//! let config = config_loader::load_config_or_default(None)?;
//! let target = DeploymentTarget { topology_id: "deadbeef00112233", attempt: 0 };
//!
//! orchestrator::generate_to_files(&topology, target, &config, Path::new("lab.clab.yml"), None)?;
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Library stages return typed `thiserror` errors (`EditError`, `PlanError`,
//! `ValidationError`, `NamingError`); the loader and orchestrator wrap them
//! with `color_eyre` context for reporting.

pub mod clab;
pub mod config;
pub mod config_loader;
pub mod ip;
pub mod node;
pub mod orchestrator;
pub mod plan;
pub mod topology;
pub mod utils;
