// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! portlink-name - Run and query a portlink name server
//!
//! `server` runs an in-process name server until Ctrl+C; the other modes
//! talk to whatever name server the configuration (or detection) points at.

use clap::{Parser, Subcommand};
use portlink::name::{
    InMemoryNameStore, NameConfig, NameMode, NameServer, NameServerConfig, NameStore,
};
use portlink::{CarrierRegistry, Contact, Network, NetworkConfig};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// portlink name server tool
#[derive(Parser, Debug)]
#[command(name = "portlink-name")]
#[command(version = "0.1.0")]
#[command(about = "Run, query and detect portlink name servers")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Namespace (defaults to PORTLINK_NAMESPACE or /root)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run a name server until interrupted
    Server {
        /// Listening address
        #[arg(short, long, default_value = "0.0.0.0:10000")]
        bind: SocketAddr,

        /// Host advertised for the server (detected if omitted)
        #[arg(long)]
        host: Option<String>,

        /// Answer multicast detection probes
        #[arg(short, long)]
        probes: bool,

        /// Save this server as the configured one
        #[arg(short, long)]
        write: bool,
    },

    /// Look up a name
    Query {
        name: String,
    },

    /// Register a name, optionally with an explicit carrier/host/port
    Register {
        name: String,
        carrier: Option<String>,
        host: Option<String>,
        port: Option<u16>,
    },

    /// Remove a registration
    Unregister {
        name: String,
    },

    /// Find a name server on the local network
    Detect {
        /// Save the server found for future use
        #[arg(short, long)]
        write: bool,
    },

    /// List every registration
    List,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn name_config(args: &Args) -> NameConfig {
    let config = NameConfig::from_env();
    match &args.namespace {
        Some(ns) => config.with_namespace(ns),
        None => config,
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = name_config(args);
    match &args.mode {
        Mode::Server {
            bind,
            host,
            probes,
            write,
        } => run_server(config, *bind, host.as_deref(), *probes, *write),
        Mode::Query { name } => {
            let network = connect(config)?;
            let contact = network.query_name(name);
            if !contact.is_valid() {
                return Err(format!("{} is not registered", name).into());
            }
            println!("{}", contact);
            Ok(())
        }
        Mode::Register {
            name,
            carrier,
            host,
            port,
        } => {
            let network = connect(config)?;
            let contact = match (carrier, host, port) {
                (None, None, None) => network.register_name(name),
                // Blank parts and port 0 are allocated by the server.
                _ => network.register_contact(&Contact::new(
                    name,
                    carrier.as_deref().unwrap_or(""),
                    host.as_deref().unwrap_or(""),
                    port.unwrap_or(0),
                )),
            };
            if !contact.is_valid() {
                return Err(format!("registration of {} failed", name).into());
            }
            println!("{}", contact);
            Ok(())
        }
        Mode::Unregister { name } => {
            let network = connect(config)?;
            network.unregister_name(name);
            println!("unregistered {}", name);
            Ok(())
        }
        Mode::Detect { write } => {
            let network = Network::init(NetworkConfig::default().with_name(config))?;
            let detection = network.name_space().detect_name_server(*write);
            if !detection.contact.is_valid() {
                return Err("no name server found".into());
            }
            println!("{}", detection.contact);
            if detection.scan_needed && !detection.server_used {
                log::warn!("found by scanning but not saved; rerun with --write to keep it");
            }
            Ok(())
        }
        Mode::List => {
            let network = connect(config)?;
            for contact in network.name_client().list()? {
                println!("{}", contact);
            }
            Ok(())
        }
    }
}

/// Network using the configured server, or one found by scanning.
fn connect(config: NameConfig) -> Result<Network, Box<dyn std::error::Error>> {
    let network = Network::init(NetworkConfig::default().with_name(config))?;
    if !network.name_space().name_server_contact().is_valid() {
        let detection = network.name_space().detect_name_server(false);
        if !detection.contact.is_valid() {
            return Err("no name server configured or found".into());
        }
    }
    Ok(network)
}

fn run_server(
    config: NameConfig,
    bind: SocketAddr,
    host: Option<&str>,
    probes: bool,
    write: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut server_config = NameServerConfig::default()
        .with_bind(bind)
        .with_namespace(&config.namespace);
    if let Some(host) = host {
        server_config = server_config.with_host(host);
    }
    if probes {
        let detect = server_config.detect.clone();
        server_config = server_config.with_probes(detect);
    }

    let store: Arc<dyn NameStore> = Arc::new(InMemoryNameStore::new(
        server_config.base_port,
        server_config.port_range,
    ));
    let mut server = NameServer::start(
        server_config,
        Arc::new(CarrierRegistry::with_defaults()),
        store,
    )?;
    println!("Name server {} running (Ctrl+C to stop)", server.contact());

    if write {
        let contact = server.contact();
        let saved = Contact::by_socket(contact.carrier(), contact.host(), contact.port().unwrap_or(0));
        config.write_saved(&saved, NameMode::Yarp)?;
        println!("Saved to {}", config.config_file().display());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    server.shutdown();
    Ok(())
}
