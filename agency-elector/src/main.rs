mod args_parse;
mod service_configuration;

use std::{fs::read_to_string, net::SocketAddr, path::Path, sync::Arc};

use crate::{
    args_parse::Args,
    service_configuration::{
        parse_endpoint, parse_socket_addr, LoadConfiguration, ServiceConfiguration,
    },
};

use agency_election::{election_metrics, Elector, LeaderElectionCell, SystemClock};
use agency_store::{AgencyStorage, HttpAgency, MemoryAgency, ReqwestConnection};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load the configuration from the specified YAML file
    let config_content = read_to_string(Path::new(&args.config_file))
        .context(format!("Failed to read config file: {}", args.config_file))?;
    let load_config: LoadConfiguration = serde_yaml::from_str(&config_content)?;
    let mut service_config: ServiceConfiguration = load_config.try_into()?;

    // Command-line args override the values from the config file
    if let Some(endpoint) = args.endpoint {
        service_config.endpoint = Some(parse_endpoint(&endpoint)?);
    }
    if let Some(value) = args.value {
        if value.is_empty() {
            return Err(anyhow!("--value must not be empty"));
        }
        service_config.value = value;
    }
    if let Some(prom_exporter) = args.prom_exporter {
        service_config.prom_exporter = Some(parse_socket_addr(&prom_exporter)?);
    }
    if args.in_memory {
        service_config.endpoint = None;
    }

    init_metrics(service_config.prom_exporter)?;

    let agency = match service_config.connection_config() {
        Some(conn_config) => {
            info!(endpoint = %conn_config.host, root = %service_config.root, "Initializing HTTP agency");
            let conn = ReqwestConnection::new(conn_config)?;
            AgencyStorage::Http(HttpAgency::with_root(Arc::new(conn), &service_config.root))
        }
        None => {
            info!("Initializing in-memory agency");
            AgencyStorage::InMemory(MemoryAgency::new())
        }
    };

    let cell = LeaderElectionCell::with_config(
        service_config.key,
        service_config.election,
        Arc::new(SystemClock),
    )?;
    let (elector, mut handle) = Elector::new(cell, Arc::new(agency), service_config.value);

    let cancel = CancellationToken::new();
    let election = tokio::spawn(elector.run(cancel.clone()));

    // ends once the elector is dropped
    let watcher = tokio::spawn(async move {
        while handle.changed().await {
            let status = handle.status();
            info!(state = ?status.state, leader = ?status.leader, "leader election status changed");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    info!("Shutdown requested, resigning leadership");
    cancel.cancel();

    let outcome = election.await.context("leader election task failed")?;
    let _ = watcher.await;
    outcome?;

    info!("agency elector stopped");
    Ok(())
}

fn init_metrics(prom_addr: Option<SocketAddr>) -> Result<()> {
    if let Some(addr) = prom_addr {
        info!(%addr, "initializing Prometheus exporter");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus recorder")?;
    }

    election_metrics::init_metrics();
    Ok(())
}
