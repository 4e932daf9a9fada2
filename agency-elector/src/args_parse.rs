use clap::Parser;

/// Runs one agency leader election until interrupted
#[derive(Debug, Parser)]
#[command(name = "agency-elector")]
#[command(version)]
pub(crate) struct Args {
    /// Path to config file
    #[arg(long)]
    pub(crate) config_file: String,

    /// Agency agent address, overrides agency.endpoint
    #[arg(long)]
    pub(crate) endpoint: Option<String>,

    /// Candidate payload, overrides election.value
    #[arg(long)]
    pub(crate) value: Option<String>,

    /// Prometheus Exporter http address
    #[arg(long)]
    pub(crate) prom_exporter: Option<String>,

    /// Run against an in-memory agency, ignoring any configured endpoint
    #[arg(long, default_value_t = false)]
    pub(crate) in_memory: bool,
}
