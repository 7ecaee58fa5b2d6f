use clap::{Parser, Subcommand};

use infrastructure::config::{LogFormat, LogLevel};
use infrastructure::constants::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(
    name = "conntracct",
    about = "Continuous conntrack accounting exporter",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Log level override (takes precedence over config file)
    #[arg(short, long, value_parser = clap::value_parser!(LogLevel))]
    pub log_level: Option<LogLevel>,

    /// Log format: json (production) or text (development)
    #[arg(long, value_parser = clap::value_parser!(LogFormat))]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Display version information
    Version,
}

pub fn parse() -> Cli {
    Cli::parse()
}
