//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use covdiff::config::{env, DEFAULT_CONTROL_SOCKET, DEFAULT_DATA_SOCKET};
use std::path::PathBuf;

/// covdiff: drive and collect per-test coverage from a running application
#[derive(Parser, Debug)]
#[command(name = "covdiff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a coverage window for a test
    Start(ControlArgs),

    /// Close the coverage window and trigger the report
    End(ControlArgs),

    /// Receive reports on the data socket and print them
    Collect(CollectArgs),

    /// Show the agent configuration resolved from the environment
    Config(ConfigArgs),
}

/// Arguments shared by `start` and `end`
#[derive(Args, Debug, Clone)]
pub struct ControlArgs {
    /// Test identifier (everything after the action on the wire)
    pub id: String,

    /// Agent control socket
    #[arg(long, env = env::CONTROL_SOCKET, default_value = DEFAULT_CONTROL_SOCKET)]
    pub socket: PathBuf,

    /// How long to wait for ACK, in milliseconds
    #[arg(long, default_value = "10000")]
    pub timeout_ms: u64,
}

/// Arguments for the `collect` command
#[derive(Args, Debug, Clone)]
pub struct CollectArgs {
    /// Data socket to bind
    #[arg(long, env = env::DATA_SOCKET, default_value = DEFAULT_DATA_SOCKET)]
    pub socket: PathBuf,

    /// Stop after this many reports
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Give up when no report arrives within this many milliseconds
    #[arg(long)]
    pub idle_timeout_ms: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: ReportFormat,
}

/// Arguments for the `config` command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "yaml")]
    pub format: ConfigFormat,
}

/// How collected reports are printed
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// One compact JSON object per line
    #[default]
    Json,
    /// One YAML document per report
    Yaml,
}

/// How the configuration is printed
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    #[default]
    Yaml,
    /// Pretty JSON
    Json,
}

/// Color argument
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
