use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Quill binary.
#[derive(Debug, Parser)]
#[command(name = "quill", version, about = "Quill blog API server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "QUILL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Load a JSON fixture into the document store and exit.
    Seed(SeedArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Override the listing cache expiry.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Seed the store from this fixture before serving.
    #[arg(long = "seed-file", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SeedArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// JSON fixture with `users`, `categories`, `tags`, `posts` and `comments`.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}
