use crate::build_info;
use crate::config::Config;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Course authoring and delivery backend for CodePulse",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    #[arg(long = "database-url")]
    /// Overrides DATABASE_URL
    pub database_url: Option<String>,

    #[arg(short, long)]
    /// Overrides PORT
    pub port: Option<u16>,

    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,

    #[arg(long = "skip-migrations", default_value_t = false)]
    /// Do not run embedded Postgres migrations on startup
    pub skip_migrations: bool,
}

impl Cli {
    /// Applies command-line overrides on top of environment configuration.
    pub fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(database_url) = &self.database_url {
            config.db_url = database_url.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
