//! Command-line interface

use crate::config::{LogFormat, StoreBackend};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "dermascan-server")]
#[command(about = "DermaScan skin-lesion classification service", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "dermascan.yaml")]
    pub config: PathBuf,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Model schema file
    #[arg(short = 'm', long)]
    pub model_schema: Option<PathBuf>,

    /// Prediction store backend
    #[arg(long, value_enum)]
    pub store: Option<StoreBackend>,

    /// Data directory for the JSON-lines store
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// CLI with no overrides, reading `config`
    pub fn with_config(config: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
            listen: None,
            port: None,
            model_schema: None,
            store: None,
            data_dir: None,
            log_format: None,
            verbose: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::parse_from([
            "dermascan-server",
            "--port",
            "9000",
            "--store",
            "memory",
            "--model-schema",
            "models/lesion.yaml",
            "-v",
        ]);

        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.store, Some(StoreBackend::Memory));
        assert_eq!(cli.model_schema, Some(PathBuf::from("models/lesion.yaml")));
        assert_eq!(cli.config, PathBuf::from("dermascan.yaml"));
        assert!(cli.verbose);
    }
}
