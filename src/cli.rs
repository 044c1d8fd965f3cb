//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

/// credgate — credential-isolating proxy for sandboxed CLI tools.
#[derive(Parser, Debug)]
#[command(
    name = "credgate",
    version = env!("CARGO_PKG_VERSION"),
    about = "credgate — keeps credentials on the trusted side of an agent sandbox"
)]
pub struct Cli {
    /// Path to the configuration file (JSON5).
    #[arg(long)]
    pub config: PathBuf,

    /// Port override (default: from config, else 8766).
    #[arg(long)]
    pub port: Option<u16>,

    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_flag_is_required() {
        let result = Cli::try_parse_from(["credgate"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_port_override_parses() {
        let cli = Cli::try_parse_from(["credgate", "--config", "/tmp/c.json5", "--port", "9000"])
            .unwrap();
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.host, "0.0.0.0");
    }
}
