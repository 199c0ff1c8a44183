use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Server configuration, read from flags with environment fallbacks.
#[derive(Debug, Clone, Parser)]
#[command(name = "server", about = "Gangsheet packing service")]
pub struct ServerConfig {
    #[arg(long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// File the tracing output is appended to
    #[arg(long, env = "LOG_FILE", default_value = "development.log")]
    pub log_file: PathBuf,

    /// Directory rendered roll files are written to
    #[arg(long, env = "RENDER_DIR", default_value = "renders")]
    pub render_dir: PathBuf,

    /// Prefix for the file URLs handed back to clients
    #[arg(long, env = "PUBLIC_BASE_URL", default_value = "/renders")]
    pub public_base_url: String,

    #[arg(long, env = "RENDER_TIMEOUT_SECS", default_value_t = 120)]
    pub render_timeout_secs: u64,

    /// JSON map of tenant id to design records served by the design lookup
    #[arg(long, env = "DESIGNS_FILE")]
    pub designs_file: Option<PathBuf>,

    #[arg(long, env = "SENTRY_DSN")]
    pub sentry_dsn: Option<String>,
}

impl ServerConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ServerConfig::try_parse_from(["server"]).unwrap();
        assert_eq!(cfg.render_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.public_base_url, "/renders");
    }

    #[test]
    fn test_flags_override() {
        let cfg = ServerConfig::try_parse_from([
            "server",
            "--port",
            "8080",
            "--render-timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.render_timeout(), Duration::from_secs(5));
    }
}
