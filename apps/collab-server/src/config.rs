use clap::Parser;
use collaboration::RelayConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "collab-server")]
#[command(about = "Relay server for shared text-mode canvases")]
#[command(version)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "COLLAB_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, env = "COLLAB_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Document file; created blank if missing
    #[arg(short, long, env = "COLLAB_FILE", default_value = "server.json")]
    pub file: PathBuf,

    /// Shared passphrase required to join
    #[arg(long, env = "COLLAB_PASS")]
    pub pass: Option<String>,

    /// Seconds between periodic saves
    #[arg(long, default_value_t = 300)]
    pub save_interval_secs: u64,

    /// Frames buffered per connection before a slow peer is dropped
    #[arg(long, default_value_t = 1024)]
    pub outbound_capacity: usize,

    /// Chat lines replayed to late joiners
    #[arg(long, default_value_t = 100)]
    pub chat_history: usize,

    #[arg(short, long)]
    pub verbose: bool,
}

impl ServerConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            pass: self.pass.clone().filter(|pass| !pass.is_empty()),
            chat_history: self.chat_history,
        }
    }

    /// Used when `RUST_LOG` is unset.
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "collab_server=debug,collaboration=debug,textmode=debug"
        } else {
            "collab_server=info,collaboration=info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["collab-server"]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.save_interval(), Duration::from_secs(300));
        assert_eq!(config.outbound_capacity, 1024);
        assert_eq!(config.file, PathBuf::from("server.json"));
    }

    #[test]
    fn test_empty_pass_disables_check() {
        let config =
            ServerConfig::try_parse_from(["collab-server", "--pass", "", "--port", "9000"]).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.relay_config().pass, None);

        let config = ServerConfig::try_parse_from(["collab-server", "--pass", "secret"]).unwrap();
        assert_eq!(config.relay_config().pass.as_deref(), Some("secret"));
    }
}
