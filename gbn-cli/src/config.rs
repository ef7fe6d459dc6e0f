//! Configuration file support for the GBN peer

use gbn_protocol::{ConfigError, PeerId, PeerIdError, ProtocolConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `[protocol]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSection {
    /// Largest frame payload in bytes (1..=4096)
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
    /// Sender window size; sequence numbers run modulo `window_size + 1`
    #[serde(default = "default_window_size")]
    pub window_size: u32,
    /// First sequence number of every transfer
    #[serde(default)]
    pub init_seq: u32,
    /// Retransmission timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_payload() -> usize {
    1024
}

fn default_window_size() -> u32 {
    4
}

fn default_timeout_ms() -> u64 {
    200
}

impl Default for ProtocolSection {
    fn default() -> Self {
        ProtocolSection {
            max_payload: default_max_payload(),
            window_size: default_window_size(),
            init_seq: 0,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// `[channel]` section: simulated impairment, each "one in N" (0 disables)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSection {
    #[serde(default)]
    pub error_rate: u32,
    #[serde(default)]
    pub loss_rate: u32,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

/// `[transport]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSection {
    /// Local UDP address
    pub bind: SocketAddr,
    /// Remote UDP address every frame is sent to
    pub peer: SocketAddr,
    /// Logical id of this peer; random if omitted
    pub local_id: Option<String>,
    /// Destination peer id; prompted for if omitted
    pub dest_id: Option<String>,
    /// File to send on startup
    pub file: Option<PathBuf>,
    /// Where received files are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Receive loop sleep when idle, in milliseconds
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("received")
}

fn default_idle_backoff_ms() -> u64 {
    1
}

/// `[log]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSection {
    /// File receiving the per-frame send and receive timeline
    pub file: Option<PathBuf>,
}

/// Combined configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub protocol: ProtocolSection,
    #[serde(default)]
    pub channel: ChannelSection,
    pub transport: TransportSection,
    #[serde(default)]
    pub log: LogSection,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CliConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Create example configuration
    pub fn example() -> Self {
        Config {
            protocol: ProtocolSection::default(),
            channel: ChannelSection {
                error_rate: 20,
                loss_rate: 20,
                seed: None,
            },
            transport: TransportSection {
                bind: SocketAddr::from(([0, 0, 0, 0], 9000)),
                peer: SocketAddr::from(([127, 0, 0, 1], 9001)),
                local_id: Some("00:16:3e:00:00:01".to_string()),
                dest_id: Some("00:16:3e:00:00:02".to_string()),
                file: None,
                output_dir: default_output_dir(),
                idle_backoff_ms: default_idle_backoff_ms(),
            },
            log: LogSection {
                file: Some(PathBuf::from("gbn-timeline.log")),
            },
        }
    }

    /// Validated protocol parameters
    pub fn protocol(&self) -> Result<ProtocolConfig, CliConfigError> {
        let p = &self.protocol;
        Ok(ProtocolConfig::new(
            p.max_payload,
            p.window_size,
            p.init_seq,
            Duration::from_millis(p.timeout_ms),
        )?)
    }

    /// This peer's id, generating one if none is configured
    pub fn local_id(&self) -> Result<PeerId, CliConfigError> {
        match &self.transport.local_id {
            Some(id) => Ok(id.parse()?),
            None => Ok(PeerId::random()),
        }
    }

    /// Configured destination, if any
    pub fn dest_id(&self) -> Result<Option<PeerId>, CliConfigError> {
        self.transport
            .dest_id
            .as_deref()
            .map(|id| id.parse().map_err(CliConfigError::from))
            .transpose()
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.transport.idle_backoff_ms)
    }

    /// Check every field that can be checked before startup
    pub fn validate(&self) -> Result<(), CliConfigError> {
        self.protocol()?;
        let dest = self.dest_id()?;
        if let Some(local) = &self.transport.local_id {
            let local: PeerId = local.parse()?;
            if dest == Some(local) {
                return Err(CliConfigError::Invalid(format!(
                    "destination id {} is this peer's own id",
                    local
                )));
            }
        }
        if self.protocol.max_payload < 2 {
            return Err(CliConfigError::Invalid(
                "max_payload must be at least 2 to carry file data".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum CliConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid protocol settings: {0}")]
    Protocol(#[from] ConfigError),

    #[error("Invalid peer id: {0}")]
    PeerId(#[from] PeerIdError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::example();
        config.validate().unwrap();
        assert_eq!(config.protocol().unwrap().window_size(), 4);
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = Config::example();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let parsed: Config = toml::from_str(
            r#"
            [transport]
            bind = "127.0.0.1:7000"
            peer = "127.0.0.1:7001"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.protocol, ProtocolSection::default());
        assert_eq!(parsed.channel.error_rate, 0);
        assert_eq!(parsed.transport.output_dir, PathBuf::from("received"));
        assert_eq!(parsed.idle_backoff(), Duration::from_millis(1));
        assert!(parsed.dest_id().unwrap().is_none());
        assert_eq!(parsed.log.file, None);
        // a random id is generated
        assert_eq!(&parsed.local_id().unwrap().as_bytes()[..3], &[0x00, 0x16, 0x3e]);
    }

    #[test]
    fn test_log_section() {
        let parsed: Config = toml::from_str(
            r#"
            [transport]
            bind = "127.0.0.1:7000"
            peer = "127.0.0.1:7001"

            [log]
            file = "logs/peer-a.log"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.log.file, Some(PathBuf::from("logs/peer-a.log")));
    }

    #[test]
    fn test_invalid_window_rejected() {
        let mut config = Config::example();
        config.protocol.window_size = 0;
        assert!(matches!(
            config.validate(),
            Err(CliConfigError::Protocol(ConfigError::InvalidWindowSize(0)))
        ));
    }

    #[test]
    fn test_bad_peer_id_rejected() {
        let mut config = Config::example();
        config.transport.dest_id = Some("not-a-peer".to_string());
        assert!(matches!(config.validate(), Err(CliConfigError::PeerId(_))));
    }

    #[test]
    fn test_dest_equal_to_local_rejected() {
        let mut config = Config::example();
        config.transport.dest_id = config.transport.local_id.clone();
        assert!(matches!(config.validate(), Err(CliConfigError::Invalid(_))));
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("gbn-config-{}.toml", std::process::id()));
        let config = Config::example();
        config.to_file(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
        let _ = fs::remove_file(&path);
    }
}
