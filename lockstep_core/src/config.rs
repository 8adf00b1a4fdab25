//! Node configuration bundle.
//!
//! Keys are camelCase and every field has a default, so an empty JSON object
//! is a valid configuration:
//!
//! ```json
//! { "numPorts": 8, "topology": "grid8", "numBytes": "64KB", "clockFreq": "2GHz" }
//! ```

use crate::codec::TrafficCodec;
use crate::error::ConfigError;
use crate::topology::{Topology, TopologyKind};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Configuration for one traffic node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeConfig {
    /// Log verbosity: 1 lifecycle, 5 per-message
    pub verbose: u32,

    /// Clock frequency, e.g. "1GHz", "500MHz"
    pub clock_freq: String,

    /// Number of ports on the node
    pub num_ports: u32,

    /// Smallest frame length in words, header included
    pub min_data: u32,

    /// Largest frame length in words, header included
    pub max_data: u32,

    /// Ticks between send events
    pub clock_delay: u32,

    /// Ticks before the node signals it is ready to end
    pub clocks: u64,

    /// Seed for every port stream
    pub rng_seed: u64,

    /// Offset of the self-checking buffer pattern
    pub base_seed: u32,

    /// Size of the self-checking buffer in bytes
    #[serde(deserialize_with = "deserialize_size")]
    pub num_bytes: u64,

    pub topology: TopologyKind,

    /// Queue sends and flush them as the link reports buffer space
    pub queued_sends: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            clock_freq: "1GHz".to_string(),
            num_ports: 1,
            min_data: 1,
            max_data: 2,
            clock_delay: 1,
            clocks: 1000,
            rng_seed: 1223,
            base_seed: 1223,
            num_bytes: 64 * 1024,
            topology: TopologyKind::PointToPoint,
            queued_sends: false,
        }
    }
}

impl NodeConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::File(e.to_string()))
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Checks every field that can make the node unstartable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.codec()?;
        self.clock_period_ps()?;
        Ok(())
    }

    /// Resolves the validated topology.
    pub fn topology(&self) -> Result<Topology, ConfigError> {
        Topology::new(self.topology, self.num_ports)
    }

    /// Builds the traffic codec for this node's topology.
    pub fn codec(&self) -> Result<TrafficCodec, ConfigError> {
        TrafficCodec::for_topology(self.min_data, self.max_data, &self.topology()?)
    }

    /// Clock period in picoseconds.
    pub fn clock_period_ps(&self) -> Result<u64, ConfigError> {
        parse_clock_period_ps(&self.clock_freq)
    }

    /// Number of 32-bit words in the self-checking buffer.
    pub fn buffer_words(&self) -> usize {
        (self.num_bytes / 4) as usize
    }
}

/// Parses a frequency such as "1GHz" or "2.5 MHz" into a period in ps.
pub fn parse_clock_period_ps(text: &str) -> Result<u64, ConfigError> {
    let bad = || ConfigError::ClockFrequency(text.to_string());

    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "hz" | "" => 1.0,
        "khz" => 1e3,
        "mhz" => 1e6,
        "ghz" => 1e9,
        _ => return Err(bad()),
    };
    let value: f64 = number.trim().parse().map_err(|_| bad())?;
    let hz = value * multiplier;
    if !hz.is_finite() || hz <= 0.0 {
        return Err(bad());
    }

    let period = (1e12 / hz).round();
    if period < 1.0 || period > u64::MAX as f64 {
        return Err(bad());
    }
    Ok(period as u64)
}

/// Parses a byte size such as "64KB", "1MiB" or "4096".
///
/// `K`, `M` and `G` are powers of 1024 with or without the `i`.
pub fn parse_size(text: &str) -> Result<u64, ConfigError> {
    let bad = || ConfigError::Size(text.to_string());

    let trimmed = text.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" | "kib" => 1 << 10,
        "mb" | "mib" => 1 << 20,
        "gb" | "gib" => 1 << 30,
        _ => return Err(bad()),
    };
    let value: u64 = number.parse().map_err(|_| bad())?;
    value.checked_mul(multiplier).ok_or_else(bad)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Bytes(u64),
    Text(String),
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Bytes(bytes) => Ok(bytes),
        SizeValue::Text(text) => parse_size(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.num_bytes, 65536);
        assert_eq!(config.buffer_words(), 16384);
        assert_eq!(config.rng_seed, 1223);
        assert_eq!(config.topology, TopologyKind::PointToPoint);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = NodeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, NodeConfig::default());
    }

    #[test]
    fn test_camel_case_keys() {
        let config = NodeConfig::from_json_str(
            r#"{
                "numPorts": 8,
                "topology": "grid8",
                "minData": 2,
                "maxData": 10,
                "numBytes": "1KiB",
                "clockFreq": "500MHz",
                "queuedSends": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.num_ports, 8);
        assert_eq!(config.topology, TopologyKind::Grid8);
        assert_eq!(config.num_bytes, 1024);
        assert!(config.queued_sends);
        assert_eq!(config.clock_period_ps().unwrap(), 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_num_bytes_accepts_integers() {
        let config = NodeConfig::from_json_str(r#"{ "numBytes": 4096 }"#).unwrap();
        assert_eq!(config.num_bytes, 4096);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("64KB").unwrap(), 65536);
        assert_eq!(parse_size("2MiB").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1GB").unwrap(), 1 << 30);
        assert_eq!(parse_size("12B").unwrap(), 12);
        assert_eq!(parse_size("12").unwrap(), 12);
        assert!(matches!(parse_size("12XB"), Err(ConfigError::Size(_))));
        assert!(parse_size("KB").is_err());
    }

    #[test]
    fn test_parse_clock_period() {
        assert_eq!(parse_clock_period_ps("1GHz").unwrap(), 1000);
        assert_eq!(parse_clock_period_ps("2.5GHz").unwrap(), 400);
        assert_eq!(parse_clock_period_ps("1 MHz").unwrap(), 1_000_000);
        assert!(matches!(
            parse_clock_period_ps("fast"),
            Err(ConfigError::ClockFrequency(_))
        ));
        assert!(parse_clock_period_ps("0GHz").is_err());
        assert!(parse_clock_period_ps("5THz").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let config = NodeConfig {
            min_data: 4,
            max_data: 3,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::DataRange { .. })));

        let config = NodeConfig {
            topology: TopologyKind::Ring4,
            num_ports: 4,
            min_data: 1,
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DataBelowHeader { .. })
        ));

        let config = NodeConfig {
            topology: TopologyKind::Grid8,
            num_ports: 2,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::PortCount { .. })));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "clocks": 42 }}"#).unwrap();

        let config = NodeConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.clocks, 42);

        assert!(matches!(
            NodeConfig::from_json_file("/nonexistent/node.json"),
            Err(ConfigError::File(_))
        ));
    }
}
