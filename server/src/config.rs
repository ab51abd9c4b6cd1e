//! Server configuration
//!
//! Command-line arguments are parsed by the binary and turned into a
//! [`ServerConfig`], which is validated before the server binds its socket.

use race_shared::{CircuitDefinition, CircuitError, CircuitPath, DEFAULT_MAX_LAPS, DEFAULT_MAX_RACERS};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tick rate must be between 1 and 240 Hz, got {0}")]
    TickRate(u32),
    #[error("max racers must be between 2 and {max}, got {got}")]
    MaxRacers { got: usize, max: usize },
    #[error("max laps must be at least 1, got {0}")]
    MaxLaps(i32),
    #[error("max clients ({clients}) must be at least max racers ({racers})")]
    MaxClients { clients: usize, racers: usize },
    #[error("failed to read circuit file {path}: {source}")]
    CircuitIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse circuit file {path}: {source}")]
    CircuitFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid circuit: {0}")]
    Circuit(#[from] CircuitError),
}

/// Upper bound for grid slots; the starting grid spreads racers along the
/// last checkpoint.
pub const MAX_GRID_SLOTS: usize = 8;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_rate: u32,
    pub max_clients: usize,
    pub max_racers: usize,
    pub max_laps: i32,
    pub circuit_path: Option<PathBuf>,
    pub client_timeout: Duration,
    /// Every this many ticks the full replicated state is resent.
    pub resync_interval: u32,
    /// Seed for color selection; `None` seeds from entropy.
    pub color_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            tick_rate: 30,
            max_clients: 8,
            max_racers: DEFAULT_MAX_RACERS,
            max_laps: DEFAULT_MAX_LAPS,
            circuit_path: None,
            client_timeout: Duration::from_secs(5),
            resync_interval: 60,
            color_seed: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 240 {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if self.max_racers < 2 || self.max_racers > MAX_GRID_SLOTS {
            return Err(ConfigError::MaxRacers {
                got: self.max_racers,
                max: MAX_GRID_SLOTS,
            });
        }
        if self.max_laps < 1 {
            return Err(ConfigError::MaxLaps(self.max_laps));
        }
        if self.max_clients < self.max_racers {
            return Err(ConfigError::MaxClients {
                clients: self.max_clients,
                racers: self.max_racers,
            });
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    /// Loads the configured circuit, or the built-in oval when none is set.
    pub fn load_circuit(&self) -> Result<CircuitPath, ConfigError> {
        match &self.circuit_path {
            Some(path) => load_circuit_file(path),
            None => Ok(CircuitPath::default_oval()?),
        }
    }
}

/// Reads a circuit from a JSON file of the form `{ "waypoints": [[x, y], ...] }`.
pub fn load_circuit_file(path: &Path) -> Result<CircuitPath, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::CircuitIo {
        path: path.to_path_buf(),
        source,
    })?;
    parse_circuit(&text).map_err(|e| match e {
        ParseError::Json(source) => ConfigError::CircuitFormat {
            path: path.to_path_buf(),
            source,
        },
        ParseError::Circuit(e) => ConfigError::Circuit(e),
    })
}

enum ParseError {
    Json(serde_json::Error),
    Circuit(CircuitError),
}

fn parse_circuit(text: &str) -> Result<CircuitPath, ParseError> {
    let definition: CircuitDefinition = serde_json::from_str(text).map_err(ParseError::Json)?;
    CircuitPath::from_definition(&definition).map_err(ParseError::Circuit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use race_shared::MAX_SEGMENTS;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_duration(), Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn test_invalid_tick_rate() {
        let config = ServerConfig {
            tick_rate: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::TickRate(0))));
    }

    #[test]
    fn test_invalid_max_racers() {
        let config = ServerConfig {
            max_racers: 1,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MaxRacers { got: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_max_laps() {
        let config = ServerConfig {
            max_laps: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MaxLaps(0))));
    }

    #[test]
    fn test_clients_must_fit_racers() {
        let config = ServerConfig {
            max_clients: 2,
            max_racers: 4,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MaxClients { .. })
        ));
    }

    #[test]
    fn test_parse_circuit_json() {
        let circuit = match parse_circuit(r#"{ "waypoints": [[0, 0], [50, 0], [50, 20], [0, 20]] }"#) {
            Ok(circuit) => circuit,
            Err(_) => panic!("circuit should parse"),
        };
        assert_eq!(circuit.segment_count(), 4);
    }

    #[test]
    fn test_parse_circuit_rejects_bad_input() {
        assert!(matches!(parse_circuit("not json"), Err(ParseError::Json(_))));
        assert!(matches!(
            parse_circuit(r#"{ "waypoints": [[0, 0], [1, 0]] }"#),
            Err(ParseError::Circuit(CircuitError::TooFewSegments { .. }))
        ));
    }

    #[test]
    fn test_parse_circuit_rejects_oversized_circuit() {
        let waypoints: Vec<String> = (0..=MAX_SEGMENTS)
            .map(|i| {
                let angle = i as f32 / (MAX_SEGMENTS + 1) as f32 * std::f32::consts::TAU;
                format!("[{}, {}]", 2000.0 * angle.cos(), 2000.0 * angle.sin())
            })
            .collect();
        let json = format!(r#"{{ "waypoints": [{}] }}"#, waypoints.join(", "));

        assert!(matches!(
            parse_circuit(&json),
            Err(ParseError::Circuit(CircuitError::TooManySegments { .. }))
        ));
    }

    #[test]
    fn test_missing_circuit_file() {
        let config = ServerConfig {
            circuit_path: Some(PathBuf::from("/definitely/not/here.json")),
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.load_circuit(),
            Err(ConfigError::CircuitIo { .. })
        ));
    }

    #[test]
    fn test_default_circuit_loads() {
        let circuit = ServerConfig::default().load_circuit().unwrap();
        assert_eq!(circuit.segment_count(), 24);
    }
}
