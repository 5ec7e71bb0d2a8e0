// Конфигурация звонка
// Логирование по умолчанию включено только в режиме разработки

use serde::{Deserialize, Serialize};

use crate::error::CallError;
use crate::peer::media::MediaConstraints;
use crate::peer::types::ServerConfig;

/// Громкость вывода удалённого потока
pub const DEFAULT_REMOTE_OUTPUT_GAIN: f32 = 0.7;

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true; // В режиме отладки логирование включено

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // В продакшене логирование отключено

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingConfig {
    pub enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: LOGGING_ENABLED,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CallConfig {
    pub ice_servers: Vec<ServerConfig>,
    pub media: MediaConstraints,
    pub remote_output_gain: f32,
    pub logging: LoggingConfig,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            media: MediaConstraints::default(),
            remote_output_gain: DEFAULT_REMOTE_OUTPUT_GAIN,
            logging: LoggingConfig::default(),
        }
    }
}

impl CallConfig {
    /// Читает конфигурацию из JSON и проверяет её
    pub fn from_json(json: &str) -> Result<Self, CallError> {
        let config: CallConfig =
            serde_json::from_str(json).map_err(|e| CallError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CallError> {
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(CallError::Config(format!(
                    "server {} URL cannot be empty",
                    server.id
                )));
            }

            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(CallError::Config(format!(
                    "TURN server {} requires username and credential",
                    server.id
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.remote_output_gain) {
            return Err(CallError::Config(format!(
                "remote output gain {} is outside 0.0..=1.0",
                self.remote_output_gain
            )));
        }
        Ok(())
    }
}

/// Дефолтные публичные STUN серверы
pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            id: "default-stun".into(),
            r#type: "stun".into(),
            url: "stun:stun.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        ServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = CallConfig::from_json(r#"{ "remote_output_gain": 0.5 }"#).unwrap();
        assert_eq!(config.remote_output_gain, 0.5);
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.media, MediaConstraints::default());
    }

    #[test]
    fn turn_without_credentials_is_rejected() {
        let json = r#"{
            "ice_servers": [
                { "id": "t", "type": "turn", "url": "relay.example.org:3478",
                  "username": "alice", "credential": null }
            ]
        }"#;
        let err = CallConfig::from_json(json).unwrap_err();
        assert!(matches!(err, CallError::Config(msg) if msg.contains("TURN")));
    }

    #[test]
    fn gain_out_of_range_is_rejected() {
        let config = CallConfig {
            remote_output_gain: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
