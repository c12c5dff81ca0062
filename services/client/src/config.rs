use clap::Parser;
use tracing::Level;
use url::Url;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
    #[error("Unsupported server URL scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),
}

/// Command-line overrides for the environment configuration.
#[derive(Parser, Debug, Default)]
#[command(name = "chatvox", about = "Terminal chat/voice client")]
pub struct Cli {
    /// Base URL of the chat server, e.g. http://127.0.0.1:8000
    #[arg(long)]
    pub server_url: Option<Url>,
    /// Name of the microphone to record from (default input device if unset).
    #[arg(long)]
    pub input_device: Option<String>,
    /// Name of the speaker to play replies on (default output device if unset).
    #[arg(long)]
    pub output_device: Option<String>,
    /// List available audio devices and exit.
    #[arg(long)]
    pub list_devices: bool,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_url: Url,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub log_level: Level,
    /// Initial chat option values, adjustable at runtime via `/config`.
    pub provider: String,
    pub model: Option<String>,
    pub asr: String,
    pub tts: String,
    pub kb: bool,
    pub kb_topk: u32,
}

impl Config {
    /// Loads configuration from environment variables, applying CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let server_url = match &cli.server_url {
            Some(url) => url.clone(),
            None => {
                let raw = std::env::var("SERVER_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
                raw.parse::<Url>()
                    .map_err(|e| ConfigError::InvalidValue("SERVER_URL".to_string(), e.to_string()))?
            }
        };
        match server_url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }

        let input_device = cli
            .input_device
            .clone()
            .or_else(|| std::env::var("INPUT_DEVICE").ok());
        let output_device = cli
            .output_device
            .clone()
            .or_else(|| std::env::var("OUTPUT_DEVICE").ok());

        let provider = std::env::var("DEFAULT_PROVIDER").unwrap_or_else(|_| "aliyun".to_string());
        let model = std::env::var("DEFAULT_MODEL").ok().filter(|m| !m.is_empty());
        let asr = std::env::var("DEFAULT_ASR_BACKEND")
            .unwrap_or_else(|_| "faster_whisper".to_string());
        let tts = std::env::var("DEFAULT_TTS_BACKEND").unwrap_or_else(|_| "pyttsx3".to_string());

        let kb = std::env::var("KB_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        let kb_topk = match std::env::var("KB_TOP_K") {
            Ok(raw) => raw.parse::<u32>().map_err(|_| {
                ConfigError::InvalidValue(
                    "KB_TOP_K".to_string(),
                    format!("'{raw}' is not a number"),
                )
            })?,
            Err(_) => 4,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{log_level_str}' is not a valid log level"),
            )
        })?;

        Ok(Self {
            server_url,
            input_device,
            output_device,
            log_level,
            provider,
            model,
            asr,
            tts,
            kb,
            kb_topk,
        })
    }

    /// The realtime endpoint, derived from the server base URL.
    /// A secure page implies a secure socket: http becomes ws, https becomes wss.
    pub fn ws_url(&self) -> Url {
        let mut url = self.server_url.clone();
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        // Infallible for ws/wss on an http(s) base.
        let _ = url.set_scheme(scheme);
        url.set_path("/ws");
        url.set_query(None);
        url
    }

    /// The knowledge-base ingestion endpoint.
    pub fn ingest_url(&self) -> Url {
        let mut url = self.server_url.clone();
        url.set_path("/api/kb/ingest");
        url.set_query(None);
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("SERVER_URL");
            env::remove_var("INPUT_DEVICE");
            env::remove_var("OUTPUT_DEVICE");
            env::remove_var("DEFAULT_PROVIDER");
            env::remove_var("DEFAULT_MODEL");
            env::remove_var("DEFAULT_ASR_BACKEND");
            env::remove_var("DEFAULT_TTS_BACKEND");
            env::remove_var("KB_ENABLED");
            env::remove_var("KB_TOP_K");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    #[serial]
    fn defaults_when_nothing_is_set() {
        clear_env_vars();
        let config = Config::load(&Cli::default()).expect("Config should load");

        assert_eq!(config.server_url.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(config.provider, "aliyun");
        assert_eq!(config.model, None);
        assert_eq!(config.asr, "faster_whisper");
        assert_eq!(config.tts, "pyttsx3");
        assert!(!config.kb);
        assert_eq!(config.kb_topk, 4);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn env_values_are_respected() {
        clear_env_vars();
        unsafe {
            env::set_var("SERVER_URL", "https://chat.example.com");
            env::set_var("DEFAULT_PROVIDER", "openai");
            env::set_var("DEFAULT_MODEL", "gpt-4o-mini");
            env::set_var("KB_ENABLED", "true");
            env::set_var("KB_TOP_K", "9");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::load(&Cli::default()).expect("Config should load");
        assert_eq!(config.server_url.as_str(), "https://chat.example.com/");
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, Some("gpt-4o-mini".to_string()));
        assert!(config.kb);
        assert_eq!(config.kb_topk, 9);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn cli_overrides_win_over_env() {
        clear_env_vars();
        unsafe {
            env::set_var("SERVER_URL", "http://from-env:8000");
            env::set_var("INPUT_DEVICE", "Env Mic");
        }

        let cli = Cli {
            server_url: Some("http://from-cli:9000".parse().unwrap()),
            input_device: Some("Cli Mic".to_string()),
            ..Cli::default()
        };
        let config = Config::load(&cli).expect("Config should load");
        assert_eq!(config.server_url.as_str(), "http://from-cli:9000/");
        assert_eq!(config.input_device.as_deref(), Some("Cli Mic"));
    }

    #[test]
    #[serial]
    fn invalid_server_url_is_rejected() {
        clear_env_vars();
        unsafe {
            env::set_var("SERVER_URL", "not a url");
        }
        let err = Config::load(&Cli::default()).unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "SERVER_URL"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn non_http_scheme_is_rejected() {
        clear_env_vars();
        unsafe {
            env::set_var("SERVER_URL", "ftp://127.0.0.1");
        }
        let err = Config::load(&Cli::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme(s) if s == "ftp"));
    }

    #[test]
    #[serial]
    fn invalid_log_level_is_rejected() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }
        let err = Config::load(&Cli::default()).unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn derives_realtime_and_ingest_endpoints() {
        clear_env_vars();
        unsafe {
            env::set_var("SERVER_URL", "http://127.0.0.1:8000");
        }
        let config = Config::load(&Cli::default()).unwrap();
        assert_eq!(config.ws_url().as_str(), "ws://127.0.0.1:8000/ws");
        assert_eq!(
            config.ingest_url().as_str(),
            "http://127.0.0.1:8000/api/kb/ingest"
        );

        unsafe {
            env::set_var("SERVER_URL", "https://chat.example.com");
        }
        let config = Config::load(&Cli::default()).unwrap();
        assert_eq!(config.ws_url().as_str(), "wss://chat.example.com/ws");
    }
}
