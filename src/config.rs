use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

/// Server settings. Passed explicitly to [`crate::serve`], never global.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Directory resources are served from.
    pub root: PathBuf,
    /// Resource behind the full-stream endpoint.
    pub stream_file: String,
    /// Resource behind the range endpoint.
    pub range_file: String,
    /// Resource behind the base64 endpoint.
    pub base64_file: String,
    /// Filename advertised to clients.
    pub file_name: String,
    pub content_type: String,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "0.0.0.0".to_string(),
            port: 4000,
            root: PathBuf::from("files"),
            stream_file: "19mb.pdf".to_string(),
            range_file: "19mb_2.pdf".to_string(),
            base64_file: "19mb.pdf".to_string(),
            file_name: "sample.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads `range-serve.toml` if present, then `RANGE_SERVE_*` variables,
    /// then `PORT`.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(config::File::with_name("range-serve").required(false))
    }

    pub fn load_from<S>(file: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("RANGE_SERVE"))
            .set_override_option("port", std::env::var("PORT").ok())?
            .build()?;

        settings.try_deserialize()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("Invalid address: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(4000, config.port);
        assert_eq!("sample.pdf", config.file_name);
        assert_eq!("0.0.0.0:4000".parse::<SocketAddr>().unwrap(), config.socket_addr().unwrap());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let toml = r#"
            host = "127.0.0.1"
            root = "/srv/docs"
            range_file = "manual.pdf"
        "#;
        let config = Config::load_from(config::File::from_str(toml, FileFormat::Toml)).unwrap();

        assert_eq!("127.0.0.1", config.host);
        assert_eq!(PathBuf::from("/srv/docs"), config.root);
        assert_eq!("manual.pdf", config.range_file);
        assert_eq!("19mb.pdf", config.stream_file);
    }

    #[test]
    fn test_environment_overrides_defaults() {
        // base64_file and port are not asserted by any other test that loads config
        std::env::set_var("PORT", "8123");
        std::env::set_var("RANGE_SERVE_BASE64_FILE", "embedded.pdf");

        let config = Config::load_from(config::File::from_str("", FileFormat::Toml));

        std::env::remove_var("PORT");
        std::env::remove_var("RANGE_SERVE_BASE64_FILE");

        let config = config.unwrap();
        assert_eq!(8123, config.port);
        assert_eq!("embedded.pdf", config.base64_file);
        assert_eq!("19mb_2.pdf", config.range_file);
    }

    #[test]
    fn test_bad_address() {
        let config = Config { host: "not an address".to_string(), ..Config::default() };
        assert!(config.socket_addr().is_err());
    }
}
