// src/connection/mod.rs
// Parsing for `Endpoint=sb://...;SharedAccessKeyName=...;` descriptors.
use std::fmt;
use std::str::FromStr;
use url::Url;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConnectionStringError {
    #[error("Missing `{0}` in connection string")]
    MissingKey(&'static str),

    #[error("Malformed segment `{0}` in connection string")]
    MalformedSegment(String),

    #[error("Invalid endpoint `{0}`: {1}")]
    InvalidEndpoint(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    endpoint: Url,
    pub shared_access_key_name: String,
    pub shared_access_key: String,
    pub use_development_emulator: bool,
}

impl ConnectionString {
    pub fn parse(input: &str) -> Result<Self, ConnectionStringError> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut emulator = false;

        for segment in input.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            // Values may end in base64 `=` padding, so split once.
            let (k, v) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::MalformedSegment(segment.to_string()))?;

            match k.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(v.trim().to_string()),
                "sharedaccesskeyname" => key_name = Some(v.trim().to_string()),
                "sharedaccesskey" => key = Some(v.trim().to_string()),
                "usedevelopmentemulator" => emulator = v.trim().eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        let raw = endpoint.ok_or(ConnectionStringError::MissingKey("Endpoint"))?;
        let endpoint = Url::parse(&raw)
            .map_err(|e| ConnectionStringError::InvalidEndpoint(raw.clone(), e.to_string()))?;

        if endpoint.scheme() != "sb" {
            return Err(ConnectionStringError::InvalidEndpoint(
                raw,
                "expected the sb:// scheme".to_string(),
            ));
        }
        if endpoint.host_str().map_or(true, str::is_empty) {
            return Err(ConnectionStringError::InvalidEndpoint(
                raw,
                "missing host".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            shared_access_key_name: key_name
                .ok_or(ConnectionStringError::MissingKey("SharedAccessKeyName"))?,
            shared_access_key: key.ok_or(ConnectionStringError::MissingKey("SharedAccessKey"))?,
            use_development_emulator: emulator,
        })
    }

    pub fn host(&self) -> &str {
        self.endpoint.host_str().unwrap_or_default()
    }

    /// Explicit port of the endpoint, if any. `sb://` has no default port.
    pub fn port(&self) -> Option<u16> {
        self.endpoint.port()
    }

    fn authority(&self) -> String {
        match self.port() {
            Some(port) => format!("{}:{}", self.host(), port),
            None => self.host().to_string(),
        }
    }

    /// Base URL of the administrative REST API. Always `https://`; the
    /// emulator needs [`crate::transport::PlainHttpLayer`] on top of it.
    pub fn management_base_url(&self) -> Result<Url, ConnectionStringError> {
        let raw = format!("https://{}/", self.authority());
        Url::parse(&raw).map_err(|e| ConnectionStringError::InvalidEndpoint(raw, e.to_string()))
    }
}

impl FromStr for ConnectionString {
    type Err = ConnectionStringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Endpoint=sb://{};SharedAccessKeyName={};SharedAccessKey={};",
            self.authority(),
            self.shared_access_key_name,
            self.shared_access_key
        )?;
        if self.use_development_emulator {
            write!(f, "UseDevelopmentEmulator=true;")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;

    #[test]
    fn test_parse_admin_descriptor() {
        let config = EmulatorConfig::new("localhost", 5300);
        let conn = ConnectionString::parse(&config.admin_connection_string()).unwrap();

        assert_eq!(conn.host(), "localhost");
        assert_eq!(conn.port(), Some(5300));
        assert_eq!(conn.shared_access_key_name, "RootManageSharedAccessKey");
        assert_eq!(conn.shared_access_key, "SAS_KEY_VALUE");
        assert!(conn.use_development_emulator);
        assert_eq!(
            conn.management_base_url().unwrap().as_str(),
            "https://localhost:5300/"
        );
    }

    #[test]
    fn test_runtime_descriptor_has_no_port() {
        let config = EmulatorConfig::new("emulator", 5300);
        let conn: ConnectionString = config.connection_string().parse().unwrap();

        assert_eq!(conn.port(), None);
        assert_eq!(conn.management_base_url().unwrap().as_str(), "https://emulator/");
    }

    #[test]
    fn test_display_matches_config_rendering() {
        let config = EmulatorConfig::new("localhost", 5300);
        for raw in [config.connection_string(), config.admin_connection_string()] {
            assert_eq!(ConnectionString::parse(&raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_keys_are_case_insensitive_and_values_keep_padding() {
        let conn = ConnectionString::parse(
            "endpoint=sb://ns.example;sharedaccesskeyname=reader;sharedaccesskey=abc==",
        )
        .unwrap();

        assert_eq!(conn.shared_access_key, "abc==");
        assert!(!conn.use_development_emulator);
    }

    #[test]
    fn test_rejects_missing_or_bad_fields() {
        assert_eq!(
            ConnectionString::parse("SharedAccessKeyName=a;SharedAccessKey=b"),
            Err(ConnectionStringError::MissingKey("Endpoint"))
        );
        assert_eq!(
            ConnectionString::parse("Endpoint=sb://h;SharedAccessKey=b"),
            Err(ConnectionStringError::MissingKey("SharedAccessKeyName"))
        );
        assert!(matches!(
            ConnectionString::parse("Endpoint=https://h;SharedAccessKeyName=a;SharedAccessKey=b"),
            Err(ConnectionStringError::InvalidEndpoint(..))
        ));
        assert!(matches!(
            ConnectionString::parse("Endpoint"),
            Err(ConnectionStringError::MalformedSegment(_))
        ));
    }
}
