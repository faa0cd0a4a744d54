//! Construction parameters for a [`Session`](crate::Session).

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_WAIT: u32 = 60;
pub const DEFAULT_HOLD: u32 = 1;
pub const DEFAULT_WINDOW: u32 = 10;

/// Upper bound (exclusive) of the randomly seeded initial `rid`.
pub const RID_SEED_RANGE: u64 = 1_000_000;

/// Largest `rid` XEP-0124 allows (2^53 - 1).
pub const MAX_RID: u64 = (1 << 53) - 1;

/// Client-proposed tuning. Every field may be omitted in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Longest time (seconds) the connection manager may hold a request.
    pub wait: u32,
    /// Requests the connection manager may keep waiting at once.
    pub hold: u32,
    pub window: u32,
    /// Initial request id. Random in `0..RID_SEED_RANGE` when unset.
    pub rid: Option<u64>,
}

impl Options {
    /// Reject an initial `rid` outside the range XEP-0124 permits.
    pub fn validate(&self) -> Result<(), Error> {
        match self.rid {
            Some(rid) if rid > MAX_RID => Err(Error::Config(format!(
                "rid {} exceeds the maximum of {}",
                rid, MAX_RID
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            wait: DEFAULT_WAIT,
            hold: DEFAULT_HOLD,
            window: DEFAULT_WINDOW,
            rid: None,
        }
    }
}

/// Who to log in as, and where.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Bare identity, `user@host`.
    pub jid: String,
    pub password: String,
    /// Connection manager URL, e.g. `http://localhost:5280/http-bind`.
    pub endpoint: String,
    #[serde(default)]
    pub options: Options,
}

impl SessionConfig {
    pub fn new(jid: impl Into<String>, password: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            jid: jid.into(),
            password: password.into(),
            endpoint: endpoint.into(),
            options: Options::default(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.options.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("jid", &self.jid)
            .field("password", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert_eq!(options.wait, 60);
        assert_eq!(options.hold, 1);
        assert_eq!(options.window, 10);
        assert_eq!(options.rid, None);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = SessionConfig::from_json(
            r#"{"jid": "me@server.tld", "password": "secret", "endpoint": "http://localhost:5280/http-bind"}"#,
        )
        .unwrap();
        assert_eq!(config.jid, "me@server.tld");
        assert_eq!(config.options, Options::default());
    }

    #[test]
    fn test_from_json_partial_options() {
        let config = SessionConfig::from_json(
            r#"{"jid": "a@b", "password": "p", "endpoint": "http://b/", "options": {"wait": 30, "rid": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.options.wait, 30);
        assert_eq!(config.options.hold, 1);
        assert_eq!(config.options.rid, Some(5));
    }

    #[test]
    fn test_from_json_missing_field_is_config_error() {
        let err = SessionConfig::from_json(r#"{"jid": "a@b"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rid_above_protocol_maximum_is_rejected() {
        let options = Options {
            rid: Some(MAX_RID + 1),
            ..Options::default()
        };
        assert!(matches!(options.validate(), Err(Error::Config(_))));

        let at_max = Options {
            rid: Some(MAX_RID),
            ..Options::default()
        };
        assert!(at_max.validate().is_ok());

        let json = format!(
            r#"{{"jid": "a@b", "password": "p", "endpoint": "http://b/", "options": {{"rid": {}}}}}"#,
            u64::MAX
        );
        assert!(matches!(SessionConfig::from_json(&json), Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SessionConfig::new("me@server.tld", "secret", "http://x/");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
