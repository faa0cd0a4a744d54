//! Error types for the BOSH session client.

use thiserror::Error;

use crate::transport::BoxError;
use crate::xml::XmlError;

/// Everything that can abort a protocol step.
///
/// Transport and XML failures are carried untranslated; the remaining
/// variants describe responses the handshake cannot continue from.
#[derive(Debug, Error)]
pub enum Error {
    /// The server offered no SASL mechanism this client implements.
    #[error("{}", describe_unsupported(.advertised))]
    AuthenticationNotSupported { advertised: Vec<String> },

    /// Credentials were rejected. `condition` is the server's reason element
    /// (`not-authorized`, `account-disabled`, ...).
    #[error("authentication failed: {condition}")]
    Authentication { condition: String },

    /// The response did not have any expected shape.
    #[error("unexpected response: {response}")]
    Protocol { response: String },

    /// An envelope came back without the stanza it should enclose.
    #[error("response envelope carries no stanza")]
    EmptyEnvelope,

    #[error("response lacks {path}")]
    MissingElement { path: &'static str },

    /// The request id cannot advance any further.
    #[error("request id {rid} cannot be incremented")]
    RidExhausted { rid: u64 },

    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),

    #[error("invalid response document: {0}")]
    Xml(#[from] XmlError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

fn describe_unsupported(advertised: &[String]) -> String {
    if advertised.is_empty() {
        "no authentication mechanism advertised".to_string()
    } else {
        format!("advertised mechanisms not supported: {}", advertised.join(", "))
    }
}

impl Error {
    /// True for errors caused by the server's protocol-level answers, as
    /// opposed to I/O, parsing or local configuration.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationNotSupported { .. }
                | Error::Authentication { .. }
                | Error::Protocol { .. }
                | Error::EmptyEnvelope
                | Error::MissingElement { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_supported_messages_distinguish_empty() {
        let empty = Error::AuthenticationNotSupported { advertised: vec![] };
        assert_eq!(empty.to_string(), "no authentication mechanism advertised");

        let some = Error::AuthenticationNotSupported {
            advertised: vec!["SCRAM-SHA-1".into(), "X-OAUTH2".into()],
        };
        assert_eq!(
            some.to_string(),
            "advertised mechanisms not supported: SCRAM-SHA-1, X-OAUTH2"
        );
    }

    #[test]
    fn test_authentication_message_carries_condition() {
        let err = Error::Authentication {
            condition: "not-authorized".into(),
        };
        assert!(err.to_string().contains("not-authorized"));
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_transport_is_not_protocol_error() {
        let err = Error::Transport("connection refused".into());
        assert!(!err.is_protocol_error());
        assert!(std::error::Error::source(&err).is_some());
    }
}
