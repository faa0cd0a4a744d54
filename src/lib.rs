//! Blocking client for BOSH (XEP-0124 / XEP-0206): tunnels an XMPP stream
//! over successive HTTP request/response pairs, and performs the inline
//! SASL PLAIN login and resource binding on top of it.
//!
//! ```no_run
//! use bosh_client::{ReqwestTransport, Session, SessionConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = SessionConfig::new("me@server.tld", "secret", "http://localhost:5280/http-bind");
//! let session = Session::establish(config, ReqwestTransport::new()?)?;
//! println!("bound as {} (sid {:?}, next rid {})", session.jid(), session.sid(), session.rid());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod session;
pub mod stanza;
pub mod transport;
pub mod xml;

pub use config::{Options, SessionConfig};
pub use diagnostics::{Diagnostics, TracingDiagnostics};
pub use error::Error;
pub use session::Session;
pub use transport::{BoxError, HttpResponse, HttpTransport, ReqwestTransport};
pub use xml::Element;
