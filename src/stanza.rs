//! Builders and readers for the stanzas exchanged during the BOSH handshake.
//!
//! Every outbound element is built fresh from the session's current values;
//! nothing here holds state.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::xml::Element;

pub const HTTPBIND_NS: &str = "http://jabber.org/protocol/httpbind";
pub const XBOSH_NS: &str = "urn:xmpp:xbosh";
pub const STREAM_NS: &str = "http://etherx.jabber.org/streams";
pub const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
pub const BIND_NS: &str = "urn:ietf:params:xml:ns:xmpp-bind";
pub const SESSION_NS: &str = "urn:ietf:params:xml:ns:xmpp-session";
pub const CLIENT_NS: &str = "jabber:client";

/// `xmpp:version` advertised in the session request.
pub const XBOSH_VERSION: &str = "1.0";

/// The only SASL mechanism this client can complete.
pub const PLAIN_MECHANISM: &str = "PLAIN";

/// Placeholder mechanism in the first `<auth/>`; the server's advertised list
/// decides what happens next.
const ADVERTISEMENT_MECHANISM: &str = "DIGEST-MD5";

/// Values the client proposes when requesting a session.
#[derive(Debug, Clone)]
pub struct SessionRequest<'a> {
    pub rid: u64,
    pub to: &'a str,
    pub wait: Option<&'a str>,
    pub hold: Option<&'a str>,
    pub window: u32,
}

/// `<body/>` asking the connection manager for a new session (XEP-0124 §7.1).
pub fn session_request(request: &SessionRequest<'_>) -> Element {
    let mut body = Element::new("body").with_attr("content", "text/xml; charset=utf-8");
    if let Some(wait) = request.wait {
        body.set_attr("wait", wait);
    }
    if let Some(hold) = request.hold {
        body.set_attr("hold", hold);
    }
    body.with_attr("rid", request.rid)
        .with_attr("to", request.to)
        .with_attr("window", request.window)
        .with_attr("xmlns:xmpp", XBOSH_NS)
        .with_attr("xmpp:version", XBOSH_VERSION)
        .with_ns(HTTPBIND_NS)
}

/// Empty `<body/>` wrapper carrying the session identifiers.
pub fn envelope(rid: u64, sid: &str) -> Element {
    Element::new("body")
        .with_attr("rid", rid)
        .with_attr("sid", sid)
        .with_ns(HTTPBIND_NS)
}

/// Stream restart request (XEP-0206 §5). The restart body is itself the
/// envelope, so it carries `sid` directly.
pub fn restart(rid: u64, sid: Option<&str>, to: &str) -> Element {
    let mut body = Element::new("body").with_attr("rid", rid);
    if let Some(sid) = sid {
        body.set_attr("sid", sid);
    }
    body.with_attr("to", to)
        .with_attr("xml:lang", "en")
        .with_attr("xmpp:restart", "true")
        .with_ns(HTTPBIND_NS)
        .with_attr("xmlns:xmpp", XBOSH_NS)
}

/// First `<auth/>`, answered by the server with its mechanism list.
pub fn auth_advertisement() -> Element {
    Element::new("auth")
        .with_ns(SASL_NS)
        .with_attr("mechanism", ADVERTISEMENT_MECHANISM)
}

/// SASL PLAIN initial response: `base64(authzid NUL authcid NUL password)`,
/// with the bare JID as authzid and its localpart as authcid.
pub fn plain_credentials(jid: &str, password: &str) -> String {
    let localpart = jid.split('@').next().unwrap_or_default();
    STANDARD.encode(format!("{jid}\0{localpart}\0{password}"))
}

pub fn plain_auth(credentials: &str) -> Element {
    Element::new("auth")
        .with_attr("mechanism", PLAIN_MECHANISM)
        .with_ns(SASL_NS)
        .with_text(credentials)
}

/// Resource binding request (RFC 6120 §7).
pub fn bind_request(iq_id: u32, resource: u32) -> Element {
    let bind = Element::new("bind")
        .with_ns(BIND_NS)
        .with_child(Element::new("resource").with_text(format!("bosh_{resource}")));
    Element::new("iq")
        .with_attr("id", format!("bind_{iq_id}"))
        .with_attr("type", "set")
        .with_ns(CLIENT_NS)
        .with_child(bind)
}

/// Mechanism names advertised under `./sasl:mechanisms/sasl:mechanism`.
pub fn mechanisms(features: &Element) -> Vec<String> {
    features
        .find_all(&[(SASL_NS, "mechanisms"), (SASL_NS, "mechanism")])
        .into_iter()
        .map(Element::text)
        .collect()
}

/// Text of `./bind:bind/bind:jid` in a bind result.
pub fn bound_jid(iq: &Element) -> Option<String> {
    iq.find(&[(BIND_NS, "bind"), (BIND_NS, "jid")])
        .map(Element::text)
}

pub fn offers_bind(body: &Element) -> bool {
    body.find(&[(STREAM_NS, "features"), (BIND_NS, "bind")])
        .is_some()
}

pub fn offers_session(body: &Element) -> bool {
    body.find(&[(STREAM_NS, "features"), (SESSION_NS, "session")])
        .is_some()
}

/// Server-dictated tuning attributes of a session creation or restart
/// response. Missing attributes stay `None`: they are copied as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionAttributes {
    pub sid: Option<String>,
    pub wait: Option<String>,
    pub polling: Option<String>,
    pub inactivity: Option<String>,
    pub requests: Option<String>,
    pub hold: Option<String>,
}

impl SessionAttributes {
    pub fn from_body(body: &Element) -> Self {
        let attr = |key: &str| body.attr(key).map(str::to_string);
        Self {
            sid: attr("sid"),
            wait: attr("wait"),
            polling: attr("polling"),
            inactivity: attr("inactivity"),
            requests: attr("requests"),
            hold: attr("hold"),
        }
    }
}
