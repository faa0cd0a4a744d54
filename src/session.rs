//! The BOSH session client.
//!
//! Drives the handshake `create_session` → `authenticate` → `restart` →
//! `bind_resource`, funnelling every exchange through [`Session::send`].

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, RID_SEED_RANGE};
use crate::diagnostics::{Diagnostics, STARTUP_LINE};
use crate::error::Error;
use crate::stanza::{self, SessionAttributes, SessionRequest, PLAIN_MECHANISM};
use crate::transport::{HttpResponse, HttpTransport};
use crate::xml::{self, Element};

/// Upper bound (exclusive) for the random bind iq id and resource suffix.
const BIND_TOKEN_RANGE: u32 = 1000;

/// A client-side BOSH session.
///
/// The session is a single-owner state machine: every operation takes
/// `&mut self` and blocks on one HTTP round trip at a time. It is not meant to
/// be shared between threads; wrap it in your own lock if several call sites
/// must drive it, and never issue overlapping requests.
///
/// A failed operation leaves the session in whatever state the last
/// successful step produced. Discard it and build a new one.
pub struct Session<T> {
    jid: String,
    password: String,
    endpoint: String,
    /// Domain of the bare JID, fixed at construction.
    host: String,
    sid: Option<String>,
    rid: u64,
    wait: Option<String>,
    hold: Option<String>,
    window: u32,
    polling: Option<String>,
    inactivity: Option<String>,
    requests: Option<String>,
    transport: T,
    diagnostics: Option<Box<dyn Diagnostics>>,
}

impl<T: HttpTransport> Session<T> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        let SessionConfig {
            jid,
            password,
            endpoint,
            options,
        } = config;
        let host = jid.rsplit('@').next().unwrap_or_default().to_string();
        let rid = options
            .rid
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..RID_SEED_RANGE));

        Self {
            jid,
            password,
            endpoint,
            host,
            sid: None,
            rid,
            wait: Some(options.wait.to_string()),
            hold: Some(options.hold.to_string()),
            window: options.window,
            polling: None,
            inactivity: None,
            requests: None,
            transport,
            diagnostics: None,
        }
    }

    /// Build a session and run the full handshake.
    pub fn establish(config: SessionConfig, transport: T) -> Result<Self, Error> {
        let mut session = Self::new(config, transport);
        session.connect()?;
        Ok(session)
    }

    /// Install a diagnostics sink, replacing any previous one. The sink
    /// immediately receives [`STARTUP_LINE`].
    pub fn set_diagnostics(&mut self, sink: impl Diagnostics + 'static) {
        sink.log(STARTUP_LINE);
        self.diagnostics = Some(Box::new(sink));
    }

    pub fn with_diagnostics(mut self, sink: impl Diagnostics + 'static) -> Self {
        self.set_diagnostics(sink);
        self
    }

    /// Run the handshake: create a session, authenticate, and restart the
    /// stream (binding a resource if offered). Nothing is retried.
    pub fn connect(&mut self) -> Result<&mut Self, Error> {
        self.create_session()?;
        let authenticated = self.authenticate()?;
        if authenticated {
            self.restart()?;
        }
        info!(jid = %self.jid, sid = ?self.sid, rid = self.rid, "BOSH session ready");
        Ok(self)
    }

    /// Ask the connection manager for a session and adopt whatever tuning it
    /// answers with.
    pub fn create_session(&mut self) -> Result<(), Error> {
        let request = stanza::session_request(&SessionRequest {
            rid: self.rid,
            to: &self.host,
            wait: self.wait.as_deref(),
            hold: self.hold.as_deref(),
            window: self.window,
        });
        let response = self.send(request)?;
        self.adopt(SessionAttributes::from_body(&response));
        info!(sid = ?self.sid, wait = ?self.wait, hold = ?self.hold, "BOSH session created");
        Ok(())
    }

    /// SASL exchange. Only PLAIN is implemented; returns `Ok(true)` on
    /// `<success/>`, errors otherwise.
    pub fn authenticate(&mut self) -> Result<bool, Error> {
        let features = self.send(stanza::auth_advertisement())?;
        let advertised = stanza::mechanisms(&features);
        debug!(mechanisms = ?advertised, "Server SASL mechanisms");

        if !advertised.iter().any(|m| m == PLAIN_MECHANISM) {
            warn!(mechanisms = ?advertised, "No supported SASL mechanism");
            return Err(Error::AuthenticationNotSupported { advertised });
        }

        let credentials = stanza::plain_credentials(&self.jid, &self.password);
        let result = self.send(stanza::plain_auth(&credentials))?;
        match result.name() {
            "success" => {
                info!(jid = %self.jid, "Authenticated");
                Ok(true)
            }
            "failure" => {
                let condition = result
                    .first_child()
                    .map(|c| c.name().to_string())
                    .unwrap_or_default();
                warn!(jid = %self.jid, condition = %condition, "Authentication rejected");
                Err(Error::Authentication { condition })
            }
            _ => Err(Error::Protocol {
                response: result.to_xml(),
            }),
        }
    }

    /// Restart the stream after authentication.
    ///
    /// The restart body is its own envelope: it is built with the current
    /// `sid` before the stored one is cleared, then posted bare. `rid` is
    /// bumped once afterwards.
    pub fn restart(&mut self) -> Result<(), Error> {
        self.next_rid()?;
        let previous_sid = self.sid.take();
        let request = stanza::restart(self.rid, previous_sid.as_deref(), &self.host);
        let response = self.send(request)?;
        self.adopt(SessionAttributes::from_body(&response));
        self.rid = self.next_rid()?;
        debug!(sid = ?self.sid, rid = self.rid, "Stream restarted");

        if stanza::offers_bind(&response) {
            self.bind_resource()?;
        }
        if stanza::offers_session(&response) {
            // Session establishment (RFC 3921 §3) is not performed; servers
            // have treated it as optional since RFC 6121.
            debug!("Server advertises session feature, skipping");
        }
        Ok(())
    }

    /// Bind a generated resource and adopt the full JID the server returns.
    pub fn bind_resource(&mut self) -> Result<bool, Error> {
        let mut rng = rand::thread_rng();
        let request = stanza::bind_request(
            rng.gen_range(0..BIND_TOKEN_RANGE),
            rng.gen_range(0..BIND_TOKEN_RANGE),
        );
        let response = self.send(request)?;
        let jid = stanza::bound_jid(&response).ok_or(Error::MissingElement {
            path: "bind/jid",
        })?;
        info!(jid = %jid, "Resource bound");
        self.jid = jid;
        Ok(true)
    }

    /// Exchange one stanza.
    ///
    /// Without a `sid` the stanza is posted bare and the response root is
    /// returned. With a `sid` it is wrapped in an envelope carrying the
    /// current `rid`, `rid` is incremented once the POST succeeds, and the
    /// first stanza inside the response envelope is returned.
    pub fn send(&mut self, payload: Element) -> Result<Element, Error> {
        let Some(sid) = self.sid.as_deref() else {
            let response = self.post(&payload.to_xml())?;
            return Ok(xml::parse(&response.body)?);
        };

        let next_rid = self.next_rid()?;
        let body = stanza::envelope(self.rid, sid).with_child(payload);
        let response = self.post(&body.to_xml())?;
        self.rid = next_rid;
        xml::parse(&response.body)?
            .into_first_child()
            .ok_or(Error::EmptyEnvelope)
    }

    fn post(&self, body: &str) -> Result<HttpResponse, Error> {
        self.diagnose(&format!("\nSENDING : \n{}", body));
        debug!(endpoint = %self.endpoint, rid = self.rid, bytes = body.len(), "POST");

        let response = self
            .transport
            .post(&self.endpoint, body)
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "BOSH request failed");
                Error::Transport(e)
            })?;

        self.diagnose(&format!(
            "\nRECEIVED ({}): \n{}",
            response.status, response.body
        ));
        if !response.is_success() {
            warn!(status = response.status, "Connection manager answered with non-success status");
        }
        Ok(response)
    }

    fn next_rid(&self) -> Result<u64, Error> {
        self.rid
            .checked_add(1)
            .ok_or(Error::RidExhausted { rid: self.rid })
    }

    fn diagnose(&self, message: &str) {
        if let Some(sink) = &self.diagnostics {
            sink.log(message);
        }
    }

    /// Copy server-dictated attributes verbatim, absent ones included.
    fn adopt(&mut self, attrs: SessionAttributes) {
        self.sid = attrs.sid;
        self.wait = attrs.wait;
        self.polling = attrs.polling;
        self.inactivity = attrs.inactivity;
        self.requests = attrs.requests;
        self.hold = attrs.hold;
    }
}

impl<T> Session<T> {
    /// Current identity: the bare JID until a resource is bound.
    pub fn jid(&self) -> &str {
        &self.jid
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    /// Adopt a session id established elsewhere; subsequent sends are wrapped.
    pub fn set_sid(&mut self, sid: impl Into<String>) {
        self.sid = Some(sid.into());
    }

    /// The `rid` the next enveloped request will carry.
    pub fn rid(&self) -> u64 {
        self.rid
    }

    pub fn is_established(&self) -> bool {
        self.sid.is_some()
    }

    pub fn wait(&self) -> Option<&str> {
        self.wait.as_deref()
    }

    pub fn hold(&self) -> Option<&str> {
        self.hold.as_deref()
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn polling(&self) -> Option<&str> {
        self.polling.as_deref()
    }

    pub fn inactivity(&self) -> Option<&str> {
        self.inactivity.as_deref()
    }

    pub fn requests(&self) -> Option<&str> {
        self.requests.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
