//! End-to-end handshake over a scripted transport, through the public API only.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bosh_client::{BoxError, Error, HttpResponse, HttpTransport, Options, Session, SessionConfig};
use pretty_assertions::assert_eq;

const ENDPOINT: &str = "http://localhost:5280/http-bind";

/// Scripted connection manager shared between the test and the session.
#[derive(Clone, Default)]
struct ScriptedServer {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    responses: VecDeque<(u16, String)>,
    received: Vec<String>,
}

impl ScriptedServer {
    fn reply(self, status: u16, body: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .responses
            .push_back((status, body.to_string()));
        self
    }

    fn received(&self) -> Vec<String> {
        self.inner.lock().unwrap().received.clone()
    }
}

impl HttpTransport for ScriptedServer {
    fn post(&self, endpoint: &str, body: &str) -> Result<HttpResponse, BoxError> {
        assert_eq!(endpoint, ENDPOINT);
        let mut script = self.inner.lock().unwrap();
        script.received.push(body.to_string());
        let (status, body) = script
            .responses
            .pop_front()
            .ok_or("connection manager has nothing more to say")?;
        Ok(HttpResponse::new(status, body))
    }
}

fn body(attrs: &str, inner: &str) -> String {
    format!(
        "<body xmlns='http://jabber.org/protocol/httpbind' xmlns:stream='http://etherx.jabber.org/streams' {}>{}</body>",
        attrs, inner
    )
}

fn config(rid: u64) -> SessionConfig {
    SessionConfig::new("me@server.tld", "secret", ENDPOINT).with_options(Options {
        rid: Some(rid),
        ..Options::default()
    })
}

fn plain_features() -> String {
    body(
        "",
        "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms></stream:features>",
    )
}

#[test]
fn test_establish_binds_resource() {
    let server = ScriptedServer::default()
        .reply(200, &body("sid='abc123' wait='30' hold='1' requests='2' polling='5' inactivity='60'", ""))
        .reply(200, &plain_features())
        .reply(200, &body("", "<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>"))
        .reply(
            200,
            &body(
                "sid='abc123' wait='30' hold='1'",
                "<stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/><session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></stream:features>",
            ),
        )
        .reply(
            200,
            &body(
                "",
                "<iq type='result' xmlns='jabber:client'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'><jid>me@server.tld/bosh_42</jid></bind></iq>",
            ),
        );

    let session = Session::establish(config(1000), server.clone()).unwrap();

    assert_eq!(session.jid(), "me@server.tld/bosh_42");
    assert_eq!(session.sid(), Some("abc123"));
    assert_eq!(session.wait(), Some("30"));
    // Restart response carried no polling/inactivity/requests
    assert_eq!(session.polling(), None);
    assert_eq!(session.requests(), None);
    assert_eq!(session.rid(), 1004);

    let received = server.received();
    assert_eq!(received.len(), 5);
    assert!(received[0].contains("rid='1000'"));
    assert!(!received[0].contains("sid="));
    assert!(received[1].contains("rid='1000' sid='abc123'"));
    assert!(received[2].contains("rid='1001' sid='abc123'"));
    assert!(received[3].contains("rid='1002'"));
    assert!(received[3].contains("sid='abc123'"));
    assert!(received[3].contains("xmpp:restart='true'"));
    assert!(received[4].contains("rid='1003' sid='abc123'"));
}

#[test]
fn test_establish_without_bind_feature_keeps_bare_jid() {
    let server = ScriptedServer::default()
        .reply(200, &body("sid='s1'", ""))
        .reply(200, &plain_features())
        .reply(200, &body("", "<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>"))
        .reply(200, &body("sid='s1'", "<stream:features/>"));

    let session = Session::establish(config(1), server.clone()).unwrap();

    assert_eq!(session.jid(), "me@server.tld");
    assert_eq!(server.received().len(), 4);
}

#[test]
fn test_establish_rejected_credentials() {
    let server = ScriptedServer::default()
        .reply(200, &body("sid='s1'", ""))
        .reply(200, &plain_features())
        .reply(
            200,
            &body(
                "",
                "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>",
            ),
        );

    let err = Session::establish(config(1), server.clone()).err().unwrap();

    assert!(matches!(err, Error::Authentication { .. }));
    assert!(err.to_string().contains("not-authorized"));
    assert_eq!(server.received().len(), 3);
}

#[test]
fn test_non_success_status_still_parsed() {
    let server = ScriptedServer::default().reply(404, &body("sid='s1' wait='10'", ""));
    let mut session = Session::new(config(1), server);

    session.create_session().unwrap();

    assert_eq!(session.sid(), Some("s1"));
    assert_eq!(session.wait(), Some("10"));
}

#[test]
fn test_transport_failure_propagates() {
    let server = ScriptedServer::default();
    let err = Session::establish(config(1), server).err().unwrap();
    assert!(matches!(err, Error::Transport(_)));
    assert!(!err.is_protocol_error());
}
