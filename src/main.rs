mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use bosh_client::{Error, Options, ReqwestTransport, Session, SessionConfig, TracingDiagnostics};
use serde::Serialize;

use logging::Verbosity;

/// What a successful run prints on stdout, as JSON.
#[derive(Serialize)]
struct ConnectSummary<'a> {
    jid: &'a str,
    sid: Option<&'a str>,
    rid: u64,
    wait: Option<&'a str>,
    hold: Option<&'a str>,
    polling: Option<&'a str>,
    inactivity: Option<&'a str>,
    requests: Option<&'a str>,
}

fn print_help() {
    eprintln!("bosh-connect v{} (build {})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    eprintln!();
    eprintln!("Open a BOSH session, authenticate with SASL PLAIN and bind a resource.");
    eprintln!();
    eprintln!("Usage: bosh-connect [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("      --config=FILE     JSON file with jid, password, endpoint and options");
    eprintln!("      --jid=JID         Bare identity (user@host)");
    eprintln!("      --password=PASS   Password (prefer BOSH_PASSWORD)");
    eprintln!("      --endpoint=URL    Connection manager URL (e.g. http://localhost:5280/http-bind)");
    eprintln!("      --wait=SECS       Proposed wait (default 60)");
    eprintln!("      --hold=N          Proposed hold (default 1)");
    eprintln!("      --rid=N           Initial request id (default random)");
    eprintln!("      --timeout=SECS    HTTP request timeout (default 75)");
    eprintln!("  -v, --verbose         Log handshake progress to stderr");
    eprintln!("      --verbose=wire    Also log raw request and response bodies");
    eprintln!("      --log-file=PATH   Also write logs to a daily-rotating file");
    eprintln!("  -h, --help            Show this help message");
    eprintln!();
    eprintln!("Environment variables:");
    eprintln!("  BOSH_PASSWORD         Password when --password is not given");
    eprintln!("  RUST_LOG              Override log filter (e.g. RUST_LOG=debug)");
}

/// Flags that take a value, always written `--name=value`.
const VALUE_FLAGS: &[&str] = &[
    "config", "jid", "password", "endpoint", "wait", "hold", "rid", "timeout", "log-file", "verbose",
];

/// Flags that stand alone.
const SWITCHES: &[&str] = &["-v", "--verbose", "-h", "--help"];

/// Reject anything not listed in `--help`, naming the offending argument.
fn check_args(args: &[String]) -> Result<(), Error> {
    for arg in args {
        if SWITCHES.contains(&arg.as_str()) {
            continue;
        }
        let Some(flag) = arg.strip_prefix("--") else {
            return Err(Error::Config(format!("unexpected argument '{}'", arg)));
        };
        match flag.split_once('=') {
            Some((name, _)) if VALUE_FLAGS.contains(&name) => {}
            None if VALUE_FLAGS.contains(&flag) => {
                return Err(Error::Config(format!("--{0} expects a value (--{0}=VALUE)", flag)));
            }
            _ => return Err(Error::Config(format!("unknown option '{}'", arg))),
        }
    }
    Ok(())
}

/// Value of `--name=value`, if present.
fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("--{}=", name);
    args.iter().find_map(|arg| arg.strip_prefix(prefix.as_str()))
}

fn parse_number<N: std::str::FromStr>(args: &[String], name: &str) -> Result<Option<N>, Error> {
    flag(args, name)
        .map(|v| {
            v.parse()
                .map_err(|_| Error::Config(format!("--{} expects a number, got '{}'", name, v)))
        })
        .transpose()
}

/// Build the session configuration from `--config` and individual flags;
/// flags override the file.
fn load_config(args: &[String]) -> Result<SessionConfig, Error> {
    let mut config = match flag(args, "config") {
        Some(path) => SessionConfig::from_file(&PathBuf::from(path))?,
        None => SessionConfig::new(String::new(), String::new(), String::new()),
    };

    if let Some(jid) = flag(args, "jid") {
        config.jid = jid.to_string();
    }
    if let Some(endpoint) = flag(args, "endpoint") {
        config.endpoint = endpoint.to_string();
    }
    if let Some(password) = flag(args, "password") {
        config.password = password.to_string();
    } else if let Ok(password) = std::env::var("BOSH_PASSWORD") {
        config.password = password;
    }

    let defaults = config.options.clone();
    config.options = Options {
        wait: parse_number(args, "wait")?.unwrap_or(defaults.wait),
        hold: parse_number(args, "hold")?.unwrap_or(defaults.hold),
        window: defaults.window,
        rid: parse_number(args, "rid")?.or(defaults.rid),
    };
    config.options.validate()?;

    if config.jid.is_empty() || config.endpoint.is_empty() {
        return Err(Error::Config("a jid and an endpoint are required".to_string()));
    }
    if !config.jid.contains('@') {
        return Err(Error::Config(format!("'{}' is not a bare JID (user@host)", config.jid)));
    }
    Ok(config)
}

fn run(args: &[String]) -> Result<(), Error> {
    check_args(args)?;
    let config = load_config(args)?;
    let timeout = parse_number::<u64>(args, "timeout")?
        .map(Duration::from_secs)
        .unwrap_or(bosh_client::transport::DEFAULT_TIMEOUT);

    tracing::info!(jid = %config.jid, endpoint = %config.endpoint, "Connecting");

    let transport = ReqwestTransport::with_timeout(timeout).map_err(|e| Error::Transport(Box::new(e)))?;
    let mut session = Session::new(config, transport).with_diagnostics(TracingDiagnostics);
    session.connect()?;

    let summary = ConnectSummary {
        jid: session.jid(),
        sid: session.sid(),
        rid: session.rid(),
        wait: session.wait(),
        hold: session.hold(),
        polling: session.polling(),
        inactivity: session.inactivity(),
        requests: session.requests(),
    };
    let json = serde_json::to_string_pretty(&summary).map_err(|e| Error::Config(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    let verbose_level = args.iter().find_map(|arg| {
        if arg == "--verbose" || arg == "-v" {
            Some("default")
        } else {
            arg.strip_prefix("--verbose=")
        }
    });
    let log_file = flag(&args, "log-file").map(PathBuf::from);

    let _guard = logging::init(Verbosity::from_flag(verbose_level), log_file.as_deref());

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ Error::Config(_)) => {
            eprintln!("Error: {}", e);
            eprintln!("Try 'bosh-connect --help'.");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!(error = %e, "Handshake failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
