//! `nopass` CLI: drives the No Pass identity bridge from a terminal.
//!
//! Talks to a running `nopass-server` over HTTP, presenting the primary
//! session token the way a browser would.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod http;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clap::{Parser, Subcommand};
use serde_json::Value;

use nopass_core::bridge::{self, BridgeOutcome, ClientBridge, PrimarySession};
use nopass_core::SecondaryApp;

use crate::http::{Client, HttpBridgeApi, HttpSecondaryAuth};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// No Pass: bridge a Clerk session into Firebase.
#[derive(Parser)]
#[command(
    name = "nopass",
    version,
    about = "No Pass CLI: run the identity bridge and call the bridge routes",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         NOPASS_SERVER    Server address (default: http://127.0.0.1:3000)\n  \
         NOPASS_SESSION   Primary-provider session token\n\n\
         {DIM}Examples:{RESET}\n  \
         nopass health\n  \
         nopass --session $CLERK_SESSION bridge\n  \
         nopass --session $CLERK_SESSION token"
    ),
)]
struct Cli {
    /// No Pass server address.
    #[arg(long, env = "NOPASS_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Primary-provider session token, sent as the `__session` cookie.
    #[arg(long, env = "NOPASS_SESSION")]
    session: Option<String>,

    /// Log every bridge step to stderr.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full bridge once: mint, sign in, refresh, sync claims.
    Bridge,
    /// Request a custom token for the session's subject.
    Token,
    /// Write the subject claim onto the secondary user record.
    Claims,
    /// Check that the server is up.
    Health,
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

/// Subject of a session token, read without verification. Used only to
/// decide whether a user is signed in; the server does the real check.
fn session_subject(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims
        .get("sub")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = Client::new(&cli.server, cli.session.clone());
    match cli.command {
        Commands::Bridge => cmd_bridge(client, cli.session.as_deref()).await,
        Commands::Token => {
            let resp = client.post_with_session("/api/firebase-token").await?;
            print_json(&resp);
            Ok(())
        }
        Commands::Claims => {
            let resp = client.post_with_session("/api/setFirebaseCustomClaims").await?;
            print_json(&resp);
            Ok(())
        }
        Commands::Health => {
            let resp = client.get("/health").await?;
            header("⟐", "No Pass server");
            kv_line("address", client.addr());
            kv_line(
                "status",
                resp.get("status").and_then(Value::as_str).unwrap_or("unknown"),
            );
            Ok(())
        }
    }
}

async fn cmd_bridge(client: Client, session: Option<&str>) -> Result<()> {
    let primary = match session {
        Some(token) => match session_subject(token) {
            Some(subject) => PrimarySession::signed_in(subject),
            None => bail!("session token is not a readable JWT"),
        },
        None => PrimarySession::signed_out(),
    };

    let app = SecondaryApp::new("nopass");
    let auth = app.get_or_init(|| HttpSecondaryAuth::new(client.addr()));
    let logger = bridge::spawn_auth_state_logger(auth.as_ref());

    let bridge = ClientBridge::new(Arc::new(HttpBridgeApi::new(client)), auth);
    let outcome = bridge.run(&primary).await;

    // The logger ends once the last handle to the client is gone.
    drop(bridge);
    drop(app);
    logger.await.ok();

    header("⟐", "Identity bridge");
    match outcome {
        BridgeOutcome::Succeeded { uid, claims_synced } => {
            kv_line("secondary uid", &uid);
            kv_line("claims synced", if claims_synced { "yes" } else { "no" });
            if !claims_synced {
                warning("claims endpoint did not acknowledge the write");
            }
            success("bridge complete");
            Ok(())
        }
        BridgeOutcome::Pending => {
            bail!("no primary session; set NOPASS_SESSION or pass --session")
        }
        BridgeOutcome::Failed { stage, reason } => {
            kv_line("failed at", &format!("{stage:?}"));
            bail!("{reason}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_subject_from_session_payload() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"user_123","exp":1}"#);
        let token = format!("eyJhbGciOiJSUzI1NiJ9.{payload}.sig");
        assert_eq!(session_subject(&token).as_deref(), Some("user_123"));
    }

    #[test]
    fn unreadable_sessions_have_no_subject() {
        assert_eq!(session_subject("opaque"), None);
        assert_eq!(session_subject("a.%%%.c"), None);
        let empty = URL_SAFE_NO_PAD.encode(br#"{"sub":""}"#);
        assert_eq!(session_subject(&format!("a.{empty}.c")), None);
    }
}
