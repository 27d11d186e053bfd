use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pastelite", about = "Self-destructing text sharing", version)]
struct Cli {
    /// Pastelite server URL (default: http://localhost:3000 or $PASTELITE_SERVER)
    #[arg(long, env = "PASTELITE_SERVER", default_value = "http://localhost:3000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: $PASTELITE_PORT or 3000)
        #[arg(long, env = "PASTELITE_PORT", default_value = "3000")]
        port: u16,
        /// Host to bind (default: $PASTELITE_HOST or 0.0.0.0)
        #[arg(long, env = "PASTELITE_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Create a paste from TEXT, `@path/to/file`, or `-` for stdin
    Create {
        #[arg(name = "CONTENT")]
        content: String,
        /// Lifetime e.g. 30s, 10m, 1h, 7d
        #[arg(long)]
        ttl: Option<String>,
        /// Maximum number of views before the paste self-destructs
        #[arg(long)]
        views: Option<u32>,
    },
    /// Fetch a paste and print its content (spends one view)
    Get {
        /// Paste id
        id: String,
    },
    /// Print the browser URL of a paste
    Url {
        /// Paste id
        id: String,
    },
    /// Delete expired and used-up pastes from the local data directory
    Prune,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PASTELITE_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,

        Commands::Create {
            content,
            ttl,
            views,
        } => cmd_create(&cli.server, &content, ttl.as_deref(), views).await,

        Commands::Get { id } => cmd_get(&cli.server, &id).await,

        Commands::Url { id } => {
            println!("{}/p/{}", cli.server.trim_end_matches('/'), id);
            Ok(())
        }

        Commands::Prune => cmd_prune(),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = pastelite_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };
    pastelite_server::run(cfg).await
}

#[derive(Deserialize)]
struct Created {
    id: String,
    url: String,
}

async fn cmd_create(
    server: &str,
    content: &str,
    ttl: Option<&str>,
    views: Option<u32>,
) -> Result<()> {
    let content = read_content(content)?;
    let ttl_seconds = ttl.map(parse_duration).transpose()?;

    let body = serde_json::json!({
        "content": content,
        "ttl_seconds": ttl_seconds,
        "max_views": views,
    });

    let resp = Client::new()
        .post(format!("{}/api/pastes", server.trim_end_matches('/')))
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let json: Value = resp.json().await.unwrap_or_default();
        anyhow::bail!("server returned {status}: {}", error_text(&json));
    }

    let created: Created = resp.json().await.context("parse response")?;
    println!("✓ created {}", created.id);
    println!("{}", created.url);
    Ok(())
}

#[derive(Deserialize)]
struct Fetched {
    content: String,
    remaining_views: Option<u32>,
    expires_at: Option<String>,
}

async fn cmd_get(server: &str, id: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{}/api/pastes/{}", server.trim_end_matches('/'), id))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        anyhow::bail!("paste {id} not found (it may have expired or run out of views)");
    }
    if !status.is_success() {
        let json: Value = resp.json().await.unwrap_or_default();
        anyhow::bail!("server returned {status}: {}", error_text(&json));
    }

    let paste: Fetched = resp.json().await.context("parse response")?;
    print!("{}", paste.content);
    if !paste.content.ends_with('\n') {
        println!();
    }
    eprintln!("{}", describe_limits(paste.remaining_views, paste.expires_at.as_deref()));
    Ok(())
}

fn cmd_prune() -> Result<()> {
    let cfg = pastelite_server::ServerConfig::default();
    let data_dir = pastelite_server::resolve_data_dir(cfg.data_dir.as_ref())?;
    let store = pastelite_server::store::Store::open(&pastelite_server::server::db_path(&data_dir))
        .context("open store (is the server running against the same data dir?)")?;
    let removed = store.prune(pastelite_server::clock::now_millis())?;
    println!("pruned {} paste(s)", removed.len());
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// `-` reads stdin, `@path` reads a file, anything else is taken literally.
fn read_content(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read stdin")?;
        return Ok(buf);
    }
    if let Some(path) = arg.strip_prefix('@') {
        return std::fs::read_to_string(path).with_context(|| format!("read file: {path}"));
    }
    Ok(arg.to_owned())
}

/// Parse human duration strings like "1h", "30m", "7d", "5s" into seconds.
fn parse_duration(s: &str) -> Result<u64> {
    let d: humantime::Duration = s
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    if d.as_secs() == 0 {
        anyhow::bail!("duration must be at least one second: {s}");
    }
    Ok(d.as_secs())
}

fn describe_limits(remaining_views: Option<u32>, expires_at: Option<&str>) -> String {
    let views = match remaining_views {
        Some(n) => format!("{n} view(s) left"),
        None => "unlimited views".to_string(),
    };
    let ttl = match expires_at.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()) {
        Some(exp) => {
            let secs_left = (exp.timestamp_millis() - chrono::Utc::now().timestamp_millis()) / 1000;
            if secs_left > 0 {
                format!("expires in {}", format_duration(secs_left as u64))
            } else {
                "expiring now".to_string()
            }
        }
        None => "no expiry".to_string(),
    };
    format!("{views}, {ttl}")
}

fn format_duration(secs: u64) -> String {
    if secs >= 86400 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

fn error_text(json: &Value) -> String {
    match &json["error"] {
        Value::String(s) => s.clone(),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}
