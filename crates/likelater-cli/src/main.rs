//! Thin presentation client for the LikeLater daemon.
//!
//! Renders the daemon's published state and forwards deep links and
//! commands over the HTTP API.  No engine logic lives here.

use anyhow::{bail, Context};
use chrono::{DateTime, Local, Utc};
use likelater_core::model::{CaptureEvent, MatchStatus, QueueItem};
use serde::Deserialize;

const USAGE: &str = "usage: likelater <command>

commands:
  state            print the capture queue and connection status
  open <url>       forward a deep link (e.g. 'likelater://capture?source=cli')
  connect          start the Spotify authorization flow
  refresh          fetch recently played and reconcile pending captures

The daemon address defaults to 127.0.0.1:9787; override with LIKELATER_ADDR.";

#[derive(Deserialize)]
struct ApiState {
    items: Vec<QueueItem>,
    last_event: Option<CaptureEvent>,
    last_message: String,
    auth_phase: String,
    auth_status: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let addr = std::env::var("LIKELATER_ADDR").unwrap_or_else(|_| {
        format!("127.0.0.1:{}", likelater_core::platform::DAEMON_HTTP_PORT)
    });
    let base = format!("http://{}/api", addr);
    let client = reqwest::Client::new();

    match command {
        "state" => {
            let state: ApiState = client
                .get(format!("{}/state", base))
                .send()
                .await
                .with_context(|| format!("is the daemon running on {}?", addr))?
                .json()
                .await
                .context("unexpected state payload")?;
            render_state(&state);
        }
        "open" => {
            let Some(url) = args.get(1) else {
                bail!("open needs a URL argument\n{}", USAGE);
            };
            post(&client, &format!("{}/open", base), Some(url)).await?;
            println!("sent: {}", url);
        }
        "connect" => {
            post(&client, &format!("{}/connect", base), None).await?;
            println!("authorization started, check your browser");
        }
        "refresh" => {
            post(&client, &format!("{}/refresh", base), None).await?;
            println!("history refresh requested");
        }
        other => {
            eprintln!("unknown command: {}\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn post(client: &reqwest::Client, url: &str, link: Option<&str>) -> anyhow::Result<()> {
    let mut req = client.post(url);
    if let Some(link) = link {
        req = req.json(&serde_json::json!({ "url": link }));
    }
    let resp = req.send().await.context("daemon unreachable")?;
    if !resp.status().is_success() {
        bail!("daemon returned {}", resp.status());
    }
    Ok(())
}

fn render_state(state: &ApiState) {
    println!("status: {} ({})", state.last_message, state.auth_phase);
    println!("spotify: {}", state.auth_status);

    if let Some(event) = &state.last_event {
        println!("last link: {} at {}", event.raw_url, local(event.received_at));
    }

    if state.items.is_empty() {
        println!("\nqueue is empty");
        return;
    }

    println!("\n{} queued item(s):", state.items.len());
    for item in &state.items {
        println!("  {}", describe(item));
    }
}

fn describe(item: &QueueItem) -> String {
    let platform = item.platform_hint.as_deref().unwrap_or("unknown");
    let matched = match (item.match_status, item.matched_track.as_deref()) {
        (MatchStatus::Matched, Some(track)) => track.to_string(),
        (MatchStatus::Processing, _) => "checking now playing...".to_string(),
        _ => "not yet matched".to_string(),
    };
    let mut line = format!(
        "[{}] {} via {}: {}",
        local(item.captured_at),
        platform,
        item.source,
        matched
    );
    if let Some(note) = item.note.as_deref().filter(|n| !n.is_empty()) {
        line.push_str(&format!(" ({})", note));
    }
    line
}

fn local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
