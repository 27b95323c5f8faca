//! Command Bot Demo
//!
//! Answers a `/deploy` slash command, reacts to an approval button and logs
//! app mentions.
//!
//! # Usage
//!
//! ```bash
//! SLUICE_RECEIVER__SIGNING_SECRET=... \
//! SLUICE_AUTH__BOT_TOKEN=xoxb-... \
//! cargo run --package command-bot
//! ```
//!
//! Point the app's request URL at `http://<host>:3000/slack/events`.

use std::time::Instant;

use anyhow::Result;
use serde_json::json;
use sluice::prelude::*;
use tracing::{info, warn};

// ============================================================================
// Middleware
// ============================================================================

/// Logs every delivery with its category and handling time.
async fn timing(args: MiddlewareArgs, next: Next) -> MiddlewareResult {
    let category = args.payload().category();
    let started = Instant::now();
    let result = next.run().await;
    info!(?category, elapsed = ?started.elapsed(), ok = result.is_ok(), "Delivery handled");
    result
}

// ============================================================================
// Listeners
// ============================================================================

/// `/deploy <env>` replies with a button asking for approval.
async fn deploy(args: MiddlewareArgs) -> MiddlewareResult {
    let target = args.body()["text"].as_str().unwrap_or("").trim().to_string();
    let ack = args.ack().ok_or("missing ack")?;

    if target.is_empty() {
        ack.ack("Usage: /deploy <environment>")?;
        return Ok(());
    }

    ack.ack(json!({
        "response_type": "in_channel",
        "blocks": [
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("Deploy to *{target}*?") }
            },
            {
                "type": "actions",
                "elements": [{
                    "type": "button",
                    "action_id": "approve_deploy",
                    "value": target,
                    "text": { "type": "plain_text", "text": "Approve" }
                }]
            }
        ]
    }))?;
    Ok(())
}

/// The approval button: acknowledged empty, the outcome goes to the log.
async fn approve(args: MiddlewareArgs) -> MiddlewareResult {
    args.ack().ok_or("missing ack")?.ack(())?;

    let user = args.body()["user"]["id"].as_str().unwrap_or("someone");
    match args.context().bot_token() {
        Some(_) => info!(user, "Deploy approved"),
        None => warn!(user, "Deploy approved, but no bot token is configured to post it"),
    }
    Ok(())
}

/// Events are acknowledged before listeners run.
async fn mention(args: MiddlewareArgs) -> MiddlewareResult {
    let text = args.payload().payload()["text"].as_str().unwrap_or_default();
    info!(team = ?args.context().team_id(), text, "Mentioned");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let app = SluiceApp::builder()
        .middleware(middleware_fn(timing))
        .listener(on_command("/deploy").name("deploy").handler(deploy))
        .listener(on_action("approve_deploy").name("approve").handler(approve))
        .listener(on_event("app_mention").name("mention").handler(mention))
        .build()?;

    app.run().await?;
    Ok(())
}
