//! Command service example
//!
//! Run with an optional YAML config path:
//! `cargo run --example command_service -- conductor.yaml`

use conductor::agents::{EchoAgent, MathAgent};
use conductor::prelude::*;
use conductor::telemetry::init_tracing;
use conductor::ConductorConfig;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn document_agent() -> AgentDescriptor {
    AgentDescriptor::new(
        "document_agent",
        "document",
        Arc::new(FnAgent::new(|command: Command| async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            Ok(json!({ "text": format!("Extracted 3 pages for '{}'", command.text()) }))
        })),
    )
    .with_intents(["pdf", "document", "extract"])
}

fn image_agent() -> AgentDescriptor {
    AgentDescriptor::new(
        "image_agent",
        "image",
        Arc::new(FnAgent::new(|_command: Command| async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(json!({ "text": "OCR found a signature block" }))
        })),
    )
    .with_intents(["image", "scan", "scanned", "ocr"])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = ConductorConfig::load(path.as_deref())?;
    if config.classifier.fallback_agent.is_none() {
        config.classifier = config.classifier.with_fallback("general_agent");
    }
    init_tracing(&config.telemetry)?;

    println!("=== Conductor Command Service Example ===\n");

    let context = ConductorContext::from_config(config).await?;
    context.register_all([
        MathAgent::descriptor(),
        EchoAgent::descriptor(),
        document_agent(),
        image_agent(),
    ])?;
    println!("✓ Registered {} agents", context.registry.len());

    let service = CommandService::new(context);

    for command in [
        "calculate (12 + 8) * 3",
        "What is 15% of 200?",
        "extract and analyze the pdf and the scanned image",
        "tell me something nice",
        "",
    ] {
        let response = service.handle_text(command).await;
        println!("\n> {:?} [{}]", command, response.http_status());
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    println!("\n=== History: math_agent ===");
    for outcome in service.history(&AgentId::new("math_agent"), 5).await? {
        println!("{} {} {}", outcome.timestamp, outcome.command, outcome.result);
    }

    println!("\n=== Stats ===");
    for stats in service.stats().await? {
        println!("{}: {} commands, last used {}", stats.agent_id, stats.total_commands, stats.last_used);
    }

    Ok(())
}
