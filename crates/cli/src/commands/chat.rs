//! `canopy chat` — Interactive or single-message conversation.

use std::io::Write;

use canopy_config::AppConfig;
use canopy_engine::{ChatOrchestrator, ChatStreamEvent};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::runtime;

pub async fn run(
    owner: String,
    grow: Option<String>,
    stream: bool,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail before wiring anything if the model cannot be reached
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export CANOPY_API_KEY=...");
        eprintln!("    export GROQ_API_KEY=gsk_...");
        eprintln!();
        eprintln!("  Or add `api_key` to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let backends = runtime::open_backends(&config).await?;
    let chat = runtime::build_orchestrator(&config, &backends).await;
    let grow = grow.as_deref();

    if let Some(msg) = message {
        // Single message mode
        ask(&chat, &owner, &msg, grow, stream).await?;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  🌱 Canopy — Interactive Mode");
    println!();
    println!("  Model:     {}", config.model);
    println!("  Owner:     {owner}");
    println!("  Storage:   {}", config.storage.backend);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        if let Err(e) = ask(&chat, &owner, line, grow, stream).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

async fn ask(
    chat: &ChatOrchestrator,
    owner: &str,
    message: &str,
    grow: Option<&str>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !stream {
        eprint!("  Thinking...");
        let reply = chat.process(owner, message, grow).await;
        eprint!("\r              \r");
        let reply = reply?;
        println!();
        for line in reply.content.lines() {
            println!("  Canopy > {line}");
        }
        if reply.metadata.is_emergency {
            println!();
            println!("  🚨 Emergency detected — an alert was recorded.");
        }
        return Ok(());
    }

    let mut events = chat.stream(owner, message, grow);
    print!("\n  Canopy > ");
    std::io::stdout().flush()?;
    while let Some(event) = events.next().await {
        match event {
            ChatStreamEvent::Chunk { content } => {
                print!("{content}");
                std::io::stdout().flush()?;
            }
            ChatStreamEvent::Done { metadata, .. } => {
                println!();
                if metadata.is_emergency {
                    println!();
                    println!("  🚨 Emergency detected — an alert was recorded.");
                }
            }
            ChatStreamEvent::Error { message } => {
                println!();
                return Err(message.into());
            }
        }
    }
    Ok(())
}
