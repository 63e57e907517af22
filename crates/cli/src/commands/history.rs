//! `canopy history` — Print an owner's stored conversation.

use canopy_config::AppConfig;
use canopy_core::message::ConversationTurn;

use super::runtime;

pub async fn run(owner: &str, limit: usize, offset: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let backends = runtime::open_backends(&config).await?;
    let chat = runtime::build_orchestrator(&config, &backends).await;

    let page = chat.history(owner, limit, offset).await?;
    if page.turns.is_empty() {
        println!("  No conversation stored for '{owner}'.");
        return Ok(());
    }

    for turn in &page.turns {
        println!("{}", format_turn(turn));
    }
    println!();
    println!(
        "  Showing {}–{} of {}{}",
        offset + 1,
        offset + page.turns.len(),
        page.total_count,
        if page.has_more { " (use --offset for more)" } else { "" }
    );
    Ok(())
}

fn format_turn(turn: &ConversationTurn) -> String {
    let intent = turn
        .tags
        .get("intent")
        .and_then(|v| v.as_str())
        .map(|i| format!(" [{i}]"))
        .unwrap_or_default();
    format!(
        "  {} {:>9}{intent} > {}",
        turn.created_at.format("%Y-%m-%d %H:%M"),
        turn.role.as_str(),
        turn.content
    )
}
