//! Search command: similarity search over stored decisions

use anyhow::{Context, Result};
use std::fmt::Write as _;

use super::CommandContext;
use crate::infrastructure::{SearchHit, SearchMethod};

const EXCERPT_CHARS: usize = 280;

pub async fn search_decisions(ctx: &CommandContext, query: &str, method: SearchMethod) -> Result<Vec<SearchHit>> {
    let client = ctx.api_client()?;
    let hits = client.search(query, method).await.context("Search failed")?;
    tracing::info!("Search for {} characters returned {} hits", query.len(), hits.len());
    Ok(hits)
}

/// Numbered, human-readable listing of search hits
#[must_use]
pub fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No matching decisions found.".to_string();
    }

    let mut out = String::new();
    for (index, hit) in hits.iter().enumerate() {
        let score = hit
            .similarity_score
            .map_or_else(|| "n/a".to_string(), |s| format!("{s:.3}"));
        let _ = write!(out, "{}. score {}", index + 1, score);
        if let Some(id) = hit.metadata_field("decision_id") {
            let _ = write!(out, "  decision {id}");
        }
        out.push('\n');
        let _ = writeln!(out, "   {}", excerpt(&hit.text));
    }
    out
}

fn excerpt(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    cut.push('…');
    cut
}
