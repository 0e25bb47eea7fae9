//! Upload and watch commands: submit decision text, then follow per-item
//! processing on the push channel until the batch completes.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio_stream::{StreamExt, wrappers::WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::CommandContext;
use crate::application::{ProgressSession, SessionOutcome};
use crate::domain::{Batch, PushTransport, StatusEvent};
use crate::types::{ProgressSnapshot, SessionEndReason};

/// Where the decision text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadInput {
    Text(String),
    File(PathBuf),
    Stdin,
}

impl UploadInput {
    pub async fn read(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::File(path) => tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read decision text from {}", path.display())),
            Self::Stdin => {
                let mut text = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut text)
                    .await
                    .context("Failed to read decision text from stdin")?;
                Ok(text)
            }
        }
    }
}

/// Submit decision text and, when `watch` is set, track the returned batch
pub async fn upload_decisions(ctx: &CommandContext, input: UploadInput, watch: bool) -> Result<()> {
    let text = input.read().await?;
    let client = ctx.api_client()?;
    let receipt = client.submit_decisions(&text).await.context("Decision upload failed")?;

    if let Some(message) = &receipt.message {
        println!("{message}");
    }
    let Some(ids) = receipt.ids_array.clone() else {
        info!("Upload accepted without progress tracking");
        println!("Upload accepted; the server did not return items to track.");
        return Ok(());
    };

    println!("Submitted {} decision(s): {}", ids.len(), ids.join(", "));
    if !watch {
        return Ok(());
    }

    let batch = ctx.batch_for(ids, receipt.user_channel_id.as_deref())?;
    let outcome = track_batch(ctx, batch, ctx.transport()).await?;
    ensure_finished(&outcome)
}

/// Track items that were submitted earlier
pub async fn watch_batch(ctx: &CommandContext, ids: Vec<String>, user_channel_id: Option<String>) -> Result<()> {
    let batch = ctx.batch_for(ids, user_channel_id.as_deref())?;
    let outcome = track_batch(ctx, batch, ctx.transport()).await?;
    ensure_finished(&outcome)
}

/// Run a progress session for `batch` and render it to stdout.
///
/// Ctrl-C cancels tracking; the channel is released either way.
pub async fn track_batch<T>(ctx: &CommandContext, batch: Batch, transport: T) -> Result<SessionOutcome>
where
    T: PushTransport,
{
    println!("Tracking {} item(s) via {}", batch.len(), batch.channel().redacted());

    let session = ProgressSession::new(batch, transport, ctx.session_settings()).context("Cannot track this batch")?;
    let renderer = tokio::spawn(render_progress(session.subscribe()));

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping progress tracking");
                cancel.cancel();
            }
        })
    };

    let outcome = session.run(cancel).await;
    interrupt.abort();
    if let Err(e) = renderer.await {
        warn!("Progress renderer stopped abnormally: {}", e);
    }

    println!("{} ({})", outcome.snapshot.summary_line(), describe(outcome.reason));
    Ok(outcome)
}

fn ensure_finished(outcome: &SessionOutcome) -> Result<()> {
    match outcome.reason {
        SessionEndReason::Completed | SessionEndReason::Cancelled => Ok(()),
        SessionEndReason::ChannelClosed | SessionEndReason::ChannelErrored
            if outcome.snapshot.completed_count >= outcome.snapshot.total_count =>
        {
            Ok(())
        }
        reason => bail!(
            "Tracking stopped early ({}): {}; items may still be processing on the server",
            describe(reason),
            outcome.snapshot.summary_line()
        ),
    }
}

const fn describe(reason: SessionEndReason) -> &'static str {
    match reason {
        SessionEndReason::Completed => "all items finished",
        SessionEndReason::ChannelClosed => "channel closed",
        SessionEndReason::ChannelErrored => "channel error",
        SessionEndReason::Cancelled => "cancelled",
    }
}

/// Print transcript entries and percentage changes as snapshots arrive.
/// Ends when the session drops its sender.
async fn render_progress(rx: watch::Receiver<ProgressSnapshot>) {
    let mut snapshots = WatchStream::new(rx);
    let mut shown = 0_u32;
    let mut last_percent = None;

    while let Some(snapshot) = snapshots.next().await {
        let (skipped, entries) = fresh_entries(&snapshot, shown);
        if skipped > 0 {
            println!("  ... {skipped} earlier event(s) not shown");
        }
        for entry in entries {
            println!("  {entry}");
        }
        shown = snapshot.transcript_total;

        let label = snapshot.percent_label();
        if last_percent.as_deref() != Some(label.as_str()) && snapshot.total_count > 0 {
            println!("[{label}] {}", snapshot.summary_line());
            last_percent = Some(label);
        }
    }
}

/// Transcript entries in `snapshot` recorded after the first `shown` ones.
///
/// Returns how many new entries already scrolled out of the retained window,
/// followed by the retained new entries, oldest first.
#[must_use]
pub fn fresh_entries(snapshot: &ProgressSnapshot, shown: u32) -> (u32, &[StatusEvent]) {
    let new = snapshot.transcript_total.saturating_sub(shown) as usize;
    let retained = snapshot.transcript.len();
    let visible = new.min(retained);
    let skipped = u32::try_from(new - visible).unwrap_or(u32::MAX);
    (skipped, &snapshot.transcript[retained - visible..])
}
