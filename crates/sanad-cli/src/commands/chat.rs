//! Chat command handlers

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use sanad_core::models::tables;
use sanad_core::{
    Config, FeedError, FeedSpec, FeedUpdate, Gateway, Item, ListSynchronizer, MergeOutcome,
    SubmissionHandler,
};

use crate::output::Output;

fn feed(gateway: &Arc<dyn Gateway>, config: &Config) -> ListSynchronizer<Item> {
    ListSynchronizer::new(Arc::clone(gateway), FeedSpec::messages(config.page_size))
}

/// Post one message
pub async fn send(
    gateway: Arc<dyn Gateway>,
    config: &Config,
    text: String,
    output: &Output,
) -> Result<()> {
    let mut feed = feed(&gateway, config);
    let mut composer = SubmissionHandler::new(gateway, tables::MESSAGES);

    match composer.submit(&text, &mut feed).await {
        Ok(MergeOutcome::Appended) | Ok(MergeOutcome::Upgraded) => {
            if let Some(item) = feed.items().last() {
                if output.is_quiet() || output.is_json() {
                    output.print_item(item);
                } else {
                    output.success(&format!("Sent: {}", item.text));
                }
            }
            Ok(())
        }
        Ok(outcome) => {
            debug!("Send settled as {:?}", outcome);
            Ok(())
        }
        Err(e) => Err(report(e, output)),
    }
}

/// Print the most recent messages
pub async fn show(gateway: Arc<dyn Gateway>, config: &Config, output: &Output) -> Result<()> {
    let mut feed = feed(&gateway, config);
    feed.initialize().await.map_err(|e| report(e, output))?;
    feed.teardown();

    output.print_items(feed.items());
    Ok(())
}

/// Print recent messages, then stream new ones until Ctrl-C
pub async fn watch(gateway: Arc<dyn Gateway>, config: &Config, output: &Output) -> Result<()> {
    let mut feed = feed(&gateway, config);
    feed.initialize().await.map_err(|e| report(e, output))?;

    for item in feed.items() {
        output.print_item(item);
    }
    if let Some(e) = feed.channel_error() {
        output.warn(&e.to_string());
        return Ok(());
    }
    output.message("Watching for new messages (Ctrl-C to stop)...");

    while feed.is_live() {
        tokio::select! {
            update = feed.next_event() => match update {
                Some(update) if update.appended() => {
                    if let Some(item) = feed.items().last() {
                        output.print_item(item);
                    }
                }
                Some(FeedUpdate::ChannelDropped(reason)) => {
                    output.warn(&format!("Live updates stopped: {}", reason));
                }
                _ => {}
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    feed.teardown();
    Ok(())
}

/// Show the recovery hint and hand the error back for the exit status
fn report(error: FeedError, output: &Output) -> anyhow::Error {
    if let Some(hint) = error.recovery_suggestion() {
        output.warn(hint);
    }
    error.into()
}
