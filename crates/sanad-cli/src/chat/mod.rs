//! Sanad chat
//!
//! Full-screen live chat over the messages feed.
//!
//! ## Layout
//!
//! - Top: message history, newest at the bottom
//! - Middle: message composer
//! - Bottom: status line
//!
//! ## Keys
//!
//! - Enter: Send the message
//! - ↑/↓, PgUp/PgDn, End: Scroll
//! - Ctrl-R: Reload history and reconnect live updates
//! - Esc or Ctrl-C: Quit

mod app;
mod ui;

use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use sanad_core::gateway::{GatewayResult, Row};
use sanad_core::models::tables;
use sanad_core::{
    Config, FeedError, FeedSpec, FeedUpdate, FeedView, Gateway, GatewayError, Item, ListSynchronizer,
    SubmissionHandler,
};

use crate::logging;
use app::{App, KeyAction};
use ui::ChatView;

/// Run the chat screen until the user quits
pub async fn run(config: &Config, gateway: Arc<dyn Gateway>) -> Result<()> {
    // The terminal is ours from here on, so logs go to a file
    logging::init_file(config);

    let mut feed: ListSynchronizer<Item> =
        ListSynchronizer::new(Arc::clone(&gateway), FeedSpec::messages(config.page_size));
    let mut composer = SubmissionHandler::new(gateway, tables::MESSAGES);
    let mut app = App::new();

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    terminal.draw(|frame| ui::draw(frame, &app, &chat_view(&feed, &composer)))?;
    load(&mut feed, &mut app).await;

    let result = run_app(&mut terminal, &mut app, &mut feed, &mut composer).await;
    feed.teardown();

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn chat_view<'a>(feed: &'a ListSynchronizer<Item>, composer: &SubmissionHandler) -> ChatView<'a> {
    ChatView {
        items: feed.items(),
        view: feed.view(),
        stale: feed.is_stale(),
        sending: composer.is_submitting(),
    }
}

/// Fetch history and (re)subscribe, reporting problems on the status line
async fn load(feed: &mut ListSynchronizer<Item>, app: &mut App) {
    match feed.initialize().await {
        Ok(count) => {
            debug!("Chat loaded {} message(s)", count);
            if let Some(e) = feed.channel_error() {
                app.set_status(format!("{} (Ctrl-R to retry)", e));
            }
        }
        Err(e) => {
            warn!("Chat load failed: {}", e);
            app.set_status(e.to_string());
        }
    }
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    feed: &mut ListSynchronizer<Item>,
    composer: &mut SubmissionHandler,
) -> Result<()> {
    let mut in_flight: Option<JoinHandle<GatewayResult<Row>>> = None;

    loop {
        app.check_status_timeout();
        terminal.draw(|frame| ui::draw(frame, app, &chat_view(feed, composer)))?;

        tokio::select! {
            biased;

            // Live inserts from other clients (and echoes of our own)
            update = feed.next_event(), if feed.is_live() => match update {
                Some(FeedUpdate::ChannelDropped(reason)) => {
                    app.set_status(format!("Live updates stopped: {} (Ctrl-R to retry)", reason));
                }
                Some(update) if update.appended() && app.scroll > 0 => {
                    // Keep the viewport on what the user is reading
                    app.scroll += 1;
                }
                _ => {}
            },

            // The pending send settled
            sent = async {
                match in_flight.as_mut() {
                    Some(handle) => handle.await,
                    None => std::future::pending().await,
                }
            }, if in_flight.is_some() => {
                in_flight = None;
                let result = sent.unwrap_or_else(|e| Err(GatewayError::Unavailable(e.to_string())));
                match composer.finish(result, feed) {
                    Ok(_) => {
                        app.clear_input();
                        composer.acknowledge();
                    }
                    Err(e) => app.set_status(format!("{} (message kept, Enter to retry)", e)),
                }
            }

            // Poll for terminal events
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                while event::poll(Duration::from_millis(0))? {
                    let Event::Key(key) = event::read()? else {
                        continue;
                    };
                    // Only handle key press events (not release)
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }

                    match app.handle_key(key, composer.is_submitting()) {
                        KeyAction::Send => match composer.prepare(&app.input) {
                            Ok(draft) => {
                                let gateway = composer.gateway();
                                in_flight = Some(tokio::spawn(async move {
                                    draft.send(gateway.as_ref()).await
                                }));
                            }
                            Err(FeedError::EmptySubmission) => {}
                            Err(e) => app.set_status(e.to_string()),
                        },
                        KeyAction::Reload => {
                            load(feed, app).await;
                            if feed.view() != FeedView::Failed && !feed.is_stale() {
                                app.set_status("Reloaded");
                            }
                        }
                        KeyAction::Quit => app.should_quit = true,
                        KeyAction::None => {}
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    if let Some(handle) = in_flight {
        debug!("Quitting with a send in flight");
        handle.abort();
    }

    Ok(())
}
