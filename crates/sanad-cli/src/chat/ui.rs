//! UI rendering

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use sanad_core::{FeedView, Item};

use super::app::App;

/// What the screen needs from the feed and composer
pub struct ChatView<'a> {
    pub items: &'a [Item],
    pub view: FeedView,
    pub stale: bool,
    pub sending: bool,
}

/// Main UI rendering function
pub fn draw(frame: &mut Frame, app: &App, chat: &ChatView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_messages(frame, app, chat, chunks[0]);
    draw_input(frame, app, chat, chunks[1]);
    draw_status_bar(frame, app, chat, chunks[2]);
}

/// Range of items shown, given the scroll offset from the bottom
pub fn visible_range(total: usize, height: usize, scroll: usize) -> (usize, usize) {
    let scroll = scroll.min(total.saturating_sub(height));
    let end = total - scroll;
    (end.saturating_sub(height), end)
}

fn draw_messages(frame: &mut Frame, app: &App, chat: &ChatView, area: Rect) {
    let title = if chat.stale {
        " Sanad chat (live updates stopped) "
    } else {
        " Sanad chat "
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if chat.stale {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        });

    let placeholder = match chat.view {
        FeedView::Loading => Some("Loading messages..."),
        FeedView::Empty => Some("No messages yet. Say hello!"),
        FeedView::Failed => Some("Could not load messages. Press Ctrl-R to retry."),
        FeedView::Ready => None,
    };
    if let Some(text) = placeholder {
        if chat.items.is_empty() {
            let paragraph = Paragraph::new(text)
                .style(Style::default().add_modifier(Modifier::DIM))
                .block(block);
            frame.render_widget(paragraph, area);
            return;
        }
    }

    let height = area.height.saturating_sub(2) as usize;
    let (start, end) = visible_range(chat.items.len(), height, app.scroll);

    let items: Vec<ListItem> = chat.items[start..end]
        .iter()
        .map(|item| {
            let (who, style) = if item.is_local() {
                ("you", Style::default().fg(Color::Cyan))
            } else {
                ("anon", Style::default().fg(Color::Green))
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} ", item.created_at.format("%H:%M")),
                    Style::default().add_modifier(Modifier::DIM),
                ),
                Span::styled(format!("{:>4} ", who), style.add_modifier(Modifier::BOLD)),
                Span::raw(item.text.as_str()),
            ]))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn draw_input(frame: &mut Frame, app: &App, chat: &ChatView, area: Rect) {
    let style = if chat.sending {
        Style::default().add_modifier(Modifier::DIM)
    } else {
        Style::default()
    };
    let paragraph = Paragraph::new(app.input.as_str())
        .style(style)
        .block(Block::default().title(" Message ").borders(Borders::ALL));
    frame.render_widget(paragraph, area);

    if !chat.sending {
        let cursor_x = area.x + 1 + app.cursor as u16;
        frame.set_cursor_position((cursor_x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}

/// Draw the status bar at the bottom
fn draw_status_bar(frame: &mut Frame, app: &App, chat: &ChatView, area: Rect) {
    let content = if chat.sending {
        "Sending...".to_string()
    } else if let Some(msg) = &app.status_message {
        msg.clone()
    } else {
        "Enter:send  ↑/↓:scroll  Ctrl-R:reload  Esc:quit".to_string()
    };

    let paragraph = Paragraph::new(content).style(Style::default().add_modifier(Modifier::DIM));

    frame.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_range() {
        // Fits entirely
        assert_eq!(visible_range(3, 10, 0), (0, 3));
        // Newest at the bottom
        assert_eq!(visible_range(30, 10, 0), (20, 30));
        // Scrolled up
        assert_eq!(visible_range(30, 10, 5), (15, 25));
        // Scrolling stops at the oldest page
        assert_eq!(visible_range(30, 10, 100), (0, 10));
        assert_eq!(visible_range(3, 10, 2), (0, 3));
    }
}
