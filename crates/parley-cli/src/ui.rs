//! UI rendering with ratatui.
//!
//! Two columns: the chat list on the left, the timeline with its input line
//! on the right. A banner row appears above both while the connection is not
//! up.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, List, ListItem, ListState, Paragraph, Scrollbar, ScrollbarOrientation,
    ScrollbarState, Wrap,
};
use ratatui::Frame;

use parley_client::{ConnectionState, Role};

use crate::app::{App, Focus, InputMode, SUGGESTIONS};

/// Horizontal padding for timeline content.
const CHAT_PADDING: u16 = 2;

/// Render the UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let banner = app.banner();

    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),                           // Header bar
            Constraint::Length(u16::from(banner.is_some())), // Connection banner
            Constraint::Min(5),                              // Main content
            Constraint::Length(1),                           // Status bar
        ])
        .split(area);

    render_header_bar(frame, app, main_layout[0]);
    if let Some(text) = banner {
        render_banner(frame, text, main_layout[1]);
    }

    let content_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(main_layout[2]);

    render_chats_panel(frame, app, content_layout[0]);
    render_timeline_column(frame, app, content_layout[1]);
    render_status_bar(frame, app, main_layout[3]);

    match app.input_mode {
        InputMode::CreatingChat => render_create_chat_dialog(frame, app, area),
        InputMode::ConfirmingDelete => render_confirm_delete_dialog(frame, app, area),
        InputMode::Normal => {}
    }
}

/// Truncate a string in the middle with an ellipsis if it exceeds `max_len` chars.
fn truncate_middle(s: &str, max_len: usize) -> String {
    let len = s.chars().count();
    if len <= max_len {
        return s.to_string();
    }
    if max_len < 5 {
        return s.chars().take(max_len).collect();
    }
    let keep = (max_len - 3) / 2;
    let start: String = s.chars().take(keep).collect();
    let end: String = s.chars().skip(len - keep).collect();
    format!("{start}...{end}")
}

const fn status_color(status: ConnectionState) -> Color {
    match status {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Connecting => Color::Yellow,
        ConnectionState::Disconnected | ConnectionState::Failed => Color::Red,
    }
}

/// Render the header bar with the project name and connection status.
fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = app.view.directory.status;
    let status_text = status.as_str();

    let title = "PARLEY";
    let max_url_width = (area.width as usize / 2).saturating_sub(15);
    let display_url = truncate_middle(app.endpoint(), max_url_width);

    let right_len = display_url.chars().count() + status_text.len() + 3;
    let padding = (area.width as usize).saturating_sub(title.len() + right_len);

    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(padding)),
        Span::raw(display_url),
        Span::raw(" ["),
        Span::styled(status_text, Style::default().fg(status_color(status))),
        Span::raw("]"),
    ]);

    let header = Paragraph::new(line).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_banner(frame: &mut Frame, text: &str, area: Rect) {
    let banner = Paragraph::new(Line::from(text).centered())
        .style(Style::default().fg(Color::Black).bg(Color::Yellow));
    frame.render_widget(banner, area);
}

/// Render the chat list.
fn render_chats_panel(frame: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus == Focus::Chats;

    let block = Block::default()
        .title(" Chats ")
        .borders(Borders::ALL)
        .border_style(if is_focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        });

    let items: Vec<ListItem> = app
        .view
        .directory
        .chats
        .iter()
        .map(|chat| {
            let marker = if app.is_open(&chat.id) {
                Span::styled("● ", Style::default().fg(Color::Green))
            } else {
                Span::raw("  ")
            };
            ListItem::new(Line::from(vec![marker, Span::raw(chat.name.as_str())]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.highlighted);
    frame.render_stateful_widget(list, area, &mut state);

    if is_focused && app.input_mode == InputMode::Normal && area.height > 4 {
        let help_area = Rect::new(
            area.x + 1,
            area.y + area.height.saturating_sub(2),
            area.width.saturating_sub(2),
            1,
        );
        let help = Paragraph::new(Line::from(vec![
            Span::styled("[n]", Style::default().fg(Color::Yellow)),
            Span::raw("ew "),
            Span::styled("[d]", Style::default().fg(Color::Yellow)),
            Span::raw("elete "),
            Span::styled("[q]", Style::default().fg(Color::Yellow)),
            Span::raw("uit"),
        ]))
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help, help_area);
    }
}

/// Render the right column: timeline above, input below.
fn render_timeline_column(frame: &mut Frame, app: &App, area: Rect) {
    let is_focused = app.focus == Focus::Timeline;

    let title = app
        .selected_chat()
        .map_or_else(|| " Chat ".to_string(), |chat| format!(" Chat: {} ", chat.name));

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if is_focused {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        });

    let inner_area = block.inner(area);
    frame.render_widget(block, area);

    let inner_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Timeline
            Constraint::Length(1), // Separator
            Constraint::Length(1), // Input
        ])
        .split(inner_area);

    let chat_area_full = inner_layout[0];
    let chat_area = Rect::new(
        chat_area_full.x + CHAT_PADDING,
        chat_area_full.y,
        chat_area_full.width.saturating_sub(CHAT_PADDING * 2 + 1),
        chat_area_full.height,
    );

    if app.view.directory.selected.is_none() {
        let help = Paragraph::new("Select a chat with Tab and Enter, or press n to create one")
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        frame.render_widget(help, chat_area);
    } else if app.show_suggestions() && !app.is_loading() {
        render_suggestions(frame, app, chat_area);
    } else {
        render_timeline(frame, app, chat_area, chat_area_full);
    }

    render_input_line(frame, app, inner_layout[1], inner_layout[2], is_focused);
}

fn render_suggestions(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from(Span::styled(
            "Try one of these (Up/Down, then Enter):",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
    ];
    for (i, suggestion) in SUGGESTIONS.iter().enumerate() {
        let line = if app.suggestion == Some(i) {
            Line::from(vec![
                Span::styled("> ", Style::default().fg(Color::Cyan)),
                Span::styled(*suggestion, Style::default().fg(Color::White).bold()),
            ])
        } else {
            Line::from(vec![
                Span::raw("  "),
                Span::styled(*suggestion, Style::default().fg(Color::Gray)),
            ])
        };
        lines.push(line);
    }

    let paragraph = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_timeline(frame: &mut Frame, app: &App, area: Rect, scrollbar_area: Rect) {
    let content_width = area.width as usize;
    let mut lines: Vec<Line> = Vec::new();

    for entry in app.view.timeline.entries() {
        match entry.role {
            Role::User => {
                lines.push(Line::from(vec![
                    Span::styled("[You] ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
                    Span::styled(entry.content.as_str(), Style::default().fg(Color::White)),
                ]));
            }
            Role::Assistant => {
                lines.push(Line::from(Span::styled(
                    "[Assistant]",
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                )));
                lines.extend(entry.content.lines().map(Line::from));
            }
        }
        lines.push(Line::from(""));
    }

    if app.is_loading() {
        lines.push(Line::from(vec![
            Span::styled(app.spinner_char(), Style::default().fg(Color::Yellow)),
            Span::styled(" thinking...", Style::default().fg(Color::DarkGray)),
        ]));
    }

    let text = Text::from(lines);
    let visible_lines = area.height as usize;
    let total_wrapped_lines = calculate_wrapped_line_count(&text, content_width);

    // chat_scroll counts lines up from the bottom
    let max_scroll = total_wrapped_lines.saturating_sub(visible_lines);
    let effective_scroll = app.chat_scroll.min(max_scroll);
    let scroll_offset = max_scroll.saturating_sub(effective_scroll);

    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .scroll((u16::try_from(scroll_offset).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, area);

    if total_wrapped_lines > visible_lines {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(total_wrapped_lines)
            .position(scroll_offset)
            .viewport_content_length(visible_lines);
        frame.render_stateful_widget(scrollbar, scrollbar_area, &mut scrollbar_state);
    }
}

/// Render the input line at the bottom of the timeline column.
fn render_input_line(frame: &mut Frame, app: &App, separator_area: Rect, input_area: Rect, is_focused: bool) {
    let separator = Paragraph::new("─".repeat(separator_area.width as usize))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(separator, separator_area);

    let in_modal = app.input_mode != InputMode::Normal;
    let prompt = if is_focused { "> " } else { "│ " };
    let input_text = if in_modal { "" } else { app.input.as_str() };

    let input_line = Line::from(vec![
        Span::styled(
            prompt,
            Style::default().fg(if is_focused { Color::Cyan } else { Color::DarkGray }),
        ),
        Span::styled(input_text, Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(input_line), input_area);

    if is_focused && !in_modal {
        let offset = u16::try_from(prompt.chars().count() + app.cursor_position).unwrap_or(u16::MAX);
        frame.set_cursor_position((input_area.x.saturating_add(offset), input_area.y));
    }
}

/// Render the status bar.
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode_indicator = match app.focus {
        Focus::Timeline => Span::styled(" CHAT ", Style::default().fg(Color::Black).bg(Color::Green)),
        Focus::Chats => Span::styled(" CHATS ", Style::default().fg(Color::Black).bg(Color::Magenta)),
    };

    let server_error = app.view.directory.last_error.as_ref();
    let status = if let Some(error) = app.error_message.as_ref().or(server_error) {
        Line::from(vec![
            mode_indicator,
            Span::styled(" ERROR: ", Style::default().fg(Color::Red).bold()),
            Span::styled(error.as_str(), Style::default().fg(Color::Red)),
        ])
    } else if let Some(ref status) = app.status_message {
        Line::from(vec![
            mode_indicator,
            Span::styled(format!(" {status}"), Style::default().fg(Color::Green)),
        ])
    } else if app.focus == Focus::Timeline {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            Span::styled("Enter", Style::default().fg(Color::Yellow)),
            Span::raw(":send "),
            Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
            Span::raw(":scroll "),
            Span::styled("Tab", Style::default().fg(Color::Yellow)),
            Span::raw(":chats "),
            Span::styled("Ctrl+C", Style::default().fg(Color::Yellow)),
            Span::raw(":quit"),
        ])
    } else {
        Line::from(vec![
            mode_indicator,
            Span::raw(" "),
            Span::styled("Enter", Style::default().fg(Color::Yellow)),
            Span::raw(":open "),
            Span::styled("n", Style::default().fg(Color::Yellow)),
            Span::raw(":new "),
            Span::styled("d", Style::default().fg(Color::Yellow)),
            Span::raw(":delete "),
            Span::styled("q", Style::default().fg(Color::Yellow)),
            Span::raw(":quit "),
            Span::styled("Tab", Style::default().fg(Color::Yellow)),
            Span::raw(":chat"),
        ])
    };

    let status_bar = Paragraph::new(status).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

/// Render the create chat dialog.
fn render_create_chat_dialog(frame: &mut Frame, app: &App, area: Rect) {
    let dialog_width = 50.min(area.width.saturating_sub(4));
    let dialog_height = 9.min(area.height.saturating_sub(4));

    let dialog_area = Rect::new(
        area.x + (area.width.saturating_sub(dialog_width)) / 2,
        area.y + (area.height.saturating_sub(dialog_height)) / 2,
        dialog_width,
        dialog_height,
    );

    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" New Chat ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Label
            Constraint::Length(1), // Spacer
            Constraint::Length(3), // Input box
            Constraint::Length(1), // Help text
        ])
        .split(inner);

    let label = Paragraph::new("Chat name:").style(Style::default().fg(Color::White));
    frame.render_widget(label, layout[0]);

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let input = Paragraph::new(app.input.as_str())
        .style(Style::default().fg(Color::Yellow))
        .block(input_block);
    frame.render_widget(input, layout[2]);

    let help = Paragraph::new("Press Enter to create, Esc to cancel")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, layout[3]);

    let offset = u16::try_from(app.cursor_position).unwrap_or(u16::MAX);
    frame.set_cursor_position((layout[2].x.saturating_add(offset) + 1, layout[2].y + 1));
}

/// Render the confirm delete dialog.
fn render_confirm_delete_dialog(frame: &mut Frame, app: &App, area: Rect) {
    let dialog_area = centered_rect(50, 20, area);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .title(" Confirm Delete ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));

    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    let chat_name = app.highlighted_chat().map_or("?", |chat| chat.name.as_str());

    let text = Text::from(vec![
        Line::from(format!("Delete chat '{chat_name}'?")),
        Line::from(""),
        Line::from("Its history is removed on the server."),
        Line::from(""),
        Line::from(vec![
            Span::styled("[y]", Style::default().fg(Color::Red).bold()),
            Span::raw(" Yes  "),
            Span::styled("[n]", Style::default().fg(Color::Green).bold()),
            Span::raw(" No"),
        ]),
    ]);

    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, inner);
}

/// Number of visual lines after wrapping to `available_width`.
fn calculate_wrapped_line_count(text: &Text, available_width: usize) -> usize {
    if available_width == 0 {
        return text.lines.len();
    }

    text.lines
        .iter()
        .map(|line| match line.width() {
            0 => 1,
            width => width.div_ceil(available_width),
        })
        .sum()
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
