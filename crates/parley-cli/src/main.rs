//! Parley - terminal chat client.
//!
//! This is the entry point for the `parley` binary.

mod app;
mod ui;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::EnvFilter;

use parley_client::{ChatClient, ClientConfig, PacingConfig};

use app::{App, Focus, InputMode};

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "parley=info,warn";

/// Parley - terminal chat client.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat server WebSocket endpoint.
    #[arg(long, env = "PARLEY_ENDPOINT", default_value = "ws://localhost:8090")]
    endpoint: String,

    /// Show replies as they arrive instead of pacing them like typing.
    #[arg(long, env = "PARLEY_NO_PACING", default_value = "false")]
    no_pacing: bool,

    /// Automatic reconnect attempts before giving up.
    #[arg(long, env = "PARLEY_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Enable debug logging to stderr.
    #[arg(long, default_value = "false")]
    debug: bool,

    /// Write logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::with_endpoint(self.endpoint.clone());
        if self.no_pacing {
            config.pacing = PacingConfig::disabled();
        }
        if let Some(max_retries) = self.max_retries {
            config.reconnect.max_retries = max_retries;
        }
        config
    }
}

/// Set up tracing. The TUI owns stdout, so logs go to a file or, with
/// `--debug`, to stderr.
fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if args.debug {
                EnvFilter::new("parley=debug,warn")
            } else {
                EnvFilter::new(DEFAULT_LOG_FILTER)
            }
        })
    };

    if let Some(path) = &args.log_file {
        let file = File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let config = args.client_config();
    tracing::info!(endpoint = %config.endpoint, pacing = config.pacing.enabled, "Starting parley");

    let client = ChatClient::connect_ws(&config);
    client.start();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(client.clone());
    let result = run_event_loop(&mut terminal, &mut app, &client).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    client.shutdown();
    result
}

/// Main event loop.
///
/// Redraws on every client change so streamed replies show up as they grow.
/// Input handlers never await the network; client calls run on spawned tasks.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    client: &ChatClient,
) -> anyhow::Result<()> {
    let mut changes = client.changes();

    loop {
        app.tick_animation();
        terminal.draw(|f| ui::render(f, app))?;

        let tick_rate = if app.is_loading() {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(100)
        };

        tokio::select! {
            () = tokio::time::sleep(tick_rate) => {
                while event::poll(Duration::from_millis(0)).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        handle_input(app, evt);
                    }
                }
            }

            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                app.refresh();
            }

            Some(outcome) = app.next_submit_outcome() => {
                app.apply_submit(outcome);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Handle a terminal event.
fn handle_input(app: &mut App, event: Event) {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                app.should_quit = true;
                return;
            }

            match app.input_mode {
                InputMode::Normal => handle_normal_mode(app, key),
                InputMode::CreatingChat => handle_create_chat_mode(app, key.code),
                InputMode::ConfirmingDelete => handle_confirm_delete_mode(app, key.code),
            }
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3),
            _ => {}
        },
        _ => {}
    }
}

/// Handle keys outside dialogs.
fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Tab | KeyCode::BackTab => {
            app.focus = app.focus.next();
            return;
        }
        KeyCode::PageUp => {
            app.scroll_chat_up(10);
            return;
        }
        KeyCode::PageDown => {
            app.scroll_chat_down(10);
            return;
        }
        _ => {}
    }

    match app.focus {
        Focus::Chats => handle_chats_focus(app, key.code),
        Focus::Timeline => handle_timeline_focus(app, key),
    }
}

/// Single-key commands on the chat list.
fn handle_chats_focus(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Up | KeyCode::Char('k') => app.highlight_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.highlight_next(),
        KeyCode::Enter => {
            app.open_highlighted();
            if app.view.directory.selected.is_some() {
                app.focus = Focus::Timeline;
            }
        }
        KeyCode::Char('n') => app.enter_dialog_mode(InputMode::CreatingChat),
        KeyCode::Char('d') => {
            if app.highlighted_chat().is_some() {
                app.enter_dialog_mode(InputMode::ConfirmingDelete);
            }
        }
        KeyCode::Esc => app.clear_error(),
        _ => {}
    }
}

/// Typing goes to the input line.
fn handle_timeline_focus(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => app.submit(),
        KeyCode::Esc => {
            if app.error_message.is_some() {
                app.clear_error();
            } else {
                app.focus = Focus::Chats;
            }
        }
        KeyCode::Up if app.input.is_empty() => app.cycle_suggestion(false),
        KeyCode::Down if app.input.is_empty() => app.cycle_suggestion(true),
        KeyCode::Char('a') if ctrl => app.move_cursor_start(),
        KeyCode::Char('e') if ctrl => app.move_cursor_end(),
        KeyCode::Char('u') if ctrl => app.clear_input(),
        KeyCode::Char('w') if ctrl => app.delete_word(),
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        _ => {}
    }
}

/// Handle keys in the create chat dialog.
fn handle_create_chat_mode(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Esc => app.exit_dialog_mode(),
        KeyCode::Enter => {
            let name = app.take_input();
            app.exit_dialog_mode();
            app.create_chat(&name);
        }
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        _ => {}
    }
}

/// Handle keys in the confirm delete dialog.
fn handle_confirm_delete_mode(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('y' | 'Y') => {
            app.exit_dialog_mode();
            app.delete_highlighted();
        }
        KeyCode::Char('n' | 'N') | KeyCode::Esc => app.exit_dialog_mode(),
        _ => {}
    }
}
