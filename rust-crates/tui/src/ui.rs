use crate::app::{
    ActivityLine,
    DashboardSnapshot,
};
use chrono::{
    DateTime,
    Local,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use itertools::Itertools;
use jackpot_client::{
    derive::RoundView,
    purchase::NotificationKind,
    types::{
        RoundState,
        SyncStatus,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::{
    Stdout,
    stdout,
};
use tokio::sync::mpsc;
use unicode_width::UnicodeWidthChar;

const MAX_AMOUNT_CHARS: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    Quit,
    Purchase(f64),
    Reconcile,
    Connect,
    Disconnect,
    Redraw,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    AmountPrompt(AmountInput),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct AmountInput {
    text: String,
}

impl AmountInput {
    fn push(&mut self, c: char) {
        let accepted = c.is_ascii_digit() || (c == '.' && !self.text.contains('.'));
        if accepted && self.text.len() < MAX_AMOUNT_CHARS {
            self.text.push(c);
        }
    }

    // unparseable input is sent as zero and rejected by purchase planning
    fn amount(&self) -> f64 {
        self.text.parse().unwrap_or(0.0)
    }
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<Event>;

/// Reads terminal events on a dedicated thread; `event::read` blocks.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(ev) => {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(%err, "terminal input failed");
                    break;
                }
            }
        }
    });
    rx
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    input_events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input stream closed"))
}

pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(_, _) => return Some(UserEvent::Redraw),
        _ => return None,
    };
    // raw mode turns Ctrl+C into a key press
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    match &mut state.mode {
        Mode::AmountPrompt(input) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let amount = input.amount();
                state.mode = Mode::Normal;
                Some(UserEvent::Purchase(amount))
            }
            KeyCode::Backspace => {
                input.text.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) => {
                input.push(c);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Normal => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(UserEvent::Quit),
            KeyCode::Char('b') => {
                state.mode = Mode::AmountPrompt(AmountInput::default());
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('r') => Some(UserEvent::Reconcile),
            KeyCode::Char('c') => Some(UserEvent::Connect),
            KeyCode::Char('d') => Some(UserEvent::Disconnect),
            _ => None,
        },
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // one persistent Terminal keeps the diff buffers between draws
    let backend = CrosstermBackend::new(stdout());
    state.terminal = Some(Terminal::new(backend)?);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &DashboardSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        let res = term.draw(|f| ui(f, state, snap)).map(|_| ());
        state.terminal = Some(term);
        res?;
    }
    Ok(())
}

fn ui(f: &mut Frame, state: &UiState, snap: &DashboardSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // round + wallet
            Constraint::Length(5), // prize pool, countdown, 2X window
            Constraint::Length(3), // user stats
            Constraint::Min(6),    // activity + notifications
            Constraint::Length(3), // status
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_header(f, chunks[0], snap);
    draw_round(f, chunks[1], snap);
    draw_user_stats(f, chunks[2], snap);
    draw_feeds(f, chunks[3], snap);
    draw_status(f, chunks[4], snap);
    draw_help(f, chunks[5], snap);
    draw_modals(f, state);
}

fn draw_header(f: &mut Frame, area: Rect, snap: &DashboardSnapshot) {
    let widget = Paragraph::new(header_line(snap))
        .block(Block::default().borders(Borders::ALL).title("Jackpot"));
    f.render_widget(widget, area);
}

fn header_line(snap: &DashboardSnapshot) -> String {
    let round = match snap.view.round_number {
        Some(n) => format!("Round #{n}"),
        None => "No round loaded".to_string(),
    };
    let state = snap
        .view
        .state
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    let sync = match snap.sync {
        SyncStatus::Synced => "Synced",
        SyncStatus::OutOfSync => "Out of sync",
        SyncStatus::Pending => "Syncing",
    };
    let wallet = match (&snap.account, snap.balance) {
        (Some(account), Some(balance)) => format!("Wallet {} ({balance} SUI)", account.short()),
        (Some(account), None) => format!("Wallet {}", account.short()),
        (None, _) => "Wallet not connected".to_string(),
    };
    [round, state, snap.network.to_string(), sync.to_string(), wallet]
        .iter()
        .join(" | ")
}

fn draw_round(f: &mut Frame, area: Rect, snap: &DashboardSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ])
        .split(area);
    let view = &snap.view;

    let pool = Paragraph::new(vec![
        Line::from(Span::styled(
            format!("{} SUI", view.total_pool),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("{} tickets", view.total_tickets)),
    ])
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL).title("Prize Pool"));
    f.render_widget(pool, cols[0]);

    let countdown_label = if view.ended && view.round_number.is_some() {
        "Round ended".to_string()
    } else {
        view.countdown.clone()
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Time Left"))
        .gauge_style(Style::default().fg(countdown_color(view)))
        .ratio(countdown_ratio(view.remaining_ms, snap.round_duration_ms))
        .label(countdown_label);
    f.render_widget(gauge, cols[1]);

    let (badge, style) = last_minute_badge(view);
    let window = Paragraph::new(Line::from(Span::styled(badge, style)))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Multiplier"));
    f.render_widget(window, cols[2]);
}

fn countdown_color(view: &RoundView) -> Color {
    if view.last_minute {
        Color::Red
    } else if view.active {
        Color::Green
    } else {
        Color::DarkGray
    }
}

fn countdown_ratio(remaining_ms: u64, round_duration_ms: u64) -> f64 {
    if round_duration_ms == 0 {
        return 0.0;
    }
    (remaining_ms as f64 / round_duration_ms as f64).clamp(0.0, 1.0)
}

fn last_minute_badge(view: &RoundView) -> (String, Style) {
    if view.last_minute {
        (
            format!("LAST MINUTE! {}X tickets", view.multiplier),
            Style::default()
                .fg(Color::Red)
                .add_modifier(Modifier::BOLD | Modifier::SLOW_BLINK),
        )
    } else if view.active && !view.ended {
        (
            format!("2X in {}", view.until_last_minute),
            Style::default().fg(Color::Cyan),
        )
    } else {
        let text = match view.state {
            Some(RoundState::Drawing) => "Drawing winner",
            Some(RoundState::Completed) => "Round complete",
            _ => "Waiting for round",
        };
        (text.to_string(), Style::default().fg(Color::DarkGray))
    }
}

fn draw_user_stats(f: &mut Frame, area: Rect, snap: &DashboardSnapshot) {
    let view = &snap.view;
    let text = if snap.account.is_some() {
        format!(
            "Tickets: {} | Win chance: {} | Spent: {} SUI",
            view.user_tickets,
            format_probability(view.win_probability),
            view.total_spent
        )
    } else {
        "Connect a wallet to see your tickets".to_string()
    };
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Your Stats"));
    f.render_widget(widget, area);
}

fn format_probability(percent: f64) -> String {
    format!("{percent:.2}%")
}

fn draw_feeds(f: &mut Frame, area: Rect, snap: &DashboardSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let width = cols[0].width.saturating_sub(2) as usize;
    let mut lines: Vec<Line> = snap
        .activity
        .iter()
        .take(cols[0].height.saturating_sub(2) as usize)
        .map(|line| activity_line(line, width))
        .collect();
    if lines.is_empty() {
        lines.push(Line::from("No activity in the last hour"));
    }
    let mut title = String::from("Activity");
    if snap.demo {
        title.push_str(" (demo)");
    }
    if snap.activity_error.is_some() {
        title.push_str(" [stale]");
    }
    let activity =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(activity, cols[0]);

    let notifications: Vec<Line> = snap
        .notifications
        .iter()
        .map(|n| {
            Line::from(Span::styled(
                n.text.clone(),
                Style::default().fg(notification_color(n.kind)),
            ))
        })
        .collect();
    let widget = Paragraph::new(notifications)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Notifications"));
    f.render_widget(widget, cols[1]);
}

fn activity_line(line: &ActivityLine, width: usize) -> Line<'static> {
    let time = DateTime::from_timestamp_millis(line.timestamp_ms as i64)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    let text = fit_width(&format!("{time}  {}", line.text), width);
    let style = if line.simulated {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };
    Line::from(Span::styled(text, style))
}

fn notification_color(kind: NotificationKind) -> Color {
    match kind {
        NotificationKind::Success => Color::Green,
        NotificationKind::Whale => Color::Magenta,
        NotificationKind::Info => Color::Cyan,
        NotificationKind::Error => Color::Red,
    }
}

/// Truncates to `width` terminal columns, marking the cut with an ellipsis.
fn fit_width(text: &str, width: usize) -> String {
    let total: usize = text.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        used += w;
        out.push(c);
    }
    if width > 0 {
        out.push('…');
    }
    out
}

fn draw_status(f: &mut Frame, area: Rect, snap: &DashboardSnapshot) {
    let widget = match (&snap.error, &snap.activity_error) {
        (Some(err), _) => Paragraph::new(err.clone())
            .block(Block::default().borders(Borders::ALL).title("Error"))
            .style(Style::default().fg(Color::Red)),
        (None, Some(err)) => Paragraph::new(format!("Activity feed: {err}"))
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Yellow)),
        (None, None) => {
            let text = if snap.loading { "Loading..." } else { "Ready" };
            Paragraph::new(text)
                .block(Block::default().borders(Borders::ALL).title("Status"))
                .style(Style::default().fg(Color::Green))
        }
    };
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &DashboardSnapshot) {
    let wallet = if snap.account.is_some() {
        "d disconnect"
    } else {
        "c connect"
    };
    let help = Paragraph::new(format!("b buy tickets | r refresh | {wallet} | q/Esc quit"))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    if let Mode::AmountPrompt(input) = &state.mode {
        let area = centered_rect(40, 20, f.area());
        let block = Block::default().borders(Borders::ALL).title("Buy Tickets");
        let p = Paragraph::new(vec![
            Line::from(format!("Amount (SUI): {}_", input.text)),
            Line::from("Enter=confirm Esc=cancel"),
        ]);
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
