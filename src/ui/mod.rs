//! Terminal presentation.
//!
//! [`project`] turns a [`Session`] into a plain [`Screen`] description;
//! [`render`] draws that description with ratatui. Only the latter touches
//! the terminal, so everything the user sees can be checked without one.

pub mod terminal;

pub use terminal::{CrosstermKeys, KeySource, TerminalGuard};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::application::session::{Message, Session, Status};
use crate::domain::{AppError, DownloadPhase, ResolverError, TransferState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub text: String,
    pub tone: Tone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListView {
    pub items: Vec<String>,
    pub cursor: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    /// `None` while the transfer has not reported a percentage yet.
    pub percent: Option<f32>,
    pub label: String,
}

/// Everything drawn in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    pub input: String,
    pub input_active: bool,
    pub status: Option<StatusLine>,
    pub list: Option<ListView>,
    pub progress: Option<ProgressView>,
    pub help: &'static str,
}

pub fn project(session: &Session) -> Screen {
    let phase = session.phase();
    Screen {
        input: session.input().to_string(),
        input_active: phase == DownloadPhase::Idle,
        status: status_line(session.status()),
        list: (phase == DownloadPhase::Selecting)
            .then(|| session.qualities())
            .flatten()
            .map(|map| ListView {
                items: map.labels().map(str::to_string).collect(),
                cursor: session.cursor(),
            }),
        progress: session.transfer().and_then(progress_view),
        help: help_text(phase),
    }
}

fn status_line(status: &Status) -> Option<StatusLine> {
    let (text, tone) = match status {
        Status::Prompt | Status::Choose => return None,
        Status::Fetching => ("Fetching available formats...".to_string(), Tone::Info),
        Status::Downloading { quality, filename } => (
            format!("Downloading {} to {}", quality, filename),
            Tone::Info,
        ),
        Status::Saved(path) => (
            format!("Download finished successfully: {}", path.display()),
            Tone::Success,
        ),
        Status::Error(AppError::Resolver(ResolverError::EmptyResult)) => {
            (ResolverError::EmptyResult.to_string(), Tone::Error)
        }
        Status::Error(AppError::Resolver(e)) => {
            (format!("Error fetching download links: {}", e), Tone::Error)
        }
        Status::Error(AppError::Transfer(e)) => (format!("Download failed: {}", e), Tone::Error),
        Status::Error(e) => (e.to_string(), Tone::Error),
    };
    Some(StatusLine { text, tone })
}

fn progress_view(state: &TransferState) -> Option<ProgressView> {
    match state {
        TransferState::Pending => Some(ProgressView {
            percent: None,
            label: "waiting for progress...".to_string(),
        }),
        TransferState::InProgress(p) => Some(ProgressView {
            percent: Some(*p),
            label: format!("{:.1}%", p),
        }),
        TransferState::Succeeded => Some(ProgressView {
            percent: Some(100.0),
            label: "100.0%".to_string(),
        }),
        TransferState::Failed(_) => None,
    }
}

fn help_text(phase: DownloadPhase) -> &'static str {
    match phase {
        DownloadPhase::Idle => "Type or paste a URL, [Enter] to submit, [Esc] to quit",
        DownloadPhase::Selecting => "[Up/Down] to move, [Enter] to select, [q] to quit",
        DownloadPhase::Completed | DownloadPhase::Failed => "Exiting... [q] to quit now",
        _ => "Press [q] to quit",
    }
}

/// Map a key press to a session message for the current phase.
pub fn key_to_message(session: &Session, key: KeyEvent) -> Option<Message> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C')) {
        return Some(Message::Quit);
    }
    if key.code == KeyCode::Esc {
        return Some(Message::Quit);
    }

    match session.phase() {
        DownloadPhase::Idle => match key.code {
            KeyCode::Enter => Some(Message::Submit),
            KeyCode::Backspace => {
                let mut input = session.input().to_string();
                input.pop();
                Some(Message::InputChanged(input))
            }
            KeyCode::Char('u') if ctrl => Some(Message::InputChanged(String::new())),
            KeyCode::Char(c) if !ctrl => {
                let mut input = session.input().to_string();
                input.push(c);
                Some(Message::InputChanged(input))
            }
            _ => None,
        },
        DownloadPhase::Selecting => match key.code {
            KeyCode::Up | KeyCode::Char('k') => Some(Message::MoveSelection(-1)),
            KeyCode::Down | KeyCode::Char('j') => Some(Message::MoveSelection(1)),
            KeyCode::Enter => Some(Message::Confirm),
            KeyCode::Char(d @ '1'..='9') => Some(Message::Select(d as usize - '1' as usize)),
            KeyCode::Char('q') => Some(Message::Quit),
            _ => None,
        },
        _ => match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            _ => None,
        },
    }
}

pub fn render(frame: &mut Frame, screen: &Screen) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let input_style = if screen.input_active {
        Style::default().fg(Color::White).bg(Color::Blue)
    } else {
        Style::default().fg(Color::Gray)
    };
    let input = Paragraph::new(Line::from(vec![
        Span::styled(screen.input.as_str(), input_style),
        Span::styled(if screen.input_active { "_" } else { "" }, input_style),
    ]))
    .block(Block::default().borders(Borders::ALL).title(" Video URL "));
    frame.render_widget(input, rows[0]);

    if let Some(status) = &screen.status {
        let color = match status.tone {
            Tone::Info => Color::Yellow,
            Tone::Error => Color::Red,
            Tone::Success => Color::Green,
        };
        let para = Paragraph::new(status.text.as_str())
            .alignment(Alignment::Center)
            .style(Style::default().fg(color))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(color)),
            );
        frame.render_widget(para, rows[1]);
    }

    if let Some(list) = &screen.list {
        let items: Vec<ListItem> = list
            .items
            .iter()
            .map(|label| ListItem::new(label.as_str()))
            .collect();
        let widget = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(" Choose Quality "))
            .highlight_style(
                Style::default()
                    .bg(Color::Blue)
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");
        let mut state = ListState::default();
        state.select(Some(list.cursor));
        frame.render_stateful_widget(widget, rows[2], &mut state);
    }

    if let Some(progress) = &screen.progress {
        let ratio = progress
            .percent
            .map(|p| (f64::from(p) / 100.0).clamp(0.0, 1.0))
            .unwrap_or(0.0);
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title(" Progress "))
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(ratio)
            .label(progress.label.as_str());
        frame.render_widget(gauge, rows[3]);
    }

    let help = Paragraph::new(screen.help)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[4]);
}
