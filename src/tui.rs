// TUI Module - Terminal settings editor on top of an editing session
use anyhow::Result;
use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect as TermRect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::{Frame, Terminal};
use std::io;
use std::sync::mpsc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::info;

use crate::config::ClientConfig;
use crate::device::{DeviceClient, SyncError};
use crate::dropdown::{Dispatch, Rect, ReferenceList, Scroll, Target};
use crate::form::{AlarmGroup, Widget, WidgetId};
use crate::session::EditingSession;
use crate::settings::{AlarmField, FieldKind, SettingsDocument};
use crate::transport::HttpTransport;
use crate::types::Acknowledgement;

const LABEL_WIDTH: usize = 16;
const SCALAR_VALUE_X: u16 = 18;
const SCALAR_VALUE_WIDTH: u16 = 34;
const CHECKBOX_WIDTH: u16 = 3;
// Page lines between the scalar block and the first alarm row (blank + column titles)
const ALARM_HEADER_LINES: usize = 2;
// (x, width) of each alarm cell, in AlarmField::ALL order
const ALARM_CELLS: [(u16, u16); 7] = [(5, 4), (10, 4), (16, 4), (21, 4), (27, 3), (32, 3), (37, 22)];
// Header, footer and the body's borders
const CHROME_HEIGHT: u16 = 8;

/// Finished network call, delivered back to the editor loop
pub enum Completion<D> {
    Loaded(Result<D, SyncError>),
    References(Result<ReferenceList, SyncError>),
    Saved(Result<Acknowledgement, SyncError>),
}

/// Work the editor asks its host loop to do
#[derive(Debug, PartialEq)]
pub enum Action<D> {
    None,
    Reload,
    FetchReferences,
    // Harvested document, ready to be written
    Save(D),
    Quit,
}

pub struct Editor<D: SettingsDocument> {
    session: EditingSession<D>,
    device: String,
    focus: (usize, usize),
    scroll_y: u16,
    viewport_height: u16,
    status: String,
}

fn alarm_cell(field: AlarmField) -> (u16, u16) {
    let idx = AlarmField::ALL.iter().position(|f| *f == field).unwrap_or(0);
    ALARM_CELLS[idx]
}

fn cell_text(widget: &Widget, width: u16) -> String {
    let inner = usize::from(width.saturating_sub(2));
    let body = match widget.kind {
        FieldKind::Checkbox => if widget.checked { "x".to_string() } else { " ".to_string() },
        FieldKind::Password => "*".repeat(widget.value.chars().count().min(inner)),
        _ => widget.value.chars().take(inner).collect(),
    };
    format!("[{:<width$}]", body, width = inner)
}

fn cell_style(widget: &Widget, focused: bool) -> Style {
    let mut style = if widget.disabled {
        Style::default().fg(Color::DarkGray)
    } else if widget.read_only {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    };
    if focused {
        style = style.add_modifier(Modifier::REVERSED);
    }
    style
}

// Pad with spaces up to column x, then append the span
fn place(spans: &mut Vec<Span<'static>>, cursor: &mut usize, x: u16, span: Span<'static>) {
    let x = usize::from(x);
    if x > *cursor {
        spans.push(Span::raw(" ".repeat(x - *cursor)));
        *cursor = x;
    }
    *cursor += span.content.chars().count();
    spans.push(span);
}

impl<D: SettingsDocument> Editor<D> {
    pub fn new(label_field: &str, device: &str) -> Self {
        Editor {
            session: EditingSession::new(label_field),
            device: device.to_string(),
            focus: (0, 0),
            scroll_y: 0,
            viewport_height: 20,
            status: format!("Loading from {}...", device),
        }
    }

    pub fn session(&self) -> &EditingSession<D> {
        &self.session
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_viewport_height(&mut self, height: u16) {
        self.viewport_height = height.max(1);
        self.keep_visible();
    }

    fn grid(&self) -> Vec<Vec<WidgetId>> {
        self.session.form().map(|f| f.focus_grid()).unwrap_or_default()
    }

    pub fn focused(&self) -> Option<WidgetId> {
        self.grid().get(self.focus.0).and_then(|line| line.get(self.focus.1)).copied()
    }

    fn scalar_count(&self) -> usize {
        self.session.form().map(|f| f.scalars().len()).unwrap_or(0)
    }

    // Page line of a focus-grid line
    fn page_y(&self, line: usize) -> u16 {
        let scalars = self.scalar_count();
        let y = if line < scalars { line } else { line + ALARM_HEADER_LINES };
        u16::try_from(y).unwrap_or(u16::MAX)
    }

    /// Page rectangle of a widget's input cell
    pub fn cell_rect(&self, id: WidgetId) -> Option<Rect> {
        let form = self.session.form()?;
        let widget = form.widget(id)?;
        let (x, width, line) = match id {
            WidgetId::Scalar(i) => {
                let width = if widget.is_checkbox() { CHECKBOX_WIDTH } else { SCALAR_VALUE_WIDTH };
                (SCALAR_VALUE_X, width, i)
            }
            WidgetId::Alarm { row, field } => {
                let (x, width) = alarm_cell(field);
                (x, width, self.scalar_count() + row)
            }
        };
        Some(Rect {
            left: f64::from(x),
            top: f64::from(self.page_y(line)),
            width: f64::from(width),
            height: 1.0,
        })
    }

    fn keep_visible(&mut self) {
        let y = self.page_y(self.focus.0);
        if y < self.scroll_y {
            self.scroll_y = y;
        } else if y >= self.scroll_y + self.viewport_height {
            self.scroll_y = y + 1 - self.viewport_height;
        }
    }

    fn clamp_focus(&mut self) {
        let grid = self.grid();
        if grid.is_empty() {
            self.focus = (0, 0);
            return;
        }
        let line = self.focus.0.min(grid.len() - 1);
        let col = self.focus.1.min(grid[line].len().saturating_sub(1));
        self.focus = (line, col);
        self.keep_visible();
    }

    // Moving focus counts as an interaction on the newly focused input
    fn move_focus(&mut self, lines: isize, cols: isize) {
        let grid = self.grid();
        if grid.is_empty() {
            return;
        }
        let last_line = grid.len() as isize - 1;
        let line = (self.focus.0 as isize + lines).clamp(0, last_line) as usize;
        let last_col = grid[line].len() as isize - 1;
        let col = (self.focus.1 as isize + cols).clamp(0, last_col) as usize;
        self.focus = (line, col);
        self.keep_visible();
        if let Some(id) = self.focused() {
            self.session.interact(Target::Input(id));
        }
    }

    fn type_text(&mut self, id: WidgetId, change: impl FnOnce(&mut String)) {
        self.session.interact(Target::Input(id));
        let Some(mut value) = self.session.form().and_then(|f| f.widget(id)).map(|w| w.value.clone()) else {
            return;
        };
        change(&mut value);
        if let Err(e) = self.session.edit(id, value) {
            self.status = e.to_string();
        }
    }

    fn open_dropdown(&mut self, id: WidgetId) {
        self.session.interact(Target::Input(id));
        if self.session.dropdown_for(id).is_none() {
            return;
        }
        let Some(page) = self.cell_rect(id) else {
            return;
        };
        let scroll = Scroll { x: 0.0, y: f64::from(self.scroll_y) };
        let anchor = Rect { top: page.top - scroll.y, ..page };
        if self.session.activate_dropdown(id, anchor, scroll).is_some() && self.session.references().is_empty() {
            self.status = "No sounds reported by the device".to_string();
        }
    }

    fn save(&mut self) -> Action<D> {
        match self.session.commit() {
            Ok(document) => {
                let document = document.clone();
                self.status = "Saving...".to_string();
                Action::Save(document)
            }
            Err(e) => {
                self.status = format!("Save failed: {}", e);
                Action::None
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action<D> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('c') if ctrl => return Action::Quit,
            KeyCode::Char('s') if ctrl => return self.save(),
            KeyCode::Char('r') if ctrl => {
                self.status = format!("Reloading from {}...", self.device);
                return Action::Reload;
            }
            _ => {}
        }

        if self.session.overlay().is_open() {
            match key.code {
                KeyCode::Up => {
                    self.session.interact(Target::Overlay);
                    self.session.overlay_mut().highlight_prev();
                    return Action::None;
                }
                KeyCode::Down => {
                    self.session.interact(Target::Overlay);
                    self.session.overlay_mut().highlight_next();
                    return Action::None;
                }
                KeyCode::Enter => {
                    if let Some(row) = self.session.overlay().highlighted() {
                        if let Dispatch::Selected { label, .. } = self.session.interact(Target::OverlayRow(row)) {
                            self.status = format!("Sound set to {}", label);
                        }
                    }
                    return Action::None;
                }
                KeyCode::Esc => {
                    self.session.interact(Target::Elsewhere);
                    return Action::None;
                }
                _ => {}
            }
        }

        let Some(id) = self.focused() else {
            return Action::None;
        };
        let is_checkbox = self.session.form().and_then(|f| f.widget(id)).map(Widget::is_checkbox).unwrap_or(false);

        match key.code {
            KeyCode::Up => self.move_focus(-1, 0),
            KeyCode::Down => self.move_focus(1, 0),
            KeyCode::Left => self.move_focus(0, -1),
            KeyCode::Right | KeyCode::Tab => self.move_focus(0, 1),
            KeyCode::PageUp => self.move_focus(-(self.viewport_height as isize), 0),
            KeyCode::PageDown => self.move_focus(self.viewport_height as isize, 0),
            KeyCode::Enter => self.open_dropdown(id),
            KeyCode::Char(' ') if is_checkbox => {
                self.session.interact(Target::Input(id));
                if let Err(e) = self.session.toggle(id) {
                    self.status = e.to_string();
                }
            }
            KeyCode::Char(c) if !ctrl => self.type_text(id, |value| value.push(c)),
            KeyCode::Backspace => self.type_text(id, |value| {
                value.pop();
            }),
            _ => {}
        }
        Action::None
    }

    pub fn complete(&mut self, completion: Completion<D>) -> Action<D> {
        match completion {
            Completion::Loaded(Ok(document)) => {
                let has_alarms = !document.alarms().is_empty();
                if let Err(e) = self.session.replace_document(document) {
                    self.status = e.to_string();
                    return Action::None;
                }
                self.clamp_focus();
                self.status = format!("Loaded from {} (rev {})", self.device, self.session.generation());
                // Sounds may have been uploaded or deleted since the last load
                if has_alarms {
                    return Action::FetchReferences;
                }
            }
            Completion::Loaded(Err(e)) => self.status = format!("Load failed: {}", e),
            Completion::References(Ok(list)) => self.session.set_references(list),
            Completion::References(Err(e)) => self.status = format!("Sound list unavailable: {}", e),
            Completion::Saved(Ok(ack)) if ack.message.is_empty() => self.status = "Saved".to_string(),
            Completion::Saved(Ok(ack)) => self.status = format!("Saved: {}", ack.message),
            Completion::Saved(Err(e)) => self.status = format!("Save failed: {}", e),
        }
        Action::None
    }

    fn scalar_line(&self, widget: &Widget) -> Line<'static> {
        let focused = self.focused() == Some(widget.id);
        let width = if widget.is_checkbox() { CHECKBOX_WIDTH } else { SCALAR_VALUE_WIDTH };
        let mut spans = Vec::new();
        let mut cursor = 0;
        place(&mut spans, &mut cursor, 0, Span::styled(format!("{:<w$}", widget.label, w = LABEL_WIDTH), Style::default().fg(Color::Cyan)));
        place(&mut spans, &mut cursor, SCALAR_VALUE_X, Span::styled(cell_text(widget, width), cell_style(widget, focused)));
        if let Some((min, max)) = widget.range() {
            place(&mut spans, &mut cursor, SCALAR_VALUE_X + width + 1, Span::styled(format!("{}-{}", min, max), Style::default().fg(Color::DarkGray)));
        }
        Line::from(spans)
    }

    fn alarm_header(&self) -> Line<'static> {
        let mut spans = Vec::new();
        let mut cursor = 0;
        for group in AlarmGroup::ALL {
            let (x, _) = alarm_cell(group.fields()[0]);
            place(&mut spans, &mut cursor, x, Span::styled(group.title(), Style::default().fg(Color::Cyan)));
        }
        Line::from(spans)
    }

    fn render_lines(&self) -> Vec<Line<'static>> {
        let Some(form) = self.session.form() else {
            return vec![Line::from("No settings loaded yet")];
        };
        let focused = self.focused();

        let mut lines: Vec<Line> = form.scalars().iter().map(|w| self.scalar_line(w)).collect();
        if form.rows().is_empty() {
            return lines;
        }
        lines.push(Line::from(""));
        lines.push(self.alarm_header());

        for row in form.rows() {
            let mut spans = Vec::new();
            let mut cursor = 0;
            let label = if row.is_default() { "def".to_string() } else { format!("{:>3}", row.index) };
            place(&mut spans, &mut cursor, 0, Span::raw(label));
            for group in AlarmGroup::ALL {
                for (i, field) in group.fields().iter().enumerate() {
                    let widget = row.widget(*field);
                    let (x, width) = alarm_cell(*field);
                    if i == 1 {
                        if let Some(separator) = group.separator() {
                            place(&mut spans, &mut cursor, x - 1, Span::raw(separator));
                        }
                    }
                    let style = cell_style(widget, focused == Some(widget.id));
                    place(&mut spans, &mut cursor, x, Span::styled(cell_text(widget, width), style));
                }
            }
            lines.push(Line::from(spans));
        }
        lines
    }

    pub fn draw(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),  // Header
                Constraint::Min(5),     // Form
                Constraint::Length(3),  // Footer
            ])
            .split(f.size());

        let header_text = format!(
            "🕰️  {} settings | Device: {} | rev {}",
            D::DOMAIN,
            self.device,
            self.session.generation()
        );
        let header = Paragraph::new(header_text).block(Block::default().borders(Borders::ALL));
        f.render_widget(header, chunks[0]);

        let body_block = Block::default().borders(Borders::ALL).title("Settings");
        let inner = body_block.inner(chunks[1]);
        let body = Paragraph::new(self.render_lines())
            .block(body_block)
            .scroll((self.scroll_y, 0));
        f.render_widget(body, chunks[1]);

        if let Some(overlay) = self.session.overlay().overlay() {
            let top = overlay.placement.top - f64::from(self.scroll_y);
            let area = TermRect {
                x: inner.x.saturating_add(overlay.placement.left as u16),
                y: inner.y.saturating_add(top.max(0.0) as u16),
                width: overlay.placement.width as u16,
                height: (overlay.rows.len() as u16).saturating_add(2),
            }
            .intersection(inner);
            let rows: Vec<Line> = overlay
                .rows
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let style = if overlay.highlighted == Some(i) {
                        Style::default().add_modifier(Modifier::REVERSED)
                    } else {
                        Style::default()
                    };
                    Line::from(Span::styled(label.clone(), style))
                })
                .collect();
            f.render_widget(Clear, area);
            f.render_widget(Paragraph::new(rows).block(Block::default().borders(Borders::ALL)), area);
        }

        let footer_text = format!(
            "{} | ←↑↓→ move, type to edit, Space toggle, Enter sounds, Ctrl+S save, Ctrl+R reload, Ctrl+Q quit",
            self.status
        );
        let footer = Paragraph::new(footer_text).block(Block::default().borders(Borders::ALL));
        f.render_widget(footer, chunks[2]);
    }
}

/// Spawns device calls onto the runtime; results come back over the channel
struct Dispatcher<'a, D> {
    runtime: &'a Runtime,
    client: DeviceClient<HttpTransport>,
    tx: mpsc::Sender<Completion<D>>,
}

impl<'a, D: SettingsDocument + Send + Sync + 'static> Dispatcher<'a, D> {
    fn dispatch(&self, action: Action<D>) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        match action {
            Action::Reload => {
                self.runtime.spawn(async move {
                    let _ = tx.send(Completion::Loaded(client.read_settings::<D>().await));
                });
            }
            Action::FetchReferences => {
                self.runtime.spawn(async move {
                    let _ = tx.send(Completion::References(client.read_reference_list().await));
                });
            }
            Action::Save(document) => {
                self.runtime.spawn(async move {
                    let _ = tx.send(Completion::Saved(client.write_settings(&document).await));
                });
            }
            Action::None | Action::Quit => {}
        }
    }
}

fn event_loop<D: SettingsDocument + Send + Sync + 'static>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    editor: &mut Editor<D>,
    dispatcher: &Dispatcher<'_, D>,
    rx: &mpsc::Receiver<Completion<D>>,
) -> Result<()> {
    loop {
        // Completions apply in arrival order, so the last load to resolve wins
        while let Ok(completion) = rx.try_recv() {
            let action = editor.complete(completion);
            dispatcher.dispatch(action);
        }

        let size = terminal.size()?;
        editor.set_viewport_height(size.height.saturating_sub(CHROME_HEIGHT));
        terminal.draw(|f| editor.draw(f))?;

        if poll(Duration::from_millis(50))? {
            if let Event::Key(key) = read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match editor.handle_key(key) {
                    Action::Quit => return Ok(()),
                    action => dispatcher.dispatch(action),
                }
            }
        }
    }
}

pub fn run_editor<D: SettingsDocument + Send + Sync + 'static>(
    config: &ClientConfig,
    client: DeviceClient<HttpTransport>,
) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let (tx, rx) = mpsc::channel();
    let dispatcher = Dispatcher { runtime: &runtime, client, tx };
    let mut editor = Editor::<D>::new(&config.sound_label_field, &config.device_url);

    info!(domain = D::DOMAIN, device = %config.device_url, "editor started");
    dispatcher.dispatch(Action::Reload);

    // Setup terminal for TUI
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, &mut editor, &dispatcher, &rx);

    terminal.show_cursor()?;
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    info!(domain = D::DOMAIN, generation = editor.session().generation(), "editor closed");
    println!("\n👋 Editor closed. {}\n", editor.status());

    result
}
