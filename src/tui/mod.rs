use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::{self, ApiError, ApiGateway, TypeaheadQuery};
use crate::highlight::Highlighter;
use crate::inflight::{Completion, Debounce, Dispatcher, RequestKind, RequestTracker};
use crate::provider::{ProviderSelector, SelectorState};
use crate::session::{SUBMIT_ATTEMPT_KEY, SessionStore};
use crate::viewer::{ChangeViewer, DiffLine, diff_lines, diff_stats};
use crate::wizard::{JUSTIFICATION_FIELD, Step, Wizard};
use crate::{FieldSpec, ProviderSelection, RequestFile, SubmitReceipt, TemplateDefinition, TypeaheadHit};

/// Result of a backend call, routed back to the UI loop.
#[derive(Debug)]
pub enum Payload {
    Providers(api::Result<Vec<ProviderSelection>>),
    Definition(api::Result<TemplateDefinition>),
    Typeahead {
        field: String,
        result: api::Result<Vec<TypeaheadHit>>,
    },
    Preview {
        fingerprint: String,
        result: api::Result<Vec<RequestFile>>,
    },
    Submit(api::Result<SubmitReceipt>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Dismissable message shown over the current view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub message: String,
}

/// Why the wizard closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Cancelled,
    Submitted(SubmitReceipt),
    SessionExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReviewFocus {
    Files,
    Justification,
}

/// Application state for the request wizard TUI.
pub struct App {
    wizard: Wizard,
    selector: ProviderSelector,
    tracker: RequestTracker,
    dispatcher: Dispatcher<Payload>,
    session: SessionStore,
    highlighter: Highlighter,
    field_cursor: usize,
    typeahead: Debounce,
    suggestions: Vec<TypeaheadHit>,
    suggestion_selected: usize,
    review_focus: ReviewFocus,
    selected_file: usize,
    viewer: Option<ChangeViewer>,
    scroll_offset: u16,
    validation: Option<String>,
    notification: Option<Notification>,
    last_attempt: Option<DateTime<Utc>>,
    show_help: bool,
    should_quit: bool,
    exit: Option<ExitReason>,
}

impl App {
    /// Create the wizard and start loading the configured providers.
    ///
    /// Reads the last submit attempt from the session store.
    pub fn new(gateway: Arc<dyn ApiGateway>, session: SessionStore, debounce: Duration) -> Self {
        let last_attempt = session
            .last_attempt(SUBMIT_ATTEMPT_KEY)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring unreadable session entry");
                None
            });

        let mut app = Self {
            wizard: Wizard::new(),
            selector: ProviderSelector::new(),
            tracker: RequestTracker::new(),
            dispatcher: Dispatcher::new(gateway),
            session,
            highlighter: Highlighter::new(),
            field_cursor: 0,
            typeahead: Debounce::new(debounce),
            suggestions: Vec::new(),
            suggestion_selected: 0,
            review_focus: ReviewFocus::Files,
            selected_file: 0,
            viewer: None,
            scroll_offset: 0,
            validation: None,
            notification: None,
            last_attempt,
            show_help: false,
            should_quit: false,
            exit: None,
        };
        app.load_providers();
        app
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn selector(&self) -> &ProviderSelector {
        &self.selector
    }

    pub fn viewer(&self) -> Option<&ChangeViewer> {
        self.viewer.as_ref()
    }

    pub fn suggestions(&self) -> &[TypeaheadHit] {
        &self.suggestions
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn validation_message(&self) -> Option<&str> {
        self.validation.as_deref()
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn exit_reason(&self) -> Option<&ExitReason> {
        self.exit.as_ref()
    }

    // Backend calls

    fn load_providers(&mut self) {
        self.selector.reload();
        let token = self.tracker.issue(RequestKind::Providers);
        self.dispatcher
            .spawn(token, |gw| Payload::Providers(gw.configured_providers()));
    }

    fn load_definition(&mut self) {
        let Some(selection) = self.wizard.selection() else {
            return;
        };
        let token = self.tracker.issue(RequestKind::Definition);
        self.dispatcher.spawn(token, move |gw| {
            Payload::Definition(gw.template_definition(&selection.provider, &selection.sub_type))
        });
    }

    fn request_preview(&mut self) {
        let fingerprint = self.wizard.preview_fingerprint();
        let request = self.wizard.preview_request();
        let token = self.tracker.issue(RequestKind::Preview);
        self.dispatcher.spawn(token, move |gw| Payload::Preview {
            fingerprint,
            result: gw.preview_request(&request),
        });
    }

    fn request_typeahead(&mut self, prefix: String) {
        let field = self.current_field().map(|f| f.name.clone());
        let (Some(selection), Some(field)) = (self.wizard.selection(), field) else {
            return;
        };
        if prefix.trim().is_empty() {
            self.tracker.cancel(RequestKind::Typeahead);
            self.suggestions.clear();
            return;
        }
        let query = TypeaheadQuery {
            provider: selection.provider,
            template_id: selection.sub_type,
            field,
            prefix,
        };
        let token = self.tracker.issue(RequestKind::Typeahead);
        self.dispatcher.spawn(token, move |gw| Payload::Typeahead {
            field: query.field.clone(),
            result: gw.resource_typeahead(&query),
        });
    }

    fn submit(&mut self) {
        match self.wizard.begin_submit() {
            Ok(request) => {
                let now = Utc::now();
                if let Err(e) = self.session.record_attempt(SUBMIT_ATTEMPT_KEY, now) {
                    tracing::warn!(error = %e, "could not record submit attempt");
                }
                self.last_attempt = Some(now);
                self.validation = None;
                tracing::info!(
                    provider = %request.provider,
                    sub_type = %request.sub_type,
                    files = request.files.len(),
                    "submitting request"
                );
                let token = self.tracker.issue(RequestKind::Submit);
                self.dispatcher
                    .spawn(token, move |gw| Payload::Submit(gw.submit_request(&request)));
            }
            Err(e) => self.validation = Some(e.to_string()),
        }
    }

    // Completions

    /// Apply everything that has completed so far.
    pub fn process_completions(&mut self) {
        for completion in self.dispatcher.drain() {
            self.apply_completion(completion);
        }
    }

    /// Block until no request is outstanding or `timeout` elapses.
    pub fn settle_pending(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.tracker.has_pending() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.dispatcher.recv_timeout(remaining) {
                Some(completion) => self.apply_completion(completion),
                None => break,
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion<Payload>) {
        if !self.tracker.settle(&completion.token) {
            return;
        }

        match completion.payload {
            Payload::Providers(Ok(providers)) => {
                self.selector.load(providers);
                self.selector.sync_with(&self.wizard);
            }
            Payload::Providers(Err(e)) => {
                if !self.expire_on(&e) {
                    self.selector.fail(e.to_string());
                }
            }
            Payload::Definition(Ok(definition)) => {
                if !self.wizard.set_definition(definition) {
                    tracing::debug!("definition for a previous selection ignored");
                }
                self.field_cursor = 0;
            }
            Payload::Typeahead {
                field,
                result: Ok(hits),
            } => {
                if self.current_field().is_some_and(|f| f.name == field) {
                    self.suggestions = hits;
                    self.suggestion_selected = 0;
                }
            }
            Payload::Preview {
                fingerprint,
                result: Ok(files),
            } => {
                if self.wizard.apply_preview(&fingerprint, files) {
                    // An open editor refers to the replaced files.
                    self.viewer = None;
                    self.selected_file = 0;
                    self.scroll_offset = 0;
                } else if self.wizard.current_step() == Step::ReviewAndSubmit
                    && self.wizard.needs_preview()
                {
                    self.request_preview();
                }
            }
            Payload::Submit(Ok(receipt)) => {
                tracing::info!(request_id = %receipt.request_id, "request submitted");
                self.wizard.submit_succeeded();
                if let Err(e) = self.session.clear_attempt(SUBMIT_ATTEMPT_KEY) {
                    tracing::warn!(error = %e, "could not clear submit attempt");
                }
                self.last_attempt = None;
                self.quit(ExitReason::Submitted(receipt));
            }
            Payload::Submit(Err(e)) => {
                self.wizard.submit_failed();
                self.report(e);
            }
            Payload::Definition(Err(e))
            | Payload::Typeahead { result: Err(e), .. }
            | Payload::Preview { result: Err(e), .. } => self.report(e),
        }
    }

    /// Leave for the login flow on 401. Returns whether that happened.
    fn expire_on(&mut self, error: &ApiError) -> bool {
        if error.is_session_expired() {
            tracing::warn!("session expired, leaving wizard");
            self.quit(ExitReason::SessionExpired);
            return true;
        }
        false
    }

    fn report(&mut self, error: ApiError) {
        if self.expire_on(&error) {
            return;
        }
        self.notification = Some(Notification {
            level: NoticeLevel::Error,
            message: error.to_string(),
        });
    }

    fn quit(&mut self, reason: ExitReason) {
        // Anything still in flight belongs to this instance and must not apply.
        self.tracker.next_generation();
        self.exit = Some(reason);
        self.should_quit = true;
    }

    /// Fire a debounced typeahead lookup once typing has paused.
    pub fn tick(&mut self, now: Instant) {
        if self.wizard.current_step() == Step::Configure
            && let Some(prefix) = self.typeahead.poll(now)
        {
            self.request_typeahead(prefix);
        }
    }

    // Navigation

    fn on_enter_step(&mut self) {
        self.viewer = None;
        self.scroll_offset = 0;
        match self.wizard.current_step() {
            Step::SelectProvider => self.selector.sync_with(&self.wizard),
            Step::Configure => {
                if self.wizard.definition().is_none() {
                    self.load_definition();
                }
                self.reset_field_input();
            }
            Step::ReviewAndSubmit => {
                self.review_focus = ReviewFocus::Files;
                if self.wizard.needs_preview() {
                    self.request_preview();
                }
            }
        }
    }

    fn advance(&mut self) {
        match self.wizard.advance() {
            Ok(_) => {
                self.validation = None;
                self.on_enter_step();
            }
            Err(e) => self.validation = Some(e.to_string()),
        }
    }

    fn back(&mut self) {
        self.validation = None;
        self.wizard.back();
        self.on_enter_step();
    }

    fn jump_to(&mut self, step: Step) {
        match self.wizard.go_to(step) {
            Ok(()) => {
                self.validation = None;
                self.on_enter_step();
            }
            Err(e) => self.validation = Some(e.to_string()),
        }
    }

    fn current_field(&self) -> Option<&FieldSpec> {
        self.wizard
            .definition()
            .and_then(|d| d.fields.get(self.field_cursor))
    }

    fn reset_field_input(&mut self) {
        self.typeahead.reset();
        self.suggestions.clear();
        self.suggestion_selected = 0;
        self.tracker.cancel(RequestKind::Typeahead);
    }

    fn move_field(&mut self, forward: bool) {
        let count = self.wizard.definition().map_or(0, |d| d.fields.len());
        if count == 0 {
            return;
        }
        self.field_cursor = if forward {
            (self.field_cursor + 1).min(count - 1)
        } else {
            self.field_cursor.saturating_sub(1)
        };
        self.reset_field_input();
    }

    fn edit_field(&mut self, edit: impl FnOnce(&mut String)) {
        let Some(field) = self.current_field().cloned() else {
            return;
        };
        let mut value = self.wizard.text(&field.name).to_string();
        edit(&mut value);
        self.wizard.set_text(&field.name, value.clone());
        if field.typeahead {
            self.typeahead.input(value, Instant::now());
        }
    }

    fn accept_suggestion(&mut self) -> bool {
        let Some(hit) = self.suggestions.get(self.suggestion_selected).cloned() else {
            return false;
        };
        if let Some(field) = self.current_field().cloned() {
            self.wizard.set_text(&field.name, hit.value);
        }
        self.reset_field_input();
        true
    }

    fn open_viewer(&mut self, read_only: bool) {
        if self.wizard.needs_preview() {
            return;
        }
        if let Some(file) = self.wizard.files().get(self.selected_file) {
            self.viewer = Some(ChangeViewer::new(file.clone(), read_only || self.wizard.is_submitting()));
            self.scroll_offset = 0;
        }
    }

    // Input

    /// Handle one key press, dispatching on overlay, editor and step.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit(ExitReason::Cancelled);
            return;
        }

        if self.show_help {
            // Any key closes help
            self.show_help = false;
            return;
        }

        if self.notification.is_some() && key.code == KeyCode::Esc {
            self.notification = None;
            return;
        }

        if let Some(step) = step_for_key(key.code) {
            self.jump_to(step);
            return;
        }

        if self.viewer.is_some() {
            self.handle_viewer_input(key);
            return;
        }

        match self.wizard.current_step() {
            Step::SelectProvider => self.handle_select_input(key),
            Step::Configure => self.handle_configure_input(key),
            Step::ReviewAndSubmit => match self.review_focus {
                ReviewFocus::Files => self.handle_review_input(key),
                ReviewFocus::Justification => self.handle_justification_input(key),
            },
        }
    }

    fn handle_select_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(ExitReason::Cancelled),
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('j') | KeyCode::Down => self.selector.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.selector.select_prev(),
            KeyCode::Char('r') => self.load_providers(),
            KeyCode::Enter => {
                self.selector.choose(&mut self.wizard);
                self.advance();
            }
            _ => {}
        }
    }

    fn handle_configure_input(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.back(),
            KeyCode::Enter => self.advance(),
            KeyCode::Up | KeyCode::BackTab => self.move_field(false),
            KeyCode::Down => self.move_field(true),
            KeyCode::Tab => {
                if !self.accept_suggestion() {
                    self.move_field(true);
                }
            }
            KeyCode::Char('n') if ctrl => {
                if self.suggestion_selected + 1 < self.suggestions.len() {
                    self.suggestion_selected += 1;
                }
            }
            KeyCode::Char('p') if ctrl => {
                self.suggestion_selected = self.suggestion_selected.saturating_sub(1);
            }
            KeyCode::Backspace => self.edit_field(|v| {
                v.pop();
            }),
            KeyCode::Char(c) if !ctrl => self.edit_field(|v| v.push(c)),
            _ => {}
        }
    }

    fn handle_review_input(&mut self, key: KeyEvent) {
        let file_count = self.wizard.files().len();
        match key.code {
            KeyCode::Char('q') => self.quit(ExitReason::Cancelled),
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Esc => self.back(),
            KeyCode::Char('j') | KeyCode::Down => {
                if file_count > 0 && self.selected_file < file_count - 1 {
                    self.selected_file += 1;
                    self.scroll_offset = 0;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if self.selected_file > 0 {
                    self.selected_file -= 1;
                    self.scroll_offset = 0;
                }
            }
            KeyCode::Enter | KeyCode::Char('e') => self.open_viewer(false),
            KeyCode::Char('v') => self.open_viewer(true),
            KeyCode::Tab => self.review_focus = ReviewFocus::Justification,
            KeyCode::Char('S') => self.submit(),
            KeyCode::Char('R') => self.request_preview(),
            KeyCode::PageDown => self.scroll_offset = self.scroll_offset.saturating_add(20),
            KeyCode::PageUp => self.scroll_offset = self.scroll_offset.saturating_sub(20),
            _ => {}
        }
    }

    fn handle_justification_input(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Esc => self.review_focus = ReviewFocus::Files,
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                let mut text = self.wizard.text(JUSTIFICATION_FIELD).to_string();
                text.pop();
                self.wizard.set_text(JUSTIFICATION_FIELD, text);
            }
            KeyCode::Char(c) if !ctrl => {
                let mut text = self.wizard.text(JUSTIFICATION_FIELD).to_string();
                text.push(c);
                self.wizard.set_text(JUSTIFICATION_FIELD, text);
            }
            _ => {}
        }
    }

    fn handle_viewer_input(&mut self, key: KeyEvent) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.viewer = None,
            KeyCode::Char('s') if ctrl => {
                if let Some(updated) = viewer.modify() {
                    let path = updated.file_path.clone();
                    self.notification = Some(if self.wizard.handle_modify_change(updated) {
                        Notification {
                            level: NoticeLevel::Info,
                            message: format!("Updated {}", path),
                        }
                    } else {
                        tracing::warn!(file = %path, "edited file is no longer part of the request");
                        Notification {
                            level: NoticeLevel::Error,
                            message: format!("{} is no longer part of this request", path),
                        }
                    });
                }
            }
            KeyCode::Char('r') if ctrl => viewer.revert(),
            KeyCode::Left => viewer.move_left(),
            KeyCode::Right => viewer.move_right(),
            KeyCode::Up => viewer.move_up(),
            KeyCode::Down => viewer.move_down(),
            KeyCode::Home => viewer.move_home(),
            KeyCode::End => viewer.move_end(),
            KeyCode::Backspace => viewer.backspace(),
            KeyCode::Delete => viewer.delete(),
            KeyCode::Enter => viewer.insert_newline(),
            KeyCode::PageDown => self.scroll_offset = self.scroll_offset.saturating_add(20),
            KeyCode::PageUp => self.scroll_offset = self.scroll_offset.saturating_sub(20),
            KeyCode::Char(c) if !ctrl => viewer.insert_char(c),
            _ => {}
        }
    }

    // Rendering

    /// Render the UI, dispatching to the step or editor renderer.
    pub fn render(&self, frame: &mut Frame) {
        if self.show_help {
            self.render_help(frame);
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(1), Constraint::Length(3)])
            .split(frame.area());

        self.render_steps(frame, chunks[0]);
        match (&self.viewer, self.wizard.current_step()) {
            (Some(viewer), _) => self.render_viewer(frame, chunks[1], viewer),
            (None, Step::SelectProvider) => self.render_select(frame, chunks[1]),
            (None, Step::Configure) => self.render_configure(frame, chunks[1]),
            (None, Step::ReviewAndSubmit) => self.render_review(frame, chunks[1]),
        }
        self.render_footer(frame, chunks[2]);

        if self.notification.is_some() {
            self.render_notification(frame);
        }
    }

    fn render_steps(&self, frame: &mut Frame, area: Rect) {
        let titles: Vec<Line> = Step::ALL
            .iter()
            .map(|step| Line::from(format!("F{} {}", step.index() + 1, step.title())))
            .collect();
        let tabs = Tabs::new(titles)
            .select(self.wizard.current_step().index())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("New self-service request"),
            )
            .highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    fn render_select(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Provider");
        match self.selector.state() {
            SelectorState::Loading => {
                frame.render_widget(
                    Paragraph::new("Loading configured providers...").block(block),
                    area,
                );
            }
            SelectorState::Empty => {
                let text = vec![
                    Line::from("No providers are configured."),
                    Line::from(""),
                    Line::from("Connect an integration in Noq, then press r to refresh."),
                ];
                frame.render_widget(Paragraph::new(text).block(block), area);
            }
            SelectorState::Failed(message) => {
                let text = vec![
                    Line::from(Span::styled(
                        message.clone(),
                        Style::default().fg(Color::Red),
                    )),
                    Line::from(""),
                    Line::from("Press r to retry."),
                ];
                frame.render_widget(
                    Paragraph::new(text).block(block).wrap(Wrap { trim: false }),
                    area,
                );
            }
            SelectorState::Ready(cards) => {
                let items: Vec<ListItem> = cards
                    .iter()
                    .enumerate()
                    .map(|(idx, card)| {
                        let is_selected = idx == self.selector.selected;
                        let prefix = if is_selected { ">" } else { " " };
                        let style = if is_selected {
                            Style::default()
                                .fg(Color::Yellow)
                                .add_modifier(Modifier::BOLD)
                        } else {
                            Style::default()
                        };
                        ListItem::new(format!("{} {:<12} {}", prefix, card.provider, card.sub_type))
                            .style(style)
                    })
                    .collect();
                frame.render_widget(List::new(items).block(block), area);
            }
        }
    }

    fn render_configure(&self, frame: &mut Frame, area: Rect) {
        let Some(definition) = self.wizard.definition() else {
            let what = self
                .wizard
                .selection()
                .map(|s| s.to_string())
                .unwrap_or_default();
            frame.render_widget(
                Paragraph::new(format!("Loading template definition for {}...", what))
                    .block(Block::default().borders(Borders::ALL).title("Configure")),
                area,
            );
            return;
        };

        let (fields_area, suggestions_area) = if self.suggestions.is_empty() {
            (area, None)
        } else {
            let height = (self.suggestions.len() as u16 + 2).min(8);
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(1), Constraint::Length(height)])
                .split(area);
            (chunks[0], Some(chunks[1]))
        };

        let items: Vec<ListItem> = definition
            .fields
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let is_selected = idx == self.field_cursor;
                let marker = if is_selected { ">" } else { " " };
                let required = if field.required { "*" } else { "" };
                let value = self.wizard.text(&field.name);
                let mut lines = vec![Line::from(format!(
                    "{} {}{}: {}",
                    marker,
                    field.display_label(),
                    required,
                    value
                ))];
                if let Some(desc) = &field.description {
                    lines.push(Line::from(Span::styled(
                        format!("    {}", desc),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
                let style = if is_selected {
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                ListItem::new(Text::from(lines)).style(style)
            })
            .collect();

        let title = definition
            .name
            .clone()
            .unwrap_or_else(|| definition.template_id.clone());
        frame.render_widget(
            List::new(items).block(Block::default().borders(Borders::ALL).title(title)),
            fields_area,
        );

        if let Some(area) = suggestions_area {
            let items: Vec<ListItem> = self
                .suggestions
                .iter()
                .enumerate()
                .map(|(idx, hit)| {
                    let style = if idx == self.suggestion_selected {
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                    } else {
                        Style::default()
                    };
                    ListItem::new(hit.label.clone()).style(style)
                })
                .collect();
            frame.render_widget(
                List::new(items).block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("Suggestions (Ctrl+n/Ctrl+p, Tab to accept)"),
                ),
                area,
            );
        }
    }

    fn render_review(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(3)])
            .split(area);
        let main_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
            .split(chunks[0]);

        let files = self.wizard.files();
        if files.is_empty() || self.wizard.needs_preview() {
            let message = if self.tracker.is_pending(RequestKind::Preview) {
                "Generating request preview..."
            } else if files.is_empty() {
                "No changes. Press R to regenerate the preview."
            } else {
                "The preview is out of date. Press R to regenerate it."
            };
            frame.render_widget(
                Paragraph::new(message).block(Block::default().borders(Borders::ALL).title("Changes")),
                chunks[0],
            );
        } else {
            let items: Vec<ListItem> = files
                .iter()
                .enumerate()
                .map(|(idx, file)| {
                    let style = if idx == self.selected_file {
                        Style::default()
                            .fg(Color::Yellow)
                            .add_modifier(Modifier::BOLD)
                    } else {
                        Style::default()
                    };
                    ListItem::new(format!("{} (+{})", file.file_path, file.additions)).style(style)
                })
                .collect();
            let list_block = Block::default().borders(Borders::ALL).title("Files");
            frame.render_widget(List::new(items).block(list_block), main_chunks[0]);

            if let Some(file) = files.get(self.selected_file) {
                let mut title = "Diff (Enter edit, v view)".to_string();
                if let Some(repo) = &file.repo_name {
                    title = format!("{} | {}/{}", title, repo, file.file_path);
                }
                let lines = diff_lines(&file.previous_body, &file.template_body);
                self.render_diff(frame, main_chunks[1], file.extension(), &lines, title);
            }
        }

        let focused = self.review_focus == ReviewFocus::Justification;
        let mut title = "Justification (Tab)".to_string();
        if let Some(at) = self.last_attempt {
            title = format!(
                "{} | last submit attempt {}",
                title,
                at.with_timezone(&Local).format("%H:%M:%S")
            );
        }
        let border_style = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let justification = self.wizard.text(JUSTIFICATION_FIELD);
        frame.render_widget(
            Paragraph::new(justification.to_string()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(title),
            ),
            chunks[1],
        );
        if focused {
            frame.set_cursor_position(cursor_in(chunks[1], justification.chars().count(), 0));
        }
    }

    fn render_diff(&self, frame: &mut Frame, area: Rect, ext: &str, diff: &[DiffLine], title: String) {
        let mut fh = self.highlighter.for_file(ext);
        let lines: Vec<Line> = diff
            .iter()
            .map(|line| Line::from(fh.highlight_diff_line(line)))
            .collect();

        let paragraph = Paragraph::new(Text::from(lines))
            .block(Block::default().borders(Borders::ALL).title(title))
            .scroll((self.scroll_offset, 0));
        frame.render_widget(paragraph, area);
    }

    fn render_viewer(&self, frame: &mut Frame, area: Rect, viewer: &ChangeViewer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);

        let file = viewer.file();
        let diff = viewer.diff();
        let mut title = format!(
            "{} (+{})",
            viewer.source_link().unwrap_or_else(|| file.file_path.clone()),
            diff_stats(&diff).added
        );
        if viewer.has_changed() {
            title.push_str(" [changed]");
        }
        self.render_diff(frame, chunks[0], file.extension(), &diff, title);

        let title = if viewer.shows_modify_control() {
            "Template (Ctrl+S modify, Ctrl+R revert, Esc close)"
        } else {
            "Template (read-only, Esc close)"
        };

        let (row, col) = viewer.cursor_position();
        let visible_rows = chunks[1].height.saturating_sub(2).max(1) as usize;
        let top = row.saturating_sub(visible_rows - 1);

        let mut fh = self.highlighter.for_file(file.extension());
        let lines: Vec<Line> = viewer
            .modified_template()
            .split('\n')
            .map(|line| Line::from(fh.highlight_plain(line)))
            .collect();
        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .block(Block::default().borders(Borders::ALL).title(title))
                .scroll((top as u16, 0)),
            chunks[1],
        );

        if viewer.shows_modify_control() {
            frame.set_cursor_position(cursor_in(chunks[1], col, row - top));
        }
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let (text, style) = if let Some(message) = &self.validation {
            (message.clone(), Style::default().fg(Color::Red))
        } else if self.wizard.is_submitting() {
            ("Submitting request...".to_string(), Style::default().fg(Color::Cyan))
        } else {
            let hints = match (&self.viewer, self.wizard.current_step()) {
                (Some(viewer), _) if viewer.read_only() => "PgUp/PgDn: scroll  Esc: close",
                (Some(_), _) => "arrows: move  Ctrl+S: modify  Ctrl+R: revert  Esc: close",
                (None, Step::SelectProvider) => {
                    "j/k: choose  Enter: continue  r: refresh  ?: help  q: quit"
                }
                (None, Step::Configure) => {
                    "Up/Down: field  type to edit  Enter: continue  Esc: back  F1: restart"
                }
                (None, Step::ReviewAndSubmit) => {
                    "j/k: file  Enter: edit  Tab: justification  S: submit  Esc: back  ?: help"
                }
            };
            (hints.to_string(), Style::default())
        };

        let paragraph = Paragraph::new(text)
            .style(style)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_notification(&self, frame: &mut Frame) {
        let Some(notification) = &self.notification else {
            return;
        };
        let (title, color) = match notification.level {
            NoticeLevel::Info => ("Notice", Color::Green),
            NoticeLevel::Error => ("Error", Color::Red),
        };
        let paragraph = Paragraph::new(format!("{}\n\nEsc to dismiss", notification.message))
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(color));

        let area = centered_rect(60, 30, frame.area());
        frame.render_widget(Clear, area);
        frame.render_widget(paragraph, area);
    }

    fn render_help(&self, frame: &mut Frame) {
        let help_text = vec![
            "Noq Request - Keyboard Shortcuts",
            "",
            "Steps:",
            "  F1 / F2 / F3  - Jump back to a completed step",
            "  Enter         - Continue to the next step",
            "  Esc           - Previous step (or dismiss a notification)",
            "",
            "Select provider:",
            "  j / k         - Move between providers",
            "  r             - Refresh the provider list",
            "",
            "Configure:",
            "  Up / Down     - Move between fields",
            "  Ctrl+n/Ctrl+p - Move between suggestions",
            "  Tab           - Accept suggestion",
            "",
            "Review & submit:",
            "  Enter / e     - Edit the selected file",
            "  v             - View the selected file (read-only)",
            "  Tab           - Edit the justification",
            "  S (Shift+S)   - Submit the request",
            "  R (Shift+R)   - Regenerate the preview",
            "",
            "Editor:",
            "  Ctrl+S        - Modify (keep the edited template)",
            "  Ctrl+R        - Revert local edits",
            "",
            "  Ctrl+C        - Quit",
            "",
            "Press any key to close this help",
        ];

        let text = Text::from(help_text.iter().map(|&s| Line::from(s)).collect::<Vec<_>>());
        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Help"))
            .wrap(Wrap { trim: false });

        let area = centered_rect(60, 80, frame.area());
        frame.render_widget(paragraph, area);
    }
}

/// Cursor position inside a bordered pane, clamped to its inner area.
fn cursor_in(area: Rect, col: usize, row: usize) -> Position {
    let offset = |n: usize| u16::try_from(n).unwrap_or(u16::MAX);
    let x = area
        .x
        .saturating_add(1)
        .saturating_add(offset(col))
        .min(area.right().saturating_sub(2));
    let y = area
        .y
        .saturating_add(1)
        .saturating_add(offset(row))
        .min(area.bottom().saturating_sub(2));
    Position::new(x, y)
}

fn step_for_key(code: KeyCode) -> Option<Step> {
    match code {
        KeyCode::F(n @ 1..=3) => Step::ALL.get(n as usize - 1).copied(),
        _ => None,
    }
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("Failed to create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Run the wizard until the user quits, submits, or the session expires.
pub fn run_tui(mut app: App) -> Result<ExitReason> {
    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;

    let result = (|| -> Result<()> {
        loop {
            terminal
                .draw(|f| app.render(f))
                .context("Failed to draw frame")?;

            if app.should_quit() {
                break;
            }

            if event::poll(Duration::from_millis(100)).context("Failed to poll events")?
                && let Event::Key(key) = event::read().context("Failed to read event")?
                && key.kind == event::KeyEventKind::Press
            {
                app.handle_key(key);
            }

            app.process_completions();
            app.tick(Instant::now());
        }
        Ok(())
    })();

    // Restore terminal in all cases
    restore_terminal(&mut terminal)?;

    result?;
    Ok(app.exit.take().unwrap_or(ExitReason::Cancelled))
}
