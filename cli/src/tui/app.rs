//! TUI state and key handling.
//!
//! The app never talks to the engine directly: key presses and bridge events
//! update the state and yield [`Command`]s, which the run loop executes.

use std::collections::HashMap;

use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use kubeforward_core::{
    BridgeEvent, ForwardError, ForwardSpec, ListingEvent, ResourceKind, RowId, SessionEvent,
    SessionOutcome, SessionState,
};

/// Longest text a port field accepts.
const MAX_PORT_DIGITS: usize = 5;

const DEFAULT_NAMESPACE: &str = "default";

/// Work the run loop should hand to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RequestNamespaces,
    RequestResources(String, ResourceKind),
    Start(RowId, ForwardSpec),
    Stop(RowId),
    Remove(RowId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Namespace,
    Kind,
    Resource,
    LocalPort,
    RemotePort,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Namespace,
        Field::Kind,
        Field::Resource,
        Field::LocalPort,
        Field::RemotePort,
    ];

    fn index(self) -> usize {
        Self::ALL.iter().position(|f| *f == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// One forward row.
#[derive(Debug, Clone)]
pub struct Row {
    pub id: RowId,
    pub namespace: Option<String>,
    pub kind: ResourceKind,
    pub resource: Option<String>,
    pub local_port: String,
    pub remote_port: String,
    pub state: SessionState,
}

impl Row {
    fn new(namespace: Option<String>, kind: ResourceKind) -> Self {
        Self {
            id: RowId::new(),
            namespace,
            kind,
            resource: None,
            local_port: String::new(),
            remote_port: String::new(),
            state: SessionState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Builds a spec from the entered values.
    fn spec(&self) -> Result<ForwardSpec, ForwardError> {
        let namespace = self
            .namespace
            .clone()
            .ok_or_else(|| ForwardError::InvalidSpec("no namespace selected".to_string()))?;
        let resource = self
            .resource
            .clone()
            .ok_or_else(|| ForwardError::InvalidSpec("no resource selected".to_string()))?;
        let local = port_value("local", &self.local_port)?;
        let remote = port_value("remote", &self.remote_port)?;

        ForwardSpec::from_raw_ports(namespace, self.kind, resource, local, remote)
    }
}

fn port_value(which: &str, text: &str) -> Result<u32, ForwardError> {
    if text.is_empty() {
        return Err(ForwardError::InvalidSpec(format!("{} port is empty", which)));
    }
    text.parse()
        .map_err(|_| ForwardError::InvalidSpec(format!("{} port '{}' is not a number", which, text)))
}

pub struct App {
    pub rows: Vec<Row>,
    pub selected: usize,
    pub field: Field,
    pub namespaces: Vec<String>,
    resources: HashMap<(String, ResourceKind), Vec<String>>,
    /// One-line notification, shown until dismissed.
    pub dialog: Option<String>,
    status: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            rows: vec![Row::new(None, ResourceKind::default())],
            selected: 0,
            field: Field::Namespace,
            namespaces: Vec::new(),
            resources: HashMap::new(),
            dialog: None,
            status: None,
            should_quit: false,
        }
    }

    pub fn get_status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    pub fn show_dialog(&mut self, message: impl Into<String>) {
        let message = message.into();
        let first = message.lines().next().unwrap_or_default();
        self.dialog = Some(format!("{} {}", Local::now().format("%H:%M:%S"), first));
    }

    pub fn show_error(&mut self, error: &ForwardError) {
        self.show_dialog(error.to_string());
    }

    pub fn selected_row(&self) -> &Row {
        &self.rows[self.selected]
    }

    pub fn active_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_running()).count()
    }

    /// Names known for `namespace`/`kind`, if listed yet.
    pub fn resources_for(&self, namespace: &str, kind: ResourceKind) -> Option<&[String]> {
        self.resources
            .get(&(namespace.to_string(), kind))
            .map(Vec::as_slice)
    }

    /// Records that the engine accepted a start.
    pub fn mark_connecting(&mut self, id: RowId) {
        if let Some(row) = self.row_mut(id) {
            row.state = SessionState::Connecting;
        }
    }

    /// Overwrites a row's state with what the engine reports.
    fn row_mut(&mut self, id: RowId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|r| r.id == id)
    }

    // ========================================================================
    // Keys
    // ========================================================================

    pub fn handle_key(&mut self, key: KeyEvent) -> Vec<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return Vec::new();
        }

        if self.dialog.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char(' ')) {
                self.dialog = None;
            }
            return Vec::new();
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                Vec::new()
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.select_next();
                Vec::new()
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.select_prev();
                Vec::new()
            }
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => {
                self.field = self.field.next();
                Vec::new()
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => {
                self.field = self.field.prev();
                Vec::new()
            }
            KeyCode::Char('a') => self.add_row(),
            KeyCode::Char('d') => self.remove_row(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char(' ') => self.cycle(true),
            KeyCode::Char('[') => self.cycle(false),
            KeyCode::Char(']') => self.cycle(true),
            KeyCode::Enter | KeyCode::Char('s') => self.toggle(),
            KeyCode::Backspace => {
                self.edit_port(None);
                Vec::new()
            }
            KeyCode::Char(c) if c.is_ascii_digit() => {
                self.edit_port(Some(c));
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn select_next(&mut self) {
        if self.selected + 1 < self.rows.len() {
            self.selected += 1;
        }
    }

    fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn add_row(&mut self) -> Vec<Command> {
        let current = self.selected_row();
        let row = Row::new(current.namespace.clone(), current.kind);
        let mut commands = Vec::new();
        if let Some(namespace) = &row.namespace {
            if self.resources_for(namespace, row.kind).is_none() {
                commands.push(Command::RequestResources(namespace.clone(), row.kind));
            }
        }

        self.rows.push(row);
        self.selected = self.rows.len() - 1;
        self.fill_resources();
        commands
    }

    fn remove_row(&mut self) -> Vec<Command> {
        if self.rows.len() == 1 {
            self.show_dialog("cannot remove the last row");
            return Vec::new();
        }

        let row = self.rows.remove(self.selected);
        if self.selected >= self.rows.len() {
            self.selected = self.rows.len() - 1;
        }
        vec![Command::Remove(row.id)]
    }

    fn refresh(&mut self) -> Vec<Command> {
        self.set_status("refreshing");
        let mut commands = vec![Command::RequestNamespaces];
        let row = self.selected_row();
        if let Some(namespace) = &row.namespace {
            commands.push(Command::RequestResources(namespace.clone(), row.kind));
        }
        commands
    }

    fn toggle(&mut self) -> Vec<Command> {
        let row = self.selected_row();
        if row.is_running() {
            return vec![Command::Stop(row.id)];
        }

        match row.spec() {
            Ok(spec) => vec![Command::Start(row.id, spec)],
            Err(e) => {
                self.show_error(&e);
                Vec::new()
            }
        }
    }

    /// Moves the selected cycling field to its next (or previous) value.
    fn cycle(&mut self, forward: bool) -> Vec<Command> {
        if self.selected_row().is_running() {
            self.set_status("stop the row before editing it");
            return Vec::new();
        }

        match self.field {
            Field::Namespace => {
                let current = self.selected_row().namespace.clone();
                let Some(next) = cycle_value(&self.namespaces, current.as_deref(), forward) else {
                    self.set_status("no namespaces listed yet, press r to refresh");
                    return Vec::new();
                };
                let row = &mut self.rows[self.selected];
                row.namespace = Some(next);
                row.resource = None;
                self.after_target_change()
            }
            Field::Kind => {
                let row = &mut self.rows[self.selected];
                row.kind = if forward { row.kind.next() } else { prev_kind(row.kind) };
                row.resource = None;
                self.after_target_change()
            }
            Field::Resource => {
                let row = self.selected_row();
                let (kind, current) = (row.kind, row.resource.clone());
                let Some(namespace) = row.namespace.clone() else {
                    self.set_status("select a namespace first");
                    return Vec::new();
                };
                let names = self.resources_for(&namespace, kind).unwrap_or_default();
                match cycle_value(names, current.as_deref(), forward) {
                    Some(next) => self.rows[self.selected].resource = Some(next),
                    None => self.set_status(format!("no {} in {}", kind.list_name(), namespace)),
                }
                Vec::new()
            }
            Field::LocalPort | Field::RemotePort => Vec::new(),
        }
    }

    fn after_target_change(&mut self) -> Vec<Command> {
        let row = self.selected_row();
        let Some(namespace) = row.namespace.clone() else {
            return Vec::new();
        };
        let kind = row.kind;
        if self.resources_for(&namespace, kind).is_some() {
            self.fill_resources();
            Vec::new()
        } else {
            vec![Command::RequestResources(namespace, kind)]
        }
    }

    /// Appends a digit to, or deletes the last character of, a port field.
    fn edit_port(&mut self, digit: Option<char>) {
        if self.selected_row().is_running() {
            self.set_status("stop the row before editing it");
            return;
        }

        let field = self.field;
        let row = &mut self.rows[self.selected];
        let text = match field {
            Field::LocalPort => &mut row.local_port,
            Field::RemotePort => &mut row.remote_port,
            _ => return,
        };

        match digit {
            Some(c) if text.len() < MAX_PORT_DIGITS => text.push(c),
            Some(_) => {}
            None => {
                text.pop();
            }
        }
    }

    // ========================================================================
    // Bridge events
    // ========================================================================

    pub fn handle_bridge(&mut self, event: BridgeEvent) -> Vec<Command> {
        match event {
            BridgeEvent::Session(event) => {
                self.handle_session(event);
                Vec::new()
            }
            BridgeEvent::Listing(ListingEvent::Namespaces(result)) => self.handle_namespaces(result),
            BridgeEvent::Listing(ListingEvent::Resources {
                namespace,
                kind,
                result,
            }) => {
                match result {
                    Ok(names) => {
                        self.resources.insert((namespace, kind), names);
                        self.fill_resources();
                    }
                    Err(e) => self.show_error(&e),
                }
                Vec::new()
            }
        }
    }

    fn handle_session(&mut self, event: SessionEvent) {
        let message = event.message();
        let Some(row) = self.row_mut(event.id) else {
            // Row was removed while its session wound down
            return;
        };
        row.state = event.outcome.resulting_state();

        match event.outcome {
            SessionOutcome::Started | SessionOutcome::StoppedByUser => self.set_status(message),
            SessionOutcome::Closed | SessionOutcome::Failed(_) => self.show_dialog(message),
        }
    }

    fn handle_namespaces(&mut self, result: Result<Vec<String>, ForwardError>) -> Vec<Command> {
        let namespaces = match result {
            Ok(namespaces) => namespaces,
            Err(e) => {
                self.show_error(&e);
                return Vec::new();
            }
        };
        self.status = None;

        let fallback = namespaces
            .iter()
            .find(|n| n.as_str() == DEFAULT_NAMESPACE)
            .or_else(|| namespaces.first())
            .cloned();
        self.namespaces = namespaces;

        let mut commands = Vec::new();
        for row in &mut self.rows {
            if row.namespace.is_none() && !row.is_running() {
                row.namespace = fallback.clone();
            }
            if let Some(namespace) = &row.namespace {
                let command = Command::RequestResources(namespace.clone(), row.kind);
                if !commands.contains(&command) {
                    commands.push(command);
                }
            }
        }
        commands
    }

    /// Picks the first listed resource for idle rows that have none.
    fn fill_resources(&mut self) {
        for row in &mut self.rows {
            if row.resource.is_some() || row.is_running() {
                continue;
            }
            let Some(namespace) = &row.namespace else {
                continue;
            };
            if let Some(names) = self.resources.get(&(namespace.clone(), row.kind)) {
                row.resource = names.first().cloned();
            }
        }
    }
}

fn cycle_value(values: &[String], current: Option<&str>, forward: bool) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let len = values.len();
    let index = match current.and_then(|c| values.iter().position(|v| v == c)) {
        Some(i) if forward => (i + 1) % len,
        Some(i) => (i + len - 1) % len,
        None => 0,
    };
    Some(values[index].clone())
}

fn prev_kind(kind: ResourceKind) -> ResourceKind {
    let all = ResourceKind::ALL;
    let index = all.iter().position(|k| *k == kind).unwrap_or(0);
    all[(index + all.len() - 1) % all.len()]
}
