use crate::api_client::{KitsuClient, Project};
use crate::config::config::Config;
use crate::export::{run_export, ExportEvent};
use crate::logging::LogRingBuffer;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::backend::Backend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tracing::{error, info, warn};
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

/// Which screen is on top.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Screen {
    Login,
    Projects,
    Export,
}

/// Focusable controls on the login screen, in Tab order.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LoginField {
    Host,
    Email,
    Password,
    Remember,
    SkipSsl,
}

impl LoginField {
    fn next(self) -> Self {
        match self {
            LoginField::Host => LoginField::Email,
            LoginField::Email => LoginField::Password,
            LoginField::Password => LoginField::Remember,
            LoginField::Remember => LoginField::SkipSsl,
            LoginField::SkipSsl => LoginField::Host,
        }
    }

    fn prev(self) -> Self {
        match self {
            LoginField::Host => LoginField::SkipSsl,
            LoginField::Email => LoginField::Host,
            LoginField::Password => LoginField::Email,
            LoginField::Remember => LoginField::Password,
            LoginField::SkipSsl => LoginField::Remember,
        }
    }
}

/// The exporter TUI: login, project selection, export trigger.
pub struct ExporterApp {
    config: Config,
    client: Option<KitsuClient>,
    screen: Screen,
    should_quit: bool,

    // Login screen state
    host_input: Input,
    email_input: Input,
    password_input: Input,
    remember: bool,
    skip_ssl_verify: bool,
    focus: LoginField,
    login_error: Option<String>,

    // Project screen state
    projects: Vec<Project>,
    project_state: ListState,

    // Export screen state
    selected_project: Option<Project>,
    status: String,
    notification: Option<String>,
    export_running: bool,
    export_rx: Option<Receiver<ExportEvent>>,

    log_buffer: Option<LogRingBuffer>,
}

impl ExporterApp {
    pub fn new(config: Config, log_buffer: Option<LogRingBuffer>) -> Self {
        let remember = config.connection.remember;
        let skip_ssl_verify = config.connection.skip_ssl_verify;
        Self {
            host_input: Input::new(config.connection.host.clone()),
            email_input: Input::new(config.connection.email.clone()),
            password_input: Input::new(config.connection.password.clone()),
            remember,
            skip_ssl_verify,
            focus: LoginField::Host,
            login_error: None,
            projects: Vec::new(),
            project_state: ListState::default(),
            selected_project: None,
            status: String::new(),
            notification: None,
            export_running: false,
            export_rx: None,
            client: None,
            screen: Screen::Login,
            should_quit: false,
            config,
            log_buffer,
        }
    }

    /// Main run loop
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        // A complete saved config logs in without user interaction.
        if self.config.has_saved_login() {
            self.perform_login();
        }

        loop {
            self.poll_worker();

            terminal.draw(|f| self.draw(f))?;

            if event::poll(std::time::Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key_event(key);
                }
            }

            if self.should_quit {
                break;
            }
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        // Global quit
        if matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c'))
            && key.modifiers.contains(KeyModifiers::CONTROL)
        {
            self.should_quit = true;
            return;
        }

        match self.screen {
            Screen::Login => self.handle_login_key(key),
            Screen::Projects => self.handle_projects_key(key),
            Screen::Export => self.handle_export_key(key),
        }
    }

    // ---- Login screen ----

    fn handle_login_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab | KeyCode::Down => self.focus = self.focus.next(),
            KeyCode::BackTab | KeyCode::Up => self.focus = self.focus.prev(),
            KeyCode::Enter => self.perform_login(),
            KeyCode::Char(' ') if self.focus == LoginField::Remember => {
                self.remember = !self.remember;
            }
            KeyCode::Char(' ') if self.focus == LoginField::SkipSsl => {
                self.skip_ssl_verify = !self.skip_ssl_verify;
            }
            _ => {
                let event = Event::Key(key);
                match self.focus {
                    LoginField::Host => {
                        self.host_input.handle_event(&event);
                    }
                    LoginField::Email => {
                        self.email_input.handle_event(&event);
                    }
                    LoginField::Password => {
                        self.password_input.handle_event(&event);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Empty-field check before any network call.
    fn validate_login_inputs(&self) -> Result<(), String> {
        if self.host_input.value().trim().is_empty()
            || self.email_input.value().trim().is_empty()
            || self.password_input.value().is_empty()
        {
            return Err("Host, email and password are all required".to_string());
        }
        Ok(())
    }

    /// Automatic or button-triggered login, then project loading.
    fn perform_login(&mut self) {
        if let Err(msg) = self.validate_login_inputs() {
            self.login_error = Some(msg);
            return;
        }

        let host = self.host_input.value().trim().to_string();
        let email = self.email_input.value().trim().to_string();
        let password = self.password_input.value().to_string();

        let mut client = match KitsuClient::new(&host, self.skip_ssl_verify) {
            Ok(client) => client,
            Err(e) => {
                self.login_error = Some(e.to_string());
                return;
            }
        };

        if let Err(e) = client.login(&email, &password) {
            warn!(target: "ui", "login failed: {}", e);
            self.login_error = Some(format!("Login failed: {}", e));
            return;
        }

        info!(target: "ui", "login succeeded for {}", email);
        self.login_error = None;

        self.config.connection.host = host;
        self.config.connection.remember = self.remember;
        self.config.connection.skip_ssl_verify = self.skip_ssl_verify;
        let save_result = if self.remember {
            self.config.connection.email = email;
            self.config.connection.password = password;
            self.config.save()
        } else {
            self.config.clear_credentials()
        };
        if let Err(e) = save_result {
            warn!(target: "ui", "could not persist config: {}", e);
        }

        match client.get_projects() {
            Ok(projects) => {
                info!(target: "ui", "loaded {} projects", projects.len());
                self.projects = projects;
                self.project_state
                    .select(if self.projects.is_empty() { None } else { Some(0) });
                self.client = Some(client);
                self.screen = Screen::Projects;
            }
            Err(e) => {
                error!(target: "ui", "project listing failed: {}", e);
                self.login_error = Some(format!("Could not list projects: {}", e));
            }
        }
    }

    // ---- Project screen ----

    fn handle_projects_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.select_project_offset(-1),
            KeyCode::Down | KeyCode::Char('j') => self.select_project_offset(1),
            KeyCode::Enter => {
                if let Some(index) = self.project_state.selected() {
                    if let Some(project) = self.projects.get(index) {
                        self.selected_project = Some(project.clone());
                        self.status = "Ready".to_string();
                        self.notification = None;
                        self.screen = Screen::Export;
                    }
                }
            }
            KeyCode::Char('l') => self.logout(),
            KeyCode::Esc => self.should_quit = true,
            _ => {}
        }
    }

    fn select_project_offset(&mut self, offset: isize) {
        if self.projects.is_empty() {
            return;
        }
        let current = self.project_state.selected().unwrap_or(0) as isize;
        let last = self.projects.len() as isize - 1;
        let next = (current + offset).clamp(0, last);
        self.project_state.select(Some(next as usize));
    }

    /// Drop the session and saved credentials, back to the login screen.
    fn logout(&mut self) {
        if let Err(e) = self.config.clear_credentials() {
            warn!(target: "ui", "could not clear credentials: {}", e);
        }
        self.email_input = Input::new(String::new());
        self.password_input = Input::new(String::new());
        self.client = None;
        self.projects.clear();
        self.project_state.select(None);
        self.login_error = None;
        self.notification = Some("Logged out and credentials cleared".to_string());
        self.screen = Screen::Login;
        info!(target: "ui", "logged out");
    }

    // ---- Export screen ----

    fn handle_export_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Char('s') => self.start_export(),
            KeyCode::Esc if !self.export_running => {
                self.screen = Screen::Projects;
                self.notification = None;
            }
            _ => {}
        }
    }

    /// Spawn the worker thread. The trigger stays disabled until the
    /// worker reports Done or Failed, so only one job runs at a time.
    fn start_export(&mut self) {
        if self.export_running {
            return;
        }
        let (Some(client), Some(project)) = (self.client.clone(), self.selected_project.clone())
        else {
            return;
        };

        let (tx, rx) = mpsc::channel();
        let config = self.config.clone();
        self.export_rx = Some(rx);
        self.export_running = true;
        self.status = "Starting export...".to_string();
        self.notification = None;

        thread::spawn(move || {
            let result = run_export(&client, &project, &config, &tx);
            let _ = tx.send(match result {
                Ok(path) => ExportEvent::Done(path),
                Err(e) => ExportEvent::Failed(e.to_string()),
            });
        });
    }

    /// Drain worker events; called once per tick.
    fn poll_worker(&mut self) {
        let events: Vec<ExportEvent> = match &self.export_rx {
            Some(rx) => rx.try_iter().collect(),
            None => return,
        };
        for event in events {
            self.handle_export_event(event);
        }
    }

    fn handle_export_event(&mut self, event: ExportEvent) {
        match event {
            ExportEvent::Progress(message) => self.status = message,
            ExportEvent::Done(path) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                self.status = format!("Export completed: {}", file_name);
                self.notification = Some(format!("Saved to {}", path.display()));
                self.export_running = false;
                self.export_rx = None;
            }
            ExportEvent::Failed(message) => {
                error!(target: "ui", "export failed: {}", message);
                self.status = "Export failed".to_string();
                self.notification = Some(format!("Export failed: {}", message));
                self.export_running = false;
                self.export_rx = None;
            }
        }
    }

    // ---- Drawing ----

    fn draw(&mut self, f: &mut Frame) {
        match self.screen {
            Screen::Login => self.draw_login(f),
            Screen::Projects => self.draw_projects(f),
            Screen::Export => self.draw_export(f),
        }
    }

    /// Centered form area via nested layout splits.
    fn centered_area(f: &Frame, height: u16) -> Rect {
        let area = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(height),
                Constraint::Min(1),
            ])
            .split(f.area())[1];

        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(20),
                Constraint::Percentage(60),
                Constraint::Percentage(20),
            ])
            .split(area)[1]
    }

    fn field_block(title: &str, focused: bool) -> Block<'_> {
        let style = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Block::default().borders(Borders::ALL).title(title).style(style)
    }

    fn checkbox_line(label: &str, checked: bool, focused: bool) -> Line<'_> {
        let marker = if checked { "[x] " } else { "[ ] " };
        let style = if focused {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Line::from(vec![Span::styled(format!("{}{}", marker, label), style)])
    }

    fn draw_login(&self, f: &mut Frame) {
        let area = Self::centered_area(f, 17);
        f.render_widget(Clear, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // title
                Constraint::Length(3), // host
                Constraint::Length(3), // email
                Constraint::Length(3), // password
                Constraint::Length(1), // remember
                Constraint::Length(1), // skip ssl
                Constraint::Length(1), // spacer
                Constraint::Length(1), // error
                Constraint::Length(1), // help
            ])
            .split(area);

        let title = Paragraph::new("Kitsu Login")
            .style(Style::default().add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center);
        f.render_widget(title, chunks[0]);

        let host = Paragraph::new(self.host_input.value()).block(Self::field_block(
            "Server URL (e.g. kitsu.example.com)",
            self.focus == LoginField::Host,
        ));
        f.render_widget(host, chunks[1]);

        let email = Paragraph::new(self.email_input.value()).block(Self::field_block(
            "Email",
            self.focus == LoginField::Email,
        ));
        f.render_widget(email, chunks[2]);

        let masked = "•".repeat(self.password_input.value().chars().count());
        let password = Paragraph::new(masked).block(Self::field_block(
            "Password",
            self.focus == LoginField::Password,
        ));
        f.render_widget(password, chunks[3]);

        f.render_widget(
            Paragraph::new(Self::checkbox_line(
                "Remember me",
                self.remember,
                self.focus == LoginField::Remember,
            )),
            chunks[4],
        );
        f.render_widget(
            Paragraph::new(Self::checkbox_line(
                "Skip SSL verification",
                self.skip_ssl_verify,
                self.focus == LoginField::SkipSsl,
            )),
            chunks[5],
        );

        if let Some(message) = &self.login_error {
            let error = Paragraph::new(message.as_str())
                .style(Style::default().fg(Color::Red))
                .wrap(Wrap { trim: true });
            f.render_widget(error, chunks[7]);
        } else if let Some(message) = &self.notification {
            let note = Paragraph::new(message.as_str()).style(Style::default().fg(Color::Green));
            f.render_widget(note, chunks[7]);
        }

        let help = Paragraph::new("Tab: Next field | Space: Toggle | Enter: Login | Esc: Quit")
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(help, chunks[8]);
    }

    fn draw_projects(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),    // project list
                Constraint::Length(1), // help line
            ])
            .split(f.area());

        let items: Vec<ListItem> = self
            .projects
            .iter()
            .map(|p| ListItem::new(p.name.as_str()))
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Select Project"))
            .highlight_style(
                Style::default()
                    .fg(Color::White)
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");
        f.render_stateful_widget(list, chunks[0], &mut self.project_state);

        let help = Paragraph::new("↑↓: Navigate | Enter: Select | l: Logout | Esc: Quit")
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(help, chunks[1]);
    }

    fn draw_export(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // project header
                Constraint::Length(3), // status
                Constraint::Length(3), // start control
                Constraint::Length(1), // notification
                Constraint::Min(3),    // log pane
                Constraint::Length(1), // help line
            ])
            .split(f.area());

        let project_name = self
            .selected_project
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("?");
        let header = Paragraph::new(format!("Exporting: {}", project_name))
            .style(Style::default().add_modifier(Modifier::BOLD))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(header, chunks[0]);

        let status = Paragraph::new(self.status.as_str())
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[1]);

        // The trigger greys out while the worker is busy.
        let (label, style) = if self.export_running {
            (
                "Exporting...",
                Style::default().fg(Color::DarkGray),
            )
        } else {
            (
                "Start Export (Enter)",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )
        };
        let start = Paragraph::new(label)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).style(style));
        f.render_widget(start, chunks[2]);

        if let Some(message) = &self.notification {
            let note = Paragraph::new(message.as_str()).style(Style::default().fg(Color::Green));
            f.render_widget(note, chunks[3]);
        }

        let log_lines: Vec<Line> = match &self.log_buffer {
            Some(buffer) => buffer
                .get_recent(chunks[4].height.saturating_sub(2) as usize)
                .iter()
                .map(|entry| Line::from(entry.format_for_display()))
                .collect(),
            None => Vec::new(),
        };
        let logs = Paragraph::new(log_lines)
            .block(Block::default().borders(Borders::ALL).title("Log"))
            .style(Style::default().fg(Color::Gray));
        f.render_widget(logs, chunks[4]);

        let help_text = if self.export_running {
            "Export in progress..."
        } else {
            "Enter: Start Export | Esc: Back to projects"
        };
        let help = Paragraph::new(help_text).style(Style::default().fg(Color::DarkGray));
        f.render_widget(help, chunks[5]);
    }
}

/// Create and run the exporter TUI.
pub fn run_tui(config: Config, log_buffer: Option<LogRingBuffer>) -> io::Result<()> {
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;

    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = ExporterApp::new(config, log_buffer);
    let result = app.run(&mut terminal);

    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;

    result
}
