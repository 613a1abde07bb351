use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use codeinsight::analyzer::{
    list_entries, run_analysis, AnalysisEvent, AnalysisMode, AnalysisProgress, AnalysisRequest,
    Verdict,
};
use codeinsight::api::{ApiConfig, CompletionClient, API_KEY_VAR};

use std::io::{self, stdout};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const ERROR_LOG_LIMIT: usize = 6;

struct App {
    config: Option<ApiConfig>,
    path_input: String,
    input_mode: bool,
    mode: AnalysisMode,
    status: String,
    error_log: Vec<String>,
    output: String,
    verdict: Option<Verdict>,
    scroll: u16,
    is_running: bool,
    progress: Option<AnalysisProgress>,
    events: Option<Receiver<AnalysisEvent>>,
    cancel: Option<Arc<AtomicBool>>,
    should_quit: bool,
}

impl App {
    fn new(config: Option<ApiConfig>) -> Self {
        let status = if config.is_none() {
            format!(
                "API key is missing. Set {} and restart.",
                API_KEY_VAR
            )
        } else {
            String::from("Type a folder path and press Enter to analyze")
        };

        Self {
            config,
            path_input: String::from("."),
            input_mode: true,
            mode: AnalysisMode::Summary,
            status,
            error_log: Vec::new(),
            output: String::new(),
            verdict: None,
            scroll: 0,
            is_running: false,
            progress: None,
            events: None,
            cancel: None,
            should_quit: false,
        }
    }

    fn start_run(&mut self) {
        if self.is_running {
            return;
        }

        let Some(config) = self.config.clone() else {
            self.status = format!("API key is missing. Set {} and restart.", API_KEY_VAR);
            return;
        };

        let folder = if self.path_input.trim().is_empty() {
            ".".to_string()
        } else {
            self.path_input.trim().to_string()
        };

        if !Path::new(&folder).is_dir() {
            self.status = format!("Not a folder: {}", folder);
            return;
        }

        let paths = list_entries(Path::new(&folder));
        if paths.is_empty() {
            self.status = "No files found in the selected folder.".to_string();
            return;
        }

        let client = match CompletionClient::new(config) {
            Ok(client) => client,
            Err(err) => {
                self.status = format!("Failed to build HTTP client: {}", err);
                return;
            }
        };

        let request = AnalysisRequest {
            paths,
            mode: self.mode,
        };

        self.path_input = folder.clone();
        self.status = format!("Analyzing {} ...", folder);
        self.is_running = true;
        self.verdict = None;
        self.progress = None;
        self.output.clear();
        self.error_log.clear();
        self.scroll = 0;

        let (tx, rx) = mpsc::channel::<AnalysisEvent>();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();
        self.events = Some(rx);
        self.cancel = Some(cancel);

        thread::spawn(move || {
            run_analysis(&request, &client, &tx, &worker_cancel);
        });
    }

    fn cancel_run(&mut self) {
        if let Some(cancel) = self.cancel.as_ref() {
            cancel.store(true, Ordering::Relaxed);
            self.status = "Cancelling after the current block...".to_string();
        }
    }

    fn poll_run_updates(&mut self) {
        let mut finished = false;

        if let Some(rx) = self.events.as_ref() {
            loop {
                match rx.try_recv() {
                    Ok(AnalysisEvent::Progress(progress)) => {
                        self.progress = Some(progress);
                    }
                    Ok(AnalysisEvent::Error(err)) => {
                        self.status = err.to_string();
                        self.error_log.push(err.to_string());
                        if self.error_log.len() > ERROR_LOG_LIMIT {
                            self.error_log.remove(0);
                        }
                    }
                    Ok(AnalysisEvent::Completed(report)) => {
                        self.output = report.output;
                        self.verdict = Some(report.verdict);
                        self.status = match report.verdict {
                            Verdict::Safe => "Analysis complete: code looks safe".to_string(),
                            Verdict::Suspicious => {
                                "Analysis complete: potential malicious content".to_string()
                            }
                        };
                        finished = true;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if !finished {
                            self.status = "Analysis channel disconnected".to_string();
                        }
                        finished = true;
                        break;
                    }
                }
            }
        }

        if finished {
            self.is_running = false;
            self.progress = None;
            self.events = None;
            self.cancel = None;
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c'))
        {
            self.should_quit = true;
            return;
        }

        if self.input_mode {
            match key.code {
                KeyCode::Enter => {
                    self.input_mode = false;
                    self.start_run();
                }
                KeyCode::Esc => {
                    self.input_mode = false;
                }
                KeyCode::Backspace => {
                    self.path_input.pop();
                }
                KeyCode::Char(ch) => {
                    self.path_input.push(ch);
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('/') => self.input_mode = true,
            KeyCode::Char('a') | KeyCode::Enter => self.start_run(),
            KeyCode::Char('m') => self.toggle_mode(),
            KeyCode::Char('x') => self.cancel_run(),
            KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(10),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_add(10),
            KeyCode::Home => self.scroll = 0,
            _ => {}
        }
    }

    fn toggle_mode(&mut self) {
        if self.is_running {
            return;
        }
        self.mode = match self.mode {
            AnalysisMode::Summary => AnalysisMode::Malicious,
            AnalysisMode::Malicious => AnalysisMode::Summary,
        };
    }
}

fn progress_status(progress: &AnalysisProgress) -> String {
    let file = progress
        .current_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "...".to_string());

    match progress.fraction() {
        Some(fraction) => format!(
            "{:.0}% | file {}/{} | block {}/{} | {}",
            fraction * 100.0,
            progress.files_done + 1,
            progress.files_total,
            progress.blocks_done + 1,
            progress.blocks_total,
            file,
        ),
        None => format!("file {}/{} | {}", progress.files_done + 1, progress.files_total, file),
    }
}

fn draw_ui(frame: &mut Frame, app: &App) {
    let root = frame.area();
    let split = Layout::horizontal([Constraint::Length(44), Constraint::Min(30)]).split(root);
    let left = split[0];
    let right = split[1];

    let left_block = Block::default()
        .title(" CodeInsight TUI ")
        .borders(Borders::ALL);
    let left_inner = left_block.inner(left);
    frame.render_widget(left_block, left);

    let left_rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(4),
        Constraint::Min(6),
        Constraint::Length(5),
    ])
    .split(left_inner);

    let input_title = if app.input_mode {
        " Folder (typing) "
    } else {
        " Folder "
    };
    let path_block = Block::default().title(input_title).borders(Borders::ALL);
    let path_inner = path_block.inner(left_rows[0]);
    frame.render_widget(path_block, left_rows[0]);
    let path_style = if app.input_mode {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::White)
    };
    frame.render_widget(
        Paragraph::new(app.path_input.as_str()).style(path_style),
        path_inner,
    );

    let mode_line = Line::from(vec![
        Span::styled("Mode: ", Style::default().fg(Color::Gray)),
        Span::raw(match app.mode {
            AnalysisMode::Summary => "explain/resume code",
            AnalysisMode::Malicious => "identify malicious code",
        }),
    ]);
    frame.render_widget(
        Paragraph::new(mode_line).block(Block::default().title(" Mode ").borders(Borders::ALL)),
        left_rows[1],
    );

    let status_text = if app.is_running {
        app.progress
            .as_ref()
            .map(progress_status)
            .unwrap_or_else(|| "Analyzing...".to_string())
    } else {
        app.status.clone()
    };
    frame.render_widget(
        Paragraph::new(status_text)
            .wrap(Wrap { trim: true })
            .block(Block::default().title(" Status ").borders(Borders::ALL)),
        left_rows[2],
    );

    let error_lines: Vec<Line> = if app.error_log.is_empty() {
        vec![Line::from("(none)")]
    } else {
        app.error_log
            .iter()
            .map(|err| Line::from(Span::styled(err.clone(), Style::default().fg(Color::Red))))
            .collect()
    };
    frame.render_widget(
        Paragraph::new(error_lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().title(" Errors ").borders(Borders::ALL)),
        left_rows[3],
    );

    let help_lines = vec![
        Line::from("Enter/a: analyze    /: edit path"),
        Line::from("m: toggle mode      x: cancel"),
        Line::from("Up/Down/PgUp/PgDn: scroll output"),
        Line::from("q: quit"),
    ];
    frame.render_widget(
        Paragraph::new(help_lines)
            .block(Block::default().title(" Controls ").borders(Borders::ALL)),
        left_rows[4],
    );

    let (verdict_label, verdict_color) = match app.verdict {
        Some(Verdict::Safe) => (" Output - code is safe ", Color::Green),
        Some(Verdict::Suspicious) => (" Output - potential malicious content ", Color::Red),
        None => (" Output ", Color::White),
    };
    let output_block = Block::default()
        .title(Span::styled(
            verdict_label,
            Style::default().fg(verdict_color),
        ))
        .borders(Borders::ALL);
    let output_inner = output_block.inner(right);
    frame.render_widget(output_block, right);

    if app.output.is_empty() {
        frame.render_widget(
            Paragraph::new("No analysis yet. Enter a folder path and press Enter.")
                .style(Style::default().fg(Color::Gray)),
            output_inner,
        );
    } else {
        frame.render_widget(
            Paragraph::new(app.output.as_str())
                .wrap(Wrap { trim: false })
                .scroll((app.scroll, 0)),
            output_inner,
        );
    }
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> io::Result<()> {
    let mut app = App::new(ApiConfig::from_env());

    loop {
        app.poll_run_updates();

        terminal.draw(|frame| {
            draw_ui(frame, &app);
        })?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => app.on_key(key),
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    Ok(())
}

fn main() -> io::Result<()> {
    env_logger::init();

    enable_raw_mode()?;
    crossterm::execute!(stdout(), EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let app_result = run_app(&mut terminal);

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app_result
}
