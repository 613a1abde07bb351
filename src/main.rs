use eframe::egui;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use codeinsight::analyzer::{
    list_entries, run_analysis, AnalysisEvent, AnalysisMode, AnalysisProgress, AnalysisRequest,
    Verdict,
};
use codeinsight::api::{ApiConfig, CompletionClient, API_KEY_VAR};

fn main() -> Result<(), eframe::Error> {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_title("CodeInsight - Code Analyzer"),
        ..Default::default()
    };

    // Credential is read once at startup; a missing key disables runs but
    // still opens the window with an explanation.
    let config = ApiConfig::from_env();

    eframe::run_native(
        "CodeInsight",
        options,
        Box::new(|cc| {
            configure_custom_style(&cc.egui_ctx);
            Box::new(CodeInsightApp::new(config))
        }),
    )
}

fn configure_custom_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    // Dark theme with deep slate background
    let mut visuals = egui::Visuals::dark();
    visuals.panel_fill = egui::Color32::from_rgba_unmultiplied(30, 41, 59, 240);
    visuals.window_fill = egui::Color32::from_rgba_unmultiplied(30, 41, 59, 230);
    visuals.window_stroke = egui::Stroke::new(
        1.0,
        egui::Color32::from_rgba_unmultiplied(255, 255, 255, 26),
    );
    visuals.window_rounding = egui::Rounding::same(12.0);
    visuals.widgets.noninteractive.rounding = egui::Rounding::same(8.0);
    visuals.widgets.inactive.rounding = egui::Rounding::same(8.0);
    visuals.widgets.hovered.rounding = egui::Rounding::same(8.0);
    visuals.widgets.active.rounding = egui::Rounding::same(8.0);
    style.visuals = visuals;

    style.spacing.item_spacing = egui::vec2(12.0, 8.0);
    style.spacing.button_padding = egui::vec2(16.0, 8.0);

    ctx.set_style(style);
}

struct CodeInsightApp {
    config: Option<ApiConfig>,
    folder_path: String,
    summary_checked: bool,
    malicious_checked: bool,
    output: String,
    verdict: Option<Verdict>,
    is_running: bool,
    progress: Option<AnalysisProgress>,
    events: Option<Receiver<AnalysisEvent>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl CodeInsightApp {
    fn new(config: Option<ApiConfig>) -> Self {
        let output = if config.is_none() {
            format!(
                "API key is missing. Set the {} environment variable and restart.",
                API_KEY_VAR
            )
        } else {
            String::new()
        };

        Self {
            config,
            folder_path: String::new(),
            summary_checked: true,
            malicious_checked: false,
            output,
            verdict: None,
            is_running: false,
            progress: None,
            events: None,
            cancel: None,
        }
    }

    fn selected_mode(&self) -> AnalysisMode {
        // Summary wins when both boxes are ticked; neither ticked also
        // means summary.
        if self.summary_checked {
            AnalysisMode::Summary
        } else if self.malicious_checked {
            AnalysisMode::Malicious
        } else {
            AnalysisMode::Summary
        }
    }

    fn start_run(&mut self) {
        if self.is_running {
            return;
        }

        let Some(config) = self.config.clone() else {
            self.output = format!(
                "API key is missing. Set the {} environment variable and restart.",
                API_KEY_VAR
            );
            return;
        };

        let folder = self.folder_path.trim().to_string();
        if folder.is_empty() || !Path::new(&folder).is_dir() {
            self.output = format!("Not a folder: {}", folder);
            return;
        }

        let paths = list_entries(Path::new(&folder));
        if paths.is_empty() {
            self.output = "No files found in the selected folder.".to_string();
            return;
        }

        let client = match CompletionClient::new(config) {
            Ok(client) => client,
            Err(err) => {
                self.output = format!("Failed to build HTTP client: {}", err);
                return;
            }
        };

        let request = AnalysisRequest {
            paths,
            mode: self.selected_mode(),
        };

        let (tx, rx) = mpsc::channel::<AnalysisEvent>();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = cancel.clone();

        self.is_running = true;
        self.verdict = None;
        self.progress = None;
        self.output.clear();
        self.events = Some(rx);
        self.cancel = Some(cancel);

        thread::spawn(move || {
            run_analysis(&request, &client, &tx, &worker_cancel);
        });
    }

    fn cancel_run(&mut self) {
        if let Some(cancel) = self.cancel.as_ref() {
            cancel.store(true, Ordering::Relaxed);
        }
    }

    fn poll_events(&mut self) {
        let mut finished = false;

        if let Some(rx) = self.events.as_ref() {
            loop {
                match rx.try_recv() {
                    Ok(AnalysisEvent::Progress(progress)) => {
                        self.progress = Some(progress);
                    }
                    Ok(AnalysisEvent::Error(err)) => {
                        // Last error wins until the run completes.
                        self.output = err.to_string();
                    }
                    Ok(AnalysisEvent::Completed(report)) => {
                        self.output = report.output;
                        self.verdict = Some(report.verdict);
                        finished = true;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
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
}

impl eframe::App for CodeInsightApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_events();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("CodeInsight");
                ui.separator();

                ui.label("Folder:");
                ui.text_edit_singleline(&mut self.folder_path);

                if ui.button("Analyze").clicked() {
                    self.start_run();
                }

                if self.is_running {
                    if ui.button("Cancel").clicked() {
                        self.cancel_run();
                    }
                    ui.spinner();
                    match self.progress.as_ref().and_then(|p| p.fraction()) {
                        Some(fraction) => {
                            ui.label(format!("Analyzing... {:.0}%", fraction * 100.0));
                        }
                        None => {
                            ui.label("Analyzing...");
                        }
                    }
                }
            });

            ui.horizontal(|ui| {
                ui.checkbox(&mut self.summary_checked, "Explain/Resume Code");
                ui.checkbox(&mut self.malicious_checked, "Identify Malicious Code");

                if let Some(progress) = self.progress.as_ref() {
                    if let Some(file) = progress.current_file.as_ref() {
                        ui.separator();
                        ui.label(format!(
                            "File {}/{}: {}",
                            progress.files_done + 1,
                            progress.files_total,
                            file.display()
                        ));
                    }
                }
            });
        });

        egui::TopBottomPanel::bottom("status_panel").show(ctx, |ui| match self.verdict {
            Some(Verdict::Safe) => {
                ui.label(
                    egui::RichText::new("Code is safe.")
                        .color(egui::Color32::from_rgb(34, 197, 94)),
                );
            }
            Some(Verdict::Suspicious) => {
                ui.label(
                    egui::RichText::new("Code contains potential malicious content.")
                        .color(egui::Color32::from_rgb(239, 68, 68)),
                );
            }
            None => {
                ui.label("Select a folder to analyze.");
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    ui.label(egui::RichText::new(self.output.as_str()).monospace());
                });

            if self.is_running {
                ctx.request_repaint();
            }
        });
    }
}
