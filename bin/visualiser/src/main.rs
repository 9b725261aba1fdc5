use common::config::{load_config, DEFAULT_CONFIG_PATH};
use common::{AutoScroll, LogCategory, SurfaceRect};
use eframe::egui;
use egui_plot::{Line, Plot, PlotPoints};
use session::{Console, Link};
use std::env;
use std::error::Error;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

const TERMINAL_HEIGHT: f32 = 320.0;
const PAD_SIDE: f32 = 220.0;
const PLOT_SAMPLES: usize = 200;

struct ConsoleApp {
    runtime: Runtime,
    console: Console<Link>,
    message: String,
    pad_active: bool,
    auto_scroll: AutoScroll,
    last_seen_seq: u64,
    content_height: f32,
}

impl ConsoleApp {
    fn new(runtime: Runtime, console: Console<Link>) -> Self {
        Self {
            runtime,
            console,
            message: String::new(),
            pad_active: false,
            auto_scroll: AutoScroll::new(TERMINAL_HEIGHT),
            last_seen_seq: 0,
            content_height: 0.0,
        }
    }

    fn connect(&self) {
        let console = self.console.clone();
        // Failures are reported in the terminal pane.
        self.runtime.spawn(async move {
            let _ = console.connect().await;
        });
    }

    fn send_message(&mut self) {
        let message = std::mem::take(&mut self.message);
        if message.is_empty() {
            return;
        }
        let console = self.console.clone();
        self.runtime.spawn(async move {
            let _ = console.send(&message).await;
        });
    }

    fn toggle_streaming(&self) {
        let _guard = self.runtime.enter();
        self.console.toggle_streaming();
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("🔌 Connect").clicked() {
                self.connect();
            }
            if ui.button("⏏ Disconnect").clicked() {
                let _ = self.console.disconnect();
            }

            let streaming = self.console.is_streaming();
            let label = if streaming { "⏹ Stop Joystick" } else { "🕹 Start Joystick" };
            if ui.button(label).clicked() {
                self.toggle_streaming();
            }

            ui.separator();
            ui.label(egui::RichText::new(self.console.device_label()).strong());

            let status_text = if streaming {
                egui::RichText::new("🟢 Streaming").color(egui::Color32::GREEN)
            } else {
                egui::RichText::new("⚪ Idle").color(egui::Color32::GRAY)
            };
            ui.label(status_text);
        });
    }

    fn terminal(&mut self, ui: &mut egui::Ui) {
        let entries = self.console.log().get_all();
        let newest = entries.last().map(|entry| entry.seq + 1).unwrap_or(0);
        let appended = newest.saturating_sub(self.last_seen_seq) as f32;
        self.last_seen_seq = newest;

        let row_height = ui.text_style_height(&egui::TextStyle::Monospace) + ui.spacing().item_spacing.y;
        let mut area = egui::ScrollArea::vertical()
            .id_source("terminal_scroll")
            .max_height(TERMINAL_HEIGHT)
            .auto_shrink([false; 2]);

        if appended > 0.0 {
            let expected_height = self.content_height + appended * row_height;
            if let Some(offset) = self.auto_scroll.target_after_append(expected_height, TERMINAL_HEIGHT) {
                area = area.vertical_scroll_offset(offset);
            }
        }

        let output = area.show(ui, |ui| {
            for entry in &entries {
                let color = match entry.category {
                    LogCategory::Plain => ui.visuals().text_color(),
                    LogCategory::Incoming => egui::Color32::from_rgb(52, 152, 219),
                    LogCategory::Outgoing => egui::Color32::from_rgb(46, 204, 113),
                    LogCategory::Error => egui::Color32::from_rgb(231, 76, 60),
                    LogCategory::Timing => egui::Color32::from_rgb(155, 89, 182),
                };
                ui.label(egui::RichText::new(&entry.message).monospace().color(color));
            }
        });

        self.content_height = output.content_size.y;
        self.auto_scroll.on_scroll(
            output.state.offset.y,
            output.content_size.y,
            output.inner_rect.height(),
        );
    }

    fn message_form(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let input = ui.add(
                egui::TextEdit::singleline(&mut self.message)
                    .hint_text("Message")
                    .desired_width(360.0),
            );
            let submitted = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("Send").clicked() || submitted {
                self.send_message();
                input.request_focus();
            }
        });
    }

    fn joystick_pad(&mut self, ui: &mut egui::Ui) {
        let (response, painter) =
            ui.allocate_painter(egui::Vec2::splat(PAD_SIDE), egui::Sense::click_and_drag());
        let rect = response.rect;

        // Pointer positions are absolute screen points, so the pad rect is too.
        if response.is_pointer_button_down_on() {
            if let Some(pos) = response.interact_pointer_pos() {
                let (x, y) = (pos.x as f64, pos.y as f64);
                if self.pad_active {
                    self.console.pointer_move(x, y);
                } else {
                    let area = SurfaceRect::new(
                        rect.left() as f64,
                        rect.top() as f64,
                        rect.width() as f64,
                        rect.height() as f64,
                    );
                    self.console.pointer_down(area, x, y);
                    self.pad_active = true;
                }
            }
        } else if self.pad_active {
            self.console.pointer_up();
            self.pad_active = false;
        }

        let position = self.console.joystick_position();
        let handle = rect.center()
            + egui::vec2(
                position.x as f32 * rect.width() / 2.0,
                -position.y as f32 * rect.height() / 2.0,
            );

        painter.rect_filled(rect, 8.0, egui::Color32::from_gray(40));
        painter.line_segment(
            [rect.center_top(), rect.center_bottom()],
            egui::Stroke::new(1.0, egui::Color32::from_gray(70)),
        );
        painter.line_segment(
            [rect.left_center(), rect.right_center()],
            egui::Stroke::new(1.0, egui::Color32::from_gray(70)),
        );
        painter.circle_filled(handle, 16.0, egui::Color32::from_rgb(52, 152, 219));

        ui.label(format!("x: {:.2}  y: {:.2}", position.x, position.y));
    }

    fn latency_panel(&self, ui: &mut egui::Ui) {
        let stats = self.console.stats();
        let samples = self.console.timing().get_results();

        egui::Grid::new("stats_grid")
            .num_columns(2)
            .spacing([40.0, 4.0])
            .striped(true)
            .show(ui, |ui| {
                ui.label("Samples:");
                ui.label(format!("{}", stats.timing.sample_count));
                ui.end_row();

                ui.label("Last / Avg:");
                match stats.timing.last {
                    Some(last) => ui.label(format!("{} ms / {} ms", last.latency_ms, last.average_ms)),
                    None => ui.label("-"),
                };
                ui.end_row();

                ui.label("Pending:");
                ui.label(format!("{}", stats.timing.pending));
                ui.end_row();

                ui.label("Echo Timeouts:");
                ui.label(format!("{}", stats.diagnostics.echo_timeouts));
                ui.end_row();

                ui.label("Send Failures:");
                ui.label(format!("{}", stats.diagnostics.dispatch_failures));
                ui.end_row();
            });

        let start = samples.len().saturating_sub(PLOT_SAMPLES);
        let latency: Vec<[f64; 2]> = samples[start..]
            .iter()
            .map(|s| [s.sample_count as f64, s.latency_ms as f64])
            .collect();
        let average: Vec<[f64; 2]> = samples[start..]
            .iter()
            .map(|s| [s.sample_count as f64, s.average_ms as f64])
            .collect();

        if !latency.is_empty() {
            Plot::new("latency_plot")
                .height(150.0)
                .show_axes([false, true])
                .allow_scroll(false)
                .allow_zoom(false)
                .allow_drag(false)
                .show(ui, |plot_ui| {
                    plot_ui.line(
                        Line::new(PlotPoints::new(latency))
                            .color(egui::Color32::from_rgb(155, 89, 182))
                            .name("round-trip ms"),
                    );
                    plot_ui.line(
                        Line::new(PlotPoints::new(average))
                            .color(egui::Color32::from_rgb(230, 126, 34))
                            .name("average ms"),
                    );
                });
        }
    }
}

impl eframe::App for ConsoleApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("🛰 Rover Console");
            ui.add_space(10.0);

            egui::Frame::group(ui.style())
                .inner_margin(10.0)
                .show(ui, |ui| self.controls(ui));

            ui.add_space(10.0);

            ui.horizontal_top(|ui| {
                egui::Frame::group(ui.style())
                    .inner_margin(10.0)
                    .show(ui, |ui| {
                        ui.set_width(560.0);
                        ui.strong("📟 Terminal");
                        ui.separator();
                        self.terminal(ui);
                        ui.separator();
                        self.message_form(ui);
                    });

                ui.vertical(|ui| {
                    egui::Frame::group(ui.style())
                        .inner_margin(10.0)
                        .show(ui, |ui| {
                            ui.strong("🕹 Joystick");
                            ui.separator();
                            self.joystick_pad(ui);
                        });

                    egui::Frame::group(ui.style())
                        .inner_margin(10.0)
                        .show(ui, |ui| {
                            ui.set_min_width(PAD_SIDE);
                            ui.strong("⚡ Round Trip");
                            ui.separator();
                            self.latency_panel(ui);
                        });
                });
            });
        });
    }
}

impl Drop for ConsoleApp {
    fn drop(&mut self) {
        self.console.stop_streaming();
        let _ = self.console.disconnect();
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,terminal=warn")),
        )
        .init();

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path)?;
    tracing::info!(path = %config_path, "starting visualiser");

    let runtime = Runtime::new()?;
    let console = {
        let _guard = runtime.enter();
        session::launch(&config)
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1000.0, 720.0])
            .with_title(format!("Rover Console - {}", config.session_name)),
        ..Default::default()
    };

    eframe::run_native(
        "Rover Console",
        options,
        Box::new(move |_cc| Box::new(ConsoleApp::new(runtime, console))),
    )?;
    Ok(())
}
