use std::time::{Duration, Instant};

use eframe::egui;
use tokio::spawn;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod codec;
mod error;
mod machine;
mod resolver;
mod session;
mod signal;
mod widget;

use machine::Phase;
use session::PulseManager;
use signal::{GuiSignal, SessionSignal};

const TREADMILL_SPEEDS: [u8; 5] = [2, 4, 6, 8, 10];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (tx_to_gui, rx_from_session) = mpsc::channel(128);
    let (tx_to_session, rx_from_gui) = mpsc::channel(128);
    let shutdown = CancellationToken::new();

    let mut manager = PulseManager::new(tx_to_gui, rx_from_gui, shutdown.clone());
    spawn(async move {
        if let Err(err) = manager.run().await {
            error!("session manager exited: {err:#}");
        }
    });

    let native_options = eframe::NativeOptions::default();
    if let Err(err) = eframe::run_native(
        "pulsemon",
        native_options,
        Box::new(|cc| Ok(Box::new(WorkoutApp::new(cc, rx_from_session, tx_to_session, shutdown)))),
    ) {
        error!("gui terminated: {err}");
    }
}

enum Screen {
    Start,
    Workout,
}

struct WorkoutApp {
    rx_from_session: Receiver<SessionSignal>,
    tx_to_session: Sender<GuiSignal>,
    shutdown: CancellationToken,
    screen: Screen,
    live_heart_rate: u16,
    phase: Phase,
    sensor_name: Option<String>,
    selected_speed: Option<u8>,
    workout_started: Option<Instant>,
}

impl WorkoutApp {
    fn new(
        _cc: &eframe::CreationContext<'_>,
        rx_from_session: Receiver<SessionSignal>,
        tx_to_session: Sender<GuiSignal>,
        shutdown: CancellationToken,
    ) -> Self {
        WorkoutApp {
            rx_from_session,
            tx_to_session,
            shutdown,
            screen: Screen::Start,
            live_heart_rate: 0,
            phase: Phase::Idle,
            sensor_name: None,
            selected_speed: None,
            workout_started: None,
        }
    }

    fn read_channel(&mut self) {
        while let Ok(signal) = self.rx_from_session.try_recv() {
            match signal {
                SessionSignal::HeartRate { bpm } => self.live_heart_rate = bpm,
                SessionSignal::Phase(phase) => self.phase = phase,
                SessionSignal::SensorFound(name) => self.sensor_name = Some(name),
            }
        }
    }

    fn start_workout(&mut self) {
        let _ = self.tx_to_session.try_send(GuiSignal::StartWorkout);
        self.screen = Screen::Workout;
        self.live_heart_rate = 0;
        self.phase = Phase::Idle;
        self.sensor_name = None;
        self.selected_speed = None;
        self.workout_started = Some(Instant::now());
    }

    fn stop_workout(&mut self) {
        let _ = self.tx_to_session.try_send(GuiSignal::StopWorkout);
        self.screen = Screen::Start;
        self.live_heart_rate = 0;
        self.workout_started = None;
    }

    fn formatted_time(&self) -> String {
        let secs = self
            .workout_started
            .map(|started| started.elapsed().as_secs())
            .unwrap_or(0);
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    fn show_start_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(60.0);
                ui.heading("Treadmill Monitor");
                ui.add_space(10.0);
                ui.label("Ready to start your workout?");
                ui.add_space(40.0);
                if ui.add(widget::get_start_button()).clicked() {
                    self.start_workout();
                }
            });
        });
    }

    fn show_workout_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(20.0);
                ui.heading("Heart Rate");
                ui.add(widget::get_heart_rate_label(self.live_heart_rate));
                ui.label(widget::phase_text(self.phase));
                if let Some(name) = &self.sensor_name {
                    ui.label(format!("Sensor: {name}"));
                }
                ui.add_space(10.0);
                ui.add(widget::get_elapsed_label(&self.formatted_time()));

                ui.add_space(30.0);
                ui.label(egui::RichText::new("Set Speed:").size(18.0).strong());
                ui.horizontal(|ui| {
                    // center the row of speed buttons by padding evenly
                    let total = TREADMILL_SPEEDS.len() as f32 * 70.0;
                    let pad = ((ui.available_width() - total) / 2.0).max(0.0);
                    ui.add_space(pad);
                    for speed in TREADMILL_SPEEDS {
                        let selected = self.selected_speed == Some(speed);
                        if ui.add(widget::get_speed_button(speed, selected)).clicked() {
                            self.selected_speed = Some(speed);
                            info!("treadmill speed set to {speed}");
                        }
                        ui.add_space(10.0);
                    }
                });
                if let Some(speed) = self.selected_speed {
                    ui.label(format!("Current speed: {speed}"));
                }

                ui.add_space(30.0);
                if ui.add(widget::get_stop_button()).clicked() {
                    self.stop_workout();
                }
            });
        });
    }
}

impl eframe::App for WorkoutApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.read_channel();

        match self.screen {
            Screen::Start => self.show_start_screen(ctx),
            Screen::Workout => self.show_workout_screen(ctx),
        }

        // keep the timer and BPM readout moving without busy repainting
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.shutdown.cancel();
    }
}
