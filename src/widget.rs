use eframe::egui::{Button, Color32, Label, RichText, Rounding};

use crate::machine::Phase;

pub fn get_heart_rate_label(bpm: u16) -> Label {
    let live_hr_text = RichText::new(format!("{bpm} BPM"))
        .color(Color32::RED)
        .size(50.0)
        .strong();

    Label::new(live_hr_text)
}

pub fn get_elapsed_label(elapsed: &str) -> Label {
    let elapsed_text = RichText::new(format!("Workout time: {elapsed}")).size(22.0);

    Label::new(elapsed_text)
}

pub fn get_speed_button(speed: u8, selected: bool) -> Button<'static> {
    let speed_text = RichText::new(format!("{speed}"))
        .color(Color32::WHITE)
        .size(20.0);

    let fill = if selected {
        Color32::from_rgb(40, 90, 220)
    } else {
        Color32::from_rgb(90, 120, 200)
    };

    Button::new(speed_text)
        .fill(fill)
        .rounding(Rounding::same(30.0))
        .min_size(eframe::egui::Vec2::new(60.0, 60.0))
}

pub fn get_start_button() -> Button<'static> {
    let text = RichText::new("Start Workout")
        .color(Color32::WHITE)
        .size(20.0);

    Button::new(text)
        .fill(Color32::from_rgb(30, 150, 60))
        .rounding(Rounding::same(15.0))
        .min_size(eframe::egui::Vec2::new(220.0, 44.0))
}

pub fn get_stop_button() -> Button<'static> {
    let text = RichText::new("Stop Workout")
        .color(Color32::WHITE)
        .size(20.0);

    Button::new(text)
        .fill(Color32::from_rgb(200, 40, 40))
        .rounding(Rounding::same(15.0))
        .min_size(eframe::egui::Vec2::new(220.0, 44.0))
}

pub fn phase_text(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "Waiting for bluetooth...",
        Phase::Scanning => "Searching for a sensor...",
        Phase::Connecting => "Connecting...",
        Phase::DiscoveringServices | Phase::DiscoveringCharacteristics => {
            "Setting up the sensor..."
        }
        Phase::Subscribing => "Subscribing...",
        Phase::Streaming => "Live",
        Phase::Disconnected => "Disconnected",
    }
}
