mod app;
mod state;
mod ui;

use std::path::PathBuf;

use app::RustyPrismApp;
use eframe::egui;
use rusty_prism::config::{self, AppConfig};

fn main() -> eframe::Result {
    env_logger::init();

    let config_path = PathBuf::from(config::DEFAULT_PATH);
    let config = AppConfig::load_from(&config_path);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 860.0])
            .with_min_inner_size([700.0, 500.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Rusty Prism – Spectrum Calibrator",
        options,
        Box::new(move |_cc| Ok(Box::new(RustyPrismApp::new(config, config_path)))),
    )
}
