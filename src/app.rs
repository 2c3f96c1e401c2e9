use std::path::PathBuf;

use eframe::egui;

use rusty_prism::config::AppConfig;

use crate::state::AppState;
use crate::ui::image_view::{self, Textures};
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct RustyPrismApp {
    pub state: AppState,
    textures: Textures,
}

impl RustyPrismApp {
    pub fn new(config: AppConfig, config_path: PathBuf) -> Self {
        Self {
            state: AppState::with_config(config, config_path),
            textures: Textures::default(),
        }
    }
}

impl eframe::App for RustyPrismApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: controls ----
        egui::SidePanel::left("control_panel")
            .default_width(280.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: image, strip, plot ----
        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_size();
            let image_size = egui::vec2(available.x, available.y * 0.45);
            image_view::image_view(ui, &mut self.state, &mut self.textures, image_size);
            image_view::strip_view(ui, &self.state, &mut self.textures, available.x);
            ui.separator();
            plot::spectrum_plot(ui, &self.state);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.state.save_config();
    }
}
