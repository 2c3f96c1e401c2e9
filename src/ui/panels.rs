use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use rusty_prism::config::GraphScale;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – extraction, peaks and calibration
// ---------------------------------------------------------------------------

/// Render the left control panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            extraction_section(ui, state);
            ui.separator();
            peaks_section(ui, state);
            ui.separator();
            calibration_section(ui, state);
            ui.separator();
            graph_section(ui, state);
        });
}

fn extraction_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Extraction");

    let has_image = state.image.is_some();
    ui.add_enabled_ui(has_image, |ui: &mut Ui| {
        ui.horizontal(|ui: &mut Ui| {
            if ui.button("Auto-detect line").clicked() {
                state.auto_detect();
            }
            ui.checkbox(&mut state.config.processing.auto_detect, "on open");
        });

        ui.horizontal(|ui: &mut Ui| {
            let label = if state.editing_path {
                "Finish path"
            } else {
                "Draw path"
            };
            if ui.selectable_label(state.editing_path, label).clicked() {
                state.editing_path = !state.editing_path;
            }
            if ui.button("Clear").clicked() {
                state.clear_path();
            }
        });
        if state.editing_path {
            ui.label(RichText::new("Click on the image to add points.").weak());
        }
    });

    let mut changed = false;
    egui::Grid::new("extraction_grid")
        .num_columns(2)
        .show(ui, |ui: &mut Ui| {
            ui.label("Thickness (px)");
            changed |= ui
                .add(egui::DragValue::new(&mut state.config.processing.thickness).range(1..=101))
                .changed();
            ui.end_row();

            ui.label("Strip height");
            changed |= ui
                .add(egui::DragValue::new(&mut state.config.processing.strip_height).range(1..=200))
                .changed();
            ui.end_row();

            ui.label("Smoothing");
            let mut smooth = state.config.processing.smoothing_window.is_some();
            if ui.checkbox(&mut smooth, "").changed() {
                state.config.processing.smoothing_window = smooth.then_some(11);
                changed = true;
            }
            ui.end_row();

            if let Some(window) = state.config.processing.smoothing_window.as_mut() {
                ui.label("  window");
                changed |= ui
                    .add(egui::DragValue::new(window).range(3..=101))
                    .changed();
                ui.end_row();
            }
        });

    if changed && state.path_points.len() >= 2 {
        state.refresh_profile();
    }

    if let Some(profile) = &state.profile {
        ui.label(format!("{} samples", profile.len()));
    }
}

fn peaks_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Peaks");

    let params = &mut state.config.peaks;
    egui::Grid::new("peaks_grid")
        .num_columns(2)
        .show(ui, |ui: &mut Ui| {
            ui.label("Prominence");
            ui.add(
                egui::DragValue::new(&mut params.prominence_fraction)
                    .range(0.0..=1.0)
                    .speed(0.01),
            );
            ui.end_row();

            ui.label("Min distance");
            optional_drag(ui, &mut params.min_distance, 5.0);
            ui.end_row();

            ui.label("Min height");
            optional_drag(ui, &mut params.min_height, 0.1);
            ui.end_row();

            ui.label("Max peaks");
            let mut limited = params.max_peaks.is_some();
            ui.horizontal(|ui: &mut Ui| {
                if ui.checkbox(&mut limited, "").changed() {
                    params.max_peaks = limited.then_some(10);
                }
                if let Some(n) = params.max_peaks.as_mut() {
                    ui.add(egui::DragValue::new(n).range(1..=100));
                }
            });
            ui.end_row();
        });

    ui.add_enabled_ui(state.profile.is_some(), |ui: &mut Ui| {
        if ui.button("Find peaks").clicked() {
            state.find_peaks();
        }
    });

    if !state.peaks.is_empty() {
        egui::CollapsingHeader::new(format!("{} peaks", state.peaks.len()))
            .id_salt("peak_list")
            .show(ui, |ui: &mut Ui| {
                let mut picked = None;
                for (i, peak) in state.peaks.iter().enumerate() {
                    ui.horizontal(|ui: &mut Ui| {
                        ui.monospace(format!("{:8.2} px  {:.3}", peak.position, peak.amplitude));
                        if ui.small_button("→ point").clicked() {
                            picked = Some(i);
                        }
                    });
                }
                if let Some(i) = picked {
                    state.new_point_pixel = format!("{:.2}", state.peaks[i].position);
                }
            });
    }
}

fn optional_drag(ui: &mut Ui, value: &mut Option<f64>, default: f64) {
    ui.horizontal(|ui: &mut Ui| {
        let mut enabled = value.is_some();
        if ui.checkbox(&mut enabled, "").changed() {
            *value = enabled.then_some(default);
        }
        if let Some(v) = value.as_mut() {
            ui.add(egui::DragValue::new(v).range(0.0..=f64::MAX).speed(0.1));
        }
    });
}

fn calibration_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Calibration");

    let mut remove = None;
    egui::Grid::new("calibration_points")
        .num_columns(4)
        .striped(true)
        .show(ui, |ui: &mut Ui| {
            ui.strong("Pixel");
            ui.strong("λ (nm)");
            ui.strong("Label");
            ui.label("");
            ui.end_row();
            for (i, point) in state.calibration.points().iter().enumerate() {
                ui.monospace(format!("{:.2}", point.pixel));
                ui.monospace(format!("{:.2}", point.wavelength));
                ui.label(point.label.as_deref().unwrap_or(""));
                if ui.small_button("✖").clicked() {
                    remove = Some(i);
                }
                ui.end_row();
            }
        });
    if let Some(i) = remove {
        state.remove_calibration_point(i);
    }

    ui.horizontal(|ui: &mut Ui| {
        ui.add(
            egui::TextEdit::singleline(&mut state.new_point_pixel)
                .hint_text("pixel")
                .desired_width(60.0),
        );
        ui.add(
            egui::TextEdit::singleline(&mut state.new_point_wavelength)
                .hint_text("nm")
                .desired_width(60.0),
        );
        if ui.button("Add").clicked() {
            state.add_point_from_form();
        }
    });

    ui.horizontal(|ui: &mut Ui| {
        ui.add(
            egui::TextEdit::singleline(&mut state.known_wavelengths)
                .hint_text("known λ, comma separated")
                .desired_width(140.0),
        );
        if ui
            .add_enabled(!state.peaks.is_empty(), egui::Button::new("Pair"))
            .on_hover_text("Pair detected peaks with these wavelengths in order")
            .clicked()
        {
            state.pair_peaks_with_wavelengths();
        }
    });

    ui.horizontal(|ui: &mut Ui| {
        ui.label("Order");
        let current = state.calibration.order();
        egui::ComboBox::from_id_salt("poly_order")
            .selected_text(current.to_string())
            .width(40.0)
            .show_ui(ui, |ui: &mut Ui| {
                for order in 1..=5 {
                    if ui
                        .selectable_label(current == order, order.to_string())
                        .clicked()
                    {
                        state.set_polynomial_order(order);
                    }
                }
            });
        if ui.button("Fit").clicked() {
            state.fit_calibration();
        }
        if ui.button("Clear").clicked() {
            state.clear_calibration();
        }
    });

    match state.current.current() {
        Some(fit) => {
            let q = fit.quality();
            ui.label(format!("R² = {:.5}", q.r_squared));
            ui.label(format!("RMSE = {:.3} nm, max = {:.3} nm", q.rmse, q.max_error));
            let coeffs: Vec<String> = fit.coefficients().iter().map(|c| format!("{c:.4e}")).collect();
            ui.label(RichText::new(coeffs.join(", ")).small().weak());
        }
        None => {
            ui.label(RichText::new("Not calibrated").weak());
        }
    }

    ui.horizontal(|ui: &mut Ui| {
        ui.add(
            egui::TextEdit::singleline(&mut state.profile_name)
                .hint_text("profile name")
                .desired_width(120.0),
        );
        if ui
            .add_enabled(!state.profile_name.trim().is_empty(), egui::Button::new("Save"))
            .clicked()
        {
            state.save_profile();
        }
    });
}

fn graph_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Graph");
    let graph = &mut state.config.graph;
    ui.checkbox(&mut graph.show_smoothed, "Savitzky–Golay smoothing");
    if graph.show_smoothed {
        ui.horizontal(|ui: &mut Ui| {
            ui.label("window");
            ui.add(egui::DragValue::new(&mut graph.savgol_window).range(3..=101));
            ui.label("order");
            ui.add(egui::DragValue::new(&mut graph.savgol_order).range(0..=6));
        });
    }
    ui.horizontal(|ui: &mut Ui| {
        ui.radio_value(&mut graph.scale, GraphScale::Linear, "Linear");
        ui.radio_value(&mut graph.scale, GraphScale::Log, "Log");
    });
    if !state.references.is_empty() {
        ui.horizontal(|ui: &mut Ui| {
            ui.label(format!("{} reference spectra", state.references.len()));
            if ui.small_button("Clear").clicked() {
                state.references.clear();
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open image…").clicked() {
                open_image_dialog(state);
                ui.close_menu();
            }
            let recent = state.config.app.recent_files.clone();
            if !recent.is_empty() {
                ui.menu_button("Recent", |ui: &mut Ui| {
                    for path in recent {
                        if ui.button(path.display().to_string()).clicked() {
                            state.open_image(&path);
                            ui.close_menu();
                        }
                    }
                });
            }
            ui.separator();
            if ui.button("Export spectrum…").clicked() {
                export_dialog(state);
                ui.close_menu();
            }
            if ui.button("Load reference…").clicked() {
                reference_dialog(state);
                ui.close_menu();
            }
            ui.separator();
            if ui.button("Save settings").clicked() {
                state.save_config();
                ui.close_menu();
            }
        });

        ui.menu_button("Profiles", |ui: &mut Ui| {
            profiles_menu(ui, state);
        });

        ui.separator();

        if let Some(path) = &state.image_path {
            ui.label(path.display().to_string());
            ui.separator();
        }

        if let Some(msg) = &state.status_message {
            let color = if state.status_is_error {
                Color32::RED
            } else {
                ui.visuals().text_color()
            };
            ui.label(RichText::new(msg).color(color));
        }
    });
}

fn profiles_menu(ui: &mut Ui, state: &mut AppState) {
    let summaries = match &state.profiles {
        Some(store) => store.list().unwrap_or_else(|e| {
            log::warn!("Could not list profiles: {e:#}");
            Vec::new()
        }),
        None => Vec::new(),
    };

    if summaries.is_empty() {
        ui.label(RichText::new("No saved profiles").weak());
    }
    for summary in summaries {
        ui.horizontal(|ui: &mut Ui| {
            let text = format!("{}  ({} pts)", summary.name, summary.num_points);
            let response = ui.button(text);
            let response = if summary.description.is_empty() {
                response.on_hover_text(summary.created.as_str())
            } else {
                response.on_hover_text(format!("{}\n{}", summary.description, summary.created))
            };
            if response.clicked() {
                state.load_profile(&summary.name);
                ui.close_menu();
            }
            if ui.small_button("💾").on_hover_text("Export…").clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .set_title("Export calibration profile")
                    .add_filter("Profile", &["json"])
                    .set_file_name(format!("{}.json", summary.name))
                    .save_file()
                {
                    state.export_profile(&summary.name, &path);
                }
                ui.close_menu();
            }
            if ui.small_button("🗑").on_hover_text("Delete").clicked() {
                state.delete_profile(&summary.name);
            }
        });
    }
    ui.separator();
    if ui.button("Import…").clicked() {
        if let Some(path) = rfd::FileDialog::new()
            .set_title("Import calibration profile")
            .add_filter("Profile", &["json"])
            .pick_file()
        {
            state.import_profile(&path);
        }
        ui.close_menu();
    }
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_image_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open spectrum image")
        .add_filter("Images", &["png", "jpg", "jpeg"])
        .pick_file();

    if let Some(path) = file {
        state.open_image(&path);
    }
}

fn export_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Export spectrum")
        .add_filter("Parquet", &["parquet"])
        .add_filter("JSON", &["json"])
        .add_filter("CSV", &["csv"])
        .set_file_name("spectrum.parquet")
        .save_file();

    if let Some(path) = file {
        state.export_spectrum(&path);
    }
}

fn reference_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Load reference spectra")
        .add_filter("Supported files", &["parquet", "pq", "json", "csv"])
        .pick_file();

    if let Some(path) = file {
        state.load_reference(&path);
    }
}
