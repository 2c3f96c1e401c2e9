use eframe::egui::{Color32, Ui};
use egui_plot::{Legend, Line, Plot, PlotPoints, Points, VLine};

use rusty_prism::color::{generate_palette, wavelength_to_srgb};
use rusty_prism::config::GraphScale;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Spectrum plot (central panel, below the image)
// ---------------------------------------------------------------------------

const LOG_FLOOR: f64 = 1e-4;

fn rgb(c: [u8; 3]) -> Color32 {
    Color32::from_rgb(c[0], c[1], c[2])
}

/// Render the extracted intensity profile with peaks, calibration markers
/// and reference overlays.
pub fn spectrum_plot(ui: &mut Ui, state: &AppState) {
    let Some(profile) = state.display_profile() else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.label("Detect or draw a line to extract a spectrum.");
        });
        return;
    };

    let fit = state.current.current();
    let log_scale = state.config.graph.scale == GraphScale::Log;
    let scale_y = |y: f64| {
        if log_scale {
            y.max(LOG_FLOOR).log10()
        } else {
            y
        }
    };
    let x_label = if fit.is_some() {
        "Wavelength (nm)"
    } else {
        "Position (px)"
    };
    let y_label = if log_scale {
        "log₁₀ intensity"
    } else {
        "Intensity"
    };

    let x_axis = state.x_axis(&profile);
    let to_x = |pixel: f64| match &fit {
        Some(fit) => fit.evaluate(pixel),
        None => pixel,
    };
    let palette = generate_palette(state.references.len());

    Plot::new("spectrum_plot")
        .legend(Legend::default())
        .x_axis_label(x_label)
        .y_axis_label(y_label)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            let points: PlotPoints = x_axis
                .iter()
                .zip(profile.intensities())
                .map(|(&x, &y)| [x, scale_y(y)])
                .collect();
            plot_ui.line(
                Line::new(points)
                    .name("profile")
                    .color(Color32::LIGHT_BLUE)
                    .width(1.5),
            );

            for (i, record) in state.references.iter().enumerate() {
                let points: PlotPoints = record
                    .x
                    .iter()
                    .zip(&record.y)
                    .map(|(&x, &y)| [x, scale_y(y)])
                    .collect();
                let name = record
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("reference {i}"));
                plot_ui.line(
                    Line::new(points)
                        .name(name)
                        .color(rgb(palette[i]))
                        .width(1.0),
                );
            }

            if !state.peaks.is_empty() {
                let markers: Vec<[f64; 2]> = state
                    .peaks
                    .iter()
                    .map(|p| [to_x(p.position), scale_y(p.amplitude)])
                    .collect();
                plot_ui.points(
                    Points::new(markers)
                        .name("peaks")
                        .color(Color32::from_rgb(255, 200, 0))
                        .radius(4.0),
                );
            }

            for point in state.calibration.points() {
                let color = if fit.is_some() {
                    rgb(wavelength_to_srgb(point.wavelength))
                } else {
                    Color32::GRAY
                };
                let name = point
                    .label
                    .clone()
                    .unwrap_or_else(|| format!("{:.1} nm", point.wavelength));
                plot_ui.vline(VLine::new(to_x(point.pixel)).name(name).color(color));
            }
        });
}
