use eframe::egui::{self, Color32, ColorImage, Pos2, Sense, Stroke, TextureHandle, Ui, Vec2};
use image::RgbImage;

use rusty_prism::spectrum::Point;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Texture cache
// ---------------------------------------------------------------------------

/// GPU textures for the photograph and the color strip, re-uploaded only
/// when the state's generation counters move.
#[derive(Default)]
pub struct Textures {
    image: Option<(u64, TextureHandle)>,
    strip: Option<(u64, TextureHandle)>,
}

fn to_color_image(img: &RgbImage) -> ColorImage {
    ColorImage::from_rgb([img.width() as usize, img.height() as usize], img.as_raw())
}

fn cached<'a>(
    slot: &'a mut Option<(u64, TextureHandle)>,
    ctx: &egui::Context,
    name: &str,
    generation: u64,
    make: impl FnOnce() -> Option<RgbImage>,
) -> Option<&'a TextureHandle> {
    if slot.as_ref().map(|(g, _)| *g) != Some(generation) {
        *slot = make().map(|img| {
            let texture = ctx.load_texture(name, to_color_image(&img), egui::TextureOptions::LINEAR);
            (generation, texture)
        });
    }
    slot.as_ref().map(|(_, t)| t)
}

// ---------------------------------------------------------------------------
// Image with path overlay
// ---------------------------------------------------------------------------

const PATH_COLOR: Color32 = Color32::from_rgb(255, 200, 0);

/// Show the photograph scaled to fit `max_size`. While path editing is on,
/// a click appends a point at the clicked image coordinate.
pub fn image_view(ui: &mut Ui, state: &mut AppState, textures: &mut Textures, max_size: Vec2) {
    let ctx = ui.ctx().clone();
    let image = state.image.as_ref();
    let texture = match image {
        Some(img) => cached(
            &mut textures.image,
            &ctx,
            "source_image",
            state.image_generation,
            || Some(img.to_rgb8()),
        ),
        None => None,
    };
    let Some(texture) = texture else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Open an image to begin  (File → Open image…)");
        });
        return;
    };

    let tex_size = texture.size_vec2();
    let scale = (max_size.x / tex_size.x).min(max_size.y / tex_size.y).min(1.0);
    let sense = if state.editing_path {
        Sense::click()
    } else {
        Sense::hover()
    };
    let response = ui.add(
        egui::Image::new(texture)
            .fit_to_exact_size(tex_size * scale)
            .sense(sense),
    );
    let rect = response.rect;

    let to_screen = |p: &Point| Pos2::new(rect.min.x + p.x as f32 * scale, rect.min.y + p.y as f32 * scale);

    if state.editing_path && response.clicked() {
        if let Some(pos) = response.interact_pointer_pos() {
            let x = ((pos.x - rect.min.x) / scale).round() as f64;
            let y = ((pos.y - rect.min.y) / scale).round() as f64;
            state.add_path_point(Point::new(x, y));
        }
    }

    let painter = ui.painter_at(rect);
    let thickness = state.config.processing.thickness as f32 * scale;
    for pair in state.path_points.windows(2) {
        painter.line_segment(
            [to_screen(&pair[0]), to_screen(&pair[1])],
            Stroke::new(thickness.max(1.0), PATH_COLOR.gamma_multiply(0.35)),
        );
        painter.line_segment(
            [to_screen(&pair[0]), to_screen(&pair[1])],
            Stroke::new(1.5, PATH_COLOR),
        );
    }
    for p in &state.path_points {
        painter.circle_filled(to_screen(p), 3.5, PATH_COLOR);
    }

    if let Some(candidate) = &state.candidate {
        response.on_hover_text(format!(
            "{:?} detection, confidence {:.2}",
            candidate.method, candidate.confidence
        ));
    }
}

/// Show the color strip stretched to `width`.
pub fn strip_view(ui: &mut Ui, state: &AppState, textures: &mut Textures, width: f32) {
    let ctx = ui.ctx().clone();
    if let Some(texture) = cached(
        &mut textures.strip,
        &ctx,
        "color_strip",
        state.strip_generation,
        || state.strip.clone(),
    ) {
        let height = texture.size_vec2().y;
        ui.add(egui::Image::new(texture).fit_to_exact_size(Vec2::new(width, height)));
    }
}
