// THEORY:
// The visualizer is a read-only consumer of the sensing core. It turns one
// `PressureMatrix` into an RGB heatmap and can mark the centres of pressure from a
// posture analysis on top of it. Nothing here feeds back into the loop.
//
// Each sensor cell becomes a `cell_size` x `cell_size` block. Empty cells are
// black; loaded cells run through a blue -> yellow -> red ramp scaled to the
// heaviest cell of the frame.

use haptic_mat::core_modules::posture_analyzer::{CenterOfPressure, PostureAnalysis};
use haptic_mat::core_modules::pressure_matrix::{COLS, PressureMatrix, ROWS};
use image::{ImageEncoder, Rgb, RgbImage};
use std::path::Path;

pub const DEFAULT_CELL_SIZE: u32 = 10;

const RIGHT_HAND: Rgb<u8> = Rgb([0, 255, 0]);
const LEFT_HAND: Rgb<u8> = Rgb([0, 255, 255]);
const ACTUAL_COP: Rgb<u8> = Rgb([255, 255, 255]);
const IDEAL_COP: Rgb<u8> = Rgb([255, 0, 255]);

/// Maps a reading onto the heat ramp. Zero is black.
pub fn heat_color(value: u16, max: u16) -> Rgb<u8> {
    if value == 0 || max == 0 {
        return Rgb([0, 0, 0]);
    }
    let score = (value as f64 / max as f64).clamp(0.0, 1.0) * 10.0;
    let (r, g, b) = if score <= 5.0 {
        // Blue to yellow
        let ratio = score / 5.0;
        (0.0, 255.0 * ratio, 255.0 * (1.0 - ratio))
    } else {
        // Yellow to red
        let ratio = (score - 5.0) / 5.0;
        (255.0 * ratio, 255.0 * (1.0 - ratio), 0.0)
    };
    Rgb([r.round() as u8, g.round() as u8, b.round() as u8])
}

/// Renders the whole mat.
pub fn render_heatmap(matrix: &PressureMatrix, cell_size: u32) -> RgbImage {
    let cell_size = cell_size.max(1);
    let max = matrix.max_pressure();
    let mut image = RgbImage::new(COLS as u32 * cell_size, ROWS as u32 * cell_size);

    for point in matrix.active_points() {
        let color = heat_color(point.pressure, max);
        let x0 = point.coord.column as u32 * cell_size;
        let y0 = point.coord.row as u32 * cell_size;
        fill_rect(&mut image, x0, y0, cell_size, color);
    }
    image
}

/// Draws a marker for each hand COP, the actual COP and the ideal COP.
pub fn overlay_posture(image: &mut RgbImage, analysis: &PostureAnalysis, cell_size: u32) {
    let cell_size = cell_size.max(1);
    for (cop, color) in [
        (&analysis.right.cop, RIGHT_HAND),
        (&analysis.left.cop, LEFT_HAND),
        (&analysis.actual_cop, ACTUAL_COP),
        (&analysis.ideal_cop, IDEAL_COP),
    ] {
        draw_marker(image, cop, cell_size, color);
    }
}

fn draw_marker(image: &mut RgbImage, cop: &CenterOfPressure, cell_size: u32, color: Rgb<u8>) {
    let half = cell_size as f64 / 2.0;
    let cx = cop.column * cell_size as f64 + half;
    let cy = cop.row * cell_size as f64 + half;
    let size = (cell_size / 2).max(1);
    let x0 = (cx - size as f64 / 2.0).max(0.0) as u32;
    let y0 = (cy - size as f64 / 2.0).max(0.0) as u32;
    fill_rect(image, x0, y0, size, color);
}

fn fill_rect(image: &mut RgbImage, x0: u32, y0: u32, size: u32, color: Rgb<u8>) {
    for y in y0..(y0 + size).min(image.height()) {
        for x in x0..(x0 + size).min(image.width()) {
            image.put_pixel(x, y, color);
        }
    }
}

pub fn save_png(image: &RgbImage, path: &Path) -> anyhow::Result<()> {
    let output = std::fs::File::create(path)?;
    let encoder = image::codecs::png::PngEncoder::new(output);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(())
}

/// Heatmap plus posture markers, straight to disk.
pub fn save_snapshot(
    matrix: &PressureMatrix,
    analysis: Option<&PostureAnalysis>,
    path: &Path,
) -> anyhow::Result<()> {
    let mut image = render_heatmap(matrix, DEFAULT_CELL_SIZE);
    if let Some(analysis) = analysis {
        overlay_posture(&mut image, analysis, DEFAULT_CELL_SIZE);
    }
    save_png(&image, path)
}
