//! Rendu PNG de la forme d'onde
//!
//! Dessine l'artefact `.audiothumb` en image symétrique autour de l'axe
//! horizontal, sur un fond en rectangle arrondi. Le signal est remis à
//! l'échelle pour que le point le plus fort touche les bords : une vignette
//! d'émission calme reste lisible.

use crate::error::MediaError;
use image::{Rgba, RgbaImage};
use std::io::Cursor;

/// Paramètres de rendu, tous surchargés par la requête.
#[derive(Debug, Clone)]
pub struct PreviewOptions {
    /// Marge uniforme autour du tracé, en pixels.
    pub padding: u32,
    /// Hauteur du tracé, hors marge.
    pub height: u32,
    /// Facteur de décimation : un pixel de large pour `decim` points.
    pub decimation: u32,
    /// Rayon des coins arrondis du fond.
    pub corner_radius: f32,
    pub fore_color: Rgba<u8>,
    pub back_color: Rgba<u8>,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        PreviewOptions {
            padding: 0,
            height: 255,
            decimation: 1,
            corner_radius: 0.0,
            fore_color: Rgba([255, 255, 255, 255]),
            back_color: Rgba([0, 0, 0, 0]),
        }
    }
}

/// Parse une couleur hexadécimale `RRGGBB` ou `RRGGBBAA`.
pub fn parse_color(text: &str) -> Result<Rgba<u8>, MediaError> {
    let text = text.strip_prefix('#').unwrap_or(text);
    let bad = || MediaError::InvalidColor(text.to_string());
    let byte = |i: usize| u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| bad());
    match text.len() {
        6 => Ok(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Ok(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => Err(bad()),
    }
}

/// Rend les points de forme d'onde en image PNG.
pub fn render_png(points: &[u8], opts: &PreviewOptions) -> Result<Vec<u8>, MediaError> {
    let decim = opts.decimation.max(1) as usize;
    let columns = (points.len() / decim) as u32;
    let width = columns + 2 * opts.padding;
    let height = opts.height + 2 * opts.padding;
    let mut img = RgbaImage::new(width.max(1), height.max(1));

    fill_rounded_background(&mut img, opts.corner_radius, opts.back_color);

    // Remise à l'échelle au maximum du signal ; un demi-tracé par côté.
    let max = points.iter().copied().max().unwrap_or(0);
    let scale = if max == 0 {
        0.0
    } else {
        opts.height as f32 / max as f32 / 2.0
    };
    let center = (opts.padding + opts.height / 2) as i64;

    for column in 0..columns {
        let base = column as usize * decim;
        let mut point = points[base] as f32;
        for offset in 1..decim {
            point = (points[base + offset] as f32 + point) / 2.0;
        }
        let amplitude = (point * scale) as i64;
        let x = column + opts.padding;
        for step in 0..amplitude {
            put_pixel_checked(&mut img, x as i64, center + step, opts.fore_color);
            put_pixel_checked(&mut img, x as i64, center - step, opts.fore_color);
        }
    }

    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

fn put_pixel_checked(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Remplit le fond : rectangle aux quatre coins arrondis de rayon `radius`.
fn fill_rounded_background(img: &mut RgbaImage, radius: f32, color: Rgba<u8>) {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let radius = radius.max(0.0).min(w / 2.0).min(h / 2.0);
    for y in 0..img.height() {
        for x in 0..img.width() {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            // Hors des bandes centrales, le pixel doit tomber dans le
            // quart de cercle du coin le plus proche.
            let cx = if px < radius {
                Some(radius)
            } else if px > w - radius {
                Some(w - radius)
            } else {
                None
            };
            let cy = if py < radius {
                Some(radius)
            } else if py > h - radius {
                Some(h - radius)
            } else {
                None
            };
            let inside = match (cx, cy) {
                (Some(cx), Some(cy)) => {
                    let (dx, dy) = (px - cx, py - cy);
                    dx * dx + dy * dy <= radius * radius
                }
                _ => true,
            };
            if inside {
                img.put_pixel(x, y, color);
            }
        }
    }
}
