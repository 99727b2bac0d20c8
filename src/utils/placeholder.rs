//! Locally drawn stand-in illustration used when no image backend delivers.

use crate::core::story::ImageArtifact;
use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use log::{info, warn};
use sha2::{Digest, Sha256};
use std::io::Cursor;

pub const PLACEHOLDER_WIDTH: u32 = 512;
pub const PLACEHOLDER_HEIGHT: u32 = 512;

const CAPTION: &str = "PICTURE COMING SOON";
const GLYPH_SCALE: u32 = 4;
const FLAT_COLOR: Rgb<u8> = Rgb([240, 248, 255]);

/// 1x1 PNG served if even the flat canvas cannot be encoded.
const LAST_RESORT_PNG: [u8; 70] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f,
    0x15, 0xc4, 0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0xfc,
    0xcf, 0xc0, 0x50, 0x0f, 0x00, 0x04, 0x85, 0x01, 0x80, 0x84, 0xa9, 0x8c, 0x21, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// Draws a deterministic placeholder for `context`. Never fails: a decorated
/// canvas is tried first, then a flat one, then a constant 1x1 PNG.
pub fn render(context: &str) -> ImageArtifact {
    match render_decorated(context) {
        Ok(bytes) => {
            info!("Placeholder illustration rendered ({} bytes)", bytes.len());
            ImageArtifact::placeholder(bytes)
        }
        Err(e) => {
            warn!("Decorated placeholder failed, using flat canvas: {:#}", e);
            match render_flat() {
                Ok(bytes) => ImageArtifact::placeholder(bytes),
                Err(e) => {
                    warn!("Flat placeholder failed, using built-in pixel: {:#}", e);
                    ImageArtifact::placeholder(LAST_RESORT_PNG.to_vec())
                }
            }
        }
    }
}

fn render_decorated(context: &str) -> Result<Vec<u8>> {
    let palette = Palette::from_context(context);
    let mut canvas = RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, palette.sky);

    // rolling hill along the bottom third
    for x in 0..PLACEHOLDER_WIDTH {
        let wave = ((x as f32 / 60.0).sin() * 18.0) as i32;
        let top = (PLACEHOLDER_HEIGHT as i32 * 2 / 3 + wave).max(0) as u32;
        for y in top..PLACEHOLDER_HEIGHT {
            put(&mut canvas, x as i32, y as i32, palette.hill);
        }
    }

    fill_circle(&mut canvas, 400, 110, 48, palette.sun);
    for (i, (x, y)) in palette.stars.iter().enumerate() {
        fill_circle(&mut canvas, *x, *y, 4 + (i as i32 % 3), Rgb([255, 255, 255]));
    }

    // frame
    let border = 10;
    fill_rect(&mut canvas, 0, 0, PLACEHOLDER_WIDTH as i32, border, palette.frame);
    fill_rect(&mut canvas, 0, PLACEHOLDER_HEIGHT as i32 - border, PLACEHOLDER_WIDTH as i32, border, palette.frame);
    fill_rect(&mut canvas, 0, 0, border, PLACEHOLDER_HEIGHT as i32, palette.frame);
    fill_rect(&mut canvas, PLACEHOLDER_WIDTH as i32 - border, 0, border, PLACEHOLDER_HEIGHT as i32, palette.frame);

    draw_caption(&mut canvas, CAPTION, 420);

    encode_png(&canvas)
}

fn render_flat() -> Result<Vec<u8>> {
    let canvas = RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, FLAT_COLOR);
    encode_png(&canvas)
}

fn encode_png(canvas: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("Failed to encode placeholder PNG")?;
    Ok(bytes)
}

struct Palette {
    sky: Rgb<u8>,
    hill: Rgb<u8>,
    sun: Rgb<u8>,
    frame: Rgb<u8>,
    stars: Vec<(i32, i32)>,
}

impl Palette {
    /// Pastel colours and star positions seeded from the page text.
    fn from_context(context: &str) -> Self {
        let digest = Sha256::digest(context.as_bytes());
        let pastel = |a: u8, b: u8, c: u8| Rgb([160 + a / 3, 160 + b / 3, 160 + c / 3]);
        let stars = digest[12..24]
            .chunks(2)
            .map(|pair| {
                let x = 30 + (pair[0] as i32 * (PLACEHOLDER_WIDTH as i32 - 60)) / 255;
                let y = 30 + (pair[1] as i32 * 250) / 255;
                (x, y)
            })
            .collect();

        Self {
            sky: pastel(digest[0], digest[1], digest[2]),
            hill: Rgb([60 + digest[3] / 4, 150 + digest[4] / 4, 70 + digest[5] / 4]),
            sun: Rgb([255, 200 + digest[6] / 5, 60]),
            frame: Rgb([digest[9] / 2, digest[10] / 2, digest[11] / 2]),
            stars,
        }
    }
}

fn put(canvas: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

fn fill_rect(canvas: &mut RgbImage, x: i32, y: i32, w: i32, h: i32, color: Rgb<u8>) {
    for dy in 0..h {
        for dx in 0..w {
            put(canvas, x + dx, y + dy, color);
        }
    }
}

fn fill_circle(canvas: &mut RgbImage, cx: i32, cy: i32, r: i32, color: Rgb<u8>) {
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put(canvas, cx + dx, cy + dy, color);
            }
        }
    }
}

fn draw_caption(canvas: &mut RgbImage, caption: &str, top: i32) {
    let advance = 6 * GLYPH_SCALE as i32;
    let width = caption.chars().count() as i32 * advance;
    let left = (canvas.width() as i32 - width) / 2;
    let pad = 12;

    fill_rect(
        canvas,
        left - pad,
        top - pad,
        width + pad * 2,
        7 * GLYPH_SCALE as i32 + pad * 2,
        Rgb([255, 255, 255]),
    );

    for (i, ch) in caption.chars().enumerate() {
        let Some(rows) = glyph(ch) else { continue };
        let origin_x = left + i as i32 * advance;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..5 {
                if bits & (0b10000 >> col) != 0 {
                    fill_rect(
                        canvas,
                        origin_x + col * GLYPH_SCALE as i32,
                        top + row as i32 * GLYPH_SCALE as i32,
                        GLYPH_SCALE as i32,
                        GLYPH_SCALE as i32,
                        Rgb([70, 70, 90]),
                    );
                }
            }
        }
    }
}

/// 5x7 bitmap glyphs for the caption's letters.
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        _ => return None,
    };
    Some(rows)
}
