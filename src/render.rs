use crate::{enums::OutputMode, label::LabelPalette};

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::{Compression, write::ZlibEncoder};
use image::{DynamicImage, GrayImage, ImageBuffer, RgbImage};
use ndarray::Array2;
use rayon::prelude::*;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("label mode needs a palette")]
    MissingPalette,

    #[error("slice of {width}x{height} does not fit an image")]
    Size { width: usize, height: usize },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn dimensions(slice: &Array2<i32>) -> Result<(u32, u32), RenderError> {
    let (height, width) = slice.dim();
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(RenderError::Size { width, height }),
    }
}

fn buffer<P: image::Pixel>(
    slice: &Array2<i32>,
    raw: Vec<P::Subpixel>,
) -> Result<ImageBuffer<P, Vec<P::Subpixel>>, RenderError> {
    let (width, height) = dimensions(slice)?;
    ImageBuffer::from_raw(width, height, raw).ok_or(RenderError::Size {
        width: width as usize,
        height: height as usize,
    })
}

#[inline]
fn unpack(value: i32) -> [u8; 3] {
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

/// Gray image from samples in `0..=65535`, keeping the high byte.
pub fn to_grayscale(slice: &Array2<i32>) -> Result<GrayImage, RenderError> {
    let pixels: Vec<u8> = slice
        .into_par_iter()
        .map(|&v| (v.clamp(0, 65535) >> 8) as u8)
        .collect();
    buffer(slice, pixels)
}

/// Colour image from packed 24-bit samples.
pub fn to_rgb(slice: &Array2<i32>) -> Result<RgbImage, RenderError> {
    let pixels: Vec<u8> = slice.into_par_iter().flat_map_iter(|&v| unpack(v)).collect();
    buffer(slice, pixels)
}

/// Colour image from label ids. Ids missing from the palette are black.
pub fn to_labels(slice: &Array2<i32>, palette: &LabelPalette) -> Result<RgbImage, RenderError> {
    let missing = AtomicUsize::new(0);
    let pixels: Vec<u8> = slice
        .into_par_iter()
        .flat_map_iter(|&id| match palette.get(id) {
            Some(label) => label.rgb,
            None => {
                missing.fetch_add(1, Ordering::Relaxed);
                [0; 3]
            }
        })
        .collect();
    let missing = missing.into_inner();
    if missing > 0 {
        warn!(missing, "pixels carry ids that are not in the label palette");
    }
    buffer(slice, pixels)
}

pub fn render(
    slice: &Array2<i32>,
    mode: OutputMode,
    palette: Option<&LabelPalette>,
) -> Result<DynamicImage, RenderError> {
    Ok(match mode {
        OutputMode::Grayscale => DynamicImage::ImageLuma8(to_grayscale(slice)?),
        OutputMode::Rgb => DynamicImage::ImageRgb8(to_rgb(slice)?),
        OutputMode::Labels => {
            let palette = palette.ok_or(RenderError::MissingPalette)?;
            DynamicImage::ImageRgb8(to_labels(slice, palette)?)
        }
    })
}

/// Dumps a zlib stream holding `width`, `height` (u32) followed by the
/// samples row by row, all little endian.
pub fn write_raw(slice: &Array2<i32>, writer: impl Write) -> Result<(), RenderError> {
    let (width, height) = dimensions(slice)?;
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    encoder.write_u32::<LittleEndian>(width)?;
    encoder.write_u32::<LittleEndian>(height)?;
    for &value in slice {
        encoder.write_i32::<LittleEndian>(value)?;
    }
    encoder.finish()?.flush()?;
    Ok(())
}

pub fn save_raw(slice: &Array2<i32>, path: impl AsRef<Path>) -> Result<(), RenderError> {
    write_raw(slice, BufWriter::new(File::create(path.as_ref())?))
}
