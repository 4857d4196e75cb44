use std::io::Cursor;

use crate::error::RenderError;

/// Encode device levels (`0..levels`, one byte per pixel) as a grayscale
/// PNG at the smallest bit depth that holds them.
///
/// `invert` maps level 0 to white, for subtractive devices where a level
/// counts ink.
pub fn encode_levels(
    width: u32,
    height: u32,
    levels: u32,
    pixels: &[u8],
    invert: bool,
) -> Result<Vec<u8>, RenderError> {
    if width == 0 || height == 0 || pixels.len() != width as usize * height as usize {
        return Err(RenderError::UnsupportedDimensions { width, height });
    }
    let (bit_depth, bits) = match levels {
        0..=2 => (png::BitDepth::One, 1),
        3..=4 => (png::BitDepth::Two, 2),
        5..=16 => (png::BitDepth::Four, 4),
        _ => (png::BitDepth::Eight, 8),
    };
    let top = (1u32 << bits) - 1;
    let max_level = levels.saturating_sub(1).max(1);
    let samples: Vec<u8> = pixels
        .iter()
        .map(|&p| {
            let p = (p as u32).min(max_level);
            let p = if invert { max_level - p } else { p };
            ((p * top + max_level / 2) / max_level) as u8
        })
        .collect();
    let packed = if bits == 8 {
        samples
    } else {
        pack_nbits(&samples, width, bits)
    };
    let png_bytes = encode_png(width, height, bit_depth, &packed)?;
    Ok(optimize(png_bytes))
}

/// Encode an 8-bit grayscale image.
pub fn encode_gray8(width: u32, height: u32, pixels: &[u8]) -> Result<Vec<u8>, RenderError> {
    if width == 0 || height == 0 || pixels.len() != width as usize * height as usize {
        return Err(RenderError::UnsupportedDimensions { width, height });
    }
    let png_bytes = encode_png(width, height, png::BitDepth::Eight, pixels)?;
    Ok(optimize(png_bytes))
}

/// Re-compress with oxipng; keep the original if that fails.
fn optimize(png_bytes: Vec<u8>) -> Vec<u8> {
    oxipng::optimize_from_memory(
        &png_bytes,
        &oxipng::Options {
            strip: oxipng::StripChunks::Safe,
            optimize_alpha: false,
            ..Default::default()
        },
    )
    .unwrap_or(png_bytes)
}

fn encode_png(
    width: u32,
    height: u32,
    bit_depth: png::BitDepth,
    packed: &[u8],
) -> Result<Vec<u8>, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = png::Encoder::new(&mut buf, width, height);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(bit_depth);
        encoder.set_compression(png::Compression::Fast);
        encoder.set_filter(png::FilterType::NoFilter);
        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::PngEncode(e.to_string()))?;
        writer
            .write_image_data(packed)
            .map_err(|e| RenderError::PngEncode(e.to_string()))?;
    }
    Ok(buf.into_inner())
}

/// Pack sample values into N-bit PNG row data (1, 2, or 4 bits per pixel).
fn pack_nbits(samples: &[u8], width: u32, bits: u8) -> Vec<u8> {
    let pixels_per_byte = 8 / bits as usize;
    let bytes_per_row = (width as usize).div_ceil(pixels_per_byte);
    let height = samples.len() / width as usize;
    let mask = (1u8 << bits) - 1;
    let mut packed = Vec::with_capacity(bytes_per_row * height);

    for row in samples.chunks(width as usize) {
        let mut byte = 0u8;
        for (i, &v) in row.iter().enumerate() {
            let shift = (8 - bits) - (i % pixels_per_byte) as u8 * bits;
            byte |= (v & mask) << shift;

            if (i % pixels_per_byte) == pixels_per_byte - 1 || i == row.len() - 1 {
                packed.push(byte);
                byte = 0;
            }
        }
    }

    packed
}
