//! # LSB Marker
//!
//! Writes and detects a short tag in the least significant bits of an
//! image's RGB channels. The stand-in cloaking endpoint stamps every image it
//! returns; the stand-in verification endpoint looks for the stamp.
//!
//! ## Layout
//!
//! ```text
//! [4 bytes: tag length, big-endian] [N bytes: tag]
//! ```
//!
//! One bit per channel, R → G → B → next pixel, row-major, MSB first. Alpha
//! is left alone. The result is always re-encoded as PNG so the bits
//! survive.

use anyhow::Result;
use image::{GenericImageView, RgbaImage};

pub const MARKER: &[u8] = b"invisiface";

const LENGTH_PREFIX: usize = 4;

/// Stamp [`MARKER`] into `image_bytes` and return PNG bytes.
///
/// # Errors
/// - The bytes are not a decodable image
/// - The image has fewer than `(4 + MARKER.len()) * 8 / 3` pixels
pub fn embed(image_bytes: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(image_bytes)?;
    let (width, height) = img.dimensions();
    let mut img = img.to_rgba8();

    let mut payload = Vec::with_capacity(LENGTH_PREFIX + MARKER.len());
    payload.extend_from_slice(&(MARKER.len() as u32).to_be_bytes());
    payload.extend_from_slice(MARKER);

    let available_bits = width as usize * height as usize * 3;
    let required_bits = payload.len() * 8;
    if required_bits > available_bits {
        return Err(anyhow::anyhow!(
            "Image too small to mark: need {} bits but only have {} bits available",
            required_bits,
            available_bits
        ));
    }

    let mut bits = payload
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1));

    'outer: for y in 0..height {
        for x in 0..width {
            let pixel = img.get_pixel_mut(x, y);
            for channel in 0..3 {
                match bits.next() {
                    Some(bit) => pixel[channel] = (pixel[channel] & 0xFE) | bit,
                    None => break 'outer,
                }
            }
        }
    }

    let mut output_bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut output_bytes),
        image::ImageFormat::Png,
    )?;

    Ok(output_bytes)
}

/// True if `image_bytes` decodes and carries [`MARKER`].
pub fn detect(image_bytes: &[u8]) -> Result<bool> {
    let img = image::load_from_memory(image_bytes)?.to_rgba8();
    let wanted = LENGTH_PREFIX + MARKER.len();

    let bytes = read_bytes(&img, wanted);
    if bytes.len() < wanted {
        return Ok(false);
    }

    let length = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    Ok(length == MARKER.len() && &bytes[LENGTH_PREFIX..] == MARKER)
}

/// Read up to `count` bytes from the channel LSBs.
fn read_bytes(img: &RgbaImage, count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count);
    let mut current = 0u8;
    let mut bit_index = 0;

    for pixel in img.pixels() {
        for channel in 0..3 {
            current = (current << 1) | (pixel[channel] & 1);
            bit_index += 1;
            if bit_index == 8 {
                out.push(current);
                if out.len() == count {
                    return out;
                }
                current = 0;
                bit_index = 0;
            }
        }
    }

    out
}
