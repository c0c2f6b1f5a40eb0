//! Raster inputs: TIFF directories, embedded resolution, page decoding.
//!
//! Multi-page TIFF goes through the `tiff` crate directly so each directory
//! (IFD) becomes one page; everything else is read with `image`.

use image::{DynamicImage, GenericImageView, ImageBuffer, ImageDecoder};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType as TiffColorType;

/// Page count and resolution of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiffInfo {
    pub pages: usize,
    pub dpi: Option<u32>,
}

fn tiff_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    Decoder::new(BufReader::new(file)).map_err(|e| e.to_string())
}

/// Count directories and read the first one's resolution.
pub fn tiff_info(path: &Path) -> Result<TiffInfo, String> {
    let mut decoder = tiff_decoder(path)?;
    let dpi = tiff_dpi(&mut decoder);
    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image().map_err(|e| e.to_string())?;
        pages += 1;
    }
    Ok(TiffInfo { pages, dpi })
}

fn tiff_dpi<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let (num, den) = match decoder.find_tag(Tag::XResolution).ok()?? {
        tiff::decoder::ifd::Value::Rational(n, d) => (n, d),
        _ => return None,
    };
    if den == 0 || num == 0 {
        return None;
    }
    let per_unit = num as f64 / den as f64;
    // 2 = inch (the default), 3 = centimetre, 1 = no absolute unit
    let unit = decoder.get_tag_u32(Tag::ResolutionUnit).unwrap_or(2);
    let dpi = match unit {
        3 => per_unit * 2.54,
        2 => per_unit,
        _ => return None,
    };
    Some(dpi.round() as u32)
}

/// Decode every directory of a TIFF file, first to last.
pub fn decode_tiff_pages(path: &Path) -> Result<Vec<DynamicImage>, String> {
    let mut decoder = tiff_decoder(path)?;
    let mut pages = Vec::new();
    loop {
        let (width, height) = decoder.dimensions().map_err(|e| e.to_string())?;
        let color = decoder.colortype().map_err(|e| e.to_string())?;
        let white_is_zero = decoder
            .get_tag_u32(Tag::PhotometricInterpretation)
            .map(|p| p == 0)
            .unwrap_or(false);
        let data = decoder.read_image().map_err(|e| e.to_string())?;
        pages.push(to_dynamic(data, color, width, height, white_is_zero)?);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| e.to_string())?;
    }
    Ok(pages)
}

fn to_dynamic(
    data: DecodingResult,
    color: TiffColorType,
    width: u32,
    height: u32,
    white_is_zero: bool,
) -> Result<DynamicImage, String> {
    let mismatch = || format!("{width}x{height} {color:?} page does not match its data");
    let image = match (data, color) {
        (DecodingResult::U8(bits), TiffColorType::Gray(1)) => {
            let stride = (width as usize).div_ceil(8);
            let mut pixels = Vec::with_capacity(width as usize * height as usize);
            for row in 0..height as usize {
                for col in 0..width as usize {
                    let byte = bits.get(row * stride + col / 8).copied().unwrap_or(0);
                    let set = byte & (0x80 >> (col % 8)) != 0;
                    pixels.push(if set != white_is_zero { 255 } else { 0 });
                }
            }
            DynamicImage::ImageLuma8(ImageBuffer::from_raw(width, height, pixels).ok_or_else(mismatch)?)
        }
        (DecodingResult::U8(mut data), TiffColorType::Gray(8)) => {
            if white_is_zero {
                data.iter_mut().for_each(|v| *v = 255 - *v);
            }
            DynamicImage::ImageLuma8(ImageBuffer::from_raw(width, height, data).ok_or_else(mismatch)?)
        }
        (DecodingResult::U8(data), TiffColorType::RGB(8)) => {
            DynamicImage::ImageRgb8(ImageBuffer::from_raw(width, height, data).ok_or_else(mismatch)?)
        }
        (DecodingResult::U8(data), TiffColorType::RGBA(8)) => {
            DynamicImage::ImageRgba8(ImageBuffer::from_raw(width, height, data).ok_or_else(mismatch)?)
        }
        (DecodingResult::U16(data), TiffColorType::Gray(16)) => {
            DynamicImage::ImageLuma16(ImageBuffer::from_raw(width, height, data).ok_or_else(mismatch)?)
        }
        (DecodingResult::U16(data), TiffColorType::RGB(16)) => {
            DynamicImage::ImageRgb16(ImageBuffer::from_raw(width, height, data).ok_or_else(mismatch)?)
        }
        (DecodingResult::U16(data), TiffColorType::RGBA(16)) => {
            DynamicImage::ImageRgba16(ImageBuffer::from_raw(width, height, data).ok_or_else(mismatch)?)
        }
        (_, other) => return Err(format!("unsupported TIFF color type {other:?}")),
    };
    Ok(image)
}

/// Write pages as one multi-directory TIFF. Grayscale pages stay 8-bit gray,
/// the rest are written as RGB.
pub fn write_tiff_pages(path: &Path, pages: &[DynamicImage]) -> Result<(), String> {
    use tiff::encoder::{colortype, TiffEncoder};

    let file = File::create(path).map_err(|e| e.to_string())?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(|e| e.to_string())?;
    for page in pages {
        let (w, h) = page.dimensions();
        if page.color().has_color() {
            let rgb = page.to_rgb8();
            encoder
                .write_image::<colortype::RGB8>(w, h, rgb.as_raw())
                .map_err(|e| e.to_string())?;
        } else {
            let gray = page.to_luma8();
            encoder
                .write_image::<colortype::Gray8>(w, h, gray.as_raw())
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

/// Dimensions and bytes per pixel of a non-TIFF image, read from its header.
pub fn image_header(path: &Path) -> Result<(u32, u32, u32), String> {
    let reader = image::ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| e.to_string())?;
    let decoder = reader.into_decoder().map_err(|e| e.to_string())?;
    let (w, h) = decoder.dimensions();
    let color = decoder.color_type();
    // bilevel, gray and paletted images cost one byte a pixel once loaded
    let bpp = if color.has_color() || color.has_alpha() { 4 } else { 1 };
    Ok((w, h, bpp))
}

/// Resolution recorded in a PNG `pHYs` chunk or a JPEG JFIF header.
pub fn embedded_dpi(path: &Path) -> Option<u32> {
    let mut head = Vec::with_capacity(64 * 1024);
    File::open(path)
        .ok()?
        .take(64 * 1024)
        .read_to_end(&mut head)
        .ok()?;
    png_dpi(&head).or_else(|| jfif_dpi(&head))
}

fn be32(b: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(b.get(..4)?.try_into().ok()?))
}

fn png_dpi(bytes: &[u8]) -> Option<u32> {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    let mut rest = bytes.strip_prefix(SIGNATURE)?;
    while rest.len() >= 8 {
        let len = be32(rest)? as usize;
        let kind = rest.get(4..8)?;
        let data = rest.get(8..8 + len)?;
        match kind {
            b"pHYs" if len >= 9 => {
                let ppu = be32(data)?;
                // unit 1 = metre
                return (data[8] == 1 && ppu > 0).then(|| (ppu as f64 * 0.0254).round() as u32);
            }
            b"IDAT" | b"IEND" => return None,
            _ => {}
        }
        rest = rest.get(12 + len..)?;
    }
    None
}

fn jfif_dpi(bytes: &[u8]) -> Option<u32> {
    if bytes.get(..2)? != [0xFF, 0xD8] {
        return None;
    }
    let pos = bytes.windows(5).position(|w| w == b"JFIF\0")?;
    let units = *bytes.get(pos + 7)?;
    let density = u16::from_be_bytes([*bytes.get(pos + 8)?, *bytes.get(pos + 9)?]) as f64;
    match units {
        1 if density > 0.0 => Some(density as u32),
        2 if density > 0.0 => Some((density * 2.54).round() as u32),
        _ => None,
    }
}
