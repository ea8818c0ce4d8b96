//! Raster image decoding into PDF image XObjects
//!
//! PNG pixels are decoded, split into color and alpha planes and
//! Flate-compressed. JPEG data is embedded as-is with a DCTDecode filter.

use std::io::{Cursor, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegDecoder;
use image::{ExtendedColorType, ImageDecoder};
use lopdf::{Dictionary, Object, Stream};

use crate::error::PdfToolsError;

/// A decoded raster ready to be added to a document
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub(crate) image: Stream,
    pub(crate) soft_mask: Option<Stream>,
}

/// Decode a PNG into a Flate-compressed image stream (plus soft mask for alpha)
pub fn decode_png(bytes: &[u8]) -> Result<RasterImage, PdfToolsError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| PdfToolsError::ImageError(e.to_string()))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buf)
        .map_err(|e| PdfToolsError::ImageError(e.to_string()))?;
    let pixels = &buf[..frame.buffer_size()];
    let (width, height) = (frame.width, frame.height);

    if width == 0 || height == 0 {
        return Err(PdfToolsError::ImageError("Image has no pixels".into()));
    }

    let (color_space, channels, has_alpha) = match frame.color_type {
        png::ColorType::Grayscale => ("DeviceGray", 1, false),
        png::ColorType::GrayscaleAlpha => ("DeviceGray", 1, true),
        png::ColorType::Rgb => ("DeviceRGB", 3, false),
        png::ColorType::Rgba => ("DeviceRGB", 3, true),
        png::ColorType::Indexed => {
            return Err(PdfToolsError::ImageError(
                "Palette was not expanded".into(),
            ))
        }
    };

    let stride = channels + usize::from(has_alpha);
    let pixel_count = (width as usize) * (height as usize);
    let mut color = Vec::with_capacity(pixel_count * channels);
    let mut alpha = Vec::with_capacity(if has_alpha { pixel_count } else { 0 });

    for px in pixels.chunks_exact(stride) {
        color.extend_from_slice(&px[..channels]);
        if has_alpha {
            alpha.push(px[channels]);
        }
    }

    let image = flate_image_stream(&color, width, height, color_space)?;
    let soft_mask = if has_alpha && alpha.iter().any(|&a| a != u8::MAX) {
        Some(flate_image_stream(&alpha, width, height, "DeviceGray")?)
    } else {
        None
    };

    Ok(RasterImage {
        width,
        height,
        image,
        soft_mask,
    })
}

/// Wrap JPEG bytes in a DCTDecode image stream
pub fn decode_jpeg(bytes: &[u8]) -> Result<RasterImage, PdfToolsError> {
    let decoder =
        JpegDecoder::new(Cursor::new(bytes)).map_err(|e| PdfToolsError::ImageError(e.to_string()))?;
    let (width, height) = decoder.dimensions();

    if width == 0 || height == 0 {
        return Err(PdfToolsError::ImageError("Image has no pixels".into()));
    }

    let (color_space, cmyk) = match decoder.original_color_type() {
        ExtendedColorType::L8 | ExtendedColorType::L16 => ("DeviceGray", false),
        ExtendedColorType::Cmyk8 => ("DeviceCMYK", true),
        _ => ("DeviceRGB", false),
    };

    let mut dict = image_dictionary(width, height, color_space);
    dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    if cmyk {
        // Adobe CMYK JPEGs store inverted components
        dict.set(
            "Decode",
            Object::Array([1, 0, 1, 0, 1, 0, 1, 0].into_iter().map(Object::Integer).collect()),
        );
    }

    let mut image = Stream::new(dict, bytes.to_vec());
    image.allows_compression = false;

    Ok(RasterImage {
        width,
        height,
        image,
        soft_mask: None,
    })
}

fn image_dictionary(width: u32, height: u32, color_space: &str) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict
}

fn flate_image_stream(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &str,
) -> Result<Stream, PdfToolsError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PdfToolsError::ImageError(format!("Failed to compress pixels: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| PdfToolsError::ImageError(format!("Failed to finish compression: {}", e)))?;

    let mut dict = image_dictionary(width, height, color_space);
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));

    let mut stream = Stream::new(dict, compressed);
    stream.allows_compression = false;
    Ok(stream)
}
