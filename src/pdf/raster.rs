//! Raster image preparation
//!
//! Decodes each upload with its declared format. Dimensions always come from
//! the decoded bytes. JPEGs keep their original stream; PNGs are re-encoded
//! losslessly as Flate samples plus an optional alpha soft mask.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::DynamicImage;

use super::types::{AssemblyError, ColorSpace, ImageData, PreparedImage};
use crate::upload::ImageKind;

impl PreparedImage {
    /// Decode and prepare one image
    pub fn decode(index: usize, kind: ImageKind, data: Vec<u8>) -> Result<Self, AssemblyError> {
        let decoded = image::load_from_memory_with_format(&data, kind.image_format())
            .map_err(|e| AssemblyError::Decode {
                index,
                reason: e.to_string(),
            })?;

        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(AssemblyError::Decode {
                index,
                reason: "image has no pixels".to_string(),
            });
        }

        let data = match kind {
            ImageKind::Jpeg => jpeg_stream(index, data, width, height)?,
            ImageKind::Png => flate_samples(&decoded)?,
        };

        Ok(Self {
            index,
            width,
            height,
            data,
        })
    }
}

// ============================================================================
// JPEG
// ============================================================================

/// Frame header fields needed to embed a JPEG stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JpegFrame {
    width: u16,
    height: u16,
    components: u8,
    adobe: bool,
}

fn jpeg_stream(index: usize, data: Vec<u8>, width: u32, height: u32) -> Result<ImageData, AssemblyError> {
    let frame = parse_jpeg_frame(&data).ok_or_else(|| AssemblyError::Decode {
        index,
        reason: "missing JPEG frame header".to_string(),
    })?;

    if u32::from(frame.width) != width || u32::from(frame.height) != height {
        return Err(AssemblyError::Decode {
            index,
            reason: format!(
                "frame header {}x{} disagrees with decoded {}x{}",
                frame.width, frame.height, width, height
            ),
        });
    }

    let color_space = match frame.components {
        1 => ColorSpace::Gray,
        3 => ColorSpace::Rgb,
        4 => ColorSpace::Cmyk,
        n => {
            return Err(AssemblyError::Decode {
                index,
                reason: format!("unsupported JPEG component count {}", n),
            })
        }
    };

    Ok(ImageData::Dct {
        data,
        color_space,
        inverted: color_space == ColorSpace::Cmyk && frame.adobe,
    })
}

/// Walk JPEG marker segments up to the first start-of-frame
fn parse_jpeg_frame(data: &[u8]) -> Option<JpegFrame> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    let mut adobe = false;

    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            // fill byte
            pos += 1;
            continue;
        }
        pos += 2;

        match marker {
            0x01 | 0xD0..=0xD7 => continue,
            // EOI or SOS before any frame header
            0xD9 | 0xDA => return None,
            _ => {}
        }

        let length = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));
        if length < 2 || pos + length > data.len() {
            return None;
        }
        let segment = &data[pos + 2..pos + length];

        match marker {
            0xEE if segment.starts_with(b"Adobe") => adobe = true,
            // SOF0..SOF15, excluding DHT, JPG and DAC
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                if segment.len() < 6 {
                    return None;
                }
                return Some(JpegFrame {
                    height: u16::from_be_bytes([segment[1], segment[2]]),
                    width: u16::from_be_bytes([segment[3], segment[4]]),
                    components: segment[5],
                    adobe,
                });
            }
            _ => {}
        }

        pos += length;
    }

    None
}

// ============================================================================
// PNG
// ============================================================================

fn flate_samples(image: &DynamicImage) -> Result<ImageData, AssemblyError> {
    let color = image.color();

    let (color_space, samples) = if color.has_color() {
        (ColorSpace::Rgb, image.to_rgb8().into_raw())
    } else {
        (ColorSpace::Gray, image.to_luma8().into_raw())
    };

    let alpha = if color.has_alpha() {
        let channel: Vec<u8> = image.to_rgba8().pixels().map(|pixel| pixel.0[3]).collect();
        Some(deflate(&channel)?)
    } else {
        None
    };

    Ok(ImageData::Flate {
        samples: deflate(&samples)?,
        color_space,
        alpha,
    })
}

fn deflate(raw: &[u8]) -> Result<Vec<u8>, AssemblyError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder
        .write_all(raw)
        .map_err(|e| AssemblyError::Encode(format!("deflate failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| AssemblyError::Encode(format!("deflate failed: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{gray_jpeg_bytes, jpeg_bytes, png_bytes};
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_parse_jpeg_frame() {
        let data = jpeg_bytes(40, 30);
        let frame = parse_jpeg_frame(&data).unwrap();
        assert_eq!((frame.width, frame.height, frame.components), (40, 30, 3));

        let gray = gray_jpeg_bytes(7, 9);
        let frame = parse_jpeg_frame(&gray).unwrap();
        assert_eq!((frame.width, frame.height, frame.components), (7, 9, 1));
    }

    #[test]
    fn test_parse_jpeg_frame_rejects_garbage() {
        assert!(parse_jpeg_frame(b"").is_none());
        assert!(parse_jpeg_frame(b"\x89PNG\r\n\x1a\n").is_none());
        assert!(parse_jpeg_frame(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]).is_none());
    }

    #[test]
    fn test_jpeg_kept_unchanged() {
        let data = jpeg_bytes(40, 30);
        let prepared = PreparedImage::decode(0, ImageKind::Jpeg, data.clone()).unwrap();

        assert_eq!((prepared.width, prepared.height), (40, 30));
        match prepared.data {
            ImageData::Dct { data: embedded, color_space, inverted } => {
                assert_eq!(embedded, data);
                assert_eq!(color_space, ColorSpace::Rgb);
                assert!(!inverted);
            }
            other => panic!("expected DCT data, got {:?}", other),
        }
    }

    #[test]
    fn test_gray_jpeg_color_space() {
        let prepared = PreparedImage::decode(0, ImageKind::Jpeg, gray_jpeg_bytes(5, 5)).unwrap();
        assert!(matches!(
            prepared.data,
            ImageData::Dct { color_space: ColorSpace::Gray, .. }
        ));
    }

    #[test]
    fn test_png_rgb_samples() {
        let prepared = PreparedImage::decode(3, ImageKind::Png, png_bytes(4, 2, false)).unwrap();

        assert_eq!(prepared.index, 3);
        assert_eq!((prepared.width, prepared.height), (4, 2));
        match prepared.data {
            ImageData::Flate { samples, color_space, alpha } => {
                assert_eq!(color_space, ColorSpace::Rgb);
                assert_eq!(inflate(&samples).len(), 4 * 2 * 3);
                assert!(alpha.is_none());
            }
            other => panic!("expected Flate data, got {:?}", other),
        }
    }

    #[test]
    fn test_png_alpha_becomes_soft_mask() {
        let prepared = PreparedImage::decode(0, ImageKind::Png, png_bytes(3, 3, true)).unwrap();

        match prepared.data {
            ImageData::Flate { alpha: Some(alpha), .. } => {
                assert_eq!(inflate(&alpha).len(), 9);
            }
            other => panic!("expected alpha channel, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_image_fails() {
        let result = PreparedImage::decode(2, ImageKind::Png, b"not a png".to_vec());
        assert!(matches!(result, Err(AssemblyError::Decode { index: 2, .. })));
    }

    #[test]
    fn test_mislabeled_image_fails() {
        let result = PreparedImage::decode(0, ImageKind::Jpeg, png_bytes(4, 4, false));
        assert!(matches!(result, Err(AssemblyError::Decode { .. })));
    }
}
