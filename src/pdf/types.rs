//! PDF assembly types

/// PDF colour spaces used for page images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorSpace {
    pub fn pdf_name(self) -> &'static str {
        match self {
            Self::Gray => "DeviceGray",
            Self::Rgb => "DeviceRGB",
            Self::Cmyk => "DeviceCMYK",
        }
    }

    pub fn components(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }
}

/// Encoded pixel data ready to become an image XObject
#[derive(Debug, Clone)]
pub enum ImageData {
    /// Original JPEG stream, embedded unchanged
    Dct {
        data: Vec<u8>,
        color_space: ColorSpace,
        /// Adobe CMYK JPEGs store inverted samples
        inverted: bool,
    },

    /// Zlib-compressed 8-bit samples
    Flate {
        samples: Vec<u8>,
        color_space: ColorSpace,
        /// Zlib-compressed 8-bit alpha channel, used as a soft mask
        alpha: Option<Vec<u8>>,
    },
}

/// A decoded image, sized and encoded for one page
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Position of the source part in the upload
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub data: ImageData,
}

/// A finished PDF
#[derive(Debug, Clone)]
pub struct AssembledPdf {
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// Assembly error types
///
/// Any of these aborts the whole batch.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("No images to assemble")]
    Empty,

    #[error("Failed to read image {index}: {source}")]
    Read {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {index}: {reason}")]
    Decode { index: usize, reason: String },

    #[error("Failed to encode PDF: {0}")]
    Encode(String),

    #[error("Assembly task failed: {0}")]
    Task(String),
}
