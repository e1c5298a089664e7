//! PDF module
//!
//! Builds a PDF from uploaded images, one page per image:
//! - `raster`: decoding and per-format encoding of page images
//! - `assembler`: page layout and document writing via lopdf

pub mod assembler;
pub mod raster;
pub mod types;

pub use assembler::{write_document, Assembler};
pub use types::*;
