//! PDF assembly
//!
//! One page per image, in input order. Each page's MediaBox is the image's
//! pixel size and the image is drawn at the origin with the matrix
//! `w 0 0 h 0 0`, so one pixel maps to one PDF unit.

use chrono::Utc;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use super::types::{AssembledPdf, AssemblyError, ColorSpace, ImageData, PreparedImage};
use crate::upload::{AcceptableImage, ImageKind};

const PDF_VERSION: &str = "1.5";
const PRODUCER: &str = "pdfdrop-server";
/// Resource name of the page image
const IMAGE_RESOURCE: &str = "Im0";

// ============================================================================
// Assembler
// ============================================================================

/// Builds one PDF from an ordered batch of images
///
/// Decoding runs on the blocking pool, one task per image; pages are laid
/// out in input order regardless of which decode finishes first.
#[derive(Debug, Clone, Default)]
pub struct Assembler;

impl Assembler {
    pub fn new() -> Self {
        Self
    }

    pub async fn assemble(&self, images: &[AcceptableImage]) -> Result<AssembledPdf, AssemblyError> {
        if images.is_empty() {
            return Err(AssemblyError::Empty);
        }

        let decodes = images.iter().map(|image| {
            let index = image.index();
            let kind = image.kind;
            let path = image.path().to_path_buf();

            async move {
                let task = tokio::task::spawn_blocking(move || {
                    let data = std::fs::read(&path)
                        .map_err(|source| AssemblyError::Read { index, source })?;
                    PreparedImage::decode(index, kind, data)
                });

                match task.await {
                    Ok(result) => result,
                    Err(e) => Err(AssemblyError::Task(e.to_string())),
                }
            }
        });

        // try_join_all yields results in input order
        let prepared = futures::future::try_join_all(decodes).await?;
        let pages = prepared.len();

        tracing::debug!(pages, "Images decoded, writing PDF");

        let bytes = match tokio::task::spawn_blocking(move || write_document(prepared)).await {
            Ok(result) => result?,
            Err(e) => return Err(AssemblyError::Task(e.to_string())),
        };

        Ok(AssembledPdf { bytes, pages })
    }

    /// Decode and write in the calling thread
    pub fn assemble_blocking(
        &self,
        images: Vec<(ImageKind, Vec<u8>)>,
    ) -> Result<AssembledPdf, AssemblyError> {
        let prepared = images
            .into_iter()
            .enumerate()
            .map(|(index, (kind, data))| PreparedImage::decode(index, kind, data))
            .collect::<Result<Vec<_>, _>>()?;

        let pages = prepared.len();
        let bytes = write_document(prepared)?;
        Ok(AssembledPdf { bytes, pages })
    }
}

// ============================================================================
// Document Writer
// ============================================================================

/// Write prepared images as a PDF, one page each, in the given order
pub fn write_document(images: Vec<PreparedImage>) -> Result<Vec<u8>, AssemblyError> {
    if images.is_empty() {
        return Err(AssemblyError::Empty);
    }

    let mut doc = Document::with_version(PDF_VERSION);
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for image in images {
        let width = i64::from(image.width);
        let height = i64::from(image.height);
        let image_id = add_image(&mut doc, image);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(IMAGE_RESOURCE.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| AssemblyError::Encode(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width),
                Object::Integer(height),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    IMAGE_RESOURCE => image_id,
                },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Producer" => Object::string_literal(PRODUCER),
        "CreationDate" => Object::string_literal(
            Utc::now().format("D:%Y%m%d%H%M%SZ").to_string()
        ),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| AssemblyError::Encode(e.to_string()))?;

    Ok(bytes)
}

/// Add an image XObject (and its soft mask, if any)
fn add_image(doc: &mut Document, image: PreparedImage) -> ObjectId {
    let mut dict = image_dictionary(image.width, image.height);

    match image.data {
        ImageData::Dct {
            data,
            color_space,
            inverted,
        } => {
            dict.set("ColorSpace", color_space.pdf_name());
            dict.set("Filter", "DCTDecode");
            if inverted {
                let decode: Vec<Object> = (0..color_space.components())
                    .flat_map(|_| [Object::Integer(1), Object::Integer(0)])
                    .collect();
                dict.set("Decode", decode);
            }
            doc.add_object(Stream::new(dict, data))
        }
        ImageData::Flate {
            samples,
            color_space,
            alpha,
        } => {
            dict.set("ColorSpace", color_space.pdf_name());
            dict.set("Filter", "FlateDecode");
            if let Some(alpha) = alpha {
                let mut mask = image_dictionary(image.width, image.height);
                mask.set("ColorSpace", ColorSpace::Gray.pdf_name());
                mask.set("Filter", "FlateDecode");
                let mask_id = doc.add_object(Stream::new(mask, alpha));
                dict.set("SMask", mask_id);
            }
            doc.add_object(Stream::new(dict, samples))
        }
    }
}

fn image_dictionary(width: u32, height: u32) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "BitsPerComponent" => 8i64,
    }
}

// ============================================================================
// Tests
// ============================================================================
