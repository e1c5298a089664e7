//! Fixtures shared by unit tests

use std::io::{self, Cursor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::Document;
use tower::ServiceExt;

use crate::config::{Config, StorageBackend};
use crate::routes;
use crate::state::AppState;
use crate::storage::{ArtifactId, ArtifactStorage, MemoryArtifactStorage, StoreError};

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, format).unwrap();
    cursor.into_inner()
}

pub fn png_bytes(width: u32, height: u32, alpha: bool) -> Vec<u8> {
    let image = if alpha {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8, y as u8, 200, if (x + y) % 2 == 0 { 255 } else { 64 }])
        }))
    } else {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, 120])
        }))
    };
    encode(image, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([180, 40, 90]));
    encode(DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
}

pub fn gray_jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = GrayImage::from_pixel(width, height, Luma([128]));
    encode(DynamicImage::ImageLuma8(image), ImageFormat::Jpeg)
}

/// MediaBox width/height of every page, in page order
pub fn page_sizes(pdf: &[u8]) -> Vec<(i64, i64)> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|page_id| {
            let page = doc.get_object(*page_id).unwrap().as_dict().unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            assert_eq!(media_box[0].as_i64().unwrap(), 0);
            assert_eq!(media_box[1].as_i64().unwrap(), 0);
            (
                media_box[2].as_i64().unwrap(),
                media_box[3].as_i64().unwrap(),
            )
        })
        .collect()
}

/// Filter of the image drawn on every page, in page order
pub fn image_filters(pdf: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|page_id| {
            let page = doc.get_object(*page_id).unwrap().as_dict().unwrap();
            let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
            let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
            let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
            let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
            let filter = stream.dict.get(b"Filter").unwrap().as_name().unwrap();
            String::from_utf8_lossy(filter).into_owned()
        })
        .collect()
}

pub const MULTIPART_BOUNDARY: &str = "pdfdrop-test-boundary";

/// One encoded `multipart/form-data` part
pub fn form_part(
    name: &str,
    file_name: Option<&str>,
    content_type: Option<&str>,
    data: &[u8],
) -> Vec<u8> {
    let mut head = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
        MULTIPART_BOUNDARY, name
    );
    if let Some(file_name) = file_name {
        head.push_str(&format!("; filename=\"{}\"", file_name));
    }
    head.push_str("\r\n");
    if let Some(content_type) = content_type {
        head.push_str(&format!("Content-Type: {}\r\n", content_type));
    }
    head.push_str("\r\n");

    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(data);
    bytes.extend_from_slice(b"\r\n");
    bytes
}

/// Join parts and append the closing boundary
pub fn form_body(parts: Vec<Vec<u8>>) -> Vec<u8> {
    let mut body: Vec<u8> = parts.into_iter().flatten().collect();
    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

pub fn form_content_type() -> String {
    format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY)
}

/// App state over the in-memory backend
pub fn memory_state(retention: Duration) -> AppState {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config.storage.retention = retention;
    AppState::from_config(config)
}

/// Run one request through the full router
pub async fn call(state: &AppState, request: Request<Body>) -> Response {
    routes::app(state.clone()).oneshot(request).await.unwrap()
}

/// Run one request and collect the body
pub async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = call(state, request).await;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

/// `POST /api/upload` carrying the given parts
pub fn upload_request(parts: Vec<Vec<u8>>) -> Request<Body> {
    Request::post("/api/upload")
        .header("content-type", form_content_type())
        .body(Body::from(form_body(parts)))
        .unwrap()
}

/// In-memory backend with injectable failures
///
/// Each counter is the number of upcoming calls that fail; `usize::MAX`
/// means every call.
#[derive(Default)]
pub struct FaultyStorage {
    inner: MemoryArtifactStorage,
    pub failed_writes: AtomicUsize,
    pub collisions: AtomicUsize,
    pub failed_removes: AtomicUsize,
}

impl FaultyStorage {
    pub fn failing_writes(count: usize) -> Self {
        let storage = Self::default();
        storage.failed_writes.store(count, Ordering::SeqCst);
        storage
    }

    pub fn colliding(count: usize) -> Self {
        let storage = Self::default();
        storage.collisions.store(count, Ordering::SeqCst);
        storage
    }

    pub fn failing_removes(count: usize) -> Self {
        let storage = Self::default();
        storage.failed_removes.store(count, Ordering::SeqCst);
        storage
    }
}

/// Consume one pending failure, if any
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
            0 => None,
            usize::MAX => Some(usize::MAX),
            n => Some(n - 1),
        })
        .is_ok()
}

#[async_trait::async_trait]
impl ArtifactStorage for FaultyStorage {
    async fn write_new(&self, id: &ArtifactId, data: Bytes) -> Result<(), StoreError> {
        if take_failure(&self.failed_writes) {
            return Err(StoreError::Io(io::Error::other("disk full")));
        }
        if take_failure(&self.collisions) {
            return Err(StoreError::Collision(id.clone()));
        }
        self.inner.write_new(id, data).await
    }

    async fn read(&self, id: &ArtifactId) -> Result<Option<Bytes>, StoreError> {
        self.inner.read(id).await
    }

    async fn remove(&self, id: &ArtifactId) -> Result<bool, StoreError> {
        if take_failure(&self.failed_removes) {
            return Err(StoreError::Io(io::Error::other("device busy")));
        }
        self.inner.remove(id).await
    }

    async fn exists(&self, id: &ArtifactId) -> bool {
        self.inner.exists(id).await
    }

    async fn purge(&self) -> Result<usize, StoreError> {
        self.inner.purge().await
    }

    fn name(&self) -> &'static str {
        "faulty"
    }
}
