//! Camera and file image sources.
//!
//! A [`CaptureHandle`] is the only owner of a live stream. The stream is
//! stopped exactly once: after a successful frame capture, on an explicit
//! release, or when the handle goes out of scope, whichever happens first.

use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use tutor_contracts::request::EncodedImage;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("no active camera stream")]
    NoActiveStream,
    #[error("unsupported image: {0}")]
    UnsupportedFormat(String),
}

/// One raw RGB8 frame sampled from a live source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
    fn stop(&mut self);
}

pub trait CaptureDevice: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError>;
}

pub struct CaptureHandle {
    stream: Option<Box<dyn FrameSource>>,
    claim: Arc<AtomicBool>,
}

impl CaptureHandle {
    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Stops the stream. Returns `false` if it was already released.
    pub fn release(&mut self) -> bool {
        let Some(mut stream) = self.stream.take() else {
            return false;
        };
        stream.stop();
        self.claim.store(false, Ordering::Release);
        true
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owns the capture device and hands out at most one live handle at a time.
#[derive(Clone)]
pub struct MediaCapture {
    device: Arc<dyn CaptureDevice>,
    claim: Arc<AtomicBool>,
    jpeg_quality: u8,
}

impl MediaCapture {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            claim: Arc::new(AtomicBool::new(false)),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn without_camera() -> Self {
        Self::new(Arc::new(NoCamera))
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn is_busy(&self) -> bool {
        self.claim.load(Ordering::Acquire)
    }

    pub fn start_capture(&self) -> Result<CaptureHandle, CaptureError> {
        if self
            .claim
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::DeviceUnavailable(
                "camera is already in use".to_string(),
            ));
        }
        match self.device.open() {
            Ok(stream) => Ok(CaptureHandle {
                stream: Some(stream),
                claim: Arc::clone(&self.claim),
            }),
            Err(err) => {
                self.claim.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Samples one frame as JPEG and releases the stream (single shot).
    pub fn capture_frame(&self, handle: &mut CaptureHandle) -> Result<EncodedImage, CaptureError> {
        let stream = handle
            .stream
            .as_mut()
            .ok_or(CaptureError::NoActiveStream)?;
        let frame = stream.read_frame()?;
        let image = encode_frame(frame, self.jpeg_quality)?;
        handle.release();
        Ok(image)
    }

    pub fn release_capture(&self, handle: &mut CaptureHandle) -> bool {
        handle.release()
    }

    pub fn import_file(&self, bytes: &[u8]) -> Result<EncodedImage, CaptureError> {
        import_file(bytes)
    }

    pub fn import_data_url(&self, data_url: &str) -> Result<EncodedImage, CaptureError> {
        import_data_url(data_url)
    }
}

fn encode_frame(frame: Frame, quality: u8) -> Result<EncodedImage, CaptureError> {
    let (width, height) = (frame.width, frame.height);
    let buffer = RgbImage::from_raw(width, height, frame.rgb).ok_or_else(|| {
        CaptureError::UnsupportedFormat(format!("frame buffer does not match {width}x{height}"))
    })?;
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&buffer)
        .map_err(|err| CaptureError::UnsupportedFormat(format!("jpeg encode failed: {err}")))?;
    Ok(EncodedImage::new("image/jpeg", bytes))
}

/// Decodes arbitrary file bytes. PNG, JPEG and WebP pass through untouched;
/// any other decodable format is re-encoded as PNG.
pub fn import_file(bytes: &[u8]) -> Result<EncodedImage, CaptureError> {
    let format = image::guess_format(bytes)
        .map_err(|err| CaptureError::UnsupportedFormat(err.to_string()))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| CaptureError::UnsupportedFormat(err.to_string()))?;
    match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP => {
            Ok(EncodedImage::new(format.to_mime_type(), bytes.to_vec()))
        }
        _ => {
            let mut out = Cursor::new(Vec::new());
            decoded
                .write_to(&mut out, ImageFormat::Png)
                .map_err(|err| CaptureError::UnsupportedFormat(err.to_string()))?;
            Ok(EncodedImage::new("image/png", out.into_inner()))
        }
    }
}

/// Accepts `data:<mime>;base64,<payload>` as produced by browser file readers.
pub fn import_data_url(data_url: &str) -> Result<EncodedImage, CaptureError> {
    let invalid = || CaptureError::UnsupportedFormat("not a base64 image data URL".to_string());
    let rest = data_url.trim().strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    if !header.ends_with(";base64") {
        return Err(invalid());
    }
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|err| CaptureError::UnsupportedFormat(format!("base64 decode failed: {err}")))?;
    import_file(&bytes)
}

struct NoCamera;

impl CaptureDevice for NoCamera {
    fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        Err(CaptureError::DeviceUnavailable(
            "no capture device configured".to_string(),
        ))
    }
}

/// Treats an image file as the live frame source, re-read on every sample.
/// Useful with tools that keep a webcam snapshot on disk.
pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureDevice for StillImageCamera {
    fn open(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        if !self.path.is_file() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} is not readable",
                self.path.display()
            )));
        }
        Ok(Box::new(StillImageStream {
            path: self.path.clone(),
        }))
    }
}

struct StillImageStream {
    path: PathBuf,
}

impl FrameSource for StillImageStream {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let decoded = image::open(&self.path).map_err(|err| {
            CaptureError::DeviceUnavailable(format!(
                "failed reading frame from {}: {err}",
                self.path.display()
            ))
        })?;
        let rgb = decoded.to_rgb8();
        Ok(Frame {
            width: rgb.width(),
            height: rgb.height(),
            rgb: rgb.into_raw(),
        })
    }

    fn stop(&mut self) {}
}
