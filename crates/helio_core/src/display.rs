//! Output sinks receiving finished buckets.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use helio_math::color::{self, Color};
use thiserror::Error;

/// Errors that can occur while writing an image.
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Failed to write image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Image buffer size does not match {width}x{height}")]
    Size { width: u32, height: u32 },
}

/// Receives the image as it is produced.
///
/// Methods take `&self` because buckets arrive concurrently from every
/// render worker; implementations synchronize internally. Coordinates are
/// in pixels with the origin at the top-left corner, and bucket data is row
/// major.
pub trait Display: Send + Sync {
    /// A new frame of `width` x `height` pixels is about to be rendered.
    fn image_begin(&self, width: u32, height: u32, bucket_size: u32);

    /// A worker started on the given bucket.
    fn image_prepare(&self, x: u32, y: u32, width: u32, height: u32, worker: usize);

    /// A finished bucket.
    fn image_update(&self, x: u32, y: u32, width: u32, height: u32, data: &[Color], alpha: &[f32]);

    /// Fill a region with a single value.
    fn image_fill(&self, x: u32, y: u32, width: u32, height: u32, color: Color, alpha: f32);

    /// The frame is done (or was canceled).
    fn image_end(&self);
}

/// An RGBA float image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
    pub alpha: Vec<f32>,
}

impl ImageBuffer {
    /// Create a new image buffer filled with transparent black.
    pub fn new(width: u32, height: u32) -> Self {
        let n = (width * height) as usize;
        Self {
            width,
            height,
            pixels: vec![Color::ZERO; n],
            alpha: vec![0.0; n],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Color {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn get_alpha(&self, x: u32, y: u32) -> f32 {
        self.alpha[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, color: Color, alpha: f32) {
        let i = (y * self.width + x) as usize;
        self.pixels[i] = color;
        self.alpha[i] = alpha;
    }

    /// Convert to gamma corrected RGBA bytes.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for (c, a) in self.pixels.iter().zip(&self.alpha) {
            bytes.extend_from_slice(&color::to_rgba8(*c, *a));
        }
        bytes
    }

    /// Write the image to disk; the format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<(), DisplayError> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.to_rgba()).ok_or(
            DisplayError::Size {
                width: self.width,
                height: self.height,
            },
        )?;
        image.save(path)?;
        Ok(())
    }
}

/// Keeps the frame in memory and optionally writes it out when done.
#[derive(Debug, Default)]
pub struct ImageDisplay {
    image: Mutex<Option<ImageBuffer>>,
    output: Option<PathBuf>,
}

impl ImageDisplay {
    /// An in-memory display.
    pub fn new() -> Self {
        Self::default()
    }

    /// A display that saves the frame to `path` in `image_end`.
    pub fn with_output(path: impl Into<PathBuf>) -> Self {
        Self {
            image: Mutex::new(None),
            output: Some(path.into()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ImageBuffer>> {
        self.image.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current frame, if one was started.
    pub fn image(&self) -> Option<ImageBuffer> {
        self.lock().clone()
    }

    fn write_region(&self, x: u32, y: u32, width: u32, height: u32, mut f: impl FnMut(usize) -> (Color, f32)) {
        let mut guard = self.lock();
        let Some(image) = guard.as_mut() else {
            log::warn!("Display received pixels before image_begin");
            return;
        };
        for j in 0..height {
            for i in 0..width {
                let (px, py) = (x + i, y + j);
                if px < image.width && py < image.height {
                    let (c, a) = f((j * width + i) as usize);
                    image.set(px, py, c, a);
                }
            }
        }
    }
}

impl Display for ImageDisplay {
    fn image_begin(&self, width: u32, height: u32, _bucket_size: u32) {
        *self.lock() = Some(ImageBuffer::new(width, height));
    }

    fn image_prepare(&self, _x: u32, _y: u32, _width: u32, _height: u32, _worker: usize) {}

    fn image_update(&self, x: u32, y: u32, width: u32, height: u32, data: &[Color], alpha: &[f32]) {
        self.write_region(x, y, width, height, |i| (data[i], alpha[i]));
    }

    fn image_fill(&self, x: u32, y: u32, width: u32, height: u32, color: Color, alpha: f32) {
        self.write_region(x, y, width, height, |_| (color, alpha));
    }

    fn image_end(&self) {
        let Some(path) = &self.output else {
            return;
        };
        if let Some(image) = self.lock().as_ref() {
            match image.save(path) {
                Ok(()) => log::info!("Saved image to {}", path.display()),
                Err(e) => log::error!("{}", e),
            }
        }
    }
}
