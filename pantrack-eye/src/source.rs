//! Frame source capability and the directory-backed reference source

use crate::error::VisionError;
use crate::frame::Frame;
use image::imageops::{self, FilterType};
use pantrack_core::CameraConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Open handle to one device. Owned by exactly one camera loop.
pub trait FrameSource: Send {
    fn device(&self) -> &str;

    fn read(&mut self) -> Result<Frame, VisionError>;

    /// Release the device. Camera loops call this on every handle they obtain,
    /// including ones whose open finished after the loop gave up waiting.
    fn close(&mut self) {}
}

/// Opens devices by identity
pub trait SourceOpener: Send + Sync {
    fn open(&self, camera: &CameraConfig) -> Result<Box<dyn FrameSource>, VisionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: u32,
    pub name: String,
}

pub const DEFAULT_PROBE_LIMIT: u32 = 10;

/// Try device indices `0..max_index`, returning those that open
pub fn probe_devices(opener: &dyn SourceOpener, max_index: u32) -> Vec<DeviceInfo> {
    let mut found = Vec::new();
    for index in 0..max_index {
        let probe = CameraConfig::new(0, index.to_string());
        match opener.open(&probe) {
            Ok(mut source) => {
                source.close();
                found.push(DeviceInfo {
                    id: index,
                    name: format!("Camera {}", index),
                });
            }
            Err(e) => debug!("Device {} not available: {}", index, e),
        }
    }
    found
}

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Replays the image files of a directory in name order, looping forever
pub struct DirectorySource {
    device: String,
    frames: Vec<PathBuf>,
    cursor: usize,
    width: u32,
    height: u32,
}

impl DirectorySource {
    pub fn open(dir: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, VisionError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| VisionError::Camera(format!("Cannot open {}: {}", dir.display(), e)))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_frame_extension(path))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(VisionError::Camera(format!(
                "No image files in {}",
                dir.display()
            )));
        }

        info!("Opened {} ({} frames)", dir.display(), frames.len());
        Ok(Self {
            device: dir.display().to_string(),
            frames,
            cursor: 0,
            width,
            height,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for DirectorySource {
    fn device(&self) -> &str {
        &self.device
    }

    fn read(&mut self) -> Result<Frame, VisionError> {
        if self.frames.is_empty() {
            return Err(VisionError::Read(format!("{} is closed", self.device)));
        }
        let path = &self.frames[self.cursor];
        self.cursor = (self.cursor + 1) % self.frames.len();

        let image = image::open(path)
            .map_err(|e| VisionError::Read(format!("{}: {}", path.display(), e)))?
            .to_rgb8();

        let image = if image.dimensions() != (self.width, self.height) && self.width > 0 && self.height > 0 {
            imageops::resize(&image, self.width, self.height, FilterType::Triangle)
        } else {
            image
        };
        Ok(Frame::new(image))
    }

    fn close(&mut self) {
        self.frames.clear();
        self.cursor = 0;
        debug!("Closed {}", self.device);
    }
}

/// Resolves device identities against a root directory; `"0"` means `<root>/0`
#[derive(Debug, Clone)]
pub struct DirectoryOpener {
    root: PathBuf,
}

impl DirectoryOpener {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceOpener for DirectoryOpener {
    fn open(&self, camera: &CameraConfig) -> Result<Box<dyn FrameSource>, VisionError> {
        // An absolute device path replaces the root entirely
        let dir = self.root.join(&camera.device);
        let source = DirectorySource::open(dir, camera.width, camera.height)?;
        Ok(Box::new(source))
    }
}
