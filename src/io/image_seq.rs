//! Image-sequence input and output.
//!
//! Frame decode and encode are delegated to the `image` crate; a video is a
//! directory of numbered stills.

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{SinkError, SourceError};
use crate::frame::{Frame, SourceInfo};
use crate::io::sink::FrameWriter;
use crate::io::source::FrameSource;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Stills in a directory, read in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    dir: PathBuf,
    fps: Option<f64>,
    files: Vec<PathBuf>,
    cursor: usize,
    dimensions: Option<(u32, u32)>,
}

impl ImageSequenceSource {
    /// Still images carry no rate, so the caller supplies one.
    pub fn new(dir: impl Into<PathBuf>, fps: Option<f64>) -> Self {
        Self {
            dir: dir.into(),
            fps,
            files: Vec::new(),
            cursor: 0,
            dimensions: None,
        }
    }

    fn list_frames(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let supported = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if path.is_file() && supported {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<SourceInfo, SourceError> {
        let name = self.dir.display().to_string();
        if !self.dir.is_dir() {
            return Err(SourceError::open(name, "not a directory"));
        }
        self.files = Self::list_frames(&self.dir)?;
        self.cursor = 0;

        let Some(first) = self.files.first() else {
            return Err(SourceError::open(name, "no image files found"));
        };
        let (width, height) =
            image::image_dimensions(first).map_err(|err| SourceError::open(&name, err.to_string()))?;
        self.dimensions = Some((width, height));

        info!(source = %name, frames = self.files.len(), width, height, "image sequence opened");
        Ok(SourceInfo {
            name,
            fps: self.fps,
            total_frames: Some(self.files.len() as u64),
            width,
            height,
        })
    }

    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let index = self.cursor as u64;
        self.cursor += 1;

        let image = image::open(path)
            .map_err(|err| SourceError::read(index, format!("{}: {err}", path.display())))?
            .into_rgb8();
        if let Some(expected) = self.dimensions.filter(|&dims| dims != image.dimensions()) {
            return Err(SourceError::read(
                index,
                format!("size {:?} differs from stream size {:?}", image.dimensions(), expected),
            ));
        }
        Ok(Some(image))
    }

    fn release(&mut self) {
        debug!(source = %self.dir.display(), read = self.cursor, "image sequence released");
        self.files.clear();
        self.cursor = 0;
    }
}

#[derive(Debug, Serialize)]
struct SequenceManifest {
    fps: f64,
    width: u32,
    height: u32,
    frames: u64,
}

/// Writes each emitted frame as `frame_NNNNNN.png` plus a `sequence.json`
/// manifest recording the output rate.
#[derive(Debug)]
pub struct ImageSequenceWriter {
    dir: PathBuf,
    manifest: Option<SequenceManifest>,
    written: u64,
}

impl ImageSequenceWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            manifest: None,
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }
}

impl FrameWriter for ImageSequenceWriter {
    fn open(&mut self, info: &SourceInfo, fps: f64) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir).map_err(|err| SinkError::Open {
            path: self.dir.clone(),
            reason: err.to_string(),
        })?;
        self.manifest = Some(SequenceManifest {
            fps,
            width: info.width,
            height: info.height,
            frames: 0,
        });
        info!(output = %self.dir.display(), fps, "image sequence writer opened");
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        // Repeated frames share a source index, so number by output position.
        let path = self.frame_path(self.written);
        frame.image().save(&path).map_err(|err| SinkError::Write {
            index: frame.index,
            reason: format!("{}: {err}", path.display()),
        })?;
        self.written += 1;
        Ok(())
    }

    fn release(&mut self) {
        let Some(mut manifest) = self.manifest.take() else {
            return;
        };
        manifest.frames = self.written;
        let path = self.dir.join("sequence.json");
        let result = serde_json::to_vec_pretty(&manifest)
            .map_err(std::io::Error::from)
            .and_then(|bytes| std::fs::write(&path, bytes));
        if let Err(err) = result {
            warn!(path = %path.display(), %err, "could not write sequence manifest");
        }
        debug!(output = %self.dir.display(), frames = self.written, "image sequence writer released");
    }
}
