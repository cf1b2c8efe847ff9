//! Overlay description and rasterization.
//!
//! [`annotate`] is a pure function from frame metadata and the live track
//! list to an [`Overlay`]; [`Renderer`] draws an overlay onto pixels. Splitting
//! the two keeps the "what and where" testable without comparing images.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect as PixelRect;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;
use crate::tracker::Track;

pub type Color = [u8; 3];

/// Colors and sizes used by the overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationStyle {
    pub named_color: Color,
    pub unknown_color: Color,
    /// Tracks that were not matched on the latest processed frame
    pub stale_color: Color,
    pub info_color: Color,
    pub progress_color: Color,
    pub box_thickness: u32,
    pub font_size: f32,
    /// TrueType/OpenType font used for labels; without one only boxes are drawn
    pub font_path: Option<PathBuf>,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            named_color: [0, 255, 0],
            unknown_color: [255, 0, 0],
            stale_color: [128, 128, 128],
            info_color: [255, 0, 0],
            progress_color: [0, 255, 0],
            box_thickness: 2,
            font_size: 18.0,
            font_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledBox {
    pub track_id: u64,
    pub label: String,
    /// Corners (x1, y1, x2, y2) clipped to the frame
    pub corners: [i32; 4],
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextItem {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressBar {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub filled: u32,
    pub color: Color,
}

/// Everything to be drawn on one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub frame_index: u64,
    pub boxes: Vec<LabeledBox>,
    pub texts: Vec<TextItem>,
    pub progress_bar: Option<ProgressBar>,
}

/// Describe the overlay for a processed frame.
///
/// One box per live track labelled `name#id`, plus the frame index, the live
/// track count and, when known, percent complete.
pub fn annotate(
    frame_index: u64,
    width: u32,
    height: u32,
    tracks: &[Track],
    progress: Option<f32>,
    style: &AnnotationStyle,
) -> Overlay {
    let (w, h) = (width as i32, height as i32);
    let text_height = style.font_size.ceil() as i32;

    let boxes = tracks
        .iter()
        .map(|track| {
            let [x1, y1, x2, y2] = track.bbox.to_pixel_tlbr();
            let color = if !track.is_fresh() {
                style.stale_color
            } else if track.name.is_resolved() {
                style.named_color
            } else {
                style.unknown_color
            };
            LabeledBox {
                track_id: track.id,
                label: track.label(),
                corners: [
                    x1.clamp(0, w),
                    y1.clamp(0, h),
                    x2.clamp(0, w),
                    y2.clamp(0, h),
                ],
                color,
            }
        })
        .collect();

    let mut texts = vec![
        TextItem {
            text: format!("Frame: {frame_index}"),
            x: 10,
            y: 30 - text_height,
            color: style.info_color,
        },
        TextItem {
            text: format!("Tracking: {} persons", tracks.len()),
            x: 10,
            y: 60 - text_height,
            color: style.info_color,
        },
    ];

    let mut progress_bar = None;
    if let Some(percent) = progress {
        let percent = percent.clamp(0.0, 100.0);
        texts.push(TextItem {
            text: format!("Progress: {percent:.1}%"),
            x: 10,
            y: h - 20 - text_height,
            color: style.progress_color,
        });
        if width > 20 && height > 10 {
            let bar_width = width - 20;
            progress_bar = Some(ProgressBar {
                x: 10,
                y: h - 10,
                width: bar_width,
                height: 6,
                filled: (bar_width as f32 * percent / 100.0).round() as u32,
                color: style.progress_color,
            });
        }
    }

    Overlay {
        frame_index,
        boxes,
        texts,
        progress_bar,
    }
}

/// Load a font for [`Renderer`].
pub fn load_font(path: &Path) -> Result<FontVec, SinkError> {
    let data = std::fs::read(path)?;
    FontVec::try_from_vec(data).map_err(|err| SinkError::Open {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Rasterizes overlays.
pub struct Renderer {
    style: AnnotationStyle,
    font: Option<FontVec>,
}

impl Renderer {
    pub fn new(style: AnnotationStyle, font: Option<FontVec>) -> Self {
        Self { style, font }
    }

    /// Build a renderer, loading the style's font if one is configured.
    pub fn from_style(style: AnnotationStyle) -> Result<Self, SinkError> {
        let font = style.font_path.as_deref().map(load_font).transpose()?;
        Ok(Self::new(style, font))
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn render(&self, image: &mut RgbImage, overlay: &Overlay) {
        let scale = PxScale::from(self.style.font_size);
        let text_height = self.style.font_size.ceil() as i32;

        for labeled in &overlay.boxes {
            let [x1, y1, x2, y2] = labeled.corners;
            let color = Rgb(labeled.color);
            for offset in 0..self.style.box_thickness as i32 {
                let (width, height) = (x2 - x1 - 2 * offset, y2 - y1 - 2 * offset);
                if width <= 0 || height <= 0 {
                    break;
                }
                let rect = PixelRect::at(x1 + offset, y1 + offset).of_size(width as u32, height as u32);
                draw_hollow_rect_mut(image, rect, color);
            }
            if let Some(font) = &self.font {
                let y = (y1 - text_height - 2).max(0);
                draw_text_mut(image, color, x1, y, scale, font, &labeled.label);
            }
        }

        if let Some(font) = &self.font {
            for text in &overlay.texts {
                draw_text_mut(image, Rgb(text.color), text.x, text.y.max(0), scale, font, &text.text);
            }
        }

        if let Some(bar) = &overlay.progress_bar {
            let color = Rgb(bar.color);
            let outline = PixelRect::at(bar.x, bar.y).of_size(bar.width, bar.height);
            draw_hollow_rect_mut(image, outline, color);
            if bar.filled > 0 {
                let fill = PixelRect::at(bar.x, bar.y).of_size(bar.filled.min(bar.width), bar.height);
                draw_filled_rect_mut(image, fill, color);
            }
        }
    }

    /// Render onto a copy of `image`.
    pub fn rendered(&self, image: &RgbImage, overlay: &Overlay) -> RgbImage {
        let mut canvas = image.clone();
        self.render(&mut canvas, overlay);
        canvas
    }
}
