//! Live preview collaborators.
//!
//! Rendering windows is left to whoever implements [`Preview`]; the crate
//! ships a headless implementation that only records what would be shown.

use crate::capture::Frame;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::Mutex;

pub const WINDOW_WIDTH: u32 = 640;
pub const WINDOW_HEIGHT: u32 = 360;
pub const WINDOWS_PER_ROW: usize = 2;

/// Receives frames for on-screen display, keyed by window label.
pub trait Preview: Send + Sync {
    /// Show `frame` in `window`. `fps` is the achieved capture rate, if known.
    fn show(&self, window: &str, position: (u32, u32), frame: &Frame, fps: Option<f64>);

    /// The session or presenter that owned `window` has finished.
    fn close(&self, window: &str);
}

/// Top-left corner of a camera's window when windows are tiled `per_row` wide.
pub fn window_position(id: usize, per_row: usize) -> (u32, u32) {
    let per_row = per_row.max(1);
    let x = (id % per_row) as u32 * WINDOW_WIDTH;
    let y = (id / per_row) as u32 * WINDOW_HEIGHT;
    (x, y)
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPreview;

impl Preview for NullPreview {
    fn show(&self, _window: &str, _position: (u32, u32), _frame: &Frame, _fps: Option<f64>) {}

    fn close(&self, _window: &str) {}
}

/// What a headless preview knows about one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowState {
    pub position: (u32, u32),
    pub frames_shown: u64,
    pub last_fps: Option<f64>,
    pub open: bool,
}

/// Headless preview: keeps per-window counters and logs at TRACE level.
#[derive(Debug, Default)]
pub struct LogPreview {
    windows: Mutex<HashMap<String, WindowState>>,
}

impl LogPreview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self, label: &str) -> Option<WindowState> {
        self.windows.lock().ok()?.get(label).cloned()
    }
}

impl Preview for LogPreview {
    fn show(&self, window: &str, position: (u32, u32), frame: &Frame, fps: Option<f64>) {
        let Ok(mut windows) = self.windows.lock() else {
            return;
        };
        let state = windows.entry(window.to_string()).or_insert(WindowState {
            position,
            frames_shown: 0,
            last_fps: None,
            open: true,
        });
        state.position = position;
        state.frames_shown += 1;
        state.last_fps = fps;
        state.open = true;

        tracing::trace!(
            window,
            x = position.0,
            y = position.1,
            width = frame.width(),
            height = frame.height(),
            fps = fps.map(|f| f.floor() as u64),
            "Preview frame"
        );
    }

    fn close(&self, window: &str) {
        if let Ok(mut windows) = self.windows.lock() {
            if let Some(state) = windows.get_mut(window) {
                state.open = false;
            }
        }
        tracing::debug!(window, "Preview closed");
    }
}

const PLACEHOLDER_WIDTH: u32 = 400;
const PLACEHOLDER_HEIGHT: u32 = 200;
const GLYPH_SCALE: u32 = 8;
const GLYPH_GAP: u32 = 1;

// 5x7 bitmaps, one byte per row, low 5 bits used
const GLYPH_E: [u8; 7] = [0x1f, 0x10, 0x10, 0x1e, 0x10, 0x10, 0x1f];
const GLYPH_R: [u8; 7] = [0x1e, 0x11, 0x11, 0x1e, 0x14, 0x12, 0x11];
const GLYPH_O: [u8; 7] = [0x0e, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0e];

/// Black frame with "ERROR" in red, shown in place of a camera that never connected.
pub fn placeholder_frame() -> Frame {
    let mut image = RgbImage::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);
    let text = [GLYPH_E, GLYPH_R, GLYPH_R, GLYPH_O, GLYPH_R];

    let advance = (5 + GLYPH_GAP) * GLYPH_SCALE;
    let text_width = advance * text.len() as u32 - GLYPH_GAP * GLYPH_SCALE;
    let text_height = 7 * GLYPH_SCALE;
    let origin_x = (PLACEHOLDER_WIDTH - text_width) / 2;
    let origin_y = (PLACEHOLDER_HEIGHT - text_height) / 2;

    for (n, glyph) in text.iter().enumerate() {
        let glyph_x = origin_x + n as u32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..5u32 {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let x0 = glyph_x + col * GLYPH_SCALE;
                let y0 = origin_y + row as u32 * GLYPH_SCALE;
                for y in y0..y0 + GLYPH_SCALE {
                    for x in x0..x0 + GLYPH_SCALE {
                        image.put_pixel(x, y, Rgb([255, 0, 0]));
                    }
                }
            }
        }
    }

    image
}
