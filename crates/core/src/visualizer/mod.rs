//! Bar-graph spectrum visualizer.
//!
//! Rendering is a cancellable per-refresh task: the host invokes
//! [`VisualizerRenderer::render_frame`] once per display refresh, and the
//! cancellation check is the first action of every invocation, so no pixels
//! are touched after `unmount` or after the session behind the analyser is
//! torn down.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::AnalyserHandle;
use crate::spectrum::SpectrumSampler;
use crate::task::{CancellationToken, FrameTask};
use crate::{PlayerError, Result};

/// 8-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgb::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    fn packed(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

/// Emotional mood reported by the upstream collaborator; selects the bar
/// gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Mood {
    Happy,
    Sad,
    Angry,
    #[default]
    Neutral,
    Surprise,
    Fear,
    Disgust,
    Unknown,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Happy,
        Mood::Sad,
        Mood::Angry,
        Mood::Neutral,
        Mood::Surprise,
        Mood::Fear,
        Mood::Disgust,
        Mood::Unknown,
    ];
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Angry => "angry",
            Mood::Neutral => "neutral",
            Mood::Surprise => "surprise",
            Mood::Fear => "fear",
            Mood::Disgust => "disgust",
            Mood::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Mood {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "happy" => Ok(Mood::Happy),
            "sad" => Ok(Mood::Sad),
            "angry" => Ok(Mood::Angry),
            "neutral" => Ok(Mood::Neutral),
            "surprise" => Ok(Mood::Surprise),
            "fear" => Ok(Mood::Fear),
            "disgust" => Ok(Mood::Disgust),
            "unknown" => Ok(Mood::Unknown),
            other => Err(PlayerError::msg(format!("unknown mood `{other}`"))),
        }
    }
}

/// Gradient endpoints for the bars: `dark` at the base, `light` at the tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub light: Rgb,
    pub dark: Rgb,
}

impl Theme {
    pub fn for_mood(mood: Mood) -> Self {
        let (light, dark) = match mood {
            Mood::Happy => (Rgb::new(0xff, 0xd6, 0x0a), Rgb::new(0xff, 0x00, 0x6e)),
            Mood::Sad => (Rgb::new(0x1e, 0x3a, 0x8a), Rgb::new(0x31, 0x2e, 0x81)),
            Mood::Angry => (Rgb::new(0xf9, 0x73, 0x16), Rgb::new(0xdc, 0x26, 0x26)),
            Mood::Neutral => (Rgb::new(0x94, 0xa3, 0xb8), Rgb::new(0x71, 0x71, 0x7a)),
            Mood::Surprise => (Rgb::new(0x3b, 0x82, 0xf6), Rgb::new(0x14, 0xb8, 0xa6)),
            Mood::Fear => (Rgb::new(0xa8, 0x55, 0xf7), Rgb::new(0x7c, 0x3a, 0xed)),
            Mood::Disgust => (Rgb::new(0xa3, 0xe6, 0x35), Rgb::new(0xea, 0xb3, 0x08)),
            Mood::Unknown => (Rgb::new(0x9c, 0xa3, 0xaf), Rgb::new(0x4b, 0x55, 0x63)),
        };
        Self { light, dark }
    }
}

/// Resizable backing buffer the bars are painted into.
///
/// Pixels are stored as `0x00RRGGBB`. The backing resolution is the logical
/// size scaled by the device pixel ratio and is recomputed whenever either
/// changes, before the next frame draws.
#[derive(Debug, Clone)]
pub struct Surface {
    logical_width: f32,
    logical_height: f32,
    pixel_ratio: f32,
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl Surface {
    pub fn new(logical_width: f32, logical_height: f32) -> Self {
        Self::with_pixel_ratio(logical_width, logical_height, 1.0)
    }

    pub fn with_pixel_ratio(logical_width: f32, logical_height: f32, pixel_ratio: f32) -> Self {
        let mut surface = Self {
            logical_width,
            logical_height,
            pixel_ratio,
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
        surface.rescale();
        surface
    }

    /// Backing width in device pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Backing height in device pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    /// Applies a host resize notification. Takes effect before the next
    /// draw.
    pub fn resize(&mut self, logical_width: f32, logical_height: f32) {
        self.logical_width = logical_width;
        self.logical_height = logical_height;
        self.rescale();
    }

    /// Applies a device pixel ratio change (e.g. the window moved to
    /// another display).
    pub fn set_pixel_ratio(&mut self, pixel_ratio: f32) {
        self.pixel_ratio = pixel_ratio;
        self.rescale();
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Color of one backing pixel.
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.width + x]
    }

    fn rescale(&mut self) {
        self.width = ((self.logical_width.max(0.0) * self.pixel_ratio).floor() as usize).max(1);
        self.height = ((self.logical_height.max(0.0) * self.pixel_ratio).floor() as usize).max(1);
        self.pixels = vec![0; self.width * self.height];
    }

    /// Fills one bar with a vertical `dark` → `light` gradient rising from
    /// the bottom edge.
    fn fill_bar(&mut self, x0: usize, bar_width: usize, bar_height: usize, theme: Theme) {
        let height = self.height;
        let width = self.width;
        let bar_height = bar_height.min(height);
        for dy in 0..bar_height {
            let y = height - 1 - dy;
            let t = if bar_height <= 1 {
                1.0
            } else {
                dy as f32 / (bar_height - 1) as f32
            };
            let color = theme.dark.lerp(theme.light, t).packed();
            for x in x0..(x0 + bar_width).min(width) {
                self.pixels[y * width + x] = color;
            }
        }
    }
}

/// Outcome of one scheduled frame invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Bars were painted from a fresh spectrum snapshot.
    Drawn,
    /// The frame was skipped: detached surface or briefly unreadable
    /// analyser. The task keeps running.
    Skipped,
    /// The task or its session is cancelled; nothing was touched.
    Cancelled,
}

/// Per-session bar-graph renderer driven once per display refresh.
#[derive(Debug)]
pub struct VisualizerRenderer {
    sampler: SpectrumSampler,
    surface: Option<Surface>,
    theme: Theme,
    bar_gap: usize,
    task: Option<FrameTask>,
}

impl VisualizerRenderer {
    pub fn new(analyser: AnalyserHandle, surface: Surface, theme: Theme) -> Result<Self> {
        Ok(Self {
            sampler: SpectrumSampler::new(analyser)?,
            surface: Some(surface),
            theme,
            bar_gap: 1,
            task: None,
        })
    }

    /// Horizontal gap between bars, in device pixels.
    pub fn with_bar_gap(mut self, bar_gap: usize) -> Self {
        self.bar_gap = bar_gap;
        self
    }

    /// Starts the frame task and returns its cancellation token.
    pub fn mount(&mut self) -> CancellationToken {
        let task = FrameTask::new();
        let token = task.token();
        self.task = Some(task);
        token
    }

    /// Cancels the frame task synchronously. An invocation that was already
    /// scheduled will observe the flag and paint nothing.
    pub fn unmount(&mut self) {
        if let Some(task) = &self.task {
            task.cancel();
        }
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    /// Host resize/DPI notification; recomputes the backing resolution
    /// before the next frame.
    pub fn handle_resize(&mut self, logical_width: f32, logical_height: f32, pixel_ratio: f32) {
        if let Some(surface) = self.surface.as_mut() {
            surface.pixel_ratio = pixel_ratio;
            surface.resize(logical_width, logical_height);
        }
    }

    /// Detaches the drawing surface; frames are skipped until another one
    /// is attached.
    pub fn detach_surface(&mut self) -> Option<Surface> {
        self.surface.take()
    }

    pub fn attach_surface(&mut self, surface: Surface) {
        self.surface = Some(surface);
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    /// Number of frames that actually drew.
    pub fn frames_drawn(&self) -> u64 {
        self.task.as_ref().map(FrameTask::frames).unwrap_or(0)
    }

    /// The once-per-refresh invocation.
    pub fn render_frame(&mut self) -> FrameOutcome {
        let cancelled = match &self.task {
            Some(task) => task.is_cancelled(),
            None => true,
        };
        if cancelled || !self.sampler.is_live() {
            return FrameOutcome::Cancelled;
        }

        match self.draw() {
            Ok(()) => {
                if let Some(task) = self.task.as_mut() {
                    task.advance();
                }
                FrameOutcome::Drawn
            }
            // Detached surface or briefly unreadable analyser: absorbed.
            Err(_) => FrameOutcome::Skipped,
        }
    }

    fn draw(&mut self) -> Result<()> {
        let surface = self
            .surface
            .as_mut()
            .ok_or(PlayerError::SurfaceUnavailable)?;
        let magnitudes = self.sampler.snapshot()?;

        let theme = self.theme;
        let bar_gap = self.bar_gap;
        surface.clear();
        let width = surface.width();
        let height = surface.height();
        let bar_width = (width as f32 / magnitudes.len() as f32).max(1.0);

        for (bin, &value) in magnitudes.iter().enumerate() {
            let bar_height = ((value as f32 / 255.0) * height as f32).round() as usize;
            if bar_height == 0 {
                continue;
            }
            let x0 = (bin as f32 * bar_width) as usize;
            let draw_width = (bar_width as usize).saturating_sub(bar_gap).max(1);
            surface.fill_bar(x0, draw_width, bar_height, theme);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::graph::AnalyserNode;

    fn analyser() -> (AnalyserHandle, Arc<Mutex<AnalyserNode>>, CancellationToken) {
        let node = Arc::new(Mutex::new(AnalyserNode::new(128, 0.8).unwrap()));
        let live = CancellationToken::new();
        let handle = AnalyserHandle::new(node.clone(), live.clone());
        (handle, node, live)
    }

    fn renderer_with_bytes(bytes: &[u8]) -> (VisualizerRenderer, CancellationToken) {
        let (handle, node, live) = analyser();
        node.lock().unwrap().force_bytes(bytes);
        let surface = Surface::new(64.0, 16.0);
        let mut renderer =
            VisualizerRenderer::new(handle, surface, Theme::for_mood(Mood::Happy)).unwrap();
        renderer.mount();
        (renderer, live)
    }

    #[test]
    fn resize_scales_the_backing_buffer_by_pixel_ratio() {
        let mut surface = Surface::new(100.0, 10.0);
        assert_eq!((surface.width(), surface.height()), (100, 10));

        surface.set_pixel_ratio(2.0);
        assert_eq!((surface.width(), surface.height()), (200, 20));

        surface.resize(50.0, 5.0);
        assert_eq!((surface.width(), surface.height()), (100, 10));
    }

    #[test]
    fn a_collapsed_surface_still_has_one_pixel() {
        let surface = Surface::new(0.0, 0.0);
        assert_eq!((surface.width(), surface.height()), (1, 1));
    }

    #[test]
    fn resize_lands_before_the_next_drawn_frame() {
        let (mut renderer, _live) = renderer_with_bytes(&[255u8; 64]);

        assert_eq!(renderer.render_frame(), FrameOutcome::Drawn);
        assert_eq!(renderer.surface().unwrap().width(), 64);

        renderer.handle_resize(64.0, 16.0, 2.0);
        assert_eq!(renderer.render_frame(), FrameOutcome::Drawn);
        let surface = renderer.surface().unwrap();
        assert_eq!((surface.width(), surface.height()), (128, 32));
        // A full-height bar reaches the top row of the rescaled buffer.
        assert_ne!(surface.pixel(0, 0), 0);
    }

    #[test]
    fn full_bars_run_dark_at_the_base_to_light_at_the_tip() {
        let (mut renderer, _live) = renderer_with_bytes(&[255u8; 64]);
        assert_eq!(renderer.render_frame(), FrameOutcome::Drawn);

        let theme = Theme::for_mood(Mood::Happy);
        let surface = renderer.surface().unwrap();
        let bottom = surface.pixel(0, surface.height() - 1);
        let top = surface.pixel(0, 0);
        assert_eq!(bottom, theme.dark.packed());
        assert_eq!(top, theme.light.packed());
    }

    #[test]
    fn silence_draws_no_bars() {
        let (mut renderer, _live) = renderer_with_bytes(&[0u8; 64]);
        assert_eq!(renderer.render_frame(), FrameOutcome::Drawn);

        let surface = renderer.surface().unwrap();
        for y in 0..surface.height() {
            for x in 0..surface.width() {
                assert_eq!(surface.pixel(x, y), 0);
            }
        }
    }

    #[test]
    fn no_frame_draws_after_unmount() {
        let (mut renderer, _live) = renderer_with_bytes(&[255u8; 64]);
        assert_eq!(renderer.render_frame(), FrameOutcome::Drawn);

        let before = renderer.surface().unwrap().clone();
        renderer.unmount();

        // This invocation was "already scheduled"; it must touch nothing.
        assert_eq!(renderer.render_frame(), FrameOutcome::Cancelled);
        let after = renderer.surface().unwrap();
        for y in 0..after.height() {
            for x in 0..after.width() {
                assert_eq!(after.pixel(x, y), before.pixel(x, y));
            }
        }
        assert_eq!(renderer.frames_drawn(), 1);
    }

    #[test]
    fn session_teardown_cancels_the_frame_task() {
        let (mut renderer, live) = renderer_with_bytes(&[255u8; 64]);
        assert_eq!(renderer.render_frame(), FrameOutcome::Drawn);

        live.cancel();
        assert_eq!(renderer.render_frame(), FrameOutcome::Cancelled);
    }

    #[test]
    fn a_detached_surface_skips_frames_without_cancelling() {
        let (mut renderer, _live) = renderer_with_bytes(&[255u8; 64]);

        let surface = renderer.detach_surface().unwrap();
        assert_eq!(renderer.render_frame(), FrameOutcome::Skipped);

        renderer.attach_surface(surface);
        assert_eq!(renderer.render_frame(), FrameOutcome::Drawn);
    }

    #[test]
    fn render_before_mount_draws_nothing() {
        let (handle, node, _live) = analyser();
        node.lock().unwrap().force_bytes(&[255u8; 64]);
        let mut renderer =
            VisualizerRenderer::new(handle, Surface::new(64.0, 16.0), Theme::for_mood(Mood::Sad))
                .unwrap();

        assert_eq!(renderer.render_frame(), FrameOutcome::Cancelled);
    }

    #[test]
    fn every_mood_has_a_distinct_gradient() {
        let themes: Vec<Theme> = Mood::ALL.iter().map(|m| Theme::for_mood(*m)).collect();
        for (i, a) in themes.iter().enumerate() {
            for b in themes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn moods_round_trip_through_their_names() {
        for mood in Mood::ALL {
            let parsed: Mood = mood.to_string().parse().unwrap();
            assert_eq!(parsed, mood);
        }
        assert!("melancholy".parse::<Mood>().is_err());
    }
}
