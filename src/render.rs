//! Scene drawing
//!
//! The display core never touches pixels. It computes screen coordinates and
//! hands them to a [`RasterSurface`]; when a raw framebuffer device is the
//! output, [`FramebufferSink`] copies the finished frame to it verbatim.

use core::f64::consts::FRAC_PI_2;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::camera::{Camera, ScreenGeometry};
use crate::error::RenderError;
use crate::grid::SkyGrid;
use crate::sky::SkyCatalog;
use crate::types::ScreenPoint;

/// 8-bit RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Which point of the text box `position` refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Center,
    /// Horizontally centred, top edge at the position
    TopCenter,
    BottomRight,
}

/// Drawing primitives supplied by the windowing or framebuffer backend
pub trait RasterSurface {
    fn geometry(&self) -> ScreenGeometry;

    fn clear(&mut self, color: Color);

    /// Circle outline of the given stroke width; a width of 0 fills it
    fn circle(&mut self, center: ScreenPoint, radius: f64, width: u32, color: Color);

    fn line(&mut self, from: ScreenPoint, to: ScreenPoint, color: Color);

    fn text(
        &mut self,
        position: ScreenPoint,
        anchor: TextAnchor,
        text: &str,
        color: Color,
        background: Option<Color>,
    );

    /// Show the finished frame
    fn present(&mut self) -> Result<(), RenderError>;

    /// Raw pixels of the finished frame, for surfaces backed by memory
    fn frame_bytes(&self) -> Option<&[u8]> {
        None
    }

    fn polyline(&mut self, points: &[ScreenPoint], color: Color) {
        for pair in points.windows(2) {
            self.line(pair[0], pair[1], color);
        }
    }
}

/// Layout of the overlay furniture, pixels
const OBJECT_SCALE: f64 = 5.0;
const LABEL_GAP: f64 = 6.0;
const DIAL_SIZE: f64 = 20.0;
const DIAL_MARGIN: f64 = 40.0;
const DIAL_STROKE: u32 = 3;
const FPS_MARGIN: f64 = 40.0;

/// Draws one frame: grid, compass labels, sky objects, heading dial and FPS
#[derive(Debug, Clone)]
pub struct SceneRenderer {
    grid: SkyGrid,
    foreground: Color,
    background: Color,
}

impl SceneRenderer {
    pub fn new(grid: SkyGrid) -> Self {
        Self {
            grid,
            foreground: Color::WHITE,
            background: Color::BLACK,
        }
    }

    pub fn grid(&self) -> &SkyGrid {
        &self.grid
    }

    /// Draw everything for `camera`; does not present
    pub fn draw<S: RasterSurface + ?Sized>(
        &self,
        surface: &mut S,
        camera: &Camera,
        catalog: &SkyCatalog,
        fps: f64,
    ) {
        surface.clear(self.background);
        self.draw_grid(surface, camera);
        self.draw_objects(surface, camera, catalog);
        self.draw_fps(surface, fps);
        self.draw_heading(surface, camera);
    }

    fn draw_grid<S: RasterSurface + ?Sized>(&self, surface: &mut S, camera: &Camera) {
        let frame = self.grid.project(camera);
        for line in &frame.lines {
            surface.polyline(line, self.foreground);
        }
        for (point, label) in &frame.labels {
            surface.text(
                *point,
                TextAnchor::Center,
                label,
                self.foreground,
                Some(self.background),
            );
        }
    }

    fn draw_objects<S: RasterSurface + ?Sized>(
        &self,
        surface: &mut S,
        camera: &Camera,
        catalog: &SkyCatalog,
    ) {
        for (entry, point) in catalog.visible(camera) {
            let diameter = object_diameter(camera, entry.angular_diameter);
            surface.circle(point, diameter / 2.0, 0, self.foreground);

            if let Some(label) = entry.label {
                let below = point.offset(0.0, diameter / 2.0 + LABEL_GAP);
                surface.text(below, TextAnchor::TopCenter, label, self.foreground, None);
            }
        }
    }

    fn draw_fps<S: RasterSurface + ?Sized>(&self, surface: &mut S, fps: f64) {
        let screen = surface.geometry();
        let corner = ScreenPoint::new(
            screen.width as f64 - FPS_MARGIN,
            screen.height as f64 - FPS_MARGIN,
        );
        let text = format!("{} FPS", fps.max(0.0).ceil() as u32);
        surface.text(corner, TextAnchor::BottomRight, &text, self.foreground, None);
    }

    fn draw_heading<S: RasterSurface + ?Sized>(&self, surface: &mut S, camera: &Camera) {
        let center = heading_dial_center(surface.geometry());
        let radius = DIAL_SIZE / 2.0;
        surface.circle(center, radius, DIAL_STROKE, self.foreground);
        surface.text(
            north_marker(center, radius, camera.yaw()),
            TextAnchor::Center,
            "N",
            self.foreground,
            Some(self.background),
        );
    }
}

impl Default for SceneRenderer {
    fn default() -> Self {
        Self::new(SkyGrid::default())
    }
}

/// On-screen diameter of an object, enlarged so tiny objects stay visible
pub fn object_diameter(camera: &Camera, angular_diameter: f64) -> f64 {
    camera.project_angle(angular_diameter).max(1.0) * OBJECT_SCALE
}

/// Centre of the heading dial in the top-right corner
pub fn heading_dial_center(screen: ScreenGeometry) -> ScreenPoint {
    let half = DIAL_SIZE / 2.0;
    ScreenPoint::new(screen.width as f64 - DIAL_MARGIN - half, DIAL_MARGIN + half)
}

/// Position of the "N" marker on a dial of `radius` for camera `yaw`
pub fn north_marker(center: ScreenPoint, radius: f64, yaw: f64) -> ScreenPoint {
    let (sin, cos) = (yaw - FRAC_PI_2).sin_cos();
    center.offset(radius * cos, radius * sin)
}

/// Copies finished frames to a raw framebuffer device
///
/// Every frame is written from offset zero, replacing the previous one.
#[derive(Debug)]
pub struct FramebufferSink<W: Write + Seek> {
    device: W,
}

impl FramebufferSink<File> {
    /// Open a framebuffer device such as `/dev/fb0` for writing
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let device = OpenOptions::new().write(true).open(path)?;
        Ok(Self::new(device))
    }
}

impl<W: Write + Seek> FramebufferSink<W> {
    pub fn new(device: W) -> Self {
        Self { device }
    }

    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), RenderError> {
        self.device.seek(SeekFrom::Start(0))?;
        self.device.write_all(frame)?;
        self.device.flush()?;
        Ok(())
    }

    /// Copy the surface's finished frame to the device
    pub fn present_from<S: RasterSurface + ?Sized>(&mut self, surface: &S) -> Result<(), RenderError> {
        let frame = surface.frame_bytes().ok_or(RenderError::NoFrameBuffer)?;
        self.write_frame(frame)
    }

    pub fn into_inner(self) -> W {
        self.device
    }
}

/// Frames averaged by [`FpsCounter`]
const FPS_WINDOW: usize = 10;

/// Frame rate averaged over the last few frames
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    last_frame: Option<Instant>,
    intervals: VecDeque<Duration>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        if let Some(last) = self.last_frame.replace(now) {
            if self.intervals.len() == FPS_WINDOW {
                self.intervals.pop_front();
            }
            self.intervals.push_back(now.saturating_duration_since(last));
        }
    }

    /// Frames per second; zero until two frames have been seen
    pub fn fps(&self) -> f64 {
        let total: Duration = self.intervals.iter().sum();
        if total.is_zero() {
            return 0.0;
        }
        self.intervals.len() as f64 / total.as_secs_f64()
    }
}

/// One primitive captured by [`RecordingSurface`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Color),
    Circle {
        center: ScreenPoint,
        radius: f64,
        width: u32,
    },
    Line(ScreenPoint, ScreenPoint),
    Text {
        position: ScreenPoint,
        anchor: TextAnchor,
        text: String,
    },
    Present,
}

/// Surface that records primitives instead of drawing them
///
/// Used for headless runs and tests.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    geometry: ScreenGeometry,
    commands: Vec<DrawCommand>,
    frames: usize,
}

impl RecordingSurface {
    pub fn new(geometry: ScreenGeometry) -> Self {
        Self {
            geometry,
            commands: Vec::new(),
            frames: 0,
        }
    }

    /// Commands since the last clear
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|command| match command {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl RasterSurface for RecordingSurface {
    fn geometry(&self) -> ScreenGeometry {
        self.geometry
    }

    fn clear(&mut self, color: Color) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear(color));
    }

    fn circle(&mut self, center: ScreenPoint, radius: f64, width: u32, _color: Color) {
        self.commands.push(DrawCommand::Circle {
            center,
            radius,
            width,
        });
    }

    fn line(&mut self, from: ScreenPoint, to: ScreenPoint, _color: Color) {
        self.commands.push(DrawCommand::Line(from, to));
    }

    fn text(
        &mut self,
        position: ScreenPoint,
        anchor: TextAnchor,
        text: &str,
        _color: Color,
        _background: Option<Color>,
    ) {
        self.commands.push(DrawCommand::Text {
            position,
            anchor,
            text: text.to_string(),
        });
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.commands.push(DrawCommand::Present);
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PHYSICAL_FOV_DEGREES;
    use crate::sky::{Body, Ephemeris, HorizontalPosition, Observer, Target};
    use crate::types::{GeoLocation, SkyDirection};
    use std::io::Cursor;

    struct SunOnly(SkyDirection);

    impl Ephemeris for SunOnly {
        fn observe(&self, _: &Observer, target: &Target) -> Option<HorizontalPosition> {
            match target {
                Target::Body(Body::Sun) => Some(HorizontalPosition {
                    altitude: self.0.altitude(),
                    azimuth: self.0.azimuth(),
                    distance_km: 1.496e8,
                }),
                _ => None,
            }
        }
    }

    fn sun_catalog(direction: SkyDirection) -> SkyCatalog {
        SkyCatalog::build(
            &SunOnly(direction),
            Observer::now(GeoLocation::FALLBACK),
            &[],
        )
    }

    #[test]
    fn test_sun_drawn_at_center_with_label_below() {
        let direction = SkyDirection::from_degrees(30.0, 150.0);
        let camera = Camera::looking_at(
            direction,
            PHYSICAL_FOV_DEGREES.to_radians(),
            ScreenGeometry::default(),
        );
        let mut surface = RecordingSurface::new(ScreenGeometry::default());

        SceneRenderer::default().draw(&mut surface, &camera, &sun_catalog(direction), 60.0);

        let diameter = object_diameter(&camera, 0.5f64.to_radians());
        let disc = surface
            .commands()
            .iter()
            .find_map(|command| match command {
                DrawCommand::Circle { center, radius, width: 0 } => Some((*center, *radius)),
                _ => None,
            })
            .unwrap();
        assert!((disc.0.x - 320.0).abs() < 1e-6);
        assert!((disc.1 - diameter / 2.0).abs() < 1e-9);

        let label = surface
            .commands()
            .iter()
            .find_map(|command| match command {
                DrawCommand::Text { position, text, .. } if text == "Sun" => Some(*position),
                _ => None,
            })
            .unwrap();
        assert!((label.y - (240.0 + diameter / 2.0 + 6.0)).abs() < 1e-6);
    }

    #[test]
    fn test_sun_behind_camera_not_drawn() {
        let camera = Camera::looking_at(
            SkyDirection::on_horizon(0.0),
            PHYSICAL_FOV_DEGREES.to_radians(),
            ScreenGeometry::default(),
        );
        let mut surface = RecordingSurface::new(ScreenGeometry::default());
        let catalog = sun_catalog(SkyDirection::on_horizon(180.0));

        SceneRenderer::default().draw(&mut surface, &camera, &catalog, 0.0);

        assert!(!surface.texts().any(|text| text == "Sun"));
    }

    #[test]
    fn test_tiny_objects_have_minimum_size() {
        let camera = Camera::new(0.0, 0.0, 0.0, 1.0, ScreenGeometry::default());
        assert_eq!(object_diameter(&camera, 0.0), OBJECT_SCALE);
    }

    #[test]
    fn test_overlay_furniture() {
        let camera = Camera::new(0.0, 0.0, 0.0, 1.0, ScreenGeometry::default());
        let mut surface = RecordingSurface::new(ScreenGeometry::default());
        SceneRenderer::default().draw(
            &mut surface,
            &camera,
            &SkyCatalog::empty(Observer::now(GeoLocation::FALLBACK)),
            59.2,
        );

        let texts: Vec<&str> = surface.texts().collect();
        assert!(texts.contains(&"60 FPS"));
        assert!(texts.contains(&"N"));
        assert!(texts.contains(&"North"));
    }

    #[test]
    fn test_north_marker_tracks_yaw() {
        let center = heading_dial_center(ScreenGeometry::default());
        assert_eq!(center, ScreenPoint::new(590.0, 50.0));

        // Facing north the marker sits at the top of the dial
        let top = north_marker(center, 10.0, 0.0);
        assert!((top.x - 590.0).abs() < 1e-9);
        assert!((top.y - 40.0).abs() < 1e-9);

        let right = north_marker(center, 10.0, FRAC_PI_2);
        assert!((right.x - 600.0).abs() < 1e-9);
        assert!((right.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_framebuffer_sink_overwrites_from_start() {
        let mut sink = FramebufferSink::new(Cursor::new(Vec::new()));
        sink.write_frame(&[1, 2, 3, 4]).unwrap();
        sink.write_frame(&[9, 9]).unwrap();

        assert_eq!(sink.into_inner().into_inner(), vec![9, 9, 3, 4]);
    }

    #[test]
    fn test_framebuffer_sink_needs_frame_bytes() {
        let mut sink = FramebufferSink::new(Cursor::new(Vec::new()));
        let surface = RecordingSurface::new(ScreenGeometry::default());
        assert!(matches!(
            sink.present_from(&surface),
            Err(RenderError::NoFrameBuffer)
        ));
    }

    #[test]
    fn test_fps_counter_averages_intervals() {
        let t0 = Instant::now();
        let mut counter = FpsCounter::new();
        assert_eq!(counter.fps(), 0.0);

        for frame in 0..=20 {
            counter.tick_at(t0 + Duration::from_millis(20 * frame));
        }
        assert!((counter.fps() - 50.0).abs() < 1e-6);
    }
}
