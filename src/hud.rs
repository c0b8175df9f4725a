//! The render/input loop
//!
//! [`SkyHud`] owns the camera, the zoom state and the cached sky catalog. Each
//! frame it drains input, updates zoom, takes the latest IMU orientation when
//! the fusion driver is running, refreshes the catalog when it is due, draws
//! and presents. Nothing in a frame blocks on hardware: both drivers are read
//! through their snapshots.

use std::io::{Seek, Write};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::camera::Camera;
use crate::config::{DisplaySettings, HudConfig};
use crate::error::RenderError;
use crate::fusion::OrientationDriver;
use crate::grid::SkyGrid;
use crate::location::LocationDriver;
use crate::render::{FpsCounter, FramebufferSink, RasterSurface, SceneRenderer};
use crate::sky::{CatalogSettings, Ephemeris, Observer, SkyCatalog, StarRecord, select_stars};
use crate::types::{GeoLocation, Orientation};
use crate::zoom::{FieldOfView, ZoomButton, ZoomDirection};

/// Input delivered by the windowing layer or button hardware
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Pointer moved with the primary button held, pixels
    Drag { dx: f64, dy: f64 },
    /// Key bound to a zoom button went down or up
    ZoomKey { direction: ZoomDirection, pressed: bool },
    /// Current level of the two physical zoom switches
    Buttons { zoom_in: bool, zoom_out: bool },
    Quit,
}

/// Sleeps out the remainder of each frame interval
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    last: Option<Instant>,
}

impl FramePacer {
    pub fn new(target_fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / target_fps.max(1),
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How long to sleep at `now` to keep the frame rate; never negative
    pub fn delay_at(&mut self, now: Instant) -> Duration {
        let delay = self
            .last
            .map(|last| (last + self.interval).saturating_duration_since(now))
            .unwrap_or_default();
        self.last = Some(now + delay);
        delay
    }

    pub fn pace(&mut self) {
        let delay = self.delay_at(Instant::now());
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// One zoom button and the direction it zooms
#[derive(Debug, Clone)]
struct ZoomControl {
    button: ZoomButton,
    direction: ZoomDirection,
}

/// The head-up sky display
pub struct SkyHud<E: Ephemeris> {
    display: DisplaySettings,
    sky: CatalogSettings,
    camera: Camera,
    fov: FieldOfView,
    zoom: [ZoomControl; 2],
    orientation: Option<OrientationDriver>,
    location: Option<LocationDriver>,
    fallback: GeoLocation,
    ephemeris: E,
    stars: Vec<StarRecord>,
    catalog: Option<SkyCatalog>,
    last_refresh: Option<Instant>,
    last_frame: Option<Instant>,
    renderer: SceneRenderer,
    fps: FpsCounter,
}

impl<E: Ephemeris> SkyHud<E> {
    /// Build the display; `stars` is the full catalog, filtered here
    pub fn new(config: &HudConfig, ephemeris: E, stars: &[StarRecord]) -> Self {
        let fov = FieldOfView::new(&config.zoom);
        let camera = Camera::new(
            0.0,
            config.display.initial_yaw_degrees.to_radians(),
            0.0,
            fov.radians(),
            config.display.screen,
        );
        let stars = select_stars(stars, config.sky.brightest_stars, &config.sky.extra_stars);
        debug!(stars = stars.len(), "star selection ready");

        Self {
            display: config.display,
            sky: config.sky.clone(),
            camera,
            fov,
            zoom: [
                ZoomControl {
                    button: ZoomButton::new(&config.zoom),
                    direction: ZoomDirection::In,
                },
                ZoomControl {
                    button: ZoomButton::new(&config.zoom),
                    direction: ZoomDirection::Out,
                },
            ],
            orientation: None,
            location: None,
            fallback: config.location.fallback,
            ephemeris,
            stars,
            catalog: None,
            last_refresh: None,
            last_frame: None,
            renderer: SceneRenderer::new(SkyGrid::new(config.grid)),
            fps: FpsCounter::new(),
        }
    }

    pub fn with_orientation(mut self, driver: OrientationDriver) -> Self {
        self.orientation = Some(driver);
        self
    }

    pub fn with_location(mut self, driver: LocationDriver) -> Self {
        self.location = Some(driver);
        self
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn field_of_view(&self) -> &FieldOfView {
        &self.fov
    }

    pub fn catalog(&self) -> Option<&SkyCatalog> {
        self.catalog.as_ref()
    }

    pub fn stars(&self) -> &[StarRecord] {
        &self.stars
    }

    /// True when the fusion driver is publishing orientations
    pub fn imu_running(&self) -> bool {
        self.orientation
            .as_ref()
            .is_some_and(OrientationDriver::is_running)
    }

    /// Run until a [`InputEvent::Quit`] arrives
    ///
    /// `poll_input` is called once per frame. With a framebuffer sink each
    /// finished frame is copied to the device instead of being presented.
    pub fn run<S, F, W>(
        &mut self,
        surface: &mut S,
        mut poll_input: F,
        mut framebuffer: Option<FramebufferSink<W>>,
    ) -> Result<(), RenderError>
    where
        S: RasterSurface + ?Sized,
        F: FnMut() -> Vec<InputEvent>,
        W: Write + Seek,
    {
        info!(
            imu = self.imu_running(),
            gps = self.location.as_ref().is_some_and(LocationDriver::is_running),
            framebuffer = framebuffer.is_some(),
            "display started"
        );

        let mut pacer = FramePacer::new(self.display.target_fps);
        loop {
            let events = poll_input();
            let running = match framebuffer.as_mut() {
                Some(sink) => {
                    let running = self.draw_at(surface, &events, Instant::now());
                    if running {
                        sink.present_from(surface)?;
                    }
                    running
                }
                None => self.frame(surface, &events)?,
            };
            if !running {
                info!("display stopped");
                return Ok(());
            }
            pacer.pace();
        }
    }

    pub fn frame<S: RasterSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        events: &[InputEvent],
    ) -> Result<bool, RenderError> {
        self.frame_at(surface, events, Instant::now())
    }

    /// Process and present one frame at `now`; returns false once quit was
    /// requested
    pub fn frame_at<S: RasterSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        events: &[InputEvent],
        now: Instant,
    ) -> Result<bool, RenderError> {
        let running = self.draw_at(surface, events, now);
        if running {
            surface.present()?;
        }
        Ok(running)
    }

    /// Process one frame at `now` and draw it without presenting
    pub fn draw_at<S: RasterSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        events: &[InputEvent],
        now: Instant,
    ) -> bool {
        for event in events {
            if !self.handle_at(*event, now) {
                return false;
            }
        }

        self.update_zoom(now);
        self.update_camera();

        if self.refresh_due(now) {
            self.refresh_catalog(now);
        }

        self.fps.tick_at(now);
        if let Some(catalog) = &self.catalog {
            self.renderer
                .draw(surface, &self.camera, catalog, self.fps.fps());
        }
        true
    }

    /// Apply one input event; false for quit
    pub fn handle_at(&mut self, event: InputEvent, now: Instant) -> bool {
        match event {
            InputEvent::Quit => return false,
            InputEvent::Drag { dx, dy } => {
                // The IMU owns the camera while it runs
                if !self.imu_running() {
                    let scale = self.display.drag_degrees_per_pixel.to_radians();
                    self.camera = self.camera.rotated(-dy * scale, dx * scale);
                }
            }
            InputEvent::ZoomKey { direction, pressed } => {
                for control in self.zoom.iter_mut().filter(|c| c.direction == direction) {
                    if pressed {
                        control.button.down_at(now);
                    } else if let Some(press) = control.button.up_at(now) {
                        self.fov.apply(press, control.direction);
                    }
                }
            }
            InputEvent::Buttons { zoom_in, zoom_out } => {
                for control in self.zoom.iter_mut() {
                    let level = match control.direction {
                        ZoomDirection::In => zoom_in,
                        ZoomDirection::Out => zoom_out,
                    };
                    if let Some(press) = control.button.poll_at(level, now) {
                        self.fov.apply(press, control.direction);
                    }
                }
            }
        }
        true
    }

    fn update_zoom(&mut self, now: Instant) {
        let elapsed = self
            .last_frame
            .replace(now)
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);

        for control in self.zoom.iter_mut() {
            control.button.update_at(now);
            if control.button.is_zooming() {
                self.fov.hold(control.direction, elapsed);
            }
        }
    }

    fn update_camera(&mut self) {
        let imu = self
            .orientation
            .as_ref()
            .filter(|driver| driver.is_running())
            .and_then(OrientationDriver::orientation);

        self.camera = match imu {
            Some(orientation) => camera_from_imu(orientation, self.fov.radians(), &self.camera),
            None => self.camera.with_fov(self.fov.radians()),
        };
    }

    fn refresh_due(&self, now: Instant) -> bool {
        let interval = Duration::from_secs(self.sky.refresh_secs);
        self.last_refresh
            .is_none_or(|last| now.saturating_duration_since(last) >= interval)
    }

    /// Rebuild the catalog for the current location and time
    ///
    /// Only the first refresh waits for a fix; later ones take the latest
    /// fix, or keep the previous location if none has arrived.
    fn refresh_catalog(&mut self, now: Instant) {
        let location = match (&self.location, &self.catalog) {
            (Some(driver), None) => {
                driver.get_location(Duration::from_millis(self.sky.location_wait_ms))
            }
            (Some(driver), Some(catalog)) => driver
                .latest()
                .unwrap_or(catalog.observer().location),
            (None, _) => {
                if self.catalog.is_none() {
                    warn!("no location driver, using fallback location");
                }
                self.fallback
            }
        };

        let observer = Observer::new(location, Utc::now());
        self.catalog = Some(SkyCatalog::build(&self.ephemeris, observer, &self.stars));
        self.last_refresh = Some(now);
    }
}

/// Camera for an IMU orientation; the sensor's roll sense is opposite the camera's
fn camera_from_imu(orientation: Orientation, fov: f64, previous: &Camera) -> Camera {
    Camera::new(
        orientation.pitch,
        orientation.yaw,
        -orientation.roll,
        fov,
        previous.screen(),
    )
}
