//! GPS location driver
//!
//! A background thread reads NMEA sentences line by line from a serial
//! device and publishes each position fix into a single-slot snapshot.
//! [`LocationDriver::get_location`] waits a bounded time for a fix and falls
//! back to a fixed coordinate, so the display works without a receiver.

use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nmea0183::{ParseResult, Parser};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};

use crate::error::{DriverError, LocationError};
use crate::snapshot::{DriverState, DriverStatus, Snapshot};
use crate::types::GeoLocation;

/// Snapshot polling interval of [`LocationDriver::get_location`]
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause after end-of-stream or a hard read error
const READ_BACKOFF: Duration = Duration::from_millis(100);

/// Longest line kept; NMEA sentences are at most 82 bytes
const MAX_LINE: usize = 128;

/// Sentence types that carry a position
const POSITION_SENTENCES: [&str; 3] = ["GGA", "RMC", "GLL"];

/// Serial port and fallback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationSettings {
    pub port: String,
    pub baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Returned by `get_location` when no fix arrives in time
    pub fallback: GeoLocation,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".into(),
            baud_rate: 9600,
            read_timeout_ms: 1000,
            fallback: GeoLocation::FALLBACK,
        }
    }
}

/// Open the configured serial port as a line reader
pub fn open_serial(
    settings: &LocationSettings,
) -> Result<impl BufRead + Send + 'static + use<>, LocationError> {
    serialport::new(&settings.port, settings.baud_rate)
        .timeout(Duration::from_millis(settings.read_timeout_ms))
        .open()
        .map(BufReader::new)
        .map_err(|cause| LocationError::Open {
            path: settings.port.clone(),
            message: cause.to_string(),
        })
}

/// Extract a position from one NMEA sentence
///
/// Sentences other than GGA, RMC and GLL, and GGA/RMC sentences without a
/// fix, yield `Ok(None)`. Checksum or field errors yield
/// [`LocationError::Parse`].
///
/// # Example
/// ```
/// use sky_hud::parse_sentence;
///
/// let fix = parse_sentence("$GPGGA,002153,3945.534,N,08411.496,W,1,08,0.9,250.0,M,-33.0,M,,*70")
///     .unwrap()
///     .unwrap();
/// assert!((fix.latitude - 39.7589).abs() < 1e-6);
/// assert!((fix.longitude + 84.1916).abs() < 1e-6);
/// ```
pub fn parse_sentence(line: &str) -> Result<Option<GeoLocation>, LocationError> {
    let sentence = line.trim();
    let Some(kind) = sentence.get(3..6) else {
        return Ok(None);
    };
    if !sentence.starts_with('$') || !POSITION_SENTENCES.contains(&kind) {
        return Ok(None);
    }

    let mut framed = Vec::with_capacity(sentence.len() + 2);
    framed.extend_from_slice(sentence.as_bytes());
    framed.extend_from_slice(b"\r\n");

    let mut parser = Parser::new();
    let mut location = None;
    for result in parser.parse_from_bytes(&framed) {
        match result.map_err(|cause| LocationError::Parse(cause.to_string()))? {
            ParseResult::GGA(Some(gga)) => {
                location = Some(GeoLocation::new(gga.latitude.as_f64(), gga.longitude.as_f64()));
            }
            ParseResult::RMC(Some(rmc)) => {
                location = Some(GeoLocation::new(rmc.latitude.as_f64(), rmc.longitude.as_f64()));
            }
            ParseResult::GLL(Some(gll)) => {
                location = Some(GeoLocation::new(gll.latitude.as_f64(), gll.longitude.as_f64()));
            }
            _ => {}
        }
    }

    Ok(location)
}

#[derive(Debug, Default)]
struct Shared {
    status: DriverStatus,
    location: Snapshot<GeoLocation>,
}

/// Handle to the background GPS reader
#[derive(Debug, Clone)]
pub struct LocationDriver {
    shared: Arc<Shared>,
    fallback: GeoLocation,
}

impl LocationDriver {
    /// Spawn the reader on the configured serial port
    pub fn from_serial(settings: LocationSettings) -> Self {
        let fallback = settings.fallback;
        Self::start(fallback, move || open_serial(&settings))
    }

    /// Spawn the reader on whatever line source `open` yields
    ///
    /// `open` runs on the new thread; its failure is the only way the driver
    /// ends up `Failed`.
    pub fn start<R, F>(fallback: GeoLocation, open: F) -> Self
    where
        R: BufRead,
        F: FnOnce() -> Result<R, LocationError> + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);

        let spawned = thread::Builder::new()
            .name("location".into())
            .spawn(move || run(&worker, open));

        if let Err(cause) = spawned {
            error!(%cause, "failed to spawn location thread");
            shared.status.mark_failed(DriverError::Spawn("location"));
        }

        Self { shared, fallback }
    }

    pub fn state(&self) -> DriverState {
        self.shared.status.state()
    }

    pub fn is_running(&self) -> bool {
        self.shared.status.is_running()
    }

    pub fn failure(&self) -> Option<&DriverError> {
        self.shared.status.failure()
    }

    /// Latest fix, without waiting
    pub fn latest(&self) -> Option<GeoLocation> {
        self.shared.location.latest()
    }

    /// First available fix within `timeout`, else the fallback coordinate
    ///
    /// Returns the fallback immediately if the driver has failed.
    pub fn get_location(&self, timeout: Duration) -> GeoLocation {
        let deadline = Instant::now() + timeout;

        loop {
            if self.shared.status.is_failed() {
                break;
            }
            if let Some(location) = self.latest() {
                return location;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }

        warn!(
            latitude = self.fallback.latitude,
            longitude = self.fallback.longitude,
            "no GPS fix, using fallback location"
        );
        self.fallback
    }
}

fn run<R, F>(shared: &Shared, open: F)
where
    R: BufRead,
    F: FnOnce() -> Result<R, LocationError>,
{
    let _span = info_span!("location").entered();

    let mut reader = match open() {
        Ok(reader) => reader,
        Err(cause) => {
            error!(%cause, "GPS unavailable");
            shared.status.mark_failed(DriverError::Serial(cause.to_string()));
            return;
        }
    };

    shared.status.mark_running();
    info!("location driver running");

    let mut lines = LineReader::new(reader);
    loop {
        match lines.next_line() {
            Ok(ReadOutcome::Line(line)) => handle_line(shared, &line),
            Ok(ReadOutcome::Oversize) => debug!(limit = MAX_LINE, "dropping oversize serial line"),
            Ok(ReadOutcome::End) => thread::sleep(READ_BACKOFF),
            // A timeout mid-line keeps the partial line for the next read
            Err(cause) if is_idle(&cause) => {}
            Err(cause) => {
                let cause = LocationError::from(cause);
                warn!(%cause, "dropping partial line");
                lines.discard();
                thread::sleep(READ_BACKOFF);
            }
        }
    }
}

enum ReadOutcome {
    Line(String),
    /// A chunk of a line longer than [`MAX_LINE`]
    Oversize,
    End,
}

/// Newline-framed reader whose line buffer never grows past [`MAX_LINE`]
struct LineReader<R> {
    inner: R,
    buffer: Vec<u8>,
    oversize: bool,
}

impl<R: BufRead> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(MAX_LINE),
            oversize: false,
        }
    }

    fn next_line(&mut self) -> io::Result<ReadOutcome> {
        let room = (MAX_LINE - self.buffer.len()) as u64;
        let read = (&mut self.inner).take(room).read_until(b'\n', &mut self.buffer)?;
        if read == 0 {
            return Ok(ReadOutcome::End);
        }

        let complete = self.buffer.ends_with(b"\n");
        if !complete && self.buffer.len() >= MAX_LINE {
            self.buffer.clear();
            self.oversize = true;
            return Ok(ReadOutcome::Oversize);
        }

        // The tail of an oversize line ends here
        if std::mem::take(&mut self.oversize) {
            self.buffer.clear();
            return Ok(ReadOutcome::Oversize);
        }

        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Ok(ReadOutcome::Line(line))
    }

    fn discard(&mut self) {
        self.buffer.clear();
        self.oversize = false;
    }
}

fn handle_line(shared: &Shared, line: &str) {
    let line = line.trim();
    if !line.starts_with('$') {
        return;
    }

    match parse_sentence(line) {
        Ok(Some(location)) => {
            debug!(latitude = location.latitude, longitude = location.longitude, "fix");
            shared.location.publish(location);
        }
        Ok(None) => {}
        Err(cause) => warn!(%cause, sentence = line, "NMEA parse error"),
    }
}

/// Read errors that only mean "no data yet"
fn is_idle(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}
