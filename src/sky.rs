//! Sky objects and the ephemeris seam
//!
//! An [`Ephemeris`] turns a target plus an [`Observer`] into horizontal
//! coordinates. The display asks it once per location/time refresh and caches
//! the answers in a [`SkyCatalog`], which the render loop projects every frame.

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::Camera;
use crate::math::wrap_tau;
use crate::types::{GeoLocation, ScreenPoint, SkyDirection};

/// Solar-system bodies shown on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Body {
    Sun,
    Moon,
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
}

impl Body {
    pub const ALL: [Body; 10] = [
        Body::Sun,
        Body::Moon,
        Body::Mercury,
        Body::Venus,
        Body::Mars,
        Body::Jupiter,
        Body::Saturn,
        Body::Uranus,
        Body::Neptune,
        Body::Pluto,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Body::Sun => "Sun",
            Body::Moon => "Moon",
            Body::Mercury => "Mercury",
            Body::Venus => "Venus",
            Body::Mars => "Mars",
            Body::Jupiter => "Jupiter",
            Body::Saturn => "Saturn",
            Body::Uranus => "Uranus",
            Body::Neptune => "Neptune",
            Body::Pluto => "Pluto",
        }
    }

    /// Apparent diameter used for drawing, radians
    pub fn angular_diameter(&self) -> f64 {
        match self {
            Body::Sun | Body::Moon => 0.5f64.to_radians(),
            _ => STAR_DIAMETER_DEGREES.to_radians(),
        }
    }
}

/// Drawing diameter of stars and planets, degrees
const STAR_DIAMETER_DEGREES: f64 = 0.01;

/// Hipparcos numbers of the stars that get a label
pub const NAMED_STARS: [(u32, &str); 4] = [
    (11767, "Polaris"),
    (69673, "Arcturus"),
    (91262, "Vega"),
    (78322, "Blaze Star"),
];

/// Label for a Hipparcos star, if it has one
pub fn star_label(hip: u32) -> Option<&'static str> {
    NAMED_STARS
        .iter()
        .find(|(number, _)| *number == hip)
        .map(|(_, name)| *name)
}

/// One star catalog row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StarRecord {
    pub hip: u32,
    /// Right ascension in radians; `None` when the catalog has no position
    pub ra: Option<f64>,
    /// Declination in radians
    pub dec: Option<f64>,
    pub magnitude: f64,
}

impl StarRecord {
    pub fn has_position(&self) -> bool {
        self.ra.is_some_and(f64::is_finite) && self.dec.is_some_and(f64::is_finite)
    }
}

/// Parse Hipparcos new-reduction (`hip2.dat`) records
///
/// Lines too short to hold a record, or without a HIP number and magnitude,
/// are skipped. A record with an unreadable position is kept with `ra`/`dec`
/// set to `None`.
pub fn parse_hipparcos(data: &str) -> Vec<StarRecord> {
    data.lines().filter_map(parse_hipparcos_record).collect()
}

fn parse_hipparcos_record(record: &str) -> Option<StarRecord> {
    let field = |range: core::ops::Range<usize>| record.get(range).map(str::trim);

    Some(StarRecord {
        hip: field(0..6)?.parse().ok()?,
        ra: field(15..28).and_then(|v| v.parse().ok()),
        dec: field(29..42).and_then(|v| v.parse().ok()),
        magnitude: field(129..136)?.parse().ok()?,
    })
}

/// Stars worth drawing
///
/// Drops records without a position, keeps the `brightest` lowest-magnitude
/// stars and appends any `extras` (by HIP number) not already included.
pub fn select_stars(records: &[StarRecord], brightest: usize, extras: &[u32]) -> Vec<StarRecord> {
    let mut positioned: Vec<StarRecord> = records
        .iter()
        .copied()
        .filter(StarRecord::has_position)
        .collect();
    positioned.sort_by(|a, b| a.magnitude.total_cmp(&b.magnitude));

    let mut selected: Vec<StarRecord> = positioned.iter().take(brightest).copied().collect();
    for hip in extras {
        let already = selected.iter().any(|star| star.hip == *hip);
        if let Some(star) = positioned.iter().find(|star| star.hip == *hip) {
            if !already {
                selected.push(*star);
            }
        }
    }

    selected
}

/// Something an ephemeris can locate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Target {
    Body(Body),
    Star(StarRecord),
}

/// Apparent position as seen by an observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalPosition {
    /// Radians above the horizon
    pub altitude: f64,
    /// Radians east of north
    pub azimuth: f64,
    pub distance_km: f64,
}

impl HorizontalPosition {
    pub fn direction(&self) -> SkyDirection {
        SkyDirection::new(self.altitude, self.azimuth)
    }
}

/// Where and when the sky is observed from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    pub location: GeoLocation,
    pub time: DateTime<Utc>,
}

impl Observer {
    pub fn new(location: GeoLocation, time: DateTime<Utc>) -> Self {
        Self { location, time }
    }

    pub fn now(location: GeoLocation) -> Self {
        Self::new(location, Utc::now())
    }
}

/// Astronomical position provider
pub trait Ephemeris {
    /// Apparent horizontal position of `target`; `None` if it is unknown to
    /// this provider
    fn observe(&self, observer: &Observer, target: &Target) -> Option<HorizontalPosition>;
}

/// Greenwich mean sidereal time in radians
pub fn greenwich_sidereal_time(time: &DateTime<Utc>) -> f64 {
    let unix_days = time.timestamp() as f64 / 86_400.0
        + f64::from(time.timestamp_subsec_nanos()) / 86_400e9;
    // Days since J2000.0 (JD 2451545.0 is unix day 10957.5)
    let days = unix_days - 10_957.5;
    wrap_tau((280.460_618_37 + 360.985_647_366_29 * days).to_radians())
}

/// Local sidereal time in radians at `longitude` degrees east
pub fn local_sidereal_time(time: &DateTime<Utc>, longitude: f64) -> f64 {
    wrap_tau(greenwich_sidereal_time(time) + longitude.to_radians())
}

/// Fixed-star ephemeris from catalog right ascension and declination
///
/// Ignores precession, nutation, aberration and refraction, which keeps it
/// within about a degree for current dates. Knows nothing about bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct StellarEphemeris;

impl Ephemeris for StellarEphemeris {
    fn observe(&self, observer: &Observer, target: &Target) -> Option<HorizontalPosition> {
        let Target::Star(star) = target else {
            return None;
        };
        let (ra, dec) = (star.ra?, star.dec?);

        let latitude = observer.location.latitude.to_radians();
        let hour_angle = local_sidereal_time(&observer.time, observer.location.longitude) - ra;

        let (sin_lat, cos_lat) = latitude.sin_cos();
        let (sin_dec, cos_dec) = dec.sin_cos();
        let (sin_ha, cos_ha) = hour_angle.sin_cos();

        let east = -cos_dec * sin_ha;
        let north = cos_lat * sin_dec - sin_lat * cos_dec * cos_ha;
        let up = sin_lat * sin_dec + cos_lat * cos_dec * cos_ha;

        Some(HorizontalPosition {
            altitude: up.clamp(-1.0, 1.0).asin(),
            azimuth: wrap_tau(east.atan2(north)),
            distance_km: f64::INFINITY,
        })
    }
}

/// What a catalog entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Body(Body),
    Star { hip: u32 },
}

/// One drawable object with its cached direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    pub kind: EntryKind,
    pub label: Option<&'static str>,
    pub direction: SkyDirection,
    /// Radians
    pub angular_diameter: f64,
    unit: Vector3<f64>,
}

impl CatalogEntry {
    fn new(
        kind: EntryKind,
        label: Option<&'static str>,
        direction: SkyDirection,
        angular_diameter: f64,
    ) -> Self {
        Self {
            kind,
            label,
            direction,
            angular_diameter,
            unit: direction.to_unit_vector(),
        }
    }
}

/// Catalog selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub brightest_stars: usize,
    /// Extra stars by HIP number, shown regardless of magnitude
    pub extra_stars: Vec<u32>,
    /// Seconds between catalog rebuilds
    pub refresh_secs: u64,
    /// How long a refresh waits for a GPS fix, milliseconds
    pub location_wait_ms: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            brightest_stars: 100,
            extra_stars: vec![78322],
            refresh_secs: 60,
            location_wait_ms: 100,
        }
    }
}

/// Bodies and selected stars as seen by one observer
///
/// Immutable; rebuilt on every location/time refresh.
#[derive(Debug, Clone)]
pub struct SkyCatalog {
    observer: Observer,
    entries: Vec<CatalogEntry>,
}

impl SkyCatalog {
    /// Ask `ephemeris` for every body and star; targets it cannot place are left out
    pub fn build<E: Ephemeris + ?Sized>(ephemeris: &E, observer: Observer, stars: &[StarRecord]) -> Self {
        let bodies = Body::ALL.iter().filter_map(|body| {
            ephemeris
                .observe(&observer, &Target::Body(*body))
                .map(|position| {
                    CatalogEntry::new(
                        EntryKind::Body(*body),
                        Some(body.name()),
                        position.direction(),
                        body.angular_diameter(),
                    )
                })
        });

        let stars = stars.iter().filter_map(|star| {
            ephemeris
                .observe(&observer, &Target::Star(*star))
                .map(|position| {
                    CatalogEntry::new(
                        EntryKind::Star { hip: star.hip },
                        star_label(star.hip),
                        position.direction(),
                        STAR_DIAMETER_DEGREES.to_radians(),
                    )
                })
        });

        let entries: Vec<CatalogEntry> = bodies.chain(stars).collect();
        debug!(
            entries = entries.len(),
            latitude = observer.location.latitude,
            longitude = observer.location.longitude,
            "sky catalog rebuilt"
        );

        Self { observer, entries }
    }

    pub fn empty(observer: Observer) -> Self {
        Self {
            observer,
            entries: Vec::new(),
        }
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entries in front of `camera` with their screen positions
    pub fn visible<'a>(
        &'a self,
        camera: &'a Camera,
    ) -> impl Iterator<Item = (&'a CatalogEntry, ScreenPoint)> + 'a {
        self.entries
            .iter()
            .filter_map(move |entry| camera.project_vector(&entry.unit).map(|point| (entry, point)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ScreenGeometry;
    use chrono::TimeZone;

    fn star(hip: u32, magnitude: f64) -> StarRecord {
        StarRecord {
            hip,
            ra: Some(0.1 * hip as f64),
            dec: Some(0.0),
            magnitude,
        }
    }

    /// Everything sits at a fixed spot; stars are spread by HIP number
    struct FixedEphemeris;

    impl Ephemeris for FixedEphemeris {
        fn observe(&self, _: &Observer, target: &Target) -> Option<HorizontalPosition> {
            match target {
                Target::Body(Body::Pluto) => None,
                Target::Body(_) => Some(HorizontalPosition {
                    altitude: 0.5,
                    azimuth: 1.0,
                    distance_km: 1.5e8,
                }),
                Target::Star(star) => Some(HorizontalPosition {
                    altitude: 0.2,
                    azimuth: star.hip as f64 * 0.01,
                    distance_km: f64::INFINITY,
                }),
            }
        }
    }

    fn dayton_at_noon() -> Observer {
        Observer::new(
            GeoLocation::FALLBACK,
            Utc.with_ymd_and_hms(2024, 4, 8, 17, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_select_brightest_plus_extras() {
        let mut records = vec![star(1, 3.0), star(2, -1.0), star(3, 5.0), star(78322, 10.0)];
        records.push(StarRecord {
            hip: 4,
            ra: None,
            dec: None,
            magnitude: -5.0,
        });

        let selected = select_stars(&records, 2, &[78322]);
        let hips: Vec<u32> = selected.iter().map(|s| s.hip).collect();
        assert_eq!(hips, vec![2, 1, 78322]);
    }

    #[test]
    fn test_extras_are_not_duplicated() {
        let records = vec![star(1, 1.0), star(2, 2.0)];
        let selected = select_stars(&records, 5, &[1, 99]);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_star_labels() {
        assert_eq!(star_label(11767), Some("Polaris"));
        assert_eq!(star_label(78322), Some("Blaze Star"));
        assert_eq!(star_label(1), None);
    }

    #[test]
    fn test_body_diameters() {
        assert!((Body::Sun.angular_diameter() - 0.5f64.to_radians()).abs() < 1e-15);
        assert!((Body::Moon.angular_diameter() - 0.5f64.to_radians()).abs() < 1e-15);
        assert!((Body::Jupiter.angular_diameter() - 0.01f64.to_radians()).abs() < 1e-15);
    }

    #[test]
    fn test_catalog_skips_unknown_targets() {
        let stars = [star(11767, 2.0), star(5, 4.0)];
        let catalog = SkyCatalog::build(&FixedEphemeris, dayton_at_noon(), &stars);

        assert_eq!(catalog.entries().len(), 9 + 2);
        assert!(catalog
            .entries()
            .iter()
            .all(|entry| entry.kind != EntryKind::Body(Body::Pluto)));

        let polaris = catalog
            .entries()
            .iter()
            .find(|entry| entry.kind == EntryKind::Star { hip: 11767 })
            .unwrap();
        assert_eq!(polaris.label, Some("Polaris"));
    }

    #[test]
    fn test_visible_entries_face_the_camera() {
        let catalog = SkyCatalog::build(&FixedEphemeris, dayton_at_noon(), &[]);
        let toward = Camera::looking_at(
            SkyDirection::new(0.5, 1.0),
            30f64.to_radians(),
            ScreenGeometry::default(),
        );
        assert_eq!(catalog.visible(&toward).count(), 9);

        let away = Camera::looking_at(
            SkyDirection::new(-0.5, 1.0 + core::f64::consts::PI),
            30f64.to_radians(),
            ScreenGeometry::default(),
        );
        assert_eq!(catalog.visible(&away).count(), 0);
    }

    #[test]
    fn test_star_on_meridian_at_own_declination_is_overhead() {
        let observer = dayton_at_noon();
        let ra = local_sidereal_time(&observer.time, observer.location.longitude);
        let overhead = StarRecord {
            hip: 1,
            ra: Some(ra),
            dec: Some(observer.location.latitude.to_radians()),
            magnitude: 0.0,
        };

        let position = StellarEphemeris
            .observe(&observer, &Target::Star(overhead))
            .unwrap();
        assert!((position.altitude - core::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_polaris_altitude_matches_latitude() {
        let observer = dayton_at_noon();
        let polaris = StarRecord {
            hip: 11767,
            ra: Some(37.954_56f64.to_radians()),
            dec: Some(89.264_11f64.to_radians()),
            magnitude: 2.0,
        };

        let position = StellarEphemeris
            .observe(&observer, &Target::Star(polaris))
            .unwrap();
        assert!((position.altitude.to_degrees() - observer.location.latitude).abs() < 1.0);
        let azimuth = position.azimuth.to_degrees();
        assert!(!(2.0..=358.0).contains(&azimuth), "azimuth {azimuth}");
    }

    #[test]
    fn test_stellar_ephemeris_ignores_bodies() {
        assert!(StellarEphemeris
            .observe(&dayton_at_noon(), &Target::Body(Body::Sun))
            .is_none());
    }

    #[test]
    fn test_sidereal_time_at_j2000() {
        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        let gmst = greenwich_sidereal_time(&j2000).to_degrees();
        assert!((gmst - 280.460_618_37).abs() < 1e-6);
    }

    #[test]
    fn test_parse_hipparcos_record() {
        let mut record = format!("{:>6}", 11767);
        record.push_str(&" ".repeat(9));
        record.push_str(&format!("{:>13}", "0.6623999999"));
        record.push(' ');
        record.push_str(&format!("{:>13}", "1.5579645000"));
        while record.len() < 129 {
            record.push(' ');
        }
        record.push_str(&format!("{:>7}", "2.1077"));

        let stars = parse_hipparcos(&format!("{record}\nshort line\n"));
        assert_eq!(stars.len(), 1);
        assert_eq!(stars[0].hip, 11767);
        assert!((stars[0].dec.unwrap() - 1.5579645).abs() < 1e-9);
        assert!((stars[0].magnitude - 2.1077).abs() < 1e-9);
    }
}
