//! Sky geometry used by the enrichment engine: angular separation, search
//! radii and the sexagesimal designation convention.
//!
//! Designations follow the IAU style `JHHMMSS.ss±DDMMSS.s`. Right ascension is
//! kept to 0.01 s of time and declination to 0.1 arcsecond. Formatting rounds
//! in integer units so that carries (59.995 s) propagate into minutes and hours
//! instead of printing `60.00`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::error::{EnrichError, Result};
use crate::domain::Coordinate;

const ARCSEC_PER_DEG: f64 = 3600.0;
const RA_UNITS_PER_HOUR: i64 = 360_000; // centiseconds of time
const RA_UNITS_PER_DAY: i64 = 24 * RA_UNITS_PER_HOUR;
const DEC_UNITS_PER_DEG: i64 = 36_000; // deciarcseconds
const DEC_UNITS_MAX: i64 = 90 * DEC_UNITS_PER_DEG;

static DESIGNATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^0-9])(\d{2})(\d{2})(\d{2})\.?(\d*)\s*([+-])(\d{2})(\d{2})(\d{2})\.?(\d*)(?:[^0-9]|$)")
        .expect("designation pattern is valid")
});

/// Angular separation in degrees between two positions given in degrees.
///
/// Uses the Vincenty formula, which stays accurate for both tiny and
/// near-antipodal separations.
pub fn angular_separation_deg(ra1_deg: f64, dec1_deg: f64, ra2_deg: f64, dec2_deg: f64) -> f64 {
    let (d1_sin, d1_cos) = dec1_deg.to_radians().sin_cos();
    let (d2_sin, d2_cos) = dec2_deg.to_radians().sin_cos();
    let (dl_sin, dl_cos) = (ra2_deg - ra1_deg).to_radians().sin_cos();

    let num = ((d2_cos * dl_sin).powi(2) + (d1_cos * d2_sin - d1_sin * d2_cos * dl_cos).powi(2)).sqrt();
    let den = d1_sin * d2_sin + d1_cos * d2_cos * dl_cos;

    num.atan2(den).to_degrees()
}

/// A validated, strictly positive search radius.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Radius {
    arcsec: f64,
}

impl Radius {
    pub fn from_arcsec(arcsec: f64) -> Result<Self> {
        if !arcsec.is_finite() || arcsec <= 0.0 {
            return Err(EnrichError::invalid(format!(
                "search radius must be a positive angle, got {arcsec} arcsec"
            )));
        }
        Ok(Self { arcsec })
    }

    /// Validates an optional radius as received at an API boundary.
    pub fn require(arcsec: Option<f64>) -> Result<Self> {
        match arcsec {
            Some(value) => Self::from_arcsec(value),
            None => Err(EnrichError::invalid("a search radius is required")),
        }
    }

    pub fn arcsec(&self) -> f64 {
        self.arcsec
    }

    pub fn degrees(&self) -> f64 {
        self.arcsec / ARCSEC_PER_DEG
    }

    pub fn contains(&self, separation_arcsec: f64) -> bool {
        separation_arcsec <= self.arcsec
    }
}

impl fmt::Display for Radius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}arcsec", self.arcsec)
    }
}

impl FromStr for Radius {
    type Err = EnrichError;

    /// Accepts a bare number (arcseconds) or a number with a unit suffix:
    /// `arcsec`/`"`, `arcmin`/`'`, `deg`/`d`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+' || c == 'e' || c == 'E'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| EnrichError::invalid(format!("cannot read search radius '{s}'")))?;
        let factor = match unit.trim() {
            "" | "arcsec" | "\"" | "as" => 1.0,
            "arcmin" | "'" | "am" => 60.0,
            "deg" | "d" => ARCSEC_PER_DEG,
            other => {
                return Err(EnrichError::invalid(format!("unknown radius unit '{other}'")));
            }
        };
        Self::from_arcsec(value * factor)
    }
}

/// Formats a coordinate as a designation with the given prefix (usually `J`).
pub fn format_designation(coordinate: &Coordinate, prefix: &str) -> String {
    let ra_hours = coordinate.ra_deg() / 15.0;
    let ra_units = ((ra_hours * RA_UNITS_PER_HOUR as f64).round() as i64).rem_euclid(RA_UNITS_PER_DAY);
    let hh = ra_units / RA_UNITS_PER_HOUR;
    let mm = (ra_units / 6_000) % 60;
    let ss = (ra_units / 100) % 60;
    let cs = ra_units % 100;

    let dec = coordinate.dec_deg();
    let dec_units = ((dec.abs() * DEC_UNITS_PER_DEG as f64).round() as i64).min(DEC_UNITS_MAX);
    let sign = if dec < 0.0 && dec_units > 0 { '-' } else { '+' };
    let dd = dec_units / DEC_UNITS_PER_DEG;
    let dm = (dec_units / 600) % 60;
    let ds = (dec_units / 10) % 60;
    let tenths = dec_units % 10;

    format!("{prefix}{hh:02}{mm:02}{ss:02}.{cs:02}{sign}{dd:02}{dm:02}{ds:02}.{tenths}")
}

/// Extracts the position encoded in a designation such as
/// `2MASS J05591914-1404488` or `SDSS J123456.78+012345.6`.
///
/// Digits following the seconds field are read as its fraction whether or not
/// a decimal point is present, which covers both catalog conventions.
pub fn parse_designation(designation: &str) -> Result<Coordinate> {
    let caps = DESIGNATION_RE.captures(designation).ok_or_else(|| {
        EnrichError::parse(format!("'{designation}' does not encode a sexagesimal position"))
    })?;

    let int = |i: usize| -> u32 { caps[i].parse().unwrap_or(0) };
    let seconds = |whole: usize, frac: usize| -> f64 {
        let frac = &caps[frac];
        let whole = caps[whole].parse::<f64>().unwrap_or(0.0);
        if frac.is_empty() {
            whole
        } else {
            whole + format!("0.{frac}").parse::<f64>().unwrap_or(0.0)
        }
    };

    let (hh, mm, ss) = (int(1), int(2), seconds(3, 4));
    let (dd, dm, ds) = (int(6), int(7), seconds(8, 9));
    if hh >= 24 || mm >= 60 || ss >= 60.0 {
        return Err(EnrichError::parse(format!(
            "right ascension out of range in '{designation}'"
        )));
    }
    if dd > 90 || dm >= 60 || ds >= 60.0 || (dd == 90 && (dm > 0 || ds > 0.0)) {
        return Err(EnrichError::parse(format!(
            "declination out of range in '{designation}'"
        )));
    }

    let ra_deg = (hh as f64 + mm as f64 / 60.0 + ss / 3600.0) * 15.0;
    let magnitude = dd as f64 + dm as f64 / 60.0 + ds / 3600.0;
    let dec_deg = if &caps[5] == "-" { -magnitude } else { magnitude };

    Coordinate::new(ra_deg, dec_deg).map_err(|e| EnrichError::parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(ra: f64, dec: f64) -> Coordinate {
        Coordinate::new(ra, dec).unwrap()
    }

    #[test]
    fn test_separation_of_identical_points_is_zero() {
        assert!(angular_separation_deg(10.0, 20.0, 10.0, 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_separation_along_meridian() {
        let sep = angular_separation_deg(150.0, 2.0, 150.0, 2.0 + 5.0 / 3600.0);
        assert!((sep * 3600.0 - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_separation_wraps_ra() {
        let sep = angular_separation_deg(359.999, 0.0, 0.001, 0.0);
        assert!((sep - 0.002).abs() < 1e-9);
    }

    #[test]
    fn test_radius_rejects_non_positive() {
        assert!(matches!(Radius::from_arcsec(0.0), Err(EnrichError::InvalidParameter(_))));
        assert!(matches!(Radius::from_arcsec(-3.0), Err(EnrichError::InvalidParameter(_))));
        assert!(matches!(Radius::from_arcsec(f64::NAN), Err(EnrichError::InvalidParameter(_))));
        assert!(matches!(Radius::require(None), Err(EnrichError::InvalidParameter(_))));
    }

    #[test]
    fn test_radius_units() {
        assert_eq!("5".parse::<Radius>().unwrap().arcsec(), 5.0);
        assert_eq!("2arcmin".parse::<Radius>().unwrap().arcsec(), 120.0);
        assert_eq!("0.5deg".parse::<Radius>().unwrap().arcsec(), 1800.0);
        assert_eq!("3\"".parse::<Radius>().unwrap().arcsec(), 3.0);
        assert!("3parsec".parse::<Radius>().is_err());
    }

    #[test]
    fn test_format_designation() {
        // 05h59m19.14s -14d04m48.8s
        let ra = (5.0 + 59.0 / 60.0 + 19.14 / 3600.0) * 15.0;
        let dec = -(14.0 + 4.0 / 60.0 + 48.8 / 3600.0);
        assert_eq!(format_designation(&coord(ra, dec), "J"), "J055919.14-140448.8");
    }

    #[test]
    fn test_format_designation_carries_rounding() {
        // 59.9999 s rounds up into the next minute and hour
        let ra = (3.0 + 59.0 / 60.0 + 59.9999 / 3600.0) * 15.0;
        assert_eq!(format_designation(&coord(ra, 0.0), "J"), "J040000.00+000000.0");
    }

    #[test]
    fn test_format_designation_negative_zero_uses_plus() {
        assert_eq!(format_designation(&coord(0.0, -0.000001), "J"), "J000000.00+000000.0");
    }

    #[test]
    fn test_parse_compact_2mass_designation() {
        let c = parse_designation("2MASS J05591914-1404488").unwrap();
        assert_eq!(format_designation(&c, "J"), "J055919.14-140448.8");
    }

    #[test]
    fn test_parse_dotted_designation() {
        let c = parse_designation("SDSS J123456.78+012345.6").unwrap();
        assert!((c.ra_deg() - (12.0 + 34.0 / 60.0 + 56.78 / 3600.0) * 15.0).abs() < 1e-9);
        assert!((c.dec_deg() - (1.0 + 23.0 / 60.0 + 45.6 / 3600.0)).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_names_without_position() {
        assert!(matches!(parse_designation("HD 12345"), Err(EnrichError::Parse(_))));
        assert!(matches!(parse_designation("Vega"), Err(EnrichError::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_out_of_range_fields() {
        assert!(matches!(parse_designation("J256000.00+100000.0"), Err(EnrichError::Parse(_))));
        assert!(matches!(parse_designation("J120000.00+916000.0"), Err(EnrichError::Parse(_))));
    }
}
