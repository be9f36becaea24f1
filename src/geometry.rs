//! Convert celestial and horizontal targets into dome slit azimuths.
//!
//! The slit azimuth differs from the telescope azimuth because the pier is
//! displaced from the dome centre along the meridian; the line of sight is
//! projected onto the dome circle and the offset subtracted before taking
//! the angle.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Calculate the Julian Day for a UTC time.
pub fn julian_day(time: &DateTime<Utc>) -> f64 {
    let year = time.year();
    let month = time.month();
    let day = time.day();

    let (y, m) = if month <= 2 {
        (year - 1, month + 12)
    } else {
        (year, month)
    };

    let a = y / 100;
    let b = 2 - a + a / 4;

    let jd = (365.25 * (y as f64 + 4716.0)).floor() + (30.6001 * (m as f64 + 1.0)).floor()
        + day as f64
        + b as f64
        - 1524.5;

    let time_fraction =
        (time.hour() as f64 + time.minute() as f64 / 60.0 + time.second() as f64 / 3600.0) / 24.0;

    jd + time_fraction
}

/// Local mean sidereal time in hours for a Julian Day and an east-positive
/// longitude in degrees.
pub fn local_sidereal_time(jd: f64, longitude: f64) -> f64 {
    let t = (jd - 2451545.0) / 36525.0;

    // Greenwich Mean Sidereal Time in degrees
    let gmst = 280.46061837 + 360.98564736629 * (jd - 2451545.0) + 0.000387933 * t * t
        - t * t * t / 38710000.0;

    let lst = (gmst + longitude) % 360.0;
    if lst < 0.0 {
        (lst + 360.0) / 15.0
    } else {
        lst / 15.0
    }
}

/// Convert an ICRS (RA, Dec) in degrees to (alt, az) in degrees for the
/// given time and observer location. Azimuth is measured from north through
/// east.
pub fn radec_to_altaz(
    ra: f64,
    dec: f64,
    time: &DateTime<Utc>,
    latitude: f64,
    longitude: f64,
) -> (f64, f64) {
    let jd = julian_day(time);
    let lst = local_sidereal_time(jd, longitude);

    let hour_angle = (lst * 15.0 - ra).to_radians();
    let dec_rad = dec.to_radians();
    let lat_rad = latitude.to_radians();

    let sin_alt =
        dec_rad.sin() * lat_rad.sin() + dec_rad.cos() * lat_rad.cos() * hour_angle.cos();
    let alt = sin_alt.asin().to_degrees();

    let az = (-dec_rad.cos() * hour_angle.sin())
        .atan2(dec_rad.sin() * lat_rad.cos() - dec_rad.cos() * hour_angle.cos() * lat_rad.sin())
        .to_degrees();

    (alt, wrap_degrees(az))
}

/// Dome azimuth that centres the slit on a telescope line of sight, given
/// the telescope (alt, az) in degrees, the dome radius and the pier offset
/// along the meridian (both in cm).
pub fn dome_azimuth(alt: f64, az: f64, dome_radius_cm: f64, telescope_offset_x_cm: f64) -> f64 {
    let alt_rad = alt.to_radians();
    let az_rad = az.to_radians();

    // project the line of sight onto the dome circle; x north, y east
    let x = dome_radius_cm * az_rad.cos() * alt_rad.cos();
    let y = dome_radius_cm * az_rad.sin() * alt_rad.cos();

    let dx = x - telescope_offset_x_cm;
    let dy = y;

    wrap_degrees(dy.atan2(dx).to_degrees())
}

/// Dome azimuth for an ICRS target at the given time.
pub fn dome_azimuth_for_radec(
    ra: f64,
    dec: f64,
    time: &DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    dome_radius_cm: f64,
    telescope_offset_x_cm: f64,
) -> f64 {
    let (alt, az) = radec_to_altaz(ra, dec, time, latitude, longitude);
    dome_azimuth(alt, az, dome_radius_cm, telescope_offset_x_cm)
}

/// Wrap an angle in degrees to [0, 360).
pub fn wrap_degrees(angle: f64) -> f64 {
    angle.rem_euclid(360.0)
}

/// Shortest signed separation from `from` to `to` in (-180, 180].
pub fn signed_separation(to: f64, from: f64) -> f64 {
    let delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Choose the unwrapped representative of a requested angle closest to the
/// current unwrapped azimuth. The dome tracks absolute steps, so a request
/// for 10 degrees from 350 degrees must resolve to 370, not a near-full
/// rotation back to 10.
pub fn unwrap_azimuth(current: f64, target: f64) -> f64 {
    let rotation = (current / 360.0).floor();
    let mut best = target + 360.0 * (rotation - 1.0);
    for turns in [rotation, rotation + 1.0] {
        let candidate = target + 360.0 * turns;
        if (current - candidate).abs() < (current - best).abs() {
            best = candidate;
        }
    }
    best
}

/// Convert an unwrapped azimuth to an absolute motor step count.
pub fn azimuth_to_steps(azimuth: f64, home_azimuth: f64, steps_per_rotation: f64) -> i64 {
    ((azimuth - home_azimuth) / 360.0 * steps_per_rotation).round() as i64
}

/// Convert an absolute motor step count to an unwrapped azimuth.
pub fn steps_to_azimuth(steps: i64, home_azimuth: f64, steps_per_rotation: f64) -> f64 {
    home_azimuth + steps as f64 / steps_per_rotation * 360.0
}
