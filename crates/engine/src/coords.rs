//! Pixel/time conversions for the timeline track.
//!
//! All functions are total: degenerate inputs map to `0` instead of `NaN`.

/// Maps a playback time to a horizontal position on a track `track_width_px` wide.
///
/// # Example
/// ```
/// use trim_engine::coords::time_to_position;
///
/// assert_eq!(time_to_position(2.5, 10.0, 400.0), 100.0);
/// assert_eq!(time_to_position(2.5, 0.0, 400.0), 0.0);
/// ```
pub fn time_to_position(time: f64, duration: f64, track_width_px: f64) -> f64 {
    if !(duration > 0.0) || !time.is_finite() || !duration.is_finite() {
        return 0.0;
    }
    non_negative((time / duration) * track_width_px)
}

/// Maps a horizontal track position back to a playback time.
///
/// # Example
/// ```
/// use trim_engine::coords::position_to_time;
///
/// assert_eq!(position_to_time(100.0, 10.0, 400.0), 2.5);
/// assert_eq!(position_to_time(100.0, 10.0, 0.0), 0.0);
/// ```
pub fn position_to_time(position_px: f64, duration: f64, track_width_px: f64) -> f64 {
    if !(duration > 0.0) || !(track_width_px > 0.0) {
        return 0.0;
    }
    if !position_px.is_finite() || !duration.is_finite() || !track_width_px.is_finite() {
        return 0.0;
    }
    non_negative((position_px / track_width_px) * duration)
}

/// Clamps `value` into `[min, max]`.
///
/// Unlike [`f64::clamp`] this never panics: a reversed interval yields `min`
/// and a `NaN` value yields `min`.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if min > max || value.is_nan() {
        return min;
    }
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Formats seconds as `mm:ss.cc` for logs and status lines.
pub fn format_timestamp(seconds: f64) -> String {
    let centis = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 100.0).round() as u64
    } else {
        0
    };
    let minutes = centis / 6_000;
    let secs = (centis / 100) % 60;
    format!("{minutes:02}:{secs:02}.{:02}", centis % 100)
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() || value < 0.0 { 0.0 } else { value }
}
