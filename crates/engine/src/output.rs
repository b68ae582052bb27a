use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Derives the output path of a trim of `input_path` to `[in_time, out_time)`.
///
/// The result keeps the directory and extension and suffixes the file stem
/// with the window at two decimals, so repeating an identical trim
/// overwrites its previous output instead of accumulating files.
///
/// # Example
/// ```
/// use std::path::PathBuf;
/// use trim_engine::output::resolve_output_path;
///
/// let path = resolve_output_path("/v/a.mp4", 0.0, 4.0).expect("valid path");
/// assert_eq!(path, PathBuf::from("/v/a_trim_0.00-4.00.mp4"));
/// ```
pub fn resolve_output_path(
    input_path: impl AsRef<Path>,
    in_time: f64,
    out_time: f64,
) -> Result<PathBuf> {
    let input_path = input_path.as_ref();
    let invalid = || EngineError::InvalidPath(input_path.to_path_buf());

    let stem = input_path
        .file_stem()
        .filter(|stem| !stem.is_empty())
        .ok_or_else(invalid)?;
    let extension = input_path
        .extension()
        .filter(|extension| !extension.is_empty())
        .ok_or_else(invalid)?;

    let mut file_name = stem.to_os_string();
    file_name.push(format!(
        "_trim_{}-{}.",
        format_window_edge(in_time),
        format_window_edge(out_time)
    ));
    file_name.push(extension);

    Ok(input_path.with_file_name(file_name))
}

fn format_window_edge(seconds: f64) -> String {
    // `-0.00` would otherwise name the same window twice.
    let rounded = (seconds * 100.0).round() / 100.0;
    let normalized = if rounded == 0.0 || !rounded.is_finite() {
        0.0
    } else {
        rounded
    };
    format!("{normalized:.2}")
}
