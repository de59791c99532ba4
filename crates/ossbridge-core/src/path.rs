//! Virtual path ⇄ object key conversions.
//!
//! Virtual paths are absolute and `/`-separated. Object keys are flat
//! strings with no leading separator; directory keys always carry a
//! trailing `/`, file keys never do. All functions are pure and total over
//! well-formed paths; malformed (empty) input normalizes to `/`.

/// Normalize a virtual path to its canonical absolute form.
///
/// The root stays `/`; everything else loses leading and trailing
/// separators and gains exactly one leading `/`.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Map a virtual path to its object-store key.
///
/// Directories get a trailing `/` (the marker convention); the root maps
/// to the empty key so it can serve as a listing prefix.
pub fn to_key(path: &str, is_dir: bool) -> String {
    let stripped = path.trim_start_matches('/');
    if is_dir && !stripped.is_empty() {
        format!("{}/", stripped.trim_end_matches('/'))
    } else {
        stripped.to_string()
    }
}

/// Map an object-store key back to a normalized virtual path.
pub fn to_path(key: &str) -> String {
    normalize(key.trim_end_matches('/'))
}

/// Base name of a path; `/` for the root.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Parent of a path; the root is its own parent.
pub fn parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        None | Some(0) => "/".to_string(),
        Some(i) => trimmed[..i].to_string(),
    }
}
