//! Module id path handling. Ids always use `/` separators.

/// Whether an id is relative to the requiring module.
pub fn is_relative(id: &str) -> bool {
    id.starts_with("./") || id.starts_with("../")
}

/// The directory part of a path, or `""` for a bare name.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Joins a directory and a relative path.
pub fn combine(dir: &str, path: &str) -> String {
    if dir.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), path)
    }
}

/// Collapses `.` and `..` segments and repeated separators.
///
/// Returns `None` when a `..` climbs above the first segment or nothing is left.
///
/// ```
/// use bridge::path_util::normalize;
///
/// assert_eq!(normalize("res/a/../b/./c").as_deref(), Some("res/b/c"));
/// assert_eq!(normalize("/tmp//x").as_deref(), Some("/tmp/x"));
/// assert_eq!(normalize("../x"), None);
/// ```
pub fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            segment => parts.push(segment),
        }
    }
    if parts.is_empty() {
        return None;
    }
    let joined = parts.join("/");
    Some(if path.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    })
}
