//! Module id extraction.
//!
//! # Responsibilities
//! - Take the module id from the first path segment
//! - Compute the module-local path handed to the module
//!
//! # Design Decisions
//! - Leading slashes are skipped, then the id runs up to the next `/` or `?`
//! - An empty id is valid and names the "no module" entry (e.g. `GET /`)
//! - The id keeps its original case here; the registry folds it
//! - No regex in the hot path

/// Split a request path into the module id and the module-local path.
///
/// The local path always starts with `/`.
pub fn split_module_path(path: &str) -> (&str, String) {
    let start = path.find(|c: char| c != '/').unwrap_or(path.len());
    let end = path[start..]
        .find(['/', '?'])
        .map(|offset| start + offset)
        .unwrap_or(path.len());

    let rest = &path[end..];
    let local = if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    };
    (&path[start..end], local)
}
