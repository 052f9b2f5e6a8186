// SPDX-License-Identifier: GPL-3.0-only
use anyhow::Result;

/// Sanitize one segment of a blob path
///
/// Keeps alphanumerics and `-`, `_`, `.`, `+`; everything else becomes `_`.
/// Segments made only of dots (`.`, `..`) or nothing are rejected so a
/// segment can never climb out of its parent.
pub fn sanitize_segment(segment: &str) -> Result<String> {
    let sanitized: String = segment
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        return Err(anyhow::anyhow!("Path segment cannot be empty after sanitization"));
    }

    if sanitized.chars().all(|c| c == '.') {
        return Err(anyhow::anyhow!("Path segment '{}' is a directory reference", segment));
    }

    if sanitized.len() > 255 {
        return Err(anyhow::anyhow!("Path segment too long (max 255 characters)"));
    }

    Ok(sanitized)
}

/// Last non-empty path segment of a URL, ignoring query and fragment
pub fn filename_from_url(url: &str) -> Option<&str> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .find(|s| !s.is_empty())
        .filter(|s| !s.contains(':'))
}

/// Build the blob path `<prefix>/<app_id>/<version>/<filename>`
///
/// `prefix` may hold several `/`-separated segments or be empty.
pub fn blob_path(prefix: &str, app_id: &str, version: &str, filename: &str) -> Result<String> {
    let mut segments = Vec::new();
    for part in prefix.split('/').filter(|p| !p.trim().is_empty()) {
        segments.push(sanitize_segment(part)?);
    }
    segments.push(sanitize_segment(app_id)?);
    segments.push(sanitize_segment(version)?);
    segments.push(sanitize_segment(filename)?);
    Ok(segments.join("/"))
}
