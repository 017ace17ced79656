//! Destination filename derivation for transfer specs.

use url::Url;

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Last non-empty path segment of the locator, without query or fragment.
pub fn from_locator(locator: &Url) -> Option<String> {
    let segment = locator
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?;
    let name = sanitize(segment);
    (!name.is_empty()).then_some(name)
}

/// Extension (with the dot) of the locator's last path segment, if any.
fn locator_extension(locator: &Url) -> Option<String> {
    let last = from_locator(locator)?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{ext}"))
}

fn has_extension(name: &str) -> bool {
    matches!(name.rsplit_once('.'), Some((stem, ext)) if !stem.is_empty() && !ext.is_empty())
}

/// Resolve the filename for a download: the requested name (sanitized) or the
/// locator's last segment. A requested name without an extension inherits the
/// locator's, so `my-lora` + `.../file.safetensors?x=1` gives `my-lora.safetensors`.
/// Returns `None` when nothing usable remains.
pub fn resolve(locator: &Url, requested: Option<&str>) -> Option<String> {
    let requested = requested.map(sanitize).filter(|s| !s.is_empty());
    match requested {
        Some(name) if has_extension(&name) => Some(name),
        Some(name) => Some(match locator_extension(locator) {
            Some(ext) => format!("{name}{ext}"),
            None => name,
        }),
        None => from_locator(locator),
    }
}

/// Make a candidate filename safe for a Linux directory entry: path separators,
/// NUL and control characters become `_`, surrounding dots and spaces are
/// trimmed, and the result is capped at NAME_MAX bytes.
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.len() <= NAME_MAX {
        return trimmed.to_string();
    }
    let mut end = NAME_MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
