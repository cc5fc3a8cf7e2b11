//! Track and playlist identifier normalization.
//!
//! The model hands us whatever it found: bare ids, `spotify:` URIs or links
//! copied from the web player. Everything sent to the platform goes through
//! these functions first. Both are pure and total; anything unrecognized is
//! treated as a bare id and left for the platform to reject.

pub const TRACK_URI_PREFIX: &str = "spotify:track:";
pub const PLAYLIST_URI_PREFIX: &str = "spotify:playlist:";

const WEB_HOST: &str = "open.spotify.com/";

/// Normalize a raw track identifier into `spotify:track:<id>`.
///
/// Idempotent: `normalize_track_uri(&normalize_track_uri(x)) == normalize_track_uri(x)`.
pub fn normalize_track_uri(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with(TRACK_URI_PREFIX) {
        return raw.to_string();
    }
    let id = web_link_id(raw, "track").unwrap_or(raw);
    format!("{TRACK_URI_PREFIX}{}", id.trim())
}

/// Extract the bare playlist id from an id, a `spotify:playlist:` URI or a web link.
pub fn playlist_id(raw: &str) -> String {
    let mut current = raw.trim();
    // Peel until nothing changes so the result is a fixed point.
    loop {
        let next = match current.strip_prefix(PLAYLIST_URI_PREFIX) {
            Some(id) => id,
            None => web_link_id(current, "playlist").unwrap_or(current),
        }
        .trim();
        if next == current {
            return current.to_string();
        }
        current = next;
    }
}

/// Platform ids are base62: non-empty ASCII letters and digits only.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// `https://open.spotify.com/[intl-xx/]<kind>/<id>[?..][#..]` -> `<id>`
fn web_link_id<'a>(raw: &'a str, kind: &str) -> Option<&'a str> {
    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .unwrap_or(raw);
    let path = rest.strip_prefix(WEB_HOST)?;
    let path = path.split(['?', '#']).next().unwrap_or_default();

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let mut first = segments.next()?;
    if first.starts_with("intl-") {
        first = segments.next()?;
    }
    if first != kind {
        return None;
    }
    segments.next()
}
