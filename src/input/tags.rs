//! Tag normalization rules (spec.md §4.4). Runs as a post-pass over
//! whatever raw (key, value) pairs a plugin's tag reader produces —
//! Symphonia already decodes ID3v1/v2, Vorbis comments and APE2 into UTF-8
//! text, so this module only normalizes that output (date/genre/track
//! forms, key promotion), not the frame parsing itself.

use super::genres::by_index;
use crate::cache::Comment;

/// TXXX/custom key promotion table: maps an input key (already
/// lowercased, as both ID3 TXXX description and Vorbis comment keys
/// conventionally are) to its canonical name.
const PROMOTIONS: &[(&str, &str)] = &[
    ("replaygain_track_gain", "replaygain_track_gain"),
    ("replaygain_track_peak", "replaygain_track_peak"),
    ("replaygain_album_gain", "replaygain_album_gain"),
    ("replaygain_album_peak", "replaygain_album_peak"),
    ("album artist", "album artist"),
    ("album_artist", "album artist"),
    ("albumartist", "album artist"),
    ("albumartistsort", "albumartistsort"),
    ("album artist sort order", "albumartistsort"),
    ("compilation", "compilation"),
];

/// Applies every spec.md §4.4 normalization rule to one raw comment,
/// returning the canonicalized comment to keep (a key may be renamed; the
/// value may be rewritten; `None` drops a comment that normalizes to
/// nothing, which currently never happens but keeps the signature honest
/// for future rules).
pub fn normalize(raw: Comment) -> Option<Comment> {
    let key_lower = raw.key.to_lowercase();

    if key_lower == "date" || key_lower == "year" || key_lower == "tyer" || key_lower == "tdrc" {
        return Some(Comment {
            key: "date".to_string(),
            value: reduce_to_year(&raw.value),
        });
    }

    if key_lower == "genre" || key_lower == "tcon" || key_lower == "tco" {
        return Some(Comment {
            key: "genre".to_string(),
            value: resolve_genre(&raw.value),
        });
    }

    if key_lower == "track" || key_lower == "tracknumber" || key_lower == "trck" {
        return Some(Comment {
            key: "tracknumber".to_string(),
            value: split_number_pair(&raw.value).0,
        });
    }

    if key_lower == "disc" || key_lower == "discnumber" || key_lower == "tpos" {
        return Some(Comment {
            key: "discnumber".to_string(),
            value: split_number_pair(&raw.value).0,
        });
    }

    for (from, to) in PROMOTIONS {
        if key_lower == *from {
            return Some(Comment {
                key: to.to_string(),
                value: raw.value,
            });
        }
    }

    Some(Comment {
        key: key_lower,
        value: raw.value,
    })
}

/// Normalizes a whole comment list, preserving insertion order (required
/// for Testable Property 1's cache round-trip equality).
pub fn normalize_all(raw: Vec<Comment>) -> Vec<Comment> {
    raw.into_iter().filter_map(normalize).collect()
}

/// Reduces an ID3 date frame to a 4-digit year: `"2004-03-12"`,
/// `"2004"`, and `"12/03/2004"`-style inputs all become `"2004"`;
/// anything with no 4-digit run is passed through unchanged.
fn reduce_to_year(value: &str) -> String {
    let digits_only: Vec<char> = value.chars().filter(|c| c.is_ascii_digit()).collect();
    for window_start in 0..value.len().min(value.chars().count()) {
        let candidate: String = value
            .chars()
            .skip(window_start)
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if candidate.len() == 4 {
            return candidate;
        }
    }
    if digits_only.len() >= 4 {
        digits_only[0..4].iter().collect()
    } else {
        value.to_string()
    }
}

/// Resolves `"(NN)"`, a bare numeric genre byte, or `"(NN)Name"` against
/// the 148-entry ID3v1 table; anything else (free text) passes through.
fn resolve_genre(value: &str) -> String {
    let trimmed = value.trim();

    if let Some(inner) = trimmed
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
    {
        if let Ok(idx) = inner.parse::<usize>() {
            if let Some(name) = by_index(idx) {
                return name.to_string();
            }
        }
        // "(NN)Trailing free text" with an out-of-range or non-numeric
        // index: fall through to the free-text remainder, if any.
        if let Some(rest) = trimmed.splitn(2, ')').nth(1) {
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }

    if let Ok(idx) = trimmed.parse::<usize>() {
        if let Some(name) = by_index(idx) {
            return name.to_string();
        }
    }

    trimmed.to_string()
}

/// Splits an `N/M` track or disc number, keeping `N`. If either side is
/// empty the present side fills both per spec.md §4.4. Returns
/// `(number, total)`.
fn split_number_pair(value: &str) -> (String, Option<String>) {
    if let Some((n, m)) = value.split_once('/') {
        let n = n.trim();
        let m = m.trim();
        match (n.is_empty(), m.is_empty()) {
            (false, false) => (n.to_string(), Some(m.to_string())),
            (false, true) => (n.to_string(), Some(n.to_string())),
            (true, false) => (m.to_string(), Some(m.to_string())),
            (true, true) => (String::new(), None),
        }
    } else {
        (value.trim().to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(key: &str, value: &str) -> Comment {
        Comment {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn date_frames_reduce_to_year() {
        assert_eq!(normalize(c("date", "2004-03-12")).unwrap().value, "2004");
        assert_eq!(normalize(c("TDRC", "2004")).unwrap().value, "2004");
    }

    #[test]
    fn genre_numeric_form_resolves() {
        assert_eq!(normalize(c("genre", "(17)")).unwrap().value, "Rock");
        assert_eq!(normalize(c("TCON", "17")).unwrap().value, "Rock");
    }

    #[test]
    fn genre_out_of_range_passes_through() {
        assert_eq!(normalize(c("genre", "(999)")).unwrap().value, "(999)");
    }

    #[test]
    fn genre_free_text_passes_through() {
        assert_eq!(normalize(c("genre", "Shoegaze")).unwrap().value, "Shoegaze");
    }

    #[test]
    fn txxx_replaygain_is_promoted() {
        let result = normalize(c("replaygain_track_gain", "-3.2 dB")).unwrap();
        assert_eq!(result.key, "replaygain_track_gain");
    }

    #[test]
    fn album_artist_variants_promote_to_canonical_key() {
        assert_eq!(normalize(c("ALBUM_ARTIST", "X")).unwrap().key, "album artist");
        assert_eq!(normalize(c("albumartist", "X")).unwrap().key, "album artist");
    }

    #[test]
    fn track_number_keeps_numerator() {
        assert_eq!(normalize(c("tracknumber", "3/12")).unwrap().value, "3");
        assert_eq!(normalize(c("track", "3")).unwrap().value, "3");
    }

    #[test]
    fn track_number_missing_side_fills_from_present_side() {
        assert_eq!(split_number_pair("/12"), ("12".to_string(), Some("12".to_string())));
        assert_eq!(split_number_pair("3/"), ("3".to_string(), Some("3".to_string())));
    }

    #[test]
    fn normalize_all_preserves_order() {
        let input = vec![c("title", "A"), c("artist", "B"), c("genre", "(0)")];
        let out = normalize_all(input);
        assert_eq!(out[0].key, "title");
        assert_eq!(out[1].key, "artist");
        assert_eq!(out[2].value, "Blues");
    }
}
