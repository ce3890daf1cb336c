//! Flat URI extraction from audio-playlist bodies (M3U / PLS), per
//! spec.md §4.3: "parse it as a flat list of URIs". This engine does not
//! implement a playlist *editor* (non-goal) — only enough parsing to find
//! candidate stream URIs to retry against.

/// Extracts candidate URIs in file order. Supports plain M3U/M3U8 (one URI
/// per non-comment line) and PLS's `FileN=` entries.
pub fn extract_uris(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(eq) = line.find('=') {
            let (key, val) = line.split_at(eq);
            if key.to_lowercase().starts_with("file") {
                out.push(val[1..].trim().to_string());
                continue;
            }
            // Any other `Key=Value` line (PLS's NumberOfEntries, Title1, ...)
            // is not a URI.
            continue;
        }
        if line.contains("://") {
            out.push(line.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_m3u_entries() {
        let body = "#EXTM3U\n#EXTINF:-1,Stream\nhttp://example.com/a.mp3\n\nhttp://example.com/b.mp3\n";
        assert_eq!(
            extract_uris(body),
            vec!["http://example.com/a.mp3", "http://example.com/b.mp3"]
        );
    }

    #[test]
    fn extracts_pls_entries() {
        let body = "[playlist]\nNumberOfEntries=1\nFile1=http://example.com/a.mp3\nTitle1=Stream\n";
        assert_eq!(extract_uris(body), vec!["http://example.com/a.mp3"]);
    }
}
