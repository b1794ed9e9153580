use sha2::{Digest, Sha256};

const MAX_NAME_LEN: usize = 80;

/// Portable file name for a fetched resource.
///
/// Uses the sanitized resource name when one survives sanitizing, otherwise
/// `untitled--{short_hash(payload)}.{kind}`.
pub fn content_filename(name: &str, kind: &str, payload: &[u8]) -> String {
    let sanitized = sanitize_name(name);
    if !sanitized.is_empty() {
        return sanitized;
    }
    let hash = short_hash(payload);
    let kind = sanitize_name(kind);
    if kind.is_empty() {
        format!("untitled--{hash}")
    } else {
        format!("untitled--{hash}.{kind}")
    }
}

fn sanitize_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);

    // Collapse runs of underscores.
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }

    if compacted.len() > MAX_NAME_LEN {
        let mut cut = MAX_NAME_LEN;
        while !compacted.is_char_boundary(cut) {
            cut -= 1;
        }
        compacted.truncate(cut);
    }
    if is_reserved_windows_name(&compacted) {
        compacted.insert(0, '_');
    }
    compacted
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let stem = name.split('.').next().unwrap_or(name);
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(stem))
}

fn short_hash(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_plain_names() {
        assert_eq!(content_filename("index.html", "html", b"x"), "index.html");
    }

    #[test]
    fn replaces_forbidden_characters() {
        assert_eq!(
            content_filename("a:b*c??.png", "png", b"x"),
            "a_b_c_.png"
        );
    }

    #[test]
    fn empty_name_falls_back_to_payload_hash() {
        let name = content_filename("", "html", b"<html></html>");
        assert!(name.starts_with("untitled--"));
        assert!(name.ends_with(".html"));
        assert_eq!(name.len(), "untitled--".len() + 8 + ".html".len());
        assert_eq!(name, content_filename("...", "html", b"<html></html>"));
    }

    #[test]
    fn reserved_names_are_prefixed() {
        assert_eq!(content_filename("con", "html", b""), "_con");
        assert_eq!(content_filename("NUL.gif", "gif", b""), "_NUL.gif");
    }

    #[test]
    fn long_names_are_capped() {
        let long = "é".repeat(100);
        let name = content_filename(&long, "html", b"");
        assert!(name.len() <= MAX_NAME_LEN);
        assert!(name.chars().all(|c| c == 'é'));
    }
}
