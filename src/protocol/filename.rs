//! Guest file name handling
//!
//! Names arrive either as fixed-width NUL-padded fields or as text tokens.
//! A quoted name is used as-is, a name with a drive prefix is taken relative
//! to the guest disk root, anything else is relative to the working
//! directory. Guest paths use `\` as separator.

/// Decode a fixed-width, NUL-padded name field to trimmed text
pub fn decode_name_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).trim().to_string()
}

/// Map a guest file name to the guest path that should be read
pub fn resolve_guest_path(name: &str, working_dir: &str) -> String {
    let name = name.trim();
    if let Some(quoted) = name.strip_prefix('"') {
        return quoted.strip_suffix('"').unwrap_or(quoted).to_string();
    }
    if let Some(rest) = strip_drive(name) {
        return rest.to_string();
    }
    join_guest_path(working_dir, name)
}

/// Join a name onto a guest directory; an empty directory yields the bare name
pub fn join_guest_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches(|c: char| c == '\\' || c == '/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}\\{name}")
    }
}

fn strip_drive(name: &str) -> Option<&str> {
    let bytes = name.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && matches!(bytes[2], b'\\' | b'/') {
        Some(&name[3..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(text: &str) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..text.len()].copy_from_slice(text.as_bytes());
        out
    }

    #[test]
    fn test_field_trims_at_nul() {
        let mut raw = field("BOOM.WAV");
        raw[20] = b'X';
        assert_eq!(decode_name_field(&raw), "BOOM.WAV");
    }

    #[test]
    fn test_field_without_nul() {
        assert_eq!(decode_name_field(&[b'A'; 64]), "A".repeat(64));
    }

    #[test]
    fn test_field_trims_whitespace() {
        assert_eq!(decode_name_field(&field("  SND.WAV  ")), "SND.WAV");
    }

    #[test]
    fn test_quoted_name_is_used_verbatim() {
        assert_eq!(resolve_guest_path("\"SFX\\HIT.WAV\"", "GAME"), "SFX\\HIT.WAV");
        assert_eq!(resolve_guest_path("\"OPEN.WAV", "GAME"), "OPEN.WAV");
    }

    #[test]
    fn test_drive_prefix_is_stripped() {
        assert_eq!(resolve_guest_path("C:\\MUSIC\\TUNE.XM", "GAME"), "MUSIC\\TUNE.XM");
        assert_eq!(resolve_guest_path("d:/TUNE.XM", "GAME"), "TUNE.XM");
    }

    #[test]
    fn test_relative_name_joins_working_dir() {
        assert_eq!(resolve_guest_path("HIT.WAV", "GAME\\SFX"), "GAME\\SFX\\HIT.WAV");
        assert_eq!(resolve_guest_path("HIT.WAV", "GAME\\"), "GAME\\HIT.WAV");
        assert_eq!(resolve_guest_path("HIT.WAV", ""), "HIT.WAV");
    }
}
