use crate::consts;

/// How to reduce a source pathname when deriving the archive item name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum NameStrip {
    /// Keep the full (drive-stripped, rooted-slash-stripped) path.
    #[default]
    None,
    /// Keep only the final path component.
    Basename,
    /// Remove the given literal substring from the path.
    Prefix(String),
}

/// Derives a cabinet item name from a source pathname: the drive
/// specifier is dropped, forward slashes become backslashes, and a
/// leading backslash is removed, then the strip policy is applied.
pub fn archive_name(path: &str, strip: &NameStrip) -> String {
    let mut name = strip_drive(path).replace('/', "\\");
    if let Some(rest) = name.strip_prefix('\\') {
        name = rest.to_string();
    }
    match strip {
        NameStrip::None => name,
        NameStrip::Basename => match name.rfind('\\') {
            Some(pos) => name[pos + 1..].to_string(),
            None => name,
        },
        NameStrip::Prefix(prefix) => name.replace(prefix.as_str(), ""),
    }
}

fn strip_drive(path: &str) -> &str {
    let mut chars = path.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
            &path[2..]
        }
        _ => path,
    }
}

/// Returns true when the name survives the primary DOS encoding; a false
/// result means the name must be stored as UTF-8 with the corresponding
/// attribute bit set.
pub(crate) fn name_is_dos_encodable(name: &str) -> bool {
    name.bytes().all(|byte| byte <= 0x7f)
}

/// Returns true when the encoded name fits a cabinet file entry.
pub(crate) fn name_fits_entry(name: &str) -> bool {
    name.len() <= consts::MAX_STRING_SIZE
}

#[cfg(test)]
mod tests {
    use super::{archive_name, name_is_dos_encodable, NameStrip};

    #[test]
    fn drive_and_slashes_are_normalized() {
        assert_eq!(
            archive_name("C:/Windows/INF/wave.inf", &NameStrip::None),
            "Windows\\INF\\wave.inf"
        );
        assert_eq!(
            archive_name("/usr/lib/libfoo.a", &NameStrip::None),
            "usr\\lib\\libfoo.a"
        );
    }

    #[test]
    fn basename_strip_keeps_last_component() {
        assert_eq!(
            archive_name("a/b/c.txt", &NameStrip::Basename),
            "c.txt"
        );
        assert_eq!(
            archive_name("c.txt", &NameStrip::Basename),
            "c.txt"
        );
    }

    #[test]
    fn prefix_strip_removes_literal_substring() {
        let strip = NameStrip::Prefix("Windows\\".to_string());
        assert_eq!(
            archive_name("C:\\Windows\\system.ini", &strip),
            "system.ini"
        );
    }

    #[test]
    fn non_ascii_name_needs_utf8() {
        assert!(name_is_dos_encodable("hi.txt"));
        assert!(!name_is_dos_encodable("\u{2603}.txt"));
    }
}
