pub mod filename;

pub use filename::{derive_filename, FilenameRules};

/// Undo the escaping resolvers leave in JSON-embedded links: `\\` -> `\`,
/// `\/` -> `/`, and one pair of surrounding double quotes.
///
/// Applied until the string stops changing, so the result is a fixed point
/// and normalizing twice is the same as normalizing once.
pub fn normalize_link(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_once(raw: &str) -> String {
    let unescaped = raw.replace("\\\\", "\\").replace("\\/", "/");
    match unescaped
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => inner.to_string(),
        None => unescaped,
    }
}

/// Remove characters no filesystem accepts in a file name.
pub fn strip_illegal_chars(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_link() {
        assert_eq!(
            normalize_link(r"https:\/\/video.example\/v.mp4?a=1&dl=1"),
            "https://video.example/v.mp4?a=1&dl=1"
        );
        assert_eq!(normalize_link(r#""https://x/y""#), "https://x/y");
        assert_eq!(normalize_link(r"a\\b"), r"a\b");
        assert_eq!(normalize_link("plain"), "plain");
        assert_eq!(normalize_link(""), "");
        assert_eq!(normalize_link("\""), "\"");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            r"\\\\\\\\",
            r#"""https:\/\/x""""#,
            r"\\/\\/\/",
            r#""\"quoted\"""#,
            "\"",
            "\"\"",
            r"C:\\dir\\file",
            "ünïcödé\\/",
        ];
        for sample in samples {
            let once = normalize_link(sample);
            assert_eq!(normalize_link(&once), once, "input: {sample:?}");
        }
    }

    #[test]
    fn test_strip_illegal_chars() {
        assert_eq!(strip_illegal_chars("a/b:c*d?"), "abcd");
        assert_eq!(strip_illegal_chars("  My <Video>  "), "My Video");
        assert_eq!(strip_illegal_chars("tab\there"), "tabhere");
        assert_eq!(strip_illegal_chars("|||"), "");
    }
}
