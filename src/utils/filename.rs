//! Local file names for downloaded media.
//!
//! Everything here is pure: remote data (link, title, quality label) goes in,
//! a bounded, whitelisted name comes out. The name never contains a path
//! separator, so joining it onto the working directory cannot escape it.

use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

use super::strip_illegal_chars;

const EXTENSION: &str = ".mp4";
const EMPTY_QUALITY: &str = "default";

static RE_UNSAFE: OnceLock<Regex> = OnceLock::new();
static RE_SPACES: OnceLock<Regex> = OnceLock::new();

fn re_unsafe() -> &'static Regex {
    RE_UNSAFE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("compile RE_UNSAFE"))
}

fn re_spaces() -> &'static Regex {
    RE_SPACES.get_or_init(|| Regex::new(r"\s+").expect("compile RE_SPACES"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameRules {
    pub prefix: String,
    /// Upper bound in characters for `prefix + base + ".mp4"`.
    pub max_len: usize,
}

impl Default for FilenameRules {
    fn default() -> Self {
        Self {
            prefix: "svd_".to_string(),
            max_len: 25,
        }
    }
}

impl FilenameRules {
    /// The ceiling actually applied: at least room for one base character.
    pub fn effective_max_len(&self) -> usize {
        self.max_len.max(self.prefix.chars().count() + 1 + EXTENSION.len())
    }
}

/// Build the local file name for a selected link.
///
/// Candidates in priority order: the link's last path segment (when it has
/// an extension, tagged with the quality label), `<title>_<quality>.mp4`,
/// then `video_<quality>.mp4`. The winner is forced to `.mp4`, reduced to
/// word characters, spaces and hyphens, prefixed, and truncated to fit
/// `rules.max_len`.
pub fn derive_filename(
    raw_url: &str,
    title: Option<&str>,
    quality: &str,
    rules: &FilenameRules,
) -> String {
    let candidate = name_from_url(raw_url, quality)
        .or_else(|| name_from_title(title, quality))
        .unwrap_or_else(|| fallback_name(quality));

    let candidate = if has_extension(&candidate) {
        candidate
    } else {
        format!("{}{}", candidate, EXTENSION)
    };

    let stem = &candidate[..candidate.len() - EXTENSION.len()];
    let mut base = sanitize_base(stem);
    if base.is_empty() {
        let fallback = fallback_name(quality);
        base = sanitize_base(&fallback[..fallback.len() - EXTENSION.len()]);
    }

    let budget = rules.effective_max_len() - rules.prefix.chars().count() - EXTENSION.len();
    let truncated: String = base.chars().take(budget).collect();
    format!("{}{}{}", rules.prefix, truncated, EXTENSION)
}

fn has_extension(name: &str) -> bool {
    name.len()
        .checked_sub(EXTENSION.len())
        .and_then(|start| name.get(start..))
        .is_some_and(|tail| tail.eq_ignore_ascii_case(EXTENSION))
}

fn name_from_url(raw_url: &str, quality: &str) -> Option<String> {
    let url = Url::parse(raw_url).ok()?;
    let segment = url.path_segments()?.last()?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy().into_owned();
    let dot = decoded.rfind('.')?;
    let (stem, ext) = decoded.split_at(dot);
    Some(format!("{}_{}{}", stem, quality, ext))
}

fn name_from_title(title: Option<&str>, quality: &str) -> Option<String> {
    let cleaned = strip_illegal_chars(title?);
    if cleaned.is_empty() {
        return None;
    }
    Some(format!("{}_{}{}", cleaned, quality, EXTENSION))
}

fn fallback_name(quality: &str) -> String {
    let label: String = quality
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase();
    let label = if label.is_empty() {
        EMPTY_QUALITY.to_string()
    } else {
        label
    };
    format!("video_{}{}", label, EXTENSION)
}

fn sanitize_base(stem: &str) -> String {
    let kept = re_unsafe().replace_all(stem, "");
    re_spaces().replace_all(kept.trim(), "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive(url: &str, title: Option<&str>, quality: &str) -> String {
        derive_filename(url, title, quality, &FilenameRules::default())
    }

    fn assert_well_formed(name: &str, rules: &FilenameRules) {
        assert!(name.ends_with(".mp4"), "{name}");
        assert!(name.starts_with(&rules.prefix), "{name}");
        assert!(name.chars().count() <= rules.effective_max_len(), "{name}");
        assert!(!name.contains(['/', '\\']), "{name}");
    }

    #[test]
    fn test_url_segment_wins() {
        assert_eq!(
            derive("https://x/media/clip.mp4?dl=1", Some("Demo"), "720p"),
            "svd_clip_720p.mp4"
        );
    }

    #[test]
    fn test_url_segment_is_percent_decoded() {
        assert_eq!(
            derive("https://x/my%20clip.mp4", None, "hd"),
            "svd_my_clip_hd.mp4"
        );
    }

    #[test]
    fn test_title_when_url_has_no_extension() {
        assert_eq!(
            derive("https://x/watch?v=123", Some("Demo"), "720p"),
            "svd_Demo_720p.mp4"
        );
    }

    #[test]
    fn test_unparsable_url_falls_through() {
        assert_eq!(derive("not a url", None, "HD 720p!"), "svd_video_hd_720p_.mp4");
    }

    #[test]
    fn test_empty_title_uses_quality_name() {
        assert_eq!(derive("", Some("  ?*  "), "480p"), "svd_video_480p.mp4");
    }

    #[test]
    fn test_symbol_only_quality() {
        let name = derive("", None, "!!!");
        assert_eq!(name, "svd_video____.mp4");
        let name = derive("", None, "");
        assert_eq!(name, "svd_video_default.mp4");
    }

    #[test]
    fn test_truncates_without_ellipsis() {
        let name = derive("", Some("A very long title that goes on"), "1080p");
        assert_eq!(name, "svd_A_very_long_title.mp4");
        assert_eq!(name.chars().count(), 25);
    }

    #[test]
    fn test_uppercase_extension_is_kept() {
        assert_eq!(derive("https://x/CLIP.MP4", None, "sd"), "svd_CLIP_sd.mp4");
    }

    #[test]
    fn test_non_mp4_extension_gets_mp4() {
        let name = derive("https://x/a.webm", None, "hd");
        assert_eq!(name, "svd_a_hdwebm.mp4");
    }

    #[test]
    fn test_symbol_title_keeps_quality() {
        let name = derive("", Some("###"), "720p");
        assert_eq!(name, "svd__720p.mp4");
    }

    #[test]
    fn test_always_well_formed() {
        let rules = FilenameRules::default();
        let urls = ["", "https://x/", "https://x/..mp4", "https://x/%2F%2E%2E.mp4", "::"];
        let titles = [None, Some(""), Some("日本語のタイトル 動画"), Some("Ünïcödé — title")];
        let qualities = ["", "720p", "!!", "Download High Quality(720p)"];
        for url in urls {
            for title in titles {
                for quality in qualities {
                    let name = derive_filename(url, title, quality, &rules);
                    assert_well_formed(&name, &rules);
                }
            }
        }
    }

    #[test]
    fn test_configurable_ceiling() {
        let rules = FilenameRules {
            prefix: "dl-".to_string(),
            max_len: 12,
        };
        let name = derive_filename("", Some("Demo clip"), "720p", &rules);
        assert_eq!(name, "dl-Demo_.mp4");
        assert_well_formed(&name, &rules);

        let tiny = FilenameRules {
            prefix: "dl-".to_string(),
            max_len: 1,
        };
        assert_eq!(tiny.effective_max_len(), 8);
        assert_eq!(derive_filename("", None, "hd", &tiny), "dl-v.mp4");
    }
}
