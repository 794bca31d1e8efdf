use std::path::{Path, PathBuf};

use super::error::{TransferError, ValidationError};

/// A URL the user submitted, already trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
}

impl DownloadRequest {
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let url = raw.trim();
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        Ok(Self {
            url: url.to_string(),
        })
    }
}

/// Quality label -> raw link, in the order the resolver listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityMap {
    entries: Vec<(String, String)>,
    pub title: Option<String>,
}

impl QualityMap {
    pub fn new(entries: Vec<(String, String)>, title: Option<String>) -> Self {
        Self { entries, title }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(quality, _)| quality.as_str())
    }

    pub fn select(&self, index: usize) -> Option<SelectedLink> {
        self.entries.get(index).map(|(quality, raw)| SelectedLink {
            quality: quality.clone(),
            raw_url: crate::utils::normalize_link(raw),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedLink {
    pub quality: String,
    /// Already passed through `normalize_link`.
    pub raw_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub filename: String,
    pub absolute_path: PathBuf,
    /// A file of this name was already there before the transfer started.
    pub preexisting: bool,
}

impl DownloadTarget {
    /// Joins `filename` onto `working_dir`. Returns `None` if the result
    /// would escape the directory, which a derived filename never does.
    pub fn inside(working_dir: &Path, filename: String) -> Option<Self> {
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains(['/', '\\'])
        {
            return None;
        }
        let absolute_path = working_dir.join(&filename);
        if absolute_path.parent() != Some(working_dir) {
            return None;
        }
        Some(Self {
            filename,
            absolute_path,
            preexisting: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferState {
    /// Started, no percentage parsed yet.
    Pending,
    InProgress(f32),
    Succeeded,
    Failed(TransferError),
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Resolving,
    Selecting,
    Preparing,
    Downloading,
    Completed,
    Failed,
}

impl DownloadPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_trims() {
        let req = DownloadRequest::new("  https://example.com/v/1 \n").unwrap();
        assert_eq!(req.url, "https://example.com/v/1");
    }

    #[test]
    fn test_request_rejects_blank() {
        for raw in ["", "   ", "\t\n", "\u{3000}"] {
            assert_eq!(DownloadRequest::new(raw), Err(ValidationError::EmptyUrl));
        }
    }

    #[test]
    fn test_select_normalizes_link() {
        let map = QualityMap::new(
            vec![
                ("720p".to_string(), r#""https:\/\/x\/video.mp4""#.to_string()),
                ("480p".to_string(), "https://x/v2.mp4".to_string()),
            ],
            None,
        );
        let link = map.select(0).unwrap();
        assert_eq!(link.quality, "720p");
        assert_eq!(link.raw_url, "https://x/video.mp4");
        assert!(map.select(2).is_none());
        assert_eq!(map.labels().collect::<Vec<_>>(), vec!["720p", "480p"]);
    }

    #[test]
    fn test_target_stays_inside_working_dir() {
        let dir = Path::new("/tmp/work");
        let target = DownloadTarget::inside(dir, "svd_demo.mp4".to_string()).unwrap();
        assert_eq!(target.absolute_path, Path::new("/tmp/work/svd_demo.mp4"));

        assert!(DownloadTarget::inside(dir, "../evil.mp4".to_string()).is_none());
        assert!(DownloadTarget::inside(dir, "/etc/passwd".to_string()).is_none());
        assert!(DownloadTarget::inside(dir, "..".to_string()).is_none());
        assert!(DownloadTarget::inside(dir, String::new()).is_none());
    }
}
