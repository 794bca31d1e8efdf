//! One download session: URL entry, resolution, quality choice, transfer.
//!
//! `Session::handle` is the only way state changes. Apart from checking
//! whether the destination already exists, it performs no I/O; it returns
//! an [`Effect`] that the runtime carries out and reports back as another
//! [`Message`].

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{
    AppError, DownloadPhase, DownloadRequest, DownloadTarget, QualityMap, ResolverError,
    SelectedLink, TransferError, TransferState,
};
use crate::utils::{derive_filename, FilenameRules};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub working_dir: PathBuf,
    pub filename_rules: FilenameRules,
    pub success_hold: Duration,
    pub failure_hold: Duration,
    /// Leave a partially written file behind after a failed or cancelled transfer.
    pub keep_partial: bool,
}

impl SessionSettings {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            filename_rules: FilenameRules::default(),
            success_hold: Duration::from_secs(2),
            failure_hold: Duration::from_secs(5),
            keep_partial: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    InputChanged(String),
    Submit,
    Resolved(Result<QualityMap, ResolverError>),
    /// Move the list cursor by the given offset, wrapping around.
    MoveSelection(isize),
    /// Pick the entry under the cursor.
    Confirm,
    Select(usize),
    Transfer(TransferState),
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    Resolve(DownloadRequest),
    StartTransfer {
        source: String,
        target: DownloadTarget,
    },
    /// Stop the session. Any running transfer is cancelled, `remove` is
    /// deleted, and the process exits with `code` once `after` has passed.
    Exit {
        code: i32,
        after: Duration,
        remove: Option<PathBuf>,
    },
}

/// What the status line should say, independent of wording and colours.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Prompt,
    Fetching,
    Choose,
    Downloading { quality: String, filename: String },
    Saved(PathBuf),
    Error(AppError),
}

#[derive(Debug, Clone)]
pub struct Session {
    settings: SessionSettings,
    phase: DownloadPhase,
    input: String,
    status: Status,
    qualities: Option<QualityMap>,
    cursor: usize,
    selected: Option<SelectedLink>,
    target: Option<DownloadTarget>,
    transfer: Option<TransferState>,
    /// The transfer reported progress, so the destination has been written.
    received_bytes: bool,
    exit_code: Option<i32>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            phase: DownloadPhase::Idle,
            input: String::new(),
            status: Status::Prompt,
            qualities: None,
            cursor: 0,
            selected: None,
            target: None,
            transfer: None,
            received_bytes: false,
            exit_code: None,
        }
    }

    pub fn phase(&self) -> DownloadPhase {
        self.phase
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn qualities(&self) -> Option<&QualityMap> {
        self.qualities.as_ref()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected(&self) -> Option<&SelectedLink> {
        self.selected.as_ref()
    }

    pub fn target(&self) -> Option<&DownloadTarget> {
        self.target.as_ref()
    }

    pub fn transfer(&self) -> Option<&TransferState> {
        self.transfer.as_ref()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::InputChanged(text) => {
                if self.phase == DownloadPhase::Idle {
                    self.input = text;
                }
                Effect::None
            }
            Message::Submit => self.submit(),
            Message::Resolved(result) => self.resolved(result),
            Message::MoveSelection(offset) => {
                self.move_cursor(offset);
                Effect::None
            }
            Message::Confirm => self.select(self.cursor),
            Message::Select(index) => self.select(index),
            Message::Transfer(state) => self.transfer_update(state),
            Message::Quit => self.quit(),
        }
    }

    fn submit(&mut self) -> Effect {
        if self.phase != DownloadPhase::Idle {
            return Effect::None;
        }

        match DownloadRequest::new(&self.input) {
            Ok(request) => {
                info!("submitting {}", request.url);
                self.qualities = None;
                self.cursor = 0;
                self.phase = DownloadPhase::Resolving;
                self.status = Status::Fetching;
                Effect::Resolve(request)
            }
            Err(e) => {
                debug!("rejected blank input");
                self.status = Status::Error(e.into());
                Effect::None
            }
        }
    }

    fn resolved(&mut self, result: Result<QualityMap, ResolverError>) -> Effect {
        if self.phase != DownloadPhase::Resolving {
            return Effect::None;
        }

        match result {
            Ok(map) if !map.is_empty() => {
                info!(qualities = map.len(), "choose a quality");
                self.qualities = Some(map);
                self.cursor = 0;
                self.phase = DownloadPhase::Selecting;
                self.status = Status::Choose;
            }
            Ok(_) => self.back_to_idle(ResolverError::EmptyResult),
            Err(e) => self.back_to_idle(e),
        }
        Effect::None
    }

    fn back_to_idle(&mut self, error: ResolverError) {
        warn!("resolution failed: {}", error);
        self.qualities = None;
        self.phase = DownloadPhase::Idle;
        self.status = Status::Error(error.into());
    }

    fn move_cursor(&mut self, offset: isize) {
        if self.phase != DownloadPhase::Selecting {
            return;
        }
        let len = self.qualities.as_ref().map_or(0, QualityMap::len) as isize;
        if len == 0 {
            return;
        }
        self.cursor = (self.cursor as isize + offset).rem_euclid(len) as usize;
    }

    fn select(&mut self, index: usize) -> Effect {
        if self.phase != DownloadPhase::Selecting {
            return Effect::None;
        }
        let Some(map) = self.qualities.as_ref() else {
            return Effect::None;
        };
        let Some(link) = map.select(index) else {
            debug!(index, "selection out of range");
            return Effect::None;
        };

        self.phase = DownloadPhase::Preparing;
        self.cursor = index;
        let filename = derive_filename(
            &link.raw_url,
            map.title.as_deref(),
            &link.quality,
            &self.settings.filename_rules,
        );
        let target = DownloadTarget::inside(&self.settings.working_dir, filename);
        self.selected = Some(link.clone());

        let Some(mut target) = target else {
            // Derived names are whitelisted, so this only trips on a broken
            // working directory path.
            return self.fail(TransferError::Io("unsafe destination path".to_string()), None);
        };

        target.preexisting = target.absolute_path.exists();
        if target.preexisting {
            warn!("{} already exists and will be overwritten", target.filename);
        }

        info!(
            quality = %link.quality,
            destination = %target.absolute_path.display(),
            "download selected"
        );
        self.phase = DownloadPhase::Downloading;
        self.status = Status::Downloading {
            quality: link.quality.clone(),
            filename: target.filename.clone(),
        };
        self.transfer = Some(TransferState::Pending);
        self.received_bytes = false;
        self.target = Some(target.clone());
        Effect::StartTransfer {
            source: link.raw_url,
            target,
        }
    }

    fn transfer_update(&mut self, state: TransferState) -> Effect {
        if self.phase != DownloadPhase::Downloading {
            return Effect::None;
        }

        match state {
            TransferState::Succeeded => {
                let path = self
                    .target
                    .as_ref()
                    .map(|t| t.absolute_path.clone())
                    .unwrap_or_default();
                info!("saved {}", path.display());
                self.transfer = Some(TransferState::Succeeded);
                self.phase = DownloadPhase::Completed;
                self.status = Status::Saved(path);
                self.exit_code = Some(0);
                Effect::Exit {
                    code: 0,
                    after: self.settings.success_hold,
                    remove: None,
                }
            }
            TransferState::Failed(e) => {
                let partial = self.partial_file();
                self.fail(e, partial)
            }
            progress => {
                if matches!(progress, TransferState::InProgress(p) if p > 0.0) {
                    self.received_bytes = true;
                }
                self.transfer = Some(progress);
                Effect::None
            }
        }
    }

    fn fail(&mut self, error: TransferError, remove: Option<PathBuf>) -> Effect {
        warn!("download failed: {}", error);
        self.transfer = Some(TransferState::Failed(error.clone()));
        self.phase = DownloadPhase::Failed;
        self.status = Status::Error(error.into());
        self.exit_code = Some(1);
        Effect::Exit {
            code: 1,
            after: self.settings.failure_hold,
            remove,
        }
    }

    fn quit(&mut self) -> Effect {
        let remove = if self.phase == DownloadPhase::Downloading {
            info!("quit while downloading, cancelling transfer");
            self.partial_file()
        } else {
            None
        };
        Effect::Exit {
            code: self.exit_code.unwrap_or(0),
            after: Duration::ZERO,
            remove,
        }
    }

    fn partial_file(&self) -> Option<PathBuf> {
        if self.settings.keep_partial {
            return None;
        }
        let target = self.target.as_ref()?;
        if target.preexisting && !self.received_bytes {
            debug!("leaving {} untouched", target.absolute_path.display());
            return None;
        }
        Some(target.absolute_path.clone())
    }
}
