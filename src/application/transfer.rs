//! Drives the external transfer executable and turns its diagnostic output
//! into a stream of [`TransferState`]s.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};

use crate::domain::{TransferError, TransferState};

/// Something that can start a transfer of `source` into `destination`.
#[async_trait]
pub trait TransferProvider: Send + Sync {
    /// Name of the provider (for logging)
    fn name(&self) -> &'static str;

    async fn launch(
        &self,
        source: &str,
        destination: &Path,
    ) -> Result<Box<dyn TransferProcess>, TransferError>;
}

/// A running transfer. Dropping it must stop the transfer.
#[async_trait]
pub trait TransferProcess: Send {
    /// Next chunk of diagnostic output, `None` once the stream is closed.
    async fn next_chunk(&mut self) -> Option<Result<Bytes, TransferError>>;

    /// Wait for exit. `None` means no exit code (killed by a signal).
    async fn wait(&mut self) -> Result<Option<i32>, TransferError>;
}

/// Extracts a percentage from a chunk of diagnostic text.
pub trait ProgressParser: Send + Sync {
    /// `None` when the chunk carries no recognizable progress.
    fn parse(&self, chunk: &str) -> Option<f32>;
}

static RE_PERCENT: OnceLock<Regex> = OnceLock::new();

fn re_percent() -> &'static Regex {
    RE_PERCENT.get_or_init(|| Regex::new(r"(\d+\.\d+)%").expect("compile RE_PERCENT"))
}

/// Matches `<digits>.<digits>%`, as printed by `curl --progress-bar`.
/// The last match in a chunk wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentParser;

impl ProgressParser for PercentParser {
    fn parse(&self, chunk: &str) -> Option<f32> {
        re_percent()
            .captures_iter(chunk)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<f32>().ok())
            .last()
            .map(|p| p.clamp(0.0, 100.0))
    }
}

/// Runs `curl` (or a compatible executable) in a child process.
#[derive(Debug, Clone)]
pub struct CurlProvider {
    program: PathBuf,
}

impl CurlProvider {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CurlProvider {
    fn default() -> Self {
        Self::new("curl")
    }
}

#[async_trait]
impl TransferProvider for CurlProvider {
    fn name(&self) -> &'static str {
        "curl"
    }

    async fn launch(
        &self,
        source: &str,
        destination: &Path,
    ) -> Result<Box<dyn TransferProcess>, TransferError> {
        let mut child = Command::new(&self.program)
            .arg("--location")
            .arg("--fail")
            .arg("--progress-bar")
            .arg("--output")
            .arg(destination)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransferError::Spawn(format!("{}: {}", self.program.display(), e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransferError::Io("failed to capture stderr".to_string()))?;

        debug!(pid = ?child.id(), "transfer process started");
        Ok(Box::new(CurlProcess { child, stderr }))
    }
}

struct CurlProcess {
    child: Child,
    stderr: ChildStderr,
}

#[async_trait]
impl TransferProcess for CurlProcess {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, TransferError>> {
        let mut buf = [0u8; 4096];
        match self.stderr.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => Some(Ok(Bytes::copy_from_slice(&buf[..n]))),
            Err(e) => Some(Err(TransferError::Io(format!("reading progress: {}", e)))),
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>, TransferError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| TransferError::Io(format!("waiting for transfer: {}", e)))?;
        Ok(status.code())
    }
}

#[derive(Clone)]
pub struct TransferEngine {
    provider: Arc<dyn TransferProvider>,
    parser: Arc<dyn ProgressParser>,
}

impl TransferEngine {
    pub fn new(provider: Arc<dyn TransferProvider>) -> Self {
        Self {
            provider,
            parser: Arc::new(PercentParser),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn ProgressParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Start a transfer. The stream yields `Pending`, any number of
    /// `InProgress`, and ends with `Succeeded` or `Failed`. Dropping the
    /// stream early drops the process with it.
    pub fn transfer(
        &self,
        source: String,
        destination: PathBuf,
    ) -> BoxStream<'static, TransferState> {
        futures::stream::unfold(
            EngineState::Start {
                provider: Arc::clone(&self.provider),
                parser: Arc::clone(&self.parser),
                source,
                destination,
            },
            |state| async move {
                match state {
                    EngineState::Start {
                        provider,
                        parser,
                        source,
                        destination,
                    } => {
                        info!(
                            provider = provider.name(),
                            destination = %destination.display(),
                            "starting transfer of {}",
                            source
                        );
                        match provider.launch(&source, &destination).await {
                            Ok(process) => Some((
                                TransferState::Pending,
                                EngineState::Streaming { process, parser },
                            )),
                            Err(e) => {
                                warn!("transfer failed to start: {}", e);
                                Some((TransferState::Failed(e), EngineState::Finished))
                            }
                        }
                    }
                    EngineState::Streaming {
                        mut process,
                        parser,
                    } => loop {
                        match process.next_chunk().await {
                            Some(Ok(chunk)) => {
                                let text = String::from_utf8_lossy(&chunk);
                                if let Some(percent) = parser.parse(&text) {
                                    return Some((
                                        TransferState::InProgress(percent),
                                        EngineState::Streaming { process, parser },
                                    ));
                                }
                            }
                            Some(Err(e)) => {
                                warn!("transfer output failed: {}", e);
                                return Some((TransferState::Failed(e), EngineState::Finished));
                            }
                            None => {
                                return Some(match process.wait().await {
                                    Ok(Some(0)) => {
                                        info!("transfer finished");
                                        (TransferState::InProgress(100.0), EngineState::Succeeded)
                                    }
                                    Ok(code) => {
                                        warn!(?code, "transfer exited unsuccessfully");
                                        (
                                            TransferState::Failed(TransferError::NonZeroExit(code)),
                                            EngineState::Finished,
                                        )
                                    }
                                    Err(e) => (TransferState::Failed(e), EngineState::Finished),
                                });
                            }
                        }
                    },
                    EngineState::Succeeded => {
                        Some((TransferState::Succeeded, EngineState::Finished))
                    }
                    EngineState::Finished => None,
                }
            },
        )
        .boxed()
    }
}

enum EngineState {
    Start {
        provider: Arc<dyn TransferProvider>,
        parser: Arc<dyn ProgressParser>,
        source: String,
        destination: PathBuf,
    },
    Streaming {
        process: Box<dyn TransferProcess>,
        parser: Arc<dyn ProgressParser>,
    },
    Succeeded,
    Finished,
}

/// In-memory provider replaying a fixed diagnostic script.
#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    pub struct ScriptedProvider {
        pub chunks: Vec<Bytes>,
        pub exit_code: Option<i32>,
        pub spawn_error: Option<String>,
        pub read_error_after: Option<usize>,
        /// Written to the destination on launch, as curl would once body bytes arrive.
        pub writes: Option<&'static [u8]>,
        pub launches: Arc<Mutex<Vec<(String, PathBuf)>>>,
    }

    impl ScriptedProvider {
        pub fn exiting(code: i32, chunks: &[&'static str]) -> Self {
            Self {
                chunks: chunks
                    .iter()
                    .copied()
                    .map(|c| Bytes::from_static(c.as_bytes()))
                    .collect(),
                exit_code: Some(code),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl TransferProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn launch(
            &self,
            source: &str,
            destination: &Path,
        ) -> Result<Box<dyn TransferProcess>, TransferError> {
            if let Some(message) = &self.spawn_error {
                return Err(TransferError::Spawn(message.clone()));
            }
            self.launches
                .lock()
                .unwrap()
                .push((source.to_string(), destination.to_path_buf()));
            if let Some(bytes) = self.writes {
                std::fs::write(destination, bytes)
                    .map_err(|e| TransferError::Io(e.to_string()))?;
            }
            Ok(Box::new(ScriptedProcess {
                chunks: self.chunks.iter().cloned().collect(),
                read_error_after: self.read_error_after,
                exit_code: self.exit_code,
            }))
        }
    }

    struct ScriptedProcess {
        chunks: VecDeque<Bytes>,
        read_error_after: Option<usize>,
        exit_code: Option<i32>,
    }

    #[async_trait]
    impl TransferProcess for ScriptedProcess {
        async fn next_chunk(&mut self) -> Option<Result<Bytes, TransferError>> {
            if let Some(remaining) = self.read_error_after.as_mut() {
                if *remaining == 0 {
                    return Some(Err(TransferError::Io("pipe closed".to_string())));
                }
                *remaining -= 1;
            }
            self.chunks.pop_front().map(Ok)
        }

        async fn wait(&mut self) -> Result<Option<i32>, TransferError> {
            Ok(self.exit_code)
        }
    }
}
