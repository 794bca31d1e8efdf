use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use ratatui::backend::Backend;
use ratatui::Terminal;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::ResolverClient;
use crate::application::session::{Effect, Message, Session};
use crate::application::transfer::TransferEngine;
use crate::domain::{DownloadRequest, DownloadTarget, ResolverError};
use crate::ui::{self, KeySource};

const TICK: Duration = Duration::from_millis(50);
/// Extra slack on top of the HTTP client's own timeout before the loop
/// gives up on a resolver call.
const RESOLVE_GRACE: Duration = Duration::from_secs(1);

/// Event loop state: the session plus handles to work running on its behalf.
pub struct DownloadApp {
    session: Session,
    resolver: ResolverClient,
    engine: TransferEngine,
    tx: UnboundedSender<Message>,
    resolve_task: Option<JoinHandle<()>>,
    transfer_task: Option<JoinHandle<()>>,
    exit_at: Option<(Instant, i32)>,
}

enum Wake {
    Tick,
    Message(Option<Message>),
    Deadline,
}

impl DownloadApp {
    pub fn new(
        session: Session,
        resolver: ResolverClient,
        engine: TransferEngine,
    ) -> (Self, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Self {
            session,
            resolver,
            engine,
            tx,
            resolve_task: None,
            transfer_task: None,
            exit_at: None,
        };
        (app, rx)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until the session asks to exit; returns the process exit code.
    pub async fn run<B: Backend>(
        mut self,
        terminal: &mut Terminal<B>,
        mut rx: UnboundedReceiver<Message>,
        keys: &mut dyn KeySource,
        initial_url: Option<String>,
    ) -> Result<i32> {
        if let Some(url) = initial_url {
            self.dispatch(Message::InputChanged(url)).await;
            if let Some(code) = self.dispatch(Message::Submit).await {
                return Ok(code);
            }
        }

        let mut tick = tokio::time::interval(TICK);
        loop {
            let screen = ui::project(&self.session);
            terminal
                .draw(|frame| ui::render(frame, &screen))
                .context("draw frame")?;

            let deadline = self.exit_at.map(|(at, _)| at);
            let wake = tokio::select! {
                _ = tick.tick() => Wake::Tick,
                msg = rx.recv() => Wake::Message(msg),
                _ = sleep_until(deadline), if deadline.is_some() => Wake::Deadline,
            };

            match wake {
                Wake::Tick => {
                    for key in keys.drain()? {
                        if let Some(msg) = ui::key_to_message(&self.session, key) {
                            if let Some(code) = self.dispatch(msg).await {
                                return Ok(code);
                            }
                        }
                    }
                }
                Wake::Message(Some(msg)) => {
                    if let Some(code) = self.dispatch(msg).await {
                        return Ok(code);
                    }
                }
                // The app holds a sender, so the channel cannot close while it runs.
                Wake::Message(None) => {}
                Wake::Deadline => {
                    let code = self.exit_at.map_or(0, |(_, code)| code);
                    info!(code, "exiting");
                    return Ok(code);
                }
            }
        }
    }

    /// Feed one message to the session and carry out the resulting effect.
    /// Returns an exit code when the process should stop right away.
    async fn dispatch(&mut self, message: Message) -> Option<i32> {
        match self.session.handle(message) {
            Effect::None => None,
            Effect::Resolve(request) => {
                self.spawn_resolve(request);
                None
            }
            Effect::StartTransfer { source, target } => {
                self.spawn_transfer(source, target);
                None
            }
            Effect::Exit {
                code,
                after,
                remove,
            } => {
                self.cancel_tasks().await;
                if let Some(path) = remove {
                    remove_partial(&path).await;
                }
                if after.is_zero() {
                    info!(code, "exiting");
                    Some(code)
                } else {
                    debug!(code, ?after, "holding final screen");
                    self.exit_at = Some((Instant::now() + after, code));
                    None
                }
            }
        }
    }

    fn spawn_resolve(&mut self, request: DownloadRequest) {
        let resolver = self.resolver.clone();
        let tx = self.tx.clone();
        let limit = resolver.config().timeout + RESOLVE_GRACE;
        self.resolve_task = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(limit, resolver.resolve(&request.url)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("resolver call exceeded {:?}", limit);
                    Err(ResolverError::Timeout)
                }
            };
            let _ = tx.send(Message::Resolved(result));
        }));
    }

    fn spawn_transfer(&mut self, source: String, target: DownloadTarget) {
        let mut states = self.engine.transfer(source, target.absolute_path);
        let tx = self.tx.clone();
        self.transfer_task = Some(tokio::spawn(async move {
            while let Some(state) = states.next().await {
                let done = state.is_terminal();
                if tx.send(Message::Transfer(state)).is_err() || done {
                    break;
                }
            }
        }));
    }

    /// Abort outstanding work and wait until it is gone. Aborting the
    /// transfer task drops the engine stream, which kills the child.
    async fn cancel_tasks(&mut self) {
        for handle in [self.resolve_task.take(), self.transfer_task.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("removed partial file {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove partial file {}: {}", path.display(), e),
    }
}
