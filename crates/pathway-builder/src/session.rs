//! Single-owner editing session.
//!
//! One tokio task owns the [`BuilderController`] and processes commands from
//! [`EditorHandle`]s in order, so no two mutations ever interleave. The same
//! loop drives the debounce timer and polls the one in-flight write, which
//! means editing continues while a save is running.
//!
//! ```text
//! EditorHandle ──mpsc──> session task ──> BuilderController
//!      ^                    │    └──────> in-flight write ──> CourseRepository
//!      └──oneshot / watch───┘
//! ```

use crate::controller::{BuilderController, BuilderState, EditorView};
use crate::error::BuilderError;
use crate::persistence::{SaveStatus, WriteTrigger};
use pathway_core::config::PathwayConfig;
use pathway_core::graph::{ModuleData, Position};
use pathway_core::layout::Bounds;
use pathway_core::repository::{CourseRepository, RepositoryError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, BuilderError>>;
type WriteFuture = Pin<Box<dyn Future<Output = Result<String, RepositoryError>> + Send>>;

enum Command {
    AddModule {
        data: ModuleData,
        position: Option<Position>,
        reply: Reply<String>,
    },
    Connect {
        source_id: String,
        target_id: String,
        reply: Reply<Option<String>>,
    },
    DeleteSelected {
        node_ids: Vec<String>,
        edge_ids: Vec<String>,
        reply: Reply<bool>,
    },
    DuplicateSelected {
        node_ids: Vec<String>,
        reply: Reply<Vec<String>>,
    },
    Rename {
        title: String,
        reply: Reply<bool>,
    },
    MoveNode {
        node_id: String,
        position: Position,
        reply: Reply<bool>,
    },
    AutoArrange {
        reply: Reply<Option<Bounds>>,
    },
    Undo {
        reply: Reply<bool>,
    },
    Redo {
        reply: Reply<bool>,
    },
    View {
        reply: Reply<EditorView>,
    },
    Save {
        reply: Reply<()>,
    },
    Submit {
        reply: Reply<()>,
    },
    Close {
        reply: Reply<()>,
    },
}

impl Command {
    /// Answer with an error without touching any state.
    fn reject(self, err: BuilderError) {
        match self {
            Self::AddModule { reply, .. } => respond(reply, Err(err)),
            Self::Connect { reply, .. } => respond(reply, Err(err)),
            Self::DeleteSelected { reply, .. }
            | Self::Rename { reply, .. }
            | Self::MoveNode { reply, .. }
            | Self::Undo { reply }
            | Self::Redo { reply } => respond(reply, Err(err)),
            Self::DuplicateSelected { reply, .. } => respond(reply, Err(err)),
            Self::AutoArrange { reply } => respond(reply, Err(err)),
            Self::View { reply } => respond(reply, Err(err)),
            Self::Save { reply } | Self::Submit { reply } | Self::Close { reply } => {
                respond(reply, Err(err));
            }
        }
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T, BuilderError>) {
    // A dropped receiver only means the caller stopped waiting.
    let _ = reply.send(result);
}

/// Cloneable front end of an editing session.
#[derive(Clone)]
pub struct EditorHandle {
    commands: mpsc::Sender<Command>,
    save_status: watch::Receiver<SaveStatus>,
    state: watch::Receiver<BuilderState>,
}

impl EditorHandle {
    pub async fn add_module(
        &self,
        data: ModuleData,
        position: Option<Position>,
    ) -> Result<String, BuilderError> {
        self.request(|reply| Command::AddModule {
            data,
            position,
            reply,
        })
        .await
    }

    pub async fn connect(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<Option<String>, BuilderError> {
        self.request(|reply| Command::Connect {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn delete_selected(
        &self,
        node_ids: Vec<String>,
        edge_ids: Vec<String>,
    ) -> Result<bool, BuilderError> {
        self.request(|reply| Command::DeleteSelected {
            node_ids,
            edge_ids,
            reply,
        })
        .await
    }

    pub async fn duplicate_selected(
        &self,
        node_ids: Vec<String>,
    ) -> Result<Vec<String>, BuilderError> {
        self.request(|reply| Command::DuplicateSelected { node_ids, reply })
            .await
    }

    pub async fn rename(&self, title: &str) -> Result<bool, BuilderError> {
        self.request(|reply| Command::Rename {
            title: title.to_string(),
            reply,
        })
        .await
    }

    pub async fn move_node(&self, node_id: &str, position: Position) -> Result<bool, BuilderError> {
        self.request(|reply| Command::MoveNode {
            node_id: node_id.to_string(),
            position,
            reply,
        })
        .await
    }

    pub async fn auto_arrange(&self) -> Result<Option<Bounds>, BuilderError> {
        self.request(|reply| Command::AutoArrange { reply }).await
    }

    pub async fn undo(&self) -> Result<bool, BuilderError> {
        self.request(|reply| Command::Undo { reply }).await
    }

    pub async fn redo(&self) -> Result<bool, BuilderError> {
        self.request(|reply| Command::Redo { reply }).await
    }

    pub async fn view(&self) -> Result<EditorView, BuilderError> {
        self.request(|reply| Command::View { reply }).await
    }

    /// Explicit save. Resolves when the write that carries the current graph
    /// has finished, which may be after an already running write.
    pub async fn save(&self) -> Result<(), BuilderError> {
        self.request(|reply| Command::Save { reply }).await
    }

    pub async fn submit_for_review(&self) -> Result<(), BuilderError> {
        self.request(|reply| Command::Submit { reply }).await
    }

    /// Flush pending changes and close the session. Later intents fail with
    /// [`BuilderError::Closed`].
    pub async fn close(&self) -> Result<(), BuilderError> {
        self.request(|reply| Command::Close { reply }).await
    }

    pub fn save_status(&self) -> SaveStatus {
        self.save_status.borrow().clone()
    }

    /// Receiver that is notified on every save status change.
    pub fn watch_save_status(&self) -> watch::Receiver<SaveStatus> {
        self.save_status.clone()
    }

    pub fn state(&self) -> BuilderState {
        *self.state.borrow()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, BuilderError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| BuilderError::SessionGone)?;
        response.await.map_err(|_| BuilderError::SessionGone)?
    }
}

/// Run an editing session over an already constructed controller.
pub fn spawn_session<R>(controller: BuilderController, repo: Arc<R>) -> EditorHandle
where
    R: CourseRepository + 'static,
{
    let (handle, commands, channels) = channels(controller.state(), controller.save_status());
    let session = Session::new(controller, repo, channels);
    tokio::spawn(session.run(commands));
    handle
}

/// Open a stored course in a new session. The handle is returned right away
/// in the `Loading` state; commands queue until hydration finishes. If the
/// course cannot be loaded the session closes and every command is answered
/// with the [`BuilderError::Hydration`] error.
pub fn open_session<R>(repo: Arc<R>, course_id: String, config: PathwayConfig) -> EditorHandle
where
    R: CourseRepository + 'static,
{
    let (handle, mut commands, channels) = channels(BuilderState::Loading, SaveStatus::Idle);
    tokio::spawn(async move {
        match BuilderController::open(&*repo, &course_id, &config).await {
            Ok(controller) => Session::new(controller, repo, channels).run(commands).await,
            Err(err) => {
                warn!(course = %course_id, error = %err, "course could not be opened");
                channels.state.send_replace(BuilderState::Closed);
                while let Some(command) = commands.recv().await {
                    command.reject(err.clone());
                }
            }
        }
    });
    handle
}

struct Channels {
    save_status: watch::Sender<SaveStatus>,
    state: watch::Sender<BuilderState>,
}

fn channels(
    state: BuilderState,
    status: SaveStatus,
) -> (EditorHandle, mpsc::Receiver<Command>, Channels) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (status_tx, status_rx) = watch::channel(status);
    let (state_tx, state_rx) = watch::channel(state);
    let handle = EditorHandle {
        commands: command_tx,
        save_status: status_rx,
        state: state_rx,
    };
    let channels = Channels {
        save_status: status_tx,
        state: state_tx,
    };
    (handle, command_rx, channels)
}

enum Event {
    Command(Command),
    WriteDone(Result<String, RepositoryError>),
    TimerFired,
    Disconnected,
}

struct Session<R> {
    controller: BuilderController,
    repo: Arc<R>,
    channels: Channels,
    in_flight: Option<WriteFuture>,
    /// Explicit saves answered by the running write.
    in_flight_waiters: Vec<Reply<()>>,
    /// Explicit saves waiting for the next write to start.
    queued_waiters: Vec<Reply<()>>,
}

/// Session clock. Follows tokio's clock so paused-time tests drive the debounce.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn wait_write(slot: &mut Option<WriteFuture>) -> Result<String, RepositoryError> {
    match slot {
        Some(write) => write.await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

impl<R: CourseRepository + 'static> Session<R> {
    fn new(controller: BuilderController, repo: Arc<R>, channels: Channels) -> Self {
        Self {
            controller,
            repo,
            channels,
            in_flight: None,
            in_flight_waiters: Vec::new(),
            queued_waiters: Vec::new(),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            self.start_due_write();
            self.publish();

            let deadline = if self.in_flight.is_none() {
                self.controller.write_deadline()
            } else {
                None
            };
            let event = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => Event::Command(command),
                    None => Event::Disconnected,
                },
                result = wait_write(&mut self.in_flight) => Event::WriteDone(result),
                () = wait_deadline(deadline) => Event::TimerFired,
            };

            match event {
                Event::Command(command) => self.handle(command).await,
                Event::WriteDone(result) => {
                    self.in_flight = None;
                    // Debounced failures surface through the save status.
                    let _ = self.finish_write(result);
                }
                Event::TimerFired => {}
                Event::Disconnected => {
                    if self.controller.state() != BuilderState::Closed {
                        let _ = self.close().await;
                    }
                    debug!(
                        course = ?self.controller.course_id(),
                        "all handles dropped, session ends"
                    );
                    return;
                }
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        let c = &mut self.controller;
        let t = now();
        match command {
            Command::AddModule {
                data,
                position,
                reply,
            } => respond(reply, c.add_module(data, position, t)),
            Command::Connect {
                source_id,
                target_id,
                reply,
            } => respond(reply, c.connect(&source_id, &target_id, t)),
            Command::DeleteSelected {
                node_ids,
                edge_ids,
                reply,
            } => respond(reply, c.delete_selected(&node_ids, &edge_ids, t)),
            Command::DuplicateSelected { node_ids, reply } => {
                respond(reply, c.duplicate_selected(&node_ids, t));
            }
            Command::Rename { title, reply } => respond(reply, c.rename(&title, t)),
            Command::MoveNode {
                node_id,
                position,
                reply,
            } => respond(reply, c.move_node(&node_id, position, t)),
            Command::AutoArrange { reply } => respond(reply, c.auto_arrange(t)),
            Command::Undo { reply } => respond(reply, c.undo(t)),
            Command::Redo { reply } => respond(reply, c.redo(t)),
            Command::View { reply } => respond(reply, Ok(c.view())),
            Command::Save { reply } => match c.request_save() {
                Ok(()) => self.queued_waiters.push(reply),
                Err(err) => respond(reply, Err(err)),
            },
            Command::Submit { reply } => {
                let result = self.submit().await;
                respond(reply, result);
            }
            Command::Close { reply } => {
                let result = self.close().await;
                respond(reply, result);
            }
        }
    }

    /// Start the due write, if nothing is in flight.
    fn start_due_write(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let Some(job) = self.controller.poll_write(now()) else {
            return;
        };
        if job.trigger == WriteTrigger::Explicit {
            self.in_flight_waiters.append(&mut self.queued_waiters);
        }
        let repo = Arc::clone(&self.repo);
        self.in_flight = Some(Box::pin(async move { job.run(&*repo).await }));
    }

    fn finish_write(
        &mut self,
        result: Result<String, RepositoryError>,
    ) -> Result<(), BuilderError> {
        let outcome = self.controller.complete_write(result);
        for waiter in self.in_flight_waiters.drain(..) {
            respond(waiter, outcome.clone());
        }
        outcome
    }

    /// Wait for the running write, then run any due write to completion.
    async fn settle(&mut self) -> Result<(), BuilderError> {
        if let Some(write) = self.in_flight.take() {
            let result = write.await;
            let _ = self.finish_write(result);
        }
        self.start_due_write();
        let Some(write) = self.in_flight.take() else {
            return Ok(());
        };
        let result = write.await;
        self.finish_write(result)
    }

    async fn submit(&mut self) -> Result<(), BuilderError> {
        self.controller.check_submittable()?;
        self.settle().await?;
        self.controller.request_save()?;
        self.settle().await?;
        self.controller.request_review(&*self.repo).await
    }

    async fn close(&mut self) -> Result<(), BuilderError> {
        let flushed = if self.in_flight.is_some() || self.controller.has_pending_write() {
            if self.controller.has_pending_write() {
                self.controller.request_save()?;
            }
            self.settle().await
        } else {
            Ok(())
        };
        self.controller.mark_closed();
        for waiter in self.queued_waiters.drain(..) {
            respond(waiter, Err(BuilderError::Closed));
        }
        flushed
    }

    fn publish(&self) {
        let status = self.controller.save_status();
        self.channels.save_status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        let state = self.controller.state();
        self.channels.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}
