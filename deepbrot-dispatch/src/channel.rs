//! Worker channels: anything that can turn a Task into a result.
//!
//! A channel is a capability rather than a place in a hierarchy. The pool
//! only needs [`WorkerChannel::execute`], so in-process calls, dedicated
//! worker threads, foreign modules and remote endpoints
//! ([`crate::remote::RemoteChannel`]) are interchangeable.

use crate::error::ChannelError;
use deepbrot_compute::{render_task, render_task_in_module, run_message_loop};
use deepbrot_compute::{ForeignModule, MemoryArena, NativeModule};
use deepbrot_core::{MainToWorker, Task, TaskResult, WorkerSetup, WorkerToMain};
use futures::future::BoxFuture;
use log::{debug, info, warn};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

pub trait WorkerChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Compute `task` under `setup`. A returned error is this attempt's
    /// failure; deciding whether to try again is up to the caller.
    fn execute(
        &self,
        setup: WorkerSetup,
        task: Task,
    ) -> BoxFuture<'_, Result<TaskResult, ChannelError>>;
}

/// Computes on the runtime's blocking pool.
pub struct LocalChannel {
    name: String,
}

impl LocalChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl WorkerChannel for LocalChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        setup: WorkerSetup,
        task: Task,
    ) -> BoxFuture<'_, Result<TaskResult, ChannelError>> {
        Box::pin(async move {
            let result = tokio::task::spawn_blocking(move || render_task(&setup, &task)).await?;
            Ok(result?)
        })
    }
}

struct ThreadLink {
    commands: std_mpsc::Sender<String>,
    replies: mpsc::UnboundedReceiver<String>,
    current_setup: Option<WorkerSetup>,
}

/// A dedicated OS thread running the message worker, spoken to in JSON
/// messages exactly like a browser worker. One Task at a time.
pub struct ThreadChannel {
    name: String,
    link: AsyncMutex<ThreadLink>,
}

impl ThreadChannel {
    pub fn spawn(name: impl Into<String>) -> Result<Self, ChannelError> {
        let name = name.into();
        let (commands, inbox) = std_mpsc::channel::<String>();
        let (post, replies) = mpsc::unbounded_channel::<String>();

        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                run_message_loop(inbox, |reply| {
                    let _ = post.send(reply);
                })
            })
            .map_err(|e| ChannelError::WorkerGone(format!("{name}: {e}")))?;
        info!("Worker {name} created");

        Ok(Self {
            name,
            link: AsyncMutex::new(ThreadLink {
                commands,
                replies,
                current_setup: None,
            }),
        })
    }

    fn send(&self, link: &ThreadLink, message: &MainToWorker) -> Result<(), ChannelError> {
        let json = serde_json::to_string(message).map_err(|e| ChannelError::Worker(e.to_string()))?;
        link.commands
            .send(json)
            .map_err(|_| ChannelError::WorkerGone(self.name.clone()))
    }
}

impl WorkerChannel for ThreadChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        setup: WorkerSetup,
        task: Task,
    ) -> BoxFuture<'_, Result<TaskResult, ChannelError>> {
        Box::pin(async move {
            let mut link = self.link.lock().await;
            if link.current_setup != Some(setup) {
                self.send(&link, &MainToWorker::Setup(setup))?;
                link.current_setup = Some(setup);
            }
            self.send(&link, &MainToWorker::Task(task.clone()))?;

            while let Some(reply) = link.replies.recv().await {
                let message: WorkerToMain = serde_json::from_str(&reply)
                    .map_err(|e| ChannelError::Worker(format!("invalid message: {e}")))?;
                match message {
                    WorkerToMain::TaskComplete(result)
                        if result.job_number == task.job_number
                            && result.task_id == task.task_id =>
                    {
                        return Ok(result);
                    }
                    WorkerToMain::Error {
                        job_number,
                        task_id,
                        message,
                    } if job_number == task.job_number && task_id == task.task_id => {
                        return Err(ChannelError::Worker(message));
                    }
                    WorkerToMain::Ready => debug!("Worker {} ready", self.name),
                    other => debug!("Worker {} sent a leftover reply: {:?}", self.name, other),
                }
            }
            Err(ChannelError::WorkerGone(self.name.clone()))
        })
    }
}

impl Drop for ThreadChannel {
    fn drop(&mut self) {
        let link = self.link.get_mut();
        if let Ok(json) = serde_json::to_string(&MainToWorker::Terminate) {
            link.commands.send(json).ok();
        }
    }
}

struct ModuleSlot {
    module: Box<dyn ForeignModule>,
    arena: MemoryArena,
}

type SharedSlot = Option<Arc<Mutex<ModuleSlot>>>;

/// Runs Tasks inside a foreign linear-memory module. Tasks dispatched before
/// the module is installed wait for it.
pub struct ModuleChannel {
    name: String,
    slot: watch::Receiver<SharedSlot>,
}

/// Installs the module a pending [`ModuleChannel`] is waiting for. Dropping
/// it uninstalled fails every waiting Task.
pub struct ModuleInstaller {
    name: String,
    slot: watch::Sender<SharedSlot>,
}

impl ModuleInstaller {
    pub fn install(self, module: Box<dyn ForeignModule>) {
        let arena = MemoryArena::new(module.arena_region());
        info!(
            "Module for {} installed ({} arena words)",
            self.name,
            arena.available()
        );
        let slot = Arc::new(Mutex::new(ModuleSlot { module, arena }));
        self.slot.send_replace(Some(slot));
    }

    /// Compile a WebAssembly compute module off the runtime and install it.
    #[cfg(feature = "wasm")]
    pub async fn load_wasm(self, bytes: Vec<u8>) -> Result<(), ChannelError> {
        let module =
            tokio::task::spawn_blocking(move || deepbrot_compute::WasmModule::from_bytes(&bytes))
                .await??;
        self.install(Box::new(module));
        Ok(())
    }
}

impl ModuleChannel {
    /// A channel whose module arrives later through the returned installer.
    pub fn pending(name: impl Into<String>) -> (Self, ModuleInstaller) {
        let name = name.into();
        let (sender, receiver) = watch::channel(None);
        let channel = Self {
            name: name.clone(),
            slot: receiver,
        };
        (channel, ModuleInstaller { name, slot: sender })
    }

    pub fn with_module(name: impl Into<String>, module: Box<dyn ForeignModule>) -> Self {
        let (channel, installer) = Self::pending(name);
        installer.install(module);
        channel
    }

    /// A channel over an in-process [`NativeModule`].
    pub fn native(name: impl Into<String>, arena_words: u32) -> Self {
        Self::with_module(name, Box::new(NativeModule::new(arena_words)))
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.borrow().is_some()
    }

    async fn loaded(&self) -> Result<Arc<Mutex<ModuleSlot>>, ChannelError> {
        let current = (*self.slot.borrow()).clone();
        if let Some(slot) = current {
            return Ok(slot);
        }
        debug!("{} waiting for its module", self.name);
        let mut slot = self.slot.clone();
        let ready = slot
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ChannelError::WorkerGone(format!("{}: module never loaded", self.name)))?;
        let installed: SharedSlot = (*ready).clone();
        installed.ok_or_else(|| ChannelError::WorkerGone(self.name.clone()))
    }
}

impl WorkerChannel for ModuleChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        setup: WorkerSetup,
        task: Task,
    ) -> BoxFuture<'_, Result<TaskResult, ChannelError>> {
        Box::pin(async move {
            let slot = self.loaded().await?;
            let name = self.name.clone();
            tokio::task::spawn_blocking(move || -> Result<TaskResult, ChannelError> {
                let mut guard = slot.lock().map_err(|_| {
                    warn!("Module of {name} was poisoned by an earlier panic");
                    ChannelError::WorkerGone(name.clone())
                })?;
                let ModuleSlot { module, arena } = &mut *guard;
                let rows = render_task_in_module(module.as_mut(), arena, &setup.job, &task)?;
                Ok(TaskResult::computed(&task, setup.worker_number, rows))
            })
            .await?
        })
    }
}
