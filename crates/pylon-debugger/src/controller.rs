use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::{broadcast, oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pylon_wire::{
    read_tag_bytes, CommandTag, CorrelationId, Event, EventTag, FrameIndex, ThreadId, WireWriter,
};

use crate::attach::Attacher;
use crate::breakpoint::{Breakpoint, BreakpointState, BreakpointTable};
use crate::config::DebuggerConfig;
use crate::error::{DebugError, Result};
use crate::events::DebugEvent;
use crate::ids::IdDispenser;
use crate::listener::{unregister, ConnectionListener, Registry};
use crate::model::{
    DebugThread, EvaluationResult, ExceptionBreakOverride, ExceptionInfo, LanguageVersion, Module,
    StackFrame,
};
use crate::path_map::PathMappings;

/// Behavior flags passed to the bootstrap script on the command line.
#[derive(Debug, Clone, Default)]
pub struct DebugOptions {
    /// Keep the target alive at an unhandled exception until resumed.
    pub wait_on_exception: bool,
    /// Keep the target alive after a normal exit until resumed.
    pub wait_on_exit: bool,
    /// Capture the target's stdout/stderr and report it as output events.
    pub redirect_output: bool,
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub interpreter: PathBuf,
    /// Extra interpreter arguments, inserted before the bootstrap script.
    pub interpreter_options: Vec<String>,
    /// The bootstrap script that connects back to the listener and drives
    /// the target side of the protocol.
    pub launcher: PathBuf,
    pub working_dir: PathBuf,
    /// Arguments passed through to the user script.
    pub script_args: Vec<String>,
    /// NUL-separated `NAME=VALUE` pairs layered over the inherited
    /// environment.
    pub env: Option<String>,
    pub language_version: Option<LanguageVersion>,
    pub options: DebugOptions,
    pub path_mappings: PathMappings,
}

#[derive(Debug, Clone)]
struct ExceptionSettings {
    default_mode: i32,
    overrides: Vec<ExceptionBreakOverride>,
}

struct PendingEval {
    expression: String,
    thread_id: ThreadId,
    frame_index: FrameIndex,
    tx: oneshot::Sender<EvaluationResult>,
}

struct PendingChildren {
    expression: String,
    thread_id: ThreadId,
    frame_index: FrameIndex,
    tx: oneshot::Sender<Vec<EvaluationResult>>,
}

pub(crate) struct Inner {
    debug_id: Uuid,
    config: DebuggerConfig,
    language_version: Option<LanguageVersion>,
    pub(crate) mappings: PathMappings,
    /// `None` until the rendezvous completes, and again after exit/detach.
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    pub(crate) breakpoints: Mutex<BreakpointTable>,
    threads: Mutex<HashMap<ThreadId, DebugThread>>,
    ids: Mutex<IdDispenser>,
    pending_evals: Mutex<HashMap<CorrelationId, PendingEval>>,
    pending_children: Mutex<HashMap<CorrelationId, PendingChildren>>,
    set_line: Mutex<Option<oneshot::Sender<bool>>>,
    /// Exception-break settings issued before the target connected; flushed
    /// exactly once when the socket arrives.
    exception_settings: Mutex<Option<ExceptionSettings>>,
    stopped_for_exception: AtomicBool,
    seen_first_thread: AtomicBool,
    sent_exited: AtomicBool,
    has_exited: AtomicBool,
    events: broadcast::Sender<DebugEvent>,
    shutdown: CancellationToken,
    kill: CancellationToken,
    registry: Registry,
}

/// One debugging session with one Python target.
///
/// Cloning is cheap and shares the session. All notifications arrive on the
/// broadcast channel from [`DebugController::subscribe`]; commands are
/// plain async calls.
#[derive(Clone)]
pub struct DebugController {
    inner: Arc<Inner>,
}

impl DebugController {
    /// Start a fresh interpreter under the debugger.
    ///
    /// The controller registers with `listener` before spawning so the
    /// bootstrap cannot connect into a void. The returned controller is
    /// live immediately; `ProcessLoaded` signals that the rendezvous
    /// finished and the target is broken in at startup.
    pub async fn launch(listener: &ConnectionListener, options: LaunchOptions) -> Result<Self> {
        Self::launch_with_config(listener, options, DebuggerConfig::default()).await
    }

    pub async fn launch_with_config(
        listener: &ConnectionListener,
        options: LaunchOptions,
        config: DebuggerConfig,
    ) -> Result<Self> {
        let debug_id = Uuid::new_v4();
        let rendezvous = listener.register(debug_id);

        let inner = Inner::new(
            debug_id,
            options.language_version,
            options.path_mappings.clone(),
            config,
            listener.registry(),
        );

        let mut cmd = Command::new(&options.interpreter);
        cmd.args(launch_args(&options, listener.port(), debug_id));
        cmd.current_dir(&options.working_dir);
        if let Some(env) = &options.env {
            for (name, value) in env_overrides(env) {
                cmd.env(name, value);
            }
        }

        let mut child = cmd.spawn().map_err(|err| {
            unregister(&inner.registry, debug_id);
            DebugError::Io(err)
        })?;

        tracing::debug!(
            target = "pylon.debugger",
            %debug_id,
            pid = ?child.id(),
            "launched debuggee"
        );

        // The child monitor owns the process handle: it reaps the exit
        // status and turns the kill token into an actual kill.
        let monitor = inner.clone();
        let kill = inner.kill.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = kill.cancelled() => {
                    let _ = child.start_kill();
                }
                _ = child.wait() => {}
            }
            let status = child.wait().await;
            let exit_code = status.ok().and_then(|s| s.code());
            monitor.process_exited(exit_code).await;
        });

        spawn_rendezvous(inner.clone(), rendezvous);
        Ok(Self { inner })
    }

    /// Attach to an already running interpreter through the platform
    /// injection primitive behind `attacher`.
    pub async fn attach(
        listener: &ConnectionListener,
        attacher: &dyn Attacher,
        pid: u32,
    ) -> Result<Self> {
        Self::attach_with_config(
            listener,
            attacher,
            pid,
            PathMappings::default(),
            DebuggerConfig::default(),
        )
        .await
    }

    pub async fn attach_with_config(
        listener: &ConnectionListener,
        attacher: &dyn Attacher,
        pid: u32,
        mappings: PathMappings,
        config: DebuggerConfig,
    ) -> Result<Self> {
        let debug_id = Uuid::new_v4();
        let rendezvous = listener.register(debug_id);

        let start = match attacher.attach(pid, listener.port(), debug_id) {
            Ok(start) => start,
            Err(err) => {
                unregister(&listener.registry(), debug_id);
                return Err(err.into());
            }
        };

        match tokio::time::timeout(config.attach_timeout, start.completed).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) | Err(_) => {
                unregister(&listener.registry(), debug_id);
                return Err(crate::attach::AttachError::Timeout.into());
            }
        }

        let inner = Inner::new(
            debug_id,
            Some(start.language_version),
            mappings,
            config,
            listener.registry(),
        );
        spawn_rendezvous(inner.clone(), rendezvous);
        Ok(Self { inner })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebugEvent> {
        self.inner.events.subscribe()
    }

    pub fn debug_id(&self) -> Uuid {
        self.inner.debug_id
    }

    pub fn language_version(&self) -> Option<LanguageVersion> {
        self.inner.language_version
    }

    pub fn has_exited(&self) -> bool {
        self.inner.has_exited.load(Ordering::SeqCst)
    }

    pub fn threads(&self) -> Vec<DebugThread> {
        let mut threads: Vec<_> = self.inner.threads.lock().values().cloned().collect();
        threads.sort_by_key(|t| t.id);
        threads
    }

    /// The most recent frame list reported for `thread_id`, or `None` for
    /// an unknown thread. Refreshed by [`DebugController::request_frames`].
    pub fn thread_frames(&self, thread_id: ThreadId) -> Option<Vec<StackFrame>> {
        self.inner
            .threads
            .lock()
            .get(&thread_id)
            .map(|t| t.frames.clone())
    }

    /// Create a breakpoint in the controller's table. Nothing is sent to
    /// the target until [`Breakpoint::bind`].
    pub fn add_breakpoint(&self, file: &str, line: i32) -> Breakpoint {
        self.add_breakpoint_with_condition(file, line, "", false)
    }

    pub fn add_breakpoint_with_condition(
        &self,
        file: &str,
        line: i32,
        condition: &str,
        break_when_changed: bool,
    ) -> Breakpoint {
        let id = self.inner.breakpoints.lock().insert(BreakpointState {
            file: file.to_owned(),
            line,
            condition: condition.to_owned(),
            break_when_changed,
        });
        Breakpoint::new(self.inner.clone(), id)
    }

    /// Break into the debugger on all threads at the next opportunity.
    pub async fn break_all(&self) -> Result<()> {
        self.inner.send(WireWriter::command(CommandTag::BreakAll)).await
    }

    pub async fn resume(&self) -> Result<()> {
        // Clear before sending: a stop that lands between the two must not
        // be mistaken for the exception stop being resumed away.
        self.inner
            .stopped_for_exception
            .store(false, Ordering::SeqCst);
        self.inner.send(WireWriter::command(CommandTag::ResumeAll)).await
    }

    pub async fn resume_thread(&self, thread_id: ThreadId) -> Result<()> {
        self.inner
            .stopped_for_exception
            .store(false, Ordering::SeqCst);
        let mut w = WireWriter::command(CommandTag::ResumeThread);
        w.write_i32(thread_id);
        self.inner.send(w).await
    }

    pub async fn step_into(&self, thread_id: ThreadId) -> Result<()> {
        self.step(CommandTag::StepInto, thread_id).await
    }

    pub async fn step_over(&self, thread_id: ThreadId) -> Result<()> {
        self.step(CommandTag::StepOver, thread_id).await
    }

    pub async fn step_out(&self, thread_id: ThreadId) -> Result<()> {
        self.step(CommandTag::StepOut, thread_id).await
    }

    async fn step(&self, tag: CommandTag, thread_id: ThreadId) -> Result<()> {
        let mut w = WireWriter::command(tag);
        w.write_i32(thread_id);
        self.inner.send(w).await
    }

    /// Cancel an in-progress step on `thread_id` without resuming it.
    pub async fn clear_stepping(&self, thread_id: ThreadId) -> Result<()> {
        let mut w = WireWriter::command(CommandTag::ClearStepping);
        w.write_i32(thread_id);
        self.inner.send(w).await
    }

    /// Ask the target for a fresh frame list; the result lands in
    /// [`DebugController::thread_frames`].
    pub async fn request_frames(&self, thread_id: ThreadId) -> Result<()> {
        let mut w = WireWriter::command(CommandTag::RequestFrames);
        w.write_i32(thread_id);
        self.inner.send(w).await
    }

    /// Evaluate `expression` in the given frame.
    ///
    /// An evaluation that raises in the target still resolves, to a result
    /// whose [`EvaluationResult::is_error`] is set.
    pub async fn evaluate(
        &self,
        expression: &str,
        thread_id: ThreadId,
        frame_index: FrameIndex,
    ) -> Result<EvaluationResult> {
        let id = self.inner.ids.lock().allocate();
        let (tx, rx) = oneshot::channel();
        self.inner.pending_evals.lock().insert(
            id,
            PendingEval {
                expression: expression.to_owned(),
                thread_id,
                frame_index,
                tx,
            },
        );

        let mut w = WireWriter::command(CommandTag::Execute);
        w.write_string(expression);
        w.write_i32(thread_id);
        w.write_i32(frame_index);
        w.write_i32(id);
        if let Err(err) = self.inner.send(w).await {
            self.inner.pending_evals.lock().remove(&id);
            self.inner.ids.lock().free(id);
            return Err(err);
        }

        rx.await.map_err(|_| DebugError::ConnectionClosed)
    }

    /// Enumerate the children of the value `expression` denotes.
    pub async fn enum_children(
        &self,
        expression: &str,
        thread_id: ThreadId,
        frame_index: FrameIndex,
        enumerate: bool,
    ) -> Result<Vec<EvaluationResult>> {
        let id = self.inner.ids.lock().allocate();
        let (tx, rx) = oneshot::channel();
        self.inner.pending_children.lock().insert(
            id,
            PendingChildren {
                expression: expression.to_owned(),
                thread_id,
                frame_index,
                tx,
            },
        );

        let mut w = WireWriter::command(CommandTag::EnumChildren);
        w.write_string(expression);
        w.write_i32(thread_id);
        w.write_i32(frame_index);
        w.write_i32(id);
        w.write_bool(enumerate);
        if let Err(err) = self.inner.send(w).await {
            self.inner.pending_children.lock().remove(&id);
            self.inner.ids.lock().free(id);
            return Err(err);
        }

        rx.await.map_err(|_| DebugError::ConnectionClosed)
    }

    /// Configure when the target breaks on raised exceptions.
    ///
    /// Issued before the target has connected, the settings are buffered
    /// and flushed once at rendezvous.
    pub async fn set_exception_info(
        &self,
        default_break_mode: i32,
        overrides: Vec<ExceptionBreakOverride>,
    ) -> Result<()> {
        let settings = ExceptionSettings {
            default_mode: default_break_mode,
            overrides,
        };
        let mut writer = self.inner.writer.lock().await;
        match writer.as_mut() {
            Some(stream) => Ok(sexi_writer(&settings).send(stream).await?),
            None => {
                *self.inner.exception_settings.lock() = Some(settings);
                Ok(())
            }
        }
    }

    /// Move the active statement of a frame to `line`.
    ///
    /// Resolves to `false` without touching the target while the process is
    /// stopped for an exception, and to `false` when the target rejects the
    /// move or does not answer within the configured window.
    pub async fn set_line_number(
        &self,
        thread_id: ThreadId,
        frame_index: FrameIndex,
        line: i32,
    ) -> Result<bool> {
        if self.inner.stopped_for_exception.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let (tx, rx) = oneshot::channel();
        *self.inner.set_line.lock() = Some(tx);

        let mut w = WireWriter::command(CommandTag::SetLineNumber);
        w.write_i32(thread_id);
        w.write_i32(frame_index);
        w.write_i32(line);
        if let Err(err) = self.inner.send(w).await {
            self.inner.set_line.lock().take();
            return Err(err);
        }

        match tokio::time::timeout(self.inner.config.set_line_timeout, rx).await {
            Ok(Ok(ok)) => Ok(ok),
            Ok(Err(_)) => Ok(false),
            Err(_) => {
                self.inner.set_line.lock().take();
                Ok(false)
            }
        }
    }

    /// Disconnect from the target, leaving it running. Socket failures are
    /// deliberately ignored: the target may already be gone.
    pub async fn detach(&self) -> Result<()> {
        let _ = self.inner.send(WireWriter::command(CommandTag::Detach)).await;
        unregister(&self.inner.registry, self.inner.debug_id);
        Ok(())
    }

    /// Kill a launched target. No-op for attached sessions.
    pub fn terminate(&self) {
        self.inner.kill.cancel();
    }

    /// Tear the session down: unregister, stop the receive loop, drop the
    /// socket, fail pending requests. Must be called explicitly; dropping
    /// the controller does not close the session.
    pub async fn close(&self) {
        unregister(&self.inner.registry, self.inner.debug_id);
        self.inner.shutdown.cancel();
        *self.inner.writer.lock().await = None;
        self.inner.drain_pending();
    }
}

impl Inner {
    fn new(
        debug_id: Uuid,
        language_version: Option<LanguageVersion>,
        mappings: PathMappings,
        config: DebuggerConfig,
        registry: Registry,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_channel_size);
        Arc::new(Self {
            debug_id,
            config,
            language_version,
            mappings,
            writer: AsyncMutex::new(None),
            breakpoints: Mutex::new(BreakpointTable::default()),
            threads: Mutex::new(HashMap::new()),
            ids: Mutex::new(IdDispenser::default()),
            pending_evals: Mutex::new(HashMap::new()),
            pending_children: Mutex::new(HashMap::new()),
            set_line: Mutex::new(None),
            exception_settings: Mutex::new(None),
            stopped_for_exception: AtomicBool::new(false),
            seen_first_thread: AtomicBool::new(false),
            sent_exited: AtomicBool::new(false),
            has_exited: AtomicBool::new(false),
            events,
            shutdown: CancellationToken::new(),
            kill: CancellationToken::new(),
            registry,
        })
    }

    pub(crate) async fn send(&self, w: WireWriter) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(stream) => Ok(w.send(stream).await?),
            None => Err(DebugError::NotConnected),
        }
    }

    /// Like [`Inner::send`], but a missing socket is a silent no-op.
    pub(crate) async fn send_if_connected(&self, w: WireWriter) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(stream) => Ok(w.send(stream).await?),
            None => Ok(()),
        }
    }

    fn emit(&self, event: DebugEvent) {
        let _ = self.events.send(event);
    }

    /// Shared exit path for the child monitor, socket errors, and DETC.
    /// Idempotent; the first caller reports the `ProcessExited` event.
    async fn process_exited(&self, exit_code: Option<i32>) {
        self.has_exited.store(true, Ordering::SeqCst);
        *self.writer.lock().await = None;
        unregister(&self.registry, self.debug_id);
        if !self.sent_exited.swap(true, Ordering::SeqCst) {
            self.emit(DebugEvent::ProcessExited {
                exit_code: exit_code.unwrap_or(-1),
            });
        }
        self.shutdown.cancel();
        self.drain_pending();
    }

    /// Fail every in-flight request and return its correlation id to the
    /// dispenser. Dropping the senders resolves the matching awaits with a
    /// connection-closed error.
    fn drain_pending(&self) {
        let evals: Vec<_> = self.pending_evals.lock().drain().collect();
        let children: Vec<_> = self.pending_children.lock().drain().collect();
        {
            let mut ids = self.ids.lock();
            for (id, _) in &evals {
                ids.free(*id);
            }
            for (id, _) in &children {
                ids.free(*id);
            }
        }
        self.set_line.lock().take();
    }
}

/// Arguments for the bootstrap invocation, in the order the bootstrap's
/// argument parser expects them.
fn launch_args(options: &LaunchOptions, port: u16, debug_id: Uuid) -> Vec<String> {
    let mut args = options.interpreter_options.clone();
    args.push(options.launcher.to_string_lossy().into_owned());
    // The bootstrap rejects a working directory with a trailing separator,
    // so strip it here.
    let working_dir = options.working_dir.to_string_lossy();
    args.push(working_dir.trim_end_matches(['/', '\\']).to_owned());
    args.push(port.to_string());
    args.push(debug_id.to_string());
    if options.options.wait_on_exception {
        args.push("--wait-on-exception".to_owned());
    }
    if options.options.wait_on_exit {
        args.push("--wait-on-exit".to_owned());
    }
    if options.options.redirect_output {
        args.push("--redirect-output".to_owned());
    }
    args.extend(options.script_args.iter().cloned());
    args
}

/// NUL-separated `NAME=VALUE` overrides; entries without an `=` are
/// ignored.
fn env_overrides(env: &str) -> impl Iterator<Item = (&str, &str)> {
    env.split('\0').filter_map(|pair| pair.split_once('='))
}

fn sexi_writer(settings: &ExceptionSettings) -> WireWriter {
    let mut w = WireWriter::command(CommandTag::SetExceptionInfo);
    w.write_i32(settings.default_mode);
    w.write_i32(settings.overrides.len() as i32);
    for o in &settings.overrides {
        w.write_i32(o.mode);
        w.write_string(&o.name);
    }
    w
}

fn spawn_rendezvous(inner: Arc<Inner>, rendezvous: oneshot::Receiver<TcpStream>) {
    let shutdown = inner.shutdown.clone();
    tokio::spawn(async move {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => return,
            res = rendezvous => match res {
                Ok(stream) => stream,
                // Listener shut down before the target connected.
                Err(_) => return,
            },
        };
        connected(inner, stream).await;
    });
}

async fn connected(inner: Arc<Inner>, stream: TcpStream) {
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();

    {
        let mut writer = inner.writer.lock().await;
        *writer = Some(write_half);
        // Taken under the writer lock: a concurrent set_exception_info
        // either buffered before we got here or sends on the socket itself.
        let buffered = inner.exception_settings.lock().take();
        if let Some(settings) = buffered {
            if let Some(stream) = writer.as_mut() {
                if let Err(err) = sexi_writer(&settings).send(stream).await {
                    tracing::warn!(
                        target = "pylon.debugger",
                        error = %err,
                        "failed to flush exception settings"
                    );
                }
            }
        }
    }
    unregister(&inner.registry, inner.debug_id);

    tracing::debug!(target = "pylon.debugger", debug_id = %inner.debug_id, "debuggee connected");
    tokio::spawn(read_loop(read_half, inner));
}

async fn read_loop(mut reader: OwnedReadHalf, inner: Arc<Inner>) {
    loop {
        let tag_read = tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            res = read_tag_bytes(&mut reader) => res,
        };
        let tag_bytes = match tag_read {
            Ok(tag) => tag,
            Err(err) => {
                tracing::debug!(target = "pylon.debugger", error = %err, "connection lost");
                inner.process_exited(None).await;
                return;
            }
        };

        let tag = match EventTag::from_bytes(tag_bytes) {
            Ok(tag) => tag,
            Err(err) => {
                // The stream is desynchronized beyond recovery.
                tracing::warn!(target = "pylon.debugger", error = %err, "unknown event tag");
                inner.process_exited(None).await;
                return;
            }
        };

        let event = tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            res = Event::read(tag, &mut reader) => res,
        };
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(target = "pylon.debugger", ?tag, error = %err, "bad event payload");
                inner.process_exited(None).await;
                return;
            }
        };

        if handle_event(&inner, event).await {
            return;
        }
    }
}

/// Dispatch one decoded event. Returns `true` when the loop must stop.
async fn handle_event(inner: &Arc<Inner>, event: Event) -> bool {
    match event {
        Event::ThreadCreated { thread_id } => {
            let is_main = !inner.seen_first_thread.swap(true, Ordering::SeqCst);
            inner.threads.lock().insert(
                thread_id,
                DebugThread {
                    id: thread_id,
                    is_main,
                    frames: Vec::new(),
                },
            );
            inner.emit(DebugEvent::ThreadCreated { thread_id });
        }
        Event::ThreadExited { thread_id } => {
            if inner.threads.lock().remove(&thread_id).is_some() {
                inner.emit(DebugEvent::ThreadExited { thread_id });
            }
        }
        Event::ProcessLoaded { thread_id } => {
            inner.emit(DebugEvent::ProcessLoaded { thread_id });
        }
        Event::StepDone { thread_id } => {
            inner.emit(DebugEvent::StepComplete { thread_id });
        }
        Event::AsyncBreakComplete { thread_id } => {
            inner.emit(DebugEvent::AsyncBreakComplete { thread_id });
        }
        Event::ModuleLoaded {
            module_id,
            filename,
        } => {
            let filename = inner.mappings.map_to_host(&filename);
            inner.emit(DebugEvent::ModuleLoaded {
                module: Module {
                    id: module_id,
                    filename,
                },
            });
        }
        Event::ExceptionRaised {
            exc_type,
            thread_id,
            description,
        } => {
            inner
                .stopped_for_exception
                .store(true, Ordering::SeqCst);
            inner.emit(DebugEvent::ExceptionRaised {
                thread_id,
                exception: ExceptionInfo {
                    type_name: exc_type,
                    description,
                },
            });
        }
        Event::BreakpointHit {
            breakpoint_id,
            thread_id,
        } => {
            let known = inner.breakpoints.lock().contains(breakpoint_id);
            if known {
                inner.emit(DebugEvent::BreakpointHit {
                    breakpoint_id,
                    thread_id,
                });
            } else {
                // A hit for a breakpoint removed while the notification was
                // in flight; let the thread run on.
                tracing::debug!(
                    target = "pylon.debugger",
                    breakpoint_id,
                    thread_id,
                    "stale breakpoint hit, resuming"
                );
                inner
                    .stopped_for_exception
                    .store(false, Ordering::SeqCst);
                let mut w = WireWriter::command(CommandTag::ResumeThread);
                w.write_i32(thread_id);
                let _ = inner.send_if_connected(w).await;
            }
        }
        Event::BreakpointBindSucceeded { breakpoint_id } => {
            inner.emit(DebugEvent::BreakpointBindSucceeded { breakpoint_id });
        }
        Event::BreakpointBindFailed { breakpoint_id } => {
            if inner.breakpoints.lock().contains(breakpoint_id) {
                inner.emit(DebugEvent::BreakpointBindFailed { breakpoint_id });
            } else {
                tracing::debug!(
                    target = "pylon.debugger",
                    breakpoint_id,
                    "bind failure for unknown breakpoint"
                );
            }
        }
        Event::ThreadFrameList { thread_id, frames } => {
            let frames: Vec<StackFrame> = frames
                .iter()
                .enumerate()
                .map(|(i, payload)| StackFrame::from_payload(thread_id, i as FrameIndex, payload))
                .collect();
            match inner.threads.lock().get_mut(&thread_id) {
                Some(thread) => thread.frames = frames,
                None => {
                    tracing::debug!(
                        target = "pylon.debugger",
                        thread_id,
                        "frame list for unknown thread"
                    );
                }
            }
        }
        Event::EvaluationResult {
            correlation_id,
            value,
        } => {
            let pending = inner.pending_evals.lock().remove(&correlation_id);
            match pending {
                Some(p) => {
                    inner.ids.lock().free(correlation_id);
                    let _ = p.tx.send(EvaluationResult::from_value(
                        p.expression,
                        &value,
                        p.thread_id,
                        p.frame_index,
                    ));
                }
                None => {
                    tracing::debug!(
                        target = "pylon.debugger",
                        correlation_id,
                        "evaluation result with no pending request"
                    );
                }
            }
        }
        Event::EvaluationError {
            correlation_id,
            text,
        } => {
            let pending = inner.pending_evals.lock().remove(&correlation_id);
            if let Some(p) = pending {
                inner.ids.lock().free(correlation_id);
                let _ = p.tx.send(EvaluationResult::error(
                    p.expression,
                    text,
                    p.thread_id,
                    p.frame_index,
                ));
            }
        }
        Event::Children {
            correlation_id,
            is_index,
            is_enumerate,
            children,
        } => {
            let pending = inner.pending_children.lock().remove(&correlation_id);
            if let Some(p) = pending {
                inner.ids.lock().free(correlation_id);
                let results = children
                    .iter()
                    .map(|(child_expr, value)| {
                        let expression = if child_expr.starts_with('[') {
                            format!("{}{}", p.expression, child_expr)
                        } else {
                            format!("{}.{}", p.expression, child_expr)
                        };
                        EvaluationResult::child(
                            expression,
                            child_expr.clone(),
                            value,
                            is_index,
                            is_enumerate,
                            p.thread_id,
                            p.frame_index,
                        )
                    })
                    .collect();
                let _ = p.tx.send(results);
            }
        }
        Event::SetLineResult {
            ok,
            thread_id,
            new_line,
        } => {
            if ok {
                if let Some(thread) = inner.threads.lock().get_mut(&thread_id) {
                    if let Some(frame) = thread.frames.first_mut() {
                        frame.line = new_line;
                    }
                }
            }
            if let Some(tx) = inner.set_line.lock().take() {
                let _ = tx.send(ok);
            }
        }
        Event::Output { thread_id, text } => {
            // Output racing thread teardown is dropped with the thread.
            if inner.threads.lock().contains_key(&thread_id) {
                inner.emit(DebugEvent::Output { thread_id, text });
            }
        }
        Event::HandlersRequested { filename } => {
            let local = inner.mappings.map_to_host(&filename);
            let ranges = tokio::task::spawn_blocking(move || {
                pylon_source::handled_exception_ranges_for_file(Path::new(&local))
            })
            .await
            .unwrap_or_default();

            let mut w = WireWriter::command(CommandTag::SetExceptionHandlerInfo);
            w.write_string(&filename);
            w.write_i32(ranges.len() as i32);
            for range in &ranges {
                w.write_i32(range.start_line);
                w.write_i32(range.end_line);
                for handler in &range.handlers {
                    w.write_string(handler);
                }
                w.write_string("-");
            }
            let _ = inner.send_if_connected(w).await;
        }
        Event::ProcessExited { exit_code } => {
            inner.has_exited.store(true, Ordering::SeqCst);
            if !inner.sent_exited.swap(true, Ordering::SeqCst) {
                inner.emit(DebugEvent::ProcessExited { exit_code });
            }
            // Ack so the target can finish its shutdown handshake, then
            // drop the socket.
            {
                let mut writer = inner.writer.lock().await;
                if let Some(stream) = writer.as_mut() {
                    let _ = WireWriter::command(CommandTag::ExitAck).send(stream).await;
                }
                *writer = None;
            }
            unregister(&inner.registry, inner.debug_id);
            inner.shutdown.cancel();
            inner.drain_pending();
            return true;
        }
        Event::Detached => {
            inner.process_exited(None).await;
        }
    }
    false
}
