//! Component host: child-process lifecycle for a single component execution.
//!
//! The host spawns one child per execution, delivers the envelope on the
//! child's stdin, and waits on the child's stdout for the single result
//! line, enforcing the component's timeout. The child's stderr is forwarded
//! into the parent's log. See [`crate::worker`] for the child side.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::component::{
    ComponentContext, ComponentKind, ExecutionInfo, ExecutionStatus,
};
use crate::definition::ComponentDescriptor;
use crate::registry::Registry;
use crate::worker::{WorkerEnvelope, WorkerResult, WORKER_ENV_VAR};
use crate::{Error, Result};

/// How long to wait for a child to die after delivering its result, after
/// SIGTERM on timeout, and after SIGKILL during teardown
const EXIT_GRACE: Duration = Duration::from_millis(100);

/// Command used to spawn component workers.
///
/// Production pipelines re-execute the current binary, whose entry point
/// must dispatch into [`crate::worker::run_worker`]. Tests and embedders may
/// substitute any command that speaks the one-line result protocol.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerLauncher {
    /// Launcher re-executing the current binary in worker mode
    pub fn current_exe() -> Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: Vec::new(),
        })
    }

    /// Launcher running an arbitrary worker command
    pub fn external<S>(program: impl Into<PathBuf>, args: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

/// Wraps one component instance and drives its executions.
///
/// The host is reused across scheduled runs; every run spawns a fresh child
/// process and a fresh result channel.
pub struct Host {
    context: ComponentContext,
    raw_config: Map<String, Value>,
    launcher: WorkerLauncher,
    child: Option<Child>,
    output: Option<Lines<BufReader<ChildStdout>>>,
    started: Option<Instant>,
    pid: Option<u32>,
}

impl Host {
    /// Wrap an already-validated component
    pub fn new(
        context: ComponentContext,
        raw_config: Map<String, Value>,
        launcher: WorkerLauncher,
    ) -> Self {
        Self {
            context,
            raw_config,
            launcher,
            child: None,
            output: None,
            started: None,
            pid: None,
        }
    }

    /// Resolve a descriptor against the registry and validate its
    /// configuration. This is where config and registry errors surface,
    /// before any process is spawned.
    pub fn build(
        kind: ComponentKind,
        index: usize,
        descriptor: &ComponentDescriptor,
        registry: &Registry,
        launcher: &WorkerLauncher,
    ) -> Result<Self> {
        let context = match kind {
            ComponentKind::Source => {
                let component = registry.source(&descriptor.type_name)?();
                Self::context_for(component.as_ref(), kind, index, descriptor)?
            }
            ComponentKind::Aggregator => {
                let component = registry.aggregator(&descriptor.type_name)?();
                Self::context_for(component.as_ref(), kind, index, descriptor)?
            }
            ComponentKind::Sink => {
                let component = registry.sink(&descriptor.type_name)?();
                Self::context_for(component.as_ref(), kind, index, descriptor)?
            }
        };

        tracing::info!("Created {} instance {}", kind, context);
        Ok(Self::new(context, descriptor.config.clone(), launcher.clone()))
    }

    fn context_for<C>(
        component: &C,
        kind: ComponentKind,
        index: usize,
        descriptor: &ComponentDescriptor,
    ) -> Result<ComponentContext>
    where
        C: crate::component::Component + ?Sized,
    {
        ComponentContext::for_component(
            component,
            kind,
            &descriptor.type_name,
            &descriptor.id,
            index,
            descriptor.optional,
            descriptor.timeout,
            &descriptor.config,
        )
    }

    pub fn context(&self) -> &ComponentContext {
        &self.context
    }

    pub fn id(&self) -> &str {
        &self.context.id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.context.timeout
    }

    /// Process id of the current or last child
    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }

    /// Spawn the child and hand it the execution envelope.
    ///
    /// `input` carries the bundle for aggregators and sinks; sources take
    /// no input.
    pub async fn start(&mut self, input: Option<Value>) -> Result<()> {
        let envelope = WorkerEnvelope {
            kind: self.context.kind,
            type_name: self.context.type_name.clone(),
            id: self.context.id.clone(),
            index: self.context.index,
            optional: self.context.optional,
            timeout_seconds: self.context.timeout.map(|timeout| timeout.as_secs()),
            config: self.raw_config.clone(),
            input,
        };
        let mut envelope_line = serde_json::to_string(&envelope)?;
        envelope_line.push('\n');

        let mut command = self.launcher.command();
        command
            .env(WORKER_ENV_VAR, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        self.started = Some(Instant::now());
        let mut child = command.spawn()?;
        self.pid = child.id();

        // Deliver the envelope from a detached task: a stuck worker must not
        // block the stage while other hosts are being started.
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                let _ = stdin.write_all(envelope_line.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let identity = self.context.to_string();
            let pid = self.pid;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!("[worker {:?} {}] {}", pid, identity, line);
                }
            });
        }

        self.output = child
            .stdout
            .take()
            .map(|stdout| BufReader::new(stdout).lines());
        self.child = Some(child);

        tracing::info!(
            "Started {} {} with PID {:?}",
            self.context.kind,
            self.context,
            self.pid
        );
        Ok(())
    }

    /// Wait for the result, enforcing the component's timeout.
    ///
    /// Success returns the execution info with the child's data. Failure
    /// raises [`Error::Crash`] (crash sentinel delivered) or
    /// [`Error::TimeExceeded`] (killed, timed out or hanged), each carrying
    /// the execution info for the journal.
    pub async fn join(&mut self) -> Result<ExecutionInfo> {
        let Some(started) = self.started.take() else {
            return Err(Error::Component(format!(
                "{} joined before being started",
                self.context
            )));
        };
        let Some(mut output) = self.output.take() else {
            return Err(Error::Component(format!(
                "{} has no result channel",
                self.context
            )));
        };
        let Some(mut child) = self.child.take() else {
            return Err(Error::Component(format!(
                "{} has no child process",
                self.context
            )));
        };

        let budget = self
            .context
            .timeout
            .map(|timeout| timeout.saturating_sub(started.elapsed()));

        let read = match budget {
            Some(budget) => tokio::time::timeout(budget, output.next_line()).await,
            None => Ok(output.next_line().await),
        };

        match read {
            // A line arrived before the deadline
            Ok(Ok(Some(line))) => self.classify_result(&line, child).await,
            // EOF or a broken pipe before the deadline: the child is gone
            // and can no longer produce a result
            Ok(Ok(None)) | Ok(Err(_)) => self.classify_dead(child).await,
            // Deadline expired without a result
            Err(_) => self.classify_deadline(child, started).await,
        }
    }

    async fn classify_result(&self, line: &str, mut child: Child) -> Result<ExecutionInfo> {
        // A malformed result line counts as a crash
        let result: WorkerResult = serde_json::from_str(line).unwrap_or(WorkerResult {
            duration_seconds: 0.0,
            data: None,
        });

        let exit_code = match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => exit_status_code(&status),
            _ => {
                tracing::warn!(
                    "{} driving process with PID {:?} took too long to die after \
                     submitting its result; exit code might be unknown",
                    self.context,
                    self.pid
                );
                None
            }
        };

        if result.data.is_none() {
            let info = ExecutionInfo {
                status: ExecutionStatus::Crashed,
                duration_seconds: Some(result.duration_seconds),
                process_id: self.pid,
                exit_code,
                data: None,
            };
            return Err(Error::Crash(info));
        }

        Ok(ExecutionInfo {
            status: ExecutionStatus::Succeeded,
            duration_seconds: Some(result.duration_seconds),
            process_id: self.pid,
            exit_code,
            data: result.data,
        })
    }

    async fn classify_dead(&self, mut child: Child) -> Result<ExecutionInfo> {
        let exit_code = match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => exit_status_code(&status),
            _ => None,
        };

        tracing::warn!(
            "{} driving process with PID {:?} was killed ({:?}). Possible causes \
             can be a segfault, SIGTERM, SIGKILL or the OOM killer",
            self.context,
            self.pid,
            exit_code
        );

        Err(Error::TimeExceeded(ExecutionInfo {
            status: ExecutionStatus::Killed,
            duration_seconds: None,
            process_id: self.pid,
            exit_code,
            data: None,
        }))
    }

    async fn classify_deadline(&self, mut child: Child, started: Instant) -> Result<ExecutionInfo> {
        // The child may have died right at the deadline without producing
        if let Ok(Some(status)) = child.try_wait() {
            tracing::warn!(
                "{} driving process with PID {:?} was killed ({:?}). Possible \
                 causes can be a segfault, SIGTERM, SIGKILL or the OOM killer",
                self.context,
                self.pid,
                exit_status_code(&status)
            );
            return Err(Error::TimeExceeded(ExecutionInfo {
                status: ExecutionStatus::Killed,
                duration_seconds: None,
                process_id: self.pid,
                exit_code: exit_status_code(&status),
                data: None,
            }));
        }

        terminate(&mut child);
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => Err(Error::TimeExceeded(ExecutionInfo {
                status: ExecutionStatus::TimedOut,
                duration_seconds: Some(started.elapsed().as_secs_f64()),
                process_id: self.pid,
                exit_code: exit_status_code(&status),
                data: None,
            })),
            _ => {
                tracing::warn!(
                    "Execution of {} timed out and its driving process with PID \
                     {:?} seems to have hanged",
                    self.context,
                    self.pid
                );
                // Last resort so the child does not outlive the pipeline
                let _ = child.start_kill();
                let _ = tokio::time::timeout(EXIT_GRACE, child.wait()).await;
                Err(Error::TimeExceeded(ExecutionInfo {
                    status: ExecutionStatus::Hanged,
                    duration_seconds: None,
                    process_id: self.pid,
                    exit_code: None,
                    data: None,
                }))
            }
        }
    }

    /// Force-stop the child. Used when the stage is tearing down after a
    /// fatal failure and the result is no longer relevant.
    pub async fn stop(&mut self) {
        self.output = None;
        self.started = None;
        let Some(mut child) = self.child.take() else {
            return;
        };

        terminate(&mut child);
        if !matches!(
            tokio::time::timeout(EXIT_GRACE, child.wait()).await,
            Ok(Ok(_))
        ) {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(EXIT_GRACE, child.wait()).await;
        }
        tracing::debug!("Stopped {} (PID {:?})", self.context, self.pid);
    }
}

/// Ask the child to terminate: SIGTERM on Unix, hard kill elsewhere
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            return;
        }
    }
    let _ = child.start_kill();
}

/// Exit code of a reaped child; signal deaths map to negative numbers
#[cfg(unix)]
fn exit_status_code(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|signal| -signal))
}

/// Exit code of a reaped child
#[cfg(not(unix))]
fn exit_status_code(status: &std::process::ExitStatus) -> Option<i32> {
    status.code()
}

/// Join-schedule ordering: ascending timeout, unbounded components last.
/// Ties keep declaration order (the sort using this key is stable).
pub fn timeout_sort_key(timeout: Option<Duration>) -> (bool, Duration) {
    match timeout {
        Some(timeout) => (false, timeout),
        None => (true, Duration::ZERO),
    }
}
