use std::{
    collections::HashMap,
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::{Mutex, RwLock};

use crate::error::{CineforgeError, CineforgeResult};

/// How long a graceful SIGTERM gets before escalating to SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Reaper scan period.
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Exit outcome of a supervised process, published exactly once by its
/// monitor thread.
#[derive(Clone, Debug)]
pub enum ProcessExit {
    Status(std::process::ExitStatus),
    /// `wait(2)` itself failed; the status is unknowable.
    WaitFailed(String),
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Status(s) if s.success())
    }

    pub fn describe(&self) -> String {
        match self {
            ProcessExit::Status(s) => s.to_string(),
            ProcessExit::WaitFailed(e) => format!("wait failed: {e}"),
        }
    }
}

type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Cheap-to-clone handle to a supervised process.
///
/// The completion channel never carries a value; the monitor thread drops the
/// sender once the exit result is published, so every cloned receiver
/// observes disconnection exactly once the process has been reaped.
#[derive(Clone)]
pub struct ManagedProcess {
    pid: u32,
    started_at: Instant,
    done: Receiver<()>,
    exit: Arc<OnceLock<ProcessExit>>,
}

impl ManagedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_running(&self) -> bool {
        self.exit.get().is_none()
    }

    /// The exit result, if the process has already been reaped.
    pub fn exit(&self) -> Option<ProcessExit> {
        self.exit.get().cloned()
    }

    /// Blocks until the monitor thread has reaped the process.
    pub fn wait(&self) -> ProcessExit {
        // Only disconnection can end this recv; the channel never carries data.
        let _ = self.done.recv();
        self.exit_now()
    }

    /// Bounded wait; `None` when the process is still running after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ProcessExit> {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Some(self.exit_now()),
            Err(RecvTimeoutError::Timeout) => None,
        }
    }

    fn exit_now(&self) -> ProcessExit {
        self.exit
            .get()
            .cloned()
            .unwrap_or_else(|| ProcessExit::WaitFailed("exit result missing".to_string()))
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("pid", &self.pid)
            .field("running", &self.is_running())
            .finish()
    }
}

/// A freshly spawned process: the supervised handle plus whichever standard
/// pipes the caller configured. The `Child` itself belongs to the monitor
/// thread and is never handed out.
#[derive(Debug)]
pub struct Spawned {
    pub process: ManagedProcess,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

struct Registry {
    processes: RwLock<HashMap<u32, ManagedProcess>>,
    closed: AtomicBool,
}

/// Owns every externally spawned transcoder process: each spawn is registered
/// under its pid and paired with a monitor thread that blocks on the child's
/// exit, publishes the result, and deregisters the entry. A periodic reaper
/// logs abnormal exits; shutdown terminates everything still registered.
pub struct ProcessSupervisor {
    registry: Arc<Registry>,
    reaper_stop: Mutex<Option<Sender<()>>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        let registry = Arc::new(Registry {
            processes: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let reaper_registry = Arc::clone(&registry);
        thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(REAP_INTERVAL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => reap_scan(&reaper_registry),
                }
            }
        });

        Self {
            registry,
            reaper_stop: Mutex::new(Some(stop_tx)),
        }
    }

    /// Spawns `cmd` in its own process group and registers it. The caller is
    /// responsible for configuring stdio pipes on `cmd` beforehand.
    pub fn start(&self, cmd: Command) -> CineforgeResult<Spawned> {
        self.start_with_cleanup(cmd, None)
    }

    /// Like [`start`](Self::start), with a callback the monitor thread runs
    /// after the process has exited and been deregistered.
    pub fn start_with_cleanup(
        &self,
        mut cmd: Command,
        cleanup: Option<Cleanup>,
    ) -> CineforgeResult<Spawned> {
        if self.registry.closed.load(Ordering::SeqCst) {
            return Err(CineforgeError::state(
                "process supervisor is closed; no new processes may be started",
            ));
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            // Own process group, so signaling the group reaches any children
            // the transcoder forks.
            cmd.process_group(0);
        }

        let program = cmd.get_program().to_string_lossy().into_owned();
        let mut child = cmd.spawn().map_err(|e| {
            CineforgeError::spawn(format!("failed to launch '{program}': {e}"))
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pid = child.id();

        let (done_tx, done_rx) = bounded::<()>(0);
        let exit = Arc::new(OnceLock::new());
        let process = ManagedProcess {
            pid,
            started_at: Instant::now(),
            done: done_rx,
            exit: Arc::clone(&exit),
        };

        let registry = Arc::clone(&self.registry);
        {
            // Re-check under the write lock: a close() racing this spawn must
            // either see the entry in its snapshot or be observed here.
            let mut processes = self.registry.processes.write();
            if self.registry.closed.load(Ordering::SeqCst) {
                drop(processes);
                signal_group(pid, GroupSignal::Kill);
                thread::spawn(move || monitor(child, pid, exit, done_tx, registry, cleanup));
                return Err(CineforgeError::state(
                    "process supervisor is closed; no new processes may be started",
                ));
            }
            processes.insert(pid, process.clone());
        }
        thread::spawn(move || monitor(child, pid, exit, done_tx, registry, cleanup));

        Ok(Spawned {
            process,
            stdin,
            stdout,
            stderr,
        })
    }

    /// Graceful-then-forceful termination of the process group of `pid`.
    ///
    /// SIGTERM first; if the completion signal does not fire within
    /// [`TERMINATE_GRACE`], SIGKILL. Always `Ok` for a registered pid:
    /// termination is best-effort but eventually complete either way.
    pub fn terminate(&self, pid: u32) -> CineforgeResult<()> {
        let Some(process) = self.registry.processes.read().get(&pid).cloned() else {
            return Err(CineforgeError::state(format!(
                "process {pid} is not registered"
            )));
        };

        signal_group(pid, GroupSignal::Term);
        if process.wait_timeout(TERMINATE_GRACE).is_none() {
            tracing::warn!(pid, "process ignored SIGTERM within grace period, sending SIGKILL");
            signal_group(pid, GroupSignal::Kill);
        }
        Ok(())
    }

    /// Terminates every currently registered process.
    pub fn terminate_all(&self) {
        let pids: Vec<u32> = self.registry.processes.read().keys().copied().collect();
        for pid in pids {
            // Races with natural exits are fine; the entry may already be gone.
            let _ = self.terminate(pid);
        }
    }

    /// Number of registered (started, not yet reaped) processes.
    pub fn process_count(&self) -> usize {
        self.registry.processes.read().len()
    }

    pub fn is_closed(&self) -> bool {
        self.registry.closed.load(Ordering::SeqCst)
    }

    /// Stops the reaper and terminates every registered process. Idempotent;
    /// `start` fails afterwards.
    pub fn close(&self) {
        if self.registry.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(self.reaper_stop.lock().take());
        self.terminate_all();
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.close();
    }
}

fn monitor(
    mut child: Child,
    pid: u32,
    exit: Arc<OnceLock<ProcessExit>>,
    done_tx: Sender<()>,
    registry: Arc<Registry>,
    cleanup: Option<Cleanup>,
) {
    let result = match child.wait() {
        Ok(status) => ProcessExit::Status(status),
        Err(e) => ProcessExit::WaitFailed(e.to_string()),
    };
    let _ = exit.set(result);
    registry.processes.write().remove(&pid);
    // Disconnects every waiter before the cleanup callback runs.
    drop(done_tx);
    if let Some(cleanup) = cleanup {
        cleanup();
    }
}

/// Diagnostic only: surfaces abnormal exits that nobody waited on. Removal is
/// exclusively the monitor threads' job.
fn reap_scan(registry: &Registry) {
    let snapshot: Vec<ManagedProcess> =
        registry.processes.read().values().cloned().collect();
    for process in snapshot {
        if let Some(exit) = process.exit() {
            if !exit.success() {
                tracing::warn!(
                    pid = process.pid(),
                    exit = %exit.describe(),
                    "supervised process exited abnormally"
                );
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum GroupSignal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: GroupSignal) {
    use nix::{sys::signal, unistd::Pid};

    let sig = match signal {
        GroupSignal::Term => signal::Signal::SIGTERM,
        GroupSignal::Kill => signal::Signal::SIGKILL,
    };
    // The group may already be gone; that is success from our perspective.
    let _ = signal::killpg(Pid::from_raw(pid as i32), sig);
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: GroupSignal) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;

    fn quiet(mut cmd: Command) -> Command {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    #[test]
    fn fast_exit_is_reaped_and_deregistered() {
        let sup = ProcessSupervisor::new();
        let spawned = sup.start(quiet(Command::new("true"))).unwrap();
        let exit = spawned.process.wait();
        assert!(exit.success());
        // The monitor removes the entry right after publishing the result.
        let deadline = Instant::now() + Duration::from_secs(2);
        while sup.process_count() != 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sup.process_count(), 0);
    }

    #[test]
    fn nonzero_exit_is_captured() {
        let sup = ProcessSupervisor::new();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 3"]);
        let spawned = sup.start(quiet(cmd)).unwrap();
        let exit = spawned.process.wait();
        assert!(!exit.success());
        assert!(exit.describe().contains('3'));
    }

    #[test]
    fn start_unknown_program_is_spawn_error() {
        let sup = ProcessSupervisor::new();
        let err = sup
            .start(quiet(Command::new("cineforge-definitely-not-a-binary")))
            .unwrap_err();
        assert!(matches!(err, CineforgeError::Spawn(_)));
    }

    #[test]
    fn terminate_unknown_pid_is_state_error() {
        let sup = ProcessSupervisor::new();
        assert!(matches!(
            sup.terminate(999_999_999).unwrap_err(),
            CineforgeError::State(_)
        ));
    }

    #[test]
    fn cleanup_runs_after_exit() {
        let sup = ProcessSupervisor::new();
        let flag = Arc::new(AtomicBool::new(false));
        let flag2 = Arc::clone(&flag);
        let spawned = sup
            .start_with_cleanup(
                quiet(Command::new("true")),
                Some(Box::new(move || flag2.store(true, Ordering::SeqCst))),
            )
            .unwrap();
        spawned.process.wait();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !flag.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn start_after_close_fails() {
        let sup = ProcessSupervisor::new();
        sup.close();
        let err = sup.start(quiet(Command::new("true"))).unwrap_err();
        assert!(matches!(err, CineforgeError::State(_)));
    }
}
