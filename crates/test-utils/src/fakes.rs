//! Scripted stand-ins for the orchestrator's collaborators.
//!
//! Both fakes succeed by default, fail according to a per-key script,
//! record every call in order, and can report into a shared
//! [`ConcurrencyProbe`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use willowcal::exec::{BoxFuture, CloneOperation, CommandExecutor};
use willowcal::state::{CloneOutcome, CommandResult};

/// How a scripted key behaves.
#[derive(Debug, Clone, Copy)]
enum Script {
    /// Fail this many more times, then succeed.
    FailTimes(usize),
    FailAlways,
}

#[derive(Debug, Default)]
struct ScriptBook {
    scripts: HashMap<String, Script>,
}

impl ScriptBook {
    /// Consume one call for `key`; true if it should fail.
    fn should_fail(&mut self, key: &str) -> bool {
        match self.scripts.get_mut(key) {
            Some(Script::FailAlways) => true,
            Some(Script::FailTimes(n)) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Tracks how many operations are in flight and the maximum ever seen.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enter(self: &Arc<Self>) -> ProbeGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            probe: Arc::clone(self),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct ProbeGuard {
    probe: Arc<ConcurrencyProbe>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn pause(delay: Option<Duration>, cancel: &CancellationToken) -> bool {
    let Some(delay) = delay else {
        return true;
    };
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Fake clone operation keyed by URL.
#[derive(Default)]
pub struct FakeCloner {
    book: Mutex<ScriptBook>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    probe: Option<Arc<ConcurrencyProbe>>,
}

impl FakeCloner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_always(self, url: &str) -> Self {
        self.book
            .lock()
            .unwrap()
            .scripts
            .insert(url.to_string(), Script::FailAlways);
        self
    }

    pub fn fail_times(self, url: &str, n: usize) -> Self {
        self.book
            .lock()
            .unwrap()
            .scripts
            .insert(url.to_string(), Script::FailTimes(n));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// URLs cloned so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

impl CloneOperation for FakeCloner {
    fn clone_repository<'a>(
        &'a self,
        url: &'a str,
        _destination: &'a Path,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CloneOutcome> {
        Box::pin(async move {
            let _guard = self.probe.as_ref().map(|p| p.enter());
            self.calls.lock().unwrap().push(url.to_string());

            if !pause(self.delay, cancel).await {
                return CloneOutcome::failed("git clone failed: cancelled", "", Duration::ZERO);
            }

            if self.book.lock().unwrap().should_fail(url) {
                CloneOutcome::failed(
                    "git clone failed: exit status: 128",
                    "fatal: repository not found",
                    Duration::from_millis(1),
                )
            } else {
                CloneOutcome::succeeded("Cloning into...", Duration::from_millis(1))
            }
        })
    }
}

/// Fake command executor keyed by command line.
#[derive(Default)]
pub struct FakeCommandExecutor {
    book: Mutex<ScriptBook>,
    calls: Mutex<Vec<(String, PathBuf)>>,
    delay: Option<Duration>,
}

impl FakeCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_always(self, command: &str) -> Self {
        self.book
            .lock()
            .unwrap()
            .scripts
            .insert(command.to_string(), Script::FailAlways);
        self
    }

    pub fn fail_times(self, command: &str, n: usize) -> Self {
        self.book
            .lock()
            .unwrap()
            .scripts
            .insert(command.to_string(), Script::FailTimes(n));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(command, working_dir)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|(cmd, _)| cmd).collect()
    }
}

impl CommandExecutor for FakeCommandExecutor {
    fn execute<'a>(
        &'a self,
        command: &'a str,
        working_dir: &'a Path,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, CommandResult> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), working_dir.to_path_buf()));

            if !pause(self.delay, cancel).await {
                return CommandResult::cancelled(command, Duration::ZERO);
            }

            if self.book.lock().unwrap().should_fail(command) {
                CommandResult::failed(
                    command,
                    1,
                    "exit status: 1",
                    String::new(),
                    "scripted failure".to_string(),
                    Duration::from_millis(1),
                )
            } else {
                CommandResult::succeeded(command, String::new(), String::new(), Duration::from_millis(1))
            }
        })
    }
}
