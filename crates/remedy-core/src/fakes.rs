//! In-memory fakes for the core seams (testing only)
//!
//! - `MemoryNotifier`: captures alerts instead of sending them
//! - `ScriptedTestRunner`: returns canned suite results
//! - `MemorySourceControl`: branch/commit model without a real repository
//! - `StaticHealthProbe`: fixed or scripted health results

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use remedy_state::HealthCheckResult;

use crate::domain::{NotifyError, RemedyError, Result};
use crate::git::SourceControl;
use crate::health::HealthProbe;
use crate::notify::{AlertMessage, Notifier};
use crate::test_runner::{SuiteKind, SuiteResult, TargetedTestReport, TestRunReport, TestRunner};

// ---------------------------------------------------------------------------
// MemoryNotifier
// ---------------------------------------------------------------------------

/// Records every message it is asked to send.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<AlertMessage>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Titles of sent messages, in order.
    pub fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.title.clone())
            .collect()
    }

    /// Whether any sent title contains `needle`.
    pub fn has_title(&self, needle: &str) -> bool {
        self.titles().iter().any(|t| t.contains(needle))
    }

    /// Fail the next send with `NotifyError::Delivery(reason)`.
    pub fn fail_next(&self, reason: &str) {
        *self.fail_next.lock().unwrap() = Some(reason.to_string());
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, message: &AlertMessage) -> std::result::Result<(), NotifyError> {
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(NotifyError::Delivery(reason));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedTestRunner
// ---------------------------------------------------------------------------

/// Test runner that never spawns anything.
#[derive(Debug)]
pub struct ScriptedTestRunner {
    failing: Mutex<HashSet<SuiteKind>>,
    runs: AtomicUsize,
}

impl ScriptedTestRunner {
    pub fn passing() -> Self {
        Self {
            failing: Mutex::new(HashSet::new()),
            runs: AtomicUsize::new(0),
        }
    }

    /// Unit tests fail.
    pub fn failing() -> Self {
        Self::failing_suites(&[SuiteKind::Unit])
    }

    pub fn failing_suites(kinds: &[SuiteKind]) -> Self {
        Self {
            failing: Mutex::new(kinds.iter().copied().collect()),
            runs: AtomicUsize::new(0),
        }
    }

    /// Number of `run_all_tests` calls.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn suite(&self, kind: SuiteKind) -> SuiteResult {
        let passed = !self.failing.lock().unwrap().contains(&kind);
        SuiteResult {
            kind,
            passed,
            exit_code: Some(if passed { 0 } else { 1 }),
            output: if passed {
                format!("{} ok", kind.name())
            } else {
                format!("{} failed: 1 error", kind.name())
            },
            duration_ms: 1,
            timed_out: false,
            note: None,
        }
    }
}

#[async_trait]
impl TestRunner for ScriptedTestRunner {
    async fn run_all_tests(&self) -> TestRunReport {
        self.runs.fetch_add(1, Ordering::SeqCst);
        TestRunReport::from_suites(
            self.suite(SuiteKind::Unit),
            self.suite(SuiteKind::Integration),
            self.suite(SuiteKind::TypeCheck),
            self.suite(SuiteKind::Lint),
            4,
        )
    }

    async fn run_tests_for_files(&self, files: &[String]) -> TargetedTestReport {
        if files.is_empty() {
            return TargetedTestReport::nothing_to_run();
        }
        let suite = self.suite(SuiteKind::Unit);
        TargetedTestReport {
            success: suite.passed,
            test_files: files.to_vec(),
            suite: Some(suite),
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySourceControl
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ScmState {
    current: String,
    branches: HashMap<String, Vec<String>>,
    failures: HashSet<String>,
    next_commit: usize,
    aborted_merges: usize,
}

/// Branches as first-parent chains of commit ids. A merge appends one merge
/// commit to the target chain, so `HEAD~1` after a merge is the previous
/// head, as with `git merge --no-ff`.
///
/// Failures are injected per operation: `"current_branch"`, `"head"`,
/// `"merge"`, `"reset"`, or `"switch:<branch>"`.
#[derive(Debug)]
pub struct MemorySourceControl {
    state: Mutex<ScmState>,
}

impl MemorySourceControl {
    pub fn new(main_branch: &str) -> Self {
        let mut branches = HashMap::new();
        branches.insert(main_branch.to_string(), vec!["c0".to_string()]);
        Self {
            state: Mutex::new(ScmState {
                current: main_branch.to_string(),
                branches,
                failures: HashSet::new(),
                next_commit: 1,
                aborted_merges: 0,
            }),
        }
    }

    /// Create `name` from the current branch plus one patch commit.
    pub fn add_branch(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let mut commits = state
            .branches
            .get(&state.current)
            .cloned()
            .unwrap_or_default();
        let id = format!("c{}", state.next_commit);
        state.next_commit += 1;
        commits.push(id);
        state.branches.insert(name.to_string(), commits);
    }

    /// Move `HEAD` without going through failure injection.
    pub fn switch_to(&self, name: &str) {
        self.state.lock().unwrap().current = name.to_string();
    }

    pub fn fail_operation(&self, op: &str) {
        self.state.lock().unwrap().failures.insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn current(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    pub fn branch_head(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .branches
            .get(name)
            .and_then(|c| c.last().cloned())
    }

    pub fn aborted_merges(&self) -> usize {
        self.state.lock().unwrap().aborted_merges
    }

    fn check(state: &ScmState, op: &str) -> Result<()> {
        if state.failures.contains(op) {
            return Err(RemedyError::Git(format!("injected failure: {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceControl for MemorySourceControl {
    async fn current_branch(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        Self::check(&state, "current_branch")?;
        Ok(state.current.clone())
    }

    async fn head_commit(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        Self::check(&state, "head")?;
        state
            .branches
            .get(&state.current)
            .and_then(|c| c.last().cloned())
            .ok_or_else(|| RemedyError::Git("branch has no commits".to_string()))
    }

    async fn switch_branch(&self, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, &format!("switch:{branch}"))?;
        if !state.branches.contains_key(branch) {
            return Err(RemedyError::Git(format!("unknown branch {branch}")));
        }
        state.current = branch.to_string();
        Ok(())
    }

    async fn merge(&self, branch: &str, _message: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "merge")?;
        if !state.branches.contains_key(branch) {
            return Err(RemedyError::Git(format!("unknown branch {branch}")));
        }
        let merge_id = format!("m{}", state.next_commit);
        state.next_commit += 1;
        let current = state.current.clone();
        state
            .branches
            .get_mut(&current)
            .ok_or_else(|| RemedyError::Git(format!("unknown branch {current}")))?
            .push(merge_id);
        Ok(())
    }

    async fn abort_merge(&self) -> Result<()> {
        self.state.lock().unwrap().aborted_merges += 1;
        Ok(())
    }

    /// Accepts `HEAD~1` or a commit id on the current branch's first-parent
    /// chain.
    async fn reset_hard(&self, commit: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check(&state, "reset")?;
        let current = state.current.clone();
        let chain = state
            .branches
            .get_mut(&current)
            .ok_or_else(|| RemedyError::Git(format!("unknown branch {current}")))?;
        if commit == "HEAD~1" {
            if chain.len() < 2 {
                return Err(RemedyError::Git("HEAD has no parent".to_string()));
            }
            chain.pop();
            return Ok(());
        }
        let Some(pos) = chain.iter().position(|c| c == commit) else {
            return Err(RemedyError::Git(format!("unknown revision {commit}")));
        };
        chain.truncate(pos + 1);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticHealthProbe
// ---------------------------------------------------------------------------

/// Health probe returning scripted results, then a fixed fallback.
#[derive(Debug)]
pub struct StaticHealthProbe {
    script: Mutex<VecDeque<HealthCheckResult>>,
    fallback: HealthCheckResult,
    probes: AtomicUsize,
}

impl StaticHealthProbe {
    pub fn healthy() -> Self {
        Self::with_fallback(HealthCheckResult::from_probes(true, true, true, Vec::new()))
    }

    /// Endpoints down.
    pub fn unhealthy() -> Self {
        Self::with_fallback(HealthCheckResult::from_probes(
            true,
            true,
            false,
            vec!["endpoint http://127.0.0.1:5000/api/health returned 503".to_string()],
        ))
    }

    fn with_fallback(fallback: HealthCheckResult) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            probes: AtomicUsize::new(0),
        }
    }

    /// Return `results` in order before falling back.
    pub fn then(self, results: Vec<HealthCheckResult>) -> Self {
        *self.script.lock().unwrap() = results.into();
        self
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for StaticHealthProbe {
    async fn probe(&self) -> HealthCheckResult {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let mut result = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        result.checked_at = chrono::Utc::now();
        result
    }
}
