//! Scripted in-memory doubles for the session, cycle and controller tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::collector::procfs::IoSampler;
use crate::config::{ConnectionParams, SslMode};
use crate::model::{BackendRow, DbStats, DiskIoSample, RenderBuffer};
use crate::session::{PasswordPrompt, Session};
use crate::source::{Connector, DataSource, SourceError};
use crate::tui::Renderer;
use crate::tui::event::InputSource;
use crate::tui::screen::Screen;

pub fn params() -> ConnectionParams {
    ConnectionParams {
        host: Some("db.example.com".to_string()),
        port: 5432,
        user: "postgres".to_string(),
        dbname: "postgres".to_string(),
        password: None,
        service_name: None,
        sslmode: SslMode::Disable,
        rds_mode: false,
    }
}

pub fn backend(pid: i32, duration: f64) -> BackendRow {
    BackendRow {
        pid,
        application_name: "psql".to_string(),
        database: "app".to_string(),
        user: "app".to_string(),
        client: "local".to_string(),
        duration,
        state: "active".to_string(),
        query: "SELECT pg_sleep(10)".to_string(),
        ..BackendRow::default()
    }
}

#[derive(Default)]
struct Script {
    connects: VecDeque<Result<(), SourceError>>,
    passwords: Vec<Option<String>>,
    acquires: VecDeque<Result<Vec<BackendRow>, SourceError>>,
    acquisitions: Vec<&'static str>,
    db_stats: VecDeque<Result<DbStats, SourceError>>,
    db_stats_skips: Vec<bool>,
    active: i64,
    is_local: bool,
    local_access: bool,
    local_access_checks: usize,
}

/// Shared handle on what the fake source was told and asked.
#[derive(Clone, Default)]
pub struct Calls(Rc<RefCell<Script>>);

impl Calls {
    /// Queues the outcome of the next connect; the default is success.
    pub fn push_connect(&self, result: Result<(), SourceError>) {
        self.0.borrow_mut().connects.push_back(result);
    }

    /// Passwords passed to each connect attempt.
    pub fn passwords(&self) -> Vec<Option<String>> {
        self.0.borrow().passwords.clone()
    }

    /// Queues the outcome of the next acquisition; the default is no rows.
    pub fn push_acquire(&self, result: Result<Vec<BackendRow>, SourceError>) {
        self.0.borrow_mut().acquires.push_back(result);
    }

    /// Drains the names of the acquisition calls made so far.
    pub fn take_acquisitions(&self) -> Vec<&'static str> {
        std::mem::take(&mut self.0.borrow_mut().acquisitions)
    }

    pub fn push_db_stats(&self, result: Result<DbStats, SourceError>) {
        self.0.borrow_mut().db_stats.push_back(result);
    }

    /// `skip_sizes` argument of each `db_stats` call.
    pub fn db_stats_skips(&self) -> Vec<bool> {
        self.0.borrow().db_stats_skips.clone()
    }

    pub fn set_active(&self, active: i64) {
        self.0.borrow_mut().active = active;
    }

    pub fn set_local(&self, is_local: bool, local_access: bool) {
        let mut script = self.0.borrow_mut();
        script.is_local = is_local;
        script.local_access = local_access;
    }

    pub fn local_access_checks(&self) -> usize {
        self.0.borrow().local_access_checks
    }
}

pub struct FakeConnector {
    calls: Calls,
}

impl FakeConnector {
    /// Connector whose connects and calls succeed unless scripted otherwise.
    pub fn healthy() -> Self {
        Self {
            calls: Calls::default(),
        }
    }

    pub fn calls(&self) -> Calls {
        self.calls.clone()
    }
}

impl Connector for FakeConnector {
    type Source = FakeSource;

    fn connect(
        &mut self,
        _params: &ConnectionParams,
        password: Option<&str>,
    ) -> Result<FakeSource, SourceError> {
        let mut script = self.calls.0.borrow_mut();
        script.passwords.push(password.map(str::to_string));
        script.connects.pop_front().unwrap_or(Ok(()))?;
        Ok(FakeSource {
            calls: self.calls.clone(),
        })
    }
}

pub struct FakeSource {
    calls: Calls,
}

impl FakeSource {
    fn acquire(&mut self, name: &'static str) -> Result<Vec<BackendRow>, SourceError> {
        let mut script = self.calls.0.borrow_mut();
        script.acquisitions.push(name);
        script.acquires.pop_front().unwrap_or(Ok(Vec::new()))
    }
}

impl DataSource for FakeSource {
    fn activities(&mut self) -> Result<Vec<BackendRow>, SourceError> {
        self.acquire("activities")
    }

    fn waiting(&mut self) -> Result<Vec<BackendRow>, SourceError> {
        self.acquire("waiting")
    }

    fn blocking(&mut self) -> Result<Vec<BackendRow>, SourceError> {
        self.acquire("blocking")
    }

    fn db_stats(&mut self, skip_sizes: bool) -> Result<DbStats, SourceError> {
        let mut script = self.calls.0.borrow_mut();
        script.db_stats_skips.push(skip_sizes);
        script.db_stats.pop_front().unwrap_or(Ok(DbStats {
            xact_total: 0,
            total_size: if skip_sizes { None } else { Some(0) },
            max_name_length: 8,
        }))
    }

    fn active_connections(&mut self) -> Result<i64, SourceError> {
        Ok(self.calls.0.borrow().active)
    }

    fn server_identity(&mut self) -> Result<String, SourceError> {
        Ok("PostgreSQL 16.4".to_string())
    }

    fn is_local(&self) -> bool {
        self.calls.0.borrow().is_local
    }

    fn has_local_access(&mut self) -> Result<bool, SourceError> {
        let mut script = self.calls.0.borrow_mut();
        script.local_access_checks += 1;
        Ok(script.local_access)
    }
}

pub fn connected_session(connector: FakeConnector) -> Session<FakeConnector> {
    let mut session = Session::new(connector, params());
    session.connect(true).unwrap();
    session
}

/// Prompt answering from a fixed list.
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Rc<Cell<usize>>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> (Self, Rc<Cell<usize>>) {
        let asked = Rc::new(Cell::new(0));
        let prompt = Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            asked: Rc::clone(&asked),
        };
        (prompt, asked)
    }
}

impl PasswordPrompt for ScriptedPrompt {
    fn prompt(&mut self, _params: &ConnectionParams) -> io::Result<String> {
        self.asked.set(self.asked.get() + 1);
        self.answers
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more answers"))
    }
}

/// Renderer that keeps every buffer it was handed.
pub struct RecordingRenderer {
    rendered: Rc<RefCell<Vec<RenderBuffer>>>,
    resizes: VecDeque<bool>,
    fail: bool,
    clears: Rc<Cell<usize>>,
}

impl RecordingRenderer {
    pub fn new() -> (Self, Rc<RefCell<Vec<RenderBuffer>>>) {
        let rendered = Rc::new(RefCell::new(Vec::new()));
        let renderer = Self {
            rendered: Rc::clone(&rendered),
            resizes: VecDeque::new(),
            fail: false,
            clears: Rc::new(Cell::new(0)),
        };
        (renderer, rendered)
    }

    /// Queues answers to `check_resized`; the default is `false`.
    pub fn push_resize(&mut self, resized: bool) {
        self.resizes.push_back(resized);
    }

    /// Makes every render fail.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn clears(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.clears)
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, buffer: &RenderBuffer) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::other("terminal gone"));
        }
        self.rendered.borrow_mut().push(buffer.clone());
        Ok(())
    }

    fn check_resized(&mut self) -> io::Result<bool> {
        Ok(self.resizes.pop_front().unwrap_or(false))
    }

    fn clear(&mut self) -> io::Result<()> {
        self.clears.set(self.clears.get() + 1);
        Ok(())
    }
}

/// Screen counting terminal mode transitions.
#[derive(Clone, Default)]
pub struct CountingScreen {
    pub enters: Arc<AtomicUsize>,
    pub leaves: Arc<AtomicUsize>,
}

impl CountingScreen {
    pub fn enters(&self) -> usize {
        self.enters.load(Ordering::SeqCst)
    }

    pub fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }
}

impl Screen for CountingScreen {
    fn enter(&self) -> io::Result<()> {
        self.enters.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn leave(&self) -> io::Result<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Disk sampler returning queued samples.
pub struct ScriptedSampler {
    samples: VecDeque<DiskIoSample>,
    calls: Rc<Cell<usize>>,
}

impl ScriptedSampler {
    pub fn new(samples: &[(u64, u64)]) -> (Self, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let sampler = Self {
            samples: samples
                .iter()
                .map(|&(read_bytes, write_bytes)| DiskIoSample {
                    read_bytes,
                    write_bytes,
                })
                .collect(),
            calls: Rc::clone(&calls),
        };
        (sampler, calls)
    }
}

impl IoSampler for ScriptedSampler {
    fn sample(&mut self) -> io::Result<DiskIoSample> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.samples.pop_front().unwrap_or_default())
    }
}

/// Key source replaying a fixed sequence, then pressing `q`.
///
/// `KeyCode::Null` stands for a slice without input: the call sleeps for
/// the whole timeout and returns `None`.
pub struct ScriptedInput {
    keys: VecDeque<KeyEvent>,
}

impl ScriptedInput {
    pub fn new(keys: &[KeyCode]) -> Self {
        Self {
            keys: keys
                .iter()
                .map(|&code| KeyEvent::new(code, KeyModifiers::NONE))
                .collect(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<KeyEvent>> {
        match self.keys.pop_front() {
            Some(key) if key.code == KeyCode::Null => {
                std::thread::sleep(timeout);
                Ok(None)
            }
            Some(key) => Ok(Some(key)),
            None => Ok(Some(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE))),
        }
    }
}
