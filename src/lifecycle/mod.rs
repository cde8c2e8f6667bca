//! Top-level control loop.
//!
//! ```text
//! Running ──connection lost──▶ Reconnecting ──connected──▶ Running
//! Running | Reconnecting ──quit key / signal──▶ Stopping
//! ```
//!
//! Fatal conditions leave the loop directly. [`Controller::run`] releases
//! the terminal through the shared [`ScreenGuard`] on every way out.

mod signal;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossterm::event::KeyEvent;
use tracing::{debug, error, info, warn};

use crate::collector::merger::ProcessMerger;
use crate::collector::procfs::IoSampler;
use crate::config::{REFRESH_STEP, clamp_refresh};
use crate::error::AppError;
use crate::export::Exporter;
use crate::poll::{CycleError, PollCycle};
use crate::session::{Session, SessionError};
use crate::source::Connector;
use crate::tui::{InputSource, KeyAction, Renderer, ScreenGuard, handle_key};

pub use signal::install_signal_handler;

/// Delay between reconnect attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
/// Granularity of every wait; the shutdown flag is checked in between.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Running,
    Reconnecting,
    Stopping,
}

/// How the run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Exit {
    /// Operator quit or termination signal.
    Clean,
    Fatal(AppError),
}

impl Exit {
    pub fn code(&self) -> i32 {
        match self {
            Exit::Clean => 0,
            Exit::Fatal(e) => e.exit_code(),
        }
    }
}

/// Owns the session, the cycle and the terminal for the whole run.
pub struct Controller<C, M, S, R, I>
where
    C: Connector,
    M: ProcessMerger,
    S: IoSampler,
    R: Renderer,
    I: InputSource,
{
    session: Session<C>,
    cycle: PollCycle<M, S>,
    renderer: R,
    input: I,
    guard: Arc<ScreenGuard>,
    shutdown: Arc<AtomicBool>,
    exporter: Option<Exporter>,
    refresh: Duration,
    backoff: Duration,
    paused: bool,
    state: ControllerState,
}

impl<C, M, S, R, I> Controller<C, M, S, R, I>
where
    C: Connector,
    M: ProcessMerger,
    S: IoSampler,
    R: Renderer,
    I: InputSource,
{
    /// `session` must already be connected.
    pub fn new(
        session: Session<C>,
        cycle: PollCycle<M, S>,
        renderer: R,
        input: I,
        guard: Arc<ScreenGuard>,
        shutdown: Arc<AtomicBool>,
        refresh: Duration,
    ) -> Self {
        Self {
            session,
            cycle,
            renderer,
            input,
            guard,
            shutdown,
            exporter: None,
            refresh,
            backoff: RECONNECT_BACKOFF,
            paused: false,
            state: ControllerState::Running,
        }
    }

    pub fn with_exporter(mut self, exporter: Exporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn refresh(&self) -> Duration {
        self.refresh
    }

    /// Runs until quit, signal or a fatal error. The terminal mode is
    /// released before this returns.
    pub fn run(&mut self) -> Exit {
        let exit = self.drive();
        self.guard.release();
        match &exit {
            Exit::Clean => info!("shutting down"),
            Exit::Fatal(e) => error!("fatal: {}", e.detail()),
        }
        exit
    }

    fn drive(&mut self) -> Exit {
        if let Err(e) = self.guard.acquire() {
            return Exit::Fatal(AppError::Display(e.to_string()));
        }

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.state = ControllerState::Stopping;
            }
            let outcome = match self.state {
                ControllerState::Running => self.running(),
                ControllerState::Reconnecting => self.reconnecting(),
                ControllerState::Stopping => return Exit::Clean,
            };
            if let Some(exit) = outcome {
                return exit;
            }
        }
    }

    /// One cycle (unless paused) followed by the wait for the next one.
    fn running(&mut self) -> Option<Exit> {
        if !self.paused {
            let shutdown = &self.shutdown;
            let guard = &self.guard;
            let interrupted = || shutdown.load(Ordering::SeqCst) || !guard.is_active();
            match self
                .cycle
                .execute_unless(&mut self.session, &mut self.renderer, interrupted)
            {
                Ok(buffer) => {
                    if let Some(exporter) = self.exporter.as_mut()
                        && let Err(e) = exporter.write_snapshot(&buffer)
                    {
                        return Some(Exit::Fatal(AppError::Unclassified(format!(
                            "snapshot export failed: {}",
                            e
                        ))));
                    }
                }
                Err(CycleError::Interrupted) => {
                    self.state = ControllerState::Stopping;
                    return None;
                }
                Err(e) => match e.into_fatal() {
                    Some(fatal) => return Some(Exit::Fatal(fatal)),
                    None => {
                        self.state = ControllerState::Reconnecting;
                        return None;
                    }
                },
            }
        }
        self.wait_for_input()
    }

    /// Waits out the refresh delay in slices, handling keys. Returns early
    /// when a key asks for an immediate cycle.
    ///
    /// The deadline follows refresh changes made during the wait, so the
    /// next cycle is always one refresh delay after this one.
    fn wait_for_input(&mut self) -> Option<Exit> {
        let started = Instant::now();
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.state = ControllerState::Stopping;
                return None;
            }
            let remaining = (started + self.refresh).saturating_duration_since(Instant::now());
            if remaining.is_zero() && !self.paused {
                return None;
            }
            let slice = if self.paused {
                WAIT_SLICE
            } else {
                remaining.min(WAIT_SLICE)
            };

            match self.input.next_key(slice) {
                Ok(Some(key)) => {
                    if self.on_key(key) {
                        return None;
                    }
                }
                Ok(None) => {}
                Err(e) => return Some(Exit::Fatal(AppError::Display(e.to_string()))),
            }
        }
    }

    /// Applies a key. Returns `true` if the next cycle should start now.
    ///
    /// A cycle started early is less than one refresh delay after the
    /// previous one, so rates restart from it.
    fn on_key(&mut self, key: KeyEvent) -> bool {
        match handle_key(key) {
            KeyAction::Quit => {
                info!("quit requested");
                self.state = ControllerState::Stopping;
                true
            }
            KeyAction::SwitchMode(mode) => {
                if mode == self.cycle.mode() {
                    return false;
                }
                self.cycle.set_mode(mode);
                self.cycle.restart_rates();
                true
            }
            KeyAction::TogglePause => {
                self.paused = !self.paused;
                debug!("paused: {}", self.paused);
                self.cycle.restart_rates();
                true
            }
            KeyAction::SlowDown => {
                self.set_refresh(clamp_refresh(self.refresh + REFRESH_STEP));
                false
            }
            KeyAction::SpeedUp => {
                self.set_refresh(clamp_refresh(self.refresh.saturating_sub(REFRESH_STEP)));
                false
            }
            KeyAction::None => false,
        }
    }

    fn set_refresh(&mut self, refresh: Duration) {
        if refresh != self.refresh {
            debug!("refresh delay: {:?}", refresh);
            self.refresh = refresh;
            self.cycle.set_refresh(refresh);
        }
    }

    /// Terminal released, retry connect every `backoff` until it succeeds,
    /// then re-enter terminal mode.
    fn reconnecting(&mut self) -> Option<Exit> {
        self.guard.release();
        let identity = self.session.params().identity();
        warn!("connection to {} lost, reconnecting", identity);
        eprintln!("rpgtop: connection to {} lost, reconnecting...", identity);

        let mut attempts: u64 = 0;
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                self.state = ControllerState::Stopping;
                return None;
            }
            attempts += 1;
            match self.session.connect(false) {
                Ok(()) => break,
                Err(SessionError::ConnectionFailed(msg)) => {
                    debug!("reconnect attempt {} failed: {}", attempts, msg);
                    self.sleep(self.backoff);
                }
                Err(SessionError::Fatal(e)) => return Some(Exit::Fatal(e)),
            }
        }
        info!("reconnected after {} attempt(s)", attempts);

        if let Err(e) = self.guard.acquire() {
            return Some(Exit::Fatal(AppError::Display(e.to_string())));
        }
        if let Err(e) = self.renderer.clear() {
            return Some(Exit::Fatal(AppError::Display(e.to_string())));
        }
        self.cycle.reconnected();
        self.state = ControllerState::Running;
        None
    }

    /// Sleeps up to `total`, waking early on shutdown.
    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(remaining.min(WAIT_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::merger::ProcMerger;
    use crate::collector::mock::{MockFs, postgres_host};
    use crate::config::DisplayFlags;
    use crate::model::{Extras, RenderBuffer};
    use crate::poll::CycleOptions;
    use crate::source::SourceError;
    use crate::testing::{
        Calls, CountingScreen, FakeConnector, RecordingRenderer, ScriptedInput, ScriptedSampler,
        backend, connected_session,
    };
    use crossterm::event::KeyCode;
    use crate::model::DiskIoDelta;
    use std::cell::{Cell, RefCell};
    use std::io::{self, Write};
    use std::rc::Rc;

    type TestController = Controller<
        FakeConnector,
        ProcMerger<MockFs>,
        ScriptedSampler,
        RecordingRenderer,
        ScriptedInput,
    >;

    struct Harness {
        controller: TestController,
        calls: Calls,
        screen: CountingScreen,
        rendered: Rc<RefCell<Vec<RenderBuffer>>>,
        clears: Rc<Cell<usize>>,
        shutdown: Arc<AtomicBool>,
    }

    fn harness(fs: MockFs, local_access: bool, keys: &[KeyCode]) -> Harness {
        sampling_harness(fs, local_access, &[], keys)
    }

    fn sampling_harness(
        fs: MockFs,
        local_access: bool,
        samples: &[(u64, u64)],
        keys: &[KeyCode],
    ) -> Harness {
        let connector = FakeConnector::healthy();
        let calls = connector.calls();
        let session = connected_session(connector);

        let (sampler, _) = ScriptedSampler::new(samples);
        let cycle = PollCycle::new(
            ProcMerger::new(fs, "/proc"),
            sampler,
            local_access,
            Extras::default(),
            CycleOptions {
                flags: DisplayFlags::default(),
                skip_sizes: false,
                refresh: Duration::from_millis(500),
            },
        );
        let (renderer, rendered) = RecordingRenderer::new();
        let clears = renderer.clears();
        let screen = CountingScreen::default();
        let guard = Arc::new(ScreenGuard::new(screen.clone()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let controller = Controller::new(
            session,
            cycle,
            renderer,
            ScriptedInput::new(keys),
            guard,
            Arc::clone(&shutdown),
            Duration::from_millis(500),
        )
        .with_backoff(Duration::ZERO);

        Harness {
            controller,
            calls,
            screen,
            rendered,
            clears,
            shutdown,
        }
    }

    fn remote(keys: &[KeyCode]) -> Harness {
        harness(MockFs::new(), false, keys)
    }

    #[test]
    fn quit_key_exits_cleanly_and_releases_once() {
        let mut h = remote(&[]);
        assert_eq!(h.controller.run(), Exit::Clean);

        assert_eq!(h.rendered.borrow().len(), 1);
        assert_eq!(h.controller.state(), ControllerState::Stopping);
        assert_eq!(h.screen.enters(), 1);
        assert_eq!(h.screen.leaves(), 1);
    }

    #[test]
    fn shutdown_flag_stops_before_next_cycle() {
        let mut h = remote(&[]);
        h.shutdown.store(true, Ordering::SeqCst);

        assert_eq!(h.controller.run(), Exit::Clean);
        assert!(h.rendered.borrow().is_empty());
        assert_eq!(h.screen.leaves(), 1);
    }

    #[test]
    fn connection_loss_reconnects_and_resumes() {
        let mut h = remote(&[]);
        h.calls
            .push_acquire(Err(SourceError::Connection("terminating connection".into())));
        h.calls
            .push_connect(Err(SourceError::Connection("refused".into())));
        h.calls
            .push_connect(Err(SourceError::Connection("refused".into())));

        assert_eq!(h.controller.run(), Exit::Clean);

        // Initial connect, two failed attempts, one success.
        assert_eq!(h.calls.passwords().len(), 4);
        assert_eq!(h.rendered.borrow().len(), 1);
        assert_eq!(h.screen.enters(), 2);
        assert_eq!(h.screen.leaves(), 2);
        assert_eq!(h.clears.get(), 1);
    }

    #[test]
    fn auth_failure_during_reconnect_is_fatal() {
        let mut h = remote(&[]);
        h.calls
            .push_acquire(Err(SourceError::Connection("reset".into())));
        h.calls
            .push_connect(Err(SourceError::Authentication("password missing".into())));

        let exit = h.controller.run();
        assert!(matches!(exit, Exit::Fatal(AppError::Config(_))));
        assert_eq!(exit.code(), 1);
        assert_eq!(h.screen.enters(), 1);
        assert_eq!(h.screen.leaves(), 1);
    }

    #[test]
    fn permission_denied_is_fatal_and_releases() {
        let mut fs = postgres_host();
        fs.deny("/proc/1001/io");
        let mut h = harness(fs, true, &[]);
        h.calls.push_acquire(Ok(vec![backend(1001, 1.0)]));

        let exit = h.controller.run();
        assert!(matches!(
            exit,
            Exit::Fatal(AppError::PermissionDenied { pid: 1001, .. })
        ));
        assert!(h.rendered.borrow().is_empty());
        assert_eq!(h.screen.leaves(), 1);
    }

    #[test]
    fn mode_key_switches_acquisition() {
        let mut h = remote(&[KeyCode::F(3)]);
        assert_eq!(h.controller.run(), Exit::Clean);

        assert_eq!(h.calls.take_acquisitions(), vec!["activities", "blocking"]);
        let rendered = h.rendered.borrow();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[1].mode, crate::mode::Mode::Blocking);
    }

    #[test]
    fn pause_skips_cycles() {
        let mut h = remote(&[KeyCode::Char(' '), KeyCode::Char('1')]);
        assert_eq!(h.controller.run(), Exit::Clean);
        assert_eq!(h.rendered.borrow().len(), 1);
    }

    fn local(samples: &[(u64, u64)], keys: &[KeyCode]) -> Harness {
        sampling_harness(postgres_host(), true, samples, keys)
    }

    #[test]
    fn scheduled_cycle_divides_by_refresh() {
        // Five idle slices of 100ms cover the 500ms refresh delay.
        let mut h = local(&[(100, 50), (180, 90)], &[KeyCode::Null; 5]);
        assert_eq!(h.controller.run(), Exit::Clean);

        let rendered = h.rendered.borrow();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[1].interval, 0.5);
        assert_eq!(
            rendered[1].io,
            Some(DiskIoDelta {
                read_per_sec: 160.0,
                write_per_sec: 80.0,
            })
        );
    }

    #[test]
    fn mode_key_cycle_reports_no_rates() {
        let mut h = local(&[(100, 50), (180, 90)], &[KeyCode::F(2)]);
        assert_eq!(h.controller.run(), Exit::Clean);

        let rendered = h.rendered.borrow();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[1].io, None);
        assert_eq!(rendered[1].interval, 0.0);
        assert_eq!(rendered[1].db_info.tps, 0.0);
    }

    #[test]
    fn unpause_cycle_reports_no_rates() {
        let mut h = local(
            &[(100, 50), (180, 90)],
            &[KeyCode::Char(' '), KeyCode::Null, KeyCode::Char(' ')],
        );
        assert_eq!(h.controller.run(), Exit::Clean);

        let rendered = h.rendered.borrow();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[1].io, None);
        assert_eq!(rendered[1].interval, 0.0);
    }

    /// Renderer that receives a termination signal while the cycle runs.
    struct SignalledRenderer {
        shutdown: Arc<AtomicBool>,
        guard: Arc<ScreenGuard>,
        renders: Rc<Cell<usize>>,
    }

    impl Renderer for SignalledRenderer {
        fn render(&mut self, _buffer: &RenderBuffer) -> io::Result<()> {
            self.renders.set(self.renders.get() + 1);
            Ok(())
        }

        fn check_resized(&mut self) -> io::Result<bool> {
            self.shutdown.store(true, Ordering::SeqCst);
            self.guard.release();
            Ok(false)
        }
    }

    #[test]
    fn signal_mid_cycle_skips_render() {
        let session = connected_session(FakeConnector::healthy());
        let (sampler, _) = ScriptedSampler::new(&[]);
        let cycle = PollCycle::new(
            ProcMerger::new(MockFs::new(), "/proc"),
            sampler,
            false,
            Extras::default(),
            CycleOptions {
                flags: DisplayFlags::default(),
                skip_sizes: false,
                refresh: Duration::from_millis(500),
            },
        );
        let screen = CountingScreen::default();
        let guard = Arc::new(ScreenGuard::new(screen.clone()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let renders = Rc::new(Cell::new(0));
        let renderer = SignalledRenderer {
            shutdown: Arc::clone(&shutdown),
            guard: Arc::clone(&guard),
            renders: Rc::clone(&renders),
        };
        let mut controller = Controller::new(
            session,
            cycle,
            renderer,
            ScriptedInput::new(&[]),
            guard,
            shutdown,
            Duration::from_millis(500),
        );

        assert_eq!(controller.run(), Exit::Clean);
        assert_eq!(renders.get(), 0);
        assert_eq!(screen.enters(), 1);
        assert_eq!(screen.leaves(), 1);
    }

    #[test]
    fn refresh_keys_stay_in_range() {
        let mut h = remote(&[
            KeyCode::Char('+'),
            KeyCode::Char('+'),
            KeyCode::Char('-'),
            KeyCode::Char('-'),
            KeyCode::Char('-'),
        ]);
        h.controller.run();
        assert_eq!(h.controller.refresh(), Duration::from_millis(500));

        let keys = vec![KeyCode::Char('+'); 20];
        let mut h = remote(&keys);
        h.controller.run();
        assert_eq!(h.controller.refresh(), Duration::from_secs(5));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn export_failure_is_unclassified() {
        let h = remote(&[]);
        h.calls.push_acquire(Ok(vec![backend(7, 3.0)]));
        let mut controller = h.controller.with_exporter(Exporter::from_writer(BrokenPipe));

        let exit = controller.run();
        assert!(matches!(exit, Exit::Fatal(AppError::Unclassified(_))));
        assert_eq!(h.screen.leaves(), 1);
    }

    #[test]
    fn render_failure_is_display_error() {
        let connector = FakeConnector::healthy();
        let session = connected_session(connector);
        let (sampler, _) = ScriptedSampler::new(&[]);
        let cycle = PollCycle::new(
            ProcMerger::new(MockFs::new(), "/proc"),
            sampler,
            false,
            Extras::default(),
            CycleOptions {
                flags: DisplayFlags::default(),
                skip_sizes: true,
                refresh: Duration::from_millis(500),
            },
        );
        let (renderer, _) = RecordingRenderer::new();
        let screen = CountingScreen::default();
        let mut controller = Controller::new(
            session,
            cycle,
            renderer.failing(),
            ScriptedInput::new(&[]),
            Arc::new(ScreenGuard::new(screen.clone())),
            Arc::new(AtomicBool::new(false)),
            Duration::from_millis(500),
        );

        let exit = controller.run();
        assert!(matches!(exit, Exit::Fatal(AppError::Display(_))));
        assert_eq!(screen.enters(), 1);
        assert_eq!(screen.leaves(), 1);
    }
}
