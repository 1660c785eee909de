//! HMD render loop and session lifecycle
//!
//! The HMD side of the engine runs on its own thread and cycles a session
//! through Closed -> Open -> Closed:
//!
//! - Closed: try to connect. Failure is routine (no headset attached); the
//!   loop idles for [`RETRY_INTERVAL`] and tries again.
//! - Open: render frames. When the runtime asks to quit, the session and
//!   everything built on it are torn down and the loop returns to Closed.
//!   Any error while the session is open is fatal to the loop.
//!
//! [`VrLoop`] holds the state machine itself, one observable step at a
//! time; [`VrWorker`] owns the thread that drives it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::shared_state::SharedState;
use crate::vr::driver::{ConnectError, VrError};

/// How long the loop sleeps between connection attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session; the loop periodically attempts to connect.
    Closed,
    /// A session is open and rendering.
    Open,
}

/// What the loop should do before the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Step again immediately; frame timing comes from the compositor.
    Frame,
    /// Nothing to do; sleep for [`RETRY_INTERVAL`] first.
    Idle,
}

/// Outcome of rendering one session frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Keep rendering.
    Continue,
    /// The runtime asked the application to release the session.
    QuitRequested,
}

/// Creates session resources on demand.
///
/// The production implementation opens the HMD driver session and builds
/// the Vulkan resources rendering into it; tests substitute mocks.
pub trait SessionFactory: Send {
    /// The session resource bundle this factory creates.
    type Session: VrSession + Send;

    /// Attempt to open a session.
    fn connect(&mut self) -> Result<Self::Session, ConnectError>;
}

/// An open session's per-frame work.
pub trait VrSession {
    /// Render and submit one stereo frame, publishing poses to `shared`.
    fn render_frame(&mut self, shared: &SharedState) -> Result<SessionEvent, VrError>;
}

/// The Closed/Open session state machine.
pub struct VrLoop<F: SessionFactory> {
    factory: F,
    session: Option<F::Session>,
    shared: Arc<SharedState>,
}

impl<F: SessionFactory> VrLoop<F> {
    /// Start in the Closed phase.
    pub fn new(factory: F, shared: Arc<SharedState>) -> Self {
        Self {
            factory,
            session: None,
            shared,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        if self.session.is_some() {
            Phase::Open
        } else {
            Phase::Closed
        }
    }

    /// Advance the state machine by one step.
    ///
    /// In Closed this is one connection attempt; in Open it is one rendered
    /// frame. A connect failure is not an error, it just paces the retry.
    /// An error from an open session tears the session down and propagates.
    pub fn step(&mut self) -> Result<Pacing, VrError> {
        match self.session.as_mut() {
            None => match self.factory.connect() {
                Ok(session) => {
                    log::info!("HMD session opened");
                    self.session = Some(session);
                    Ok(Pacing::Frame)
                }
                Err(ConnectError::NotPresent) => {
                    log::debug!("No HMD present, retrying in {:?}", RETRY_INTERVAL);
                    Ok(Pacing::Idle)
                }
                Err(err) => {
                    log::warn!("HMD connection failed: {err}, retrying in {:?}", RETRY_INTERVAL);
                    Ok(Pacing::Idle)
                }
            },
            Some(session) => match session.render_frame(&self.shared) {
                Ok(SessionEvent::Continue) => Ok(Pacing::Frame),
                Ok(SessionEvent::QuitRequested) => {
                    log::info!("HMD runtime requested quit, closing session");
                    // Dropping the bundle releases swapchains, render pass,
                    // framebuffers, renderer and the session in reverse
                    // creation order.
                    self.session = None;
                    Ok(Pacing::Idle)
                }
                Err(err) => {
                    log::error!("HMD session failed: {err}");
                    self.session = None;
                    Err(err)
                }
            },
        }
    }
}

/// Thread owning a [`VrLoop`].
pub struct VrWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl VrWorker {
    /// Spawn the HMD render thread.
    ///
    /// Fails only if the OS refuses to create the thread.
    pub fn spawn<F>(factory: F, shared: Arc<SharedState>) -> std::io::Result<Self>
    where
        F: SessionFactory + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("hmd-render".to_string())
            .spawn(move || {
                let mut vr_loop = VrLoop::new(factory, shared);
                while !thread_stop.load(Ordering::Relaxed) {
                    match vr_loop.step() {
                        Ok(Pacing::Frame) => {}
                        Ok(Pacing::Idle) => {
                            // Sleep in slices so shutdown stays responsive.
                            let slice = Duration::from_millis(50);
                            let mut slept = Duration::ZERO;
                            while slept < RETRY_INTERVAL && !thread_stop.load(Ordering::Relaxed) {
                                std::thread::sleep(slice);
                                slept += slice;
                            }
                        }
                        Err(err) => {
                            log::error!("HMD render loop terminated: {err}");
                            break;
                        }
                    }
                }
                // VrLoop drops here, closing any open session.
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the thread to stop and wait for it to finish.
    pub fn stop_and_join(mut self) {
        self.request_stop_and_join();
    }

    fn request_stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("HMD render thread panicked");
            }
        }
    }
}

impl Drop for VrWorker {
    fn drop(&mut self) {
        self.request_stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use crate::vr::driver::ConnectError;
    use std::sync::atomic::AtomicUsize;

    /// Create/destroy tally for one session resource type.
    #[derive(Default)]
    struct TypeCounts {
        created: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl TypeCounts {
        fn create(&self, n: usize) {
            self.created.fetch_add(n, Ordering::SeqCst);
        }

        fn destroy(&self, n: usize) {
            self.destroyed.fetch_add(n, Ordering::SeqCst);
        }

        fn balanced(&self) -> bool {
            self.created.load(Ordering::SeqCst) == self.destroyed.load(Ordering::SeqCst)
        }
    }

    /// Counts live session resources, standing in for GPU objects. A real
    /// session owns two eye swapchains, two framebuffers, one render pass
    /// and one renderer.
    #[derive(Default)]
    struct ResourceLedger {
        live: AtomicUsize,
        created: AtomicUsize,
        frames: AtomicUsize,
        eye_swapchains: TypeCounts,
        framebuffers: TypeCounts,
        render_passes: TypeCounts,
        renderers: TypeCounts,
    }

    impl ResourceLedger {
        fn all_released(&self) -> bool {
            self.eye_swapchains.balanced()
                && self.framebuffers.balanced()
                && self.render_passes.balanced()
                && self.renderers.balanced()
        }
    }

    struct MockSession {
        ledger: Arc<ResourceLedger>,
        /// Scripted outcome per frame, consumed front to back.
        script: Vec<Result<SessionEvent, VrError>>,
        frame: usize,
    }

    impl MockSession {
        fn new(ledger: Arc<ResourceLedger>, script: Vec<Result<SessionEvent, VrError>>) -> Self {
            ledger.live.fetch_add(1, Ordering::SeqCst);
            ledger.created.fetch_add(1, Ordering::SeqCst);
            ledger.eye_swapchains.create(2);
            ledger.framebuffers.create(2);
            ledger.render_passes.create(1);
            ledger.renderers.create(1);
            Self {
                ledger,
                script,
                frame: 0,
            }
        }
    }

    impl VrSession for MockSession {
        fn render_frame(&mut self, shared: &SharedState) -> Result<SessionEvent, VrError> {
            let index = self.frame;
            self.frame += 1;
            self.ledger.frames.fetch_add(1, Ordering::SeqCst);

            // Publish a recognizable pose pair like the real session does.
            let pose = Mat4::identity() * (index + 1) as f32;
            shared.set_eye_poses([pose, pose]);

            if self.script.is_empty() {
                Ok(SessionEvent::Continue)
            } else {
                self.script.remove(0)
            }
        }
    }

    impl Drop for MockSession {
        fn drop(&mut self) {
            self.ledger.eye_swapchains.destroy(2);
            self.ledger.framebuffers.destroy(2);
            self.ledger.render_passes.destroy(1);
            self.ledger.renderers.destroy(1);
            self.ledger.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct MockFactory {
        ledger: Arc<ResourceLedger>,
        /// Connect attempts that fail before the first success.
        failures_before_connect: usize,
        attempts: usize,
        script: Vec<Result<SessionEvent, VrError>>,
    }

    impl SessionFactory for MockFactory {
        type Session = MockSession;

        fn connect(&mut self) -> Result<MockSession, ConnectError> {
            self.attempts += 1;
            if self.attempts <= self.failures_before_connect {
                return Err(ConnectError::NotPresent);
            }
            Ok(MockSession::new(
                Arc::clone(&self.ledger),
                std::mem::take(&mut self.script),
            ))
        }
    }

    fn make_loop(
        failures: usize,
        script: Vec<Result<SessionEvent, VrError>>,
    ) -> (VrLoop<MockFactory>, Arc<ResourceLedger>, Arc<SharedState>) {
        let ledger = Arc::new(ResourceLedger::default());
        let shared = Arc::new(SharedState::new());
        let factory = MockFactory {
            ledger: Arc::clone(&ledger),
            failures_before_connect: failures,
            attempts: 0,
            script,
        };
        let vr_loop = VrLoop::new(factory, Arc::clone(&shared));
        (vr_loop, ledger, shared)
    }

    #[test]
    fn failed_connects_idle_and_stay_closed() {
        let (mut vr_loop, ledger, _) = make_loop(3, vec![]);

        for _ in 0..3 {
            assert_eq!(vr_loop.step().unwrap(), Pacing::Idle);
            assert_eq!(vr_loop.phase(), Phase::Closed);
        }
        assert_eq!(ledger.created.load(Ordering::SeqCst), 0);

        // Fourth attempt succeeds and allocates the full resource set.
        assert_eq!(vr_loop.step().unwrap(), Pacing::Frame);
        assert_eq!(vr_loop.phase(), Phase::Open);
        assert_eq!(ledger.live.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.eye_swapchains.created.load(Ordering::SeqCst), 2);
        assert_eq!(ledger.framebuffers.created.load(Ordering::SeqCst), 2);
        assert_eq!(ledger.render_passes.created.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.renderers.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn quit_request_releases_all_session_resources() {
        let script = vec![
            Ok(SessionEvent::Continue),
            Ok(SessionEvent::Continue),
            Ok(SessionEvent::QuitRequested),
        ];
        let (mut vr_loop, ledger, shared) = make_loop(0, script);

        vr_loop.step().unwrap(); // connect
        assert_eq!(vr_loop.phase(), Phase::Open);

        vr_loop.step().unwrap(); // frame 1
        vr_loop.step().unwrap(); // frame 2
        assert_eq!(vr_loop.step().unwrap(), Pacing::Idle); // quit

        assert_eq!(vr_loop.phase(), Phase::Closed);
        assert_eq!(
            ledger.live.load(Ordering::SeqCst),
            0,
            "session resources leaked past teardown"
        );
        // Per resource type, destroy count must match create count.
        assert!(
            ledger.all_released(),
            "a session resource type leaked: swapchains {}/{}, framebuffers {}/{}, \
             render passes {}/{}, renderers {}/{}",
            ledger.eye_swapchains.created.load(Ordering::SeqCst),
            ledger.eye_swapchains.destroyed.load(Ordering::SeqCst),
            ledger.framebuffers.created.load(Ordering::SeqCst),
            ledger.framebuffers.destroyed.load(Ordering::SeqCst),
            ledger.render_passes.created.load(Ordering::SeqCst),
            ledger.render_passes.destroyed.load(Ordering::SeqCst),
            ledger.renderers.created.load(Ordering::SeqCst),
            ledger.renderers.destroyed.load(Ordering::SeqCst),
        );

        // A full Open -> Closed cycle only touches the eye poses; the
        // window-owned fields keep their values.
        assert_eq!(shared.orientation(), crate::foundation::math::Quat::identity());
        assert!(shared.lights().is_empty());
    }

    #[test]
    fn session_error_tears_down_and_propagates() {
        let script = vec![Err(VrError::TrackingLost)];
        let (mut vr_loop, ledger, _) = make_loop(0, script);

        vr_loop.step().unwrap(); // connect
        let err = vr_loop.step().expect_err("session error must propagate");
        assert!(matches!(err, VrError::TrackingLost));
        assert_eq!(vr_loop.phase(), Phase::Closed);
        assert_eq!(ledger.live.load(Ordering::SeqCst), 0);
        assert!(ledger.all_released());
    }

    #[test]
    fn frames_publish_eye_poses_to_shared_state() {
        let (mut vr_loop, _, shared) = make_loop(0, vec![]);

        vr_loop.step().unwrap(); // connect
        vr_loop.step().unwrap(); // frame 1

        let [left, right] = shared.eye_poses();
        assert_eq!(left, Mat4::identity());
        assert_eq!(left, right);

        vr_loop.step().unwrap(); // frame 2
        assert_eq!(shared.eye_poses()[0], Mat4::identity() * 2.0);
    }

    #[test]
    fn loop_reconnects_after_quit() {
        // Quit immediately on the first session, then render on the second.
        let (mut vr_loop, ledger, _) = make_loop(0, vec![Ok(SessionEvent::QuitRequested)]);

        vr_loop.step().unwrap(); // connect #1
        vr_loop.step().unwrap(); // quit -> Closed
        assert_eq!(vr_loop.phase(), Phase::Closed);

        vr_loop.step().unwrap(); // connect #2
        assert_eq!(vr_loop.phase(), Phase::Open);
        assert_eq!(ledger.created.load(Ordering::SeqCst), 2);
        assert_eq!(ledger.live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn worker_thread_runs_and_shuts_down_cleanly() {
        let ledger = Arc::new(ResourceLedger::default());
        let shared = Arc::new(SharedState::new());
        let factory = MockFactory {
            ledger: Arc::clone(&ledger),
            failures_before_connect: 0,
            attempts: 0,
            script: vec![],
        };

        let worker =
            VrWorker::spawn(factory, Arc::clone(&shared)).expect("spawning the worker failed");

        // Wait until the worker has rendered a few frames.
        let start = std::time::Instant::now();
        while ledger.frames.load(Ordering::SeqCst) < 3 {
            assert!(start.elapsed() < Duration::from_secs(5), "worker never rendered");
            std::thread::yield_now();
        }

        worker.stop_and_join();
        assert_eq!(
            ledger.live.load(Ordering::SeqCst),
            0,
            "open session must be closed on worker shutdown"
        );
        assert_ne!(shared.eye_poses()[0], Mat4::identity());
    }
}
