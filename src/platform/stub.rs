use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::RgbaImage;
use tracing::debug;

use super::{HotkeyBackend, InputSynth, Platform, ScreenCapture};
use crate::core::clock::Clock;
use crate::core::frame::{Frame, Point, Region};
use crate::core::hotkey::Accelerator;
use crate::core::keys::Key;
use crate::core::lock;
use crate::error::{EngineError, Result};

/// Stub collaborators sharing one clock.
pub fn platform(clock: Arc<dyn Clock>) -> Platform {
    Platform {
        capture: Arc::new(StubCapture::blank()),
        input: Arc::new(StubInput::new(Arc::clone(&clock))),
        hotkeys: Box::new(StubHotkeys::new()),
        clock,
    }
}

type CaptureHook = Box<dyn Fn(usize) + Send + Sync>;

/// Serves scripted frames, then a fallback (blank by default).
pub struct StubCapture {
    script: Mutex<VecDeque<Result<RgbaImage>>>,
    fallback: Mutex<Option<RgbaImage>>,
    calls: AtomicUsize,
    regions: Mutex<Vec<Region>>,
    hook: Option<CaptureHook>,
}

impl StubCapture {
    /// Every capture returns a black frame of the requested size.
    pub fn blank() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            calls: AtomicUsize::new(0),
            regions: Mutex::new(Vec::new()),
            hook: None,
        }
    }

    /// Every capture returns `image`, whatever region is asked for.
    pub fn showing(image: RgbaImage) -> Self {
        let capture = Self::blank();
        *lock(&capture.fallback) = Some(image);
        capture
    }

    /// Called with the 1-based call number after each capture.
    pub fn with_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn push(&self, image: RgbaImage) {
        lock(&self.script).push_back(Ok(image));
    }

    pub fn push_failure(&self, reason: &str) {
        lock(&self.script).push_back(Err(EngineError::CaptureFailed(reason.to_string())));
    }

    pub fn set_fallback(&self, image: Option<RgbaImage>) {
        *lock(&self.fallback) = image;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn regions(&self) -> Vec<Region> {
        lock(&self.regions).clone()
    }
}

impl ScreenCapture for StubCapture {
    fn capture(&self, region: Region) -> Result<Frame> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.regions).push(region);
        debug!(?region, call, "stub capture");

        let scripted = lock(&self.script).pop_front();
        let result = match scripted {
            Some(result) => result,
            None => Ok(lock(&self.fallback)
                .clone()
                .unwrap_or_else(|| RgbaImage::new(region.width, region.height))),
        };

        if let Some(hook) = &self.hook {
            hook(call);
        }
        result.map(|image| Frame::new(image, Instant::now()))
    }
}

/// One synthesized input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Press(Key),
    Release(Key),
    Move(Point),
}

/// Logs and records input instead of injecting it.
pub struct StubInput {
    clock: Arc<dyn Clock>,
    started: Instant,
    events: Mutex<Vec<(Duration, InputEvent)>>,
    cursor: Mutex<Point>,
    fail_on_press: Mutex<Option<Key>>,
}

impl StubInput {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let started = clock.now();
        Self {
            clock,
            started,
            events: Mutex::new(Vec::new()),
            cursor: Mutex::new(Point::default()),
            fail_on_press: Mutex::new(None),
        }
    }

    /// Recorded events with their offset from construction time.
    pub fn timeline(&self) -> Vec<(Duration, InputEvent)> {
        lock(&self.events).clone()
    }

    pub fn events(&self) -> Vec<InputEvent> {
        lock(&self.events).iter().map(|(_, e)| *e).collect()
    }

    /// Key events only, pointer moves dropped.
    pub fn key_events(&self) -> Vec<InputEvent> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, InputEvent::Move(_)))
            .collect()
    }

    pub fn set_cursor(&self, at: Point) {
        *lock(&self.cursor) = at;
    }

    /// Make the next press of `key` fail.
    pub fn fail_on_press(&self, key: Key) {
        *lock(&self.fail_on_press) = Some(key);
    }

    fn record(&self, event: InputEvent) {
        let at = self.clock.now().saturating_duration_since(self.started);
        debug!(?event, ?at, "stub input");
        lock(&self.events).push((at, event));
    }
}

impl InputSynth for StubInput {
    fn press_key(&self, key: Key) -> Result<()> {
        let mut fail = lock(&self.fail_on_press);
        if *fail == Some(key) {
            *fail = None;
            return Err(EngineError::InputFailed(format!("press {} rejected", key)));
        }
        drop(fail);
        self.record(InputEvent::Press(key));
        Ok(())
    }

    fn release_key(&self, key: Key) -> Result<()> {
        self.record(InputEvent::Release(key));
        Ok(())
    }

    fn move_mouse(&self, to: Point) -> Result<()> {
        *lock(&self.cursor) = to;
        self.record(InputEvent::Move(to));
        Ok(())
    }

    fn cursor_position(&self) -> Result<Point> {
        Ok(*lock(&self.cursor))
    }
}

#[derive(Default)]
struct HotkeyState {
    registered: HashSet<Accelerator>,
    claimed: HashSet<Accelerator>,
    pinned: HashSet<Accelerator>,
    register_calls: usize,
}

/// In-memory hotkey table. Clones share state so tests can inspect it.
#[derive(Clone, Default)]
pub struct StubHotkeys {
    state: Arc<Mutex<HotkeyState>>,
}

impl StubHotkeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend another application already owns `accelerator`.
    pub fn claim_externally(&self, accelerator: Accelerator) {
        lock(&self.state).claimed.insert(accelerator);
    }

    /// Make every unregister of `accelerator` fail.
    pub fn pin(&self, accelerator: Accelerator) {
        lock(&self.state).pinned.insert(accelerator);
    }

    pub fn is_registered(&self, accelerator: &Accelerator) -> bool {
        lock(&self.state).registered.contains(accelerator)
    }

    pub fn registered(&self) -> Vec<Accelerator> {
        lock(&self.state).registered.iter().copied().collect()
    }

    pub fn register_calls(&self) -> usize {
        lock(&self.state).register_calls
    }
}

impl HotkeyBackend for StubHotkeys {
    fn register(&mut self, accelerator: &Accelerator) -> Result<()> {
        let mut state = lock(&self.state);
        state.register_calls += 1;
        if state.claimed.contains(accelerator) || !state.registered.insert(*accelerator) {
            return Err(EngineError::AcceleratorAlreadyBound(accelerator.to_string()));
        }
        debug!(%accelerator, "stub hotkey registered");
        Ok(())
    }

    fn unregister(&mut self, accelerator: &Accelerator) -> Result<()> {
        let mut state = lock(&self.state);
        if state.pinned.contains(accelerator) {
            return Err(EngineError::HotkeyBackend(format!("cannot release {}", accelerator)));
        }
        state.registered.remove(accelerator);
        drop(state);
        debug!(%accelerator, "stub hotkey unregistered");
        Ok(())
    }

    fn unregister_all(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        let HotkeyState { registered, pinned, .. } = &mut *state;
        registered.retain(|accelerator| pinned.contains(accelerator));
        if registered.is_empty() {
            Ok(())
        } else {
            Err(EngineError::HotkeyBackend(format!("{} hotkeys still held", registered.len())))
        }
    }
}
