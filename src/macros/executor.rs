use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, info_span, warn};

use crate::automation::{Matcher, ScreenCache, TemplateStore};
use crate::core::clock::{delay_ms, Clock};
use crate::core::frame::Point;
use crate::core::keys::Key;
use crate::error::Result;
use crate::macros::search::{search_and_click, SearchControl};
use crate::macros::step::{MacroDefinition, MacroStep};
use crate::platform::{InputSynth, ScreenCapture};
use crate::settings::SearchSettings;

/// Pointer re-snap period while a mouse lock is engaged.
const LOCK_PERIOD_MS: u64 = 10;

/// Interprets macro scripts against the input collaborator.
pub struct MacroExecutor {
    pub(crate) input: Arc<dyn InputSynth>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) cache: Mutex<ScreenCache>,
    pub(crate) templates: Arc<TemplateStore>,
    pub(crate) search: SearchSettings,
    pub(crate) control: Arc<SearchControl>,
    pub(crate) matcher: Matcher,
}

impl MacroExecutor {
    pub fn new(
        input: Arc<dyn InputSynth>,
        capture: Arc<dyn ScreenCapture>,
        clock: Arc<dyn Clock>,
        templates: Arc<TemplateStore>,
        search: SearchSettings,
        control: Arc<SearchControl>,
    ) -> Self {
        let cache = ScreenCache::new(capture, search.cache_ttl());
        Self {
            input,
            clock,
            cache: Mutex::new(cache),
            templates,
            search,
            control,
            matcher: Matcher::default(),
        }
    }

    pub fn control(&self) -> &Arc<SearchControl> {
        &self.control
    }

    /// Run every step in order. Keys still held when the run ends, normally
    /// or not, are released before returning.
    pub fn run(&self, definition: &MacroDefinition) -> Result<()> {
        let span = info_span!("macro", id = definition.kind.id());
        let _enter = span.enter();
        info!(steps = definition.steps.len(), "macro started");

        let mut session = Session::new(self);
        let result = definition.steps.iter().try_for_each(|step| session.apply(step));
        session.finish();

        match &result {
            Ok(()) => info!("macro finished"),
            Err(e) => warn!("macro aborted: {}", e),
        }
        result
    }
}

/// State of one macro run.
pub(crate) struct Session<'a> {
    executor: &'a MacroExecutor,
    held: Vec<Key>,
    lock: Option<MouseLock>,
}

impl<'a> Session<'a> {
    fn new(executor: &'a MacroExecutor) -> Self {
        Self {
            executor,
            held: Vec::new(),
            lock: None,
        }
    }

    pub(crate) fn executor(&self) -> &'a MacroExecutor {
        self.executor
    }

    pub(crate) fn apply(&mut self, step: &MacroStep) -> Result<()> {
        let executor = self.executor;
        let input = &executor.input;
        match step {
            MacroStep::PressKeys(keys) => {
                for key in press_order(keys) {
                    input.press_key(key)?;
                    self.held.push(key);
                }
            }
            MacroStep::ReleaseKeys(keys) => {
                for key in release_order(keys) {
                    input.release_key(key)?;
                    self.held.retain(|held| *held != key);
                }
            }
            MacroStep::Wait(duration) => executor.clock.sleep(*duration),
            MacroStep::MoveMouseTo(point) => input.move_mouse(*point)?,
            MacroStep::LockMouseAt(point) => {
                // Replacing a lock joins the old thread first
                self.lock = None;
                self.lock = Some(MouseLock::engage(Arc::clone(input), *point)?);
            }
            MacroStep::UnlockMouse => self.lock = None,
            MacroStep::SearchAndClickLoop(tolerance) => search_and_click(self, *tolerance)?,
        }
        Ok(())
    }

    /// Release leftovers in reverse press order, then drop any mouse lock.
    fn finish(&mut self) {
        while let Some(key) = self.held.pop() {
            if let Err(e) = self.executor.input.release_key(key) {
                warn!(%key, "failed to release held key: {}", e);
            }
        }
        self.lock = None;
    }
}

fn press_order(keys: &[Key]) -> Vec<Key> {
    let (mut modifiers, others): (Vec<Key>, Vec<Key>) = keys.iter().partition(|k| k.is_modifier());
    modifiers.extend(others);
    modifiers
}

fn release_order(keys: &[Key]) -> Vec<Key> {
    let (modifiers, mut others): (Vec<Key>, Vec<Key>) = keys.iter().partition(|k| k.is_modifier());
    others.extend(modifiers);
    others
}

/// Keeps the pointer pinned to a point until dropped.
struct MouseLock {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MouseLock {
    fn engage(input: Arc<dyn InputSynth>, at: Point) -> Result<Self> {
        input.move_mouse(at)?;
        debug!(x = at.x, y = at.y, "mouse locked");

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("mouse-lock".to_string())
            .spawn(move || {
                while !flag.load(Ordering::SeqCst) {
                    delay_ms(LOCK_PERIOD_MS);
                    if flag.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = input.move_mouse(at) {
                        warn!("mouse lock move failed: {}", e);
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for MouseLock {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        debug!("mouse unlocked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{ManualClock, SystemClock};
    use crate::core::frame::{Frame, Region, Template};
    use crate::error::EngineError;
    use crate::macros::library::MacroLibrary;
    use crate::macros::search::SearchState;
    use crate::macros::MacroKind;
    use crate::platform::stub::{InputEvent, StubCapture, StubInput};
    use crate::settings::MacroSettings;
    use image::{Rgba, RgbaImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::time::{Duration, Instant};

    struct Rig {
        clock: Arc<ManualClock>,
        input: Arc<StubInput>,
        templates: Arc<TemplateStore>,
        control: Arc<SearchControl>,
        executor: MacroExecutor,
    }

    fn rig_with(capture: Arc<StubCapture>, control: Arc<SearchControl>, search: SearchSettings) -> Rig {
        let clock = Arc::new(ManualClock::new());
        let input = Arc::new(StubInput::new(clock.clone()));
        let templates = Arc::new(TemplateStore::new());
        let executor = MacroExecutor::new(
            input.clone(),
            capture,
            clock.clone(),
            templates.clone(),
            search,
            control.clone(),
        );
        Rig {
            clock,
            input,
            templates,
            control,
            executor,
        }
    }

    fn rig() -> Rig {
        rig_with(
            Arc::new(StubCapture::blank()),
            Arc::new(SearchControl::new()),
            SearchSettings::default(),
        )
    }

    fn library() -> MacroLibrary {
        MacroLibrary::standard(&MacroSettings::default(), &SearchSettings::default()).unwrap()
    }

    fn presses(events: &[InputEvent]) -> Vec<Key> {
        events
            .iter()
            .filter_map(|e| match e {
                InputEvent::Press(k) => Some(*k),
                _ => None,
            })
            .collect()
    }

    fn assert_balanced(events: &[InputEvent]) {
        let mut held: Vec<Key> = Vec::new();
        for event in events {
            match event {
                InputEvent::Press(k) => held.push(*k),
                InputEvent::Release(k) => {
                    let pos = held.iter().position(|h| h == k).expect("release of unheld key");
                    held.remove(pos);
                }
                InputEvent::Move(_) => {}
            }
        }
        assert!(held.is_empty(), "keys left held: {held:?}");
    }

    fn needle_and_screen(seed: u64, at: (u32, u32), size: (u32, u32)) -> (RgbaImage, RgbaImage) {
        let mut rng = StdRng::seed_from_u64(seed);
        let needle = RgbaImage::from_fn(12, 12, |_, _| {
            Rgba([rng.gen_range(64..=255), rng.gen_range(64..=255), rng.gen_range(64..=255), 255])
        });
        let mut screen = RgbaImage::from_pixel(size.0, size.1, Rgba([0, 0, 0, 255]));
        for (x, y, pixel) in needle.enumerate_pixels() {
            screen.put_pixel(at.0 + x, at.1 + y, *pixel);
        }
        (needle, screen)
    }

    #[test]
    fn revive_sequence_runs_under_mouse_lock() {
        let rig = rig();
        let revive = library().get(MacroKind::Revive).unwrap();
        rig.executor.run(&revive).unwrap();

        let events = rig.input.events();
        assert_eq!(events.first(), Some(&InputEvent::Move(Point::new(58, 77))));
        assert!(events
            .iter()
            .all(|e| !matches!(e, InputEvent::Move(p) if *p != Point::new(58, 77))));

        let chords: Vec<Key> = presses(&events);
        assert_eq!(
            chords,
            vec![
                Key::LeftControl, Key::Digit1,
                Key::LeftShift, Key::Digit0,
                Key::LeftControl, Key::Digit1,
                Key::LeftShift, Key::S,
                Key::LeftAlt, Key::Digit3,
            ]
        );
        assert_balanced(&events);

        // The lock thread is joined when the run returns
        let after = rig.input.events().len();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(rig.input.events().len(), after);
    }

    #[test]
    fn locked_pointer_is_snapped_back_while_the_script_waits() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let input = Arc::new(StubInput::new(clock.clone()));
        let executor = MacroExecutor::new(
            input.clone(),
            Arc::new(StubCapture::blank()),
            clock,
            Arc::new(TemplateStore::new()),
            SearchSettings::default(),
            Arc::new(SearchControl::new()),
        );
        let lock_point = Point::new(58, 77);
        let script = MacroDefinition::new(
            MacroKind::Revive,
            vec![
                MacroStep::LockMouseAt(lock_point),
                MacroStep::Wait(Duration::from_millis(120)),
                MacroStep::UnlockMouse,
            ],
        );

        let mover = {
            let input = input.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(40));
                input.set_cursor(Point::new(500, 500));
            })
        };
        executor.run(&script).unwrap();
        mover.join().unwrap();

        let moves = input
            .events()
            .into_iter()
            .filter(|e| *e == InputEvent::Move(lock_point))
            .count();
        assert!(moves >= 3, "only {moves} snaps while locked");
        assert_eq!(input.cursor_position().unwrap(), lock_point);

        let after = input.events().len();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(input.events().len(), after);
    }

    #[test]
    fn combo_spaces_slot_presses() {
        let rig = rig();
        let combo = library().get(MacroKind::Combo).unwrap();
        rig.executor.run(&combo).unwrap();

        let timeline = rig.input.timeline();
        let pressed: Vec<(Duration, Key)> = timeline
            .iter()
            .filter_map(|(at, e)| match e {
                InputEvent::Press(k) if !k.is_modifier() => Some((*at, *k)),
                _ => None,
            })
            .collect();
        let keys: Vec<Key> = pressed.iter().map(|(_, k)| *k).collect();
        assert_eq!(
            keys,
            vec![Key::Digit1, Key::Digit2, Key::Digit3, Key::Digit4, Key::Digit5, Key::F1]
        );
        for pair in pressed.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(600), "{pair:?}");
        }
        assert_eq!(presses(&rig.input.events())[0], Key::LeftAlt);
        assert_balanced(&rig.input.events());
    }

    #[test]
    fn waits_go_through_the_clock() {
        let rig = rig();
        let heal = library().get(MacroKind::Heal).unwrap();
        rig.executor.run(&heal).unwrap();
        assert_eq!(rig.clock.sleeps(), vec![Duration::from_millis(100)]);
        assert_eq!(
            rig.input.events(),
            vec![InputEvent::Press(Key::H), InputEvent::Release(Key::H)]
        );
    }

    #[test]
    fn held_keys_are_released_when_a_press_fails() {
        let rig = rig();
        rig.input.fail_on_press(Key::S);
        let revive = library().get(MacroKind::Revive).unwrap();

        let result = rig.executor.run(&revive);
        assert!(matches!(result, Err(EngineError::InputFailed(_))));

        let keys = rig.input.key_events();
        assert_eq!(keys.last(), Some(&InputEvent::Release(Key::LeftShift)));
        assert_balanced(&keys);
    }

    #[test]
    fn modifiers_always_wrap_the_primary_key() {
        let rig = rig();
        // Scripted in the wrong order on purpose
        let definition = MacroDefinition::new(
            MacroKind::Buff,
            vec![
                MacroStep::PressKeys(vec![Key::Q, Key::LeftControl, Key::LeftAlt]),
                MacroStep::ReleaseKeys(vec![Key::LeftControl, Key::LeftAlt, Key::Q]),
            ],
        );
        rig.executor.run(&definition).unwrap();
        assert_eq!(
            rig.input.events(),
            vec![
                InputEvent::Press(Key::LeftControl),
                InputEvent::Press(Key::LeftAlt),
                InputEvent::Press(Key::Q),
                InputEvent::Release(Key::Q),
                InputEvent::Release(Key::LeftControl),
                InputEvent::Release(Key::LeftAlt),
            ]
        );
    }

    #[test]
    fn search_without_template_is_a_no_op() {
        let capture = Arc::new(StubCapture::blank());
        let rig = rig_with(capture.clone(), Arc::new(SearchControl::new()), SearchSettings::default());
        let find = library().get(MacroKind::FindImage).unwrap();

        rig.executor.run(&find).unwrap();
        assert_eq!(capture.calls(), 0);
        assert!(rig.input.events().is_empty());
    }

    #[test]
    fn search_clicks_match_until_it_disappears() {
        let (needle, screen) = needle_and_screen(3, (30, 20), (80, 60));
        let capture = Arc::new(StubCapture::blank());
        capture.push(screen.clone());
        capture.push(screen);
        // Third capture falls back to a blank frame

        let search = SearchSettings {
            region: Region::new(100, 200, 80, 60),
            ..SearchSettings::default()
        };
        let rig = rig_with(capture.clone(), Arc::new(SearchControl::new()), search);
        rig.templates.replace(Template::new(Frame::new(needle, Instant::now())));

        rig.executor.run(&library().get(MacroKind::FindImage).unwrap()).unwrap();

        assert_eq!(capture.calls(), 3);
        let events = rig.input.events();
        let target = Point::new(100 + 30 + 6, 200 + 20 + 6);
        assert_eq!(events.iter().filter(|e| **e == InputEvent::Move(target)).count(), 2);
        assert_eq!(
            events[..5],
            [
                InputEvent::Press(Key::LeftShift),
                InputEvent::Move(target),
                InputEvent::Press(Key::E),
                InputEvent::Release(Key::E),
                InputEvent::Release(Key::LeftShift),
            ]
        );
        assert_balanced(&events);
        assert_eq!(rig.control.state(), SearchState::Idle);
    }

    #[test]
    fn stop_request_ends_search_after_current_cycle() {
        let (needle, screen) = needle_and_screen(5, (10, 10), (60, 60));
        let control = Arc::new(SearchControl::new());
        let stopper = control.clone();
        let capture = Arc::new(StubCapture::showing(screen).with_hook(move |call| {
            if call == 3 {
                stopper.request_stop();
            }
        }));
        let search = SearchSettings {
            region: Region::new(0, 0, 60, 60),
            ..SearchSettings::default()
        };
        let rig = rig_with(capture.clone(), control, search);
        rig.templates.replace(Template::new(Frame::new(needle, Instant::now())));

        rig.executor.run(&library().get(MacroKind::FindImage).unwrap()).unwrap();

        let events = rig.input.events();
        assert_eq!(presses(&events).iter().filter(|k| **k == Key::E).count(), 3);
        assert_eq!(capture.calls(), 3);
        assert_balanced(&events);
        assert_eq!(rig.control.state(), SearchState::Idle);
    }

    #[test]
    fn stale_stop_does_not_cancel_a_new_search() {
        let (needle, screen) = needle_and_screen(9, (0, 0), (40, 40));
        let capture = Arc::new(StubCapture::blank());
        capture.push(screen);
        let control = Arc::new(SearchControl::new());
        control.request_stop();

        let search = SearchSettings {
            region: Region::new(0, 0, 40, 40),
            ..SearchSettings::default()
        };
        let rig = rig_with(capture, control, search);
        rig.templates.replace(Template::new(Frame::new(needle, Instant::now())));
        rig.executor.run(&library().get(MacroKind::FindImage).unwrap()).unwrap();

        assert_eq!(presses(&rig.input.events()), vec![Key::LeftShift, Key::E]);
    }

    #[test]
    fn repeated_capture_failures_end_the_search() {
        let (needle, _) = needle_and_screen(13, (0, 0), (20, 20));
        let capture = Arc::new(StubCapture::blank());
        for _ in 0..5 {
            capture.push_failure("device lost");
        }
        let rig = rig_with(capture.clone(), Arc::new(SearchControl::new()), SearchSettings::default());
        rig.templates.replace(Template::new(Frame::new(needle, Instant::now())));

        rig.executor.run(&library().get(MacroKind::FindImage).unwrap()).unwrap();

        assert_eq!(capture.calls(), 3);
        assert_eq!(rig.clock.sleeps(), vec![Duration::from_millis(100); 2]);
        assert!(rig.input.events().is_empty());
    }
}
