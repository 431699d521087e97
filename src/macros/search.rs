use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::frame::{Point, Template};
use crate::core::lock;
use crate::error::{EngineError, Result};
use crate::macros::executor::Session;
use crate::macros::step::MacroStep;
use crate::settings::SearchSettings;

/// Lifecycle of the search-and-click loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Running,
    Cancelling,
}

impl SearchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SearchState::Running,
            2 => SearchState::Cancelling,
            _ => SearchState::Idle,
        }
    }
}

/// Shared stop flag and state for the search loop.
///
/// The flag is only read between iterations, so a stop never interrupts a
/// key hold.
#[derive(Debug, Default)]
pub struct SearchControl {
    state: AtomicU8,
    stop: AtomicBool,
    admitted: AtomicBool,
}

impl SearchControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SearchState {
        SearchState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Ask a running loop to finish after its current iteration.
    /// Returns true if a loop was running.
    pub fn request_stop(&self) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        self.state
            .compare_exchange(
                SearchState::Running as u8,
                SearchState::Cancelling as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Claim the loop for a run that is about to be dispatched. From here on
    /// a stop request reaches that run, even before its thread starts.
    pub(crate) fn admit(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.admitted.store(true, Ordering::SeqCst);
        self.state.store(SearchState::Running as u8, Ordering::SeqCst);
    }

    /// Release an admission that no loop picked up.
    pub(crate) fn withdraw(&self) {
        if self.admitted.swap(false, Ordering::SeqCst) {
            self.state.store(SearchState::Idle as u8, Ordering::SeqCst);
        }
    }

    /// Start a loop. Without a prior admission any stale stop request is cleared.
    pub(crate) fn begin(&self) -> SearchGuard<'_> {
        if !self.admitted.swap(false, Ordering::SeqCst) {
            self.stop.store(false, Ordering::SeqCst);
        }
        let state = if self.is_stop_requested() {
            SearchState::Cancelling
        } else {
            SearchState::Running
        };
        self.state.store(state as u8, Ordering::SeqCst);
        SearchGuard { control: self }
    }
}

pub(crate) struct SearchGuard<'a> {
    control: &'a SearchControl,
}

impl Drop for SearchGuard<'_> {
    fn drop(&mut self) {
        self.control.state.store(SearchState::Idle as u8, Ordering::SeqCst);
    }
}

/// Hold the modifier, move onto the target, tap the action key, let go.
pub fn click_cycle(settings: &SearchSettings, target: Point) -> Vec<MacroStep> {
    let delay = MacroStep::Wait(settings.step_delay());
    vec![
        MacroStep::PressKeys(vec![settings.modifier]),
        delay.clone(),
        MacroStep::MoveMouseTo(target),
        delay.clone(),
        MacroStep::PressKeys(vec![settings.action_key]),
        delay.clone(),
        MacroStep::ReleaseKeys(vec![settings.action_key]),
        delay.clone(),
        MacroStep::ReleaseKeys(vec![settings.modifier]),
        delay,
    ]
}

/// Click the stored template until it is gone or a stop is requested.
pub(crate) fn search_and_click(session: &mut Session<'_>, tolerance: u8) -> Result<()> {
    let executor = session.executor();
    let _running = executor.control.begin();
    let template = match current_template(executor.templates.get()) {
        Ok(template) => template,
        Err(EngineError::NoTemplateCaptured) => {
            info!("no template captured, nothing to search for");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let settings = &executor.search;
    let mut failures = 0u32;
    let mut clicks = 0u32;

    info!(region = ?settings.region, tolerance, "search started");
    loop {
        if executor.control.is_stop_requested() {
            info!(clicks, "search stopped");
            break;
        }

        let captured = {
            let mut cache = lock(&executor.cache);
            cache.invalidate();
            cache.get_or_capture(settings.region, executor.clock.now())
        };
        let frame = match captured {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(e) => {
                failures += 1;
                warn!(failures, "search capture failed: {}", e);
                if failures >= settings.max_capture_failures {
                    warn!("giving up after repeated capture failures");
                    break;
                }
                executor.clock.sleep(settings.retry_delay());
                continue;
            }
        };

        let Some(target) = executor.matcher.find(&template, &frame, settings.region, tolerance) else {
            info!(clicks, "template no longer visible");
            break;
        };
        debug!(x = target.x, y = target.y, "template found");

        for step in click_cycle(settings, target) {
            session.apply(&step)?;
        }
        clicks += 1;
    }
    Ok(())
}

fn current_template(stored: Option<Arc<Template>>) -> Result<Arc<Template>> {
    stored.ok_or(EngineError::NoTemplateCaptured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_moves_running_to_cancelling() {
        let control = SearchControl::new();
        assert_eq!(control.state(), SearchState::Idle);
        assert!(!control.request_stop());

        {
            let _guard = control.begin();
            assert!(!control.is_stop_requested());
            assert_eq!(control.state(), SearchState::Running);
            assert!(control.request_stop());
            assert_eq!(control.state(), SearchState::Cancelling);
        }
        assert_eq!(control.state(), SearchState::Idle);
    }

    #[test]
    fn begin_clears_stale_stop() {
        let control = SearchControl::new();
        control.request_stop();
        assert!(control.is_stop_requested());
        let _guard = control.begin();
        assert!(!control.is_stop_requested());
    }

    #[test]
    fn stop_between_admission_and_start_is_kept() {
        let control = SearchControl::new();
        control.admit();
        assert_eq!(control.state(), SearchState::Running);
        assert!(control.request_stop());

        {
            let _guard = control.begin();
            assert!(control.is_stop_requested());
            assert_eq!(control.state(), SearchState::Cancelling);
        }
        assert_eq!(control.state(), SearchState::Idle);

        // The next run was not admitted, so the old stop is stale
        let _guard = control.begin();
        assert!(!control.is_stop_requested());
    }

    #[test]
    fn withdrawn_admission_returns_to_idle() {
        let control = SearchControl::new();
        control.admit();
        control.withdraw();
        assert_eq!(control.state(), SearchState::Idle);
        assert!(!control.request_stop());

        // Withdrawing after the loop started is a no-op
        control.admit();
        let _guard = control.begin();
        control.withdraw();
        assert_eq!(control.state(), SearchState::Running);
    }

    #[test]
    fn click_cycle_nests_action_inside_modifier() {
        let settings = SearchSettings::default();
        let steps = click_cycle(&settings, Point::new(5, 6));
        let keys: Vec<&MacroStep> = steps.iter().filter(|s| !matches!(s, MacroStep::Wait(_))).collect();
        assert_eq!(
            keys,
            vec![
                &MacroStep::PressKeys(vec![settings.modifier]),
                &MacroStep::MoveMouseTo(Point::new(5, 6)),
                &MacroStep::PressKeys(vec![settings.action_key]),
                &MacroStep::ReleaseKeys(vec![settings.action_key]),
                &MacroStep::ReleaseKeys(vec![settings.modifier]),
            ]
        );
        assert_eq!(steps.len(), 10);
    }
}
