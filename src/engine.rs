use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::automation::TemplateStore;
use crate::core::frame::{Point, Template};
use crate::core::hotkey::Accelerator;
use crate::core::registry::{HotkeyRegistry, HotkeyTarget};
use crate::core::worker::{Admission, ReentryPolicy, Worker};
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink, HotkeyResponse};
use crate::macros::{MacroExecutor, MacroKind, MacroLibrary, SearchControl, SearchState};
use crate::platform::{InputSynth, Platform, ScreenCapture};
use crate::settings::EngineSettings;

/// How long shutdown waits for running macros to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Owns every piece of engine state. Lives on the hotkey dispatch thread.
pub struct MacroEngine {
    settings: EngineSettings,
    registry: HotkeyRegistry,
    library: MacroLibrary,
    executor: Arc<MacroExecutor>,
    templates: Arc<TemplateStore>,
    control: Arc<SearchControl>,
    capture: Arc<dyn ScreenCapture>,
    input: Arc<dyn InputSynth>,
    events: Arc<EventSink>,
    workers: BTreeMap<MacroKind, Worker>,
    capture_worker: Worker,
    shut_down: bool,
}

impl MacroEngine {
    pub fn new(platform: Platform, settings: EngineSettings) -> Result<Self> {
        let library = MacroLibrary::standard(&settings.macros, &settings.search)?;
        let templates = Arc::new(TemplateStore::new());
        let control = Arc::new(SearchControl::new());
        let executor = Arc::new(MacroExecutor::new(
            Arc::clone(&platform.input),
            Arc::clone(&platform.capture),
            Arc::clone(&platform.clock),
            Arc::clone(&templates),
            settings.search.clone(),
            Arc::clone(&control),
        ));
        let workers = MacroKind::ALL
            .into_iter()
            .map(|kind| (kind, Worker::new(kind.id())))
            .collect();

        info!(policy = ?settings.reentry_policy, "macro engine ready");
        Ok(Self {
            registry: HotkeyRegistry::new(platform.hotkeys),
            library,
            executor,
            templates,
            control,
            capture: platform.capture,
            input: platform.input,
            events: Arc::new(EventSink::new()),
            workers,
            capture_worker: Worker::new("capture"),
            shut_down: false,
            settings,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // Hotkey slots

    pub fn register_hotkey(&mut self, macro_id: &str, accelerator: &str) -> HotkeyResponse {
        match macro_id.parse::<MacroKind>() {
            Ok(kind) => self.register_slot(HotkeyTarget::Macro(kind), accelerator),
            Err(e) => HotkeyResponse::from(Err(e)),
        }
    }

    /// Remove a macro's hotkey. Unbound macros are left alone.
    pub fn unregister_hotkey(&mut self, macro_id: &str) -> Result<()> {
        let kind: MacroKind = macro_id.parse()?;
        self.registry.unregister(HotkeyTarget::Macro(kind));
        Ok(())
    }

    pub fn register_capture_hotkey(&mut self, accelerator: &str) -> HotkeyResponse {
        self.register_slot(HotkeyTarget::CaptureTemplate, accelerator)
    }

    pub fn unregister_capture_hotkey(&mut self) {
        self.registry.unregister(HotkeyTarget::CaptureTemplate);
    }

    pub fn register_stop_search_hotkey(&mut self, accelerator: &str) -> HotkeyResponse {
        self.register_slot(HotkeyTarget::StopSearch, accelerator)
    }

    pub fn unregister_stop_search_hotkey(&mut self) {
        self.registry.unregister(HotkeyTarget::StopSearch);
    }

    pub fn register_mouse_position_hotkey(&mut self, accelerator: &str) -> HotkeyResponse {
        self.register_slot(HotkeyTarget::MousePosition, accelerator)
    }

    pub fn unregister_mouse_position_hotkey(&mut self) {
        self.registry.unregister(HotkeyTarget::MousePosition);
    }

    /// Bind every slot listed in the settings. Failures are logged and reported, not fatal.
    pub fn apply_hotkey_settings(&mut self) -> Vec<(String, HotkeyResponse)> {
        let configured: Vec<(String, String)> = self
            .settings
            .hotkeys
            .iter()
            .map(|(slot, accelerator)| (slot.clone(), accelerator.clone()))
            .collect();

        configured
            .into_iter()
            .map(|(slot, accelerator)| {
                let response = match slot.parse::<HotkeyTarget>() {
                    Ok(target) => self.register_slot(target, &accelerator),
                    Err(e) => {
                        warn!(%slot, "unknown hotkey slot in settings");
                        HotkeyResponse::from(Err(e))
                    }
                };
                (slot, response)
            })
            .collect()
    }

    pub fn bindings(&self) -> Vec<(HotkeyTarget, Accelerator)> {
        self.registry.bindings()
    }

    fn register_slot(&mut self, target: HotkeyTarget, accelerator: &str) -> HotkeyResponse {
        let result = self.registry.register(target, accelerator);
        if let Err(e) = &result {
            warn!(%target, accelerator, "hotkey registration failed: {}", e);
        }
        HotkeyResponse::from(result)
    }

    // Dispatch

    /// Run whatever is bound to `accelerator`. Returns the slot that fired.
    pub fn handle_hotkey(&self, accelerator: &Accelerator) -> Option<HotkeyTarget> {
        let Some(target) = self.registry.resolve(accelerator) else {
            debug!(%accelerator, "hotkey not bound");
            return None;
        };
        debug!(%accelerator, %target, "hotkey pressed");

        let outcome = match target {
            HotkeyTarget::Macro(kind) => self.run_macro(kind).map(|_| ()),
            HotkeyTarget::CaptureTemplate => self.capture_template().map(|_| ()),
            HotkeyTarget::StopSearch => {
                self.stop_search();
                Ok(())
            }
            HotkeyTarget::MousePosition => self.capture_mouse_position().map(|_| ()),
        };
        if let Err(e) = outcome {
            warn!(%target, "hotkey action failed: {}", e);
        }
        Some(target)
    }

    pub fn execute(&self, macro_id: &str) -> Result<Admission> {
        self.run_macro(macro_id.parse()?)
    }

    /// Start `kind` on its worker, subject to the re-entry policy.
    pub fn run_macro(&self, kind: MacroKind) -> Result<Admission> {
        let definition = self
            .library
            .get(kind)
            .ok_or_else(|| EngineError::UnknownMacro(kind.id().to_string()))?;
        let worker = self.worker(kind);

        let long_running = definition.is_long_running();
        let mut policy = self.settings.reentry_policy;
        if long_running && policy == ReentryPolicy::AllowOverlap {
            policy = ReentryPolicy::Reject;
        }

        // A fresh search counts as running from dispatch, so stop_search sees it
        let admitted = long_running && !worker.is_running();
        if admitted {
            self.control.admit();
        }

        let executor = Arc::clone(&self.executor);
        let control = Arc::clone(&self.control);
        let status = worker.clone();
        let admission = worker.submit(policy, move || {
            status.set_status("Running");
            match executor.run(&definition) {
                Ok(()) => status.set_status("Ready"),
                Err(e) => status.set_status(&format!("Failed: {}", e)),
            }
            if long_running {
                control.withdraw();
            }
        });
        if admitted && admission != Admission::Started {
            self.control.withdraw();
        }

        match admission {
            Admission::Started => info!(%kind, "macro dispatched"),
            Admission::Queued => info!(%kind, "macro queued behind running invocation"),
            Admission::Rejected => info!(%kind, "macro already running, trigger ignored"),
        }
        Ok(admission)
    }

    /// Ask the search loop to stop after its current iteration.
    pub fn stop_search(&self) -> bool {
        self.worker(MacroKind::FindImage).clear_queue();
        let was_running = self.control.request_stop();
        info!(was_running, "search stop requested");
        was_running
    }

    pub fn search_state(&self) -> SearchState {
        self.control.state()
    }

    pub fn macro_status(&self, kind: MacroKind) -> String {
        self.worker(kind).get_status()
    }

    // Capture

    /// Grab a new template around the cursor (or the fixed region) on a worker.
    pub fn capture_template(&self) -> Result<Admission> {
        let cursor = if self.settings.capture.follow_cursor {
            self.input.cursor_position()?
        } else {
            Point::default()
        };
        let region = self.settings.capture.region_for(cursor);
        if region.is_empty() {
            return Err(EngineError::CaptureFailed(format!("empty capture region {:?}", region)));
        }

        let capture = Arc::clone(&self.capture);
        let templates = Arc::clone(&self.templates);
        let events = Arc::clone(&self.events);
        let status = self.capture_worker.clone();
        Ok(self.capture_worker.submit(ReentryPolicy::Reject, move || match capture.capture(region) {
            Ok(frame) => {
                let template = templates.replace(Template::new(frame));
                info!(?region, "template captured");
                status.set_status("Template captured");
                events.emit(EngineEvent::ScreenRegionCaptured {
                    width: template.width(),
                    height: template.height(),
                    pixels: template.pixels().to_vec(),
                });
            }
            Err(e) => {
                warn!(?region, "template capture failed: {}", e);
                status.set_status(&format!("Failed: {}", e));
            }
        }))
    }

    pub fn has_template(&self) -> bool {
        self.templates.get().is_some()
    }

    pub fn capture_mouse_position(&self) -> Result<Point> {
        let position = self.input.cursor_position()?;
        info!(x = position.x, y = position.y, "mouse position captured");
        self.events.emit(EngineEvent::MousePositionCaptured {
            x: position.x,
            y: position.y,
        });
        Ok(position)
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.events.subscribe()
    }

    // Lifecycle

    /// Block until no macro or capture is running. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.workers
            .values()
            .chain(std::iter::once(&self.capture_worker))
            .all(|worker| worker.wait_idle(deadline.saturating_duration_since(Instant::now())))
    }

    /// Stop the search, let workers finish, release every hotkey. Safe to call twice.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        for worker in self.workers.values() {
            worker.clear_queue();
        }
        self.control.request_stop();
        if !self.wait_idle(SHUTDOWN_GRACE) {
            warn!("macros still running at shutdown");
        }
        self.registry.unregister_all();
        info!("macro engine shut down");
    }

    fn worker(&self, kind: MacroKind) -> &Worker {
        // Every kind gets a worker in `new`
        &self.workers[&kind]
    }
}

impl Drop for MacroEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
