//! Pipeline orchestrator - couples sim tick, renderer thread, UI frame
//!
//! One frame is: `before_frame` (acquire the sim for edits), `tick`
//! (advance the sim unless paused), `before_gui` (collect the frame the
//! renderer thread painted in the background, hand it a fresh snapshot,
//! kick off the next paint), UI drawing outside the core, `after_frame`
//! (release the sim). The renderer thread never touches the live sim: it
//! paints a private `RenderableSimulation` copy.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::{debug, warn};

use crate::config::{CheckFailed, ConfigPair, SimulationConfig};
use crate::history::{History, HistoryError};
use crate::render::{Renderer, RendererFrame, RendererSettings};
use crate::simulation::{RenderableSimulation, Simulation};
use crate::thread_pool::ThreadPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererThreadState {
    Absent,
    Running,
    Paused,
    Stopping,
}

struct RendererSlot {
    state: RendererThreadState,
    /// True while the renderer thread holds the renderer and is painting.
    thread_owns_renderer: bool,
    renderer: Option<Renderer>,
    sim_view: Option<RenderableSimulation>,
}

struct RendererShared {
    slot: Mutex<RendererSlot>,
    cv: Condvar,
}

/// Scripting hook run on the main thread between sim ticks, never
/// concurrently with one.
pub type SimHook = Box<dyn FnMut(&mut Simulation) + Send>;

pub struct Pipeline {
    pub sim: Simulation,
    pub history: History,
    pub pool: ThreadPool,
    pub renderer_settings: RendererSettings,
    config: ConfigPair,
    shared: Arc<RendererShared>,
    renderer_thread: Option<JoinHandle<()>>,
    presented_frame: RendererFrame,
    sim_acquired: bool,
    before_sim_hooks: Vec<SimHook>,
    after_sim_hooks: Vec<SimHook>,
}

impl Pipeline {
    pub fn new(config: SimulationConfig) -> Result<Self, CheckFailed> {
        let sim = Simulation::new(config)?;
        let renderer = Renderer::new(sim.cfg.xres, sim.cfg.yres, sim.cfg.cell);
        let presented_frame = renderer.frame().clone();
        let shared = Arc::new(RendererShared {
            slot: Mutex::new(RendererSlot {
                state: RendererThreadState::Absent,
                thread_owns_renderer: false,
                renderer: Some(renderer),
                sim_view: None,
            }),
            cv: Condvar::new(),
        });
        Ok(Pipeline {
            sim,
            history: History::default(),
            pool: ThreadPool::new(),
            renderer_settings: RendererSettings::default(),
            config: ConfigPair::new(config),
            shared,
            renderer_thread: None,
            presented_frame,
            sim_acquired: false,
            before_sim_hooks: Vec::new(),
            after_sim_hooks: Vec::new(),
        })
    }

    /// Register a callback run just before each sim tick.
    pub fn register_before_sim(&mut self, hook: SimHook) {
        self.before_sim_hooks.push(hook);
    }

    /// Register a callback run just after each sim tick.
    pub fn register_after_sim(&mut self, hook: SimHook) {
        self.after_sim_hooks.push(hook);
    }

    // === Config ===

    pub fn pending_config(&self) -> SimulationConfig {
        self.config.pending()
    }

    pub fn set_pending_config(&mut self, config: SimulationConfig) -> Result<(), CheckFailed> {
        config.check()?;
        self.config.set_pending(config);
        Ok(())
    }

    /// Start a fresh sim. Applies the pending config; a size change
    /// rebuilds the renderer too.
    pub fn new_sim(&mut self) -> Result<(), CheckFailed> {
        let resize = self.config.restart_changes_size();
        let config = self.config.apply();
        if resize {
            self.stop_renderer_thread();
            self.sim = Simulation::new(config)?;
            let renderer = Renderer::new(self.sim.cfg.xres, self.sim.cfg.yres, self.sim.cfg.cell);
            self.presented_frame = renderer.frame().clone();
            if let Ok(mut slot) = self.shared.slot.lock() {
                slot.renderer = Some(renderer);
                slot.sim_view = None;
            }
        } else {
            self.sim.clear_sim();
        }
        self.history = History::new(self.history.undo_history_limit);
        self.with_renderer_now(|renderer| renderer.clear_accumulation());
        Ok(())
    }

    // === Frame protocol ===

    /// Acquire the sim for this frame's edits.
    pub fn before_frame(&mut self) {
        self.sim_acquired = true;
    }

    /// Advance the simulation unless the user paused it; a paused sim
    /// still runs its before-sim hook (decays, air) and honors queued
    /// single-frame steps.
    pub fn tick(&mut self) {
        debug_assert!(self.sim_acquired, "tick outside before_frame/after_frame");
        if !self.sim.sys_pause || self.sim.framerender > 0 {
            for hook in &mut self.before_sim_hooks {
                hook(&mut self.sim);
            }
            self.sim.tick();
            for hook in &mut self.after_sim_hooks {
                hook(&mut self.sim);
            }
            if self.sim.framerender > 0 {
                self.sim.framerender -= 1;
            }
        } else {
            self.sim.before_sim();
        }
    }

    /// Collect the frame painted in the background, then hand the
    /// renderer a snapshot of the current state and let it paint the next
    /// one while the UI draws.
    pub fn before_gui(&mut self) {
        self.start_renderer_thread();
        self.wait_for_renderer_thread();
        {
            let slot = self.shared.slot.lock();
            if let Ok(slot) = slot {
                if let Some(renderer) = &slot.renderer {
                    self.presented_frame = renderer.frame().clone();
                }
            }
        }
        self.dispatch_renderer_thread();
    }

    /// Release the sim acquired in `before_frame`.
    pub fn after_frame(&mut self) {
        self.sim_acquired = false;
    }

    /// The frame produced for the previous simulation state.
    pub fn frame(&self) -> &RendererFrame {
        &self.presented_frame
    }

    // === Renderer thread management ===

    pub fn renderer_thread_state(&self) -> RendererThreadState {
        self.shared
            .slot
            .lock()
            .map(|slot| slot.state)
            .unwrap_or(RendererThreadState::Absent)
    }

    pub fn start_renderer_thread(&mut self) {
        let mut start = false;
        if let Ok(mut slot) = self.shared.slot.lock() {
            match slot.state {
                RendererThreadState::Absent => {
                    slot.state = RendererThreadState::Running;
                    start = true;
                }
                RendererThreadState::Paused => {
                    slot.state = RendererThreadState::Running;
                }
                _ => {}
            }
        }
        if start {
            let shared = Arc::clone(&self.shared);
            self.renderer_thread = std::thread::Builder::new()
                .name("ember-renderer".into())
                .spawn(move || renderer_thread(&shared))
                .ok();
            debug!("renderer thread started");
        }
    }

    /// Park the renderer thread and wait until it no longer owns the
    /// renderer; afterwards synchronous rendering is safe.
    pub fn pause_renderer_thread(&mut self) {
        if let Ok(mut slot) = self.shared.slot.lock() {
            if slot.state == RendererThreadState::Running {
                slot.state = RendererThreadState::Paused;
            }
        }
        self.shared.cv.notify_all();
        self.wait_for_renderer_thread();
    }

    pub fn stop_renderer_thread(&mut self) {
        let mut join = false;
        if let Ok(mut slot) = self.shared.slot.lock() {
            if slot.state != RendererThreadState::Absent {
                slot.state = RendererThreadState::Stopping;
                join = true;
            }
        }
        if join {
            self.shared.cv.notify_all();
            if let Some(handle) = self.renderer_thread.take() {
                let _ = handle.join();
            }
            if let Ok(mut slot) = self.shared.slot.lock() {
                slot.state = RendererThreadState::Absent;
            }
            debug!("renderer thread stopped");
        }
    }

    fn wait_for_renderer_thread(&self) {
        let Ok(mut slot) = self.shared.slot.lock() else {
            return;
        };
        while slot.thread_owns_renderer {
            slot = match self.shared.cv.wait(slot) {
                Ok(slot) => slot,
                Err(_) => return,
            };
        }
    }

    fn dispatch_renderer_thread(&mut self) {
        let view = self.sim.renderable();
        if let Ok(mut slot) = self.shared.slot.lock() {
            if slot.state != RendererThreadState::Running {
                return;
            }
            if let Some(renderer) = &mut slot.renderer {
                renderer.apply_settings(self.renderer_settings);
            }
            slot.sim_view = Some(view);
            slot.thread_owns_renderer = true;
        }
        self.shared.cv.notify_all();
    }

    /// Run `f` against the renderer on the caller thread, pausing the
    /// renderer thread first. Used for thumbnails and synchronous
    /// exports.
    pub fn with_renderer_now<T>(&mut self, f: impl FnOnce(&mut Renderer) -> T) -> Option<T> {
        let was_running = self.renderer_thread_state() == RendererThreadState::Running;
        self.pause_renderer_thread();
        let out = match self.shared.slot.lock() {
            Ok(mut slot) => slot.renderer.as_mut().map(f),
            Err(_) => None,
        };
        if was_running {
            self.start_renderer_thread();
        }
        out
    }

    /// Render the current sim synchronously on the caller thread.
    pub fn render_now(&mut self) -> Option<RendererFrame> {
        let view = self.sim.renderable();
        self.with_renderer_now(move |renderer| {
            renderer.render(&view);
            renderer.frame().clone()
        })
    }

    // === History ===

    /// Snapshot the current state into the undo ring; called before each
    /// editing action.
    pub fn create_history_entry(&mut self) {
        self.history.push(&self.sim);
    }

    pub fn undo(&mut self) -> Result<(), HistoryError> {
        self.history.undo(&mut self.sim)
    }

    pub fn redo(&mut self) -> Result<(), HistoryError> {
        self.history.redo(&mut self.sim)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop_renderer_thread();
    }
}

/// Decode a save on a pool worker, render it into a scratch simulation
/// and hand back the frame; the receiver is polled from the UI tick.
pub fn render_thumbnail(
    pool: &ThreadPool,
    config: SimulationConfig,
    data: Vec<u8>,
    settings: RendererSettings,
) -> crossbeam_channel::Receiver<Result<RendererFrame, crate::save::ParseError>> {
    pool.submit(move || {
        let mut sim = Simulation::new(config)
            .map_err(|_| crate::save::ParseError::TooLarge)?;
        crate::save::Codec::default().load(&mut sim, &data)?;
        let mut renderer = Renderer::new(sim.cfg.xres, sim.cfg.yres, sim.cfg.cell);
        renderer.apply_settings(settings);
        renderer.clear_accumulation();
        renderer.render(&sim.renderable());
        Ok(renderer.frame().clone())
    })
}

fn renderer_thread(shared: &Arc<RendererShared>) {
    loop {
        let (mut renderer, view) = {
            let Ok(mut slot) = shared.slot.lock() else {
                return;
            };
            slot.thread_owns_renderer = false;
            shared.cv.notify_all();
            loop {
                if slot.state == RendererThreadState::Stopping {
                    return;
                }
                if slot.thread_owns_renderer {
                    break;
                }
                slot = match shared.cv.wait(slot) {
                    Ok(slot) => slot,
                    Err(_) => return,
                };
            }
            let renderer = slot.renderer.take();
            let view = slot.sim_view.take();
            match (renderer, view) {
                (Some(renderer), Some(view)) => (renderer, view),
                (renderer, _) => {
                    // Dispatched without a view; hand everything back.
                    slot.renderer = renderer;
                    slot.thread_owns_renderer = false;
                    warn!("renderer thread dispatched without a sim view");
                    continue;
                }
            }
        };
        renderer.render(&view);
        if let Ok(mut slot) = shared.slot.lock() {
            slot.renderer = Some(renderer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::PT_DUST;

    fn pipeline() -> Pipeline {
        Pipeline::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn frame_protocol_produces_frames() {
        let mut pipeline = pipeline();
        pipeline.sim.create_part(-2, 80, 60, PT_DUST);
        for _ in 0..3 {
            pipeline.before_frame();
            pipeline.tick();
            pipeline.before_gui();
            pipeline.after_frame();
        }
        // The presented frame lags one dispatch behind, so after three
        // frames the dust must be visible somewhere.
        let non_black = pipeline
            .frame()
            .data()
            .iter()
            .filter(|&&p| p & 0x00FF_FFFF != 0)
            .count();
        assert!(non_black > 0);
        assert_eq!(pipeline.renderer_thread_state(), RendererThreadState::Running);
    }

    #[test]
    fn pause_blocks_ticks_but_single_frames_run() {
        let mut pipeline = pipeline();
        pipeline.sim.sys_pause = true;
        pipeline.before_frame();
        pipeline.tick();
        pipeline.after_frame();
        assert_eq!(pipeline.sim.frame_count, 0);

        pipeline.sim.framerender = 1;
        pipeline.before_frame();
        pipeline.tick();
        pipeline.after_frame();
        assert_eq!(pipeline.sim.frame_count, 1);
        assert_eq!(pipeline.sim.framerender, 0);
    }

    #[test]
    fn render_now_works_with_and_without_the_thread() {
        let mut pipeline = pipeline();
        pipeline.sim.create_part(-2, 80, 60, PT_DUST);
        let frame = pipeline.render_now().unwrap();
        assert_ne!(frame[(80, 60)] & 0x00FF_FFFF, 0);

        pipeline.before_frame();
        pipeline.tick();
        pipeline.before_gui();
        pipeline.after_frame();
        let frame = pipeline.render_now().unwrap();
        assert_eq!(frame.width(), pipeline.sim.cfg.xres);
    }

    #[test]
    fn stop_renderer_thread_is_idempotent() {
        let mut pipeline = pipeline();
        pipeline.before_frame();
        pipeline.tick();
        pipeline.before_gui();
        pipeline.after_frame();
        pipeline.stop_renderer_thread();
        assert_eq!(pipeline.renderer_thread_state(), RendererThreadState::Absent);
        pipeline.stop_renderer_thread();
    }

    #[test]
    fn thumbnail_renders_on_a_worker() {
        let mut pipeline = pipeline();
        pipeline.sim.create_part(-2, 80, 60, PT_DUST);
        let bytes = crate::save::Codec::default().encode(&pipeline.sim).unwrap();
        let rx = render_thumbnail(
            &pipeline.pool,
            SimulationConfig::default(),
            bytes,
            RendererSettings::default(),
        );
        let frame = rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .unwrap()
            .unwrap();
        assert_ne!(frame[(80, 60)] & 0x00FF_FFFF, 0);
    }

    #[test]
    fn sim_hooks_run_around_each_tick() {
        let mut pipeline = pipeline();
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let c1 = std::sync::Arc::clone(&counter);
        let c2 = std::sync::Arc::clone(&counter);
        pipeline.register_before_sim(Box::new(move |_| {
            c1.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }));
        pipeline.register_after_sim(Box::new(move |_| {
            c2.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }));
        pipeline.before_frame();
        pipeline.tick();
        pipeline.after_frame();
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[test]
    fn new_sim_resets_state_and_history() {
        let mut pipeline = pipeline();
        pipeline.create_history_entry();
        pipeline.sim.create_part(-2, 80, 60, PT_DUST);
        pipeline.new_sim().unwrap();
        assert_eq!(pipeline.sim.num_parts, 0);
        assert!(pipeline.history.is_empty());
    }
}
