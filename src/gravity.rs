//! Newtonian gravity solver on a dedicated thread
//!
//! The main thread hands the solver a per-cell mass map and receives the
//! force field computed from the mass map of the previous tick; the
//! one-tick lag is part of the contract. Handover uses a mutex/condvar
//! pair: the solver computes whenever it holds an unconsumed mass map, the
//! main thread consumes results with `try_lock` so a slow solve never
//! stalls a frame.
//!
//! The solve itself is a direct sum over occupied cells (no FFT), run in
//! parallel over output rows when the `parallel` feature is on.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::{FullConfig, M_GRAV};
use crate::coord_stack::CoordStack;
use crate::plane::Plane;
use crate::walls::WL_GRAV;

/// Mass map filled by the sim each tick.
#[derive(Clone, Debug, PartialEq)]
pub struct GravityInput {
    pub mass: Plane<f32>,
}

impl GravityInput {
    pub fn new(cfg: &FullConfig) -> Self {
        GravityInput {
            mass: Plane::new(cfg.xcells, cfg.ycells),
        }
    }
}

/// Force field produced by the solver, consumed by the sim one tick later.
#[derive(Clone, Debug, PartialEq)]
pub struct GravityOutput {
    pub forcex: Plane<f32>,
    pub forcey: Plane<f32>,
}

impl GravityOutput {
    pub fn new(cfg: &FullConfig) -> Self {
        GravityOutput {
            forcex: Plane::new(cfg.xcells, cfg.ycells),
            forcey: Plane::new(cfg.xcells, cfg.ycells),
        }
    }

    pub fn clear(&mut self) {
        self.forcex.fill(0.0);
        self.forcey.fill(0.0);
    }
}

struct SolverState {
    th_gravmap: Plane<f32>,
    th_ogravmap: Plane<f32>,
    th_forcex: Plane<f32>,
    th_forcey: Plane<f32>,
    result_ready: bool,
    changed: bool,
    stopping: bool,
    ignore_next_result: bool,
}

pub struct GravityThread {
    shared: Arc<(Mutex<SolverState>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl GravityThread {
    pub fn start(cfg: &FullConfig) -> Self {
        let g = M_GRAV * cfg.cfds;
        let state = SolverState {
            th_gravmap: Plane::new(cfg.xcells, cfg.ycells),
            th_ogravmap: Plane::filled(cfg.xcells, cfg.ycells, f32::NAN),
            th_forcex: Plane::new(cfg.xcells, cfg.ycells),
            th_forcey: Plane::new(cfg.xcells, cfg.ycells),
            result_ready: false,
            changed: false,
            stopping: false,
            ignore_next_result: false,
        };
        let shared = Arc::new((Mutex::new(state), Condvar::new()));
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("ember-gravity".into())
            .spawn(move || solver_thread(&thread_shared, g))
            .ok();
        debug!("newtonian gravity solver started");
        GravityThread { shared, handle }
    }

    /// Per-tick handover: consume the previous result if one is ready,
    /// swap in the freshly accumulated mass map, mask the force field and
    /// reset the mass accumulator.
    pub fn update_async(
        &self,
        input: &mut GravityInput,
        output: &mut GravityOutput,
        gravmask: &Plane<u32>,
    ) {
        let (mutex, cv) = &*self.shared;
        let mut notify = false;
        if let Ok(mut state) = mutex.try_lock() {
            if state.result_ready {
                if state.changed && !state.ignore_next_result {
                    output.forcex.data_mut().copy_from_slice(state.th_forcex.data());
                    output.forcey.data_mut().copy_from_slice(state.th_forcey.data());
                }
                state.ignore_next_result = false;
                std::mem::swap(&mut input.mass, &mut state.th_gravmap);
                state.result_ready = false;
                notify = true;
            }
        }
        if notify {
            cv.notify_one();
        }
        for (i, mask) in gravmask.data().iter().enumerate() {
            if *mask == 0 {
                output.forcex.data_mut()[i] = 0.0;
                output.forcey.data_mut()[i] = 0.0;
            }
        }
        input.mass.fill(0.0);
    }

    /// Drop any in-flight result; used when the field is reset under the
    /// solver (snapshot restore, clear).
    pub fn ignore_next_result(&self) {
        let (mutex, _) = &*self.shared;
        if let Ok(mut state) = mutex.lock() {
            state.ignore_next_result = true;
        }
    }
}

impl Drop for GravityThread {
    fn drop(&mut self) {
        let (mutex, cv) = &*self.shared;
        if let Ok(mut state) = mutex.lock() {
            state.stopping = true;
        }
        cv.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        debug!("newtonian gravity solver stopped");
    }
}

fn solver_thread(shared: &Arc<(Mutex<SolverState>, Condvar)>, g: f32) {
    let (mutex, cv) = &**shared;
    let mut state = match mutex.lock() {
        Ok(state) => state,
        Err(_) => return,
    };
    loop {
        if state.stopping {
            return;
        }
        if !state.result_ready {
            let changed = state.th_gravmap != state.th_ogravmap;
            if changed {
                let (forcex, forcey) = solve(&state.th_gravmap, g);
                state.th_forcex = forcex;
                state.th_forcey = forcey;
            }
            let mass = state.th_gravmap.clone();
            state.th_ogravmap = mass;
            state.changed = changed;
            state.result_ready = true;
            cv.notify_all();
        } else {
            state = match cv.wait(state) {
                Ok(state) => state,
                Err(_) => return,
            };
        }
    }
}

/// Direct O(sources x cells) sum: force on a cell is `g * m / d^2` toward
/// each occupied cell, with cell-center distances.
fn solve(mass: &Plane<f32>, g: f32) -> (Plane<f32>, Plane<f32>) {
    let (w, h) = (mass.width(), mass.height());
    let sources: Vec<(f32, f32, f32)> = mass
        .iter_coords()
        .filter(|(_, _, m)| m.abs() > 0.0001)
        .map(|(x, y, m)| (x as f32, y as f32, *m))
        .collect();

    let mut forcex = Plane::new(w, h);
    let mut forcey = Plane::new(w, h);
    if sources.is_empty() {
        return (forcex, forcey);
    }

    let row = |cy: i32, fx_row: &mut [f32], fy_row: &mut [f32]| {
        for cx in 0..w {
            let mut ax = 0.0f32;
            let mut ay = 0.0f32;
            for &(sx, sy, m) in &sources {
                let dx = sx - cx as f32;
                let dy = sy - cy as f32;
                let d2 = dx * dx + dy * dy;
                if d2 < 0.0001 {
                    continue;
                }
                let inv_d3 = 1.0 / (d2 * d2.sqrt());
                ax += g * m * dx * inv_d3;
                ay += g * m * dy * inv_d3;
            }
            fx_row[cx as usize] = ax;
            fy_row[cx as usize] = ay;
        }
    };

    #[cfg(feature = "parallel")]
    {
        forcex
            .data_mut()
            .par_chunks_mut(w as usize)
            .zip(forcey.data_mut().par_chunks_mut(w as usize))
            .enumerate()
            .for_each(|(cy, (fx_row, fy_row))| row(cy as i32, fx_row, fy_row));
    }
    #[cfg(not(feature = "parallel"))]
    {
        for cy in 0..h {
            let start = (cy * w) as usize;
            let end = start + w as usize;
            let (fx, fy) = (forcex.data_mut(), forcey.data_mut());
            row(cy, &mut fx[start..end], &mut fy[start..end]);
        }
    }

    (forcex, forcey)
}

/// Recompute the gravity reachability mask: cells connected to any border
/// through non-grav-wall cells get `0xFFFFFFFF`, everything else 0.
pub fn update_gravity_mask(bmap: &Plane<u8>, gravmask: &mut Plane<u32>) {
    let (w, h) = (bmap.width(), bmap.height());
    gravmask.fill(0);
    let mut stack = CoordStack::new((w as usize) * (h as usize));
    let mut seed = |stack: &mut CoordStack, x: i32, y: i32| {
        if bmap[(x, y)] != WL_GRAV {
            let _ = stack.push(x, y);
        }
    };
    for x in 0..w {
        seed(&mut stack, x, 0);
        seed(&mut stack, x, h - 1);
    }
    for y in 0..h {
        seed(&mut stack, 0, y);
        seed(&mut stack, w - 1, y);
    }
    while let Some((x, y)) = stack.pop() {
        if gravmask[(x, y)] != 0 {
            continue;
        }
        gravmask[(x, y)] = 0xFFFF_FFFF;
        for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
            if nx >= 0 && nx < w && ny >= 0 && ny < h {
                if gravmask[(nx, ny)] == 0 && bmap[(nx, ny)] != WL_GRAV {
                    let _ = stack.push(nx, ny);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_points_toward_a_point_mass() {
        let mut mass = Plane::new(40, 40);
        mass[(20, 20)] = 100.0;
        let (fx, fy) = solve(&mass, 1.0);
        assert!(fx[(10, 20)] > 0.0);
        assert!(fx[(30, 20)] < 0.0);
        assert!(fy[(20, 10)] > 0.0);
        assert!(fy[(20, 30)] < 0.0);
        // Falls off with distance.
        assert!(fx[(10, 20)].abs() > fx[(2, 20)].abs());
    }

    #[test]
    fn mask_blocks_walled_off_regions() {
        let mut bmap: Plane<u8> = Plane::new(20, 20);
        // Wall off a 4x4 interior room with WL_GRAV.
        for i in 5..=10 {
            bmap[(i, 5)] = WL_GRAV;
            bmap[(i, 10)] = WL_GRAV;
            bmap[(5, i)] = WL_GRAV;
            bmap[(10, i)] = WL_GRAV;
        }
        let mut mask = Plane::new(20, 20);
        update_gravity_mask(&bmap, &mut mask);
        assert_eq!(mask[(0, 0)], 0xFFFF_FFFF);
        assert_eq!(mask[(7, 7)], 0);
        assert_eq!(mask[(5, 5)], 0);
    }

    #[test]
    fn thread_produces_forces_with_one_tick_lag() {
        let cfg = FullConfig::new(crate::config::SimulationConfig::default());
        let grav = GravityThread::start(&cfg);
        let mut input = GravityInput::new(&cfg);
        let mut output = GravityOutput::new(&cfg);
        let mask = Plane::filled(cfg.xcells, cfg.ycells, 0xFFFF_FFFFu32);

        input.mass[(50, 50)] = 500.0;
        grav.update_async(&mut input, &mut output, &mask);
        // The result arrives on a later tick; poll a few frames like the
        // sim loop does.
        let mut saw_force = false;
        for _ in 0..200 {
            input.mass[(50, 50)] = 500.0;
            grav.update_async(&mut input, &mut output, &mask);
            if output.forcex[(40, 50)] > 0.0 {
                saw_force = true;
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert!(saw_force);
    }
}
