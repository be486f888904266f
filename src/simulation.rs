//! Logical simulation time for the host build.
//!
//! The host has no frame clock, so tests and applications drive one
//! explicitly: every [`Simulation::step`] advances a time-step counter
//! and invokes the registered per-tick callbacks. The filename reader
//! uses a tick to move to the next test image.

use crate::error::OscarResult;

/// A callback invoked once per simulation step with the new time step.
pub type CycleCallback = Box<dyn FnMut(u32) + Send>;

/// Logical time counter with per-tick callback registry.
#[derive(Default)]
pub struct Simulation {
    time_step: u32,
    callbacks: Vec<CycleCallback>,
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current logical time step. Starts at zero.
    pub fn time_step(&self) -> u32 {
        self.time_step
    }

    /// Register a callback to run after every step.
    pub fn register_cycle_callback(&mut self, callback: CycleCallback) -> OscarResult<()> {
        self.callbacks.push(callback);
        Ok(())
    }

    /// Fire all callbacks once at the current time step, without
    /// advancing. Run this once after wiring everything up so that
    /// callbacks observe step zero.
    pub fn initialize(&mut self) {
        let step = self.time_step;
        for cb in &mut self.callbacks {
            cb(step);
        }
    }

    /// Advance logical time by one step and fire the callbacks.
    pub fn step(&mut self) {
        self.time_step += 1;
        let step = self.time_step;
        for cb in &mut self.callbacks {
            cb(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn callbacks_observe_each_step() {
        let seen = Arc::new(AtomicU32::new(0));
        let mut sim = Simulation::new();
        let seen2 = Arc::clone(&seen);
        sim.register_cycle_callback(Box::new(move |step| {
            seen2.store(step, Ordering::SeqCst);
        }))
        .unwrap();

        sim.initialize();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        sim.step();
        sim.step();
        assert_eq!(sim.time_step(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
