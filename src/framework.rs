//! Top-level context for the host simulation stack.
//!
//! The application constructs one [`Framework`], which wires the
//! simulation clock, the host backend with its optional filename
//! reader, the capture pipeline and the DMA engine, and tears them
//! down in dependency order on shutdown. On the camera itself there is
//! no simulation: applications build a `Camera` over the target
//! backend directly.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::backend::host::{HostBackend, SharedReader, SharedSimulation};
use crate::camera::Camera;
use crate::dma::DmaEngine;
use crate::error::{OscarError, OscarResult};
use crate::simulation::Simulation;

pub struct Framework {
    sim: SharedSimulation,
    reader: Option<SharedReader>,
    camera: Camera<HostBackend>,
    dma: DmaEngine,
}

impl Framework {
    /// A host framework without a filename reader. Captures fail until
    /// a reader is attached; register and DMA work is fully available.
    pub fn host() -> OscarResult<Self> {
        let sim: SharedSimulation = Arc::new(Mutex::new(Simulation::new()));
        let backend = HostBackend::new(Arc::clone(&sim));
        Ok(Framework {
            sim,
            reader: None,
            camera: Camera::new(backend)?,
            dma: DmaEngine::new(),
        })
    }

    /// A host framework whose captures replay the images named by the
    /// reader configured in `reader_config`.
    pub fn host_with_reader_config(reader_config: &Path) -> OscarResult<Self> {
        let sim: SharedSimulation = Arc::new(Mutex::new(Simulation::new()));
        let mut backend = HostBackend::new(Arc::clone(&sim));
        let reader = backend.set_filename_reader_from_config(reader_config)?;
        Ok(Framework {
            sim,
            reader: Some(reader),
            camera: Camera::new(backend)?,
            dma: DmaEngine::new(),
        })
    }

    pub fn camera(&mut self) -> &mut Camera<HostBackend> {
        &mut self.camera
    }

    pub fn dma(&mut self) -> &mut DmaEngine {
        &mut self.dma
    }

    /// A shareable handle to the simulation clock. Holding it across
    /// [`Framework::shutdown`] makes the shutdown fail.
    pub fn simulation(&self) -> SharedSimulation {
        Arc::clone(&self.sim)
    }

    /// Fire the per-tick callbacks once at time step zero.
    pub fn sim_initialize(&mut self) {
        self.sim
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .initialize();
    }

    /// Advance simulated time by one step.
    pub fn sim_step(&mut self) {
        self.sim
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .step();
    }

    /// Tear the framework down in dependency order. Fails with
    /// `CannotUnload` when simulation handles given out by
    /// [`Framework::simulation`] are still alive.
    pub fn shutdown(self) -> OscarResult<()> {
        let Framework {
            sim,
            reader,
            camera,
            dma,
        } = self;
        // The camera owns the backend, which holds the other clock and
        // reader handles; it goes first.
        drop(camera);
        drop(dma);
        drop(reader);

        if Arc::strong_count(&sim) > 1 {
            return Err(OscarError::CannotUnload);
        }
        debug!("framework shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_succeeds_without_outstanding_handles() {
        let fw = Framework::host().unwrap();
        fw.shutdown().unwrap();
    }

    #[test]
    fn shutdown_refuses_while_a_clock_handle_is_held() {
        let fw = Framework::host().unwrap();
        let handle = fw.simulation();
        assert!(matches!(fw.shutdown(), Err(OscarError::CannotUnload)));
        drop(handle);
    }
}
