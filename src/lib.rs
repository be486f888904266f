//! Oscar is a hardware-abstraction framework for a family of embedded
//! smart-camera boards built around a Blackfin DSP and a Micron
//! MT9V032 CMOS image sensor.
//!
//! The same application code runs in two environments:
//!
//! - **host**: a development machine, where captures are simulated by
//!   reading test images from disk and DMA chains execute in software;
//! - **target**: the camera itself (`hardware` cargo feature), where
//!   the capture pipeline drives the sensor kernel driver over ioctls
//!   and DMA chains run on the DSP's memory-DMA channels.
//!
//! The crate is organized around explicit contexts rather than process
//! globals: the application builds a [`Framework`] (host) or a
//! [`Camera`] over a backend of its choice and threads it through its
//! code.
//!
//! # Overview of the pieces
//!
//! - [`camera`]: the capture pipeline (frame-buffer registry, capture
//!   window and exposure arithmetic, the capture state machine and the
//!   multi-buffer rotation).
//! - [`dma`]: re-usable descriptor chains for 1-D and 2-D memory
//!   moves with sync points.
//! - [`calibration`]: FPN/PRNU and hot-pixel correction, registered
//!   as the pipeline's correction hook.
//! - [`debayer`]: demosaic kernels producing BGR, half-size greyscale
//!   and spot-colour output.
//! - [`backend`]: the host/target capability split everything above
//!   rests on.
//! - [`bitmap`], [`filename_reader`], [`simulation`], [`ipc`]: host
//!   simulation and tooling collaborators.

pub mod backend;
pub mod bitmap;
pub mod calibration;
pub mod camera;
pub mod debayer;
pub mod dma;
pub mod error;
pub mod filename_reader;
pub mod framework;
pub mod ipc;
pub mod picture;
pub mod simulation;

pub use backend::{BackendKind, CameraBackend, CaptureWindow, HostBackend, TriggerMode};
#[cfg(feature = "hardware")]
pub use backend::TargetBackend;
pub use calibration::{Calibration, CalibrationMode};
pub use camera::{BufferSelect, Camera, FrameBufferStatus, ImageCorrection, Perspective};
pub use debayer::BayerOrder;
pub use dma::{ChainHandle, DmaAddr, DmaEngine, DmaWordSize};
pub use error::{OscarError, OscarResult};
pub use filename_reader::FilenameReader;
pub use framework::Framework;
pub use picture::{Picture, PictureType, PictureView};
pub use simulation::Simulation;
