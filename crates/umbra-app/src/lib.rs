//! Umbra application framework.
//!
//! Opens the window, owns the GPU context and drives a [`FrameHandler`]
//! once per redraw.

pub mod frame_clock;
pub mod window;

pub use frame_clock::{FrameClock, MAX_FRAME_TIME};
pub use window::{AppState, FrameHandler, run, window_attributes_from_config};
