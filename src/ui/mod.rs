//! Crop editor surface: the canvas overlay and the gesture state machine behind it

pub mod canvas;
pub mod gesture;
