//! Image processing: cropping, batch cropping and composition
//!
//! Everything here is synchronous and CPU-bound. The `*_async` wrappers move
//! work onto tokio's blocking pool so the UI thread never decodes.

pub mod batch;
pub mod compose;
pub mod crop;
pub mod text;
