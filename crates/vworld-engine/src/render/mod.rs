//! GPU rendering subsystem.
//!
//! Owns the image shared between the compute stage and the present stage,
//! and the full-screen quad that puts it on screen.

mod ctx;
mod fsq;
mod image;

pub use ctx::{RenderCtx, RenderTarget};
pub use fsq::FullScreenQuad;
pub use image::OutputImage;
