//! Virtual-world engine crate.
//!
//! Owns the compute-shader lifecycle (markup generation, lazy compilation,
//! dispatch protocol) and the platform + GPU runtime that presents its output.

pub mod compute;
pub mod core;
pub mod device;
pub mod logging;
pub mod paint;
pub mod render;
pub mod time;
pub mod window;
