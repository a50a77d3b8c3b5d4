//! Colour values shared by the compute and present stages.

mod color;

pub use color::Color;
