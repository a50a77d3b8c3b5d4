use std::ffi::OsString;
use std::path::PathBuf;

use vworld_engine::paint::Color;

/// Environment variable naming the directory that holds `globe.wgsl`.
pub const SHADER_DIR_ENV: &str = "VWORLD_SHADER_DIR";

pub const GLOBE_TEMPLATE: &str = "globe.wgsl";

/// Harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub title: String,
    /// Window client area, physical pixels.
    pub window_size: [u32; 2],
    /// Extent of the image the compute stage writes.
    pub surface_size: [u32; 2],
    pub threads_per_group: [u32; 3],
    pub template: PathBuf,
    /// Colour the output image is cleared to before each dispatch.
    pub sentinel: Color,
    /// Colour the back buffer is cleared to before the image is drawn.
    pub backdrop: Color,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            title: "Solar simulation".to_string(),
            window_size: [1080, 1080],
            surface_size: [1080, 1080],
            threads_per_group: [8, 8, 1],
            template: shader_dir(std::env::var_os(SHADER_DIR_ENV)).join(GLOBE_TEMPLATE),
            sentinel: Color::YELLOW,
            backdrop: Color::BLUE,
        }
    }
}

impl HarnessConfig {
    /// Compute extent as a dispatch-sized triple.
    pub fn surface_extent(&self) -> [u32; 3] {
        [self.surface_size[0], self.surface_size[1], 1]
    }
}

/// `override_dir` when set and non-empty, else the `shaders` directory shipped with this crate.
fn shader_dir(override_dir: Option<OsString>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders"),
    }
}
