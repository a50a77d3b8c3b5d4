use anyhow::Result;
use winit::dpi::PhysicalSize;

use vworld_engine::device::GpuInit;
use vworld_engine::logging::{LoggingConfig, init_logging};
use vworld_engine::window::{Runtime, RuntimeConfig};

mod app;
mod config;
mod globe;

use app::WorldApp;
use config::HarnessConfig;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = HarnessConfig::default();
    log::info!("globe template: {}", config.template.display());

    let [width, height] = config.window_size;
    let runtime = RuntimeConfig {
        title: config.title.clone(),
        initial_size: PhysicalSize::new(width, height),
        resizable: false,
    };

    Runtime::run(runtime, GpuInit::default(), WorldApp::new(config))
}
