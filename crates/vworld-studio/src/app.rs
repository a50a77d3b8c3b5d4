use std::time::Instant;

use vworld_engine::compute::{ComputeError, WgpuComputeDevice};
use vworld_engine::core::{App, AppControl, FrameCtx};
use vworld_engine::render::{FullScreenQuad, OutputImage};

use crate::config::HarnessConfig;
use crate::globe::{GlobeShader, globe_shader};

/// GPU objects that need a live device; created on the first frame.
struct Stages {
    globe: GlobeShader<WgpuComputeDevice>,
    present: FullScreenQuad,
}

/// Per frame: run the globe kernel into the output image, then draw that
/// image over the window with the full-screen quad.
pub struct WorldApp {
    config: HarnessConfig,
    stages: Option<Stages>,
}

impl WorldApp {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            stages: None,
        }
    }

    fn stages(&mut self, ctx: &FrameCtx<'_, '_>) -> Result<&mut Stages, ComputeError> {
        let stages = match self.stages.take() {
            Some(stages) => stages,
            None => self.create_stages(ctx)?,
        };
        Ok(self.stages.insert(stages))
    }

    fn create_stages(&self, ctx: &FrameCtx<'_, '_>) -> Result<Stages, ComputeError> {
        let [width, height] = self.config.surface_size;
        let image = OutputImage::new(ctx.gpu.device(), width, height);
        let present = FullScreenQuad::new(ctx.gpu.device(), image.clone(), self.config.backdrop);
        let extent = image.extent();
        let globe = globe_shader(ctx.gpu.compute_device(), image, &self.config)?;

        log::info!(
            "output image {:?}, {:?} thread groups",
            extent,
            globe.threads().thread_groups()
        );

        Ok(Stages { globe, present })
    }
}

impl App for WorldApp {
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        let first_frame = ctx.time.is_first_frame();
        let started = Instant::now();

        let stages = match self.stages(ctx) {
            Ok(stages) => stages,
            Err(e) => {
                log::error!("failed to set up render stages: {:#}", anyhow::Error::from(e));
                return AppControl::Exit;
            }
        };

        // The first dispatch generates and compiles the kernel inline.
        if let Err(e) = stages.globe.dispatch() {
            log::error!("globe dispatch failed: {:#}", anyhow::Error::from(e));
            return AppControl::Exit;
        }

        if first_frame {
            log::info!(
                "first frame dispatched in {:?} (includes kernel compilation)",
                started.elapsed()
            );
        }

        let present = &mut stages.present;
        ctx.render(|rctx, target| present.draw(rctx, target))
    }

    fn on_exit(&mut self) {
        if let Some(Stages { globe, present }) = self.stages.take() {
            drop(present);
            globe.release();
            log::info!("render stages released");
        }
    }
}
