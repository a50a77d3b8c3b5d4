//! The globe variant: one kernel writing the whole output image.

use vworld_engine::compute::{
    BindingScope, ComputeDevice, ComputeError, ComputeShader, DispatchHooks, ThreadGroupConfig,
};
use vworld_engine::paint::Color;

use crate::config::HarnessConfig;

pub const GLOBE_ENTRY_POINT: &str = "draw_globe";

/// Slot the output image is bound to; `@binding(0)` in the template.
pub const OUTPUT_SLOT: u32 = 0;

pub type GlobeShader<D> = ComputeShader<D, GlobeOutput<<D as ComputeDevice>::View>>;

/// Dispatch hooks of the globe: the output image is bound and cleared to the
/// sentinel before the dispatch, and unbound after it so the present stage
/// can sample it.
pub struct GlobeOutput<V> {
    image: V,
    sentinel: Color,
}

impl<V> GlobeOutput<V> {
    pub fn new(image: V, sentinel: Color) -> Self {
        Self { image, sentinel }
    }
}

impl<D: ComputeDevice> DispatchHooks<D> for GlobeOutput<D::View> {
    fn on_before_dispatch(&mut self, bindings: &mut BindingScope<'_, D>) {
        bindings.bind_view(OUTPUT_SLOT, &self.image);
        bindings.clear_view(&self.image, self.sentinel);
    }

    fn on_after_dispatch(&mut self, bindings: &mut BindingScope<'_, D>) {
        bindings.unbind(OUTPUT_SLOT);
    }
}

/// Builds the globe shader for `image`, sized so the thread groups cover the
/// configured surface.
pub fn globe_shader<D: ComputeDevice>(
    device: D,
    image: D::View,
    config: &HarnessConfig,
) -> Result<GlobeShader<D>, ComputeError> {
    let threads = ThreadGroupConfig::covering(config.surface_extent(), config.threads_per_group)?;
    if !threads.covers_exactly(config.surface_extent()) {
        log::warn!(
            "{:?} threads per group do not divide the {:?} surface; edge invocations are discarded",
            config.threads_per_group,
            config.surface_size
        );
    }

    ComputeShader::builder()
        .device(device)
        .template(&config.template)
        .entry_point(GLOBE_ENTRY_POINT)
        .threads(threads)
        .build(GlobeOutput::new(image, config.sentinel))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use vworld_engine::compute::mock::{DeviceEvent, EventLog, MockDevice, MockView};
    use vworld_engine::compute::{CompileFlags, ShaderLifecycleState, compile_wgsl, generator};

    const GLOBE_TEMPLATE_SOURCE: &str = include_str!("../shaders/globe.wgsl");

    fn config_in(dir: &Path) -> HarnessConfig {
        let template = dir.join("globe.wgsl");
        std::fs::write(&template, GLOBE_TEMPLATE_SOURCE).unwrap();
        HarnessConfig {
            template,
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn thread_groups_cover_the_surface() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let shader = globe_shader(MockDevice::new(), MockView(1), &config).unwrap();

        let threads = shader.threads();
        assert_eq!(threads.threads_per_group(), [8, 8, 1]);
        assert_eq!(threads.thread_groups(), [135, 135, 1]);
        assert!(threads.covers_exactly([1080, 1080, 1]));
        assert_eq!(shader.entry_point(), GLOBE_ENTRY_POINT);
    }

    #[test]
    fn dispatch_binds_clears_and_unbinds_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let log = EventLog::default();
        let mut shader =
            globe_shader(MockDevice::with_log(log.clone()), MockView(9), &config).unwrap();

        shader.dispatch().unwrap();
        assert_eq!(shader.state(), ShaderLifecycleState::Initialized);

        let events: Vec<_> = log
            .events()
            .into_iter()
            .filter(|e| !matches!(e, DeviceEvent::Compile { .. } | DeviceEvent::CreateKernel(_)))
            .collect();
        assert_eq!(
            events,
            vec![
                DeviceEvent::BindKernel(1),
                DeviceEvent::BindView {
                    slot: OUTPUT_SLOT,
                    view: Some(MockView(9)),
                },
                DeviceEvent::ClearView {
                    view: MockView(9),
                    color: Color::YELLOW,
                },
                DeviceEvent::Dispatch([135, 135, 1]),
                DeviceEvent::BindView {
                    slot: OUTPUT_SLOT,
                    view: None,
                },
            ]
        );
        assert_eq!(shader.device().bound_view(OUTPUT_SLOT), None);
    }

    #[test]
    fn generated_globe_is_valid_wgsl() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut shader = globe_shader(MockDevice::new(), MockView(1), &config).unwrap();
        shader.dispatch().unwrap();

        let generated = shader.generated_source().unwrap().to_path_buf();
        assert_eq!(generated, dir.path().join("globe_Generated.wgsl"));
        assert_eq!(generated, generator::generated_path(&config.template).unwrap());

        let source = std::fs::read_to_string(&generated).unwrap();
        assert!(source.contains("@workgroup_size(8, 8, 1)"));
        assert!(!source.contains("#threadCount"));

        let reflection =
            compile_wgsl(&source, GLOBE_ENTRY_POINT, CompileFlags::DEVELOPMENT).unwrap();
        assert_eq!(reflection.workgroup_size, [8, 8, 1]);
        assert_eq!(reflection.slots, vec![OUTPUT_SLOT]);
    }

    #[test]
    fn raw_template_does_not_compile() {
        let err = compile_wgsl(GLOBE_TEMPLATE_SOURCE, GLOBE_ENTRY_POINT, CompileFlags::DEVELOPMENT)
            .unwrap_err();
        assert!(!err.is_empty());
    }
}
