use std::path::{Path, PathBuf};
use std::time::Instant;

use super::device::{BindingScope, COMPUTE_PROFILE, CompileFlags, CompileRequest, ComputeDevice};
use super::error::ComputeError;
use super::generator;
use super::markup::{MarkupTag, TagSet};
use super::threads::ThreadGroupConfig;

/// Extension points around the dispatch call.
///
/// Both hooks default to no-ops. Views bound through the scope in
/// `on_before_dispatch` are unbound automatically once the dispatch is over,
/// so `on_after_dispatch` only has to undo what the scope cannot know about.
pub trait DispatchHooks<D: ComputeDevice> {
    /// Runs after the kernel is bound and before the dispatch is issued.
    fn on_before_dispatch(&mut self, bindings: &mut BindingScope<'_, D>) {
        let _ = bindings;
    }

    /// Runs after the dispatch is issued.
    fn on_after_dispatch(&mut self, bindings: &mut BindingScope<'_, D>) {
        let _ = bindings;
    }
}

/// Hooks for kernels that need no resource setup.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoHooks;

impl<D: ComputeDevice> DispatchHooks<D> for NoHooks {}

/// One-way lifecycle of a [`ComputeShader`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShaderLifecycleState {
    Uninitialized,
    Initialized,
}

/// Collects the construction parameters of a [`ComputeShader`].
///
/// Nothing touches the filesystem or the device until the first dispatch.
pub struct ComputeShaderBuilder<D> {
    device: Option<D>,
    template: Option<PathBuf>,
    entry_point: Option<String>,
    threads: Option<ThreadGroupConfig>,
    tags: TagSet,
}

impl<D: ComputeDevice> ComputeShaderBuilder<D> {
    pub fn device(mut self, device: D) -> Self {
        self.device = Some(device);
        self
    }

    /// Path of the template source; the generated file is written next to it.
    pub fn template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template = Some(path.into());
        self
    }

    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = Some(name.into());
        self
    }

    pub fn threads(mut self, threads: ThreadGroupConfig) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Adds a variant-specific tag, applied before the thread-count tags.
    pub fn tag(mut self, tag: MarkupTag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Fails with [`ComputeError::InvalidArgument`] if the device, template,
    /// entry point or thread configuration is missing or empty.
    pub fn build<H: DispatchHooks<D>>(self, hooks: H) -> Result<ComputeShader<D, H>, ComputeError> {
        let device = self
            .device
            .ok_or_else(|| ComputeError::invalid("compute shader requires a device"))?;

        let template = self
            .template
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| ComputeError::invalid("compute shader requires a template path"))?;

        let entry_point = self
            .entry_point
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ComputeError::invalid("compute shader requires an entry point"))?;

        let threads = self.threads.ok_or_else(|| {
            ComputeError::invalid("compute shader requires a thread group configuration")
        })?;

        Ok(ComputeShader {
            device,
            template,
            entry_point,
            threads,
            tags: self.tags,
            kernel: None,
            generated: None,
            failed_attempts: 0,
            hooks,
        })
    }
}

/// A compute kernel compiled lazily from a tagged template.
///
/// The first [`dispatch`](Self::dispatch) expands the template (variant tags,
/// then `threadCountX/Y/Z`), compiles it and caches the kernel; later calls
/// go straight to bind, pre-hook, dispatch, post-hook. A failed
/// initialization caches nothing and is retried by the next dispatch.
///
/// Not synchronized: callers must serialize access, which `&mut self`
/// already enforces within safe code.
pub struct ComputeShader<D: ComputeDevice, H = NoHooks> {
    device: D,
    template: PathBuf,
    entry_point: String,
    threads: ThreadGroupConfig,
    tags: TagSet,
    kernel: Option<D::Kernel>,
    generated: Option<PathBuf>,
    failed_attempts: u32,
    hooks: H,
}

impl<D: ComputeDevice> ComputeShader<D> {
    pub fn builder() -> ComputeShaderBuilder<D> {
        ComputeShaderBuilder {
            device: None,
            template: None,
            entry_point: None,
            threads: None,
            tags: TagSet::new(),
        }
    }
}

impl<D: ComputeDevice, H: DispatchHooks<D>> ComputeShader<D, H> {
    pub fn state(&self) -> ShaderLifecycleState {
        if self.kernel.is_some() {
            ShaderLifecycleState::Initialized
        } else {
            ShaderLifecycleState::Uninitialized
        }
    }

    pub fn template_path(&self) -> &Path {
        &self.template
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn threads(&self) -> ThreadGroupConfig {
        self.threads
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Path of the most recent generated source, once one was written.
    pub fn generated_source(&self) -> Option<&Path> {
        self.generated.as_deref()
    }

    /// Adds a tag before the first successful initialization.
    pub fn add_tag(&mut self, tag: MarkupTag) -> Result<(), ComputeError> {
        if self.kernel.is_some() {
            return Err(ComputeError::invalid(format!(
                "tag `{}` added after `{}` was compiled",
                tag.name(),
                self.entry_point
            )));
        }
        self.tags.push(tag);
        Ok(())
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Runs the kernel once: initialize if needed, bind the kernel, run the
    /// pre-dispatch hook, dispatch the configured groups, run the
    /// post-dispatch hook. Steps run in that order on the calling thread.
    pub fn dispatch(&mut self) -> Result<(), ComputeError> {
        if self.kernel.is_none() {
            let kernel = self.initialize()?;
            self.kernel = Some(kernel);
        }
        let Some(kernel) = self.kernel.as_ref() else {
            return Err(ComputeError::Dispatch(format!(
                "`{}` has no kernel after initialization",
                self.entry_point
            )));
        };

        self.device.bind_kernel(kernel);

        let mut bindings = BindingScope::new(&mut self.device);
        self.hooks.on_before_dispatch(&mut bindings);
        bindings.dispatch(self.threads.thread_groups())?;
        self.hooks.on_after_dispatch(&mut bindings);

        Ok(())
    }

    /// Releases the compiled kernel, if any. Consumes the shader, so it
    /// cannot be dispatched afterwards.
    pub fn release(mut self) {
        if let Some(kernel) = self.kernel.take() {
            log::debug!("releasing compute kernel `{}`", self.entry_point);
            self.device.release_kernel(kernel);
        }
    }

    fn initialize(&mut self) -> Result<D::Kernel, ComputeError> {
        if self.failed_attempts > 0 {
            log::warn!(
                "retrying initialization of `{}` ({} previous failure(s))",
                self.entry_point,
                self.failed_attempts
            );
        }

        match self.try_initialize() {
            Ok(kernel) => {
                self.failed_attempts = 0;
                Ok(kernel)
            }
            Err(e) => {
                self.failed_attempts += 1;
                Err(e)
            }
        }
    }

    fn try_initialize(&mut self) -> Result<D::Kernel, ComputeError> {
        let started = Instant::now();

        let tags = self.tags.with_thread_counts(&self.threads);
        let generated = generator::generate_file(&self.template, &tags)?;
        self.generated = Some(generated.clone());

        let request = CompileRequest {
            path: &generated,
            entry_point: &self.entry_point,
            profile: COMPUTE_PROFILE,
            flags: CompileFlags::DEVELOPMENT,
        };
        let bytecode = self.device.compile_kernel(&request)?;
        let kernel = self.device.create_kernel(bytecode)?;

        log::info!(
            "compiled `{}` from `{}` with {:?} threads per group in {:?}",
            self.entry_point,
            generated.display(),
            self.threads.threads_per_group(),
            started.elapsed()
        );

        Ok(kernel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::mock::{DeviceEvent, EventLog, MockDevice, MockView, RecordingHooks};
    use crate::paint::Color;

    const TEMPLATE: &str = "\
@compute @workgroup_size(#threadCountX#, #threadCountY#, #threadCountZ#)
fn draw(@builtin(global_invocation_id) id: vec3<u32>) {
    let tint = #tint#;
}
";

    fn threads() -> ThreadGroupConfig {
        ThreadGroupConfig::new([8, 8, 1], [135, 135, 1]).unwrap()
    }

    fn write_template(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("kernel.wgsl");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn shader_with<H: DispatchHooks<MockDevice>>(
        device: MockDevice,
        template: &Path,
        hooks: H,
    ) -> ComputeShader<MockDevice, H> {
        ComputeShader::builder()
            .device(device)
            .template(template)
            .entry_point("draw")
            .threads(threads())
            .tag(MarkupTag::new("tint", "0.5").unwrap())
            .build(hooks)
            .unwrap()
    }

    #[test]
    fn missing_device_is_invalid() {
        let err = ComputeShader::<MockDevice>::builder()
            .template("kernel.wgsl")
            .entry_point("draw")
            .threads(threads())
            .build(NoHooks)
            .err()
            .unwrap();
        assert!(matches!(err, ComputeError::InvalidArgument(_)));
    }

    #[test]
    fn missing_or_empty_template_is_invalid() {
        let log = EventLog::default();
        for template in [None, Some("")] {
            let mut builder = ComputeShader::builder()
                .device(MockDevice::with_log(log.clone()))
                .entry_point("draw")
                .threads(threads());
            if let Some(t) = template {
                builder = builder.template(t);
            }
            assert!(matches!(
                builder.build(NoHooks).err().unwrap(),
                ComputeError::InvalidArgument(_)
            ));
        }
        assert!(log.is_empty());
    }

    #[test]
    fn missing_or_empty_entry_point_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), TEMPLATE);
        let log = EventLog::default();

        for entry in [None, Some("")] {
            let mut builder = ComputeShader::builder()
                .device(MockDevice::with_log(log.clone()))
                .template(&template)
                .threads(threads());
            if let Some(e) = entry {
                builder = builder.entry_point(e);
            }
            assert!(matches!(
                builder.build(NoHooks).err().unwrap(),
                ComputeError::InvalidArgument(_)
            ));
        }

        // No device call and no generated artifact.
        assert!(log.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn construction_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), TEMPLATE);
        let log = EventLog::default();

        let shader = shader_with(MockDevice::with_log(log.clone()), &template, NoHooks);
        assert_eq!(shader.state(), ShaderLifecycleState::Uninitialized);
        assert!(shader.generated_source().is_none());
        assert!(log.is_empty());
        assert!(!dir.path().join("kernel_Generated.wgsl").exists());
    }

    #[test]
    fn first_dispatch_compiles_once() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), TEMPLATE);
        let log = EventLog::default();
        let mut shader = shader_with(MockDevice::with_log(log.clone()), &template, NoHooks);

        shader.dispatch().unwrap();
        assert_eq!(shader.state(), ShaderLifecycleState::Initialized);
        assert_eq!(log.compile_count(), 1);

        shader.dispatch().unwrap();
        assert_eq!(log.compile_count(), 1);

        let dispatches = log
            .events()
            .into_iter()
            .filter(|e| *e == DeviceEvent::Dispatch([135, 135, 1]))
            .count();
        assert_eq!(dispatches, 2);
    }

    #[test]
    fn compile_request_uses_generated_sibling_and_development_flags() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), TEMPLATE);
        let log = EventLog::default();
        let mut shader = shader_with(MockDevice::with_log(log.clone()), &template, NoHooks);

        shader.dispatch().unwrap();

        let generated = dir.path().join("kernel_Generated.wgsl");
        assert_eq!(shader.generated_source(), Some(generated.as_path()));
        assert_eq!(
            log.events()[0],
            DeviceEvent::Compile {
                path: generated.clone(),
                entry_point: "draw".to_string(),
                profile: COMPUTE_PROFILE.to_string(),
                flags: CompileFlags::DEVELOPMENT,
            }
        );

        let source = std::fs::read_to_string(&generated).unwrap();
        assert!(source.starts_with("@compute @workgroup_size(8, 8, 1)\n"));
        assert!(source.contains("let tint = 0.5;"));
        assert!(!source.contains('#'));
    }

    #[test]
    fn protocol_runs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), TEMPLATE);
        let log = EventLog::default();
        let hooks = RecordingHooks::new(log.clone());
        let mut shader = shader_with(MockDevice::with_log(log.clone()), &template, hooks);

        shader.dispatch().unwrap();
        log.clear();
        shader.dispatch().unwrap();

        assert_eq!(
            log.events(),
            vec![
                DeviceEvent::BindKernel(1),
                DeviceEvent::Hook(RecordingHooks::BEFORE),
                DeviceEvent::Dispatch([135, 135, 1]),
                DeviceEvent::Hook(RecordingHooks::AFTER),
            ]
        );
    }

    #[test]
    fn compile_failure_keeps_shader_uninitialized_and_retry_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), &TEMPLATE.replace("let tint", "BROKEN let tint"));
        let log = EventLog::default();
        let device = MockDevice::with_log(log.clone()).rejecting("BROKEN");
        let mut shader = shader_with(device, &template, RecordingHooks::new(log.clone()));

        let err = shader.dispatch().unwrap_err();
        match &err {
            ComputeError::ShaderCompilation { entry_point, diagnostics, .. } => {
                assert_eq!(entry_point, "draw");
                assert!(diagnostics.contains("BROKEN"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(shader.state(), ShaderLifecycleState::Uninitialized);
        // Nothing past the failed compile ran.
        assert_eq!(log.len(), 1);

        std::fs::write(&template, TEMPLATE).unwrap();
        shader.dispatch().unwrap();
        assert_eq!(shader.state(), ShaderLifecycleState::Initialized);
        assert_eq!(log.compile_count(), 2);

        // The retry did not stack a second set of thread-count tags.
        assert_eq!(shader.tags().len(), 1);
    }

    #[test]
    fn missing_template_is_io_error_and_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("kernel.wgsl");
        let log = EventLog::default();
        let mut shader = shader_with(MockDevice::with_log(log.clone()), &template, NoHooks);

        assert!(matches!(shader.dispatch(), Err(ComputeError::Io { .. })));
        assert_eq!(shader.state(), ShaderLifecycleState::Uninitialized);
        assert!(log.is_empty());

        std::fs::write(&template, TEMPLATE).unwrap();
        shader.dispatch().unwrap();
        assert_eq!(log.compile_count(), 1);
    }

    #[test]
    fn tags_can_be_added_until_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), "fn draw() { #extra# }\n");
        let mut shader = ComputeShader::builder()
            .device(MockDevice::new())
            .template(&template)
            .entry_point("draw")
            .threads(threads())
            .build(NoHooks)
            .unwrap();

        shader.add_tag(MarkupTag::new("extra", "return;").unwrap()).unwrap();
        shader.dispatch().unwrap();

        let source = std::fs::read_to_string(shader.generated_source().unwrap()).unwrap();
        assert_eq!(source, "fn draw() { return; }\n");
        assert!(shader.add_tag(MarkupTag::new("late", "1").unwrap()).is_err());
    }

    #[test]
    fn release_disposes_kernel_once() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), TEMPLATE);
        let log = EventLog::default();
        let mut shader = shader_with(MockDevice::with_log(log.clone()), &template, NoHooks);

        shader.dispatch().unwrap();
        shader.release();

        let releases: Vec<_> = log
            .events()
            .into_iter()
            .filter(|e| matches!(e, DeviceEvent::ReleaseKernel(_)))
            .collect();
        assert_eq!(releases, vec![DeviceEvent::ReleaseKernel(1)]);
    }

    #[test]
    fn release_before_first_dispatch_is_a_no_op() {
        let log = EventLog::default();
        let shader = shader_with(
            MockDevice::with_log(log.clone()),
            Path::new("unused.wgsl"),
            NoHooks,
        );
        shader.release();
        assert!(log.is_empty());
    }

    struct OutputHooks {
        view: MockView,
        log: EventLog,
    }

    impl DispatchHooks<MockDevice> for OutputHooks {
        fn on_before_dispatch(&mut self, bindings: &mut BindingScope<'_, MockDevice>) {
            bindings.bind_view(3, &self.view);
            bindings.clear_view(&self.view, Color::YELLOW);
        }

        fn on_after_dispatch(&mut self, bindings: &mut BindingScope<'_, MockDevice>) {
            self.log.push(DeviceEvent::Hook("still bound"));
            assert_eq!(bindings.owned_slots(), &[3]);
        }
    }

    #[test]
    fn scope_unbinds_slots_left_bound_by_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), TEMPLATE);
        let log = EventLog::default();
        let hooks = OutputHooks {
            view: MockView(7),
            log: log.clone(),
        };
        let mut shader = shader_with(MockDevice::with_log(log.clone()), &template, hooks);

        shader.dispatch().unwrap();

        let events = log.events();
        let tail = &events[events.len() - 5..];
        assert_eq!(
            tail,
            &[
                DeviceEvent::BindView { slot: 3, view: Some(MockView(7)) },
                DeviceEvent::ClearView { view: MockView(7), color: Color::YELLOW },
                DeviceEvent::Dispatch([135, 135, 1]),
                DeviceEvent::Hook("still bound"),
                DeviceEvent::BindView { slot: 3, view: None },
            ]
        );
        assert_eq!(shader.device().bound_view(3), None);
    }

    struct FailingDispatchHooks;

    impl DispatchHooks<MockDevice> for FailingDispatchHooks {
        fn on_before_dispatch(&mut self, bindings: &mut BindingScope<'_, MockDevice>) {
            bindings.bind_view(0, &MockView(1));
        }

        fn on_after_dispatch(&mut self, _bindings: &mut BindingScope<'_, MockDevice>) {
            panic!("post-dispatch hook must not run after a failed dispatch");
        }
    }

    #[test]
    fn failed_dispatch_still_releases_slots() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), TEMPLATE);
        let log = EventLog::default();
        let device = MockDevice::with_log(log.clone()).failing_dispatch("device lost");
        let mut shader = shader_with(device, &template, FailingDispatchHooks);

        let err = shader.dispatch().unwrap_err();
        assert!(matches!(err, ComputeError::Dispatch(ref msg) if msg == "device lost"));

        // Initialization succeeded even though the dispatch did not.
        assert_eq!(shader.state(), ShaderLifecycleState::Initialized);
        let events = log.events();
        assert_eq!(
            &events[events.len() - 2..],
            &[
                DeviceEvent::BindView { slot: 0, view: Some(MockView(1)) },
                DeviceEvent::BindView { slot: 0, view: None },
            ]
        );
        assert_eq!(shader.device().bound_view(0), None);
    }
}
