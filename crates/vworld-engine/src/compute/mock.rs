//! Recording test double for [`ComputeDevice`].
//!
//! Records every device call into a shared, ordered [`EventLog`] and never
//! touches a GPU. Compilation reads the generated file from disk, so scripted
//! failures match against the expanded source.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::paint::Color;

use super::device::{BindingScope, CompileFlags, CompileRequest, ComputeDevice};
use super::error::ComputeError;
use super::shader::DispatchHooks;

/// Record of one call made against the device (or a hook).
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Compile {
        path: PathBuf,
        entry_point: String,
        profile: String,
        flags: CompileFlags,
    },
    CreateKernel(u32),
    BindKernel(u32),
    BindView { slot: u32, view: Option<MockView> },
    ClearView { view: MockView, color: Color },
    Dispatch([u32; 3]),
    ReleaseKernel(u32),
    Hook(&'static str),
}

/// Shared, append-only event log. Clones observe the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<DeviceEvent>>>);

impl EventLog {
    pub fn push(&self, event: DeviceEvent) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Number of compile calls recorded so far.
    pub fn compile_count(&self) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|e| matches!(e, DeviceEvent::Compile { .. }))
            .count()
    }
}

/// Bytecode produced by [`MockDevice`].
#[derive(Debug, Clone)]
pub struct MockBytecode {
    pub entry_point: String,
}

/// Kernels are numbered from 1 in creation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockKernel {
    pub id: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MockView(pub u32);

#[derive(Debug, Default)]
pub struct MockDevice {
    log: EventLog,
    reject_marker: Option<String>,
    dispatch_failure: Option<String>,
    next_kernel: u32,
    bound_kernel: Option<u32>,
    slots: BTreeMap<u32, MockView>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records into `log` instead of a private log.
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Fails compilation of any source containing `marker`.
    pub fn rejecting(mut self, marker: impl Into<String>) -> Self {
        self.reject_marker = Some(marker.into());
        self
    }

    /// Fails every dispatch with `message`.
    pub fn failing_dispatch(mut self, message: impl Into<String>) -> Self {
        self.dispatch_failure = Some(message.into());
        self
    }

    pub fn bound_kernel(&self) -> Option<u32> {
        self.bound_kernel
    }

    pub fn bound_view(&self, slot: u32) -> Option<MockView> {
        self.slots.get(&slot).copied()
    }
}

impl ComputeDevice for MockDevice {
    type Bytecode = MockBytecode;
    type Kernel = MockKernel;
    type View = MockView;

    fn compile_kernel(
        &mut self,
        request: &CompileRequest<'_>,
    ) -> Result<MockBytecode, ComputeError> {
        self.log.push(DeviceEvent::Compile {
            path: request.path.to_path_buf(),
            entry_point: request.entry_point.to_string(),
            profile: request.profile.to_string(),
            flags: request.flags,
        });

        let source = std::fs::read_to_string(request.path)
            .map_err(|e| ComputeError::io(request.path, e))?;

        if let Some(marker) = self.reject_marker.as_deref() {
            if let Some((line, _)) = source
                .lines()
                .enumerate()
                .find(|(_, l)| l.contains(marker))
            {
                return Err(ComputeError::ShaderCompilation {
                    path: request.path.to_path_buf(),
                    entry_point: request.entry_point.to_string(),
                    diagnostics: format!("{}: error: unexpected `{marker}`", line + 1),
                });
            }
        }

        if !source.contains(&format!("fn {}", request.entry_point)) {
            return Err(ComputeError::ShaderCompilation {
                path: request.path.to_path_buf(),
                entry_point: request.entry_point.to_string(),
                diagnostics: format!("entry point `{}` not found", request.entry_point),
            });
        }

        Ok(MockBytecode {
            entry_point: request.entry_point.to_string(),
        })
    }

    fn create_kernel(&mut self, bytecode: MockBytecode) -> Result<MockKernel, ComputeError> {
        self.next_kernel += 1;
        let id = self.next_kernel;
        self.log.push(DeviceEvent::CreateKernel(id));
        log::trace!("mock kernel {id} created for `{}`", bytecode.entry_point);
        Ok(MockKernel { id })
    }

    fn bind_kernel(&mut self, kernel: &MockKernel) {
        self.bound_kernel = Some(kernel.id);
        self.log.push(DeviceEvent::BindKernel(kernel.id));
    }

    fn bind_view(&mut self, slot: u32, view: Option<&MockView>) {
        match view {
            Some(v) => {
                self.slots.insert(slot, *v);
            }
            None => {
                self.slots.remove(&slot);
            }
        }
        self.log.push(DeviceEvent::BindView {
            slot,
            view: view.copied(),
        });
    }

    fn clear_view(&mut self, view: &MockView, color: Color) {
        self.log.push(DeviceEvent::ClearView { view: *view, color });
    }

    fn dispatch(&mut self, groups: [u32; 3]) -> Result<(), ComputeError> {
        if self.bound_kernel.is_none() {
            return Err(ComputeError::Dispatch("no compute kernel bound".to_string()));
        }
        if let Some(message) = &self.dispatch_failure {
            return Err(ComputeError::Dispatch(message.clone()));
        }
        self.log.push(DeviceEvent::Dispatch(groups));
        Ok(())
    }

    fn release_kernel(&mut self, kernel: MockKernel) {
        if self.bound_kernel == Some(kernel.id) {
            self.bound_kernel = None;
        }
        self.log.push(DeviceEvent::ReleaseKernel(kernel.id));
    }
}

/// Hooks that only record when they run.
#[derive(Debug, Clone)]
pub struct RecordingHooks {
    log: EventLog,
}

impl RecordingHooks {
    pub const BEFORE: &'static str = "pre-dispatch";
    pub const AFTER: &'static str = "post-dispatch";

    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl<D: ComputeDevice> DispatchHooks<D> for RecordingHooks {
    fn on_before_dispatch(&mut self, _bindings: &mut BindingScope<'_, D>) {
        self.log.push(DeviceEvent::Hook(Self::BEFORE));
    }

    fn on_after_dispatch(&mut self, _bindings: &mut BindingScope<'_, D>) {
        self.log.push(DeviceEvent::Hook(Self::AFTER));
    }
}
