use std::path::Path;

use crate::paint::Color;

use super::error::ComputeError;

/// Profile requested for every compute kernel.
pub const COMPUTE_PROFILE: &str = "compute";

/// Compiler switches.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CompileFlags {
    /// Keep debug information and run full validation.
    pub debug: bool,
    /// Ask the backend not to optimize the kernel. Advisory: the wgpu
    /// backend has no such switch and ignores it.
    pub skip_optimization: bool,
}

impl CompileFlags {
    /// What the lifecycle uses: easier diagnosis over speed.
    pub const DEVELOPMENT: Self = Self {
        debug: true,
        skip_optimization: true,
    };
}

/// One compile call: source file, entry point, profile and flags.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub path: &'a Path,
    pub entry_point: &'a str,
    pub profile: &'a str,
    pub flags: CompileFlags,
}

/// The GPU services the compute core relies on.
///
/// The device models an immediate context: a single bound kernel and a single
/// table of resource slots, both shared by every stage that uses the device.
/// Slots are owned by convention only; see [`BindingScope`].
pub trait ComputeDevice {
    /// Compiler output. Consumed by [`create_kernel`](Self::create_kernel).
    type Bytecode;
    /// A ready-to-bind compute kernel.
    type Kernel;
    /// A writable image view that can be bound to a slot.
    type View;

    fn compile_kernel(&mut self, request: &CompileRequest<'_>)
    -> Result<Self::Bytecode, ComputeError>;

    fn create_kernel(&mut self, bytecode: Self::Bytecode) -> Result<Self::Kernel, ComputeError>;

    fn bind_kernel(&mut self, kernel: &Self::Kernel);

    /// Binds `view` at `slot`, or clears the slot with `None`.
    fn bind_view(&mut self, slot: u32, view: Option<&Self::View>);

    fn clear_view(&mut self, view: &Self::View, color: Color);

    fn dispatch(&mut self, groups: [u32; 3]) -> Result<(), ComputeError>;

    fn release_kernel(&mut self, kernel: Self::Kernel) {
        drop(kernel);
    }
}

/// Slot ownership for the length of one dispatch.
///
/// Every slot bound through the scope is unbound again when the scope is
/// dropped, unless the holder already unbound it. The dispatch protocol drops
/// the scope after the post-dispatch hook, and on every early return.
pub struct BindingScope<'d, D: ComputeDevice> {
    device: &'d mut D,
    owned: Vec<u32>,
}

impl<'d, D: ComputeDevice> BindingScope<'d, D> {
    pub(crate) fn new(device: &'d mut D) -> Self {
        Self {
            device,
            owned: Vec::new(),
        }
    }

    /// Binds `view` at `slot` and takes ownership of the slot.
    pub fn bind_view(&mut self, slot: u32, view: &D::View) {
        self.device.bind_view(slot, Some(view));
        if !self.owned.contains(&slot) {
            self.owned.push(slot);
        }
    }

    /// Unbinds `slot` now.
    pub fn unbind(&mut self, slot: u32) {
        self.device.bind_view(slot, None);
        self.owned.retain(|s| *s != slot);
    }

    pub fn clear_view(&mut self, view: &D::View, color: Color) {
        self.device.clear_view(view, color);
    }

    /// Slots still held by this scope.
    pub fn owned_slots(&self) -> &[u32] {
        &self.owned
    }

    pub(crate) fn dispatch(&mut self, groups: [u32; 3]) -> Result<(), ComputeError> {
        self.device.dispatch(groups)
    }
}

impl<D: ComputeDevice> Drop for BindingScope<'_, D> {
    fn drop(&mut self) {
        for slot in self.owned.drain(..) {
            log::trace!("releasing compute slot {slot}");
            self.device.bind_view(slot, None);
        }
    }
}
