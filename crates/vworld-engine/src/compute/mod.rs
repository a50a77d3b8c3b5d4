//! Compute-shader lifecycle.
//!
//! A [`ComputeShader`] turns a tagged template into a kernel on its first
//! dispatch and then runs the fixed protocol on every call:
//! bind kernel, pre-dispatch hook, dispatch, post-dispatch hook.
//!
//! - `markup` / `generator`: `#name#` substitution and the `_Generated` file
//! - `threads`: thread-group sizing shared with the shader source
//! - `device`: the GPU services the core needs, and slot ownership
//! - `wgpu_device`: those services over wgpu
//! - `mock`: a recording device for tests

mod device;
mod error;
pub mod generator;
mod markup;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod shader;
mod threads;
mod wgpu_device;

pub use device::{BindingScope, COMPUTE_PROFILE, CompileFlags, CompileRequest, ComputeDevice};
pub use error::ComputeError;
pub use markup::{MarkupTag, TagSet, THREAD_COUNT_X, THREAD_COUNT_Y, THREAD_COUNT_Z};
pub use shader::{ComputeShader, ComputeShaderBuilder, DispatchHooks, NoHooks, ShaderLifecycleState};
pub use threads::ThreadGroupConfig;
pub use wgpu_device::{check_workgroup_limits, compile_wgsl, KernelReflection, WgpuComputeDevice, WgpuKernel, WgslBytecode};
