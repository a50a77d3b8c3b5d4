//! [`ComputeDevice`] over wgpu.
//!
//! wgpu has no immediate context, so this type keeps one: the bound kernel
//! and the slot table live here, and every clear or dispatch is encoded and
//! submitted to the queue on the spot. Queue order then serializes it with
//! whatever the present stage submits afterwards.
//!
//! Kernels are WGSL. Slot `n` is `@group(0) @binding(n)` and must be a
//! storage texture.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use wgpu::naga;

use crate::paint::Color;
use crate::render::OutputImage;

use super::device::{CompileFlags, CompileRequest, ComputeDevice};
use super::error::ComputeError;

/// Validated WGSL, ready to become a pipeline.
#[derive(Debug, Clone)]
pub struct WgslBytecode {
    pub label: String,
    pub source: String,
    pub entry_point: String,
    pub workgroup_size: [u32; 3],
    /// `@group(0)` bindings the entry point actually uses, ascending.
    pub slots: Vec<u32>,
}

/// A compute pipeline plus the slots its bind group needs.
#[derive(Debug, Clone)]
pub struct WgpuKernel(Arc<KernelInner>);

#[derive(Debug)]
struct KernelInner {
    label: String,
    pipeline: wgpu::ComputePipeline,
    slots: Vec<u32>,
}

/// What the device needs to know about a validated entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelReflection {
    pub workgroup_size: [u32; 3],
    /// `@group(0)` bindings the entry point actually uses, ascending.
    pub slots: Vec<u32>,
}

/// Parses and validates `source`, then checks that `entry_point` is a
/// compute entry point whose resources this device can bind.
///
/// On failure the returned string is the compiler diagnostic, rendered
/// against `source`.
pub fn compile_wgsl(
    source: &str,
    entry_point: &str,
    flags: CompileFlags,
) -> Result<KernelReflection, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let validation = if flags.debug {
        naga::valid::ValidationFlags::all()
    } else {
        naga::valid::ValidationFlags::empty()
    };
    let info = naga::valid::Validator::new(validation, naga::valid::Capabilities::empty())
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let Some((index, ep)) = module
        .entry_points
        .iter()
        .enumerate()
        .find(|(_, ep)| ep.name == entry_point)
    else {
        let available: Vec<&str> = module.entry_points.iter().map(|ep| ep.name.as_str()).collect();
        return Err(format!(
            "entry point `{entry_point}` not found (available: {available:?})"
        ));
    };

    if ep.stage != naga::ShaderStage::Compute {
        return Err(format!(
            "entry point `{entry_point}` is a {:?} shader, expected compute",
            ep.stage
        ));
    }

    let ep_info = info.get_entry_point(index);
    let mut slots = Vec::new();
    for (handle, var) in module.global_variables.iter() {
        if ep_info[handle].is_empty() {
            continue;
        }
        let Some(binding) = var.binding.as_ref() else {
            continue;
        };

        let name = var.name.as_deref().unwrap_or("<unnamed>");
        if binding.group != 0 {
            return Err(format!(
                "`{name}` is bound at @group({}); only @group(0) is supported",
                binding.group
            ));
        }
        let is_storage_image = matches!(
            module.types[var.ty].inner,
            naga::TypeInner::Image {
                class: naga::ImageClass::Storage { .. },
                ..
            }
        );
        if !is_storage_image {
            return Err(format!(
                "`{name}` at @binding({}) is not a storage texture",
                binding.binding
            ));
        }
        slots.push(binding.binding);
    }
    slots.sort_unstable();

    Ok(KernelReflection {
        workgroup_size: ep.workgroup_size,
        slots,
    })
}

/// Rejects a workgroup the device cannot run, per axis and in total.
///
/// wgpu treats an oversized workgroup as a pipeline validation error, which
/// its default handler turns into a panic; checking first keeps it a
/// compilation failure.
pub fn check_workgroup_limits(workgroup_size: [u32; 3], limits: &wgpu::Limits) -> Result<(), String> {
    let axes = [
        ("x", limits.max_compute_workgroup_size_x),
        ("y", limits.max_compute_workgroup_size_y),
        ("z", limits.max_compute_workgroup_size_z),
    ];
    for (size, (axis, max)) in workgroup_size.iter().zip(axes) {
        if *size > max {
            return Err(format!(
                "workgroup size {workgroup_size:?} exceeds max_compute_workgroup_size_{axis} ({max})"
            ));
        }
    }

    let invocations = workgroup_size.iter().map(|s| *s as u64).product::<u64>();
    let max = limits.max_compute_invocations_per_workgroup;
    if invocations > max as u64 {
        return Err(format!(
            "workgroup size {workgroup_size:?} is {invocations} invocations, \
             exceeding max_compute_invocations_per_workgroup ({max})"
        ));
    }

    Ok(())
}

/// Immediate-context emulation over a wgpu device and queue.
pub struct WgpuComputeDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernel: Option<WgpuKernel>,
    slots: BTreeMap<u32, OutputImage>,
}

impl WgpuComputeDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            kernel: None,
            slots: BTreeMap::new(),
        }
    }
}

impl ComputeDevice for WgpuComputeDevice {
    type Bytecode = WgslBytecode;
    type Kernel = WgpuKernel;
    type View = OutputImage;

    fn compile_kernel(
        &mut self,
        request: &CompileRequest<'_>,
    ) -> Result<WgslBytecode, ComputeError> {
        let source = std::fs::read_to_string(request.path)
            .map_err(|e| ComputeError::io(request.path, e))?;

        log::debug!(
            "compiling `{}` ({}, {:?}) from `{}`",
            request.entry_point,
            request.profile,
            request.flags,
            request.path.display()
        );

        let rejected = |diagnostics: String| ComputeError::ShaderCompilation {
            path: request.path.to_path_buf(),
            entry_point: request.entry_point.to_string(),
            diagnostics,
        };

        let KernelReflection {
            workgroup_size,
            slots,
        } = compile_wgsl(&source, request.entry_point, request.flags).map_err(rejected)?;
        check_workgroup_limits(workgroup_size, &self.device.limits()).map_err(rejected)?;

        Ok(WgslBytecode {
            label: format!("vworld kernel {}", request.entry_point),
            source,
            entry_point: request.entry_point.to_string(),
            workgroup_size,
            slots,
        })
    }

    fn create_kernel(&mut self, bytecode: WgslBytecode) -> Result<WgpuKernel, ComputeError> {
        let WgslBytecode {
            label,
            source,
            entry_point,
            workgroup_size,
            slots,
        } = bytecode;

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
        });

        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&label),
            layout: None,
            module: &module,
            entry_point: Some(&entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        log::debug!("created `{label}`: workgroup {workgroup_size:?}, slots {slots:?}");

        Ok(WgpuKernel(Arc::new(KernelInner {
            label,
            pipeline,
            slots,
        })))
    }

    fn bind_kernel(&mut self, kernel: &WgpuKernel) {
        self.kernel = Some(kernel.clone());
    }

    fn bind_view(&mut self, slot: u32, view: Option<&OutputImage>) {
        match view {
            Some(image) => {
                self.slots.insert(slot, image.clone());
            }
            None => {
                self.slots.remove(&slot);
            }
        }
    }

    fn clear_view(&mut self, view: &OutputImage, color: Color) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vworld clear encoder"),
            });

        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("vworld clear output"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: view.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn dispatch(&mut self, groups: [u32; 3]) -> Result<(), ComputeError> {
        let Some(kernel) = self.kernel.as_ref() else {
            return Err(ComputeError::Dispatch("no compute kernel bound".to_string()));
        };
        let kernel = &kernel.0;

        let max = self.device.limits().max_compute_workgroups_per_dimension;
        if groups.iter().any(|g| *g > max) {
            return Err(ComputeError::Dispatch(format!(
                "`{}`: {groups:?} thread groups exceed the device limit of {max} per axis",
                kernel.label
            )));
        }

        let mut entries = Vec::with_capacity(kernel.slots.len());
        for slot in &kernel.slots {
            let image = self.slots.get(slot).ok_or_else(|| {
                ComputeError::Dispatch(format!(
                    "`{}` writes slot {slot} but no view is bound there",
                    kernel.label
                ))
            })?;
            entries.push(wgpu::BindGroupEntry {
                binding: *slot,
                resource: wgpu::BindingResource::TextureView(image.view()),
            });
        }

        let bind_group = if entries.is_empty() {
            None
        } else {
            let layout = kernel.pipeline.get_bind_group_layout(0);
            Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("vworld compute bind group"),
                layout: &layout,
                entries: &entries,
            }))
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vworld compute encoder"),
            });

        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&kernel.label),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&kernel.pipeline);
            if let Some(bg) = bind_group.as_ref() {
                cpass.set_bind_group(0, bg, &[]);
            }
            let [x, y, z] = groups;
            cpass.dispatch_workgroups(x, y, z);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn release_kernel(&mut self, kernel: WgpuKernel) {
        if self
            .kernel
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(&bound.0, &kernel.0))
        {
            self.kernel = None;
        }
        drop(kernel);
    }
}
