// gpu/dispatch.rs — descriptor binding, compute pipeline, dispatch.
//
// RESPONSIBILITIES
// ─────────────────
// 1. Descriptor plumbing: one STORAGE_BUFFER binding per data buffer,
//    compute-stage only; a pool sized for exactly those bindings and one
//    set; descriptor writes covering each buffer's full range. Written once
//    after buffer creation, never updated again.
// 2. Pipeline creation from an opaque pre-compiled SPIR-V blob. The shader
//    module is destroyed immediately after the pipeline exists — pipelines
//    own their compiled code.
// 3. `dispatch`: record bind-pipeline / bind-set / dispatch into the one
//    primary command buffer, submit on the compute queue, block on
//    queue-idle. One synchronous round trip, no fences, no cancellation.
//
// WORKGROUP CONVENTION
// ─────────────────────
// The kernel declares `local_size_x = 32`; the X group count is the ceiling
// of elements / 32 and must stay in lockstep with the shader. The kernel
// guards out-of-range invocations itself, so the final partial workgroup is
// harmless.

use std::ffi::CStr;

use ash::vk;

use crate::gpu::buffer::DeviceBuffer;
use crate::gpu::context::DeviceContext;
use crate::gpu::GpuError;

/// Invocations per workgroup on X, fixed by the shader binary.
pub const WORKGROUP_SIZE: u32 = 32;

/// X-axis workgroup count covering `elements` invocations:
/// `ceil(elements / 32)`. Zero elements dispatch zero groups.
pub fn workgroup_count(elements: u32) -> u32 {
    elements.div_ceil(WORKGROUP_SIZE)
}

const SHADER_ENTRY: &CStr = c"main";

/// Handles created so far during construction; lets every failure path
/// release exactly the objects that exist. Null handles are skipped.
#[derive(Default)]
struct PartialResources {
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    command_buffer: vk::CommandBuffer,
}

impl PartialResources {
    /// Children before parents; the descriptor set goes with its pool.
    fn destroy(&self, device: &ash::Device, command_pool: vk::CommandPool) {
        unsafe {
            if self.command_buffer != vk::CommandBuffer::null() {
                device.free_command_buffers(command_pool, &[self.command_buffer]);
            }
            if self.pipeline != vk::Pipeline::null() {
                device.destroy_pipeline(self.pipeline, None);
            }
            if self.pipeline_layout != vk::PipelineLayout::null() {
                device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            if self.pool != vk::DescriptorPool::null() {
                device.destroy_descriptor_pool(self.pool, None);
            }
            if self.set_layout != vk::DescriptorSetLayout::null() {
                device.destroy_descriptor_set_layout(self.set_layout, None);
            }
        }
    }
}

/// Owns the descriptor objects, pipeline and primary command buffer for the
/// single compute pass. Built once per run from the context and the data
/// buffers; `Drop` releases everything in reverse creation order.
pub struct ComputeDispatcher {
    device: ash::Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: vk::DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl ComputeDispatcher {
    /// Build descriptors and the compute pipeline.
    ///
    /// `buffers` maps in order onto shader bindings 0..n (here: 0 = input
    /// points, 1 = output points). `shader_words` is the pre-compiled
    /// SPIR-V kernel with entry point `main`.
    ///
    /// # Errors
    /// [`GpuError::Setup`] on any native failure; everything created before
    /// the failing call is released.
    pub fn new(
        ctx: &DeviceContext,
        buffers: &[&DeviceBuffer],
        shader_words: &[u32],
    ) -> Result<Self, GpuError> {
        let device = &ctx.device;
        let mut partial = PartialResources::default();

        let fail = |partial: &PartialResources, op: &'static str, r: vk::Result| {
            partial.destroy(device, ctx.command_pool);
            GpuError::setup(op, r)
        };

        // ----- descriptor set layout -----------------------------------
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..buffers.len() as u32)
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::COMPUTE)
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        partial.set_layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|r| fail(&partial, "vkCreateDescriptorSetLayout", r))?;

        // ----- descriptor pool + set -----------------------------------
        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(buffers.len() as u32)];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(1);
        partial.pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(|r| fail(&partial, "vkCreateDescriptorPool", r))?;

        let set_layouts = [partial.set_layout];
        let set_alloc = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(partial.pool)
            .set_layouts(&set_layouts);
        let descriptor_set = unsafe { device.allocate_descriptor_sets(&set_alloc) }
            .map_err(|r| fail(&partial, "vkAllocateDescriptorSets", r))?[0];

        // One write per binding, full buffer range.
        let buffer_infos: Vec<[vk::DescriptorBufferInfo; 1]> = buffers
            .iter()
            .map(|buffer| {
                [vk::DescriptorBufferInfo::default()
                    .buffer(buffer.buffer)
                    .offset(0)
                    .range(vk::WHOLE_SIZE)]
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = buffer_infos
            .iter()
            .enumerate()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(descriptor_set)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(info)
            })
            .collect();
        unsafe { device.update_descriptor_sets(&writes, &[]) };

        // ----- pipeline -------------------------------------------------
        let shader_info = vk::ShaderModuleCreateInfo::default().code(shader_words);
        let shader_module = unsafe { device.create_shader_module(&shader_info, None) }
            .map_err(|r| fail(&partial, "vkCreateShaderModule", r))?;

        let layout_create = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        partial.pipeline_layout =
            match unsafe { device.create_pipeline_layout(&layout_create, None) } {
                Ok(layout) => layout,
                Err(r) => {
                    unsafe { device.destroy_shader_module(shader_module, None) };
                    return Err(fail(&partial, "vkCreatePipelineLayout", r));
                }
            };

        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(SHADER_ENTRY);
        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(partial.pipeline_layout);
        let pipeline_result = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        // The module is consumed by pipeline creation either way.
        unsafe { device.destroy_shader_module(shader_module, None) };
        partial.pipeline = match pipeline_result {
            Ok(pipelines) => pipelines[0],
            Err((_, r)) => return Err(fail(&partial, "vkCreateComputePipelines", r)),
        };

        // ----- command buffer ------------------------------------------
        let cb_alloc = vk::CommandBufferAllocateInfo::default()
            .command_pool(ctx.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        partial.command_buffer = unsafe { device.allocate_command_buffers(&cb_alloc) }
            .map_err(|r| fail(&partial, "vkAllocateCommandBuffers", r))?[0];

        Ok(ComputeDispatcher {
            device: device.clone(),
            queue: ctx.queue,
            command_pool: ctx.command_pool,
            command_buffer: partial.command_buffer,
            descriptor_set_layout: partial.set_layout,
            descriptor_pool: partial.pool,
            descriptor_set,
            pipeline_layout: partial.pipeline_layout,
            pipeline: partial.pipeline,
        })
    }

    /// Record and submit the compute pass over `element_count` elements,
    /// blocking until the queue drains. `ceil(element_count / 32)` groups
    /// on X, one on Y and Z.
    ///
    /// # Errors
    /// [`GpuError::Setup`] if recording or submission fails.
    pub fn dispatch(&self, element_count: u32) -> Result<(), GpuError> {
        let device = &self.device;

        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe { device.begin_command_buffer(self.command_buffer, &begin_info) }
            .map_err(|r| GpuError::setup("vkBeginCommandBuffer", r))?;

        unsafe {
            device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline,
            );
            device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                self.pipeline_layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_dispatch(self.command_buffer, workgroup_count(element_count), 1, 1);
        }

        unsafe { device.end_command_buffer(self.command_buffer) }
            .map_err(|r| GpuError::setup("vkEndCommandBuffer", r))?;

        let command_buffers = [self.command_buffer];
        let submits = [vk::SubmitInfo::default().command_buffers(&command_buffers)];
        unsafe { device.queue_submit(self.queue, &submits, vk::Fence::null()) }
            .map_err(|r| GpuError::setup("vkQueueSubmit", r))?;
        unsafe { device.queue_wait_idle(self.queue) }
            .map_err(|r| GpuError::setup("vkQueueWaitIdle", r))
    }
}

impl Drop for ComputeDispatcher {
    fn drop(&mut self) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[self.command_buffer]);
            self.device.destroy_pipeline(self.pipeline, None);
            self.device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            // Frees the descriptor set with it.
            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);
            self.device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_count_is_ceiling_division() {
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(31), 1);
        assert_eq!(workgroup_count(32), 1);
        assert_eq!(workgroup_count(33), 2);
        assert_eq!(workgroup_count(1588), 50); // 1568 < 1588 <= 1600
    }

    #[test]
    fn zero_elements_zero_groups() {
        assert_eq!(workgroup_count(0), 0);
    }

    #[test]
    fn every_element_is_covered() {
        for elements in 1..1000u32 {
            let groups = workgroup_count(elements);
            assert!(groups * WORKGROUP_SIZE >= elements);
            assert!((groups - 1) * WORKGROUP_SIZE < elements);
        }
    }
}
