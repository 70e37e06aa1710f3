// gpu/buffer.rs — device buffers, memory-type selection, staged transfers.
//
// RESPONSIBILITIES
// ─────────────────
// 1. `DeviceBuffer` — an owning (buffer, memory) pair; `Drop` destroys the
//    buffer and frees its memory, so no path can leak an allocation.
// 2. `find_memory_type` — the lowest memory-type index compatible with a
//    requirement mask and a requested property superset. Pure, so the
//    selection rule is unit-tested without a GPU.
// 3. `BufferManager::upload` — host→device transfer through an ephemeral
//    host-visible staging buffer and a one-shot copy command buffer,
//    synchronous on the compute queue. The destination's contents are
//    visible before the call returns.
// 4. `BufferManager::download` — the reverse staging hop, used for output
//    readback (the destination must have been created with TRANSFER_SRC).
//
// ZERO-SIZED PAYLOADS
// ────────────────────
// Vulkan forbids zero-sized buffers. A zero-byte upload allocates a single
// placeholder byte, skips the map and the copy, and keeps logical size 0;
// downloading such a buffer returns an empty vector.

use ash::vk;

use crate::gpu::context::DeviceContext;
use crate::gpu::GpuError;

/// An owned device buffer: handle, backing memory, logical size and a
/// device clone so teardown needs no external state.
///
/// Created only by [`BufferManager`]; never shared — the descriptor writes
/// in the dispatcher borrow the handle, they do not take ownership.
pub struct DeviceBuffer {
    device: ash::Device,
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    /// Logical size in bytes (what the caller asked for, not the padded
    /// allocation size).
    pub size: vk::DeviceSize,
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Lowest memory-type index whose bit is set in `type_filter` and whose
/// property flags are a superset of `required`.
///
/// # Errors
/// [`GpuError::NoSuitableMemoryType`] when no index satisfies both.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, GpuError> {
    for index in 0..properties.memory_type_count {
        let allowed = type_filter & (1 << index) != 0;
        let flags = properties.memory_types[index as usize].property_flags;
        if allowed && flags.contains(required) {
            return Ok(index);
        }
    }
    Err(GpuError::NoSuitableMemoryType)
}

/// Buffer allocation and transfer against one [`DeviceContext`].
pub struct BufferManager<'ctx> {
    ctx: &'ctx DeviceContext,
}

impl<'ctx> BufferManager<'ctx> {
    pub fn new(ctx: &'ctx DeviceContext) -> Self {
        BufferManager { ctx }
    }

    /// Create a buffer of `size` bytes (exclusive sharing), pick a memory
    /// type per [`find_memory_type`], allocate and bind at offset 0.
    ///
    /// # Errors
    /// [`GpuError::Setup`] on any native failure,
    /// [`GpuError::NoSuitableMemoryType`] when no memory type fits. Handles
    /// created before the failing step are released.
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> Result<DeviceBuffer, GpuError> {
        let device = &self.ctx.device;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size.max(1))
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&buffer_info, None) }
            .map_err(|r| GpuError::setup("vkCreateBuffer", r))?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = match find_memory_type(
            &self.ctx.memory_properties,
            requirements.memory_type_bits,
            memory_properties,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(r) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(GpuError::setup("vkAllocateMemory", r));
            }
        };

        if let Err(r) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(GpuError::setup("vkBindBufferMemory", r));
        }

        Ok(DeviceBuffer {
            device: device.clone(),
            buffer,
            memory,
            size,
        })
    }

    /// Upload `bytes` into a fresh device-local buffer with
    /// `TRANSFER_DST | usage`, via a host-visible + host-coherent staging
    /// buffer and one synchronous copy submission. The staging buffer is
    /// released before returning, success or failure.
    pub fn upload(
        &self,
        usage: vk::BufferUsageFlags,
        bytes: &[u8],
    ) -> Result<DeviceBuffer, GpuError> {
        let size = bytes.len() as vk::DeviceSize;
        let destination = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        if bytes.is_empty() {
            return Ok(destination);
        }

        let staging = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let device = &self.ctx.device;
        unsafe {
            let mapped = device
                .map_memory(staging.memory, 0, size, vk::MemoryMapFlags::empty())
                .map_err(|r| GpuError::setup("vkMapMemory", r))?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
            device.unmap_memory(staging.memory);
        }

        self.copy_buffer(staging.buffer, destination.buffer, size)?;
        // `staging` drops here, releasing the ephemeral buffer + memory.
        Ok(destination)
    }

    /// Read a buffer back to the host through a staging hop. The source
    /// must carry `TRANSFER_SRC` usage.
    pub fn download(&self, source: &DeviceBuffer) -> Result<Vec<u8>, GpuError> {
        if source.size == 0 {
            return Ok(Vec::new());
        }

        let staging = self.create_buffer(
            source.size,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        self.copy_buffer(source.buffer, staging.buffer, source.size)?;

        let device = &self.ctx.device;
        let mut bytes = vec![0u8; source.size as usize];
        unsafe {
            let mapped = device
                .map_memory(staging.memory, 0, source.size, vk::MemoryMapFlags::empty())
                .map_err(|r| GpuError::setup("vkMapMemory", r))?;
            std::ptr::copy_nonoverlapping(mapped.cast::<u8>(), bytes.as_mut_ptr(), bytes.len());
            device.unmap_memory(staging.memory);
        }
        Ok(bytes)
    }

    /// One-shot copy: record, submit on the compute queue, block on
    /// queue-idle. The transient command buffer is freed on every path.
    fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<(), GpuError> {
        let device = &self.ctx.device;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.ctx.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(|r| GpuError::setup("vkAllocateCommandBuffers", r))?[0];

        let submit_result = (|| {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
                .map_err(|r| GpuError::setup("vkBeginCommandBuffer", r))?;

            let regions = [vk::BufferCopy::default().size(size)];
            unsafe { device.cmd_copy_buffer(command_buffer, src, dst, &regions) };

            unsafe { device.end_command_buffer(command_buffer) }
                .map_err(|r| GpuError::setup("vkEndCommandBuffer", r))?;

            let command_buffers = [command_buffer];
            let submits = [vk::SubmitInfo::default().command_buffers(&command_buffers)];
            unsafe { device.queue_submit(self.ctx.queue, &submits, vk::Fence::null()) }
                .map_err(|r| GpuError::setup("vkQueueSubmit", r))?;
            unsafe { device.queue_wait_idle(self.ctx.queue) }
                .map_err(|r| GpuError::setup("vkQueueWaitIdle", r))
        })();

        unsafe { device.free_command_buffers(self.ctx.command_pool, &[command_buffer]) };
        submit_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        properties
    }

    #[test]
    fn picks_lowest_matching_index() {
        let properties = synthetic_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let index = find_memory_type(
            &properties,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_type_filter_bits() {
        // Index 0 has the right flags but is excluded by the filter.
        let properties = synthetic_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let index =
            find_memory_type(&properties, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn requires_property_superset() {
        // HOST_VISIBLE alone must not satisfy HOST_VISIBLE | HOST_COHERENT,
        // but extra flags on the type are fine.
        let properties = synthetic_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let index = find_memory_type(
            &properties,
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn no_match_is_an_error() {
        let properties = synthetic_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let err = find_memory_type(&properties, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE)
            .unwrap_err();
        assert!(matches!(err, GpuError::NoSuitableMemoryType));
    }

    #[test]
    fn empty_type_table_is_an_error() {
        let properties = synthetic_properties(&[]);
        let err =
            find_memory_type(&properties, u32::MAX, vk::MemoryPropertyFlags::empty()).unwrap_err();
        assert!(matches!(err, GpuError::NoSuitableMemoryType));
    }

    #[test]
    #[ignore = "requires a Vulkan device"]
    fn upload_download_round_trip() {
        let ctx = DeviceContext::new(true).expect("need a Vulkan device");
        let manager = BufferManager::new(&ctx);

        // Sizes straddling the 32-element workgroup convention, plus empty.
        for len in [0usize, 1, 100, 512, 1588 * 16] {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let buffer = manager
                .upload(vk::BufferUsageFlags::TRANSFER_SRC, &bytes)
                .expect("upload");
            assert_eq!(buffer.size as usize, len);
            let read_back = manager.download(&buffer).expect("download");
            assert_eq!(read_back, bytes, "round trip failed for {len} bytes");
        }
    }
}
