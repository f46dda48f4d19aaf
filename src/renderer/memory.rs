use gfx_hal::{adapter::MemoryType, memory as m, prelude::*, Backend, MemoryTypeId};
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

use super::buffer::Buffer;
use crate::error::ContextError;
use crate::gl::BufferUsage;

/// A vertex buffer bound to CPU-visible memory holding its contents.
pub struct Memory<'a, B: Backend> {
    pub buffer: ManuallyDrop<Buffer<'a, B>>,
    pub usage: BufferUsage,
    memory: ManuallyDrop<B::Memory>,
}

impl<'a, B: Backend> Memory<'a, B> {
    pub fn new(
        mut buffer: Buffer<'a, B>,
        data: &[u8],
        usage: BufferUsage,
        memory_types: &[MemoryType],
    ) -> Result<Self, ContextError> {
        let memory = unsafe { Self::upload(&mut buffer, data, memory_types)? };
        Ok(Memory {
            buffer: ManuallyDrop::new(buffer),
            usage,
            memory: ManuallyDrop::new(memory),
        })
    }

    unsafe fn upload(
        buffer: &mut Buffer<'a, B>,
        data: &[u8],
        memory_types: &[MemoryType],
    ) -> Result<B::Memory, ContextError> {
        let device = buffer.device;
        let buffer_req = device.get_buffer_requirements(&buffer.buf);
        let upload_type = Self::upload_type(memory_types, &buffer_req).ok_or_else(|| {
            ContextError::resource("vertex memory", "no CPU-visible memory type")
        })?;
        let memory = device
            .allocate_memory(upload_type, buffer_req.size)
            .map_err(|err| ContextError::resource("vertex memory", err))?;

        if let Err(err) = Self::fill(device, &memory, &mut buffer.buf, data) {
            device.free_memory(memory);
            return Err(err);
        }
        Ok(memory)
    }

    unsafe fn fill(
        device: &B::Device,
        memory: &B::Memory,
        buf: &mut B::Buffer,
        data: &[u8],
    ) -> Result<(), ContextError> {
        device
            .bind_buffer_memory(memory, 0, buf)
            .map_err(|err| ContextError::resource("vertex memory binding", err))?;
        let mapping = device
            .map_memory(memory, m::Segment::ALL)
            .map_err(|err| ContextError::resource("vertex memory mapping", err))?;
        ptr::copy_nonoverlapping(data.as_ptr(), mapping, data.len());
        let flushed = device.flush_mapped_memory_ranges(iter::once((memory, m::Segment::ALL)));
        device.unmap_memory(memory);
        flushed.map_err(|err| ContextError::resource("vertex memory flush", err))
    }

    fn upload_type(properties: &[MemoryType], buffer_req: &m::Requirements) -> Option<MemoryTypeId> {
        properties
            .iter()
            .enumerate()
            .position(|(id, mem_type)| {
                buffer_req.type_mask & (1 << id) != 0
                    && mem_type.properties.contains(m::Properties::CPU_VISIBLE)
            })
            .map(MemoryTypeId::from)
    }
}

impl<'a, B: Backend> Drop for Memory<'a, B> {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.buffer);
            self.buffer
                .device
                .free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)))
        }
    }
}
