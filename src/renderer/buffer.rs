use gfx_hal::{buffer, prelude::*, Backend, Limits};
use std::mem::ManuallyDrop;
use std::ptr;

use crate::error::ContextError;

pub struct Buffer<'a, B: Backend> {
    pub device: &'a B::Device,
    pub buf: ManuallyDrop<B::Buffer>,
}

impl<'a, B: Backend> Buffer<'a, B> {
    /// Creates a vertex buffer holding `len` bytes, padded to the
    /// non-coherent atom size so the whole range can be flushed.
    pub fn new(device: &'a B::Device, len: u64, limits: &Limits) -> Result<Self, ContextError> {
        if len == 0 {
            return Err(ContextError::resource("vertex buffer", "empty upload"));
        }
        let non_coherent_alignment = limits.non_coherent_atom_size as u64;
        let memory_size = ((len + non_coherent_alignment - 1) / non_coherent_alignment)
            * non_coherent_alignment;

        let buf = unsafe { device.create_buffer(memory_size, buffer::Usage::VERTEX) }
            .map_err(|err| ContextError::resource("vertex buffer", err))?;
        log::debug!("vertex buffer: {} bytes ({} allocated)", len, memory_size);

        Ok(Buffer {
            device,
            buf: ManuallyDrop::new(buf),
        })
    }
}

impl<'a, B: Backend> Drop for Buffer<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_buffer(ManuallyDrop::into_inner(ptr::read(&self.buf)))
        }
    }
}
