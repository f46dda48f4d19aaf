//! The immediate-mode graphics API the scene is written against.
//!
//! Calls mirror a WebGL-style context: programs, buffers and uniforms are
//! addressed by small handles and attributes by their location.

use glam::Mat4;

use crate::error::{ContextError, ProgramError};

#[cfg(test)]
pub mod recording;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Byte offset of a uniform inside the program's uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once, never rewritten.
    StaticDraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Every three vertices form an independent triangle.
    Triangles,
}

/// Layout of one float attribute inside the bound vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttribPointer {
    /// Number of `f32` components, 1 to 4.
    pub size: u32,
    pub stride: u32,
    pub offset: u32,
}

pub trait GraphicsContext {
    /// Compiles both stages and links them into a program.
    fn create_program(
        &mut self,
        vertex: &str,
        fragment: &str,
    ) -> Result<ProgramHandle, ProgramError>;

    fn use_program(&mut self, program: ProgramHandle);

    fn create_buffer(&mut self) -> Option<BufferHandle>;

    fn bind_buffer(&mut self, buffer: BufferHandle);

    /// Uploads `data` into the bound buffer.
    fn buffer_data(&mut self, data: &[u8], usage: BufferUsage) -> Result<(), ContextError>;

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    /// Sources attribute `location` from the bound buffer.
    fn vertex_attrib_pointer(&mut self, location: u32, pointer: AttribPointer);

    fn enable_vertex_attrib_array(&mut self, location: u32);

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    /// Column-major upload, no transpose.
    fn uniform_matrix4(&mut self, location: UniformLocation, matrix: &Mat4);

    fn clear(&mut self, color: [f32; 4]);

    fn draw_arrays(&mut self, mode: Primitive, first: u32, count: u32);

    /// Hands the frame to the display. Blocks until the host is ready for the
    /// next one, which is what paces the run loop.
    fn composite(&mut self);
}
