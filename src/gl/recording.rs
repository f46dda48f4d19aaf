//! A context that only records what it was asked to do.

use glam::Mat4;

use super::*;
use crate::error::Stage;
use crate::shader::Linked;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateProgram,
    UseProgram(ProgramHandle),
    CreateBuffer(BufferHandle),
    BindBuffer(BufferHandle),
    BufferData {
        buffer: BufferHandle,
        data: Vec<u8>,
        usage: BufferUsage,
    },
    VertexAttribPointer(u32, AttribPointer),
    EnableVertexAttribArray(u32),
    UniformMatrix4(UniformLocation, Mat4),
    Clear([f32; 4]),
    DrawArrays(Primitive, u32, u32),
    Composite,
}

/// Failures to inject.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub compile: Option<Stage>,
    pub link: bool,
    pub buffer: bool,
    pub upload: bool,
    /// Names hidden from attribute and uniform lookups.
    pub unresolved: Vec<&'static str>,
}

#[derive(Debug, Default)]
pub struct RecordingContext {
    pub calls: Vec<Call>,
    pub faults: Faults,
    programs: Vec<Linked>,
    buffers: Vec<Option<BufferUsage>>,
    bound: Option<BufferHandle>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        RecordingContext {
            faults,
            ..Self::default()
        }
    }

    pub fn draws(&self) -> Vec<(Primitive, u32, u32)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::DrawArrays(mode, first, count) => Some((*mode, *first, *count)),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<&[u8]> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::BufferData { data, .. } => Some(data.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn matrices(&self) -> Vec<Mat4> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::UniformMatrix4(_, m) => Some(*m),
                _ => None,
            })
            .collect()
    }

    pub fn composites(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::Composite).count()
    }

    fn hidden(&self, name: &str) -> bool {
        self.faults.unresolved.iter().any(|n| *n == name)
    }
}

impl GraphicsContext for RecordingContext {
    fn create_program(
        &mut self,
        vertex: &str,
        fragment: &str,
    ) -> Result<ProgramHandle, ProgramError> {
        self.calls.push(Call::CreateProgram);
        if let Some(stage) = self.faults.compile {
            return Err(ProgramError::Compile {
                stage,
                log: "injected".into(),
            });
        }
        if self.faults.link {
            return Err(ProgramError::Link("injected".into()));
        }
        self.programs.push(Linked::from_sources(vertex, fragment)?);
        Ok(ProgramHandle(self.programs.len() as u32 - 1))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.calls.push(Call::UseProgram(program));
    }

    fn create_buffer(&mut self) -> Option<BufferHandle> {
        if self.faults.buffer {
            return None;
        }
        self.buffers.push(None);
        let handle = BufferHandle(self.buffers.len() as u32 - 1);
        self.calls.push(Call::CreateBuffer(handle));
        Some(handle)
    }

    fn bind_buffer(&mut self, buffer: BufferHandle) {
        self.bound = Some(buffer);
        self.calls.push(Call::BindBuffer(buffer));
    }

    fn buffer_data(&mut self, data: &[u8], usage: BufferUsage) -> Result<(), ContextError> {
        if self.faults.upload {
            return Err(ContextError::resource("vertex memory", "injected"));
        }
        let buffer = self.bound.ok_or(ContextError::NoBoundBuffer)?;
        let slot = &mut self.buffers[buffer.0 as usize];
        if *slot == Some(BufferUsage::StaticDraw) {
            return Err(ContextError::StaticBuffer);
        }
        *slot = Some(usage);
        self.calls.push(Call::BufferData {
            buffer,
            data: data.to_vec(),
            usage,
        });
        Ok(())
    }

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        if self.hidden(name) {
            return None;
        }
        self.programs[program.0 as usize]
            .attribute(name)
            .map(|a| a.location)
    }

    fn vertex_attrib_pointer(&mut self, location: u32, pointer: AttribPointer) {
        self.calls.push(Call::VertexAttribPointer(location, pointer));
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        self.calls.push(Call::EnableVertexAttribArray(location));
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        if self.hidden(name) {
            return None;
        }
        self.programs[program.0 as usize]
            .uniform(name)
            .map(|u| UniformLocation(u.offset))
    }

    fn uniform_matrix4(&mut self, location: UniformLocation, matrix: &Mat4) {
        self.calls.push(Call::UniformMatrix4(location, *matrix));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.calls.push(Call::Clear(color));
    }

    fn draw_arrays(&mut self, mode: Primitive, first: u32, count: u32) {
        self.calls.push(Call::DrawArrays(mode, first, count));
    }

    fn composite(&mut self) {
        self.calls.push(Call::Composite);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_buffers_reject_a_second_upload() {
        let mut ctx = RecordingContext::new();
        let buffer = ctx.create_buffer().unwrap();
        ctx.bind_buffer(buffer);
        ctx.buffer_data(&[1, 2, 3, 4], BufferUsage::StaticDraw).unwrap();
        assert_eq!(
            ctx.buffer_data(&[5, 6, 7, 8], BufferUsage::StaticDraw),
            Err(ContextError::StaticBuffer)
        );
        assert_eq!(ctx.uploads(), vec![&[1u8, 2, 3, 4][..]]);
    }

    #[test]
    fn upload_needs_a_bound_buffer() {
        let mut ctx = RecordingContext::new();
        assert_eq!(
            ctx.buffer_data(&[0; 4], BufferUsage::StaticDraw),
            Err(ContextError::NoBoundBuffer)
        );
    }
}
