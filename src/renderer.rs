use gfx_hal::{
    adapter, buffer as b, command, format as f, image as i, pass, pool,
    prelude::*,
    pso,
    queue::{family::QueueFamilyId, Submission},
    window, Backend, Limits,
};
use glam::Mat4;

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::iter;
use std::mem::{self, ManuallyDrop};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod buffer;
mod memory;
mod pipeline;
mod program;
mod swapchain;

use crate::config::Config;
use crate::error::{ContextError, ProgramError};
use crate::gl::{
    AttribPointer, BufferHandle, BufferUsage, GraphicsContext, Primitive, ProgramHandle,
    UniformLocation,
};
use buffer::Buffer;
use memory::Memory;
use pipeline::{Attribute, Pipeline};
use program::Program;
use swapchain::Swapchain;

/// A [`GraphicsContext`] on top of gfx-hal.
///
/// Draw calls are queued and recorded into one command buffer when the frame
/// is composited. The pipeline is built on the first composited draw from the
/// attribute state set up before it.
pub struct Renderer<'a, B: Backend> {
    frame: usize,
    device: &'a B::Device,
    queue: &'a mut B::CommandQueue,
    memory_types: Vec<adapter::MemoryType>,
    limits: Limits,
    resized: Arc<AtomicBool>,
    frames_in_flight: usize,
    command_buffers: Vec<B::CommandBuffer>,
    submission_complete_semaphores: Vec<B::Semaphore>,
    submission_complete_fences: Vec<B::Fence>,
    framebuffers: Vec<Option<B::Framebuffer>>,
    command_pool: ManuallyDrop<B::CommandPool>,
    swapchain: ManuallyDrop<Swapchain<'a, B>>,
    render_pass: ManuallyDrop<B::RenderPass>,
    programs: Vec<Program<B>>,
    buffers: Vec<Option<Memory<'a, B>>>,
    pipeline: Option<Pipeline<'a, B>>,
    state: State,
}

/// GL-style state that persists across frames.
#[derive(Debug, Default)]
struct State {
    program: Option<ProgramHandle>,
    bound_buffer: Option<BufferHandle>,
    pointers: BTreeMap<u32, (BufferHandle, AttribPointer)>,
    enabled: Vec<u32>,
    push_constants: Vec<u32>,
    clear_color: [f32; 4],
    draws: Vec<(u32, u32)>,
    /// Set once a pipeline failure has been logged; cleared by state changes.
    pipeline_error_logged: bool,
}

impl State {
    fn attributes(&self) -> Vec<Attribute> {
        self.pointers
            .iter()
            .filter(|(location, _)| self.enabled.contains(location))
            .map(|(&location, &(buffer, pointer))| Attribute {
                location,
                buffer,
                pointer,
            })
            .collect()
    }

    /// Writes a column-major matrix at a byte offset into the push-constant
    /// words. Returns `false` when it does not fit.
    fn set_matrix(&mut self, location: UniformLocation, matrix: &Mat4) -> bool {
        let start = location.0 as usize / 4;
        match self.push_constants.get_mut(start..start + 16) {
            Some(words) => {
                for (word, value) in words.iter_mut().zip(matrix.to_cols_array().iter()) {
                    *word = value.to_bits();
                }
                true
            }
            None => false,
        }
    }

    /// Whether a pipeline failure should be logged. Only the first one after
    /// a state change is.
    fn first_pipeline_error(&mut self) -> bool {
        !mem::replace(&mut self.pipeline_error_logged, true)
    }
}

/// Index of the buffer an upload goes to, given the usage each buffer was
/// last filled with. A static buffer takes its data once.
fn upload_slot<I>(bound: Option<BufferHandle>, mut filled: I) -> Result<usize, ContextError>
where
    I: Iterator<Item = Option<BufferUsage>>,
{
    let handle = bound.ok_or(ContextError::NoBoundBuffer)?;
    match filled.nth(handle.0 as usize) {
        None => Err(ContextError::NoBoundBuffer),
        Some(Some(BufferUsage::StaticDraw)) => Err(ContextError::StaticBuffer),
        Some(None) => Ok(handle.0 as usize),
    }
}

impl<'a, B> Renderer<'a, B>
where
    B: Backend,
{
    pub fn new(
        surface: &'a mut B::Surface,
        adapter: &'a adapter::Adapter<B>,
        device: &'a B::Device,
        queue: &'a mut B::CommandQueue,
        family: QueueFamilyId,
        config: &Config,
        resized: Arc<AtomicBool>,
    ) -> Result<Self, ContextError> {
        let memory_types = adapter.physical_device.memory_properties().memory_types;
        let limits = adapter.physical_device.limits();

        let init_dims = window::Extent2D {
            width: config.width,
            height: config.height,
        };
        let swapchain = Swapchain::new(device, surface, adapter, init_dims)?;
        let render_pass = Self::create_render_pass(device, swapchain.format)?;

        let mut command_pool = Self::create_command_pool(device, family)?;
        let frames_in_flight = config.frames_in_flight;

        let command_buffers = Self::allocate_command_buffer(&mut command_pool, frames_in_flight);
        let submission_complete_semaphores = Self::create_semaphores(device, frames_in_flight)?;
        let submission_complete_fences = Self::create_fences(device, frames_in_flight)?;

        Ok(Renderer {
            device,
            queue,
            memory_types,
            limits,
            resized,
            submission_complete_semaphores,
            submission_complete_fences,
            framebuffers: (0..frames_in_flight).map(|_| None).collect(),
            frames_in_flight,
            command_pool: ManuallyDrop::new(command_pool),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass,
            programs: Vec::new(),
            buffers: Vec::new(),
            pipeline: None,
            state: State::default(),
            command_buffers,
            frame: 0,
        })
    }

    /// Drops the pipeline so the next draw rebuilds it from current state.
    fn invalidate_pipeline(&mut self) {
        self.state.pipeline_error_logged = false;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(err) = self.device.wait_idle() {
                log::warn!("device did not go idle before pipeline rebuild: {:?}", err);
            }
            drop(pipeline);
        }
    }

    fn ensure_pipeline(&mut self) -> Result<(), ContextError> {
        if self.pipeline.is_some() {
            return Ok(());
        }
        let no_program = || ContextError::resource("graphics pipeline", "no program in use");
        let handle = self.state.program.ok_or_else(no_program)?;
        let program = self
            .programs
            .get(handle.0 as usize)
            .ok_or_else(no_program)?;
        let attributes = self.state.attributes();
        for attribute in &attributes {
            match self.buffers.get(attribute.buffer.0 as usize) {
                Some(Some(_)) => {}
                _ => {
                    return Err(ContextError::resource(
                        "graphics pipeline",
                        format!("attribute {} reads an empty buffer", attribute.location),
                    ))
                }
            }
        }

        self.pipeline = Some(Pipeline::new(
            self.device,
            &program.vs_module,
            &program.fs_module,
            &*self.render_pass,
            &attributes,
            program.linked.uniform_block_size(),
        )?);
        Ok(())
    }

    fn render(&mut self) -> Result<(), ContextError> {
        if self.resized.swap(false, Ordering::Relaxed) {
            self.swapchain.recreate()?;
        }
        if !self.state.draws.is_empty() {
            if let Err(err) = self.ensure_pipeline() {
                if self.state.first_pipeline_error() {
                    log::warn!("draws skipped: {}", err);
                }
            }
        }

        let surface_image = unsafe {
            match self.swapchain.surface.acquire_image(!0) {
                Ok((image, _)) => image,
                Err(err) => {
                    log::debug!("acquire failed ({:?}), recreating swapchain", err);
                    return self.swapchain.recreate();
                }
            }
        };

        let frame_buffer = unsafe {
            self.device.create_framebuffer(
                &self.render_pass,
                iter::once(surface_image.borrow()),
                i::Extent {
                    width: self.swapchain.dims.width,
                    height: self.swapchain.dims.height,
                    depth: 1,
                },
            )
        }
        .map_err(|err| ContextError::resource("framebuffer", err))?;

        let frame_idx = self.frame % self.frames_in_flight;

        unsafe {
            let fence = &self.submission_complete_fences[frame_idx];
            self.device
                .wait_for_fence(fence, !0)
                .map_err(|err| ContextError::resource("fence wait", err))?;
            self.device
                .reset_fence(fence)
                .map_err(|err| ContextError::resource("fence reset", err))?;
            if let Some(old) = self.framebuffers[frame_idx].take() {
                self.device.destroy_framebuffer(old);
            }
        }

        let cmd_buffer = &mut self.command_buffers[frame_idx];
        unsafe {
            cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);
            cmd_buffer.set_viewports(0, &[self.swapchain.viewport.clone()]);
            cmd_buffer.set_scissors(0, &[self.swapchain.viewport.rect]);
            cmd_buffer.begin_render_pass(
                &self.render_pass,
                &frame_buffer,
                self.swapchain.viewport.rect,
                &[command::ClearValue {
                    color: command::ClearColor {
                        float32: self.state.clear_color,
                    },
                }],
                command::SubpassContents::Inline,
            );

            if let Some(pipeline) = &self.pipeline {
                let buffers = &self.buffers;
                let vertex_buffers = pipeline.bindings.iter().filter_map(|handle| {
                    buffers[handle.0 as usize]
                        .as_ref()
                        .map(|memory| (&*memory.buffer.buf, b::SubRange::WHOLE))
                });
                cmd_buffer.bind_graphics_pipeline(&pipeline.pipeline);
                cmd_buffer.bind_vertex_buffers(0, vertex_buffers);
                if pipeline.push_constant_size > 0 {
                    let words = pipeline.push_constant_size as usize / 4;
                    cmd_buffer.push_graphics_constants(
                        &pipeline.pipeline_layout,
                        pso::ShaderStageFlags::VERTEX,
                        0,
                        &self.state.push_constants[..words],
                    );
                }
                for &(first, count) in &self.state.draws {
                    cmd_buffer.draw(first..first + count, 0..1);
                }
            }

            cmd_buffer.end_render_pass();
            cmd_buffer.finish();

            let submission = Submission {
                command_buffers: iter::once(&*cmd_buffer),
                wait_semaphores: None,
                signal_semaphores: iter::once(&self.submission_complete_semaphores[frame_idx]),
            };

            self.queue.submit(
                submission,
                Some(&self.submission_complete_fences[frame_idx]),
            );

            let result = self.queue.present_surface(
                &mut *self.swapchain.surface,
                surface_image,
                Some(&self.submission_complete_semaphores[frame_idx]),
            );

            self.framebuffers[frame_idx] = Some(frame_buffer);
            self.frame += 1;

            if let Err(err) = result {
                log::debug!("present failed ({:?}), recreating swapchain", err);
                self.swapchain.recreate()?;
            }
        }

        Ok(())
    }

    fn create_render_pass(
        device: &B::Device,
        format: f::Format,
    ) -> Result<ManuallyDrop<B::RenderPass>, ContextError> {
        let attachment = pass::Attachment {
            format: Some(format),
            samples: 1,
            ops: pass::AttachmentOps::new(
                pass::AttachmentLoadOp::Clear,
                pass::AttachmentStoreOp::Store,
            ),
            stencil_ops: pass::AttachmentOps::DONT_CARE,
            layouts: i::Layout::Undefined..i::Layout::Present,
        };

        let subpass = pass::SubpassDesc {
            colors: &[(0, i::Layout::ColorAttachmentOptimal)],
            depth_stencil: None,
            inputs: &[],
            resolves: &[],
            preserves: &[],
        };

        unsafe { device.create_render_pass(&[attachment], &[subpass], &[]) }
            .map(ManuallyDrop::new)
            .map_err(|err| ContextError::resource("render pass", err))
    }

    fn create_command_pool(
        device: &B::Device,
        family: QueueFamilyId,
    ) -> Result<B::CommandPool, ContextError> {
        unsafe { device.create_command_pool(family, pool::CommandPoolCreateFlags::RESET_INDIVIDUAL) }
            .map_err(|err| ContextError::resource("command pool", err))
    }

    fn allocate_command_buffer(
        command_pool: &mut B::CommandPool,
        frames_in_flight: usize,
    ) -> Vec<B::CommandBuffer> {
        (0..frames_in_flight)
            .map(|_| unsafe { command_pool.allocate_one(command::Level::Primary) })
            .collect()
    }

    fn create_semaphores(
        device: &B::Device,
        frames_in_flight: usize,
    ) -> Result<Vec<B::Semaphore>, ContextError> {
        (0..frames_in_flight)
            .map(|_| {
                device
                    .create_semaphore()
                    .map_err(|err| ContextError::resource("semaphore", err))
            })
            .collect()
    }

    fn create_fences(
        device: &B::Device,
        frames_in_flight: usize,
    ) -> Result<Vec<B::Fence>, ContextError> {
        (0..frames_in_flight)
            .map(|_| {
                device
                    .create_fence(true)
                    .map_err(|err| ContextError::resource("fence", err))
            })
            .collect()
    }
}

impl<'a, B: Backend> GraphicsContext for Renderer<'a, B> {
    fn create_program(
        &mut self,
        vertex: &str,
        fragment: &str,
    ) -> Result<ProgramHandle, ProgramError> {
        let program = Program::new(self.device, vertex, fragment)?;
        self.programs.push(program);
        Ok(ProgramHandle(self.programs.len() as u32 - 1))
    }

    fn use_program(&mut self, program: ProgramHandle) {
        let block_size = match self.programs.get(program.0 as usize) {
            Some(p) => p.linked.uniform_block_size(),
            None => {
                log::warn!("use_program: unknown program {:?}", program);
                return;
            }
        };
        self.invalidate_pipeline();
        self.state.program = Some(program);
        self.state.push_constants = vec![0; block_size as usize / 4];
    }

    fn create_buffer(&mut self) -> Option<BufferHandle> {
        self.buffers.push(None);
        Some(BufferHandle(self.buffers.len() as u32 - 1))
    }

    fn bind_buffer(&mut self, buffer: BufferHandle) {
        self.state.bound_buffer = Some(buffer);
    }

    fn buffer_data(&mut self, data: &[u8], usage: BufferUsage) -> Result<(), ContextError> {
        let filled = self
            .buffers
            .iter()
            .map(|slot| slot.as_ref().map(|memory| memory.usage));
        let index = upload_slot(self.state.bound_buffer, filled)?;

        let buffer = Buffer::new(self.device, data.len() as u64, &self.limits)?;
        let memory = Memory::new(buffer, data, usage, &self.memory_types)?;
        self.buffers[index] = Some(memory);
        Ok(())
    }

    fn attrib_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs
            .get(program.0 as usize)?
            .linked
            .attribute(name)
            .map(|a| a.location)
    }

    fn vertex_attrib_pointer(&mut self, location: u32, pointer: AttribPointer) {
        let buffer = match self.state.bound_buffer {
            Some(buffer) => buffer,
            None => {
                log::warn!("vertex_attrib_pointer({}) without a bound buffer", location);
                return;
            }
        };
        self.invalidate_pipeline();
        self.state.pointers.insert(location, (buffer, pointer));
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        if !self.state.enabled.contains(&location) {
            self.invalidate_pipeline();
            self.state.enabled.push(location);
        }
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(program.0 as usize)?
            .linked
            .uniform(name)
            .map(|u| UniformLocation(u.offset))
    }

    fn uniform_matrix4(&mut self, location: UniformLocation, matrix: &Mat4) {
        if !self.state.set_matrix(location, matrix) {
            log::warn!("uniform_matrix4: location {:?} out of range", location);
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.state.clear_color = color;
    }

    fn draw_arrays(&mut self, mode: Primitive, first: u32, count: u32) {
        match mode {
            Primitive::Triangles => self.state.draws.push((first, count)),
        }
    }

    fn composite(&mut self) {
        if let Err(err) = self.render() {
            log::warn!("frame dropped: {}", err);
        }
        self.state.draws.clear();
    }
}

impl<'a, B: Backend> Drop for Renderer<'a, B> {
    fn drop(&mut self) {
        let device = self.device;
        if let Err(err) = device.wait_idle() {
            log::warn!("device did not go idle before teardown: {:?}", err);
        }
        unsafe {
            self.pipeline.take();
            self.buffers.clear();
            for program in self.programs.drain(..) {
                program.destroy(device);
            }
            for framebuffer in self.framebuffers.drain(..).flatten() {
                device.destroy_framebuffer(framebuffer);
            }
            device.destroy_command_pool(ManuallyDrop::into_inner(ptr::read(&self.command_pool)));
            for s in self.submission_complete_semaphores.drain(..) {
                device.destroy_semaphore(s);
            }

            for f in self.submission_complete_fences.drain(..) {
                device.destroy_fence(f);
            }

            device.destroy_render_pass(ManuallyDrop::into_inner(ptr::read(&self.render_pass)));
            ManuallyDrop::drop(&mut self.swapchain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_enabled_pointers_become_attributes() {
        let pointer = AttribPointer {
            size: 3,
            stride: 24,
            offset: 0,
        };
        let mut state = State::default();
        state.pointers.insert(1, (BufferHandle(0), AttribPointer { offset: 12, ..pointer }));
        state.pointers.insert(0, (BufferHandle(0), pointer));
        state.pointers.insert(2, (BufferHandle(0), pointer));
        state.enabled = vec![1, 0];

        let locations: Vec<u32> = state.attributes().iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1]);
        assert_eq!(state.attributes()[1].pointer.offset, 12);
    }

    #[test]
    fn matrix_lands_column_major_at_its_byte_offset() {
        let mut state = State {
            push_constants: vec![0; 20],
            ..State::default()
        };
        let values: Vec<f32> = (1..=16).map(|v| v as f32).collect();
        let matrix = Mat4::from_cols_slice(&values);

        assert!(state.set_matrix(UniformLocation(16), &matrix));
        assert_eq!(&state.push_constants[..4], &[0; 4]);
        let written: Vec<f32> = state.push_constants[4..]
            .iter()
            .map(|w| f32::from_bits(*w))
            .collect();
        assert_eq!(written, values);
        // first column is x_axis
        assert_eq!(f32::from_bits(state.push_constants[5]), matrix.x_axis.y);
    }

    #[test]
    fn matrix_past_the_block_is_ignored() {
        let mut state = State {
            push_constants: vec![0; 16],
            ..State::default()
        };
        assert!(!state.set_matrix(UniformLocation(4), &Mat4::IDENTITY));
        assert!(state.push_constants.iter().all(|w| *w == 0));
        assert!(state.set_matrix(UniformLocation(0), &Mat4::IDENTITY));
        assert_eq!(f32::from_bits(state.push_constants[15]), 1.0);
    }

    #[test]
    fn uploads_go_to_the_bound_empty_buffer() {
        let filled = vec![Some(BufferUsage::StaticDraw), None];
        assert_eq!(upload_slot(Some(BufferHandle(1)), filled.into_iter()), Ok(1));
    }

    #[test]
    fn static_buffers_are_filled_once() {
        let filled = vec![Some(BufferUsage::StaticDraw)];
        assert_eq!(
            upload_slot(Some(BufferHandle(0)), filled.into_iter()),
            Err(ContextError::StaticBuffer)
        );
    }

    #[test]
    fn upload_without_a_known_bound_buffer_fails() {
        assert_eq!(
            upload_slot(None, iter::once(None)),
            Err(ContextError::NoBoundBuffer)
        );
        assert_eq!(
            upload_slot(Some(BufferHandle(3)), iter::once(None)),
            Err(ContextError::NoBoundBuffer)
        );
    }

    #[test]
    fn pipeline_failures_are_logged_once_per_state_change() {
        let mut state = State::default();
        assert!(state.first_pipeline_error());
        assert!(!state.first_pipeline_error());
        state.pipeline_error_logged = false;
        assert!(state.first_pipeline_error());
    }
}
