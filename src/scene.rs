use glam::Mat4;
use std::mem;

use crate::config::Config;
use crate::error::InitError;
use crate::gl::{AttribPointer, BufferUsage, GraphicsContext, Primitive, UniformLocation};
use crate::shader::{FRAGMENT_SOURCE, VERTEX_SOURCE};

mod vertex;
pub use vertex::{Vertex, TRIANGLES};

const FSIZE: u32 = mem::size_of::<f32>() as u32;

/// Everything the frame update needs once setup has succeeded.
#[derive(Debug, Clone)]
pub struct Scene {
    angle: f32,
    step: f32,
    model: Mat4,
    u_model_matrix: UniformLocation,
    clear_color: [f32; 4],
    vertex_count: u32,
}

impl Scene {
    /// Compiles the program, uploads the vertices and resolves every binding
    /// the frame update uses. Stops at the first failure.
    pub fn bootstrap<C: GraphicsContext>(ctx: &mut C, config: &Config) -> Result<Self, InitError> {
        let program = ctx.create_program(VERTEX_SOURCE, FRAGMENT_SOURCE)?;
        ctx.use_program(program);
        log::info!("shaders compiled and linked");

        let buffer = ctx.create_buffer().ok_or(InitError::Buffer)?;
        ctx.bind_buffer(buffer);
        ctx.buffer_data(bytemuck::cast_slice(&TRIANGLES[..]), BufferUsage::StaticDraw)
            .map_err(InitError::Upload)?;

        let stride = mem::size_of::<Vertex>() as u32;
        for &(name, offset) in &[("a_Position", 0), ("a_Color", 3 * FSIZE)] {
            let location = ctx
                .attrib_location(program, name)
                .ok_or(InitError::MissingAttribute(name))?;
            ctx.vertex_attrib_pointer(
                location,
                AttribPointer {
                    size: 3,
                    stride,
                    offset,
                },
            );
            ctx.enable_vertex_attrib_array(location);
        }

        let u_model_matrix = ctx
            .uniform_location(program, "u_ModelMatrix")
            .ok_or(InitError::MissingUniform("u_ModelMatrix"))?;

        Ok(Scene {
            angle: 0.0,
            step: config.angle_step,
            model: Mat4::IDENTITY,
            u_model_matrix,
            clear_color: config.clear_color,
            vertex_count: TRIANGLES.len() as u32,
        })
    }

    /// Advances the rotation by one step and draws.
    ///
    /// The new rotation is composed onto the previous matrix, so the total
    /// rotation after `n` frames is the sum of the first `n` angles.
    pub fn frame<C: GraphicsContext>(&mut self, ctx: &mut C) {
        self.angle += self.step;
        self.model = self.model * Mat4::from_rotation_y(self.angle.to_radians());
        ctx.uniform_matrix4(self.u_model_matrix, &self.model);
        ctx.clear(self.clear_color);
        ctx.draw_arrays(Primitive::Triangles, 0, self.vertex_count);
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn model(&self) -> Mat4 {
        self.model
    }
}
