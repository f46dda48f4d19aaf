use gfx_hal::{prelude::*, pso, Backend};
use std::io::{Cursor, Read};

use crate::error::{ProgramError, Stage};
use crate::shader::Linked;

/// Compiled shader modules of both stages plus their resolved interface.
pub struct Program<B: Backend> {
    pub vs_module: B::ShaderModule,
    pub fs_module: B::ShaderModule,
    pub linked: Linked,
}

impl<B: Backend> Program<B> {
    pub fn new(device: &B::Device, vertex: &str, fragment: &str) -> Result<Self, ProgramError> {
        let vs_module = load_glsl::<B>(device, vertex, Stage::Vertex)?;
        let fs_module = match load_glsl::<B>(device, fragment, Stage::Fragment) {
            Ok(module) => module,
            Err(err) => {
                unsafe { device.destroy_shader_module(vs_module) };
                return Err(err);
            }
        };

        match Linked::from_sources(vertex, fragment) {
            Ok(linked) => Ok(Program {
                vs_module,
                fs_module,
                linked,
            }),
            Err(err) => {
                unsafe {
                    device.destroy_shader_module(vs_module);
                    device.destroy_shader_module(fs_module);
                }
                Err(err)
            }
        }
    }

    pub unsafe fn destroy(self, device: &B::Device) {
        device.destroy_shader_module(self.vs_module);
        device.destroy_shader_module(self.fs_module);
    }
}

fn load_glsl<B: Backend>(
    device: &B::Device,
    source: &str,
    stage: Stage,
) -> Result<B::ShaderModule, ProgramError> {
    let compile_error = |log: String| ProgramError::Compile { stage, log };
    let ty = match stage {
        Stage::Vertex => glsl_to_spirv::ShaderType::Vertex,
        Stage::Fragment => glsl_to_spirv::ShaderType::Fragment,
    };

    let mut file = glsl_to_spirv::compile(source, ty).map_err(compile_error)?;
    let mut buf = vec![];
    file.read_to_end(&mut buf)
        .map_err(|err| compile_error(err.to_string()))?;
    let spirv = pso::read_spirv(Cursor::new(&buf[..])).map_err(|err| compile_error(err.to_string()))?;
    let module = unsafe { device.create_shader_module(&spirv) }
        .map_err(|err| compile_error(format!("{:?}", err)))?;
    log::debug!("{} shader compiled: {} words", stage, spirv.len());
    Ok(module)
}
