use gfx_hal::{format as f, pass::Subpass, prelude::*, pso, Backend};
use std::iter;
use std::mem::{self, ManuallyDrop};
use std::ptr;

use crate::error::ContextError;
use crate::gl::{AttribPointer, BufferHandle};

const ENTRY_NAME: &str = "main";

/// One enabled attribute and the buffer it was pointed at.
#[derive(Debug, Clone, Copy)]
pub struct Attribute {
    pub location: u32,
    pub buffer: BufferHandle,
    pub pointer: AttribPointer,
}

pub struct Pipeline<'a, B: Backend> {
    device: &'a B::Device,
    pub pipeline: ManuallyDrop<B::GraphicsPipeline>,
    pub pipeline_layout: ManuallyDrop<B::PipelineLayout>,
    /// Buffer bound to each vertex binding, in binding order.
    pub bindings: Vec<BufferHandle>,
    pub push_constant_size: u32,
}

impl<'a, B: Backend> Pipeline<'a, B> {
    pub fn new(
        device: &'a B::Device,
        vs_module: &B::ShaderModule,
        fs_module: &B::ShaderModule,
        render_pass: &B::RenderPass,
        attributes: &[Attribute],
        push_constant_size: u32,
    ) -> Result<Self, ContextError> {
        let formats = attributes
            .iter()
            .map(|attribute| float_format(attribute.pointer.size))
            .collect::<Result<Vec<_>, _>>()?;
        let push_constants = if push_constant_size > 0 {
            vec![(pso::ShaderStageFlags::VERTEX, 0..push_constant_size)]
        } else {
            vec![]
        };
        let pipeline_layout = unsafe {
            device.create_pipeline_layout(iter::empty::<B::DescriptorSetLayout>(), &push_constants)
        }
        .map_err(|err| ContextError::resource("pipeline layout", err))?;

        let shader_entries = pso::GraphicsShaderSet {
            vertex: pso::EntryPoint {
                entry: ENTRY_NAME,
                module: vs_module,
                specialization: pso::Specialization::default(),
            },
            hull: None,
            domain: None,
            geometry: None,
            fragment: Some(pso::EntryPoint {
                entry: ENTRY_NAME,
                module: fs_module,
                specialization: pso::Specialization::default(),
            }),
        };

        let subpass = Subpass {
            index: 0,
            main_pass: render_pass,
        };

        let mut pipeline_desc = pso::GraphicsPipelineDesc::new(
            shader_entries,
            pso::Primitive::TriangleList,
            pso::Rasterizer::FILL,
            &pipeline_layout,
            subpass,
        );
        pipeline_desc.blender.targets.push(pso::ColorBlendDesc {
            mask: pso::ColorMask::ALL,
            blend: Some(pso::BlendState::ALPHA),
        });

        let mut bindings: Vec<BufferHandle> = Vec::new();
        for (attribute, format) in attributes.iter().zip(formats) {
            let binding = match bindings.iter().position(|b| *b == attribute.buffer) {
                Some(binding) => binding,
                None => {
                    bindings.push(attribute.buffer);
                    pipeline_desc.vertex_buffers.push(pso::VertexBufferDesc {
                        binding: bindings.len() as u32 - 1,
                        stride: stride_of(&attribute.pointer),
                        rate: pso::VertexInputRate::Vertex,
                    });
                    bindings.len() - 1
                }
            };
            pipeline_desc.attributes.push(pso::AttributeDesc {
                location: attribute.location,
                binding: binding as u32,
                element: pso::Element {
                    format,
                    offset: attribute.pointer.offset,
                },
            });
        }

        let pipeline = unsafe { device.create_graphics_pipeline(&pipeline_desc, None) };
        drop(pipeline_desc);
        let pipeline = match pipeline {
            Ok(pipeline) => pipeline,
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout) };
                return Err(ContextError::resource("graphics pipeline", err));
            }
        };
        log::debug!(
            "pipeline built: {} attributes over {} bindings",
            attributes.len(),
            bindings.len()
        );

        Ok(Pipeline {
            device,
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            bindings,
            push_constant_size,
        })
    }
}

/// A zero stride means tightly packed, as in GL.
fn stride_of(pointer: &AttribPointer) -> u32 {
    if pointer.stride == 0 {
        pointer.size * mem::size_of::<f32>() as u32
    } else {
        pointer.stride
    }
}

fn float_format(size: u32) -> Result<f::Format, ContextError> {
    Ok(match size {
        1 => f::Format::R32Sfloat,
        2 => f::Format::Rg32Sfloat,
        3 => f::Format::Rgb32Sfloat,
        4 => f::Format::Rgba32Sfloat,
        _ => {
            return Err(ContextError::resource(
                "vertex attribute",
                format!("{} components", size),
            ))
        }
    })
}

impl<'a, B: Backend> Drop for Pipeline<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_graphics_pipeline(ManuallyDrop::into_inner(ptr::read(&self.pipeline)));
            self.device
                .destroy_pipeline_layout(ManuallyDrop::into_inner(ptr::read(
                    &self.pipeline_layout,
                )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_stride_is_derived_from_component_count() {
        let pointer = AttribPointer {
            size: 3,
            stride: 0,
            offset: 0,
        };
        assert_eq!(stride_of(&pointer), 12);
        assert_eq!(
            stride_of(&AttribPointer {
                stride: 24,
                ..pointer
            }),
            24
        );
    }

    #[test]
    fn attribute_sizes_map_to_float_formats() {
        assert_eq!(float_format(3), Ok(f::Format::Rgb32Sfloat));
        assert!(float_format(5).is_err());
    }
}
