//! Fixed shader sources and the reflection used to resolve names to
//! attribute locations and uniform offsets.

use naga::front::glsl;
use naga::proc::Layouter;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, ShaderStage, Type, TypeInner};

use crate::error::{ProgramError, Stage};

pub const VERTEX_SOURCE: &str = r#"#version 450
layout(location = 0) in vec4 a_Position;
layout(location = 1) in vec4 a_Color;

layout(push_constant) uniform Transform {
    mat4 u_ModelMatrix;
};

layout(location = 0) out vec4 v_Color;

void main() {
    gl_Position = u_ModelMatrix * a_Position;
    // GL clip space to Vulkan: y points down, depth in [0, 1]
    gl_Position.y = -gl_Position.y;
    gl_Position.z = (gl_Position.z + gl_Position.w) / 2.0;
    v_Color = a_Color;
}
"#;

pub const FRAGMENT_SOURCE: &str = r#"#version 450
layout(location = 0) in vec4 v_Color;

layout(location = 0) out vec4 o_Color;

void main() {
    o_Color = v_Color;
}
"#;

/// A `layout(location = N) in|out` stage variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub location: u32,
    pub ty: TypeInner,
}

/// A member of the push-constant block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interface {
    pub inputs: Vec<Variable>,
    pub outputs: Vec<Variable>,
    pub push_constants: Vec<Member>,
}

impl Interface {
    /// Parses and validates one stage with naga, then reads the located
    /// inputs and outputs of its entry point and the members of its
    /// push-constant block.
    pub fn reflect(source: &str, stage: Stage) -> Result<Self, ProgramError> {
        let compile_error = |log: String| ProgramError::Compile { stage, log };
        let shader_stage = match stage {
            Stage::Vertex => ShaderStage::Vertex,
            Stage::Fragment => ShaderStage::Fragment,
        };

        let module = glsl::Frontend::default()
            .parse(&glsl::Options::from(shader_stage), source)
            .map_err(|err| compile_error(format!("{:?}", err)))?;
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|err| compile_error(format!("{:?}", err)))?;
        let mut layouter = Layouter::default();
        layouter
            .update(module.to_ctx())
            .map_err(|err| compile_error(format!("{:?}", err)))?;

        let entry = module
            .entry_points
            .iter()
            .find(|entry| entry.stage == shader_stage)
            .ok_or_else(|| compile_error("no entry point".to_owned()))?;

        let inputs = entry
            .function
            .arguments
            .iter()
            .filter_map(|arg| located(&module, arg.binding.as_ref(), arg.name.as_deref(), arg.ty))
            .collect();

        let outputs = match &entry.function.result {
            Some(result) => match &module.types[result.ty].inner {
                TypeInner::Struct { members, .. } => members
                    .iter()
                    .filter_map(|m| located(&module, m.binding.as_ref(), m.name.as_deref(), m.ty))
                    .collect(),
                _ => located(&module, result.binding.as_ref(), None, result.ty)
                    .into_iter()
                    .collect(),
            },
            None => Vec::new(),
        };

        let mut push_constants = Vec::new();
        for (_, global) in module.global_variables.iter() {
            if global.space != AddressSpace::PushConstant {
                continue;
            }
            match &module.types[global.ty].inner {
                TypeInner::Struct { members, .. } => {
                    push_constants.extend(members.iter().map(|m| Member {
                        name: m.name.clone().unwrap_or_default(),
                        offset: m.offset,
                        size: layouter[m.ty].size,
                    }))
                }
                _ => push_constants.push(Member {
                    name: global.name.clone().unwrap_or_default(),
                    offset: 0,
                    size: layouter[global.ty].size,
                }),
            }
        }

        Ok(Interface {
            inputs,
            outputs,
            push_constants,
        })
    }
}

/// Builtins such as `gl_Position` carry no location and are skipped.
fn located(
    module: &Module,
    binding: Option<&Binding>,
    name: Option<&str>,
    ty: Handle<Type>,
) -> Option<Variable> {
    match binding? {
        Binding::Location { location, .. } => Some(Variable {
            name: name.unwrap_or_default().to_owned(),
            location: *location,
            ty: module.types[ty].inner.clone(),
        }),
        Binding::BuiltIn(_) => None,
    }
}

/// Attributes and uniforms of a vertex/fragment pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Linked {
    pub attributes: Vec<Variable>,
    pub uniforms: Vec<Member>,
}

impl Linked {
    pub fn from_sources(vertex: &str, fragment: &str) -> Result<Self, ProgramError> {
        let vs = Interface::reflect(vertex, Stage::Vertex)?;
        let fs = Interface::reflect(fragment, Stage::Fragment)?;
        Self::link(vs, fs)
    }

    pub fn link(vertex: Interface, fragment: Interface) -> Result<Self, ProgramError> {
        for input in &fragment.inputs {
            let written = vertex
                .outputs
                .iter()
                .any(|out| out.location == input.location && out.ty == input.ty);
            if !written {
                return Err(ProgramError::Link(format!(
                    "fragment input {} at location {} has no matching vertex output",
                    input.name, input.location
                )));
            }
        }

        let mut uniforms = vertex.push_constants;
        for member in fragment.push_constants {
            match uniforms.iter().find(|u| u.name == member.name) {
                Some(u) if *u == member => {}
                Some(_) => {
                    return Err(ProgramError::Link(format!(
                        "uniform {} is declared differently in both stages",
                        member.name
                    )))
                }
                None => uniforms.push(member),
            }
        }

        Ok(Linked {
            attributes: vertex.inputs,
            uniforms,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&Variable> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn uniform(&self, name: &str) -> Option<&Member> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Bytes covered by the push-constant block, a multiple of 4.
    pub fn uniform_block_size(&self) -> u32 {
        let end = self
            .uniforms
            .iter()
            .map(|u| u.offset + u.size)
            .max()
            .unwrap_or(0);
        (end + 3) / 4 * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use naga::{Scalar, VectorSize};

    const VEC4: TypeInner = TypeInner::Vector {
        size: VectorSize::Quad,
        scalar: Scalar::F32,
    };

    /// Fragment shader reading one input, for link checks.
    fn fragment_reading(decl: &str, expr: &str) -> String {
        format!(
            "#version 450\n{}\nlayout(location = 0) out vec4 o_Color;\nvoid main() {{ o_Color = {}; }}\n",
            decl, expr
        )
    }

    #[test]
    fn reflects_fixed_vertex_shader() {
        let vs = Interface::reflect(VERTEX_SOURCE, Stage::Vertex).unwrap();
        let mut inputs: Vec<(&str, u32)> = vs
            .inputs
            .iter()
            .map(|v| (v.name.as_str(), v.location))
            .collect();
        inputs.sort();
        assert_eq!(inputs, vec![("a_Color", 1), ("a_Position", 0)]);
        assert!(vs.inputs.iter().all(|v| v.ty == VEC4));
        assert_eq!(vs.outputs.len(), 1);
        assert_eq!(vs.outputs[0].location, 0);
        assert_eq!(
            vs.push_constants,
            vec![Member {
                name: "u_ModelMatrix".into(),
                offset: 0,
                size: 64,
            }]
        );
    }

    #[test]
    fn fixed_program_links() {
        let linked = Linked::from_sources(VERTEX_SOURCE, FRAGMENT_SOURCE).unwrap();
        assert_eq!(linked.attribute("a_Color").map(|a| a.location), Some(1));
        assert_eq!(linked.uniform("u_ModelMatrix").map(|u| u.offset), Some(0));
        assert_eq!(linked.uniform_block_size(), 64);
        assert!(linked.attribute("a_Normal").is_none());
    }

    #[test]
    fn precision_qualifiers_and_split_declarations_are_accepted() {
        let vs = r#"#version 450
layout(location = 0) in highp vec4 a_Position;
layout(location = 3)
    in vec4 a_Color;
layout(push_constant) uniform Transform
{
    vec4 u_Tint;
    mat4 u_ModelMatrix;
};
layout(location = 0) out vec4 v_Color;
void main() {
    gl_Position = u_ModelMatrix * a_Position;
    v_Color = a_Color * u_Tint;
}
"#;
        let linked = Linked::from_sources(vs, FRAGMENT_SOURCE).unwrap();
        assert_eq!(linked.attribute("a_Position").map(|a| a.location), Some(0));
        assert_eq!(linked.attribute("a_Color").map(|a| a.location), Some(3));
        assert_eq!(linked.uniform("u_ModelMatrix").map(|u| u.offset), Some(16));
        assert_eq!(linked.uniform_block_size(), 80);
    }

    #[test]
    fn block_members_are_laid_out_with_alignment() {
        let vs = r#"#version 450
layout(push_constant) uniform Block {
    float scale;
    vec3 tint;
    vec2 offset;
    mat4 model;
};
void main() {
    gl_Position = model * vec4(tint * scale, offset.x);
}
"#;
        let offsets: Vec<u32> = Interface::reflect(vs, Stage::Vertex)
            .unwrap()
            .push_constants
            .iter()
            .map(|m| m.offset)
            .collect();
        assert_eq!(offsets, vec![0, 16, 32, 48]);
    }

    #[test]
    fn unmatched_fragment_input_fails_to_link() {
        let fs = fragment_reading("layout(location = 2) in vec4 v_Normal;", "v_Normal");
        match Linked::from_sources(VERTEX_SOURCE, &fs) {
            Err(ProgramError::Link(log)) => assert!(log.contains("v_Normal")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn mismatched_varying_type_fails_to_link() {
        let fs = fragment_reading("layout(location = 0) in vec3 v_Color;", "vec4(v_Color, 1.0)");
        assert!(matches!(
            Linked::from_sources(VERTEX_SOURCE, &fs),
            Err(ProgramError::Link(_))
        ));
    }

    #[test]
    fn undeclared_identifiers_are_compile_errors() {
        let fs = fragment_reading("", "v_Missing");
        match Linked::from_sources(VERTEX_SOURCE, &fs) {
            Err(ProgramError::Compile { stage, log }) => {
                assert_eq!(stage, Stage::Fragment);
                assert!(!log.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn source_without_main_is_rejected() {
        let vs = "#version 450\nlayout(location = 0) in vec4 a_Position;\n";
        assert!(Interface::reflect(vs, Stage::Vertex).is_err());
    }
}
