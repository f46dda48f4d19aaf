use std::fmt;

/// Shader stage a compile error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProgramError {
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: Stage, log: String },

    #[error("program failed to link: {0}")]
    Link(String),
}

/// Failures raised by a graphics context implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContextError {
    #[error("backend is not supported: {0}")]
    Unsupported(String),

    #[error("no adapter with a graphics queue can present to the surface")]
    NoAdapter,

    #[error("failed to open the logical device: {0}")]
    Device(String),

    #[error("failed to create {what}: {reason}")]
    Resource { what: &'static str, reason: String },

    #[error("no buffer is bound")]
    NoBoundBuffer,

    #[error("buffer was uploaded with a static usage hint and cannot be rewritten")]
    StaticBuffer,
}

impl ContextError {
    pub fn resource(what: &'static str, reason: impl fmt::Debug) -> Self {
        ContextError::Resource {
            what,
            reason: format!("{:?}", reason),
        }
    }
}

/// Everything that can stop the scene before its first frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InitError {
    #[error("failed to get the rendering context: {0}")]
    ContextUnavailable(#[from] ContextError),

    #[error("failed to initialize shaders: {0}")]
    Shaders(#[from] ProgramError),

    #[error("failed to create the buffer object")]
    Buffer,

    #[error("failed to upload the vertex buffer: {0}")]
    Upload(ContextError),

    #[error("failed to get the storage location of {0}")]
    MissingAttribute(&'static str),

    #[error("failed to get the storage location of {0}")]
    MissingUniform(&'static str),
}
