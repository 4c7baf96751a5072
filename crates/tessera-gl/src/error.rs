//! OpenGL backend error types.

use thiserror::Error;

/// OpenGL backend errors.
#[derive(Error, Debug)]
pub enum GlError {
    /// A GL call reported an error.
    #[error("OpenGL error: {0}")]
    Gl(String),

    /// A value does not fit the 32-bit sizes GL takes.
    #[error("Value {0} exceeds the GL size range")]
    SizeOverflow(u64),

    /// A raw handle does not name a GL object.
    #[error("Invalid GL handle {0}")]
    InvalidHandle(u64),

    /// A texture was bound before being registered.
    #[error("Texture {0} is not registered")]
    UnknownTexture(u64),

    /// A descriptor set was used after being freed.
    #[error("Descriptor set {0} does not exist")]
    UnknownSet(u32),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GlError>;

impl From<GlError> for tessera_memory::Error {
    fn from(err: GlError) -> Self {
        Self::Backend(err.to_string())
    }
}
