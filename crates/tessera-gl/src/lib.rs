//! OpenGL backend for the Tessera GPU sub-allocator.
//!
//! This crate provides:
//! - Buffer objects behind the physical buffer traits, filled through
//!   mapped ranges
//! - Descriptor sets emulated on indexed binding points

pub mod backend;
pub mod descriptors;
pub mod error;

pub use backend::{
    buffer_from_raw, copy_args, gl_int, mapping_args, usage_hint, GlBackend, GlBuffer,
};
pub use descriptors::{GlDescriptors, GlPool, GlSet};
pub use error::{GlError, Result};
