#[cfg(feature = "onnx")]
pub mod detector;
pub mod error;
pub mod metadata;
pub mod models;
pub mod probe;
pub mod report;
pub mod sampler;
pub mod scan;
pub mod tags;
pub mod video;

pub use crate::error::{Error, Result};
pub use crate::models::*;
