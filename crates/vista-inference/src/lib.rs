//! Vista inference runtime
//!
//! Vision and text embedding models behind traits, a process-wide
//! [`InferenceRuntime`] holding them, and [`RemoteModel`], a client for an
//! HTTP inference server.

pub mod error;
pub mod model;
pub mod remote;
pub mod runtime;

pub use error::InferenceError;
pub use model::{TextModel, VisionModel};
pub use remote::{RemoteModel, RemoteModelConfig};
pub use runtime::InferenceRuntime;
