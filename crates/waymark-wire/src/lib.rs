//! Plain serde-derived shapes for the external task-submission interface.
//! No transport code lives here: binding these to HTTP/gRPC/WebSocket is the
//! job of an external collaborator, not this crate.

mod control;
mod stream;
mod submit;

pub use control::{ControlEndpointRequest, ControlStateResponse};
pub use stream::{SseEnvelope, StreamQuery};
pub use submit::{SubmitTaskContext, SubmitTaskRequest, SubmitTaskResponse, TaskOutputResponse};
