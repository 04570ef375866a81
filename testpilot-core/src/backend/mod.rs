pub mod http;
pub mod traits;

pub use http::HttpPipelineBackend;
pub use traits::{ByteStream, PipelineBackend};
