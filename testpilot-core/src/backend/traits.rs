use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::error::TestPilotResult;
use crate::models::RunHandle;

/// Raw body of an event subscription, chunked however the transport delivers it.
pub type ByteStream = BoxStream<'static, TestPilotResult<Bytes>>;

/// Transport to a remote pipeline.
#[async_trait]
pub trait PipelineBackend: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Submits a run for the given (already normalised) identifiers.
    async fn start_run(&self, identifiers: &[String]) -> TestPilotResult<RunHandle>;

    /// Opens the ordered event stream of an acknowledged run.
    async fn open_stream(&self, handle: &RunHandle) -> TestPilotResult<ByteStream>;
}
