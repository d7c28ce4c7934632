pub mod fetcher;
pub mod locator;
pub mod notify;
pub mod pipeline;
pub mod summary;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod transport;

pub use fetcher::{AttemptError, FetchError, Fetcher, RetryPolicy, PDF_MAGIC};
pub use locator::{Candidate, Locator, Resolution, ResolutionStage};
pub use pipeline::Pipeline;
pub use summary::{PublicationOutcome, PublicationReport, RunSummary};
pub use transport::{HttpTransport, Transport, TransportError};
