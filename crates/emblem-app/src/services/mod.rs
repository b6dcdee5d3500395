//! IO-bound collaborators of the enrichment pipeline and the loop driving them.
//!
//! Pure data and naming rules live in `crate::pipeline`; everything here talks
//! to the network, the filesystem or the clock.

pub mod checkpoint;
pub mod classifier;
pub mod fetch;
pub mod object_store;
pub mod orchestrator;
pub mod retry;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointState, CheckpointStore};
pub use classifier::{
    Classifier, ClassifierInitError, GeminiClassifier, ServiceError, ServiceErrorKind,
};
pub use fetch::{ContentFetcher, FetchError, HttpFetcher};
pub use object_store::{
    DurableWrite, FsObjectStore, GcsObjectStore, ObjectStore, StoreError, validate_object_name,
};
pub use orchestrator::{
    Orchestrator, PipelineDeps, PipelineError, PipelineOptions, RunReport, RunStats,
};
pub use retry::{ClassifyOutcome, Fallback, RetryController, RetryPolicy};
