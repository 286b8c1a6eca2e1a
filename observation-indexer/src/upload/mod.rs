//! Upload side of the ingestion pipeline.
//!
//! Stores trail-camera media in the blob store and turns uploads and manual
//! pins into [`IngestJob`](observation_shared::IngestJob)s on the queue.

pub mod blob;
pub mod key;
pub mod queue;
mod service;

pub use blob::{BlobCredentials, BlobStore, HttpBlobConfig, HttpBlobStore, MockBlobStore};
pub use key::blob_key;
pub use queue::{JobQueue, KafkaJobQueue, MockJobQueue, ProducerConfig};
pub use service::{ImageUpload, PinRequest, UploadReceipt, UploadService};
