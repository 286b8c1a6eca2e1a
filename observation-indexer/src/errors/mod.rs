//! Error types for the observation indexer.

use thiserror::Error;

use observation_repository::ObservationStoreError;

/// Errors that can occur while running the worker pipeline.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Error from the loader component (the search backend rejected a write).
    #[error("Loader error: {0}")]
    LoaderError(String),

    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Error parsing or decoding data.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A GPX or KML file could not be read.
    #[error(transparent)]
    GeometryError(#[from] GeometryParseError),
}

impl IndexingError {
    /// Create a loader error.
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::LoaderError(msg.into())
    }

    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for IndexingError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

impl From<ObservationStoreError> for IndexingError {
    fn from(err: ObservationStoreError) -> Self {
        Self::LoaderError(err.to_string())
    }
}

/// A GPX or KML document that cannot be turned into geometries.
///
/// Any of these aborts ingestion of the whole file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryParseError {
    /// The XML itself is malformed.
    #[error("Malformed XML: {0}")]
    Xml(String),

    /// The document root is not what the format requires.
    #[error("Unexpected root element: expected <{expected}>, found <{found}>")]
    UnexpectedRoot { expected: &'static str, found: String },

    /// A coordinate or attribute value does not parse.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

impl GeometryParseError {
    pub fn xml(msg: impl Into<String>) -> Self {
        Self::Xml(msg.into())
    }

    pub fn invalid_coordinate(msg: impl Into<String>) -> Self {
        Self::InvalidCoordinate(msg.into())
    }
}

impl From<quick_xml::Error> for GeometryParseError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

/// Errors from the blob store.
#[derive(Error, Debug)]
pub enum BlobError {
    /// The request could not be sent or timed out.
    #[error("Blob request error: {0}")]
    RequestError(String),

    /// The store answered with a non-success status.
    #[error("Blob store returned {status} for key {key}")]
    StatusError { status: u16, key: String },

    /// The store is misconfigured.
    #[error("Blob configuration error: {0}")]
    ConfigError(String),
}

impl BlobError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::RequestError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

impl From<reqwest::Error> for BlobError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestError(err.to_string())
    }
}

/// Errors from the ingestion queue producer.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Kafka error: {0}")]
    KafkaError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl QueueError {
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for QueueError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Errors returned to the caller of an upload.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The request is missing a required field or carries an invalid one.
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl UploadError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}
