//! Upload entry points: trail-camera images and manual pins.
//!
//! Both end as an [`IngestJob`] on the queue. Images are written to the blob
//! store first and the job carries their public URL.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::errors::UploadError;
use crate::telemetry::{non_fatal, TraceContext};
use crate::upload::blob::BlobStore;
use crate::upload::key::blob_key;
use crate::upload::queue::JobQueue;
use observation_shared::{GeoPoint, IngestJob, ObservationSeed, RawNumber, SourceKind};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A trail-camera image as received from the upload form.
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub camera_id: Option<String>,
    pub spot_id: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub lat: Option<RawNumber>,
    pub lon: Option<RawNumber>,
    pub heading_deg: Option<RawNumber>,
    pub labels: Vec<String>,
    pub label: Option<String>,
    pub exif: BTreeMap<String, String>,
    /// `traceparent` of the incoming request, if any.
    pub traceparent: Option<String>,
}

/// A location pinned by hand.
#[derive(Debug, Clone, Default)]
pub struct PinRequest {
    pub lat: Option<RawNumber>,
    pub lon: Option<RawNumber>,
    /// When the event happened; the enqueue time is used when absent.
    pub observed_at: Option<DateTime<Utc>>,
    /// e.g. stand, rub, scrape, sighting
    pub event_type: Option<String>,
    pub species: Option<String>,
    pub spot_id: Option<String>,
    pub labels: Vec<String>,
    pub traceparent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReceipt {
    pub key: String,
    pub media_url: String,
    /// `None` when the blob was stored but the job could not be queued.
    pub job_id: Option<String>,
}

/// Upload-side entry points: store media, then hand the observation to the
/// worker pipeline through the job queue.
pub struct UploadService {
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn JobQueue>,
}

impl UploadService {
    pub fn new(blobs: Arc<dyn BlobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { blobs, queue }
    }

    /// Store an image and enqueue its ingest job.
    ///
    /// A blob write failure rejects the upload. A queue failure does not: the
    /// image is already stored, so the receipt is returned without a job id.
    #[instrument(
        skip(self, upload),
        fields(camera_id = ?upload.camera_id, size = upload.bytes.len())
    )]
    pub async fn submit_image(&self, upload: ImageUpload) -> Result<UploadReceipt, UploadError> {
        if upload.bytes.is_empty() {
            return Err(UploadError::validation("empty upload"));
        }

        let key = blob_key(
            upload.camera_id.as_deref(),
            Utc::now(),
            upload.file_name.as_deref(),
        );
        let content_type = upload
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        self.blobs.put(&key, &upload.bytes, content_type).await?;
        let media_url = self.blobs.public_url(&key);

        let mut seed = ObservationSeed::new(SourceKind::TrailcamImage);
        seed.camera_id = upload.camera_id;
        seed.spot_id = upload.spot_id;
        seed.lat = upload.lat;
        seed.lon = upload.lon;
        seed.heading_deg = upload.heading_deg;
        seed.labels = upload.labels;
        seed.label = upload.label;
        seed.media_url = Some(media_url.clone());
        seed.size_bytes = Some(upload.bytes.len() as u64);
        seed.exif = upload.exif;

        let job = self.prepare_job(seed, upload.traceparent.as_deref()).await;
        let job_id = match self.queue.enqueue(&job).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(key = %key, error = %e, "Image stored but ingest job was not queued");
                None
            }
        };

        info!(key = %key, job_id = ?job_id, "Image upload accepted");
        Ok(UploadReceipt {
            key,
            media_url,
            job_id,
        })
    }

    /// Validate a pin and enqueue it as a `manual-pin` job. Returns the job id.
    #[instrument(skip(self, pin), fields(event_type = ?pin.event_type))]
    pub async fn submit_pin(&self, pin: PinRequest) -> Result<String, UploadError> {
        let lat = required_number("lat", pin.lat.as_ref())?;
        let lon = required_number("lon", pin.lon.as_ref())?;
        if GeoPoint::new(lat, lon).is_none() {
            return Err(UploadError::validation(format!(
                "coordinates out of range: lat={} lon={}",
                lat, lon
            )));
        }

        let mut seed = ObservationSeed::new(SourceKind::ManualPin);
        seed.lat = pin.lat;
        seed.lon = pin.lon;
        seed.spot_id = pin.spot_id;
        seed.observed_at = pin.observed_at;
        seed.labels = pin
            .labels
            .into_iter()
            .chain(pin.event_type)
            .chain(pin.species)
            .collect();

        let job = self.prepare_job(seed, pin.traceparent.as_deref()).await;
        let job_id = self.queue.enqueue(&job).await?;

        info!(job_id = %job_id, "Pin accepted");
        Ok(job_id)
    }

    /// Wrap a seed into a job carrying the trace context, and sample the
    /// queue depth.
    async fn prepare_job(&self, seed: ObservationSeed, traceparent: Option<&str>) -> IngestJob {
        let mut job = IngestJob::new(seed);

        let context = match traceparent.and_then(TraceContext::parse) {
            Some(parent) => TraceContext::child_of(&parent),
            None => TraceContext::new_root(),
        };
        context.inject(&mut job.trace_context);

        if let Some(depth) = non_fatal("queue_depth", self.queue.depth().await) {
            info!(queue_depth = depth, "Ingest queue depth");
        }
        job
    }
}

fn required_number(field: &str, value: Option<&RawNumber>) -> Result<f64, UploadError> {
    value
        .ok_or_else(|| UploadError::validation(format!("{} is required", field)))?
        .as_finite_f64()
        .ok_or_else(|| UploadError::validation(format!("{} is not a number", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TRACEPARENT;
    use crate::upload::blob::MockBlobStore;
    use crate::upload::queue::MockJobQueue;

    const PARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn service(
        blobs: MockBlobStore,
        queue: MockJobQueue,
    ) -> (UploadService, Arc<MockBlobStore>, Arc<MockJobQueue>) {
        let blobs = Arc::new(blobs);
        let queue = Arc::new(queue);
        (
            UploadService::new(blobs.clone(), queue.clone()),
            blobs,
            queue,
        )
    }

    fn image() -> ImageUpload {
        let mut exif = BTreeMap::new();
        exif.insert(
            "EXIF DateTimeOriginal".to_string(),
            "2024:10:03 06:12:44".to_string(),
        );
        ImageUpload {
            camera_id: Some("cam-7".to_string()),
            file_name: Some("IMG_0042.JPG".to_string()),
            content_type: Some("image/jpeg".to_string()),
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
            lat: Some(RawNumber::from("44.91")),
            lon: Some(RawNumber::from(-93.2)),
            label: Some("buck".to_string()),
            exif,
            traceparent: Some(PARENT.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_image() {
        let (service, blobs, queue) = service(MockBlobStore::new(), MockJobQueue::new());

        let receipt = service.submit_image(image()).await.unwrap();
        assert!(receipt.key.starts_with("uploads/cam-7/"));
        assert!(receipt.key.ends_with(".jpg"));
        assert_eq!(receipt.media_url, format!("mock://blobs/{}", receipt.key));
        assert_eq!(receipt.job_id.as_deref(), Some("observation.ingest/0/0"));

        let stored = blobs.get(&receipt.key).unwrap();
        assert_eq!(stored.content_type, "image/jpeg");
        assert_eq!(stored.bytes.len(), 4);

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 1);
        let seed = &jobs[0].seed;
        assert_eq!(seed.source, SourceKind::TrailcamImage);
        assert_eq!(seed.media_url.as_deref(), Some(receipt.media_url.as_str()));
        assert_eq!(seed.size_bytes, Some(4));
        assert_eq!(seed.label.as_deref(), Some("buck"));
        assert_eq!(seed.exif.len(), 1);

        // the worker's span links back to the request's trace
        let ctx = TraceContext::extract(&jobs[0].trace_context).unwrap();
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_ne!(ctx.span_id, "00f067aa0ba902b7");
    }

    #[tokio::test]
    async fn test_blob_failure_rejects_upload() {
        let (service, _, queue) = service(MockBlobStore::failing(), MockJobQueue::new());

        let err = service.submit_image(image()).await.unwrap_err();
        assert!(matches!(err, UploadError::Blob(_)));
        assert!(queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_queue_failure_keeps_upload() {
        let (service, blobs, _) = service(MockBlobStore::new(), MockJobQueue::failing());

        let receipt = service.submit_image(image()).await.unwrap();
        assert!(receipt.job_id.is_none());
        assert_eq!(blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_queue_depth_failure_is_ignored() {
        let (service, _, queue) = service(MockBlobStore::new(), MockJobQueue::without_depth());

        let receipt = service.submit_image(image()).await.unwrap();
        assert!(receipt.job_id.is_some());
        assert_eq!(queue.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let (service, blobs, _) = service(MockBlobStore::new(), MockJobQueue::new());

        let upload = ImageUpload {
            bytes: Vec::new(),
            ..image()
        };
        assert!(matches!(
            service.submit_image(upload).await,
            Err(UploadError::ValidationError(_))
        ));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_missing_trace_starts_new_root() {
        let (service, _, queue) = service(MockBlobStore::new(), MockJobQueue::new());

        let upload = ImageUpload {
            traceparent: Some("not-a-traceparent".to_string()),
            content_type: None,
            ..image()
        };
        service.submit_image(upload).await.unwrap();

        let job = &queue.jobs()[0];
        assert!(job.trace_context.contains_key(TRACEPARENT));
        assert!(TraceContext::extract(&job.trace_context).is_some());
    }

    #[tokio::test]
    async fn test_submit_pin() {
        let (service, _, queue) = service(MockBlobStore::new(), MockJobQueue::new());

        let observed_at = DateTime::parse_from_rfc3339("2024-10-03T17:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let pin = PinRequest {
            lat: Some(RawNumber::from("44.5")),
            lon: Some(RawNumber::from(-93.25)),
            observed_at: Some(observed_at),
            event_type: Some("scrape".to_string()),
            species: Some("deer".to_string()),
            spot_id: Some("north-ridge".to_string()),
            ..Default::default()
        };

        let job_id = service.submit_pin(pin).await.unwrap();
        assert_eq!(job_id, "observation.ingest/0/0");

        let seed = &queue.jobs()[0].seed;
        assert_eq!(seed.source, SourceKind::ManualPin);
        assert_eq!(seed.observed_at, Some(observed_at));
        assert_eq!(seed.labels, vec!["scrape".to_string(), "deer".to_string()]);
        assert!(seed.media_url.is_none());
    }

    #[tokio::test]
    async fn test_invalid_pins_are_rejected() {
        let (service, _, queue) = service(MockBlobStore::new(), MockJobQueue::new());

        let missing_lon = PinRequest {
            lat: Some(RawNumber::from(44.5)),
            ..Default::default()
        };
        let not_a_number = PinRequest {
            lat: Some(RawNumber::from("north")),
            lon: Some(RawNumber::from(-93.0)),
            ..Default::default()
        };
        let out_of_range = PinRequest {
            lat: Some(RawNumber::from(95.0)),
            lon: Some(RawNumber::from(-93.0)),
            ..Default::default()
        };

        for pin in [missing_lon, not_a_number, out_of_range] {
            assert!(matches!(
                service.submit_pin(pin).await,
                Err(UploadError::ValidationError(_))
            ));
        }
        assert!(queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_pin_queue_failure_is_an_error() {
        let (service, _, _) = service(MockBlobStore::new(), MockJobQueue::failing());

        let pin = PinRequest {
            lat: Some(RawNumber::from(44.5)),
            lon: Some(RawNumber::from(-93.0)),
            ..Default::default()
        };
        assert!(matches!(
            service.submit_pin(pin).await,
            Err(UploadError::Queue(_))
        ));
    }
}
