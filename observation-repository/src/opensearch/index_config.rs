//! Index layout, templates and mappings.
//!
//! Earlier pipeline generations wrote observations under different index
//! names: a data stream, time-rotated `name-*` indices, and a legacy
//! `hunt-images-*` pattern with a nested `camera.*` shape. This module names
//! all of them and defines the index templates installed at startup.

use observation_shared::{GeometryKind, SourceKind};
use serde_json::{json, Value};

/// Default data stream for trail-camera observations.
pub const DEFAULT_OBSERVATION_STREAM: &str = "hunt-trailcam";

/// Index pattern written by the first pipeline generation.
pub const DEFAULT_LEGACY_OBSERVATION_PATTERN: &str = "hunt-images-*";

/// Default index for manual pin events.
pub const DEFAULT_EVENTS_INDEX: &str = "hunt-events";

pub const DEFAULT_WAYPOINTS_INDEX: &str = "hunt-geo-waypoints";
pub const DEFAULT_TRACKS_INDEX: &str = "hunt-geo-tracks";
pub const DEFAULT_AREAS_INDEX: &str = "hunt-geo-areas";

/// Template priority; above the built-in templates shipped with the backend.
const TEMPLATE_PRIORITY: u32 = 200;

/// Names of every index the adapter reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    /// Data stream that receives new trail-camera observations.
    pub observations: String,
    /// Older wildcard pattern that is searched but never written.
    pub legacy_observation_pattern: Option<String>,
    /// Index for manual pins.
    pub events: String,
    pub waypoints: String,
    pub tracks: String,
    pub areas: String,
}

impl Default for IndexLayout {
    fn default() -> Self {
        Self {
            observations: DEFAULT_OBSERVATION_STREAM.to_string(),
            legacy_observation_pattern: Some(DEFAULT_LEGACY_OBSERVATION_PATTERN.to_string()),
            events: DEFAULT_EVENTS_INDEX.to_string(),
            waypoints: DEFAULT_WAYPOINTS_INDEX.to_string(),
            tracks: DEFAULT_TRACKS_INDEX.to_string(),
            areas: DEFAULT_AREAS_INDEX.to_string(),
        }
    }
}

/// A named index template body.
#[derive(Debug, Clone)]
pub struct IndexTemplate {
    pub name: String,
    pub body: Value,
}

impl IndexLayout {
    /// Every index name pattern an observation search must cover.
    ///
    /// Order: the exact stream name, its time-rotated `name-*` form, then the
    /// legacy pattern. Duplicates are dropped.
    pub fn observation_search_targets(&self) -> Vec<String> {
        let mut targets = vec![
            self.observations.clone(),
            format!("{}-*", self.observations),
        ];
        if let Some(legacy) = &self.legacy_observation_pattern {
            if !targets.contains(legacy) {
                targets.push(legacy.clone());
            }
        }
        targets
    }

    /// Where a new observation of the given kind is written.
    pub fn index_for_source(&self, source: SourceKind) -> &str {
        match source {
            SourceKind::TrailcamImage => &self.observations,
            SourceKind::ManualPin => &self.events,
        }
    }

    /// Where a geometry of the given kind is written.
    pub fn index_for_geometry(&self, kind: GeometryKind) -> &str {
        match kind {
            GeometryKind::Waypoint => &self.waypoints,
            GeometryKind::Track => &self.tracks,
            GeometryKind::Area => &self.areas,
        }
    }

    /// Index templates installed by `ensure_indices`.
    pub fn templates(&self) -> Vec<IndexTemplate> {
        let mut templates = vec![
            IndexTemplate {
                name: format!("{}-stream", self.observations),
                body: json!({
                    "index_patterns": [self.observations],
                    "data_stream": {},
                    "priority": TEMPLATE_PRIORITY,
                    "template": {
                        "settings": index_settings(),
                        "mappings": observation_mappings()
                    }
                }),
            },
            IndexTemplate {
                name: format!("{}-rotated", self.observations),
                body: json!({
                    "index_patterns": [format!("{}-*", self.observations)],
                    "priority": TEMPLATE_PRIORITY,
                    "template": {
                        "settings": index_settings(),
                        "mappings": observation_mappings()
                    }
                }),
            },
            IndexTemplate {
                name: self.events.clone(),
                body: json!({
                    "index_patterns": [self.events],
                    "priority": TEMPLATE_PRIORITY,
                    "template": {
                        "settings": index_settings(),
                        "mappings": observation_mappings()
                    }
                }),
            },
            IndexTemplate {
                name: "hunt-geo".to_string(),
                body: json!({
                    "index_patterns": [self.waypoints, self.tracks, self.areas],
                    "priority": TEMPLATE_PRIORITY,
                    "template": {
                        "settings": index_settings(),
                        "mappings": geometry_mappings()
                    }
                }),
            },
        ];

        if let Some(legacy) = &self.legacy_observation_pattern {
            templates.push(IndexTemplate {
                name: legacy.trim_end_matches(|c: char| c == '*' || c == '-').to_string(),
                body: json!({
                    "index_patterns": [legacy],
                    "priority": TEMPLATE_PRIORITY,
                    "template": {
                        "settings": index_settings(),
                        "mappings": legacy_observation_mappings()
                    }
                }),
            });
        }

        templates
    }
}

fn index_settings() -> Value {
    json!({
        "number_of_shards": 1,
        "number_of_replicas": 1
    })
}

/// Mappings for canonical observations (current layout).
///
/// `labels` is analyzed text with a `raw` keyword subfield so free-text search
/// and exact filters both work. `raw_metadata` is stored but not indexed.
pub fn observation_mappings() -> Value {
    json!({
        "properties": {
            "@timestamp": { "type": "date" },
            "ingest_timestamp": { "type": "date" },
            "source": { "type": "keyword" },
            "camera_id": { "type": "keyword" },
            "spot_id": { "type": "keyword" },
            "location": { "type": "geo_point" },
            "heading": {
                "properties": {
                    "deg": { "type": "float" },
                    "cardinal_16": { "type": "keyword" }
                }
            },
            "sun_period": { "type": "keyword" },
            "media": {
                "properties": {
                    "url": { "type": "keyword", "index": false },
                    "size_bytes": { "type": "long" }
                }
            },
            "labels": {
                "type": "text",
                "fields": {
                    "raw": { "type": "keyword" }
                }
            },
            "raw_metadata": { "type": "object", "enabled": false }
        }
    })
}

/// Mappings for the legacy `hunt-images-*` layout with nested camera fields.
pub fn legacy_observation_mappings() -> Value {
    json!({
        "properties": {
            "@timestamp": { "type": "date" },
            "camera": {
                "properties": {
                    "id": { "type": "keyword" },
                    "make": { "type": "keyword" },
                    "model": { "type": "keyword" },
                    "location": { "type": "geo_point" },
                    "heading": {
                        "properties": {
                            "deg": { "type": "float" },
                            "cardinal_16": { "type": "keyword" }
                        }
                    }
                }
            },
            "labels": {
                "properties": {
                    "user": { "type": "keyword" }
                }
            },
            "media": {
                "properties": {
                    "url": { "type": "keyword" },
                    "size_bytes": { "type": "long" }
                }
            }
        }
    })
}

/// Mappings for waypoint, track and area documents.
pub fn geometry_mappings() -> Value {
    json!({
        "properties": {
            "source": { "type": "keyword" },
            "name": { "type": "text" },
            "desc": { "type": "text" },
            "geom": { "type": "geo_shape" },
            "@timestamp": { "type": "date" },
            "elev_m": { "type": "float" }
        }
    })
}
