//! Search request body construction.
//!
//! Filters combine conjunctively. Time range and bounding box go in the
//! non-scoring `filter` clause; free text goes in `must` as a weighted
//! multi-field match. The time range and the bounding box are each a `should`
//! over every known field for that attribute, so a document written in any
//! layout matches when the field it carries falls inside the bounds. Sorting
//! walks the timestamp candidates in lookup order.

use observation_shared::{timestamp::format_millis, BoundingBox, ObservationQuery, TimeRange};
use serde_json::{json, Value};

use crate::opensearch::field_lookup::FieldLookup;

/// Build the full search body for an observation query.
///
/// # Arguments
///
/// * `query` - Validated query parameters
/// * `fields` - Field lookup table naming sort, filter and text fields
///
/// # Returns
///
/// The JSON request body, including `size` and newest-first `sort`.
pub fn build_search_body(query: &ObservationQuery, fields: &FieldLookup) -> Value {
    let mut must = Vec::new();
    let mut filter = Vec::new();

    if let Some(text) = &query.text {
        must.push(text_clause(text, fields));
    }
    if let Some(range) = &query.time_range {
        if let Some(clause) = time_range_clause(range, fields) {
            filter.push(clause);
        }
    }
    if let Some(bbox) = &query.bbox {
        filter.push(bbox_clause(bbox, fields));
    }

    let query_clause = if must.is_empty() && filter.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({
            "bool": {
                "must": must,
                "filter": filter
            }
        })
    };

    json!({
        "size": query.limit,
        "query": query_clause,
        "sort": sort_clause(fields)
    })
}

fn sort_clause(fields: &FieldLookup) -> Vec<Value> {
    fields
        .timestamp
        .iter()
        .map(|field| {
            json!({
                *field: {
                    "order": "desc",
                    "unmapped_type": "date",
                    "missing": "_last"
                }
            })
        })
        .collect()
}

fn text_clause(text: &str, fields: &FieldLookup) -> Value {
    json!({
        "multi_match": {
            "query": text,
            "fields": fields.text,
            "type": "best_fields",
            "operator": "or",
            "lenient": true
        }
    })
}

fn time_range_clause(range: &TimeRange, fields: &FieldLookup) -> Option<Value> {
    let mut bounds = serde_json::Map::new();
    if let Some(start) = &range.start {
        bounds.insert("gte".to_string(), json!(format_millis(start)));
    }
    if let Some(end) = &range.end {
        bounds.insert("lte".to_string(), json!(format_millis(end)));
    }
    if bounds.is_empty() {
        return None;
    }

    let should: Vec<Value> = fields
        .timestamp
        .iter()
        .map(|field| json!({ "range": { *field: bounds } }))
        .collect();
    Some(json!({
        "bool": {
            "should": should,
            "minimum_should_match": 1
        }
    }))
}

fn bbox_clause(bbox: &BoundingBox, fields: &FieldLookup) -> Value {
    let should: Vec<Value> = fields
        .geo_filter
        .iter()
        .map(|field| {
            json!({
                "geo_bounding_box": {
                    // a layout without this field must not fail the whole search
                    "ignore_unmapped": true,
                    *field: {
                        "top_left": { "lat": bbox.max_lat, "lon": bbox.min_lon },
                        "bottom_right": { "lat": bbox.min_lat, "lon": bbox.max_lon }
                    }
                }
            })
        })
        .collect();

    json!({
        "bool": {
            "should": should,
            "minimum_should_match": 1
        }
    })
}
