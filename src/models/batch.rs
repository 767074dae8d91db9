//! Message shapes exchanged with upstream trackers and downstream consumers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::identity::{GlobalId, LocalTrackId};

/// `[x1, y1, x2, y2]` in pixel coordinates.
pub type BBox = [f64; 4];

/// Confidence written for tracks whose detector did not report one.
pub const DEFAULT_TRACK_CONF: f64 = 1.0;

/// One camera frame worth of tracked detections, as produced upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SightingBatch {
    #[serde(alias = "cam_id")]
    pub camera_id: String,
    pub t_ms: i64,
    pub frame_id: i64,
    #[serde(default)]
    pub tracks: Vec<TrackObservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackObservation {
    pub track_id: LocalTrackId,
    pub bbox: BBox,
    /// `null` components decode as NaN and are zeroed during normalization.
    #[serde(default, deserialize_with = "deserialize_components")]
    pub embedding: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<f64>,
    /// Upstream fields this crate does not interpret (`cls`, ...), forwarded
    /// untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn deserialize_components<'de, D>(deserializer: D) -> Result<Option<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Option<f64>>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|components| {
        components
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect()
    }))
}

#[derive(Deserialize)]
struct RawSightingBatch {
    #[serde(alias = "cam_id")]
    camera_id: String,
    t_ms: i64,
    frame_id: i64,
    #[serde(default)]
    tracks: Vec<Value>,
}

/// An inbound line decoded track by track.
#[derive(Debug)]
pub struct ParsedBatch {
    pub batch: SightingBatch,
    /// Tracks that could not be decoded, by position in the message.
    pub rejected_tracks: Vec<(usize, serde_json::Error)>,
}

impl SightingBatch {
    /// Decode one JSON message. Only the batch envelope is mandatory; a
    /// track that fails to decode is set aside without affecting the others.
    pub fn from_json_lenient(line: &str) -> serde_json::Result<ParsedBatch> {
        let raw: RawSightingBatch = serde_json::from_str(line)?;

        let mut tracks = Vec::with_capacity(raw.tracks.len());
        let mut rejected_tracks = Vec::new();
        for (index, value) in raw.tracks.into_iter().enumerate() {
            match serde_json::from_value::<TrackObservation>(value) {
                Ok(track) => tracks.push(track),
                Err(err) => rejected_tracks.push((index, err)),
            }
        }

        Ok(ParsedBatch {
            batch: SightingBatch {
                camera_id: raw.camera_id,
                t_ms: raw.t_ms,
                frame_id: raw.frame_id,
                tracks,
            },
            rejected_tracks,
        })
    }
}

/// A batch after identity resolution. Tracks whose embedding was rejected are
/// absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotatedBatch {
    pub camera_id: String,
    pub t_ms: i64,
    pub frame_id: i64,
    pub tracks: Vec<AnnotatedTrack>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotatedTrack {
    pub track_id: LocalTrackId,
    pub bbox: BBox,
    pub global_id: GlobalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnnotatedBatch {
    pub fn global_ids(&self) -> Vec<GlobalId> {
        self.tracks.iter().map(|track| track.global_id).collect()
    }
}

/// Append-only persisted record of one annotated track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackRow {
    pub camera_id: String,
    pub global_id: GlobalId,
    pub track_id: LocalTrackId,
    pub bbox: BBox,
    pub conf: f64,
    pub t_ms: i64,
}
