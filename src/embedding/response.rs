use serde::Deserialize;
use serde_json::Value;

use crate::error::{MediaChunkError, Result};

use super::EmbeddingSegment;

/// Known embedding API response shapes.
///
/// Variants are tried in order; every variant has at least one required
/// key so an unknown payload never matches by accident.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingResponse {
    VideoSegments {
        video_embeddings: Vec<VideoSegmentEmbedding>,
    },
    Predictions {
        predictions: Vec<Prediction>,
    },
    Values {
        embedding: ValuesEmbedding,
    },
    Flat {
        embedding: Vec<f32>,
    },
    Batch {
        embeddings: Vec<Vec<f32>>,
    },
    Data {
        data: Vec<DataItem>,
    },
}

#[derive(Debug, Deserialize)]
pub struct VideoSegmentEmbedding {
    #[serde(default, alias = "startOffsetSec")]
    pub start_offset_sec: f64,
    #[serde(default, alias = "endOffsetSec")]
    pub end_offset_sec: Option<f64>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct Prediction {
    #[serde(default, rename = "videoEmbeddings", alias = "video_embeddings")]
    pub video_embeddings: Option<Vec<VideoSegmentEmbedding>>,
    #[serde(default, rename = "imageEmbedding", alias = "image_embedding")]
    pub image_embedding: Option<Vec<f32>>,
    #[serde(default, rename = "textEmbedding", alias = "text_embedding")]
    pub text_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ValuesEmbedding {
    pub values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct DataItem {
    pub embedding: Vec<f32>,
}

impl EmbeddingResponse {
    /// Flatten into segments. Whole-media vectors span `[0, media_duration]`.
    pub fn into_segments(self, media_duration: f64) -> Result<Vec<EmbeddingSegment>> {
        let whole = |vector: Vec<f32>| EmbeddingSegment {
            start_offset: 0.0,
            end_offset: media_duration,
            vector,
        };

        let segments: Vec<EmbeddingSegment> = match self {
            EmbeddingResponse::VideoSegments { video_embeddings } => {
                video_segments(video_embeddings, media_duration)
            }
            EmbeddingResponse::Predictions { predictions } => {
                let mut out = Vec::new();
                for p in predictions {
                    if let Some(video) = p.video_embeddings {
                        out.extend(video_segments(video, media_duration));
                    } else if let Some(vector) = p.image_embedding.or(p.text_embedding) {
                        out.push(whole(vector));
                    } else {
                        return Err(MediaChunkError::UnrecognizedResponseShape(
                            "prediction carries no video, image or text embedding".to_string(),
                        ));
                    }
                }
                out
            }
            EmbeddingResponse::Values { embedding } => vec![whole(embedding.values)],
            EmbeddingResponse::Flat { embedding } => vec![whole(embedding)],
            EmbeddingResponse::Batch { embeddings } => embeddings.into_iter().map(whole).collect(),
            EmbeddingResponse::Data { data } => {
                data.into_iter().map(|d| whole(d.embedding)).collect()
            }
        };

        if segments.is_empty() {
            return Err(MediaChunkError::UnrecognizedResponseShape(
                "response contained no embeddings".to_string(),
            ));
        }
        if segments.iter().any(|s| s.vector.is_empty()) {
            return Err(MediaChunkError::UnrecognizedResponseShape(
                "response contained an empty embedding vector".to_string(),
            ));
        }
        Ok(segments)
    }
}

fn video_segments(items: Vec<VideoSegmentEmbedding>, media_duration: f64) -> Vec<EmbeddingSegment> {
    items
        .into_iter()
        .map(|v| EmbeddingSegment {
            start_offset: v.start_offset_sec,
            end_offset: v.end_offset_sec.unwrap_or(media_duration),
            vector: v.embedding,
        })
        .collect()
}

/// Parse an embedding API response into ordered segments.
///
/// Fails with `UnrecognizedResponseShape` naming the top-level keys when
/// the payload matches no known shape.
pub fn parse_embedding_response(
    response: &Value,
    media_duration: f64,
) -> Result<Vec<EmbeddingSegment>> {
    let parsed = EmbeddingResponse::deserialize(response)
        .map_err(|_| MediaChunkError::UnrecognizedResponseShape(describe(response)))?;
    parsed.into_segments(media_duration)
}

fn describe(value: &Value) -> String {
    match value {
        Value::Object(map) if map.is_empty() => "empty object".to_string(),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("keys [{}]", keys.join(", "))
        }
        Value::Array(_) => "top-level array".to_string(),
        Value::Null => "null".to_string(),
        other => format!("scalar {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_video_segments() {
        let response = json!({
            "video_embeddings": [
                {"start_offset_sec": 0, "end_offset_sec": 16, "embedding": [0.1, 0.2]},
                {"start_offset_sec": 16, "end_offset_sec": 32, "embedding": [0.3, 0.4]}
            ]
        });
        let segments = parse_embedding_response(&response, 32.0).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].start_offset, 16.0);
        assert_eq!(segments[1].end_offset, 32.0);
        assert_eq!(segments[1].vector, vec![0.3, 0.4]);
    }

    #[test]
    fn test_predictions_image() {
        let response = json!({"predictions": [{"imageEmbedding": [1.0, 2.0, 3.0]}]});
        let segments = parse_embedding_response(&response, 0.0).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].vector, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_predictions_video() {
        let response = json!({
            "predictions": [{
                "videoEmbeddings": [
                    {"startOffsetSec": 0, "embedding": [0.5]},
                    {"start_offset_sec": 8, "end_offset_sec": 12, "embedding": [0.6]}
                ]
            }]
        });
        let segments = parse_embedding_response(&response, 12.0).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].end_offset, 12.0);
        assert_eq!(segments[1].start_offset, 8.0);
    }

    #[test]
    fn test_values_and_flat_shapes() {
        let values = json!({"embedding": {"values": [0.1, 0.2]}});
        let flat = json!({"embedding": [0.1, 0.2]});
        assert_eq!(
            parse_embedding_response(&values, 5.0).unwrap(),
            parse_embedding_response(&flat, 5.0).unwrap()
        );
    }

    #[test]
    fn test_batch_and_data_shapes() {
        let batch = json!({"embeddings": [[1.0], [2.0]]});
        assert_eq!(parse_embedding_response(&batch, 1.0).unwrap().len(), 2);

        let data = json!({"data": [{"embedding": [1.0, 1.0], "index": 0}]});
        assert_eq!(parse_embedding_response(&data, 1.0).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_shape_names_keys() {
        let response = json!({"vectors": [[1.0]], "model": "x"});
        match parse_embedding_response(&response, 1.0) {
            Err(MediaChunkError::UnrecognizedResponseShape(msg)) => {
                assert!(msg.contains("vectors"));
                assert!(msg.contains("model"));
            }
            other => panic!("Expected UnrecognizedResponseShape, got: {other:?}"),
        }
    }

    #[test]
    fn test_empty_prediction_rejected() {
        let response = json!({"predictions": [{"other": 1}]});
        assert!(matches!(
            parse_embedding_response(&response, 1.0),
            Err(MediaChunkError::UnrecognizedResponseShape(_))
        ));
    }

    #[test]
    fn test_empty_embeddings_rejected() {
        let response = json!({"embeddings": []});
        assert!(parse_embedding_response(&response, 1.0).is_err());
        let response = json!({"embedding": []});
        assert!(parse_embedding_response(&response, 1.0).is_err());
    }
}
