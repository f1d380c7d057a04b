//! Raw OCR lines

use super::ids::{ChunkId, EditionId};
use crate::derive::ContentHash;
use crate::store::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Page-space rectangle of an OCR line: `[x0, y0, x1, y1]`.
///
/// Only the arity and finiteness of the coordinates are checked; reversed
/// corners are kept as the OCR pipeline produced them. Deserialization goes
/// through the same checks, so a stored or requested box is never malformed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 4]")]
pub struct BoundingBox([f64; 4]);

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> StoreResult<Self> {
        Self::from_slice(&[x0, y0, x1, y1])
    }

    /// Build from raw coordinates; exactly four finite values are required
    pub fn from_slice(coords: &[f64]) -> StoreResult<Self> {
        let coords: [f64; 4] = coords.try_into().map_err(|_| {
            StoreError::validation(
                "bounding_box",
                format!("expected 4 coordinates, got {}", coords.len()),
            )
        })?;
        if let Some(bad) = coords.iter().find(|c| !c.is_finite()) {
            return Err(StoreError::validation(
                "bounding_box",
                format!("coordinate {bad} is not a finite number"),
            ));
        }
        Ok(Self(coords))
    }

    pub fn coords(&self) -> [f64; 4] {
        self.0
    }
}

impl TryFrom<Vec<f64>> for BoundingBox {
    type Error = StoreError;

    fn try_from(coords: Vec<f64>) -> StoreResult<Self> {
        Self::from_slice(&coords)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.0
    }
}

/// A single OCR-extracted line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub edition_id: EditionId,
    pub line_id: String,
    pub page: u32,
    pub line_no: u32,
    pub bounding_box: BoundingBox,
    pub text: String,
    /// Always `content_hash(text)`; assigned by the store
    pub content_hash: ContentHash,
}

/// Input for `insert_chunk`. Coordinates are validated on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub line_id: String,
    pub page: u32,
    pub line_no: u32,
    pub bounding_box: Vec<f64>,
    pub text: String,
}

impl NewChunk {
    pub fn new(
        line_id: impl Into<String>,
        page: u32,
        line_no: u32,
        bounding_box: impl Into<Vec<f64>>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            line_id: line_id.into(),
            page,
            line_no,
            bounding_box: bounding_box.into(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn box_requires_four_coordinates() {
        assert!(BoundingBox::from_slice(&[0.0, 0.0, 10.0]).is_err());
        assert!(BoundingBox::from_slice(&[0.0, 0.0, 10.0, 10.0, 1.0]).is_err());
        assert!(BoundingBox::from_slice(&[0.0, 0.0, 10.0, 10.0]).is_ok());
    }

    #[test]
    fn box_rejects_non_finite() {
        let err = BoundingBox::from_slice(&[0.0, f64::NAN, 1.0, 1.0]).unwrap_err();
        assert!(matches!(err, StoreError::Validation { field: "bounding_box", .. }));
    }

    #[test]
    fn box_keeps_reversed_corners() {
        let b = BoundingBox::new(10.0, 10.0, 0.0, 0.0).unwrap();
        assert_eq!(b.coords(), [10.0, 10.0, 0.0, 0.0]);
    }

    #[test]
    fn box_deserializes_through_validation() {
        let bbox: BoundingBox = serde_json::from_value(json!([0, 0, 10, 10])).unwrap();
        assert_eq!(bbox.coords(), [0.0, 0.0, 10.0, 10.0]);
        assert_eq!(serde_json::to_value(bbox).unwrap(), json!([0.0, 0.0, 10.0, 10.0]));

        for bad in [json!([0, 0, 10]), json!([0, "0", 10, 10]), json!({"x": 0})] {
            assert!(serde_json::from_value::<BoundingBox>(bad).is_err());
        }
    }
}
