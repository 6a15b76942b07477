use crate::geometry::Point;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoiKind {
    ManualPolygon,
    DynamicConvexHull,
    DynamicAlphaShapeSliding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "definition_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoiData {
    /// Operator-drawn polygon; never rewritten by the estimator.
    ManualPolygon { coordinates: Vec<Point>, area: f64 },
    /// Convex hull over the accumulated window.
    DynamicConvexHull {
        coordinates: Vec<Point>,
        area: f64,
        points: Vec<Point>,
        #[serde(with = "time::serde::rfc3339::option", default)]
        last_processed_timestamp: Option<OffsetDateTime>,
    },
    /// Concave hull over the accumulated window. Empty `coordinates` and a
    /// missing `alpha` mean the window has no boundary yet (points only).
    DynamicAlphaShapeSliding {
        coordinates: Vec<Point>,
        area: f64,
        points: Vec<Point>,
        alpha: Option<f64>,
        #[serde(with = "time::serde::rfc3339::option", default)]
        last_processed_timestamp: Option<OffsetDateTime>,
    },
}

impl RoiData {
    pub fn points_only(points: Vec<Point>, last_processed: Option<OffsetDateTime>) -> Self {
        RoiData::DynamicAlphaShapeSliding {
            coordinates: Vec::new(),
            area: 0.0,
            points,
            alpha: None,
            last_processed_timestamp: last_processed,
        }
    }

    pub fn kind(&self) -> RoiKind {
        match self {
            RoiData::ManualPolygon { .. } => RoiKind::ManualPolygon,
            RoiData::DynamicConvexHull { .. } => RoiKind::DynamicConvexHull,
            RoiData::DynamicAlphaShapeSliding { .. } => RoiKind::DynamicAlphaShapeSliding,
        }
    }

    pub fn boundary(&self) -> &[Point] {
        match self {
            RoiData::ManualPolygon { coordinates, .. }
            | RoiData::DynamicConvexHull { coordinates, .. }
            | RoiData::DynamicAlphaShapeSliding { coordinates, .. } => coordinates,
        }
    }

    pub fn area(&self) -> f64 {
        match self {
            RoiData::ManualPolygon { area, .. }
            | RoiData::DynamicConvexHull { area, .. }
            | RoiData::DynamicAlphaShapeSliding { area, .. } => *area,
        }
    }

    pub fn points(&self) -> &[Point] {
        match self {
            RoiData::ManualPolygon { .. } => &[],
            RoiData::DynamicConvexHull { points, .. }
            | RoiData::DynamicAlphaShapeSliding { points, .. } => points,
        }
    }

    pub fn alpha(&self) -> Option<f64> {
        match self {
            RoiData::DynamicAlphaShapeSliding { alpha, .. } => *alpha,
            RoiData::ManualPolygon { .. } | RoiData::DynamicConvexHull { .. } => None,
        }
    }

    pub fn last_processed(&self) -> Option<OffsetDateTime> {
        match self {
            RoiData::ManualPolygon { .. } => None,
            RoiData::DynamicConvexHull {
                last_processed_timestamp,
                ..
            }
            | RoiData::DynamicAlphaShapeSliding {
                last_processed_timestamp,
                ..
            } => *last_processed_timestamp,
        }
    }

    /// Whether a usable boundary with positive area is present.
    pub fn has_boundary(&self) -> bool {
        self.boundary().len() >= 3 && self.area() > 0.0
    }

    /// Same boundary, replacing the window and processing marker.
    pub fn with_window(&self, points: Vec<Point>, last_processed: Option<OffsetDateTime>) -> Self {
        match self {
            RoiData::ManualPolygon { .. } => self.clone(),
            RoiData::DynamicConvexHull {
                coordinates, area, ..
            } => RoiData::DynamicConvexHull {
                coordinates: coordinates.clone(),
                area: *area,
                points,
                last_processed_timestamp: last_processed,
            },
            RoiData::DynamicAlphaShapeSliding {
                coordinates,
                area,
                alpha,
                ..
            } => RoiData::DynamicAlphaShapeSliding {
                coordinates: coordinates.clone(),
                area: *area,
                points,
                alpha: *alpha,
                last_processed_timestamp: last_processed,
            },
        }
    }

    pub fn to_document(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_document(document: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(document)
    }
}
