// crates/am_geo/src/geometry.rs

//! 几何类型定义
//!
//! `Point2D` 为投影坐标系下的平面点（单位 m）；
//! `Geometry` 为外部矢量数据的统一表示：点源、线源与面源。

use crate::clip;
use crate::spatial_index::BoundingBox;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

// ============================================================================
// Point2D
// ============================================================================

/// 2D点
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    /// X坐标
    pub x: f64,
    /// Y坐标
    pub y: f64,
}

impl Point2D {
    /// 创建新点
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 欧几里得距离
    #[inline]
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        (*self - *other).length()
    }

    /// 向量长度
    #[inline]
    #[must_use]
    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// 二维叉积
    #[inline]
    #[must_use]
    pub fn cross(&self, other: &Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// 两个坐标是否都有限
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point2D {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2D {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// 外部矢量数据的几何形状
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// 点源
    Point(Point2D),
    /// 线源（折线）
    LineString(Vec<Point2D>),
    /// 面源：外环与若干内环（洞）
    Polygon {
        /// 外环
        exterior: Vec<Point2D>,
        /// 内环
        #[serde(default)]
        holes: Vec<Vec<Point2D>>,
    },
}

impl Geometry {
    /// 轴对齐矩形面
    #[must_use]
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::Polygon {
            exterior: vec![
                Point2D::new(min_x, min_y),
                Point2D::new(max_x, min_y),
                Point2D::new(max_x, max_y),
                Point2D::new(min_x, max_y),
            ],
            holes: Vec::new(),
        }
    }

    /// 面的外环；其他几何返回空切片
    #[must_use]
    pub fn exterior_ring(&self) -> &[Point2D] {
        match self {
            Self::Polygon { exterior, .. } => exterior,
            _ => &[],
        }
    }

    /// 外包矩形；空几何返回 `None`
    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        let points: &[Point2D] = match self {
            Self::Point(p) => std::slice::from_ref(p),
            Self::LineString(line) => line,
            Self::Polygon { exterior, .. } => exterior,
        };
        let first = points.first()?;
        let mut bbox = BoundingBox::new(first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            bbox = bbox.merge(&BoundingBox::new(p.x, p.y, p.x, p.y));
        }
        Some(bbox)
    }

    /// 几何度量：点为 1，线为长度，面为面积
    #[must_use]
    pub fn measure(&self) -> f64 {
        match self {
            Self::Point(_) => 1.0,
            Self::LineString(line) => line.windows(2).map(|w| w[0].distance_to(&w[1])).sum(),
            Self::Polygon { exterior, holes } => {
                let outer = clip::ring_area(exterior);
                let inner: f64 = holes.iter().map(|h| clip::ring_area(h)).sum();
                (outer - inner).max(0.0)
            }
        }
    }

    /// 与矩形相交部分的度量
    #[must_use]
    pub fn intersection_measure(&self, bbox: &BoundingBox) -> f64 {
        match self {
            Self::Point(p) => {
                if bbox.contains_point_half_open(p) {
                    1.0
                } else {
                    0.0
                }
            }
            Self::LineString(line) => line
                .windows(2)
                .map(|w| clip::segment_length_in(w[0], w[1], bbox))
                .sum(),
            Self::Polygon { exterior, holes } => {
                let outer = clip::ring_area(&clip::clip_ring(exterior, bbox));
                let inner: f64 = holes
                    .iter()
                    .map(|h| clip::ring_area(&clip::clip_ring(h, bbox)))
                    .sum();
                (outer - inner).max(0.0)
            }
        }
    }

    /// 落在矩形内的份额 ∈ [0, 1]
    ///
    /// 退化几何（零长度线、零面积面）或含非有限坐标的几何返回 0。
    #[must_use]
    pub fn intersection_fraction(&self, bbox: &BoundingBox) -> f64 {
        if !self.is_finite() {
            return 0.0;
        }
        let total = self.measure();
        if total <= 0.0 {
            return 0.0;
        }
        (self.intersection_measure(bbox) / total).clamp(0.0, 1.0)
    }

    /// 网格范围 `extent` 内落在单元 `bbox` 中的份额
    ///
    /// 与 [`Self::intersection_fraction`] 相同，只是点在网格外边界（东、北边）上时
    /// 按闭区间归属边界单元。
    #[must_use]
    pub fn fraction_within(&self, bbox: &BoundingBox, extent: &BoundingBox) -> f64 {
        match self {
            Self::Point(p) if p.is_finite() => {
                if bbox.contains_point_within(p, extent) {
                    1.0
                } else {
                    0.0
                }
            }
            _ => self.intersection_fraction(bbox),
        }
    }

    /// 形心（面按外环、线按顶点平均）
    #[must_use]
    pub fn centroid(&self) -> Option<Point2D> {
        match self {
            Self::Point(p) => Some(*p),
            Self::LineString(line) => mean_point(line),
            Self::Polygon { exterior, .. } => clip::ring_centroid(exterior).or_else(|| mean_point(exterior)),
        }
    }

    /// 所有坐标是否有限
    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Point(p) => p.is_finite(),
            Self::LineString(line) => line.iter().all(Point2D::is_finite),
            Self::Polygon { exterior, holes } => {
                exterior.iter().all(Point2D::is_finite)
                    && holes.iter().flatten().all(Point2D::is_finite)
            }
        }
    }
}

fn mean_point(points: &[Point2D]) -> Option<Point2D> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point2D::new(sx / n, sy / n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_measure() {
        let g = Geometry::rectangle(0.0, 0.0, 4.0, 2.0);
        assert!((g.measure() - 8.0).abs() < 1e-12);
        let b = g.bounds().unwrap();
        assert_eq!(b, BoundingBox::new(0.0, 0.0, 4.0, 2.0));
    }

    #[test]
    fn test_polygon_with_hole() {
        let g = Geometry::Polygon {
            exterior: Geometry::rectangle(0.0, 0.0, 4.0, 4.0).exterior_ring().to_vec(),
            holes: vec![vec![
                Point2D::new(1.0, 1.0),
                Point2D::new(2.0, 1.0),
                Point2D::new(2.0, 2.0),
                Point2D::new(1.0, 2.0),
            ]],
        };
        assert!((g.measure() - 15.0).abs() < 1e-12);
        let cell = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        assert!((g.intersection_measure(&cell) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_line_fraction() {
        let g = Geometry::LineString(vec![Point2D::new(0.0, 0.5), Point2D::new(4.0, 0.5)]);
        let cell = BoundingBox::new(1.0, 0.0, 2.0, 1.0);
        assert!((g.intersection_fraction(&cell) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_point_on_shared_edge_counted_once() {
        let p = Geometry::Point(Point2D::new(1.0, 0.5));
        let left = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let right = BoundingBox::new(1.0, 0.0, 2.0, 1.0);
        assert_eq!(p.intersection_fraction(&left) + p.intersection_fraction(&right), 1.0);
        assert_eq!(p.intersection_fraction(&right), 1.0);
    }

    #[test]
    fn test_point_on_outer_edge_belongs_to_boundary_cell() {
        let extent = BoundingBox::new(0.0, 0.0, 2.0, 1.0);
        let left = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let right = BoundingBox::new(1.0, 0.0, 2.0, 1.0);

        let corner = Geometry::Point(Point2D::new(2.0, 1.0));
        assert_eq!(corner.intersection_fraction(&right), 0.0);
        assert_eq!(corner.fraction_within(&right, &extent), 1.0);
        assert_eq!(corner.fraction_within(&left, &extent), 0.0);

        // 内部共享边仍只计一次
        let shared = Geometry::Point(Point2D::new(1.0, 1.0));
        assert_eq!(shared.fraction_within(&left, &extent), 0.0);
        assert_eq!(shared.fraction_within(&right, &extent), 1.0);

        let outside = Geometry::Point(Point2D::new(2.5, 0.5));
        assert_eq!(outside.fraction_within(&right, &extent), 0.0);
    }

    #[test]
    fn test_degenerate_geometry_contributes_zero() {
        let line = Geometry::LineString(vec![Point2D::new(1.0, 1.0)]);
        let cell = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        assert_eq!(line.intersection_fraction(&cell), 0.0);
        let nan = Geometry::Point(Point2D::new(f64::NAN, 0.0));
        assert_eq!(nan.intersection_fraction(&cell), 0.0);
    }
}
