// crates/am_geo/src/clip.rs

//! 矩形裁剪与相交度量
//!
//! - 多边形：Sutherland–Hodgman 逐边裁剪，裁剪窗口为凸矩形，结果仍为简单多边形
//! - 线段：Liang–Barsky 参数裁剪
//!
//! 环可以闭合（首尾相同）也可以不闭合，两者面积一致。

use crate::geometry::Point2D;
use crate::spatial_index::BoundingBox;

/// 环的面积（鞋带公式，取绝对值）
#[must_use]
pub fn ring_area(ring: &[Point2D]) -> f64 {
    signed_area(ring).abs()
}

fn signed_area(ring: &[Point2D]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let n = ring.len();
    let twice: f64 = (0..n).map(|i| ring[i].cross(&ring[(i + 1) % n])).sum();
    0.5 * twice
}

/// 环的面积形心；零面积返回 `None`
#[must_use]
pub fn ring_centroid(ring: &[Point2D]) -> Option<Point2D> {
    let a = signed_area(ring);
    if a.abs() < f64::EPSILON {
        return None;
    }
    let n = ring.len();
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let p = ring[i];
        let q = ring[(i + 1) % n];
        let f = p.cross(&q);
        cx += (p.x + q.x) * f;
        cy += (p.y + q.y) * f;
    }
    Some(Point2D::new(cx / (6.0 * a), cy / (6.0 * a)))
}

/// 裁剪边
#[derive(Clone, Copy)]
enum Edge {
    Left(f64),
    Right(f64),
    Bottom(f64),
    Top(f64),
}

impl Edge {
    fn inside(self, p: Point2D) -> bool {
        match self {
            Edge::Left(x) => p.x >= x,
            Edge::Right(x) => p.x <= x,
            Edge::Bottom(y) => p.y >= y,
            Edge::Top(y) => p.y <= y,
        }
    }

    fn intersect(self, a: Point2D, b: Point2D) -> Point2D {
        match self {
            Edge::Left(x) | Edge::Right(x) => {
                let t = (x - a.x) / (b.x - a.x);
                Point2D::new(x, a.y + t * (b.y - a.y))
            }
            Edge::Bottom(y) | Edge::Top(y) => {
                let t = (y - a.y) / (b.y - a.y);
                Point2D::new(a.x + t * (b.x - a.x), y)
            }
        }
    }
}

/// 用矩形裁剪一个环，返回裁剪后的环（可能为空）
#[must_use]
pub fn clip_ring(ring: &[Point2D], bbox: &BoundingBox) -> Vec<Point2D> {
    let edges = [
        Edge::Left(bbox.min_x),
        Edge::Right(bbox.max_x),
        Edge::Bottom(bbox.min_y),
        Edge::Top(bbox.max_y),
    ];
    let mut output: Vec<Point2D> = ring.to_vec();
    for edge in edges {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let n = input.len();
        for i in 0..n {
            let current = input[i];
            let prev = input[(i + n - 1) % n];
            match (edge.inside(prev), edge.inside(current)) {
                (true, true) => output.push(current),
                (true, false) => output.push(edge.intersect(prev, current)),
                (false, true) => {
                    output.push(edge.intersect(prev, current));
                    output.push(current);
                }
                (false, false) => {}
            }
        }
    }
    output
}

/// 线段落在矩形内的长度
#[must_use]
pub fn segment_length_in(a: Point2D, b: Point2D, bbox: &BoundingBox) -> f64 {
    let d = b - a;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    let checks = [
        (-d.x, a.x - bbox.min_x),
        (d.x, bbox.max_x - a.x),
        (-d.y, a.y - bbox.min_y),
        (d.y, bbox.max_y - a.y),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return 0.0;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return 0.0;
        }
    }
    (t1 - t0) * d.length()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point2D> {
        vec![
            Point2D::new(x0, y0),
            Point2D::new(x1, y0),
            Point2D::new(x1, y1),
            Point2D::new(x0, y1),
        ]
    }

    #[test]
    fn test_ring_area_orientation_independent() {
        let mut ring = square(0.0, 0.0, 3.0, 2.0);
        assert!((ring_area(&ring) - 6.0).abs() < 1e-12);
        ring.reverse();
        assert!((ring_area(&ring) - 6.0).abs() < 1e-12);
        let mut closed = square(0.0, 0.0, 3.0, 2.0);
        closed.push(closed[0]);
        assert!((ring_area(&closed) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_clip_partial_overlap() {
        let ring = square(0.0, 0.0, 2.0, 2.0);
        let clipped = clip_ring(&ring, &BoundingBox::new(1.0, -1.0, 5.0, 1.5));
        assert!((ring_area(&clipped) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_clip_triangle() {
        let tri = vec![Point2D::new(0.0, 0.0), Point2D::new(2.0, 0.0), Point2D::new(0.0, 2.0)];
        let clipped = clip_ring(&tri, &BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!((ring_area(&clipped) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clip_disjoint() {
        let ring = square(0.0, 0.0, 1.0, 1.0);
        let clipped = clip_ring(&ring, &BoundingBox::new(5.0, 5.0, 6.0, 6.0));
        assert_eq!(ring_area(&clipped), 0.0);
    }

    #[test]
    fn test_segment_clip() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let len = segment_length_in(Point2D::new(-1.0, 0.5), Point2D::new(3.0, 0.5), &bbox);
        assert!((len - 1.0).abs() < 1e-12);
        let diag = segment_length_in(Point2D::new(-1.0, -1.0), Point2D::new(2.0, 2.0), &bbox);
        assert!((diag - 2.0_f64.sqrt()).abs() < 1e-12);
        let outside = segment_length_in(Point2D::new(2.0, 0.0), Point2D::new(3.0, 1.0), &bbox);
        assert_eq!(outside, 0.0);
    }

    #[test]
    fn test_ring_centroid() {
        let c = ring_centroid(&square(0.0, 0.0, 2.0, 4.0)).unwrap();
        assert!((c.x - 1.0).abs() < 1e-12);
        assert!((c.y - 2.0).abs() < 1e-12);
    }
}
