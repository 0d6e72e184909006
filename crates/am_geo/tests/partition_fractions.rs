// crates/am_geo/tests/partition_fractions.rs

//! 分摊份额在单元划分上的求和性质

use am_geo::prelude::*;

fn partition(nx: usize, ny: usize, size: f64) -> Vec<BoundingBox> {
    let mut cells = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            let x = i as f64 * size;
            let y = j as f64 * size;
            cells.push(BoundingBox::new(x, y, x + size, y + size));
        }
    }
    cells
}

#[test]
fn polygon_fractions_sum_to_one_when_covered() {
    let cells = partition(4, 3, 10.0);
    let poly = Geometry::Polygon {
        exterior: vec![
            Point2D::new(3.0, 2.0),
            Point2D::new(31.0, 5.0),
            Point2D::new(25.0, 27.0),
            Point2D::new(6.0, 21.0),
        ],
        holes: Vec::new(),
    };
    let total: f64 = cells.iter().map(|c| poly.intersection_fraction(c)).sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn line_fractions_sum_to_covered_share() {
    let cells = partition(2, 2, 10.0);
    // 一半在网格外
    let line = Geometry::LineString(vec![Point2D::new(-20.0, 5.0), Point2D::new(20.0, 5.0)]);
    let total: f64 = cells.iter().map(|c| line.intersection_fraction(c)).sum();
    assert!((total - 0.5).abs() < 1e-12);
}

#[test]
fn point_on_interior_vertex_lands_in_exactly_one_cell() {
    let cells = partition(2, 2, 10.0);
    let p = Geometry::Point(Point2D::new(10.0, 10.0));
    let hits: Vec<usize> = cells
        .iter()
        .enumerate()
        .filter(|(_, c)| p.intersection_fraction(c) > 0.0)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(hits, vec![3]);
}
