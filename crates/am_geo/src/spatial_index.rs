// crates/am_geo/src/spatial_index.rs
//! 空间索引实现
//!
//! 基于 R-tree 的矩形索引。网格每一层维护一棵树，用于：
//! - 单元拆分后查找与子单元接触的邻居
//! - 把排放、人口数据分摊到相交单元
//!
//! # 示例
//!
//! ```
//! use am_geo::spatial_index::{BoxIndex, BoundingBox};
//!
//! let mut index: BoxIndex<u32> = BoxIndex::new();
//! index.insert(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 1);
//! index.insert(BoundingBox::new(1.0, 0.0, 2.0, 1.0), 2);
//!
//! // 触碰的矩形也会被返回
//! let hits = index.query_intersecting(&BoundingBox::new(0.5, 0.5, 1.0, 0.8));
//! assert_eq!(hits.len(), 2);
//! ```

use crate::geometry::Point2D;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

/// 边界框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// 最小 x
    pub min_x: f64,
    /// 最小 y
    pub min_y: f64,
    /// 最大 x
    pub max_x: f64,
    /// 最大 y
    pub max_y: f64,
}

impl BoundingBox {
    /// 创建新的边界框
    #[must_use]
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    /// 检查点是否在边界框内（闭区间）
    #[must_use]
    pub fn contains_point(&self, point: &Point2D) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    /// 半开区间包含：`[min, max)`，保证相邻单元共享边上的点只计一次
    #[must_use]
    pub fn contains_point_half_open(&self, point: &Point2D) -> bool {
        point.x >= self.min_x
            && point.x < self.max_x
            && point.y >= self.min_y
            && point.y < self.max_y
    }

    /// 在外包范围 `extent` 内的包含：内部按半开区间，与 `extent` 东、北边重合的边按闭区间，
    /// 使落在外边界上的点仍归属边界单元
    #[must_use]
    pub fn contains_point_within(&self, point: &Point2D, extent: &BoundingBox) -> bool {
        let x_ok = point.x < self.max_x || (point.x == self.max_x && self.max_x >= extent.max_x);
        let y_ok = point.y < self.max_y || (point.y == self.max_y && self.max_y >= extent.max_y);
        point.x >= self.min_x && point.y >= self.min_y && x_ok && y_ok
    }

    /// 检查两个边界框是否相交（含边界接触）
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// 相交区域；仅接触或不相交时返回 `None`
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let min_x = self.min_x.max(other.min_x);
        let min_y = self.min_y.max(other.min_y);
        let max_x = self.max_x.min(other.max_x);
        let max_y = self.max_y.min(other.max_y);
        (max_x > min_x && max_y > min_y).then_some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// 相交面积
    #[must_use]
    pub fn overlap_area(&self, other: &Self) -> f64 {
        self.intersection(other).map_or(0.0, |b| b.area())
    }

    /// 合并两个边界框
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// 计算宽度
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// 计算高度
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// 计算面积
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// 计算中心点
    #[must_use]
    pub fn center(&self) -> Point2D {
        Point2D::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// 点到边界框的距离平方（点在框内为 0）
    #[must_use]
    pub fn distance_2(&self, point: &Point2D) -> f64 {
        let dx = (self.min_x - point.x).max(0.0).max(point.x - self.max_x);
        let dy = (self.min_y - point.y).max(0.0).max(point.y - self.max_y);
        dx * dx + dy * dy
    }

    fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }
}

// ============================================================================
// R-tree 包装
// ============================================================================

/// 空间索引条目
#[derive(Debug, Clone, PartialEq)]
struct BoxEntry<T> {
    bbox: BoundingBox,
    data: T,
}

impl<T> RTreeObject for BoxEntry<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bbox.envelope()
    }
}

impl<T> PointDistance for BoxEntry<T> {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.bbox.distance_2(&Point2D::new(point[0], point[1]))
    }
}

/// 矩形空间索引
#[derive(Clone)]
pub struct BoxIndex<T> {
    tree: RTree<BoxEntry<T>>,
}

impl<T> std::fmt::Debug for BoxIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxIndex").field("len", &self.tree.size()).finish()
    }
}

impl<T: Clone + PartialEq> Default for BoxIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + PartialEq> BoxIndex<T> {
    /// 创建空的空间索引
    #[must_use]
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// 批量构建
    #[must_use]
    pub fn bulk_load(items: Vec<(BoundingBox, T)>) -> Self {
        let entries = items
            .into_iter()
            .map(|(bbox, data)| BoxEntry { bbox, data })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// 插入矩形
    pub fn insert(&mut self, bbox: BoundingBox, data: T) {
        self.tree.insert(BoxEntry { bbox, data });
    }

    /// 删除矩形，返回是否存在
    pub fn remove(&mut self, bbox: BoundingBox, data: &T) -> bool {
        self.tree
            .remove(&BoxEntry {
                bbox,
                data: data.clone(),
            })
            .is_some()
    }

    /// 条目数量
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// 是否为空
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// 查询与给定矩形相交或接触的条目
    #[must_use]
    pub fn query_intersecting(&self, bbox: &BoundingBox) -> Vec<(&BoundingBox, &T)> {
        self.tree
            .locate_in_envelope_intersecting(&bbox.envelope())
            .map(|entry| (&entry.bbox, &entry.data))
            .collect()
    }

    /// 离给定点最近的条目
    #[must_use]
    pub fn nearest(&self, point: &Point2D) -> Option<(&BoundingBox, &T)> {
        self.tree
            .nearest_neighbor(&[point.x, point.y])
            .map(|entry| (&entry.bbox, &entry.data))
    }

    /// 遍历全部条目
    pub fn iter(&self) -> impl Iterator<Item = (&BoundingBox, &T)> {
        self.tree.iter().map(|entry| (&entry.bbox, &entry.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let b = BoundingBox::new(1.0, 1.0, 3.0, 3.0);
        assert_eq!(a.overlap_area(&b), 1.0);
        let touching = BoundingBox::new(2.0, 0.0, 3.0, 2.0);
        assert!(a.intersects(&touching));
        assert!(a.intersection(&touching).is_none());
    }

    #[test]
    fn test_distance() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(a.distance_2(&Point2D::new(0.5, 0.5)), 0.0);
        assert_eq!(a.distance_2(&Point2D::new(3.0, 1.0)), 4.0);
    }

    #[test]
    fn test_insert_remove_query() {
        let mut index: BoxIndex<usize> = BoxIndex::new();
        for i in 0..4 {
            let x = i as f64;
            index.insert(BoundingBox::new(x, 0.0, x + 1.0, 1.0), i);
        }
        assert_eq!(index.len(), 4);
        let hits = index.query_intersecting(&BoundingBox::new(1.2, 0.2, 1.8, 0.8));
        assert_eq!(hits.len(), 1);
        assert_eq!(*hits[0].1, 1);

        assert!(index.remove(BoundingBox::new(1.0, 0.0, 2.0, 1.0), &1));
        assert!(!index.remove(BoundingBox::new(1.0, 0.0, 2.0, 1.0), &1));
        assert!(index
            .query_intersecting(&BoundingBox::new(1.2, 0.2, 1.8, 0.8))
            .is_empty());
    }

    #[test]
    fn test_nearest() {
        let index = BoxIndex::bulk_load(vec![
            (BoundingBox::new(0.0, 0.0, 1.0, 1.0), "a"),
            (BoundingBox::new(10.0, 0.0, 11.0, 1.0), "b"),
        ]);
        let (_, data) = index.nearest(&Point2D::new(8.0, 0.5)).unwrap();
        assert_eq!(*data, "b");
    }
}
