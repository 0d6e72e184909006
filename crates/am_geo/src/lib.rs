// crates/am_geo/src/lib.rs
//! AirMesh 几何处理模块
//!
//! 网格单元是投影坐标系下的轴对齐矩形，外部数据（人口普查多边形、
//! 线源、点源）需要与单元求交并按面积或长度分摊。
//!
//! # 模块
//!
//! - `geometry`: 几何类型 (Point2D, Geometry)
//! - `clip`: 矩形裁剪与相交度量
//! - `spatial_index`: 边界框与基于 R-tree 的空间索引
//!
//! # 示例
//!
//! ```
//! use am_geo::prelude::*;
//!
//! let square = Geometry::rectangle(0.0, 0.0, 2.0, 2.0);
//! let cell = BoundingBox::new(1.0, 1.0, 3.0, 3.0);
//! assert!((square.intersection_fraction(&cell) - 0.25).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod clip;
pub mod geometry;
pub mod spatial_index;

/// 预导入模块
pub mod prelude {
    pub use crate::geometry::{Geometry, Point2D};
    pub use crate::spatial_index::{BoundingBox, BoxIndex};
}

pub use geometry::{Geometry, Point2D};
pub use spatial_index::{BoundingBox, BoxIndex};
