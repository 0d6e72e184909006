// crates/am_foundation/src/lib.rs

//! AirMesh Foundation Layer
//!
//! 基础层，提供整个项目共享的底层抽象。
//!
//! # 模块概览
//!
//! - [`arena`]: 带代际验证的泛型 Arena，单元以稳定句柄寻址
//! - [`error`]: 统一错误类型 `AmError` 与 `AmResult`
//!
//! # 示例
//!
//! ```
//! use am_foundation::arena::{Arena, CellTag};
//!
//! let mut arena: Arena<f64, CellTag> = Arena::new();
//! let id = arena.insert(42.0);
//! assert_eq!(arena.get(id), Some(&42.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod error;

pub use arena::{Arena, ArenaTag, CellTag, Idx};
pub use error::{AmError, AmResult};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::arena::{Arena, ArenaTag, CellTag, Idx};
    pub use crate::error::{AmError, AmResult};
    pub use crate::ensure;
}
