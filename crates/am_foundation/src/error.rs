// crates/am_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `AmError` 枚举和 `AmResult` 类型别名。
//!
//! 错误分为三类：
//! 1. **配置/输入错误**：在模拟开始前检出，立即中止
//! 2. **数值/拓扑错误**：非有限值、退化单元、质量守恒被破坏，对本次运行致命
//! 3. **其他**：IO、序列化、内部错误
//!
//! 分布式作业错误（超时、节点不可达）属于可重试错误，在 `am_workflow` 中定义。
//!
//! # 示例
//!
//! ```
//! use am_foundation::error::{AmError, AmResult};
//!
//! fn read_config() -> AmResult<()> {
//!     Err(AmError::config("配置文件格式错误"))
//! }
//! assert!(read_config().is_err());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// 统一结果类型
pub type AmResult<T> = Result<T, AmError>;

/// AirMesh 错误类型
#[derive(Error, Debug)]
pub enum AmError {
    // ========================================================================
    // IO 相关错误
    // ========================================================================
    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        /// 底层 IO 错误
        #[source]
        source: Option<std::io::Error>,
    },

    /// 文件不存在
    #[error("文件不存在: {path}")]
    FileNotFound {
        /// 未找到的路径
        path: PathBuf,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 失败原因
        message: String,
    },

    // ========================================================================
    // 配置与输入错误
    // ========================================================================
    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    /// 某个单元无法从输入数据解析出任何值
    #[error("缺少数据覆盖: {dataset} 在 {location} 处无可用值")]
    MissingCoverage {
        /// 数据集名称
        dataset: String,
        /// 位置描述
        location: String,
    },

    // ========================================================================
    // 数值与拓扑错误（致命）
    // ========================================================================
    /// 无效网格拓扑
    #[error("无效的网格拓扑: {message}")]
    InvalidMesh {
        /// 具体错误信息
        message: String,
    },

    /// 退化单元（尺寸为零、负数或非有限）
    #[error("退化单元: 第{layer}层 {axis} 方向尺寸 = {value}")]
    DegenerateCell {
        /// 所在层
        layer: usize,
        /// 坐标轴
        axis: &'static str,
        /// 尺寸值
        value: f64,
    },

    /// 出现非有限数值
    #[error("非有限数值: {context} = {value}")]
    NonFinite {
        /// 出现位置
        context: String,
        /// 数值
        value: f64,
    },

    /// 单元拆分后质量或人口不守恒
    #[error("守恒性被破坏: {quantity} 拆分前 {before:e}, 拆分后 {after:e}")]
    ConservationViolation {
        /// 物理量名称
        quantity: String,
        /// 拆分前总量
        before: f64,
        /// 拆分后总量
        after: f64,
    },

    // ========================================================================
    // 其他
    // ========================================================================
    /// 资源未找到
    #[error("资源未找到: {resource}")]
    NotFound {
        /// 资源名称
        resource: String,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl AmError {
    /// 创建 IO 错误
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带底层错误的 IO 错误
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 文件不存在
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 索引越界
    pub fn index_out_of_bounds(index_type: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            index_type,
            index,
            len,
        }
    }

    /// 缺少数据覆盖
    pub fn missing_coverage(dataset: impl Into<String>, location: impl Into<String>) -> Self {
        Self::MissingCoverage {
            dataset: dataset.into(),
            location: location.into(),
        }
    }

    /// 无效网格拓扑
    pub fn invalid_mesh(message: impl Into<String>) -> Self {
        Self::InvalidMesh {
            message: message.into(),
        }
    }

    /// 退化单元
    pub fn degenerate_cell(layer: usize, axis: &'static str, value: f64) -> Self {
        Self::DegenerateCell { layer, axis, value }
    }

    /// 非有限数值
    pub fn non_finite(context: impl Into<String>, value: f64) -> Self {
        Self::NonFinite {
            context: context.into(),
            value,
        }
    }

    /// 守恒性被破坏
    pub fn conservation(quantity: impl Into<String>, before: f64, after: f64) -> Self {
        Self::ConservationViolation {
            quantity: quantity.into(),
            before,
            after,
        }
    }

    /// 资源未找到
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 是否属于对本次运行致命的数值/拓扑错误
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            Self::InvalidMesh { .. }
                | Self::DegenerateCell { .. }
                | Self::NonFinite { .. }
                | Self::ConservationViolation { .. }
        )
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl AmError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> AmResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查索引是否在范围内
    #[inline]
    pub fn check_index(index_type: &'static str, index: usize, len: usize) -> AmResult<()> {
        if index >= len {
            Err(Self::index_out_of_bounds(index_type, index, len))
        } else {
            Ok(())
        }
    }

    /// 检查数值是否有限
    #[inline]
    pub fn check_finite(context: &str, value: f64) -> AmResult<f64> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Self::non_finite(context, value))
        }
    }
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for AmError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// 条件不满足时返回错误
///
/// ```
/// use am_foundation::{ensure, AmError, AmResult};
///
/// fn positive(v: f64) -> AmResult<f64> {
///     ensure!(v > 0.0, AmError::invalid_input("必须为正数"));
///     Ok(v)
/// }
/// assert!(positive(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}

// ========================================================================
// 测试
// ========================================================================
