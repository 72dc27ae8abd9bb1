//! # Infrastructure Common
//!
//! 这个 crate 提供了依赖解析容器的公共基础类型。
//!
//! ## 核心类型
//!
//! - [`InjectionToken`] - 注册与解析使用的标识
//! - [`TypeInfo`] - 构造器（类型）信息
//! - [`Lifecycle`] - 实例缓存策略
//! - [`ArgumentIdentity`] - 生命周期缓存使用的参数标识
//! - [`ResolveChain`] - 用于诊断的解析路径
//! - [`ResolveError`] - 解析错误分类
//!
//! ## 设计原则
//!
//! - 令牌与类型信息均为不可变、可廉价克隆的值
//! - 解析路径只追加，不原地修改
//! - 解析失败的错误携带失败时的解析路径

pub mod chain;
pub mod errors;
pub mod lifecycle;
pub mod metadata;
pub mod token;

pub use chain::*;
pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
pub use token::*;
