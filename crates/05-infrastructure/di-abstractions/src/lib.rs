//! # Dependency Injection Abstractions
//! 
//! 依赖注入抽象层，定义提供者、注册信息、类型描述符以及解析接口。
//! 
//! ## 核心接口
//! 
//! - [`DiContainer`] - 容器接口（注册 + 解析）
//! - [`Resolver`] - 同步/异步解析接口
//! - [`ResolveContext`] - 传递给工厂与参数提供者的解析上下文
//! - [`TypeDescriptorSource`] - 类型描述符来源
//!
//! ## 核心类型
//!
//! - [`Provider`] - 构造策略（值、类、令牌别名、工厂、异步工厂）
//! - [`RegistrationOptions`] / [`Registration`] - 注册选项与注册信息
//! - [`TypeDescriptor`] / [`InjectMetadata`] - 构造器注入描述
//! - [`ForwardRef`] - 打破循环依赖的前向引用
//! - [`MaybeAsync`] - 可能挂起的回调结果

pub mod container;
pub mod descriptor;
pub mod factory;
pub mod forward_ref;
pub mod provider;
pub mod registry;
pub mod resolver;

pub use container::*;
pub use descriptor::*;
pub use factory::*;
pub use forward_ref::*;
pub use provider::*;
pub use registry::*;
pub use resolver::*;
