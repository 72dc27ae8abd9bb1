//! # 依赖解析容器实现
//!
//! 提供 [`Container`]：注册表、同步解析引擎与异步解析引擎。
//!
//! ## 解析流程
//!
//! 1. 深度与步数保护
//! 2. 显式提供的实例优先
//! 3. 查找注册信息，计算有效参数与参数标识
//! 4. 按生命周期检查缓存，检测循环依赖
//! 5. 按提供者构建实例并缓存
//! 6. 根解析调用结束前赋值前向引用，并按后解析先执行的顺序运行钩子
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use di_abstractions::{DiContainer, Provider, RegistrationOptions, ResolverExt};
//! use di_impl::Container;
//! use infrastructure_common::InjectionToken;
//!
//! let container = Container::default();
//! container.register(InjectionToken::named("answer"), Provider::value(42_u32), RegistrationOptions::new())?;
//! let answer = container.resolve::<u32>(&InjectionToken::named("answer"))?;
//! ```

mod container;
mod context;
mod resolve;
mod resolve_async;
mod stack;
mod state;

pub use container::{Container, DiContainerBuilder};
