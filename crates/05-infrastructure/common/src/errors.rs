//! 错误类型定义

use crate::chain::ResolveChain;
use crate::token::InjectionToken;
use std::fmt;
use thiserror::Error;

/// 解析过程中调用用户回调的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    /// 默认参数提供者
    ArgumentProvider,
    /// 参数标识提供者
    ArgumentIdentityProvider,
    /// 注入参数映射（由所属实例的参数计算依赖的参数）
    ArgumentMapper,
    /// 注入值映射（由所属实例的参数直接计算注入值）
    InjectArgumentMapper,
    /// 注入实例映射
    Mapper,
    /// 工厂
    Factory,
    /// 实例自身的解析后钩子
    AfterResolve,
    /// 注册选项中的初始化器
    Initializer,
}

impl fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ArgumentProvider => "参数提供者",
            Self::ArgumentIdentityProvider => "参数标识提供者",
            Self::ArgumentMapper => "参数映射",
            Self::InjectArgumentMapper => "注入值映射",
            Self::Mapper => "注入映射",
            Self::Factory => "工厂",
            Self::AfterResolve => "afterResolve 钩子",
            Self::Initializer => "初始化器",
        };
        f.write_str(name)
    }
}

/// 依赖解析错误类型
///
/// 除类型不匹配外，所有错误都携带失败位置的解析路径。
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("未注册 {token} 的提供者\n    路径: {chain}")]
    NoProvider { token: InjectionToken, chain: ResolveChain },

    #[error("{constructor} 不可注入，缺少类型描述符\n    路径: {chain}")]
    NotInjectable { constructor: String, chain: ResolveChain },

    #[error("令牌未定义 - 可能是循环依赖导致，请改用别名或 forwardRef\n    路径: {chain}")]
    UndefinedToken { chain: ResolveChain },

    #[error("检测到 {token} 的循环依赖：在完成前再次解析了自身，请检查注册与提供者\n    路径: {chain}")]
    CircularDependency { token: InjectionToken, chain: ResolveChain },

    #[error("解析栈溢出。瞬时生命周期的循环依赖会导致此问题，请改用解析或单例生命周期\n    路径: {chain}")]
    StackOverflow { chain: ResolveChain },

    #[error("无法在同步解析中执行 {token} 的异步{stage}，请改用 resolve_async\n    路径: {chain}")]
    AsyncInSyncContext {
        token: InjectionToken,
        stage: ResolveStage,
        chain: ResolveChain,
    },

    #[error("{token} 的工厂出错: {source}\n    路径: {chain}")]
    FactoryError {
        token: InjectionToken,
        chain: ResolveChain,
        #[source]
        source: anyhow::Error,
    },

    #[error("{token} 的{stage}出错: {source}\n    路径: {chain}")]
    CallbackFailed {
        token: InjectionToken,
        stage: ResolveStage,
        chain: ResolveChain,
        #[source]
        source: anyhow::Error,
    },

    #[error("注入元数据无效: {message}\n    路径: {chain}")]
    InvalidMetadata { message: String, chain: ResolveChain },

    #[error("{token} 解析出的实例类型不是 {expected}")]
    TypeMismatch { token: InjectionToken, expected: &'static str },
}

impl ResolveError {
    /// 包装非工厂回调的错误，回调内部产生的解析错误原样传播
    pub fn callback(token: &InjectionToken, stage: ResolveStage, chain: &ResolveChain, error: anyhow::Error) -> Self {
        match error.downcast::<Self>() {
            Ok(inner) => inner,
            Err(source) => Self::CallbackFailed {
                token: token.clone(),
                stage,
                chain: chain.clone(),
                source,
            },
        }
    }

    /// 包装工厂或构造器的错误
    pub fn factory(token: &InjectionToken, chain: &ResolveChain, source: anyhow::Error) -> Self {
        Self::FactoryError {
            token: token.clone(),
            chain: chain.clone(),
            source,
        }
    }

    /// 失败位置的解析路径
    pub fn chain(&self) -> Option<&ResolveChain> {
        match self {
            Self::NoProvider { chain, .. }
            | Self::NotInjectable { chain, .. }
            | Self::UndefinedToken { chain }
            | Self::CircularDependency { chain, .. }
            | Self::StackOverflow { chain }
            | Self::AsyncInSyncContext { chain, .. }
            | Self::FactoryError { chain, .. }
            | Self::CallbackFailed { chain, .. }
            | Self::InvalidMetadata { chain, .. } => Some(chain),
            Self::TypeMismatch { .. } => None,
        }
    }
}

/// 结果类型别名
pub type ResolveResult<T> = Result<T, ResolveError>;
