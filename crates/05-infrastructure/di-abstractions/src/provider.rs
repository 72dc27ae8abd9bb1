//! 提供者定义
//!
//! 描述如何为令牌构造实例：值、类、令牌别名、工厂与异步工厂。

use crate::factory::{AsyncFactoryFn, FactoryFn};
use crate::forward_ref::LazyToken;
use crate::registry::ArgumentProvider;
use crate::resolver::{Instance, ResolveContext, SharedResolveContext};
use futures::future::BoxFuture;
use infrastructure_common::{InjectionToken, TypeInfo};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// 构造策略
#[derive(Clone)]
pub enum Provider {
    /// 现成的实例
    Value(Instance),
    /// 构造器，注入描述来自类型描述符来源
    Class(TypeInfo),
    /// 通过另一个令牌解析
    Token(TokenProvider),
    /// 同步工厂
    Factory(FactoryFn),
    /// 异步工厂，只能在异步解析中使用
    AsyncFactory(AsyncFactoryFn),
}

impl Provider {
    /// 值提供者
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    /// 类提供者
    pub fn class<T: Any + Send + Sync>() -> Self {
        Self::Class(TypeInfo::of::<T>())
    }

    /// 令牌别名提供者
    pub fn alias(token: impl Into<InjectionToken>) -> Self {
        Self::Token(TokenProvider::new(token.into()))
    }

    /// 同步工厂提供者
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Option<Value>, &dyn ResolveContext) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(move |argument, context: &dyn ResolveContext| {
            factory(argument, context).map(|value| Arc::new(value) as Instance)
        }))
    }

    /// 异步工厂提供者
    pub fn async_factory<T, F, Fut>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Option<Value>, SharedResolveContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::AsyncFactory(Arc::new(
            move |argument, context| -> BoxFuture<'static, anyhow::Result<Instance>> {
                let future = factory(argument, context);
                Box::pin(async move { future.await.map(|value| Arc::new(value) as Instance) })
            },
        ))
    }

    /// 提供者类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Class(_) => "class",
            Self::Token(_) => "token",
            Self::Factory(_) => "factory",
            Self::AsyncFactory(_) => "async-factory",
        }
    }

    /// 是否为令牌别名
    pub fn is_alias(&self) -> bool {
        matches!(self, Self::Token(_))
    }
}

impl From<TokenProvider> for Provider {
    fn from(provider: TokenProvider) -> Self {
        Self::Token(provider)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value"),
            Self::Class(type_info) => f.debug_tuple("Class").field(&type_info.name).finish(),
            Self::Token(provider) => f.debug_tuple("Token").field(provider).finish(),
            Self::Factory(_) => f.write_str("Factory(<function>)"),
            Self::AsyncFactory(_) => f.write_str("AsyncFactory(<function>)"),
        }
    }
}

/// 令牌别名
///
/// 别名自身没有有效参数时，依次使用 `argument` 与 `argument_provider`。
#[derive(Debug, Clone)]
pub struct TokenProvider {
    /// 目标令牌
    pub use_token: LazyToken,
    /// 传递给目标的参数
    pub argument: Option<Value>,
    /// 计算传递给目标的参数
    pub argument_provider: Option<ArgumentProvider>,
}

impl TokenProvider {
    /// 指向固定令牌
    pub fn new(token: InjectionToken) -> Self {
        Self {
            use_token: LazyToken::Token(token),
            argument: None,
            argument_provider: None,
        }
    }

    /// 目标令牌在解析时计算
    pub fn lazy<F>(provider: F) -> Self
    where
        F: Fn() -> Option<InjectionToken> + Send + Sync + 'static,
    {
        Self {
            use_token: LazyToken::Provider(Arc::new(provider)),
            argument: None,
            argument_provider: None,
        }
    }

    /// 设置传递给目标的参数
    pub fn with_argument(mut self, argument: Value) -> Self {
        self.argument = Some(argument);
        self
    }

    /// 设置计算目标参数的提供者
    pub fn with_argument_provider(mut self, provider: ArgumentProvider) -> Self {
        self.argument_provider = Some(provider);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Logger;

    #[test]
    fn test_provider_kinds() {
        assert_eq!(Provider::value(42_u32).kind(), "value");
        assert_eq!(Provider::class::<Logger>().kind(), "class");
        assert_eq!(Provider::factory(|_, _| Ok(Logger)).kind(), "factory");
        assert_eq!(
            Provider::async_factory(|_, _| async { Ok(Logger) }).kind(),
            "async-factory"
        );

        let alias = Provider::alias("logger");
        assert!(alias.is_alias());
        assert!(format!("{alias:?}").contains("logger"));
    }

    #[test]
    fn test_value_provider_holds_instance() {
        let Provider::Value(instance) = Provider::value(42_u32) else {
            panic!("expected value provider");
        };
        assert_eq!(*instance.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn test_class_provider_type_info() {
        let Provider::Class(type_info) = Provider::class::<Logger>() else {
            panic!("expected class provider");
        };
        assert_eq!(type_info.name, "Logger");
    }

    #[test]
    fn test_token_provider_builder() {
        let provider = TokenProvider::lazy(|| Some(InjectionToken::named("target")))
            .with_argument(json!({ "level": "debug" }));

        assert_eq!(provider.use_token.token(), Some(InjectionToken::named("target")));
        assert_eq!(provider.argument, Some(json!({ "level": "debug" })));
        assert!(provider.argument_provider.is_none());
    }
}
