//! 解析器抽象接口
//!
//! 提供同步与异步解析能力，以及传递给工厂的解析上下文

use async_trait::async_trait;
use futures::future::BoxFuture;
use infrastructure_common::{InjectionToken, ResolveError, ResolveResult};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// 容器中的实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 将任意值包装为实例
pub fn instance<T: Any + Send + Sync>(value: T) -> Instance {
    Arc::new(value)
}

/// 将实例转换为具体类型
pub fn downcast_instance<T: Any + Send + Sync>(token: &InjectionToken, instance: Instance) -> ResolveResult<Arc<T>> {
    instance.downcast::<T>().map_err(|_| ResolveError::TypeMismatch {
        token: token.clone(),
        expected: std::any::type_name::<T>(),
    })
}

/// 单次解析调用中显式提供的实例
///
/// 提供的实例优先于注册表，只在该次解析调用内生效。
#[derive(Clone, Default)]
pub struct ProvidedInstances {
    entries: Vec<(InjectionToken, Instance)>,
}

impl ProvidedInstances {
    /// 创建空集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加实例
    pub fn with<T: Any + Send + Sync>(self, token: InjectionToken, value: T) -> Self {
        self.with_instance(token, Arc::new(value))
    }

    /// 添加已包装的实例
    pub fn with_instance(mut self, token: InjectionToken, instance: Instance) -> Self {
        self.entries.push((token, instance));
        self
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 实例数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl IntoIterator for ProvidedInstances {
    type Item = (InjectionToken, Instance);
    type IntoIter = std::vec::IntoIter<(InjectionToken, Instance)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl std::fmt::Debug for ProvidedInstances {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(token, _)| token))
            .finish()
    }
}

/// 解析器 trait
///
/// 容器与解析上下文都实现此 trait
#[async_trait]
pub trait Resolver: Send + Sync {
    /// 同步解析令牌
    fn resolve_instance(
        &self,
        token: &InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> ResolveResult<Instance>;

    /// 异步解析令牌
    async fn resolve_instance_async(
        &self,
        token: &InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> ResolveResult<Instance>;
}

/// 类型化解析的扩展方法
pub trait ResolverExt: Resolver {
    /// 解析并转换为具体类型
    fn resolve<T: Any + Send + Sync>(&self, token: &InjectionToken) -> ResolveResult<Arc<T>> {
        self.resolve_with(token, None, ProvidedInstances::new())
    }

    /// 使用参数与提供的实例解析
    fn resolve_with<T: Any + Send + Sync>(
        &self,
        token: &InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> ResolveResult<Arc<T>> {
        let instance = self.resolve_instance(token, argument, instances)?;
        downcast_instance(token, instance)
    }

    /// 异步解析并转换为具体类型
    fn resolve_async<'a, T: Any + Send + Sync>(
        &'a self,
        token: &'a InjectionToken,
    ) -> BoxFuture<'a, ResolveResult<Arc<T>>> {
        self.resolve_async_with(token, None, ProvidedInstances::new())
    }

    /// 使用参数与提供的实例异步解析
    fn resolve_async_with<'a, T: Any + Send + Sync>(
        &'a self,
        token: &'a InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> BoxFuture<'a, ResolveResult<Arc<T>>> {
        Box::pin(async move {
            let instance = self.resolve_instance_async(token, argument, instances).await?;
            downcast_instance(token, instance)
        })
    }
}

impl<R: Resolver + ?Sized> ResolverExt for R {}

/// 解析上下文
///
/// 在一次根解析调用期间传递给工厂与参数提供者，
/// 通过它解析的令牌共享同一份解析状态（解析作用域缓存、循环检测等）。
pub trait ResolveContext: Resolver {
    /// 当前根解析调用是否为异步解析
    fn is_async(&self) -> bool;

    /// 获取可跨越 await 持有的上下文
    fn share(&self) -> SharedResolveContext;
}

/// 异步工厂持有的解析上下文
pub type SharedResolveContext = Arc<dyn ResolveContext>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_instance() {
        let token = InjectionToken::named("answer");
        let value = downcast_instance::<u32>(&token, instance(42_u32)).unwrap();
        assert_eq!(*value, 42);

        let error = downcast_instance::<String>(&token, instance(42_u32)).unwrap_err();
        assert!(matches!(error, ResolveError::TypeMismatch { .. }));
    }

    #[test]
    fn test_provided_instances() {
        let provided = ProvidedInstances::new()
            .with(InjectionToken::named("a"), 1_u8)
            .with_instance(InjectionToken::named("b"), instance("b"));

        assert_eq!(provided.len(), 2);
        let tokens: Vec<_> = provided.into_iter().map(|(token, _)| token.to_string()).collect();
        assert_eq!(tokens, vec!["a", "b"]);
    }
}
