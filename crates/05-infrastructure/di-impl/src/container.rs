//! 容器与注册表

use crate::state::ResolveState;
use async_trait::async_trait;
use di_abstractions::{
    ContainerConfig, ContainerStats, DiContainer, Instance, ProvidedInstances, Provider, Registration,
    RegistrationEvent, RegistrationOptions, Resolver, TypeDescriptor, TypeDescriptorSource, TypeDescriptorStore,
};
use infrastructure_common::{InjectionToken, Lifecycle, ResolveChain, ResolveError, ResolveResult, TypeInfo};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

struct ContainerInner {
    registrations: RwLock<HashMap<InjectionToken, Arc<Registration>>>,
    descriptors: Arc<dyn TypeDescriptorSource>,
    config: ContainerConfig,
    events: broadcast::Sender<RegistrationEvent>,
}

/// 依赖解析容器
///
/// 克隆得到的句柄共享同一个注册表。容器由组合根显式创建并传递，
/// 不存在进程级的默认容器。
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// 使用类型描述符来源与配置创建容器
    pub fn new(descriptors: Arc<dyn TypeDescriptorSource>, config: ContainerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(ContainerInner {
                registrations: RwLock::new(HashMap::new()),
                descriptors,
                config,
                events,
            }),
        }
    }

    /// 创建容器构建器
    pub fn builder() -> DiContainerBuilder {
        DiContainerBuilder::new()
    }

    /// 容器配置
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// 类型描述符来源
    pub fn descriptors(&self) -> &Arc<dyn TypeDescriptorSource> {
        &self.inner.descriptors
    }

    /// 同步解析，未注册时返回 `None`
    pub fn resolve_optional(
        &self,
        token: &InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> ResolveResult<Option<Instance>> {
        let state = Arc::new(ResolveState::new(false, instances));
        debug!(resolution_id = %state.resolution_id(), token = %token, "开始同步解析");
        let chain = ResolveChain::new().add_token(token);
        self.resolve_step(Some(token), true, argument, &state, &chain, true)
    }

    /// 异步解析，未注册时返回 `None`
    pub async fn resolve_optional_async(
        &self,
        token: &InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> ResolveResult<Option<Instance>> {
        let state = Arc::new(ResolveState::new(true, instances));
        debug!(resolution_id = %state.resolution_id(), token = %token, "开始异步解析");
        let chain = ResolveChain::new().add_token(token);
        self.resolve_step_async(Some(token.clone()), true, argument, state, chain, true)
            .await
    }

    pub(crate) fn lookup(&self, token: &InjectionToken) -> Option<Arc<Registration>> {
        self.inner.registrations.read().get(token).cloned()
    }

    /// 深度与步数保护，超出时以栈溢出失败
    pub(crate) fn guard(&self, state: &ResolveState, chain: &ResolveChain) -> ResolveResult<()> {
        let resolves = state.count_resolve();
        let config = &self.inner.config;
        if chain.len() > config.max_resolve_depth || resolves > config.max_resolve_count {
            return Err(ResolveError::StackOverflow {
                chain: chain.truncate(config.error_chain_length),
            });
        }
        Ok(())
    }

    pub(crate) fn cycle_error(&self, token: &InjectionToken, chain: &ResolveChain) -> ResolveError {
        ResolveError::CircularDependency {
            token: token.clone(),
            chain: chain.truncate(self.inner.config.error_chain_length),
        }
    }

    pub(crate) fn descriptor(&self, type_info: &TypeInfo, chain: &ResolveChain) -> ResolveResult<Arc<TypeDescriptor>> {
        self.inner
            .descriptors
            .descriptor(type_info)
            .ok_or_else(|| ResolveError::NotInjectable {
                constructor: type_info.name.clone(),
                chain: chain.clone(),
            })
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new(Arc::new(TypeDescriptorStore::new()), ContainerConfig::default())
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.inner.registrations.read().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// 非可选解析的结果一定有实例
pub(crate) fn require_instance(
    resolved: Option<Instance>,
    token: &InjectionToken,
    chain: &ResolveChain,
) -> ResolveResult<Instance> {
    resolved.ok_or_else(|| ResolveError::NoProvider {
        token: token.clone(),
        chain: chain.clone(),
    })
}

impl DiContainer for Container {
    fn register(&self, token: InjectionToken, provider: Provider, options: RegistrationOptions) -> ResolveResult<()> {
        if let Provider::Class(type_info) = &provider {
            if !self.inner.descriptors.contains(type_info) {
                return Err(ResolveError::NotInjectable {
                    constructor: type_info.name.clone(),
                    chain: ResolveChain::new().add_token(&token),
                });
            }
        }

        info!("注册令牌: {} ({}, {})", token, provider.kind(), options.lifecycle);

        let registration = Arc::new(Registration::new(token.clone(), provider, options));
        self.inner.registrations.write().insert(token, registration.clone());

        if self.inner.events.send(RegistrationEvent::new(registration)).is_err() {
            trace!("没有注册事件订阅者");
        }
        Ok(())
    }

    fn has_registration(&self, token: &InjectionToken) -> bool {
        self.inner.registrations.read().contains_key(token)
    }

    fn try_registration(&self, token: &InjectionToken) -> Option<Arc<Registration>> {
        self.lookup(token)
    }

    fn registrations(&self) -> Vec<Arc<Registration>> {
        self.inner.registrations.read().values().cloned().collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.inner.events.subscribe()
    }

    fn stats(&self) -> ContainerStats {
        let registrations = self.inner.registrations.read();
        let singletons = registrations
            .values()
            .filter(|registration| registration.lifecycle() == Lifecycle::Singleton);

        ContainerStats {
            registrations: registrations.len(),
            singleton_registrations: singletons.clone().count(),
            cached_singletons: singletons.map(|registration| registration.instance_count()).sum(),
        }
    }
}

#[async_trait]
impl Resolver for Container {
    fn resolve_instance(
        &self,
        token: &InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> ResolveResult<Instance> {
        let state = Arc::new(ResolveState::new(false, instances));
        debug!(resolution_id = %state.resolution_id(), token = %token, "开始同步解析");
        let chain = ResolveChain::new().add_token(token);
        let resolved = self.resolve_step(Some(token), false, argument, &state, &chain, true)?;
        require_instance(resolved, token, &chain)
    }

    async fn resolve_instance_async(
        &self,
        token: &InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> ResolveResult<Instance> {
        let state = Arc::new(ResolveState::new(true, instances));
        debug!(resolution_id = %state.resolution_id(), token = %token, "开始异步解析");
        let chain = ResolveChain::new().add_token(token);
        let resolved = self
            .resolve_step_async(Some(token.clone()), false, argument, state, chain.clone(), true)
            .await?;
        require_instance(resolved, token, &chain)
    }
}

/// 容器构建器
///
/// 收集类型描述符与注册，`build` 时按添加顺序注册。
#[derive(Default)]
pub struct DiContainerBuilder {
    descriptors: TypeDescriptorStore,
    config: ContainerConfig,
    registrations: Vec<(InjectionToken, Provider, RegistrationOptions)>,
}

impl DiContainerBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置容器配置
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 添加类型描述符
    pub fn with_descriptor(self, descriptor: TypeDescriptor) -> Self {
        self.descriptors.register(descriptor);
        self
    }

    /// 添加注册
    pub fn register(mut self, token: impl Into<InjectionToken>, provider: Provider, options: RegistrationOptions) -> Self {
        self.registrations.push((token.into(), provider, options));
        self
    }

    /// 添加单例注册
    pub fn register_singleton(self, token: impl Into<InjectionToken>, provider: Provider, options: RegistrationOptions) -> Self {
        self.register(token, provider, options.with_lifecycle(Lifecycle::Singleton))
    }

    /// 构建容器
    pub fn build(self) -> ResolveResult<Container> {
        let container = Container::new(Arc::new(self.descriptors), self.config);
        for (token, provider, options) in self.registrations {
            container.register(token, provider, options)?;
        }
        info!("容器构建完成，共 {} 个注册", container.registrations().len());
        Ok(container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::ResolverExt;

    struct Database;

    #[test]
    fn test_register_replaces_previous() {
        let container = Container::default();
        let token = InjectionToken::named("answer");

        container.register(token.clone(), Provider::value(1_u32), RegistrationOptions::new()).unwrap();
        container.register_singleton(token.clone(), Provider::value(2_u32), RegistrationOptions::new()).unwrap();

        assert!(container.has_registration(&token));
        assert_eq!(container.registrations().len(), 1);
        assert_eq!(container.registration(&token).unwrap().lifecycle(), Lifecycle::Singleton);
        assert_eq!(*container.resolve::<u32>(&token).unwrap(), 2);
    }

    #[test]
    fn test_class_provider_requires_descriptor() {
        let container = Container::default();
        let error = container
            .register(InjectionToken::of::<Database>(), Provider::class::<Database>(), RegistrationOptions::new())
            .unwrap_err();
        assert!(matches!(error, ResolveError::NotInjectable { ref constructor, .. } if constructor == "Database"));
        assert!(!container.has_registration(&InjectionToken::of::<Database>()));
    }

    #[test]
    fn test_registration_lookup() {
        let container = Container::default();
        let token = InjectionToken::named("missing");
        assert!(container.try_registration(&token).is_none());
        assert!(matches!(container.registration(&token), Err(ResolveError::NoProvider { .. })));
    }

    #[test]
    fn test_builder() {
        let container = Container::builder()
            .with_descriptor(TypeDescriptor::builder::<Database>().build(|_| Ok(Database)))
            .register(InjectionToken::of::<Database>(), Provider::class::<Database>(), RegistrationOptions::new())
            .register_singleton("name", Provider::value("db".to_string()), RegistrationOptions::new())
            .build()
            .unwrap();

        let stats = container.stats();
        assert_eq!(stats.registrations, 2);
        assert_eq!(stats.singleton_registrations, 1);
        assert_eq!(stats.cached_singletons, 0);

        container.resolve::<String>(&InjectionToken::named("name")).unwrap();
        assert_eq!(container.stats().cached_singletons, 1);
    }

    #[tokio::test]
    async fn test_registration_events() {
        let container = Container::default();
        let mut events = container.subscribe();

        container
            .register(InjectionToken::named("a"), Provider::value(1_u8), RegistrationOptions::new())
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.registration.token, InjectionToken::named("a"));
    }

    #[test]
    fn test_resolve_optional_async_blocking() {
        let container = Container::default();
        let token = InjectionToken::named("absent");
        let resolved =
            tokio_test::block_on(container.resolve_optional_async(&token, None, ProvidedInstances::new())).unwrap();
        assert!(resolved.is_none());
    }
}
