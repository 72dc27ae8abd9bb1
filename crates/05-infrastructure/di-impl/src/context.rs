//! 传递给工厂与参数提供者的解析上下文

use crate::container::{require_instance, Container};
use crate::state::ResolveState;
use async_trait::async_trait;
use di_abstractions::{Instance, ProvidedInstances, ResolveContext, Resolver, SharedResolveContext};
use infrastructure_common::{InjectionToken, ResolveChain, ResolveResult};
use serde_json::Value;
use std::sync::Arc;

/// 解析上下文句柄
///
/// 通过它解析的令牌共享所属根解析调用的状态，提供的实例合并进该状态。
#[derive(Clone)]
pub(crate) struct ContextHandle {
    container: Container,
    state: Arc<ResolveState>,
    chain: ResolveChain,
}

impl ContextHandle {
    pub fn new(container: &Container, state: &Arc<ResolveState>, chain: &ResolveChain) -> Self {
        Self {
            container: container.clone(),
            state: state.clone(),
            chain: chain.clone(),
        }
    }

    pub fn shared(container: &Container, state: &Arc<ResolveState>, chain: &ResolveChain) -> SharedResolveContext {
        Arc::new(Self::new(container, state, chain))
    }
}

#[async_trait]
impl Resolver for ContextHandle {
    fn resolve_instance(
        &self,
        token: &InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> ResolveResult<Instance> {
        self.state.provide(instances);
        let chain = self.chain.add_token(token);
        let resolved = self
            .container
            .resolve_step(Some(token), false, argument, &self.state, &chain, false)?;
        require_instance(resolved, token, &chain)
    }

    async fn resolve_instance_async(
        &self,
        token: &InjectionToken,
        argument: Option<Value>,
        instances: ProvidedInstances,
    ) -> ResolveResult<Instance> {
        self.state.provide(instances);
        let chain = self.chain.add_token(token);
        let resolved = self
            .container
            .resolve_step_async(Some(token.clone()), false, argument, self.state.clone(), chain.clone(), false)
            .await?;
        require_instance(resolved, token, &chain)
    }
}

impl ResolveContext for ContextHandle {
    fn is_async(&self) -> bool {
        self.state.is_async()
    }

    fn share(&self) -> SharedResolveContext {
        Arc::new(self.clone())
    }
}
