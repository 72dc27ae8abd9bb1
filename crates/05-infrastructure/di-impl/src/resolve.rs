//! 同步解析引擎
//!
//! 同步解析从不挂起，遇到异步工厂或异步回调时以 `AsyncInSyncContext` 失败。

use crate::container::{require_instance, Container};
use crate::context::ContextHandle;
use crate::stack::with_stack;
use crate::state::{ForwardRefPatch, InjectionSite, Resolution, ResolveState};
use di_abstractions::{
    AfterResolveFn, ArgumentProvider, ForwardRef, InjectMetadata, Injected, Injections, Instance, MaybeAsync,
    Provider, Registration,
};
use infrastructure_common::{
    ArgumentIdentity, InjectionToken, Lifecycle, ResolveChain, ResolveError, ResolveResult, ResolveStage, TypeInfo,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// 同步等待回调结果，挂起的结果视为错误
pub(crate) fn settle_sync<T>(
    outcome: MaybeAsync<anyhow::Result<T>>,
    token: &InjectionToken,
    stage: ResolveStage,
    chain: &ResolveChain,
) -> ResolveResult<T> {
    match outcome {
        MaybeAsync::Ready(result) => result.map_err(|error| ResolveError::callback(token, stage, chain, error)),
        MaybeAsync::Pending(_) => Err(ResolveError::AsyncInSyncContext {
            token: token.clone(),
            stage,
            chain: chain.clone(),
        }),
    }
}

pub(crate) const FORWARD_REF_MAPPER: &str = "前向引用不能与注入映射同时使用";

impl Container {
    /// 同步解析一步
    ///
    /// `is_first` 为真时是根解析调用，返回前处理前向引用队列与钩子。
    pub(crate) fn resolve_step(
        &self,
        token: Option<&InjectionToken>,
        optional: bool,
        argument: Option<Value>,
        state: &Arc<ResolveState>,
        chain: &ResolveChain,
        is_first: bool,
    ) -> ResolveResult<Option<Instance>> {
        with_stack(|| self.resolve_step_inner(token, optional, argument, state, chain, is_first))
    }

    fn resolve_step_inner(
        &self,
        token: Option<&InjectionToken>,
        optional: bool,
        argument: Option<Value>,
        state: &Arc<ResolveState>,
        chain: &ResolveChain,
        is_first: bool,
    ) -> ResolveResult<Option<Instance>> {
        self.guard(state, chain)?;

        let Some(token) = token else {
            return Err(ResolveError::UndefinedToken { chain: chain.clone() });
        };

        if let Some(instance) = state.provided(token) {
            trace!(token = %token, "使用提供的实例");
            return Ok(Some(instance));
        }

        let Some(registration) = self.lookup(token) else {
            if optional {
                return Ok(None);
            }
            return Err(ResolveError::NoProvider {
                token: token.clone(),
                chain: chain.clone(),
            });
        };

        let argument = match argument.or_else(|| registration.options.default_argument.clone()) {
            Some(argument) => Some(argument),
            None => self.provide_argument_sync(
                registration.options.default_argument_provider.as_ref(),
                token,
                state,
                chain,
            )?,
        };

        let identity = match &registration.options.argument_identity_provider {
            Some(provider) if registration.lifecycle().is_cached() => settle_sync(
                provider.identify(argument.as_ref()),
                token,
                ResolveStage::ArgumentIdentityProvider,
                chain,
            )?,
            _ => ArgumentIdentity::of(argument.as_ref()),
        };

        if let Some(instance) = cached_instance(&registration, state, &identity) {
            trace!(token = %token, identity = %identity, "命中{}缓存", registration.lifecycle());
            return Ok(Some(instance));
        }

        if !state.begin(token, &identity) {
            return Err(self.cycle_error(token, chain));
        }

        trace!(token = %token, provider = registration.provider.kind(), "构建实例");
        let built = self.build_sync(&registration, token, argument, state, chain);
        state.finish(token, &identity);
        let (mut instance, after_resolve) = built?;

        if !registration.provider.is_alias() {
            let (stored, fresh) = store_instance(&registration, state, token, identity, instance);
            instance = stored;
            if fresh {
                state.push_resolution(Resolution {
                    instance: instance.clone(),
                    registration: registration.clone(),
                    after_resolve,
                });
            } else {
                trace!(token = %token, "并发解析已缓存实例，丢弃新建实例");
            }
        }

        if is_first {
            self.complete_sync(state, chain)?;
        }

        Ok(Some(instance))
    }

    fn build_sync(
        &self,
        registration: &Arc<Registration>,
        token: &InjectionToken,
        argument: Option<Value>,
        state: &Arc<ResolveState>,
        chain: &ResolveChain,
    ) -> ResolveResult<(Instance, Option<AfterResolveFn>)> {
        match &registration.provider {
            Provider::Value(value) => Ok((value.clone(), None)),
            Provider::Class(type_info) => {
                let descriptor = self.descriptor(type_info, chain)?;

                let mut parameters = Vec::with_capacity(descriptor.parameters.len());
                for (index, metadata) in descriptor.parameters.iter().enumerate() {
                    parameters.push(self.resolve_injection_sync(
                        token,
                        &descriptor.type_info,
                        InjectionSite::Parameter(index),
                        metadata,
                        argument.as_ref(),
                        state,
                        chain,
                    )?);
                }

                let mut properties = HashMap::with_capacity(descriptor.properties.len());
                for (key, metadata) in &descriptor.properties {
                    let injected = self.resolve_injection_sync(
                        token,
                        &descriptor.type_info,
                        InjectionSite::Property(key.clone()),
                        metadata,
                        argument.as_ref(),
                        state,
                        chain,
                    )?;
                    properties.insert(key.clone(), injected);
                }

                let injections = Injections::new(descriptor.type_info.clone(), parameters, properties);
                let instance = descriptor
                    .construct(injections)
                    .map_err(|error| ResolveError::factory(token, chain, error))?;
                Ok((instance, descriptor.after_resolve().cloned()))
            }
            Provider::Token(alias) => {
                let argument = match argument.or_else(|| alias.argument.clone()) {
                    Some(argument) => Some(argument),
                    None => self.provide_argument_sync(alias.argument_provider.as_ref(), token, state, chain)?,
                };
                let target = alias.use_token.token();
                let chain = match &target {
                    Some(target) => chain.add_token(target),
                    None => chain.clone(),
                };
                let resolved = self.resolve_step(target.as_ref(), false, argument, state, &chain, false)?;
                Ok((require_instance(resolved, token, &chain)?, None))
            }
            Provider::Factory(factory) => {
                let context = ContextHandle::new(self, state, chain);
                let instance = factory(argument, &context).map_err(|error| ResolveError::factory(token, chain, error))?;
                Ok((instance, None))
            }
            Provider::AsyncFactory(_) => Err(ResolveError::AsyncInSyncContext {
                token: token.clone(),
                stage: ResolveStage::Factory,
                chain: chain.clone(),
            }),
        }
    }

    fn provide_argument_sync(
        &self,
        provider: Option<&ArgumentProvider>,
        token: &InjectionToken,
        state: &Arc<ResolveState>,
        chain: &ResolveChain,
    ) -> ResolveResult<Option<Value>> {
        let Some(provider) = provider else {
            return Ok(None);
        };
        let context = ContextHandle::new(self, state, chain);
        settle_sync(provider.provide(&context), token, ResolveStage::ArgumentProvider, chain)
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_injection_sync(
        &self,
        owner: &InjectionToken,
        constructor: &TypeInfo,
        site: InjectionSite,
        metadata: &InjectMetadata,
        owner_argument: Option<&Value>,
        state: &Arc<ResolveState>,
        chain: &ResolveChain,
    ) -> ResolveResult<Injected> {
        let site_chain = site.chain(chain, constructor, metadata.token.as_ref());

        if let Some(mapper) = &metadata.inject_argument_mapper {
            let value = mapper(owner_argument)
                .map_err(|error| ResolveError::callback(owner, ResolveStage::InjectArgumentMapper, &site_chain, error))?;
            return Ok(Injected::Instance(value));
        }

        let mapped = match &metadata.argument_mapper {
            Some(mapper) => mapper(owner_argument)
                .map_err(|error| ResolveError::callback(owner, ResolveStage::ArgumentMapper, &site_chain, error))?,
            None => None,
        };
        let argument = match mapped {
            Some(argument) => Some(argument),
            None => self.provide_argument_sync(metadata.resolve_argument_provider.as_ref(), owner, state, &site_chain)?,
        };

        if let Some(forward_token) = &metadata.forward_ref_token {
            let forward_ref = if metadata.weak_ref {
                ForwardRef::weak()
            } else {
                ForwardRef::new()
            };
            state.enqueue_patch(ForwardRefPatch {
                forward_ref: forward_ref.clone(),
                token: forward_token.clone(),
                optional: metadata.optional,
                argument,
                has_mapper: metadata.mapper.is_some(),
                owner_chain: chain.clone(),
                constructor: constructor.clone(),
                site,
            });
            return Ok(Injected::Forward(forward_ref));
        }

        let resolved = self.resolve_step(metadata.token.as_ref(), metadata.optional, argument, state, &site_chain, false)?;
        map_injected(resolved, metadata, owner, &site_chain)
    }

    /// 根解析调用收尾：赋值前向引用，再按后解析先执行的顺序运行钩子
    fn complete_sync(&self, state: &Arc<ResolveState>, chain: &ResolveChain) -> ResolveResult<()> {
        while let Some(patch) = state.next_patch() {
            let target = patch.token.token();
            let patch_chain = patch.chain(target.as_ref());
            if patch.has_mapper {
                return Err(ResolveError::InvalidMetadata {
                    message: FORWARD_REF_MAPPER.to_string(),
                    chain: patch_chain,
                });
            }
            trace!(token = ?target, "赋值前向引用");
            let resolved = self.resolve_step(target.as_ref(), patch.optional, patch.argument, state, &patch_chain, false)?;
            patch.forward_ref.set(resolved);
        }

        let unresolved = state.seal_forward_refs();
        if unresolved > 0 {
            debug!(unresolved, "存在未赋值的前向引用");
        }

        for resolution in state.take_resolutions().into_iter().rev() {
            let token = &resolution.registration.token;
            if let Some(after_resolve) = &resolution.after_resolve {
                settle_sync(after_resolve(resolution.instance.clone()), token, ResolveStage::AfterResolve, chain)?;
            }
            if let Some(initializer) = &resolution.registration.options.initializer {
                settle_sync(initializer.initialize(resolution.instance.clone()), token, ResolveStage::Initializer, chain)?;
            }
        }

        debug!(resolution_id = %state.resolution_id(), "解析完成");
        Ok(())
    }
}

/// 按生命周期查找缓存的实例
pub(crate) fn cached_instance(
    registration: &Registration,
    state: &ResolveState,
    identity: &ArgumentIdentity,
) -> Option<Instance> {
    match registration.lifecycle() {
        Lifecycle::Transient => None,
        Lifecycle::Resolution => state.scoped_instance(&registration.token, identity),
        Lifecycle::Singleton => registration.cached_instance(identity),
    }
}

/// 按生命周期缓存新建的实例
///
/// 返回缓存中的实例；另一个解析先缓存了同一标识的实例时返回那个实例，
/// 新建的实例被丢弃，此时第二个返回值为 `false`。
pub(crate) fn store_instance(
    registration: &Registration,
    state: &ResolveState,
    token: &InjectionToken,
    identity: ArgumentIdentity,
    instance: Instance,
) -> (Instance, bool) {
    let stored = match registration.lifecycle() {
        Lifecycle::Transient => return (instance, true),
        Lifecycle::Resolution => state.cache_scoped(token.clone(), identity, instance.clone()),
        Lifecycle::Singleton => registration.cache_instance(identity, instance.clone()),
    };
    let fresh = Arc::ptr_eq(&stored, &instance);
    (stored, fresh)
}

/// 将解析结果转换为注入值，并应用注入映射
pub(crate) fn map_injected(
    resolved: Option<Instance>,
    metadata: &InjectMetadata,
    owner: &InjectionToken,
    chain: &ResolveChain,
) -> ResolveResult<Injected> {
    let Some(instance) = resolved else {
        return Ok(Injected::Absent);
    };
    match &metadata.mapper {
        Some(mapper) => mapper(instance)
            .map(Injected::Instance)
            .map_err(|error| ResolveError::callback(owner, ResolveStage::Mapper, chain, error)),
        None => Ok(Injected::Instance(instance)),
    }
}
