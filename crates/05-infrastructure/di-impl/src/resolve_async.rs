//! 异步解析引擎
//!
//! 与同步解析的步骤和缓存检查顺序相同，只在参数提供者、参数标识提供者、
//! 工厂、依赖解析与钩子处等待。构造器参数按声明顺序逐个解析。

use crate::container::{require_instance, Container};
use crate::context::ContextHandle;
use crate::resolve::{cached_instance, map_injected, store_instance, FORWARD_REF_MAPPER};
use crate::stack::StackGrowing;
use crate::state::{ForwardRefPatch, InjectionSite, Resolution, ResolveState};
use di_abstractions::{
    AfterResolveFn, ArgumentProvider, ForwardRef, InjectMetadata, Injected, Injections, Instance, MaybeAsync,
    Provider, Registration,
};
use futures::future::BoxFuture;
use infrastructure_common::{
    ArgumentIdentity, InjectionToken, ResolveChain, ResolveError, ResolveResult, ResolveStage, TypeInfo,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

async fn settle_async<T>(
    outcome: MaybeAsync<anyhow::Result<T>>,
    token: &InjectionToken,
    stage: ResolveStage,
    chain: &ResolveChain,
) -> ResolveResult<T> {
    outcome
        .settle()
        .await
        .map_err(|error| ResolveError::callback(token, stage, chain, error))
}

impl Container {
    /// 异步解析一步
    pub(crate) fn resolve_step_async(
        &self,
        token: Option<InjectionToken>,
        optional: bool,
        argument: Option<Value>,
        state: Arc<ResolveState>,
        chain: ResolveChain,
        is_first: bool,
    ) -> BoxFuture<'static, ResolveResult<Option<Instance>>> {
        let container = self.clone();
        let step: BoxFuture<'static, ResolveResult<Option<Instance>>> = Box::pin(async move {
            container.guard(&state, &chain)?;

            let Some(token) = token else {
                return Err(ResolveError::UndefinedToken { chain });
            };

            if let Some(instance) = state.provided(&token) {
                trace!(token = %token, "使用提供的实例");
                return Ok(Some(instance));
            }

            let Some(registration) = container.lookup(&token) else {
                if optional {
                    return Ok(None);
                }
                return Err(ResolveError::NoProvider { token, chain });
            };

            let argument = match argument.or_else(|| registration.options.default_argument.clone()) {
                Some(argument) => Some(argument),
                None => {
                    container
                        .provide_argument_async(
                            registration.options.default_argument_provider.as_ref(),
                            &token,
                            &state,
                            &chain,
                        )
                        .await?
                }
            };

            let identity = match &registration.options.argument_identity_provider {
                Some(provider) if registration.lifecycle().is_cached() => {
                    settle_async(
                        provider.identify(argument.as_ref()),
                        &token,
                        ResolveStage::ArgumentIdentityProvider,
                        &chain,
                    )
                    .await?
                }
                _ => ArgumentIdentity::of(argument.as_ref()),
            };

            if let Some(instance) = cached_instance(&registration, &state, &identity) {
                trace!(token = %token, identity = %identity, "命中{}缓存", registration.lifecycle());
                return Ok(Some(instance));
            }

            if !state.begin(&token, &identity) {
                return Err(container.cycle_error(&token, &chain));
            }

            trace!(token = %token, provider = registration.provider.kind(), "构建实例");
            let built = container
                .build_async(&registration, &token, argument, &state, &chain)
                .await;
            state.finish(&token, &identity);
            let (mut instance, after_resolve) = built?;

            if !registration.provider.is_alias() {
                let (stored, fresh) = store_instance(&registration, &state, &token, identity, instance);
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
                container.complete_async(&state, &chain).await?;
            }

            Ok(Some(instance))
        });
        Box::pin(StackGrowing(step))
    }

    async fn build_async(
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
                    let injected = self
                        .resolve_injection_async(
                            token,
                            &descriptor.type_info,
                            InjectionSite::Parameter(index),
                            metadata,
                            argument.as_ref(),
                            state,
                            chain,
                        )
                        .await?;
                    parameters.push(injected);
                }

                let mut properties = HashMap::with_capacity(descriptor.properties.len());
                for (key, metadata) in &descriptor.properties {
                    let injected = self
                        .resolve_injection_async(
                            token,
                            &descriptor.type_info,
                            InjectionSite::Property(key.clone()),
                            metadata,
                            argument.as_ref(),
                            state,
                            chain,
                        )
                        .await?;
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
                    None => {
                        self.provide_argument_async(alias.argument_provider.as_ref(), token, state, chain)
                            .await?
                    }
                };
                let target = alias.use_token.token();
                let chain = match &target {
                    Some(target) => chain.add_token(target),
                    None => chain.clone(),
                };
                let resolved = self
                    .resolve_step_async(target, false, argument, state.clone(), chain.clone(), false)
                    .await?;
                Ok((require_instance(resolved, token, &chain)?, None))
            }
            Provider::Factory(factory) => {
                let context = ContextHandle::new(self, state, chain);
                let instance = factory(argument, &context).map_err(|error| ResolveError::factory(token, chain, error))?;
                Ok((instance, None))
            }
            Provider::AsyncFactory(factory) => {
                let context = ContextHandle::shared(self, state, chain);
                let instance = factory(argument, context)
                    .await
                    .map_err(|error| ResolveError::factory(token, chain, error))?;
                Ok((instance, None))
            }
        }
    }

    async fn provide_argument_async(
        &self,
        provider: Option<&ArgumentProvider>,
        token: &InjectionToken,
        state: &Arc<ResolveState>,
        chain: &ResolveChain,
    ) -> ResolveResult<Option<Value>> {
        let Some(provider) = provider else {
            return Ok(None);
        };
        let outcome = provider.provide(&ContextHandle::new(self, state, chain));
        settle_async(outcome, token, ResolveStage::ArgumentProvider, chain).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_injection_async(
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
            None => {
                self.provide_argument_async(metadata.resolve_argument_provider.as_ref(), owner, state, &site_chain)
                    .await?
            }
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

        let resolved = self
            .resolve_step_async(
                metadata.token.clone(),
                metadata.optional,
                argument,
                state.clone(),
                site_chain.clone(),
                false,
            )
            .await?;
        map_injected(resolved, metadata, owner, &site_chain)
    }

    async fn complete_async(&self, state: &Arc<ResolveState>, chain: &ResolveChain) -> ResolveResult<()> {
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
            let resolved = self
                .resolve_step_async(target, patch.optional, patch.argument, state.clone(), patch_chain, false)
                .await?;
            patch.forward_ref.set(resolved);
        }

        let unresolved = state.seal_forward_refs();
        if unresolved > 0 {
            debug!(unresolved, "存在未赋值的前向引用");
        }

        for resolution in state.take_resolutions().into_iter().rev() {
            let token = &resolution.registration.token;
            if let Some(after_resolve) = &resolution.after_resolve {
                settle_async(after_resolve(resolution.instance.clone()), token, ResolveStage::AfterResolve, chain).await?;
            }
            if let Some(initializer) = &resolution.registration.options.initializer {
                settle_async(initializer.initialize(resolution.instance.clone()), token, ResolveStage::Initializer, chain)
                    .await?;
            }
        }

        debug!(resolution_id = %state.resolution_id(), "解析完成");
        Ok(())
    }
}
