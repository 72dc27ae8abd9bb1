//! 单次根解析调用的解析状态

use di_abstractions::{AfterResolveFn, ForwardRef, Instance, LazyToken, ProvidedInstances, Registration};
use infrastructure_common::{ArgumentIdentity, InjectionToken, ResolveChain, TypeInfo};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// 新建的实例，根解析调用结束时依次执行其钩子
pub(crate) struct Resolution {
    pub instance: Instance,
    pub registration: Arc<Registration>,
    pub after_resolve: Option<AfterResolveFn>,
}

/// 注入位置
#[derive(Debug, Clone)]
pub(crate) enum InjectionSite {
    Parameter(usize),
    Property(String),
}

impl InjectionSite {
    /// 注入位置的解析路径
    pub fn chain(&self, chain: &ResolveChain, constructor: &TypeInfo, token: Option<&InjectionToken>) -> ResolveChain {
        let chain = match self {
            Self::Parameter(index) => chain.add_parameter(constructor, *index, token),
            Self::Property(key) => chain.add_property(constructor, key, token),
        };
        match token {
            Some(token) => chain.add_token(token),
            None => chain,
        }
    }
}

/// 等待赋值的前向引用
pub(crate) struct ForwardRefPatch {
    pub forward_ref: ForwardRef,
    pub token: LazyToken,
    pub optional: bool,
    pub argument: Option<Value>,
    pub has_mapper: bool,
    pub owner_chain: ResolveChain,
    pub constructor: TypeInfo,
    pub site: InjectionSite,
}

impl ForwardRefPatch {
    /// 目标令牌的解析路径
    pub fn chain(&self, token: Option<&InjectionToken>) -> ResolveChain {
        self.site.chain(&self.owner_chain, &self.constructor, token)
    }
}

#[derive(Default)]
struct ResolveStateInner {
    resolves: usize,
    forward_ref_queue: VecDeque<ForwardRefPatch>,
    forward_refs: Vec<ForwardRef>,
    resolutions: Vec<Resolution>,
    provided_instances: HashMap<InjectionToken, Instance>,
    instances: HashMap<(InjectionToken, ArgumentIdentity), Instance>,
    resolving: HashSet<(InjectionToken, ArgumentIdentity)>,
}

/// 解析状态
///
/// 只在一次根解析调用及其递归解析期间存在。锁只在单个方法内持有。
pub(crate) struct ResolveState {
    is_async: bool,
    resolution_id: Uuid,
    inner: Mutex<ResolveStateInner>,
}

impl ResolveState {
    pub fn new(is_async: bool, instances: ProvidedInstances) -> Self {
        let state = Self {
            is_async,
            resolution_id: Uuid::new_v4(),
            inner: Mutex::new(ResolveStateInner::default()),
        };
        state.provide(instances);
        state
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn resolution_id(&self) -> Uuid {
        self.resolution_id
    }

    /// 计数一次解析，返回累计次数
    pub fn count_resolve(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.resolves += 1;
        inner.resolves
    }

    /// 合并显式提供的实例，后提供的覆盖先提供的
    pub fn provide(&self, instances: ProvidedInstances) {
        if instances.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.provided_instances.extend(instances);
    }

    pub fn provided(&self, token: &InjectionToken) -> Option<Instance> {
        self.inner.lock().provided_instances.get(token).cloned()
    }

    pub fn scoped_instance(&self, token: &InjectionToken, identity: &ArgumentIdentity) -> Option<Instance> {
        self.inner
            .lock()
            .instances
            .get(&(token.clone(), identity.clone()))
            .cloned()
    }

    /// 缓存解析作用域实例，返回缓存中的实例
    pub fn cache_scoped(&self, token: InjectionToken, identity: ArgumentIdentity, instance: Instance) -> Instance {
        self.inner.lock().instances.entry((token, identity)).or_insert(instance).clone()
    }

    /// 标记为正在解析，已在解析中时返回 `false`
    pub fn begin(&self, token: &InjectionToken, identity: &ArgumentIdentity) -> bool {
        self.inner.lock().resolving.insert((token.clone(), identity.clone()))
    }

    pub fn finish(&self, token: &InjectionToken, identity: &ArgumentIdentity) {
        self.inner.lock().resolving.remove(&(token.clone(), identity.clone()));
    }

    pub fn push_resolution(&self, resolution: Resolution) {
        self.inner.lock().resolutions.push(resolution);
    }

    pub fn take_resolutions(&self) -> Vec<Resolution> {
        std::mem::take(&mut self.inner.lock().resolutions)
    }

    pub fn enqueue_patch(&self, patch: ForwardRefPatch) {
        let mut inner = self.inner.lock();
        inner.forward_refs.push(patch.forward_ref.clone());
        inner.forward_ref_queue.push_back(patch);
    }

    pub fn next_patch(&self) -> Option<ForwardRefPatch> {
        self.inner.lock().forward_ref_queue.pop_front()
    }

    /// 标记所有前向引用为已完成，返回未赋值的数量
    pub fn seal_forward_refs(&self) -> usize {
        let forward_refs = std::mem::take(&mut self.inner.lock().forward_refs);
        forward_refs.iter().filter(|forward_ref| !forward_ref.seal()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::instance;

    #[test]
    fn test_resolving_set() {
        let state = ResolveState::new(false, ProvidedInstances::new());
        let token = InjectionToken::named("service");
        let identity = ArgumentIdentity::NONE;

        assert!(state.begin(&token, &identity));
        assert!(!state.begin(&token, &identity));
        assert!(state.begin(&token, &ArgumentIdentity::new("other")));
        state.finish(&token, &identity);
        assert!(state.begin(&token, &identity));
    }

    #[test]
    fn test_provided_instances_merge() {
        let token = InjectionToken::named("value");
        let state = ResolveState::new(true, ProvidedInstances::new().with(token.clone(), 1_u32));
        assert!(state.is_async());

        state.provide(ProvidedInstances::new().with(token.clone(), 2_u32));
        let provided = state.provided(&token).unwrap().downcast::<u32>().unwrap();
        assert_eq!(*provided, 2);
    }

    #[test]
    fn test_patch_queue_and_seal() {
        let state = ResolveState::new(false, ProvidedInstances::new());
        let forward_ref = ForwardRef::new();
        state.enqueue_patch(ForwardRefPatch {
            forward_ref: forward_ref.clone(),
            token: LazyToken::Token(InjectionToken::named("late")),
            optional: false,
            argument: None,
            has_mapper: false,
            owner_chain: ResolveChain::new(),
            constructor: TypeInfo::of::<u32>(),
            site: InjectionSite::Property("late".to_string()),
        });

        let patch = state.next_patch().unwrap();
        assert!(state.next_patch().is_none());
        assert_eq!(patch.chain(Some(&InjectionToken::named("late"))).len(), 2);

        patch.forward_ref.set(Some(instance(1_u8)));
        assert_eq!(state.seal_forward_refs(), 0);
        assert!(forward_ref.is_sealed());
    }
}
