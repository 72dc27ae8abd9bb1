//! 容器端到端场景测试
//!
//! 以一个小型订单服务的对象图验证注册、生命周期、前向引用、钩子与注册事件的协同。

use di_abstractions::{
    AfterResolve, ArgumentIdentityProvider, ArgumentProvider, ContainerConfig, DiContainer, ForwardRef,
    InjectMetadata, Initializer, MaybeAsync, ProvidedInstances, Provider, RegistrationOptions, ResolverExt,
    TokenProvider, TypeDescriptor,
};
use di_impl::Container;
use infrastructure_common::{InjectionToken, Lifecycle, ResolveError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct AppConfig {
    env: String,
}

#[derive(Debug)]
struct Logger {
    id: usize,
}

#[derive(Debug)]
struct Repository {
    logger: Arc<Logger>,
}

#[derive(Debug)]
struct AuditLog {
    service: ForwardRef,
    entries: Mutex<Vec<String>>,
}

impl AfterResolve for AuditLog {
    fn after_resolve(self: Arc<Self>) -> MaybeAsync<anyhow::Result<()>> {
        self.entries.lock().push("ready".to_string());
        MaybeAsync::ready(Ok(()))
    }
}

#[derive(Debug)]
struct OrderService {
    config: Arc<AppConfig>,
    repository: Arc<Repository>,
    audit: Arc<AuditLog>,
}

#[derive(Debug)]
struct Connection {
    url: String,
    opened: AtomicUsize,
}

fn order_container(counter: Arc<AtomicUsize>) -> Container {
    Container::builder()
        .with_descriptor(
            TypeDescriptor::builder::<Repository>()
                .parameter(InjectMetadata::of::<Logger>())
                .build(|injections| {
                    Ok(Repository {
                        logger: injections.parameter(0)?,
                    })
                }),
        )
        .with_descriptor(
            TypeDescriptor::builder::<AuditLog>()
                .parameter(InjectMetadata::forward_ref(InjectionToken::of::<OrderService>()).weak())
                .after_resolve()
                .build(|injections| {
                    Ok(AuditLog {
                        service: injections.forward_parameter(0)?,
                        entries: Mutex::new(Vec::new()),
                    })
                }),
        )
        .with_descriptor(
            TypeDescriptor::builder::<OrderService>()
                .parameter(InjectMetadata::of::<AppConfig>().map_argument(|argument| {
                    Ok(argument.and_then(|argument| argument.get("config")).cloned())
                }))
                .parameter(InjectMetadata::of::<Repository>())
                .property("audit", InjectMetadata::of::<AuditLog>())
                .build(|injections| {
                    Ok(OrderService {
                        config: injections.parameter(0)?,
                        repository: injections.parameter(1)?,
                        audit: injections.property("audit")?,
                    })
                }),
        )
        .register_singleton(
            InjectionToken::of::<AppConfig>(),
            Provider::factory(|argument: Option<Value>, _| {
                let env = argument
                    .as_ref()
                    .and_then(|argument| argument.get("env"))
                    .and_then(Value::as_str)
                    .unwrap_or("dev")
                    .to_string();
                Ok(AppConfig { env })
            }),
            RegistrationOptions::new().with_argument_identity_provider(ArgumentIdentityProvider::stable_json()),
        )
        .register(
            InjectionToken::of::<Logger>(),
            Provider::factory(move |_, _| {
                Ok(Logger {
                    id: counter.fetch_add(1, Ordering::SeqCst) + 1,
                })
            }),
            RegistrationOptions::new(),
        )
        .register(
            InjectionToken::of::<Repository>(),
            Provider::class::<Repository>(),
            RegistrationOptions::new().with_lifecycle(Lifecycle::Resolution),
        )
        .register(
            InjectionToken::of::<AuditLog>(),
            Provider::class::<AuditLog>(),
            RegistrationOptions::new().with_lifecycle(Lifecycle::Resolution),
        )
        .register(
            InjectionToken::of::<OrderService>(),
            Provider::class::<OrderService>(),
            RegistrationOptions::new()
                .with_lifecycle(Lifecycle::Resolution)
                .with_default_argument(json!({ "config": { "env": "prod" } })),
        )
        .register(
            "orders",
            TokenProvider::new(InjectionToken::of::<OrderService>()).into(),
            RegistrationOptions::new().with_metadata("layer", "application"),
        )
        .build()
        .unwrap()
}

#[test]
fn test_order_service_graph() {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = order_container(counter.clone());

    let service = container.resolve::<OrderService>(&InjectionToken::of::<OrderService>()).unwrap();

    assert_eq!(service.config.env, "prod");
    assert_eq!(service.repository.logger.id, 1);
    assert_eq!(*service.audit.entries.lock(), vec!["ready"]);

    let back = service.audit.service.get::<OrderService>().unwrap();
    assert!(Arc::ptr_eq(&back, &service));

    let via_alias = container.resolve::<OrderService>(&InjectionToken::named("orders")).unwrap();
    assert!(!Arc::ptr_eq(&via_alias, &service));
    assert!(Arc::ptr_eq(&via_alias.config, &service.config));
    assert_eq!(via_alias.repository.logger.id, 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    let registration = container.registration(&InjectionToken::named("orders")).unwrap();
    assert_eq!(registration.options.metadata.get("layer").map(String::as_str), Some("application"));

    let released = Arc::downgrade(&service);
    let audit = service.audit.clone();
    drop(service);
    assert!(released.upgrade().is_none());
    assert!(audit.service.try_get::<OrderService>().is_none());
}

#[tokio::test]
async fn test_order_service_graph_async() {
    let container = order_container(Arc::new(AtomicUsize::new(0)));
    let service = container
        .resolve_async::<OrderService>(&InjectionToken::of::<OrderService>())
        .await
        .unwrap();

    assert_eq!(service.config.env, "prod");
    assert_eq!(*service.audit.entries.lock(), vec!["ready"]);
    let back = service.audit.service.get::<OrderService>().unwrap();
    assert!(Arc::ptr_eq(&back, &service));

    let staging = container
        .resolve_async_with::<OrderService>(
            &InjectionToken::named("orders"),
            Some(json!({ "config": { "env": "staging" } })),
            ProvidedInstances::new(),
        )
        .await
        .unwrap();
    assert_eq!(staging.config.env, "staging");
    assert!(!Arc::ptr_eq(&staging.config, &service.config));
}

#[tokio::test]
async fn test_async_connection_with_initializer() {
    let container = Container::default();
    let url = InjectionToken::named("database-url");
    let connection = InjectionToken::of::<Connection>();

    container
        .register(url.clone(), Provider::value("postgres://localhost/orders".to_string()), RegistrationOptions::new())
        .unwrap();
    container
        .register_singleton(
            connection.clone(),
            Provider::async_factory(|argument: Option<Value>, _| async move {
                tokio::task::yield_now().await;
                let url = argument
                    .and_then(|value| value.as_str().map(str::to_string))
                    .unwrap_or_default();
                Ok(Connection {
                    url,
                    opened: AtomicUsize::new(0),
                })
            }),
            RegistrationOptions::new()
                .with_default_argument_provider(ArgumentProvider::new(|context| {
                    let url = context.resolve::<String>(&InjectionToken::named("database-url"))?;
                    Ok(Some(json!(url.as_str())))
                }))
                .with_initializer(Initializer::from_async(|connection: Arc<Connection>| async move {
                    tokio::task::yield_now().await;
                    connection.opened.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
        )
        .unwrap();

    let error = container.resolve::<Connection>(&connection).unwrap_err();
    assert!(matches!(error, ResolveError::AsyncInSyncContext { .. }));

    let first = container.resolve_async::<Connection>(&connection).await.unwrap();
    let second = container.resolve_async::<Connection>(&connection).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.url, "postgres://localhost/orders");
    assert_eq!(first.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_registration_events_are_observable() {
    let container = Container::default();
    let mut events = container.subscribe();

    container
        .register(InjectionToken::named("first"), Provider::value(1_u8), RegistrationOptions::new())
        .unwrap();
    container
        .register_singleton(InjectionToken::named("second"), Provider::value(2_u8), RegistrationOptions::new())
        .unwrap();

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert_eq!(first.registration.token, InjectionToken::named("first"));
    assert_eq!(second.registration.lifecycle(), Lifecycle::Singleton);
    assert!(first.registered_at <= second.registered_at);
}

#[test]
fn test_late_registration_is_visible_to_existing_handles() {
    let container = Container::default();
    let handle = container.clone();
    let token = InjectionToken::named("late");

    assert!(!handle.has_registration(&token));
    container
        .register(token.clone(), Provider::value("late".to_string()), RegistrationOptions::new())
        .unwrap();
    assert_eq!(handle.resolve::<String>(&token).unwrap().as_str(), "late");
}

#[test]
fn test_config_limits_apply() {
    #[derive(Debug)]
    struct Chain;

    let container = Container::builder()
        .with_config(ContainerConfig {
            max_resolve_depth: 10,
            error_chain_length: 4,
            ..ContainerConfig::default()
        })
        .register(
            InjectionToken::of::<Chain>(),
            Provider::factory(|argument: Option<Value>, context| {
                let depth = argument.and_then(|value| value.as_u64()).unwrap_or(0);
                context.resolve_with::<Chain>(&InjectionToken::of::<Chain>(), Some(json!(depth + 1)), ProvidedInstances::new())?;
                Ok(Chain)
            }),
            RegistrationOptions::new(),
        )
        .build()
        .unwrap();

    let error = container.resolve::<Chain>(&InjectionToken::of::<Chain>()).unwrap_err();
    assert!(matches!(error, ResolveError::FactoryError { .. }));

    let overflow = std::iter::successors(Some(&error as &(dyn std::error::Error + 'static)), |error| error.source())
        .find_map(|error| error.downcast_ref::<ResolveError>().filter(|error| matches!(error, ResolveError::StackOverflow { .. })));
    let chain = overflow.and_then(ResolveError::chain).unwrap();
    assert_eq!(chain.len(), 4);
}
