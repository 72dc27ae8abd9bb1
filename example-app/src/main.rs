//! # 示例应用程序
//!
//! 演示容器的组合根：从配置文件与环境变量加载容器配置，注册一组广告投放服务并解析。

use clap::Parser;
use di_abstractions::{
    ArgumentIdentityProvider, ContainerConfig, DiContainer, ForwardRef, InjectMetadata, Initializer, Provider,
    ProvidedInstances, RegistrationOptions, ResolverExt, TokenProvider, TypeDescriptor,
};
use di_impl::Container;
use infrastructure_common::{InjectionToken, Lifecycle};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "依赖解析容器示例应用")]
struct Args {
    /// 容器配置文件路径（TOML/JSON/YAML）
    #[arg(short, long, default_value = "config/container.toml")]
    config: PathBuf,

    /// 日志级别，`RUST_LOG` 优先
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 以 JSON 格式输出日志
    #[arg(long)]
    json_logs: bool,

    /// 投放的广告位数量
    #[arg(long, default_value_t = 3)]
    slots: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    info!("启动依赖解析容器示例应用");

    let config = load_config(&args.config)?;
    info!(?config, "容器配置加载完成");

    let container = build_container(config)?;
    let mut events = container.subscribe();
    container.register(
        InjectionToken::named("campaign"),
        Provider::value(Campaign {
            name: "spring-sale".to_string(),
            budget: 1000,
        }),
        RegistrationOptions::new(),
    )?;
    if let Ok(event) = events.try_recv() {
        info!(token = %event.registration.token, at = %event.registered_at, "收到注册事件");
    }

    for slot in 0..args.slots {
        let service = container
            .resolve_async_with::<AdService>(
                &InjectionToken::named("ads"),
                Some(json!({ "region": if slot % 2 == 0 { "cn" } else { "us" } })),
                ProvidedInstances::new(),
            )
            .await?;
        service.serve(slot);
    }

    let stats = container.stats();
    info!("容器统计: {}", serde_json::to_string(&stats)?);
    Ok(())
}

/// 初始化日志
fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// 加载容器配置，文件缺失时只使用默认值与 `DI_` 环境变量
fn load_config(path: &Path) -> anyhow::Result<ContainerConfig> {
    if !path.exists() {
        warn!("配置文件不存在: {}，使用默认配置", path.display());
    }
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("DI").prefix_separator("_"))
        .build()?;
    Ok(settings.try_deserialize()?)
}

/// 组合根
fn build_container(config: ContainerConfig) -> anyhow::Result<Container> {
    let bids = Arc::new(AtomicUsize::new(0));

    let container = Container::builder()
        .with_config(config)
        .with_descriptor(
            TypeDescriptor::builder::<BidStrategy>()
                .parameter(InjectMetadata::of::<RegionSettings>().map_argument(pass_through))
                .build(|injections| {
                    Ok(BidStrategy {
                        region: injections.parameter(0)?,
                    })
                }),
        )
        .with_descriptor(
            TypeDescriptor::builder::<BudgetTracker>()
                .parameter(
                    InjectMetadata::forward_ref(InjectionToken::of::<AdService>())
                        .weak()
                        .map_argument(pass_through),
                )
                .parameter(InjectMetadata::token("campaign"))
                .build(|injections| {
                    Ok(BudgetTracker {
                        service: injections.forward_parameter(0)?,
                        campaign: injections.parameter(1)?,
                    })
                }),
        )
        .with_descriptor(
            TypeDescriptor::builder::<AdService>()
                .parameter(InjectMetadata::of::<BidStrategy>().map_argument(pass_through))
                .parameter(InjectMetadata::of::<BudgetTracker>().map_argument(pass_through))
                .property("request", InjectMetadata::of::<RequestId>())
                .build(|injections| {
                    Ok(AdService {
                        strategy: injections.parameter(0)?,
                        budget: injections.parameter(1)?,
                        request: injections.property("request")?,
                    })
                }),
        )
        .register_singleton(
            InjectionToken::of::<RegionSettings>(),
            Provider::factory(|argument: Option<Value>, _| {
                let settings = argument.map(serde_json::from_value::<RegionSettings>).transpose()?;
                Ok(settings.unwrap_or_default())
            }),
            RegistrationOptions::new().with_argument_identity_provider(ArgumentIdentityProvider::stable_json()),
        )
        .register(
            InjectionToken::of::<RequestId>(),
            Provider::factory(move |_, _| Ok(RequestId(bids.fetch_add(1, Ordering::SeqCst) + 1))),
            RegistrationOptions::new(),
        )
        .register(
            InjectionToken::of::<BidStrategy>(),
            Provider::class::<BidStrategy>(),
            RegistrationOptions::new().with_lifecycle(Lifecycle::Resolution),
        )
        .register(
            InjectionToken::of::<BudgetTracker>(),
            Provider::class::<BudgetTracker>(),
            RegistrationOptions::new().with_lifecycle(Lifecycle::Resolution),
        )
        .register(
            InjectionToken::of::<AdService>(),
            Provider::class::<AdService>(),
            RegistrationOptions::new()
                .with_lifecycle(Lifecycle::Resolution)
                .with_initializer(Initializer::new(|service: Arc<AdService>| {
                    info!(region = %service.strategy.region.region, "广告服务就绪");
                    Ok(())
                })),
        )
        .register("ads", TokenProvider::new(InjectionToken::of::<AdService>()).into(), RegistrationOptions::new())
        .build()?;

    Ok(container)
}

/// 将所属实例的解析参数原样传给依赖
#[allow(clippy::unnecessary_wraps)]
fn pass_through(argument: Option<&Value>) -> anyhow::Result<Option<Value>> {
    Ok(argument.cloned())
}

/// 地区配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RegionSettings {
    region: String,
    floor_price: u32,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            region: "cn".to_string(),
            floor_price: 10,
        }
    }
}

/// 投放活动
#[derive(Debug)]
struct Campaign {
    name: String,
    budget: u32,
}

/// 请求编号，每次解析新建
#[derive(Debug)]
struct RequestId(usize);

#[derive(Debug)]
struct BidStrategy {
    region: Arc<RegionSettings>,
}

/// 预算跟踪，通过弱前向引用回指广告服务
#[derive(Debug)]
struct BudgetTracker {
    service: ForwardRef,
    campaign: Arc<Campaign>,
}

#[derive(Debug)]
struct AdService {
    strategy: Arc<BidStrategy>,
    budget: Arc<BudgetTracker>,
    request: Arc<RequestId>,
}

impl AdService {
    fn serve(self: &Arc<Self>, slot: usize) {
        let owner = self.budget.service.try_get::<Self>();
        info!(
            slot,
            request = self.request.0,
            region = %self.strategy.region.region,
            floor_price = self.strategy.region.floor_price,
            campaign = %self.budget.campaign.name,
            budget = self.budget.campaign.budget,
            tracked = owner.is_some_and(|owner| Arc::ptr_eq(&owner, self)),
            "投放广告"
        );
    }
}
