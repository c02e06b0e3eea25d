mod config;
mod direct;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use junction_core::{Address, Destination, Network};
use junction_dispatch::{Dispatcher, Runtime, WebhookNotifier};
use junction_inbound::{BindAddress, InboundManager, StreamSettings, SystemSocketFactory};
use junction_observatory::{Observatory, ProbeMode, Prober};
use junction_outbound::OutboundManager;
use junction_router::{DomainStrategy, RouteCache, Router};

use crate::config::{Config, DomainStrategyKind, NetworkKind};
use crate::direct::DirectOutbound;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "junctiond.toml".to_string());
    let config = Config::load(&config_path)?;

    let runtime = build_runtime(&config).await?;
    info!("junctiond running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    runtime.shutdown().await;
    Ok(())
}

async fn build_runtime(config: &Config) -> anyhow::Result<Runtime> {
    let domain_strategy = match config.router.domain_strategy {
        DomainStrategyKind::AsIs => DomainStrategy::AsIs,
        DomainStrategyKind::IpIfNonMatch => DomainStrategy::IpIfNonMatch,
        DomainStrategyKind::IpOnDemand => DomainStrategy::IpOnDemand,
    };
    let mut router = Router::new(domain_strategy);
    if config.cache.enabled {
        let cache = Arc::new(RouteCache::new(config.cache.max_entries, Duration::from_secs(config.cache.ttl_secs)));
        router = router.with_cache(cache);
    }
    let router = Arc::new(router);

    let outbound = Arc::new(OutboundManager::new());
    for oc in &config.outbounds {
        outbound.add_handler(Arc::new(DirectOutbound::new(oc.tag.clone())))?;
        if oc.is_default {
            outbound.set_default(Some(oc.tag.clone()));
        }
    }

    let probe_destination = Destination::tcp(Address::Domain("connectivity-check.internal".into()), 80);
    let dispatcher = Arc::new(
        Dispatcher::new(router.clone(), outbound.clone(), probe_destination).with_policy(config.policy.to_policy()),
    );

    let inbound = Arc::new(InboundManager::new(Arc::new(SystemSocketFactory)));

    let mut runtime = Runtime::new(router, inbound.clone(), outbound.clone(), dispatcher.clone());

    if let Some(oc) = &config.observatory {
        let observatory = Arc::new(Observatory::new(
            dispatcher.clone() as Arc<dyn Prober>,
            if oc.parallel { ProbeMode::Parallel } else { ProbeMode::Serialized },
        ));
        observatory.set_subjects(outbound.tags());
        observatory.start(Duration::from_secs(oc.probe_interval_secs));
        runtime = runtime.with_observatory(observatory);
    }

    if let Some(wc) = &config.webhook {
        let transport = junction_dispatch::resolve_transport(&wc.url)?;
        let notifier = Arc::new(WebhookNotifier::new(transport, Duration::from_secs(wc.dedup_seconds)));
        runtime = runtime.with_webhook(notifier);
    }

    for ic in &config.inbounds {
        let destination = Destination::new(
            Address::Domain(ic.destination_host.clone()),
            ic.destination_port,
            match ic.network {
                NetworkKind::Tcp => Network::Tcp,
                NetworkKind::Udp => Network::Udp,
            },
        );
        let addr = match ic.network {
            NetworkKind::Tcp => {
                let settings = StreamSettings::default()
                    .with_tproxy(ic.stream_settings.tproxy)
                    .with_receive_original_destination(ic.stream_settings.receive_original_destination);
                let settings = match ic.stream_settings.mark {
                    Some(mark) => settings.with_mark(mark),
                    None => settings,
                };
                BindAddress::Tcp(ic.listen, settings)
            }
            NetworkKind::Udp => BindAddress::Udp(ic.listen),
        };
        if let Err(e) = runtime.add_inbound(ic.tag.clone(), addr, destination).await {
            warn!(inbound = %ic.tag, error = %e, "failed to start inbound");
        }
    }

    Ok(runtime)
}
