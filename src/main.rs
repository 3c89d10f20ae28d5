//! Portal Shell
//!
//! Runs a scripted host session against the configured remotes, each backed
//! by an in-process demo application: mount, navigate both ways, sign in,
//! keep a remote alive through theme changes, stream a few events, shut down.

use clap::{Arg, Command};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::StreamExt;
use portal_bridge::bindings::{AuthBinding, BindingSlot, SnapshotCell};
use portal_bridge::core::{PortalConfig, RemoteConfig};
use portal_bridge::dom::{Container, Document};
use portal_bridge::mount::{AppBootstrap, AppRoot, RenderView, RootFactory, StaticLoader};
use portal_bridge::navigation::NavigationBridge;
use portal_bridge::streaming::{EventStream, StreamConnector, StreamEventKind, StreamManager};
use portal_bridge::sync::SyncSource;
use portal_bridge::HostShell;
use portal_bridge_core::{AuthState, PortalStores, PortalUser, ResourceKey, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type AuthSlot = BindingSlot<AuthBinding<SnapshotCell<AuthState>>>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Command::new("portal-shell")
        .version(portal_bridge::VERSION)
        .about("Micro-frontend host shell.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log format (pretty, json)")
        )
        .get_matches();

    // Load configuration
    let mut config = if let Some(config_path) = matches.get_one::<String>("config") {
        let mut config = PortalConfig::from_file(config_path)?;
        config.apply_env_overrides()?;
        config
    } else {
        PortalConfig::load()?
    };

    // Apply CLI overrides
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.clone();
    }
    config.validate()?;

    portal_bridge::init_logging(&config.logging)?;
    info!("Starting {} v{}", config.shell.name, portal_bridge::VERSION);

    run_session(config).await?;

    info!("Shutdown complete");
    Ok(())
}

async fn run_session(config: PortalConfig) -> Result<()> {
    let loader = Arc::new(StaticLoader::new());
    let host = HostShell::new(config.clone(), loader.clone());
    host.start();

    let mut remotes = HashMap::new();
    for remote in &config.remotes {
        let bootstrap = Arc::new(demo_remote(&host, remote));
        loader.register_module(remote.name.clone(), bootstrap.clone());
        remotes.insert(remote.name.clone(), bootstrap);
    }

    let mut mounted = Vec::new();
    for remote in &config.remotes {
        let container = host.document().create_container();
        match host.mount_remote(&remote.name, &container).await {
            Ok(id) => mounted.push((remote.clone(), id, container)),
            Err(e) => warn!(remote = %remote.name, error = %e, "continuing without remote"),
        }
    }
    // Let the initial syncs settle.
    tokio::time::sleep(Duration::from_millis(10)).await;

    host.auth()
        .login(PortalUser::basic("demo@portal.dev", ["ROLE_USER", "ROLE_SELLER"], "demo-token"));

    let Some((first, first_id, first_container)) = mounted.first().cloned() else {
        warn!("no remote mounted");
        host.shutdown();
        return Ok(());
    };

    // Host-driven, then remote-driven navigation.
    host.navigate(&portal_bridge::navigation::join_route(&first.route_prefix, "/cart"));
    if let Some(bootstrap) = remotes.get(&first.name) {
        bootstrap.navigate_internal(first_id, "/orders/42");
    }
    info!(path = %host.current_path(), "host route after remote navigation");

    // Keep-alive: theme changes while hidden are flushed once on return.
    host.hide(first_id);
    host.theme().toggle();
    host.theme().toggle();
    host.theme().toggle();
    host.activate(first_id);
    info!(content = %first_container.content(), "reactivated");

    let api = host.api_client()?;
    info!(url = %api.url("/orders"), "api client ready");

    stream_demo(&config).await;

    for (remote, id, _) in &mounted {
        info!(remote = %remote.name, info = ?host.registry().info(*id), "instance");
    }
    host.shutdown();
    info!(observers = host.document().live_observer_count(), "document released");
    Ok(())
}

fn demo_remote(host: &HostShell, remote: &RemoteConfig) -> AppBootstrap {
    let stores = host.stores();
    let source: SyncSource<PortalStores> = Arc::new(move || -> BoxFuture<'static, Result<PortalStores>> {
        let stores = stores.clone();
        async move { Ok(stores) }.boxed()
    });

    let factory = DemoRemote {
        name: remote.name.clone(),
        document: host.document().clone(),
        auth: Arc::new(AuthSlot::new()),
    };
    AppBootstrap::new(remote.name.clone(), remote.data_service.clone(), host.document().clone(), factory)
        .with_initial_sync(source, host.config().shell.sync_timeout)
}

struct DemoRemote {
    name: String,
    document: Document,
    auth: Arc<AuthSlot>,
}

impl RootFactory for DemoRemote {
    fn create_root(&self, container: &Container, _bridge: &NavigationBridge) -> Result<Box<dyn AppRoot>> {
        self.document
            .append_style(&format!("[data-service=\"{}\"] h1 {{ margin: 0 }}", self.name));
        Ok(Box::new(DemoRoot {
            name: self.name.clone(),
            container: container.clone(),
            slot: self.auth.clone(),
            auth: None,
        }))
    }
}

struct DemoRoot {
    name: String,
    container: Container,
    slot: Arc<AuthSlot>,
    auth: Option<Arc<AuthBinding<SnapshotCell<AuthState>>>>,
}

impl AppRoot for DemoRoot {
    fn render(&mut self, view: &RenderView) {
        let user = self
            .auth
            .as_ref()
            .map(|auth| auth.display_name())
            .unwrap_or_else(|| "Guest".to_string());
        self.container.set_content(format!(
            "<section class=\"{}\" data-theme=\"{}\"><h1>{}</h1><p>{}</p></section>",
            self.name, view.theme, view.path, user
        ));
    }

    fn attach_stores(&mut self, stores: Option<&PortalStores>) {
        if let Some(stores) = stores {
            let auth = stores.auth.clone();
            self.auth = Some(self.slot.get_or_acquire(|| AuthBinding::acquire(auth)));
        }
    }

    fn unmount(&mut self) {
        self.auth = None;
        self.slot.dispose();
    }
}

struct DemoFeed;

impl StreamConnector for DemoFeed {
    fn connect(&self, key: &ResourceKey) -> BoxFuture<'static, Result<EventStream>> {
        let key = key.to_string();
        async move {
            let messages = (1..=3).map(move |n| Ok(format!("{}: tick {}", key, n)));
            Ok(futures::stream::iter(messages).boxed())
        }
        .boxed()
    }
}

async fn stream_demo(config: &PortalConfig) {
    let manager = StreamManager::from_config(Arc::new(DemoFeed), &config.streaming);
    let events = manager.events();
    manager.connect("queue/timedeal/7").await;

    let mut received = 0;
    while received < 3 {
        match tokio::time::timeout(Duration::from_secs(1), events.recv_async()).await {
            Ok(Ok(event)) => {
                if let StreamEventKind::Message(message) = event.kind {
                    info!(key = %event.key, message = %message, "stream event");
                    received += 1;
                }
            }
            _ => break,
        }
    }
    manager.disconnect_all().await;
}
