//! End-to-end scenarios: host shell, bootstrap and bindings together.

use futures::future::{BoxFuture, FutureExt};
use futures::stream::StreamExt;
use parking_lot::Mutex;
use portal_bridge::bindings::{AuthBinding, Disposable, SnapshotCell, WatchHolder};
use portal_bridge::core::PortalConfig;
use portal_bridge::dom::Container;
use portal_bridge::mount::{
    AppBootstrap, AppRoot, Export, ModuleExports, MountOptions, RemoteInstance, RemoteModule, RenderView,
    StaticLoader,
};
use portal_bridge::navigation::NavigationBridge;
use portal_bridge::streaming::{EventStream, RetryPolicy, StreamConnector, StreamManager};
use portal_bridge::sync::SyncSource;
use portal_bridge::HostShell;
use portal_bridge_core::{
    AuthAdapter, AuthState, AuthStore, Error, MountError, PortalStores, PortalUser, ResourceKey, Result,
    StateSource, Theme, ThemeMode, ThemeStore,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Trace {
    renders: Mutex<Vec<RenderView>>,
    attached: Mutex<Vec<bool>>,
    unmounts: AtomicUsize,
}

struct TraceRoot(Arc<Trace>);

impl AppRoot for TraceRoot {
    fn render(&mut self, view: &RenderView) {
        self.0.renders.lock().push(view.clone());
    }

    fn attach_stores(&mut self, stores: Option<&PortalStores>) {
        self.0.attached.lock().push(stores.is_some());
    }

    fn unmount(&mut self) {
        self.0.unmounts.fetch_add(1, Ordering::SeqCst);
    }
}

struct Portal {
    host: HostShell,
    loader: Arc<StaticLoader>,
    shopping: Arc<AppBootstrap>,
    trace: Arc<Trace>,
}

fn portal(sync: Option<(SyncSource<PortalStores>, Duration)>) -> Portal {
    let mut config = PortalConfig::default();
    config.shell.default_theme = ThemeMode::Light;
    config.shell.initial_path = "/shopping/cart".to_string();

    let loader = Arc::new(StaticLoader::new());
    let host = HostShell::new(config, loader.clone());
    host.start();

    let trace = Arc::new(Trace::default());
    let root_trace = trace.clone();
    let factory = move |_: &Container, _: &NavigationBridge| -> Result<Box<dyn AppRoot>> {
        Ok(Box::new(TraceRoot(root_trace.clone())))
    };
    let mut bootstrap = AppBootstrap::new("shopping", "shopping", host.document().clone(), factory);
    if let Some((source, timeout)) = sync {
        bootstrap = bootstrap.with_initial_sync(source, timeout);
    }
    let shopping = Arc::new(bootstrap);
    loader.register_module("shopping", shopping.clone());

    Portal {
        host,
        loader,
        shopping,
        trace,
    }
}

#[tokio::test]
async fn parent_navigation_to_initial_path_does_not_loop() {
    let portal = portal(None);
    let container = portal.host.document().create_container();
    let calls = Arc::new(Mutex::new(Vec::<String>::new()));
    let calls_c = calls.clone();

    let instance = portal
        .shopping
        .mount(
            &container,
            MountOptions::new()
                .with_initial_path("/cart")
                .with_on_navigate(move |p| calls_c.lock().push(p.to_string())),
        )
        .unwrap();
    let renders = portal.trace.renders.lock().len();

    instance.on_parent_navigate("/cart");

    assert!(calls.lock().is_empty());
    assert_eq!(portal.trace.renders.lock().len(), renders);
}

#[tokio::test]
async fn internal_navigation_reaches_host_once() {
    let portal = portal(None);
    let container = portal.host.document().create_container();
    let id = portal.host.mount_remote("shopping", &container).await.unwrap();

    let routes = Arc::new(Mutex::new(Vec::new()));
    let routes_c = routes.clone();
    let _sub = portal.host.subscribe_route(move |p| routes_c.lock().push(p.to_string()));

    assert!(portal.shopping.navigate_internal(id, "/orders/42"));

    assert_eq!(*routes.lock(), vec!["/shopping/orders/42".to_string()]);
    let bridge = portal.shopping.bridge(id).unwrap();
    assert_eq!(bridge.router().history(), vec!["/cart".to_string(), "/orders/42".to_string()]);
    assert_eq!(portal.trace.renders.lock().last().unwrap().path, "/orders/42");
}

#[tokio::test]
async fn logout_reaches_every_consumer_in_one_pass() {
    let portal = portal(None);
    let auth = portal.host.stores().auth;
    portal.host.auth().login(PortalUser::basic("lee@portal.dev", ["ROLE_USER"], "t-1"));

    let cell: AuthBinding<SnapshotCell<AuthState>> = AuthBinding::acquire(auth.clone());
    let watch: AuthBinding<WatchHolder<AuthState>> = AuthBinding::acquire(auth.clone());
    let mut rx = watch.holder().subscribe();
    assert!(cell.has_role("ROLE_USER"));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let subs: Vec<_> = (0..3)
        .map(|_| {
            let seen = seen.clone();
            auth.subscribe(Arc::new(move |s: &Arc<AuthState>| seen.lock().push(s.clone())))
        })
        .collect();

    auth.logout();

    let seen = seen.lock();
    assert_eq!(seen.len(), subs.len());
    for state in seen.iter() {
        assert!(!state.is_authenticated);
        assert!(state.roles.is_empty());
        assert_eq!(state.display_name, "Guest");
    }
    assert_eq!(*cell.state(), AuthState::anonymous());
    assert!(rx.has_changed().unwrap());
    assert_eq!(**rx.borrow_and_update(), AuthState::anonymous());
}

#[derive(Default)]
struct ThemeProbe {
    themes: Mutex<Vec<Theme>>,
    activations: AtomicUsize,
}

struct ThemeProbeInstance(Arc<ThemeProbe>);

impl RemoteInstance for ThemeProbeInstance {
    fn on_parent_navigate(&self, _path: &str) {}
    fn unmount(&self) {}
    fn on_activated(&self) {
        self.0.activations.fetch_add(1, Ordering::SeqCst);
    }
    fn on_theme_change(&self, theme: Theme) {
        self.0.themes.lock().push(theme);
    }
}

struct ThemeProbeModule(Arc<ThemeProbe>);

impl RemoteModule for ThemeProbeModule {
    fn mount(&self, _container: &Container, _options: MountOptions) -> Result<Arc<dyn RemoteInstance>> {
        Ok(Arc::new(ThemeProbeInstance(self.0.clone())))
    }
}

#[tokio::test]
async fn theme_changes_while_hidden_flush_once_on_return() {
    let portal = portal(None);
    let probe = Arc::new(ThemeProbe::default());
    portal.loader.register_module("blog", Arc::new(ThemeProbeModule(probe.clone())));
    let container = portal.host.document().create_container();
    let id = portal.host.mount_remote("blog", &container).await.unwrap();

    assert!(portal.host.deactivate(id));
    portal.host.theme().set_mode(ThemeMode::Dark);
    portal.host.theme().toggle();
    assert!(probe.themes.lock().is_empty());

    assert!(portal.host.activate(id));
    assert_eq!(*probe.themes.lock(), vec![Theme::Light]);
    assert_eq!(probe.activations.load(Ordering::SeqCst), 1);

    // Nothing left to flush.
    assert!(portal.host.deactivate(id));
    assert!(portal.host.activate(id));
    assert_eq!(probe.themes.lock().len(), 1);
}

#[tokio::test]
async fn kept_alive_bootstrap_rerenders_with_final_theme() {
    let portal = portal(None);
    let container = portal.host.document().create_container();
    let id = portal.host.mount_remote("shopping", &container).await.unwrap();
    assert!(portal.host.hide(id));

    portal.host.theme().toggle();
    let renders = portal.trace.renders.lock().len();
    assert!(portal.host.activate(id));

    let trace = portal.trace.renders.lock();
    assert_eq!(trace.len(), renders + 1);
    assert_eq!(trace.last().unwrap().theme, Theme::Dark);
}

#[tokio::test]
async fn mount_without_sync_renders_once() {
    let portal = portal(None);
    let container = portal.host.document().create_container();
    portal.host.mount_remote("shopping", &container).await.unwrap();

    let renders = portal.trace.renders.lock();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].path, "/cart");
    assert_eq!(*portal.trace.attached.lock(), vec![false]);
}

#[tokio::test]
async fn hidden_remote_does_not_move_host_route() {
    let portal = portal(None);
    let container = portal.host.document().create_container();
    let id = portal.host.mount_remote("shopping", &container).await.unwrap();

    assert!(portal.host.hide(id));
    portal.host.navigate("/blog/posts");
    assert!(portal.shopping.navigate_internal(id, "/orders/9"));
    assert_eq!(portal.host.current_path(), "/blog/posts");

    assert!(portal.host.activate(id));
    assert!(portal.shopping.navigate_internal(id, "/orders/10"));
    assert_eq!(portal.host.current_path(), "/shopping/orders/10");
}

#[tokio::test]
async fn double_unmount_releases_root_once() {
    let portal = portal(None);
    let container = portal.host.document().create_container();
    let id = portal.host.mount_remote("shopping", &container).await.unwrap();
    let instance = portal.host.registry().instance(id).unwrap();

    assert!(portal.host.unmount(id));
    instance.unmount();
    assert!(!portal.host.unmount(id));

    assert_eq!(portal.trace.unmounts.load(Ordering::SeqCst), 1);
    assert_eq!(portal.shopping.instance_count(), 0);
    assert!(container.is_empty());
    assert_eq!(portal.host.document().live_observer_count(), 0);
    assert_eq!(portal.host.document().root_attribute("data-service"), None);
}

#[tokio::test]
async fn mount_failures_leave_no_record() {
    let portal = portal(None);

    portal.loader.unregister("shopping");
    let unreachable = portal.host.document().create_container();
    let err = portal.host.mount_remote("shopping", &unreachable).await.unwrap_err();
    assert!(err.is_infrastructure());
    assert_eq!(unreachable.content(), portal.host.config().shell.fallback_html);

    portal.loader.register("blog", ModuleExports::new().with("mount", Export::Value(serde_json::json!(null))));
    let invalid = portal.host.document().create_container();
    let err = portal.host.mount_remote("blog", &invalid).await.unwrap_err();
    assert!(matches!(err, Error::Mount(MountError::InvalidModule { .. })));

    let detached = portal.host.document().create_container();
    detached.detach();
    portal.loader.register_module("shopping", portal.shopping.clone());
    let err = portal.host.mount_remote("shopping", &detached).await.unwrap_err();
    assert!(matches!(err, Error::Mount(MountError::ContainerDetached(_))));

    assert!(portal.host.registry().is_empty());
    assert_eq!(portal.host.document().live_observer_count(), 0);
}

#[tokio::test]
async fn styles_injected_while_active_are_tagged() {
    let portal = portal(None);
    let container = portal.host.document().create_container();
    let id = portal.host.mount_remote("shopping", &container).await.unwrap();
    let doc = portal.host.document();

    let visible = doc.append_style(".cart { color: red }");
    portal.host.deactivate(id);
    let hidden = doc.append_style(".orders { color: blue }");

    assert_eq!(doc.style_attribute(visible, "data-mf-app").as_deref(), Some("shopping"));
    assert_eq!(doc.style_attribute(hidden, "data-mf-app"), None);
}

#[tokio::test(start_paused = true)]
async fn slow_sync_falls_back_and_replays_latest_parent_path() {
    let source: SyncSource<PortalStores> =
        Arc::new(|| -> BoxFuture<'static, Result<PortalStores>> { futures::future::pending().boxed() });
    let portal = portal(Some((source, Duration::from_secs(3))));
    let container = portal.host.document().create_container();
    let id = portal.host.mount_remote("shopping", &container).await.unwrap();

    // First render does not wait for the sync.
    assert_eq!(portal.trace.renders.lock().len(), 1);

    portal.host.navigate("/shopping/orders/1");
    portal.host.navigate("/shopping/orders/2");
    let bridge = portal.shopping.bridge(id).unwrap();
    assert_eq!(bridge.buffered_path().as_deref(), Some("/orders/2"));

    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(*portal.trace.attached.lock(), vec![false]);
    assert_eq!(bridge.router().history(), vec!["/cart".to_string(), "/orders/2".to_string()]);
    assert_eq!(portal.host.current_path(), "/shopping/orders/2");
}

#[tokio::test]
async fn sync_completion_after_unmount_is_discarded() {
    let gate = Arc::new(tokio::sync::Notify::new());
    let waiter = gate.clone();
    let auth = AuthStore::new();
    let theme = ThemeStore::new(ThemeMode::Light);
    let source: SyncSource<PortalStores> = Arc::new(move || -> BoxFuture<'static, Result<PortalStores>> {
        let waiter = waiter.clone();
        let stores = PortalStores::new(&auth, &theme);
        async move {
            waiter.notified().await;
            Ok(stores)
        }
        .boxed()
    });
    let portal = portal(Some((source, Duration::from_secs(30))));
    let container = portal.host.document().create_container();
    let id = portal.host.mount_remote("shopping", &container).await.unwrap();

    portal.host.unmount(id);
    gate.notify_one();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(portal.trace.attached.lock().is_empty());
}

#[derive(Default)]
struct CountingFeed {
    open: Arc<AtomicUsize>,
}

struct OpenGuard(Arc<AtomicUsize>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StreamConnector for CountingFeed {
    fn connect(&self, _key: &ResourceKey) -> BoxFuture<'static, Result<EventStream>> {
        let open = self.open.clone();
        async move {
            open.fetch_add(1, Ordering::SeqCst);
            let guard = OpenGuard(open);
            let stream = futures::stream::pending::<Result<String>>()
                .map(move |item| {
                    let _held = &guard;
                    item
                })
                .boxed();
            Ok(stream)
        }
        .boxed()
    }
}

#[tokio::test]
async fn second_connect_for_same_key_leaves_one_connection() {
    let feed = Arc::new(CountingFeed::default());
    let open = feed.open.clone();
    let manager = StreamManager::new(
        feed,
        RetryPolicy {
            retry_delay: Duration::from_millis(100),
            max_attempts: 3,
        },
        32,
    );
    let key = ResourceKey::from("queue/timedeal/7");

    manager.connect(key.clone()).await;
    tokio::join!(manager.connect(key.clone()), manager.connect(key.clone()));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(manager.live_count(), 1);
    assert!(manager.is_live(&key));
    assert_eq!(open.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn binding_dispose_resets_to_anonymous() {
    let portal = portal(None);
    portal.host.auth().login(PortalUser::basic("lee@portal.dev", ["ROLE_ADMIN"], "t-1"));
    let binding: AuthBinding<SnapshotCell<AuthState>> = AuthBinding::acquire(portal.host.stores().auth);
    assert!(binding.is_admin());

    binding.dispose();
    binding.dispose();
    assert_eq!(*binding.state(), AuthState::anonymous());

    portal.host.auth().login(PortalUser::basic("lee@portal.dev", ["ROLE_ADMIN"], "t-2"));
    assert!(!binding.is_authenticated());
}
