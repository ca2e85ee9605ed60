//! The worker: one dispatch table over every event kind.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStorage, SharedCacheStorage};
use crate::clients::{ClientId, ClientMatchOptions, Clients};
use crate::config::WorkerConfig;
use crate::lifecycle::{self, ActivationReport, Lifecycle, PrecacheReport, WorkerState};
use crate::message::{ControlMessage, ControlReply, MessageEvent};
use crate::net::{FetchError, Fetcher, Request};
use crate::push::{
    self, Notification, NotificationClickEvent, NotificationId, Notifications, PushEvent,
    PushPayload, SyncEvent, SyncReport,
};
use crate::registry::{CacheKind, CacheRegistry};
use crate::router::{BypassReason, Route, Router};
use crate::scope::EventScope;
use crate::strategy::{self, FetchOutcome, StrategyContext};
use crate::Result;

/// Events delivered to the worker by the host.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(MessageEvent),
    Push(PushEvent),
    NotificationClick(NotificationClickEvent),
    Sync(SyncEvent),
}

impl WorkerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Message(_) => "message",
            WorkerEvent::Push(_) => "push",
            WorkerEvent::NotificationClick(_) => "notificationclick",
            WorkerEvent::Sync(_) => "sync",
        }
    }
}

/// What handling an event produced.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// Install finished; carries the activation it went straight into, if any.
    Installed {
        precache: PrecacheReport,
        activation: Option<ActivationReport>,
    },
    Activated(ActivationReport),
    /// The request was not intercepted.
    Passthrough(BypassReason),
    /// The page receives this response.
    Responded(FetchOutcome),
    /// The page sees a failed load.
    FetchFailed(FetchError),
    /// `SKIP_WAITING` handled; carries the activation it triggered, if any.
    SkippedWaiting(Option<ActivationReport>),
    /// `CLEAR_CACHE` handled.
    CacheCleared { deleted: Vec<String>, replied: bool },
    NotificationShown(NotificationId),
    /// The push payload was malformed.
    NotificationDropped,
    /// The notification was closed; carries the client the click opened or focused.
    NotificationClicked(Option<ClientId>),
    Synced(SyncReport),
    /// Nothing to do for this event.
    Ignored,
}

/// A service worker instance controlling one origin.
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    router: Router,
    strategies: StrategyContext,
    static_urls: Vec<Url>,
    offline_document: Request,
    clients: Arc<RwLock<Clients>>,
    notifications: RwLock<Notifications>,
    lifecycle: RwLock<Lifecycle>,
}

impl ServiceWorker {
    /// Create a worker with its own, empty cache storage.
    pub fn new(config: WorkerConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        Self::with_storage(
            config,
            fetcher,
            CacheStorage::shared(),
            Arc::new(RwLock::new(Clients::new())),
        )
    }

    /// Create a worker over existing, origin-wide cache storage and clients.
    pub fn with_storage(
        config: WorkerConfig,
        fetcher: Arc<dyn Fetcher>,
        caches: SharedCacheStorage,
        clients: Arc<RwLock<Clients>>,
    ) -> Result<Self> {
        config.validate()?;

        let static_urls = config.static_urls()?;
        let offline_document = Request::get(config.resolve(&config.offline_document)?);
        let router = Router::from_config(&config);
        let strategies = StrategyContext {
            caches,
            fetcher,
            registry: Arc::new(config.registry()),
        };

        Ok(Self {
            config: Arc::new(config),
            router,
            strategies,
            static_urls,
            offline_document,
            clients,
            notifications: RwLock::new(Notifications::new()),
            lifecycle: RwLock::new(Lifecycle::new()),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.strategies.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn caches(&self) -> &SharedCacheStorage {
        &self.strategies.caches
    }

    pub fn clients(&self) -> &Arc<RwLock<Clients>> {
        &self.clients
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.read().await.state()
    }

    pub async fn notification(&self, id: NotificationId) -> Option<Notification> {
        self.notifications.read().await.get(id).cloned()
    }

    /// Entry count per cache.
    pub async fn cache_report(&self) -> Vec<(String, usize)> {
        self.strategies.caches.read().await.report()
    }

    /// Whether the host should activate this worker now.
    pub async fn should_activate(&self) -> bool {
        self.lifecycle.read().await.should_activate()
    }

    /// Install and activate in one go, as a freshly registered worker does.
    pub async fn start(&self) -> Result<(PrecacheReport, ActivationReport)> {
        let (precache, activation) = self.on_install().await?;
        let activation = match activation {
            Some(report) => report,
            None => self.on_activate().await?,
        };
        Ok((precache, activation))
    }

    /// Dispatch an event, then wait for all work it registered.
    pub async fn dispatch_and_settle(&self, event: WorkerEvent) -> Result<EventOutcome> {
        let scope = EventScope::new();
        let outcome = self.dispatch(event, &scope).await;
        scope.settle().await;
        outcome
    }

    /// Dispatch an event. Background work is registered with `scope`.
    pub async fn dispatch(&self, event: WorkerEvent, scope: &EventScope) -> Result<EventOutcome> {
        debug!(event = event.kind(), "Dispatching event");
        match event {
            WorkerEvent::Install => {
                let (precache, activation) = self.on_install().await?;
                Ok(EventOutcome::Installed {
                    precache,
                    activation,
                })
            }
            WorkerEvent::Activate => {
                if self.lifecycle.read().await.is_active() {
                    debug!("Worker already active");
                    return Ok(EventOutcome::Ignored);
                }
                self.on_activate().await.map(EventOutcome::Activated)
            }
            WorkerEvent::Fetch(request) => Ok(self.on_fetch(request, scope).await),
            WorkerEvent::Message(message) => self.on_message(message).await,
            WorkerEvent::Push(push) => Ok(self.on_push(push).await),
            WorkerEvent::NotificationClick(click) => self.on_notification_click(click).await,
            WorkerEvent::Sync(sync) => Ok(self.on_sync(sync).await),
        }
    }

    // ==================== Lifecycle ====================

    async fn on_install(&self) -> Result<(PrecacheReport, Option<ActivationReport>)> {
        self.lifecycle
            .write()
            .await
            .transition(WorkerState::Installing)?;

        let report = lifecycle::precache(
            &self.strategies.caches,
            self.strategies.fetcher.as_ref(),
            &self.strategies.registry,
            &self.static_urls,
        )
        .await;

        let activate_now = {
            let mut state = self.lifecycle.write().await;
            state.transition(WorkerState::Installed)?;
            if self.config.skip_waiting {
                state.skip_waiting();
            }
            state.should_activate()
        };
        info!(version = self.config.version, activate_now, "Worker installed");

        let activation = if activate_now {
            Some(self.on_activate().await?)
        } else {
            None
        };
        Ok((report, activation))
    }

    async fn on_activate(&self) -> Result<ActivationReport> {
        self.lifecycle
            .write()
            .await
            .transition(WorkerState::Activating)?;

        let deleted = lifecycle::purge_stale(&self.strategies.caches, &self.strategies.registry).await;
        let claimed = self.clients.write().await.claim();

        self.lifecycle
            .write()
            .await
            .transition(WorkerState::Activated)?;
        info!(version = self.config.version, deleted = deleted.len(), claimed, "Worker activated");
        Ok(ActivationReport { deleted, claimed })
    }

    // ==================== Fetch ====================

    async fn on_fetch(&self, request: Request, scope: &EventScope) -> EventOutcome {
        if !self.lifecycle.read().await.is_active() {
            return EventOutcome::Passthrough(BypassReason::Inactive);
        }

        let ctx = &self.strategies;
        let result = match self.router.classify(&request) {
            Route::Bypass(reason) => return EventOutcome::Passthrough(reason),
            Route::StaleWhileRevalidate(kind) => {
                strategy::stale_while_revalidate(ctx, scope, kind, request).await
            }
            Route::Navigation => {
                strategy::navigation(ctx, scope, request, &self.offline_document).await
            }
            Route::NetworkFirst => strategy::network_first(ctx, scope, request).await,
        };

        match result {
            Ok(outcome) => EventOutcome::Responded(outcome),
            Err(e) => EventOutcome::FetchFailed(e),
        }
    }

    // ==================== Messages ====================

    async fn on_message(&self, message: MessageEvent) -> Result<EventOutcome> {
        let Some(command) = ControlMessage::parse(&message.data) else {
            debug!(data = %message.data, "Ignoring unknown message");
            return Ok(EventOutcome::Ignored);
        };

        match command {
            ControlMessage::SkipWaiting => {
                let waiting = {
                    let mut state = self.lifecycle.write().await;
                    state.skip_waiting();
                    state.should_activate()
                };
                let activated = if waiting {
                    Some(self.on_activate().await?)
                } else {
                    None
                };
                Ok(EventOutcome::SkippedWaiting(activated))
            }
            ControlMessage::ClearCache => {
                let deleted = {
                    let mut caches = self.strategies.caches.write().await;
                    let names = caches.keys();
                    for name in &names {
                        caches.delete(name);
                    }
                    names
                };
                info!(deleted = deleted.len(), "Cleared all caches");

                let replied = match message.reply_port() {
                    Some(port) => match port.post(ControlReply::CacheCleared) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(error = %e, "Could not acknowledge cache clear");
                            false
                        }
                    },
                    None => false,
                };
                Ok(EventOutcome::CacheCleared { deleted, replied })
            }
        }
    }

    // ==================== Push & Sync ====================

    async fn on_push(&self, push: PushEvent) -> EventOutcome {
        let payload = match PushPayload::parse(push.data.as_deref()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Dropping malformed push payload");
                return EventOutcome::NotificationDropped;
            }
        };

        let notification = Notification::from_payload(payload, &self.config.notification);
        let id = self.notifications.write().await.show(notification);
        EventOutcome::NotificationShown(id)
    }

    async fn on_notification_click(&self, click: NotificationClickEvent) -> Result<EventOutcome> {
        if self.notifications.write().await.close(click.notification).is_none() {
            debug!("Clicked notification was already closed");
        }
        if !click.wants_explore() {
            return Ok(EventOutcome::NotificationClicked(None));
        }

        let url = self.config.resolve(&self.config.notification.open_url)?;
        let mut clients = self.clients.write().await;
        let existing = clients
            .match_all(&ClientMatchOptions {
                include_uncontrolled: true,
            })
            .into_iter()
            .find(|c| c.url == url)
            .map(|c| c.id);

        let id = match existing {
            Some(id) => clients.focus(id)?.id,
            None => clients.open_window(url).id,
        };
        Ok(EventOutcome::NotificationClicked(Some(id)))
    }

    async fn on_sync(&self, sync: SyncEvent) -> EventOutcome {
        if sync.tag != self.config.sync_tag {
            debug!(tag = %sync.tag, "Ignoring unknown sync tag");
            return EventOutcome::Ignored;
        }

        let report = push::refresh_cache(
            &self.strategies.caches,
            self.strategies.fetcher.as_ref(),
            self.strategies.registry.name(CacheKind::Static),
        )
        .await;
        EventOutcome::Synced(report)
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("app_id", &self.config.app_id)
            .field("version", &self.config.version)
            .field("origin", &self.config.origin.as_str())
            .finish_non_exhaustive()
    }
}

