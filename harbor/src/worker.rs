//! The offline cache worker: install/activate lifecycle, per-route fetch
//! handling, background sync replay and push notifications.

use crate::domain::{CacheNames, CachedResponse, FetchRequest, Notification, PushPayload};
use crate::planes::control::{AdminOperations, CacheManager};
use crate::planes::data::strategies::shareable_copy;
use crate::planes::data::{Fallback, FetchStrategies, Route, RoutingRules};
use crate::ports::{Network, PendingActionStore};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use shared::Result;
use std::sync::Arc;

/// Tag a client registers to have queued mutations replayed
pub const SYNC_TAG: &str = "sync-pending-actions";

const DEFAULT_NOTIFICATION_TITLE: &str = "New notification";
const NOTIFICATION_ICON: &str = "/icons/icon-192x192.png";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Parsed,
    Installed,
    Activated,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub replayed: usize,
    pub remaining: usize,
}

#[derive(Clone, Debug)]
pub struct WorkerOptions {
    pub names: CacheNames,
    pub rules: RoutingRules,
    pub precache: Vec<String>,
    pub offline_page: String,
}

impl WorkerOptions {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self {
            names: CacheNames::new(prefix, version),
            rules: RoutingRules::default(),
            precache: vec!["/".to_string(), "/offline.html".to_string()],
            offline_page: "/offline.html".to_string(),
        }
    }

    pub fn from_config(config: &shared::config::WorkerConfig) -> Self {
        Self {
            names: CacheNames::new(&config.cache_prefix, &config.cache_version),
            rules: RoutingRules::new(config.api_prefix.clone()),
            precache: config.precache.clone(),
            offline_page: config.offline_page.clone(),
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
    clients_claimed: bool,
}

/// Intercepts fetches for one origin and keeps it usable offline
pub struct OfflineWorker {
    strategies: FetchStrategies,
    pending: Arc<dyn PendingActionStore>,
    options: WorkerOptions,
    lifecycle: RwLock<Lifecycle>,
    /// Held for a whole replay so concurrent syncs can't send an action twice
    sync_guard: tokio::sync::Mutex<()>,
}

impl OfflineWorker {
    pub fn new(
        caches: CacheManager,
        network: Arc<dyn Network>,
        pending: Arc<dyn PendingActionStore>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            strategies: FetchStrategies::new(caches, network),
            pending,
            options,
            lifecycle: RwLock::new(Lifecycle {
                state: WorkerState::Parsed,
                skip_waiting: false,
                clients_claimed: false,
            }),
            sync_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn caches(&self) -> &CacheManager {
        self.strategies.caches()
    }

    pub fn names(&self) -> &CacheNames {
        &self.options.names
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.read().state
    }

    pub fn skip_waiting(&self) -> bool {
        self.lifecycle.read().skip_waiting
    }

    pub fn clients_claimed(&self) -> bool {
        self.lifecycle.read().clients_claimed
    }

    /// Precache the manifest into the static cache. Entries that fail are
    /// reported and skipped; installation itself always completes.
    pub async fn install(&self) -> InstallReport {
        tracing::info!(
            "Installing worker {} ({} precache entries)",
            self.options.names.version,
            self.options.precache.len()
        );

        let cache = self
            .caches()
            .open_cache(&self.options.names.static_cache)
            .await;
        let mut report = InstallReport::default();

        for url in &self.options.precache {
            let request = FetchRequest::get(url.clone());
            match self.strategies.network().fetch(&request).await {
                Ok(response) => match shareable_copy(&request, &response) {
                    Some(copy) => match cache.put(url.clone(), copy).await {
                        Ok(()) => report.cached.push(url.clone()),
                        Err(e) => {
                            tracing::warn!("Failed to precache {}: {}", url, e);
                            report.failed.push(url.clone());
                        }
                    },
                    None => {
                        tracing::warn!(
                            "Precache of {} returned {} and was not stored",
                            url,
                            response.status
                        );
                        report.failed.push(url.clone());
                    }
                },
                Err(e) => {
                    tracing::warn!("Precache of {} failed: {}", url, e);
                    report.failed.push(url.clone());
                }
            }
        }

        let mut lifecycle = self.lifecycle.write();
        lifecycle.state = WorkerState::Installed;
        lifecycle.skip_waiting = true;
        report
    }

    /// Delete every cache that isn't one of the two current versioned caches,
    /// then take control of open clients. Returns the deleted cache names.
    pub async fn activate(&self) -> Vec<String> {
        let mut deleted = Vec::new();
        for name in self.caches().cache_names().await {
            if self.options.names.is_current(&name) {
                continue;
            }
            if self.caches().drop_cache(&name).await {
                tracing::info!("Deleted stale cache '{}'", name);
                deleted.push(name);
            }
        }

        let mut lifecycle = self.lifecycle.write();
        lifecycle.state = WorkerState::Activated;
        lifecycle.clients_claimed = true;
        deleted
    }

    pub fn route(&self, request: &FetchRequest) -> Route {
        self.options.rules.route(request)
    }

    /// Answer a fetch. Never fails: on total failure a minimal offline response
    /// is synthesised.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> CachedResponse {
        let names = &self.options.names;
        match self.route(request) {
            Route::Bypass => self.bypass(request).await,
            Route::StaticAsset => {
                self.strategies
                    .cache_first(request, &names.static_cache)
                    .await
            }
            Route::Api => {
                self.strategies
                    .network_first(request, &names.dynamic_cache, &Fallback::Json)
                    .await
            }
            Route::Navigation => {
                let fallback = Fallback::OfflinePage(self.options.offline_page.clone());
                self.strategies
                    .network_first(request, &names.dynamic_cache, &fallback)
                    .await
            }
            Route::Other => {
                self.strategies
                    .network_first(request, &names.dynamic_cache, &Fallback::NotFound)
                    .await
            }
        }
    }

    /// Mutations go straight to the network; when it is unreachable they are
    /// queued for background sync
    async fn bypass(&self, request: &FetchRequest) -> CachedResponse {
        let error = match self.strategies.network().fetch(request).await {
            Ok(response) => return response,
            Err(e) => e,
        };

        tracing::info!(
            "{} {} failed while offline: {}",
            request.method,
            request.url,
            error
        );

        let queued = match self.pending.enqueue(request).await {
            Ok(action) => {
                tracing::info!("Queued {} {} as action {}", action.method, action.url, action.id);
                true
            }
            Err(e) => {
                tracing::warn!("Could not queue {} {}: {}", request.method, request.url, e);
                false
            }
        };

        CachedResponse::json(
            503,
            &json!({
                "success": false,
                "error": "offline",
                "message": "You are offline. The request will be retried when the connection returns.",
                "queued": queued,
            }),
        )
    }

    /// Replay queued mutations. Unknown tags are ignored.
    pub async fn sync(&self, tag: &str) -> Result<SyncReport> {
        if tag != SYNC_TAG {
            tracing::debug!("Ignoring sync event with tag '{}'", tag);
            return Ok(SyncReport::default());
        }

        let _guard = self.sync_guard.lock().await;
        let actions = self.pending.list().await?;
        let mut report = SyncReport::default();

        for action in actions {
            match self.strategies.network().fetch(&action.to_request()).await {
                Ok(response) => {
                    // The origin answered; a rejection would only be rejected again
                    if !response.is_ok() {
                        tracing::warn!(
                            "Replayed {} {} rejected with {}",
                            action.method,
                            action.url,
                            response.status
                        );
                    }
                    self.pending.remove(action.id).await?;
                    report.replayed += 1;
                }
                Err(e) => {
                    tracing::debug!("Action {} still unreachable: {}", action.id, e);
                    report.remaining += 1;
                }
            }
        }

        tracing::info!(
            "Background sync replayed {} action(s), {} remaining",
            report.replayed,
            report.remaining
        );
        Ok(report)
    }

    pub fn push(&self, payload: Option<PushPayload>) -> Notification {
        let payload = payload.unwrap_or_default();
        let primary_key = payload.primary_key.map(|key| match key {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        Notification {
            title: payload
                .title
                .unwrap_or_else(|| DEFAULT_NOTIFICATION_TITLE.to_string()),
            body: payload.body.unwrap_or_default(),
            icon: NOTIFICATION_ICON.to_string(),
            primary_key,
        }
    }

    /// Where a click on `notification` should navigate to
    pub fn notification_click(&self, notification: &Notification) -> String {
        match &notification.primary_key {
            Some(key) => format!("/?notification={}", urlencoding::encode(key)),
            None => "/".to_string(),
        }
    }
}

impl std::fmt::Debug for OfflineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWorker")
            .field("names", &self.options.names)
            .field("lifecycle", &*self.lifecycle.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPendingStore;
    use crate::test_support::{MemoryStorageFactory, MockNetwork, ok_response};
    use reqwest::Method;

    struct Fixture {
        worker: OfflineWorker,
        network: Arc<MockNetwork>,
        factory: Arc<MemoryStorageFactory>,
        pending: Arc<MemoryPendingStore>,
    }

    fn fixture() -> Fixture {
        let network = Arc::new(MockNetwork::default());
        let factory = Arc::new(MemoryStorageFactory::default());
        let pending = Arc::new(MemoryPendingStore::new());
        let worker = OfflineWorker::new(
            CacheManager::new(factory.clone()),
            network.clone(),
            pending.clone(),
            WorkerOptions::new("harbor", "v2"),
        );
        Fixture {
            worker,
            network,
            factory,
            pending,
        }
    }

    #[tokio::test]
    async fn test_static_asset_fetched_once_then_served_from_cache() {
        let f = fixture();
        f.network.respond("/app.js", ok_response("console.log(1)"));

        let first = f.worker.handle_fetch(&FetchRequest::get("/app.js")).await;
        assert_eq!(first.body, "console.log(1)");
        assert_eq!(f.network.calls("/app.js"), 1);
        assert_eq!(f.factory.puts(), 1);

        let second = f.worker.handle_fetch(&FetchRequest::get("/app.js")).await;
        assert_eq!(second.body, "console.log(1)");
        assert_eq!(f.network.calls("/app.js"), 1);
        assert_eq!(f.factory.puts(), 1);
    }

    #[tokio::test]
    async fn test_static_asset_total_failure_is_404() {
        let f = fixture();
        f.network.go_offline();
        let response = f.worker.handle_fetch(&FetchRequest::get("/logo.png")).await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_static_asset_error_status_is_not_cached() {
        let f = fixture();
        f.network
            .respond("/missing.css", CachedResponse::text(404, "nope"));
        let response = f.worker.handle_fetch(&FetchRequest::get("/missing.css")).await;
        assert_eq!(response.status, 404);
        assert_eq!(f.factory.puts(), 0);
    }

    #[tokio::test]
    async fn test_api_failure_serves_previous_response() {
        let f = fixture();
        let url = "/api/v1/accounts?page=1";
        f.network.respond(url, ok_response("{\"success\":true,\"data\":[1]}"));

        let live = f.worker.handle_fetch(&FetchRequest::get(url)).await;
        assert!(live.is_ok());

        f.network.go_offline();
        let offline = f.worker.handle_fetch(&FetchRequest::get(url)).await;
        assert_eq!(offline.status, 200);
        assert_eq!(offline.body, "{\"success\":true,\"data\":[1]}");
        assert_eq!(f.network.calls(url), 2);
    }

    #[tokio::test]
    async fn test_api_failure_without_cache_is_503_json() {
        let f = fixture();
        f.network.go_offline();
        let response = f
            .worker
            .handle_fetch(&FetchRequest::get("/api/v1/invoices"))
            .await;
        assert_eq!(response.status, 503);
        assert_eq!(response.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_api_success_is_stored_in_dynamic_cache() {
        let f = fixture();
        f.network.respond("/api/v1/me", ok_response("me"));
        f.worker.handle_fetch(&FetchRequest::get("/api/v1/me")).await;

        let dynamic = f
            .worker
            .caches()
            .get_cache_store("harbor-dynamic-v2")
            .await
            .unwrap();
        assert_eq!(dynamic.get("/api/v1/me").await.unwrap().body, "me");
    }

    #[tokio::test]
    async fn test_navigation_falls_back_to_offline_page() {
        let f = fixture();
        f.network.respond("/", ok_response("<html>home</html>"));
        f.network
            .respond("/offline.html", ok_response("<html>offline</html>"));
        let report = f.worker.install().await;
        assert_eq!(report.cached.len(), 2);

        f.network.go_offline();
        let response = f
            .worker
            .handle_fetch(&FetchRequest::navigate("/dashboard/banking"))
            .await;
        assert_eq!(response.body, "<html>offline</html>");
    }

    #[tokio::test]
    async fn test_navigation_without_any_cache_does_not_crash() {
        let f = fixture();
        f.network.go_offline();
        let response = f
            .worker
            .handle_fetch(&FetchRequest::navigate("/dashboard"))
            .await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_other_requests_fall_back_to_plain_404() {
        let f = fixture();
        f.network.go_offline();
        let response = f.worker.handle_fetch(&FetchRequest::get("/robots.txt")).await;
        assert_eq!(response, CachedResponse::text(404, "Not found"));
    }

    #[tokio::test]
    async fn test_install_reports_failures_and_sets_skip_waiting() {
        let f = fixture();
        f.network.respond("/", ok_response("home"));
        let report = f.worker.install().await;

        assert_eq!(report.cached, vec!["/"]);
        assert_eq!(report.failed, vec!["/offline.html"]);
        assert_eq!(f.worker.state(), WorkerState::Installed);
        assert!(f.worker.skip_waiting());
    }

    #[tokio::test]
    async fn test_activate_deletes_only_stale_caches() {
        let f = fixture();
        let caches = f.worker.caches();
        for name in [
            "harbor-static-v1",
            "harbor-dynamic-v1",
            "harbor-static-v2",
            "harbor-dynamic-v2",
            "unrelated",
        ] {
            caches.open_cache(name).await;
        }

        let mut deleted = f.worker.activate().await;
        deleted.sort();

        assert_eq!(
            deleted,
            vec!["harbor-dynamic-v1", "harbor-static-v1", "unrelated"]
        );
        assert_eq!(
            caches.cache_names().await,
            vec!["harbor-dynamic-v2", "harbor-static-v2"]
        );
        assert_eq!(f.worker.state(), WorkerState::Activated);
        assert!(f.worker.clients_claimed());
    }

    #[tokio::test]
    async fn test_offline_mutation_is_queued_and_replayed() {
        let f = fixture();
        f.network.go_offline();

        let request = FetchRequest::get("/api/v1/invoices")
            .with_method(Method::POST)
            .with_body("{\"amount\":100}");
        let response = f.worker.handle_fetch(&request).await;
        assert_eq!(response.status, 503);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["queued"], true);

        let still_offline = f.worker.sync(SYNC_TAG).await.unwrap();
        assert_eq!(still_offline, SyncReport { replayed: 0, remaining: 1 });

        f.network.go_online();
        f.network.respond("/api/v1/invoices", ok_response("{\"success\":true}"));
        let report = f.worker.sync(SYNC_TAG).await.unwrap();
        assert_eq!(report, SyncReport { replayed: 1, remaining: 0 });
        assert!(f.pending.list().await.unwrap().is_empty());
        assert_eq!(
            f.network.last_body("/api/v1/invoices").as_deref(),
            Some(&b"{\"amount\":100}"[..])
        );
    }

    #[tokio::test]
    async fn test_concurrent_syncs_replay_each_action_once() {
        let f = fixture();
        f.network.go_offline();
        let request = FetchRequest::get("/api/v1/invoices")
            .with_method(Method::POST)
            .with_body("{\"amount\":100}");
        f.worker.handle_fetch(&request).await;
        assert_eq!(f.network.calls("/api/v1/invoices"), 1);

        f.network.go_online();
        f.network.yield_before_responding();
        f.network.respond("/api/v1/invoices", ok_response("{\"success\":true}"));

        let (a, b) = tokio::join!(f.worker.sync(SYNC_TAG), f.worker.sync(SYNC_TAG));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.replayed + b.replayed, 1);
        assert_eq!(f.network.calls("/api/v1/invoices"), 2);
        assert!(f.pending.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_private_api_reply_is_not_served_to_another_caller() {
        let f = fixture();
        let url = "/api/v1/accounts";
        f.network.respond(
            url,
            CachedResponse::new(
                200,
                vec![
                    ("cache-control".into(), "private, no-store".into()),
                    ("set-cookie".into(), "session=tenant-a".into()),
                ],
                "{\"ledger_of\":\"tenant-a\"}",
            ),
        );

        let tenant_a = FetchRequest::get(url).with_header("Authorization", "Bearer tenant-a");
        assert_eq!(f.worker.handle_fetch(&tenant_a).await.status, 200);
        assert_eq!(f.factory.puts(), 0);

        f.network.go_offline();
        let tenant_b = FetchRequest::get(url).with_header("Authorization", "Bearer tenant-b");
        let response = f.worker.handle_fetch(&tenant_b).await;
        assert_eq!(response.status, 503);
        assert_eq!(response.header("set-cookie"), None);
    }

    #[tokio::test]
    async fn test_credentialed_reply_is_only_cached_when_public() {
        let f = fixture();
        f.network.respond("/api/v1/me", ok_response("me"));
        f.network.respond(
            "/api/v1/rates",
            CachedResponse::new(
                200,
                vec![
                    ("cache-control".into(), "public, max-age=300".into()),
                    ("set-cookie".into(), "session=abc".into()),
                ],
                "rates",
            ),
        );

        for url in ["/api/v1/me", "/api/v1/rates"] {
            let request = FetchRequest::get(url).with_header("Cookie", "session=abc");
            f.worker.handle_fetch(&request).await;
        }
        assert_eq!(f.factory.puts(), 1);

        f.network.go_offline();
        let rates = f.worker.handle_fetch(&FetchRequest::get("/api/v1/rates")).await;
        assert_eq!(rates.body, "rates");
        assert_eq!(rates.header("set-cookie"), None);
        let me = f.worker.handle_fetch(&FetchRequest::get("/api/v1/me")).await;
        assert_eq!(me.status, 503);
    }

    #[tokio::test]
    async fn test_anonymous_reply_is_cached_without_cookies() {
        let f = fixture();
        f.network.respond(
            "/",
            CachedResponse::new(
                200,
                vec![("Set-Cookie".into(), "visitor=1".into())],
                "<html>home</html>",
            ),
        );
        f.worker.handle_fetch(&FetchRequest::navigate("/")).await;

        f.network.go_offline();
        let offline = f.worker.handle_fetch(&FetchRequest::navigate("/")).await;
        assert_eq!(offline.body, "<html>home</html>");
        assert_eq!(offline.header("set-cookie"), None);
    }

    #[tokio::test]
    async fn test_sync_ignores_unknown_tags() {
        let f = fixture();
        f.network.go_offline();
        f.worker
            .handle_fetch(&FetchRequest::get("/api/v1/x").with_method(Method::DELETE))
            .await;

        let report = f.worker.sync("something-else").await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(f.pending.list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_push_and_click_through() {
        let f = fixture();
        let payload: PushPayload = serde_json::from_value(json!({
            "title": "Invoice paid",
            "body": "INV-1042 was paid",
            "primaryKey": 1042
        }))
        .unwrap();

        let notification = f.worker.push(Some(payload));
        assert_eq!(notification.title, "Invoice paid");
        assert_eq!(notification.primary_key.as_deref(), Some("1042"));
        assert_eq!(f.worker.notification_click(&notification), "/?notification=1042");

        let odd = f.worker.push(Some(PushPayload {
            primary_key: Some(json!("a&b#c")),
            ..PushPayload::default()
        }));
        assert_eq!(f.worker.notification_click(&odd), "/?notification=a%26b%23c");

        let empty = f.worker.push(None);
        assert_eq!(empty.title, DEFAULT_NOTIFICATION_TITLE);
        assert_eq!(f.worker.notification_click(&empty), "/");
    }
}
