//! # Cache Router
//!
//! The strategies themselves, plus the install/activate lifecycle.
//!
//! ## Strategy Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CacheRouter.handle()                             │
//! │                                                                         │
//! │  non-GET or non-http ──────────────────────────► passthrough fetch     │
//! │                                                                         │
//! │  StaticAsset / CacheableApi (cache-first)                              │
//! │  ────────────────────────────────────────                              │
//! │  hit?  ──► serve cached copy now ──► revalidate in the background      │
//! │  miss? ──► fetch ──► 2xx: store + serve │ offline: structured 503      │
//! │                                                                         │
//! │  LiveApi (network-first)                                               │
//! │  ───────────────────────                                               │
//! │  fetch ──► 2xx: store + serve │ non-2xx: serve uncached                │
//! │        └─► offline: cached copy marked stale │ else structured 503     │
//! │                                                                         │
//! │  Navigation (app-shell fallback)                                       │
//! │  ───────────────────────────────                                       │
//! │  fetch ──► serve │ offline: shell doc ──► offline doc ──► text 503     │
//! │                                                                         │
//! │  Other (network-first, generic offline)                                │
//! │  ──────────────────────────────────────                                │
//! │  fetch ──► serve │ offline: structured 503 (no cache read)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only network-shaped failures activate fallbacks; local errors propagate
//! to the caller unchanged. Only 2xx responses are ever written to a
//! partition.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::classify::{classify, RequestClass};
use crate::config::RouterConfig;
use crate::entry::{normalize_url, CacheEntry, PartitionKind};
use crate::error::CacheResult;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::request::{FetchRequest, FetchResponse, ResponseSource};
use crate::store::CacheStore;

// =============================================================================
// Install Report
// =============================================================================

/// Outcome of an install pass.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Number of URLs now present in the cache.
    pub precached: usize,

    /// URLs that could not be precached (non-2xx or fetch failure).
    pub failed: Vec<String>,
}

// =============================================================================
// Cache Router
// =============================================================================

/// Serves requests through the strategy table above.
///
/// Cheap to clone; clones share the store and fetcher, which is how
/// background revalidation tasks keep working after `handle` returns.
#[derive(Clone)]
pub struct CacheRouter {
    config: Arc<RouterConfig>,
    store: Arc<RwLock<CacheStore>>,
    fetcher: Arc<dyn Fetcher>,
}

impl CacheRouter {
    /// Opens the partition store for the configured build tag and wires in
    /// a fetcher.
    pub async fn new(config: RouterConfig, fetcher: Arc<dyn Fetcher>) -> CacheResult<Self> {
        config.validate()?;
        let store = CacheStore::open(&config.cache_root, &config.build_tag).await?;
        Ok(CacheRouter {
            config: Arc::new(config),
            store: Arc::new(RwLock::new(store)),
            fetcher,
        })
    }

    /// Convenience constructor with the production HTTP fetcher.
    pub async fn with_http_fetcher(config: RouterConfig) -> CacheResult<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout())?);
        Self::new(config, fetcher).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Precaches the shell assets into the static partition and the offline
    /// document into the fallback partition.
    ///
    /// Individual failures are reported, not fatal: a missing icon must not
    /// block the install.
    pub async fn install(&self) -> CacheResult<InstallReport> {
        let mut precached = 0usize;
        let mut failed = Vec::new();

        let mut shell: Vec<&str> = self.config.shell_assets.iter().map(|s| s.as_str()).collect();
        let shell_document = self.config.shell_document.as_str();
        if !shell_document.is_empty() && !shell.contains(&shell_document) {
            shell.push(shell_document);
        }

        for url in shell {
            match self.precache(url, PartitionKind::Static).await {
                Ok(true) => precached += 1,
                Ok(false) => {
                    warn!(url = %url, "shell asset responded non-2xx, not cached");
                    failed.push(url.to_string());
                }
                Err(err) => {
                    warn!(url = %url, error = %err, "shell asset precache failed");
                    failed.push(url.to_string());
                }
            }
        }

        let offline_document = self.config.offline_document.as_str();
        if !offline_document.is_empty() {
            match self
                .precache(offline_document, PartitionKind::OfflineFallback)
                .await
            {
                Ok(true) => precached += 1,
                Ok(false) => {
                    warn!(url = %offline_document, "offline document responded non-2xx");
                    failed.push(offline_document.to_string());
                }
                Err(err) => {
                    warn!(url = %offline_document, error = %err, "offline document precache failed");
                    failed.push(offline_document.to_string());
                }
            }
        }

        info!(
            build_tag = %self.config.build_tag,
            precached,
            failed = failed.len(),
            "cache install complete"
        );
        Ok(InstallReport { precached, failed })
    }

    /// Prunes partitions belonging to other build tags. Run once the new
    /// generation is ready to take over.
    pub async fn activate(&self) -> CacheResult<Vec<String>> {
        let mut store = self.store.write().await;
        let removed = store.activate().await?;
        info!(
            build_tag = %store.build_tag(),
            removed = removed.len(),
            "cache partitions activated"
        );
        Ok(removed)
    }

    async fn precache(&self, url: &str, kind: PartitionKind) -> CacheResult<bool> {
        let key = normalize_url(url)?;
        let response = self.fetcher.fetch(&FetchRequest::get(url)).await?;
        if !response.is_success() {
            return Ok(false);
        }
        let entry = CacheEntry::capture(&key, &response);
        self.store.write().await.put(kind, entry).await;
        Ok(true)
    }

    // =========================================================================
    // Request Handling
    // =========================================================================

    /// Routes one request through its strategy.
    pub async fn handle(&self, request: FetchRequest) -> CacheResult<FetchResponse> {
        if !request.is_get() || !request.is_http() {
            // Not intercepted: no caching, no fallbacks, errors propagate.
            return self.fetcher.fetch(&request).await;
        }

        let class = classify(&request, &self.config);
        debug!(url = %request.url, class = %class, "routing request");
        match class {
            RequestClass::StaticAsset => self.cache_first(request, PartitionKind::Static).await,
            RequestClass::CacheableApi => self.cache_first(request, PartitionKind::Dynamic).await,
            RequestClass::LiveApi => self.network_first(request).await,
            RequestClass::Navigation => self.navigate(request).await,
            RequestClass::Other => self.network_only(request).await,
        }
    }

    // =========================================================================
    // Strategies
    // =========================================================================

    /// Cache-first with background revalidation.
    async fn cache_first(
        &self,
        request: FetchRequest,
        kind: PartitionKind,
    ) -> CacheResult<FetchResponse> {
        let key = normalize_url(&request.url)?;

        let cached = self
            .store
            .read()
            .await
            .get(kind, &key)
            .map(|entry| entry.to_response(ResponseSource::Cache));
        if let Some(response) = cached {
            // Serve the hit now; the refresh happens off the request path.
            let router = self.clone();
            tokio::spawn(async move {
                router.revalidate(&request, kind).await;
            });
            return Ok(response);
        }

        match self.fetch_and_store(&request, kind, &key).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_network() => {
                debug!(url = %request.url, error = %err, "offline cache miss");
                Ok(FetchResponse::offline_json("resource unavailable offline"))
            }
            Err(err) => Err(err),
        }
    }

    /// Refreshes a cached entry from the network. 2xx overwrites the entry;
    /// anything else leaves it untouched.
    pub(crate) async fn revalidate(&self, request: &FetchRequest, kind: PartitionKind) {
        let key = match normalize_url(&request.url) {
            Ok(key) => key,
            Err(_) => return,
        };
        match self.fetch_and_store(request, kind, &key).await {
            Ok(response) if response.is_success() => {
                debug!(url = %request.url, "cached copy revalidated");
            }
            Ok(response) => {
                debug!(
                    url = %request.url,
                    status = response.status,
                    "revalidation response not cacheable, keeping cached copy"
                );
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "revalidation failed, keeping cached copy");
            }
        }
    }

    /// Network-first with stale-cache fallback, for live API data.
    async fn network_first(&self, request: FetchRequest) -> CacheResult<FetchResponse> {
        let key = normalize_url(&request.url)?;

        match self
            .fetch_and_store(&request, PartitionKind::Dynamic, &key)
            .await
        {
            Ok(response) => Ok(response),
            Err(err) if err.is_network() => {
                let cached = self
                    .store
                    .read()
                    .await
                    .get(PartitionKind::Dynamic, &key)
                    .map(|entry| entry.to_response(ResponseSource::Cache));
                match cached {
                    Some(response) => {
                        warn!(url = %request.url, error = %err, "live fetch failed, serving stale copy");
                        Ok(response.into_stale())
                    }
                    None => Ok(FetchResponse::offline_json("live data unavailable offline")),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Network-first with app-shell fallback, for navigations.
    async fn navigate(&self, request: FetchRequest) -> CacheResult<FetchResponse> {
        match self.fetcher.fetch(&request).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_network() => {
                warn!(url = %request.url, error = %err, "offline navigation, serving app shell");
                Ok(self.shell_fallback().await)
            }
            Err(err) => Err(err),
        }
    }

    /// Fallback chain for offline navigations: shell document, then offline
    /// document, then a plain-text 503.
    async fn shell_fallback(&self) -> FetchResponse {
        let store = self.store.read().await;
        if let Ok(key) = normalize_url(&self.config.shell_document) {
            if let Some(entry) = store.get(PartitionKind::Static, &key) {
                return entry.to_response(ResponseSource::Fallback);
            }
        }
        if let Ok(key) = normalize_url(&self.config.offline_document) {
            if let Some(entry) = store.get(PartitionKind::OfflineFallback, &key) {
                return entry.to_response(ResponseSource::Fallback);
            }
        }
        FetchResponse::offline_text()
    }

    /// Network-first with a generic offline response; no cache involvement.
    async fn network_only(&self, request: FetchRequest) -> CacheResult<FetchResponse> {
        match self.fetcher.fetch(&request).await {
            Ok(response) => Ok(response),
            Err(err) if err.is_network() => Ok(FetchResponse::offline_json("offline")),
            Err(err) => Err(err),
        }
    }

    /// Fetches and, when the response is 2xx, writes it through to `kind`.
    async fn fetch_and_store(
        &self,
        request: &FetchRequest,
        kind: PartitionKind,
        key: &str,
    ) -> CacheResult<FetchResponse> {
        let response = self.fetcher.fetch(request).await?;
        if response.is_success() {
            let entry = CacheEntry::capture(key, &response);
            self.store.write().await.put(kind, entry).await;
        }
        Ok(response)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::task::yield_now;

    const ORIGIN: &str = "https://aisle.example.com";

    /// Scripted fetcher: canned responses per URL, an offline switch, and a
    /// call counter. Unknown URLs get a 404.
    struct ScriptedFetcher {
        responses: Mutex<HashMap<String, (u16, Vec<u8>)>>,
        offline: AtomicBool,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new() -> Arc<Self> {
            Arc::new(ScriptedFetcher {
                responses: Mutex::new(HashMap::new()),
                offline: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            })
        }

        fn serve(&self, url: &str, status: u16, body: &[u8]) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), (status, body.to_vec()));
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> CacheResult<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(CacheError::Network("offline".into()));
            }
            let responses = self.responses.lock().unwrap();
            match responses.get(&request.url) {
                Some((status, body)) => Ok(FetchResponse::network(*status, vec![], body.clone())),
                None => Ok(FetchResponse::network(404, vec![], b"not found".to_vec())),
            }
        }
    }

    /// Fetcher whose futures never resolve; proves a code path does not
    /// await the network.
    struct BlockedFetcher;

    #[async_trait]
    impl Fetcher for BlockedFetcher {
        async fn fetch(&self, _request: &FetchRequest) -> CacheResult<FetchResponse> {
            std::future::pending::<CacheResult<FetchResponse>>().await
        }
    }

    async fn router_with(fetcher: Arc<dyn Fetcher>) -> (CacheRouter, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RouterConfig::for_origin("v1", ORIGIN);
        config.cache_root = dir.path().to_path_buf();
        let router = CacheRouter::new(config, fetcher).await.unwrap();
        (router, dir)
    }

    async fn seed(router: &CacheRouter, kind: PartitionKind, url: &str, body: &[u8]) {
        let entry = CacheEntry::capture(url, &FetchResponse::network(200, vec![], body.to_vec()));
        router.store.write().await.put(kind, entry).await;
    }

    #[tokio::test]
    async fn test_cache_hit_returns_without_awaiting_network() {
        let (router, _dir) = router_with(Arc::new(BlockedFetcher)).await;
        seed(&router, PartitionKind::Static, "https://aisle.example.com/app.js", b"js").await;

        let response = tokio::time::timeout(
            Duration::from_millis(200),
            router.handle(FetchRequest::get("https://aisle.example.com/app.js")),
        )
        .await
        .expect("cache hit must not wait for the network")
        .unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"js");
        assert!(!response.stale);
    }

    #[tokio::test]
    async fn test_cache_miss_fetches_and_stores() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("https://aisle.example.com/api/products", 200, br#"[{"id":1}]"#);
        let (router, _dir) = router_with(fetcher.clone()).await;

        let response = router
            .handle(FetchRequest::get("https://aisle.example.com/api/products"))
            .await
            .unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(fetcher.calls(), 1);

        let store = router.store.read().await;
        assert!(store
            .get(PartitionKind::Dynamic, "https://aisle.example.com/api/products")
            .is_some());
    }

    #[tokio::test]
    async fn test_background_revalidation_refreshes_entry() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("https://aisle.example.com/app.js", 200, b"v2");
        let (router, _dir) = router_with(fetcher.clone()).await;
        seed(&router, PartitionKind::Static, "https://aisle.example.com/app.js", b"v1").await;

        let response = router
            .handle(FetchRequest::get("https://aisle.example.com/app.js"))
            .await
            .unwrap();
        // The stale-while-revalidate contract: the caller sees the old copy.
        assert_eq!(response.body, b"v1");

        // Let the spawned revalidation task run (current-thread runtime).
        for _ in 0..10 {
            yield_now().await;
        }
        assert_eq!(fetcher.calls(), 1);
        let store = router.store.read().await;
        let entry = store
            .get(PartitionKind::Static, "https://aisle.example.com/app.js")
            .unwrap();
        assert_eq!(entry.body, b"v2");
    }

    #[tokio::test]
    async fn test_revalidate_keeps_entry_on_non_success() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("https://aisle.example.com/api/stores", 500, b"boom");
        let (router, _dir) = router_with(fetcher.clone()).await;
        seed(&router, PartitionKind::Dynamic, "https://aisle.example.com/api/stores", b"good").await;

        let request = FetchRequest::get("https://aisle.example.com/api/stores");
        router.revalidate(&request, PartitionKind::Dynamic).await;

        let store = router.store.read().await;
        let entry = store
            .get(PartitionKind::Dynamic, "https://aisle.example.com/api/stores")
            .unwrap();
        assert_eq!(entry.body, b"good");
    }

    #[tokio::test]
    async fn test_offline_cache_miss_is_structured_503() {
        let fetcher = ScriptedFetcher::new();
        fetcher.set_offline(true);
        let (router, _dir) = router_with(fetcher).await;

        let response = router
            .handle(FetchRequest::get("https://aisle.example.com/api/products"))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Fallback);
        let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed["offline"], serde_json::Value::Bool(true));
    }

    #[tokio::test]
    async fn test_live_api_serves_stale_copy_when_offline() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("https://aisle.example.com/api/auth/session", 200, b"fresh");
        let (router, _dir) = router_with(fetcher.clone()).await;

        // Warm the cache online.
        let first = router
            .handle(FetchRequest::get("https://aisle.example.com/api/auth/session"))
            .await
            .unwrap();
        assert_eq!(first.source, ResponseSource::Network);

        // Then lose the network.
        fetcher.set_offline(true);
        let second = router
            .handle(FetchRequest::get("https://aisle.example.com/api/auth/session"))
            .await
            .unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert!(second.stale);
        assert_eq!(second.body, b"fresh");
        assert_eq!(second.header(crate::STALE_HEADER), Some(crate::STALE_HEADER_VALUE));
    }

    #[tokio::test]
    async fn test_live_api_offline_without_cache_is_structured_503() {
        let fetcher = ScriptedFetcher::new();
        fetcher.set_offline(true);
        let (router, _dir) = router_with(fetcher).await;

        let response = router
            .handle(FetchRequest::get("https://aisle.example.com/api/sync/state"))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        let parsed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(parsed["offline"], serde_json::Value::Bool(true));
    }

    #[tokio::test]
    async fn test_non_success_is_returned_but_never_cached() {
        let fetcher = ScriptedFetcher::new();
        let (router, _dir) = router_with(fetcher).await;

        let response = router
            .handle(FetchRequest::get("https://aisle.example.com/api/products"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);

        let store = router.store.read().await;
        assert_eq!(store.len(PartitionKind::Dynamic), 0);
    }

    #[tokio::test]
    async fn test_navigation_fallback_chain() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("https://aisle.example.com/index.html", 200, b"<shell>");
        fetcher.serve("https://aisle.example.com/manifest.webmanifest", 200, b"{}");
        fetcher.serve("https://aisle.example.com/offline.html", 200, b"<offline>");
        let (router, _dir) = router_with(fetcher.clone()).await;

        let report = router.install().await.unwrap();
        assert_eq!(report.precached, 3);
        assert!(report.failed.is_empty());

        fetcher.set_offline(true);
        let nav = FetchRequest::get("https://aisle.example.com/stores/3")
            .with_header("Accept", "text/html");

        // 1. Shell document.
        let response = router.handle(nav.clone()).await.unwrap();
        assert_eq!(response.body, b"<shell>");
        assert_eq!(response.source, ResponseSource::Fallback);

        // 2. Without the shell, the offline document.
        router
            .store
            .write()
            .await
            .remove(PartitionKind::Static, "https://aisle.example.com/index.html")
            .await;
        let response = router.handle(nav.clone()).await.unwrap();
        assert_eq!(response.body, b"<offline>");

        // 3. With nothing cached, the plain-text 503.
        router
            .store
            .write()
            .await
            .remove(
                PartitionKind::OfflineFallback,
                "https://aisle.example.com/offline.html",
            )
            .await;
        let response = router.handle(nav).await.unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.body, b"Offline");
    }

    #[tokio::test]
    async fn test_install_reports_failures() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("https://aisle.example.com/index.html", 200, b"<shell>");
        // manifest and offline.html fall through to the scripted 404
        let (router, _dir) = router_with(fetcher).await;

        let report = router.install().await.unwrap();
        assert_eq!(report.precached, 1);
        assert_eq!(report.failed.len(), 2);
        assert!(report
            .failed
            .contains(&"https://aisle.example.com/offline.html".to_string()));
    }

    #[tokio::test]
    async fn test_passthrough_for_non_get() {
        let fetcher = ScriptedFetcher::new();
        fetcher.set_offline(true);
        let (router, _dir) = router_with(fetcher.clone()).await;

        let post = FetchRequest {
            method: "POST".to_string(),
            ..FetchRequest::get("https://aisle.example.com/api/crowdsource")
        };
        // No interception: the network error propagates instead of turning
        // into an offline fallback.
        let result = router.handle(post).await;
        assert!(matches!(result, Err(CacheError::Network(_))));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_passthrough_for_non_http_scheme() {
        let fetcher = ScriptedFetcher::new();
        let (router, _dir) = router_with(fetcher.clone()).await;

        let response = router
            .handle(FetchRequest::get("chrome-extension://abc/def.js"))
            .await
            .unwrap();
        // Forwarded verbatim, never cached.
        assert_eq!(response.status, 404);
        let store = router.store.read().await;
        assert_eq!(store.len(PartitionKind::Static), 0);
    }

    #[tokio::test]
    async fn test_other_requests_never_read_the_cache() {
        let fetcher = ScriptedFetcher::new();
        let (router, _dir) = router_with(fetcher.clone()).await;

        // A cached copy exists, but the generic strategy must not consult it.
        seed(&router, PartitionKind::Dynamic, "https://aisle.example.com/stores/3", b"cached").await;
        fetcher.set_offline(true);

        let response = router
            .handle(FetchRequest::get("https://aisle.example.com/stores/3"))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Fallback);
        assert_ne!(response.body, b"cached");
    }

    #[tokio::test]
    async fn test_activate_removes_previous_generation() {
        let fetcher = ScriptedFetcher::new();
        let dir = tempfile::tempdir().unwrap();

        // A previous generation left its partitions behind.
        CacheStore::open(dir.path(), "v0").await.unwrap();

        let mut config = RouterConfig::for_origin("v1", ORIGIN);
        config.cache_root = dir.path().to_path_buf();
        let router = CacheRouter::new(config, fetcher).await.unwrap();

        let removed = router.activate().await.unwrap();
        assert_eq!(removed.len(), 3);
        assert!(removed.iter().all(|name| name.ends_with("-v0")));
    }
}
