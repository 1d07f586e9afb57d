//! Specimen photograph lookup
//!
//! Photos live in a blob store named `<catalog with _>_<d|v>.<ext>`. Each
//! candidate is probed with a HEAD request; the first 200 wins. Failures and
//! misses degrade to the `"no data"` sentinel. Only lookups where both views
//! were found are cached, for a bounded time and up to a bounded count, so a
//! photo uploaded later shows up on the next request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

/// Placeholder for a view with no photograph.
pub const NO_DATA: &str = "no data";

/// Most catalog numbers kept in the cache.
const CACHE_CAPACITY: usize = 4096;

/// How long a cached hit is trusted.
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Extensions tried, in order.
const EXTENSIONS: [&str; 4] = ["jpg", "JPG", "jpeg", "JPEG"];

/// Dorsal and ventral photo URLs, or [`NO_DATA`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecimenImages {
    pub dorsal: String,
    pub ventral: String,
}

impl SpecimenImages {
    pub fn missing() -> Self {
        Self {
            dorsal: NO_DATA.to_owned(),
            ventral: NO_DATA.to_owned(),
        }
    }

    /// Both views were found.
    pub fn is_complete(&self) -> bool {
        self.dorsal != NO_DATA && self.ventral != NO_DATA
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dorsal,
    Ventral,
}

impl View {
    fn suffix(self) -> &'static str {
        match self {
            Self::Dorsal => "d",
            Self::Ventral => "v",
        }
    }
}

/// URLs to try for one view of `catalog`, in order.
pub fn candidate_urls(base_url: &str, catalog: &str, view: View) -> Vec<String> {
    let base = base_url.trim_end_matches('/');
    let stem = catalog.trim().replace('-', "_");
    EXTENSIONS
        .iter()
        .map(|ext| format!("{base}/{stem}_{}.{ext}", view.suffix()))
        .collect()
}

/// Existence check for one URL.
#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn exists(&self, url: &str) -> bool;
}

/// HEAD requests with a per-request timeout.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn exists(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!(url, error = %e, "image probe failed");
                false
            }
        }
    }
}

struct CachedImages {
    images: SpecimenImages,
    stored_at: Instant,
}

/// Finds and caches photo URLs.
pub struct ImageLocator {
    base_url: Option<String>,
    probe: Arc<dyn UrlProbe>,
    capacity: usize,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedImages>>,
}

impl ImageLocator {
    /// `base_url = None` disables probing; every lookup is [`NO_DATA`].
    pub fn new(base_url: Option<String>, probe: Arc<dyn UrlProbe>) -> Self {
        Self::with_limits(base_url, probe, CACHE_CAPACITY, CACHE_TTL)
    }

    pub fn with_limits(
        base_url: Option<String>,
        probe: Arc<dyn UrlProbe>,
        capacity: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            base_url: base_url.filter(|u| !u.trim().is_empty()),
            probe,
            capacity,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Arc::new(NeverFound))
    }

    pub async fn images_for(&self, catalog: &str) -> SpecimenImages {
        let Some(base) = self.base_url.as_deref() else {
            return SpecimenImages::missing();
        };
        if catalog.trim().is_empty() {
            return SpecimenImages::missing();
        }
        if let Some(hit) = self.cached(catalog).await {
            return hit;
        }

        let images = SpecimenImages {
            dorsal: self.find(base, catalog, View::Dorsal).await,
            ventral: self.find(base, catalog, View::Ventral).await,
        };
        tracing::debug!(catalog, dorsal = %images.dorsal, ventral = %images.ventral, "resolved specimen images");
        if images.is_complete() {
            self.remember(catalog, &images).await;
        }
        images
    }

    /// Number of cached catalog numbers, expired entries included.
    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn cached(&self, catalog: &str) -> Option<SpecimenImages> {
        let cache = self.cache.read().await;
        let entry = cache.get(catalog)?;
        (entry.stored_at.elapsed() < self.ttl).then(|| entry.images.clone())
    }

    async fn remember(&self, catalog: &str, images: &SpecimenImages) {
        if self.capacity == 0 {
            return;
        }
        let mut cache = self.cache.write().await;
        let ttl = self.ttl;
        cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        if cache.len() >= self.capacity && !cache.contains_key(catalog) {
            let oldest = cache
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                cache.remove(&key);
            }
        }
        cache.insert(
            catalog.to_owned(),
            CachedImages {
                images: images.clone(),
                stored_at: Instant::now(),
            },
        );
    }

    async fn find(&self, base: &str, catalog: &str, view: View) -> String {
        for url in candidate_urls(base, catalog, view) {
            if self.probe.exists(&url).await {
                return url;
            }
        }
        NO_DATA.to_owned()
    }
}

struct NeverFound;

#[async_trait]
impl UrlProbe for NeverFound {
    async fn exists(&self, _url: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProbe {
        present: HashSet<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UrlProbe for FakeProbe {
        async fn exists(&self, url: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.present.contains(url)
        }
    }

    const BASE: &str = "https://photos.example.org/adults/";

    #[test]
    fn candidates_follow_naming_convention() {
        let urls = candidate_urls(BASE, "2023-KL-0001", View::Dorsal);
        assert_eq!(
            urls,
            vec![
                "https://photos.example.org/adults/2023_KL_0001_d.jpg",
                "https://photos.example.org/adults/2023_KL_0001_d.JPG",
                "https://photos.example.org/adults/2023_KL_0001_d.jpeg",
                "https://photos.example.org/adults/2023_KL_0001_d.JPEG",
            ]
        );
    }

    fn probe_with(present: &[&str]) -> Arc<FakeProbe> {
        Arc::new(FakeProbe {
            present: present.iter().map(|u| u.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn first_hit_wins_and_misses_degrade() {
        let probe = probe_with(&[
            "https://photos.example.org/adults/2023_KL_0001_d.jpeg",
            "https://photos.example.org/adults/2023_KL_0001_d.JPEG",
        ]);
        let locator = ImageLocator::new(Some(BASE.into()), probe.clone());

        let images = locator.images_for("2023-KL-0001").await;
        assert_eq!(images.dorsal, "https://photos.example.org/adults/2023_KL_0001_d.jpeg");
        assert_eq!(images.ventral, NO_DATA);
        // 3 dorsal probes + 4 ventral probes
        assert_eq!(probe.calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn complete_hits_are_cached() {
        let probe = probe_with(&[
            "https://photos.example.org/adults/2023_KL_0001_d.jpg",
            "https://photos.example.org/adults/2023_KL_0001_v.jpg",
        ]);
        let locator = ImageLocator::new(Some(BASE.into()), probe.clone());

        let first = locator.images_for("2023-KL-0001").await;
        assert!(first.is_complete());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);

        assert_eq!(locator.images_for("2023-KL-0001").await, first);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2, "second lookup is cached");
    }

    #[tokio::test]
    async fn misses_are_probed_again() {
        let probe = probe_with(&[]);
        let locator = ImageLocator::new(Some(BASE.into()), probe.clone());

        for i in 0..100 {
            locator.images_for(&format!("junk-{i}")).await;
        }
        locator.images_for("junk-0").await;

        assert_eq!(locator.cached_len().await, 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 101 * 8);
    }

    #[tokio::test]
    async fn cache_is_bounded_and_expires() {
        let present: Vec<String> = (0..5)
            .flat_map(|i| {
                [
                    format!("{BASE}2023_KL_000{i}_d.jpg"),
                    format!("{BASE}2023_KL_000{i}_v.jpg"),
                ]
            })
            .collect();
        let present: Vec<&str> = present.iter().map(String::as_str).collect();
        let probe = probe_with(&present);

        let locator = ImageLocator::with_limits(Some(BASE.into()), probe.clone(), 3, CACHE_TTL);
        for i in 0..5 {
            locator.images_for(&format!("2023-KL-000{i}")).await;
        }
        assert_eq!(locator.cached_len().await, 3);

        let expiring = ImageLocator::with_limits(Some(BASE.into()), probe.clone(), 3, Duration::ZERO);
        expiring.images_for("2023-KL-0001").await;
        let calls = probe.calls.load(Ordering::SeqCst);
        expiring.images_for("2023-KL-0001").await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls + 2, "expired entry is probed again");
    }

    #[tokio::test]
    async fn disabled_locator_never_probes() {
        let locator = ImageLocator::disabled();
        assert_eq!(locator.images_for("2023-KL-0001").await, SpecimenImages::missing());
    }
}
