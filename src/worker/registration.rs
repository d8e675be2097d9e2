//! Wiring of the cache-first handlers into a worker host

use crate::cache::CacheStorage;
use crate::config::schema::WorkerConfig;
use crate::error::{PrecacheError, PrecacheResult};
use crate::network::{Fetcher, Request};
use crate::worker::host::WorkerHost;
use crate::worker::installer::{InstallProgress, Installer};
use crate::worker::interceptor::FetchInterceptor;
use futures_util::FutureExt;
use std::sync::Arc;
use url::Url;

/// Resolve root-relative asset paths against the worker's origin
pub fn resolve_assets(origin: &Url, assets: &[String]) -> PrecacheResult<Vec<Url>> {
    assets
        .iter()
        .map(|path| {
            origin.join(path).map_err(|e| PrecacheError::InvalidUrl {
                url: path.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Parse the configured origin
pub fn parse_origin(origin: &str) -> PrecacheResult<Url> {
    let url = Url::parse(origin).map_err(|e| PrecacheError::InvalidUrl {
        url: origin.to_string(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(PrecacheError::InvalidUrl {
            url: origin.to_string(),
            reason: "origin must be an http(s) URL".to_string(),
        });
    }
    Ok(url)
}

/// The cache-first worker: one installer and one interceptor sharing a bucket name
pub struct CacheFirstWorker {
    installer: Arc<Installer>,
    interceptor: Arc<FetchInterceptor>,
}

impl CacheFirstWorker {
    pub fn new(installer: Installer, interceptor: FetchInterceptor) -> Self {
        Self {
            installer: Arc::new(installer),
            interceptor: Arc::new(interceptor),
        }
    }

    /// Build both handlers from worker configuration
    pub fn from_config(
        config: &WorkerConfig,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
        progress: Arc<dyn InstallProgress>,
    ) -> PrecacheResult<Self> {
        let origin = parse_origin(&config.origin)?;
        let assets = resolve_assets(&origin, &config.assets)?;

        let installer = Installer::new(
            config.cache_name.clone(),
            assets,
            storage.clone(),
            Arc::clone(&fetcher),
        )
        .with_policy(config.on_partial_failure)
        .with_progress(progress);
        let interceptor = FetchInterceptor::new(config.cache_name.clone(), storage, fetcher);

        Ok(Self::new(installer, interceptor))
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    pub fn interceptor(&self) -> &FetchInterceptor {
        &self.interceptor
    }

    /// Attach the install and fetch handlers to a host
    pub fn register(&self, host: &mut WorkerHost) {
        let installer = Arc::clone(&self.installer);
        host.on_install(Arc::new(move || {
            let installer = Arc::clone(&installer);
            async move { installer.install().await.map(|_| ()) }.boxed()
        }));

        let interceptor = Arc::clone(&self.interceptor);
        host.on_fetch(Arc::new(move |request: Request| {
            let interceptor = Arc::clone(&interceptor);
            async move {
                interceptor
                    .intercept(&request)
                    .await
                    .map(|intercepted| intercepted.response)
            }
            .boxed()
        }));
    }
}
