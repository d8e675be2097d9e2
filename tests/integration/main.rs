//! Integration tests for precache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn precache(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("precache");
        cmd.env("PRECACHE_CONFIG", config_dir.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        precache(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage: precache"))
            .stdout(predicate::str::contains("install"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        precache(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("precache"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        precache(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        precache(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[worker]"))
            .stdout(predicate::str::contains("ai-music-gen-v1"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        precache(&temp).args(["config", "init"]).assert().success();
        assert!(temp.path().join("config.toml").exists());

        precache(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn config_init_force_replaces_unparseable_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[worker\ncache_name = ").unwrap();

        precache(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));

        precache(&temp)
            .args(["config", "init", "--force"])
            .assert()
            .success();

        precache(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ai-music-gen-v1"));
    }

    #[test]
    fn missing_config_logged_at_debug() {
        let temp = TempDir::new().unwrap();
        precache(&temp)
            .args(["-vv", "config", "show"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Config file not found"));
    }

    #[test]
    fn invalid_config_reports_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            "[worker]\nassets = [\"/\", \"/\"]\n",
        )
        .unwrap();

        precache(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("twice"));
    }

    #[test]
    fn cache_show_missing_bucket() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            format!(
                "[storage]\ndir = {:?}\n",
                temp.path().join("caches").display().to_string()
            ),
        )
        .unwrap();

        precache(&temp)
            .args(["cache", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cache bucket not found"))
            .stderr(predicate::str::contains("precache install"));
    }
}

mod http_fetcher_tests {
    use precache::error::PrecacheError;
    use precache::network::{Fetcher, HttpFetcher, Method, Request};
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), "precache-test")
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&server.uri()).unwrap().join(p).unwrap()
    }

    #[tokio::test]
    async fn fetch_returns_full_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/static/style.css"))
            .and(header("user-agent", "precache-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("body { color: red }")
                    .insert_header("content-type", "text/css"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = fetcher()
            .fetch(&Request::get(url(&server, "/static/style.css")))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.header("Content-Type"), Some("text/css"));
        assert_eq!(response.body, b"body { color: red }");
    }

    #[tokio::test]
    async fn non_success_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
            .mount(&server)
            .await;

        let response = fetcher()
            .fetch(&Request::get(url(&server, "/missing")))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.ok());
        assert_eq!(response.body, b"not here");
    }

    #[tokio::test]
    async fn post_sends_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(header("x-session", "abc"))
            .and(body_string("{\"prompt\":\"lofi\"}"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let request = Request::new(Method::Post, url(&server, "/api/generate"))
            .with_header("X-Session", "abc")
            .with_body(b"{\"prompt\":\"lofi\"}".to_vec());
        let response = fetcher().fetch(&request).await.unwrap();

        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn delete_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/tracks/7"))
            .and(body_string("{\"reason\":\"dup\"}"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let request = Request::new(Method::Delete, url(&server, "/api/tracks/7"))
            .with_body(b"{\"reason\":\"dup\"}".to_vec());
        let response = fetcher().fetch(&request).await.unwrap();

        assert_eq!(response.status, 204);
    }

    #[tokio::test]
    async fn options_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("OPTIONS"))
            .and(path("/api"))
            .and(body_string("preflight"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let request =
            Request::new(Method::Options, url(&server, "/api")).with_body(b"preflight".to_vec());
        let response = fetcher().fetch(&request).await.unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn body_over_ten_mebibytes_is_read_whole() {
        let server = MockServer::start().await;
        let audio = vec![7u8; 10 * 1024 * 1024 + 98_284];
        Mock::given(method("GET"))
            .and(path("/static/song.wav"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(audio.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let response = fetcher()
            .fetch(&Request::get(url(&server, "/static/song.wav")))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body.len(), audio.len());
    }

    #[tokio::test]
    async fn body_limit_is_enforced_when_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/static/song.wav"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let result = fetcher()
            .with_body_limit(1024)
            .fetch(&Request::get(url(&server, "/static/song.wav")))
            .await;

        assert!(matches!(result, Err(PrecacheError::Network { .. })));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let request = Request::get(Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap());

        let result = fetcher().fetch(&request).await;
        assert!(matches!(result, Err(PrecacheError::Network { .. })));
    }
}

mod worker_tests {
    use async_trait::async_trait;
    use precache::cache::CacheStorage;
    use precache::config::schema::WorkerConfig;
    use precache::network::{Fetcher, HttpFetcher, Request, Response};
    use precache::worker::{
        CacheFirstWorker, FetchInterceptor, Installer, NoProgress, PartialFailurePolicy,
        ResponseSource, WorkerContainer, WorkerHost, WorkerState,
    };
    use precache::PrecacheResult;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ASSETS: [(&str, &str); 3] = [
        ("/", "<html>index</html>"),
        ("/static/style.css", "body {}"),
        ("/static/manifest.json", "{\"name\":\"music\"}"),
    ];

    async fn serve_assets(server: &MockServer, expected: u64) {
        for (p, body) in ASSETS {
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .expect(expected)
                .mount(server)
                .await;
        }
    }

    fn fetcher() -> Arc<dyn Fetcher> {
        Arc::new(HttpFetcher::new(Duration::from_secs(5), "precache-test"))
    }

    fn worker_config(server: &MockServer) -> WorkerConfig {
        WorkerConfig {
            origin: server.uri(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn install_then_serve_from_disk() {
        let server = MockServer::start().await;
        serve_assets(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/static/other.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("live"))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let storage = CacheStorage::disk(temp.path());
        let fetcher = fetcher();
        let worker = CacheFirstWorker::from_config(
            &worker_config(&server),
            storage.clone(),
            Arc::clone(&fetcher),
            Arc::new(NoProgress),
        )
        .unwrap();

        let mut host = WorkerHost::new("ai-music-gen-v1", Arc::clone(&fetcher));
        worker.register(&mut host);
        let host = Arc::new(host);
        let container = WorkerContainer::new(fetcher);
        container.register(Arc::clone(&host)).await.unwrap();
        assert_eq!(host.state(), WorkerState::Activated);

        let base = Url::parse(&server.uri()).unwrap();
        let css = container
            .fetch(Request::get(base.join("/static/style.css").unwrap()))
            .await
            .unwrap();
        assert_eq!(css.body, b"body {}");

        let other = container
            .fetch(Request::get(base.join("/static/other.js").unwrap()))
            .await
            .unwrap();
        assert_eq!(other.body, b"live");

        // A fresh storage handle over the same directory sees the same bucket
        let reopened = CacheStorage::disk(temp.path());
        let bucket = reopened.existing("ai-music-gen-v1").await.unwrap();
        let keys: Vec<String> = bucket
            .keys()
            .await
            .unwrap()
            .iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(keys.len(), 3);
        for (p, _) in ASSETS {
            assert!(keys.contains(&base.join(p).unwrap().to_string()));
        }
    }

    #[tokio::test]
    async fn failed_asset_fails_install_and_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("index"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/static/style.css"))
            .respond_with(ResponseTemplate::new(200).set_body_string("css"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/static/manifest.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let storage = CacheStorage::disk(temp.path());
        let fetcher = fetcher();
        let worker = CacheFirstWorker::from_config(
            &worker_config(&server),
            storage.clone(),
            Arc::clone(&fetcher),
            Arc::new(NoProgress),
        )
        .unwrap();

        let mut host = WorkerHost::new("ai-music-gen-v1", Arc::clone(&fetcher));
        worker.register(&mut host);
        let host = Arc::new(host);
        let container = WorkerContainer::new(fetcher);

        assert!(container.register(Arc::clone(&host)).await.is_err());
        assert_eq!(host.state(), WorkerState::Redundant);
        assert!(container.active().is_none());

        let bucket = storage.open("ai-music-gen-v1").await.unwrap();
        assert!(bucket.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn reinstall_is_idempotent() {
        let server = MockServer::start().await;
        serve_assets(&server, 2).await;

        let temp = TempDir::new().unwrap();
        let storage = CacheStorage::disk(temp.path());
        let worker = CacheFirstWorker::from_config(
            &worker_config(&server),
            storage.clone(),
            fetcher(),
            Arc::new(NoProgress),
        )
        .unwrap();

        let first = worker.installer().install().await.unwrap();
        let second = worker.installer().install().await.unwrap();
        assert_eq!(first.entries, 3);
        assert_eq!(second.entries, 3);

        let bucket = storage.existing("ai-music-gen-v1").await.unwrap();
        assert_eq!(bucket.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn interceptor_passes_miss_through_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tracks"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_string("busy")
                    .insert_header("retry-after", "5"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let storage = CacheStorage::disk(temp.path());
        let interceptor = FetchInterceptor::new("ai-music-gen-v1", storage.clone(), fetcher());

        let request = Request::get(Url::parse(&server.uri()).unwrap().join("/api/tracks").unwrap());
        let intercepted = interceptor.intercept(&request).await.unwrap();

        assert_eq!(intercepted.source, ResponseSource::Network);
        assert_eq!(intercepted.response.status, 503);
        assert_eq!(intercepted.response.header("retry-after"), Some("5"));
        assert_eq!(intercepted.response.body, b"busy");
        assert!(!storage.has("ai-music-gen-v1").await.unwrap());
    }

    #[tokio::test]
    async fn large_miss_passes_through_whole() {
        let server = MockServer::start().await;
        let audio = vec![42u8; 10 * 1024 * 1024 + 98_284];
        Mock::given(method("GET"))
            .and(path("/static/song.wav"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(audio.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let storage = CacheStorage::disk(temp.path());
        storage.open("ai-music-gen-v1").await.unwrap();
        let interceptor = FetchInterceptor::new("ai-music-gen-v1", storage.clone(), fetcher());

        let song = Url::parse(&server.uri()).unwrap().join("/static/song.wav").unwrap();
        let intercepted = interceptor.intercept(&Request::get(song)).await.unwrap();

        assert_eq!(intercepted.source, ResponseSource::Network);
        assert_eq!(intercepted.response.status, 200);
        assert_eq!(intercepted.response.body.len(), audio.len());
        assert!(storage.existing("ai-music-gen-v1").await.unwrap().is_empty().await.unwrap());
    }

    /// Answers `v{version}:{path}` tagged with `x-version`, holding one URL until released
    struct VersionedFetcher {
        version: u32,
        held: Option<Url>,
        reached: Notify,
        release: Notify,
    }

    impl VersionedFetcher {
        fn new(version: u32, held: Option<Url>) -> Self {
            Self {
                version,
                held,
                reached: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl Fetcher for VersionedFetcher {
        async fn fetch(&self, request: &Request) -> PrecacheResult<Response> {
            if self.held.as_ref() == Some(&request.url) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            let body = format!("v{}:{}", self.version, request.url.path());
            Ok(Response::new(request.url.as_str(), 200, body.into_bytes())
                .with_header("x-version", self.version.to_string()))
        }
    }

    /// Version a cached response claims, checked against its body
    fn consistent_version(response: &Response) -> u32 {
        let version: u32 = response.header("x-version").unwrap().parse().unwrap();
        let body = String::from_utf8(response.body.clone()).unwrap();
        assert!(
            body.starts_with(&format!("v{}:", version)),
            "x-version {} served with body {:?}",
            version,
            body
        );
        version
    }

    /// Reinstall v2 over a v1 bucket on disk and read every asset while the
    /// last one is still in flight. Returns the versions served mid-install.
    async fn versions_during_reinstall(policy: PartialFailurePolicy) -> Vec<u32> {
        let temp = TempDir::new().unwrap();
        let storage = CacheStorage::disk(temp.path());
        let origin = Url::parse("http://localhost:5000").unwrap();
        let assets: Vec<Url> = ASSETS.iter().map(|(p, _)| origin.join(p).unwrap()).collect();
        let held = assets[assets.len() - 1].clone();

        Installer::new(
            "ai-music-gen-v1",
            assets.clone(),
            storage.clone(),
            Arc::new(VersionedFetcher::new(1, None)),
        )
        .install()
        .await
        .unwrap();

        let v2 = Arc::new(VersionedFetcher::new(2, Some(held.clone())));
        let installer =
            Installer::new("ai-music-gen-v1", assets.clone(), storage.clone(), v2.clone())
                .with_policy(policy);
        let install = tokio::spawn(async move { installer.install().await });

        v2.reached.notified().await;

        let interceptor = FetchInterceptor::new(
            "ai-music-gen-v1",
            storage.clone(),
            Arc::new(VersionedFetcher::new(3, None)),
        );
        let mut seen = Vec::new();
        for url in &assets {
            let hit = interceptor.intercept(&Request::get(url.clone())).await.unwrap();
            assert_eq!(hit.source, ResponseSource::Cache);
            seen.push(consistent_version(&hit.response));
        }
        assert_eq!(seen[seen.len() - 1], 1, "held asset must still be v1");

        v2.release.notify_one();
        install.await.unwrap().unwrap();

        for url in &assets {
            let hit = interceptor.intercept(&Request::get(url.clone())).await.unwrap();
            assert_eq!(consistent_version(&hit.response), 2);
        }
        seen
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn retain_reinstall_on_disk_serves_whole_entries() {
        let seen = versions_during_reinstall(PartialFailurePolicy::Retain).await;
        assert!(seen.iter().all(|v| *v == 1 || *v == 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn discard_reinstall_on_disk_keeps_old_batch_until_complete() {
        let seen = versions_during_reinstall(PartialFailurePolicy::Discard).await;
        assert_eq!(seen, vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn retain_on_disk_keeps_entries_before_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>index</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/static/style.css"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let storage = CacheStorage::disk(temp.path());
        let origin = Url::parse(&server.uri()).unwrap();
        let assets = vec![origin.join("/").unwrap(), origin.join("/static/style.css").unwrap()];

        let result = Installer::new("ai-music-gen-v1", assets.clone(), storage.clone(), fetcher())
            .with_policy(PartialFailurePolicy::Retain)
            .install()
            .await;
        assert!(result.is_err());

        let reopened = CacheStorage::disk(temp.path());
        let bucket = reopened.existing("ai-music-gen-v1").await.unwrap();
        let keys = bucket.keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].as_str(), assets[0].as_str());
    }
}

mod end_to_end_tests {
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_config(dir: &Path, origin: &str) -> std::path::PathBuf {
        let config_path = dir.join("config.toml");
        let caches = dir.join("caches").display().to_string();
        std::fs::write(
            &config_path,
            format!(
                "[worker]\norigin = {:?}\n\n[storage]\nbackend = \"disk\"\ndir = {:?}\n",
                origin, caches
            ),
        )
        .unwrap();
        config_path
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn install_then_fetch_from_cache() {
        let server = MockServer::start().await;
        for (p, body) in [
            ("/", "index"),
            ("/static/style.css", "body {}"),
            ("/static/manifest.json", "{}"),
        ] {
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .expect(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/static/other.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("live"))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), &server.uri());

        cargo_bin_cmd!("precache")
            .arg("--config")
            .arg(&config)
            .arg("install")
            .assert()
            .success()
            .stdout(predicate::str::contains("holds 3 entries"));

        cargo_bin_cmd!("precache")
            .arg("--config")
            .arg(&config)
            .args(["fetch", "/static/style.css"])
            .assert()
            .success()
            .stdout("body {}")
            .stderr(predicate::str::contains("cache"));

        cargo_bin_cmd!("precache")
            .arg("--config")
            .arg(&config)
            .args(["fetch", "/static/other.js"])
            .assert()
            .success()
            .stdout("live")
            .stderr(predicate::str::contains("network"));

        cargo_bin_cmd!("precache")
            .arg("--config")
            .arg(&config)
            .args(["cache", "show", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("/static/manifest.json"))
            .stdout(predicate::str::contains("other.js").not());

        cargo_bin_cmd!("precache")
            .arg("--config")
            .arg(&config)
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ai-music-gen-v1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_install_exits_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), &server.uri());

        cargo_bin_cmd!("precache")
            .arg("--config")
            .arg(&config)
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("HTTP 404"))
            .stderr(predicate::str::contains("Hint:"));
    }
}
