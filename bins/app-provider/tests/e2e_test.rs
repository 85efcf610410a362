//! End-to-end tests for the app provider
//!
//! A real server on an ephemeral port, backed by the in-memory runtime.

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use vcd_app_provider::AppState;
use vcd_launcher::{
    AppLauncher, FileDocumentLoader, LauncherConfig, RecordingRuntime, RuntimeCall,
    SecurityDocumentLoader, StaticDocumentLoader,
};

struct TestServer {
    addr: SocketAddr,
    runtime: RecordingRuntime,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(
            LauncherConfig::default(),
            Arc::new(StaticDocumentLoader::new(
                json!({"defaultAction": "SCMP_ACT_ERRNO"}),
            )),
        )
        .await
    }

    async fn start_with(config: LauncherConfig, loader: Arc<dyn SecurityDocumentLoader>) -> Self {
        let runtime = RecordingRuntime::new();
        let launcher = AppLauncher::from_config(&config, Arc::new(runtime.clone()), loader);
        let state = Arc::new(AppState::new(launcher, config.max_concurrent_launches));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = vcd_app_provider::serve(listener, state).await;
        });

        Self {
            addr,
            runtime,
            client: reqwest::Client::new(),
        }
    }

    async fn post_raw(&self, body: &str) -> (u16, String) {
        let response = self
            .client
            .post(format!("http://{}/", self.addr))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    async fn launch(&self, user: &str, app: &str) -> (u16, String) {
        self.post_raw(&json!({ "user": user, "app": app }).to_string())
            .await
    }
}

#[tokio::test]
async fn test_firefox_launch_end_to_end() {
    let server = TestServer::start().await;

    let (status, body) = server.launch("alice", "firefox").await;
    assert_eq!(status, 200);
    assert_eq!(body, "\"firefox\"");

    assert_eq!(server.runtime.create_count(), 1);
    assert_eq!(server.runtime.start_count(), 1);

    let specs = server.runtime.specs();
    let spec = &specs[0];
    assert_eq!(spec.name, "vcd-alice-firefox");
    assert_eq!(spec.hostname, "vcd-alice-firefox");
    assert_eq!(spec.network, "vcd_frontend");
    assert_eq!(spec.image, "rayvtoll/vcd-firefox:latest");
    assert_eq!(spec.shm_size, 2_147_483_648);
    assert!(spec.security_opts.is_empty());
    assert_eq!(
        spec.binds(),
        vec![
            "/opt/vcde/alice:/home/alice",
            "/opt/vcde/Public:/home/alice/Public",
            "/opt/vcde/alice/.ssh/id_rsa.pub:/home/alice/.ssh/authorized_keys:ro",
        ]
    );
}

#[tokio::test]
async fn test_extra_fields_are_ignored() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post_raw(r#"{"user":"alice","app":"gimp","resolution":"1920x1080"}"#)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, "\"gimp\"");
}

#[tokio::test]
async fn test_chrome_launch_carries_seccomp_option() {
    let server = TestServer::start().await;

    let (status, _) = server.launch("bob", "chrome").await;
    assert_eq!(status, 200);

    let specs = server.runtime.specs();
    assert_eq!(
        specs[0].security_opts,
        vec![r#"seccomp={"defaultAction":"SCMP_ACT_ERRNO"}"#.to_string()]
    );
}

#[tokio::test]
async fn test_unknown_application_is_404_without_runtime_calls() {
    let server = TestServer::start().await;

    let (status, body) = server.launch("alice", "emacs").await;
    assert_eq!(status, 404);
    let error: Value = serde_json::from_str(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("emacs"));
    assert!(server.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_bad_bodies_are_400() {
    let server = TestServer::start().await;

    for body in ["", "not json", r#"{"user":"alice"}"#, r#"{"user":1,"app":"gimp"}"#] {
        let (status, _) = server.post_raw(body).await;
        assert_eq!(status, 400, "body {:?}", body);
    }

    let (status, _) = server.launch("../../etc", "firefox").await;
    assert_eq!(status, 400);
    assert!(server.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_runtime_failure_is_502_and_server_keeps_serving() {
    let server = TestServer::start().await;
    server.runtime.fail_create("No such image: rayvtoll/vcd-geary:latest");

    let (status, body) = server.launch("alice", "geary").await;
    assert_eq!(status, 502);
    assert!(body.contains("No such image"));
    assert_eq!(server.runtime.start_count(), 0);

    server.runtime.recover();
    let (status, body) = server.launch("alice", "nautilus").await;
    assert_eq!(status, 200);
    assert_eq!(body, "\"nautilus\"");
}

#[tokio::test]
async fn test_failed_start_does_not_block_relaunch() {
    let server = TestServer::start().await;
    server.runtime.fail_start("error mounting /opt/vcde/frank");

    let (status, body) = server.launch("frank", "thunderbird").await;
    assert_eq!(status, 502);
    assert!(body.contains("error mounting"));

    server.runtime.recover();
    let (status, body) = server.launch("frank", "thunderbird").await;
    assert_eq!(status, 200);
    assert_eq!(body, "\"thunderbird\"");
    assert_eq!(server.runtime.container_names(), vec!["vcd-frank-thunderbird"]);
}

#[tokio::test]
async fn test_launches_queue_for_a_free_slot() {
    let config = LauncherConfig {
        max_concurrent_launches: 1,
        ..Default::default()
    };
    let server = TestServer::start_with(
        config,
        Arc::new(StaticDocumentLoader::new(json!({}))),
    )
    .await;
    server.runtime.set_delay(Duration::from_millis(200));

    let ((first, _), (second, _)) = tokio::join!(
        server.launch("grace", "geary"),
        server.launch("heidi", "geary"),
    );
    assert_eq!(first, 200);
    assert_eq!(second, 200);

    let calls = server.runtime.calls();
    assert_eq!(calls.len(), 4);
    assert!(matches!(calls[0], RuntimeCall::Create(_)));
    assert!(matches!(calls[1], RuntimeCall::Start(_)));
    assert!(matches!(calls[2], RuntimeCall::Create(_)));
    assert!(matches!(calls[3], RuntimeCall::Start(_)));
}

#[tokio::test]
async fn test_repeated_launch_hits_name_collision() {
    let server = TestServer::start().await;

    let (first, _) = server.launch("carol", "evolution").await;
    let (second, body) = server.launch("carol", "evolution").await;

    assert_eq!(first, 200);
    assert_eq!(second, 502);
    assert!(body.contains("already in use"));
    assert_eq!(
        server.runtime.calls().iter().filter(|c| matches!(c, RuntimeCall::Create(_))).count(),
        2
    );
}

#[tokio::test]
async fn test_hanging_runtime_is_502() {
    let config = LauncherConfig {
        runtime_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let server = TestServer::start_with(
        config,
        Arc::new(StaticDocumentLoader::new(json!({}))),
    )
    .await;
    server.runtime.set_delay(Duration::from_secs(30));

    let (status, body) = server.launch("dave", "libreoffice").await;
    assert_eq!(status, 502);
    assert!(body.contains("timed out"));
}

#[tokio::test]
async fn test_missing_seccomp_document_only_fails_chrome() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start_with(
        LauncherConfig::default(),
        Arc::new(FileDocumentLoader::new(dir.path().join("chrome.json"))),
    )
    .await;

    let (status, _) = server.launch("erin", "chrome").await;
    assert_eq!(status, 500);
    assert!(server.runtime.calls().is_empty());

    let (status, _) = server.launch("erin", "firefox").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_health_lists_applications() {
    let server = TestServer::start().await;

    let health: Value = server
        .client
        .get(format!("http://{}/health", server.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health["healthy"], true);
    let apps = health["applications"].as_array().unwrap();
    assert_eq!(apps.len(), 8);
    assert!(apps.iter().any(|a| a == "chrome"));
}
