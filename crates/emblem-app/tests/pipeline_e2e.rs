use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use emblem_app::paths::OutputPaths;
use emblem_app::pipeline::{Catalog, CatalogRecord, ClassificationResult, Item};
use emblem_app::services::{
    CheckpointStore, Classifier, FsObjectStore, HttpFetcher, Orchestrator, PipelineDeps,
    PipelineOptions, RetryPolicy, ServiceError,
};
use tempfile::TempDir;
use tokio::sync::Notify;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Replays scripted answers and records how many calls it received.
struct ScriptedClassifier {
    script: Mutex<VecDeque<Result<ClassificationResult, ServiceError>>>,
    fallback: ClassificationResult,
    calls: Mutex<usize>,
}

impl ScriptedClassifier {
    fn always(key: &str) -> Self {
        Self::scripted(Vec::new(), key)
    }

    fn scripted(script: Vec<Result<ClassificationResult, ServiceError>>, then: &str) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: ClassificationResult::new(then, format!("{then} icon")),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, _content: &[u8]) -> Result<ClassificationResult, ServiceError> {
        *self.calls.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

async fn icon_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG\r\n".to_vec()))
        .mount(&server)
        .await;
    server
}

fn orchestrator(out: &TempDir, classifier: Arc<dyn Classifier>) -> Orchestrator {
    let paths = OutputPaths::new(out.path()).expect("output dir");
    let deps = PipelineDeps {
        fetcher: Arc::new(HttpFetcher::new(Duration::from_secs(5)).expect("fetcher")),
        classifier,
        sink: Arc::new(FsObjectStore::builder().root(out.path()).build()),
        checkpoints: CheckpointStore::new(paths),
    };
    let options = PipelineOptions::builder()
        .courtesy_delay(Duration::ZERO)
        .retry(
            RetryPolicy::builder()
                .base_delay(Duration::from_millis(1))
                .max_jitter(Duration::ZERO)
                .build(),
        )
        .build();
    Orchestrator::new(deps, options)
}

fn keys(catalog: &Catalog) -> Vec<&str> {
    catalog.keys().collect()
}

#[tokio::test]
async fn duplicate_names_are_suffixed_and_run_completes() {
    let server = icon_server().await;
    let out = TempDir::new().unwrap();
    let classifier = Arc::new(ScriptedClassifier::always("vm"));
    let items = vec![
        Item::new(0, 1, None),
        Item::new(1, 1, Some(format!("{}/a.png", server.uri()))),
        Item::new(2, 2, Some(format!("{}/b.png", server.uri()))),
    ];

    let report = orchestrator(&out, classifier.clone())
        .run_with_report(&items)
        .await
        .expect("run succeeds");

    assert_eq!(keys(&report.catalog), vec!["vm", "vm_2", "default"]);
    assert_eq!(classifier.calls(), 2);
    assert_eq!(report.stats.missing_locator, 1);
    assert_eq!(report.stats.recorded, 2);
    assert!(!out.path().join(".resume_state").exists());
    assert!(out.path().join("vm.png").exists());
    assert!(out.path().join("vm_2.png").exists());

    let vm_2 = report.catalog.get("vm_2").unwrap();
    assert_eq!(vm_2.location_ref, out.path().join("vm_2.png").to_string_lossy());

    let persisted = std::fs::read(out.path().join("icon_map.json")).unwrap();
    assert_eq!(Catalog::from_json_slice(&persisted).unwrap(), report.catalog);
    let default = report.catalog.get("default").unwrap();
    assert_eq!(default.description, "Default placeholder icon");
}

#[tokio::test]
async fn resumed_run_skips_checkpointed_items() {
    let server = icon_server().await;
    let out = TempDir::new().unwrap();
    let items: Vec<_> = (0..4)
        .map(|i| Item::new(i, i + 1, Some(format!("{}/{i}.png", server.uri()))))
        .collect();

    // A previous run got through index 1 before dying.
    let earlier: Catalog = [
        CatalogRecord::new("router", "/old/router.png", "A router"),
        CatalogRecord::new("switch", "/old/switch.png", "A switch"),
    ]
    .into_iter()
    .collect();
    CheckpointStore::new(OutputPaths::new(out.path()).unwrap())
        .save(1, &earlier)
        .await
        .unwrap();

    let classifier = Arc::new(ScriptedClassifier::always("router"));
    let report = orchestrator(&out, classifier.clone())
        .run_with_report(&items)
        .await
        .unwrap();

    assert_eq!(classifier.calls(), 2);
    assert_eq!(report.stats.resumed_skips, 2);
    assert_eq!(
        keys(&report.catalog),
        vec!["router", "switch", "router_2", "router_3", "default"]
    );
    assert_eq!(
        report.catalog.get("router").unwrap().location_ref,
        "/old/router.png"
    );
}

#[tokio::test]
async fn rerun_after_completion_starts_fresh() {
    let server = icon_server().await;
    let out = TempDir::new().unwrap();
    let items = vec![Item::new(0, 1, Some(format!("{}/a.png", server.uri())))];

    let first = Arc::new(ScriptedClassifier::always("bucket"));
    orchestrator(&out, first.clone()).run(&items).await.unwrap();
    let second = Arc::new(ScriptedClassifier::always("bucket"));
    let catalog = orchestrator(&out, second.clone()).run(&items).await.unwrap();

    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 1);
    assert_eq!(keys(&catalog), vec!["bucket", "default"]);
}

#[tokio::test]
async fn transient_failures_then_success_are_recorded() {
    let server = icon_server().await;
    let out = TempDir::new().unwrap();
    let classifier = Arc::new(ScriptedClassifier::scripted(
        vec![
            Err(ServiceError::transient("HTTP 429")),
            Err(ServiceError::transient("HTTP 429")),
        ],
        "pubsub",
    ));
    let items = vec![Item::new(0, 1, Some(format!("{}/a.png", server.uri())))];

    let report = orchestrator(&out, classifier.clone())
        .run_with_report(&items)
        .await
        .unwrap();

    assert_eq!(classifier.calls(), 3);
    assert_eq!(report.stats.placeholders, 0);
    assert_eq!(keys(&report.catalog), vec!["pubsub", "default"]);
}

#[tokio::test]
async fn classifier_failures_become_placeholder_records() {
    let server = icon_server().await;
    let out = TempDir::new().unwrap();
    let classifier = Arc::new(ScriptedClassifier::scripted(
        vec![
            Err(ServiceError::terminal("HTTP 400: bad image")),
            Err(ServiceError::transient("HTTP 429")),
            Err(ServiceError::transient("HTTP 429")),
            Err(ServiceError::transient("HTTP 429")),
        ],
        "unused",
    ));
    let items = vec![
        Item::new(0, 1, Some(format!("{}/a.png", server.uri()))),
        Item::new(1, 1, Some(format!("{}/b.png", server.uri()))),
    ];

    let report = orchestrator(&out, classifier)
        .run_with_report(&items)
        .await
        .unwrap();

    assert_eq!(report.stats.placeholders, 2);
    assert_eq!(
        keys(&report.catalog),
        vec!["error_icon", "error_rate_limit", "default"]
    );
    assert_eq!(
        report.catalog.get("error_rate_limit").unwrap().description,
        "Failed to identify due to rate limits."
    );
}

#[tokio::test]
async fn fetch_failures_are_skipped_and_reported() {
    let server = icon_server().await;
    let out = TempDir::new().unwrap();
    let classifier = Arc::new(ScriptedClassifier::always("disk"));
    let items = vec![
        Item::new(0, 1, Some(format!("{}/a.png", server.uri()))),
        Item::new(1, 1, Some(format!("{}/missing.png", server.uri()))),
        Item::new(2, 2, Some(format!("{}/c.png", server.uri()))),
    ];

    let report = orchestrator(&out, classifier.clone())
        .run_with_report(&items)
        .await
        .unwrap();

    assert_eq!(report.stats.fetch_failures, vec![1]);
    assert_eq!(classifier.calls(), 2);
    assert_eq!(keys(&report.catalog), vec!["disk", "disk_2", "default"]);
}

/// Names an icon after the text its server returned (`"<n>:<name>"`), and can
/// hang forever on one body to imitate a process dying mid-item.
struct ContentNamedClassifier {
    hang_on: Option<&'static str>,
    hung: Notify,
    calls: Mutex<usize>,
}

impl ContentNamedClassifier {
    fn new(hang_on: Option<&'static str>) -> Self {
        Self {
            hang_on,
            hung: Notify::new(),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Classifier for ContentNamedClassifier {
    async fn classify(&self, content: &[u8]) -> Result<ClassificationResult, ServiceError> {
        *self.calls.lock().unwrap() += 1;
        let body = String::from_utf8_lossy(content).into_owned();
        if self.hang_on == Some(body.as_str()) {
            self.hung.notify_one();
            std::future::pending::<()>().await;
        }
        let name = body.split(':').nth(1).unwrap_or_default().to_string();
        Ok(ClassificationResult::new(name, format!("{body} icon")))
    }
}

fn records(catalog: &Catalog) -> Vec<(String, String)> {
    catalog
        .records()
        .map(|record| (record.key.clone(), record.description.clone()))
        .collect()
}

#[tokio::test]
async fn interrupted_then_resumed_run_matches_uninterrupted_run() {
    let server = MockServer::start().await;
    let bodies = ["0:vm", "", "2:db", "3:lb", "4:vm", "5:vm"];
    for (i, body) in bodies.iter().enumerate().filter(|(_, b)| !b.is_empty()) {
        Mock::given(method("GET"))
            .and(path(format!("/{i}.png")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.as_bytes().to_vec()))
            .mount(&server)
            .await;
    }
    let items: Vec<_> = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            let locator = (!body.is_empty()).then(|| format!("{}/{i}.png", server.uri()));
            Item::new(i, i / 2 + 1, locator)
        })
        .collect();

    let reference_out = TempDir::new().unwrap();
    let reference = orchestrator(&reference_out, Arc::new(ContentNamedClassifier::new(None)))
        .run(&items)
        .await
        .unwrap();

    let out = TempDir::new().unwrap();
    let hanging = Arc::new(ContentNamedClassifier::new(Some("3:lb")));
    let interrupted = orchestrator(&out, hanging.clone());
    tokio::select! {
        result = interrupted.run(&items) => panic!("run should hang on item 3, got {result:?}"),
        _ = hanging.hung.notified() => {}
    }
    let cursor = std::fs::read_to_string(out.path().join(".resume_state")).unwrap();
    assert_eq!(cursor, "2");

    let resumed_classifier = Arc::new(ContentNamedClassifier::new(None));
    let resumed = orchestrator(&out, resumed_classifier.clone())
        .run(&items)
        .await
        .unwrap();

    assert_eq!(resumed_classifier.calls(), 3);
    assert_eq!(records(&resumed), records(&reference));
    assert_eq!(
        keys(&resumed),
        vec!["vm", "db", "lb", "vm_2", "vm_3", "default"]
    );
    for record in resumed.records().filter(|r| r.key != "default") {
        assert!(std::path::Path::new(&record.location_ref).starts_with(out.path()));
    }
    assert!(!out.path().join(".resume_state").exists());
}
