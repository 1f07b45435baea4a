//! End-to-end runs against mock Graphite and Zenoss servers

use std::sync::Arc;
use std::time::Duration;

use alertbridge::alerting::{
    AlertEvaluator, FileStateRepository, RunOrchestrator, RunOutcome, StateRepository,
    ZenossNotifier,
};
use alertbridge::config::Config;
use alertbridge::models::RuleConfig;
use alertbridge::source::GraphiteSource;
use alertbridge::Error;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVENT_PATH: &str = "/zport/dmd/ZenEventManager/manage_addEvent";

fn config(graphite: &MockServer, zenoss: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.graphite.url = graphite.uri();
    config.zenoss.url = zenoss.uri();
    config.zenoss.username = "admin".to_string();
    config.zenoss.password = "zenoss".to_string();
    config.evaluation.state_file = dir.path().join("failures.txt");
    config.rules = vec![RuleConfig {
        title: "API latency".to_string(),
        metric: "stats.api.latency".to_string(),
        max: Some(250.0),
        min: None,
        roc: None,
        severity: 4,
    }];
    config.validate().unwrap();
    config
}

fn orchestrator(config: &Config) -> RunOrchestrator {
    RunOrchestrator::new(
        config.rules(),
        Arc::new(GraphiteSource::new(&config.graphite).unwrap()),
        Arc::new(ZenossNotifier::new(&config.zenoss).unwrap()),
        Arc::new(FileStateRepository::new(&config.evaluation.state_file)),
    )
    .with_evaluator(AlertEvaluator::new(config.evaluation.max_missing_samples))
    .with_device(&config.zenoss.device)
    .with_max_fetch_failures(config.evaluation.max_fetch_failures)
}

async fn serve_series(graphite: &MockServer, values: &str) {
    graphite.reset().await;
    Mock::given(method("GET"))
        .and(path("/render/"))
        .and(query_param("target", "stats.api.latency"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "stats.api.latency,1714550400,1714551000,60|{values}\n"
        )))
        .mount(graphite)
        .await;
}

#[tokio::test]
async fn alert_then_clear() {
    let graphite = MockServer::start().await;
    let zenoss = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = config(&graphite, &zenoss, &dir);
    let state = FileStateRepository::new(&config.evaluation.state_file);

    // Run 1: latency spikes
    serve_series(&graphite, "120,None,310.5,180").await;
    Mock::given(method("GET"))
        .and(path(EVENT_PATH))
        .and(query_param("component", "API latency"))
        .and(query_param("severity", "4"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&zenoss)
        .await;

    let outcome = orchestrator(&config).run_once().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert!(state.load().await.was_alerting("API latency-max"));
    zenoss.verify().await;

    // Run 2: back to normal, exactly one clear
    serve_series(&graphite, "120,130,None,140").await;
    zenoss.reset().await;
    Mock::given(method("GET"))
        .and(path(EVENT_PATH))
        .and(query_param("summary", "Clearing API latency"))
        .and(query_param("severity", "0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&zenoss)
        .await;

    orchestrator(&config).run_once().await.unwrap();
    assert!(state.load().await.is_empty());
    zenoss.verify().await;
}

#[tokio::test]
async fn unreachable_graphite_escalates() {
    let graphite = MockServer::start().await;
    let zenoss = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = config(&graphite, &zenoss, &dir);

    Mock::given(method("GET"))
        .and(path("/render/"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&graphite)
        .await;
    Mock::given(method("GET"))
        .and(path(EVENT_PATH))
        .and(query_param("component", "GraphiteZenossBridge"))
        .and(query_param("severity", "5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&zenoss)
        .await;

    // Each cron run builds its own orchestrator
    let first = orchestrator(&config).run_once().await.unwrap();
    assert!(matches!(first, RunOutcome::Skipped { .. }));

    let err = orchestrator(&config).run_once().await.unwrap_err();
    assert!(matches!(err, Error::SourceUnreachable { attempts: 2 }));
    assert!(!config.evaluation.state_file.exists());
}

#[tokio::test]
async fn timed_out_clear_is_retried_next_run() {
    let graphite = MockServer::start().await;
    let zenoss = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = config(&graphite, &zenoss, &dir);
    config.zenoss.timeout = Duration::from_millis(100);

    let entry = "API latency-max|2024-05-01 09:00:00\n";
    std::fs::write(&config.evaluation.state_file, entry).unwrap();

    serve_series(&graphite, "120,130,None,140").await;
    Mock::given(method("GET"))
        .and(path(EVENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&zenoss)
        .await;

    let outcome = orchestrator(&config).run_once().await.unwrap();
    let RunOutcome::Completed(report) = outcome else {
        panic!("run was skipped");
    };
    assert_eq!(report.notifications_sent, 0);
    assert_eq!(report.notifications_failed, 1);
    assert_eq!(report.alerting, 1);
    assert_eq!(
        std::fs::read_to_string(&config.evaluation.state_file).unwrap(),
        entry
    );
}
