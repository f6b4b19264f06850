//! Accounting-Request dispatch tests
//!
//! Covers classification, checker-selected CDR writers, copy fan-out and
//! the inline accounting proxy.

mod common;

use common::{
    RecordingWriter, ScriptedRouter, Upstream, accounting_request, binding, config, engine,
};
use psba_engine::{PolicyEngine, PolicySnapshot, RouteError};
use psba_engine::{MemoryProvisioningStore, PlanParameterCache, StaticPlanParameters};
use radius_model::Code;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn base_config(properties: serde_json::Value, copy_targets: serde_json::Value) -> serde_json::Value {
    json!({
        "properties": properties,
        "checkers": {
            "service": [{"op": "present", "attribute": "PSA-ServiceName"}],
            "session": [{"op": "absent", "attribute": "PSA-ServiceName"}],
            "stops": [{"op": "equals", "attribute": "Acct-Status-Type", "value": "2"}],
            "all": []
        },
        "filters": {
            "strip-internal": {"remove": ["PSA-AccessId", "PSA-AccessPort"]}
        },
        "proxy_groups": {
            "upstream": {"servers": ["192.0.2.10:1813"]},
            "billing": {"servers": ["192.0.2.20:1813"], "secret": "billing-secret"},
            "archive": {"servers": ["192.0.2.30:1813"]}
        },
        "copy_targets": copy_targets
    })
}

#[tokio::test]
async fn test_service_accounting_goes_to_service_writer() {
    let router = Arc::new(ScriptedRouter::new());
    let service = Arc::new(RecordingWriter::default());
    let session = Arc::new(RecordingWriter::default());
    let engine = engine(
        config(base_config(json!({}), json!([]))),
        vec![binding(&service, "service"), binding(&session, "session")],
        vec![],
        router.clone(),
        Default::default(),
    )
    .await;

    let mut request = accounting_request("alice@isp.example", "10.0.0.1", 7);
    request.add("Alc-Sub-Serv-Activate", "turbo");
    let reply = engine.handle(request).await.expect("reply produced");

    assert_eq!(reply.code, Code::AccountingResponse);
    assert_eq!(reply.identifier, 43);
    assert!(reply.avps.is_empty());

    let written = service.packets();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].get_string_avp("PSA-ServiceName"), "turbo");
    assert_eq!(written[0].get_string_avp("PSA-AccessId"), "10.0.0.1");
    assert!(session.packets().is_empty());
}

#[tokio::test]
async fn test_session_accounting_goes_to_session_writer() {
    let router = Arc::new(ScriptedRouter::new());
    let service = Arc::new(RecordingWriter::default());
    let session = Arc::new(RecordingWriter::default());
    let engine = engine(
        config(base_config(json!({}), json!([]))),
        vec![binding(&service, "service"), binding(&session, "session")],
        vec![],
        router.clone(),
        Default::default(),
    )
    .await;

    let reply = engine
        .handle(accounting_request("alice@isp.example", "10.0.0.1", 7))
        .await
        .expect("reply produced");

    assert_eq!(reply.code, Code::AccountingResponse);
    assert!(service.packets().is_empty());
    let written = session.packets();
    assert_eq!(written.len(), 1);
    assert!(written[0].get_avp("PSA-ServiceName").is_none());
}

#[tokio::test]
async fn test_relay_client_takes_service_from_class() {
    let router = Arc::new(ScriptedRouter::new());
    let service = Arc::new(RecordingWriter::default());
    let value = json!({
        "properties": {"radius_client_type": "SRC"},
        "checkers": {"service": [{"op": "present", "attribute": "PSA-ServiceName"}]}
    });
    let engine = engine(
        config(value),
        vec![binding(&service, "service")],
        vec![],
        router.clone(),
        Default::default(),
    )
    .await;

    let mut request = accounting_request("alice@isp.example", "10.0.0.1", 7);
    request.add("Class", "gold-service");
    engine.handle(request).await.expect("reply produced");

    let written = service.packets();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].get_string_avp("PSA-ServiceName"), "gold-service");
}

#[tokio::test]
async fn test_copies_complete_before_response() {
    let router = Arc::new(
        ScriptedRouter::new()
            .with("billing", Upstream::Slow(Duration::from_millis(80)))
            .with("archive", Upstream::Slow(Duration::from_millis(40))),
    );
    let copies = json!([
        {"name": "billing-copy", "proxy_group": "billing", "checker": "session",
         "filter": "strip-internal", "timeout_millis": 1000, "retries": 2},
        {"name": "archive-copy", "proxy_group": "archive", "checker": "all"},
        {"name": "stops-only", "proxy_group": "archive", "checker": "stops"}
    ]);
    let engine = engine(
        config(base_config(json!({}), copies)),
        vec![],
        vec![],
        router.clone(),
        Default::default(),
    )
    .await;

    let started = Instant::now();
    let reply = engine
        .handle(accounting_request("alice@isp.example", "10.0.0.1", 7))
        .await
        .expect("reply produced");
    let elapsed = started.elapsed();

    assert_eq!(reply.code, Code::AccountingResponse);
    assert_eq!(router.completed.load(Ordering::SeqCst), 2);
    // copies run concurrently, so the slowest one bounds the wait
    assert!(elapsed >= Duration::from_millis(80));
    assert!(elapsed < Duration::from_millis(115), "copies ran sequentially: {:?}", elapsed);

    let billing = router.sent_to("billing");
    assert_eq!(billing.len(), 1);
    assert!(billing[0].packet.get_avp("PSA-AccessId").is_none());
    assert_eq!(billing[0].policy.tries, 3);
    assert_eq!(billing[0].policy.timeout, Duration::from_millis(1000));
    assert_eq!(billing[0].policy.secret.as_deref(), Some("billing-secret"));

    let archive = router.sent_to("archive");
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].packet.get_string_avp("PSA-AccessId"), "10.0.0.1");
}

#[tokio::test]
async fn test_copy_failures_do_not_block_response() {
    let router = Arc::new(
        ScriptedRouter::new()
            .with("billing", Upstream::Fail(RouteError::Timeout(100)))
            .with("archive", Upstream::Slow(Duration::from_millis(10))),
    );
    let copies = json!([
        {"name": "billing-copy", "proxy_group": "billing", "checker": "all"},
        {"name": "archive-copy", "proxy_group": "archive", "checker": "all"}
    ]);
    let engine = engine(
        config(base_config(json!({}), copies)),
        vec![],
        vec![],
        router.clone(),
        Default::default(),
    )
    .await;

    let reply = engine
        .handle(accounting_request("alice@isp.example", "10.0.0.1", 7))
        .await
        .expect("reply produced");

    assert_eq!(reply.code, Code::AccountingResponse);
    assert_eq!(router.completed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_inline_proxy_follows_accounting_kind() {
    let router = Arc::new(
        ScriptedRouter::new().with("upstream", Upstream::Fail(RouteError::Transport("down".to_string()))),
    );
    let properties = json!({
        "proxy_group": "upstream",
        "proxy_session_accounting": true,
        "proxy_service_accounting": false,
        "acct_proxy_filter_out": "strip-internal"
    });
    let engine = engine(
        config(base_config(properties, json!([]))),
        vec![],
        vec![],
        router.clone(),
        Default::default(),
    )
    .await;

    let reply = engine
        .handle(accounting_request("alice@isp.example", "10.0.0.1", 7))
        .await
        .expect("reply produced");
    assert_eq!(reply.code, Code::AccountingResponse);

    let sent = router.sent_to("upstream");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].packet.get_avp("PSA-AccessId").is_none());

    let mut service = accounting_request("alice@isp.example", "10.0.0.1", 7);
    service.add("Redback-Service-Name", "video");
    let reply = engine.handle(service).await.expect("reply produced");
    assert_eq!(reply.code, Code::AccountingResponse);
    assert_eq!(router.sent_to("upstream").len(), 1);
}

#[tokio::test]
async fn test_file_cdr_writer_from_configuration() {
    let dir = TempDir::new().unwrap();
    let mut value = base_config(json!({}), json!([]));
    value["cdr_writers"] = json!([
        {"path": dir.path().join("session"), "file_prefix": "session",
         "format": "json", "checker": "session", "attributes": ["User-Name", "PSA-AccessPort"]},
        {"path": dir.path().join("service"), "file_prefix": "service",
         "format": "csv", "checker": "service"}
    ]);

    let plans = PlanParameterCache::new(Arc::new(StaticPlanParameters::default())).await;
    let engine = PolicyEngine::new(
        PolicySnapshot::build(config(value)).unwrap(),
        Arc::new(MemoryProvisioningStore::new()),
        Arc::new(ScriptedRouter::new()),
        plans,
    )
    .unwrap();

    engine
        .handle(accounting_request("alice@isp.example", "10.0.0.1", 7))
        .await
        .unwrap();

    let mut files = std::fs::read_dir(dir.path().join("session")).unwrap();
    let path = files.next().unwrap().unwrap().path();
    let content = std::fs::read_to_string(path).unwrap();
    let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(line["User-Name"], "alice@isp.example");
    assert_eq!(line["PSA-AccessPort"], 7);
    assert!(line.get("Acct-Session-Id").is_none());

    assert!(!dir.path().join("service").exists());
}
