//! End-to-end behavior of the interception agent against a stub network.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use kindred_common::Mode;
use kindred_net::{Request, Response, StubNetwork};
use kindred_sw::{
    AgentConfig, AgentEvent, CacheEntry, CacheGeneration, CachePurpose, ControlMessage,
    ControlReply, FetchOutcome, InterceptionAgent, LifecycleState,
};
use tokio::sync::{mpsc, oneshot};
use url::Url;

const ORIGIN: &str = "https://kindred.app";

fn config(generation: &str) -> AgentConfig {
    AgentConfig {
        origin: Url::parse(ORIGIN).unwrap(),
        generation: CacheGeneration::new(generation),
        ..Default::default()
    }
}

fn agent_with(
    mode: Mode,
    config: AgentConfig,
) -> (InterceptionAgent, mpsc::UnboundedReceiver<AgentEvent>, Arc<StubNetwork>) {
    let stub = Arc::new(StubNetwork::new());
    let (agent, rx) = InterceptionAgent::new(mode, config, stub.clone()).unwrap();
    (agent, rx, stub)
}

async fn started(mode: Mode) -> (InterceptionAgent, Arc<StubNetwork>) {
    let (agent, _rx, stub) = agent_with(mode, config("2"));
    agent.start().await.unwrap();
    (agent, stub)
}

async fn seed(agent: &InterceptionAgent, cache: &str, url: &str, body: &'static [u8]) {
    let response = Response::new(
        Url::parse(url).unwrap(),
        StatusCode::OK,
        HeaderMap::new(),
        Bytes::from_static(body),
    );
    agent
        .caches()
        .put(cache, url, CacheEntry::snapshot(&response))
        .await
        .unwrap();
}

async fn fetch(agent: &InterceptionAgent, request: Request) -> Response {
    match agent.on_fetch(request).await {
        FetchOutcome::Respond(response) => response,
        FetchOutcome::Passthrough => panic!("request was not intercepted"),
    }
}

fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

#[tokio::test]
async fn non_get_requests_are_forwarded_without_caching() {
    let (agent, stub) = started(Mode::Production).await;
    let target = url("/api/matches");
    stub.respond(&target, "application/json", &b"{\"ok\":true}"[..]);

    for method in [Method::POST, Method::PUT, Method::DELETE] {
        let request = Request::parse(&target).unwrap().with_method(method).body("{}");
        let response = fetch(&agent, request).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(!response.from_cache);
    }

    assert_eq!(stub.calls(&target), 3);
    let api = agent.naming().name(CachePurpose::Api);
    assert_eq!(agent.caches().entry_count(&api).await, 0);
}

#[tokio::test]
async fn cache_first_hit_makes_no_network_call() {
    let (agent, stub) = started(Mode::Production).await;
    let images = agent.naming().name(CachePurpose::Images);
    let photo = url("/uploads/profile-17.webp");
    seed(&agent, &images, &photo, b"webp-bytes").await;
    let calls_after_install = stub.total_calls();

    let response = fetch(&agent, Request::parse(&photo).unwrap()).await;

    assert!(response.from_cache);
    assert_eq!(response.body().as_ref(), b"webp-bytes");
    assert_eq!(stub.calls(&photo), 0);
    assert_eq!(stub.total_calls(), calls_after_install);
}

#[tokio::test]
async fn cached_and_returned_bytes_are_equal() {
    let (agent, stub) = started(Mode::Production).await;
    let script = url("/bundle.js");
    stub.respond(&script, "text/javascript", &b"console.log('kindred')"[..]);

    let response = fetch(&agent, Request::parse(&script).unwrap()).await;
    let static_cache = agent.naming().name(CachePurpose::Static);
    let cached = agent.caches().lookup(&static_cache, &script).await.unwrap();

    assert!(!response.body().is_empty());
    assert_eq!(response.body(), cached.body());
}

#[tokio::test]
async fn network_first_offline_serves_cache_then_offline_json() {
    let (agent, stub) = started(Mode::Production).await;
    let api = agent.naming().name(CachePurpose::Api);
    let matches = url("/api/matches");
    seed(&agent, &api, &matches, b"{\"matches\":[{\"id\":3}]}").await;
    stub.set_offline(true);

    let cached = fetch(&agent, Request::parse(&matches).unwrap()).await;
    assert_eq!(cached.status, StatusCode::OK);
    assert_eq!(cached.body().as_ref(), b"{\"matches\":[{\"id\":3}]}");

    agent.caches().delete(&api).await;
    let offline = fetch(&agent, Request::parse(&matches).unwrap()).await;
    assert_eq!(offline.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(offline.content_type().unwrap().essence_str(), "application/json");
    let body: serde_json::Value = offline.json().unwrap();
    assert_eq!(body["error"], "Offline");
    assert!(body["message"].is_string());
    assert_eq!(body["matches"], serde_json::json!([]));
}

#[tokio::test]
async fn development_navigation_prefers_network_over_cache() {
    let (agent, stub) = started(Mode::Development).await;
    let static_cache = agent.naming().name(CachePurpose::Static);
    let page = url("/feed");
    seed(&agent, &static_cache, &page, b"stale feed").await;
    stub.respond(&page, "text/html", &b"fresh feed"[..]);

    let response = fetch(&agent, Request::navigate(Url::parse(&page).unwrap())).await;
    assert_eq!(response.body().as_ref(), b"fresh feed");
}

#[tokio::test]
async fn production_navigation_serves_cache_then_revalidates() {
    let (agent, stub) = started(Mode::Production).await;
    let static_cache = agent.naming().name(CachePurpose::Static);
    let page = url("/feed");
    seed(&agent, &static_cache, &page, b"stale feed").await;
    stub.respond(&page, "text/html", &b"fresh feed"[..]);
    stub.hold();

    let response = fetch(&agent, Request::navigate(Url::parse(&page).unwrap())).await;
    assert_eq!(response.body().as_ref(), b"stale feed");
    assert!(response.from_cache);

    stub.release();
    agent.background().drain().await;

    let refreshed = agent.caches().lookup(&static_cache, &page).await.unwrap();
    assert_eq!(refreshed.body().as_ref(), b"fresh feed");
}

#[tokio::test]
async fn activation_evicts_only_stale_generations() {
    let (agent, mut rx, _stub) = agent_with(Mode::Production, config("2"));
    for name in [
        "kindred-static-v1",
        "kindred-api-v1",
        "kindred-images-v1",
        "kindred-api-v2",
        "kindred-thumbs-v2",
        "analytics-v1",
    ] {
        seed(&agent, name, &url("/seed"), b"x").await;
    }

    agent.start().await.unwrap();
    assert_eq!(agent.state().await, LifecycleState::Activated);

    let names = agent.caches().names().await;
    assert!(names.iter().all(|n| !n.ends_with("-v1") || n == "analytics-v1"));
    assert!(names.contains(&"kindred-api-v2".to_string()));
    assert!(agent.caches().has("kindred-thumbs-v2").await);
    assert!(names.contains(&"analytics-v1".to_string()));
    assert_eq!(agent.caches().entry_count("kindred-api-v2").await, 1);

    let mut deleted = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let AgentEvent::CacheDeleted { name } = event {
            deleted.push(name);
        }
    }
    deleted.sort();
    assert_eq!(
        deleted,
        vec!["kindred-api-v1", "kindred-images-v1", "kindred-static-v1"]
    );
}

#[tokio::test]
async fn clear_cache_is_idempotent() {
    let (agent, _stub) = started(Mode::Production).await;
    seed(&agent, "kindred-api-v2", &url("/api/profile"), b"{}").await;

    for _ in 0..2 {
        let (tx, rx) = oneshot::channel();
        agent.on_message(ControlMessage::ClearCache, Some(tx)).await;
        assert_eq!(rx.await.unwrap(), ControlReply::ok());
        assert!(agent.caches().names().await.is_empty());
    }
}

#[tokio::test]
async fn update_profile_message_forces_next_fetch_to_network() {
    let (agent, stub) = started(Mode::Production).await;
    let api = agent.naming().name(CachePurpose::Api);
    let profile = url("/api/profile");
    seed(&agent, &api, &profile, b"{\"name\":\"old\"}").await;

    let (tx, rx) = oneshot::channel();
    agent
        .on_raw_message(r#"{"type":"UPDATE_PROFILE_CACHE"}"#, Some(tx))
        .await;
    assert!(rx.await.unwrap().success);
    assert!(agent.caches().lookup(&api, &profile).await.is_none());

    stub.set_offline(true);
    let response = fetch(&agent, Request::parse(&profile).unwrap()).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().unwrap();
    assert!(body["profile"].is_null());
}

#[tokio::test]
async fn navigation_fallback_chain_when_offline() {
    let (agent, stub) = started(Mode::Production).await;
    stub.set_offline(true);
    let page = Url::parse(&url("/chat/9")).unwrap();

    let offline = fetch(&agent, Request::navigate(page.clone())).await;
    assert_eq!(offline.status, StatusCode::SERVICE_UNAVAILABLE);
    let html = offline.text().unwrap();
    assert!(html.contains("<button"));
    assert!(html.contains("reload"));

    let images = agent.naming().name(CachePurpose::Images);
    seed(&agent, &images, page.as_str(), b"exact copy").await;
    let exact = fetch(&agent, Request::navigate(page.clone())).await;
    assert_eq!(exact.body().as_ref(), b"exact copy");

    let static_cache = agent.naming().name(CachePurpose::Static);
    seed(&agent, &static_cache, &url("/index.html"), b"app shell").await;
    let shell = fetch(&agent, Request::navigate(page)).await;
    assert_eq!(shell.body().as_ref(), b"app shell");
}

#[tokio::test]
async fn precached_shell_survives_going_offline() {
    let (agent, _rx, stub) = agent_with(Mode::Production, config("2"));
    stub.respond(&url("/"), "text/html", &b"<html>root</html>"[..]);
    stub.respond(&url("/index.html"), "text/html", &b"<html>shell</html>"[..]);

    agent.start().await.unwrap();
    stub.set_offline(true);

    let page = Url::parse(&url("/profile/edit")).unwrap();
    let response = fetch(&agent, Request::navigate(page)).await;
    assert_eq!(response.body().as_ref(), b"<html>shell</html>");
}

#[tokio::test]
async fn caches_persist_across_agent_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("caches.json");
    let photo = url("/uploads/a.png");

    {
        let (agent, stub) = started(Mode::Production).await;
        stub.respond(&photo, "image/png", &b"png"[..]);
        fetch(&agent, Request::parse(&photo).unwrap()).await;
        agent.caches().save(&snapshot).await.unwrap();
    }

    let (agent, _rx, stub) = agent_with(Mode::Production, config("2"));
    agent.caches().load(&snapshot).await.unwrap();
    agent.start().await.unwrap();
    stub.set_offline(true);

    let response = fetch(&agent, Request::parse(&photo).unwrap()).await;
    assert!(response.from_cache);
    assert_eq!(response.body().as_ref(), b"png");
}
