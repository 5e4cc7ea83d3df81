//! End-to-end lifecycle tests against an in-process transport.

use include_fragment::{
    Fetch, FetchFn, FragmentError, FragmentEvent, FragmentRequest, FragmentResponse, HostDocument,
    IncludeFragment, LifecycleState, LoadPipeline, LoadingMode, NodeId, SanitizeGate,
    ERROR_CLASS, TAG_NAME,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Routes requests by path and records every request it serves.
struct Server {
    fetcher: Arc<dyn Fetch>,
    requests: Arc<Mutex<Vec<FragmentRequest>>>,
}

impl Server {
    fn new() -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));
        let log = requests.clone();
        let fetcher = FetchFn(move |req: FragmentRequest| {
            log.lock().unwrap().push(req.clone());
            let count = count.clone();
            async move { Ok::<_, anyhow::Error>(route(&req, &count).await) }
        });
        Self {
            fetcher: Arc::new(fetcher),
            requests,
        }
    }

    fn pipeline(&self) -> LoadPipeline {
        LoadPipeline::new(self.fetcher.clone()).with_gate(SanitizeGate::identity())
    }

    fn element(&self, host: &HostDocument) -> IncludeFragment {
        let node = host.create_element(TAG_NAME);
        IncludeFragment::with_pipeline(host, node, self.pipeline())
    }

    fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path() == path)
            .count()
    }
}

async fn route(req: &FragmentRequest, count: &AtomicUsize) -> FragmentResponse {
    match req.path().as_str() {
        "/hello" => FragmentResponse::ok("text/html", r#"<div id="replaced">hello</div>"#),
        "/slow-hello" => {
            tokio::time::sleep(Duration::from_millis(100)).await;
            FragmentResponse::ok("text/html", r#"<div id="replaced">hello</div>"#)
        }
        "/one-two" => {
            FragmentResponse::ok("text/html", r#"<p id="one">one</p><p id="two">two</p>"#)
        }
        "/blank-type" => FragmentResponse::new(200, r#"<div id="replaced">hello</div>"#),
        "/boom" => FragmentResponse::new(500, "boom"),
        "/count" => {
            let n = count.fetch_add(1, Ordering::SeqCst) + 1;
            FragmentResponse::ok("text/html", n.to_string())
        }
        "/fragment" => {
            if req.header("Accept") == Some("text/fragment+html") {
                FragmentResponse::ok("text/fragment+html", r#"<div id="fragment">fragment</div>"#)
            } else {
                FragmentResponse::new(406, "406")
            }
        }
        "/test.js" => FragmentResponse::ok("text/javascript", "alert('what')"),
        _ => FragmentResponse::new(404, "not found"),
    }
}

fn record(el: &IncludeFragment) -> Arc<Mutex<Vec<&'static str>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    el.listen(move |e| s.lock().unwrap().push(e.name()));
    seen
}

fn count(seen: &Mutex<Vec<&'static str>>, name: &str) -> usize {
    seen.lock().unwrap().iter().filter(|n| **n == name).count()
}

async fn wait_for(rx: &mut broadcast::Receiver<FragmentEvent>, name: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(e) if e.name() == name => return,
                Ok(_) => continue,
                Err(e) => panic!("event bus closed: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"));
}

async fn settle(el: &IncludeFragment) -> LifecycleState {
    tokio::time::timeout(Duration::from_secs(2), el.settled())
        .await
        .expect("element did not settle")
}

fn hidden_container(host: &HostDocument) -> NodeId {
    let div = host.create_element("div");
    host.set_hidden(div, true);
    host.append_child(host.body(), div);
    div
}

// ── Data ────────────────────────────────────────────────────

#[tokio::test]
async fn test_initial_data_is_in_error_state() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    assert_eq!(el.data().await, Err(FragmentError::NoSource));
    assert_eq!(server.requests.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn test_data_with_src_attribute() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.set_src("/hello");
    assert_eq!(
        el.data().await.unwrap(),
        r#"<div id="replaced">hello</div>"#
    );
    // Reading data on a detached element never emits signals.
    assert_eq!(el.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn test_data_copies_are_independent() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.set_src("/hello");

    let copy = el.data();
    drop(copy);
    assert!(el.data().await.is_ok());
    assert_eq!(server.hits("/hello"), 1);
}

#[tokio::test]
async fn test_data_is_cached_until_src_changes() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);

    el.set_src("/count");
    assert_eq!(el.data().await.unwrap(), "1");
    assert_eq!(el.data().await.unwrap(), "1");

    el.set_src("/hello");
    assert!(el.data().await.is_ok());
    el.set_src("/count");
    assert_eq!(el.data().await.unwrap(), "2");
}

#[tokio::test]
async fn test_refetch_ignores_cache() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);

    el.set_src("/count");
    assert_eq!(el.data().await.unwrap(), "1");
    el.refetch();
    assert_eq!(el.data().await.unwrap(), "2");
    assert_eq!(server.hits("/count"), 2);
}

#[tokio::test]
async fn test_src_resolves_against_base_url() {
    let server = Server::new();
    let host = HostDocument::new();
    host.set_base_url(Some("http://localhost:4000/app/".parse().unwrap()));
    let el = server.element(&host);
    el.set_src("/hello");
    assert_eq!(el.src(), "http://localhost:4000/hello");
    assert_eq!(el.src_attribute().as_deref(), Some("/hello"));
    assert!(el.data().await.is_ok());
}

#[tokio::test]
async fn test_blank_content_type_fails() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.set_src("/blank-type");
    assert_eq!(
        el.data().await,
        Err(FragmentError::TypeMismatch {
            expected: "text/html".into(),
            actual: None,
        })
    );
}

#[tokio::test]
async fn test_wrong_content_type_fails() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.set_src("/test.js");
    let err = el.data().await.unwrap_err();
    assert!(err
        .to_string()
        .contains("expected text/html but was text/javascript"));
}

// ── Replacement ─────────────────────────────────────────────

#[tokio::test]
async fn test_replaces_element_when_attached() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.set_src("/hello");
    el.attach_to(host.body());

    assert_eq!(settle(&el).await, LifecycleState::Loaded);
    assert!(!el.is_connected());
    let replaced = host.get_element_by_id("replaced").unwrap();
    assert_eq!(host.text_content(replaced), "hello");
}

#[tokio::test]
async fn test_signal_order_and_connectedness() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.set_src("/hello");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let (doc, node) = (host.clone(), el.node());
    el.listen(move |e| {
        s.lock()
            .unwrap()
            .push((e.name(), doc.is_connected(node)));
    });

    el.attach_to(host.body());
    settle(&el).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ("load-start", true),
            ("pre-replace", true),
            ("load", false),
            ("post-replace", false),
            ("load-end", false),
        ]
    );
}

#[tokio::test]
async fn test_replaces_with_many_nodes() {
    let server = Server::new();
    let host = HostDocument::new();
    let div = host.create_element("div");
    host.append_child(host.body(), div);

    let el = server.element(&host);
    el.set_src("/one-two");
    el.attach_to(div);
    settle(&el).await;

    assert_eq!(
        host.read(|d| d.inner_html(div)),
        r#"<p id="one">one</p><p id="two">two</p>"#
    );
}

#[tokio::test]
async fn test_upgrade_existing_markup() {
    let server = Server::new();
    let host = HostDocument::parse(
        r#"<html><body><div class="box"><include-fragment src="/one-two"></include-fragment></div></body></html>"#,
    );

    let elements = IncludeFragment::upgrade_all_with(&host, server.pipeline());
    assert_eq!(elements.len(), 1);
    settle(&elements[0]).await;

    let one = host.get_element_by_id("one").unwrap();
    assert_eq!(host.text_content(one), "one");
    assert!(host.elements_by_tag(TAG_NAME).is_empty());
    assert!(IncludeFragment::upgrade_all_with(&host, server.pipeline()).is_empty());
}

#[tokio::test]
async fn test_upgraded_lazy_handle_loads_when_visible() {
    let server = Server::new();
    let host = HostDocument::parse(
        r#"<html><body><div id="box" hidden><include-fragment loading="lazy" src="/hello"></include-fragment></div></body></html>"#,
    );

    // Handles must stay alive for the gate to stay armed.
    let elements = IncludeFragment::upgrade_all_with(&host, server.pipeline());
    let mut rx = elements[0].subscribe();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(server.hits("/hello"), 0);

    let container = host.get_element_by_id("box").unwrap();
    host.set_hidden(container, false);
    wait_for(&mut rx, "load-end").await;
    assert!(host.get_element_by_id("replaced").is_some());
    assert_eq!(server.hits("/hello"), 1);
}

#[tokio::test]
async fn test_wildcard_accept_admits_any_type() {
    let server = Server::new();
    let host = HostDocument::new();
    let div = host.create_element("div");
    host.append_child(host.body(), div);

    let el = server.element(&host);
    el.set_accept("*/*");
    el.set_src("/test.js");
    el.attach_to(div);

    assert_eq!(settle(&el).await, LifecycleState::Loaded);
    assert_eq!(host.text_content(div), "alert('what')");
}

#[tokio::test]
async fn test_accept_is_sent_as_request_header() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.set_accept("text/fragment+html");
    el.set_src("/fragment");
    el.attach_to(host.body());

    assert_eq!(settle(&el).await, LifecycleState::Loaded);
    let fragment = host.get_element_by_id("fragment").unwrap();
    assert_eq!(host.text_content(fragment), "fragment");
}

#[tokio::test]
async fn test_pre_replace_can_edit_fragment() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.listen_replace(|e| {
        if let Some(div) = e.fragment.element_by_id_mut("replaced") {
            div.set_text_content("hey");
        }
    });
    el.set_src("/hello");
    el.attach_to(host.body());
    settle(&el).await;

    let replaced = host.get_element_by_id("replaced").unwrap();
    assert_eq!(host.text_content(replaced), "hey");
}

#[tokio::test]
async fn test_pre_replace_cancel_keeps_element() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.listen_replace(|e| e.prevent_default());
    let seen = record(&el);

    el.set_src("/hello");
    el.attach_to(host.body());

    assert_eq!(settle(&el).await, LifecycleState::Loaded);
    assert!(el.is_connected());
    assert!(host.get_element_by_id("replaced").is_none());
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["load-start", "pre-replace", "load", "load-end"]
    );
}

#[tokio::test]
async fn test_post_replace_fires_once() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    let seen = record(&el);
    el.set_src("/hello");
    el.attach_to(host.body());
    settle(&el).await;

    // The element is gone from the document; further activity is inert.
    el.set_src("/one-two");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(count(&seen, "post-replace"), 1);
    assert_eq!(count(&seen, "load-start"), 1);
}

// ── Failure ─────────────────────────────────────────────────

#[tokio::test]
async fn test_error_status_marks_element() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let r = reasons.clone();
    el.listen(move |e| {
        if let FragmentEvent::Error { reason, .. } = e {
            r.lock().unwrap().push(reason.clone());
        }
    });
    let seen = record(&el);

    el.set_src("/boom");
    el.attach_to(host.body());

    assert_eq!(settle(&el).await, LifecycleState::Errored);
    assert!(el.is_connected());
    assert!(host.has_class(el.node(), ERROR_CLASS));
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["load-start", "error", "load-end"]
    );
    assert_eq!(
        reasons.lock().unwrap()[0],
        "Failed to load resource: the server responded with a status of 500"
    );
    assert_eq!(
        el.data().await,
        Err(FragmentError::HttpStatus { code: 500 })
    );
}

#[tokio::test]
async fn test_next_activation_clears_error_class() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.listen_replace(|e| e.prevent_default());

    el.set_src("/boom");
    el.attach_to(host.body());
    settle(&el).await;
    assert!(host.has_class(el.node(), ERROR_CLASS));

    el.set_src("/hello");
    assert!(!host.has_class(el.node(), ERROR_CLASS));
    assert_eq!(settle(&el).await, LifecycleState::Loaded);
}

// ── Detachment and supersession ─────────────────────────────

#[tokio::test]
async fn test_detached_before_settle_does_not_replace() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    let seen = record(&el);

    el.set_src("/slow-hello");
    el.attach_to(host.body());
    el.remove();

    assert_eq!(settle(&el).await, LifecycleState::Idle);
    assert!(host.get_element_by_id("replaced").is_none());
    assert_eq!(*seen.lock().unwrap(), vec!["load-start", "load-end"]);

    // Reattaching replays the cached outcome without another request.
    el.attach_to(host.body());
    assert_eq!(settle(&el).await, LifecycleState::Loaded);
    assert!(host.get_element_by_id("replaced").is_some());
    assert_eq!(server.hits("/slow-hello"), 1);
}

#[tokio::test]
async fn test_same_src_while_in_flight_is_one_activation() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    let seen = record(&el);

    el.set_src("/slow-hello");
    el.attach_to(host.body());
    el.set_src("/slow-hello");
    el.load();
    settle(&el).await;

    assert_eq!(server.hits("/slow-hello"), 1);
    assert_eq!(count(&seen, "load-start"), 1);
    assert_eq!(count(&seen, "load-end"), 1);
}

#[tokio::test]
async fn test_superseded_activation_is_discarded() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    let seen = record(&el);

    el.set_src("/slow-hello");
    el.attach_to(host.body());
    el.set_src("/one-two");

    assert_eq!(settle(&el).await, LifecycleState::Loaded);
    // Let the slow request finish too.
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(host.get_element_by_id("one").is_some());
    assert!(host.get_element_by_id("replaced").is_none());
    assert_eq!(count(&seen, "load-start"), 2);
    assert_eq!(count(&seen, "load"), 1);
    assert_eq!(count(&seen, "load-end"), 2);
}

#[tokio::test]
async fn test_refetch_reactivates_connected_element() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    el.listen_replace(|e| e.prevent_default());
    let seen = record(&el);

    el.set_src("/count");
    el.attach_to(host.body());
    settle(&el).await;
    assert_eq!(el.data().await.unwrap(), "1");

    el.refetch();
    settle(&el).await;
    assert_eq!(el.data().await.unwrap(), "2");
    assert_eq!(count(&seen, "load-start"), 2);
}

// ── Lazy loading ────────────────────────────────────────────

#[tokio::test]
async fn test_lazy_waits_until_visible() {
    let server = Server::new();
    let host = HostDocument::new();
    let div = hidden_container(&host);

    let el = server.element(&host);
    let mut rx = el.subscribe();
    el.set_loading(LoadingMode::Lazy);
    el.set_src("/hello");
    el.attach_to(div);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(server.hits("/hello"), 0);
    assert_eq!(el.state(), LifecycleState::Idle);

    host.set_hidden(div, false);
    wait_for(&mut rx, "load-end").await;
    assert!(host.get_element_by_id("replaced").is_some());
    assert_eq!(server.hits("/hello"), 1);
}

#[tokio::test]
async fn test_lazy_src_change_discards_pending_result() {
    let server = Server::new();
    let host = HostDocument::new();
    let div = hidden_container(&host);

    let el = server.element(&host);
    let seen = record(&el);
    el.set_loading(LoadingMode::Lazy);
    el.set_src("/slow-hello");
    el.attach_to(div);

    el.load();
    el.set_src("/one-two");

    assert_eq!(settle(&el).await, LifecycleState::Idle);
    assert!(el.is_connected());
    assert!(host.get_element_by_id("replaced").is_none());
    assert_eq!(*seen.lock().unwrap(), vec!["load-start", "load-end"]);
    assert_eq!(server.hits("/one-two"), 0);

    // The new locator loads once the element becomes visible.
    let mut rx = el.subscribe();
    host.set_hidden(div, false);
    wait_for(&mut rx, "load-end").await;
    assert!(host.get_element_by_id("one").is_some());
    assert_eq!(server.hits("/one-two"), 1);
}

#[tokio::test]
async fn test_lazy_src_change_while_hidden_does_not_load() {
    let server = Server::new();
    let host = HostDocument::new();
    let div = hidden_container(&host);

    let el = server.element(&host);
    el.set_loading(LoadingMode::Lazy);
    el.attach_to(div);
    el.set_src("/hello");

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(server.hits("/hello"), 0);
    assert!(el.is_connected());
}

#[tokio::test]
async fn test_lazy_load_then_visible_loads_once() {
    let server = Server::new();
    let host = HostDocument::new();
    let div = hidden_container(&host);

    let el = server.element(&host);
    let seen = record(&el);
    el.set_loading(LoadingMode::Lazy);
    el.set_src("/hello");
    el.attach_to(div);

    el.load().await.unwrap();
    settle(&el).await;
    host.set_hidden(div, false);
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(count(&seen, "load-start"), 1);
    assert!(host.get_element_by_id("replaced").is_some());
}

#[tokio::test]
async fn test_switching_to_eager_unblocks_lazy() {
    let server = Server::new();
    let host = HostDocument::new();
    let div = hidden_container(&host);

    let el = server.element(&host);
    el.set_loading(LoadingMode::Lazy);
    el.set_src("/hello");
    el.attach_to(div);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(server.hits("/hello"), 0);

    el.set_loading(LoadingMode::Eager);
    assert_eq!(settle(&el).await, LifecycleState::Loaded);
    assert!(host.get_element_by_id("replaced").is_some());
    assert_eq!(server.hits("/hello"), 1);

    // The gate was torn down, so becoming visible does not load again.
    host.set_hidden(div, false);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(server.hits("/hello"), 1);
}

#[tokio::test]
async fn test_lazy_visible_element_loads_on_attach() {
    let server = Server::new();
    let host = HostDocument::new();
    let el = server.element(&host);
    let mut rx = el.subscribe();
    el.set_loading_attribute("LAZY ");
    assert_eq!(el.loading(), LoadingMode::Lazy);
    el.set_src("/hello");
    el.attach_to(host.body());

    wait_for(&mut rx, "load-end").await;
    assert!(host.get_element_by_id("replaced").is_some());
}
