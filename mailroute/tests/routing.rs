//! End-to-end routing behaviour through the public API.

use std::sync::{Arc, Mutex};

use mailroute::routing::{handler_fn, load_routes, Captures, RoutesFile};
use mailroute::{DeliverError, Delivery, MailRequest, Router, UndeliverableSink, START_STATE};
use tempfile::TempDir;

const ANY_ADDRESS: &str = "^(?P<to>.+)@(?P<host>.+)$";

fn router() -> (TempDir, Router) {
    let temp = TempDir::new().unwrap();
    let sink = UndeliverableSink::open(temp.path().join("undeliverable")).unwrap();
    (temp, Router::new(sink))
}

fn message(sender: &str, recipient: &str) -> MailRequest {
    MailRequest::new(sender, recipient, format!("From: {sender}\r\nTo: {recipient}\r\n\r\nhello"))
}

fn sink_count(router: &Router) -> usize {
    router.undeliverable().store().count().unwrap()
}

#[test]
fn test_confirmation_scenario() {
    let (_temp, router) = router();
    let seen: Arc<Mutex<Vec<Captures>>> = Arc::default();
    let recorder = Arc::clone(&seen);

    router
        .add_route(
            ANY_ADDRESS,
            START_STATE,
            handler_fn("app::start", move |_, captures| {
                recorder.lock().unwrap().push(captures.clone());
                Ok(Some("CONFIRM".to_string()))
            }),
        )
        .unwrap();

    let first = router.deliver(&message("new@sender.org", "user@example.com")).unwrap();
    match first {
        Delivery::Handled {
            handler,
            state,
            next_state,
            captures,
            ..
        } => {
            assert_eq!(handler, "app::start");
            assert_eq!(state, START_STATE);
            assert_eq!(next_state, "CONFIRM");
            assert_eq!(captures["to"], "user");
            assert_eq!(captures["host"], "example.com");
        }
        other => panic!("expected a handled delivery, got {other:?}"),
    }
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(router.state_of("new@sender.org"), "CONFIRM");

    // No (pattern, CONFIRM) route exists, so the reply resolves nowhere.
    let second = router.deliver(&message("new@sender.org", "user@example.com")).unwrap();
    assert!(second.is_no_match());
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(sink_count(&router), 1);
}

#[test]
fn test_state_persists_between_deliveries() {
    let (_temp, router) = router();
    router
        .add_route(ANY_ADDRESS, START_STATE, handler_fn("app::start", |_, _| Ok(Some("CONFIRM".into()))))
        .unwrap();
    router
        .add_route(ANY_ADDRESS, "CONFIRM", handler_fn("app::confirm", |_, _| Ok(Some("DONE".into()))))
        .unwrap();

    let handled_by = |sender: &str| match router.deliver(&message(sender, "list@example.com")).unwrap() {
        Delivery::Handled { handler, .. } => handler,
        Delivery::NoMatch { .. } => "no match".to_string(),
    };

    assert_eq!(handled_by("alice@example.org"), "app::start");
    assert_eq!(handled_by("bob@example.org"), "app::start");
    assert_eq!(handled_by("Alice@Example.org"), "app::confirm");
    assert_eq!(router.state_of("alice@example.org"), "DONE");
    assert_eq!(router.state_of("bob@example.org"), "CONFIRM");
}

#[test]
fn test_earliest_pattern_wins() {
    let (_temp, router) = router();
    router
        .add_route("(?P<to>.+)@example\\.com", START_STATE, handler_fn("app::specific", |_, _| Ok(None)))
        .unwrap();
    router
        .add_route(ANY_ADDRESS, START_STATE, handler_fn("app::catchall", |_, _| Ok(None)))
        .unwrap();

    let delivery = router.deliver(&message("a@b.org", "user@example.com")).unwrap();
    assert!(matches!(delivery, Delivery::Handled { ref handler, .. } if handler == "app::specific"));

    let delivery = router.deliver(&message("a@b.org", "user@elsewhere.org")).unwrap();
    assert!(matches!(delivery, Delivery::Handled { ref handler, .. } if handler == "app::catchall"));
}

#[test]
fn test_routing_order_counts_distinct_patterns() {
    let (_temp, router) = router();
    let patterns = ["a@(?P<host>.+)", "b@(?P<host>.+)", "a@(?P<host>.+)", "c@.+", "b@(?P<host>.+)"];
    let states = ["START", "START", "CONFIRM", "START", "DONE"];

    for (pattern, state) in patterns.iter().zip(states) {
        router
            .add_route(pattern, state, handler_fn("app", |_, _| Ok(None)))
            .unwrap();
    }

    assert_eq!(router.routing_order(), vec!["a@(?P<host>.+)", "b@(?P<host>.+)", "c@.+"]);
}

#[test]
fn test_no_match_lands_in_sink_exactly_once() {
    let (_temp, router) = router();
    router
        .add_route("(?P<to>.+)@example\\.com", START_STATE, handler_fn("app", |_, _| Ok(None)))
        .unwrap();

    let before = sink_count(&router);
    let msg = message("a@b.org", "user@nowhere.test");
    let delivery = router.deliver(&msg).unwrap();

    let Delivery::NoMatch { queue_key } = delivery else {
        panic!("expected no match");
    };
    assert_eq!(sink_count(&router), before + 1);
    assert_eq!(router.undeliverable().store().get(&queue_key).unwrap(), msg.data);
}

#[test]
fn test_clear_routes_always_yields_no_match() {
    let (_temp, router) = router();
    router
        .add_route(ANY_ADDRESS, START_STATE, handler_fn("app", |_, _| Ok(None)))
        .unwrap();
    router.clear_routes();

    assert!(router.routing_order().is_empty());
    for recipient in ["user@example.com", "x@y.z"] {
        assert!(router.deliver(&message("a@b.org", recipient)).unwrap().is_no_match());
    }
    assert_eq!(sink_count(&router), 2);
}

#[test]
fn test_handler_error_keeps_state_and_skips_sink() {
    let (_temp, router) = router();
    router
        .add_route(ANY_ADDRESS, START_STATE, handler_fn("app::flaky", |_, _| Err(anyhow::anyhow!("db down"))))
        .unwrap();

    let err = router.deliver(&message("a@b.org", "user@example.com")).unwrap_err();

    match err {
        DeliverError::Handler { handler, source } => {
            assert_eq!(handler, "app::flaky");
            assert_eq!(source.to_string(), "db down");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(router.state_of("a@b.org"), START_STATE);
    assert_eq!(sink_count(&router), 0);
}

#[test]
fn test_routes_file_drives_confirmation_flow() {
    let (temp, router) = router();
    let pending = temp.path().join("pending");
    let raw = format!(
        r#"
[defaults]
list = "[a-z]+"
host = ".+"

[[route]]
pattern = "(list)-subscribe@(host)"
handler = "queue"
queue_dir = "{}"
next_state = "CONFIRM"

[[route]]
pattern = "(list)-subscribe@(host)"
state = "CONFIRM"
handler = "log"
next_state = "START"
"#,
        pending.display()
    );
    let routes: RoutesFile = toml::from_str(&raw).unwrap();
    assert_eq!(load_routes(&router, &routes).unwrap(), 2);
    assert_eq!(router.routing_order().len(), 1);

    let subscribe = message("reader@example.org", "news-subscribe@lists.example.com");
    router.deliver(&subscribe).unwrap();
    assert_eq!(router.state_of("reader@example.org"), "CONFIRM");

    router.deliver(&subscribe).unwrap();
    assert_eq!(router.state_of("reader@example.org"), START_STATE);

    let pending = mailroute::QueueStore::open(pending).unwrap();
    assert_eq!(pending.count().unwrap(), 1);
    assert_eq!(sink_count(&router), 0);
}
