//! End-to-end tests for the realtime sync protocol.
//! Spins up a real server on a free port and speaks the wire envelopes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use taskifyd::board::{Category, Task};
use taskifyd::config::BoardConfig;
use taskifyd::store::TaskStore;
use taskifyd::sync;
use taskifyd::sync::event::EventBroadcaster;
use taskifyd::sync::session::SessionRegistry;
use taskifyd::AppContext;

type Ws = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn get_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a sync server on a random port and return its WebSocket URL. The
/// TempDir guard travels with it so the data dir outlives the test and is
/// removed afterwards.
async fn start_test_server() -> (String, Arc<AppContext>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();
    let port = get_free_port();

    let config = Arc::new(BoardConfig::new(
        Some(port),
        Some(get_free_port()),
        Some(data_dir.clone()),
        Some("warn".to_string()),
        None,
        None,
    ));
    let store = Arc::new(TaskStore::open(&data_dir).await.unwrap());
    let ctx = Arc::new(AppContext {
        config,
        store,
        broadcaster: Arc::new(EventBroadcaster::new()),
        sessions: Arc::new(SessionRegistry::new()),
        started_at: std::time::Instant::now(),
    });

    let ctx_server = ctx.clone();
    tokio::spawn(async move {
        sync::run(ctx_server).await.ok();
    });

    // Give the server a moment to bind
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("ws://127.0.0.1:{port}"), ctx, dir)
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.expect("ws connect failed");
    ws
}

async fn send(ws: &mut Ws, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    ws.send(Message::Text(frame)).await.unwrap();
}

/// Read frames until one matches the wanted event name; returns its data.
async fn recv_event(ws: &mut Ws, event: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {event}"))
            .expect("connection closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(&text).unwrap();
            if frame["event"] == event {
                return frame["data"].clone();
            }
        }
    }
}

/// Create a task over the wire and return its assigned id.
async fn create_task(ws: &mut Ws, title: &str, category: &str, order: i64, owner: &str) -> String {
    send(
        ws,
        "task-creation",
        json!({ "title": title, "category": category, "order": order, "addedBy": owner }),
    )
    .await;
    let ack = recv_event(ws, "ack").await;
    assert_eq!(ack["for"], "task-creation");
    assert_eq!(ack["ok"], true);
    ack["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn create_acks_and_broadcasts_owner_board() {
    let (url, _ctx, _dir) = start_test_server().await;
    let mut ws = connect(&url).await;

    let id = create_task(&mut ws, "write tests", "todos", 0, "a@x.com").await;

    // The creating connection watches the owner and receives the refresh.
    let tasks = recv_event(&mut ws, "updatedTasks").await;
    let tasks = tasks.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], id.as_str());
    assert_eq!(tasks[0]["addedBy"], "a@x.com");
}

#[tokio::test]
async fn fetch_returns_only_owner_tasks_sorted_by_order() {
    let (url, _ctx, _dir) = start_test_server().await;
    let mut ws = connect(&url).await;

    let second = create_task(&mut ws, "second", "todos", 1, "a@x.com").await;
    let first = create_task(&mut ws, "first", "todos", 0, "a@x.com").await;
    create_task(&mut ws, "other board", "todos", 0, "b@y.com").await;

    send(&mut ws, "get-tasks", json!("a@x.com")).await;
    let tasks = recv_event(&mut ws, "userTasks").await;
    let ids: Vec<&str> = tasks
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, [first.as_str(), second.as_str()]);
}

#[tokio::test]
async fn move_category_preserves_id_and_title() {
    let (url, _ctx, _dir) = start_test_server().await;
    let mut ws = connect(&url).await;

    let t1 = create_task(&mut ws, "T1", "todos", 0, "a@x.com").await;
    let t2 = create_task(&mut ws, "T2", "todos", 1, "a@x.com").await;

    send(
        &mut ws,
        "update-task-category",
        json!({ "id": t1, "category": "done", "order": 0, "user": "a@x.com" }),
    )
    .await;
    let ack = recv_event(&mut ws, "ack").await;
    assert_eq!(ack["for"], "update-task-category");
    assert_eq!(ack["updated"], true);

    send(&mut ws, "get-tasks", json!("a@x.com")).await;
    let tasks = recv_event(&mut ws, "userTasks").await;
    let tasks = tasks.as_array().unwrap().clone();
    let moved = tasks.iter().find(|t| t["id"] == t1.as_str()).unwrap();
    assert_eq!(moved["category"], "done");
    assert_eq!(moved["title"], "T1");
    let untouched = tasks.iter().find(|t| t["id"] == t2.as_str()).unwrap();
    assert_eq!(untouched["category"], "todos");
    assert_eq!(untouched["order"], 1);
}

#[tokio::test]
async fn reorder_swaps_render_positions() {
    let (url, _ctx, _dir) = start_test_server().await;
    let mut ws = connect(&url).await;

    let t1 = create_task(&mut ws, "T1", "todos", 0, "a@x.com").await;
    let t2 = create_task(&mut ws, "T2", "todos", 1, "a@x.com").await;

    send(
        &mut ws,
        "reorder-items",
        json!({
            "email": "a@x.com",
            "updatedItems": [ { "id": t2, "order": 0 }, { "id": t1, "order": 1 } ]
        }),
    )
    .await;
    let ack = recv_event(&mut ws, "ack").await;
    assert_eq!(ack["for"], "reorder-items");
    assert_eq!(ack["applied"], 2);

    // The refresh broadcast carries the new render order.
    let refreshed = recv_event(&mut ws, "reordered-tasks").await;
    let ids: Vec<&str> = refreshed["updatedTasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, [t2.as_str(), t1.as_str()]);

    send(&mut ws, "get-tasks", json!("a@x.com")).await;
    let tasks = recv_event(&mut ws, "userTasks").await;
    let ids: Vec<&str> = tasks
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, [t2.as_str(), t1.as_str()]);
}

#[tokio::test]
async fn reorder_is_idempotent_over_the_wire() {
    let (url, _ctx, _dir) = start_test_server().await;
    let mut ws = connect(&url).await;

    let t1 = create_task(&mut ws, "T1", "todos", 0, "a@x.com").await;
    let t2 = create_task(&mut ws, "T2", "todos", 1, "a@x.com").await;

    let payload = json!({
        "email": "a@x.com",
        "updatedItems": [ { "id": t2, "order": 0 }, { "id": t1, "order": 1 } ]
    });

    for _ in 0..2 {
        send(&mut ws, "reorder-items", payload.clone()).await;
        let ack = recv_event(&mut ws, "ack").await;
        assert_eq!(ack["ok"], true);
    }

    send(&mut ws, "get-tasks", json!("a@x.com")).await;
    let tasks = recv_event(&mut ws, "userTasks").await;
    let orders: Vec<(&str, i64)> = tasks
        .as_array()
        .unwrap()
        .iter()
        .map(|t| (t["id"].as_str().unwrap(), t["order"].as_i64().unwrap()))
        .collect();
    assert_eq!(orders, [(t2.as_str(), 0), (t1.as_str(), 1)]);
}

#[tokio::test]
async fn second_delete_is_a_visible_noop() {
    let (url, _ctx, _dir) = start_test_server().await;
    let mut ws = connect(&url).await;

    let id = create_task(&mut ws, "doomed", "todos", 0, "a@x.com").await;

    send(&mut ws, "task-delete", json!({ "id": id, "user": "a@x.com" })).await;
    let ack = recv_event(&mut ws, "ack").await;
    assert_eq!(ack["deleted"], true);

    send(&mut ws, "task-delete", json!({ "id": id, "user": "a@x.com" })).await;
    let ack = recv_event(&mut ws, "ack").await;
    assert_eq!(ack["ok"], true);
    assert_eq!(ack["deleted"], false);
}

#[tokio::test]
async fn concurrent_disjoint_reorders_both_land() {
    let (url, ctx, _dir) = start_test_server().await;

    // Seed with known ids so the two payloads can name disjoint sets.
    ctx.store
        .bulk_insert(&[
            task("t1", 0, "a@x.com"),
            task("t2", 1, "a@x.com"),
            task("t3", 2, "a@x.com"),
            task("t4", 3, "a@x.com"),
        ])
        .await
        .unwrap();

    let mut ws_a = connect(&url).await;
    let mut ws_b = connect(&url).await;

    let reorder_a = async {
        send(
            &mut ws_a,
            "reorder-items",
            json!({
                "email": "a@x.com",
                "updatedItems": [ { "id": "t1", "order": 11 }, { "id": "t2", "order": 10 } ]
            }),
        )
        .await;
        recv_event(&mut ws_a, "ack").await
    };
    let reorder_b = async {
        send(
            &mut ws_b,
            "reorder-items",
            json!({
                "email": "a@x.com",
                "updatedItems": [ { "id": "t3", "order": 13 }, { "id": "t4", "order": 12 } ]
            }),
        )
        .await;
        recv_event(&mut ws_b, "ack").await
    };
    let (ack_a, ack_b) = tokio::join!(reorder_a, reorder_b);
    assert_eq!(ack_a["applied"], 2);
    assert_eq!(ack_b["applied"], 2);

    // Neither reorder erased the other's updates.
    let tasks = ctx.store.find_by_owner("a@x.com").await.unwrap();
    let mut orders: Vec<(String, i64)> =
        tasks.into_iter().map(|t| (t.id, t.order)).collect();
    orders.sort();
    assert_eq!(
        orders,
        [
            ("t1".to_string(), 11),
            ("t2".to_string(), 10),
            ("t3".to_string(), 13),
            ("t4".to_string(), 12),
        ]
    );
}

#[tokio::test]
async fn owner_broadcast_reaches_watching_connections() {
    let (url, _ctx, _dir) = start_test_server().await;
    let mut watcher = connect(&url).await;
    let mut editor = connect(&url).await;

    // The watcher starts watching the owner by fetching its board.
    send(&mut watcher, "get-tasks", json!("a@x.com")).await;
    recv_event(&mut watcher, "userTasks").await;

    create_task(&mut editor, "shared", "todos", 0, "a@x.com").await;

    let tasks = recv_event(&mut watcher, "updatedTasks").await;
    assert_eq!(tasks.as_array().unwrap().len(), 1);
    assert_eq!(tasks[0]["title"], "shared");
}

#[tokio::test]
async fn unknown_event_is_ignored_silently() {
    let (url, _ctx, _dir) = start_test_server().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "no-such-event", json!({})).await;

    // The connection stays up and the next event answers first — nothing was
    // queued for the unrecognized name.
    send(&mut ws, "get-tasks", json!("a@x.com")).await;
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Text(text) = msg else { panic!("expected text frame") };
    let frame: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(frame["event"], "userTasks");
}

#[tokio::test]
async fn malformed_payload_gets_typed_error_ack() {
    let (url, _ctx, _dir) = start_test_server().await;
    let mut ws = connect(&url).await;

    send(&mut ws, "task-creation", json!({ "category": "todos" })).await;
    let ack = recv_event(&mut ws, "ack").await;
    assert_eq!(ack["ok"], false);
    assert_eq!(ack["error"]["code"], "malformed-payload");
}

#[tokio::test]
async fn store_failure_acks_without_broadcast_and_keeps_the_connection() {
    let (url, ctx, _dir) = start_test_server().await;
    let mut watcher = connect(&url).await;
    let mut editor = connect(&url).await;

    // The watcher subscribes to the owner while the store is still healthy.
    send(&mut watcher, "get-tasks", json!("a@x.com")).await;
    recv_event(&mut watcher, "userTasks").await;

    // Take the shared store down out from under the running handlers.
    ctx.store.pool().close().await;

    send(
        &mut editor,
        "task-creation",
        json!({ "title": "doomed", "category": "todos", "order": 0, "addedBy": "a@x.com" }),
    )
    .await;
    let ack = recv_event(&mut editor, "ack").await;
    assert_eq!(ack["for"], "task-creation");
    assert_eq!(ack["ok"], false);
    assert_eq!(ack["error"]["code"], "store-unavailable");

    // The failed mutation must not push a refresh to owner watchers.
    let quiet = tokio::time::timeout(Duration::from_millis(300), watcher.next()).await;
    assert!(quiet.is_err(), "no broadcast may follow a failed mutation");

    // The editor's connection survives: the next frame is still answered.
    send(
        &mut editor,
        "task-delete",
        json!({ "id": "whatever", "user": "a@x.com" }),
    )
    .await;
    let ack = recv_event(&mut editor, "ack").await;
    assert_eq!(ack["for"], "task-delete");
    assert_eq!(ack["ok"], false);
    assert_eq!(ack["error"]["code"], "store-unavailable");
}

#[tokio::test]
async fn unknown_category_rows_are_excluded_from_board_views() {
    let (url, ctx, _dir) = start_test_server().await;
    ctx.store
        .bulk_insert(&[task("t1", 0, "a@x.com"), {
            let mut t = task("t2", 1, "a@x.com");
            t.category = Category::parse("urgent");
            t
        }])
        .await
        .unwrap();

    let mut ws = connect(&url).await;
    send(&mut ws, "get-tasks", json!("a@x.com")).await;
    let tasks = recv_event(&mut ws, "userTasks").await;
    let tasks = tasks.as_array().unwrap();
    assert_eq!(tasks.len(), 1, "unknown-category row is excluded, not fatal");
    assert_eq!(tasks[0]["id"], "t1");
}

#[tokio::test]
async fn duplicate_registration_is_a_noop() {
    let (url, ctx, _dir) = start_test_server().await;
    let mut ws = connect(&url).await;

    send(
        &mut ws,
        "users-creation",
        json!({ "email": "a@x.com", "name": "Ada" }),
    )
    .await;
    let ack = recv_event(&mut ws, "ack").await;
    assert_eq!(ack["inserted"], true);

    send(
        &mut ws,
        "users-creation",
        json!({ "email": "a@x.com", "name": "Imposter" }),
    )
    .await;
    let ack = recv_event(&mut ws, "ack").await;
    assert_eq!(ack["inserted"], false);

    let users = ctx.store.list_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "Ada");
}

fn task(id: &str, order: i64, owner: &str) -> Task {
    Task {
        id: id.to_string(),
        title: format!("task {id}"),
        category: Category::Todos,
        order,
        added_by: owner.to_string(),
    }
}
