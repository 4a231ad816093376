//! Relay Flow Integration Tests
//!
//! Drives the real downstream WebSocket server with in-process fakes for
//! the instrument lookup and the feed's subscription endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use feed_relay::application::services::RouteOutcome;
use feed_relay::{
    ClientRegistry, DownstreamServer, DownstreamState, EventCategory, EventRouter,
    FeedInstrumentHandle, FeedRequestError, FeedSubscriptionPort, InstrumentDescriptor,
    InstrumentDirectory, InstrumentLookupPort, LogCategory, LookupError, MemorySink,
    RecordSinkPort, SinkSet, SubscriptionService,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Fakes
// =============================================================================

struct FakeLookup {
    handles: HashMap<String, FeedInstrumentHandle>,
}

impl FakeLookup {
    fn new() -> Self {
        let handles = [("NIFTY", 1, 26000, "INDEX"), ("RELIANCE", 1, 2885, "EQ")]
            .into_iter()
            .map(|(name, segment, id, kind)| {
                (
                    name.to_string(),
                    FeedInstrumentHandle {
                        exchange_segment: segment,
                        exchange_instrument_id: id,
                        instrument_type: kind.to_string(),
                        name: name.to_string(),
                    },
                )
            })
            .collect();
        Self { handles }
    }
}

#[async_trait]
impl InstrumentLookupPort for FakeLookup {
    async fn resolve(
        &self,
        descriptor: &InstrumentDescriptor,
    ) -> Result<FeedInstrumentHandle, LookupError> {
        self.handles
            .get(&descriptor.symbol)
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                symbol: descriptor.symbol.clone(),
                exchange: descriptor.exchange.clone(),
            })
    }
}

/// Accepts subscribes; rejects unsubscribes for ids never subscribed.
#[derive(Default)]
struct FakeFeed {
    subscribed: Mutex<HashSet<u64>>,
}

fn reply(kind: &str, code: &str, description: &str) -> Map<String, Value> {
    let Value::Object(map) = json!({"type": kind, "code": code, "description": description})
    else {
        unreachable!()
    };
    map
}

#[async_trait]
impl FeedSubscriptionPort for FakeFeed {
    async fn subscribe(
        &self,
        handle: &FeedInstrumentHandle,
    ) -> Result<Map<String, Value>, FeedRequestError> {
        self.subscribed.lock().insert(handle.exchange_instrument_id);
        Ok(reply("success", "s-session-0001", "Instrument subscribed successfully!"))
    }

    async fn unsubscribe(
        &self,
        handle: &FeedInstrumentHandle,
    ) -> Result<Map<String, Value>, FeedRequestError> {
        if self.subscribed.lock().remove(&handle.exchange_instrument_id) {
            Ok(reply("success", "s-session-0001", "Instrument unsubscribed successfully!"))
        } else {
            Err(FeedRequestError::Rejected {
                kind: "error".to_string(),
                code: Some("e-session-0003".to_string()),
                description: "Instrument not subscribed".to_string(),
            })
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Relay {
    url: String,
    directory: Arc<InstrumentDirectory>,
    registry: Arc<ClientRegistry>,
    router: EventRouter,
    sinks: HashMap<LogCategory, Arc<MemorySink>>,
    cancel: CancellationToken,
}

impl Relay {
    async fn start() -> Self {
        let directory = Arc::new(InstrumentDirectory::new());
        let registry = Arc::new(ClientRegistry::new());
        let sinks: HashMap<LogCategory, Arc<MemorySink>> = LogCategory::ALL
            .into_iter()
            .map(|c| (c, Arc::new(MemorySink::new(c))))
            .collect();
        let sink_set = SinkSet::from_fn(|c| {
            let sink: Arc<dyn RecordSinkPort> = sinks[&c].clone();
            sink
        });

        let subscriptions = Arc::new(SubscriptionService::new(
            Arc::new(FakeLookup::new()),
            Arc::new(FakeFeed::default()),
            Arc::clone(&directory),
            Arc::clone(&sink_set.subscriptions),
        ));
        let router = EventRouter::new(Arc::clone(&directory), Arc::clone(&registry), sink_set);

        let cancel = CancellationToken::new();
        let state = Arc::new(DownstreamState::new(
            Arc::clone(&registry),
            subscriptions,
            Arc::clone(&directory),
            16,
            cancel.clone(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = DownstreamServer::new(addr, state, cancel.clone());
        tokio::spawn(async move { server.serve(listener).await.unwrap() });

        Self {
            url: format!("ws://{addr}/"),
            directory,
            registry,
            router,
            sinks,
            cancel,
        }
    }

    async fn connect(&self, client_id: &str) -> Client {
        let (mut ws, _) = tokio_tungstenite::connect_async(&self.url).await.unwrap();
        send(&mut ws, json!({"clientId": {"id": client_id}})).await;
        ws
    }

    async fn wait_for_clients(&self, count: usize) {
        timeout(RECV_TIMEOUT, async {
            while self.registry.len() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {count} registered clients"));
    }

    fn journal(&self, category: LogCategory) -> Vec<Map<String, Value>> {
        self.sinks[&category]
            .records()
            .into_iter()
            .map(feed_relay::LogRecord::into_fields)
            .collect()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

fn subscribe(symbols: &[&str]) -> Value {
    let list: Vec<Value> = symbols
        .iter()
        .map(|s| json!({"symbol": s, "exchange": "NSE"}))
        .collect();
    json!({"subscribe": {"list": list}})
}

fn unsubscribe(symbols: &[&str]) -> Value {
    let list: Vec<Value> = symbols
        .iter()
        .map(|s| json!({"symbol": s, "exchange": "NSE"}))
        .collect();
    json!({"unsubscribe": {"list": list}})
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn subscribe_annotates_and_broadcasts_ltp() {
    let relay = Relay::start().await;
    let mut ws = relay.connect("terminal-1").await;

    send(&mut ws, subscribe(&["NIFTY"])).await;
    let ack = next_json(&mut ws).await;

    assert_eq!(ack["message"]["type"], "success");
    assert_eq!(ack["message"]["name"], "NIFTY");
    assert_eq!(ack["message"]["exchangeInstrumentID"], 26000);
    assert_eq!(ack["message"]["operation"], "Subscribe");
    assert!(ack["message"].get("error").is_none());
    assert_eq!(relay.directory.get(26000).as_deref(), Some("NIFTY"));

    relay.wait_for_clients(1).await;
    relay.router.route(
        EventCategory::LastTradedPrice,
        r#"{"ExchangeInstrumentID":26000,"LastTradedPrice":19500.5}"#,
    );

    let frame = next_json(&mut ws).await;
    assert_eq!(
        frame,
        json!({"marketdata": [{"ExchangeInstrumentID": 26000, "LastTradedPrice": 19500.5, "name": "NIFTY"}]})
    );

    let subs = relay.journal(LogCategory::Subscriptions);
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0]["operation"], "Subscribe");
    assert_eq!(subs[0]["error"], Value::Null);
    assert_eq!(relay.journal(LogCategory::LastTradedPrice).len(), 1);
}

#[tokio::test]
async fn one_notification_per_descriptor() {
    let relay = Relay::start().await;
    let mut ws = relay.connect("terminal-1").await;

    send(&mut ws, subscribe(&["NIFTY", "RELIANCE", "UNKNOWN"])).await;

    let mut names = Vec::new();
    for _ in 0..3 {
        let msg = next_json(&mut ws).await;
        names.push(msg["message"]["name"].as_str().unwrap().to_string());
        if msg["message"]["name"] == "UNKNOWN" {
            assert_eq!(msg["message"]["type"], "error");
            assert_eq!(msg["message"]["stage"], "lookup");
        }
    }
    names.sort();

    assert_eq!(names, ["NIFTY", "RELIANCE", "UNKNOWN"]);
    assert_eq!(relay.directory.len(), 2);
    assert_eq!(relay.journal(LogCategory::Subscriptions).len(), 3);
}

#[tokio::test]
async fn invalid_entry_does_not_block_the_rest_of_the_list() {
    let relay = Relay::start().await;
    let mut ws = relay.connect("terminal-1").await;

    send(
        &mut ws,
        json!({"subscribe": {"list": [
            {"symbol": "NIFTY", "exchange": "NSE"},
            {"symbol": "BANKNIFTY"},
            {"symbol": "RELIANCE", "exchange": "NSE"}
        ]}}),
    )
    .await;

    let mut successes = Vec::new();
    let mut failures = Vec::new();
    for _ in 0..3 {
        let msg = next_json(&mut ws).await;
        let name = msg["message"]["name"].as_str().unwrap().to_string();
        if msg["message"]["type"] == "success" {
            successes.push(name);
        } else {
            assert_eq!(msg["message"]["stage"], "lookup");
            failures.push(name);
        }
    }
    successes.sort();

    assert_eq!(successes, ["NIFTY", "RELIANCE"]);
    assert_eq!(failures, ["BANKNIFTY"]);
    assert_eq!(relay.directory.len(), 2);
    assert_eq!(relay.journal(LogCategory::Subscriptions).len(), 3);
}

#[tokio::test]
async fn market_depth_is_journaled_but_not_broadcast() {
    let relay = Relay::start().await;
    let mut ws = relay.connect("terminal-1").await;
    relay.wait_for_clients(1).await;

    relay.router.route(EventCategory::MarketDepth, r#"{"ExchangeInstrumentID":26000,"Bids":[]}"#);
    relay.router.route(EventCategory::Candle, r#"{"ExchangeInstrumentID":26000,"Close":1.0}"#);

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["marketdata"][0]["Close"], 1.0);
    assert_eq!(frame["marketdata"][0]["name"], Value::Null);

    let depth = relay.journal(LogCategory::MarketDepth);
    assert_eq!(depth.len(), 1);
    assert_eq!(depth[0]["name"], Value::Null);
}

#[tokio::test]
async fn broadcast_reaches_every_client() {
    let relay = Relay::start().await;
    let mut a = relay.connect("a").await;
    let mut b = relay.connect("b").await;
    relay.wait_for_clients(2).await;

    relay.router.route(EventCategory::Candle, r#"{"ExchangeInstrumentID":1}"#);

    assert!(next_json(&mut a).await.get("marketdata").is_some());
    assert!(next_json(&mut b).await.get("marketdata").is_some());
}

#[tokio::test]
async fn unsubscribe_removes_directory_entry() {
    let relay = Relay::start().await;
    let mut ws = relay.connect("terminal-1").await;

    send(&mut ws, subscribe(&["NIFTY"])).await;
    next_json(&mut ws).await;
    send(&mut ws, unsubscribe(&["NIFTY"])).await;
    let msg = next_json(&mut ws).await;

    assert_eq!(msg["message"]["type"], "success");
    assert_eq!(msg["message"]["operation"], "Unsubscribe");
    assert!(relay.directory.get(26000).is_none());
}

#[tokio::test]
async fn unsubscribe_never_subscribed_reports_failure() {
    let relay = Relay::start().await;
    let mut ws = relay.connect("terminal-1").await;
    relay.directory.set(2885, "RELIANCE-EXISTING");

    send(&mut ws, unsubscribe(&["RELIANCE"])).await;
    let msg = next_json(&mut ws).await;

    assert_eq!(msg["message"]["type"], "error");
    assert_eq!(msg["message"]["code"], "e-session-0003");
    assert_eq!(msg["message"]["operation"], "Unsubscribe");
    assert_eq!(relay.directory.get(2885).as_deref(), Some("RELIANCE-EXISTING"));

    let subs = relay.journal(LogCategory::Subscriptions);
    assert_eq!(subs.len(), 1);
    assert!(subs[0].get("error").is_none());
}

#[tokio::test]
async fn malformed_messages_are_ignored() {
    let relay = Relay::start().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&relay.url).await.unwrap();

    ws.send(Message::Text("not json".to_string().into())).await.unwrap();
    send(&mut ws, json!({"ping": {}})).await;
    send(&mut ws, json!({"clientId": {"id": 7}})).await;

    relay.wait_for_clients(1).await;
    assert_eq!(relay.registry.client_ids()[0].as_str(), "7");
}

#[tokio::test]
async fn disconnect_unregisters_client() {
    let relay = Relay::start().await;
    let mut ws = relay.connect("terminal-1").await;
    relay.wait_for_clients(1).await;

    tokio_test::assert_ok!(ws.close(None).await);

    relay.wait_for_clients(0).await;
    let outcome = relay.router.route(EventCategory::Candle, r#"{"ExchangeInstrumentID":1}"#);
    assert!(matches!(
        outcome,
        RouteOutcome::Routed { broadcast: Some(report), .. } if report.attempted == 0
    ));
}

#[tokio::test]
async fn reregistered_id_survives_old_connection_closing() {
    let relay = Relay::start().await;
    let mut old = relay.connect("terminal-1").await;
    relay.wait_for_clients(1).await;
    let mut new = relay.connect("terminal-1").await;

    // Registration on the new connection is observable once it echoes a reply.
    send(&mut new, subscribe(&["NIFTY"])).await;
    next_json(&mut new).await;

    old.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(relay.registry.len(), 1);

    relay.router.route(EventCategory::LastTradedPrice, r#"{"ExchangeInstrumentID":26000}"#);
    let frame = next_json(&mut new).await;
    assert_eq!(frame["marketdata"][0]["name"], "NIFTY");
}
