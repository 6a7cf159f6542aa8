//! End-to-end tests for `Controller` against a scripted in-memory
//! controller: initial sync, optimistic toggles, re-sync on reconnect,
//! schedule conversion on the wire, and teardown.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use espgrow_api::{Connector, Error, Transport};
use espgrow_api::telemetry;
use espgrow_core::{
    ConnectionState, Controller, ControllerConfig, HistoryRange, NewRule, TelemetryPoint,
};
use futures_util::future::BoxFuture;
use futures_util::{sink, stream};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

// ── Scripted controller ─────────────────────────────────────────────

/// Controller side of one accepted connection.
struct Peer {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    async fn next_frame(&mut self) -> Value {
        let text = self.from_client.recv().await.unwrap();
        serde_json::from_str(&text).unwrap()
    }

    async fn next_kinds(&mut self, n: usize) -> Vec<String> {
        let mut kinds = Vec::with_capacity(n);
        for _ in 0..n {
            let frame = self.next_frame().await;
            kinds.push(frame["type"].as_str().unwrap().to_owned());
        }
        kinds
    }

    fn push(&self, frame: &Value) {
        self.to_client.send(frame.to_string()).unwrap();
    }
}

struct ScriptedConnector {
    peers: mpsc::UnboundedSender<Peer>,
}

impl Connector for ScriptedConnector {
    fn connect<'a>(&'a self, _url: &'a Url) -> BoxFuture<'a, Result<Transport, Error>> {
        Box::pin(async move {
            let (client_tx, from_client) = mpsc::unbounded_channel::<String>();
            let (to_client, client_rx) = mpsc::unbounded_channel::<String>();

            let sink = sink::unfold(client_tx, |tx, text: String| async move {
                tx.send(text).map_err(|_| Error::ChannelClosed)?;
                Ok::<_, Error>(tx)
            });
            let stream = stream::unfold(client_rx, |mut rx| async move {
                rx.recv().await.map(|text| (Ok(text), rx))
            });

            let _ = self.peers.send(Peer {
                to_client,
                from_client,
            });
            Ok(Transport::new(Box::pin(sink), Box::pin(stream)))
        })
    }
}

fn controller(utc_offset_minutes: Option<i32>) -> (Controller, mpsc::UnboundedReceiver<Peer>) {
    let (peers_tx, peers) = mpsc::unbounded_channel();
    let mut config = ControllerConfig::new(Url::parse("ws://192.168.1.40/ws").unwrap());
    config.utc_offset_minutes = utc_offset_minutes;
    let controller =
        Controller::with_connector(config, ScriptedConnector { peers: peers_tx }).unwrap();
    (controller, peers)
}

const SYNC_REQUESTS: [&str; 5] = [
    "get_sensors",
    "get_devices",
    "get_rules",
    "get_settings",
    "get_system_info",
];

fn devices_push(fan_on: bool) -> Value {
    json!({
        "type": "devices",
        "data": [
            {
                "id": "fan_exhaust", "name": "Exhaust Fan", "type": "fan",
                "controlMethod": "shelly_gen2", "ipAddress": "192.168.1.50", "isOn": fan_on
            },
            {
                "id": "pump", "name": "Pump", "type": "pump",
                "controlMethod": "relay", "gpioPin": 17, "isOn": false
            }
        ]
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn open_requests_every_collection() {
    let (controller, mut peers) = controller(Some(0));
    controller.connect().unwrap();

    let mut peer = peers.recv().await.unwrap();
    controller.wait_open(Duration::from_secs(5)).await.unwrap();
    assert_eq!(peer.next_kinds(5).await, SYNC_REQUESTS.to_vec());

    peer.push(&devices_push(false));
    peer.push(&json!({
        "type": "sensor_config",
        "data": [{ "id": "sht4x_temp", "name": "Temperature", "type": "temperature", "unit": "°C" }]
    }));
    peer.push(&json!({ "type": "settings", "timezoneOffsetMinutes": 60 }));

    controller.devices().wait_synced().await;
    controller.sensors().wait_synced().await;
    controller.settings().wait_synced().await;

    assert_eq!(controller.devices().snapshot().len(), 2);
    assert_eq!(controller.sensors().get("sht4x_temp").unwrap().unit, "°C");
    assert_eq!(
        controller.settings().settings().unwrap().timezone_offset_minutes,
        60
    );
}

#[tokio::test(start_paused = true)]
async fn toggle_round_trip_confirms_state() {
    let (controller, mut peers) = controller(Some(0));
    controller.connect().unwrap();
    let mut peer = peers.recv().await.unwrap();
    peer.next_kinds(5).await;

    peer.push(&devices_push(false));
    controller.devices().wait_synced().await;

    assert!(controller.devices().toggle("fan_exhaust").unwrap());
    assert!(!controller.devices().toggle("fan_exhaust").unwrap());
    assert_eq!(
        peer.next_frame().await,
        json!({
            "type": "device_control",
            "data": { "method": "shelly_gen2", "target": "192.168.1.50", "on": true }
        })
    );
    assert!(controller.devices().is_pending("fan_exhaust"));
    assert!(!controller.devices().get("fan_exhaust").unwrap().is_on);

    let mut pending = controller.devices().watch_pending();
    peer.push(&json!({
        "type": "device_status",
        "deviceId": "fan_exhaust",
        "target": "192.168.1.50",
        "on": true,
        "success": true,
        "overrideActive": true,
        "overrideRemainingMs": 300_000
    }));
    pending.wait_for(|set| set.is_empty()).await.unwrap();

    let fan = controller.devices().get("fan_exhaust").unwrap();
    assert!(fan.is_on);
    assert_eq!(
        controller.devices().override_remaining("fan_exhaust"),
        Some(Duration::from_secs(300))
    );
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_toggle_clears_after_safety_timeout() {
    let (controller, mut peers) = controller(Some(0));
    controller.connect().unwrap();
    let mut peer = peers.recv().await.unwrap();
    peer.next_kinds(5).await;
    peer.push(&devices_push(false));
    controller.devices().wait_synced().await;

    assert!(controller.devices().toggle("pump").unwrap());
    let frame = peer.next_frame().await;
    assert_eq!(frame["data"]["target"], "17");

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert!(controller.devices().is_pending("pump"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!controller.devices().is_pending("pump"));
    assert!(!controller.devices().get("pump").unwrap().is_on);
}

#[tokio::test(start_paused = true)]
async fn reopen_requests_everything_again() {
    let (controller, mut peers) = controller(Some(0));
    controller.connect().unwrap();

    let mut first = peers.recv().await.unwrap();
    assert_eq!(first.next_kinds(5).await, SYNC_REQUESTS.to_vec());

    // Controller reboots: the stream ends and the channel reconnects.
    drop(first);
    let mut second = peers.recv().await.unwrap();
    controller.wait_open(Duration::from_secs(10)).await.unwrap();
    assert_eq!(second.next_kinds(5).await, SYNC_REQUESTS.to_vec());
}

#[tokio::test(start_paused = true)]
async fn history_arrives_in_either_frame_shape() {
    let (controller, mut peers) = controller(Some(0));
    controller.connect().unwrap();
    let mut peer = peers.recv().await.unwrap();
    peer.next_kinds(5).await;

    let points = [
        TelemetryPoint { timestamp: 1_700_000_000, value: 24.5 },
        TelemetryPoint { timestamp: 1_700_000_060, value: 24.7 },
    ];
    let encoded = telemetry::encode_telemetry_base64(&points);
    let mut updates = controller.sensors().watch_history();

    controller
        .sensors()
        .request_history("sht4x_temp", HistoryRange::Short)
        .unwrap();
    let request = peer.next_frame().await;
    assert_eq!(request["type"], "get_history");

    peer.push(&json!({
        "type": "history", "sensorId": "sht4x_temp", "range": "12h",
        "pointSize": 8, "count": 2, "data": encoded
    }));
    updates.changed().await.unwrap();
    let series = controller
        .sensors()
        .history("sht4x_temp", HistoryRange::Short)
        .unwrap();
    assert_eq!(series.points, points.to_vec());

    peer.push(&json!({
        "type": "history", "sensorId": "scd4x_co2", "range": "24h",
        "pointSize": 8, "count": 2, "payload": encoded
    }));
    updates.changed().await.unwrap();
    assert_eq!(
        controller
            .sensors()
            .history("scd4x_co2", HistoryRange::Medium)
            .unwrap()
            .points
            .len(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn schedule_rules_cross_the_wire_in_utc() {
    let (controller, mut peers) = controller(Some(-300));
    controller.connect().unwrap();
    let mut peer = peers.recv().await.unwrap();
    peer.next_kinds(5).await;

    controller
        .rules()
        .add(NewRule::schedule("lights", "Lights", "08:00", "20:00", "light_main"))
        .unwrap();
    let frame = peer.next_frame().await;
    assert_eq!(frame["type"], "add_rule");
    assert_eq!(frame["data"]["ruleType"], "schedule");
    assert_eq!(frame["data"]["onTime"], "13:00");
    assert_eq!(frame["data"]["offTime"], "01:00");

    peer.push(&json!({
        "type": "rules",
        "data": [{
            "id": "lights", "name": "Lights", "enabled": true, "type": "schedule",
            "onTime": "13:00", "offTime": "01:00", "deviceId": "light_main", "action": "turn_on"
        }]
    }));
    controller.rules().wait_synced().await;

    let rule = controller.rules().get("lights").unwrap();
    assert_eq!(rule.on_time.as_deref(), Some("08:00"));
    assert_eq!(rule.off_time.as_deref(), Some("20:00"));
}

#[tokio::test(start_paused = true)]
async fn commands_before_connect_are_queued() {
    let (controller, mut peers) = controller(Some(0));
    controller.rules().toggle("night_heat").unwrap();
    assert_eq!(controller.channel().queued_len(), 1);

    controller.connect().unwrap();
    let mut peer = peers.recv().await.unwrap();

    // The queue flushes before the open watcher's requests.
    assert_eq!(
        peer.next_frame().await,
        json!({ "type": "toggle_rule", "data": { "id": "night_heat" } })
    );
    assert_eq!(peer.next_kinds(5).await, SYNC_REQUESTS.to_vec());
}

#[tokio::test(start_paused = true)]
async fn shutdown_detaches_everything() {
    let (controller, mut peers) = controller(Some(0));
    controller.connect().unwrap();
    let _peer = peers.recv().await.unwrap();
    controller.wait_open(Duration::from_secs(5)).await.unwrap();

    assert_eq!(controller.channel().subscriber_count("devices"), 1);
    controller.shutdown().await;

    assert_eq!(controller.connection_state(), ConnectionState::Closed);
    assert_eq!(controller.channel().subscriber_count("devices"), 0);
    assert_eq!(controller.channel().subscriber_count("rules"), 0);
    assert!(controller.connect().is_err());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(peers.try_recv().is_err());
}
