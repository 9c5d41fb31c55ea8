use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, time::Instant};
use tracing::{debug, info, warn};

use remote_hvac_common::{
    directive_topic, parse_directive, parse_shadow_delta,
    shadow::{DELTA_PARENT_KEY, DESIRED_PARENT_KEY},
    status_topic,
    wire::MAX_INBOUND_PAYLOAD_BYTES,
    ConnectionPhase, Connectivity, ConnectorConfig, FanState, JsonTokenizer, RearmPolicy,
    RuntimeConfig, ShadowDelta, ShadowTopics, StatusUpdate, SyncMode,
};

use crate::{
    bus::{ConnectorInlets, Outlet},
    transport::{Endpoint, InboundCallback, MqttTransport, QosLevel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorRequest {
    /// Leave the broker; the re-arm policy decides what happens next.
    Disconnect,
    /// Leave the broker and stay down.
    Shutdown,
}

pub struct InboundRouter {
    tokenizer: JsonTokenizer,
    hvac_fan: Outlet<FanState>,
    hvac_target: Outlet<f32>,
    shadow_delta: Outlet<ShadowDelta>,
}

impl InboundRouter {
    pub fn new(
        hvac_fan: Outlet<FanState>,
        hvac_target: Outlet<f32>,
        shadow_delta: Outlet<ShadowDelta>,
    ) -> Self {
        Self {
            tokenizer: JsonTokenizer::default(),
            hvac_fan,
            hvac_target,
            shadow_delta,
        }
    }

    fn accept<'p>(topic: &str, payload: &'p [u8]) -> Option<&'p str> {
        if payload.len() >= MAX_INBOUND_PAYLOAD_BYTES {
            warn!(topic, bytes = payload.len(), "dropping oversized payload");
            return None;
        }
        match std::str::from_utf8(payload) {
            Ok(text) => Some(text),
            Err(_) => {
                warn!(topic, "dropping non utf8 payload");
                None
            }
        }
    }

    pub fn on_directive(&self, topic: &str, payload: &[u8]) {
        let Some(text) = Self::accept(topic, payload) else {
            return;
        };

        let directive = parse_directive(&self.tokenizer, text);
        if directive.is_empty() {
            debug!(topic, "directive carried no known fields");
            return;
        }
        if let Some(target) = directive.target {
            self.hvac_target.try_send(target);
        }
        if let Some(fan) = directive.fan {
            self.hvac_fan.try_send(fan);
        }
    }

    pub fn on_shadow_document(&self, topic: &str, payload: &[u8], parent_key: &str) {
        let Some(text) = Self::accept(topic, payload) else {
            return;
        };

        match parse_shadow_delta(&self.tokenizer, text, parent_key) {
            Some(delta) => {
                info!(topic, ?delta, "shadow delta received");
                if !self.shadow_delta.try_send(delta) {
                    warn!(topic, "shadow delta queue full, delta dropped");
                }
            }
            None => debug!(topic, "shadow document carried no thermostat fields"),
        }
    }

    pub fn on_update_result(&self, topic: &str, payload: &[u8], accepted: bool) {
        if accepted {
            debug!(topic, "shadow update accepted");
        } else {
            warn!(
                topic,
                payload = %String::from_utf8_lossy(payload),
                "shadow update rejected"
            );
        }
    }
}

fn callback(handler: impl Fn(&str, &[u8]) + Send + Sync + 'static) -> InboundCallback {
    Arc::new(handler)
}

enum Routes {
    Flat { status: String, directive: String },
    Shadow(ShadowTopics),
}

pub struct Connector<T> {
    phase: ConnectionPhase,
    transport: T,
    settings: ConnectorConfig,
    endpoint: Endpoint,
    routes: Routes,
    router: Arc<InboundRouter>,
    inlets: ConnectorInlets,
    display_connection: Outlet<Connectivity>,
    phase_tx: watch::Sender<ConnectionPhase>,
    stay_down: bool,
    inactive_since: Option<Instant>,
}

impl<T: MqttTransport> Connector<T> {
    pub fn new(
        transport: T,
        runtime: &RuntimeConfig,
        router: InboundRouter,
        inlets: ConnectorInlets,
        display_connection: Outlet<Connectivity>,
        phase_tx: watch::Sender<ConnectionPhase>,
    ) -> Self {
        let thing = runtime.device.thing_name.as_str();
        let routes = match runtime.connector.sync_mode {
            SyncMode::Flat => Routes::Flat {
                status: status_topic(thing),
                directive: directive_topic(thing),
            },
            SyncMode::Shadow => Routes::Shadow(ShadowTopics::for_thing(thing)),
        };
        phase_tx.send_replace(ConnectionPhase::Init);

        Self {
            phase: ConnectionPhase::Init,
            transport,
            settings: runtime.connector.clone(),
            endpoint: Endpoint::from_network(&runtime.network),
            routes,
            router: Arc::new(router),
            inlets,
            display_connection,
            phase_tx,
            stay_down: false,
            inactive_since: None,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub async fn tick(&mut self) {
        self.poll_requests();

        let next = match self.phase {
            ConnectionPhase::Init => self.create().await,
            ConnectionPhase::PreActive => self.establish().await,
            ConnectionPhase::Active => self.serve().await,
            ConnectionPhase::PostActive => self.teardown().await,
            ConnectionPhase::Inactive => self.rearm(),
        };
        self.enter(next);
    }

    fn poll_requests(&mut self) {
        while let Some(request) = self.inlets.requests.try_recv() {
            info!(?request, phase = self.phase.as_str(), "connector request");
            if request == ConnectorRequest::Shutdown {
                self.stay_down = true;
            }
            match self.phase {
                ConnectionPhase::Active => self.enter(ConnectionPhase::PostActive),
                ConnectionPhase::Init | ConnectionPhase::PreActive => {
                    self.enter(ConnectionPhase::Inactive)
                }
                ConnectionPhase::PostActive | ConnectionPhase::Inactive => {}
            }
        }
    }

    fn enter(&mut self, next: ConnectionPhase) {
        if next == self.phase {
            return;
        }
        info!(
            from = self.phase.as_str(),
            to = next.as_str(),
            "connector phase change"
        );
        self.phase = next;
        self.inactive_since = (next == ConnectionPhase::Inactive).then(Instant::now);
        self.phase_tx.send_replace(next);
    }

    fn qos(&self) -> QosLevel {
        QosLevel::from_level(self.settings.qos)
    }

    fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.operation_timeout_ms)
    }

    async fn create(&mut self) -> ConnectionPhase {
        match self.transport.create().await {
            Ok(()) => ConnectionPhase::PreActive,
            Err(err) => {
                warn!("network client creation failed: {err}");
                ConnectionPhase::Init
            }
        }
    }

    async fn establish(&mut self) -> ConnectionPhase {
        let connect_timeout = Duration::from_millis(self.settings.connect_timeout_ms);
        if let Err(err) = self.transport.connect(&self.endpoint, connect_timeout).await {
            warn!("broker connect failed: {err}");
            return ConnectionPhase::PreActive;
        }

        let qos = self.qos();
        let timeout = self.operation_timeout();
        for (topic, callback) in self.subscriptions() {
            if let Err(err) = self.transport.subscribe(&topic, qos, callback, timeout).await {
                warn!("subscribe failed: {err}");
                return ConnectionPhase::PreActive;
            }
        }

        self.display_connection.try_send(Connectivity::Connected);

        if let Routes::Shadow(topics) = &self.routes {
            let get = topics.get.clone();
            if let Err(err) = self.transport.publish(&get, String::new(), qos, timeout).await {
                warn!("shadow document request failed: {err}");
            }
        }

        ConnectionPhase::Active
    }

    fn subscriptions(&self) -> Vec<(String, InboundCallback)> {
        let router = &self.router;
        match &self.routes {
            Routes::Flat { directive, .. } => {
                let router = Arc::clone(router);
                vec![(
                    directive.clone(),
                    callback(move |topic, payload| router.on_directive(topic, payload)),
                )]
            }
            Routes::Shadow(topics) => {
                let delta = Arc::clone(router);
                let document = Arc::clone(router);
                let accepted = Arc::clone(router);
                let rejected = Arc::clone(router);
                vec![
                    (
                        topics.update_delta.clone(),
                        callback(move |topic, payload| {
                            delta.on_shadow_document(topic, payload, DELTA_PARENT_KEY)
                        }),
                    ),
                    (
                        topics.get_accepted.clone(),
                        callback(move |topic, payload| {
                            document.on_shadow_document(topic, payload, DESIRED_PARENT_KEY)
                        }),
                    ),
                    (
                        topics.update_accepted.clone(),
                        callback(move |topic, payload| {
                            accepted.on_update_result(topic, payload, true)
                        }),
                    ),
                    (
                        topics.update_rejected.clone(),
                        callback(move |topic, payload| {
                            rejected.on_update_result(topic, payload, false)
                        }),
                    ),
                ]
            }
        }
    }

    fn encode(&self, update: &StatusUpdate) -> (String, String) {
        match &self.routes {
            Routes::Flat { status, .. } => (status.clone(), update.to_flat_payload()),
            Routes::Shadow(topics) => (
                topics.update.clone(),
                update.to_shadow_payload(self.settings.shadow_section),
            ),
        }
    }

    async fn serve(&mut self) -> ConnectionPhase {
        if !self.transport.link_up() {
            warn!("broker link lost, reconnecting");
            self.display_connection.try_send(Connectivity::Disconnected);
            return ConnectionPhase::PreActive;
        }
        self.publish_pending().await;
        ConnectionPhase::Active
    }

    /// At most one item per outbound channel per tick.
    async fn publish_pending(&mut self) {
        let mut updates = Vec::new();
        if let Some(fan) = self.inlets.fan.try_recv() {
            updates.push(StatusUpdate::Fan(fan));
        }
        if let Some(mode) = self.inlets.conditioning.try_recv() {
            updates.push(StatusUpdate::Conditioning(mode));
        }
        if let Some(sample) = self.inlets.sensor.try_recv() {
            updates.push(StatusUpdate::Sensor(sample));
        }
        if let Some(target) = self.inlets.target.try_recv() {
            updates.push(StatusUpdate::Target(target));
        }

        let qos = self.qos();
        let timeout = self.operation_timeout();
        for update in updates {
            let (topic, payload) = self.encode(&update);
            if let Err(err) = self.transport.publish(&topic, payload, qos, timeout).await {
                warn!("status publish failed: {err}");
            }
        }
    }

    async fn teardown(&mut self) -> ConnectionPhase {
        match self.transport.disconnect(self.operation_timeout()).await {
            Ok(()) => {
                self.display_connection.try_send(Connectivity::Disconnected);
                ConnectionPhase::Inactive
            }
            Err(err) => {
                warn!("broker disconnect failed: {err}");
                ConnectionPhase::PostActive
            }
        }
    }

    fn rearm(&self) -> ConnectionPhase {
        let RearmPolicy::AfterDelay { delay_ms } = self.settings.rearm else {
            return ConnectionPhase::Inactive;
        };
        let elapsed = self
            .inactive_since
            .is_some_and(|since| since.elapsed() >= Duration::from_millis(delay_ms));
        if self.stay_down || !elapsed {
            return ConnectionPhase::Inactive;
        }
        info!("re-arming connector");
        ConnectionPhase::Init
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use pretty_assertions::assert_eq;
    use remote_hvac_common::{ConditioningMode, ShadowSection, TransportError};

    use super::*;
    use crate::bus::{Bus, BusOutlets, ControlInlets, DisplayInlets, Inlet};

    #[derive(Default)]
    struct FakeState {
        create_failures: usize,
        connect_failures: usize,
        subscribe_failures: usize,
        publish_failures: usize,
        disconnect_failures: usize,
        link_lost: bool,
        subscribed: Vec<String>,
        callbacks: HashMap<String, InboundCallback>,
        published: Vec<(String, String)>,
        disconnects: usize,
    }

    #[derive(Clone, Default)]
    struct FakeTransport(Arc<Mutex<FakeState>>);

    impl FakeTransport {
        fn published(&self) -> Vec<(String, String)> {
            self.0.lock().unwrap().published.clone()
        }

        fn subscribed(&self) -> Vec<String> {
            self.0.lock().unwrap().subscribed.clone()
        }

        fn deliver(&self, topic: &str, payload: &str) {
            let callback = self.0.lock().unwrap().callbacks.get(topic).cloned().unwrap();
            callback(topic, payload.as_bytes());
        }
    }

    impl MqttTransport for FakeTransport {
        async fn create(&mut self) -> Result<(), TransportError> {
            let mut state = self.0.lock().unwrap();
            if state.create_failures > 0 {
                state.create_failures -= 1;
                return Err(TransportError::Create("out of sockets".to_string()));
            }
            Ok(())
        }

        async fn connect(&mut self, endpoint: &Endpoint, _timeout: Duration) -> Result<(), TransportError> {
            let mut state = self.0.lock().unwrap();
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(TransportError::Connect {
                    endpoint: endpoint.address(),
                    reason: "refused".to_string(),
                });
            }
            state.link_lost = false;
            Ok(())
        }

        async fn subscribe(
            &mut self,
            topic: &str,
            _qos: QosLevel,
            callback: InboundCallback,
            _timeout: Duration,
        ) -> Result<(), TransportError> {
            let mut state = self.0.lock().unwrap();
            if state.subscribe_failures > 0 {
                state.subscribe_failures -= 1;
                return Err(TransportError::Subscribe {
                    topic: topic.to_string(),
                    reason: "not authorized".to_string(),
                });
            }
            state.subscribed.push(topic.to_string());
            state.callbacks.insert(topic.to_string(), callback);
            Ok(())
        }

        async fn publish(
            &mut self,
            topic: &str,
            payload: String,
            _qos: QosLevel,
            _timeout: Duration,
        ) -> Result<(), TransportError> {
            let mut state = self.0.lock().unwrap();
            if state.publish_failures > 0 {
                state.publish_failures -= 1;
                return Err(TransportError::Publish {
                    topic: topic.to_string(),
                    reason: "queue full".to_string(),
                });
            }
            state.published.push((topic.to_string(), payload));
            Ok(())
        }

        async fn disconnect(&mut self, _timeout: Duration) -> Result<(), TransportError> {
            let mut state = self.0.lock().unwrap();
            if state.disconnect_failures > 0 {
                state.disconnect_failures -= 1;
                return Err(TransportError::Disconnect("socket busy".to_string()));
            }
            state.disconnects += 1;
            Ok(())
        }

        fn link_up(&self) -> bool {
            !self.0.lock().unwrap().link_lost
        }
    }

    struct Harness {
        connector: Connector<FakeTransport>,
        fake: FakeTransport,
        outlets: BusOutlets,
        control: ControlInlets,
        display: DisplayInlets,
        shadow_delta: Inlet<ShadowDelta>,
        phase: watch::Receiver<ConnectionPhase>,
    }

    fn harness(sync_mode: SyncMode, rearm: RearmPolicy) -> Harness {
        let mut runtime = RuntimeConfig::default();
        runtime.connector.sync_mode = sync_mode;
        runtime.connector.rearm = rearm;

        let bus = Bus::new(&runtime.bus);
        let fake = FakeTransport::default();
        let (phase_tx, phase) = watch::channel(ConnectionPhase::Init);
        let router = InboundRouter::new(
            bus.outlets.hvac_fan.clone(),
            bus.outlets.hvac_target.clone(),
            bus.outlets.shadow_delta.clone(),
        );
        let connector = Connector::new(
            fake.clone(),
            &runtime,
            router,
            bus.connector,
            bus.outlets.display.connection.clone(),
            phase_tx,
        );

        Harness {
            connector,
            fake,
            outlets: bus.outlets,
            control: bus.control,
            display: bus.display,
            shadow_delta: bus.shadow_delta,
            phase,
        }
    }

    async fn activate(harness: &mut Harness) {
        harness.connector.tick().await;
        harness.connector.tick().await;
        assert_eq!(harness.connector.phase(), ConnectionPhase::Active);
    }

    #[tokio::test]
    async fn create_failure_retries_from_init() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        h.fake.0.lock().unwrap().create_failures = 2;

        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Init);
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Init);
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::PreActive);
    }

    #[tokio::test]
    async fn connect_failure_stays_pre_active() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        h.fake.0.lock().unwrap().connect_failures = 1;

        h.connector.tick().await;
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::PreActive);
        assert!(h.fake.subscribed().is_empty());

        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Active);
        assert_eq!(*h.phase.borrow(), ConnectionPhase::Active);
    }

    #[tokio::test]
    async fn flat_mode_publishes_status_changes() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        activate(&mut h).await;

        assert_eq!(h.fake.subscribed(), vec!["clickdemo/remotehvac/config".to_string()]);
        assert_eq!(h.display.connection.try_recv(), Some(Connectivity::Connected));

        h.outlets.connector.fan.try_send(FanState::High);
        h.outlets.connector.conditioning.try_send(ConditioningMode::Heating);
        h.connector.tick().await;

        assert_eq!(
            h.fake.published(),
            vec![
                (
                    "clickdemo/remotehvac/status".to_string(),
                    r#"{"FAN":"high"}"#.to_string()
                ),
                (
                    "clickdemo/remotehvac/status".to_string(),
                    r#"{"AIRCON":"heat"}"#.to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn drains_one_item_per_channel_per_tick() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        activate(&mut h).await;

        h.outlets.connector.target.try_send(20.0);
        h.outlets.connector.target.try_send(21.0);
        h.connector.tick().await;
        assert_eq!(h.fake.published().len(), 1);
        h.connector.tick().await;
        assert_eq!(
            h.fake.published()[1].1,
            r#"{"TARGET_T":"21.0"}"#.to_string()
        );
    }

    #[tokio::test]
    async fn shadow_mode_requests_document_and_reports_into_section() {
        let mut h = harness(SyncMode::Shadow, RearmPolicy::Terminal);
        activate(&mut h).await;

        let topics = ShadowTopics::for_thing("RemoteHVAC");
        assert_eq!(
            h.fake.subscribed(),
            vec![
                topics.update_delta.clone(),
                topics.get_accepted.clone(),
                topics.update_accepted.clone(),
                topics.update_rejected.clone(),
            ]
        );
        assert_eq!(h.fake.published(), vec![(topics.get.clone(), String::new())]);

        h.outlets.connector.target.try_send(21.5);
        h.connector.tick().await;
        let expected = StatusUpdate::Target(21.5).to_shadow_payload(ShadowSection::Desired);
        assert_eq!(h.fake.published()[1], (topics.update.clone(), expected));
    }

    #[tokio::test]
    async fn shadow_delta_is_queued_for_the_applier() {
        let mut h = harness(SyncMode::Shadow, RearmPolicy::Terminal);
        activate(&mut h).await;
        let topics = ShadowTopics::for_thing("RemoteHVAC");

        h.fake.deliver(
            &topics.update_delta,
            r#"{"version":7,"state":{"TARGET_T":21,"FAN":2,"AIRCON":1},"metadata":{}}"#,
        );
        assert_eq!(
            h.shadow_delta.try_recv(),
            Some(ShadowDelta {
                target_temperature: Some(21),
                fan_request: Some(2),
                conditioning_request: Some(1),
            })
        );

        h.fake.deliver(
            &topics.get_accepted,
            r#"{"state":{"desired":{"FAN":"0"},"reported":{"FAN":"2"}}}"#,
        );
        assert_eq!(
            h.shadow_delta.try_recv().map(|delta| delta.fan_request),
            Some(Some(0))
        );
    }

    #[tokio::test]
    async fn flat_directive_reaches_control_channels() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        activate(&mut h).await;

        h.fake.deliver(
            "clickdemo/remotehvac/config",
            r#"{"TARGET_T":"22.5","FAN":"low"}"#,
        );
        assert_eq!(h.control.target.try_recv(), Some(22.5));
        assert_eq!(h.control.fan.try_recv(), Some(FanState::Low));

        let oversized = format!(r#"{{"FAN":"high","pad":"{}"}}"#, "x".repeat(300));
        h.fake.deliver("clickdemo/remotehvac/config", &oversized);
        assert_eq!(h.control.fan.try_recv(), None);
    }

    #[tokio::test]
    async fn disconnect_request_walks_down_to_inactive() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        activate(&mut h).await;
        let _ = h.display.connection.try_recv();

        h.outlets.connector_requests.try_send(ConnectorRequest::Disconnect);
        h.connector.tick().await;

        assert_eq!(h.connector.phase(), ConnectionPhase::Inactive);
        assert_eq!(h.fake.0.lock().unwrap().disconnects, 1);
        assert_eq!(h.display.connection.try_recv(), Some(Connectivity::Disconnected));

        h.connector.tick().await;
        assert_eq!(*h.phase.borrow(), ConnectionPhase::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn after_delay_policy_rearms() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::AfterDelay { delay_ms: 100 });
        activate(&mut h).await;

        h.outlets.connector_requests.try_send(ConnectorRequest::Disconnect);
        h.connector.tick().await;
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Inactive);

        tokio::time::advance(Duration::from_millis(100)).await;
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Init);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ignores_rearm_policy() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::AfterDelay { delay_ms: 100 });
        activate(&mut h).await;

        h.outlets.connector_requests.try_send(ConnectorRequest::Shutdown);
        h.connector.tick().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Inactive);
    }

    #[tokio::test]
    async fn request_before_activation_skips_teardown() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        h.outlets.connector_requests.try_send(ConnectorRequest::Shutdown);
        h.connector.tick().await;

        assert_eq!(h.connector.phase(), ConnectionPhase::Inactive);
        assert_eq!(h.fake.0.lock().unwrap().disconnects, 0);
    }

    #[tokio::test]
    async fn subscribe_failure_retries_from_pre_active() {
        let mut h = harness(SyncMode::Shadow, RearmPolicy::Terminal);
        h.fake.0.lock().unwrap().subscribe_failures = 1;

        h.connector.tick().await;
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::PreActive);
        assert_eq!(h.display.connection.try_recv(), None);

        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Active);
        assert_eq!(h.fake.subscribed().len(), 4);
        assert_eq!(h.display.connection.try_recv(), Some(Connectivity::Connected));
    }

    #[tokio::test]
    async fn publish_failure_loses_the_item_and_stays_active() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        activate(&mut h).await;
        h.fake.0.lock().unwrap().publish_failures = 1;

        h.outlets.connector.fan.try_send(FanState::Low);
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Active);

        h.connector.tick().await;
        assert!(h.fake.published().is_empty());

        h.outlets.connector.fan.try_send(FanState::High);
        h.connector.tick().await;
        assert_eq!(
            h.fake.published(),
            vec![(
                "clickdemo/remotehvac/status".to_string(),
                r#"{"FAN":"high"}"#.to_string()
            )]
        );
    }

    #[tokio::test]
    async fn disconnect_failure_retries_teardown() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        activate(&mut h).await;
        let _ = h.display.connection.try_recv();
        h.fake.0.lock().unwrap().disconnect_failures = 1;

        h.outlets.connector_requests.try_send(ConnectorRequest::Disconnect);
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::PostActive);
        assert_eq!(h.display.connection.try_recv(), None);

        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Inactive);
        assert_eq!(h.fake.0.lock().unwrap().disconnects, 1);
        assert_eq!(h.display.connection.try_recv(), Some(Connectivity::Disconnected));
    }

    #[tokio::test]
    async fn full_delta_queue_drops_newest_delta() {
        let mut h = harness(SyncMode::Shadow, RearmPolicy::Terminal);
        activate(&mut h).await;
        let topics = ShadowTopics::for_thing("RemoteHVAC");

        let depth = RuntimeConfig::default().bus.shadow_depth;
        for target in 0..=depth {
            let payload = format!(r#"{{"state":{{"TARGET_T":"{target}"}}}}"#);
            h.fake.deliver(&topics.update_delta, &payload);
        }

        let mut received = Vec::new();
        while let Some(delta) = h.shadow_delta.try_recv() {
            received.extend(delta.target_temperature);
        }
        let expected: Vec<i32> = (0..depth as i32).collect();
        assert_eq!(received, expected);
        let stats = h.outlets.stats();
        let delta_stats = stats.iter().find(|entry| entry.name == "shadow_delta").unwrap();
        assert_eq!(delta_stats.dropped, 1);
    }

    #[tokio::test]
    async fn lost_link_reconnects_and_resubscribes() {
        let mut h = harness(SyncMode::Flat, RearmPolicy::Terminal);
        activate(&mut h).await;
        assert_eq!(h.display.connection.try_recv(), Some(Connectivity::Connected));

        h.fake.0.lock().unwrap().link_lost = true;
        h.outlets.connector.target.try_send(20.5);
        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::PreActive);
        assert_eq!(h.display.connection.try_recv(), Some(Connectivity::Disconnected));
        assert!(h.fake.published().is_empty());

        h.connector.tick().await;
        assert_eq!(h.connector.phase(), ConnectionPhase::Active);
        assert_eq!(
            h.fake.subscribed(),
            vec![
                "clickdemo/remotehvac/config".to_string(),
                "clickdemo/remotehvac/config".to_string(),
            ]
        );
        assert_eq!(h.display.connection.try_recv(), Some(Connectivity::Connected));

        h.connector.tick().await;
        assert_eq!(
            h.fake.published(),
            vec![(
                "clickdemo/remotehvac/status".to_string(),
                r#"{"TARGET_T":"20.5"}"#.to_string()
            )]
        );
    }
}
