use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS,
    SubscribeReasonCode,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use remote_hvac_common::{NetworkConfig, TransportError};

pub type InboundCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    AtMostOnce,
    AtLeastOnce,
}

impl QosLevel {
    pub fn from_level(level: u8) -> Self {
        if level == 0 {
            Self::AtMostOnce
        } else {
            Self::AtLeastOnce
        }
    }

    fn as_rumqttc(self) -> QoS {
        match self {
            Self::AtMostOnce => QoS::AtMostOnce,
            Self::AtLeastOnce => QoS::AtLeastOnce,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Endpoint {
    pub fn from_network(network: &NetworkConfig) -> Self {
        Self {
            host: network.mqtt_host.clone(),
            port: network.mqtt_port,
            user: network.mqtt_user.clone(),
            pass: network.mqtt_pass.clone(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub trait MqttTransport: Send {
    fn create(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn subscribe(
        &mut self,
        topic: &str,
        qos: QosLevel,
        callback: InboundCallback,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn publish(
        &mut self,
        topic: &str,
        payload: String,
        qos: QosLevel,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn disconnect(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// False once an established session has dropped. Subscriptions do not
    /// survive that, so the caller has to connect again.
    fn link_up(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Connecting,
    Up,
    Failed(String),
    Lost(String),
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SubAcks {
    received: u64,
    granted: bool,
}

type Routes = Arc<Mutex<HashMap<String, InboundCallback>>>;

struct Session {
    client: AsyncClient,
    link: watch::Receiver<LinkState>,
    acks: watch::Receiver<SubAcks>,
    poller: JoinHandle<()>,
}

pub struct RumqttTransport {
    client_id: String,
    keep_alive: Duration,
    routes: Option<Routes>,
    session: Option<Session>,
}

impl RumqttTransport {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(30),
            routes: None,
            session: None,
        }
    }

    fn session(&self) -> Result<&Session, TransportError> {
        self.session.as_ref().ok_or(TransportError::NotConnected)
    }

    fn clear_routes(&self) {
        if let Some(routes) = &self.routes {
            routes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clear();
        }
    }

    fn drop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.poller.abort();
        }
    }
}

impl MqttTransport for RumqttTransport {
    async fn create(&mut self) -> Result<(), TransportError> {
        if self.client_id.is_empty() {
            return Err(TransportError::Create("empty client id".to_string()));
        }
        self.routes = Some(Arc::new(Mutex::new(HashMap::new())));
        Ok(())
    }

    async fn connect(&mut self, endpoint: &Endpoint, timeout: Duration) -> Result<(), TransportError> {
        let routes = self
            .routes
            .clone()
            .ok_or_else(|| TransportError::Create("client not created".to_string()))?;
        self.drop_session();

        let mut options = MqttOptions::new(self.client_id.clone(), endpoint.host.clone(), endpoint.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if !endpoint.user.is_empty() {
            options.set_credentials(endpoint.user.clone(), endpoint.pass.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, 16);
        let (link_tx, mut link) = watch::channel(LinkState::Connecting);
        let (acks_tx, acks) = watch::channel(SubAcks::default());
        let poller = spawn_event_loop(eventloop, routes, link_tx, acks_tx);
        self.session = Some(Session {
            client,
            link: link.clone(),
            acks,
            poller,
        });

        let outcome = tokio::time::timeout(
            timeout,
            link.wait_for(|state| *state != LinkState::Connecting),
        )
        .await;

        let result = match outcome {
            Ok(Ok(state)) => match &*state {
                LinkState::Up => Ok(()),
                LinkState::Failed(reason) => Err(TransportError::Connect {
                    endpoint: endpoint.address(),
                    reason: reason.clone(),
                }),
                _ => Err(TransportError::Connect {
                    endpoint: endpoint.address(),
                    reason: "connection closed".to_string(),
                }),
            },
            Ok(Err(_)) => Err(TransportError::Connect {
                endpoint: endpoint.address(),
                reason: "event loop stopped".to_string(),
            }),
            Err(_) => Err(TransportError::Timeout {
                operation: "connect",
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        if result.is_err() {
            self.drop_session();
        }
        result
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QosLevel,
        callback: InboundCallback,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let session = self.session()?;
        if let Some(routes) = &self.routes {
            routes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(topic.to_string(), callback);
        }

        // Subscribes are issued one at a time, so the next SubAck is ours.
        let mut acks = session.acks.clone();
        let seen = acks.borrow_and_update().received;
        let request = session.client.subscribe(topic, qos.as_rumqttc());
        let acked = tokio::time::timeout(timeout, async {
            match request.await {
                Ok(()) => acks
                    .wait_for(|ack| ack.received > seen)
                    .await
                    .map(|ack| ack.granted)
                    .map_err(|_| "event loop stopped".to_string()),
                Err(err) => Err(err.to_string()),
            }
        })
        .await;

        match acked {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "rejected by broker".to_string(),
            }),
            Ok(Err(reason)) => Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason,
            }),
            Err(_) => Err(TransportError::Timeout {
                operation: "subscribe",
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: String,
        qos: QosLevel,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let session = self.session()?;
        if *session.link.borrow() != LinkState::Up {
            return Err(TransportError::NotConnected);
        }

        let request = session
            .client
            .publish(topic, qos.as_rumqttc(), false, payload.into_bytes());
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(TransportError::Timeout {
                operation: "publish",
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn disconnect(&mut self, timeout: Duration) -> Result<(), TransportError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.clear_routes();

        let dropped = matches!(
            *session.link.borrow(),
            LinkState::Lost(_) | LinkState::Failed(_) | LinkState::Closed
        );
        if dropped {
            session.poller.abort();
            return Ok(());
        }

        let request = tokio::time::timeout(timeout, session.client.disconnect()).await;
        let mut link = session.link.clone();
        let closed = tokio::time::timeout(
            timeout,
            link.wait_for(|state| {
                matches!(
                    state,
                    LinkState::Closed | LinkState::Failed(_) | LinkState::Lost(_)
                )
            }),
        )
        .await
        .map(|state| state.is_ok());
        session.poller.abort();

        match (request, closed) {
            (Ok(Ok(())), Ok(true)) => Ok(()),
            (Ok(Err(err)), _) => Err(TransportError::Disconnect(err.to_string())),
            _ => Err(TransportError::Timeout {
                operation: "disconnect",
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn link_up(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| *session.link.borrow() == LinkState::Up)
    }
}

fn spawn_event_loop(
    mut eventloop: EventLoop,
    routes: Routes,
    link: watch::Sender<LinkState>,
    acks: watch::Sender<SubAcks>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut established = false;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    established = true;
                    link.send_replace(LinkState::Up);
                }
                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                    let granted = !ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure));
                    acks.send_modify(|state| {
                        state.received += 1;
                        state.granted = granted;
                    });
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    let callback = routes
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .get(message.topic.as_str())
                        .cloned();
                    match callback {
                        Some(callback) => callback(&message.topic, &message.payload),
                        None => debug!(topic = %message.topic, "no route for inbound message"),
                    }
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    link.send_replace(LinkState::Closed);
                    break;
                }
                Ok(_) => {}
                Err(ConnectionError::ConnectionRefused(code)) => {
                    warn!("mqtt connection refused: {code:?}");
                    link.send_replace(LinkState::Failed(format!("refused: {code:?}")));
                    break;
                }
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    // A clean session forgets its subscriptions, so the
                    // owner reconnects instead of rumqttc.
                    let state = if established {
                        LinkState::Lost(err.to_string())
                    } else {
                        LinkState::Failed(err.to_string())
                    };
                    link.send_replace(state);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        sync::oneshot,
    };

    use super::*;

    const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let header = stream.read_u8().await.unwrap();
        let mut remaining = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.unwrap();
            remaining |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0; remaining];
        stream.read_exact(&mut body).await.unwrap();
        (header >> 4, body)
    }

    async fn broker() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
            user: String::new(),
            pass: String::new(),
        };
        (listener, endpoint)
    }

    async fn accept_session(listener: &TcpListener) -> TcpStream {
        let (mut stream, _) = listener.accept().await.unwrap();
        let (kind, _) = read_packet(&mut stream).await;
        assert_eq!(kind, 1);
        stream.write_all(&CONNACK).await.unwrap();
        stream
    }

    async fn ack_subscribe(stream: &mut TcpStream, code: u8) {
        let (kind, body) = read_packet(stream).await;
        assert_eq!(kind, 8);
        stream
            .write_all(&[0x90, 0x03, body[0], body[1], code])
            .await
            .unwrap();
    }

    fn noop() -> InboundCallback {
        Arc::new(|_: &str, _: &[u8]| {})
    }

    #[test]
    fn qos_levels_above_one_map_to_at_least_once() {
        assert_eq!(QosLevel::from_level(0), QosLevel::AtMostOnce);
        assert_eq!(QosLevel::from_level(1), QosLevel::AtLeastOnce);
        assert_eq!(QosLevel::from_level(2), QosLevel::AtLeastOnce);
    }

    #[test]
    fn endpoint_copies_network_settings() {
        let endpoint = Endpoint::from_network(&NetworkConfig {
            mqtt_host: "broker.local".to_string(),
            mqtt_port: 8883,
            mqtt_user: "hvac".to_string(),
            mqtt_pass: "secret".to_string(),
        });
        assert_eq!(endpoint.address(), "broker.local:8883");
        assert_eq!(endpoint.user, "hvac");
    }

    #[tokio::test]
    async fn operations_before_connect_report_not_connected() {
        let mut transport = RumqttTransport::new("RemoteHVAC");
        transport.create().await.unwrap();
        let publish = transport
            .publish("t", String::new(), QosLevel::AtLeastOnce, Duration::from_millis(10))
            .await;
        assert_eq!(publish, Err(TransportError::NotConnected));
        assert_eq!(transport.disconnect(Duration::from_millis(10)).await, Ok(()));
    }

    #[tokio::test]
    async fn connect_without_create_fails() {
        let mut transport = RumqttTransport::new("RemoteHVAC");
        let endpoint = Endpoint::from_network(&NetworkConfig::default());
        let result = transport.connect(&endpoint, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(TransportError::Create(_))));
    }

    #[tokio::test]
    async fn subscribe_reports_broker_rejection() {
        let (listener, endpoint) = broker().await;
        let server = tokio::spawn(async move {
            let mut stream = accept_session(&listener).await;
            ack_subscribe(&mut stream, 0x80).await;
            ack_subscribe(&mut stream, 0x01).await;
            stream
        });

        let mut transport = RumqttTransport::new("RemoteHVAC");
        transport.create().await.unwrap();
        transport.connect(&endpoint, Duration::from_secs(2)).await.unwrap();

        let timeout = Duration::from_secs(2);
        let rejected = transport
            .subscribe("denied", QosLevel::AtLeastOnce, noop(), timeout)
            .await;
        assert_eq!(
            rejected,
            Err(TransportError::Subscribe {
                topic: "denied".to_string(),
                reason: "rejected by broker".to_string(),
            })
        );
        let granted = transport
            .subscribe("allowed", QosLevel::AtLeastOnce, noop(), timeout)
            .await;
        assert_eq!(granted, Ok(()));

        assert_eq!(transport.disconnect(timeout).await, Ok(()));
        assert!(!transport.link_up());
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn dropped_session_reports_link_down() {
        let (listener, endpoint) = broker().await;
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let stream = accept_session(&listener).await;
            let _ = release_rx.await;
            drop(stream);
        });

        let mut transport = RumqttTransport::new("RemoteHVAC");
        transport.create().await.unwrap();
        transport.connect(&endpoint, Duration::from_secs(2)).await.unwrap();
        assert!(transport.link_up());

        release_tx.send(()).unwrap();
        server.await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.link_up() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let publish = transport
            .publish("t", String::new(), QosLevel::AtLeastOnce, Duration::from_millis(10))
            .await;
        assert_eq!(publish, Err(TransportError::NotConnected));
        assert_eq!(transport.disconnect(Duration::from_millis(10)).await, Ok(()));
    }
}
