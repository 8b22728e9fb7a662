use crate::messages::control::valve::ValveCommand;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use tokio::{sync::oneshot, task::JoinHandle, time::timeout};
use tracing::{debug, error, info, warn};

/// Requests that can be buffered between the client and the event loop.
/// A full run publishes three messages per valve so this never fills up.
const REQUEST_CAPACITY: usize = 16;

/// How long a disconnect waits for queued messages to be flushed before
/// the event loop task is torn down.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Broker the valve controller box is subscribed to.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq, Debug)]
pub struct BrokerConfig {
    /// Host name or address of the MQTT broker.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Client identifier presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Topic the controller box reads valve numbers from.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Upper bound on the wait for the broker to accept the session.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_address() -> String {
    String::from("spigot.local")
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    String::from("Sprinkler_valve")
}

fn default_topic() -> String {
    String::from("inTopic")
}

fn default_connect_timeout_secs() -> u64 {
    4
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            client_id: default_client_id(),
            topic: default_topic(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl BrokerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Lifecycle of the link to the controller box.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    ConnectFailed,
}

/// What happened to a published command. Commands are sent at most once
/// and never acknowledged, so `Dispatched` only means the command was handed
/// to the client, not that the controller received it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Dispatched,
    Dropped,
}

/// Publish-only link to something that actuates valves.
pub trait ValveLink {
    fn state(&self) -> LinkState;

    /// Fire and forget a command, never blocks and never fails loudly.
    fn publish(&mut self, command: ValveCommand) -> Delivery;

    /// Close the session. Safe to call repeatedly and after a failed connect.
    fn disconnect(&mut self) -> impl Future<Output = ()>;
}

/// MQTT link to the valve controller box. Owns the client and the task
/// polling its event loop for the duration of one run.
pub struct ValveController {
    client: AsyncClient,
    topic: String,
    address: String,
    state: LinkState,
    event_loop: Option<JoinHandle<()>>,
}

impl ValveController {
    /// Connect to the broker and wait until it either accepts the session,
    /// refuses it, or `connect_timeout` runs out. The link is returned in
    /// both the connected and the failed state so the caller can decide what
    /// to do and still disconnect it.
    ///
    /// * `config`: broker address, client id, topic and timeout.
    pub async fn connect(config: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.address, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let mut controller = Self {
            client,
            topic: config.topic.clone(),
            address: format!("{}:{}", config.address, config.port),
            state: LinkState::Connecting,
            event_loop: None,
        };

        let (connected_tx, connected_rx) = oneshot::channel();
        controller.event_loop = Some(tokio::spawn(drive_event_loop(event_loop, connected_tx)));
        debug!("Connecting to mqtt broker {}", controller.address);

        controller.state = match timeout(config.connect_timeout(), connected_rx).await {
            Ok(Ok(true)) => {
                info!("Connected to mqtt broker {}", controller.address);
                LinkState::Connected
            }
            Ok(_) => {
                error!("Mqtt broker connection failed, {} refused", controller.address);
                LinkState::ConnectFailed
            }
            Err(_) => {
                error!(
                    "Mqtt broker connection failed, no answer from {} within {:?}",
                    controller.address,
                    config.connect_timeout()
                );
                LinkState::ConnectFailed
            }
        };
        controller
    }
}

impl ValveLink for ValveController {
    fn state(&self) -> LinkState {
        self.state
    }

    fn publish(&mut self, command: ValveCommand) -> Delivery {
        if self.state != LinkState::Connected {
            warn!("Dropped '{command}', broker not connected");
            return Delivery::Dropped;
        }
        match self
            .client
            .try_publish(&self.topic, QoS::AtMostOnce, false, command.payload())
        {
            Ok(()) => Delivery::Dispatched,
            Err(e) => {
                warn!("Dropped '{command}': {e}");
                Delivery::Dropped
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.state == LinkState::Disconnected {
            return;
        }
        if self.state == LinkState::Connected {
            // Queued behind any publishes, so those are flushed first.
            if let Err(e) = self.client.try_disconnect() {
                debug!("Disconnect request not queued: {e}");
            }
        }
        if let Some(mut task) = self.event_loop.take() {
            if self.state != LinkState::Connected
                || timeout(DISCONNECT_GRACE, &mut task).await.is_err()
            {
                task.abort();
            }
        }
        self.state = LinkState::Disconnected;
        info!("Quit broker");
    }
}

impl Drop for ValveController {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop.take() {
            task.abort();
        }
    }
}

/// Poll the client event loop, reporting the outcome of the connection
/// attempt exactly once. Stops after the disconnect goes out or on the first
/// connection error, there is no reconnect.
async fn drive_event_loop(mut event_loop: EventLoop, connected: oneshot::Sender<bool>) {
    let mut connected = Some(connected);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if let Some(tx) = connected.take() {
                    let _ = tx.send(ack.code == ConnectReturnCode::Success);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                if let Some(tx) = connected.take() {
                    let _ = tx.send(false);
                }
                debug!("Mqtt event loop stopped: {e}");
                break;
            }
        }
    }
}
