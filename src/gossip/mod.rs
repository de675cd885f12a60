//! Gossip Engine (§4.3). SWIM-style ping/ack failure detection plus the
//! introducer join handshake. Grounded on
//! `networking::membership::swim::SwimMembership`'s task layout (a protocol
//! -period task driving ping + gossip, a separate listener per wire
//! concern) and on `failure.go`'s three-port scheme, which this follows
//! exactly (ping/ack/introducer as distinct UDP sockets rather than SWIM's
//! usual single multiplexed port, since the spec fixes that wire shape).

mod wire;

use crate::config::Config;
use crate::error::{Result, SdfsError};
use crate::event_bus::EventBus;
use crate::fingertable::{self, FingerTable};
use crate::identity::Ordinal;
use crate::membership::MembershipList;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const MAX_DATAGRAM: usize = 16 * 1024;

/// Sockets handed off from `listen()` to `join_and_run()`.
pub struct GossipHandles {
    ping_socket: Arc<UdpSocket>,
    introducer_socket: Option<Arc<UdpSocket>>,
}

pub struct GossipEngine {
    config: Arc<Config>,
    membership: Arc<MembershipList>,
    bus: EventBus,
    fingertable: Mutex<FingerTable>,
    /// Background tasks this engine owns (listeners, tick loop). Tracked
    /// only so `shutdown()` can abort them, e.g. in tests simulating a
    /// killed process; ordinary operation never inspects this.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GossipEngine {
    pub fn new(config: Arc<Config>, membership: Arc<MembershipList>, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            config,
            membership,
            bus,
            fingertable: Mutex::new(FingerTable::default()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Aborts every background task this engine owns, simulating an
    /// ungraceful process kill (no final gossip tick, unlike `leave()`).
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    fn own_host(&self) -> String {
        self.config.address_of(self.membership.self_ordinal())
    }

    async fn bind(&self, port: u16) -> Result<UdpSocket> {
        let addr = format!("{}:{}", self.own_host(), port);
        UdpSocket::bind(&addr)
            .await
            .map_err(|source| SdfsError::BindFailure { port, source })
    }

    /// First half of §9's initialization order: bind ping/ack/introducer
    /// sockets and start the listener tasks (plus the introducer-reply
    /// task, if this ordinal is the introducer). Self-announce happens
    /// here too, since it must precede the join request. Returns the
    /// handles `join_and_run` needs to complete startup once the rest of
    /// the node (event bus, replication controller, file RPC listener)
    /// is wired up.
    pub async fn listen(self: &Arc<Self>) -> Result<GossipHandles> {
        let ping_socket = Arc::new(self.bind(self.config.ping_port).await?);
        let ack_socket = Arc::new(self.bind(self.config.ack_port).await?);
        let introducer_socket = Arc::new(self.bind(self.config.introducer_port).await?);

        let ping_task = tokio::spawn(Self::ping_listener(
            self.clone(),
            ping_socket.clone(),
            ack_socket.clone(),
        ));
        let ack_task = tokio::spawn(Self::ack_listener(self.clone(), ack_socket.clone()));
        self.tasks.lock().extend([ping_task, ack_task]);

        self.membership.announce_self();

        let introducer_socket = if self.membership.self_ordinal() == self.config.introducer {
            let task = tokio::spawn(Self::introducer_listener(self.clone(), introducer_socket));
            self.tasks.lock().push(task);
            None
        } else {
            Some(introducer_socket)
        };

        Ok(GossipHandles {
            ping_socket,
            introducer_socket,
        })
    }

    /// Second half: perform the join handshake (fatal on timeout, per §7)
    /// if this ordinal isn't the introducer, then start the ping-tick loop.
    pub async fn join_and_run(self: &Arc<Self>, handles: GossipHandles) -> Result<()> {
        if let Some(introducer_socket) = handles.introducer_socket {
            self.join(&introducer_socket).await?;
        }
        let task = tokio::spawn(Self::tick_loop(self.clone(), handles.ping_socket));
        self.tasks.lock().push(task);
        Ok(())
    }

    /// §4.3 join protocol for a non-introducer: request, await reply with
    /// timeout, adopt. Fatal (returns `Err`) on timeout per §7.
    async fn join(&self, introducer_socket: &UdpSocket) -> Result<()> {
        let introducer_host = self.config.address_of(self.config.introducer);
        let introducer_addr = format!("{}:{}", introducer_host, self.config.introducer_port);
        introducer_socket.send_to(&[], &introducer_addr).await?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let recv = timeout(self.config.t_intro, introducer_socket.recv(&mut buf)).await;
        let n = match recv {
            Ok(Ok(n)) => n,
            _ => return Err(SdfsError::IntroducerTimeout(self.config.t_intro)),
        };
        let deltas = wire::decode_deltas(&buf[..n])?;
        self.membership.update(&deltas, &self.bus).await?;
        Ok(())
    }

    async fn introducer_listener(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let Ok((_, sender)) = socket.recv_from(&mut buf).await else {
                continue;
            };
            let full_view = self.membership.collect_dirty(true);
            let Ok(payload) = wire::encode_deltas(&full_view) else {
                continue;
            };
            if let Err(e) = socket.send_to(&payload, sender).await {
                tracing::warn!("introducer reply to {sender} failed: {e}");
            }
        }
    }

    async fn ping_listener(
        self: Arc<Self>,
        ping_socket: Arc<UdpSocket>,
        ack_socket: Arc<UdpSocket>,
    ) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let Ok((n, sender)) = ping_socket.recv_from(&mut buf).await else {
                continue;
            };
            let deltas = match wire::decode_deltas(&buf[..n]) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!("dropping undecodable ping from {sender}: {e}");
                    continue;
                }
            };
            if let Err(e) = self.membership.update(&deltas, &self.bus).await {
                tracing::warn!("membership update from {sender} failed: {e}");
            }

            let mut ack_addr = sender;
            ack_addr.set_port(self.config.ack_port);
            if let Ok(payload) = wire::encode_ordinal(self.membership.self_ordinal()) {
                if let Err(e) = ack_socket.send_to(&payload, ack_addr).await {
                    tracing::warn!("ack to {ack_addr} failed: {e}");
                }
            }
        }
    }

    async fn ack_listener(self: Arc<Self>, ack_socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; 64];
        loop {
            let Ok((n, _)) = ack_socket.recv_from(&mut buf).await else {
                continue;
            };
            match wire::decode_ordinal(&buf[..n]) {
                Ok(ordinal) => self.membership.set_ack_pending(ordinal, true),
                Err(e) => tracing::debug!("dropping undecodable ack: {e}"),
            }
        }
    }

    /// §4.3 per-tick state machine.
    async fn tick_loop(self: Arc<Self>, ping_socket: Arc<UdpSocket>) {
        loop {
            if let Err(e) = self.tick(&ping_socket).await {
                tracing::warn!("gossip tick failed: {e}");
            }
            sleep(self.config.t_ping).await;
        }
    }

    async fn tick(self: &Arc<Self>, ping_socket: &UdpSocket) -> Result<()> {
        if self.membership.is_fingertable_stale() {
            let ft = fingertable::rebuild(&self.membership, self.config.finger_table_size);
            *self.fingertable.lock() = ft;
            self.membership.clear_fingertable_stale();
        }

        let payload_entries = self.membership.collect_dirty(false);
        let payload = wire::encode_deltas(&payload_entries)?;

        let targets: Vec<Ordinal> = self.fingertable.lock().live_targets().collect();
        for target in targets {
            self.membership.set_ack_pending(target, false);
            let addr = format!(
                "{}:{}",
                self.config.address_of(target),
                self.config.ping_port
            );
            if let Err(e) = ping_socket.send_to(&payload, &addr).await {
                tracing::debug!("ping to {addr} failed (peer will be ack-timed-out): {e}");
            }
            self.arm_ack_timeout(target);
        }
        Ok(())
    }

    fn arm_ack_timeout(self: &Arc<Self>, target: Ordinal) {
        let engine = self.clone();
        let t_ack = self.config.t_ack;
        tokio::spawn(async move {
            sleep(t_ack).await;
            let mut event = None;
            if engine.membership.mark_failed_on_timeout(target, &mut event) {
                tracing::info!("detected ordinal {target} failed (ack timeout)");
                if let Some(event) = event {
                    if let Err(e) = engine.bus.publish(event).await {
                        tracing::warn!("failed to publish failure event: {e}");
                    }
                }
            }
        });
    }

    /// §4.3 leave protocol: mark self failed, one best-effort gossip tick,
    /// then the caller terminates the process.
    pub async fn leave(self: &Arc<Self>) {
        self.membership.mark_self_failed();
        let fallback = || -> Result<UdpSocket> {
            let std_socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
            std_socket.set_nonblocking(true)?;
            UdpSocket::from_std(std_socket).map_err(SdfsError::Io)
        };
        let ping_socket = match self.bind(0).await.or_else(|_| fallback()) {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!(
                    "leave: could not bind an ephemeral socket for the final gossip tick: {e}"
                );
                return;
            }
        };
        let _ = self.tick(&ping_socket).await;
    }
}
