//! Flex-over-TCP binding.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use routd_flex::{read_packet, Packet};
use routd_router::{proto_router, Context, Meta, RoutableProtocol, Router};

use crate::connmap::ConnectorMap;
use crate::flex::PackageProtocol;

pub type TcpProtocol = PackageProtocol<SocketAddr>;
pub type Tcp = Context<TcpProtocol>;

/// The flex TCP transport: the shared router plus the connection
/// registry for server-initiated pushes.
pub struct FlexTcpRouter {
    pub router: Arc<Router<TcpProtocol>>,
    pub connections: ConnectorMap<mpsc::UnboundedSender<Bytes>>,
}

static TCP_ROUTER: OnceLock<FlexTcpRouter> = OnceLock::new();

impl FlexTcpRouter {
    pub fn shared() -> &'static FlexTcpRouter {
        TCP_ROUTER.get_or_init(|| FlexTcpRouter {
            router: proto_router("flex-tcp"),
            connections: ConnectorMap::new(),
        })
    }

    /// Routes one decoded packet; returns the encoded response when the
    /// matched route is responsive, or an error packet when routing
    /// failed (the client is waiting on the correlation id).
    pub async fn route_packet(&self, pkg: Packet, peer: SocketAddr) -> Option<Bytes> {
        let mut ctx = Context::new(PackageProtocol::new(pkg, Meta::new(peer)));
        self.router.route(&mut ctx).await;
        ctx.rp.log_error();
        let respond = ctx
            .api
            .as_ref()
            .map_or_else(|| ctx.rp.error().is_some(), |api| api.api.responsive);
        respond.then(|| ctx.rp.response_packet())
    }

    /// Serves an accepted connection: packets are processed in arrival
    /// order until EOF or a codec failure drops the connection. Pushed
    /// messages interleave with responses on the write side.
    pub async fn serve(&self, stream: TcpStream) {
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(err) => {
                debug!("connection rejected, no peer address: {err}");
                return;
            }
        };
        let addr = peer.to_string();
        let (mut reader, mut writer) = stream.into_split();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Bytes>();
        self.connections.insert(addr.clone(), push_tx);
        let mut buf = BytesMut::new();
        loop {
            tokio::select! {
                incoming = read_packet(&mut reader, &mut buf) => match incoming {
                    Ok(Some(pkg)) => {
                        if let Some(response) = self.route_packet(pkg, peer).await {
                            if writer.write_all(&response).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        self.connections.except(&addr, &err);
                        return;
                    }
                },
                Some(push) = push_rx.recv() => {
                    if writer.write_all(&push).await.is_err() {
                        break;
                    }
                }
            }
        }
        self.connections.remove(&addr);
    }

    /// Queues a packet for a connected peer; false when the peer is
    /// gone.
    pub fn push(&self, addr: &str, packet: &Packet) -> bool {
        self.connections
            .get(addr)
            .map(|tx| tx.send(packet.encode()).is_ok())
            .unwrap_or(false)
    }
}
