//! Flex-over-WebSocket binding: one binary frame, one packet.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use routd_flex::Packet;
use routd_router::{proto_router, Context, Meta, RoutableProtocol, Router};

use crate::connmap::ConnectorMap;
use crate::flex::PackageProtocol;

pub type WsProtocol = PackageProtocol<SocketAddr>;
pub type Ws = Context<WsProtocol>;

/// The flex WebSocket transport: shared router plus the connection
/// registry for server-initiated pushes.
pub struct FlexWsRouter {
    pub router: Arc<Router<WsProtocol>>,
    pub connections: ConnectorMap<mpsc::UnboundedSender<Message>>,
}

static WS_ROUTER: OnceLock<FlexWsRouter> = OnceLock::new();

impl FlexWsRouter {
    pub fn shared() -> &'static FlexWsRouter {
        WS_ROUTER.get_or_init(|| FlexWsRouter {
            router: proto_router("flex-websocket"),
            connections: ConnectorMap::new(),
        })
    }

    /// Serves an upgraded connection: each binary frame carries one flex
    /// packet; frames are processed in arrival order. A malformed frame
    /// drops the connection.
    pub async fn serve<S>(&self, ws: WebSocketStream<S>, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let addr = peer.to_string();
        let (mut sink, mut source) = ws.split();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Message>();
        self.connections.insert(addr.clone(), push_tx);
        loop {
            tokio::select! {
                frame = source.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => {
                            self.connections.except(&addr, &err);
                            return;
                        }
                        None => break,
                    };
                    match message {
                        Message::Binary(data) => {
                            let mut buf = BytesMut::from(&data[..]);
                            let pkg = match Packet::decode(&mut buf) {
                                Ok(Some(pkg)) => pkg,
                                Ok(None) | Err(_) => {
                                    self.connections.except(&addr, &"malformed flex frame");
                                    return;
                                }
                            };
                            let mut ctx = Context::new(PackageProtocol::new(pkg, Meta::new(peer)));
                            self.router.route(&mut ctx).await;
                            ctx.rp.log_error();
                            let respond = ctx
                                .api
                                .as_ref()
                                .map_or_else(|| ctx.rp.error().is_some(), |api| api.api.responsive);
                            if respond {
                                let response = ctx.rp.response_packet();
                                if sink.send(Message::Binary(response.to_vec())).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                Some(push) = push_rx.recv() => {
                    if sink.send(push).await.is_err() {
                        break;
                    }
                }
            }
        }
        self.connections.remove(&addr);
        debug!(%addr, "websocket connection closed");
    }

    /// Queues a packet for a connected peer; false when the peer is
    /// gone.
    pub fn push(&self, addr: &str, packet: &Packet) -> bool {
        self.connections
            .get(addr)
            .map(|tx| tx.send(Message::Binary(packet.encode().to_vec())).is_ok())
            .unwrap_or(false)
    }
}
