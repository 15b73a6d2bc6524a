//! Flex-over-UDP binding: one datagram, one request.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::net::UdpSocket;
use tracing::warn;

use routd_flex::Packet;
use routd_router::{proto_router, Context, Meta, RoutableProtocol, Router};

use crate::flex::PackageProtocol;

pub type UdpProtocol = PackageProtocol<SocketAddr>;
pub type Udp = Context<UdpProtocol>;

/// The process-wide flex UDP router singleton.
pub fn udp_router() -> Arc<Router<UdpProtocol>> {
    proto_router("flex-udp")
}

/// Routes one received datagram; a responsive route answers with a
/// datagram to the sender. Ordering across datagrams is best-effort by
/// nature.
pub async fn route(socket: &UdpSocket, datagram: &[u8], peer: SocketAddr) {
    let mut buf = BytesMut::from(datagram);
    let pkg = match Packet::decode(&mut buf) {
        Ok(Some(pkg)) => pkg,
        Ok(None) => {
            warn!(%peer, "truncated flex datagram dropped");
            return;
        }
        Err(err) => {
            warn!(%peer, "flex packet parse failed: {err}");
            return;
        }
    };
    let mut ctx = Context::new(PackageProtocol::new(pkg, Meta::new(peer)));
    udp_router().route(&mut ctx).await;
    ctx.rp.log_error();
    let respond = ctx
        .api
        .as_ref()
        .map_or_else(|| ctx.rp.error().is_some(), |api| api.api.responsive);
    if respond {
        let response = ctx.rp.response_packet();
        if let Err(err) = socket.send_to(&response, peer).await {
            warn!(%peer, "flex response send failed: {err}");
        }
    }
}
