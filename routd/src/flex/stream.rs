//! Flex over a generic byte stream.
//!
//! The seam for transports that hand out framed read/write pairs per
//! request or per connection: QUIC bidirectional streams, unix sockets,
//! in-process duplex pipes. The endpoint brings its own stream type;
//! anything `AsyncRead`/`AsyncWrite` routes here.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use routd_flex::{read_packet, FlexError};
use routd_router::{proto_router, Context, Meta, RoutableProtocol, Router};

use crate::flex::PackageProtocol;

pub type StreamProtocol = PackageProtocol<SocketAddr>;
pub type FlexStream = Context<StreamProtocol>;

pub struct FlexStreamRouter {
    pub router: Arc<Router<StreamProtocol>>,
}

static STREAM_ROUTER: OnceLock<FlexStreamRouter> = OnceLock::new();

impl FlexStreamRouter {
    pub fn shared() -> &'static FlexStreamRouter {
        STREAM_ROUTER.get_or_init(|| FlexStreamRouter { router: proto_router("flex-stream") })
    }

    /// Reads and routes one packet from a bidirectional stream, writing
    /// the response back when the route is responsive. Returns false on
    /// a clean end of stream. QUIC-style one-stream-per-request
    /// endpoints call this once per accepted stream; long-lived streams
    /// loop over it.
    pub async fn route_once<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        peer: SocketAddr,
        buf: &mut BytesMut,
    ) -> Result<bool, FlexError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(pkg) = read_packet(reader, buf).await? else {
            return Ok(false);
        };
        let mut ctx = Context::new(PackageProtocol::new(pkg, Meta::new(peer)));
        self.router.route(&mut ctx).await;
        ctx.rp.log_error();
        let respond = ctx
            .api
            .as_ref()
            .map_or_else(|| ctx.rp.error().is_some(), |api| api.api.responsive);
        if respond {
            writer.write_all(&ctx.rp.response_packet()).await?;
        }
        Ok(true)
    }

    /// Reads and routes one packet from a receive-only stream; any
    /// buffered response is discarded.
    pub async fn route_uni<R>(
        &self,
        reader: &mut R,
        peer: SocketAddr,
        buf: &mut BytesMut,
    ) -> Result<bool, FlexError>
    where
        R: AsyncRead + Unpin,
    {
        let Some(pkg) = read_packet(reader, buf).await? else {
            return Ok(false);
        };
        let mut ctx = Context::new(PackageProtocol::new(pkg, Meta::new(peer)));
        self.router.route(&mut ctx).await;
        ctx.rp.log_error();
        debug!(%peer, "uni-stream request handled");
        Ok(true)
    }
}
