//! Flex packet transports: shared protocol base plus the TCP, UDP,
//! WebSocket and generic-stream bindings.

pub mod stream;
pub mod tcp;
pub mod udp;
pub mod websocket;

use bytes::Bytes;

use routd_flex::Packet;
use routd_router::{Meta, RoutableProtocol};
use routd_x::Error;

/// Routable protocol over one decoded flex packet. `Req` carries
/// whatever connection detail the transport wants handlers to see
/// (typically the peer address).
pub struct PackageProtocol<Req> {
    meta: Meta<Req>,
    pkg: Packet,
}

impl<Req: Send + Sync + 'static> PackageProtocol<Req> {
    pub fn new(pkg: Packet, meta: Meta<Req>) -> Self {
        PackageProtocol { meta, pkg }
    }

    pub fn packet(&self) -> &Packet {
        &self.pkg
    }

    /// Assembles and encodes the response packet: the request id and
    /// path are echoed, the buffered response becomes the body, the
    /// rotated sid and the latched error's units fill the rest.
    pub fn response_packet(&self) -> Bytes {
        let (code, message) = self.meta.error_units();
        let mut pkg = self.pkg.clone();
        pkg.sid = self.meta.resp_sid();
        pkg.body = self.meta.clear_buffer();
        pkg.code = code;
        pkg.message = message;
        pkg.encode()
    }
}

impl<Req: Send + Sync + 'static> RoutableProtocol for PackageProtocol<Req> {
    type Req = Req;

    fn meta(&self) -> &Meta<Req> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut Meta<Req> {
        &mut self.meta
    }

    fn path(&self) -> &str {
        &self.pkg.path
    }

    fn id(&self) -> u32 {
        self.pkg.id
    }

    fn sid(&self) -> String {
        self.pkg.sid.clone()
    }

    fn body(&mut self) -> Result<Bytes, Error> {
        Ok(self.pkg.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routd_flex::Packet;

    #[test]
    fn response_echoes_id_and_path_with_fresh_body() {
        let request = Packet::new("member/detail", Bytes::from_static(b"req"), "sid".repeat(26), Some(5));
        let rp = PackageProtocol::new(request, Meta::new(()));
        rp.write_str("resp");
        rp.set_resp_sid("R".repeat(76));

        let mut decoded = bytes::BytesMut::from(rp.response_packet().as_ref());
        let response = Packet::decode(&mut decoded).unwrap().unwrap();
        assert_eq!(response.id, 5);
        assert_eq!(response.path, "member/detail");
        assert_eq!(response.sid, "R".repeat(76));
        assert_eq!(response.body.as_ref(), b"resp");
        assert_eq!(response.code, 0);
    }

    #[test]
    fn latched_error_units_reach_the_response() {
        let rp = PackageProtocol::new(Packet::default(), Meta::new(()));
        rp.set_error(Error::openly(403, "role mismatch"));

        let mut decoded = bytes::BytesMut::from(rp.response_packet().as_ref());
        let response = Packet::decode(&mut decoded).unwrap().unwrap();
        assert_eq!(response.code, 403);
        assert_eq!(response.message, "role mismatch");
    }
}
