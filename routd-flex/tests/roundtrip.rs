// End-to-end round trips through the flex codec: flex-num boundaries,
// packet field presence, and stream framing up to a mebibyte.

use bytes::{Bytes, BytesMut};
use routd_flex::{
    get_int, get_uint, put_int, put_uint, read_packet, stream_pack, stream_read, stream_unpack,
    Packet,
};

#[test]
fn flex_num_boundary_table() {
    let uints: [u64; 10] = [0, 1, 127, 128, 255, 256, 16383, 16384, u32::MAX as u64, i64::MAX as u64];
    for value in uints {
        let mut buf = BytesMut::new();
        put_uint(value, &mut buf);
        assert!(buf.len() <= 9);
        assert_eq!(get_uint(&mut buf).unwrap(), value, "unsigned {value}");
    }

    let ints: [i64; 6] = [-1, -127, -128, -16383, -16384, -i64::MAX];
    for value in ints {
        let mut buf = BytesMut::new();
        put_int(value, &mut buf);
        assert!(buf.len() <= 9);
        assert_eq!(get_int(&mut buf).unwrap(), value, "signed {value}");
    }
}

#[test]
fn packet_preserves_field_presence() {
    let cases = vec![
        Packet::default(),
        Packet { id: 1, ..Packet::default() },
        Packet { path: "home".into(), ..Packet::default() },
        Packet { num_path: 9000, ..Packet::default() },
        Packet { sid: "F".repeat(76), ..Packet::default() },
        Packet { code: 404, message: "route failed".into(), ..Packet::default() },
        Packet { code: -7, ..Packet::default() },
        Packet { body: Bytes::from(vec![0u8; 1024]), ..Packet::default() },
        Packet {
            id: u32::MAX - 1,
            path: "user/{uid}/detail".into(),
            sid: "B".repeat(80),
            code: 500,
            message: "Hello world!\u{4f60}\u{597d}".into(),
            body: Bytes::from_static(b"\x00\x01\x02\xff"),
            ..Packet::default()
        },
    ];
    for packet in cases {
        let mut buf = BytesMut::from(packet.encode().as_ref());
        let decoded = Packet::decode(&mut buf).unwrap().expect("complete packet");
        assert_eq!(decoded, packet);
        assert!(buf.is_empty(), "decode must consume the whole packet");
    }
}

#[test]
fn packet_body_hash_survives_round_trip() {
    // Mixed-width text body, mirroring a payload a template handler
    // would emit.
    let body: String = "Hello world!\u{4f60}\u{597d}\u{ff0c}\u{4e16}\u{754c}\u{ff01}".repeat(613);
    let packet = Packet::new("home", Bytes::from(body.clone()), "", None);
    assert!(packet.id > 0);

    let mut buf = BytesMut::from(packet.encode().as_ref());
    let decoded = Packet::decode(&mut buf).unwrap().unwrap();
    assert_eq!(decoded.body, Bytes::from(body));
    assert_eq!(decoded.id, packet.id);
}

#[test]
fn stream_framing_sizes() {
    for len in [0usize, 1, 127, 128, 129, 4096, 1 << 20] {
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let framed = stream_pack(&payload);
        let mut buf = BytesMut::from(framed.as_ref());
        let unpacked = stream_unpack(&mut buf).unwrap().expect("complete frame");
        assert_eq!(unpacked.as_ref(), payload.as_slice(), "length {len}");
        assert!(buf.is_empty());
    }
}

#[tokio::test]
async fn async_readers_reassemble_split_input() {
    let packet = Packet::new("member/detail", Bytes::from(vec![42u8; 100_000]), "", Some(3));
    let encoded = packet.encode();

    // Feed the bytes through a duplex pipe in small chunks.
    let (mut client, mut server) = tokio::io::duplex(512);
    let writer = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        for chunk in encoded.chunks(313) {
            client.write_all(chunk).await.unwrap();
        }
        client.shutdown().await.unwrap();
    });

    let mut buf = BytesMut::new();
    let decoded = read_packet(&mut server, &mut buf).await.unwrap().expect("one packet");
    assert_eq!(decoded, packet);
    assert!(read_packet(&mut server, &mut buf).await.unwrap().is_none());
    writer.await.unwrap();
}

#[tokio::test]
async fn async_stream_read_round_trips() {
    let payload = vec![7u8; 65_536];
    let framed = stream_pack(&payload);

    let (mut client, mut server) = tokio::io::duplex(1024);
    let writer = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        client.write_all(&framed).await.unwrap();
        client.shutdown().await.unwrap();
    });

    let mut buf = BytesMut::new();
    let unpacked = stream_read(&mut server, &mut buf).await.unwrap().expect("one frame");
    assert_eq!(unpacked.as_ref(), payload.as_slice());
    writer.await.unwrap();
}
