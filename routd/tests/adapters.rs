// End-to-end adapter tests: HTTP request/response mapping with session
// rotation, and flex packets over real TCP and in-process streams.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{Request, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use routd::codec::{read_packet, Packet};
use routd::connmap::ConnectorMap;
use routd::flex::stream::FlexStreamRouter;
use routd::flex::tcp::{FlexTcpRouter, Tcp};
use routd::http::{Http, HttpRouter, HEADER_SID_KEY};
use routd::router::{RoutableProtocol, Router};
use routd::session::{Session, ShmStore, SimpleUser, Store};
use routd::Error;

fn request(method: &str, uri: &str) -> http::request::Builder {
    Request::builder().method(method).uri(uri)
}

#[tokio::test]
async fn http_routes_by_method_and_path() {
    let router = HttpRouter::new();
    router
        .get("greet/{name}", |c: &mut Http| {
            let name = c.param("name").to_string();
            c.write_str(&format!("hi {name}"));
        })
        .post("greet/{name}", |c: &mut Http| c.write_str("posted"));

    let response = router
        .route(request("GET", "/greet/world").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"hi world");

    let response = router
        .route(request("POST", "/greet/world").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.body().as_ref(), b"posted");

    // PUT is outside both registered masks.
    let response = router
        .route(request("PUT", "/greet/world").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_head_is_matched_by_get_routes() {
    let router = HttpRouter::new();
    router.get("ping", |c: &mut Http| c.write_str("pong"));

    let response = router.route(request("HEAD", "/ping").body(Bytes::new()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn http_error_kinds_map_to_statuses() {
    let router = HttpRouter::new();
    router
        .get("missing-user", |c: &mut Http| {
            c.set_error(Error::openly(401, "login required"));
        })
        .get("broken", |c: &mut Http| {
            c.set_error(Error::closed(500, "db creds leaked"));
        });

    let response = router
        .route(request("GET", "/missing-user").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.body().as_ref(), b"login required");

    // Closed errors must not leak their message.
    let response = router.route(request("GET", "/broken").body(Bytes::new()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body().as_ref(), b"Service Unavailable");
}

#[tokio::test]
async fn http_host_filter_disambiguates() {
    let router = HttpRouter::new();
    router
        .push_api(
            routd::router::Api::path("stats").by_method(routd::http::HTTP_GET).bind_hosts(["admin"]),
            |c: &mut Http| c.write_str("admin"),
        )
        .push_api(
            routd::router::Api::path("stats").by_method(routd::http::HTTP_GET),
            |c: &mut Http| c.write_str("public"),
        );

    let response = router
        .route(request("GET", "/stats").header("Host", "admin:8080").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.body().as_ref(), b"admin");

    let response = router
        .route(request("GET", "/stats").header("Host", "public:8080").body(Bytes::new()).unwrap())
        .await;
    assert_eq!(response.body().as_ref(), b"public");
}

#[tokio::test]
async fn http_login_rotates_the_sid_header() {
    let store = Arc::new(ShmStore::new());
    let router = HttpRouter::new();
    {
        let store = store.clone();
        router.post("login", move |c: &mut Http| {
            let pool = vec![c.rp.sid()];
            let mut session: Session<SimpleUser> =
                match Session::new(store.clone(), pool, 60) {
                    Ok(session) => session,
                    Err(err) => {
                        c.set_error(err);
                        return;
                    }
                };
            let user = SimpleUser { id: 7, role_id: 0, nick: "drunk".into() };
            if let Err(err) = session.login(user, 0) {
                c.set_error(err);
                return;
            }
            c.rp.set_resp_sid(session.id().to_string());
            c.write_str("welcome");
        });
    }

    // First login from a fresh client: no sid supplied.
    let response = router.route(request("POST", "/login").body(Bytes::new()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let first_sid = response.headers()[HEADER_SID_KEY].to_str().unwrap().to_string();
    assert!(first_sid.len() >= 76);

    // A re-login presenting the old sid gets a different one back.
    let response = router
        .route(
            request("POST", "/login")
                .header(HEADER_SID_KEY, &first_sid)
                .body(Bytes::new())
                .unwrap(),
        )
        .await;
    let second_sid = response.headers()[HEADER_SID_KEY].to_str().unwrap().to_string();
    assert_ne!(second_sid, first_sid);
    assert!(!store.exists(&first_sid), "presented sid is retired by login");
}

#[tokio::test]
async fn http_sid_falls_back_to_cookies() {
    let router = HttpRouter::new();
    router.get("whoami", |c: &mut Http| {
        let sid = c.rp.sid();
        c.write_str(&sid);
    });

    let response = router
        .route(
            request("GET", "/whoami")
                .header("Cookie", "theme=dark; Session-ID=abc123")
                .body(Bytes::new())
                .unwrap(),
        )
        .await;
    assert_eq!(response.body().as_ref(), b"abc123");
}

#[tokio::test]
async fn flex_tcp_serves_packets_in_arrival_order() {
    let flex = Arc::new(FlexTcpRouter {
        router: Arc::new(Router::new()),
        connections: ConnectorMap::new(),
    });
    flex.router.push("echo", |c: &mut Tcp| {
        let body = c.body().unwrap_or_default();
        c.write(&body);
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = {
        let flex = flex.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            flex.serve(stream).await;
        })
    };

    let mut client = TcpStream::connect(addr).await.unwrap();
    for round in 0..3u8 {
        let body = Bytes::from(vec![round; 64]);
        let packet = Packet::new("echo", body.clone(), "", Some(u32::from(round) + 1));
        client.write_all(&packet.encode()).await.unwrap();

        let mut buf = BytesMut::new();
        let response = read_packet(&mut client, &mut buf).await.unwrap().expect("response");
        assert_eq!(response.id, u32::from(round) + 1);
        assert_eq!(response.body, body);
        assert_eq!(response.code, 0);
    }

    drop(client);
    server.await.unwrap();
    assert!(flex.connections.is_empty(), "disconnect must clear the registry");
}

#[tokio::test]
async fn flex_tcp_unknown_path_reports_404_units() {
    let flex = FlexTcpRouter { router: Arc::new(Router::new()), connections: ConnectorMap::new() };
    flex.router.push("known", |_: &mut Tcp| {});

    let peer = "127.0.0.1:40000".parse().unwrap();
    let request = Packet::new("unknown", Bytes::new(), "", Some(1));
    let encoded = flex.route_packet(request, peer).await.expect("responsive 404");
    let mut buf = BytesMut::from(encoded.as_ref());
    let response = Packet::decode(&mut buf).unwrap().unwrap();
    assert_eq!(response.code, 404);
    assert!(response.message.contains("route failed"));
}

#[tokio::test]
async fn stream_router_round_trips_over_a_duplex_pipe() {
    let stream_router = FlexStreamRouter { router: Arc::new(Router::new()) };
    stream_router.router.push("time", |c: &mut routd::flex::stream::FlexStream| {
        c.write_str("now");
    });

    let (client, server) = tokio::io::duplex(1024);
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut server_read, mut server_write) = tokio::io::split(server);

    let packet = Packet::new("time", Bytes::new(), "", Some(11));
    client_write.write_all(&packet.encode()).await.unwrap();

    let peer = "127.0.0.1:50000".parse().unwrap();
    let mut buf = BytesMut::new();
    let handled = stream_router
        .route_once(&mut server_read, &mut server_write, peer, &mut buf)
        .await
        .unwrap();
    assert!(handled);

    let mut resp_buf = BytesMut::new();
    let response = read_packet(&mut client_read, &mut resp_buf).await.unwrap().unwrap();
    assert_eq!(response.id, 11);
    assert_eq!(response.body.as_ref(), b"now");
}
