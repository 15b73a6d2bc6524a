//! In-process HTTP routing demo: registers a few routes (path
//! variables, a login flow with sid rotation) and drives requests
//! through the adapter without a listener.
//!
//! Run with: cargo run -p routd --example http_demo

use std::sync::Arc;

use bytes::Bytes;
use http::Request;

use routd::http::{Http, HttpRouter, HEADER_SID_KEY};
use routd::router::RoutableProtocol;
use routd::session::{Session, ShmStore, SimpleUser};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let store = Arc::new(ShmStore::new());
    let router = HttpRouter::new();
    router.get("greet/{name?}", |c: &mut Http| {
        let name = match c.param("name") {
            "" => "stranger".to_string(),
            name => name.to_string(),
        };
        c.write_str(&format!("hello, {name}\n"));
    });
    {
        let store = store.clone();
        router.post("login", move |c: &mut Http| {
            let mut session: Session<SimpleUser> =
                match Session::new(store.clone(), vec![c.rp.sid()], 60) {
                    Ok(session) => session,
                    Err(err) => return c.set_error(err),
                };
            let user = SimpleUser { id: 7, role_id: 1, nick: "drunk".into() };
            if let Err(err) = session.login(user, 0) {
                return c.set_error(err);
            }
            c.rp.set_resp_sid(session.id().to_string());
            c.write_str("logged in\n");
        });
    }

    let response = router
        .route(Request::builder().method("GET").uri("/greet/world").body(Bytes::new())?)
        .await;
    println!("GET /greet/world -> {} {:?}", response.status(), response.body());

    let response = router
        .route(Request::builder().method("POST").uri("/login").body(Bytes::new())?)
        .await;
    let sid = response.headers()[HEADER_SID_KEY].to_str()?.to_string();
    println!("POST /login -> {} sid={}...", response.status(), &sid[..16]);

    let response = router
        .route(Request::builder().method("GET").uri("/nowhere").body(Bytes::new())?)
        .await;
    println!("GET /nowhere -> {}", response.status());

    Ok(())
}
