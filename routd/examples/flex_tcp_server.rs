//! Flex-over-TCP echo server.
//!
//! Run with: cargo run -p routd --example flex_tcp_server
//! Each accepted connection is served on its own task; packets on one
//! connection are handled in arrival order.

use anyhow::Context as _;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use routd::flex::tcp::{FlexTcpRouter, Tcp};
use routd::router::RoutableProtocol;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info,routd=debug").init();

    let flex = FlexTcpRouter::shared();
    flex.router
        .push("echo", |c: &mut Tcp| {
            let body = c.body().unwrap_or_default();
            c.write(&body);
        })
        .push("whoami", |c: &mut Tcp| {
            let peer = c.rp.meta().req.to_string();
            c.write_str(&peer);
        });

    let listener = TcpListener::bind("127.0.0.1:8787")
        .await
        .context("failed to bind flex tcp endpoint")?;
    info!(addr = %listener.local_addr()?, "flex tcp server listening");

    let accept_loop = async {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    info!("accept failed: {err}");
                    continue;
                }
            };
            info!(%peer, "connection accepted");
            tokio::spawn(flex.serve(stream));
        }
    };

    tokio::select! {
        _ = accept_loop => {}
        _ = signal::ctrl_c() => info!("shutdown signal received"),
    }
    Ok(())
}
