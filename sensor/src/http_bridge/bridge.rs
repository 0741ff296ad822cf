use crate::http_bridge::model::StatusModel;
use anyhow::Context;
use serde_json::json;
use std::net::SocketAddr;
use std::thread::{self, JoinHandle};
use sweepcore::protocol::SharedMatrix;
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter};

/// Read-only HTTP view of what the receiver has collected.
pub fn routes(
    shared: SharedMatrix,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let shared_filter = warp::any().map(move || shared.clone());

    let latest_route = warp::path("latest")
        .and(warp::path::end())
        .and(warp::get())
        .and(shared_filter.clone())
        .map(|shared: SharedMatrix| match shared.latest() {
            Some(matrix) => warp::reply::with_status(warp::reply::json(&matrix), StatusCode::OK),
            None => warp::reply::with_status(
                warp::reply::json(&json!({"error": "no matrix received yet"})),
                StatusCode::NOT_FOUND,
            ),
        });

    let status_route = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(shared_filter)
        .map(|shared: SharedMatrix| {
            warp::reply::json(&StatusModel::from(&shared.snapshot()))
        });

    latest_route.or(status_route)
}

/// Hosts [`routes`] on a dedicated thread with its own runtime.
pub struct HttpBridge {
    bind: SocketAddr,
    _thread: JoinHandle<()>,
}

impl HttpBridge {
    pub fn spawn(bind: &str, shared: SharedMatrix) -> anyhow::Result<Self> {
        let addr: SocketAddr = bind
            .parse()
            .with_context(|| format!("parsing HTTP bind address {}", bind))?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for HTTP bridge")?;

        // Bind here so an occupied or forbidden address fails the caller.
        let (bound, server) = runtime
            .block_on(async { warp::serve(routes(shared)).try_bind_ephemeral(addr) })
            .with_context(|| format!("binding HTTP bridge on {}", addr))?;

        let thread = thread::Builder::new()
            .name("http-bridge".into())
            .spawn(move || {
                log::info!("HTTP bridge listening on {}", bound);
                runtime.block_on(server);
            })
            .context("spawning HTTP bridge thread")?;

        Ok(Self {
            bind: bound,
            _thread: thread,
        })
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.bind
    }
}
