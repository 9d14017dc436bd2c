//! The connection acceptor: binds one `TcpListener` per configured address
//! and spawns one session task per accepted socket.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::TcpListener;

use crate::cipher::CipherMethod;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::session::Session;

pub struct Server {
    listeners: Vec<TcpListener>,
    cipher: Arc<CipherMethod>,
    connect_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Binds every configured `(host, port)` pair. A bind/listen failure
    /// here is a startup error: it propagates to `main` and the process
    /// exits non-zero rather than starting up partially bound.
    pub async fn bind(config: &Config) -> Result<Self> {
        let cipher = CipherMethod::new(&config.method, &config.password)?;

        let mut listeners = Vec::with_capacity(config.bind_hosts.len());
        for host in &config.bind_hosts {
            let addr = format!("{}:{}", host, config.bind_port);
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|source| Error::Bind { addr: addr.clone(), source })?;
            info!("listening on {}", addr);
            listeners.push(listener);
        }

        Ok(Server {
            listeners,
            cipher: Arc::new(cipher),
            connect_timeout: Duration::from_secs(config.timeout_secs),
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Runs every listener's accept loop concurrently. Returns only when
    /// every listener's task has ended, which in practice means never
    /// (listeners run until the process is signaled).
    pub async fn serve(self) {
        let Server { listeners, cipher, connect_timeout, metrics } = self;

        let mut tasks = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let cipher = cipher.clone();
            let metrics = metrics.clone();
            tasks.push(tokio::spawn(accept_loop(listener, cipher, connect_timeout, metrics)));
        }

        for task in tasks {
            let _ = task.await;
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    cipher: Arc<CipherMethod>,
    connect_timeout: Duration,
    metrics: Arc<Metrics>,
) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept failed, continuing to listen: {}", e);
                continue;
            }
        };

        if let Err(e) = socket.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let session = Session::new(socket, &cipher, connect_timeout);
        let metrics = metrics.clone();
        metrics.session_started();
        tokio::spawn(async move {
            session.run().await;
            metrics.session_ended();
        });
    }
}
