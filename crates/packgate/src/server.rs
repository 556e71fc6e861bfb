//! `PackgateServer` builder and server loop.
//!
//! This is the entry point for running the host bridge. It ties the
//! layers together: link → protocol → state machine → store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use packgate_core::PackConfig;
use packgate_protocol::JsonCodec;
use packgate_store::PersistenceStore;
use tokio::task::JoinSet;

use crate::handler::{BridgeState, handle_link};
use crate::link::{HostLink, LinkListener};
use crate::{PackgateError, Settings};

/// The current bridge protocol version. Hosts must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// How often the retention sweep runs.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Builder for configuring and starting the host bridge.
///
/// # Example
///
/// ```rust,ignore
/// use packgate::prelude::*;
///
/// let server = PackgateServerBuilder::new()
///     .bind("127.0.0.1:25580")
///     .secret("change-me")
///     .pack(PackConfig::default())
///     .build(Arc::new(MemoryStore::new()))
///     .await?;
/// server.run().await
/// ```
pub struct PackgateServerBuilder {
    bind_addr: String,
    secret: Option<String>,
    retention: Option<Duration>,
    pack: PackConfig,
}

impl PackgateServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:25580".to_string(),
            secret: None,
            retention: None,
            pack: PackConfig::default(),
        }
    }

    /// Takes bind address, secret, retention and pack config from a
    /// loaded settings file.
    pub fn settings(self, settings: &Settings) -> Self {
        let mut builder = self
            .bind(&settings.bridge.bind)
            .pack(settings.pack.clone());
        builder.secret = settings.bridge.secret.clone();
        builder.retention = settings.bridge.retention();
        builder
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Requires hosts to present this secret in their handshake.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Evicts acceptance records older than `retention`.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Sets the pack configuration every link's state machine uses.
    pub fn pack(mut self, pack: PackConfig) -> Self {
        self.pack = pack;
        self
    }

    /// Binds the listener and builds the server around `store`.
    ///
    /// `store` is cloned into every link, so it should be a cheap handle
    /// (`Arc<RedbStore>`, `Arc<dyn PersistenceStore>`).
    pub async fn build<S>(self, store: S) -> Result<PackgateServer<S>, PackgateError>
    where
        S: PersistenceStore + Clone,
    {
        let listener = LinkListener::bind(&self.bind_addr).await?;
        if self.secret.is_none() {
            tracing::warn!("no bridge secret configured, any host may link");
        }

        let state = Arc::new(BridgeState {
            store,
            pack: self.pack,
            secret: self.secret,
            codec: JsonCodec,
        });

        Ok(PackgateServer {
            listener,
            state,
            retention: self.retention,
        })
    }
}

impl Default for PackgateServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound host bridge, built by [`PackgateServerBuilder`].
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to
/// start accepting links.
pub struct PackgateServer<S> {
    listener: LinkListener,
    state: Arc<BridgeState<S>>,
    retention: Option<Duration>,
}

impl<S> PackgateServer<S>
where
    S: PersistenceStore + Clone,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), PackgateError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then aborts every
    /// link (clearing their sessions) and stops the retention sweep.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), PackgateError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("packgate bridge running");

        let eviction = self
            .retention
            .map(|retention| tokio::spawn(evict_loop(self.state.store.clone(), retention)));

        let mut links = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let state = Arc::clone(&self.state);
                        links.spawn(async move {
                            let link = match HostLink::upgrade(stream, addr).await {
                                Ok(link) => link,
                                Err(e) => {
                                    tracing::debug!(%addr, error = %e, "upgrade failed");
                                    return;
                                }
                            };
                            let link_id = link.id();
                            if let Err(e) = handle_link(link, state).await {
                                tracing::warn!(%link_id, error = %e, "link ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },

                // Reap finished link tasks.
                Some(_) = links.join_next(), if !links.is_empty() => {}
            }
        }

        tracing::info!(links = links.len(), "shutting down");
        if let Some(task) = eviction {
            task.abort();
        }
        links.shutdown().await;
        Ok(())
    }
}

/// Periodically deletes records not updated within `retention`.
async fn evict_loop<S>(store: S, retention: Duration)
where
    S: PersistenceStore + Clone,
{
    let Ok(max_age) = TimeDelta::from_std(retention) else {
        tracing::warn!(?retention, "retention too large, eviction disabled");
        return;
    };

    let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
    loop {
        ticker.tick().await;

        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            continue;
        };
        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.evict_older_than(cutoff)).await {
            Ok(Ok(0)) => {}
            Ok(Ok(evicted)) => tracing::info!(evicted, %cutoff, "evicted stale acceptance records"),
            Ok(Err(e)) => tracing::warn!(error = %e, "eviction failed"),
            Err(e) => tracing::error!(error = %e, "eviction task failed"),
        }
    }
}
