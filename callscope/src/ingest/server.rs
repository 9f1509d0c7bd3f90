//! Single-connection TCP ingestion server.
//!
//! One profiling run is one connection: the instrumented process connects,
//! streams newline-delimited JSON records, and the run ends when the
//! connection closes or a shutdown signal fires. Parsing and tree mutation
//! happen inline per record; the only deferral is the descriptor wait inside
//! the receiver, aged here by a ticker so it never blocks other records.
//! No back-pressure is applied to the sender.

use crate::domain::IngestError;
use crate::ingest::framing::LineAssembler;
use crate::ingest::receiver::{ProfileRun, Receiver, RetryPolicy};
use anyhow::Context;
use log::{info, warn};
use std::future::Future;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, ToSocketAddrs};

const READ_CHUNK: usize = 16 * 1024;

pub struct ProfilerServer {
    listener: TcpListener,
    policy: RetryPolicy,
}

impl ProfilerServer {
    /// Bind the ingestion socket. Hand [`Self::local_addr`] to the
    /// instrumented process.
    ///
    /// # Errors
    ///
    /// When the address cannot be bound.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind profiler ingestion socket")?;
        Ok(Self { listener, policy: RetryPolicy::default() })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// # Errors
    ///
    /// When the bound address cannot be read back from the socket.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one connection and ingest until the peer closes it.
    ///
    /// # Errors
    ///
    /// Protocol violations, ordering timeouts, and transport I/O failures
    /// abort the run (see [`IngestError`]).
    pub async fn serve(self) -> Result<ProfileRun, IngestError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Like [`Self::serve`], but also ends the run when `shutdown` resolves
    /// (e.g. a kill signal from the orchestrating process). Records already
    /// reassembled are processed before the run is treated as terminated;
    /// a partial trailing fragment is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Self::serve`].
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<ProfileRun, IngestError>
    where
        F: Future<Output = ()>,
    {
        let (mut socket, peer) = self.listener.accept().await?;
        info!("instrumented process connected from {peer}");

        let mut receiver = Receiver::with_policy(self.policy);
        let mut assembler = LineAssembler::new();
        let mut ticker = tokio::time::interval(self.policy.tick_interval);
        let mut chunk = vec![0u8; READ_CHUNK];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                read = socket.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        info!("instrumentation stream closed");
                        break;
                    }
                    for record in assembler.feed(&chunk[..n])? {
                        receiver.ingest_value(record)?;
                    }
                }
                _ = ticker.tick() => {
                    receiver.tick()?;
                }
                () = &mut shutdown => {
                    info!("shutdown requested, ending profiling run");
                    break;
                }
            }
        }

        if !assembler.is_idle() {
            warn!("connection ended mid-record; dropping incomplete trailing fragment");
        }
        receiver.finish()
    }
}
