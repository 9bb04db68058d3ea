//! Long-lived engine process answering single-file requests over a
//! loopback socket.
//!
//! Lifecycle is `Stopped -> Starting -> Alive`, with `Failed` reachable from
//! `Starting` (launch or readiness failure) and from `Alive` (I/O failure or
//! unexpected exit). `stop` returns every state to `Stopped`. A failed server
//! is never restarted implicitly; the host calls [`PersistentServer::start`]
//! again.
//!
//! All operations serialize on one lock, so requests never interleave on
//! the socket.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use lintbridge_types::{AnalysisResponse, ContextualRequest, FileRef};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};

use crate::codec::{FrameReader, FrameWriter};
use crate::drain::{self, DrainHandle, MissingModuleHandler};
use crate::launcher::{self, EngineProcess, ProcessIo, RuntimeSettings, SearchPathSettings};
use crate::rules::RuleRegistry;
use crate::wire;

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub runtime: RuntimeSettings,
    /// Entry point of the server script. The listening port is appended as
    /// its last argument.
    pub entrypoint: PathBuf,
    pub extra_args: Vec<String>,
    pub search_path: SearchPathSettings,
    /// Used for the local dependency lookup.
    pub project_root: Option<PathBuf>,
    /// How long the engine has to connect back after launch.
    pub readiness_timeout: Duration,
    pub request_timeout: Duration,
    /// How long a stopping engine has to exit before it is killed.
    pub stop_grace: Duration,
    pub drain_grace: Duration,
}

impl ServerSettings {
    #[must_use]
    pub fn new(entrypoint: PathBuf) -> Self {
        Self {
            runtime: RuntimeSettings::default(),
            entrypoint,
            extra_args: Vec::new(),
            search_path: SearchPathSettings::default(),
            project_root: None,
            readiness_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
            stop_grace: Duration::from_millis(200),
            drain_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Alive,
    Failed(String),
}

struct Connection {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl Connection {
    async fn round_trip(&mut self, request: &ContextualRequest) -> Result<AnalysisResponse> {
        self.writer.write_frame(request).await?;
        let body = self
            .reader
            .read_frame()
            .await?
            .context("engine server closed the connection")?;
        Ok(wire::decode_response(&body)?)
    }
}

struct Running {
    process: EngineProcess,
    connection: Connection,
    drain: DrainHandle<MissingModuleHandler>,
}

impl Running {
    /// Close the socket, give the engine `stop_grace` to exit, then kill it.
    async fn shutdown(self, stop_grace: Duration, drain_grace: Duration) {
        let Self {
            process,
            connection,
            drain,
        } = self;
        drop(connection);
        process.terminate(stop_grace).await;
        drain.join(drain_grace).await;
    }
}

/// `running` is `Some` exactly when `state` is `Alive`.
struct Inner {
    state: ServerState,
    running: Option<Running>,
    launches: usize,
    /// Number of the latest launch attempt.
    attempt: u64,
}

impl Inner {
    /// Notice an engine that died on its own.
    fn refresh(&mut self) {
        let exited = self
            .running
            .as_mut()
            .and_then(|running| running.process.try_wait());
        if let Some(status) = exited {
            tracing::warn!("Engine server exited unexpectedly with {status}");
            self.running = None;
            self.state = ServerState::Failed(format!("exited with {status}"));
        }
    }
}

pub struct PersistentServer {
    settings: Arc<ServerSettings>,
    inner: Arc<Mutex<Inner>>,
    /// Latest launch attempt that has settled.
    settled: Arc<watch::Sender<u64>>,
}

impl PersistentServer {
    #[must_use]
    pub fn new(settings: ServerSettings) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            settings: Arc::new(settings),
            inner: Arc::new(Mutex::new(Inner {
                state: ServerState::Stopped,
                running: None,
                launches: 0,
                attempt: 0,
            })),
            settled: Arc::new(settled),
        }
    }

    pub async fn state(&self) -> ServerState {
        let mut inner = self.inner.lock().await;
        inner.refresh();
        inner.state.clone()
    }

    pub async fn is_alive(&self) -> bool {
        self.state().await == ServerState::Alive
    }

    /// Engine processes launched so far.
    pub async fn launch_count(&self) -> usize {
        self.inner.lock().await.launches
    }

    /// Launch the engine and wait for it to connect back.
    ///
    /// No-op while alive. A call made while a start is in flight waits for
    /// that start instead of launching another engine. Failures are logged
    /// and leave the server `Failed`. Returns whether the server is alive
    /// afterwards.
    ///
    /// The launch runs on its own task and always settles, even when the
    /// returned future is dropped.
    pub async fn start(&self) -> bool {
        let (attempt, mut settled) = {
            let mut inner = self.inner.lock().await;
            inner.refresh();
            match inner.state {
                ServerState::Alive => {
                    tracing::info!("Skipping engine server start, already running");
                    return true;
                }
                ServerState::Starting => {
                    tracing::info!("Engine server is already starting, waiting for it");
                }
                ServerState::Stopped | ServerState::Failed(_) => {
                    inner.state = ServerState::Starting;
                    inner.launches += 1;
                    inner.attempt += 1;
                    tokio::spawn(settle_start(
                        Arc::clone(&self.settings),
                        Arc::clone(&self.inner),
                        Arc::clone(&self.settled),
                        inner.attempt,
                    ));
                }
            }
            (inner.attempt, self.settled.subscribe())
        };

        if settled.wait_for(|done| *done >= attempt).await.is_err() {
            return false;
        }
        self.is_alive().await
    }

    /// Analyze one file, returning `None` when the server is not alive or
    /// the exchange fails. A failed exchange leaves the server `Failed`.
    pub async fn analyze(&self, request: &ContextualRequest) -> Option<AnalysisResponse> {
        let mut inner = self.inner.lock().await;
        inner.refresh();
        let Some(running) = inner.running.as_mut() else {
            tracing::warn!(
                "Engine server is not running, skipped analysis of {}",
                request.file
            );
            return None;
        };

        let exchange = tokio::time::timeout(
            self.settings.request_timeout,
            running.connection.round_trip(request),
        )
        .await;
        let error = match exchange {
            Ok(Ok(response)) => return Some(response),
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("no answer within {:?}", self.settings.request_timeout),
        };

        tracing::error!(
            "Engine server failed while analyzing {}: {error}",
            request.file
        );
        inner.state = ServerState::Failed(error);
        if let Some(running) = inner.running.take() {
            running
                .shutdown(self.settings.stop_grace, self.settings.drain_grace)
                .await;
        }
        None
    }

    /// Build a request from the file's current content and analyze it.
    pub async fn analyze_file(
        &self,
        file: &FileRef,
        registry: &RuleRegistry,
    ) -> Option<AnalysisResponse> {
        let content = match file.contents() {
            Ok(content) => content.into_owned(),
            Err(e) => {
                tracing::error!("Cannot read {}: {e}", file.key());
                return None;
            }
        };
        let request = ContextualRequest {
            file: file.wire_path(),
            content,
            rules: registry.rules_to_execute(),
        };
        self.analyze(&request).await
    }

    /// Stop the engine. No-op, with a warning, when nothing is running.
    ///
    /// Stopping during a start cancels it: the engine is shut down as soon
    /// as its launch settles.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        inner.refresh();
        let Some(running) = inner.running.take() else {
            match inner.state {
                ServerState::Starting => {
                    inner.state = ServerState::Stopped;
                    tracing::info!("Engine server is stopped before it finished starting");
                }
                ServerState::Failed(_) => {
                    tracing::warn!("Engine server was already stopped");
                    inner.state = ServerState::Stopped;
                }
                ServerState::Stopped | ServerState::Alive => {
                    tracing::warn!("Engine server was already stopped");
                }
            }
            return;
        };
        inner.state = ServerState::Stopped;
        running
            .shutdown(self.settings.stop_grace, self.settings.drain_grace)
            .await;
        tracing::info!("Engine server is stopped");
    }
}

/// Run one launch attempt and publish its outcome.
///
/// An attempt that was stopped or superseded while launching shuts its
/// engine down instead of publishing it.
async fn settle_start(
    settings: Arc<ServerSettings>,
    inner: Arc<Mutex<Inner>>,
    settled: Arc<watch::Sender<u64>>,
    attempt: u64,
) {
    tracing::info!("Starting engine server");
    let result = launch(&settings).await;

    {
        let mut inner = inner.lock().await;
        let current = inner.attempt == attempt && inner.state == ServerState::Starting;
        match result {
            Ok(running) if current => {
                inner.running = Some(running);
                inner.state = ServerState::Alive;
                tracing::info!("Engine server is started");
            }
            Ok(running) => {
                tracing::info!("Engine server start was cancelled, shutting it down");
                running
                    .shutdown(settings.stop_grace, settings.drain_grace)
                    .await;
            }
            Err(e) if current => {
                tracing::error!("Failed to start engine server: {e:#}");
                inner.state = ServerState::Failed(format!("{e:#}"));
            }
            Err(e) => tracing::debug!("Cancelled engine server start failed: {e:#}"),
        }
    }

    settled.send_modify(|done| *done = (*done).max(attempt));
}

async fn launch(settings: &ServerSettings) -> Result<Running> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .context("binding engine server listener")?;
    let port = listener
        .local_addr()
        .context("reading listener address")?
        .port();

    let mut args = settings.extra_args.clone();
    args.push(port.to_string());
    let command = settings
        .runtime
        .engine_command(&settings.entrypoint, &args);
    let search_path =
        launcher::resolve_search_path(&settings.search_path, settings.project_root.as_deref());

    let mut process = launcher::launch(&command, &search_path, ProcessIo::StderrOnly)?;
    let stderr = process.take_stderr()?;
    let drain = drain::attach(
        process.command_line().to_string(),
        stderr,
        MissingModuleHandler::new(
            "engine-server",
            &settings.search_path.module,
            search_path.variable(),
        ),
    );

    let accepted = tokio::select! {
        accepted = tokio::time::timeout(settings.readiness_timeout, listener.accept()) => accepted,
        status = process.wait() => {
            let detail = match status {
                Ok(status) => format!("exited with {status}"),
                Err(e) => e.to_string(),
            };
            drain.join(settings.drain_grace).await;
            bail!("`{}` {detail} before connecting", process.command_line());
        }
    };

    // Dropping `process` on the error paths kills the engine.
    let (stream, peer) = match accepted {
        Ok(accepted) => accepted.context("accepting engine connection")?,
        Err(_) => bail!(
            "`{}` did not connect within {:?}",
            process.command_line(),
            settings.readiness_timeout
        ),
    };
    tracing::debug!("Engine server connected from {peer}");
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Cannot disable Nagle on engine connection: {e}");
    }

    let (read_half, write_half) = stream.into_split();
    Ok(Running {
        process,
        connection: Connection {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
        },
        drain,
    })
}
