use std::{
    future::Future,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use derivative::Derivative;
use log::{debug, error, info, trace, warn};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};

use super::{
    cancel::CancelToken,
    communication::{parse_engine_line, EngineMessage, ListenerRegistry, SearchSnapshot, Subscription},
    config::HostCapabilities,
    process::{EngineProcess, EngineTransport},
    types::{
        EngineError, EngineLog, EngineResult, EngineState, SearchOptions, SearchResult,
        ENGINE_INIT_TIMEOUT, ENGINE_READY_TIMEOUT,
    },
};

/// Produces a fresh engine connection each time the adapter initializes
pub type TransportFactory = Arc<dyn Fn() -> EngineResult<EngineTransport> + Send + Sync>;

/// Anything that can run a multi-line search for a position
pub trait SearchEngine {
    fn search(
        &self,
        fen: &str,
        options: &SearchOptions,
        cancel: Option<&CancelToken>,
    ) -> impl Future<Output = EngineResult<SearchResult>> + Send;
}

/// Timeouts and host facts used by the adapter
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub init_timeout: Duration,
    pub ready_timeout: Duration,
    pub hash_mb: Option<u32>,
    pub host: HostCapabilities,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            init_timeout: ENGINE_INIT_TIMEOUT,
            ready_timeout: ENGINE_READY_TIMEOUT,
            hash_mb: None,
            host: HostCapabilities::detect(),
        }
    }
}

#[derive(Debug)]
struct Connection {
    process: Option<EngineProcess>,
    dispatcher: JoinHandle<()>,
}

#[derive(Derivative)]
#[derivative(Debug)]
struct AdapterInner {
    #[derivative(Debug = "ignore")]
    factory: TransportFactory,
    settings: AdapterSettings,
    state: Mutex<EngineState>,
    commands: Mutex<Option<mpsc::UnboundedSender<String>>>,
    init_lock: tokio::sync::Mutex<()>,
    connection: tokio::sync::Mutex<Option<Connection>>,
    /// Bumped for every connection; a dispatcher only resets the adapter for its own
    generation: AtomicU64,
    listeners: ListenerRegistry,
    logs: Arc<Mutex<Vec<EngineLog>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// UCI engine driven as an actor
///
/// Commands go out through a single channel; one dispatcher task fans every
/// engine line out to the listeners registered by in-flight operations. Each
/// operation holds a [`Subscription`] for exactly as long as it runs.
///
/// Cloning yields another handle to the same engine.
#[derive(Debug, Clone)]
pub struct EngineAdapter {
    inner: Arc<AdapterInner>,
}

impl EngineAdapter {
    /// Adapter for an engine binary on disk; the process starts on first use
    pub fn from_path(path: impl Into<PathBuf>, settings: AdapterSettings) -> Self {
        let path = path.into();
        Self::with_factory(Arc::new(move || EngineProcess::spawn(&path)), settings)
    }

    pub fn with_factory(factory: TransportFactory, settings: AdapterSettings) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                factory,
                settings,
                state: Mutex::new(EngineState::Uninitialized),
                commands: Mutex::new(None),
                init_lock: tokio::sync::Mutex::new(()),
                connection: tokio::sync::Mutex::new(None),
                generation: AtomicU64::new(0),
                listeners: ListenerRegistry::new(),
                logs: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }

    pub fn state(&self) -> EngineState {
        *lock(&self.inner.state)
    }

    /// Every line exchanged with the engine so far
    pub fn logs(&self) -> Vec<EngineLog> {
        lock(&self.inner.logs).clone()
    }

    /// Run the `uci` handshake
    ///
    /// Idempotent. Concurrent callers wait on the same in-flight handshake
    /// and observe its outcome.
    pub async fn initialize(&self) -> EngineResult<()> {
        if matches!(self.state(), EngineState::Ready | EngineState::Searching) {
            return Ok(());
        }

        let _init = self.inner.init_lock.lock().await;
        if matches!(self.state(), EngineState::Ready | EngineState::Searching) {
            return Ok(());
        }

        self.set_state(EngineState::Initializing);
        match self.connect_and_handshake().await {
            Ok(()) => {
                self.set_state(EngineState::Ready);
                info!("Engine initialized");
                Ok(())
            }
            Err(e) => {
                error!("Engine initialization failed: {}", e);
                self.teardown().await;
                Err(e)
            }
        }
    }

    /// Send `isready` and wait for `readyok`
    pub async fn wait_ready(&self, limit: Duration) -> EngineResult<()> {
        if self.state() == EngineState::Uninitialized {
            return Err(EngineError::NotInitialized);
        }

        let mut subscription = self.inner.listeners.subscribe();
        self.send("isready")?;

        match timeout(limit, wait_for(&mut subscription, |m| *m == EngineMessage::ReadyOk)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Engine did not answer readyok within {:?}", limit);
                Err(EngineError::ReadyTimeout)
            }
        }
    }

    /// Run one search and collect every reported line until `bestmove`
    ///
    /// Fails with [`EngineError::SearchInProgress`] while another search owns
    /// the engine. A cancelled token sends `stop` and fails with
    /// [`EngineError::Aborted`]; the engine's late `bestmove` is discarded.
    pub async fn search(
        &self,
        fen: &str,
        options: &SearchOptions,
        cancel: Option<&CancelToken>,
    ) -> EngineResult<SearchResult> {
        if self.state() == EngineState::Searching {
            return Err(EngineError::SearchInProgress);
        }

        self.initialize().await?;
        let _slot = self.claim_search()?;

        let result = match cancel {
            Some(token) if token.is_cancelled() => Err(self.abort_search()),
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(self.abort_search()),
                    result = self.run_search(fen, options) => result,
                }
            }
            None => self.run_search(fen, options).await,
        };

        match &result {
            Ok(r) => debug!("Search finished: bestmove {} ({} lines)", r.best_move, r.lines.len()),
            Err(EngineError::Aborted) => debug!("Search aborted"),
            Err(e) => warn!("Search failed: {}", e),
        }
        result
    }

    /// Send `quit`, release the process and forget every listener
    ///
    /// Later calls start from scratch as if the adapter had never been used.
    pub async fn shutdown(&self) {
        info!("Shutting down engine");
        let commands = lock(&self.inner.commands).take();
        if let Some(commands) = commands {
            if commands.send("quit".to_string()).is_ok() {
                lock(&self.inner.logs).push(EngineLog::Gui("quit".to_string()));
            }
        }
        self.teardown().await;
    }

    // =============================================================================
    // Private Implementation
    // =============================================================================

    fn set_state(&self, state: EngineState) {
        let mut current = lock(&self.inner.state);
        if *current != state {
            trace!("Engine state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    fn claim_search(&self) -> EngineResult<SearchSlot<'_>> {
        let mut state = lock(&self.inner.state);
        match *state {
            EngineState::Ready => {
                *state = EngineState::Searching;
                Ok(SearchSlot { adapter: self })
            }
            EngineState::Searching => Err(EngineError::SearchInProgress),
            _ => Err(EngineError::NotInitialized),
        }
    }

    fn abort_search(&self) -> EngineError {
        if let Err(e) = self.send("stop") {
            debug!("Could not send stop: {}", e);
        }
        EngineError::Aborted
    }

    fn send(&self, command: &str) -> EngineResult<()> {
        let commands = lock(&self.inner.commands);
        let sender = commands.as_ref().ok_or(EngineError::NotInitialized)?;
        debug!("Sending UCI command: {}", command);
        sender
            .send(command.to_string())
            .map_err(|_| EngineError::Disconnected)?;
        lock(&self.inner.logs).push(EngineLog::Gui(command.to_string()));
        Ok(())
    }

    async fn connect_and_handshake(&self) -> EngineResult<()> {
        let EngineTransport {
            commands,
            mut lines,
            process,
        } = (self.inner.factory)()?;

        self.release_connection().await;
        *lock(&self.inner.commands) = Some(commands);

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let adapter = Arc::downgrade(&self.inner);
        let registry = self.inner.listeners.clone();
        let logs = Arc::clone(&self.inner.logs);
        let dispatcher = tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                trace!("Engine response: {}", line);
                lock(&logs).push(EngineLog::Engine(line.clone()));
                registry.dispatch(&line);
            }
            debug!("Engine output stream ended");

            // the next operation reconnects from scratch
            if let Some(inner) = adapter.upgrade() {
                if inner.generation.load(Ordering::SeqCst) == generation {
                    warn!("Engine connection lost");
                    lock(&inner.commands).take();
                    *lock(&inner.state) = EngineState::Uninitialized;
                }
            }
            registry.clear();
        });
        *self.inner.connection.lock().await = Some(Connection { process, dispatcher });

        let mut subscription = self.inner.listeners.subscribe();
        self.send("uci")?;

        let limit = self.inner.settings.init_timeout;
        match timeout(limit, wait_for(&mut subscription, |m| *m == EngineMessage::UciOk)).await {
            Ok(result) => result?,
            Err(_) => return Err(EngineError::InitializationTimeout),
        }

        if let Some(hash) = self.inner.settings.hash_mb {
            self.send(&format!("setoption name Hash value {}", hash))?;
        }
        Ok(())
    }

    async fn run_search(&self, fen: &str, options: &SearchOptions) -> EngineResult<SearchResult> {
        self.send("ucinewgame")?;
        self.wait_ready(self.inner.settings.ready_timeout).await?;

        let mode = options.go_mode();
        let threads = self.inner.settings.host.threads_for(&mode, options.threads);
        self.send(&format!("setoption name Threads value {}", threads))?;
        self.send(&format!("setoption name MultiPV value {}", options.multipv()))?;
        if let Some(skill) = options.skill_level {
            self.send(&format!("setoption name Skill Level value {}", skill))?;
        }
        if let Some(contempt) = options.contempt {
            self.send(&format!("setoption name Contempt value {}", contempt))?;
        }
        self.send(&format!("position fen {}", fen))?;

        let mut subscription = self.inner.listeners.subscribe();
        self.send(&mode.to_command())?;

        let mut snapshot = SearchSnapshot::new();
        while let Some(line) = subscription.recv().await {
            match parse_engine_line(&line) {
                EngineMessage::Info(info) => snapshot.apply(info),
                EngineMessage::BestMove { best_move, ponder } => {
                    return Ok(snapshot.into_result(best_move, ponder));
                }
                _ => {}
            }
        }

        Err(EngineError::Disconnected)
    }

    async fn teardown(&self) {
        lock(&self.inner.commands).take();
        self.inner.listeners.clear();
        self.release_connection().await;
        self.set_state(EngineState::Uninitialized);
    }

    /// Stop the previous process and dispatcher, if any are left
    async fn release_connection(&self) {
        if let Some(mut connection) = self.inner.connection.lock().await.take() {
            connection.dispatcher.abort();
            if let Some(process) = connection.process.as_mut() {
                process.terminate().await;
            }
        }
    }
}

impl SearchEngine for EngineAdapter {
    fn search(
        &self,
        fen: &str,
        options: &SearchOptions,
        cancel: Option<&CancelToken>,
    ) -> impl Future<Output = EngineResult<SearchResult>> + Send {
        EngineAdapter::search(self, fen, options, cancel)
    }
}

/// Returns the adapter to `Ready` when a search ends for any reason
struct SearchSlot<'a> {
    adapter: &'a EngineAdapter,
}

impl Drop for SearchSlot<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.adapter.inner.state);
        if *state == EngineState::Searching {
            *state = EngineState::Ready;
        }
    }
}

async fn wait_for(
    subscription: &mut Subscription,
    matches: impl Fn(&EngineMessage) -> bool,
) -> EngineResult<()> {
    while let Some(line) = subscription.recv().await {
        if matches(&parse_engine_line(&line)) {
            return Ok(());
        }
    }
    Err(EngineError::Disconnected)
}
