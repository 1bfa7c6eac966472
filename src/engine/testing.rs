//! Scripted engines for tests: a fake UCI process and a canned search source.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::mpsc;

use super::{
    adapter::{SearchEngine, TransportFactory},
    cancel::CancelToken,
    process::EngineTransport,
    types::{EngineError, EngineResult, PvLine, Score, SearchOptions, SearchResult},
};

/// What the fake engine does when it receives `go`
#[derive(Debug, Clone)]
pub enum GoReply {
    /// Print these lines, normally ending with `bestmove`
    Lines(Vec<String>),
    /// Print nothing; the search only ends by cancellation
    Hold,
}

impl GoReply {
    pub fn lines(lines: &[&str]) -> Self {
        GoReply::Lines(lines.iter().map(|l| l.to_string()).collect())
    }
}

#[derive(Debug, Default)]
struct FakeState {
    sent: Vec<String>,
    go_replies: VecDeque<GoReply>,
    output: Option<mpsc::UnboundedSender<String>>,
    connections: usize,
}

/// Handle to a fake UCI engine shared with the adapter under test
#[derive(Debug, Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
    answers_uci: bool,
    answers_isready: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            answers_uci: true,
            answers_isready: true,
        }
    }

    /// Engine that never completes the handshake
    pub fn silent() -> Self {
        Self {
            answers_uci: false,
            ..Self::new()
        }
    }

    pub fn without_readyok(mut self) -> Self {
        self.answers_isready = false;
        self
    }

    pub fn push_go_reply(&self, reply: GoReply) {
        self.state.lock().unwrap().go_replies.push_back(reply);
    }

    /// Commands received so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.sent().iter().filter(|c| c.as_str() == command).count()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }

    /// Print a line on the current connection outside any scripted reply
    /// Returns false once the output stream is closed
    pub fn emit(&self, line: &str) -> bool {
        match &self.state.lock().unwrap().output {
            Some(output) => output.send(line.to_string()).is_ok(),
            None => false,
        }
    }

    /// Close the engine's output stream, as if the process had died
    pub fn hang_up(&self) {
        self.state.lock().unwrap().output.take();
    }

    pub async fn wait_for_command(&self, command: &str) {
        for _ in 0..200 {
            if self.count(command) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("fake engine never received {:?}", command);
    }

    pub fn factory(&self) -> TransportFactory {
        let engine = self.clone();
        Arc::new(move || Ok(engine.connect()))
    }

    fn connect(&self) -> EngineTransport {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
        let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();

        {
            let mut state = self.state.lock().unwrap();
            state.connections += 1;
            state.output = Some(line_tx);
        }

        let engine = self.clone();
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                for line in engine.respond(&command) {
                    if !engine.emit(&line) {
                        return;
                    }
                }
            }
        });

        EngineTransport {
            commands: command_tx,
            lines: line_rx,
            process: None,
        }
    }

    fn respond(&self, command: &str) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(command.to_string());

        if command == "uci" && self.answers_uci {
            return vec!["id name FakeFish".to_string(), "uciok".to_string()];
        }
        if command == "isready" && self.answers_isready {
            return vec!["readyok".to_string()];
        }
        if command.starts_with("go") {
            return match state.go_replies.pop_front() {
                Some(GoReply::Lines(lines)) => lines,
                Some(GoReply::Hold) | None => Vec::new(),
            };
        }
        Vec::new()
    }
}

/// [`SearchEngine`] that answers from a queue of canned results
#[derive(Debug, Default)]
pub struct ScriptedSearch {
    results: Mutex<VecDeque<EngineResult<SearchResult>>>,
    requests: Mutex<Vec<(String, SearchOptions)>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: EngineResult<SearchResult>) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Queue a result built from `(score, pv)` pairs in multipv order
    pub fn push_lines(&self, lines: &[(Score, &str)]) {
        self.push(Ok(search_result(lines)));
    }

    pub fn requests(&self) -> Vec<(String, SearchOptions)> {
        self.requests.lock().unwrap().clone()
    }
}

impl SearchEngine for ScriptedSearch {
    fn search(
        &self,
        fen: &str,
        options: &SearchOptions,
        _cancel: Option<&CancelToken>,
    ) -> impl Future<Output = EngineResult<SearchResult>> + Send {
        self.requests
            .lock()
            .unwrap()
            .push((fen.to_string(), options.clone()));
        let result = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(EngineError::Disconnected));
        std::future::ready(result)
    }
}

/// Build a search result from `(score, space separated pv)` pairs
pub fn search_result(lines: &[(Score, &str)]) -> SearchResult {
    let lines: Vec<PvLine> = lines
        .iter()
        .enumerate()
        .map(|(i, (score, pv))| {
            PvLine::new(
                i as u16 + 1,
                *score,
                pv.split_whitespace().map(str::to_string).collect(),
            )
        })
        .collect();

    SearchResult {
        best_move: lines.first().map(|l| l.best_move.clone()).unwrap_or_default(),
        ponder: None,
        score: lines.first().map(|l| l.score),
        pv: lines.first().map(|l| l.pv.clone()).unwrap_or_default(),
        lines,
    }
}
