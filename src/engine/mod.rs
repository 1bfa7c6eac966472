// =============================================================================
// Chess Engine Module
// =============================================================================
//
// Drives an external UCI engine as an actor: commands are queued on a single
// outbound channel, engine output is fanned out by one dispatcher task to the
// listeners of whichever operations are in flight.
//
// ## Architecture Overview
//
// ```
// ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
// │    Adapter      │    │     Cancel      │    │     Config      │
// │ (State machine) │────│ (Stop requests) │    │ (Host threads)  │
// └─────────────────┘    └─────────────────┘    └─────────────────┘
//          │                       │
// ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
// │   Process       │    │ Communication   │    │     Types       │
// │ (Pipes, tasks)  │────│ (Parse, fanout) │    │ (Shared types)  │
// └─────────────────┘    └─────────────────┘    └─────────────────┘
// ```
//
// ## Module Responsibilities
//
// - **types**: Shared type definitions, constants, and error types
// - **process**: Child process spawning and pipe pumping tasks
// - **communication**: UCI line parsing, search snapshots, listener registry
// - **adapter**: Init / ready / search / shutdown state machine
// - **cancel**: Cooperative cancellation tokens
// - **config**: Host capability detection and thread / hash policy
//
// ## Usage
//
// ```rust
// use engine::{AdapterSettings, EngineAdapter, SearchOptions};
//
// let engine = EngineAdapter::from_path("/usr/bin/stockfish", AdapterSettings::default());
// engine.initialize().await?;
// let options = SearchOptions { depth: Some(12), multipv: Some(3), ..Default::default() };
// let result = engine.search(fen, &options, None).await?;
// ```

pub mod adapter;
pub mod cancel;
pub mod communication;
pub mod config;
pub mod process;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Adapter and cancellation
pub use adapter::{AdapterSettings, EngineAdapter, SearchEngine, TransportFactory};
pub use cancel::CancelToken;

// Protocol helpers
pub use communication::{parse_engine_line, EngineMessage, InfoUpdate, ListenerRegistry, SearchSnapshot, Subscription};
pub use config::{recommended_hash_mb, HostCapabilities};
pub use process::{EngineProcess, EngineTransport};

// Types
pub use types::{
    EngineError, EngineLog, EngineResult, EngineState, GoMode, PvLine, Score, SearchOptions, SearchResult,
    DEFAULT_SEARCH_DEPTH, ENGINE_INIT_TIMEOUT, ENGINE_READY_TIMEOUT, MATE_SCORE_CP,
};
