//! SQL query optimization pipeline: given a query, a live
//! database session and an LLM provider, generates candidate rewrites,
//! rejects any that change results, benchmarks survivors, and returns the
//! fastest correct candidate with an attribution of which transforms
//! applied.
//!
//! Design Philosophy: each module owns one subsystem of the pipeline — plan
//! parsing, pathology detection, dispatch, worker execution, patch
//! application, the correctness gate, benchmarking, the sniper, and mission
//! orchestration — composed through `AppState` for the HTTP surface and
//! through `cli` for the CLI surface.

pub mod bench;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod gate;
pub mod http;
pub mod mission;
pub mod patchplan;
pub mod pathology;
pub mod plan;
pub mod session;
pub mod sniper;
pub mod utils;
pub mod worker;

pub use config::Config;
pub use http::AppState;
