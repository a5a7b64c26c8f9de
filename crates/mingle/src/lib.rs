#![forbid(unsafe_code)]

pub mod config;
pub mod db;
pub mod directory;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod logging;
pub mod mcp;
pub mod neo4j;
pub mod planner;
pub mod providers;
pub mod rag;
pub mod safety;
pub mod store;
pub mod tools;
pub mod traversal;
pub mod types;
pub mod utils;
pub mod vectors;

pub use engine::{EngineClients, QueryEngine};
pub use error::{EngineError, Result};
