// OpenPawz Edge — offline-first resilience engine for OpenPawz clients.
//
//   atoms/   pure types, constants, errors, collaborator traits
//   engine/  sync queue, tiered cache, inference router, analytics buffer,
//            connectivity, capability probe, SQLite store, HTTP backend

pub mod atoms;
pub mod engine;

pub use atoms::error::{EdgeError, EdgeResult};
pub use atoms::traits::{ConnectivitySource, EdgeBackend, LocalModel};
pub use atoms::types::*;
pub use engine::analytics::AnalyticsBuffer;
pub use engine::backend::HttpBackend;
pub use engine::cache::TieredCache;
pub use engine::config::EdgeConfig;
pub use engine::connectivity::{ConnectivityMonitor, ManualConnectivity, Transition};
pub use engine::inference::{InferenceRouter, ModelCatalog};
pub use engine::store::EdgeStore;
pub use engine::sync_queue::SyncQueue;
pub use engine::EdgeEngine;
