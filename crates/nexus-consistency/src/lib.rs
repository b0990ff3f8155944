//! Nexus Consistency - offline record store checker and concurrent node scan
//!
//! This crate verifies the structural invariants of Nexus's Neo4j-inspired
//! record stores and provides the partitioned "all nodes" scan used by
//! parallel readers:
//! - Record model (nodes, relationships, groups, properties, dynamic blocks, tokens, schema)
//! - Store access contract with an in-memory implementation
//! - Typed violation reporting with pluggable sinks
//! - Multi-pass parallel consistency checker (graph, indexes, scan stores, counts)
//! - Concurrent node scan over committed and pending nodes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          ConsistencyChecker                  │
//! │  (schema, records, ownership, indexes,      │
//! │   scan stores, counts)                      │
//! └──────────────┬───────────────┬──────────────┘
//!                │               │ Reporter
//!                │      ┌────────┴─────────────┐
//!                │      │      ReportSink      │
//!                │      └──────────────────────┘
//! ┌──────────────┴──────────────────────────────┐
//! │              StoreAccess                     │
//! │   (typed record snapshots, indexes,         │
//! │    scan stores, counts)                     │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │      Node scan (AllNodeScan + TxState)      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use nexus_consistency::config::CheckConfig;
//! use nexus_consistency::record::TokenKind;
//! use nexus_consistency::report::CollectingSink;
//! use nexus_consistency::store::MemoryStore;
//! use nexus_consistency::ConsistencyChecker;
//!
//! let store = MemoryStore::new();
//! let person = store.create_token(TokenKind::Label, "Person").unwrap();
//! store.create_node(&[person]).unwrap();
//!
//! let sink = CollectingSink::new();
//! let summary = ConsistencyChecker::new(&store, CheckConfig::default())
//!     .check(&sink)
//!     .unwrap();
//! assert!(summary.is_consistent());
//! assert!(sink.is_empty());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod checker;
pub mod config;
pub mod error;
pub mod record;
pub mod report;
pub mod scan;
pub mod store;

pub use checker::{CheckSummary, ConsistencyChecker, StopSignal};
pub use config::{CheckConfig, ReporterMode, ScanConfig};
pub use error::{Error, Result};
