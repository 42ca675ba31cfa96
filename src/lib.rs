//! # Variazioni - Incremental Snapshot-Diff Metrics Engine
//!
//! A Rust library that turns successive observations of raw kernel-style
//! counters (interrupts, network devices, disk I/O, queueing disciplines,
//! per-process stats) into a bounded stream of exposable time-series samples.
//!
//! ## The Problem
//!
//! A host exporter reads thousands of counters every few seconds. Most of them
//! do not change between two reads. Exporting every value every cycle wastes
//! bandwidth and storage; exporting only changes loses freshness, and a naive
//! difference between two reads breaks when a 32-bit counter wraps or when the
//! entity behind a key (a device, an interrupt line) goes away or changes
//! identity.
//!
//! ## The Solution: Suppressed Deltas
//!
//! For every family of counters the engine compares the current snapshot with
//! the previous one and a small per-entity [`SuppressionState`](cache::SuppressionState):
//!
//! 1. **Wraparound-safe deltas**: `(curr - prev) mod 2^width` with a width
//!    declared per counter ([`delta`]).
//!
//! 2. **Zero-delta suppression**: a zero delta is rendered once after a
//!    non-zero one, then suppressed until something changes.
//!
//! 3. **Periodic full cycles**: every `N` invocations each entity renders all
//!    of its series, so a scraper never goes stale.
//!
//! 4. **Cardinality reconciliation**: new entities render no delta, vanished
//!    entities render a withdrawal of their descriptor, identity changes
//!    withdraw the old descriptor before asserting the new one ([`reconcile`]).
//!
//! ## Wire Format
//!
//! ```text
//! proc_net_dev_rx_kbps{instance="lsvmi",hostname="node1",dev="eth0"} 12.5 1700000000000
//! proc_net_dev_present{instance="lsvmi",hostname="node1",dev="eth0"} 1 1700000000000
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`delta`] | Wrapping subtraction for 32/64-bit counters |
//! | [`schema`] | Declarative family description: counter kinds, labels, policies |
//! | [`snapshot`] | Per-cycle observation of a family |
//! | [`cache`] | Caller-owned suppression state |
//! | [`reconcile`] | Entity classification and positional alignment |
//! | [`emission`] | The engine: which samples to render this cycle |
//! | [`render`] | Sample lines and label ordering |
//! | [`partition`] | Key-space partitioning across worker threads |
//! | [`stats`] | Lock-free generator statistics |
//! | [`config`] | Exporter-wide settings |
//!
//! ## Quick Start
//!
//! ```rust
//! use variazioni::cache::SuppressionCache;
//! use variazioni::delta::CounterWidth;
//! use variazioni::emission::{Cycle, Engine};
//! use variazioni::schema::{CounterKind, FamilySchema};
//! use variazioni::snapshot::{CounterSnapshot, EntitySample};
//!
//! let schema = FamilySchema::new("proc_net_dev")
//!     .with_entity_label("dev")
//!     .with_counter("proc_net_dev_rx_pkts_delta", CounterKind::delta(CounterWidth::W32))
//!     .with_descriptor("proc_net_dev_present", Vec::<String>::new());
//! let engine = Engine::new(schema)?.with_hostname("node1");
//! let mut cache = SuppressionCache::new();
//!
//! let mut t0 = CounterSnapshot::new();
//! t0.insert("eth0", EntitySample::new(["eth0"], [u32::MAX as u64]));
//! let first = engine.generate(&Cycle::new(&t0, 0), &mut cache)?;
//! assert_eq!(first.len(), 1); // descriptor only
//!
//! let mut t1 = CounterSnapshot::new();
//! t1.insert("eth0", EntitySample::new(["eth0"], [9]));
//! let cycle = Cycle::new(&t1, 5000).with_previous(&t0).with_interval(5.0);
//! let second = engine.generate(&cycle, &mut cache)?;
//! assert!(second.to_text().contains("} 10 5000"));
//! # Ok::<(), variazioni::error::EngineError>(())
//! ```
//!
//! ## Thread Safety
//!
//! An [`Engine`](emission::Engine) holds configuration only and is `Send + Sync`.
//! State lives in the [`SuppressionCache`](cache::SuppressionCache) passed by
//! `&mut`, one per family (or per partition, see [`partition`]).
//!
//! ## Observers
//!
//! The library provides optional observer modules for exporting emissions and
//! statistics. Each observer is gated behind a feature flag:
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `table` | [`observers::table`] | Pretty-print generator statistics as tables |
//! | `json` | [`observers::json`] | Serialize emissions and statistics to JSON |
//! | `prometheus` | [`observers::prometheus`] | Mirror samples into a Prometheus registry |
//! | `full` | All observers | Enables all observer modules |
//!
//! The `serde` feature makes schemas, configuration and suppression state
//! (de)serializable.

pub mod cache;
pub mod config;
pub mod delta;
pub mod emission;
pub mod error;
pub mod observers;
pub mod partition;
pub mod reconcile;
pub mod render;
pub mod schema;
pub mod snapshot;
pub mod stats;

pub use error::{EngineError, Result};
