//! Node wiring for the Tally election ledger.
//!
//! [`ElectionNetwork`] owns one store and everything built on it:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     ElectionNetwork                       │
//! │                                                           │
//! │   ┌─────────────────────┐        ┌───────────────────┐    │
//! │   │    BlockProducer    │──────▶ │    RuleEngine     │    │
//! │   │  ledger + pool      │ screen │  contract table   │    │
//! │   └─────────────────────┘        └───────────────────┘    │
//! │              ▲                            ▲               │
//! │              └────────── Monitor ─────────┘               │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The `tally` binary reads a [`NodeConfig`] TOML file, opens a
//! [`tally_storage::FileStore`] under its data directory and runs the
//! producer and metrics loops until Ctrl-C.

pub mod config;
mod network;

pub use config::NodeConfig;
pub use network::{ElectionNetwork, NodeReport, RuleScreen};
