//! The cinder client coordinator.
//!
//! Binds a canonical block chain, a pending-state mining workspace, a
//! transaction queue, a block import queue and a peer-to-peer sync capability
//! together, and keeps them mutually consistent under concurrent activity
//! from peers, local callers and mining workers.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

mod client;
mod config;
mod db_version;
mod error;
mod filters;
mod gas_price;
mod report;
mod state;
mod worker;

pub use client::{
    ActivityReport, CallResult, Client, ClientComponents, CANARY_ADDRESS,
};
pub use config::ClientConfig;
pub use db_version::VersionChecker;
pub use error::ClientError;
pub use filters::{
    FilterChange, FilterCriteria, CHAIN_CHANGED_FILTER, PENDING_CHANGED_FILTER,
};
pub use gas_price::{GasPriceConfig, GasPricer, OctileGasPricer, TrivialGasPricer};
pub use state::{PendingState, WorkingPhase};
