//! Deterministic in-memory test doubles for the ChannelSync engine.
//!
//! Everything here is deterministic: no randomness, no clock reads, no IO.
//! Counters are exposed so tests can assert exactly how many side effects
//! a flow produced.

pub mod memory;
pub mod world;

pub use memory::{InMemoryGateway, InMemoryOrderLog, InMemoryOrderStore, InMemoryOutbox};
pub use world::ListingWorld;
