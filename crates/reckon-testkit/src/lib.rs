//! reckon-testkit
//!
//! Fakes and fixtures shared by the scenario tests: a scripted exchange, a
//! store with switchable write faults, raw record builders and a resolver
//! seeded like the production lookup tables. No network, no database.

mod fake_broker;
mod fault_store;
mod fixtures;

pub use fake_broker::{Call, FakeBroker, Step};
pub use fault_store::FaultStore;
pub use fixtures::*;
