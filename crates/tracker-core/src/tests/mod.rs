//! Runtime-level tests against scripted auth and record stores.
//!
//! - `harness.rs`    - runtime wired to `ScriptedAuthProvider` and `InMemoryLedgerStore`
//! - `scenarios.rs`  - end-to-end user flows
//! - `properties.rs` - ledger invariants observed through the runtime
//! - `premium.rs`    - premium latch, theme and policy rules
//! - `expiry.rs`     - credential rejection by the record store

mod scenarios;
