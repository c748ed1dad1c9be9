//! Cross-crate scenario tests.
//!
//! Everything here runs against [`informer_runtime::MemoryStore`], wrapped
//! where a scenario needs to lose events or force interleavings.
//!
//! Run with: `cargo test --package integration-tests`


#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod load_tests;
#[cfg(test)]
mod mutation_tests;
#[cfg(test)]
mod snapshot_tests;
#[cfg(test)]
mod synchronizer_tests;
