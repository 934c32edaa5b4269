//! Integration tests: end-to-end scenarios, cache behaviour, universal
//! properties, and robustness fuzzing.

mod cache_behaviour;
mod end_to_end;
mod properties;
