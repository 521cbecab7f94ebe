//! Shared test doubles. Compiled only for tests.

pub mod provider_mocks;
