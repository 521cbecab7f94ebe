//! Application layer: the scheduler and its services.

pub mod services;
