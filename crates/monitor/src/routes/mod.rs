pub mod metrics;
pub mod session;
