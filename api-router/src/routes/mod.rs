pub mod graphs;
pub mod liveness;
pub mod readiness;
pub mod stats;
