pub mod instance_cache;
pub mod manager;
pub mod migration;
pub mod resolver;

pub use instance_cache::{CacheStats, InstanceCache};
pub use manager::GraphManager;
pub use migration::MigrationReport;
pub use resolver::{RequestResolver, ResolvedInstance};
