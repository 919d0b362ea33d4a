pub mod embedded;
pub mod networked;
pub mod pool;
pub mod traits;

pub use embedded::EmbeddedBackend;
pub use networked::NetworkedBackend;
pub use traits::RelationalStore;

use crate::config::{Config, RelationalBackendKind};
use crate::error::Result;

/// Builds the configured relational backend (§4.1, §6.2). Selected by
/// `RELATIONAL_BACKEND`; both backends implement `RelationalStore` with
/// identical observable semantics.
pub async fn build_relational_store(config: &Config) -> Result<Box<dyn RelationalStore>> {
    let capacity = config.memory.short_memory_capacity as u32;
    match config.relational.backend {
        RelationalBackendKind::Embedded => {
            Ok(Box::new(EmbeddedBackend::new(&config.relational, capacity).await?))
        }
        RelationalBackendKind::Networked => {
            Ok(Box::new(NetworkedBackend::new(&config.relational, capacity).await?))
        }
    }
}
