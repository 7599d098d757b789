//! Component lifecycle protocol.

use async_trait::async_trait;

use foundation_errors::Result;

/// A registered component participating in hub lifecycle.
///
/// Both hooks default to no-ops so simple value components need no
/// boilerplate. `initialize` runs in registration order, `cleanup` in
/// reverse registration order.
#[async_trait]
pub trait Component: Send + Sync {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// Summary of a completed component registration.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub name: String,
    pub dimension: String,
    pub aliases: Vec<String>,
}
