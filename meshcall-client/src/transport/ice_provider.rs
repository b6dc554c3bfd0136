use anyhow::Result;
use async_trait::async_trait;
use meshcall_core::IceServerConfig;
use tracing::warn;

/// Source of STUN/TURN servers, read each time a connection is created.
#[async_trait]
pub trait IceServerProvider: Send + Sync {
    async fn ice_servers(&self) -> Result<Vec<IceServerConfig>>;
}

/// A fixed server list.
#[derive(Debug, Clone, Default)]
pub struct StaticIceServers(pub Vec<IceServerConfig>);

#[async_trait]
impl IceServerProvider for StaticIceServers {
    async fn ice_servers(&self) -> Result<Vec<IceServerConfig>> {
        Ok(self.0.clone())
    }
}

/// Asks `provider` for servers and falls back to `fallback`, then to the
/// public STUN servers, when it fails or has nothing.
pub async fn resolve_ice_servers(
    provider: &dyn IceServerProvider,
    fallback: &[IceServerConfig],
) -> Vec<IceServerConfig> {
    match provider.ice_servers().await {
        Ok(servers) if !servers.is_empty() => return servers,
        Ok(_) => warn!("ICE server provider returned no servers, using fallback"),
        Err(e) => warn!("ICE server provider failed, using fallback: {:?}", e),
    }

    if fallback.is_empty() {
        IceServerConfig::default_stun()
    } else {
        fallback.to_vec()
    }
}
