use crate::{
    Error,
    Result,
    config::{
        JackpotConfig,
        Network,
    },
    ledger::LedgerGateway,
    rpc::{
        HttpSuiRpc,
        SuiRpc,
    },
    types::{
        ObjectId,
        Pool,
    },
};

const MAX_PROBES: usize = 3;

/// Probe order when looking for a live pool.
pub const DISCOVERY_ORDER: [Network; MAX_PROBES] =
    [Network::Testnet, Network::Devnet, Network::Mainnet];

#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveredPool {
    pub pool_id: ObjectId,
    pub network: Network,
    /// The pool as read on `network` while verifying it.
    pub pool: Pool,
}

/// Fallback for a registry that carries no pool pointer, or a client pointed
/// at the wrong network.
pub struct PoolDiscovery<R> {
    probes: Vec<(Network, LedgerGateway<R>)>,
}

impl<R: SuiRpc> PoolDiscovery<R> {
    /// Probes beyond the third are ignored.
    pub fn new(probes: impl IntoIterator<Item = (Network, LedgerGateway<R>)>) -> Self {
        Self {
            probes: probes.into_iter().take(MAX_PROBES).collect(),
        }
    }

    pub fn networks(&self) -> Vec<Network> {
        self.probes.iter().map(|(network, _)| *network).collect()
    }

    /// First network whose registry points at a pool that also resolves there.
    pub async fn find_latest_pool(&self, registry_id: &ObjectId) -> Result<DiscoveredPool> {
        for (network, gateway) in &self.probes {
            match probe(gateway, registry_id).await {
                Ok(Some((pool_id, pool))) => {
                    tracing::info!(%network, %pool_id, round = pool.round_number, "found active pool");
                    return Ok(DiscoveredPool {
                        pool_id,
                        network: *network,
                        pool,
                    });
                }
                Ok(None) => {
                    tracing::debug!(%network, "registry has no current pool");
                }
                Err(err) => {
                    tracing::debug!(%network, %err, "pool probe failed");
                }
            }
        }
        tracing::warn!(%registry_id, "no active pool found on any network");
        Err(Error::NoActivePool)
    }

    /// Checks one network, or every probe when `network` is `None`.
    pub async fn validate_pool_exists(&self, pool_id: &ObjectId, network: Option<Network>) -> bool {
        for (probe_network, gateway) in &self.probes {
            if network.is_some_and(|wanted| wanted != *probe_network) {
                continue;
            }
            match gateway.get_pool(pool_id).await {
                Ok(_) => return true,
                Err(err) => {
                    tracing::debug!(network = %probe_network, %pool_id, %err, "pool not found")
                }
            }
        }
        false
    }
}

impl PoolDiscovery<HttpSuiRpc> {
    /// One HTTP probe per network in [`DISCOVERY_ORDER`].
    pub fn for_networks(config: &JackpotConfig) -> Result<Self> {
        let probes = DISCOVERY_ORDER
            .iter()
            .map(|network| {
                let rpc = HttpSuiRpc::new(network.fullnode_url(), config.request_timeout)?;
                Ok((*network, LedgerGateway::new(rpc, config)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(probes))
    }
}

async fn probe<R: SuiRpc>(
    gateway: &LedgerGateway<R>,
    registry_id: &ObjectId,
) -> Result<Option<(ObjectId, Pool)>> {
    let registry = gateway.get_registry(registry_id).await?;
    let Some(pool_id) = registry.current_pool_id else {
        return Ok(None);
    };
    let pool = gateway.get_pool(&pool_id).await?;
    Ok(Some((pool_id, pool)))
}
