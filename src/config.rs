use crate::domain::{ChainId, NetworkName};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_POLL_SECS: u64 = 3;
pub const DEFAULT_FULL_REFRESH_SECS: u64 = 30 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub network_config_path: PathBuf,
    /// Networks to sync. Empty means every configured network.
    pub networks: Vec<NetworkName>,
    pub startup_cache: Option<String>,
    pub poll_interval: Duration,
    pub refresh_workers: usize,
    pub refresh_max_rps: usize,
    /// Zero disables the periodic full refresh.
    pub full_refresh_interval: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let network_config_path = env_map
            .get("NETWORK_CONFIG_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingEnv("NETWORK_CONFIG_PATH".to_string()))?;

        let networks = env_map
            .get("NETWORKS")
            .map(|s| {
                s.split(',')
                    .map(|name| name.trim())
                    .filter(|name| !name.is_empty())
                    .map(NetworkName::new)
                    .collect()
            })
            .unwrap_or_default();

        let startup_cache = env_map
            .get("STARTUP_CACHE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let poll_secs = parse_num::<u64>(&env_map, "SUBGRAPH_POLL_SECS", DEFAULT_POLL_SECS)?;
        let refresh_workers = parse_num::<usize>(
            &env_map,
            "REFRESH_WORKERS",
            crate::refresh::liquidity_refresher::NUM_WORKERS,
        )?;
        let refresh_max_rps = parse_num::<usize>(
            &env_map,
            "REFRESH_MAX_RPS",
            crate::refresh::liquidity_refresher::MAX_REQS_PER_SEC,
        )?;
        if refresh_workers == 0 || refresh_max_rps == 0 {
            return Err(ConfigError::InvalidValue(
                "REFRESH_WORKERS/REFRESH_MAX_RPS".to_string(),
                "must be positive".to_string(),
            ));
        }
        let full_refresh_secs =
            parse_num::<u64>(&env_map, "FULL_REFRESH_SECS", DEFAULT_FULL_REFRESH_SECS)?;

        Ok(Config {
            port,
            network_config_path,
            networks,
            startup_cache,
            poll_interval: Duration::from_secs(poll_secs),
            refresh_workers,
            refresh_max_rps,
            full_refresh_interval: Duration::from_secs(full_refresh_secs),
        })
    }
}

fn parse_num<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("must be a number, got {}", raw))
        }),
    }
}

/// Per-chain settings from the network config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub subgraph: String,
    #[serde(default)]
    pub query_contract: String,
    pub knockout_tick_width: i32,
    #[serde(default)]
    pub rpc: String,
}

impl ChainConfig {
    pub fn chain_id(&self) -> ChainId {
        ChainId::from_int(self.chain_id)
    }
}

#[derive(Debug, Error)]
pub enum NetworkConfigError {
    #[error("Failed to read network config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid network config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Chain id {0} is configured for more than one network")]
    DuplicateChain(u64),
}

/// Network name to chain settings.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    chains: BTreeMap<NetworkName, ChainConfig>,
}

impl NetworkConfig {
    pub fn load(
        path: &std::path::Path,
        env: &HashMap<String, String>,
    ) -> Result<Self, NetworkConfigError> {
        let bytes = std::fs::read(path).map_err(|source| NetworkConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&bytes, env)
    }

    /// Parse the config file and apply `RPC_<NETWORK>` and `GRAPH_API_KEY`
    /// overrides from `env`.
    pub fn from_json(
        bytes: &[u8],
        env: &HashMap<String, String>,
    ) -> Result<Self, NetworkConfigError> {
        let raw: BTreeMap<String, ChainConfig> = serde_json::from_slice(bytes)?;
        let api_key = env.get("GRAPH_API_KEY").filter(|k| !k.is_empty());

        let mut seen = std::collections::HashSet::new();
        let mut chains = BTreeMap::new();
        for (network, mut chain) in raw {
            if !seen.insert(chain.chain_id) {
                return Err(NetworkConfigError::DuplicateChain(chain.chain_id));
            }
            if let Some(rpc) = env.get(&format!("RPC_{}", network.to_uppercase())) {
                chain.rpc = rpc.clone();
            }
            if let Some(key) = api_key {
                chain.subgraph = chain.subgraph.replace("[api-key]", key);
            }
            chains.insert(NetworkName::new(network), chain);
        }
        Ok(NetworkConfig { chains })
    }

    pub fn insert(&mut self, network: NetworkName, chain: ChainConfig) {
        self.chains.insert(network, chain);
    }

    pub fn chain_config(&self, network: &NetworkName) -> Option<&ChainConfig> {
        self.chains.get(network)
    }

    pub fn chain_id_for_network(&self, network: &NetworkName) -> Option<ChainId> {
        self.chains.get(network).map(ChainConfig::chain_id)
    }

    pub fn network_for_chain_id(&self, chain_id: &ChainId) -> Option<&NetworkName> {
        self.chains
            .iter()
            .find(|(_, chain)| chain.chain_id() == *chain_id)
            .map(|(network, _)| network)
    }

    pub fn chain_config_for_id(&self, chain_id: &ChainId) -> Option<&ChainConfig> {
        self.chains
            .values()
            .find(|chain| chain.chain_id() == *chain_id)
    }

    pub fn networks(&self) -> impl Iterator<Item = (&NetworkName, &ChainConfig)> {
        self.chains.iter()
    }
}
