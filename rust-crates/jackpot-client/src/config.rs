use crate::{
    Error,
    Result,
    types::{
        Address,
        Mist,
        ObjectId,
    },
};
use std::{
    fmt,
    str::FromStr,
    time::Duration,
};

pub const DEFAULT_MODULE_NAME: &str = "jackpot_contract";
pub const PLACEHOLDER_PACKAGE_ID: &str = "0x1234567890abcdef1234567890abcdef12345678";
pub const CLOCK_OBJECT_ID: ObjectId = Address::from_u8(6);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_ACTIVITY_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Move function names exposed by the jackpot contract.
pub mod functions {
    pub const BUY_TICKETS: &str = "buy_tickets";
    pub const GET_ROUND_INFO: &str = "get_round_info";
    pub const GET_USER_TICKETS: &str = "get_user_tickets";
    pub const IS_LAST_MINUTE: &str = "is_last_minute";
    pub const GET_CURRENT_ROUND_INFO: &str = "get_current_round_info";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    Devnet,
    Testnet,
    Mainnet,
    Localnet,
}

impl Network {
    pub fn fullnode_url(self) -> &'static str {
        match self {
            Network::Devnet => "https://fullnode.devnet.sui.io:443",
            Network::Testnet => "https://fullnode.testnet.sui.io:443",
            Network::Mainnet => "https://fullnode.mainnet.sui.io:443",
            Network::Localnet => "http://127.0.0.1:9000",
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            "localnet" | "local" => Ok(Network::Localnet),
            other => Err(Error::Configuration(format!("unknown network '{other}'"))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
            Network::Localnet => "localnet",
        };
        write!(f, "{name}")
    }
}

/// Constants mirrored from the Move contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameConstants {
    pub round_duration_ms: u64,
    pub minimum_bet: Mist,
    pub winner_percentage: u8,
    pub airdrop_percentage: u8,
    pub last_minute_ms: u64,
    pub last_minute_multiplier: u64,
}

impl Default for GameConstants {
    fn default() -> Self {
        Self {
            round_duration_ms: 600_000,
            minimum_bet: Mist(100_000_000),
            winner_percentage: 90,
            airdrop_percentage: 5,
            last_minute_ms: 60_000,
            last_minute_multiplier: 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct JackpotConfig {
    pub package_id: ObjectId,
    pub module_name: String,
    pub admin_cap: Option<ObjectId>,
    pub game_registry: ObjectId,
    pub round_history: ObjectId,
    pub current_pool: Option<ObjectId>,
    pub network: Network,
    pub rpc_url: Option<String>,
    pub clock_id: ObjectId,
    pub poll_interval: Duration,
    pub activity_interval: Duration,
    pub request_timeout: Duration,
    pub constants: GameConstants,
}

impl JackpotConfig {
    pub fn rpc_url(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.network.fullnode_url())
    }

    /// `<package>::<module>::<function>`
    pub fn move_target(&self, function: &str) -> String {
        format!("{}::{}::{}", self.package_id, self.module_name, function)
    }
}

/// Unvalidated configuration as read from flags and the environment.
#[derive(Clone, Debug, Default)]
pub struct RawConfig {
    pub package_id: Option<String>,
    pub admin_cap: Option<String>,
    pub game_registry: Option<String>,
    pub round_history: Option<String>,
    pub current_pool: Option<String>,
    pub network: Option<String>,
    pub rpc_url: Option<String>,
    pub allow_placeholder: bool,
}

impl RawConfig {
    pub fn validate(self) -> Result<JackpotConfig> {
        let required = [
            ("PACKAGE_ID", &self.package_id),
            ("GAME_REGISTRY", &self.game_registry),
            ("ROUND_HISTORY", &self.round_history),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )));
        }

        let package_raw = self.package_id.unwrap_or_default();
        if package_raw.trim().eq_ignore_ascii_case(PLACEHOLDER_PACKAGE_ID) {
            if !self.allow_placeholder {
                return Err(Error::Configuration(
                    "PACKAGE_ID is still the placeholder value; deploy the contract and set the real id"
                        .to_string(),
                ));
            }
            tracing::warn!("using placeholder configuration values");
        }

        let network = match self.network.as_deref() {
            Some(raw) => raw.parse()?,
            None => Network::Devnet,
        };

        Ok(JackpotConfig {
            package_id: parse_id("PACKAGE_ID", &package_raw)?,
            module_name: DEFAULT_MODULE_NAME.to_string(),
            admin_cap: parse_optional_id("ADMIN_CAP", self.admin_cap.as_deref())?,
            game_registry: parse_id("GAME_REGISTRY", &self.game_registry.unwrap_or_default())?,
            round_history: parse_id("ROUND_HISTORY", &self.round_history.unwrap_or_default())?,
            current_pool: parse_optional_id("CURRENT_POOL", self.current_pool.as_deref())?,
            network,
            rpc_url: self.rpc_url.filter(|url| !url.trim().is_empty()),
            clock_id: CLOCK_OBJECT_ID,
            poll_interval: DEFAULT_POLL_INTERVAL,
            activity_interval: DEFAULT_ACTIVITY_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            constants: GameConstants::default(),
        })
    }
}

fn parse_id(name: &str, raw: &str) -> Result<ObjectId> {
    raw.parse()
        .map_err(|e| Error::Configuration(format!("{name}: {e}")))
}

fn parse_optional_id(name: &str, raw: Option<&str>) -> Result<Option<ObjectId>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_id(name, value).map(Some),
    }
}
