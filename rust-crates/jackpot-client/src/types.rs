use crate::{
    Error,
    Result,
};
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use std::{
    fmt,
    str::FromStr,
};

pub const MIST_PER_SUI: u64 = 1_000_000_000;
const ADDRESS_LENGTH: usize = 32;

/// A 32-byte Sui address. Object ids share the same representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

pub type ObjectId = Address;

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Shorthand ids such as `0x6` expand to `0x000..06`.
    pub const fn from_u8(value: u8) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[ADDRESS_LENGTH - 1] = value;
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// `0x1234...abcd`, for places where the full id does not fit.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > ADDRESS_LENGTH * 2 {
            return Err(Error::UserInput(format!("invalid address '{raw}'")));
        }
        let padded = format!("{digits:0>64}");
        let mut bytes = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|e| Error::UserInput(format!("invalid address '{raw}': {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An amount in MIST, the ledger's smallest unit.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Mist(pub u64);

impl Mist {
    /// Rounds to the nearest MIST, so decimal input such as `4.10` keeps
    /// its exact value despite binary float error. Negative or non-finite
    /// input is zero.
    pub fn from_sui(sui: f64) -> Self {
        if !sui.is_finite() || sui <= 0.0 {
            return Mist(0);
        }
        Mist((sui * MIST_PER_SUI as f64).round() as u64)
    }

    pub fn as_sui(self) -> f64 {
        self.0 as f64 / MIST_PER_SUI as f64
    }

    pub fn saturating_mul(self, rhs: u64) -> Self {
        Mist(self.0.saturating_mul(rhs))
    }
}

impl fmt::Display for Mist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / MIST_PER_SUI;
        let fractional = self.0 % MIST_PER_SUI;
        if fractional == 0 {
            write!(f, "{whole}")
        } else {
            let digits = format!("{fractional:09}");
            write!(f, "{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Active,
    Drawing,
    Completed,
}

impl TryFrom<u64> for RoundState {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RoundState::Active),
            1 => Ok(RoundState::Drawing),
            2 => Ok(RoundState::Completed),
            other => Err(other),
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundState::Active => "Active",
            RoundState::Drawing => "Drawing",
            RoundState::Completed => "Completed",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub owner: Address,
    pub amount: Mist,
    pub ticket_count: u64,
    pub multiplier: u64,
    pub purchase_time: u64,
}

/// The on-chain pointer to the active round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registry {
    pub id: ObjectId,
    pub current_round: u64,
    pub current_pool_id: Option<ObjectId>,
}

/// One lottery round as last read from the ledger. Times are epoch millis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pool {
    pub id: ObjectId,
    pub round_number: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub total_pool: Mist,
    pub tickets: Vec<Ticket>,
    pub total_ticket_count: u64,
    pub winner: Option<Address>,
    pub state: RoundState,
    pub airdrop_recipients: Vec<Address>,
}

/// Result of the contract's `get_round_info` view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundInfo {
    pub round_number: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub total_pool: Mist,
    pub total_ticket_count: u64,
    pub state: RoundState,
}

/// Display estimate of the connected account's stake in the current pool.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserStats {
    pub tickets: u64,
    pub win_probability: f64,
    pub total_spent: Mist,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// Nothing to compare yet.
    Pending,
    Synced,
    OutOfSync,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameState {
    pub current_pool: Option<Pool>,
    pub registry: Option<Registry>,
    pub user_stats: UserStats,
    pub is_loading: bool,
    pub error: Option<String>,
    // bumped on every replacement so dependents can tell a fresh read
    // from a re-render of the same one
    pub(crate) registry_revision: u64,
    pub(crate) pool_revision: u64,
}

impl GameState {
    pub fn sync_status(&self) -> SyncStatus {
        let pointer = self
            .registry
            .as_ref()
            .and_then(|registry| registry.current_pool_id);
        match (pointer, self.current_pool.as_ref()) {
            (Some(expected), Some(pool)) if pool.id == expected => SyncStatus::Synced,
            (Some(_), Some(_)) => SyncStatus::OutOfSync,
            _ => SyncStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn address__short_form_is_left_padded() {
        // given
        let raw = "0x6";

        // when
        let address: Address = raw.parse().unwrap();

        // then
        assert_eq!(address, Address::from_u8(6));
        assert_eq!(
            address.to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000006"
        );
    }

    #[test]
    fn address__rejects_non_hex_and_overlong_input() {
        assert!("0xZZ".parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
        let too_long = format!("0x{}", "1".repeat(65));
        assert!(too_long.parse::<Address>().is_err());
    }

    #[test]
    fn mist__display_trims_trailing_zeros() {
        assert_eq!(Mist(120_500_000_000).to_string(), "120.5");
        assert_eq!(Mist(100_000_000).to_string(), "0.1");
        assert_eq!(Mist(3 * MIST_PER_SUI).to_string(), "3");
    }

    #[test]
    fn mist__from_sui_rounds_to_nearest_and_clamps_negative() {
        assert_eq!(Mist::from_sui(0.25), Mist(250_000_000));
        assert_eq!(Mist::from_sui(2.01), Mist(2_010_000_000));
        assert_eq!(Mist::from_sui(4.10), Mist(4_100_000_000));
        assert_eq!(Mist::from_sui(-1.0), Mist(0));
        assert_eq!(Mist::from_sui(f64::NAN), Mist(0));
    }

    #[test]
    fn mist__from_sui_keeps_every_two_decimal_amount_exact() {
        for cents in 1..100_000u64 {
            // given
            let sui = cents as f64 / 100.0;

            // when
            let mist = Mist::from_sui(sui);

            // then
            assert_eq!(mist, Mist(cents * 10_000_000), "{sui} SUI");
        }
    }

    #[test]
    fn sync_status__flags_pool_that_differs_from_registry_pointer() {
        // given
        let pointer = Address::from_u8(0xaa);
        let mut state = GameState {
            registry: Some(Registry {
                id: Address::from_u8(1),
                current_round: 5,
                current_pool_id: Some(pointer),
            }),
            ..GameState::default()
        };
        assert_eq!(state.sync_status(), SyncStatus::Pending);

        // when
        state.current_pool = Some(crate::test_helpers::pool_fixture(
            Address::from_u8(0xbb),
            5,
            0,
        ));

        // then
        assert_eq!(state.sync_status(), SyncStatus::OutOfSync);
    }
}
