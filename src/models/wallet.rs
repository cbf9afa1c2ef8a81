use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::short_address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Evm,
    Solana,
    Bitcoin,
}

impl Ecosystem {
    /// Aggregation and iteration order.
    pub const ALL: [Ecosystem; 3] = [Ecosystem::Evm, Ecosystem::Solana, Ecosystem::Bitcoin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Evm => "evm",
            Ecosystem::Solana => "solana",
            Ecosystem::Bitcoin => "bitcoin",
        }
    }

    /// Upper-case label used in user notices, e.g. "EVM wallet connected".
    pub fn label(&self) -> &'static str {
        match self {
            Ecosystem::Evm => "EVM",
            Ecosystem::Solana => "SOLANA",
            Ecosystem::Bitcoin => "BITCOIN",
        }
    }

    /// Capitalized name used in the not-installed notice.
    pub fn display_name(&self) -> &'static str {
        match self {
            Ecosystem::Evm => "Evm",
            Ecosystem::Solana => "Solana",
            Ecosystem::Bitcoin => "Bitcoin",
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Ecosystem::Evm => "ETH",
            Ecosystem::Solana => "SOL",
            Ecosystem::Bitcoin => "BTC",
        }
    }

    /// Power of ten between one native coin and its base unit.
    pub fn base_unit_exponent(&self) -> u32 {
        match self {
            Ecosystem::Evm => 18,
            Ecosystem::Solana => 9,
            Ecosystem::Bitcoin => 8,
        }
    }

    pub fn display_decimals(&self) -> u32 {
        match self {
            Ecosystem::Evm | Ecosystem::Solana => 4,
            Ecosystem::Bitcoin => 8,
        }
    }

    /// EVM addresses are hex and compare case-insensitively.
    pub fn addresses_equal(&self, a: &str, b: &str) -> bool {
        match self {
            Ecosystem::Evm => a.eq_ignore_ascii_case(b),
            Ecosystem::Solana | Ecosystem::Bitcoin => a == b,
        }
    }

    pub fn format_base_units(&self, base_units: u128) -> Option<String> {
        format_base_units(base_units, self.base_unit_exponent(), self.display_decimals())
    }

    pub fn zero_amount(&self) -> String {
        zero_amount(self.display_decimals())
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evm" => Ok(Ecosystem::Evm),
            "solana" => Ok(Ecosystem::Solana),
            "bitcoin" => Ok(Ecosystem::Bitcoin),
            other => Err(format!("Unsupported wallet type: {}", other)),
        }
    }
}

/// Converts integer base units to a decimal string rounded half away from
/// zero to `dp` places. `None` when the value does not fit a `Decimal`.
pub fn format_base_units(base_units: u128, exponent: u32, dp: u32) -> Option<String> {
    let mantissa = i128::try_from(base_units).ok()?;
    let value = Decimal::try_from_i128_with_scale(mantissa, exponent).ok()?;
    Some(format_decimal(value, dp))
}

/// Renders `value` with exactly `dp` places, rounding half away from zero.
pub fn format_decimal(value: Decimal, dp: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded.to_string()
}

pub fn zero_amount(dp: u32) -> String {
    let mut zero = Decimal::ZERO;
    zero.rescale(dp);
    zero.to_string()
}

/// A connected account. Replaced on change, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletHandle {
    pub address: String,
    #[serde(rename = "type")]
    pub ecosystem: Ecosystem,
}

impl WalletHandle {
    pub fn new(ecosystem: Ecosystem, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ecosystem,
        }
    }

    /// Display tag attached to balance rows, e.g. `evm:0xABC1...1234`.
    pub fn display_tag(&self) -> String {
        format!("{}:{}", self.ecosystem, short_address(&self.address))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedWalletSet {
    pub evm: Option<WalletHandle>,
    pub solana: Option<WalletHandle>,
    pub bitcoin: Option<WalletHandle>,
}

impl ConnectedWalletSet {
    pub fn get(&self, ecosystem: Ecosystem) -> Option<&WalletHandle> {
        match ecosystem {
            Ecosystem::Evm => self.evm.as_ref(),
            Ecosystem::Solana => self.solana.as_ref(),
            Ecosystem::Bitcoin => self.bitcoin.as_ref(),
        }
    }

    fn slot_mut(&mut self, ecosystem: Ecosystem) -> &mut Option<WalletHandle> {
        match ecosystem {
            Ecosystem::Evm => &mut self.evm,
            Ecosystem::Solana => &mut self.solana,
            Ecosystem::Bitcoin => &mut self.bitcoin,
        }
    }

    /// Stores the handle in the slot of its own ecosystem.
    pub fn set(&mut self, handle: WalletHandle) {
        let ecosystem = handle.ecosystem;
        *self.slot_mut(ecosystem) = Some(handle);
    }

    pub fn clear(&mut self, ecosystem: Ecosystem) {
        *self.slot_mut(ecosystem) = None;
    }

    /// Non-empty slots in EVM, Solana, Bitcoin order.
    pub fn connected(&self) -> Vec<&WalletHandle> {
        Ecosystem::ALL
            .iter()
            .filter_map(|ecosystem| self.get(*ecosystem))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.evm.is_none() && self.solana.is_none() && self.bitcoin.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    Connect { ecosystem: Ecosystem, address: String },
    Disconnect { ecosystem: Ecosystem },
    AccountChanged { ecosystem: Ecosystem, address: String },
}

impl WalletEvent {
    pub fn ecosystem(&self) -> Ecosystem {
        match self {
            WalletEvent::Connect { ecosystem, .. }
            | WalletEvent::Disconnect { ecosystem }
            | WalletEvent::AccountChanged { ecosystem, .. } => *ecosystem,
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            WalletEvent::Connect { address, .. } | WalletEvent::AccountChanged { address, .. } => {
                Some(address)
            }
            WalletEvent::Disconnect { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub token: String,
    pub amount: String,
    pub wallet: String,
}

impl Balance {
    pub fn new(token: impl Into<String>, amount: impl Into<String>, wallet: &WalletHandle) -> Self {
        Self {
            token: token.into(),
            amount: amount.into(),
            wallet: wallet.display_tag(),
        }
    }

    /// Native-token row with a zero amount, used when a fetch fails.
    pub fn zero_native(wallet: &WalletHandle) -> Self {
        Self::new(
            wallet.ecosystem.native_symbol(),
            wallet.ecosystem.zero_amount(),
            wallet,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: String,
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    #[serde(rename = "logoURI", default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(
        rename = "priceUSD",
        default,
        deserialize_with = "deserialize_price",
        skip_serializing_if = "Option::is_none"
    )]
    pub price_usd: Option<f64>,
}

pub type TokenMap = BTreeMap<String, TokenMetadata>;

// Internal helper that accepts `priceUSD` as a number or a numeric string.
fn deserialize_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecosystem_parses_and_serializes_lowercase() {
        // Memastikan nama ekosistem diparse dan diserialisasi huruf kecil
        assert_eq!("EVM".parse::<Ecosystem>(), Ok(Ecosystem::Evm));
        assert_eq!("bitcoin".parse::<Ecosystem>(), Ok(Ecosystem::Bitcoin));
        assert!("cosmos".parse::<Ecosystem>().is_err());
        assert_eq!(serde_json::to_string(&Ecosystem::Solana).unwrap(), "\"solana\"");
    }

    #[test]
    fn format_base_units_rounds_half_away_from_zero() {
        // Memastikan pembulatan setengah menjauhi nol
        assert_eq!(
            Ecosystem::Solana.format_base_units(2_500_000_000).as_deref(),
            Some("2.5000")
        );
        assert_eq!(
            Ecosystem::Evm.format_base_units(1_234_550_000_000_000_000).as_deref(),
            Some("1.2346")
        );
        assert_eq!(
            Ecosystem::Bitcoin.format_base_units(12_345).as_deref(),
            Some("0.00012345")
        );
        assert_eq!(Ecosystem::Evm.format_base_units(0).as_deref(), Some("0.0000"));
    }

    #[test]
    fn zero_amount_uses_display_decimals() {
        // Memastikan nilai nol mengikuti desimal tampilan tiap chain
        assert_eq!(Ecosystem::Evm.zero_amount(), "0.0000");
        assert_eq!(Ecosystem::Bitcoin.zero_amount(), "0.00000000");
    }

    #[test]
    fn set_places_handle_in_its_own_slot() {
        // Memastikan slot selalu sesuai dengan tipe handle
        let mut set = ConnectedWalletSet::default();
        set.set(WalletHandle::new(Ecosystem::Bitcoin, "bc1qxyz"));
        set.set(WalletHandle::new(Ecosystem::Evm, "0xabc"));
        assert_eq!(set.bitcoin.as_ref().map(|h| h.ecosystem), Some(Ecosystem::Bitcoin));
        assert!(set.solana.is_none());
        let order: Vec<Ecosystem> = set.connected().iter().map(|h| h.ecosystem).collect();
        assert_eq!(order, vec![Ecosystem::Evm, Ecosystem::Bitcoin]);
        set.set(WalletHandle::new(Ecosystem::Evm, "0xdef"));
        assert_eq!(set.get(Ecosystem::Evm).map(|h| h.address.as_str()), Some("0xdef"));
        set.clear(Ecosystem::Evm);
        assert_eq!(set.connected().len(), 1);
    }

    #[test]
    fn wallet_handle_serializes_type_field() {
        // Memastikan handle diserialisasi dengan field type
        let handle = WalletHandle::new(Ecosystem::Evm, "0xABC1000000000000000000000000000000001234");
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["type"], "evm");
        assert_eq!(handle.display_tag(), "evm:0xABC1...1234");
    }

    #[test]
    fn wallet_event_is_tagged() {
        // Memastikan event wallet memakai tag type
        let event = WalletEvent::AccountChanged {
            ecosystem: Ecosystem::Solana,
            address: "B".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "account_changed");
        assert_eq!(json["ecosystem"], "solana");
        assert_eq!(event.address(), Some("B"));
    }

    #[test]
    fn token_metadata_accepts_string_price() {
        // Memastikan priceUSD bisa berupa string atau angka
        let token: TokenMetadata = serde_json::from_value(serde_json::json!({
            "address": "0x0",
            "chainId": 1,
            "symbol": "USDC",
            "name": "USD Coin",
            "decimals": 6,
            "priceUSD": "0.9998"
        }))
        .unwrap();
        assert_eq!(token.price_usd, Some(0.9998));
        assert!(token.logo_uri.is_none());

        let token: TokenMetadata = serde_json::from_value(serde_json::json!({
            "address": "0x0",
            "chainId": 1,
            "symbol": "ETH",
            "name": "Ether",
            "decimals": 18,
            "priceUSD": 3100.5
        }))
        .unwrap();
        assert_eq!(token.price_usd, Some(3100.5));
    }
}
