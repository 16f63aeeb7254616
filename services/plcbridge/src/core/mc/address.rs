//! Device addressing for MC protocol registers
//!
//! Addresses are written the way the controller's engineering tools show
//! them: a device prefix plus a head number (`D0`, `M501`, `X1A`, `SM400`).
//! X/Y/B/W are numbered in hexadecimal, everything else in decimal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Largest head device number a 3E frame can carry (3 bytes)
pub const MAX_DEVICE_NUMBER: u32 = 0x00FF_FFFF;

/// Device families reachable through batch access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Special relay
    SM,
    /// Special register
    SD,
    /// Input
    X,
    /// Output
    Y,
    /// Internal relay
    M,
    /// Latch relay
    L,
    /// Annunciator
    F,
    /// Edge relay
    V,
    /// Link relay
    B,
    /// Data register
    D,
    /// Link register
    W,
    /// File register
    R,
    /// File register (serial numbering)
    ZR,
}

impl DeviceType {
    /// Prefixes in match order; two-letter prefixes must come first
    const PREFIXES: [(&'static str, DeviceType); 13] = [
        ("SM", DeviceType::SM),
        ("SD", DeviceType::SD),
        ("ZR", DeviceType::ZR),
        ("X", DeviceType::X),
        ("Y", DeviceType::Y),
        ("M", DeviceType::M),
        ("L", DeviceType::L),
        ("F", DeviceType::F),
        ("V", DeviceType::V),
        ("B", DeviceType::B),
        ("D", DeviceType::D),
        ("W", DeviceType::W),
        ("R", DeviceType::R),
    ];

    /// Binary device code used in Q/L-series 3E frames
    pub fn code(self) -> u8 {
        match self {
            DeviceType::SM => 0x91,
            DeviceType::SD => 0xA9,
            DeviceType::X => 0x9C,
            DeviceType::Y => 0x9D,
            DeviceType::M => 0x90,
            DeviceType::L => 0x92,
            DeviceType::F => 0x93,
            DeviceType::V => 0x94,
            DeviceType::B => 0xA0,
            DeviceType::D => 0xA8,
            DeviceType::W => 0xB4,
            DeviceType::R => 0xAF,
            DeviceType::ZR => 0xB0,
        }
    }

    /// Whether this is a bit device (relay/flag) rather than a word register
    pub fn is_bit(self) -> bool {
        matches!(
            self,
            DeviceType::SM
                | DeviceType::X
                | DeviceType::Y
                | DeviceType::M
                | DeviceType::L
                | DeviceType::F
                | DeviceType::V
                | DeviceType::B
        )
    }

    /// Whether device numbers are written in hexadecimal
    pub fn is_hex(self) -> bool {
        matches!(
            self,
            DeviceType::X | DeviceType::Y | DeviceType::B | DeviceType::W
        )
    }

    pub fn prefix(self) -> &'static str {
        Self::PREFIXES
            .iter()
            .find(|(_, device)| *device == self)
            .map(|(prefix, _)| *prefix)
            .unwrap_or("?")
    }
}

/// A head device: device family plus number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress {
    pub device: DeviceType,
    pub number: u32,
}

impl DeviceAddress {
    pub fn new(device: DeviceType, number: u32) -> Result<Self> {
        if number > MAX_DEVICE_NUMBER {
            return Err(BridgeError::validation(format!(
                "Device number {} exceeds {}",
                number, MAX_DEVICE_NUMBER
            )));
        }
        Ok(Self { device, number })
    }

    pub fn is_bit(&self) -> bool {
        self.device.is_bit()
    }
}

impl FromStr for DeviceAddress {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim().to_ascii_uppercase();
        let (prefix, device) = DeviceType::PREFIXES
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix))
            .ok_or_else(|| BridgeError::validation(format!("Unknown device prefix in '{}'", s)))?;

        let digits = &text[prefix.len()..];
        if digits.is_empty() {
            return Err(BridgeError::validation(format!(
                "Missing device number in '{}'",
                s
            )));
        }

        let radix = if device.is_hex() { 16 } else { 10 };
        let number = u32::from_str_radix(digits, radix)
            .map_err(|e| BridgeError::validation(format!("Invalid device number in '{}': {}", s, e)))?;

        Self::new(*device, number)
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceAddress> for String {
    fn from(addr: DeviceAddress) -> Self {
        addr.to_string()
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device.is_hex() {
            write!(f, "{}{:X}", self.device.prefix(), self.number)
        } else {
            write!(f, "{}{}", self.device.prefix(), self.number)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_devices() {
        let addr: DeviceAddress = "D71".parse().unwrap();
        assert_eq!(addr.device, DeviceType::D);
        assert_eq!(addr.number, 71);
        assert!(!addr.is_bit());

        let addr: DeviceAddress = "m501".parse().unwrap();
        assert_eq!(addr.device, DeviceType::M);
        assert_eq!(addr.number, 501);
        assert!(addr.is_bit());
    }

    #[test]
    fn test_parse_hex_and_two_letter_devices() {
        let addr: DeviceAddress = "X1A".parse().unwrap();
        assert_eq!(addr.device, DeviceType::X);
        assert_eq!(addr.number, 0x1A);
        assert_eq!(addr.to_string(), "X1A");

        let addr: DeviceAddress = "SD100".parse().unwrap();
        assert_eq!(addr.device, DeviceType::SD);
        assert_eq!(addr.number, 100);

        let addr: DeviceAddress = "SM400".parse().unwrap();
        assert_eq!(addr.device, DeviceType::SM);
        assert!(addr.is_bit());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("".parse::<DeviceAddress>().is_err());
        assert!("Q12".parse::<DeviceAddress>().is_err());
        assert!("D".parse::<DeviceAddress>().is_err());
        assert!("D1A".parse::<DeviceAddress>().is_err());
        assert!("D16777216".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_display_round_trips_radix() {
        let w: DeviceAddress = "W1F".parse().unwrap();
        assert_eq!(w.number, 0x1F);
        assert_eq!(w.to_string(), "W1F");
        let m: DeviceAddress = "M545".parse().unwrap();
        assert_eq!(m.to_string(), "M545");
    }

    #[test]
    fn test_serde_as_string() {
        let addr: DeviceAddress = serde_json::from_str("\"D30\"").unwrap();
        assert_eq!(addr.number, 30);
        assert_eq!(serde_json::to_string(&addr).unwrap(), "\"D30\"");
        assert!(serde_json::from_str::<DeviceAddress>("\"nope\"").is_err());
    }
}
