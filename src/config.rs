use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::{Arc, atomic::AtomicBool};

use crate::error::SessionError;
use crate::port_discovery::PortCatalog;
use crate::settings::SerialSelection;

pub const MIN_BAUD: u32 = 50;
pub const MAX_BAUD: u32 = 921_600;
pub const DATA_BITS: RangeInclusive<u8> = 5..=9;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl FromStr for Parity {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Parity::None),
            "even" => Ok(Parity::Even),
            "odd" => Ok(Parity::Odd),
            "mark" => Ok(Parity::Mark),
            "space" => Ok(Parity::Space),
            _ => Err(SessionError::invalid_config(format!(
                "parity '{s}' is not one of none, even, odd, mark, space"
            ))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parity::None => "None",
            Parity::Even => "Even",
            Parity::Odd => "Odd",
            Parity::Mark => "Mark",
            Parity::Space => "Space",
        };
        f.write_str(name)
    }
}

/// Stop bits form a discrete set, not a range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopBits {
    Zero,
    One,
    OnePointFive,
    Two,
}

impl FromStr for StopBits {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(StopBits::Zero),
            "1" => Ok(StopBits::One),
            "1.5" => Ok(StopBits::OnePointFive),
            "2" => Ok(StopBits::Two),
            _ => Err(SessionError::invalid_config(format!(
                "stop bits '{s}' is not one of 0, 1, 1.5, 2"
            ))),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopBits::Zero => "0",
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        f.write_str(text)
    }
}

/// Port parameters that passed validation. Only [`PortConfiguration::validate`]
/// builds one, so holding a value means the checks already ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortConfiguration {
    port_name: String,
    baud_rate: u32,
    parity: Parity,
    data_bits: u8,
    stop_bits: StopBits,
}

impl PortConfiguration {
    pub fn validate(selection: &SerialSelection, catalog: &PortCatalog) -> Result<Self, SessionError> {
        let requested = selection.last_port.trim();
        let Some(port_name) = catalog.resolve(requested) else {
            log::warn!("Couldn't find serial port {requested} on system");
            return Err(SessionError::invalid_config(format!(
                "port '{requested}' does not exist on this system"
            )));
        };

        log::debug!("Checking if baud rate {} is valid", selection.last_baud);
        if !(MIN_BAUD..=MAX_BAUD).contains(&selection.last_baud) {
            return Err(SessionError::invalid_config(format!(
                "baud rate {} is outside {MIN_BAUD}..={MAX_BAUD}",
                selection.last_baud
            )));
        }

        let parity = selection.last_parity.parse::<Parity>()?;

        log::debug!("Checking if data bits {} is valid", selection.last_data_bits);
        if !DATA_BITS.contains(&selection.last_data_bits) {
            return Err(SessionError::invalid_config(format!(
                "data bits {} is outside 5..=9",
                selection.last_data_bits
            )));
        }

        let stop_bits = selection.last_stop_bits.parse::<StopBits>()?;

        Ok(Self {
            port_name,
            baud_rate: selection.last_baud,
            parity,
            data_bits: selection.last_data_bits,
            stop_bits,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    pub fn data_bits(&self) -> u8 {
        self.data_bits
    }

    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {} {}-{}-{}",
            self.port_name, self.baud_rate, self.data_bits, self.parity, self.stop_bits
        )
    }
}

/// How each received byte is rendered
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// The byte as a single character
    Ascii,
    /// "0x0A" style
    Hex,
    /// "010" style
    Decimal,
}

/// What goes after each rendered byte
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Separator {
    #[default]
    None,
    Space,
    Comma,
    SpaceAndComma,
}

impl Separator {
    pub fn comma(self) -> bool {
        matches!(self, Separator::Comma | Separator::SpaceAndComma)
    }

    pub fn space(self) -> bool {
        matches!(self, Separator::Space | Separator::SpaceAndComma)
    }
}

/// Line ending rule as picked by the user, before its value is parsed
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEndingKind {
    /// Line ends on '\n'
    Newline,
    /// Line ends on a decimal byte value
    Decimal,
    /// Line ends on a hex byte value
    Hex,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LineEndingRule {
    Newline,
    DecimalValue(u8),
    HexValue(u8),
}

impl LineEndingRule {
    pub fn from_kind(kind: LineEndingKind, value: &str) -> Result<Self, SessionError> {
        let value = value.trim();
        match kind {
            LineEndingKind::Newline => Ok(LineEndingRule::Newline),
            LineEndingKind::Decimal => value.parse::<u8>().map(LineEndingRule::DecimalValue).map_err(|_| {
                SessionError::invalid_config(format!("line ending value '{value}' is not a byte (0-255)"))
            }),
            // Hex detection does not exist yet, so a bad value is not worth reporting.
            LineEndingKind::Hex => {
                let digits = value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                    .unwrap_or(value);
                u8::from_str_radix(digits, 16)
                    .map(LineEndingRule::HexValue)
                    .map_err(|_| SessionError::UnimplementedLineEndingRule("hex value"))
            }
        }
    }
}

/// Fixed for the lifetime of one logging session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FormattingPolicy {
    pub display_mode: Option<DisplayMode>,
    pub separator: Separator,
    pub include_line_ending_bytes: bool,
    pub line_ending: Option<LineEndingRule>,
}

pub struct UiConfig {
    pub running: Arc<AtomicBool>,
    pub max_lines: usize,
    pub start_immediately: bool,
}
