//! Byte rendering and line framing.
//!
//! [`format_byte`] turns one raw byte into its text fragment, [`LineEndingDetector`]
//! decides on the raw byte whether a line is complete, and [`LineAssembler`] glues
//! the two together while carrying the in-flight line across read bursts.

use crate::config::{DisplayMode, FormattingPolicy, LineEndingRule, Separator};
use crate::error::SessionError;

/// A line that reaches this many bytes without a terminator is written out as is.
pub const MAX_LINE_BYTES: usize = 4096;

/// Render a single byte. Returns `FormattingUnconfigured` instead of any text
/// when no display mode has been chosen.
pub fn format_byte(byte: u8, mode: Option<DisplayMode>, separator: Separator) -> Result<String, SessionError> {
    let mut fragment = match mode {
        Some(DisplayMode::Ascii) => char::from(byte).to_string(),
        Some(DisplayMode::Hex) => format!("0x{byte:02X}"),
        Some(DisplayMode::Decimal) => format!("{byte:03}"),
        None => return Err(SessionError::FormattingUnconfigured),
    };

    if separator.comma() {
        fragment.push(',');
    }
    if separator.space() {
        fragment.push(' ');
    }

    Ok(fragment)
}

/// Stateless end-of-line test on raw byte values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LineEndingDetector {
    terminator: u8,
}

impl LineEndingDetector {
    /// Fails fast on an unset rule and on the hex rule, which has no detection yet.
    pub fn new(rule: Option<LineEndingRule>) -> Result<Self, SessionError> {
        let terminator = match rule {
            None => {
                return Err(SessionError::invalid_config(
                    "a line ending detection rule must be selected",
                ));
            }
            Some(LineEndingRule::Newline) => b'\n',
            Some(LineEndingRule::DecimalValue(value)) => value,
            Some(LineEndingRule::HexValue(_)) => {
                return Err(SessionError::UnimplementedLineEndingRule("hex value"));
            }
        };
        Ok(Self { terminator })
    }

    pub fn is_terminator(&self, byte: u8) -> bool {
        byte == self.terminator
    }
}

/// Formatted fragments of the line currently being received.
#[derive(Debug, Default)]
pub struct LineBuffer {
    text: String,
    bytes: usize,
}

impl LineBuffer {
    /// `fragment` is the rendering of one raw byte.
    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.bytes += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Raw bytes rendered into the buffer so far.
    pub fn byte_count(&self) -> usize {
        self.bytes
    }

    /// Hand out the finished line, trimmed of trailing whitespace and commas,
    /// and start over. Lines that trim to nothing are swallowed.
    pub fn take_line(&mut self) -> Option<String> {
        let text = std::mem::take(&mut self.text);
        self.bytes = 0;
        let line = text.trim_end().trim_end_matches(',');
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }
}

pub struct LineAssembler {
    policy: FormattingPolicy,
    detector: LineEndingDetector,
    buffer: LineBuffer,
}

impl LineAssembler {
    pub fn new(policy: FormattingPolicy) -> Result<Self, SessionError> {
        let detector = LineEndingDetector::new(policy.line_ending)?;
        Ok(Self {
            policy,
            detector,
            buffer: LineBuffer::default(),
        })
    }

    /// Feed one raw byte. Yields a line when this byte terminated a non-empty one.
    /// `Err(FormattingUnconfigured)` means the byte was dropped.
    pub fn feed(&mut self, byte: u8) -> Result<Option<String>, SessionError> {
        if self.policy.display_mode.is_none() {
            return Err(SessionError::FormattingUnconfigured);
        }

        let ends_line = self.detector.is_terminator(byte);
        let skip = !self.policy.include_line_ending_bytes
            && (ends_line || (self.crlf_is_framing() && matches!(byte, b'\r' | b'\n')));

        if !skip {
            let fragment = format_byte(byte, self.policy.display_mode, self.policy.separator)?;
            self.buffer.push(&fragment);
        }

        if ends_line || self.buffer.byte_count() >= MAX_LINE_BYTES {
            Ok(self.buffer.take_line())
        } else {
            Ok(None)
        }
    }

    /// CR and LF are text framing in ASCII mode or under the newline rule.
    /// Otherwise they are payload like any other byte.
    fn crlf_is_framing(&self) -> bool {
        self.policy.display_mode == Some(DisplayMode::Ascii)
            || self.policy.line_ending == Some(LineEndingRule::Newline)
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Whatever is still buffered, used when the port goes idle mid-line or the
    /// session goes away.
    pub fn flush_partial(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        self.buffer.take_line()
    }
}
