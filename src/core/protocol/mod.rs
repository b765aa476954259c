#[cfg(feature = "serial")]
pub mod serial;

use super::SensorAddress;

use core::fmt;

/// Number of terminator bytes (CR LF) at the end of every response frame.
pub const FRAME_TERMINATOR_LEN: usize = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// Frame shorter than the bytes being stripped from it.
    TruncatedFrame,
    /// Measurement-start frame carries no value-count digit.
    NoValueCount,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DecodeError::*;
        match self {
            TruncatedFrame => write!(f, "Truncated response frame"),
            NoValueCount => write!(f, "No value count digit in response frame"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// The three commands of the measurement transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    /// `I!` — request sensor identification.
    Identify,
    /// `M!` — start a measurement.
    StartMeasurement,
    /// `D0!` — request the first data block.
    FetchData,
}

impl Command {
    pub const fn body(self) -> &'static [u8] {
        match self {
            Command::Identify => b"I",
            Command::StartMeasurement => b"M",
            Command::FetchData => b"D0",
        }
    }
}

/// An encoded command frame: `<address><body>!`.
///
/// Addresses and command bodies are restricted to the printable SDI-12
/// alphabet by construction, so no escaping is required.
#[derive(Clone, Copy, Debug)]
pub struct CommandFrame {
    buf: [u8; 4],
    len: usize,
}

impl CommandFrame {
    pub fn new(address: SensorAddress, command: Command) -> Self {
        let body = command.body();
        let mut buf = [0u8; 4];
        buf[0] = address.as_byte();
        buf[1..=body.len()].copy_from_slice(body);
        buf[body.len() + 1] = b'!';
        Self {
            buf,
            len: body.len() + 2,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Strip the line terminator, and the leading address echo where present,
/// from one raw response frame.
///
/// The trailing two bytes are stripped unconditionally; `strip_address`
/// additionally removes the first byte (used for data frames, which echo the
/// sensor address). A frame shorter than the stripped bytes is a protocol
/// violation.
pub fn decode_frame(raw: &[u8], strip_address: bool) -> DecodeResult<&[u8]> {
    let prefix = if strip_address { 1 } else { 0 };
    if raw.len() < prefix + FRAME_TERMINATOR_LEN {
        return Err(DecodeError::TruncatedFrame);
    }
    Ok(&raw[prefix..raw.len() - FRAME_TERMINATOR_LEN])
}

/// Number of values promised by a measurement-start response.
///
/// The frame ends in a single ASCII digit; scanning runs from the end of the
/// payload to tolerate stray trailing bytes.
pub fn extract_value_count(frame: &[u8]) -> DecodeResult<usize> {
    frame
        .iter()
        .rev()
        .copied()
        .find(u8::is_ascii_digit)
        .map(|digit| usize::from(digit - b'0'))
        .ok_or(DecodeError::NoValueCount)
}

/// One signed-decimal token with its span in the scanned payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Token {
    pub value: f64,
    pub start: usize,
    pub end: usize,
}

/// Scan-cursor tokenizer for the numeric payload of a data frame.
///
/// Matches an optional `+`/`-` sign followed by digits with at most one
/// decimal point; the sign of the following value terminates the previous
/// token, so no delimiter is required between tokens. Bytes that cannot
/// start a token are skipped.
#[derive(Debug)]
pub struct Tokenizer<'a> {
    frame: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(frame: &'a [u8]) -> Self {
        Self { frame, pos: 0 }
    }

    fn match_at(&self, start: usize) -> Option<Token> {
        let bytes = &self.frame[start..];
        let mut i = 0;
        if matches!(bytes.first(), Some(&b'+') | Some(&b'-')) {
            i += 1;
        }
        let mut digits = 0;
        let mut seen_point = false;
        while let Some(&byte) = bytes.get(i) {
            match byte {
                b'0'..=b'9' => digits += 1,
                b'.' if !seen_point => seen_point = true,
                _ => break,
            }
            i += 1;
        }
        if digits == 0 {
            return None;
        }
        let text = core::str::from_utf8(&bytes[..i]).ok()?;
        let value = text.parse().ok()?;
        Some(Token {
            value,
            start,
            end: start + i,
        })
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while self.pos < self.frame.len() {
            if let Some(token) = self.match_at(self.pos) {
                self.pos = token.end;
                return Some(token);
            }
            self.pos += 1;
        }
        None
    }
}

/// Outcome of numeric extraction from a data frame.
///
/// `Partial` is the designed degraded-input path for sensors that return
/// fewer fields than promised (e.g. a GPS-based sensor with no fix). It is a
/// normal, expected outcome requiring cycle-level recovery, never an error.
#[cfg(feature = "std")]
#[derive(Clone, Debug, PartialEq)]
pub enum Extraction {
    /// Exactly the promised number of values.
    Complete(Vec<f64>),
    /// Fewer tokens than promised; carries what was extracted so far.
    Partial(Vec<f64>),
}

/// Extract up to `expected` numeric values from a decoded data frame.
#[cfg(feature = "std")]
pub fn extract_numbers(frame: &[u8], expected: usize) -> Extraction {
    let mut values = Vec::with_capacity(expected);
    let mut tokens = Tokenizer::new(frame);
    while values.len() < expected {
        match tokens.next() {
            Some(token) => values.push(token.value),
            None => return Extraction::Partial(values),
        }
    }
    Extraction::Complete(values)
}
