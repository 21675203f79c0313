//! Arbitrary-precision and interval values carried by CQL `varint`, `decimal` and `duration`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Varint
// ---------------------------------------------------------------------------

/// Arbitrary-precision integer kept in its wire form: big-endian two's complement,
/// with redundant sign bytes stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Varint(Vec<u8>);

impl Varint {
    pub fn from_be_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        if bytes.is_empty() {
            bytes.push(0);
        }
        let redundant = bytes
            .windows(2)
            .take_while(|w| (w[0] == 0x00 && w[1] & 0x80 == 0) || (w[0] == 0xff && w[1] & 0x80 != 0))
            .count();
        bytes.drain(..redundant);
        Self(bytes)
    }

    pub fn as_be_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0[0] & 0x80 != 0
    }

    /// Returns the value if it fits in 128 bits.
    pub fn to_i128(&self) -> Option<i128> {
        if self.0.len() > 16 {
            return None;
        }
        let fill = if self.is_negative() { 0xff } else { 0x00 };
        let mut buf = [fill; 16];
        buf[16 - self.0.len()..].copy_from_slice(&self.0);
        Some(i128::from_be_bytes(buf))
    }

    pub fn to_i64(&self) -> Option<i64> {
        self.to_i128().and_then(|v| i64::try_from(v).ok())
    }

    fn magnitude(&self) -> Vec<u8> {
        let mut mag = self.0.clone();
        if self.is_negative() {
            negate(&mut mag);
        }
        mag
    }
}

fn negate(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = !*b;
    }
    for b in bytes.iter_mut().rev() {
        let (v, carry) = b.overflowing_add(1);
        *b = v;
        if !carry {
            break;
        }
    }
}

impl From<i64> for Varint {
    fn from(v: i64) -> Self {
        Varint::from_be_bytes(v.to_be_bytes().to_vec())
    }
}

impl From<i128> for Varint {
    fn from(v: i128) -> Self {
        Varint::from_be_bytes(v.to_be_bytes().to_vec())
    }
}

impl fmt::Display for Varint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(v) = self.to_i128() {
            return write!(f, "{v}");
        }
        let mut mag = self.magnitude();
        let mut digits = Vec::new();
        while mag.iter().any(|&b| b != 0) {
            let mut rem: u32 = 0;
            for b in mag.iter_mut() {
                let cur = (rem << 8) | u32::from(*b);
                *b = (cur / 10) as u8;
                rem = cur % 10;
            }
            digits.push(b'0' + rem as u8);
        }
        if self.is_negative() {
            digits.push(b'-');
        }
        digits.reverse();
        f.write_str(&String::from_utf8_lossy(&digits))
    }
}

impl FromStr for Varint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::conversion(format!("`{s}` is not an integer")));
        }
        // Leading zero byte keeps the magnitude positive before negation.
        let mut mag: Vec<u8> = vec![0];
        for d in digits.bytes() {
            let mut carry = u32::from(d - b'0');
            for b in mag.iter_mut().rev() {
                let v = u32::from(*b) * 10 + carry;
                *b = (v & 0xff) as u8;
                carry = v >> 8;
            }
            while carry > 0 {
                mag.insert(0, (carry & 0xff) as u8);
                carry >>= 8;
            }
            if mag[0] & 0x80 != 0 {
                mag.insert(0, 0);
            }
        }
        if negative {
            negate(&mut mag);
        }
        Ok(Varint::from_be_bytes(mag))
    }
}

// ---------------------------------------------------------------------------
// Decimal
// ---------------------------------------------------------------------------

/// Arbitrary-precision decimal: `unscaled * 10^-scale`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: Varint,
    scale: i32,
}

impl Decimal {
    pub fn new(unscaled: Varint, scale: i32) -> Self {
        Self { unscaled, scale }
    }

    pub fn unscaled(&self) -> &Varint {
        &self.unscaled
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Decimal::new(Varint::from(v), 0)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.to_string();
        if self.scale == 0 {
            return f.write_str(&digits);
        }
        if self.scale < 0 {
            // Exponent form keeps huge negative scales from expanding into zeros.
            return write!(f, "{digits}E+{}", -i64::from(self.scale));
        }
        let (sign, digits) = match digits.strip_prefix('-') {
            Some(rest) => ("-", rest.to_owned()),
            None => ("", digits),
        };
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::conversion(format!("`{s}` is not a decimal"));
        let (mantissa, exponent) = match s.split_once(['E', 'e']) {
            Some((mantissa, exponent)) => {
                (mantissa, exponent.parse::<i64>().map_err(|_| invalid())?)
            }
            None => (s, 0),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let unscaled: Varint = format!("{int_part}{frac_part}").parse()?;
        let scale = i32::try_from(frac_part.len() as i64 - exponent).map_err(|_| invalid())?;
        Ok(Decimal::new(unscaled, scale))
    }
}

// ---------------------------------------------------------------------------
// CqlDuration
// ---------------------------------------------------------------------------

/// CQL `duration`: months, days and nanoseconds are independent components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CqlDuration {
    pub months: i32,
    pub days: i32,
    pub nanoseconds: i64,
}

impl fmt::Display for CqlDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mo{}d{}ns", self.months, self.days, self.nanoseconds)
    }
}
