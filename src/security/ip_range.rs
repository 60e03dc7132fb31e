//! IPv4 range arithmetic.
//!
//! Converts a dotted-quad address plus a prefix length into the canonical
//! `[from, to]` interval used by the allow/deny lists. Everything here is pure.

use crate::error::{GuardError, GuardResult};
use ipnet::Ipv4Net;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;

/// Largest valid prefix length.
pub const MAX_PREFIX_LEN: u8 = 32;

/// Parse a dotted-quad IPv4 address into its big-endian `u32` form.
///
/// Accepts exactly four dot-separated decimal octets in `0..=255`. Signs,
/// whitespace, empty octets and octets longer than three digits are rejected.
pub fn parse_address(text: &str) -> GuardResult<u32> {
    let invalid = || GuardError::InvalidAddress(text.to_string());

    let mut octets = [0u8; 4];
    let mut parts = text.split('.');
    for octet in &mut octets {
        let part = parts.next().ok_or_else(invalid)?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let value: u16 = part.parse().map_err(|_| invalid())?;
        *octet = u8::try_from(value).map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok(u32::from_be_bytes(octets))
}

/// Render a `u32` address in dotted-quad form (no zero padding).
pub fn format_address(addr: u32) -> String {
    Ipv4Addr::from(addr).to_string()
}

/// Parse a decimal prefix length in `0..=32`.
pub fn parse_mask(text: &str) -> GuardResult<u8> {
    let invalid = || GuardError::InvalidMask(text.to_string());

    if text.is_empty() || text.len() > 2 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let len: u8 = text.parse().map_err(|_| invalid())?;
    if len > MAX_PREFIX_LEN {
        return Err(invalid());
    }
    Ok(len)
}

/// Network mask with the high `prefix_len` bits set.
#[inline]
fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - u32::from(prefix_len))
    }
}

/// A contiguous IPv4 interval derived from a base address and prefix length.
///
/// `base` keeps the address exactly as the operator supplied it (it is the
/// identity used for deletion); `from` and `to` are the masked bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    base: u32,
    prefix_len: u8,
    from: u32,
    to: u32,
}

impl IpRange {
    /// Build the range covering `addr/prefix_len`.
    pub fn compute(addr: u32, prefix_len: u8) -> GuardResult<Self> {
        if prefix_len > MAX_PREFIX_LEN {
            return Err(GuardError::InvalidMask(prefix_len.to_string()));
        }
        let m = mask(prefix_len);
        Ok(Self {
            base: addr,
            prefix_len,
            from: addr & m,
            to: addr | !m,
        })
    }

    /// Parse and compute from the raw address and mask text.
    pub fn parse(addr_text: &str, mask_text: &str) -> GuardResult<Self> {
        let addr = parse_address(addr_text)?;
        let prefix_len = parse_mask(mask_text)?;
        Self::compute(addr, prefix_len)
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn from(&self) -> u32 {
        self.from
    }

    pub fn to(&self) -> u32 {
        self.to
    }

    /// Whether `addr` lies inside `[from, to]`.
    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        self.from <= addr && addr <= self.to
    }

    /// Whether any address is covered by both ranges.
    #[inline]
    pub fn overlaps(&self, other: &IpRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    /// The network this range covers, in CIDR notation.
    pub fn network(&self) -> Ipv4Net {
        // prefix_len is bounded by construction, so the fallback is unreachable
        Ipv4Net::new(Ipv4Addr::from(self.from), self.prefix_len)
            .unwrap_or_else(|_| Ipv4Net::from(Ipv4Addr::from(self.from)))
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", Ipv4Addr::from(self.base), self.prefix_len)
    }
}

/// Display form used by list snapshots.
impl Serialize for IpRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("IpRange", 5)?;
        s.serialize_field("ip", &format_address(self.base))?;
        s.serialize_field("mask", &self.prefix_len)?;
        s.serialize_field("from", &format_address(self.from))?;
        s.serialize_field("to", &format_address(self.to))?;
        s.serialize_field("cidr", &self.network().to_string())?;
        s.end()
    }
}
