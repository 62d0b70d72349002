//! Prefix masks and CIDR blocks.
use core::{fmt, str::FromStr};
use thiserror::Error;

use super::ip::{Address, Family};
use super::error::{ParseAddressError, ParseAddressErrorKind};

/// Why a mask could not be created or applied.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskError {
    /// The octets are not a run of one bits followed by zero bits.
    #[error("mask is not a contiguous prefix")]
    Invalid,

    /// The prefix is longer than the addresses of its family.
    #[error("prefix length exceeds the address width")]
    LengthOutOfRange,

    /// The mask was applied to an address of another family.
    #[error("address family does not match the mask")]
    FamilyMismatch,
}

/// The prefix length of a mask given as octets.
///
/// Returns `-1` when the octets are not of the form `1*0*`.
pub fn prefix_len(bytes: &[u8]) -> i32 {
    let mut len = 0;
    let mut rest = bytes.iter();

    for &byte in rest.by_ref() {
        if byte == 0xff {
            len += 8;
            continue;
        }
        let ones = byte.leading_ones();
        if byte << ones != 0 {
            return -1;
        }
        len += ones as i32;
        break;
    }

    if rest.any(|&byte| byte != 0) {
        return -1;
    }
    len
}

/// A CIDR prefix mask of one address family.
///
/// The octets are always a valid prefix.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Mask {
    family: Family,
    bytes: [u8; 16],
}

impl Mask {
    /// A mask with `len` leading one bits.
    pub fn new(family: Family, len: usize) -> Result<Self, MaskError> {
        if len > family.bits() {
            return Err(MaskError::LengthOutOfRange);
        }

        let mut bytes = [0u8; 16];
        for (idx, byte) in bytes[..family.byte_len()].iter_mut().enumerate() {
            let ones = len.saturating_sub(idx * 8).min(8);
            *byte = !(0xffu16 >> ones) as u8;
        }
        Ok(Mask { family, bytes })
    }

    /// The mask of all bits of a family, selecting exactly one address.
    pub fn host(family: Family) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..family.byte_len()].iter_mut().for_each(|b| *b = 0xff);
        Mask { family, bytes }
    }

    /// Validate the octets of a mask.
    pub fn from_bytes(family: Family, data: &[u8]) -> Result<Self, MaskError> {
        if data.len() != family.byte_len() || prefix_len(data) < 0 {
            return Err(MaskError::Invalid);
        }
        let mut bytes = [0u8; 16];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Mask { family, bytes })
    }

    /// Use the octets of an address in mask notation, such as `255.255.255.0`.
    pub fn from_address(addr: &Address) -> Result<Self, MaskError> {
        Self::from_bytes(addr.family(), addr.as_bytes())
    }

    /// Create a mask from a prefix length or from mask notation.
    pub fn parse(family: Family, text: &str) -> Result<Self, MaskError> {
        if let Ok(len) = text.parse::<usize>() {
            return Self::new(family, len);
        }
        let addr = text.parse::<Address>().map_err(|_| MaskError::Invalid)?;
        if addr.family() != family {
            return Err(MaskError::FamilyMismatch);
        }
        Self::from_address(&addr)
    }

    /// The family of addresses this mask applies to.
    pub fn family(&self) -> Family {
        self.family
    }

    /// The octets of this mask.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.family.byte_len()]
    }

    /// The number of leading one bits.
    pub fn length(&self) -> i32 {
        prefix_len(self.as_bytes())
    }

    /// The number of leading one bits.
    pub fn prefix_len(&self) -> usize {
        self.as_bytes().iter().map(|b| b.count_ones() as usize).sum()
    }

    /// The mask in address notation.
    pub fn to_address(&self) -> Address {
        self.combine(&Address::unspecified(self.family), |_, mask| mask)
    }

    /// The network part of an address.
    pub fn mask(&self, addr: &Address) -> Result<Address, MaskError> {
        self.check_family(addr)?;
        Ok(self.combine(addr, |addr, mask| addr & mask))
    }

    /// The highest address of the network of `addr`.
    pub fn broadcast(&self, addr: &Address) -> Result<Address, MaskError> {
        self.check_family(addr)?;
        Ok(self.combine(addr, |addr, mask| addr | !mask))
    }

    /// Query whether all host bits of the address are set.
    ///
    /// The network part is not looked at. Always false for another family.
    pub fn is_host_broadcast(&self, addr: &Address) -> bool {
        self.broadcast(addr).ok() == Some(*addr)
    }

    /// Query whether two addresses are in the same network.
    ///
    /// Addresses of another family are never in the same network.
    pub fn compare(&self, a: &Address, b: &Address) -> bool {
        match (self.mask(a), self.mask(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    fn check_family(&self, addr: &Address) -> Result<(), MaskError> {
        if addr.family() == self.family {
            Ok(())
        } else {
            Err(MaskError::FamilyMismatch)
        }
    }

    fn combine(&self, addr: &Address, op: impl Fn(u8, u8) -> u8) -> Address {
        let mut bytes = [0u8; 16];
        let len = self.family.byte_len();
        for (out, (a, m)) in bytes.iter_mut().zip(addr.as_bytes().iter().zip(self.as_bytes())) {
            *out = op(*a, *m);
        }
        match Address::from_bytes(self.family, &bytes[..len]) {
            Ok(addr) => addr,
            Err(_) => unreachable!("mask and address have the family width"),
        }
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.to_address(), f)
    }
}

/// An address together with the mask of its network.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct Cidr {
    address: Address,
    mask: Mask,
}

impl Cidr {
    /// Combine an address with a prefix length of its family.
    pub fn new(address: Address, prefix_len: usize) -> Result<Self, MaskError> {
        let mask = Mask::new(address.family(), prefix_len)?;
        Ok(Cidr { address, mask })
    }

    /// Combine an address with a mask of the same family.
    pub fn from_mask(address: Address, mask: Mask) -> Result<Self, MaskError> {
        mask.check_family(&address)?;
        Ok(Cidr { address, mask })
    }

    /// The address of this block.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The mask of this block.
    pub fn mask(&self) -> Mask {
        self.mask
    }

    /// The network address of this block.
    pub fn network(&self) -> Address {
        self.mask.combine(&self.address, |addr, mask| addr & mask)
    }

    /// Query whether an address is inside this block.
    pub fn contains(&self, addr: &Address) -> bool {
        self.mask.compare(&self.address, addr)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.mask.prefix_len())
    }
}

/// Parses `10.0.0.1/24` and `fe80::1/64`.
impl FromStr for Cidr {
    type Err = ParseAddressError;

    fn from_str(src: &str) -> Result<Self, ParseAddressError> {
        let mut parts = src.splitn(2, '/');
        let address = parts.next().unwrap_or("").parse::<Address>()?;
        let len = parts.next()
            .ok_or(ParseAddressErrorKind::Separator)?
            .parse::<usize>()
            .map_err(|_| ParseAddressErrorKind::PrefixLength)?;
        Cidr::new(address, len).map_err(|_| ParseAddressErrorKind::PrefixLength.into())
    }
}
