use crate::wire::{Family, Ipv4Address, Ipv6Address, Mask, MaskError};

use super::Binding;

/// The prefix length of the IPv4 loopback network.
pub const LOOPBACK_V4_PREFIX: usize = 8;

/// The addresses a loopback interface gets when it is started.
///
/// These are `127.0.0.1/8` and `::1/128`.
pub fn loopback_bindings() -> Result<[Binding; 2], MaskError> {
    Ok([
        Binding {
            address: Ipv4Address::LOOPBACK.into(),
            mask: Mask::new(Family::Ipv4, LOOPBACK_V4_PREFIX)?,
        },
        Binding {
            address: Ipv6Address::LOOPBACK.into(),
            mask: Mask::host(Family::Ipv6),
        },
    ])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bindings() {
        let [v4, v6] = loopback_bindings().unwrap();
        assert_eq!(v4.address.to_string(), "127.0.0.1");
        assert_eq!(v4.mask.prefix_len(), 8);
        assert_eq!(v6.address.to_string(), "::1");
        assert_eq!(v6.mask.prefix_len(), 128);
    }
}
