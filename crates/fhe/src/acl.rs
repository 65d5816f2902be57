//! Access tags attached to every stored ciphertext.

use std::collections::BTreeSet;

use sealed_types::Address;

/// Who may use a ciphertext.
///
/// `domains` are contracts allowed to compute on the value. `viewers` are
/// principals allowed to request its plaintext through the gateway. The two
/// sets are independent: admitting a contract to compute never lets it read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessTag {
    pub domains: BTreeSet<Address>,
    pub viewers: BTreeSet<Address>,
}

impl AccessTag {
    /// Tag for a value freshly produced by `domain`.
    pub fn owned_by(domain: Address) -> Self {
        Self {
            domains: BTreeSet::from([domain]),
            viewers: BTreeSet::new(),
        }
    }

    pub fn admits(&self, domain: &Address) -> bool {
        self.domains.contains(domain)
    }

    pub fn can_view(&self, principal: &Address) -> bool {
        self.viewers.contains(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_and_view_are_separate() {
        let token = [1u8; 32];
        let alice = [2u8; 32];

        let mut tag = AccessTag::owned_by(token);
        assert!(tag.admits(&token));
        assert!(!tag.can_view(&token));

        tag.viewers.insert(alice);
        assert!(tag.can_view(&alice));
        assert!(!tag.admits(&alice));
    }
}
