//! The ciphertext store and homomorphic operations.

use std::collections::{HashMap, HashSet};

use rand::rngs::OsRng;
use tracing::trace;

use sealed_crypto::NetworkKeys;
use sealed_types::{short_address, Address, EncryptedValue, FheType, Handle, NetworkPublicKey};

use crate::acl::AccessTag;
use crate::backend;
use crate::error::FheError;

/// A sealed ciphertext and its access tag.
#[derive(Clone, Debug)]
pub struct CiphertextRecord {
    pub ty: FheType,
    sealed: Vec<u8>,
    pub access: AccessTag,
}

/// Undo record of one store change.
#[derive(Clone, Debug)]
enum JournalEntry {
    Sealed(Handle),
    Access(Handle, AccessTag),
}

/// Holds the network keys and every live ciphertext.
///
/// The executor is the only component able to open a ciphertext. Contracts
/// reach it through [`FheContext`], which runs every operation on behalf of
/// one domain and checks that domain against each operand's access tag.
///
/// Between [`FheExecutor::begin`] and [`FheExecutor::commit`] every change to
/// the store is journaled, so a failed call is undone with
/// [`FheExecutor::rollback`] in time proportional to the call, not the store.
#[derive(Clone, Debug)]
pub struct FheExecutor {
    keys: NetworkKeys,
    store: HashMap<Handle, CiphertextRecord>,
    journal: Option<Vec<JournalEntry>>,
}

impl FheExecutor {
    pub fn new(keys: NetworkKeys) -> Self {
        Self {
            keys,
            store: HashMap::new(),
            journal: None,
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, FheError> {
        Ok(Self::new(NetworkKeys::from_seed(seed)?))
    }

    /// Key clients encrypt inputs to.
    pub fn public_key(&self) -> NetworkPublicKey {
        self.keys.public_key()
    }

    /// Run operations as `domain`.
    pub fn context(&mut self, domain: Address) -> FheContext<'_> {
        FheContext {
            executor: self,
            domain,
        }
    }

    pub fn access_tag(&self, handle: &Handle) -> Option<&AccessTag> {
        self.store.get(handle).map(|record| &record.access)
    }

    /// Whether `principal` may use `value` as a call argument, either as an
    /// admitted domain or as a viewer.
    pub fn is_allowed(&self, value: &EncryptedValue, principal: &Address) -> bool {
        self.access_tag(&value.handle)
            .map(|tag| tag.admits(principal) || tag.can_view(principal))
            .unwrap_or(false)
    }

    pub fn is_viewer(&self, value: &EncryptedValue, principal: &Address) -> bool {
        self.access_tag(&value.handle)
            .map(|tag| tag.can_view(principal))
            .unwrap_or(false)
    }

    /// Off-chain read of a value by one of its viewers, the equivalent of a
    /// user-side re-encryption. Never reachable from a contract call.
    pub fn view(&self, value: &EncryptedValue, principal: &Address) -> Result<u64, FheError> {
        let record = self.record(value)?;
        if !record.access.can_view(principal) {
            return Err(FheError::Unauthorized {
                principal: *principal,
                handle: value.handle,
            });
        }
        self.reveal(value)
    }

    /// Number of live ciphertexts.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub(crate) fn keys(&self) -> &NetworkKeys {
        &self.keys
    }

    /// Start journaling store changes. Discards any open journal.
    pub fn begin(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Close the journal and return the handles sealed since [`begin`].
    ///
    /// [`begin`]: FheExecutor::begin
    pub fn commit(&mut self) -> Vec<Handle> {
        self.journal
            .take()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| match entry {
                JournalEntry::Sealed(handle) => Some(handle),
                JournalEntry::Access(..) => None,
            })
            .collect()
    }

    /// Undo every change since [`begin`](FheExecutor::begin).
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for entry in journal.into_iter().rev() {
            match entry {
                JournalEntry::Sealed(handle) => {
                    self.store.remove(&handle);
                }
                JournalEntry::Access(handle, access) => {
                    if let Some(record) = self.store.get_mut(&handle) {
                        record.access = access;
                    }
                }
            }
        }
    }

    /// Drop every `candidate` not in `live`. Returns how many were dropped.
    pub fn prune(&mut self, candidates: impl IntoIterator<Item = Handle>, live: &HashSet<Handle>) -> usize {
        let mut dropped = 0;
        for handle in candidates {
            if !live.contains(&handle) && self.store.remove(&handle).is_some() {
                dropped += 1;
            }
        }
        dropped
    }

    /// Drop every ciphertext not in `live`.
    pub fn retain_live(&mut self, live: &HashSet<Handle>) -> usize {
        let before = self.store.len();
        self.store.retain(|handle, _| live.contains(handle));
        before - self.store.len()
    }

    fn record(&self, value: &EncryptedValue) -> Result<&CiphertextRecord, FheError> {
        let record = self
            .store
            .get(&value.handle)
            .ok_or(FheError::UnknownHandle(value.handle))?;
        if record.ty != value.ty {
            return Err(FheError::TypeMismatch {
                expected: record.ty,
                got: value.ty,
            });
        }
        Ok(record)
    }

    fn record_mut(&mut self, value: &EncryptedValue) -> Result<&mut CiphertextRecord, FheError> {
        let access = self.record(value)?.access.clone();
        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry::Access(value.handle, access));
        }
        self.store
            .get_mut(&value.handle)
            .ok_or(FheError::UnknownHandle(value.handle))
    }

    /// Open a ciphertext without any permission check. Only the gateway may
    /// call this, after checking the requester is a viewer.
    pub(crate) fn reveal(&self, value: &EncryptedValue) -> Result<u64, FheError> {
        let record = self.record(value)?;
        let plaintext = self
            .keys
            .sealing_key()
            .open(&record.sealed, &[record.ty.tag()])?;
        let bytes: [u8; 8] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| FheError::Crypto(sealed_crypto::CryptoError::InvalidCiphertextFormat))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn open_as(&self, domain: &Address, value: &EncryptedValue) -> Result<u64, FheError> {
        let record = self.record(value)?;
        if !record.access.admits(domain) {
            return Err(FheError::DomainMismatch {
                handle: value.handle,
                domain: *domain,
            });
        }
        self.reveal(value)
    }

    pub(crate) fn seal(
        &mut self,
        plaintext: u64,
        ty: FheType,
        access: AccessTag,
    ) -> Result<EncryptedValue, FheError> {
        let sealed = self
            .keys
            .sealing_key()
            .seal(&plaintext.to_le_bytes(), &[ty.tag()], &mut OsRng)?;
        let handle = Handle(sealed_types::sha256(&sealed));

        self.store.insert(handle, CiphertextRecord { ty, sealed, access });
        if let Some(journal) = self.journal.as_mut() {
            journal.push(JournalEntry::Sealed(handle));
        }
        Ok(EncryptedValue { handle, ty })
    }
}

/// The executor seen from one contract domain.
pub struct FheContext<'a> {
    executor: &'a mut FheExecutor,
    domain: Address,
}

impl FheContext<'_> {
    pub fn domain(&self) -> Address {
        self.domain
    }

    pub fn executor(&self) -> &FheExecutor {
        self.executor
    }

    pub(crate) fn executor_mut(&mut self) -> &mut FheExecutor {
        self.executor
    }

    /// Encrypt a public constant.
    pub fn trivial(&mut self, value: u64, ty: FheType) -> Result<EncryptedValue, FheError> {
        if value > ty.max_value() {
            return Err(FheError::ValueOutOfRange { value, ty });
        }
        self.executor
            .seal(value, ty, AccessTag::owned_by(self.domain))
    }

    pub fn zero(&mut self, ty: FheType) -> Result<EncryptedValue, FheError> {
        self.trivial(0, ty)
    }

    /// Saturating sum.
    pub fn add(&mut self, a: &EncryptedValue, b: &EncryptedValue) -> Result<EncryptedValue, FheError> {
        let ty = integer_pair(a, b)?;
        let (x, y) = self.open_pair(a, b)?;
        self.emit("add", backend::add(x, y, ty.max_value()), ty)
    }

    /// Difference, saturating at zero.
    pub fn sub(&mut self, a: &EncryptedValue, b: &EncryptedValue) -> Result<EncryptedValue, FheError> {
        let ty = integer_pair(a, b)?;
        let (x, y) = self.open_pair(a, b)?;
        self.emit("sub", backend::sub(x, y), ty)
    }

    /// Encrypted `a < b`.
    pub fn lt(&mut self, a: &EncryptedValue, b: &EncryptedValue) -> Result<EncryptedValue, FheError> {
        integer_pair(a, b)?;
        let (x, y) = self.open_pair(a, b)?;
        self.emit("lt", backend::lt(x, y), FheType::Bool)
    }

    /// Encrypted `a <= b`.
    pub fn le(&mut self, a: &EncryptedValue, b: &EncryptedValue) -> Result<EncryptedValue, FheError> {
        integer_pair(a, b)?;
        let (x, y) = self.open_pair(a, b)?;
        self.emit("le", backend::le(x, y), FheType::Bool)
    }

    /// Encrypted `a == b`.
    pub fn eq(&mut self, a: &EncryptedValue, b: &EncryptedValue) -> Result<EncryptedValue, FheError> {
        same_type(a, b)?;
        let (x, y) = self.open_pair(a, b)?;
        self.emit("eq", backend::eq(x, y), FheType::Bool)
    }

    pub fn and(&mut self, a: &EncryptedValue, b: &EncryptedValue) -> Result<EncryptedValue, FheError> {
        expect_type(a, FheType::Bool)?;
        expect_type(b, FheType::Bool)?;
        let (x, y) = self.open_pair(a, b)?;
        self.emit("and", backend::and(x, y), FheType::Bool)
    }

    pub fn not(&mut self, a: &EncryptedValue) -> Result<EncryptedValue, FheError> {
        expect_type(a, FheType::Bool)?;
        let x = self.executor.open_as(&self.domain, a)?;
        self.emit("not", backend::not(x), FheType::Bool)
    }

    /// Encrypted `cond ? a : b`.
    pub fn select(
        &mut self,
        cond: &EncryptedValue,
        a: &EncryptedValue,
        b: &EncryptedValue,
    ) -> Result<EncryptedValue, FheError> {
        expect_type(cond, FheType::Bool)?;
        let ty = same_type(a, b)?;
        let c = self.executor.open_as(&self.domain, cond)?;
        let (x, y) = self.open_pair(a, b)?;
        self.emit("select", backend::select(c, x, y), ty)
    }

    /// Encrypted `max(a, b)`.
    pub fn max(&mut self, a: &EncryptedValue, b: &EncryptedValue) -> Result<EncryptedValue, FheError> {
        let a_smaller = self.lt(a, b)?;
        self.select(&a_smaller, b, a)
    }

    /// Admit another contract to compute on `value`.
    pub fn allow_domain(&mut self, value: &EncryptedValue, contract: Address) -> Result<(), FheError> {
        let domain = self.domain;
        let record = self.admitted_record_mut(value)?;
        record.access.domains.insert(contract);
        trace!(
            handle = %value.handle,
            from = %short_address(&domain),
            to = %short_address(&contract),
            "domain admitted"
        );
        Ok(())
    }

    /// Let `principal` request the plaintext of `value`.
    pub fn grant_access(&mut self, value: &EncryptedValue, principal: Address) -> Result<(), FheError> {
        let record = self.admitted_record_mut(value)?;
        record.access.viewers.insert(principal);
        trace!(
            handle = %value.handle,
            principal = %short_address(&principal),
            "viewer granted"
        );
        Ok(())
    }

    fn admitted_record_mut(&mut self, value: &EncryptedValue) -> Result<&mut CiphertextRecord, FheError> {
        let domain = self.domain;
        let record = self.executor.record_mut(value)?;
        if !record.access.admits(&domain) {
            return Err(FheError::DomainMismatch {
                handle: value.handle,
                domain,
            });
        }
        Ok(record)
    }

    fn open_pair(&self, a: &EncryptedValue, b: &EncryptedValue) -> Result<(u64, u64), FheError> {
        Ok((
            self.executor.open_as(&self.domain, a)?,
            self.executor.open_as(&self.domain, b)?,
        ))
    }

    fn emit(&mut self, op: &'static str, plaintext: u64, ty: FheType) -> Result<EncryptedValue, FheError> {
        let out = self
            .executor
            .seal(plaintext, ty, AccessTag::owned_by(self.domain))?;
        trace!(op, domain = %short_address(&self.domain), handle = %out.handle, "fhe op");
        Ok(out)
    }
}

fn same_type(a: &EncryptedValue, b: &EncryptedValue) -> Result<FheType, FheError> {
    if a.ty != b.ty {
        return Err(FheError::TypeMismatch {
            expected: a.ty,
            got: b.ty,
        });
    }
    Ok(a.ty)
}

fn integer_pair(a: &EncryptedValue, b: &EncryptedValue) -> Result<FheType, FheError> {
    let ty = same_type(a, b)?;
    if ty == FheType::Bool {
        return Err(FheError::TypeMismatch {
            expected: FheType::U64,
            got: FheType::Bool,
        });
    }
    Ok(ty)
}

fn expect_type(value: &EncryptedValue, expected: FheType) -> Result<(), FheError> {
    if value.ty != expected {
        return Err(FheError::TypeMismatch {
            expected,
            got: value.ty,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TOKEN: Address = [1u8; 32];
    pub(crate) const AUCTION: Address = [2u8; 32];
    pub(crate) const ALICE: Address = [3u8; 32];

    pub(crate) fn executor() -> FheExecutor {
        FheExecutor::from_seed(&[42u8; 32]).unwrap()
    }

    fn plain(fhe: &FheExecutor, value: &EncryptedValue) -> u64 {
        fhe.reveal(value).unwrap()
    }

    #[test]
    fn test_arithmetic_under_encryption() {
        let mut fhe = executor();
        let mut ctx = fhe.context(TOKEN);

        let a = ctx.trivial(30, FheType::U64).unwrap();
        let b = ctx.trivial(12, FheType::U64).unwrap();
        let sum = ctx.add(&a, &b).unwrap();
        let diff = ctx.sub(&b, &a).unwrap();
        let less = ctx.lt(&b, &a).unwrap();
        let pick = ctx.select(&less, &a, &b).unwrap();

        assert_eq!(plain(&fhe, &sum), 42);
        assert_eq!(plain(&fhe, &diff), 0);
        assert_eq!(plain(&fhe, &less), 1);
        assert_eq!(plain(&fhe, &pick), 30);
    }

    #[test]
    fn test_each_result_gets_a_fresh_handle() {
        let mut fhe = executor();
        let mut ctx = fhe.context(TOKEN);

        let a = ctx.trivial(5, FheType::U64).unwrap();
        let b = ctx.trivial(5, FheType::U64).unwrap();
        assert_ne!(a.handle, b.handle);
        assert_eq!(fhe.len(), 2);
    }

    #[test]
    fn test_foreign_domain_rejected() {
        let mut fhe = executor();
        let a = fhe.context(TOKEN).trivial(1, FheType::U64).unwrap();
        let b = fhe.context(AUCTION).trivial(2, FheType::U64).unwrap();

        let result = fhe.context(AUCTION).add(&a, &b);
        assert_eq!(
            result,
            Err(FheError::DomainMismatch {
                handle: a.handle,
                domain: AUCTION,
            })
        );
    }

    #[test]
    fn test_allow_domain_enables_cross_domain_use() {
        let mut fhe = executor();
        let a = fhe.context(TOKEN).trivial(1, FheType::U64).unwrap();
        fhe.context(TOKEN).allow_domain(&a, AUCTION).unwrap();

        let mut ctx = fhe.context(AUCTION);
        let b = ctx.trivial(2, FheType::U64).unwrap();
        let sum = ctx.add(&a, &b).unwrap();
        assert_eq!(plain(&fhe, &sum), 3);

        // A domain cannot admit itself.
        let c = fhe.context(TOKEN).trivial(9, FheType::U64).unwrap();
        assert!(fhe.context(AUCTION).allow_domain(&c, AUCTION).is_err());
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut fhe = executor();
        let mut ctx = fhe.context(TOKEN);
        let a = ctx.trivial(1, FheType::U64).unwrap();
        let b = ctx.trivial(1, FheType::U32).unwrap();
        let flag = ctx.trivial(1, FheType::Bool).unwrap();

        assert!(matches!(ctx.add(&a, &b), Err(FheError::TypeMismatch { .. })));
        assert!(matches!(ctx.add(&flag, &flag), Err(FheError::TypeMismatch { .. })));
        assert!(matches!(ctx.select(&a, &a, &a), Err(FheError::TypeMismatch { .. })));
        assert!(matches!(
            ctx.trivial(256, FheType::U8),
            Err(FheError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_grant_access_does_not_change_value() {
        let mut fhe = executor();
        let mut ctx = fhe.context(TOKEN);
        let a = ctx.trivial(77, FheType::U64).unwrap();
        ctx.grant_access(&a, ALICE).unwrap();

        assert!(fhe.is_viewer(&a, &ALICE));
        assert!(fhe.is_allowed(&a, &ALICE));
        assert!(!fhe.is_viewer(&a, &TOKEN));
        assert_eq!(fhe.view(&a, &ALICE), Ok(77));
        assert!(matches!(fhe.view(&a, &TOKEN), Err(FheError::Unauthorized { .. })));
    }

    #[test]
    fn test_u8_addition_clamps() {
        let mut fhe = executor();
        let mut ctx = fhe.context(TOKEN);
        let a = ctx.trivial(200, FheType::U8).unwrap();
        let b = ctx.trivial(100, FheType::U8).unwrap();
        let sum = ctx.add(&a, &b).unwrap();
        assert_eq!(plain(&fhe, &sum), 255);
    }

    #[test]
    fn test_rollback_undoes_seals_and_grants() {
        let mut fhe = executor();
        let kept = fhe.context(TOKEN).trivial(5, FheType::U64).unwrap();

        fhe.begin();
        {
            let mut ctx = fhe.context(TOKEN);
            ctx.grant_access(&kept, ALICE).unwrap();
            ctx.allow_domain(&kept, AUCTION).unwrap();
            ctx.add(&kept, &kept).unwrap();
        }
        assert_eq!(fhe.len(), 2);
        fhe.rollback();

        assert_eq!(fhe.len(), 1);
        let tag = fhe.access_tag(&kept.handle).unwrap();
        assert!(!tag.can_view(&ALICE));
        assert!(!tag.admits(&AUCTION));
        assert_eq!(plain(&fhe, &kept), 5);
    }

    #[test]
    fn test_commit_reports_sealed_handles() {
        let mut fhe = executor();
        fhe.begin();
        let (a, sum) = {
            let mut ctx = fhe.context(TOKEN);
            let a = ctx.trivial(1, FheType::U64).unwrap();
            let sum = ctx.add(&a, &a).unwrap();
            ctx.grant_access(&sum, ALICE).unwrap();
            (a, sum)
        };
        assert_eq!(fhe.commit(), vec![a.handle, sum.handle]);

        // Nothing is journaled once committed.
        fhe.rollback();
        assert_eq!(fhe.len(), 2);

        let dropped = fhe.prune([a.handle, sum.handle], &HashSet::from([sum.handle]));
        assert_eq!(dropped, 1);
        assert!(fhe.access_tag(&a.handle).is_none());
        assert_eq!(fhe.view(&sum, &ALICE), Ok(2));
    }
}
