//! Decryption gateway.
//!
//! Plaintext never comes back inside the transaction that asks for it. A
//! requester files a [`DecryptionRequest`] for ciphertexts it is a viewer of
//! and gets a ticket; a relayer later calls [`Gateway::fulfill`], and the
//! runtime routes the [`DecryptionResult`] to the callback in a separate
//! transaction. Requests expire after `ttl_secs`, after which the owning
//! transition may be retried with a fresh request.

use std::collections::HashMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use sealed_types::{short_address, Address, EncryptedValue, Handle};

use crate::error::FheError;
use crate::executor::FheExecutor;

/// Gateway request ticket.
pub type RequestId = [u8; 32];

/// Where a fulfilled request is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum DecryptionCallback {
    /// Call back into a contract; `correlation` is contract-defined
    /// (the auction id for auction settlement).
    Contract { contract: Address, correlation: u64 },
    /// Hold the result for the requesting account to collect.
    Principal,
}

/// State of a decryption request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Pending,
    Fulfilled,
    Expired,
}

/// A single decryption request.
#[derive(Clone, Debug)]
pub struct DecryptionRequest {
    pub id: RequestId,
    pub requester: Address,
    pub values: Vec<EncryptedValue>,
    pub callback: DecryptionCallback,
    pub requested_at: u64,
    pub expires_at: u64,
    pub state: RequestState,
    /// Issue order, used to fulfil requests deterministically
    sequence: u64,
}

/// Plaintexts for a fulfilled request, in the order the values were given.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct DecryptionResult {
    pub request_id: RequestId,
    pub requester: Address,
    pub callback: DecryptionCallback,
    pub plaintexts: Vec<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    Requested,
    Fulfilled,
    Expired,
}

/// One line of the gateway audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub request_id: RequestId,
    pub requester: Address,
    pub handles: Vec<Handle>,
    pub timestamp: u64,
    pub event: AuditEvent,
}

/// Gateway state minus the audit trail, for undoing a failed call.
#[derive(Clone, Debug)]
pub struct GatewayCheckpoint {
    requests: HashMap<RequestId, DecryptionRequest>,
    delivered: HashMap<Address, Vec<DecryptionResult>>,
    audit_len: usize,
    next_sequence: u64,
}

/// Coordinator for asynchronous decryption.
#[derive(Clone, Debug)]
pub struct Gateway {
    requests: HashMap<RequestId, DecryptionRequest>,
    /// Results held for `DecryptionCallback::Principal` requesters
    delivered: HashMap<Address, Vec<DecryptionResult>>,
    audit: Vec<AuditEntry>,
    ttl_secs: u64,
    next_sequence: u64,
}

impl Gateway {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            requests: HashMap::new(),
            delivered: HashMap::new(),
            audit: Vec::new(),
            ttl_secs,
            next_sequence: 0,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// File a request to decrypt `values` for `requester`.
    ///
    /// The requester must be a viewer of every value.
    pub fn request_decryption(
        &mut self,
        fhe: &FheExecutor,
        requester: Address,
        values: &[EncryptedValue],
        callback: DecryptionCallback,
        now: u64,
    ) -> Result<RequestId, FheError> {
        for value in values {
            let tag = fhe
                .access_tag(&value.handle)
                .ok_or(FheError::UnknownHandle(value.handle))?;
            if !tag.can_view(&requester) {
                warn!(
                    requester = %short_address(&requester),
                    handle = %value.handle,
                    "decryption refused"
                );
                return Err(FheError::Unauthorized {
                    principal: requester,
                    handle: value.handle,
                });
            }
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut hasher = Sha256::new();
        hasher.update(b"SEALED_DECRYPTION_REQUEST_V1");
        hasher.update(sequence.to_le_bytes());
        hasher.update(requester);
        for value in values {
            hasher.update(value.handle.0);
        }
        let id: RequestId = hasher.finalize().into();

        let request = DecryptionRequest {
            id,
            requester,
            values: values.to_vec(),
            callback,
            requested_at: now,
            expires_at: now.saturating_add(self.ttl_secs),
            state: RequestState::Pending,
            sequence,
        };
        self.record(&request, AuditEvent::Requested, now);

        info!(
            request_id = hex::encode(id),
            requester = %short_address(&requester),
            values = values.len(),
            "decryption requested"
        );

        self.requests.insert(id, request);
        Ok(id)
    }

    /// Decrypt a pending request.
    ///
    /// Results for `Principal` callbacks are also kept for
    /// [`Gateway::take_delivered`]; contract callbacks are the caller's to
    /// route.
    pub fn fulfill(
        &mut self,
        fhe: &FheExecutor,
        request_id: &RequestId,
        now: u64,
    ) -> Result<DecryptionResult, FheError> {
        let request = self
            .requests
            .get(request_id)
            .ok_or_else(|| FheError::UnknownRequest(hex::encode(request_id)))?;

        if request.state != RequestState::Pending {
            return Err(FheError::RequestNotPending);
        }
        if now > request.expires_at {
            return Err(FheError::RequestExpired);
        }

        let plaintexts = request
            .values
            .iter()
            .map(|value| fhe.reveal(value))
            .collect::<Result<Vec<_>, _>>()?;

        let result = DecryptionResult {
            request_id: *request_id,
            requester: request.requester,
            callback: request.callback,
            plaintexts,
        };

        let request = request.clone();
        self.record(&request, AuditEvent::Fulfilled, now);
        if let Some(stored) = self.requests.get_mut(request_id) {
            stored.state = RequestState::Fulfilled;
        }
        if result.callback == DecryptionCallback::Principal {
            self.delivered
                .entry(result.requester)
                .or_default()
                .push(result.clone());
        }

        debug!(request_id = hex::encode(request_id), "decryption fulfilled");
        Ok(result)
    }

    /// Mark every pending request past its expiry as expired.
    pub fn expire_stale(&mut self, now: u64) -> Vec<RequestId> {
        let mut stale: Vec<&DecryptionRequest> = self
            .requests
            .values()
            .filter(|r| r.state == RequestState::Pending && now > r.expires_at)
            .collect();
        stale.sort_by_key(|r| r.sequence);
        let stale: Vec<DecryptionRequest> = stale.into_iter().cloned().collect();

        for request in &stale {
            self.record(request, AuditEvent::Expired, now);
            if let Some(stored) = self.requests.get_mut(&request.id) {
                stored.state = RequestState::Expired;
            }
            warn!(request_id = hex::encode(request.id), "decryption request expired");
        }
        stale.into_iter().map(|r| r.id).collect()
    }

    /// Whether a request can no longer be fulfilled because of its age.
    pub fn is_expired(&self, request_id: &RequestId, now: u64) -> bool {
        self.requests.get(request_id).is_some_and(|r| {
            r.state == RequestState::Expired || (r.state == RequestState::Pending && now > r.expires_at)
        })
    }

    pub fn state(&self, request_id: &RequestId) -> Option<RequestState> {
        self.requests.get(request_id).map(|r| r.state)
    }

    pub fn request(&self, request_id: &RequestId) -> Option<&DecryptionRequest> {
        self.requests.get(request_id)
    }

    /// Pending request ids in issue order.
    pub fn pending_requests(&self) -> Vec<RequestId> {
        let mut pending: Vec<&DecryptionRequest> = self
            .requests
            .values()
            .filter(|r| r.state == RequestState::Pending)
            .collect();
        pending.sort_by_key(|r| r.sequence);
        pending.into_iter().map(|r| r.id).collect()
    }

    /// Collect results held for `principal`.
    pub fn take_delivered(&mut self, principal: &Address) -> Vec<DecryptionResult> {
        self.delivered.remove(principal).unwrap_or_default()
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit
    }

    /// Handles named by requests still waiting for the relayer.
    pub fn pending_handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.requests
            .values()
            .filter(|r| r.state == RequestState::Pending)
            .flat_map(|r| r.values.iter().map(|v| v.handle))
    }

    pub fn checkpoint(&self) -> GatewayCheckpoint {
        GatewayCheckpoint {
            requests: self.requests.clone(),
            delivered: self.delivered.clone(),
            audit_len: self.audit.len(),
            next_sequence: self.next_sequence,
        }
    }

    /// Return to `checkpoint`, dropping audit entries written since.
    pub fn restore(&mut self, checkpoint: GatewayCheckpoint) {
        self.requests = checkpoint.requests;
        self.delivered = checkpoint.delivered;
        self.audit.truncate(checkpoint.audit_len);
        self.next_sequence = checkpoint.next_sequence;
    }

    fn record(&mut self, request: &DecryptionRequest, event: AuditEvent, timestamp: u64) {
        self.audit.push(AuditEntry {
            request_id: request.id,
            requester: request.requester,
            handles: request.values.iter().map(|v| v.handle).collect(),
            timestamp,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use sealed_types::FheType;

    use super::*;
    use crate::executor::tests::{executor, ALICE, AUCTION, TOKEN};

    fn viewable(fhe: &mut FheExecutor, value: u64) -> EncryptedValue {
        let mut ctx = fhe.context(TOKEN);
        let out = ctx.trivial(value, FheType::U64).unwrap();
        ctx.grant_access(&out, ALICE).unwrap();
        out
    }

    #[test]
    fn test_request_then_fulfill() {
        let mut fhe = executor();
        let mut gateway = Gateway::new(100);
        let balance = viewable(&mut fhe, 250);

        let id = gateway
            .request_decryption(&fhe, ALICE, &[balance], DecryptionCallback::Principal, 10)
            .unwrap();
        assert_eq!(gateway.state(&id), Some(RequestState::Pending));
        assert_eq!(gateway.pending_requests(), vec![id]);

        let result = gateway.fulfill(&fhe, &id, 20).unwrap();
        assert_eq!(result.plaintexts, vec![250]);
        assert_eq!(gateway.state(&id), Some(RequestState::Fulfilled));
        assert!(gateway.pending_requests().is_empty());

        assert_eq!(gateway.take_delivered(&ALICE), vec![result]);
        assert!(gateway.take_delivered(&ALICE).is_empty());

        assert_eq!(gateway.fulfill(&fhe, &id, 30), Err(FheError::RequestNotPending));
    }

    #[test]
    fn test_non_viewer_refused() {
        let mut fhe = executor();
        let mut gateway = Gateway::new(100);
        let balance = viewable(&mut fhe, 250);

        // Compute permission is not read permission.
        let result = gateway.request_decryption(&fhe, TOKEN, &[balance], DecryptionCallback::Principal, 0);
        assert_eq!(
            result,
            Err(FheError::Unauthorized {
                principal: TOKEN,
                handle: balance.handle,
            })
        );
        assert!(gateway.audit_log().is_empty());
    }

    #[test]
    fn test_expired_request_not_fulfilled() {
        let mut fhe = executor();
        let mut gateway = Gateway::new(50);
        let balance = viewable(&mut fhe, 1);

        let id = gateway
            .request_decryption(&fhe, ALICE, &[balance], DecryptionCallback::Principal, 100)
            .unwrap();
        assert!(!gateway.is_expired(&id, 150));
        assert!(gateway.is_expired(&id, 151));
        assert_eq!(gateway.fulfill(&fhe, &id, 151), Err(FheError::RequestExpired));

        assert_eq!(gateway.expire_stale(151), vec![id]);
        assert_eq!(gateway.state(&id), Some(RequestState::Expired));
        assert_eq!(gateway.fulfill(&fhe, &id, 151), Err(FheError::RequestNotPending));
    }

    #[test]
    fn test_audit_trail_and_distinct_ids() {
        let mut fhe = executor();
        let mut gateway = Gateway::new(100);
        let balance = viewable(&mut fhe, 5);
        let callback = DecryptionCallback::Contract {
            contract: AUCTION,
            correlation: 3,
        };

        let first = gateway.request_decryption(&fhe, ALICE, &[balance], callback, 1).unwrap();
        let second = gateway.request_decryption(&fhe, ALICE, &[balance], callback, 2).unwrap();
        assert_ne!(first, second);
        assert_eq!(gateway.pending_requests(), vec![first, second]);

        let result = gateway.fulfill(&fhe, &second, 3).unwrap();
        assert_eq!(result.callback, callback);
        assert!(gateway.take_delivered(&ALICE).is_empty());

        let events: Vec<AuditEvent> = gateway.audit_log().iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![AuditEvent::Requested, AuditEvent::Requested, AuditEvent::Fulfilled]
        );
        assert_eq!(gateway.audit_log()[0].handles, vec![balance.handle]);
    }

    #[test]
    fn test_unknown_request() {
        let fhe = executor();
        let mut gateway = Gateway::new(10);
        assert!(matches!(
            gateway.fulfill(&fhe, &[0u8; 32], 0),
            Err(FheError::UnknownRequest(_))
        ));
    }

    #[test]
    fn test_restore_drops_requests_and_audit_since_checkpoint() {
        let mut fhe = executor();
        let mut gateway = Gateway::new(100);
        let balance = viewable(&mut fhe, 9);
        let kept = gateway
            .request_decryption(&fhe, ALICE, &[balance], DecryptionCallback::Principal, 1)
            .unwrap();

        let checkpoint = gateway.checkpoint();
        let dropped = gateway
            .request_decryption(&fhe, ALICE, &[balance], DecryptionCallback::Principal, 2)
            .unwrap();
        gateway.fulfill(&fhe, &kept, 3).unwrap();
        gateway.restore(checkpoint);

        assert_eq!(gateway.pending_requests(), vec![kept]);
        assert!(gateway.request(&dropped).is_none());
        assert!(gateway.take_delivered(&ALICE).is_empty());
        assert_eq!(gateway.audit_log().len(), 1);
        assert_eq!(gateway.pending_handles().collect::<Vec<_>>(), vec![balance.handle]);

        // The sequence counter is restored too, so the next id matches the dropped one.
        let again = gateway
            .request_decryption(&fhe, ALICE, &[balance], DecryptionCallback::Principal, 2)
            .unwrap();
        assert_eq!(again, dropped);
    }
}
