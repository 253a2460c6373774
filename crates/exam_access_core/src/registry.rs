//! crates/exam_access_core/src/registry.rs
//!
//! The authoritative store of access tokens and the gate for entry checks.
//!
//! All state lives behind one lock, so `rotate`, `deactivate` and `validate`
//! on the same token never interleave: a presented code is compared against
//! exactly one current value.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{
    AccessToken, Admission, IssueRequest, RejectReason, SupersededValue, TokenId,
};
use crate::error::{AccessError, AccessResult};
use crate::ports::CodeGenerator;

/// How many draws from the generator a fresh code may take.
pub const MAX_CODE_ATTEMPTS: u32 = 32;

struct TokenEntry {
    token: AccessToken,
    history: Vec<SupersededValue>,
}

#[derive(Default)]
struct RegistryInner {
    tokens: HashMap<TokenId, TokenEntry>,
    /// Every code ever handed out, current or superseded. Codes are never reused.
    by_value: HashMap<String, TokenId>,
}

impl RegistryInner {
    fn entry(&self, token_id: TokenId) -> AccessResult<&TokenEntry> {
        self.tokens
            .get(&token_id)
            .ok_or_else(|| AccessError::NotFound(format!("token {token_id}")))
    }

    fn entry_mut(&mut self, token_id: TokenId) -> AccessResult<&mut TokenEntry> {
        self.tokens
            .get_mut(&token_id)
            .ok_or_else(|| AccessError::NotFound(format!("token {token_id}")))
    }

    fn fresh_value(&self, codes: &dyn CodeGenerator) -> AccessResult<String> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let value = codes.generate();
            if !value.is_empty() && !self.by_value.contains_key(&value) {
                return Ok(value);
            }
        }
        Err(AccessError::CodeExhausted(MAX_CODE_ATTEMPTS))
    }
}

pub struct TokenRegistry {
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    default_ttl: Duration,
    inner: Mutex<RegistryInner>,
}

impl TokenRegistry {
    /// Creates an empty registry. `default_ttl` is the lifetime of a freshly
    /// issued code, independent of any rotation interval.
    pub fn new(clock: Arc<dyn Clock>, codes: Arc<dyn CodeGenerator>, default_ttl: Duration) -> Self {
        Self {
            clock,
            codes,
            default_ttl,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Issues a new active token with a fresh code.
    pub fn issue(&self, request: IssueRequest) -> AccessResult<AccessToken> {
        let exam_ref = request.exam_ref.trim();
        if exam_ref.is_empty() {
            return Err(AccessError::InvalidRequest(
                "exam reference must not be empty".to_string(),
            ));
        }
        if self.default_ttl <= Duration::zero() {
            return Err(AccessError::InvalidRequest(
                "default token lifetime must be positive".to_string(),
            ));
        }
        if let Some(policy) = request.rotation {
            if policy.enabled && policy.interval_seconds == 0 {
                return Err(AccessError::InvalidRequest(
                    "rotation interval must be greater than zero".to_string(),
                ));
            }
        }
        if request.duration_seconds == Some(0) {
            return Err(AccessError::InvalidRequest(
                "exam duration must be greater than zero".to_string(),
            ));
        }

        let mut inner = self.inner.lock();
        let value = inner.fresh_value(self.codes.as_ref())?;
        let now = self.clock.now();
        let token = AccessToken {
            id: Uuid::new_v4(),
            exam_ref: exam_ref.to_string(),
            class_ref: request.class_ref,
            subject_ref: request.subject_ref,
            value: value.clone(),
            issued_at: now,
            expires_at: now + self.default_ttl,
            rotation: request.rotation,
            active: true,
            rotations: 0,
            duration_seconds: request.duration_seconds,
        };

        inner.by_value.insert(value, token.id);
        inner.tokens.insert(
            token.id,
            TokenEntry {
                token: token.clone(),
                history: Vec::new(),
            },
        );
        info!(
            "Issued token {} for exam '{}' (expires {})",
            token.id, token.exam_ref, token.expires_at
        );
        Ok(token)
    }

    /// Checks a presented code against a token.
    ///
    /// Expiry is checked first, so an expired token reports `Expired` whatever
    /// its active flag or the presented code.
    pub fn validate(
        &self,
        token_id: TokenId,
        presented_value: &str,
        now: DateTime<Utc>,
    ) -> AccessResult<Admission> {
        let inner = self.inner.lock();
        let token = &inner.entry(token_id)?.token;
        Ok(check(token, presented_value, now))
    }

    /// The student entry gate: resolves a code to its token and validates it.
    ///
    /// A code that was never issued is a `ValueMismatch`; a superseded code
    /// resolves to its token and is rejected by the usual checks.
    pub fn admit(&self, presented_value: &str, now: DateTime<Utc>) -> AccessResult<AccessToken> {
        let inner = self.inner.lock();
        let Some(token_id) = inner.by_value.get(presented_value).copied() else {
            debug!("Rejected unknown exam code");
            return Err(AccessError::ValueMismatch);
        };
        let token = &inner.entry(token_id)?.token;
        match check(token, presented_value, now) {
            Admission::Admitted => Ok(token.clone()),
            Admission::Rejected(reason) => {
                debug!("Rejected exam code for token {}: {}", token_id, reason.as_str());
                Err(reason.into())
            }
        }
    }

    /// Replaces the token's code and expiry in one step.
    pub fn rotate(&self, token_id: TokenId, now: DateTime<Utc>) -> AccessResult<AccessToken> {
        let mut inner = self.inner.lock();
        let entry = inner.entry(token_id)?;
        if !entry.token.active {
            return Err(AccessError::InvalidState {
                operation: "rotate",
                state: "inactive",
            });
        }
        let lifetime = match entry.token.rotation {
            Some(policy) if policy.interval_seconds > 0 => policy.interval(),
            _ => self.default_ttl,
        };

        let value = inner.fresh_value(self.codes.as_ref())?;
        inner.by_value.insert(value.clone(), token_id);

        let entry = inner.entry_mut(token_id)?;
        let previous = std::mem::replace(&mut entry.token.value, value);
        let valid_from = entry
            .history
            .last()
            .map(|superseded| superseded.superseded_at)
            .unwrap_or(entry.token.issued_at);
        entry.history.push(SupersededValue {
            value: previous,
            valid_from,
            superseded_at: now,
        });
        entry.token.expires_at = now + lifetime;
        entry.token.rotations += 1;

        info!(
            "Rotated token {} (rotation #{}, expires {})",
            token_id, entry.token.rotations, entry.token.expires_at
        );
        Ok(entry.token.clone())
    }

    pub fn deactivate(&self, token_id: TokenId) -> AccessResult<AccessToken> {
        self.set_active(token_id, false)
    }

    /// Reactivates a token. The expiry is left untouched; rotate afterwards
    /// if the token should stay usable past it.
    pub fn reactivate(&self, token_id: TokenId) -> AccessResult<AccessToken> {
        self.set_active(token_id, true)
    }

    fn set_active(&self, token_id: TokenId, active: bool) -> AccessResult<AccessToken> {
        let mut inner = self.inner.lock();
        let entry = inner.entry_mut(token_id)?;
        if entry.token.active != active {
            entry.token.active = active;
            info!(
                "Token {} {}",
                token_id,
                if active { "reactivated" } else { "deactivated" }
            );
        }
        Ok(entry.token.clone())
    }

    pub fn get(&self, token_id: TokenId) -> AccessResult<AccessToken> {
        Ok(self.inner.lock().entry(token_id)?.token.clone())
    }

    /// All tokens issued for an exam, oldest first.
    pub fn tokens_for_exam(&self, exam_ref: &str) -> Vec<AccessToken> {
        let inner = self.inner.lock();
        let mut tokens: Vec<AccessToken> = inner
            .tokens
            .values()
            .filter(|entry| entry.token.exam_ref == exam_ref)
            .map(|entry| entry.token.clone())
            .collect();
        tokens.sort_by_key(|token| (token.issued_at, token.id));
        tokens
    }

    /// Superseded codes of a token, oldest first.
    pub fn history(&self, token_id: TokenId) -> AccessResult<Vec<SupersededValue>> {
        Ok(self.inner.lock().entry(token_id)?.history.clone())
    }
}

fn check(token: &AccessToken, presented_value: &str, now: DateTime<Utc>) -> Admission {
    if token.is_expired(now) {
        Admission::Rejected(RejectReason::Expired)
    } else if !token.active {
        Admission::Rejected(RejectReason::NotActive)
    } else if token.value != presented_value {
        Admission::Rejected(RejectReason::ValueMismatch)
    } else {
        Admission::Admitted
    }
}
