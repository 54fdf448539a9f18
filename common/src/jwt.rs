use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use uuid::Uuid;

use crate::{
    clock::Clock,
    env_config::JwtConfig,
    error::{AppError, Res},
};

/// Distinguishes what a token may be used for.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    /// User id.
    pub sub: Uuid,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of the access token, unix seconds.
    pub expires_at: i64,
}

/// Signs access/refresh token pairs.
///
/// At most `issuance_capacity` issuances run at once. When the gate is full
/// `issue` fails right away with `AppError::TooManyRequests` instead of
/// waiting; retrying is up to the caller.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    gate: Semaphore,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> Res<Self> {
        if config.secret.is_empty() {
            return Err(AppError::Config("JWT secret must not be empty".to_string()));
        }
        if config.issuance_capacity == 0 {
            return Err(AppError::Config(
                "JWT issuance capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_ttl: ttl_hours(config.access_ttl_hours)?,
            refresh_ttl: ttl_hours(config.refresh_ttl_hours)?,
            gate: Semaphore::new(config.issuance_capacity),
            clock,
        })
    }

    /// Issues an access and a refresh token for `user_id`.
    pub fn issue(&self, user_id: Uuid) -> Res<TokenPair> {
        let _permit = self.admit()?;

        let now = self.clock.now();
        let (access_token, expires_at) = self.sign(user_id, TokenKind::Access, now)?;
        let (refresh_token, _) = self.sign(user_id, TokenKind::Refresh, now)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Decodes `token` and checks signature, expiry and kind.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Res<JwtClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked against the injected clock below
        validation.validate_exp = false;

        let claims = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                log::debug!("Rejected token: {}", e);
                AppError::Unauthorized("Invalid token".to_string())
            })?
            .claims;

        if claims.kind != expected {
            return Err(AppError::Unauthorized("Wrong token kind".to_string()));
        }
        if claims.exp <= self.clock.now().timestamp() {
            return Err(AppError::Unauthorized("Token expired".to_string()));
        }
        Ok(claims)
    }

    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// Takes one issuance slot; it is released when the permit drops.
    pub fn admit(&self) -> Res<SemaphorePermit<'_>> {
        self.gate.try_acquire().map_err(|e| match e {
            TryAcquireError::NoPermits => {
                log::warn!("Token issuance throttled: admission gate is full");
                AppError::TooManyRequests("Token issuance limit reached".to_string())
            }
            TryAcquireError::Closed => {
                AppError::Unavailable("Token issuer is shut down".to_string())
            }
        })
    }

    fn sign(&self, user_id: Uuid, kind: TokenKind, now: DateTime<Utc>) -> Res<(String, i64)> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let expiration = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AppError::Internal("token expiry out of range".to_string()))?
            .timestamp();

        let claims = JwtClaims {
            sub: user_id,
            kind,
            iat: now.timestamp(),
            exp: expiration,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Unavailable(format!("Token signing failed: {}", e)))?;
        Ok((token, expiration))
    }
}

fn ttl_hours(hours: i64) -> Res<Duration> {
    Duration::try_hours(hours)
        .filter(|ttl| *ttl > Duration::zero())
        .ok_or_else(|| AppError::Config(format!("JWT lifetime of {} hours is out of range", hours)))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    fn config(capacity: usize) -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            access_ttl_hours: 24,
            refresh_ttl_hours: 24 * 7,
            issuance_capacity: capacity,
        }
    }

    #[test]
    fn claims_carry_subject_kind_and_expiry() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let issuer = TokenIssuer::new(&config(4), clock.clone()).unwrap();
        let user_id = Uuid::new_v4();

        let pair = issuer.issue(user_id).unwrap();
        assert_eq!(pair.expires_at, (start + Duration::hours(24)).timestamp());

        let access = issuer.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.sub, user_id);
        assert_eq!(access.iat, start.timestamp());
        assert_eq!(access.exp, (start + Duration::hours(24)).timestamp());

        let refresh = issuer.verify(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.exp, (start + Duration::days(7)).timestamp());
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let issuer = TokenIssuer::new(&config(4), Arc::new(SystemClock)).unwrap();
        let pair = issuer.issue(Uuid::new_v4()).unwrap();

        let err = issuer
            .verify(&pair.refresh_token, TokenKind::Access)
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn tokens_expire_with_the_clock() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let issuer = TokenIssuer::new(&config(4), clock.clone()).unwrap();
        let pair = issuer.issue(Uuid::new_v4()).unwrap();

        clock.advance(Duration::hours(25));
        assert!(issuer.verify(&pair.access_token, TokenKind::Access).is_err());
        assert!(issuer.verify(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn rotated_key_invalidates_old_tokens() {
        let issuer = TokenIssuer::new(&config(4), Arc::new(SystemClock)).unwrap();
        let pair = issuer.issue(Uuid::new_v4()).unwrap();

        let mut rotated = config(4);
        rotated.secret = "another-secret".to_string();
        let rotated = TokenIssuer::new(&rotated, Arc::new(SystemClock)).unwrap();

        assert!(rotated.verify(&pair.access_token, TokenKind::Access).is_err());
    }

    #[test]
    fn saturated_gate_throttles_instead_of_queueing() {
        let issuer = TokenIssuer::new(&config(2), Arc::new(SystemClock)).unwrap();

        let first = issuer.admit().unwrap();
        let second = issuer.admit().unwrap();
        assert_eq!(issuer.available_permits(), 0);

        let err = issuer.issue(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_)));

        drop(first);
        drop(second);
        assert!(issuer.issue(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn permits_are_returned_after_every_issuance() {
        let issuer = TokenIssuer::new(&config(3), Arc::new(SystemClock)).unwrap();
        for _ in 0..10 {
            issuer.issue(Uuid::new_v4()).unwrap();
        }
        assert_eq!(issuer.available_permits(), 3);
    }

    #[test]
    fn excess_concurrent_issuances_fail_fast() {
        let issuer = Arc::new(TokenIssuer::new(&config(1), Arc::new(SystemClock)).unwrap());
        let held = issuer.admit().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let issuer = issuer.clone();
                std::thread::spawn(move || issuer.issue(Uuid::new_v4()))
            })
            .collect();

        for handle in handles {
            let res = handle.join().unwrap();
            assert!(matches!(res, Err(AppError::TooManyRequests(_))));
        }
        drop(held);
    }

    #[test]
    fn empty_secret_is_rejected() {
        let mut cfg = config(1);
        cfg.secret = String::new();
        assert!(matches!(
            TokenIssuer::new(&cfg, Arc::new(SystemClock)),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn out_of_range_lifetime_is_a_config_error() {
        let mut huge = config(4);
        huge.access_ttl_hours = i64::MAX;
        assert!(matches!(
            TokenIssuer::new(&huge, Arc::new(SystemClock)),
            Err(AppError::Config(_))
        ));

        let mut negative = config(4);
        negative.refresh_ttl_hours = -1;
        assert!(matches!(
            TokenIssuer::new(&negative, Arc::new(SystemClock)),
            Err(AppError::Config(_))
        ));
    }
}
