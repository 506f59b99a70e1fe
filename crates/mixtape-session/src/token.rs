//! Capability tokens: the credentials clients hold between events.
//!
//! Two kinds exist. An **invite token** is session-scoped: it carries
//! the join code and nothing else, and backs shareable deep links. A
//! **player token** is player-scoped: it proves "I am player X of
//! session Y" and authorizes connect/start/leave. Both are opaque to
//! clients and expire on a schedule the codec owns; the coordinator
//! treats them as capabilities, never as identity.
//!
//! The player claims carry the session id alongside the code because
//! the code is cleared the moment a game starts; a token that only
//! named the code would stop resolving exactly when players still need
//! it (reconnecting mid-game, leaving politely).

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use mixtape_protocol::{PlayerId, SessionId};

use crate::TokenError;

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Claims inside an invite token.
///
/// `deny_unknown_fields` keeps the two token kinds distinct: a player
/// token presented as an invite fails decoding instead of passing with
/// its extra claims ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InviteClaims {
    /// The join code the invite points at.
    pub code: String,
    /// Expiry, unix seconds.
    pub exp: u64,
}

/// Claims inside a player token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerClaims {
    /// The session this credential belongs to.
    #[serde(rename = "sid")]
    pub session: SessionId,
    /// The join code at mint time. Kept for parity with older clients;
    /// resolution goes through `sid`.
    pub code: String,
    /// The bearer's player id.
    #[serde(rename = "pid")]
    pub player: PlayerId,
    /// Expiry, unix seconds.
    pub exp: u64,
}

// ---------------------------------------------------------------------------
// TokenCodec
// ---------------------------------------------------------------------------

/// Signs and verifies the tokens clients hold.
///
/// Async because real deployments may verify against a key service;
/// the in-process implementation returns immediately. Desugared form
/// for the same reason as [`SessionStore`](crate::SessionStore): the
/// futures must be `Send` so the coordinator can await them inside
/// spawned tasks; implementations can use plain `async fn`.
pub trait TokenCodec: Send + Sync + 'static {
    fn encode_invite(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<String, TokenError>> + Send;

    fn decode_invite(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<InviteClaims, TokenError>> + Send;

    fn encode_player(
        &self,
        session: SessionId,
        code: &str,
        player: PlayerId,
    ) -> impl Future<Output = Result<String, TokenError>> + Send;

    fn decode_player(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<PlayerClaims, TokenError>> + Send;
}

/// Blanket impl so `Arc<C>` can stand in wherever a codec is expected.
impl<C: TokenCodec> TokenCodec for Arc<C> {
    async fn encode_invite(&self, code: &str) -> Result<String, TokenError> {
        (**self).encode_invite(code).await
    }

    async fn decode_invite(&self, token: &str) -> Result<InviteClaims, TokenError> {
        (**self).decode_invite(token).await
    }

    async fn encode_player(
        &self,
        session: SessionId,
        code: &str,
        player: PlayerId,
    ) -> Result<String, TokenError> {
        (**self).encode_player(session, code, player).await
    }

    async fn decode_player(&self, token: &str) -> Result<PlayerClaims, TokenError> {
        (**self).decode_player(token).await
    }
}

// ---------------------------------------------------------------------------
// SignedTokenCodec
// ---------------------------------------------------------------------------

/// HMAC-SHA256 signed JWTs with a fixed time-to-live.
pub struct SignedTokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    header: Header,
    ttl: Duration,
}

impl SignedTokenCodec {
    /// Default time-to-live: long enough for an evening, short enough
    /// that a leaked token goes stale by the next party.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 60 * 60);

    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // No leeway: a token is expired the second its exp passes.
        // Liveness decisions elsewhere tolerate skew; credentials don't
        // need to.
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            header: Header::new(Algorithm::HS256),
            ttl,
        }
    }

    fn expiry(&self) -> Result<u64, TokenError> {
        let since_epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_err(|_| TokenError::Encode("system clock before unix epoch".into()))?;
        Ok((since_epoch + self.ttl).as_secs())
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&self.header, claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    fn verify<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<T, TokenError> {
        decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    TokenError::Expired
                }
                _ => TokenError::Invalid,
            })
    }
}

impl TokenCodec for SignedTokenCodec {
    async fn encode_invite(&self, code: &str) -> Result<String, TokenError> {
        self.sign(&InviteClaims {
            code: code.to_owned(),
            exp: self.expiry()?,
        })
    }

    async fn decode_invite(&self, token: &str) -> Result<InviteClaims, TokenError> {
        self.verify(token)
    }

    async fn encode_player(
        &self,
        session: SessionId,
        code: &str,
        player: PlayerId,
    ) -> Result<String, TokenError> {
        self.sign(&PlayerClaims {
            session,
            code: code.to_owned(),
            player,
            exp: self.expiry()?,
        })
    }

    async fn decode_player(&self, token: &str) -> Result<PlayerClaims, TokenError> {
        self.verify(token)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SignedTokenCodec {
        SignedTokenCodec::new(b"test-secret", SignedTokenCodec::DEFAULT_TTL)
    }

    #[tokio::test]
    async fn test_player_token_round_trips() {
        let codec = codec();
        let session = SessionId::new();
        let player = PlayerId::new();

        let token = codec.encode_player(session, "123456", player).await.unwrap();
        let claims = codec.decode_player(&token).await.unwrap();

        assert_eq!(claims.session, session);
        assert_eq!(claims.player, player);
        assert_eq!(claims.code, "123456");
    }

    #[tokio::test]
    async fn test_codec_calls_run_inside_spawned_tasks() {
        // Token minting happens in spawned connection tasks behind a
        // generic codec, so the trait futures must be Send.
        async fn mint<C: TokenCodec>(codec: Arc<C>) -> String {
            tokio::spawn(async move {
                codec.encode_invite("123456").await.unwrap()
            })
            .await
            .unwrap()
        }

        let token = mint(Arc::new(codec())).await;
        let claims = codec().decode_invite(&token).await.unwrap();
        assert_eq!(claims.code, "123456");
    }

    #[tokio::test]
    async fn test_invite_token_round_trips() {
        let codec = codec();

        let token = codec.encode_invite("987654").await.unwrap();
        let claims = codec.decode_invite(&token).await.unwrap();

        assert_eq!(claims.code, "987654");
    }

    #[tokio::test]
    async fn test_tampered_token_is_invalid() {
        let codec = codec();
        let mut token = codec.encode_invite("123456").await.unwrap();
        token.push('x');

        let err = codec.decode_invite(&token).await.unwrap_err();

        assert!(matches!(err, TokenError::Invalid));
    }

    #[tokio::test]
    async fn test_token_from_another_secret_is_invalid() {
        let codec_a = SignedTokenCodec::new(b"secret-a", Duration::from_secs(60));
        let codec_b = SignedTokenCodec::new(b"secret-b", Duration::from_secs(60));

        let token = codec_a
            .encode_player(SessionId::new(), "123456", PlayerId::new())
            .await
            .unwrap();
        let err = codec_b.decode_player(&token).await.unwrap_err();

        assert!(matches!(err, TokenError::Invalid));
    }

    #[tokio::test]
    async fn test_expired_token_reports_expired() {
        let codec = codec();
        // Mint a token whose exp is already in the past, signed with the
        // same secret the codec verifies with.
        let stale = PlayerClaims {
            session: SessionId::new(),
            code: "123456".into(),
            player: PlayerId::new(),
            exp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_secs()
                - 120,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &stale,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let err = codec.decode_player(&token).await.unwrap_err();

        assert!(matches!(err, TokenError::Expired));
    }

    #[tokio::test]
    async fn test_invite_token_does_not_pass_as_player_token() {
        let codec = codec();
        let invite = codec.encode_invite("123456").await.unwrap();

        let err = codec.decode_player(&invite).await.unwrap_err();

        assert!(matches!(err, TokenError::Invalid));
    }

    #[tokio::test]
    async fn test_player_token_does_not_pass_as_invite() {
        // `deny_unknown_fields` on InviteClaims is what rejects the
        // richer player claims here.
        let codec = codec();
        let token = codec
            .encode_player(SessionId::new(), "123456", PlayerId::new())
            .await
            .unwrap();

        let err = codec.decode_invite(&token).await.unwrap_err();

        assert!(matches!(err, TokenError::Invalid));
    }
}
