//! Access-token claim decoding and expiry evaluation.
//!
//! The client never holds the signing key, so the payload segment is decoded without
//! verifying the signature. Only `exp` is read; the backend stays the authority on whether
//! a token is actually valid.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserializer, de::Error as _};
// self
use crate::_prelude::*;

/// Errors raised while decoding an access token's claims.
#[derive(Debug, ThisError)]
pub enum ClaimsError {
	/// Token is not made of `header.payload.signature` segments.
	#[error("Access token has {segments} segment(s); expected 3.")]
	Malformed {
		/// Number of `.`-separated segments observed.
		segments: usize,
	},
	/// Payload segment is not valid unpadded base64url.
	#[error("Access token payload is not valid base64url.")]
	Encoding(#[from] base64::DecodeError),
	/// Payload segment is not a JSON object carrying a numeric `exp`.
	#[error("Access token payload is not a valid claim set.")]
	Payload(#[from] serde_json::Error),
}

/// Claims read from an access token payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
	/// Expiry as seconds since the Unix epoch.
	#[serde(deserialize_with = "numeric_date")]
	pub exp: i64,
}
impl AccessClaims {
	/// Decodes the claims carried by `token`.
	pub fn decode(token: &str) -> Result<Self, ClaimsError> {
		let segments = token.split('.').collect::<Vec<_>>();

		if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
			return Err(ClaimsError::Malformed { segments: segments.len() });
		}

		let payload = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;

		Ok(serde_json::from_slice(&payload)?)
	}

	/// Returns the expiry instant.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		OffsetDateTime::from_unix_timestamp(self.exp).ok()
	}

	/// Returns `true` once `exp` is strictly before `now + margin`, compared in whole seconds.
	pub fn is_expired_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		let threshold = now.unix_timestamp().saturating_add(margin.whole_seconds().max(0));

		self.exp < threshold
	}
}

/// Evaluates `token` for expiry; tokens whose claims cannot be decoded count as expired.
pub fn is_token_expired(token: &str, now: OffsetDateTime, margin: Duration) -> bool {
	match AccessClaims::decode(token) {
		Ok(claims) => claims.is_expired_at(now, margin),
		Err(_e) => {
			#[cfg(feature = "tracing")]
			tracing::debug!(error = %_e, "Access token claims are unreadable; treating as expired.");

			true
		},
	}
}

fn numeric_date<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
	D: Deserializer<'de>,
{
	let value = f64::deserialize(deserializer)?;

	if !value.is_finite() {
		return Err(D::Error::custom("exp must be a finite number"));
	}

	Ok(value.floor() as i64)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn token_with_payload(payload: &str) -> String {
		format!(
			"{}.{}.signature",
			URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
			URL_SAFE_NO_PAD.encode(payload)
		)
	}

	#[test]
	fn decode_reads_exp_claim() {
		let token = token_with_payload(r#"{"token_type":"access","exp":1735689600,"user_id":7}"#);
		let claims = AccessClaims::decode(&token).expect("Well-formed token should decode.");

		assert_eq!(claims.exp, 1_735_689_600);
		assert_eq!(claims.expires_at(), Some(macros::datetime!(2025-01-01 00:00 UTC)));
	}

	#[test]
	fn decode_floors_fractional_exp() {
		let token = token_with_payload(r#"{"exp":1735689600.9}"#);
		let claims = AccessClaims::decode(&token).expect("Fractional exp should decode.");

		assert_eq!(claims.exp, 1_735_689_600);
	}

	#[test]
	fn decode_rejects_malformed_tokens() {
		assert!(matches!(
			AccessClaims::decode("not-a-token"),
			Err(ClaimsError::Malformed { segments: 1 })
		));
		assert!(matches!(AccessClaims::decode("a.!!!.c"), Err(ClaimsError::Encoding(_))));
		assert!(matches!(
			AccessClaims::decode(&token_with_payload(r#"{"sub":"alice"}"#)),
			Err(ClaimsError::Payload(_))
		));
	}

	#[test]
	fn expiry_comparison_is_strict() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let claims = AccessClaims { exp: now.unix_timestamp() };

		assert!(!claims.is_expired_at(now, Duration::ZERO));
		assert!(claims.is_expired_at(now + Duration::seconds(1), Duration::ZERO));
		assert!(claims.is_expired_at(now, Duration::seconds(1)));
		assert!(!claims.is_expired_at(now, Duration::seconds(-30)));
	}

	#[test]
	fn unreadable_tokens_count_as_expired() {
		let now = OffsetDateTime::now_utc();
		let fresh = token_with_payload(&format!(r#"{{"exp":{}}}"#, now.unix_timestamp() + 600));

		assert!(!is_token_expired(&fresh, now, Duration::ZERO));
		assert!(is_token_expired("garbage", now, Duration::ZERO));
	}
}
