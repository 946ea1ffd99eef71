use crate::{
    model::{Id, user::UserMarker},
    util::PositiveDuration,
};
use argon2::{
    Argon2, Params,
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use base64::{
    DecodeError, Engine,
    display::Base64Display,
    prelude::{BASE64_STANDARD, BASE64_URL_SAFE_NO_PAD},
};
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const AUTH_TOKEN_CORE_LEN: usize = 24;
pub const AUTH_TOKEN_SALT_LEN: usize = 18;
pub const AUTH_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;
pub const PASSWORD_SALT_LEN: usize = 16;
pub const PASSWORD_MIN_LEN: usize = 8;

/// How long a password reset link stays usable.
pub const PASSWORD_RESET_TIMEOUT: Duration = Duration::days(3);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing auth token failed: {0}")]
pub struct AuthTokenHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing password failed: {0}")]
pub struct PasswordHashError(password_hash::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum AuthTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("The user id part was not valid UTF-8")]
    InvalidUserIdEncoding,
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the core part is incorrect")]
    InvalidCoreLength,
    #[error("The length of the salt part is incorrect")]
    InvalidSaltLength,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum PasswordPolicyError {
    #[error("This password is too short. It must contain at least 8 characters.")]
    TooShort,
    #[error("This password is entirely numeric.")]
    EntirelyNumeric,
    #[error("The password is too similar to the username.")]
    SimilarToUsername,
}

/// Checks a new password against the site's password rules.
pub fn validate_password(password: &str, username: &str) -> Result<(), PasswordPolicyError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(PasswordPolicyError::TooShort);
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(PasswordPolicyError::EntirelyNumeric);
    }
    if password.to_lowercase() == username.to_lowercase() {
        return Err(PasswordPolicyError::SimilarToUsername);
    }

    Ok(())
}

/// Argon2 PHC string of a user's password.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct HashedPassword(String);

impl HashedPassword {
    pub fn new(password: &str) -> Result<Self, PasswordHashError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordHashError)?;

        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(PasswordHashError)?;

        Ok(Self(hash.to_string()))
    }

    /// Wraps a PHC string loaded from storage.
    #[must_use]
    pub fn from_phc(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn as_phc(&self) -> &str {
        &self.0
    }

    /// A malformed stored hash never verifies.
    #[must_use]
    pub fn verify(&self, password: &str) -> bool {
        PasswordHash::new(&self.0).is_ok_and(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

/// Session token handed to the browser in the session cookie.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthToken {
    pub user_id: Id<UserMarker>,
    pub core: [u8; AUTH_TOKEN_CORE_LEN],
    pub salt: [u8; AUTH_TOKEN_SALT_LEN],
}

/// Single-use token embedded in a password reset link.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordResetToken {
    pub user_id: Id<UserMarker>,
    pub core: [u8; AUTH_TOKEN_CORE_LEN],
    pub salt: [u8; AUTH_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthTokenHash(pub Box<[u8; AUTH_TOKEN_HASH_LEN]>);

/// A stored login session.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Authentication {
    pub user: Id<UserMarker>,
    pub token_hash: AuthTokenHash,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl Authentication {
    #[must_use]
    pub fn is_expired_at(&self, now: UtcDateTime) -> bool {
        self.expires_after
            .is_some_and(|expires_after| self.created_at + expires_after.get() < now)
    }
}

/// A stored password reset request.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PasswordReset {
    pub user: Id<UserMarker>,
    pub token_hash: AuthTokenHash,
    pub created_at: UtcDateTime,
    pub used: bool,
}

impl PasswordReset {
    #[must_use]
    pub fn is_usable_at(&self, now: UtcDateTime) -> bool {
        !self.used && self.created_at + PASSWORD_RESET_TIMEOUT >= now
    }
}

fn hash_secret(
    core: &[u8; AUTH_TOKEN_CORE_LEN],
    salt: &[u8; AUTH_TOKEN_SALT_LEN],
) -> Result<AuthTokenHash, AuthTokenHashError> {
    let argon2 = Argon2::default();

    let mut hash = Box::new([0; AUTH_TOKEN_HASH_LEN]);
    argon2
        .hash_password_into(core, salt, &mut *hash)
        .map_err(AuthTokenHashError)?;

    Ok(AuthTokenHash(hash))
}

impl AuthToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        let core = rand::random();
        let salt = rand::random();

        Self {
            user_id,
            core,
            salt,
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        let user_id = self.user_id;
        let encoded_core = Base64Display::new(&self.core, &BASE64_STANDARD);
        let encoded_salt = Base64Display::new(&self.salt, &BASE64_STANDARD);

        format!("{user_id}:{encoded_core}:{encoded_salt}")
    }

    pub fn hash(&self) -> Result<AuthTokenHash, AuthTokenHashError> {
        hash_secret(&self.core, &self.salt)
    }
}

impl FromStr for AuthToken {
    type Err = AuthTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');

        let user_id_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let core_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let salt_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;

        let user_id = user_id_part.parse().map_err(Self::Err::InvalidUserId)?;
        let core = BASE64_STANDARD
            .decode(core_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidCoreLength)?;
        let salt = BASE64_STANDARD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self {
            user_id,
            core,
            salt,
        })
    }
}

impl PasswordResetToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        Self {
            user_id,
            core: rand::random(),
            salt: rand::random(),
        }
    }

    /// The `uidb64` and `token` path segments of the reset link.
    #[must_use]
    pub fn as_path_parts(&self) -> (String, String) {
        let uidb64 = BASE64_URL_SAFE_NO_PAD.encode(self.user_id.to_string());

        let mut secret = Vec::with_capacity(AUTH_TOKEN_CORE_LEN + AUTH_TOKEN_SALT_LEN);
        secret.extend_from_slice(&self.core);
        secret.extend_from_slice(&self.salt);

        (uidb64, BASE64_URL_SAFE_NO_PAD.encode(secret))
    }

    pub fn from_path_parts(uidb64: &str, token: &str) -> Result<Self, AuthTokenDecodeError> {
        let user_id_bytes = BASE64_URL_SAFE_NO_PAD.decode(uidb64)?;
        let user_id = std::str::from_utf8(&user_id_bytes)
            .map_err(|_| AuthTokenDecodeError::InvalidUserIdEncoding)?
            .parse()
            .map_err(AuthTokenDecodeError::InvalidUserId)?;

        let secret = BASE64_URL_SAFE_NO_PAD.decode(token)?;
        if secret.len() < AUTH_TOKEN_CORE_LEN {
            return Err(AuthTokenDecodeError::InvalidCoreLength);
        }
        let (core, salt) = secret.split_at(AUTH_TOKEN_CORE_LEN);

        Ok(Self {
            user_id,
            core: core
                .try_into()
                .map_err(|_| AuthTokenDecodeError::InvalidCoreLength)?,
            salt: salt
                .try_into()
                .map_err(|_| AuthTokenDecodeError::InvalidSaltLength)?,
        })
    }

    pub fn hash(&self) -> Result<AuthTokenHash, AuthTokenHashError> {
        hash_secret(&self.core, &self.salt)
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("user_id", &self.user_id)
            .field("core", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for PasswordResetToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordResetToken")
            .field("user_id", &self.user_id)
            .field("core", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for AuthTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthTokenHash").field(&"[redacted]").finish()
    }
}

impl Debug for HashedPassword {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HashedPassword").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The auth token hash had an invalid length")]
pub struct InvalidAuthTokenHashError;

impl TryFrom<Vec<u8>> for AuthTokenHash {
    type Error = InvalidAuthTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let array: [u8; AUTH_TOKEN_HASH_LEN] =
            value.try_into().map_err(|_| InvalidAuthTokenHashError)?;
        Ok(Self(Box::new(array)))
    }
}
