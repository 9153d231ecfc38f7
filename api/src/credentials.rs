//! Password verification and breach lookups.
//!
//! Both are traits so the pipeline can run against the real user table and a
//! hosted breach index in production, and against in-memory fixtures in
//! tests. Stored passwords are bcrypt hashes (`$2y$` / `$2b$`); the breach
//! corpus keeps SHA-256 digests.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use shared::DependencyError;
use sqlx::PgPool;

const SERVICE: &str = "credential store";

/// bcrypt's minimum work factor; fixtures only.
const FIXTURE_COST: u32 = 4;

/// Verifies the stored password of an authenticated user.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn verify(&self, user_id: i64, candidate: &str) -> Result<bool, DependencyError>;
}

/// Answers whether a password appears in a known breach corpus.
#[async_trait]
pub trait BreachChecker: Send + Sync {
    async fn is_compromised(&self, password: &str) -> Result<bool, DependencyError>;
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Check `candidate` against a bcrypt hash off the async runtime.
///
/// A hash that cannot be parsed is reported as a dependency error, not as a
/// mismatch.
pub async fn verify_bcrypt(candidate: &str, hash: &str) -> Result<bool, DependencyError> {
    let candidate = candidate.to_string();
    let hash = hash.to_string();

    tokio::task::spawn_blocking(move || bcrypt::verify(candidate, &hash))
        .await
        .map_err(|e| DependencyError::unavailable(SERVICE, e.to_string()))?
        .map_err(|e| DependencyError::rejected(SERVICE, format!("unreadable password hash: {e}")))
}

/// Reads `users.password` for the authenticated user.
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn verify(&self, user_id: i64, candidate: &str) -> Result<bool, DependencyError> {
        let stored = sqlx::query_scalar::<_, Option<String>>("SELECT password FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DependencyError::unavailable(SERVICE, e.to_string()))?
            .flatten();

        match stored {
            Some(hash) => verify_bcrypt(candidate, &hash).await,
            None => {
                tracing::debug!(user_id, "no stored password");
                Ok(false)
            }
        }
    }
}

/// Hashes keyed by user id; used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    hashes: Mutex<HashMap<i64, String>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an existing bcrypt hash as-is.
    pub fn insert_hash(&self, user_id: i64, hash: impl Into<String>) {
        self.hashes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, hash.into());
    }

    pub fn set_password(&self, user_id: i64, password: &str) -> Result<(), DependencyError> {
        let hash = bcrypt::hash(password, FIXTURE_COST)
            .map_err(|e| DependencyError::rejected(SERVICE, e.to_string()))?;
        self.insert_hash(user_id, hash);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn verify(&self, user_id: i64, candidate: &str) -> Result<bool, DependencyError> {
        let stored = self
            .hashes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned();

        match stored {
            Some(hash) => verify_bcrypt(candidate, &hash).await,
            None => Ok(false),
        }
    }
}

/// Breach corpus held as SHA-256 hex digests.
#[derive(Debug, Default, Clone)]
pub struct BreachCorpus {
    digests: HashSet<String>,
}

const COMMON_PASSWORDS: &[&str] = &[
    "P@ssw0rd",
    "P@ssword1",
    "Passw0rd!",
    "Password1!",
    "Password123!",
    "Qwerty123!",
    "Welcome1!",
    "Admin@123",
    "Abc@12345",
    "Summer2024!",
];

impl BreachCorpus {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_passwords<I, S>(passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            digests: passwords
                .into_iter()
                .map(|p| sha256_hex(p.as_ref()))
                .collect(),
        }
    }

    /// Small built-in list of widely leaked passwords that still satisfy the
    /// composition rules.
    pub fn with_common_passwords() -> Self {
        Self::from_passwords(COMMON_PASSWORDS)
    }

    /// One lowercase hex SHA-256 digest per line; blank lines and `#`
    /// comments are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse(&contents))
    }

    fn parse(contents: &str) -> Self {
        Self {
            digests: contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_ascii_lowercase)
                .collect(),
        }
    }

    pub fn extend(mut self, other: BreachCorpus) -> Self {
        self.digests.extend(other.digests);
        self
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

#[async_trait]
impl BreachChecker for BreachCorpus {
    async fn is_compromised(&self, password: &str) -> Result<bool, DependencyError> {
        Ok(self.digests.contains(&sha256_hex(password)))
    }
}
