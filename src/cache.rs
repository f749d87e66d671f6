//! DNS response cache with TTL-based expiration.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::{DNSClass, Name, RecordType};
use rustc_hash::FxHashMap;
use tokio::time::Instant;

use crate::error::{ForwardError, Result};

/// A store of previously obtained answers.
///
/// `get` returns `Ok(None)` on a miss. Backings other than [`MemoryCache`]
/// may fail; the resolver treats any error as a miss.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Offer a fresh upstream answer for admission.
    async fn add(&self, answer: &Message) -> Result<()>;

    /// Look up a live answer for `query`.
    async fn get(&self, query: &Message) -> Result<Option<Message>>;
}

/// Cache key: lower-cased name, record type and class of the question.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    name: Name,
    record_type: RecordType,
    dns_class: DNSClass,
}

impl CacheKey {
    fn of(message: &Message) -> Option<Self> {
        let question = message.queries().first()?;
        Some(Self {
            name: question.name().to_lowercase(),
            record_type: question.query_type(),
            dns_class: question.query_class(),
        })
    }
}

struct CacheEntry {
    answer: Message,
    expires_at: Instant,
}

/// In-memory cache of A/IN answers.
///
/// Entries are never evicted: an expired entry is skipped on read and stays
/// in the map until the same question is answered again.
pub struct MemoryCache {
    entries: RwLock<FxHashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn add(&self, answer: &Message) -> Result<()> {
        let Some(key) = CacheKey::of(answer) else {
            return Ok(());
        };
        if key.record_type != RecordType::A || key.dns_class != DNSClass::IN {
            return Ok(());
        }
        // Expiry comes from the first answer record only.
        let Some(first) = answer.answers().first() else {
            return Ok(());
        };

        let expires_at = Instant::now() + Duration::from_secs(u64::from(first.ttl()));

        let mut entries = self
            .entries
            .write()
            .map_err(|_| ForwardError::backend("cache lock poisoned"))?;
        entries.insert(
            key,
            CacheEntry {
                answer: answer.clone(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn get(&self, query: &Message) -> Result<Option<Message>> {
        let Some(key) = CacheKey::of(query) else {
            return Ok(None);
        };
        let now = Instant::now();

        let entries = self
            .entries
            .read()
            .map_err(|_| ForwardError::backend("cache lock poisoned"))?;

        Ok(entries
            .get(&key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.answer.clone()))
    }
}
