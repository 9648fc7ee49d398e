//! Storage abstraction for registration codes.
//!
//! [`CodeStore`] is the seam between the code service and persistence. The
//! PostgreSQL implementation lives in the persistence crate;
//! [`InMemoryCodeStore`] serves tests and local development.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::code::{Code, CodeFilter, CodeRecord, CodeStats, NewCode, SortOrder};
use shared::pagination::Page;

/// Error type for storage operations.
///
/// Duplicate codes and lost redemption races are not errors; they are
/// reported through the `Option` results of [`CodeStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Persistence operations for registration codes.
#[async_trait::async_trait]
pub trait CodeStore: Send + Sync {
    /// Insert a new code.
    ///
    /// Returns `Ok(None)` when the code string is already taken.
    async fn insert(&self, code: &NewCode) -> Result<Option<Code>, StoreError>;

    /// Find a code by its (normalized) code string.
    async fn find_by_code(&self, code: &str) -> Result<Option<Code>, StoreError>;

    /// Find a code by its surrogate id.
    async fn find_by_id(&self, id: i64) -> Result<Option<Code>, StoreError>;

    /// Check whether a code string is already taken.
    async fn code_exists(&self, code: &str) -> Result<bool, StoreError>;

    /// List codes matching `filter`, one page at a time.
    async fn list(&self, filter: &CodeFilter, page: Page) -> Result<Vec<Code>, StoreError>;

    /// Count codes matching `filter`.
    async fn count(&self, filter: &CodeFilter) -> Result<i64, StoreError>;

    /// Aggregate counts over codes matching `filter`, judging expiry at `now`.
    async fn stats(&self, filter: &CodeFilter, now: DateTime<Utc>)
        -> Result<CodeStats, StoreError>;

    /// Record one redemption atomically.
    ///
    /// Only succeeds when the code exists, has uses left and is not expired
    /// at `at`. Returns the updated code, or `Ok(None)` when no row matched.
    async fn redeem(
        &self,
        code: &str,
        redeemer_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Code>, StoreError>;

    /// Delete a code by id. Returns true if a row was deleted.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Delete several codes by id. Returns the number of deleted rows.
    async fn delete_many(&self, ids: &[i64]) -> Result<u64, StoreError>;

    /// Check that the backing store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// In-memory code store.
///
/// Holds every code in insertion order behind a single async mutex, so each
/// operation, redemption included, is atomic with respect to the others.
#[derive(Debug, Default)]
pub struct InMemoryCodeStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    codes: Vec<Code>,
}

impl InMemoryCodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored codes.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.codes.len()
    }

    /// Check if the store holds no codes.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.codes.is_empty()
    }

    /// Insert a fully specified row, bypassing generation.
    ///
    /// Lets tests seed codes with arbitrary usage or expiry state.
    pub async fn seed(&self, record: CodeRecord) -> Code {
        let mut inner = self.inner.lock().await;
        inner.next_id = inner.next_id.max(record.id);
        let code = Code::from(record);
        inner.codes.push(code.clone());
        code
    }

    fn filtered<'a>(codes: &'a [Code], filter: &'a CodeFilter) -> impl Iterator<Item = &'a Code> {
        codes.iter().filter(move |c| filter.matches(c))
    }
}

#[async_trait::async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn insert(&self, new_code: &NewCode) -> Result<Option<Code>, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.codes.iter().any(|c| c.code == new_code.code) {
            return Ok(None);
        }

        inner.next_id += 1;
        let code = Code::from(CodeRecord {
            id: inner.next_id,
            code: new_code.code.clone(),
            role: new_code.role.clone(),
            group_name: new_code.group_name.clone(),
            course_id: new_code.course_id,
            max_uses: new_code.max_uses,
            used_count: 0,
            is_used: false,
            used_by: None,
            used_at: None,
            expiry_date: new_code.expiry_date,
            created_by: new_code.created_by,
            created_at: Utc::now(),
        });
        inner.codes.push(code.clone());
        Ok(Some(code))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Code>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.codes.iter().find(|c| c.code == code).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Code>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.codes.iter().find(|c| c.id == id).cloned())
    }

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.codes.iter().any(|c| c.code == code))
    }

    async fn list(&self, filter: &CodeFilter, page: Page) -> Result<Vec<Code>, StoreError> {
        let inner = self.inner.lock().await;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);

        let mut matching: Vec<&Code> = Self::filtered(&inner.codes, filter).collect();
        if filter.order == SortOrder::Newest {
            matching.reverse();
        }

        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &CodeFilter) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(Self::filtered(&inner.codes, filter).count() as i64)
    }

    async fn stats(
        &self,
        filter: &CodeFilter,
        now: DateTime<Utc>,
    ) -> Result<CodeStats, StoreError> {
        let inner = self.inner.lock().await;
        let mut stats = CodeStats::default();
        for code in Self::filtered(&inner.codes, filter) {
            stats.total += 1;
            stats.redemptions += i64::from(code.used_count);
            if code.is_used {
                stats.used += 1;
            } else {
                stats.unused += 1;
                if code.is_expired_at(now) {
                    stats.expired += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn redeem(
        &self,
        code: &str,
        redeemer_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Code>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.codes.iter_mut().find(|c| c.code == code) else {
            return Ok(None);
        };
        if !stored.is_redeemable_at(at) {
            return Ok(None);
        }
        stored.apply_redemption(redeemer_id, at);
        Ok(Some(stored.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.codes.len();
        inner.codes.retain(|c| c.id != id);
        Ok(inner.codes.len() < before)
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.codes.len();
        inner.codes.retain(|c| !ids.contains(&c.id));
        Ok((before - inner.codes.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_code(code: &str, group: Option<&str>) -> NewCode {
        NewCode {
            code: code.to_string(),
            role: "subscriber".to_string(),
            group_name: group.map(str::to_string),
            course_id: None,
            max_uses: 1,
            expiry_date: None,
            created_by: Some(1),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_code() {
        let store = InMemoryCodeStore::new();
        assert!(store.insert(&new_code("AAAA2222", None)).await.unwrap().is_some());
        assert!(store.insert(&new_code("AAAA2222", None)).await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = InMemoryCodeStore::new();
        let a = store.insert(&new_code("AAAA2222", None)).await.unwrap().unwrap();
        let b = store.insert(&new_code("BBBB2222", None)).await.unwrap().unwrap();
        assert!(b.id() > a.id());
        assert_eq!(a.used_count(), 0);
        assert!(!a.is_used());
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_by_default() {
        let store = InMemoryCodeStore::new();
        for code in ["AAAA2222", "BBBB2222", "CCCC2222"] {
            store.insert(&new_code(code, None)).await.unwrap();
        }

        let newest = store.list(&CodeFilter::default(), Page::all(10)).await.unwrap();
        let names: Vec<&str> = newest.iter().map(Code::code).collect();
        assert_eq!(names, vec!["CCCC2222", "BBBB2222", "AAAA2222"]);

        let oldest_filter = CodeFilter {
            order: SortOrder::Oldest,
            ..CodeFilter::default()
        };
        let oldest = store.list(&oldest_filter, Page::all(10)).await.unwrap();
        assert_eq!(oldest[0].code(), "AAAA2222");
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let store = InMemoryCodeStore::new();
        for i in 0..5 {
            store.insert(&new_code(&format!("CODE{i}XYZ"), None)).await.unwrap();
        }
        let page = Page { page: 2, per_page: 2 };
        let codes = store.list(&CodeFilter::default(), page).await.unwrap();
        let names: Vec<&str> = codes.iter().map(Code::code).collect();
        assert_eq!(names, vec!["CODE2XYZ", "CODE1XYZ"]);
    }

    #[tokio::test]
    async fn test_redeem_respects_max_uses_and_expiry() {
        let store = InMemoryCodeStore::new();
        store.insert(&new_code("AAAA2222", None)).await.unwrap();

        let now = Utc::now();
        assert!(store.redeem("AAAA2222", 5, now).await.unwrap().is_some());
        assert!(store.redeem("AAAA2222", 6, now).await.unwrap().is_none());
        assert!(store.redeem("MISSING1", 6, now).await.unwrap().is_none());

        let mut expiring = new_code("EXPI2222", None);
        expiring.expiry_date = Some(now - Duration::minutes(1));
        store.insert(&expiring).await.unwrap();
        assert!(store.redeem("EXPI2222", 5, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_counts_expired_unused() {
        let store = InMemoryCodeStore::new();
        let now = Utc::now();
        store.insert(&new_code("AAAA2222", Some("7B"))).await.unwrap();
        let mut expired = new_code("BBBB2222", Some("7B"));
        expired.expiry_date = Some(now - Duration::days(2));
        store.insert(&expired).await.unwrap();
        store.insert(&new_code("CCCC2222", Some("8A"))).await.unwrap();
        store.redeem("AAAA2222", 9, now).await.unwrap();

        let stats = store.stats(&CodeFilter::by_group("7B"), now).await.unwrap();
        assert_eq!(
            stats,
            CodeStats {
                total: 2,
                used: 1,
                unused: 1,
                expired: 1,
                redemptions: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_delete_and_delete_many() {
        let store = InMemoryCodeStore::new();
        let a = store.insert(&new_code("AAAA2222", None)).await.unwrap().unwrap();
        let b = store.insert(&new_code("BBBB2222", None)).await.unwrap().unwrap();
        let c = store.insert(&new_code("CCCC2222", None)).await.unwrap().unwrap();

        assert!(store.delete(a.id()).await.unwrap());
        assert!(!store.delete(a.id()).await.unwrap());
        assert_eq!(store.delete_many(&[b.id(), c.id(), 999]).await.unwrap(), 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_seed_keeps_ids_ahead() {
        let store = InMemoryCodeStore::new();
        store
            .seed(CodeRecord {
                id: 40,
                code: "SEED2222".to_string(),
                role: "subscriber".to_string(),
                group_name: None,
                course_id: None,
                max_uses: 1,
                used_count: 1,
                is_used: true,
                used_by: Some(3),
                used_at: Some(Utc::now()),
                expiry_date: None,
                created_by: None,
                created_at: Utc::now(),
            })
            .await;
        let next = store.insert(&new_code("NEXT2222", None)).await.unwrap().unwrap();
        assert_eq!(next.id(), 41);
    }
}
