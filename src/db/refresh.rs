//! Refresh session storage.
//!
//! At most one row exists per user (`user_id` is UNIQUE). Access tokens are
//! stateless and never stored here.

use sqlx::sqlite::SqlitePool;

/// A persisted refresh session.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshSession {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    /// Expiry instant (Unix seconds)
    pub expires_at: i64,
}

impl RefreshSession {
    /// A session is dead once `now` reaches its expiry.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Store for managing refresh sessions.
#[derive(Clone)]
pub struct RefreshSessionStore {
    pool: SqlitePool,
}

impl RefreshSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new refresh session. Fails if the user already has one.
    pub async fn create(
        &self,
        user_id: i64,
        token: &str,
        expires_at: i64,
    ) -> Result<i64, sqlx::Error> {
        let result =
            sqlx::query("INSERT INTO refresh_sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
                .bind(token)
                .bind(user_id)
                .bind(expires_at)
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_token(&self, token: &str) -> Result<Option<RefreshSession>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, token, user_id, expires_at FROM refresh_sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_by_user(&self, user_id: i64) -> Result<Option<RefreshSession>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, token, user_id, expires_at FROM refresh_sessions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete every session for a user. Returns 0 when there was none.
    pub async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete a single session. Returns false if it was already gone.
    pub async fn delete(&self, session: &RefreshSession) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE id = ?")
            .bind(session.id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all sessions whose expiry has passed.
    pub async fn delete_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Atomically replace a user's refresh session.
    ///
    /// In one transaction: if `redeemed` is given, that session is deleted and
    /// must still exist; then all of the user's sessions are deleted and the new
    /// one inserted. Returns `Ok(false)` without writing anything when the
    /// redeemed session was already consumed by a concurrent caller.
    pub async fn replace_for_user(
        &self,
        user_id: i64,
        redeemed: Option<&RefreshSession>,
        token: &str,
        expires_at: i64,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if let Some(session) = redeemed {
            let claimed = sqlx::query("DELETE FROM refresh_sessions WHERE id = ? AND token = ?")
                .bind(session.id)
                .bind(&session.token)
                .execute(&mut *tx)
                .await?;
            if claimed.rows_affected() != 1 {
                tx.rollback().await?;
                return Ok(false);
            }
        }

        sqlx::query("DELETE FROM refresh_sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO refresh_sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
