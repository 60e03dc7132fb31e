//! SQLite storage for the whitelist and blacklist.

use super::DbError;
use crate::security::ip_lists::{ListKind, RangeStorage};
use crate::security::ip_range::{IpRange, format_address, parse_address};
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Repository for range list rows.
#[derive(Clone)]
pub struct RangeRepository {
    pool: SqlitePool,
}

impl RangeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Rebuild a range from a stored `(ip, mask)` pair.
    fn from_row(ip: &str, mask: i64) -> Result<IpRange, DbError> {
        let corrupt = || DbError::Internal(format!("corrupt range row: {ip}/{mask}"));
        let addr = parse_address(ip).map_err(|_| corrupt())?;
        let prefix_len = u8::try_from(mask).map_err(|_| corrupt())?;
        IpRange::compute(addr, prefix_len).map_err(|_| corrupt())
    }
}

#[async_trait]
impl RangeStorage for RangeRepository {
    async fn add(&self, kind: ListKind, range: &IpRange) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        let ip = format_address(range.base());

        // Delete then insert so a replaced entry moves to the end of the listing.
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DELETE FROM {} WHERE ip = ?", kind.name()))
            .bind(&ip)
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (ip, mask, ip_from, ip_to, added_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
            kind.name()
        ))
        .bind(&ip)
        .bind(i64::from(range.prefix_len()))
        .bind(i64::from(range.from()))
        .bind(i64::from(range.to()))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, kind: ListKind, base: u32) -> Result<bool, DbError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE ip = ?", kind.name()))
            .bind(format_address(base))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn contains(&self, kind: ListKind, addr: u32) -> Result<bool, DbError> {
        let hit: i64 = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE ip_from <= ? AND ip_to >= ?)",
            kind.name()
        ))
        .bind(i64::from(addr))
        .bind(i64::from(addr))
        .fetch_one(&self.pool)
        .await?;

        Ok(hit != 0)
    }

    async fn list(&self, kind: ListKind) -> Result<Vec<IpRange>, DbError> {
        let rows = sqlx::query_as::<_, (String, i64)>(&format!(
            "SELECT ip, mask FROM {} ORDER BY rowid",
            kind.name()
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|(ip, mask)| Self::from_row(ip, *mask))
            .collect()
    }

    async fn close(&self) -> Result<(), DbError> {
        self.pool.close().await;
        Ok(())
    }
}
