//! SQLite implementation of ScanStore.

use crate::config::StorageConfig;
use crate::domain::{NewOpportunity, Opportunity, OpportunityStatus, Pair, ScanStats, StatusFilter};
use crate::pricing::split_pair_symbol;
use crate::storage::{ScanStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};

const PAIR_COLUMNS: &str = "id, symbol, base_asset, quote_asset, is_active, updated_at";

const OPPORTUNITY_COLUMNS: &str = "id, pair_id, buy_exchange, sell_exchange, buy_price, sell_price, \
     spread, profit_estimate, volume, status, created_at, updated_at, expires_at, executed_at";

const STATS_COLUMNS: &str = "pair_id, total_scans, successful_scans, failed_scans, \
     opportunities_found, average_scan_time, min_price, max_price, avg_price, last_scan_at";

/// SqliteStorage implements ScanStore using SQLite.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

/// SqliteStorageConfig holds SQLite storage configuration.
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            path: "scanner.db".to_string(),
            max_connections: 5,
        }
    }
}

impl From<&StorageConfig> for SqliteStorageConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            path: config.path.clone(),
            max_connections: config.max_connections.max(1),
        }
    }
}

/// Formats timestamps so that string order equals time order.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl SqliteStorage {
    /// Creates a new SQLite storage instance.
    pub async fn new(config: SqliteStorageConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let storage = Self { pool };

        storage.migrate().await?;

        info!(path = %config.path, "SQLite storage initialized");
        Ok(storage)
    }

    /// Runs database migrations to create the schema.
    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL UNIQUE,
                base_asset TEXT NOT NULL,
                quote_asset TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS opportunities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair_id INTEGER NOT NULL REFERENCES pairs(id),
                buy_exchange TEXT NOT NULL,
                sell_exchange TEXT NOT NULL,
                buy_price TEXT NOT NULL,
                sell_price TEXT NOT NULL,
                spread TEXT NOT NULL,
                profit_estimate TEXT NOT NULL,
                volume TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                executed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_opportunities_status_expires ON opportunities(status, expires_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_opportunities_pair ON opportunities(pair_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair_id INTEGER,
                total_scans INTEGER NOT NULL,
                successful_scans INTEGER NOT NULL,
                failed_scans INTEGER NOT NULL,
                opportunities_found INTEGER NOT NULL,
                average_scan_time TEXT NOT NULL,
                min_price TEXT,
                max_price TEXT,
                avg_price TEXT,
                last_scan_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                description TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts the pair if its normalized symbol is unknown and returns it.
    /// An existing pair keeps its active flag.
    pub async fn ensure_pair(&self, symbol: &str) -> Result<Pair, StorageError> {
        let (base, quote) =
            split_pair_symbol(symbol).map_err(|e| StorageError::InvalidData(e.to_string()))?;
        let normalized = format!("{}/{}", base, quote);
        let now = format_timestamp(&Utc::now());

        sqlx::query(
            r#"
            INSERT INTO pairs (symbol, base_asset, quote_asset, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            ON CONFLICT(symbol) DO NOTHING
            "#,
        )
        .bind(&normalized)
        .bind(&base)
        .bind(&quote)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!("SELECT {} FROM pairs WHERE symbol = ?", PAIR_COLUMNS))
            .bind(&normalized)
            .fetch_one(&self.pool)
            .await?;

        parse_pair_row(&row)
    }

    /// Flips the active flag of a pair.
    pub async fn set_pair_active(&self, id: i64, active: bool) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE pairs SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("pair {}", id)));
        }
        Ok(())
    }

    /// Creates or replaces an active setting.
    pub async fn set_setting(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, description, is_active, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                description = COALESCE(excluded.description, settings.description),
                is_active = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        debug!(key = %key, value = %value, "Setting stored");
        Ok(())
    }

    /// Keeps a setting row but hides it from reads.
    pub async fn disable_setting(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE settings SET is_active = 0, updated_at = ? WHERE key = ?")
            .bind(format_timestamp(&Utc::now()))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Opportunities in creation order, optionally for one pair.
    pub async fn list_opportunities(
        &self,
        pair_id: Option<i64>,
    ) -> Result<Vec<Opportunity>, StorageError> {
        let rows = match pair_id {
            Some(pair_id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM opportunities WHERE pair_id = ? ORDER BY id",
                    OPPORTUNITY_COLUMNS
                ))
                .bind(pair_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM opportunities ORDER BY id",
                    OPPORTUNITY_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(parse_opportunity_row).collect()
    }

    /// Scan statistics rows, oldest first.
    pub async fn list_scan_stats(&self) -> Result<Vec<ScanStats>, StorageError> {
        let rows = sqlx::query(&format!("SELECT {} FROM scan_stats ORDER BY id", STATS_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(parse_stats_row).collect()
    }

    #[cfg(test)]
    pub(crate) async fn backdate_opportunity(
        &self,
        id: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE opportunities SET updated_at = ? WHERE id = ?")
            .bind(format_timestamp(&updated_at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn backdate_pair(
        &self,
        id: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE pairs SET updated_at = ? WHERE id = ?")
            .bind(format_timestamp(&updated_at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ScanStore for SqliteStorage {
    async fn find_active_pairs(&self, limit: u32) -> Result<Vec<Pair>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pairs WHERE is_active = 1 ORDER BY updated_at ASC, id ASC LIMIT ?",
            PAIR_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_pair_row).collect()
    }

    async fn find_pair_by_id(&self, id: i64) -> Result<Option<Pair>, StorageError> {
        let row = sqlx::query(&format!("SELECT {} FROM pairs WHERE id = ?", PAIR_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(parse_pair_row).transpose()
    }

    async fn create_opportunity(&self, opp: &NewOpportunity) -> Result<Opportunity, StorageError> {
        let now = Utc::now();
        let expires_at = opp.expires_at.max(now);
        let now_str = format_timestamp(&now);

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO opportunities (
                pair_id, buy_exchange, sell_exchange, buy_price, sell_price,
                spread, profit_estimate, volume, status, created_at, updated_at, expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, ?11)
            "#,
        )
        .bind(opp.pair_id)
        .bind(&opp.buy_exchange)
        .bind(&opp.sell_exchange)
        .bind(opp.buy_price.to_string())
        .bind(opp.sell_price.to_string())
        .bind(opp.spread.to_string())
        .bind(opp.profit_estimate.to_string())
        .bind(opp.volume.to_string())
        .bind(opp.status.as_str())
        .bind(&now_str)
        .bind(format_timestamp(&expires_at))
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        sqlx::query("UPDATE pairs SET updated_at = ? WHERE id = ?")
            .bind(&now_str)
            .bind(opp.pair_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            id,
            pair_id = opp.pair_id,
            buy = %opp.buy_exchange,
            sell = %opp.sell_exchange,
            spread = %opp.spread,
            "Opportunity saved"
        );

        Ok(Opportunity {
            id,
            pair_id: opp.pair_id,
            buy_exchange: opp.buy_exchange.clone(),
            sell_exchange: opp.sell_exchange.clone(),
            buy_price: opp.buy_price,
            sell_price: opp.sell_price,
            spread: opp.spread,
            profit_estimate: opp.profit_estimate,
            volume: opp.volume,
            status: opp.status,
            created_at: now,
            updated_at: now,
            expires_at,
            executed_at: None,
        })
    }

    async fn update_opportunities_status(
        &self,
        filter: &StatusFilter,
        status: OpportunityStatus,
    ) -> Result<u64, StorageError> {
        if filter.statuses.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; filter.statuses.len()].join(", ");
        let mut sql = format!(
            "UPDATE opportunities SET status = ?, updated_at = ? WHERE status IN ({})",
            placeholders
        );

        let mut bounds = Vec::new();
        if filter.expires_at_or_before.is_some() {
            bounds.push("expires_at <= ?");
        }
        if filter.updated_before.is_some() {
            bounds.push("updated_at < ?");
        }
        if !bounds.is_empty() {
            sql.push_str(&format!(" AND ({})", bounds.join(" OR ")));
        }

        let mut query = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(format_timestamp(&Utc::now()));
        for current in &filter.statuses {
            query = query.bind(current.as_str());
        }
        if let Some(bound) = filter.expires_at_or_before {
            query = query.bind(format_timestamp(&bound));
        }
        if let Some(bound) = filter.updated_before {
            query = query.bind(format_timestamp(&bound));
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn create_scan_stats(&self, stats: &ScanStats) -> Result<(), StorageError> {
        sqlx::query(&format!(
            "INSERT INTO scan_stats ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            STATS_COLUMNS
        ))
        .bind(stats.pair_id)
        .bind(i64::from(stats.total_scans))
        .bind(i64::from(stats.successful_scans))
        .bind(i64::from(stats.failed_scans))
        .bind(i64::from(stats.opportunities_found))
        .bind(stats.average_scan_time.to_string())
        .bind(stats.min_price.map(|p| p.to_string()))
        .bind(stats.max_price.map(|p| p.to_string()))
        .bind(stats.avg_price.map(|p| p.to_string()))
        .bind(format_timestamp(&stats.last_scan_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_settings(&self, keys: &[&str]) -> Result<HashMap<String, String>, StorageError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "SELECT key, value FROM settings WHERE is_active = 1 AND key IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for key in keys {
            query = query.bind(*key);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<(String, String), StorageError> {
                Ok((row.try_get("key")?, row.try_get("value")?))
            })
            .collect()
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

fn parse_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, StorageError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn parse_optional_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, StorageError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| {
        Decimal::from_str(&raw)
            .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
    })
    .transpose()
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn parse_timestamp_column(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StorageError> {
    let raw: String = row.try_get(column)?;
    parse_timestamp(&raw, column)
}

fn parse_count(row: &SqliteRow, column: &str) -> Result<u32, StorageError> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|_| StorageError::InvalidData(format!("Invalid {}: {}", column, raw)))
}

/// Parses a pair from a database row.
fn parse_pair_row(row: &SqliteRow) -> Result<Pair, StorageError> {
    Ok(Pair {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        base_asset: row.try_get("base_asset")?,
        quote_asset: row.try_get("quote_asset")?,
        is_active: row.try_get("is_active")?,
        updated_at: parse_timestamp_column(row, "updated_at")?,
    })
}

/// Parses an opportunity from a database row.
fn parse_opportunity_row(row: &SqliteRow) -> Result<Opportunity, StorageError> {
    let status_str: String = row.try_get("status")?;
    let status = OpportunityStatus::from_str(&status_str).map_err(StorageError::InvalidData)?;

    let executed_at: Option<String> = row.try_get("executed_at")?;
    let executed_at = executed_at
        .map(|raw| parse_timestamp(&raw, "executed_at"))
        .transpose()?;

    Ok(Opportunity {
        id: row.try_get("id")?,
        pair_id: row.try_get("pair_id")?,
        buy_exchange: row.try_get("buy_exchange")?,
        sell_exchange: row.try_get("sell_exchange")?,
        buy_price: parse_decimal(row, "buy_price")?,
        sell_price: parse_decimal(row, "sell_price")?,
        spread: parse_decimal(row, "spread")?,
        profit_estimate: parse_decimal(row, "profit_estimate")?,
        volume: parse_decimal(row, "volume")?,
        status,
        created_at: parse_timestamp_column(row, "created_at")?,
        updated_at: parse_timestamp_column(row, "updated_at")?,
        expires_at: parse_timestamp_column(row, "expires_at")?,
        executed_at,
    })
}

/// Parses scan statistics from a database row.
fn parse_stats_row(row: &SqliteRow) -> Result<ScanStats, StorageError> {
    Ok(ScanStats {
        pair_id: row.try_get("pair_id")?,
        total_scans: parse_count(row, "total_scans")?,
        successful_scans: parse_count(row, "successful_scans")?,
        failed_scans: parse_count(row, "failed_scans")?,
        opportunities_found: parse_count(row, "opportunities_found")?,
        average_scan_time: parse_decimal(row, "average_scan_time")?,
        min_price: parse_optional_decimal(row, "min_price")?,
        max_price: parse_optional_decimal(row, "max_price")?,
        avg_price: parse_optional_decimal(row, "avg_price")?,
        last_scan_at: parse_timestamp_column(row, "last_scan_at")?,
    })
}

