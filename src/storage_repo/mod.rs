// SQLite persistence for finalized indicators. One table per kind and granularity,
// keyed by indicator id; saves are read-merge-write so late records converge.

pub mod retention;
pub mod writer;

use crate::indicator::{ColumnValue, Downsampling, Indicator, IndicatorKind, IndicatorRecord, Row};
use sqlx::Row as _;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub const ID: &str = "id";

/// `{index}_{granularity}`, e.g. `instance_memory_hour`.
pub fn table_name(kind: IndicatorKind, downsampling: Downsampling) -> String {
    format!("{}_{}", kind.index_name(), downsampling.as_str())
}

pub struct IndicatorRepo {
    pool: SqlitePool,
}

impl IndicatorRepo {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        for kind in IndicatorKind::ALL {
            for downsampling in Downsampling::ALL {
                let table = table_name(kind, downsampling);
                let mut columns = vec![format!("{ID} TEXT PRIMARY KEY")];
                columns.extend(
                    kind.columns()
                        .iter()
                        .map(|c| format!("{} {} NOT NULL", c.name, c.column_type.sql_type())),
                );
                sqlx::query(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} ({})",
                    columns.join(", ")
                ))
                .execute(&self.pool)
                .await?;
                sqlx::query(&format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_time_bucket ON {table}(time_bucket)"
                ))
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Merges every record into its stored row in one transaction. Records sharing an
    /// id within the batch are merged in order.
    #[instrument(skip(self, records), fields(repo = "indicator", operation = "merge_and_save", records_count = records.len()))]
    pub async fn merge_and_save(&self, records: &[IndicatorRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            match record {
                IndicatorRecord::ServiceCallRelation(i) => merge_one(&mut *tx, i).await?,
                IndicatorRecord::InstanceMemory(i) => merge_one(&mut *tx, i).await?,
                IndicatorRecord::InstanceGcCount(i) => merge_one(&mut *tx, i).await?,
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Stored indicator for `id` at `downsampling`, if any.
    #[instrument(skip(self), fields(repo = "indicator", operation = "load"))]
    pub async fn load<I: Indicator>(
        &self,
        downsampling: Downsampling,
        id: &str,
    ) -> anyhow::Result<Option<I>> {
        let mut conn = self.pool.acquire().await?;
        let Some(row) = fetch_row(&mut *conn, I::KIND, downsampling, id).await? else {
            return Ok(None);
        };
        Ok(Some(I::from_row(&row)?))
    }

    /// Most recent rows by time bucket, returned oldest first with the id included.
    #[instrument(skip(self), fields(repo = "indicator", operation = "recent_rows"))]
    pub async fn recent_rows(
        &self,
        kind: IndicatorKind,
        downsampling: Downsampling,
        limit: u32,
    ) -> anyhow::Result<Vec<Row>> {
        let table = table_name(kind, downsampling);
        let rows = sqlx::query(&format!(
            "SELECT * FROM {table} ORDER BY time_bucket DESC, {ID} DESC LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut decoded = decode_row(kind, row)?;
            decoded.insert(ID.to_string(), ColumnValue::Text(row.try_get(ID)?));
            out.push(decoded);
        }
        out.reverse();
        Ok(out)
    }

    /// Deletes rows of every kind at `downsampling` whose bucket is before `cutoff_bucket`.
    #[instrument(skip(self), fields(repo = "indicator", operation = "prune"))]
    pub async fn prune(&self, downsampling: Downsampling, cutoff_bucket: i64) -> anyhow::Result<u64> {
        let mut deleted = 0;
        for kind in IndicatorKind::ALL {
            let table = table_name(kind, downsampling);
            deleted += sqlx::query(&format!("DELETE FROM {table} WHERE time_bucket < $1"))
                .bind(cutoff_bucket)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        Ok(deleted)
    }

    pub async fn count(&self, kind: IndicatorKind, downsampling: Downsampling) -> anyhow::Result<i64> {
        let table = table_name(kind, downsampling);
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    #[instrument(skip(self), fields(repo = "indicator", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

async fn merge_one<I: Indicator>(conn: &mut SqliteConnection, incoming: &I) -> anyhow::Result<()> {
    let downsampling = incoming.time_bucket().downsampling();
    let id = incoming.id();
    let merged = match fetch_row(conn, I::KIND, downsampling, &id).await? {
        Some(row) => {
            let mut stored = I::from_row(&row)?;
            stored.combine(incoming);
            stored.calculate();
            stored
        }
        None => incoming.clone(),
    };

    let row = merged.to_row();
    let table = table_name(I::KIND, downsampling);
    let names: Vec<&str> = row.keys().map(String::as_str).collect();
    let placeholders: Vec<String> = (1..=names.len() + 1).map(|n| format!("${n}")).collect();
    let sql = format!(
        "INSERT OR REPLACE INTO {table} ({ID}, {}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    );
    let mut query = sqlx::query(&sql).bind(id);
    for value in row.values() {
        query = match value {
            ColumnValue::Int(v) => query.bind(i64::from(*v)),
            ColumnValue::Long(v) => query.bind(*v),
            ColumnValue::Text(v) => query.bind(v.clone()),
        };
    }
    query.execute(&mut *conn).await?;
    Ok(())
}

async fn fetch_row(
    conn: &mut SqliteConnection,
    kind: IndicatorKind,
    downsampling: Downsampling,
    id: &str,
) -> anyhow::Result<Option<Row>> {
    let table = table_name(kind, downsampling);
    let row = sqlx::query(&format!("SELECT * FROM {table} WHERE {ID} = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| decode_row(kind, &r)).transpose()
}

fn decode_row(kind: IndicatorKind, row: &SqliteRow) -> anyhow::Result<Row> {
    let mut out = Row::new();
    for column in kind.columns() {
        // SQLite hands back every INTEGER as i64; kinds narrow on from_row.
        let value = ColumnValue::Long(row.try_get(column.name)?);
        out.insert(column.name.to_string(), value);
    }
    Ok(out)
}
