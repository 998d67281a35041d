use std::{str::FromStr, time::Duration};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    QueryBuilder, Sqlite, SqlitePool,
};
use thiserror::Error;

use kasir_core::types::{
    CashierReport, CashierReportInput, NoteCategory, NoteCategoryInput, Transaction,
    TransactionFilter, TransactionInput, TransactionStatus, UnknownStatus,
};
use kasir_core::widgets::{StatusTotals, TransactionStats};

const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
/// Raised instead of 787 when a foreign key declares `ON DELETE RESTRICT`.
const SQLITE_CONSTRAINT_TRIGGER: &str = "1811";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    ///
    /// Pragmas are part of the connect options so every pooled connection
    /// gets them, not only the first one.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(5000));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for note categories.
    pub fn note_categories(&self) -> NoteCategoryRepository {
        NoteCategoryRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for cashier reports.
    pub fn cashier_reports(&self) -> CashierReportRepository {
        CashierReportRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for transactions.
    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Page window requested by a list screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: u32 = 10;
    pub const MIN_PER_PAGE: u32 = 5;
    pub const MAX_PER_PAGE: u32 = 100;

    /// Builds a request from raw query values, clamping them into range.
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(Self::MIN_PER_PAGE, Self::MAX_PER_PAGE),
        }
    }

    fn limit(self) -> i64 {
        i64::from(self.per_page)
    }

    fn offset(self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of records plus the figures needed to render pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Paginated<T> {
    fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total: total.max(0) as u64,
            page: request.page,
            per_page: request.per_page,
        }
    }

    /// Last page number; an empty result still has page 1.
    pub fn last_page(&self) -> u32 {
        let per_page = u64::from(self.per_page.max(1));
        self.total.div_ceil(per_page).max(1) as u32
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Repository for `kategori_catatan`.
#[derive(Clone)]
pub struct NoteCategoryRepository {
    pool: SqlitePool,
}

impl NoteCategoryRepository {
    /// Lists categories newest first.
    pub async fn list(
        &self,
        request: PageRequest,
    ) -> Result<Paginated<NoteCategory>, NoteCategoryError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kategori_catatan")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, NoteCategoryRow>(
            "SELECT id, name, description, created_at, updated_at \
             FROM kategori_catatan ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated::new(
            rows.into_iter().map(NoteCategoryRow::into_domain).collect(),
            total,
            request,
        ))
    }

    /// Returns `(id, name)` pairs ordered by name, used to fill relation selects.
    pub async fn options(&self) -> Result<Vec<(i64, String)>, NoteCategoryError> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, name FROM kategori_catatan ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find(&self, id: i64) -> Result<NoteCategory, NoteCategoryError> {
        sqlx::query_as::<_, NoteCategoryRow>(
            "SELECT id, name, description, created_at, updated_at \
             FROM kategori_catatan WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(NoteCategoryRow::into_domain)
        .ok_or(NoteCategoryError::NotFound)
    }

    pub async fn create(
        &self,
        input: &NoteCategoryInput,
        now: DateTime<Utc>,
    ) -> Result<NoteCategory, NoteCategoryError> {
        let timestamp = to_rfc3339(now);
        let row = sqlx::query_as::<_, NoteCategoryRow>(
            "INSERT INTO kategori_catatan (name, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?) \
             RETURNING id, name, description, created_at, updated_at",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(NoteCategoryError::from_write)?;

        Ok(row.into_domain())
    }

    pub async fn update(
        &self,
        id: i64,
        input: &NoteCategoryInput,
        now: DateTime<Utc>,
    ) -> Result<NoteCategory, NoteCategoryError> {
        sqlx::query_as::<_, NoteCategoryRow>(
            "UPDATE kategori_catatan \
             SET name = ?, description = ?, updated_at = ? \
             WHERE id = ? \
             RETURNING id, name, description, created_at, updated_at",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(to_rfc3339(now))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(NoteCategoryError::from_write)?
        .map(NoteCategoryRow::into_domain)
        .ok_or(NoteCategoryError::NotFound)
    }

    /// Deletes a category. Categories still referenced by reports are kept.
    pub async fn delete(&self, id: i64) -> Result<(), NoteCategoryError> {
        let result = sqlx::query("DELETE FROM kategori_catatan WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(NoteCategoryError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(NoteCategoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NoteCategoryRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NoteCategoryRow {
    fn into_domain(self) -> NoteCategory {
        NoteCategory {
            id: self.id,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Errors that can occur while working with note categories.
#[derive(Debug, Error)]
pub enum NoteCategoryError {
    #[error("note category not found")]
    NotFound,
    #[error("a note category with the same name already exists")]
    DuplicateName,
    #[error("note category is still referenced by cashier reports")]
    InUse,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl NoteCategoryError {
    fn from_write(err: sqlx::Error) -> Self {
        match constraint_code(&err).as_deref() {
            Some(SQLITE_CONSTRAINT_UNIQUE) => Self::DuplicateName,
            Some(SQLITE_CONSTRAINT_FOREIGNKEY | SQLITE_CONSTRAINT_TRIGGER) => Self::InUse,
            _ => Self::Database(err),
        }
    }
}

impl From<sqlx::Error> for NoteCategoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

/// Repository for `laporan_kasir`.
#[derive(Clone)]
pub struct CashierReportRepository {
    pool: SqlitePool,
}

const REPORT_COLUMNS: &str = "r.id, r.kategori_catatan_id, r.report_date, r.description, \
     r.amount, r.created_at, r.updated_at, k.name AS category_name";

impl CashierReportRepository {
    /// Lists reports ordered by report date then id, newest first, joined
    /// with their category name.
    pub async fn list(
        &self,
        request: PageRequest,
    ) -> Result<Paginated<CashierReportWithCategory>, CashierReportError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM laporan_kasir")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, CashierReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} \
               FROM laporan_kasir AS r \
               JOIN kategori_catatan AS k ON k.id = r.kategori_catatan_id \
              ORDER BY r.report_date DESC, r.id DESC \
              LIMIT ? OFFSET ?"
        ))
        .bind(request.limit())
        .bind(request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated::new(
            rows.into_iter().map(CashierReportRow::into_domain).collect(),
            total,
            request,
        ))
    }

    pub async fn find(&self, id: i64) -> Result<CashierReportWithCategory, CashierReportError> {
        sqlx::query_as::<_, CashierReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} \
               FROM laporan_kasir AS r \
               JOIN kategori_catatan AS k ON k.id = r.kategori_catatan_id \
              WHERE r.id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(CashierReportRow::into_domain)
        .ok_or(CashierReportError::NotFound)
    }

    pub async fn create(
        &self,
        input: &CashierReportInput,
        now: DateTime<Utc>,
    ) -> Result<CashierReport, CashierReportError> {
        let timestamp = to_rfc3339(now);
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO laporan_kasir \
             (kategori_catatan_id, report_date, description, amount, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(input.note_category_id)
        .bind(input.report_date)
        .bind(&input.description)
        .bind(input.amount)
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(CashierReportError::from_write)?;

        self.find(id).await.map(|(report, _)| report)
    }

    pub async fn update(
        &self,
        id: i64,
        input: &CashierReportInput,
        now: DateTime<Utc>,
    ) -> Result<CashierReport, CashierReportError> {
        let result = sqlx::query(
            "UPDATE laporan_kasir \
             SET kategori_catatan_id = ?, report_date = ?, description = ?, amount = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(input.note_category_id)
        .bind(input.report_date)
        .bind(&input.description)
        .bind(input.amount)
        .bind(to_rfc3339(now))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(CashierReportError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(CashierReportError::NotFound);
        }
        self.find(id).await.map(|(report, _)| report)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CashierReportError> {
        let result = sqlx::query("DELETE FROM laporan_kasir WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CashierReportError::NotFound);
        }
        Ok(())
    }
}

/// A cashier report paired with the name of its category.
pub type CashierReportWithCategory = (CashierReport, String);

#[derive(Debug, sqlx::FromRow)]
struct CashierReportRow {
    id: i64,
    kategori_catatan_id: i64,
    report_date: NaiveDate,
    description: String,
    amount: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    category_name: String,
}

impl CashierReportRow {
    fn into_domain(self) -> CashierReportWithCategory {
        (
            CashierReport {
                id: self.id,
                note_category_id: self.kategori_catatan_id,
                report_date: self.report_date,
                description: self.description,
                amount: self.amount,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            self.category_name,
        )
    }
}

/// Errors that can occur while working with cashier reports.
#[derive(Debug, Error)]
pub enum CashierReportError {
    #[error("cashier report not found")]
    NotFound,
    #[error("referenced note category does not exist")]
    MissingCategory,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl CashierReportError {
    fn from_write(err: sqlx::Error) -> Self {
        match constraint_code(&err).as_deref() {
            Some(SQLITE_CONSTRAINT_FOREIGNKEY) => Self::MissingCategory,
            _ => Self::Database(err),
        }
    }
}

impl From<sqlx::Error> for CashierReportError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

/// Repository for `transaksi`.
#[derive(Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Lists transactions matching `filter`, newest first.
    pub async fn list(
        &self,
        filter: TransactionFilter,
        request: PageRequest,
    ) -> Result<Paginated<Transaction>, TransactionError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM transaksi");
        push_filter(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT id, code, customer_name, total, status, created_at, updated_at FROM transaksi",
        );
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(request.limit())
            .push(" OFFSET ")
            .push_bind(request.offset());

        let rows = select
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(TransactionRow::into_domain)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated::new(items, total, request))
    }

    pub async fn find(&self, id: i64) -> Result<Transaction, TransactionError> {
        sqlx::query_as::<_, TransactionRow>(
            "SELECT id, code, customer_name, total, status, created_at, updated_at \
             FROM transaksi WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TransactionError::NotFound)?
        .into_domain()
    }

    pub async fn create(
        &self,
        input: &TransactionInput,
        now: DateTime<Utc>,
    ) -> Result<Transaction, TransactionError> {
        let timestamp = to_rfc3339(now);
        sqlx::query_as::<_, TransactionRow>(
            "INSERT INTO transaksi (code, customer_name, total, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id, code, customer_name, total, status, created_at, updated_at",
        )
        .bind(&input.code)
        .bind(&input.customer_name)
        .bind(input.total)
        .bind(input.status.as_str())
        .bind(&timestamp)
        .bind(&timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(TransactionError::from_write)?
        .into_domain()
    }

    pub async fn update(
        &self,
        id: i64,
        input: &TransactionInput,
        now: DateTime<Utc>,
    ) -> Result<Transaction, TransactionError> {
        sqlx::query_as::<_, TransactionRow>(
            "UPDATE transaksi \
             SET code = ?, customer_name = ?, total = ?, status = ?, updated_at = ? \
             WHERE id = ? \
             RETURNING id, code, customer_name, total, status, created_at, updated_at",
        )
        .bind(&input.code)
        .bind(&input.customer_name)
        .bind(input.total)
        .bind(input.status.as_str())
        .bind(to_rfc3339(now))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(TransactionError::from_write)?
        .ok_or(TransactionError::NotFound)?
        .into_domain()
    }

    pub async fn delete(&self, id: i64) -> Result<(), TransactionError> {
        let result = sqlx::query("DELETE FROM transaksi WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(TransactionError::NotFound);
        }
        Ok(())
    }

    /// Aggregates counts and amounts per status for the stats widget.
    pub async fn stats(&self) -> Result<TransactionStats, TransactionError> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT status, COUNT(*) AS count, COALESCE(SUM(total), 0) AS amount \
             FROM transaksi GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let totals = rows
            .into_iter()
            .map(|(status, count, amount)| {
                Ok(StatusTotals {
                    status: status.parse()?,
                    count: count.max(0) as u64,
                    amount,
                })
            })
            .collect::<Result<Vec<_>, UnknownStatus>>()?;
        Ok(TransactionStats::from_totals(totals))
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: TransactionFilter) {
    if let Some(status) = filter.status {
        builder.push(" WHERE status = ").push_bind(status.as_str());
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    code: String,
    customer_name: Option<String>,
    total: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> Result<Transaction, TransactionError> {
        let status: TransactionStatus = self.status.parse()?;
        Ok(Transaction {
            id: self.id,
            code: self.code,
            customer_name: self.customer_name,
            total: self.total,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Errors that can occur while working with transactions.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("transaction not found")]
    NotFound,
    #[error("a transaction with the same code already exists")]
    DuplicateCode,
    #[error("stored row has an invalid status: {0}")]
    InvalidStatus(#[from] UnknownStatus),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl TransactionError {
    fn from_write(err: sqlx::Error) -> Self {
        match constraint_code(&err).as_deref() {
            Some(SQLITE_CONSTRAINT_UNIQUE) => Self::DuplicateCode,
            _ => Self::Database(err),
        }
    }
}

impl From<sqlx::Error> for TransactionError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

fn constraint_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
