//! `SQLite`-backed ledger.
//!
//! Each contract primitive runs in one `IMMEDIATE` transaction. The borrow
//! transition is a conditional `UPDATE ... WHERE available = 1`, so the
//! row-count of that statement is the compare-and-swap result. A partial
//! unique index additionally forbids two open loans for one tool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::types::{Availability, Loan, LoanClosing, LoanStatus, NewLoan, Tool};
use super::{LoanLedger, ToolCatalog};
use crate::codec::AssetTag;
use crate::types::{CategoryId, Error, LoanId, Result, ToolId, UserId};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tools (
    id          TEXT PRIMARY KEY,
    asset_tag   TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    details     TEXT NOT NULL,
    location    TEXT NOT NULL,
    category_id TEXT NOT NULL,
    image_ref   TEXT,
    available   INTEGER NOT NULL DEFAULT 1,
    code        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    added_by    TEXT
);
CREATE TABLE IF NOT EXISTS loans (
    id              TEXT PRIMARY KEY,
    tool_id         TEXT NOT NULL REFERENCES tools(id),
    borrower_id     TEXT NOT NULL,
    origin_location TEXT NOT NULL,
    borrowed_at     TEXT NOT NULL,
    returned_at     TEXT,
    return_location TEXT,
    status          TEXT NOT NULL CHECK (status IN ('open', 'returned'))
);
CREATE UNIQUE INDEX IF NOT EXISTS loans_one_open_per_tool
    ON loans(tool_id) WHERE status = 'open';
CREATE INDEX IF NOT EXISTS loans_by_tool ON loans(tool_id, borrowed_at);
";

const TOOL_COLUMNS: &str = "id, asset_tag, name, details, location, category_id, image_ref, \
                            available, code, created_at, added_by";

const LOAN_COLUMNS: &str = "id, tool_id, borrower_id, origin_location, borrowed_at, \
                            returned_at, return_location, status";

/// Raw `tools` row before id validation.
struct ToolRow {
    id: String,
    asset_tag: String,
    name: String,
    details: String,
    location: String,
    category_id: String,
    image_ref: Option<String>,
    available: bool,
    code: String,
    created_at: DateTime<Utc>,
    added_by: Option<String>,
}

impl ToolRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            asset_tag: row.get(1)?,
            name: row.get(2)?,
            details: row.get(3)?,
            location: row.get(4)?,
            category_id: row.get(5)?,
            image_ref: row.get(6)?,
            available: row.get(7)?,
            code: row.get(8)?,
            created_at: row.get(9)?,
            added_by: row.get(10)?,
        })
    }

    fn into_tool(self) -> Result<Tool> {
        Ok(Tool {
            id: ToolId::from_string(self.id).map_err(corrupt)?,
            asset_tag: AssetTag::parse(self.asset_tag)
                .map_err(|e| Error::store(format!("corrupt asset tag: {e}")))?,
            name: self.name,
            details: self.details,
            location: self.location,
            category_id: CategoryId::from_string(self.category_id).map_err(corrupt)?,
            image_ref: self.image_ref,
            availability: if self.available {
                Availability::Available
            } else {
                Availability::Borrowed
            },
            code: self.code,
            created_at: self.created_at,
            added_by: self
                .added_by
                .map(UserId::from_string)
                .transpose()
                .map_err(corrupt)?,
        })
    }
}

/// Raw `loans` row before id validation.
struct LoanRow {
    id: String,
    tool_id: String,
    borrower_id: String,
    origin_location: String,
    borrowed_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    return_location: Option<String>,
    status: String,
}

impl LoanRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tool_id: row.get(1)?,
            borrower_id: row.get(2)?,
            origin_location: row.get(3)?,
            borrowed_at: row.get(4)?,
            returned_at: row.get(5)?,
            return_location: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_loan(self) -> Result<Loan> {
        let status = LoanStatus::parse(&self.status)
            .ok_or_else(|| Error::store(format!("corrupt loan status '{}'", self.status)))?;
        Ok(Loan {
            id: LoanId::from_string(self.id).map_err(corrupt)?,
            tool_id: ToolId::from_string(self.tool_id).map_err(corrupt)?,
            borrower_id: UserId::from_string(self.borrower_id).map_err(corrupt)?,
            origin_location: self.origin_location,
            borrowed_at: self.borrowed_at,
            returned_at: self.returned_at,
            return_location: self.return_location,
            status,
        })
    }
}

fn corrupt(msg: &'static str) -> Error {
    Error::store(format!("corrupt row: {msg}"))
}

/// Durable tool store on a single `SQLite` connection.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn)
    }

    /// In-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run blocking database work off the async executor.
    async fn run<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::store("sqlite connection mutex poisoned"))?;
            work(&mut *guard)
        })
        .await
        .map_err(|e| Error::store(format!("sqlite task failed: {e}")))?
    }
}

fn select_loan(conn: &Connection, loan_id: &str) -> Result<Option<Loan>> {
    let sql = format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = ?1");
    conn.query_row(&sql, params![loan_id], LoanRow::from_row)
        .optional()?
        .map(LoanRow::into_loan)
        .transpose()
}

fn select_tool(conn: &Connection, column: &str, value: &str) -> Result<Option<Tool>> {
    let sql = format!("SELECT {TOOL_COLUMNS} FROM tools WHERE {column} = ?1");
    conn.query_row(&sql, params![value], ToolRow::from_row)
        .optional()?
        .map(ToolRow::into_tool)
        .transpose()
}

#[async_trait]
impl LoanLedger for SqliteStore {
    async fn open_loan_if_available(&self, request: NewLoan) -> Result<Loan> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let claimed = tx.execute(
                "UPDATE tools SET available = 0 WHERE id = ?1 AND available = 1",
                params![request.tool_id.as_str()],
            )?;
            if claimed == 0 {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM tools WHERE id = ?1)",
                    params![request.tool_id.as_str()],
                    |row| row.get(0),
                )?;
                return Err(if exists {
                    Error::already_borrowed(request.tool_id.to_string())
                } else {
                    Error::tool_not_found(request.tool_id.to_string())
                });
            }

            let loan = Loan::open(request);
            tx.execute(
                "INSERT INTO loans (id, tool_id, borrower_id, origin_location, borrowed_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    loan.id.as_str(),
                    loan.tool_id.as_str(),
                    loan.borrower_id.as_str(),
                    loan.origin_location,
                    loan.borrowed_at,
                    loan.status.as_str(),
                ],
            )?;
            tx.commit()?;
            Ok(loan)
        })
        .await
    }

    async fn close_loan_if_open(&self, loan_id: &LoanId, closing: LoanClosing) -> Result<Loan> {
        let loan_id = loan_id.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let closed = tx.execute(
                "UPDATE loans SET status = 'returned', returned_at = ?2, return_location = ?3
                 WHERE id = ?1 AND status = 'open'",
                params![loan_id.as_str(), closing.returned_at, closing.return_location],
            )?;
            if closed == 0 {
                return Err(match select_loan(&tx, loan_id.as_str())? {
                    Some(loan) => Error::not_open(format!(
                        "loan {} is {}",
                        loan_id,
                        loan.status.as_str()
                    )),
                    None => Error::loan_not_found(loan_id.to_string()),
                });
            }

            let loan = select_loan(&tx, loan_id.as_str())?
                .ok_or_else(|| Error::store(format!("loan {} vanished mid-transaction", loan_id)))?;
            let released = tx.execute(
                "UPDATE tools SET available = 1 WHERE id = ?1 AND available = 0",
                params![loan.tool_id.as_str()],
            )?;
            if released != 1 {
                return Err(Error::store(format!(
                    "tool {} was not borrowed while loan {} was open",
                    loan.tool_id, loan_id
                )));
            }
            tx.commit()?;
            Ok(loan)
        })
        .await
    }

    async fn open_loan_for(&self, tool_id: &ToolId) -> Result<Option<Loan>> {
        let tool_id = tool_id.clone();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {LOAN_COLUMNS} FROM loans WHERE tool_id = ?1 AND status = 'open'
                 ORDER BY borrowed_at DESC LIMIT 1"
            );
            conn.query_row(&sql, params![tool_id.as_str()], LoanRow::from_row)
                .optional()?
                .map(LoanRow::into_loan)
                .transpose()
        })
        .await
    }

    async fn loans_for_tool(&self, tool_id: &ToolId) -> Result<Vec<Loan>> {
        let tool_id = tool_id.clone();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {LOAN_COLUMNS} FROM loans WHERE tool_id = ?1 ORDER BY borrowed_at, rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![tool_id.as_str()], LoanRow::from_row)?;
            let loans = rows
                .map(|row| row.map_err(Error::from).and_then(LoanRow::into_loan))
                .collect::<Result<Vec<_>>>();
            loans
        })
        .await
    }
}

#[async_trait]
impl ToolCatalog for SqliteStore {
    async fn tool(&self, tool_id: &ToolId) -> Result<Option<Tool>> {
        let tool_id = tool_id.clone();
        self.run(move |conn| select_tool(conn, "id", tool_id.as_str()))
            .await
    }

    async fn tool_by_asset_tag(&self, asset_tag: &AssetTag) -> Result<Option<Tool>> {
        let asset_tag = asset_tag.clone();
        self.run(move |conn| select_tool(conn, "asset_tag", asset_tag.as_str()))
            .await
    }

    async fn insert_tool(&self, mut tool: Tool) -> Result<Tool> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let duplicate: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM tools WHERE id = ?1 OR asset_tag = ?2)",
                params![tool.id.as_str(), tool.asset_tag.as_str()],
                |row| row.get(0),
            )?;
            if duplicate {
                return Err(Error::validation(format!(
                    "tool {} or asset tag {} already registered",
                    tool.id, tool.asset_tag
                )));
            }

            tool.availability = Availability::Available;
            tx.execute(
                &format!(
                    "INSERT INTO tools ({TOOL_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9, ?10)"
                ),
                params![
                    tool.id.as_str(),
                    tool.asset_tag.as_str(),
                    tool.name,
                    tool.details,
                    tool.location,
                    tool.category_id.as_str(),
                    tool.image_ref,
                    tool.code,
                    tool.created_at,
                    tool.added_by.as_ref().map(UserId::as_str),
                ],
            )?;
            tx.commit()?;
            Ok(tool)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::tests::sample_tool;

    fn borrow(tool: &str, who: &str) -> NewLoan {
        NewLoan {
            tool_id: ToolId::must(tool),
            borrower_id: UserId::must(who),
            origin_location: "Oficina".to_string(),
            borrowed_at: Utc::now(),
        }
    }

    fn closing() -> LoanClosing {
        LoanClosing {
            return_location: "Deposito".to_string(),
            returned_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_borrow_and_return_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let loan_id = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_tool(sample_tool("9", "4521")).await.unwrap();
            store.open_loan_if_available(borrow("9", "3")).await.unwrap().id
        };

        let store = SqliteStore::open(&path).unwrap();
        let tool = store.tool(&ToolId::must("9")).await.unwrap().unwrap();
        assert_eq!(tool.availability, Availability::Borrowed);
        assert_eq!(
            store.open_loan_for(&tool.id).await.unwrap().map(|l| l.id),
            Some(loan_id.clone())
        );

        let closed = store.close_loan_if_open(&loan_id, closing()).await.unwrap();
        assert_eq!(closed.status, LoanStatus::Returned);
        assert_eq!(closed.return_location.as_deref(), Some("Deposito"));
        let tool = store.tool(&ToolId::must("9")).await.unwrap().unwrap();
        assert_eq!(tool.availability, Availability::Available);
    }

    #[tokio::test]
    async fn test_conditional_update_rejects_second_borrow() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_tool(sample_tool("9", "4521")).await.unwrap();
        store.open_loan_if_available(borrow("9", "3")).await.unwrap();

        let err = store.open_loan_if_available(borrow("9", "5")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyBorrowed(_)));
        let err = store.open_loan_if_available(borrow("404", "5")).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
        assert_eq!(store.loans_for_tool(&ToolId::must("9")).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_borrow_has_single_winner() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.insert_tool(sample_tool("9", "4521")).await.unwrap();
        let (a, b) = (Arc::clone(&store), Arc::clone(&store));

        let (ra, rb) = tokio::join!(
            tokio::spawn(async move { a.open_loan_if_available(borrow("9", "3")).await }),
            tokio::spawn(async move { b.open_loan_if_available(borrow("9", "5")).await }),
        );
        let results = [ra.unwrap(), rb.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(Error::AlreadyBorrowed(_)))));
        let history = store.loans_for_tool(&ToolId::must("9")).await.unwrap();
        assert_eq!(history.iter().filter(|l| l.is_open()).count(), 1);
        let tool = store.tool(&ToolId::must("9")).await.unwrap().unwrap();
        assert_eq!(tool.availability, Availability::Borrowed);
    }

    #[tokio::test]
    async fn test_double_return_is_not_open() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_tool(sample_tool("9", "4521")).await.unwrap();
        let loan = store.open_loan_if_available(borrow("9", "3")).await.unwrap();
        let first = store.close_loan_if_open(&loan.id, closing()).await.unwrap();

        let err = store.close_loan_if_open(&loan.id, closing()).await.unwrap_err();
        assert!(matches!(err, Error::NotOpen(_)));
        let history = store.loans_for_tool(&ToolId::must("9")).await.unwrap();
        assert_eq!(history, vec![first]);
    }

    #[tokio::test]
    async fn test_lookup_by_asset_tag() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_tool(sample_tool("9", "Drill_7")).await.unwrap();
        let tag = AssetTag::parse("Drill_7").unwrap();
        let tool = store.tool_by_asset_tag(&tag).await.unwrap().unwrap();
        assert_eq!(tool.id, ToolId::must("9"));

        let err = store.insert_tool(sample_tool("10", "Drill_7")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
