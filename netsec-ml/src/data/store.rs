//! Document store collaborators: where raw records live before ingestion.

use crate::data::table::Table;
use crate::error::{PipelineError, Result};
use rusqlite::{Connection, params};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// A single record with named fields.
pub type Document = Map<String, Value>;

/// Identifier field the store assigns to every inserted document.
pub const DOCUMENT_ID_FIELD: &str = "_id";

/// Fetch and insert whole collections of documents.
pub trait DocumentStore {
    /// Every document of `database.collection`, in insertion order.
    fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Document>>;

    /// Insert documents, assigning each an `_id`. Returns the number inserted.
    fn insert_many(&mut self, database: &str, collection: &str, docs: Vec<Document>)
    -> Result<usize>;
}

fn with_id(doc: Document) -> Document {
    let mut out = Document::with_capacity(doc.len() + 1);
    out.insert(
        DOCUMENT_ID_FIELD.to_string(),
        Value::String(uuid::Uuid::new_v4().simple().to_string()),
    );
    out.extend(doc.into_iter().filter(|(k, _)| k != DOCUMENT_ID_FIELD));
    out
}

// ---------------------------------------------------------------------------
// SqliteDocumentStore
// ---------------------------------------------------------------------------

/// Documents stored as JSON text in a single SQLite table.
pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| PipelineError::store(format!("cannot open {}: {e}", path.display())))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                database TEXT NOT NULL,
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                body TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS documents_by_collection ON documents (database, collection)",
            [],
        )?;
        Ok(Self { conn })
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        let mut stmt = self.conn.prepare(
            "SELECT body FROM documents WHERE database = ?1 AND collection = ?2 ORDER BY seq",
        )?;
        let bodies = stmt
            .query_map(params![database, collection], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let docs = bodies
            .iter()
            .map(|body| {
                serde_json::from_str::<Document>(body).map_err(|e| {
                    PipelineError::store(format!("corrupt document in {database}.{collection}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(database, collection, count = docs.len(), "fetched documents");
        Ok(docs)
    }

    fn insert_many(
        &mut self,
        database: &str,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO documents (database, collection, doc_id, body) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for doc in docs {
                let doc = with_id(doc);
                let id = doc
                    .get(DOCUMENT_ID_FIELD)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let body = serde_json::to_string(&doc)?;
                stmt.execute(params![database, collection, id, body])?;
                inserted += 1;
            }
        }
        tx.commit()?;
        debug!(database, collection, inserted, "inserted documents");
        Ok(inserted)
    }
}

// ---------------------------------------------------------------------------
// MemoryDocumentStore
// ---------------------------------------------------------------------------

/// Process-local store, used for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: HashMap<(String, String), Vec<Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn insert_many(
        &mut self,
        database: &str,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<usize> {
        let n = docs.len();
        self.collections
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .extend(docs.into_iter().map(with_id));
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Table <-> documents
// ---------------------------------------------------------------------------

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Tabulate documents. Columns follow first appearance across documents;
/// a field absent from a document is a missing cell.
pub fn documents_to_table(docs: &[Document]) -> Result<Table> {
    let mut names: Vec<String> = Vec::new();
    for doc in docs {
        for key in doc.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }
    let rows = docs
        .iter()
        .map(|doc| {
            names
                .iter()
                .map(|n| doc.get(n).and_then(cell_text))
                .collect()
        })
        .collect();
    Table::from_rows(names, rows)
}

/// One document per table row. Numeric cells become JSON numbers, missing
/// cells become null.
pub fn table_to_documents(table: &Table) -> Vec<Document> {
    use crate::data::table::ColumnData;

    (0..table.n_rows())
        .map(|r| {
            table
                .columns()
                .iter()
                .map(|col| {
                    let value = match &col.data {
                        ColumnData::Numeric(v) => match v[r] {
                            Some(x) if x.fract() == 0.0 && x.abs() < 9.0e15 => {
                                Value::from(x as i64)
                            }
                            Some(x) => serde_json::Number::from_f64(x)
                                .map(Value::Number)
                                .unwrap_or(Value::Null),
                            None => Value::Null,
                        },
                        ColumnData::Text(v) => {
                            v[r].clone().map(Value::String).unwrap_or(Value::Null)
                        }
                    };
                    (col.name.clone(), value)
                })
                .collect()
        })
        .collect()
}
