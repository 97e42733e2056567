//! Data stages and the tabular plumbing they share.

pub mod ingest;
pub mod schema;
pub mod seed;
pub mod store;
pub mod table;
pub mod transform;
pub mod validate;

pub use ingest::{DataIngestion, train_test_split};
pub use schema::{ColumnType, Schema};
pub use seed::DataSeeder;
pub use store::{Document, DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
pub use table::{Column, ColumnData, Table};
pub use transform::{DataTransformation, Preprocessor, recode_target};
pub use validate::{ColumnDrift, DataValidation, DriftReport};
