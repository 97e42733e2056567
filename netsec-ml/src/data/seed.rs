//! Seed a document-store collection from a CSV file.

use crate::context::PipelineContext;
use crate::data::store::{Document, DocumentStore, table_to_documents};
use crate::error::{PipelineError, Result, Stage, StageResultExt};
use crate::storage;
use std::path::Path;
use tracing::info;

/// Read a CSV file as one document per row.
pub fn csv_to_documents(path: &Path) -> Result<Vec<Document>> {
    let table = storage::read_table(path)?;
    Ok(table_to_documents(&table))
}

pub struct DataSeeder<'a> {
    ctx: &'a PipelineContext,
    store: &'a mut dyn DocumentStore,
}

impl<'a> DataSeeder<'a> {
    pub fn new(ctx: &'a PipelineContext, store: &'a mut dyn DocumentStore) -> Self {
        Self { ctx, store }
    }

    /// Insert every row of `csv_path` into `database.collection`; returns the
    /// number of documents inserted.
    pub fn push(&mut self, csv_path: &Path, database: &str, collection: &str) -> Result<usize> {
        let _span = self.ctx.stage_span(Stage::Seeding).entered();
        self.push_inner(csv_path, database, collection)
            .stage(Stage::Seeding)
    }

    fn push_inner(&mut self, csv_path: &Path, database: &str, collection: &str) -> Result<usize> {
        let docs = csv_to_documents(csv_path)?;
        if docs.is_empty() {
            return Err(PipelineError::invalid_input(format!(
                "{} holds no rows",
                csv_path.display()
            )));
        }
        let inserted = self.store.insert_many(database, collection, docs)?;
        info!(
            path = %csv_path.display(),
            database,
            collection,
            inserted,
            "seeded collection"
        );
        Ok(inserted)
    }

    /// Seed the collection the ingestion stage reads from.
    pub fn push_configured(&mut self, csv_path: &Path) -> Result<usize> {
        let database = self.ctx.config.ingestion.database.clone();
        let collection = self.ctx.config.ingestion.collection.clone();
        self.push(csv_path, &database, &collection)
    }
}
