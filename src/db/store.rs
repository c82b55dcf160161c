//! Shared handle to the document-type database.
//!
//! One connection behind a `Mutex`; every call is short and synchronous,
//! so async callers go through `spawn_blocking`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::*;
use crate::pipeline::structuring::{SchemaStore, StructuringError};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    pub fn create_document_type(&self, new: &NewDocumentType) -> Result<DocumentType, DatabaseError> {
        let conn = self.conn()?;
        repository::insert_document_type(&conn, new)
    }

    pub fn document_type(&self, id: i64) -> Result<Option<DocumentType>, DatabaseError> {
        let conn = self.conn()?;
        repository::get_document_type(&conn, id)
    }

    pub fn document_types(&self) -> Result<Vec<DocumentType>, DatabaseError> {
        let conn = self.conn()?;
        repository::list_document_types(&conn)
    }

    pub fn add_schema(
        &self,
        document_type_id: i64,
        new: &NewDocumentSchema,
    ) -> Result<DocumentSchema, DatabaseError> {
        let conn = self.conn()?;
        repository::insert_schema(&conn, document_type_id, new)
    }

    pub fn schemas(&self, document_type_id: i64) -> Result<Vec<DocumentSchema>, DatabaseError> {
        let conn = self.conn()?;
        repository::list_schemas_for_type(&conn, document_type_id)
    }

    pub fn extractions(
        &self,
        document_type_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<DocumentExtraction>, DatabaseError> {
        let conn = self.conn()?;
        repository::list_extractions(&conn, document_type_id, limit)
    }
}

impl SchemaStore for SqliteStore {
    fn schemas_for_type(
        &self,
        document_type_id: i64,
    ) -> Result<Vec<DocumentSchema>, StructuringError> {
        Ok(self.schemas(document_type_id)?)
    }

    fn record_extraction(&self, extraction: &NewExtraction) -> Result<i64, StructuringError> {
        let conn = self.conn()?;
        Ok(repository::insert_extraction(&conn, extraction)?)
    }
}
