use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::models::*;

fn parse_json(field: &str, raw: &str) -> Result<serde_json::Value, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| DatabaseError::InvalidJson {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn constraint_or(e: rusqlite::Error, message: impl FnOnce() -> String) -> DatabaseError {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DatabaseError::ConstraintViolation(message())
        }
        other => other.into(),
    }
}

// ═══════════════════════════════════════════
// Document types
// ═══════════════════════════════════════════

fn document_type_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentType> {
    Ok(DocumentType {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub fn insert_document_type(
    conn: &Connection,
    new: &NewDocumentType,
) -> Result<DocumentType, DatabaseError> {
    conn.execute(
        "INSERT INTO document_types (name, description) VALUES (?1, ?2)",
        params![new.name, new.description],
    )
    .map_err(|e| constraint_or(e, || format!("document type '{}' already exists", new.name)))?;

    let id = conn.last_insert_rowid();
    get_document_type(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "DocumentType".into(),
        id: id.to_string(),
    })
}

pub fn get_document_type(conn: &Connection, id: i64) -> Result<Option<DocumentType>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, description, created_at FROM document_types WHERE id = ?1",
            params![id],
            document_type_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_document_types(conn: &Connection) -> Result<Vec<DocumentType>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id, name, description, created_at FROM document_types ORDER BY id")?;
    let rows = stmt.query_map([], document_type_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// ═══════════════════════════════════════════
// Schemas
// ═══════════════════════════════════════════

struct SchemaRow {
    id: i64,
    document_type_id: i64,
    schema_json: String,
    prompt_template: String,
    version: Option<String>,
    created_at: chrono::NaiveDateTime,
}

fn schema_from_row(row: SchemaRow) -> Result<DocumentSchema, DatabaseError> {
    Ok(DocumentSchema {
        id: row.id,
        document_type_id: row.document_type_id,
        schema: parse_json("document_schemas.schema_json", &row.schema_json)?,
        prompt_template: row.prompt_template,
        version: row.version,
        created_at: row.created_at,
    })
}

pub fn insert_schema(
    conn: &Connection,
    document_type_id: i64,
    new: &NewDocumentSchema,
) -> Result<DocumentSchema, DatabaseError> {
    if get_document_type(conn, document_type_id)?.is_none() {
        return Err(DatabaseError::NotFound {
            entity_type: "DocumentType".into(),
            id: document_type_id.to_string(),
        });
    }

    conn.execute(
        "INSERT INTO document_schemas (document_type_id, schema_json, prompt_template, version)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            document_type_id,
            new.schema.to_string(),
            new.prompt_template,
            new.version,
        ],
    )?;

    let id = conn.last_insert_rowid();
    list_schemas_for_type(conn, document_type_id)?
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| DatabaseError::NotFound {
            entity_type: "DocumentSchema".into(),
            id: id.to_string(),
        })
}

/// Schemas for a type, oldest first.
pub fn list_schemas_for_type(
    conn: &Connection,
    document_type_id: i64,
) -> Result<Vec<DocumentSchema>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, document_type_id, schema_json, prompt_template, version, created_at
         FROM document_schemas WHERE document_type_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![document_type_id], |row| {
        Ok(SchemaRow {
            id: row.get(0)?,
            document_type_id: row.get(1)?,
            schema_json: row.get(2)?,
            prompt_template: row.get(3)?,
            version: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    let mut schemas = Vec::new();
    for row in rows {
        schemas.push(schema_from_row(row?)?);
    }
    Ok(schemas)
}

// ═══════════════════════════════════════════
// Extractions
// ═══════════════════════════════════════════

pub fn insert_extraction(conn: &Connection, new: &NewExtraction) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO document_extractions
         (document_path, document_type_id, document_schema, ocr_text, model_response)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new.document_path,
            new.document_type_id,
            new.document_schema.to_string(),
            new.ocr_text,
            new.model_response.to_string(),
        ],
    )
    .map_err(|e| {
        constraint_or(e, || {
            format!("unknown document type {}", new.document_type_id)
        })
    })?;
    Ok(conn.last_insert_rowid())
}

/// Most recent extractions first.
pub fn list_extractions(
    conn: &Connection,
    document_type_id: Option<i64>,
    limit: usize,
) -> Result<Vec<DocumentExtraction>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, document_path, document_type_id, document_schema, ocr_text, model_response,
         created_at
         FROM document_extractions
         WHERE (?1 IS NULL OR document_type_id = ?1)
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![document_type_id, limit as i64], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, chrono::NaiveDateTime>(6)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, document_path, document_type_id, schema, ocr_text, response, created_at) = row?;
        out.push(DocumentExtraction {
            id,
            document_path,
            document_type_id,
            document_schema: parse_json("document_extractions.document_schema", &schema)?,
            ocr_text,
            model_response: parse_json("document_extractions.model_response", &response)?,
            created_at,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use serde_json::json;

    fn invoice_type(conn: &Connection) -> DocumentType {
        insert_document_type(
            conn,
            &NewDocumentType {
                name: "invoice".into(),
                description: Some("Supplier invoices".into()),
            },
        )
        .unwrap()
    }

    fn schema(version: &str) -> NewDocumentSchema {
        NewDocumentSchema {
            schema: json!({"total": "number", "version": version}),
            prompt_template: "Fill {schema} from {pdf_content}".into(),
            version: Some(version.into()),
        }
    }

    #[test]
    fn insert_and_list_document_types() {
        let conn = open_memory_database().unwrap();
        let created = invoice_type(&conn);
        assert_eq!(created.name, "invoice");

        let all = list_document_types(&conn).unwrap();
        assert_eq!(all, vec![created]);
    }

    #[test]
    fn duplicate_document_type_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        invoice_type(&conn);
        let err = insert_document_type(
            &conn,
            &NewDocumentType {
                name: "invoice".into(),
                description: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn missing_document_type_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_document_type(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn schemas_listed_oldest_first() {
        let conn = open_memory_database().unwrap();
        let ty = invoice_type(&conn);
        insert_schema(&conn, ty.id, &schema("v1")).unwrap();
        let second = insert_schema(&conn, ty.id, &schema("v2")).unwrap();

        let schemas = list_schemas_for_type(&conn, ty.id).unwrap();
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas.last().unwrap(), &second);
        assert_eq!(second.schema["version"], "v2");
    }

    #[test]
    fn schema_for_unknown_type_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = insert_schema(&conn, 7, &schema("v1")).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn extraction_round_trip_and_filter() {
        let conn = open_memory_database().unwrap();
        let ty = invoice_type(&conn);
        let id = insert_extraction(
            &conn,
            &NewExtraction {
                document_path: "invoice.pdf".into(),
                document_type_id: ty.id,
                document_schema: json!({"total": "number"}),
                ocr_text: "Total: $50".into(),
                model_response: json!({"total": 50}),
            },
        )
        .unwrap();

        let all = list_extractions(&conn, None, 10).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].model_response["total"], 50);

        assert!(list_extractions(&conn, Some(ty.id + 1), 10).unwrap().is_empty());
    }

    #[test]
    fn extraction_for_unknown_type_rejected() {
        let conn = open_memory_database().unwrap();
        let err = insert_extraction(
            &conn,
            &NewExtraction {
                document_path: "x.pdf".into(),
                document_type_id: 99,
                document_schema: json!({}),
                ocr_text: String::new(),
                model_response: json!({}),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }
}
