//! Schema indexer
//!
//! Offline step that reads the live MySQL schema, renders one text block per
//! table and embeds it into the vector store the retriever loads.

use crate::error::{Result, Text2SqlError};
use crate::execution::mysql::{row_to_json, MySqlConnector};
use crate::execution::result::Row;
use crate::schema_rag::embedder::Embedder;
use crate::schema_rag::vector_store::{Document, InMemoryVectorStore};
use sqlx::mysql::MySqlConnection;
use sqlx::{Connection, Row as _};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_SAMPLE_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKey>,
    pub sample_rows: Vec<Row>,
}

/// Plain-text block the model sees as context for one table.
pub fn render_table_document(table: &TableSchema) -> String {
    let mut doc = format!("Table: {}\nColumns:\n", table.name);
    for column in &table.columns {
        let _ = writeln!(doc, "- {} ({})", column.name, column.data_type);
    }

    if !table.foreign_keys.is_empty() {
        doc.push_str("Foreign keys:\n");
        for fk in &table.foreign_keys {
            let _ = writeln!(
                doc,
                "- {} -> {}.{}",
                fk.column, fk.referenced_table, fk.referenced_column
            );
        }
    }

    if !table.sample_rows.is_empty() {
        let lines: Vec<String> = table
            .sample_rows
            .iter()
            .map(|row| serde_json::to_string(row).unwrap_or_default())
            .collect();
        doc.push_str("\nSample rows:\n");
        doc.push_str(&lines.join("\n"));
    }
    doc
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub struct SchemaIndexer {
    connector: MySqlConnector,
    embedder: Arc<dyn Embedder>,
    sample_rows: usize,
}

impl SchemaIndexer {
    pub fn new(connector: MySqlConnector, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            connector,
            embedder,
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }

    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    /// Read every table of the configured database.
    pub async fn introspect(&self) -> Result<Vec<TableSchema>> {
        let mut conn = self.connector.open().await?;
        let result = self.introspect_with(&mut conn).await;
        if let Err(e) = conn.close().await {
            warn!("failed to close indexer connection: {}", self.connector.sanitize(&e));
        }
        result
    }

    async fn introspect_with(&self, conn: &mut MySqlConnection) -> Result<Vec<TableSchema>> {
        let table_rows = sqlx::query("SHOW TABLES")
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Text2SqlError::Database(self.connector.sanitize(&e)))?;
        let tables: Vec<String> = table_rows
            .iter()
            .filter_map(|row| row.try_get_unchecked::<String, _>(0).ok())
            .collect();
        info!("found {} tables", tables.len());

        let mut schemas = Vec::with_capacity(tables.len());
        for table in tables {
            let columns = self.describe(conn, &table).await?;
            let foreign_keys = self.foreign_keys(conn, &table).await?;
            let sample_rows = match self.samples(conn, &table).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("could not fetch samples from {}: {}", table, e);
                    Vec::new()
                }
            };
            schemas.push(TableSchema {
                name: table,
                columns,
                foreign_keys,
                sample_rows,
            });
        }
        Ok(schemas)
    }

    async fn describe(&self, conn: &mut MySqlConnection, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = format!("DESCRIBE {}", quote_identifier(table));
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Text2SqlError::Database(self.connector.sanitize(&e)))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(ColumnInfo {
                    name: row.try_get_unchecked::<String, _>(0).ok()?,
                    data_type: row.try_get_unchecked::<String, _>(1).ok()?,
                })
            })
            .collect())
    }

    async fn foreign_keys(&self, conn: &mut MySqlConnection, table: &str) -> Result<Vec<ForeignKey>> {
        let rows = sqlx::query(
            "SELECT COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
             FROM information_schema.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             AND REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| Text2SqlError::Database(self.connector.sanitize(&e)))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(ForeignKey {
                    column: row.try_get_unchecked::<String, _>(0).ok()?,
                    referenced_table: row.try_get_unchecked::<String, _>(1).ok()?,
                    referenced_column: row.try_get_unchecked::<String, _>(2).ok()?,
                })
            })
            .collect())
    }

    async fn samples(&self, conn: &mut MySqlConnection, table: &str) -> Result<Vec<Row>> {
        if self.sample_rows == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM {} LIMIT {}",
            quote_identifier(table),
            self.sample_rows
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| Text2SqlError::Database(self.connector.sanitize(&e)))?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    /// Introspect, render and embed every table.
    pub async fn build_index(&self) -> Result<InMemoryVectorStore> {
        let tables = self.introspect().await?;
        let mut store = InMemoryVectorStore::new(0).with_model(self.embedder.model());

        for table in &tables {
            let text = render_table_document(table);
            let embedding = self.embedder.embed(&text).await?;
            store.add_document(Document {
                id: format!("table:{}", table.name),
                text,
                embedding,
            })?;
            info!(table = %table.name, columns = table.columns.len(), "indexed table");
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders() -> TableSchema {
        TableSchema {
            name: "orders".to_string(),
            columns: vec![
                ColumnInfo {
                    name: "id".to_string(),
                    data_type: "int".to_string(),
                },
                ColumnInfo {
                    name: "customer_id".to_string(),
                    data_type: "int".to_string(),
                },
            ],
            foreign_keys: vec![ForeignKey {
                column: "customer_id".to_string(),
                referenced_table: "customers".to_string(),
                referenced_column: "id".to_string(),
            }],
            sample_rows: vec![json!({"id": 1, "customer_id": 7})
                .as_object()
                .cloned()
                .unwrap()],
        }
    }

    #[test]
    fn test_render_full_document() {
        assert_eq!(
            render_table_document(&orders()),
            "Table: orders\nColumns:\n- id (int)\n- customer_id (int)\n\
             Foreign keys:\n- customer_id -> customers.id\n\
             \nSample rows:\n{\"id\":1,\"customer_id\":7}"
        );
    }

    #[test]
    fn test_render_without_keys_or_samples() {
        let table = TableSchema {
            foreign_keys: Vec::new(),
            sample_rows: Vec::new(),
            ..orders()
        };
        assert_eq!(
            render_table_document(&table),
            "Table: orders\nColumns:\n- id (int)\n- customer_id (int)\n"
        );
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("orders"), "`orders`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
    }
}
