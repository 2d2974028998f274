//! Question-record operations.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use ogma_types::Question;

use crate::error::Result;

use super::GraphStore;

fn row_to_question(row: &Row<'_>) -> rusqlite::Result<Question> {
    let created_at: String = row.get("created_at")?;
    Ok(Question {
        id: row.get("id")?,
        resource_id: row.get("resource_id")?,
        chunk_id: row.get("chunk_id")?,
        label: row.get("label")?,
        marks: row.get::<_, Option<i64>>("marks")?.map(|m| m as u32),
        mark_scheme: row.get("mark_scheme")?,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Insert a question record inside an existing transaction.
pub(crate) fn insert_question_tx(conn: &Connection, question: &Question) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO questions (id, resource_id, chunk_id, label, marks, mark_scheme, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            question.id,
            question.resource_id,
            question.chunk_id,
            question.label,
            question.marks.map(|m| m as i64),
            question.mark_scheme,
            question.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Delete a resource's question records inside an existing transaction.
pub(crate) fn delete_resource_questions_tx(conn: &Connection, resource_id: &str) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM questions WHERE resource_id = ?1",
        params![resource_id],
    )?;
    Ok(removed)
}

/// Load a resource's question records inside an existing transaction.
pub(crate) fn list_resource_questions_tx(
    conn: &Connection,
    resource_id: &str,
) -> Result<Vec<Question>> {
    let mut stmt =
        conn.prepare("SELECT * FROM questions WHERE resource_id = ?1 ORDER BY label ASC")?;
    let rows = stmt.query_map(params![resource_id], row_to_question)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

impl GraphStore {
    /// Insert a question record.
    pub fn insert_question(&self, question: &Question) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_question_tx(&conn, question)
    }

    /// List a resource's question records.
    pub fn list_resource_questions(&self, resource_id: &str) -> Result<Vec<Question>> {
        let conn = self.conn.lock().unwrap();
        list_resource_questions_tx(&conn, resource_id)
    }
}
