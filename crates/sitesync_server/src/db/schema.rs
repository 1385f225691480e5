use rusqlite::Connection;

/// SQL schema for the content table
const SCHEMA: &str = r#"
-- The site's content document. Exactly one row, id = 1.
CREATE TABLE IF NOT EXISTS site_content (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    content TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    client_timestamp TEXT,
    version INTEGER NOT NULL DEFAULT 1
);
"#;

/// Initialize the database with the content schema
pub fn init_database(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
