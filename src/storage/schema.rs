//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Site-Auditor database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Registered sites
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    base_url TEXT NOT NULL UNIQUE
);

-- One crawl run per row
CREATE TABLE IF NOT EXISTS scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sites_id INTEGER NOT NULL REFERENCES sites(id),
    gpa REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'CREATED',
    scan_type TEXT NOT NULL DEFAULT 'AUTO',
    start_time TEXT NOT NULL,
    end_time TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_scans_site ON scans(sites_id);
CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status);

-- One URL per scan
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scans_id INTEGER NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    sites_id INTEGER NOT NULL REFERENCES sites(id),
    uri TEXT NOT NULL,
    uri_hash TEXT NOT NULL,
    UNIQUE(scans_id, uri_hash)
);

CREATE INDEX IF NOT EXISTS idx_pages_scan ON pages(scans_id);

-- Priority job queue
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_type TEXT NOT NULL,
    pages_id INTEGER NOT NULL REFERENCES pages(id) ON DELETE CASCADE,
    priority INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_dispatch ON jobs(status, priority DESC, id);
CREATE INDEX IF NOT EXISTS idx_jobs_page ON jobs(pages_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        let result = initialize_schema(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["sites", "scans", "pages", "jobs"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_page_uniqueness_per_scan() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO sites (base_url) VALUES ('http://a/');
             INSERT INTO scans (sites_id, start_time) VALUES (1, 'now');
             INSERT INTO pages (scans_id, sites_id, uri, uri_hash) VALUES (1, 1, 'http://a/', 'h');",
        )
        .unwrap();

        let duplicate = conn.execute(
            "INSERT INTO pages (scans_id, sites_id, uri, uri_hash) VALUES (1, 1, 'http://a/', 'h')",
            [],
        );
        assert!(duplicate.is_err());
    }
}
