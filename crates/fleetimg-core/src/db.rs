// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FleetImg.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! SQLite storage for images and element bindings

use crate::error::Result;
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::str::FromStr;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS images (
        seq              INTEGER PRIMARY KEY AUTOINCREMENT,
        image_id         TEXT NOT NULL UNIQUE,
        image_type       TEXT NOT NULL,
        image_name       TEXT NOT NULL,
        major            INTEGER NOT NULL,
        minor            INTEGER NOT NULL,
        patch            INTEGER NOT NULL,
        organization     TEXT NOT NULL,
        category         TEXT,
        extension        TEXT,
        platform_chipset TEXT NOT NULL,
        image_state      TEXT NOT NULL,
        build_id         TEXT,
        build_date       TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_images_logical_key
        ON images(image_name, image_type, platform_chipset);

    CREATE TABLE IF NOT EXISTS image_roles (
        image_seq  INTEGER NOT NULL REFERENCES images(seq) ON DELETE CASCADE,
        role       TEXT NOT NULL,
        PRIMARY KEY (image_seq, role)
    );

    CREATE INDEX IF NOT EXISTS idx_image_roles_role ON image_roles(role);

    CREATE TABLE IF NOT EXISTS image_checksums (
        image_seq  INTEGER NOT NULL REFERENCES images(seq) ON DELETE CASCADE,
        algorithm  TEXT NOT NULL,
        digest     TEXT NOT NULL,
        PRIMARY KEY (image_seq, algorithm)
    );

    CREATE TABLE IF NOT EXISTS image_packages (
        image_seq       INTEGER NOT NULL REFERENCES images(seq) ON DELETE CASCADE,
        position        INTEGER NOT NULL,
        organization    TEXT NOT NULL,
        package_name    TEXT NOT NULL,
        package_version TEXT NOT NULL,
        PRIMARY KEY (image_seq, position)
    );

    CREATE TABLE IF NOT EXISTS image_applications (
        image_seq  INTEGER NOT NULL REFERENCES images(seq) ON DELETE CASCADE,
        position   INTEGER NOT NULL,
        name       TEXT NOT NULL,
        PRIMARY KEY (image_seq, position)
    );

    CREATE TABLE IF NOT EXISTS element_images (
        binding_id    INTEGER PRIMARY KEY AUTOINCREMENT,
        element_id    TEXT NOT NULL,
        image_seq     INTEGER NOT NULL REFERENCES images(seq),
        install_state TEXT NOT NULL,
        installed_at  TEXT NOT NULL,
        UNIQUE (element_id, image_seq)
    );

    CREATE INDEX IF NOT EXISTS idx_element_images_image ON element_images(image_seq);";

/// Owns the connection. Every engine operation runs in one transaction on it.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        tracing::debug!("Opened image database at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a transaction. An error from `f` rolls everything back.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Read a text column and parse it, reporting bad values as conversion failures
pub(crate) fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImageError;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let db = Database::open_in_memory().unwrap();
        let tables: i64 = db
            .transaction(|tx| {
                Ok(tx.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                        ('images', 'image_roles', 'image_checksums', 'image_packages',
                         'image_applications', 'element_images')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO images (image_id, image_type, image_name, major, minor, patch,
                    organization, platform_chipset, image_state)
                 VALUES ('x', 'lxd', 'routing', 1, 0, 0, '', 'trident3', 'NEW')",
                [],
            )?;
            Err(ImageError::Corrupt("abort".to_owned()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .transaction(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM images", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_on_disk_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("images.db");
        let db = Database::open(&path).unwrap();
        drop(db);
        assert!(path.exists());
    }
}
