mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::config::Config;
use crate::models::*;

/// Outcome of a versioned content write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// All four arrays were written; the brand is now at `version`.
    Committed { version: i64 },
    /// Another writer got there first. Nothing was written.
    VersionConflict,
    NotFound,
}

/// The brand document store as the pipeline sees it.
///
/// [`Database`] is the production implementation; the trait exists so the
/// pipeline can be exercised against stores that fail on purpose.
pub trait BrandStore: Send + Sync {
    fn get_brand(&self, id: Uuid) -> Result<Option<Brand>>;

    /// Replace the brand's questionnaire. Returns `false` if the brand does not exist.
    fn save_questionnaire(&self, id: Uuid, questionnaire: &Questionnaire) -> Result<bool>;

    /// Write all four content arrays and the accepted-bundle list in one
    /// statement, only if the brand is still at `expected_version`.
    fn commit_content(
        &self,
        id: Uuid,
        content: &BrandContent,
        accepted_bundles: &[Uuid],
        expected_version: i64,
    ) -> Result<CommitResult>;
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const BRAND_COLUMNS: &str = "id, name, user_id, questionnaire, products, providers, \
     training_programs, before_afters, accepted_bundles, version, created_at, updated_at";

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "brandkit")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("brandkit.db");
        Self::open(db_path)
    }

    /// Open the configured database file, or the platform default.
    pub fn open_configured(config: &Config) -> Result<Self> {
        match &config.db_path {
            Some(path) => Self::open(path.clone()),
            None => Self::open_default(),
        }
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Brand operations
    // ============================================================

    pub fn get_all_brands(&self) -> Result<Vec<Brand>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM brands ORDER BY name",
            BRAND_COLUMNS
        ))?;

        let brands = stmt
            .query_map([], brand_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(brands)
    }

    pub fn get_brand(&self, id: Uuid) -> Result<Option<Brand>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM brands WHERE id = ?",
            BRAND_COLUMNS
        ))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(brand_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn create_brand(&self, input: CreateBrandInput) -> Result<Brand> {
        if input.name.trim().is_empty() {
            anyhow::bail!("Brand name is required");
        }
        if input.user_id.trim().is_empty() {
            anyhow::bail!("Brand user id is required");
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO brands (id, name, user_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.user_id,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Brand {
            id,
            name: input.name,
            user_id: input.user_id,
            questionnaire: None,
            content: BrandContent::default(),
            accepted_bundles: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn delete_brand(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM brands WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    pub fn save_questionnaire(&self, id: Uuid, questionnaire: &Questionnaire) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE brands SET questionnaire = ?, updated_at = ? WHERE id = ?",
            (
                serde_json::to_string(questionnaire)?,
                Utc::now().to_rfc3339(),
                id.to_string(),
            ),
        )?;
        Ok(rows > 0)
    }

    pub fn commit_content(
        &self,
        id: Uuid,
        content: &BrandContent,
        accepted_bundles: &[Uuid],
        expected_version: i64,
    ) -> Result<CommitResult> {
        let conn = self.conn.lock().expect("database lock poisoned");

        // One statement so readers never observe a partially merged brand.
        let rows = conn.execute(
            "UPDATE brands
             SET products = ?, providers = ?, training_programs = ?, before_afters = ?,
                 accepted_bundles = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
            (
                serde_json::to_string(&content.products)?,
                serde_json::to_string(&content.providers)?,
                serde_json::to_string(&content.training_programs)?,
                serde_json::to_string(&content.before_afters)?,
                serde_json::to_string(accepted_bundles)?,
                Utc::now().to_rfc3339(),
                id.to_string(),
                expected_version,
            ),
        )?;

        if rows > 0 {
            return Ok(CommitResult::Committed {
                version: expected_version + 1,
            });
        }

        let exists: i32 = conn.query_row(
            "SELECT COUNT(*) FROM brands WHERE id = ?",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if exists > 0 {
            Ok(CommitResult::VersionConflict)
        } else {
            Ok(CommitResult::NotFound)
        }
    }
}

impl BrandStore for Database {
    fn get_brand(&self, id: Uuid) -> Result<Option<Brand>> {
        Database::get_brand(self, id)
    }

    fn save_questionnaire(&self, id: Uuid, questionnaire: &Questionnaire) -> Result<bool> {
        Database::save_questionnaire(self, id, questionnaire)
    }

    fn commit_content(
        &self,
        id: Uuid,
        content: &BrandContent,
        accepted_bundles: &[Uuid],
        expected_version: i64,
    ) -> Result<CommitResult> {
        Database::commit_content(self, id, content, accepted_bundles, expected_version)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn brand_from_row(row: &Row<'_>) -> rusqlite::Result<Brand> {
    Ok(Brand {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        user_id: row.get(2)?,
        questionnaire: match row.get::<_, Option<String>>(3)? {
            Some(json) => Some(parse_json(3, &json)?),
            None => None,
        },
        content: BrandContent {
            products: json_column(row, 4)?,
            providers: json_column(row, 5)?,
            training_programs: json_column(row, 6)?,
            before_afters: json_column(row, 7)?,
        },
        accepted_bundles: json_column(row, 8)?,
        version: row.get(9)?,
        created_at: parse_datetime(row.get::<_, String>(10)?),
        updated_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let json: String = row.get(idx)?;
    parse_json(idx, &json)
}

fn parse_json<T: DeserializeOwned>(idx: usize, json: &str) -> rusqlite::Result<T> {
    serde_json::from_str(json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
