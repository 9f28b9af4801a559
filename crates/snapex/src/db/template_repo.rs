//! Template repository: CRUD operations for the `job_templates` table.

use rusqlite::{params, Row};

use super::job_repo::parse_timestamp;
use super::{Database, DatabaseError};
use crate::templates::Template;

/// A raw template row from the database.
#[derive(Debug, Clone)]
pub struct TemplateRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    /// JSON-encoded job configuration.
    pub configuration: String,
    pub created_by: Option<String>,
    pub created_at: String,
    pub is_public: bool,
    pub usage_count: i64,
}

impl TemplateRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            category: row.get("category")?,
            configuration: row.get("configuration")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            is_public: row.get("is_public")?,
            usage_count: row.get("usage_count")?,
        })
    }

    pub fn from_template(template: &Template) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: template.id.clone(),
            name: template.name.clone(),
            description: template.description.clone(),
            category: template.category.clone(),
            configuration: serde_json::to_string(&template.configuration)?,
            created_by: template.created_by.clone(),
            created_at: template.created_at.to_rfc3339(),
            is_public: template.is_public,
            usage_count: template.usage_count as i64,
        })
    }

    pub fn into_template(self) -> Result<Template, DatabaseError> {
        Ok(Template {
            id: self.id,
            name: self.name,
            description: self.description,
            category: self.category,
            configuration: serde_json::from_str(&self.configuration)?,
            created_by: self.created_by,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            is_public: self.is_public,
            usage_count: self.usage_count.max(0) as u64,
        })
    }
}

/// Inserts a new template row. Fails on a duplicate name.
pub fn insert(db: &Database, template: &TemplateRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO job_templates (id, name, description, category, configuration,
             created_by, created_at, is_public, usage_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                template.id,
                template.name,
                template.description,
                template.category,
                template.configuration,
                template.created_by,
                template.created_at,
                template.is_public,
                template.usage_count,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<TemplateRow>, DatabaseError> {
    find_one(db, "SELECT * FROM job_templates WHERE id = ?1", id)
}

pub fn find_by_name(db: &Database, name: &str) -> Result<Option<TemplateRow>, DatabaseError> {
    find_one(db, "SELECT * FROM job_templates WHERE name = ?1", name)
}

fn find_one(db: &Database, sql: &str, key: &str) -> Result<Option<TemplateRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query_map(params![key], TemplateRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists templates, optionally restricted to one category, ordered by name.
pub fn list(db: &Database, category: Option<&str>) -> Result<Vec<TemplateRow>, DatabaseError> {
    db.with_conn(|conn| {
        let rows = match category {
            Some(category) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM job_templates WHERE category = ?1 ORDER BY name ASC",
                )?;
                let rows = stmt
                    .query_map(params![category], TemplateRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare("SELECT * FROM job_templates ORDER BY name ASC")?;
                let rows = stmt
                    .query_map([], TemplateRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    })
}

/// Bumps the usage counter by one. Returns false for an unknown id.
pub fn increment_usage(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let affected = conn.execute(
            "UPDATE job_templates SET usage_count = usage_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(affected > 0)
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM job_templates", [], |r| r.get(0))?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ExtractionLevel, JobConfig};
    use chrono::Utc;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(id: &str, name: &str, category: &str) -> TemplateRow {
        let template = Template {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            category: Some(category.to_string()),
            configuration: JobConfig {
                extraction_level: ExtractionLevel::ContentParsing,
                max_depth: 7,
                ..Default::default()
            },
            created_by: None,
            created_at: Utc::now(),
            is_public: true,
            usage_count: 0,
        };
        TemplateRow::from_template(&template).unwrap()
    }

    #[test]
    fn test_insert_find_and_restore() {
        let db = test_db();
        insert(&db, &sample("t1", "Census", "analytics")).unwrap();

        let row = find_by_name(&db, "Census").unwrap().unwrap();
        assert_eq!(row.id, "t1");
        let template = row.into_template().unwrap();
        assert_eq!(template.configuration.max_depth, 7);
        assert_eq!(
            template.configuration.extraction_level,
            ExtractionLevel::ContentParsing
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let db = test_db();
        insert(&db, &sample("t1", "Census", "analytics")).unwrap();
        assert!(insert(&db, &sample("t2", "Census", "analytics")).is_err());
    }

    #[test]
    fn test_list_by_category() {
        let db = test_db();
        insert(&db, &sample("t1", "B", "analytics")).unwrap();
        insert(&db, &sample("t2", "A", "analytics")).unwrap();
        insert(&db, &sample("t3", "C", "security")).unwrap();

        let all = list(&db, None).unwrap();
        assert_eq!(all.len(), 3);
        let analytics = list(&db, Some("analytics")).unwrap();
        let names: Vec<&str> = analytics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(count(&db).unwrap(), 3);
    }

    #[test]
    fn test_increment_usage() {
        let db = test_db();
        insert(&db, &sample("t1", "Census", "analytics")).unwrap();

        assert!(increment_usage(&db, "t1").unwrap());
        assert!(increment_usage(&db, "t1").unwrap());
        assert!(!increment_usage(&db, "missing").unwrap());
        assert_eq!(find_by_id(&db, "t1").unwrap().unwrap().usage_count, 2);
    }
}
