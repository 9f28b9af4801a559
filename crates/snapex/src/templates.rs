//! Named, reusable job configurations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{template_repo, Database};
use crate::error::{Result, SnapexError, ValidationError};
use crate::job::{ExtractionLevel, FileTypeFilter, JobConfig, JobSpec};

/// A stored template. `configuration` holds every job knob; name, backup
/// and description are supplied when a job is instantiated from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub configuration: JobConfig,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_public: bool,
    pub usage_count: u64,
}

/// Input for creating a template.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemplateDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub configuration: JobConfig,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

impl TemplateDraft {
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        self.configuration.validate()
    }
}

pub struct TemplateStore {
    db: Database,
}

impl TemplateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, draft: TemplateDraft) -> Result<Template> {
        draft.validate()?;
        if template_repo::find_by_name(&self.db, &draft.name)?.is_some() {
            return Err(ValidationError::Invalid {
                field: "name",
                reason: format!("a template named '{}' already exists", draft.name),
            }
            .into());
        }

        let template = Template {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            description: draft.description,
            category: draft.category,
            configuration: draft.configuration,
            created_by: draft.created_by,
            created_at: Utc::now(),
            is_public: draft.is_public,
            usage_count: 0,
        };
        template_repo::insert(&self.db, &template_repo::TemplateRow::from_template(&template)?)?;
        log::info!("Created template '{}' ({})", template.name, template.id);
        Ok(template)
    }

    pub fn get(&self, id: &str) -> Result<Template> {
        template_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| SnapexError::template_not_found(id))?
            .into_template()
            .map_err(Into::into)
    }

    pub fn list(&self, category: Option<&str>) -> Result<Vec<Template>> {
        template_repo::list(&self.db, category)?
            .into_iter()
            .map(|row| row.into_template().map_err(Into::into))
            .collect()
    }

    pub fn count(&self) -> Result<u64> {
        Ok(template_repo::count(&self.db)?)
    }

    /// Produces a job spec carrying the template's configuration and bumps
    /// its usage counter. Without a description override the spec records
    /// which template it came from.
    pub fn instantiate(
        &self,
        template_id: &str,
        name: &str,
        backup_id: &str,
        description: Option<String>,
        created_by: Option<String>,
    ) -> Result<JobSpec> {
        let template = self.get(template_id)?;

        let mut spec = JobSpec::new(name, backup_id).with_config(template.configuration);
        spec.description =
            description.unwrap_or_else(|| format!("Created from template: {}", template.name));
        spec.created_by = created_by;
        spec.validate()?;

        if !template_repo::increment_usage(&self.db, template_id)? {
            return Err(SnapexError::template_not_found(template_id));
        }
        Ok(spec)
    }

    /// Inserts every built-in template whose name is not taken yet. Returns
    /// how many were added.
    pub fn seed_defaults(&self) -> Result<usize> {
        let mut added = 0;
        for draft in default_templates() {
            if template_repo::find_by_name(&self.db, &draft.name)?.is_some() {
                continue;
            }
            self.create(draft)?;
            added += 1;
        }
        if added > 0 {
            log::info!("Seeded {} default templates", added);
        }
        Ok(added)
    }
}

/// Built-in templates, all owned by `system`.
pub fn default_templates() -> Vec<TemplateDraft> {
    let base = JobConfig::default();
    let draft = |name: &str, description: &str, category: &str, configuration: JobConfig| {
        TemplateDraft {
            name: name.to_string(),
            description: description.to_string(),
            category: Some(category.to_string()),
            configuration,
            created_by: Some("system".to_string()),
            is_public: true,
        }
    };

    vec![
        draft(
            "File System Census",
            "Extract metadata only for file system analysis",
            "analytics",
            JobConfig {
                extraction_level: ExtractionLevel::MetadataOnly,
                file_type_filter: FileTypeFilter::AllFiles,
                max_depth: 5,
                include_attributes: true,
                ..base.clone()
            },
        ),
        draft(
            "Document Analysis",
            "Extract and parse document content for NLP analysis",
            "analytics",
            JobConfig {
                extraction_level: ExtractionLevel::ContentParsing,
                file_type_filter: FileTypeFilter::DocumentsOnly,
                max_depth: 3,
                chunk_size: 2000,
                enable_document_parsing: true,
                enable_spreadsheet_parsing: true,
                enable_presentation_parsing: true,
                include_chunks: true,
                include_embeddings: true,
                ..base.clone()
            },
        ),
        draft(
            "Database Forensics",
            "Extract database content for forensic analysis",
            "forensics",
            JobConfig {
                extraction_level: ExtractionLevel::DatabaseExtraction,
                file_type_filter: FileTypeFilter::DatabasesOnly,
                max_depth: 2,
                enable_sqlite_extraction: true,
                enable_sql_dump_parsing: true,
                enable_enterprise_db_extraction: true,
                max_db_rows_per_table: 5000,
                ..base.clone()
            },
        ),
        draft(
            "Compliance Audit",
            "Full pipeline extraction for compliance auditing",
            "compliance",
            JobConfig {
                extraction_level: ExtractionLevel::FullPipeline,
                file_type_filter: FileTypeFilter::AllFiles,
                max_depth: 4,
                max_file_size: 100 * 1024 * 1024,
                chunk_size: 1500,
                include_attributes: true,
                enable_document_parsing: true,
                enable_log_parsing: true,
                enable_config_parsing: true,
                include_raw_content: true,
                include_chunks: true,
                ..base.clone()
            },
        ),
        draft(
            "Log Analysis",
            "Extract and parse log files for security analysis",
            "security",
            JobConfig {
                extraction_level: ExtractionLevel::ContentParsing,
                file_type_filter: FileTypeFilter::LogsOnly,
                max_depth: 3,
                chunk_size: 1000,
                enable_log_parsing: true,
                include_raw_content: true,
                include_chunks: true,
                ..base
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TemplateStore {
        TemplateStore::new(Database::open_in_memory().unwrap())
    }

    fn draft(name: &str) -> TemplateDraft {
        TemplateDraft {
            name: name.to_string(),
            description: "custom".to_string(),
            category: Some("ops".to_string()),
            configuration: JobConfig {
                extraction_level: ExtractionLevel::FullPipeline,
                max_depth: 9,
                chunk_size: 500,
                include_embeddings: true,
                ..Default::default()
            },
            created_by: Some("bob".to_string()),
            is_public: true,
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let created = store.create(draft("Ops")).unwrap();
        let fetched = store.get(&created.id).unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.usage_count, 0);
    }

    #[test]
    fn test_create_rejects_blank_and_duplicate_names() {
        let store = store();
        assert!(matches!(
            store.create(draft("  ")),
            Err(SnapexError::Validation(ValidationError::MissingField("name")))
        ));
        store.create(draft("Ops")).unwrap();
        assert!(matches!(
            store.create(draft("Ops")),
            Err(SnapexError::Validation(_))
        ));
    }

    #[test]
    fn test_instantiate_copies_configuration_and_counts_usage() {
        let store = store();
        let template = store.create(draft("Ops")).unwrap();

        let spec = store
            .instantiate(&template.id, "nightly", "backup-7", None, None)
            .unwrap();
        assert_eq!(spec.name, "nightly");
        assert_eq!(spec.backup_id, "backup-7");
        assert_eq!(spec.config, template.configuration);
        assert_eq!(spec.description, "Created from template: Ops");
        assert_eq!(store.get(&template.id).unwrap().usage_count, 1);

        let spec = store
            .instantiate(&template.id, "again", "b", Some("mine".into()), None)
            .unwrap();
        assert_eq!(spec.description, "mine");
        assert_eq!(store.get(&template.id).unwrap().usage_count, 2);
    }

    #[test]
    fn test_instantiate_unknown_template() {
        let store = store();
        assert!(matches!(
            store.instantiate("nope", "n", "b", None, None),
            Err(SnapexError::NotFound { kind: "Template", .. })
        ));
    }

    #[test]
    fn test_instantiate_validates_name_without_counting() {
        let store = store();
        let template = store.create(draft("Ops")).unwrap();
        assert!(store
            .instantiate(&template.id, "", "b", None, None)
            .is_err());
        assert_eq!(store.get(&template.id).unwrap().usage_count, 0);
    }

    #[test]
    fn test_seed_defaults_is_idempotent() {
        let store = store();
        assert_eq!(store.seed_defaults().unwrap(), 5);
        assert_eq!(store.seed_defaults().unwrap(), 0);
        assert_eq!(store.count().unwrap(), 5);

        let analytics = store.list(Some("analytics")).unwrap();
        assert_eq!(analytics.len(), 2);
        assert!(analytics
            .iter()
            .all(|t| t.created_by.as_deref() == Some("system")));

        let forensics = store.list(Some("forensics")).unwrap();
        assert_eq!(forensics[0].configuration.max_db_rows_per_table, 5000);
    }

    #[test]
    fn test_default_templates_are_valid() {
        for template in default_templates() {
            assert!(template.validate().is_ok(), "{}", template.name);
        }
    }
}
