use std::collections::HashMap;
use std::path::Path;

use crate::config::ConfigError;
use crate::types::CourseDefinition;

/// Read-only set of authored courses, keyed by course id.
#[derive(Debug, Clone, Default)]
pub struct CourseCatalog {
    courses: HashMap<String, CourseDefinition>,
}

impl CourseCatalog {
    pub fn new(courses: impl IntoIterator<Item = CourseDefinition>) -> Self {
        Self {
            courses: courses.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    /// Loads a JSON array of course definitions.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::CatalogRead {
                path: path.to_path_buf(),
                source,
            })?;
        let courses: Vec<CourseDefinition> =
            serde_json::from_str(&raw).map_err(|source| ConfigError::CatalogParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(courses))
    }

    pub fn get(&self, course_id: &str) -> Option<&CourseDefinition> {
        self.courses.get(course_id)
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}
