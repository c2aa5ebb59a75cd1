//! CRUD operations over projects and tests, including the bucket history
//! reconciliation performed on test updates.
//!
//! Updates are computed as a pure function over an immutable snapshot of
//! the stored record plus a partial-update request, with a single save at
//! the end. A rejected field therefore discards the whole update instead of
//! leaving a half-mutated record behind.

use crate::error::{Error, Result};
use crate::history::{self, MetaInfo};
use crate::model::{BucketValue, Project, Test};
use crate::store::Store;
use crate::tags;
use chrono::Utc;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::Value;

const REQUIRED_TEST_KEYS: &str = "bucket,uuid,project";
const DISALLOWED_UUID_CHARS: [char; 2] = [',', '|'];

/// New-project request. `name` is required; everything else is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub app_areas: Option<Vec<String>>,
}

/// Partial project update; only present, non-empty fields apply.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub app_areas: Option<Vec<String>>,
}

/// New-test request. `bucket` and `uuid` are required; the owning project
/// comes from the request path. `bucket` is raw JSON so that malformed
/// values degrade to "absent" instead of failing deserialization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTest {
    pub name: Option<String>,
    pub bucket: Option<Value>,
    pub uuid: Option<String>,
    pub app_area: Option<String>,
}

/// Partial test update; only present, non-empty fields apply.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestUpdate {
    pub name: Option<String>,
    pub bucket: Option<Value>,
    pub app_area: Option<String>,
}

/// The registry service. Cheap to clone; all clones share one store.
#[derive(Clone)]
pub struct Registry {
    store: Store,
}

impl Registry {
    pub fn new(store: Store) -> Self {
        Registry { store }
    }

    // ---- projects ----

    pub fn projects(&self) -> Vec<Project> {
        self.store.projects()
    }

    pub fn project(&self, name: &str) -> Result<Project> {
        self.store
            .project(name)
            .ok_or_else(|| Error::NotFound("Resource not found.".into()))
    }

    pub fn create_project(&self, request: NewProject) -> Result<Project> {
        let Some(name) = non_empty(request.name.as_deref()) else {
            return Err(Error::Validation("Record is invalid. Expecting name".into()));
        };

        if self.store.project(&name).is_some() {
            return Err(Error::Conflict(format!(
                "Conflict: Resource with name '{name}' already exists."
            )));
        }

        let project = Project {
            name,
            description: non_empty(request.description.as_deref()),
            app_areas: Some(compact(request.app_areas.unwrap_or_default())),
        };
        self.store.insert_project(project.clone())?;
        tracing::info!(project = %project.name, "created project");
        Ok(project)
    }

    pub fn update_project(&self, name: &str, update: ProjectUpdate) -> Result<Project> {
        let existing = self.store.project(name).ok_or_else(|| {
            Error::NotFound(format!("Resource with name: {name} not found."))
        })?;

        let mut project = existing;
        if let Some(new_name) = non_empty(update.name.as_deref()) {
            project.name = new_name;
        }
        if let Some(description) = non_empty(update.description.as_deref()) {
            project.description = Some(description);
        }
        if let Some(app_areas) = update.app_areas {
            project.app_areas = Some(compact(app_areas));
        }

        self.store.replace_project(name, project.clone())?;
        Ok(project)
    }

    pub fn delete_project(&self, name: &str) -> Result<()> {
        if self.store.remove_project(name)? {
            Ok(())
        } else {
            Err(Error::NotFound(format!(
                "Resource with name: {name} not found."
            )))
        }
    }

    pub fn search_projects(&self, field: &str, query: &str) -> Result<Vec<Project>> {
        let pattern = search_pattern(query)?;
        Ok(self
            .store
            .projects()
            .into_iter()
            .filter(|project| match field {
                "name" => pattern.is_match(&project.name),
                "description" => project
                    .description
                    .as_deref()
                    .is_some_and(|d| pattern.is_match(d)),
                "appAreas" => project
                    .app_areas
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .any(|area| pattern.is_match(area)),
                // Unknown fields match nothing, like a query on a missing
                // document field.
                _ => false,
            })
            .collect())
    }

    // ---- tests ----

    pub fn tests(&self, project: &str) -> Vec<Test> {
        self.store.tests(project)
    }

    pub fn test(&self, project: &str, uuid: &str) -> Result<Test> {
        self.store
            .test(project, uuid)
            .ok_or_else(|| Error::NotFound("Resource not found.".into()))
    }

    pub fn create_test(&self, project: &str, request: NewTest) -> Result<Test> {
        let bucket = request
            .bucket
            .as_ref()
            .and_then(BucketValue::from_json);
        let uuid = non_empty(request.uuid.as_deref());

        let (Some(bucket), Some(uuid)) = (bucket, uuid) else {
            return Err(Error::Validation(format!(
                "Record is invalid. Expecting {REQUIRED_TEST_KEYS}"
            )));
        };
        if project.is_empty() {
            return Err(Error::Validation(format!(
                "Record is invalid. Expecting {REQUIRED_TEST_KEYS}"
            )));
        }

        if DISALLOWED_UUID_CHARS.iter().any(|c| uuid.contains(*c)) {
            return Err(Error::Validation("UUID does not allow: ',' or '|'".into()));
        }

        let app_area = non_empty(request.app_area.as_deref());
        if let Some(area) = app_area.as_deref() {
            match self.contains_valid_app_area(project, area) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(Error::Validation(
                        "AppArea is not valid for this project.".into(),
                    ));
                }
                Err(err) => return Err(Error::Validation(err.to_string())),
            }
        }

        if self.store.test(project, &uuid).is_some() {
            return Err(Error::Conflict(format!(
                "Conflict: Resource with uuid '{uuid}' already exists."
            )));
        }

        let mut meta_info = MetaInfo::new();
        history::seed_new_tags(
            &mut meta_info,
            &tags::filter_tags(&bucket.tags(), tags::NEW_TAG_SUFFIX),
            Utc::now(),
        );

        let test = Test {
            name: non_empty(request.name.as_deref()),
            bucket,
            uuid,
            project: project.to_owned(),
            app_area,
            meta_info,
        };
        self.store.insert_test(test.clone())?;
        tracing::info!(project, uuid = %test.uuid, "created test");
        Ok(test)
    }

    pub fn update_test(&self, project: &str, uuid: &str, update: TestUpdate) -> Result<Test> {
        let existing = self.store.test(project, uuid).ok_or_else(|| {
            Error::NotFound(format!("Resource with uuid: {uuid} not found."))
        })?;

        // Validate before touching anything so a rejected app area leaves
        // the stored record exactly as it was.
        if let Some(area) = non_empty(update.app_area.as_deref()) {
            if !self.contains_valid_app_area(project, &area)? {
                return Err(Error::NotFound(
                    "AppArea is not valid for this project.".into(),
                ));
            }
        }

        let updated = reconciled_test(&existing, &update, project);
        self.store.replace_test(project, uuid, updated.clone())?;
        Ok(updated)
    }

    pub fn delete_test(&self, project: &str, uuid: &str) -> Result<()> {
        if self.store.remove_test(project, uuid)? {
            Ok(())
        } else {
            Err(Error::NotFound(format!(
                "Resource with uuid: {uuid} not found."
            )))
        }
    }

    pub fn search_tests(&self, project: &str, field: &str, query: &str) -> Result<Vec<Test>> {
        let pattern = search_pattern(query)?;
        Ok(self
            .store
            .tests(project)
            .into_iter()
            .filter(|test| match field {
                "name" => test.name.as_deref().is_some_and(|n| pattern.is_match(n)),
                "bucket" => match &test.bucket {
                    BucketValue::Text(text) => pattern.is_match(text),
                    BucketValue::Tags(list) => list.iter().any(|tag| pattern.is_match(tag)),
                },
                "uuid" => pattern.is_match(&test.uuid),
                "project" => pattern.is_match(&test.project),
                "appArea" => test
                    .app_area
                    .as_deref()
                    .is_some_and(|a| pattern.is_match(a)),
                _ => false,
            })
            .collect())
    }

    /// Whether `app_area` is one of the areas the named project permits.
    ///
    /// Fails with a not-found error when the project does not exist or has
    /// no app areas defined at all.
    pub fn contains_valid_app_area(&self, project: &str, app_area: &str) -> Result<bool> {
        let found = self
            .store
            .project(project)
            .ok_or_else(|| Error::NotFound(format!("Project {project} not found")))?;
        let areas = found.app_areas.as_deref().ok_or_else(|| {
            Error::NotFound(format!("No appAreas found for project {project}"))
        })?;
        Ok(areas.iter().any(|area| area == app_area))
    }
}

/// Applies a partial update to a snapshot of the stored test, reconciling
/// bucket history when the bucket changed. Pure; the caller persists the
/// result once.
fn reconciled_test(existing: &Test, update: &TestUpdate, project: &str) -> Test {
    let mut test = existing.clone();

    if let Some(name) = non_empty(update.name.as_deref()) {
        test.name = Some(name);
    }
    test.project = project.to_owned();

    if let Some(bucket) = update.bucket.as_ref().and_then(BucketValue::from_json) {
        let diff = tags::difference(&test.bucket.tags(), &bucket.tags());
        history::apply_diff(&mut test.meta_info, &diff, Utc::now());
        test.bucket = bucket;
    }

    if let Some(area) = non_empty(update.app_area.as_deref()) {
        test.app_area = Some(area);
    }

    test
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_owned)
}

/// Drops empty entries, mirroring how sparse app-area lists are compacted
/// on write.
fn compact(areas: Vec<String>) -> Vec<String> {
    areas.into_iter().filter(|area| !area.is_empty()).collect()
}

/// Case-insensitive substring matcher for the literal query.
fn search_pattern(query: &str) -> Result<Regex> {
    RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
        .map_err(|err| Error::Validation(err.to_string()))
}
