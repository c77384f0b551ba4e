use docstore::{Document, FieldValue, FieldWrites, StoreError, Value};

use crate::domain::models::{NewProject, OwnerId, Project, ProjectId, ProjectUpdate};

pub(crate) const PROJECTS: &str = "projects";
pub(crate) const SPRINTS: &str = "sprints";

pub(crate) mod fields {
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const ORGANIZATION: &str = "organization";
    pub const PROJECT_TYPE: &str = "projectType";
    pub const ESTIMATION_METHOD: &str = "estimationMethod";
    pub const SPRINT_DURATION: &str = "sprintDuration";
    pub const OWNER_ID: &str = "ownerId";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const SPRINTS_COUNT: &str = "sprintsCount";
    pub const PROJECT_ID: &str = "projectId";
    pub const STATUS: &str = "status";
}

pub(crate) fn count_value(count: u64) -> FieldValue {
    FieldValue::value(i64::try_from(count).unwrap_or(i64::MAX))
}

/// Stored count, with a missing or negative field read as 0.
pub(crate) fn stored_sprints_count(doc: &Document) -> u64 {
    doc.optional_integer(fields::SPRINTS_COUNT)
        .and_then(|c| u64::try_from(c).ok())
        .unwrap_or(0)
}

/// Stored count exactly as written, `None` unless it is an integer.
pub(crate) fn raw_sprints_count(doc: &Document) -> Option<i64> {
    match doc.get(fields::SPRINTS_COUNT) {
        Some(Value::Integer(count)) => Some(*count),
        _ => None,
    }
}

/// Convert a `projects` document to a domain Project.
pub(crate) fn to_domain_project(doc: &Document) -> Result<Project, StoreError> {
    Ok(Project {
        id: ProjectId::new(doc.id.clone()),
        name: doc.string(fields::NAME)?,
        description: doc.optional_string(fields::DESCRIPTION).unwrap_or_default(),
        organization: doc.optional_string(fields::ORGANIZATION).unwrap_or_default(),
        project_type: doc.string(fields::PROJECT_TYPE)?.into(),
        estimation_method: doc.string(fields::ESTIMATION_METHOD)?.into(),
        sprint_duration: doc.string(fields::SPRINT_DURATION)?.into(),
        owner_id: OwnerId::new(doc.string(fields::OWNER_ID)?),
        created_at: doc
            .optional_timestamp(fields::CREATED_AT)
            .unwrap_or(doc.create_time),
        updated_at: doc
            .optional_timestamp(fields::UPDATED_AT)
            .unwrap_or(doc.update_time),
        sprints_count: stored_sprints_count(doc),
    })
}

/// Full field set of a newly created project.
pub(crate) fn new_project_fields(project: &NewProject, owner: &OwnerId) -> FieldWrites {
    let mut writes = FieldWrites::new();
    writes.insert(fields::NAME.into(), FieldValue::value(&project.name));
    writes.insert(fields::DESCRIPTION.into(), FieldValue::value(&project.description));
    writes.insert(fields::ORGANIZATION.into(), FieldValue::value(&project.organization));
    writes.insert(
        fields::PROJECT_TYPE.into(),
        FieldValue::value(project.project_type.as_str()),
    );
    writes.insert(
        fields::ESTIMATION_METHOD.into(),
        FieldValue::value(project.estimation_method.as_str()),
    );
    writes.insert(
        fields::SPRINT_DURATION.into(),
        FieldValue::value(project.sprint_duration.as_str()),
    );
    writes.insert(fields::OWNER_ID.into(), FieldValue::value(owner.as_str()));
    writes.insert(fields::SPRINTS_COUNT.into(), count_value(0));
    writes.insert(fields::CREATED_AT.into(), FieldValue::ServerTimestamp);
    writes.insert(fields::UPDATED_AT.into(), FieldValue::ServerTimestamp);
    writes
}

/// Fields named in the update, plus a refreshed `updatedAt`.
pub(crate) fn update_fields(update: &ProjectUpdate) -> FieldWrites {
    let mut writes = FieldWrites::new();

    let strings = [
        (fields::NAME, update.name.as_deref()),
        (fields::DESCRIPTION, update.description.as_deref()),
        (fields::ORGANIZATION, update.organization.as_deref()),
        (
            fields::PROJECT_TYPE,
            update.project_type.as_ref().map(|t| t.as_str()),
        ),
        (
            fields::ESTIMATION_METHOD,
            update.estimation_method.as_ref().map(|m| m.as_str()),
        ),
        (
            fields::SPRINT_DURATION,
            update.sprint_duration.as_ref().map(|d| d.as_str()),
        ),
    ];
    for (field, value) in strings {
        if let Some(value) = value {
            writes.insert(field.into(), FieldValue::value(value));
        }
    }

    if let Some(count) = update.sprints_count {
        writes.insert(fields::SPRINTS_COUNT.into(), count_value(count));
    }

    writes.insert(fields::UPDATED_AT.into(), FieldValue::ServerTimestamp);
    writes
}

/// Fields written when correcting or bumping the cached sprint count.
pub(crate) fn sprints_count_fields(count: FieldValue) -> FieldWrites {
    let mut writes = FieldWrites::new();
    writes.insert(fields::SPRINTS_COUNT.into(), count);
    writes.insert(fields::UPDATED_AT.into(), FieldValue::ServerTimestamp);
    writes
}

/// Ids of a batch of project documents as store values.
pub(crate) fn id_values(ids: &[ProjectId]) -> Value {
    Value::Array(ids.iter().map(|id| Value::from(id.as_str())).collect())
}
