use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{OwnerId, ProjectId};

/// Defines a string-backed enumeration whose unknown values are kept in an
/// `Other` variant, so documents written by other clients survive a
/// read-modify-write unchanged.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $value,)+
                    Self::Other(s) => s.as_str(),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.as_str() {
                    $($value => Self::$variant,)+
                    _ => Self::Other(s),
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

pub(crate) use string_enum;

string_enum! {
    /// Kind of work the project tracks.
    pub enum ProjectType {
        Software => "software",
        Marketing => "marketing",
        Design => "design",
        Research => "research",
    }
}

string_enum! {
    /// Scale used when voting on stories.
    pub enum EstimationMethod {
        Fibonacci => "fibonacci",
        TShirt => "tshirt",
        PowersOfTwo => "powers_of_two",
        Linear => "linear",
    }
}

string_enum! {
    /// Preferred sprint length.
    pub enum SprintDuration {
        OneWeek => "1_week",
        TwoWeeks => "2_weeks",
        ThreeWeeks => "3_weeks",
        FourWeeks => "4_weeks",
        Custom => "custom",
    }
}

/// A project as stored in the `projects` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub organization: String,
    pub project_type: ProjectType,
    pub estimation_method: EstimationMethod,
    pub sprint_duration: SprintDuration,
    pub owner_id: OwnerId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Cached number of sprints belonging to this project. May lag behind
    /// the `sprints` collection until the next reconciliation.
    pub sprints_count: u64,
}

/// Caller-supplied fields of a project about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub organization: String,
    pub project_type: ProjectType,
    pub estimation_method: EstimationMethod,
    pub sprint_duration: SprintDuration,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            organization: String::new(),
            project_type: ProjectType::Software,
            estimation_method: EstimationMethod::Fibonacci,
            sprint_duration: SprintDuration::TwoWeeks,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = organization.into();
        self
    }

    pub fn with_project_type(mut self, project_type: impl Into<ProjectType>) -> Self {
        self.project_type = project_type.into();
        self
    }

    pub fn with_estimation_method(mut self, method: impl Into<EstimationMethod>) -> Self {
        self.estimation_method = method.into();
        self
    }

    pub fn with_sprint_duration(mut self, duration: impl Into<SprintDuration>) -> Self {
        self.sprint_duration = duration.into();
        self
    }
}

/// A partial update of a project's mutable fields.
///
/// Identity, owner and creation time are not representable here, so they
/// cannot be changed through an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub organization: Option<String>,
    pub project_type: Option<ProjectType>,
    pub estimation_method: Option<EstimationMethod>,
    pub sprint_duration: Option<SprintDuration>,
    pub sprints_count: Option<u64>,
}

impl ProjectUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn project_type(mut self, project_type: impl Into<ProjectType>) -> Self {
        self.project_type = Some(project_type.into());
        self
    }

    pub fn estimation_method(mut self, method: impl Into<EstimationMethod>) -> Self {
        self.estimation_method = Some(method.into());
        self
    }

    pub fn sprint_duration(mut self, duration: impl Into<SprintDuration>) -> Self {
        self.sprint_duration = Some(duration.into());
        self
    }

    pub fn sprints_count(mut self, count: u64) -> Self {
        self.sprints_count = Some(count);
        self
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values_map_to_variants() {
        assert_eq!(EstimationMethod::from("tshirt"), EstimationMethod::TShirt);
        assert_eq!(SprintDuration::from("2_weeks").as_str(), "2_weeks");
    }

    #[test]
    fn unknown_values_are_preserved() {
        let kind = ProjectType::from("hardware");
        assert_eq!(kind, ProjectType::Other("hardware".into()));
        assert_eq!(kind.to_string(), "hardware");
    }

    #[test]
    fn enums_serialize_as_plain_strings() {
        let json = serde_json::to_string(&EstimationMethod::PowersOfTwo).unwrap();
        assert_eq!(json, "\"powers_of_two\"");
        let back: EstimationMethod = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EstimationMethod::PowersOfTwo);
    }

}
