//! Operation and entity classification.
//!
//! [`OperationType`] is the closed set of request kinds the scheduler
//! recognizes. [`EXECUTION_ORDER`] is the fixed total order buckets are
//! replayed in: parents before children, creations before links, so that
//! every reference a later operation resolves has already been committed
//! by an earlier one within the same batch.

use serde::{Deserialize, Serialize};

/// Kind of entity a request creates, links, or reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Organization,
    School,
    Class,
    User,
    Program,
}

impl EntityKind {
    /// Wire-format string for storage and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::School => "school",
            Self::Class => "class",
            Self::User => "user",
            Self::Program => "program",
        }
    }

    /// Parent entity kind a create request must reference, if any.
    #[must_use]
    pub fn parent_kind(self) -> Option<EntityKind> {
        match self {
            Self::Organization | Self::Program => None,
            Self::School => Some(Self::Organization),
            Self::Class => Some(Self::School),
            Self::User => Some(Self::Organization),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the seven association operations between an owning entity and
/// a list of child entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    UsersToOrganization,
    UsersToSchool,
    ClassesToSchool,
    UsersToClass,
    ProgramsToSchool,
    ProgramsToClass,
    ProgramsToUser,
}

impl LinkKind {
    /// Wire-format string for storage and logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UsersToOrganization => "users_to_organization",
            Self::UsersToSchool => "users_to_school",
            Self::ClassesToSchool => "classes_to_school",
            Self::UsersToClass => "users_to_class",
            Self::ProgramsToSchool => "programs_to_school",
            Self::ProgramsToClass => "programs_to_class",
            Self::ProgramsToUser => "programs_to_user",
        }
    }

    /// Kind of the owning entity.
    #[must_use]
    pub fn owner_kind(self) -> EntityKind {
        match self {
            Self::UsersToOrganization => EntityKind::Organization,
            Self::UsersToSchool | Self::ClassesToSchool | Self::ProgramsToSchool => {
                EntityKind::School
            }
            Self::UsersToClass | Self::ProgramsToClass => EntityKind::Class,
            Self::ProgramsToUser => EntityKind::User,
        }
    }

    /// Kind of the child entities being attached.
    #[must_use]
    pub fn child_kind(self) -> EntityKind {
        match self {
            Self::UsersToOrganization | Self::UsersToSchool | Self::UsersToClass => {
                EntityKind::User
            }
            Self::ClassesToSchool => EntityKind::Class,
            Self::ProgramsToSchool | Self::ProgramsToClass | Self::ProgramsToUser => {
                EntityKind::Program
            }
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of operations the scheduler recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    CreateOrganization,
    CreateSchool,
    CreateClass,
    CreateUser,
    AddUsersToOrganization,
    AddUsersToSchool,
    AddClassesToSchool,
    AddUsersToClass,
    AddProgramsToSchool,
    AddProgramsToClass,
    AddProgramsToUser,
}

/// Fixed total processing order for a batch.
///
/// Hard-coded rather than derived from a dependency graph; when adding an
/// operation type this list must be kept consistent by hand.
pub const EXECUTION_ORDER: [OperationType; 11] = [
    OperationType::CreateOrganization,
    OperationType::CreateSchool,
    OperationType::CreateClass,
    OperationType::CreateUser,
    OperationType::AddUsersToOrganization,
    OperationType::AddUsersToSchool,
    OperationType::AddClassesToSchool,
    OperationType::AddUsersToClass,
    OperationType::AddProgramsToSchool,
    OperationType::AddProgramsToClass,
    OperationType::AddProgramsToUser,
];

impl OperationType {
    /// Wire-format string for logging and stream routing.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateOrganization => "create_organization",
            Self::CreateSchool => "create_school",
            Self::CreateClass => "create_class",
            Self::CreateUser => "create_user",
            Self::AddUsersToOrganization => "add_users_to_organization",
            Self::AddUsersToSchool => "add_users_to_school",
            Self::AddClassesToSchool => "add_classes_to_school",
            Self::AddUsersToClass => "add_users_to_class",
            Self::AddProgramsToSchool => "add_programs_to_school",
            Self::AddProgramsToClass => "add_programs_to_class",
            Self::AddProgramsToUser => "add_programs_to_user",
        }
    }

    /// The association kind, for link operations.
    #[must_use]
    pub fn link_kind(self) -> Option<LinkKind> {
        match self {
            Self::AddUsersToOrganization => Some(LinkKind::UsersToOrganization),
            Self::AddUsersToSchool => Some(LinkKind::UsersToSchool),
            Self::AddClassesToSchool => Some(LinkKind::ClassesToSchool),
            Self::AddUsersToClass => Some(LinkKind::UsersToClass),
            Self::AddProgramsToSchool => Some(LinkKind::ProgramsToSchool),
            Self::AddProgramsToClass => Some(LinkKind::ProgramsToClass),
            Self::AddProgramsToUser => Some(LinkKind::ProgramsToUser),
            _ => None,
        }
    }

    /// Entity kind created by a create operation.
    #[must_use]
    pub fn created_kind(self) -> Option<EntityKind> {
        match self {
            Self::CreateOrganization => Some(EntityKind::Organization),
            Self::CreateSchool => Some(EntityKind::School),
            Self::CreateClass => Some(EntityKind::Class),
            Self::CreateUser => Some(EntityKind::User),
            _ => None,
        }
    }

    /// Entity kind Responses for this operation report on: the created
    /// entity for creations, the child entity for links.
    #[must_use]
    pub fn response_kind(self) -> EntityKind {
        match (self.created_kind(), self.link_kind()) {
            (Some(kind), _) => kind,
            (None, Some(link)) => link.child_kind(),
            // Every variant is either a create or a link.
            (None, None) => unreachable!(),
        }
    }

    /// Returns `true` for the seven association operations.
    #[must_use]
    pub fn is_link(self) -> bool {
        self.link_kind().is_some()
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
