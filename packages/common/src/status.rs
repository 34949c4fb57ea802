#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when parsing an invalid enum string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind} '{invalid}'. Valid values: {valid}")]
pub struct ParseEnumError {
    kind: &'static str,
    invalid: String,
    valid: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, invalid: &str, valid: &[&str]) -> Self {
        Self {
            kind,
            invalid: invalid.to_string(),
            valid: valid.join(", "),
        }
    }
}

/// Review state of a student application.
///
/// `Pending -> Approved` and `Pending -> Rejected` are the only transitions;
/// a rejected application may be re-reviewed (note refresh) but never approved,
/// and nothing leaves `Approved`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "pending"))]
    Pending,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "approved"))]
    Approved,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "rejected"))]
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: &'static [ApplicationStatus] = &[Self::Pending, Self::Approved, Self::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Whether an approval may be (re-)applied from this state.
    pub fn can_approve(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    /// Whether a rejection may be (re-)applied from this state.
    pub fn can_reject(&self) -> bool {
        matches!(self, Self::Pending | Self::Rejected)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseEnumError::new(
                "application status",
                s,
                &["pending", "approved", "rejected"],
            )),
        }
    }
}

/// Enrollment state of a materialized student record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "active"))]
    Active,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "inactive"))]
    Inactive,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "graduate"))]
    Graduate,
}

impl StudentStatus {
    pub const ALL: &'static [StudentStatus] = &[Self::Active, Self::Inactive, Self::Graduate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Graduate => "graduate",
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StudentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "graduate" => Ok(Self::Graduate),
            _ => Err(ParseEnumError::new(
                "student status",
                s,
                &["active", "inactive", "graduate"],
            )),
        }
    }
}

/// Account role carried in the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "admin"))]
    Admin,
    /// Tutor. Stored under the program's own name for the role.
    #[serde(rename = "tutore")]
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "tutore"))]
    Tutor,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "student"))]
    Student,
}

impl Role {
    /// Roles allowed to manage program data (everything except self-service).
    pub const STAFF: &'static [Role] = &[Self::Admin, Self::Tutor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Tutor => "tutore",
            Self::Student => "student",
        }
    }

    pub fn is_staff(&self) -> bool {
        Self::STAFF.contains(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "tutore" => Ok(Self::Tutor),
            "student" => Ok(Self::Student),
            _ => Err(ParseEnumError::new(
                "role",
                s,
                &["admin", "tutore", "student"],
            )),
        }
    }
}

/// Who may read a material.
///
/// Never stored: derived from the material's public flag and its grant rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Restricted,
    Private,
}

impl Visibility {
    /// Derive the visibility from the stored public flag and the grant counts.
    pub fn derive(is_public: bool, series_grants: usize, student_grants: usize) -> Self {
        if is_public {
            Self::Public
        } else if series_grants + student_grants > 0 {
            Self::Restricted
        } else {
            Self::Private
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Restricted => "restricted",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "restricted" => Ok(Self::Restricted),
            "private" => Ok(Self::Private),
            _ => Err(ParseEnumError::new(
                "visibility",
                s,
                &["public", "restricted", "private"],
            )),
        }
    }
}

/// Lifecycle marker of a document slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Created by staff (generated or signed upload).
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "issued"))]
    Issued,
    /// Uploaded by the student, awaiting review.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "submitted"))]
    Submitted,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "validated"))]
    Validated,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "rejected"))]
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Submitted => "submitted",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
