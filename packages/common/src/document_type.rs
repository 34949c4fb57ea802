#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::status::{ParseEnumError, Role};

/// Canonical document types a student can hold one current slot of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Internship completion certificate, generated from a template.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "adeverinta_finalizare_stagiu"))]
    AdeverintaFinalizareStagiu,
    /// Graduation certificate.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "certificat_absolvire"))]
    CertificatAbsolvire,
    /// Signed study contract.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "contract_studii"))]
    ContractStudii,
    /// Sworn declaration, filled in and uploaded by the student.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "declaratie_proprie_raspundere"))]
    DeclaratieProprieRaspundere,
    /// Personal data processing consent.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "acord_prelucrare_date"))]
    AcordPrelucrareDate,
}

impl DocumentType {
    pub const ALL: &'static [DocumentType] = &[
        Self::AdeverintaFinalizareStagiu,
        Self::CertificatAbsolvire,
        Self::ContractStudii,
        Self::DeclaratieProprieRaspundere,
        Self::AcordPrelucrareDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdeverintaFinalizareStagiu => "adeverinta_finalizare_stagiu",
            Self::CertificatAbsolvire => "certificat_absolvire",
            Self::ContractStudii => "contract_studii",
            Self::DeclaratieProprieRaspundere => "declaratie_proprie_raspundere",
            Self::AcordPrelucrareDate => "acord_prelucrare_date",
        }
    }

    /// Roles that may create a slot of this type.
    ///
    /// Staff may always issue; students only for self-service declarations.
    pub fn allowed_uploaders(&self) -> &'static [Role] {
        match self {
            Self::DeclaratieProprieRaspundere | Self::AcordPrelucrareDate => {
                &[Role::Admin, Role::Tutor, Role::Student]
            }
            _ => Role::STAFF,
        }
    }

    pub fn is_self_service(&self) -> bool {
        self.allowed_uploaders().contains(&Role::Student)
    }

    pub fn allows_uploader(&self, role: Role) -> bool {
        self.allowed_uploaders().contains(&role)
    }

    /// Deterministic blob filename for a staff-issued document of this type.
    pub fn canonical_filename(&self, student_id: i32) -> String {
        format!("{}_student_{}.pdf", self.as_str(), student_id)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                ParseEnumError::new("document type", s, &valid)
            })
    }
}
