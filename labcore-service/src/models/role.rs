//! Roles and the capability matrix.
//!
//! Authorisation is a single `Role::permits(Action)` check applied at the
//! service boundary; handlers never inspect role strings directly.

use serde::{Deserialize, Serialize};

/// User role within a lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Pathologist,
    SeniorTech,
    Technician,
    Receptionist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Pathologist => "pathologist",
            Role::SeniorTech => "senior_tech",
            Role::Technician => "technician",
            Role::Receptionist => "receptionist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "pathologist" => Some(Role::Pathologist),
            "senior_tech" => Some(Role::SeniorTech),
            "technician" => Some(Role::Technician),
            "receptionist" => Some(Role::Receptionist),
            _ => None,
        }
    }
}

/// Actions gated by the capability matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RegisterPatient,
    CreateOrder,
    CancelOrder,
    UpdateSample,
    EnterResults,
    ReviewResults,
    AuthoriseResults,
    RevertResults,
    RecordPayment,
    GenerateReport,
    AmendReport,
    ManageCatalog,
    ViewAudit,
}

impl Role {
    /// Whether this role is allowed to perform the given action.
    pub fn permits(&self, action: Action) -> bool {
        use Action::*;
        use Role::*;

        if *self == Admin {
            return true;
        }

        match action {
            RegisterPatient | CreateOrder | CancelOrder | RecordPayment => {
                matches!(self, Receptionist)
            }
            UpdateSample | EnterResults | RevertResults => {
                matches!(self, Technician | SeniorTech | Pathologist)
            }
            ReviewResults => matches!(self, SeniorTech | Pathologist),
            AuthoriseResults | AmendReport => matches!(self, Pathologist),
            GenerateReport => matches!(self, Receptionist | SeniorTech | Pathologist),
            ManageCatalog | ViewAudit => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_permits_everything() {
        for action in [
            Action::RegisterPatient,
            Action::CreateOrder,
            Action::CancelOrder,
            Action::UpdateSample,
            Action::EnterResults,
            Action::ReviewResults,
            Action::AuthoriseResults,
            Action::RevertResults,
            Action::RecordPayment,
            Action::GenerateReport,
            Action::AmendReport,
            Action::ManageCatalog,
            Action::ViewAudit,
        ] {
            assert!(Role::Admin.permits(action), "admin denied {:?}", action);
        }
    }

    #[test]
    fn technician_enters_but_cannot_review_or_authorise() {
        assert!(Role::Technician.permits(Action::EnterResults));
        assert!(!Role::Technician.permits(Action::ReviewResults));
        assert!(!Role::Technician.permits(Action::AuthoriseResults));
    }

    #[test]
    fn senior_tech_reviews_but_cannot_authorise() {
        assert!(Role::SeniorTech.permits(Action::ReviewResults));
        assert!(!Role::SeniorTech.permits(Action::AuthoriseResults));
    }

    #[test]
    fn pathologist_authorises_and_amends() {
        assert!(Role::Pathologist.permits(Action::AuthoriseResults));
        assert!(Role::Pathologist.permits(Action::AmendReport));
        assert!(!Role::Pathologist.permits(Action::RecordPayment));
    }

    #[test]
    fn receptionist_handles_front_desk_only() {
        assert!(Role::Receptionist.permits(Action::CreateOrder));
        assert!(Role::Receptionist.permits(Action::RecordPayment));
        assert!(!Role::Receptionist.permits(Action::EnterResults));
        assert!(!Role::Receptionist.permits(Action::ViewAudit));
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [
            Role::Admin,
            Role::Pathologist,
            Role::SeniorTech,
            Role::Technician,
            Role::Receptionist,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superuser"), None);
    }
}
