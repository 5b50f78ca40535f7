use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::nullable;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "gender", rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Child {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub disability_type: Option<String>,
    pub school: Option<String>,
    pub class_name: Option<String>,
    pub group_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChildRequest {
    pub parent_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub disability_type: Option<String>,
    pub school: Option<String>,
    pub class_name: Option<String>,
    pub group_id: Option<Uuid>,
    pub teacher_id: Option<Uuid>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub notes: Option<String>,
}

/// Omitted fields are left unchanged. `group_id` and `teacher_id` accept an
/// explicit `null` to unassign.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateChildRequest {
    pub parent_id: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub disability_type: Option<String>,
    pub school: Option<String>,
    pub class_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub group_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub teacher_id: Option<Option<Uuid>>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

/// The only part of a child record a parent may edit.
#[derive(Debug, Deserialize)]
pub struct UpdateEmergencyContactRequest {
    pub emergency_contact_name: String,
    pub emergency_contact_phone: String,
}

#[derive(Debug, Deserialize)]
pub struct ChildQuery {
    pub q: Option<String>,
    pub group_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
}

impl CreateChildRequest {
    pub fn validate(&self, today: NaiveDate) -> Result<(), &'static str> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err("First and last name are required");
        }
        if self.birth_date > today {
            return Err("Birth date cannot be in the future");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(birth_date: NaiveDate) -> CreateChildRequest {
        CreateChildRequest {
            parent_id: Uuid::new_v4(),
            first_name: "Ama".into(),
            last_name: "Mensah".into(),
            birth_date,
            gender: Gender::Female,
            disability_type: None,
            school: None,
            class_name: None,
            group_id: None,
            teacher_id: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            notes: None,
        }
    }

    #[test]
    fn test_validate_birth_date() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(request(NaiveDate::from_ymd_opt(2021, 5, 4).unwrap()).validate(today).is_ok());
        assert!(request(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()).validate(today).is_err());
    }

    #[test]
    fn test_validate_requires_names() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let mut req = request(NaiveDate::from_ymd_opt(2021, 5, 4).unwrap());
        req.last_name = "  ".into();
        assert!(req.validate(today).is_err());
    }
}
