//! Request bodies (with field validation) and response payloads.
//!
//! Request fields are all optional at the decoding stage so a missing field
//! becomes a field-scoped "Field is required" instead of a decode failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eproc_core::{
    FeatureId, FieldErrors, ModuleId, Page, RoleId, UserId, VehicleId, VehicleTypeId,
};
use eproc_infra::store::{
    FeatureInput, FeatureRecord, LoanRecord, ModuleInput, ModuleRecord, RoleInput, RoleRecord,
    UserChanges, UserRecord, VehicleInput, VehicleRecord, VehicleTypeRecord,
};

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn owned(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Lists
// ─────────────────────────────────────────────────────────────────────────────

/// `data` of a list response: the plain array, or a page when the client
/// asked for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Listed<T> {
    All(Vec<T>),
    Paged(Page<T>),
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn validate(self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors
            .text("username_or_email", text(&self.username_or_email))
            .required()
            .no_space();
        errors.text("password", text(&self.password)).required();
        errors.into_result()?;
        Ok((
            owned(self.username_or_email),
            self.password.unwrap_or_default(),
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginView {
    #[serde(rename = "loginAt")]
    pub login_at: DateTime<Utc>,
    pub user: String,
    pub role: String,
    pub token: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ModuleRequest {
    pub name: Option<String>,
    pub parent_id: Option<i64>,
}

impl ModuleRequest {
    pub fn validate(self) -> Result<ModuleInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.text("name", text(&self.name)).required();
        errors.into_result()?;
        Ok(ModuleInput {
            name: owned(self.name),
            parent_id: self.parent_id.map(ModuleId::new),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleView {
    pub id: ModuleId,
    pub name: String,
    pub parent_id: Option<ModuleId>,
}

impl From<ModuleRecord> for ModuleView {
    fn from(r: ModuleRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            parent_id: r.parent_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDetail {
    pub id: ModuleId,
    pub name: String,
    pub parent_id: Option<ModuleId>,
    pub children: Vec<ModuleView>,
    pub features: Vec<FeatureView>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Features
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FeatureRequest {
    pub name: Option<String>,
    pub module_id: Option<i64>,
}

impl FeatureRequest {
    pub fn validate(self) -> Result<FeatureInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.text("name", text(&self.name)).required();
        errors.require("module_id", self.module_id.as_ref());
        errors.into_result()?;
        Ok(FeatureInput {
            name: owned(self.name),
            module_id: ModuleId::new(self.module_id.unwrap_or_default()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureView {
    pub id: FeatureId,
    pub name: String,
    pub module_id: ModuleId,
}

impl From<FeatureRecord> for FeatureView {
    fn from(r: FeatureRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            module_id: r.module_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureDetail {
    pub id: FeatureId,
    pub name: String,
    pub module_id: ModuleId,
    pub module: ModuleView,
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub name: Option<String>,
    pub is_administrative: Option<bool>,
    pub features: Option<Vec<i64>>,
}

impl RoleRequest {
    pub fn validate(self) -> Result<RoleInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.text("name", text(&self.name)).required();
        errors.require("features", self.features.as_ref());
        errors.into_result()?;

        let mut features: Vec<FeatureId> = Vec::new();
        for id in self.features.unwrap_or_default() {
            let id = FeatureId::new(id);
            if !features.contains(&id) {
                features.push(id);
            }
        }
        Ok(RoleInput {
            name: owned(self.name),
            is_administrative: self.is_administrative.unwrap_or(false),
            features,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleView {
    pub id: RoleId,
    pub name: String,
    pub is_administrative: bool,
}

impl From<RoleRecord> for RoleView {
    fn from(r: RoleRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            is_administrative: r.is_administrative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDetail {
    pub id: RoleId,
    pub name: String,
    pub is_administrative: bool,
    pub features: Vec<FeatureView>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// A validated create-user body; the password is still plain text.
#[derive(Debug, Clone)]
pub struct UserDraft {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: RoleId,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role_id: Option<i64>,
}

fn check_profile(
    errors: &mut FieldErrors,
    username: &Option<String>,
    name: &Option<String>,
    email: &Option<String>,
    role_id: Option<&i64>,
) {
    errors
        .text("username", text(username))
        .required()
        .min_chars(3)
        .max_chars(50)
        .no_space();
    errors
        .text("name", text(name))
        .required()
        .min_chars(3)
        .max_chars(100);
    errors.text("email", text(email)).required().email();
    errors.require("role_id", role_id);
}

impl CreateUserRequest {
    pub fn validate(self) -> Result<UserDraft, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_profile(
            &mut errors,
            &self.username,
            &self.name,
            &self.email,
            self.role_id.as_ref(),
        );
        errors
            .text("password", text(&self.password))
            .required()
            .min_chars(6);
        errors.into_result()?;
        Ok(UserDraft {
            username: owned(self.username),
            name: owned(self.name),
            email: owned(self.email),
            password: self.password.unwrap_or_default(),
            role_id: RoleId::new(self.role_id.unwrap_or_default()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role_id: Option<i64>,
}

impl UpdateUserRequest {
    pub fn validate(self) -> Result<UserChanges, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_profile(
            &mut errors,
            &self.username,
            &self.name,
            &self.email,
            self.role_id.as_ref(),
        );
        errors.into_result()?;
        Ok(UserChanges {
            username: owned(self.username),
            name: owned(self.name),
            email: owned(self.email),
            role_id: RoleId::new(self.role_id.unwrap_or_default()),
        })
    }
}

pub const MSG_PASSWORD_MISMATCH: &str = "Re-Password and Password are different";

fn check_new_password(
    errors: &mut FieldErrors,
    password: &Option<String>,
    re_password: &Option<String>,
) {
    let password_ok = errors
        .text("password", text(password))
        .required()
        .min_chars(6)
        .ok();
    let re_password_ok = errors
        .text("re_password", text(re_password))
        .required()
        .min_chars(6)
        .ok();
    if password_ok && re_password_ok && password != re_password {
        errors.add("password", MSG_PASSWORD_MISMATCH);
        errors.add("re_password", MSG_PASSWORD_MISMATCH);
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
    pub re_password: Option<String>,
}

impl ResetPasswordRequest {
    /// The new password.
    pub fn validate(self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_new_password(&mut errors, &self.password, &self.re_password);
        errors.into_result()?;
        Ok(self.password.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub password: Option<String>,
    pub re_password: Option<String>,
}

impl ChangePasswordRequest {
    /// `(old, new)` passwords.
    pub fn validate(self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        errors
            .text("old_password", text(&self.old_password))
            .required()
            .min_chars(6);
        check_new_password(&mut errors, &self.password, &self.re_password);
        errors.into_result()?;
        Ok((
            self.old_password.unwrap_or_default(),
            self.password.unwrap_or_default(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub name: String,
    pub email: String,
    pub role_id: RoleId,
    pub role_name: String,
}

impl From<UserRecord> for UserView {
    fn from(r: UserRecord) -> Self {
        Self {
            id: r.id,
            username: r.username,
            name: r.name,
            email: r.email,
            role_id: r.role_id,
            role_name: r.role_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserView,
    pub role: RoleView,
}

// ─────────────────────────────────────────────────────────────────────────────
// Fleet
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VehicleTypeRequest {
    pub name: Option<String>,
}

impl VehicleTypeRequest {
    pub fn validate(self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.text("name", text(&self.name)).required();
        errors.into_result()?;
        Ok(owned(self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleTypeView {
    pub id: VehicleTypeId,
    pub name: String,
}

impl From<VehicleTypeRecord> for VehicleTypeView {
    fn from(r: VehicleTypeRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VehicleRequest {
    pub type_id: Option<i64>,
    pub name: Option<String>,
    pub police_number: Option<String>,
    pub is_available: Option<bool>,
}

impl VehicleRequest {
    pub fn validate(self) -> Result<VehicleInput, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require("type_id", self.type_id.as_ref());
        errors
            .text("name", text(&self.name))
            .required()
            .min_chars(3)
            .max_chars(100);
        errors
            .text("police_number", text(&self.police_number))
            .required();
        errors.into_result()?;
        Ok(VehicleInput {
            type_id: VehicleTypeId::new(self.type_id.unwrap_or_default()),
            name: owned(self.name),
            police_number: owned(self.police_number),
            is_available: self.is_available,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleView {
    pub id: VehicleId,
    pub type_id: VehicleTypeId,
    pub name: String,
    pub police_number: String,
    pub is_available: bool,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleTypeView,
}

impl From<VehicleRecord> for VehicleView {
    fn from(r: VehicleRecord) -> Self {
        Self {
            id: r.id,
            type_id: r.type_id,
            name: r.name,
            police_number: r.police_number,
            is_available: r.is_available,
            vehicle_type: VehicleTypeView {
                id: r.type_id,
                name: r.type_name,
            },
        }
    }
}

/// A validated loan body. `user_id` is filled in by the service when absent.
#[derive(Debug, Clone)]
pub struct LoanDraft {
    pub user_id: Option<UserId>,
    pub vehicle_id: VehicleId,
    pub purpose: String,
    pub return_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct LoanRequest {
    pub user_id: Option<i64>,
    pub vehicle_id: Option<i64>,
    pub purpose: Option<String>,
    pub return_time: Option<DateTime<Utc>>,
}

impl LoanRequest {
    pub fn validate(self) -> Result<LoanDraft, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.require("vehicle_id", self.vehicle_id.as_ref());
        errors.text("purpose", text(&self.purpose)).required();
        errors.into_result()?;
        Ok(LoanDraft {
            user_id: self.user_id.map(UserId::new),
            vehicle_id: VehicleId::new(self.vehicle_id.unwrap_or_default()),
            purpose: owned(self.purpose),
            return_time: self.return_time,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanUserView {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanVehicleView {
    pub id: VehicleId,
    pub name: String,
    pub police_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanView {
    pub id: eproc_core::LoanId,
    pub user_id: UserId,
    pub vehicle_id: VehicleId,
    pub purpose: String,
    pub return_time: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub user: LoanUserView,
    pub vehicle: LoanVehicleView,
}

impl From<LoanRecord> for LoanView {
    fn from(r: LoanRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            vehicle_id: r.vehicle_id,
            purpose: r.purpose,
            return_time: r.return_time,
            returned_at: r.returned_at,
            user: LoanUserView {
                id: r.user_id,
                name: r.user_name,
            },
            vehicle: LoanVehicleView {
                id: r.vehicle_id,
                name: r.vehicle_name,
                police_number: r.police_number,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_reported_together() {
        let errors = CreateUserRequest {
            username: Some("with space".into()),
            name: None,
            email: Some("nope".into()),
            password: Some("123".into()),
            role_id: None,
        }
        .validate()
        .unwrap_err();

        assert_eq!(errors.get("username"), Some("Field should not contain spaces"));
        assert_eq!(errors.get("name"), Some("Field is required"));
        assert_eq!(errors.get("email"), Some("Invalid email format"));
        assert_eq!(
            errors.get("password"),
            Some("Field require minimum of 6 size/length/unit")
        );
        assert_eq!(errors.get("role_id"), Some("Field is required"));
    }

    #[test]
    fn role_features_are_required_but_may_be_empty() {
        let errors = RoleRequest {
            name: Some("Clerk".into()),
            is_administrative: None,
            features: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.get("features"), Some("Field is required"));

        let input = RoleRequest {
            name: Some("Clerk".into()),
            is_administrative: None,
            features: Some(vec![3, 1, 3]),
        }
        .validate()
        .unwrap();
        assert!(!input.is_administrative);
        assert_eq!(input.features, vec![FeatureId::new(3), FeatureId::new(1)]);
    }

    #[test]
    fn password_mismatch_flags_both_fields() {
        let errors = ResetPasswordRequest {
            password: Some("secret1".into()),
            re_password: Some("secret2".into()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(errors.get("password"), Some(MSG_PASSWORD_MISMATCH));
        assert_eq!(errors.get("re_password"), Some(MSG_PASSWORD_MISMATCH));

        let (old, new) = ChangePasswordRequest {
            old_password: Some("changeme".into()),
            password: Some("secret1".into()),
            re_password: Some("secret1".into()),
        }
        .validate()
        .unwrap();
        assert_eq!((old.as_str(), new.as_str()), ("changeme", "secret1"));
    }

    #[test]
    fn vehicle_payload_nests_type() {
        let view = VehicleView {
            id: VehicleId::new(1),
            type_id: VehicleTypeId::new(2),
            name: "Avanza".into(),
            police_number: "B 1234 XY".into(),
            is_available: true,
            vehicle_type: VehicleTypeView {
                id: VehicleTypeId::new(2),
                name: "Car".into(),
            },
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"]["name"], "Car");
        assert_eq!(json["type_id"], 2);
    }

    #[test]
    fn login_payload_uses_login_at() {
        let view = LoginView {
            login_at: Utc::now(),
            user: "Administrator".into(),
            role: "Administrator".into(),
            token: "Bearer x".into(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("loginAt").is_some());
    }
}
