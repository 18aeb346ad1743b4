//! User accounts, registration and the farmer verification workflow
use crate::error::{RemoteError, ValidationError};
use crate::moderation::{self, Moderated, TransitionPolicy};
use crate::types::{ApprovalStatus, Role, TimeStamp};
use crate::utils;
use serde::{Deserialize, Serialize};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    #[n(0)]
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    #[serde(default)]
    pub role: Role,
    #[n(4)]
    #[serde(default)]
    pub contact: String,
    #[n(5)]
    #[serde(default)]
    pub address: String,
    #[n(6)]
    #[serde(default, rename = "document")]
    pub document_ref: Option<String>,
    // is_verified and status only ever change together, see `apply_status`
    #[n(7)]
    #[serde(default)]
    is_verified: bool,
    #[n(8)]
    #[serde(default)]
    status: Option<ApprovalStatus>,
    #[n(9)]
    #[serde(skip)]
    password_salt: String,
    #[n(10)]
    #[serde(skip)]
    password_digest: String,
    #[n(11)]
    #[serde(default)]
    pub created_at: TimeStamp,
}

impl UserAccount {
    pub fn is_farmer(&self) -> bool {
        self.role == Role::Farmer
    }
    pub fn is_verified(&self) -> bool {
        self.is_verified
    }
    /// Verification status; only farmers have one.
    pub fn farmer_status(&self) -> Option<ApprovalStatus> {
        self.status
    }

    /// Farmers may only log in once an admin has approved them.
    pub fn can_login(&self) -> bool {
        !self.is_farmer() || (self.status == Some(ApprovalStatus::Approved) && self.is_verified)
    }

    pub fn verify_password(&self, password: &str) -> bool {
        !self.password_digest.is_empty()
            && utils::digest_password(&self.password_salt, password) == self.password_digest
    }

    /// Admin decision on a farmer. Returns the previous status.
    pub fn set_farmer_status(
        &mut self,
        actor: Role,
        to: ApprovalStatus,
        policy: TransitionPolicy,
    ) -> Result<ApprovalStatus, RemoteError> {
        if !self.is_farmer() {
            return Err(RemoteError::NotFound(format!("farmer {}", self.id)));
        }
        moderation::transition(self, actor, to, policy)
    }
}

impl Moderated for UserAccount {
    fn status(&self) -> ApprovalStatus {
        self.status.unwrap_or_default()
    }
    fn apply_status(&mut self, status: ApprovalStatus) {
        self.status = Some(status);
        self.is_verified = status == ApprovalStatus::Approved;
    }
}

/// Sign-up form data, shared by shopper, farmer and admin registration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registration {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    contact: Option<String>,
    address: Option<String>,
    document_ref: Option<String>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn set_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
    pub fn set_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
    pub fn set_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }
    pub fn set_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
    pub fn set_document_ref(mut self, document: impl Into<String>) -> Self {
        self.document_ref = Some(document.into());
        self
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Checks the form the way the sign-up pages do before anything is sent.
    pub fn validate_for(&self, role: Role) -> Result<(), ValidationError> {
        let name = self.name.as_deref().map(str::trim).unwrap_or_default();
        let email = self.email.as_deref().map(str::trim).unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();
        let contact = self.contact.as_deref().map(str::trim).unwrap_or_default();

        if name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if email.is_empty() {
            return Err(ValidationError::MissingField("email"));
        }
        if password.is_empty() {
            return Err(ValidationError::MissingField("password"));
        }
        if !is_valid_email(email) {
            return Err(ValidationError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
        }
        if role == Role::Farmer {
            if contact.is_empty() {
                return Err(ValidationError::MissingField("contact"));
            }
            if self.document_ref.as_deref().is_none_or(|d| d.trim().is_empty()) {
                return Err(ValidationError::MissingField("document"));
            }
        }
        if !contact.is_empty() && !is_valid_contact(contact) {
            return Err(ValidationError::InvalidContact);
        }
        Ok(())
    }

    /// Build the stored account. Farmers start pending and unverified.
    pub fn into_account(self, id: String, role: Role) -> Result<UserAccount, ValidationError> {
        self.validate_for(role)?;

        let salt = utils::new_salt();
        let digest = utils::digest_password(&salt, self.password.as_deref().unwrap_or_default());
        let is_farmer = role == Role::Farmer;

        Ok(UserAccount {
            id,
            name: self.name.unwrap_or_default().trim().to_string(),
            email: normalise_email(self.email.as_deref().unwrap_or_default()),
            role,
            contact: self.contact.unwrap_or_default().trim().to_string(),
            address: self.address.unwrap_or_default().trim().to_string(),
            document_ref: if is_farmer { self.document_ref } else { None },
            is_verified: false,
            status: is_farmer.then_some(ApprovalStatus::Pending),
            password_salt: salt,
            password_digest: digest,
            created_at: TimeStamp::new(),
        })
    }

    /// JSON body for the plain registration endpoints.
    pub fn to_json(&self, role: Role) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "email": self.email,
            "password": self.password,
            "contact": self.contact,
            "address": self.address,
            "userType": role,
        })
    }

    /// Form fields for the multipart farmer registration.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("password", &self.password),
            ("phone", &self.contact),
            ("address", &self.address),
            ("document", &self.document_ref),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key, v)))
        .collect()
    }
}

/// Emails are unique case-insensitively.
pub fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// same shape the sign-up form accepts: something@something.something, no spaces
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .rsplit_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

fn is_valid_contact(contact: &str) -> bool {
    contact.len() == 10 && contact.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farmer_form() -> Registration {
        Registration::new()
            .set_name("Asha")
            .set_email("Asha@Farm.in")
            .set_password("harvest")
            .set_contact("9876543210")
            .set_address("Nashik")
            .set_document_ref("uploads/land-record.pdf")
    }

    #[test]
    fn new_farmer_is_pending_and_cannot_login() {
        let account = farmer_form().into_account("user_1".into(), Role::Farmer).unwrap();

        assert_eq!(account.farmer_status(), Some(ApprovalStatus::Pending));
        assert!(!account.is_verified());
        assert!(!account.can_login());
        assert_eq!(account.email, "asha@farm.in");
    }

    #[test]
    fn approval_and_rejection_pair_verification() {
        let mut account = farmer_form().into_account("user_1".into(), Role::Farmer).unwrap();

        account
            .set_farmer_status(Role::Admin, ApprovalStatus::Approved, TransitionPolicy::Free)
            .unwrap();
        assert!(account.is_verified());
        assert!(account.can_login());

        account
            .set_farmer_status(Role::Admin, ApprovalStatus::Rejected, TransitionPolicy::Free)
            .unwrap();
        assert!(!account.is_verified());
        assert!(!account.can_login());
    }

    #[test]
    fn shoppers_have_no_verification_workflow() {
        let mut account = Registration::new()
            .set_name("Ravi")
            .set_email("ravi@example.com")
            .set_password("secret1")
            .into_account("user_2".into(), Role::User)
            .unwrap();

        assert!(account.can_login());
        assert_eq!(account.farmer_status(), None);
        let err = account
            .set_farmer_status(Role::Admin, ApprovalStatus::Approved, TransitionPolicy::Free)
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));
    }

    #[test]
    fn password_is_only_kept_as_digest() {
        let account = farmer_form().into_account("user_1".into(), Role::Farmer).unwrap();

        assert!(account.verify_password("harvest"));
        assert!(!account.verify_password("Harvest"));
        assert!(!serde_json::to_string(&account).unwrap().contains("harvest"));
    }

    #[test]
    fn form_validation() {
        assert_eq!(
            farmer_form().set_email("not-an-email").validate_for(Role::Farmer),
            Err(ValidationError::InvalidEmail)
        );
        assert_eq!(
            farmer_form().set_contact("12345").validate_for(Role::Farmer),
            Err(ValidationError::InvalidContact)
        );
        assert_eq!(
            farmer_form().set_password("abc").validate_for(Role::Farmer),
            Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN))
        );
        assert_eq!(
            farmer_form().set_document_ref(" ").validate_for(Role::Farmer),
            Err(ValidationError::MissingField("document"))
        );
    }
}
