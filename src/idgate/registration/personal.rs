use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};

use crate::idgate::{Error, Result};

/// The first registration step's form.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(serialize_with = "expose_password")]
    pub password: SecretString,
    pub phone_number: String,
    pub address: String,
    pub date_of_birth: String,
    pub nic_number: String,
}

fn expose_password<S: Serializer>(password: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(password.expose_secret())
}

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").is_ok_and(|re| re.is_match(email))
}

/// Old format is nine digits and a V or X, new format is twelve digits.
pub fn valid_nic(nic: &str) -> bool {
    Regex::new(r"^(?:[0-9]{9}[VX]|[0-9]{12})$").is_ok_and(|re| re.is_match(nic))
}

pub fn valid_mobile(mobile: &str) -> bool {
    Regex::new(r"^(\+94|0)[1-9][0-9]{8}$").is_ok_and(|re| re.is_match(mobile))
}

pub fn valid_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(char::is_lowercase)
        && password.chars().any(char::is_uppercase)
}

impl PersonalInfo {
    /// Trims every text field and upper-cases the NIC number.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.first_name,
            &mut self.last_name,
            &mut self.email,
            &mut self.phone_number,
            &mut self.address,
            &mut self.date_of_birth,
        ] {
            *field = field.trim().to_string();
        }
        self.nic_number = self.nic_number.trim().to_uppercase();
        self
    }

    /// Checks the form locally. Every problem is reported at once.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] listing each invalid field.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for (name, value) in [
            ("first name", &self.first_name),
            ("last name", &self.last_name),
            ("address", &self.address),
            ("date of birth", &self.date_of_birth),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{name} is required"));
            }
        }
        if !valid_email(self.email.trim()) {
            problems.push("invalid email format".to_string());
        }
        if !valid_password(self.password.expose_secret()) {
            problems.push(
                "password must be at least 8 characters with an uppercase letter, a lowercase letter and a digit"
                    .to_string(),
            );
        }
        if !valid_mobile(self.phone_number.trim()) {
            problems.push("invalid mobile number format".to_string());
        }
        if !valid_nic(&self.nic_number.trim().to_uppercase()) {
            problems.push("invalid NIC number format".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(problems.join("; ")))
        }
    }
}
