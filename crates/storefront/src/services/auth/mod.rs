//! Authentication service.
//!
//! Password registration, login and password changes. Hashes are argon2id
//! PHC strings with a random salt per password.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use mypeteats_core::{Email, UserRole};

use crate::db::{RepositoryError, Store};
use crate::models::{NewUser, User};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum display name length.
pub const MAX_NAME_LENGTH: usize = 120;

/// A self-service signup.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub join_club: bool,
}

/// Authentication service.
///
/// Handles user registration, login and password management.
pub struct AuthService<'a> {
    store: &'a dyn Store,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new customer with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` if email or password is empty.
    /// Returns `AuthError::WeakPassword` if the password is too short.
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(&self, registration: Registration) -> Result<User, AuthError> {
        if registration.email.trim().is_empty() || registration.password.is_empty() {
            return Err(AuthError::MissingCredentials(
                "Email and password are required",
            ));
        }
        validate_password(&registration.password, "Password")?;
        let email = Email::parse(&registration.email)?;

        let name = registration.name.unwrap_or_default().trim().to_string();
        validate_name(&name)?;

        self.create(NewUser {
            name,
            email,
            password_hash: hash_password(&registration.password)?,
            role: UserRole::Customer,
            phone: None,
            club_member: registration.join_club,
        })
        .await
    }

    /// Create a back-office account with the given role.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`].
    pub async fn create_staff(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials(
                "Email and password are required",
            ));
        }
        validate_password(password, "Password")?;
        let email = Email::parse(email)?;
        let name = name.trim().to_string();
        validate_name(&name)?;

        self.create(NewUser {
            name,
            email,
            password_hash: hash_password(password)?,
            role,
            phone: None,
            club_member: false,
        })
        .await
    }

    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        self.store.insert_user(user).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::Repository(other),
        })
    }

    /// Login with an email address or a display name, plus password.
    ///
    /// Identifiers containing `@` are looked up by email, anything else by
    /// name.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the user is unknown or the
    /// password is wrong.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<User, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials(
                "Username/email and password are required",
            ));
        }

        let user = if identifier.contains('@') {
            match Email::parse(identifier) {
                Ok(email) => self.store.user_by_email(&email).await?,
                Err(_) => None,
            }
        } else {
            self.store.user_by_name(identifier).await?
        };

        // Hash anyway so unknown users take as long as wrong passwords.
        let Some(user) = user else {
            let _ = hash_password(password);
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(password, &user.password_hash)?;
        Ok(user)
    }

    /// Replace a user's password after checking the current one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WrongCurrentPassword` if `current` does not match.
    /// Returns `AuthError::WeakPassword` if `new` is too short.
    pub async fn change_password(
        &self,
        user: &User,
        current: &str,
        new: &str,
    ) -> Result<User, AuthError> {
        if current.is_empty() || new.is_empty() {
            return Err(AuthError::MissingCredentials(
                "Current password and new password are required",
            ));
        }
        validate_password(new, "New password")?;
        verify_password(current, &user.password_hash)
            .map_err(|_| AuthError::WrongCurrentPassword)?;

        let updated = User {
            password_hash: hash_password(new)?,
            ..user.clone()
        };
        Ok(self.store.update_user(&updated).await?)
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Apply a self-service profile edit.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidName`, `AuthError::InvalidEmail`, or
    /// `AuthError::UserAlreadyExists` when the new email belongs to someone
    /// else.
    pub async fn update_profile(
        &self,
        user: &User,
        update: ProfileUpdate,
    ) -> Result<User, AuthError> {
        let mut updated = user.clone();

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            validate_name(&name)?;
            updated.name = name;
        }
        if let Some(email) = update.email.filter(|e| !e.trim().is_empty()) {
            let email = Email::parse(&email)?;
            if email != user.email
                && let Some(other) = self.store.user_by_email(&email).await?
                && other.id != user.id
            {
                return Err(AuthError::UserAlreadyExists);
            }
            updated.email = email;
        }
        if let Some(phone) = update.phone {
            let phone = phone.trim().to_string();
            updated.phone = (!phone.is_empty()).then_some(phone);
        }

        self.store.update_user(&updated).await.map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::Repository(other),
        })
    }

    /// Enroll the user in the loyalty club.
    ///
    /// Returns `None` when the user is already a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn join_club(&self, user: &User) -> Result<Option<User>, AuthError> {
        if user.club_member {
            return Ok(None);
        }
        let updated = User {
            club_member: true,
            ..user.clone()
        };
        Ok(Some(self.store.update_user(&updated).await?))
    }
}

/// A self-service profile edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Blank clears the phone number.
    pub phone: Option<String>,
}

/// Validate password meets requirements.
///
/// `label` names the field in the error message.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is too short.
pub fn validate_password(password: &str, label: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "{label} must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Validate a display name.
///
/// # Errors
///
/// Returns `AuthError::InvalidName` if the name is too long.
pub fn validate_name(name: &str) -> Result<(), AuthError> {
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::InvalidName(format!(
            "Name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
