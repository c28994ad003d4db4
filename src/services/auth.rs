use crate::core::session::Session;
use crate::services::api::{ApiError, AuthApi, Credentials};
use log::{error, info, warn};
use regex::Regex;
use std::sync::{Arc, LazyLock};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Per-field messages for the login and register forms.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FormErrors {
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none() && self.confirm_password.is_none()
    }

    fn password(message: &str) -> Self {
        Self {
            password: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// All messages, in form order.
    pub fn messages(&self) -> Vec<&str> {
        [&self.email, &self.password, &self.confirm_password]
            .into_iter()
            .filter_map(|m| m.as_deref())
            .collect()
    }
}

/// Something of the form `x@y.z` appears in the input, whitespace aside.
static EMAIL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").ok());

pub fn looks_like_email(input: &str) -> bool {
    EMAIL.as_ref().is_some_and(|re| re.is_match(input))
}

fn check_email(email: &str, errors: &mut FormErrors) {
    if email.is_empty() {
        errors.email = Some("Email is required".to_string());
    } else if !looks_like_email(email) {
        errors.email = Some("Invalid email format".to_string());
    }
}

pub fn validate_login(email: &str, password: &str) -> FormErrors {
    let mut errors = FormErrors::default();
    check_email(email, &mut errors);
    if password.is_empty() {
        errors.password = Some("Password is required".to_string());
    }
    errors
}

pub fn validate_register(email: &str, password: &str, confirm_password: &str) -> FormErrors {
    let mut errors = FormErrors::default();
    check_email(email, &mut errors);

    if password.is_empty() {
        errors.password = Some("Password is required".to_string());
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.password = Some(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }

    if confirm_password.is_empty() {
        errors.confirm_password = Some("Please confirm your password".to_string());
    } else if password != confirm_password {
        errors.confirm_password = Some("Passwords do not match".to_string());
    }
    errors
}

/// Obtains and revokes the token kept in the session.
pub struct AuthService {
    api: Arc<dyn AuthApi>,
    session: Arc<dyn Session>,
}

impl AuthService {
    pub fn new(api: Arc<dyn AuthApi>, session: Arc<dyn Session>) -> Self {
        Self { api, session }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.token().is_some()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), FormErrors> {
        let errors = validate_login(email, password);
        if !errors.is_empty() {
            return Err(errors);
        }

        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };

        match self.api.login(&credentials).await {
            Ok(token) => {
                self.session.set_token(&token).map_err(|e| {
                    error!("Failed to store token: {:#}", e);
                    FormErrors::password("Could not save the session")
                })?;
                info!("Login successful");
                Ok(())
            }
            Err(e) => {
                error!("Error logging in: {}", e);
                Err(FormErrors::password(login_failure_message(&e)))
            }
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<String, FormErrors> {
        let errors = validate_register(email, password, confirm_password);
        if !errors.is_empty() {
            return Err(errors);
        }

        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };

        self.api.register(&credentials).await.map_err(|e| {
            warn!("Registration failed: {}", e);
            match e {
                ApiError::Server { status: 400, message } => FormErrors {
                    email: Some(message),
                    ..Default::default()
                },
                other => FormErrors::password(&other.to_string()),
            }
        })
    }

    /// The local token is dropped even when the server call fails.
    pub async fn logout(&self) {
        if let Some(token) = self.session.token() {
            if let Err(e) = self.api.logout(&token).await {
                error!("Error logging out: {}", e);
            }
        }
        if let Err(e) = self.session.clear_token() {
            error!("Failed to clear token: {:#}", e);
        }
        info!("Logged out");
    }
}

fn login_failure_message(error: &ApiError) -> &'static str {
    match error {
        ApiError::Server { status: 400, .. } | ApiError::Unauthorized => "Invalid email or password",
        ApiError::Server { status, .. } if *status >= 500 => "Server error. Please try again later",
        _ => "Could not reach the server",
    }
}
