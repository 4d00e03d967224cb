//! Sign-in / sign-up against the identity provider.
//!
//! Failures never escape as raw backend errors: every path ends in either a
//! [`Session`] / [`SignUpOutcome`] or an [`AuthError`] whose `Display` is the
//! user-facing message.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::backend::{AuthApi, AuthUser, BackendError, BackendErrorKind, BackendResult};
use crate::credentials::{CredentialStore, SaveOutcome, Session};
use crate::kv::KeyValueStore;

/// Minimum password length accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex"));

/// Simple `local@domain.tld` check.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    SignIn,
    SignUp,
}

/// Classified failure of an auth operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    // Validation (never reaches the network)
    MissingFields,
    InvalidEmail,
    PasswordTooShort,
    // Provider rejections
    InvalidCredentials,
    InvalidRequest,
    AuthenticationFailed,
    UnprocessableEmail,
    RateLimited,
    /// Sign-up rejected because the address is taken
    AccountExists,
    /// Sign-up "succeeded" with no identities: the address was already registered
    AccountExistsSilently,
    /// Any other status; carries the provider message (may be empty)
    Provider(String),
    // Malformed success
    InvalidResponse,
    MissingToken,
    // Transport
    Network,
    Timeout,
    Unreachable,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub operation: AuthOperation,
    pub kind: AuthErrorKind,
}

impl AuthError {
    pub fn new(operation: AuthOperation, kind: AuthErrorKind) -> Self {
        Self { operation, kind }
    }

    /// True for input problems caught before any request was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind,
            AuthErrorKind::MissingFields
                | AuthErrorKind::InvalidEmail
                | AuthErrorKind::PasswordTooShort
        )
    }

    /// User-facing message for this failure.
    pub fn message(&self) -> String {
        use AuthErrorKind as K;
        use AuthOperation::{SignIn, SignUp};

        let text = match (&self.kind, self.operation) {
            (K::MissingFields, _) => "Please provide both email and password.",
            (K::InvalidEmail, _) => "Please provide a valid email address.",
            (K::PasswordTooShort, _) => "Password must be at least 6 characters long.",
            (K::InvalidCredentials, _) => "Invalid email or password. Please try again.",
            (K::InvalidRequest, SignIn) => "Invalid request. Please check your input.",
            (K::InvalidRequest, SignUp) => "Invalid email or password format.",
            (K::AuthenticationFailed, _) => {
                "Authentication failed. Please check your credentials."
            }
            (K::UnprocessableEmail, SignIn) => {
                "Unable to process login. Please check your email address."
            }
            (K::UnprocessableEmail, SignUp) => {
                "Unable to create account. Please check your email address."
            }
            (K::RateLimited, SignIn) => {
                "Too many login attempts. Please try again in a few minutes."
            }
            (K::RateLimited, SignUp) => "Too many signup attempts. Please try again later.",
            (K::AccountExists, _) => {
                "An account with this email already exists. Please try logging in."
            }
            (K::AccountExistsSilently, _) => {
                "An account with this email already exists. Please check your email or try logging in."
            }
            (K::Provider(message), _) if !message.is_empty() => return message.clone(),
            (K::Provider(_), SignIn) => "Login failed. Please try again.",
            (K::Provider(_), SignUp) => "Signup failed. Please try again.",
            (K::InvalidResponse, _) => "Login failed. Invalid response from server.",
            (K::MissingToken, _) => "Login failed. No authentication token received.",
            (K::Network, SignIn) => {
                "Network error. Please check your internet connection and try again."
            }
            (K::Network | K::Unreachable, SignUp) => {
                "Network error. Please check your connection and try again."
            }
            (K::Timeout, _) => "Request timeout. Please try again.",
            (K::Unreachable, SignIn) => "Unable to connect to the server. Please try again later.",
            (K::Unexpected, _) => "An unexpected error occurred. Please try again.",
        };
        text.to_string()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AuthError {}

/// Maps a backend failure onto the fixed set of auth error kinds.
pub fn classify_backend_error(operation: AuthOperation, error: &BackendError) -> AuthErrorKind {
    match error.kind {
        BackendErrorKind::HttpStatus => match (error.status, operation) {
            (Some(400), AuthOperation::SignIn) => {
                if error.message_contains("Invalid login credentials") {
                    AuthErrorKind::InvalidCredentials
                } else {
                    AuthErrorKind::InvalidRequest
                }
            }
            (Some(400), AuthOperation::SignUp) => {
                if error.message_contains("already registered") {
                    AuthErrorKind::AccountExists
                } else {
                    AuthErrorKind::InvalidRequest
                }
            }
            (Some(401), AuthOperation::SignIn) => AuthErrorKind::AuthenticationFailed,
            (Some(422), _) => AuthErrorKind::UnprocessableEmail,
            (Some(429), _) => AuthErrorKind::RateLimited,
            _ => AuthErrorKind::Provider(error.message.clone()),
        },
        BackendErrorKind::Timeout => AuthErrorKind::Timeout,
        BackendErrorKind::Connect => AuthErrorKind::Unreachable,
        BackendErrorKind::Network => AuthErrorKind::Network,
        BackendErrorKind::Parse => match operation {
            AuthOperation::SignIn => AuthErrorKind::InvalidResponse,
            AuthOperation::SignUp => AuthErrorKind::Unexpected,
        },
    }
}

fn validate_credentials(
    operation: AuthOperation,
    email: &str,
    password: &str,
) -> Result<(), AuthError> {
    let fail = |kind| Err(AuthError::new(operation, kind));
    if email.trim().is_empty() || password.is_empty() {
        return fail(AuthErrorKind::MissingFields);
    }
    if !is_valid_email(email) {
        return fail(AuthErrorKind::InvalidEmail);
    }
    if operation == AuthOperation::SignUp && password.chars().count() < MIN_PASSWORD_LEN {
        return fail(AuthErrorKind::PasswordTooShort);
    }
    Ok(())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Successful sign-up variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// A confirmation email was sent; the account is not usable yet.
    ConfirmationSent,
    /// The account can sign in right away.
    Ready,
}

impl SignUpOutcome {
    pub fn message(self) -> &'static str {
        match self {
            SignUpOutcome::ConfirmationSent => {
                "Signup successful! Please check your email for the confirmation link."
            }
            SignUpOutcome::Ready => "Signup successful! You can now log in.",
        }
    }
}

/// Sign-in result after the caller-side persistence step.
#[derive(Debug)]
pub struct LoginOutcome {
    pub session: Session,
    pub saved: SaveOutcome,
}

impl LoginOutcome {
    pub fn message(&self) -> &'static str {
        if self.saved.is_saved() {
            "Login successful! Redirecting..."
        } else {
            "Login successful, but failed to save session data. Some features may not work properly."
        }
    }
}

/// Auth client: validation, the provider round trip, and classification.
pub struct AuthClient {
    api: AuthApi,
    email_redirect_to: Option<String>,
}

impl AuthClient {
    pub fn new(api: AuthApi, email_redirect_to: Option<String>) -> Self {
        Self {
            api,
            email_redirect_to,
        }
    }

    fn backend_failure(operation: AuthOperation, error: &BackendError) -> AuthError {
        let kind = classify_backend_error(operation, error);
        match &kind {
            AuthErrorKind::Unexpected | AuthErrorKind::InvalidResponse => {
                tracing::error!(?operation, error = %error, "Unexpected auth error");
            }
            _ => tracing::warn!(?operation, error = %error, "Auth request rejected"),
        }
        AuthError::new(operation, kind)
    }

    /// Signs in with email + password.
    ///
    /// # Errors
    /// Returns a classified [`AuthError`]; validation errors are returned
    /// before any request is made.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let op = AuthOperation::SignIn;
        validate_credentials(op, email, password)?;

        let response = self
            .api
            .sign_in_with_password(&normalize_email(email), password)
            .await
            .map_err(|e| Self::backend_failure(op, &e))?;

        let Some(user) = response.user else {
            tracing::error!("Sign-in response carried no user");
            return Err(AuthError::new(op, AuthErrorKind::InvalidResponse));
        };
        let access_token = match response.access_token {
            Some(token) if !token.is_empty() => token,
            Some(_) => return Err(AuthError::new(op, AuthErrorKind::MissingToken)),
            None => {
                tracing::error!("Sign-in response carried no session");
                return Err(AuthError::new(op, AuthErrorKind::InvalidResponse));
            }
        };

        tracing::info!(user_id = %user.id, "Login successful");
        Ok(Session {
            email: user.email.unwrap_or_else(|| normalize_email(email)),
            user_id: user.id,
            access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
        })
    }

    /// Signs in and persists the session. A local write failure is reported
    /// through [`LoginOutcome::saved`], not as an error.
    ///
    /// # Errors
    /// Returns a classified [`AuthError`] when sign-in itself fails; the
    /// store is left untouched in that case.
    pub async fn sign_in_and_store<L: KeyValueStore, S: KeyValueStore>(
        &self,
        store: &mut CredentialStore<L, S>,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let session = self.sign_in(email, password).await?;
        let saved = store.save(&session);
        Ok(LoginOutcome { session, saved })
    }

    /// Registers a new account.
    ///
    /// # Errors
    /// Returns a classified [`AuthError`], including the silently-accepted
    /// duplicate registration case.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let op = AuthOperation::SignUp;
        validate_credentials(op, email, password)?;

        let response = self
            .api
            .sign_up(
                &normalize_email(email),
                password,
                self.email_redirect_to.as_deref(),
            )
            .await
            .map_err(|e| Self::backend_failure(op, &e))?;

        if let Some(user) = &response.user
            && user.identities.as_ref().is_some_and(Vec::is_empty)
        {
            return Err(AuthError::new(op, AuthErrorKind::AccountExistsSilently));
        }

        // An auto-confirmed project returns a usable session right away.
        let auto_confirmed = response
            .session
            .as_ref()
            .and_then(|s| s.access_token.as_deref())
            .is_some_and(|token| !token.is_empty());
        let confirmation_sent = !auto_confirmed
            && response
                .user
                .as_ref()
                .and_then(|u| u.confirmation_sent_at.as_deref())
                .is_some_and(|at| !at.is_empty());
        tracing::info!(confirmation_sent, auto_confirmed, "Signup accepted");

        Ok(if confirmation_sent {
            SignUpOutcome::ConfirmationSent
        } else {
            SignUpOutcome::Ready
        })
    }

    /// Verifies `access_token` with the provider.
    ///
    /// # Errors
    /// Returns the raw backend error; callers decide how to present it.
    pub async fn current_user(&self, access_token: &str) -> BackendResult<AuthUser> {
        self.api.get_user(access_token).await
    }
}

/// Per-operation submission state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FormState {
    #[default]
    Idle,
    Submitting,
    Success(String),
    Failed(String),
}

/// One submission slot: `Idle → Submitting → {Success, Failed}`.
#[derive(Debug, Default)]
pub struct Submission {
    state: FormState,
}

impl Submission {
    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn is_in_flight(&self) -> bool {
        self.state == FormState::Submitting
    }

    /// Enters `Submitting`. Returns false (and changes nothing) when a
    /// submission is already in flight.
    pub fn begin(&mut self) -> bool {
        if self.is_in_flight() {
            tracing::debug!("Ignoring duplicate submission");
            return false;
        }
        self.state = FormState::Submitting;
        true
    }

    pub fn succeed(&mut self, message: impl Into<String>) {
        self.state = FormState::Success(message.into());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = FormState::Failed(message.into());
    }

    fn reset(&mut self) {
        if !self.is_in_flight() {
            self.state = FormState::Idle;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    SignIn,
    SignUp,
}

/// The combined sign-in / sign-up form with one independent slot per operation.
#[derive(Debug)]
pub struct AuthForm {
    mode: AuthMode,
    sign_in: Submission,
    sign_up: Submission,
}

impl AuthForm {
    pub fn new(mode: AuthMode) -> Self {
        Self {
            mode,
            sign_in: Submission::default(),
            sign_up: Submission::default(),
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Switches between sign-in and sign-up, clearing shown messages.
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AuthMode::SignIn => AuthMode::SignUp,
            AuthMode::SignUp => AuthMode::SignIn,
        };
        self.sign_in.reset();
        self.sign_up.reset();
    }

    pub fn submission(&self, mode: AuthMode) -> &Submission {
        match mode {
            AuthMode::SignIn => &self.sign_in,
            AuthMode::SignUp => &self.sign_up,
        }
    }

    fn submission_mut(&mut self, mode: AuthMode) -> &mut Submission {
        match mode {
            AuthMode::SignIn => &mut self.sign_in,
            AuthMode::SignUp => &mut self.sign_up,
        }
    }

    /// State of the slot for the current mode.
    pub fn state(&self) -> &FormState {
        self.submission(self.mode).state()
    }

    pub fn heading(&self) -> &'static str {
        match self.mode {
            AuthMode::SignIn => "Sign In to Your Account",
            AuthMode::SignUp => "Create Your Account",
        }
    }

    pub fn button_label(&self) -> &'static str {
        let busy = self.submission(self.mode).is_in_flight();
        match (self.mode, busy) {
            (AuthMode::SignIn, false) => "Sign In",
            (AuthMode::SignIn, true) => "Signing In...",
            (AuthMode::SignUp, false) => "Create Account",
            (AuthMode::SignUp, true) => "Creating Account...",
        }
    }

    /// Runs the current mode's operation and records the result.
    ///
    /// Validation failures land in `Failed` without passing through
    /// `Submitting`. Returns `None` when the submission was ignored because
    /// one is already in flight.
    pub async fn submit<L: KeyValueStore, S: KeyValueStore>(
        &mut self,
        client: &AuthClient,
        store: &mut CredentialStore<L, S>,
        email: &str,
        password: &str,
    ) -> Option<Result<FormOutcome, AuthError>> {
        let mode = self.mode;
        let op = match mode {
            AuthMode::SignIn => AuthOperation::SignIn,
            AuthMode::SignUp => AuthOperation::SignUp,
        };
        if let Err(e) = validate_credentials(op, email, password) {
            self.submission_mut(mode).fail(e.message());
            return Some(Err(e));
        }
        if !self.submission_mut(mode).begin() {
            return None;
        }

        let result = match mode {
            AuthMode::SignIn => client
                .sign_in_and_store(store, email, password)
                .await
                .map(FormOutcome::LoggedIn),
            AuthMode::SignUp => client
                .sign_up(email, password)
                .await
                .map(FormOutcome::SignedUp),
        };

        let slot = self.submission_mut(mode);
        match &result {
            Ok(outcome) => slot.succeed(outcome.message()),
            Err(e) => slot.fail(e.message()),
        }
        Some(result)
    }
}

/// Successful form submission.
#[derive(Debug)]
pub enum FormOutcome {
    LoggedIn(LoginOutcome),
    SignedUp(SignUpOutcome),
}

impl FormOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            FormOutcome::LoggedIn(login) => login.message(),
            FormOutcome::SignedUp(outcome) => outcome.message(),
        }
    }
}
