//! Authentication route handlers.
//!
//! Sign-up, sign-in, sign-out, password reset and the signed-in profile and
//! password forms. Form handlers answer with a redirect carrying an
//! `error` or `success` code that the target page turns into a message.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

use right_water_core::types::Identity;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::middleware::guard::SETTLE_WAIT;
use crate::middleware::{Client, RequireSignedIn};
use crate::services::account::AccountError;
use crate::services::identity::{AuthError, AuthSession};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    pub code: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordForm {
    pub current_password: String,
    pub new_password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub display_name: String,
}

// =============================================================================
// Query Types
// =============================================================================

/// Query parameters for error/success display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Query parameters of a password reset link.
#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub error: Option<&'static str>,
    pub success: Option<&'static str>,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub error: Option<&'static str>,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/forgot_password.html")]
pub struct ForgotPasswordTemplate {
    pub error: Option<&'static str>,
    pub success: Option<&'static str>,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/reset_password.html")]
pub struct ResetPasswordTemplate {
    pub error: Option<&'static str>,
    pub code: String,
}

// =============================================================================
// Messages
// =============================================================================

/// User-facing text for an `error` code.
#[must_use]
pub fn error_message(code: &str) -> &'static str {
    match code {
        "credentials" => "Invalid email or password.",
        "exists" => "An account with this email already exists.",
        "email" => "Please enter a valid email address.",
        "weak_password" => "Passwords must be at least 8 characters.",
        "password_mismatch" => "Passwords do not match.",
        "display_name" => "Please enter a display name.",
        "invalid_code" => "This reset link is invalid or has expired.",
        "current_password" => "Your current password is incorrect.",
        _ => "Something went wrong. Please try again.",
    }
}

/// User-facing text for a `success` code.
#[must_use]
pub fn success_message(code: &str) -> &'static str {
    match code {
        "reset_sent" => "If an account exists for that address, a reset link is on its way.",
        "password_reset" => "Your password has been reset. Please sign in.",
        "password_changed" => "Your password has been changed.",
        "profile" => "Your profile has been updated.",
        "signed_out" => "You have been signed out.",
        _ => "Done.",
    }
}

/// Error code for a failed identity operation.
const fn auth_error_code(err: &AuthError) -> &'static str {
    match err {
        AuthError::InvalidCredentials | AuthError::NotSignedIn => "credentials",
        AuthError::UserAlreadyExists => "exists",
        AuthError::InvalidEmail(_) => "email",
        AuthError::WeakPassword(_) => "weak_password",
        AuthError::InvalidDisplayName => "display_name",
        AuthError::InvalidResetCode => "invalid_code",
        AuthError::Repository(_) | AuthError::Mail(_) | AuthError::PasswordHash => "server",
    }
}

fn with_code(path: &str, key: &str, code: &str) -> Redirect {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, code)
        .finish();
    Redirect::to(&format!("{path}?{query}"))
}

async fn start_session(client: &Client, session: &AuthSession) -> Result<(), AppError> {
    client.remember(&session.token).await?;
    set_sentry_user(&session.identity.uid, Some(session.identity.email.as_str()));
    Ok(())
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    LoginTemplate {
        error: query.error.as_deref().map(error_message),
        success: query.success.as_deref().map(success_message),
    }
}

/// Handle login form submission.
pub async fn login(client: Client, Form(form): Form<LoginForm>) -> Result<Response, AppError> {
    let session = match client.context.auth.sign_in(&form.email, &form.password).await {
        Ok(session) => session,
        Err(e) => {
            tracing::info!(error = %e, "login failed");
            return Ok(with_code("/auth/login", "error", auth_error_code(&e)).into_response());
        }
    };

    start_session(&client, &session).await?;
    tracing::info!(uid = %session.identity.uid, "signed in");
    Ok(Redirect::to("/").into_response())
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    RegisterTemplate {
        error: query.error.as_deref().map(error_message),
    }
}

/// Handle registration form submission.
///
/// Creates the identity, signs the client in and writes the user profile.
pub async fn register(
    State(state): State<AppState>,
    client: Client,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if form.password != form.password_confirm {
        return Ok(with_code("/auth/register", "error", "password_mismatch").into_response());
    }

    let result = state
        .accounts()
        .register(
            &client.context.auth,
            &form.email,
            &form.password,
            &form.display_name,
        )
        .await;
    let session = match result {
        Ok(session) => session,
        Err(AccountError::Auth(e)) => {
            tracing::info!(error = %e, "registration rejected");
            return Ok(with_code("/auth/register", "error", auth_error_code(&e)).into_response());
        }
        Err(AccountError::Store(e)) => return Err(e.into()),
    };

    start_session(&client, &session).await?;
    tracing::info!(uid = %session.identity.uid, "registered");
    Ok(Redirect::to("/").into_response())
}

/// Sign out and forget the identity token.
pub async fn logout(client: Client) -> Result<Redirect, AppError> {
    client.context.auth.sign_out().await;
    client.forget().await?;
    clear_sentry_user();
    Ok(with_code("/auth/login", "success", "signed_out"))
}

// =============================================================================
// Password Reset Routes
// =============================================================================

/// Display the forgot-password page.
pub async fn forgot_password_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    ForgotPasswordTemplate {
        error: query.error.as_deref().map(error_message),
        success: query.success.as_deref().map(success_message),
    }
}

/// Email a reset link. The answer is the same whether or not the address
/// has an account.
pub async fn forgot_password(
    State(state): State<AppState>,
    Form(form): Form<ForgotPasswordForm>,
) -> Redirect {
    match state.identity().send_password_reset(&form.email).await {
        Ok(()) => with_code("/auth/password/forgot", "success", "reset_sent"),
        Err(e) => {
            tracing::warn!(error = %e, "password reset request failed");
            with_code("/auth/password/forgot", "error", auth_error_code(&e))
        }
    }
}

/// Display the reset form for the code in the link.
pub async fn reset_password_page(Query(query): Query<ResetQuery>) -> Response {
    let Some(code) = query.code else {
        return with_code("/auth/password/forgot", "error", "invalid_code").into_response();
    };
    ResetPasswordTemplate {
        error: query.error.as_deref().map(error_message),
        code,
    }
    .into_response()
}

/// Redeem the reset code and set the new password.
pub async fn reset_password(
    State(state): State<AppState>,
    Form(form): Form<ResetPasswordForm>,
) -> Redirect {
    let back = |code: &str| {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("code", &form.code)
            .append_pair("error", code)
            .finish();
        Redirect::to(&format!("/auth/password/reset?{query}"))
    };

    if form.password != form.password_confirm {
        return back("password_mismatch");
    }
    match state
        .identity()
        .confirm_password_reset(&form.code, &form.password)
        .await
    {
        Ok(()) => with_code("/auth/login", "success", "password_reset"),
        Err(e) => {
            tracing::info!(error = %e, "password reset rejected");
            back(auth_error_code(&e))
        }
    }
}

// =============================================================================
// Signed-in Forms
// =============================================================================

/// Re-authenticate with the current password and set a new one.
pub async fn change_password(
    RequireSignedIn(guarded): RequireSignedIn,
    Form(form): Form<ChangePasswordForm>,
) -> Redirect {
    if form.new_password != form.password_confirm {
        return with_code("/account", "error", "password_mismatch");
    }
    match guarded
        .client
        .context
        .auth
        .reauthenticate_and_change_password(&form.current_password, &form.new_password)
        .await
    {
        Ok(()) => {
            tracing::info!(uid = %guarded.auth.identity.uid, "password changed");
            with_code("/account", "success", "password_changed")
        }
        Err(AuthError::InvalidCredentials) => with_code("/account", "error", "current_password"),
        Err(e) => {
            tracing::info!(error = %e, "password change rejected");
            with_code("/account", "error", auth_error_code(&e))
        }
    }
}

/// Change the display name on the identity and the profile.
pub async fn update_profile(
    State(state): State<AppState>,
    RequireSignedIn(guarded): RequireSignedIn,
    Form(form): Form<ProfileForm>,
) -> Result<Redirect, AppError> {
    match state
        .accounts()
        .update_display_name(&guarded.client.context.auth, &form.display_name)
        .await
    {
        Ok(_) => Ok(with_code("/account", "success", "profile")),
        Err(AccountError::Auth(e)) => Ok(with_code("/account", "error", auth_error_code(&e))),
        Err(AccountError::Store(e)) => Err(e.into()),
    }
}

// =============================================================================
// Session Snapshot
// =============================================================================

/// The client's current session as seen by the route guard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    pub is_admin: bool,
    pub loading: bool,
}

/// Report the client's session state.
///
/// Waits briefly for a resolution of the current identity to finish; if it
/// does not, the snapshot reports `loading`.
pub async fn session(client: Client) -> Json<SessionSnapshot> {
    let current = client.context.auth.current();
    let expected = current.as_ref().map(|s| &s.identity.uid);
    let state = client
        .context
        .session
        .wait_settled_for(expected, SETTLE_WAIT)
        .await;
    Json(SessionSnapshot {
        identity: state.identity,
        is_admin: state.is_admin,
        loading: state.loading,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_codes_fall_back() {
        assert_eq!(error_message("credentials"), "Invalid email or password.");
        assert_eq!(
            error_message("<script>"),
            "Something went wrong. Please try again."
        );
        assert_eq!(success_message("nope"), "Done.");
    }

    #[test]
    fn test_credential_errors_share_a_code() {
        assert_eq!(auth_error_code(&AuthError::InvalidCredentials), "credentials");
        assert_eq!(auth_error_code(&AuthError::NotSignedIn), "credentials");
        assert_eq!(auth_error_code(&AuthError::PasswordHash), "server");
    }

    #[test]
    fn test_redirect_codes_are_encoded() {
        let response = with_code("/account", "error", "a b&c").into_response();
        assert_eq!(
            response.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/account?error=a+b%26c")
        );
    }
}
