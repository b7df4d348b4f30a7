use axum::{
    extract::{FromRef, State},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, GoogleLoginRequest, MessageResponse,
            PreSignupRequest, PublicUser, ResetPasswordRequest, SigninRequest, SignupRequest,
        },
        extractors::AuthUser,
        repo_types::NewUser,
        services::{activation_email, is_valid_email, new_username, profile_url, reset_email},
        tokens::TokenKeys,
    },
    error::AuthError,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "token";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/pre-signup", post(pre_signup))
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/signout", get(signout))
        .route("/forgot-password", put(forgot_password))
        .route("/reset-password", put(reset_password))
        .route("/google-login", post(google_login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .build()
}

/// Checks the email is free, then sends an activation link carrying the
/// whole pending signup inside a signed token. Nothing is persisted until
/// the link is followed.
#[instrument(skip(state, payload))]
pub async fn pre_signup(
    State(state): State<AppState>,
    Json(mut payload): Json<PreSignupRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AuthError::Validation("Password too short".into()));
    }

    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AuthError::EmailTaken);
    }

    let keys = TokenKeys::from_ref(&state);
    let token = keys.sign_activation(&payload.name, &payload.email, &payload.password)?;

    state
        .mailer
        .send(activation_email(&state.config, &payload.email, &token))
        .await
        .map_err(AuthError::Email)?;

    info!(email = %payload.email, "activation email dispatched");
    Ok(Json(MessageResponse {
        message: format!(
            "Email has been sent to {}. Follow the instructions to activate your account",
            payload.email
        ),
    }))
}

/// Completes a pending signup. A missing token is answered with a generic
/// retry message rather than an error; the frontend has always relied on
/// that.
#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let Some(token) = payload.token else {
        return Ok(Json(MessageResponse {
            message: "Something went wrong. Try again".into(),
        }));
    };

    let keys = TokenKeys::from_ref(&state);
    let claims = keys.verify_activation(&token)?;

    let username = new_username();
    let profile = profile_url(&state.config, &username);
    let credential = state.scheme.derive(&claims.password)?;

    // A concurrent signup for the same email may have won between the
    // pre-signup check and now; the unique constraint is the backstop.
    let user = state
        .users
        .insert(NewUser {
            username,
            name: claims.name,
            email: claims.email,
            profile,
            password_hash: credential.hash,
            password_salt: credential.salt,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "signup completed");
    Ok(Json(MessageResponse {
        message: "Signup success! Please signin".into(),
    }))
}

/// Password sign-in. The lookup uses the submitted email verbatim; only
/// pre-signup lowercases. That asymmetry is long-standing behavior.
#[instrument(skip(state, jar, payload))]
pub async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SigninRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let user = state
        .users
        .find_by_email(&payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "signin unknown email");
            AuthError::UserNotFound
        })?;

    if !state
        .scheme
        .verify(&payload.password, &user.password_salt, &user.password_hash)
    {
        warn!(user_id = %user.id, "signin invalid password");
        return Err(AuthError::BadCredentials);
    }

    let keys = TokenKeys::from_ref(&state);
    let token = keys.sign_session(user.id)?;

    info!(user_id = %user.id, "user signed in");
    let public = PublicUser::from(&user);
    Ok((
        jar.add(session_cookie(&token)),
        Json(AuthResponse { token, user: public }),
    ))
}

/// Clears the session cookie. Already-issued tokens stay valid until they
/// expire; there is no server-side revocation.
#[instrument(skip_all)]
pub async fn signout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let cleared = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    (
        cleared,
        Json(MessageResponse {
            message: "Signout success".into(),
        }),
    )
}

/// Issues a reset token and records it on the user before the email goes
/// out. If the write fails no email is sent: never mail a link that was
/// not durably recorded.
#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let user = state
        .users
        .find_by_email(&payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "forgot-password unknown email");
            AuthError::UserNotFound
        })?;

    let keys = TokenKeys::from_ref(&state);
    let token = keys.sign_reset(user.id)?;

    state.users.set_reset_token(user.id, &token).await?;

    state
        .mailer
        .send(reset_email(&state.config, &user.email, &token))
        .await
        .map_err(AuthError::Email)?;

    info!(user_id = %user.id, "reset email dispatched");
    Ok(Json(MessageResponse {
        message: format!(
            "Email has been sent to {}. Follow the instructions to reset your password. \
             Link expires in 10 minutes",
            user.email
        ),
    }))
}

/// Consumes a reset link: the token must verify AND still be the one
/// recorded on a user. Clearing it on success makes the link single-use
/// even while its signature stays valid.
#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let keys = TokenKeys::from_ref(&state);
    keys.verify_reset(&payload.reset_password_token)?;

    let user = state
        .users
        .find_by_reset_token(&payload.reset_password_token)
        .await?
        .ok_or_else(|| {
            warn!("reset token not on record (consumed or foreign)");
            AuthError::ResetNotFound
        })?;

    let credential = state.scheme.derive(&payload.new_password)?;
    state
        .users
        .update_password(user.id, &credential.salt, &credential.hash)
        .await?;

    info!(user_id = %user.id, "password reset");
    Ok(Json(MessageResponse {
        message: "Great! Now you can login with your new password".into(),
    }))
}

/// Federated login. A verified Google identity counts as proof equivalent
/// to a password for an existing account; unknown emails get an account
/// provisioned with the assertion id as password material.
#[instrument(skip(state, jar, payload))]
pub async fn google_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<GoogleLoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let identity = state.google.verify(&payload.id_token).await?;

    if !identity.email_verified {
        warn!(email = %identity.email, "google identity email not verified");
        return Err(AuthError::UnverifiedEmail);
    }

    let keys = TokenKeys::from_ref(&state);

    let user = match state.users.find_by_email(&identity.email).await? {
        Some(user) => user,
        None => {
            let username = new_username();
            let profile = profile_url(&state.config, &username);
            let credential = state.scheme.derive(&identity.subject_id)?;
            let user = state
                .users
                .insert(NewUser {
                    username,
                    name: identity.name.clone(),
                    email: identity.email.clone(),
                    profile,
                    password_hash: credential.hash,
                    password_salt: credential.salt,
                })
                .await?;
            info!(user_id = %user.id, "user provisioned from google identity");
            user
        }
    };

    let token = keys.sign_session(user.id)?;
    info!(user_id = %user.id, "google login succeeded");
    let public = PublicUser::from(&user);
    Ok((
        jar.add(session_cookie(&token)),
        Json(AuthResponse { token, user: public }),
    ))
}

/// Authenticated profile fetch.
#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    Ok(Json(PublicUser::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::UserStore;
    use crate::google::GoogleIdentity;
    use crate::testing::{make_state, make_state_with, RecordingMailer, StaticVerifier};

    fn verified_identity() -> GoogleIdentity {
        GoogleIdentity {
            email: "g@x.com".into(),
            email_verified: true,
            name: "G User".into(),
            subject_id: "assertion-jti-1".into(),
        }
    }

    async fn activate(harness: &crate::testing::TestHarness, name: &str, email: &str, pw: &str) {
        pre_signup(
            State(harness.state.clone()),
            Json(PreSignupRequest {
                name: name.into(),
                email: email.into(),
                password: pw.into(),
            }),
        )
        .await
        .expect("pre-signup");
        let token = last_emailed_token(harness);
        signup(
            State(harness.state.clone()),
            Json(SignupRequest { token: Some(token) }),
        )
        .await
        .expect("signup");
    }

    /// Pulls the signed token back out of the last activation/reset email.
    fn last_emailed_token(harness: &crate::testing::TestHarness) -> String {
        let email = harness.mailer.last().expect("an email was sent");
        let start = ["/auth/account/activate/", "/auth/password/reset/"]
            .iter()
            .find_map(|marker| email.html.find(marker).map(|i| i + marker.len()))
            .expect("email contains a link");
        email.html[start..]
            .split('<')
            .next()
            .expect("token after link prefix")
            .to_string()
    }

    #[tokio::test]
    async fn pre_signup_sends_email_and_persists_nothing() {
        let harness = make_state(StaticVerifier::rejecting());
        let res = pre_signup(
            State(harness.state.clone()),
            Json(PreSignupRequest {
                name: "A".into(),
                email: "A@X.com ".into(),
                password: "password1".into(),
            }),
        )
        .await
        .expect("pre-signup");

        assert!(res.0.message.contains("a@x.com"));
        assert_eq!(harness.mailer.sent_count(), 1);
        assert_eq!(harness.users.user_count(), 0);
        let email = harness.mailer.last().unwrap();
        assert_eq!(email.to, "a@x.com");
        assert!(email.html.contains("/auth/account/activate/"));
    }

    #[tokio::test]
    async fn pre_signup_rejects_taken_email() {
        let harness = make_state(StaticVerifier::rejecting());
        activate(&harness, "A", "a@x.com", "password1").await;

        let err = pre_signup(
            State(harness.state.clone()),
            Json(PreSignupRequest {
                name: "B".into(),
                email: "a@x.com".into(),
                password: "password2".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn signup_creates_user_with_generated_identity() {
        let harness = make_state(StaticVerifier::rejecting());
        activate(&harness, "A", "a@x.com", "password1").await;

        let user = harness.users.get_by_email("a@x.com").expect("user exists");
        assert_eq!(user.name, "A");
        assert_eq!(user.username.len(), 10);
        assert_eq!(
            user.profile,
            format!("https://seoblog.test/profile/{}", user.username)
        );
        assert!(!user.password_hash.is_empty());
        assert!(!user.password_salt.is_empty());
        assert_eq!(user.role, 0);
    }

    #[tokio::test]
    async fn signup_without_token_returns_retry_message() {
        let harness = make_state(StaticVerifier::rejecting());
        let res = signup(
            State(harness.state.clone()),
            Json(SignupRequest { token: None }),
        )
        .await
        .expect("no-token signup is not an error");
        assert_eq!(res.0.message, "Something went wrong. Try again");
        assert_eq!(harness.users.user_count(), 0);
    }

    #[tokio::test]
    async fn signup_with_garbage_token_is_rejected() {
        let harness = make_state(StaticVerifier::rejecting());
        let err = signup(
            State(harness.state.clone()),
            Json(SignupRequest {
                token: Some("garbage".into()),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::ExpiredOrInvalid));
    }

    #[tokio::test]
    async fn concurrent_signup_completion_hits_duplicate_key() {
        let harness = make_state(StaticVerifier::rejecting());
        // Two pre-signups pass the email-taken check before either completes.
        pre_signup(
            State(harness.state.clone()),
            Json(PreSignupRequest {
                name: "A".into(),
                email: "a@x.com".into(),
                password: "password1".into(),
            }),
        )
        .await
        .expect("first pre-signup");
        let first_token = last_emailed_token(&harness);
        pre_signup(
            State(harness.state.clone()),
            Json(PreSignupRequest {
                name: "A2".into(),
                email: "a@x.com".into(),
                password: "password2".into(),
            }),
        )
        .await
        .expect("second pre-signup");
        let second_token = last_emailed_token(&harness);

        signup(
            State(harness.state.clone()),
            Json(SignupRequest {
                token: Some(first_token),
            }),
        )
        .await
        .expect("first completion");
        let err = signup(
            State(harness.state.clone()),
            Json(SignupRequest {
                token: Some(second_token),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::DuplicateKey));
        assert_eq!(harness.users.user_count(), 1);
    }

    #[tokio::test]
    async fn signin_succeeds_and_sets_cookie() {
        let harness = make_state(StaticVerifier::rejecting());
        activate(&harness, "A", "a@x.com", "password1").await;

        let (jar, res) = signin(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(SigninRequest {
                email: "a@x.com".into(),
                password: "password1".into(),
            }),
        )
        .await
        .expect("signin");

        assert!(!res.0.token.is_empty());
        assert_eq!(res.0.user.email, "a@x.com");
        let cookie = jar.get(SESSION_COOKIE).expect("session cookie set");
        assert_eq!(cookie.value(), res.0.token);
    }

    #[tokio::test]
    async fn signin_rejects_wrong_password() {
        let harness = make_state(StaticVerifier::rejecting());
        activate(&harness, "A", "a@x.com", "password1").await;

        let Err(err) = signin(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(SigninRequest {
                email: "a@x.com".into(),
                password: "wrong".into(),
            }),
        )
        .await
        else {
            panic!("wrong password must be rejected");
        };
        assert!(matches!(err, AuthError::BadCredentials));
    }

    #[tokio::test]
    async fn signin_rejects_unknown_email() {
        let harness = make_state(StaticVerifier::rejecting());
        let Err(err) = signin(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(SigninRequest {
                email: "nobody@x.com".into(),
                password: "password1".into(),
            }),
        )
        .await
        else {
            panic!("unknown email must be rejected");
        };
        assert!(matches!(err, AuthError::UserNotFound));
    }

    /// Pre-signup lowercases the email before storing; sign-in looks the
    /// submitted value up verbatim. This pins the asymmetry so a future
    /// normalization does not slip in silently.
    #[tokio::test]
    async fn signin_email_lookup_is_case_sensitive() {
        let harness = make_state(StaticVerifier::rejecting());
        activate(&harness, "A", "A@X.com", "password1").await;
        assert!(harness.users.get_by_email("a@x.com").is_some());

        let Err(err) = signin(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(SigninRequest {
                email: "A@X.com".into(),
                password: "password1".into(),
            }),
        )
        .await
        else {
            panic!("mixed-case lookup must miss the lowercased record");
        };
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn signout_clears_cookie() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "abc"));
        let (jar, res) = signout(jar).await;
        assert_eq!(res.0.message, "Signout success");
        assert!(jar.get(SESSION_COOKIE).is_none());
    }

    #[tokio::test]
    async fn forgot_then_reset_rotates_password() {
        let harness = make_state(StaticVerifier::rejecting());
        activate(&harness, "A", "a@x.com", "password1").await;

        forgot_password(
            State(harness.state.clone()),
            Json(ForgotPasswordRequest {
                email: "a@x.com".into(),
            }),
        )
        .await
        .expect("forgot-password");
        let token = last_emailed_token(&harness);
        assert_eq!(
            harness.users.get_by_email("a@x.com").unwrap().reset_password_token,
            token
        );

        reset_password(
            State(harness.state.clone()),
            Json(ResetPasswordRequest {
                reset_password_token: token,
                new_password: "password2".into(),
            }),
        )
        .await
        .expect("reset-password");

        // New password works, old one no longer does.
        signin(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(SigninRequest {
                email: "a@x.com".into(),
                password: "password2".into(),
            }),
        )
        .await
        .expect("signin with new password");
        let Err(err) = signin(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(SigninRequest {
                email: "a@x.com".into(),
                password: "password1".into(),
            }),
        )
        .await
        else {
            panic!("old password must no longer verify");
        };
        assert!(matches!(err, AuthError::BadCredentials));
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let harness = make_state(StaticVerifier::rejecting());
        activate(&harness, "A", "a@x.com", "password1").await;
        forgot_password(
            State(harness.state.clone()),
            Json(ForgotPasswordRequest {
                email: "a@x.com".into(),
            }),
        )
        .await
        .expect("forgot-password");
        let token = last_emailed_token(&harness);

        reset_password(
            State(harness.state.clone()),
            Json(ResetPasswordRequest {
                reset_password_token: token.clone(),
                new_password: "password2".into(),
            }),
        )
        .await
        .expect("first reset");

        // Signature is still valid and unexpired, but the persisted copy
        // was cleared on consumption.
        let err = reset_password(
            State(harness.state.clone()),
            Json(ResetPasswordRequest {
                reset_password_token: token,
                new_password: "password3".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::ResetNotFound));
    }

    #[tokio::test]
    async fn forgot_password_rejects_unknown_email() {
        let harness = make_state(StaticVerifier::rejecting());
        let err = forgot_password(
            State(harness.state.clone()),
            Json(ForgotPasswordRequest {
                email: "nobody@x.com".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
        assert_eq!(harness.mailer.sent_count(), 0);
    }

    /// Write-before-notify: when the mail transport is down the reset token
    /// is already recorded, and the failure surfaces as an email error.
    #[tokio::test]
    async fn forgot_password_persists_token_before_sending() {
        let harness = make_state_with(RecordingMailer::failing(), StaticVerifier::rejecting());
        // Seed a user directly; pre-signup needs a working mailer.
        let cred = harness.state.scheme.derive("password1").unwrap();
        harness
            .users
            .insert(NewUser {
                username: "seeduser01".into(),
                name: "A".into(),
                email: "a@x.com".into(),
                profile: "https://seoblog.test/profile/seeduser01".into(),
                password_hash: cred.hash,
                password_salt: cred.salt,
            })
            .await
            .unwrap();

        let err = forgot_password(
            State(harness.state.clone()),
            Json(ForgotPasswordRequest {
                email: "a@x.com".into(),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AuthError::Email(_)));
        let user = harness.users.get_by_email("a@x.com").unwrap();
        assert!(!user.reset_password_token.is_empty());
    }

    #[tokio::test]
    async fn google_login_rejects_unverified_email() {
        let mut identity = verified_identity();
        identity.email_verified = false;
        let harness = make_state(StaticVerifier::accepting(identity));

        let Err(err) = google_login(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(GoogleLoginRequest {
                id_token: "whatever".into(),
            }),
        )
        .await
        else {
            panic!("unverified email must be rejected");
        };

        assert!(matches!(err, AuthError::UnverifiedEmail));
        assert_eq!(harness.users.user_count(), 0);
    }

    #[tokio::test]
    async fn google_login_provisions_user_on_first_login() {
        let harness = make_state(StaticVerifier::accepting(verified_identity()));

        let (jar, res) = google_login(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(GoogleLoginRequest {
                id_token: "whatever".into(),
            }),
        )
        .await
        .expect("google login");

        assert_eq!(harness.users.user_count(), 1);
        let user = harness.users.get_by_email("g@x.com").unwrap();
        assert_eq!(res.0.user.id, user.id);
        // Synthetic credential derived from the assertion id.
        assert!(!user.password_hash.is_empty());
        assert!(jar.get(SESSION_COOKIE).is_some());

        // The assertion id works as a password, as in the original system.
        signin(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(SigninRequest {
                email: "g@x.com".into(),
                password: "assertion-jti-1".into(),
            }),
        )
        .await
        .expect("signin with assertion id");
    }

    #[tokio::test]
    async fn google_login_reuses_existing_account() {
        let harness = make_state(StaticVerifier::accepting(GoogleIdentity {
            email: "a@x.com".into(),
            email_verified: true,
            name: "A".into(),
            subject_id: "jti-2".into(),
        }));
        activate(&harness, "A", "a@x.com", "password1").await;

        let (_jar, res) = google_login(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(GoogleLoginRequest {
                id_token: "whatever".into(),
            }),
        )
        .await
        .expect("google login");

        assert_eq!(harness.users.user_count(), 1);
        assert_eq!(res.0.user.email, "a@x.com");
        // The local password still works; federated login did not touch it.
        signin(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(SigninRequest {
                email: "a@x.com".into(),
                password: "password1".into(),
            }),
        )
        .await
        .expect("local signin still works");
    }

    #[tokio::test]
    async fn google_login_rejects_invalid_token() {
        let harness = make_state(StaticVerifier::rejecting());
        let Err(err) = google_login(
            State(harness.state.clone()),
            CookieJar::new(),
            Json(GoogleLoginRequest {
                id_token: "forged".into(),
            }),
        )
        .await
        else {
            panic!("forged token must be rejected");
        };
        assert!(matches!(err, AuthError::InvalidIdentityToken));
        assert_eq!(harness.users.user_count(), 0);
    }

    #[tokio::test]
    async fn get_me_returns_redacted_projection() {
        let harness = make_state(StaticVerifier::rejecting());
        activate(&harness, "A", "a@x.com", "password1").await;
        let user = harness.users.get_by_email("a@x.com").unwrap();

        let res = get_me(State(harness.state.clone()), AuthUser(user.id))
            .await
            .expect("me");
        assert_eq!(res.0.id, user.id);
        assert_eq!(res.0.username, user.username);
    }
}
