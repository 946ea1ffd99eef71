use crate::server::{
    Result, ServerError, ServerRouter, Settings,
    auth::{AuthenticatedUser, Viewer, end_session, start_session},
    extract::{Form, Query},
    forms::{
        FieldErrors, LoginForm, NON_FIELD_ERRORS, NextQuery, PasswordChangeForm,
        PasswordResetForm, REQUIRED, SetPasswordForm, SignupForm, safe_next, validate_new_password,
    },
    found,
    mail::{Email, Outbox},
    templates::{self, Rendered},
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::{
    extract::cookie::CookieJar,
    routing::{RouterExt, TypedPath},
};
use serde::Deserialize;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::{debug, info, warn};
use validator::ValidateEmail;
use yatube_common::model::{
    auth::{AuthTokenHash, HashedPassword, PasswordReset, PasswordResetToken},
    user::{CreateUser, User, Username},
};
use yatube_db::client::DbClient;

const INVALID_LOGIN: &str = "Please enter a correct username and password. Note that both fields may be case-sensitive.";
const USERNAME_TAKEN: &str = "A user with that username already exists.";
const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
const INVALID_EMAIL: &str = "Enter a valid email address.";
const WRONG_OLD_PASSWORD: &str =
    "Your old password was entered incorrectly. Please enter it again.";

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(signup_form)
        .typed_post(signup)
        .typed_get(login_form)
        .typed_post(login)
        .typed_get(logout)
        .typed_post(logout)
        .typed_get(password_change_form)
        .typed_post(password_change)
        .typed_get(password_change_done)
        .typed_get(password_reset_form)
        .typed_post(password_reset)
        .typed_get(password_reset_done)
        .typed_get(password_reset_confirm_form)
        .typed_post(password_reset_confirm)
        .typed_get(password_reset_complete)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signup/", rejection(ServerError))]
struct SignupPath();

async fn signup_form(SignupPath(): SignupPath, viewer: Viewer) -> Rendered {
    templates::users::signup(viewer.user(), &SignupForm::default(), &FieldErrors::default())
}

async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<DbClient>>,
    viewer: Viewer,
    Form(form): Form<SignupForm>,
) -> Result<Response> {
    let mut errors = FieldErrors::default();

    let username = if form.username.is_empty() {
        errors.add("username", REQUIRED);
        None
    } else if let Ok(username) = Username::new(form.username.clone()) {
        if db.fetch_user_by_username(username.get()).await?.is_some() {
            errors.add("username", USERNAME_TAKEN);
        }
        Some(username)
    } else {
        errors.add("username", INVALID_USERNAME);
        None
    };

    let email = form.email.trim();
    if !email.is_empty() && !email.validate_email() {
        errors.add("email", INVALID_EMAIL);
    }

    validate_new_password(
        &mut errors,
        "password2",
        &form.password1,
        &form.password2,
        &form.username,
    );

    let Some(username) = username.filter(|_| errors.is_empty()) else {
        return Ok(templates::users::signup(viewer.user(), &form, &errors).into_response());
    };

    let user = CreateUser {
        username,
        email: email.to_owned(),
        first_name: form.first_name.trim().to_owned(),
        last_name: form.last_name.trim().to_owned(),
        password: HashedPassword::new(&form.password1)?,
    };

    match db.create_user(&user).await {
        Ok(user_id) => {
            info!(%user_id, username = user.username.get(), "Signed up user");
            Ok(found("/"))
        }
        // Lost a race with a concurrent signup for the same name.
        Err(err) if err.is_unique_violation() => {
            errors.add("username", USERNAME_TAKEN);
            Ok(templates::users::signup(viewer.user(), &form, &errors).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login/", rejection(ServerError))]
struct LoginPath();

async fn login_form(
    LoginPath(): LoginPath,
    viewer: Viewer,
    Query(query): Query<NextQuery>,
) -> Rendered {
    let form = LoginForm {
        next: query.next,
        ..LoginForm::default()
    };

    templates::users::login(viewer.user(), &form, &FieldErrors::default())
}

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    viewer: Viewer,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let mut errors = FieldErrors::default();
    if form.username.is_empty() {
        errors.add("username", REQUIRED);
    }
    if form.password.is_empty() {
        errors.add("password", REQUIRED);
    }

    if errors.is_empty() {
        match db.fetch_credentials(&form.username).await? {
            Some((user, password)) if password.verify(&form.password) => {
                let cookie = start_session(&db, &settings, user.id).await?;
                info!(user_id = %user.id, "Logged in");

                return Ok((jar.add(cookie), found(safe_next(&form.next))).into_response());
            }
            _ => {
                debug!(username = %form.username, "Rejected login");
                errors.add(NON_FIELD_ERRORS, INVALID_LOGIN);
            }
        }
    }

    Ok(templates::users::login(viewer.user(), &form, &errors).into_response())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/logout/", rejection(ServerError))]
struct LogoutPath();

async fn logout(
    LogoutPath(): LogoutPath,
    State(db): State<Arc<DbClient>>,
    jar: CookieJar,
) -> Result<(CookieJar, Rendered)> {
    let jar = end_session(&db, jar).await?;

    Ok((jar, templates::users::logged_out()))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/password_change/", rejection(ServerError))]
struct PasswordChangePath();

async fn password_change_form(
    PasswordChangePath(): PasswordChangePath,
    user: AuthenticatedUser,
) -> Rendered {
    templates::users::password_change_form(Some(user.user()), &FieldErrors::default())
}

async fn password_change(
    PasswordChangePath(): PasswordChangePath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    user: AuthenticatedUser,
    jar: CookieJar,
    Form(form): Form<PasswordChangeForm>,
) -> Result<Response> {
    let mut errors = FieldErrors::default();

    let old_password_matches = db
        .fetch_credentials(user.user().username.get())
        .await?
        .is_some_and(|(_, password)| password.verify(&form.old_password));
    if form.old_password.is_empty() {
        errors.add("old_password", REQUIRED);
    } else if !old_password_matches {
        errors.add("old_password", WRONG_OLD_PASSWORD);
    }

    validate_new_password(
        &mut errors,
        "new_password2",
        &form.new_password1,
        &form.new_password2,
        user.user().username.get(),
    );

    if !errors.is_empty() {
        return Ok(
            templates::users::password_change_form(Some(user.user()), &errors).into_response(),
        );
    }

    db.set_password(user.user_id(), &HashedPassword::new(&form.new_password1)?)
        .await?;

    // Other sessions end with the old password, this one continues under a new token.
    db.delete_user_auths(user.user_id()).await?;
    let cookie = start_session(&db, &settings, user.user_id()).await?;

    info!(user_id = %user.user_id(), "Changed password");

    Ok((jar.add(cookie), found("/auth/password_change/done/")).into_response())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/password_change/done/", rejection(ServerError))]
struct PasswordChangeDonePath();

async fn password_change_done(
    PasswordChangeDonePath(): PasswordChangeDonePath,
    user: AuthenticatedUser,
) -> Rendered {
    templates::users::password_change_done(Some(user.user()))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/password_reset/", rejection(ServerError))]
struct PasswordResetPath();

async fn password_reset_form(PasswordResetPath(): PasswordResetPath, viewer: Viewer) -> Rendered {
    templates::users::password_reset_form(
        viewer.user(),
        &PasswordResetForm::default(),
        &FieldErrors::default(),
    )
}

fn reset_email(settings: &Settings, user: &User, token: &PasswordResetToken) -> Email {
    let (uidb64, secret) = token.as_path_parts();
    let link = format!("{}/auth/reset/{uidb64}/{secret}/", settings.site_url);

    Email {
        to: user.email.clone(),
        subject: "Password reset".to_owned(),
        body: format!(
            "You're receiving this email because you requested a password reset for your user account.\n\n\
             Please go to the following page and choose a new password:\n\n\
             {link}\n\n\
             Your username, in case you've forgotten: {}\n",
            user.username.get()
        ),
    }
}

async fn password_reset(
    PasswordResetPath(): PasswordResetPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    State(outbox): State<Arc<Outbox>>,
    viewer: Viewer,
    Form(form): Form<PasswordResetForm>,
) -> Result<Response> {
    let email = form.email.trim();

    let mut errors = FieldErrors::default();
    if email.is_empty() {
        errors.add("email", REQUIRED);
    } else if !email.validate_email() {
        errors.add("email", INVALID_EMAIL);
    }
    if !errors.is_empty() {
        return Ok(
            templates::users::password_reset_form(viewer.user(), &form, &errors).into_response(),
        );
    }

    // Unknown addresses get the same response so accounts cannot be probed.
    for user in db.fetch_users_by_email(email).await? {
        let token = PasswordResetToken::generate_random(user.id);
        db.create_password_reset(&PasswordReset {
            user: user.id,
            token_hash: token.hash()?,
            created_at: UtcDateTime::now(),
            used: false,
        })
        .await?;

        outbox
            .send(&reset_email(&settings, &user, &token))
            .await
            .map_err(ServerError::Mail)?;

        info!(user_id = %user.id, "Sent password reset link");
    }

    Ok(found("/auth/password_reset/done/"))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/password_reset/done/", rejection(ServerError))]
struct PasswordResetDonePath();

async fn password_reset_done(
    PasswordResetDonePath(): PasswordResetDonePath,
    viewer: Viewer,
) -> Rendered {
    templates::users::password_reset_done(viewer.user())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/reset/{uidb64}/{token}/", rejection(ServerError))]
struct PasswordResetConfirmPath {
    uidb64: String,
    token: String,
}

/// The reset request and its user, if the link may still be used.
async fn usable_reset(
    db: &DbClient,
    uidb64: &str,
    token: &str,
) -> Result<Option<(AuthTokenHash, User)>> {
    let Ok(token) = PasswordResetToken::from_path_parts(uidb64, token) else {
        debug!("Ignoring malformed password reset link");
        return Ok(None);
    };

    let token_hash = token.hash()?;
    let usable = db
        .fetch_password_reset(&token_hash)
        .await?
        .is_some_and(|reset| {
            reset.user == token.user_id && reset.is_usable_at(UtcDateTime::now())
        });
    if !usable {
        return Ok(None);
    }

    let user = db.fetch_user(token.user_id).await?;
    Ok(user.map(|user| (token_hash, user)))
}

async fn password_reset_confirm_form(
    PasswordResetConfirmPath { uidb64, token }: PasswordResetConfirmPath,
    State(db): State<Arc<DbClient>>,
    viewer: Viewer,
) -> Result<Rendered> {
    let errors = FieldErrors::default();
    let usable = usable_reset(&db, &uidb64, &token).await?.is_some();

    Ok(templates::users::password_reset_confirm(
        viewer.user(),
        usable.then_some(&errors),
    ))
}

async fn password_reset_confirm(
    PasswordResetConfirmPath { uidb64, token }: PasswordResetConfirmPath,
    State(db): State<Arc<DbClient>>,
    viewer: Viewer,
    Form(form): Form<SetPasswordForm>,
) -> Result<Response> {
    let Some((token_hash, user)) = usable_reset(&db, &uidb64, &token).await? else {
        return Ok(templates::users::password_reset_confirm(viewer.user(), None).into_response());
    };

    let mut errors = FieldErrors::default();
    validate_new_password(
        &mut errors,
        "new_password2",
        &form.new_password1,
        &form.new_password2,
        user.username.get(),
    );
    if !errors.is_empty() {
        return Ok(
            templates::users::password_reset_confirm(viewer.user(), Some(&errors)).into_response(),
        );
    }

    if !db.use_password_reset(&token_hash).await? {
        warn!(user_id = %user.id, "Password reset link was used concurrently");
        return Ok(templates::users::password_reset_confirm(viewer.user(), None).into_response());
    }

    db.set_password(user.id, &HashedPassword::new(&form.new_password1)?)
        .await?;
    db.delete_user_auths(user.id).await?;

    info!(user_id = %user.id, "Reset password");

    Ok(found("/auth/reset/done/"))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/reset/done/", rejection(ServerError))]
struct PasswordResetCompletePath();

async fn password_reset_complete(
    PasswordResetCompletePath(): PasswordResetCompletePath,
    viewer: Viewer,
) -> Rendered {
    templates::users::password_reset_complete(viewer.user())
}

#[cfg(test)]
mod tests {
    use crate::server::{
        auth::SESSION_COOKIE,
        templates::Template,
        test_support::{PASSWORD, TestApp, assert_redirects},
    };
    use axum::http::StatusCode;
    use yatube_common::model::auth::PasswordResetToken;
    const NEW_PASSWORD: &str = "qwerty-new-42";

    /// Path of the reset link in a stored message, with quoted-printable soft breaks undone.
    fn reset_link(message: &str) -> String {
        let body = message.replace("=\r\n", "");
        let start = body
            .find("http://testserver/auth/reset/")
            .expect("message contains a reset link");
        let link = &body[start + "http://testserver".len()..];
        link.split_whitespace().next().unwrap().to_owned()
    }

    #[tokio::test]
    async fn auth_pages_use_their_templates() {
        let app = TestApp::new().await;

        for (path, template) in [
            ("/auth/signup/", Template::Signup),
            ("/auth/login/", Template::Login),
            ("/auth/logout/", Template::LoggedOut),
            ("/auth/password_reset/", Template::PasswordResetForm),
            ("/auth/password_reset/done/", Template::PasswordResetDone),
            ("/auth/reset/done/", Template::PasswordResetComplete),
        ] {
            let response = app.get(path, None).await;
            assert_eq!(response.status, StatusCode::OK, "{path}");
            assert_eq!(response.template, Some(template), "{path}");
        }

        let user = app.create_user("auth").await;
        let cookie = app.login(&user).await;
        for (path, template) in [
            ("/auth/password_change/", Template::PasswordChangeForm),
            ("/auth/password_change/done/", Template::PasswordChangeDone),
        ] {
            let response = app.get(path, Some(&cookie)).await;
            assert_eq!(response.status, StatusCode::OK, "{path}");
            assert_eq!(response.template, Some(template), "{path}");
        }
    }

    #[tokio::test]
    async fn signup_creates_exactly_one_user() {
        let app = TestApp::new().await;
        let users_before = app.state.db_client.count_users().await.unwrap();

        let response = app
            .post_form(
                "/auth/signup/",
                None,
                &[
                    ("first_name", "Тест"),
                    ("last_name", "Тестов"),
                    ("username", "New_User"),
                    ("email", "new@example.com"),
                    ("password1", PASSWORD),
                    ("password2", PASSWORD),
                ],
            )
            .await;
        assert_redirects(&response, "/");

        let db = &app.state.db_client;
        assert_eq!(db.count_users().await.unwrap(), users_before + 1);
        let user = db.fetch_user_by_username("New_User").await.unwrap().unwrap();
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.display_name(), "Тест Тестов");
    }

    #[tokio::test]
    async fn invalid_signups_are_rejected() {
        let app = TestApp::new().await;
        app.create_user("taken").await;

        for fields in [
            [("username", "taken"), ("password1", PASSWORD), ("password2", PASSWORD)],
            [("username", "bad name"), ("password1", PASSWORD), ("password2", PASSWORD)],
            [("username", "fresh"), ("password1", PASSWORD), ("password2", "mismatch1")],
            [("username", "fresh"), ("password1", "12345678"), ("password2", "12345678")],
        ] {
            let response = app.post_form("/auth/signup/", None, &fields).await;
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.template, Some(Template::Signup));
        }

        assert_eq!(app.state.db_client.count_users().await.unwrap(), 1);
        let response = app
            .post_form(
                "/auth/signup/",
                None,
                &[("username", "taken"), ("password1", PASSWORD), ("password2", PASSWORD)],
            )
            .await;
        assert!(response.body.contains("A user with that username already exists."));
    }

    #[tokio::test]
    async fn malformed_emails_are_rejected() {
        let app = TestApp::new().await;
        app.create_user("auth").await;

        for email in ["user@exa..mple.com", "<script>@x.com", "user@", "us er@example.com"] {
            let response = app
                .post_form(
                    "/auth/signup/",
                    None,
                    &[
                        ("username", "fresh"),
                        ("email", email),
                        ("password1", PASSWORD),
                        ("password2", PASSWORD),
                    ],
                )
                .await;
            assert_eq!(response.template, Some(Template::Signup), "{email}");
            assert!(response.body.contains("Enter a valid email address."), "{email}");

            let response = app
                .post_form("/auth/password_reset/", None, &[("email", email)])
                .await;
            assert_eq!(response.template, Some(Template::PasswordResetForm), "{email}");
            assert!(response.body.contains("Enter a valid email address."), "{email}");
        }

        assert_eq!(app.state.db_client.count_users().await.unwrap(), 1);
        assert!(app.state.outbox.sent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_starts_a_working_session() {
        let app = TestApp::new().await;
        app.create_user("auth").await;

        let response = app
            .post_form(
                "/auth/login/",
                None,
                &[("username", "auth"), ("password", PASSWORD), ("next", "/create/")],
            )
            .await;
        assert_redirects(&response, "/create/");
        let cookie = response.session_cookie().unwrap();

        let create = app.get("/create/", Some(&cookie)).await;
        assert_eq!(create.status, StatusCode::OK);
        assert_eq!(create.template, Some(Template::CreatePost));
    }

    #[tokio::test]
    async fn login_ignores_foreign_next() {
        let app = TestApp::new().await;
        app.create_user("auth").await;

        let response = app
            .post_form(
                "/auth/login/",
                None,
                &[
                    ("username", "auth"),
                    ("password", PASSWORD),
                    ("next", "https://evil.example/"),
                ],
            )
            .await;
        assert_redirects(&response, "/");
    }

    #[tokio::test]
    async fn wrong_password_rerenders_the_form() {
        let app = TestApp::new().await;
        app.create_user("auth").await;

        let response = app
            .post_form(
                "/auth/login/",
                None,
                &[("username", "auth"), ("password", "wrong-password")],
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.template, Some(Template::Login));
        assert!(response.body.contains("Please enter a correct username and password."));
        assert!(response.session_cookie().is_none());
    }

    #[tokio::test]
    async fn login_form_keeps_next() {
        let app = TestApp::new().await;

        let response = app.get("/auth/login/?next=/follow/", None).await;
        assert!(response.body.contains(r#"name="next" value="/follow/""#));
    }

    #[tokio::test]
    async fn logout_ends_the_session() {
        let app = TestApp::new().await;
        let user = app.create_user("auth").await;
        let cookie = app.login(&user).await;

        let response = app.post_form("/auth/logout/", Some(&cookie), &[]).await;
        assert_eq!(response.template, Some(Template::LoggedOut));
        assert!(
            response
                .header("set-cookie")
                .is_some_and(|value| value.starts_with(&format!("{SESSION_COOKIE}=;")))
        );

        let response = app.get("/create/", Some(&cookie)).await;
        assert_redirects(&response, "/auth/login/?next=/create/");
    }

    #[tokio::test]
    async fn password_change_replaces_the_password() {
        let app = TestApp::new().await;
        let user = app.create_user("auth").await;
        let cookie = app.login(&user).await;

        let response = app
            .post_form(
                "/auth/password_change/",
                Some(&cookie),
                &[
                    ("old_password", "not-my-password"),
                    ("new_password1", NEW_PASSWORD),
                    ("new_password2", NEW_PASSWORD),
                ],
            )
            .await;
        assert_eq!(response.template, Some(Template::PasswordChangeForm));
        assert!(response.body.contains("Your old password was entered incorrectly."));

        let response = app
            .post_form(
                "/auth/password_change/",
                Some(&cookie),
                &[
                    ("old_password", PASSWORD),
                    ("new_password1", NEW_PASSWORD),
                    ("new_password2", NEW_PASSWORD),
                ],
            )
            .await;
        assert_redirects(&response, "/auth/password_change/done/");
        let new_cookie = response.session_cookie().unwrap();

        let (_, password) = app
            .state
            .db_client
            .fetch_credentials("auth")
            .await
            .unwrap()
            .unwrap();
        assert!(password.verify(NEW_PASSWORD));

        let stale = app.get("/auth/password_change/done/", Some(&cookie)).await;
        assert_eq!(stale.status, StatusCode::FOUND);
        let fresh = app.get("/auth/password_change/done/", Some(&new_cookie)).await;
        assert_eq!(fresh.template, Some(Template::PasswordChangeDone));
    }

    #[tokio::test]
    async fn reset_link_works_once() {
        let app = TestApp::new().await;
        app.create_user("auth").await;

        let response = app
            .post_form("/auth/password_reset/", None, &[("email", "auth@example.com")])
            .await;
        assert_redirects(&response, "/auth/password_reset/done/");

        let sent = app.state.outbox.sent().await.unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("To: auth@example.com\r\n"));
        let link = reset_link(&sent[0]);

        let form = app.get(&link, None).await;
        assert_eq!(form.template, Some(Template::PasswordResetConfirm));
        assert!(form.body.contains(r#"name="new_password1""#));

        let response = app
            .post_form(
                &link,
                None,
                &[("new_password1", NEW_PASSWORD), ("new_password2", NEW_PASSWORD)],
            )
            .await;
        assert_redirects(&response, "/auth/reset/done/");

        let (_, password) = app
            .state
            .db_client
            .fetch_credentials("auth")
            .await
            .unwrap()
            .unwrap();
        assert!(password.verify(NEW_PASSWORD));

        let reused = app.get(&link, None).await;
        assert_eq!(reused.status, StatusCode::OK);
        assert_eq!(reused.template, Some(Template::PasswordResetConfirm));
        assert!(!reused.body.contains(r#"name="new_password1""#));
    }

    #[tokio::test]
    async fn reset_for_unknown_email_sends_nothing() {
        let app = TestApp::new().await;

        let response = app
            .post_form("/auth/password_reset/", None, &[("email", "nobody@example.com")])
            .await;
        assert_redirects(&response, "/auth/password_reset/done/");
        assert!(app.state.outbox.sent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bogus_reset_links_render_the_invalid_page() {
        let app = TestApp::new().await;
        let user = app.create_user("auth").await;
        let (uidb64, token) = PasswordResetToken::generate_random(user.id).as_path_parts();

        for path in [
            "/auth/reset/garbage/garbage/".to_owned(),
            format!("/auth/reset/{uidb64}/{token}/"),
        ] {
            let response = app.get(&path, None).await;
            assert_eq!(response.status, StatusCode::OK, "{path}");
            assert_eq!(response.template, Some(Template::PasswordResetConfirm), "{path}");
            assert!(response.body.contains("invalid"), "{path}");

            let response = app
                .post_form(
                    &path,
                    None,
                    &[("new_password1", NEW_PASSWORD), ("new_password2", NEW_PASSWORD)],
                )
                .await;
            assert_eq!(response.status, StatusCode::OK, "{path}");
        }
    }
}
