use crate::server::{Result, ServerError, Settings};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{Uri, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use time::UtcDateTime;
use tracing::{debug, info};
use yatube_common::model::{
    Id,
    auth::{AuthToken, Authentication},
    user::{User, UserMarker},
};
use yatube_db::client::DbClient;

pub const SESSION_COOKIE: &str = "sessionid";

/// Whoever sent the request. Bad or expired sessions count as anonymous.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct Viewer(pub Option<User>);

impl Viewer {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<Id<UserMarker>> {
        self.0.as_ref().map(|user| user.id)
    }
}

/// A logged-in user. Rejects anonymous requests with a redirect to the login page.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    #[must_use]
    pub fn user(&self) -> &User {
        &self.0
    }

    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.0.id
    }
}

impl<S> FromRequestParts<S> for Viewer
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(viewer) = parts.extensions.get::<Viewer>() {
            return Ok(viewer.clone());
        }

        let jar = CookieJar::from_headers(&parts.headers);
        let user = match jar.get(SESSION_COOKIE) {
            Some(cookie) => session_user(&Arc::<DbClient>::from_ref(state), cookie.value()).await?,
            None => None,
        };

        let viewer = Viewer(user);
        parts.extensions.insert(viewer.clone());

        Ok(viewer)
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Viewer(user) = Viewer::from_request_parts(parts, state).await?;

        user.map(Self)
            .ok_or_else(|| ServerError::LoginRequired(requested_path(&parts.uri)))
    }
}

fn requested_path(uri: &Uri) -> String {
    uri.path_and_query()
        .map_or_else(|| uri.path().to_owned(), ToString::to_string)
}

async fn session_user(db: &DbClient, cookie_value: &str) -> Result<Option<User>> {
    let Ok(token) = cookie_value.parse::<AuthToken>() else {
        debug!("Ignoring malformed session cookie");
        return Ok(None);
    };

    let token_hash = token.hash()?;

    let Some(authentication) = db.fetch_auth(&token_hash).await? else {
        debug!(user_id = %token.user_id, "Session cookie names no stored session");
        return Ok(None);
    };

    if authentication.user != token.user_id {
        return Ok(None);
    }

    if authentication.is_expired_at(UtcDateTime::now()) {
        debug!(user_id = %authentication.user, "Session expired");
        db.delete_auth(&token_hash).await?;
        return Ok(None);
    }

    Ok(db.fetch_user(authentication.user).await?)
}

/// Stores a fresh session for `user_id` and returns the cookie that carries it.
pub async fn start_session(
    db: &DbClient,
    settings: &Settings,
    user_id: Id<UserMarker>,
) -> Result<Cookie<'static>> {
    let token = AuthToken::generate_random(user_id);

    db.create_auth(&Authentication {
        user: user_id,
        token_hash: token.hash()?,
        created_at: UtcDateTime::now(),
        expires_after: settings.session_age,
    })
    .await?;

    info!(%user_id, "Started session");

    let mut cookie = Cookie::build((SESSION_COOKIE, token.as_token_str()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    if let Some(session_age) = settings.session_age {
        cookie = cookie.max_age(session_age.get());
    }

    Ok(cookie.build())
}

/// Forgets the session named by the request's cookie and returns the jar without it.
pub async fn end_session(db: &DbClient, jar: CookieJar) -> Result<CookieJar> {
    let Some(token) = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse::<AuthToken>().ok())
    else {
        return Ok(jar);
    };

    if db.delete_auth(&token.hash()?).await? {
        info!(user_id = %token.user_id, "Ended session");
    }

    Ok(jar.remove(Cookie::build(SESSION_COOKIE).path("/")))
}
