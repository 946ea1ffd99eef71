use axum::{
    Router,
    extract::{
        FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{FormRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use cache::PageCache;
use mail::{MailError, Outbox};
use media::MediaStore;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error};
use yatube_common::{
    model::{
        Id,
        auth::{AuthTokenHashError, PasswordHashError},
        post::PostMarker,
    },
    paginate::Paginator,
    util::PositiveDuration,
};
use yatube_db::client::{DbClient, DbError};

pub mod auth;
pub mod cache;
mod extract;
mod forms;
pub mod mail;
pub mod media;
mod routes;
pub mod templates;
#[cfg(test)]
mod test_support;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub settings: Arc<Settings>,
    pub page_cache: PageCache,
    pub media: Arc<MediaStore>,
    pub outbox: Arc<Outbox>,
}

/// Runtime knobs handlers read from the state.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Settings {
    pub paginator: Paginator,
    /// `None` keeps sessions until logout.
    pub session_age: Option<PositiveDuration>,
    /// Absolute origin used in links sent by mail, without a trailing slash.
    pub site_url: String,
}

pub fn app(state: ServerState) -> Router {
    let media_files = ServeDir::new(state.media.root());

    routes::routes()
        .nest_service("/media", media_files)
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

/// A plain `302 Found`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

pub fn login_url(next: &str) -> String {
    let next = urlencoding::encode(next).replace("%2F", "/");
    format!("/auth/login/?next={next}")
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming form rejected: {0}")]
    FormRejection(#[from] FormRejection),
    #[error("Incoming multipart form rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Reading multipart form failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Login required to access {0}")]
    LoginRequired(String),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User {0} was not found.")]
    UserByNameNotFound(String),
    #[error("Group {0} was not found.")]
    GroupBySlugNotFound(String),
    #[error("Storing uploaded media failed: {0}")]
    Media(std::io::Error),
    #[error("Sending mail failed: {0}")]
    Mail(#[from] MailError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByNameNotFound(_)
            | ServerError::GroupBySlugNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::LoginRequired(_) => StatusCode::FOUND,
            ServerError::QueryRejection(_)
            | ServerError::FormRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::AuthTokenHash(_)
            | ServerError::PasswordHash(_)
            | ServerError::Database(_)
            | ServerError::Media(_)
            | ServerError::Mail(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let ServerError::LoginRequired(next) = &self {
            debug!(%next, "Redirecting anonymous visitor to login");
            return found(&login_url(next));
        }

        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let page = if status == StatusCode::NOT_FOUND {
            templates::error_pages::not_found()
        } else if status.is_server_error() {
            templates::error_pages::server_error()
        } else {
            templates::error_pages::bad_request()
        };
        page.with_status(status).into_response()
    }
}
