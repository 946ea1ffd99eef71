//! Router harness shared by the handler tests.

use crate::server::{
    ServerState, Settings, app,
    auth::SESSION_COOKIE,
    cache::PageCache,
    mail::Outbox,
    media::MediaStore,
    templates::Template,
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tempfile::TempDir;
use time::UtcDateTime;
use tower::ServiceExt;
use yatube_common::{
    model::{
        Id,
        auth::{AuthToken, Authentication, HashedPassword},
        group::{CreateGroup, Group, Slug},
        post::{CreatePost, PostContent, PostMarker},
        user::{CreateUser, User, Username},
    },
    paginate::Paginator,
    util::PositiveDuration,
};
use yatube_db::client::{DbClient, PostFilter};

/// Password of every user made by [`TestApp::create_user`].
pub const PASSWORD: &str = "rgwrghwr34125";

pub const INDEX_CACHE_TTL: Duration = Duration::from_secs(20);

pub const SMALL_GIF: &[u8] = b"GIF89a\x02\x00\x01\x00\x80\x00\x00\x00\x00\x00\xFF\xFF\xFF\x21\xF9\x04\x00\x00\x00\x00\x00\x2C\x00\x00\x00\x00\x02\x00\x01\x00\x00\x02\x02\x0C\x0A\x00\x3B";

const BOUNDARY: &str = "yatube-test-boundary";

pub struct TestApp {
    pub state: ServerState,
    router: Router,
    _media_dir: TempDir,
    _mail_dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub template: Option<Template>,
    pub headers: HeaderMap,
    pub body: String,
}

pub struct MultipartField {
    name: String,
    file: Option<(String, String)>,
    data: Vec<u8>,
}

impl MultipartField {
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_owned(),
            file: None,
            data: value.as_bytes().to_vec(),
        }
    }

    pub fn file(name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_owned(),
            file: Some((file_name.to_owned(), content_type.to_owned())),
            data: data.to_vec(),
        }
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let mail_dir = tempfile::tempdir().unwrap();

        let state = ServerState {
            db_client: Arc::new(DbClient::connect_in_memory().await.unwrap()),
            settings: Arc::new(Settings {
                paginator: Paginator::default(),
                session_age: PositiveDuration::from_seconds(14 * 24 * 60 * 60),
                site_url: "http://testserver".to_owned(),
            }),
            page_cache: PageCache::new(INDEX_CACHE_TTL),
            media: Arc::new(MediaStore::new(media_dir.path().to_path_buf())),
            outbox: Arc::new(Outbox::new(mail_dir.path().join("sent"))),
        };

        Self {
            router: app(state.clone()),
            state,
            _media_dir: media_dir,
            _mail_dir: mail_dir,
        }
    }

    pub fn media_root(&self) -> PathBuf {
        self.state.media.root().to_path_buf()
    }

    pub async fn create_user(&self, username: &str) -> User {
        let db = &self.state.db_client;
        let user_id = db
            .create_user(&CreateUser {
                username: Username::new(username.to_owned()).unwrap(),
                email: format!("{username}@example.com"),
                first_name: String::new(),
                last_name: String::new(),
                password: HashedPassword::new(PASSWORD).unwrap(),
            })
            .await
            .unwrap();

        db.fetch_user(user_id).await.unwrap().unwrap()
    }

    pub async fn create_group(&self, slug: &str) -> Group {
        let db = &self.state.db_client;
        let group_id = db
            .create_group(&CreateGroup {
                title: format!("Тестовая группа {slug}"),
                slug: Slug::new(slug.to_owned()).unwrap(),
                description: "Тестовое описание".to_owned(),
            })
            .await
            .unwrap();

        db.fetch_group(group_id).await.unwrap().unwrap()
    }

    pub async fn create_post(
        &self,
        author: &User,
        group: Option<&Group>,
        text: &str,
    ) -> Id<PostMarker> {
        self.state
            .db_client
            .create_post(&CreatePost {
                author: author.id,
                content: PostContent {
                    text: text.to_owned(),
                    group: group.map(|group| group.id),
                    image: None,
                },
            })
            .await
            .unwrap()
    }

    pub async fn post_total(&self) -> u64 {
        self.state.db_client.count_posts(PostFilter::All).await.unwrap()
    }

    pub async fn latest_post_id(&self) -> Id<PostMarker> {
        let page = self
            .state
            .db_client
            .fetch_post_page(PostFilter::All, Paginator::default(), None)
            .await
            .unwrap();

        page.items()[0].id
    }

    /// Stores a session for `user` and returns the matching `Cookie` header value.
    pub async fn login(&self, user: &User) -> String {
        let token = AuthToken::generate_random(user.id);
        self.state
            .db_client
            .create_auth(&Authentication {
                user: user.id,
                token_hash: token.hash().unwrap(),
                created_at: UtcDateTime::now(),
                expires_after: self.state.settings.session_age,
            })
            .await
            .unwrap();

        format!("{SESSION_COOKIE}={}", token.as_token_str())
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> TestResponse {
        let request = request_builder("GET", path, cookie)
            .body(Body::empty())
            .unwrap();

        self.send(request).await
    }

    pub async fn post_form(
        &self,
        path: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
    ) -> TestResponse {
        let body = fields
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&");

        let request = request_builder("POST", path, cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();

        self.send(request).await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        cookie: Option<&str>,
        fields: &[MultipartField],
    ) -> TestResponse {
        let mut body = Vec::new();
        for field in fields {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match &field.file {
                Some((file_name, content_type)) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
                        field.name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", field.name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(&field.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = request_builder("POST", path, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let template = response.extensions().get::<Template>().copied();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        TestResponse {
            status,
            template,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}

fn request_builder(method: &str, path: &str, cookie: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(path);
    match cookie {
        Some(cookie) => builder.header(header::COOKIE, cookie),
        None => builder,
    }
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// The session cookie set by this response, ready to send back.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .find(|pair| {
                pair.strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                    .is_some_and(|value| !value.is_empty())
            })
            .map(ToOwned::to_owned)
    }

    /// Posts rendered as cards or as a detail page.
    pub fn post_count(&self) -> usize {
        self.body.matches(r#"data-post-id=""#).count()
    }

    pub fn shows_post(&self, post_id: Id<PostMarker>) -> bool {
        self.body.contains(&format!(r#"data-post-id="{post_id}""#))
    }
}

pub fn assert_redirects(response: &TestResponse, location: &str) {
    assert_eq!(response.status, StatusCode::FOUND, "{}", response.body);
    assert_eq!(response.header("location"), Some(location));
}
