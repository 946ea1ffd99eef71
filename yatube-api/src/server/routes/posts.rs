use crate::server::{
    Result, ServerError, ServerRouter, Settings,
    auth::{AuthenticatedUser, Viewer},
    cache::{PageCache, PageKey},
    extract::{Form, Query},
    forms::{CommentForm, FieldErrors, PostForm},
    found,
    media::MediaStore,
    templates::{self, post_url, posts::ProfileView, profile_url},
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::Uri,
    response::{IntoResponse, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use yatube_common::model::{
    Id,
    comment::CreateComment,
    follow::Follow,
    post::{CreatePost, Post, PostContent, PostMarker},
};
use yatube_db::client::{DbClient, PostFilter};

/// Uploads larger than this are rejected before the handler runs.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .typed_get(group_list)
        .typed_get(profile)
        .typed_get(post_detail)
        .typed_get(create_post_form)
        .typed_post(create_post)
        .typed_get(edit_post_form)
        .typed_post(edit_post)
        .typed_get(comment_redirect)
        .typed_post(add_comment)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> Option<&str> {
        self.page.as_deref()
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
struct IndexPath();

async fn index(
    IndexPath(): IndexPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    State(page_cache): State<PageCache>,
    viewer: Viewer,
    uri: Uri,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let key = PageKey::new(viewer.user_id(), &uri);
    if let Some(page) = page_cache.get(&key).await {
        return Ok(page.into_response());
    }

    let posts = db
        .fetch_post_page(PostFilter::All, settings.paginator, query.page())
        .await?;

    Ok(page_cache
        .store(key, templates::posts::index(viewer.user(), &posts))
        .await)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
struct GroupListPath {
    slug: String,
}

async fn group_list(
    GroupListPath { slug }: GroupListPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let group = db
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;

    let posts = db
        .fetch_post_page(PostFilter::Group(group.id), settings.paginator, query.page())
        .await?;

    Ok(templates::posts::group_list(viewer.user(), &group, &posts).into_response())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/", rejection(ServerError))]
struct ProfilePath {
    username: String,
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let author = db
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByNameNotFound(username))?;

    let posts = db
        .fetch_post_page(PostFilter::Author(author.id), settings.paginator, query.page())
        .await?;

    let viewer_follows = match viewer
        .user_id()
        .and_then(|viewer_id| Follow::new(viewer_id, author.id))
    {
        Some(follow) => Some(db.is_following(follow).await?),
        None => None,
    };

    let view = ProfileView {
        author: &author,
        posts: &posts,
        followers: db.count_followers(author.id).await?,
        following: db.count_following(author.id).await?,
        viewer_follows,
    };

    Ok(templates::posts::profile(viewer.user(), &view).into_response())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{post_id}/", rejection(ServerError))]
struct PostDetailPath {
    post_id: Id<PostMarker>,
}

async fn fetch_post(db: &DbClient, post_id: Id<PostMarker>) -> Result<Post> {
    db.fetch_post(post_id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))
}

async fn post_detail(
    PostDetailPath { post_id }: PostDetailPath,
    State(db): State<Arc<DbClient>>,
    viewer: Viewer,
) -> Result<Response> {
    let post = fetch_post(&db, post_id).await?;
    let author_post_count = db.count_posts(PostFilter::Author(post.author.id)).await?;
    let comments = db.fetch_comments(post_id).await?;

    Ok(
        templates::posts::post_detail(viewer.user(), &post, author_post_count, &comments)
            .into_response(),
    )
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/create/", rejection(ServerError))]
struct CreatePostPath();

async fn create_post_form(
    CreatePostPath(): CreatePostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let groups = db.fetch_groups().await?;
    let form = PostForm::default();

    Ok(templates::posts::create_post(
        Some(user.user()),
        &form,
        &FieldErrors::default(),
        &groups,
        None,
    )
    .into_response())
}

async fn save_image(media: &MediaStore, form: &PostForm) -> Result<Option<String>> {
    let Some(upload) = &form.image else {
        return Ok(None);
    };

    let stored = media
        .save_post_image(&upload.file_name, &upload.data)
        .await
        .map_err(ServerError::Media)?;
    Ok(Some(stored))
}

/// Drops an image stored for a write that did not go through.
async fn discard_image(media: &MediaStore, image: Option<&str>) {
    if let Some(image) = image {
        if let Err(err) = media.remove(image).await {
            warn!(%image, %err, "Could not remove orphaned post image");
        }
    }
}

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStore>>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Response> {
    let form = PostForm::from_multipart(multipart).await?;
    let groups = db.fetch_groups().await?;

    let errors = form.validate(&groups);
    if !errors.is_empty() {
        return Ok(
            templates::posts::create_post(Some(user.user()), &form, &errors, &groups, None)
                .into_response(),
        );
    }

    let post = CreatePost {
        author: user.user_id(),
        content: PostContent {
            text: form.text.trim().to_owned(),
            group: form.group_id(),
            image: save_image(&media, &form).await?,
        },
    };
    let post_id = match db.create_post(&post).await {
        Ok(post_id) => post_id,
        Err(err) => {
            discard_image(&media, post.content.image.as_deref()).await;
            return Err(err.into());
        }
    };

    info!(%post_id, author = %user.user_id(), "Created post");

    Ok(found(&profile_url(user.user())))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{post_id}/edit/", rejection(ServerError))]
struct EditPostPath {
    post_id: Id<PostMarker>,
}

async fn edit_post_form(
    EditPostPath { post_id }: EditPostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let post = fetch_post(&db, post_id).await?;
    if post.author.id != user.user_id() {
        return Ok(found(&post_url(&post)));
    }

    let groups = db.fetch_groups().await?;
    let form = PostForm::from_post(&post);

    Ok(templates::posts::create_post(
        Some(user.user()),
        &form,
        &FieldErrors::default(),
        &groups,
        Some(&post),
    )
    .into_response())
}

async fn edit_post(
    EditPostPath { post_id }: EditPostPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStore>>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Response> {
    let post = fetch_post(&db, post_id).await?;
    if post.author.id != user.user_id() {
        return Ok(found(&post_url(&post)));
    }

    let form = PostForm::from_multipart(multipart).await?;
    let groups = db.fetch_groups().await?;

    let errors = form.validate(&groups);
    if !errors.is_empty() {
        return Ok(templates::posts::create_post(
            Some(user.user()),
            &form,
            &errors,
            &groups,
            Some(&post),
        )
        .into_response());
    }

    let content = PostContent {
        text: form.text.trim().to_owned(),
        group: form.group_id(),
        image: save_image(&media, &form).await?,
    };
    match db.update_post(post_id, &content).await {
        Ok(true) => {}
        Ok(false) => {
            discard_image(&media, content.image.as_deref()).await;
            return Err(ServerError::PostByIdNotFound(post_id));
        }
        Err(err) => {
            discard_image(&media, content.image.as_deref()).await;
            return Err(err.into());
        }
    }

    info!(%post_id, "Edited post");

    Ok(found(&post_url(&post)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{post_id}/comment/", rejection(ServerError))]
struct CommentPath {
    post_id: Id<PostMarker>,
}

async fn comment_redirect(
    CommentPath { post_id }: CommentPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Response> {
    let post = fetch_post(&db, post_id).await?;

    Ok(found(&post_url(&post)))
}

async fn add_comment(
    CommentPath { post_id }: CommentPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Form(form): Form<CommentForm>,
) -> Result<Response> {
    let post = fetch_post(&db, post_id).await?;

    let text = form.text.trim();
    if !text.is_empty() {
        let comment_id = db
            .create_comment(&CreateComment {
                post: post_id,
                author: user.user_id(),
                text: text.to_owned(),
            })
            .await?;
        info!(%comment_id, %post_id, "Added comment");
    }

    Ok(found(&post_url(&post)))
}
