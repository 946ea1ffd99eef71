use crate::server::{
    Result, ServerError, ServerRouter, Settings,
    auth::AuthenticatedUser,
    extract::Query,
    found,
    routes::posts::PageQuery,
    templates::{self, Rendered, profile_url},
};
use axum::{extract::State, response::Response};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use yatube_common::model::{follow::Follow, user::User};
use yatube_db::client::{DbClient, PostFilter};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(follow_index)
        .typed_get(profile_follow)
        .typed_get(profile_unfollow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/follow/", rejection(ServerError))]
struct FollowIndexPath();

async fn follow_index(
    FollowIndexPath(): FollowIndexPath,
    State(db): State<Arc<DbClient>>,
    State(settings): State<Arc<Settings>>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Rendered> {
    let posts = db
        .fetch_post_page(
            PostFilter::FollowedBy(user.user_id()),
            settings.paginator,
            query.page(),
        )
        .await?;

    Ok(templates::posts::follow(Some(user.user()), &posts))
}

async fn fetch_author(db: &DbClient, username: String) -> Result<User> {
    db.fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByNameNotFound(username))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/follow/", rejection(ServerError))]
struct FollowPath {
    username: String,
}

async fn profile_follow(
    FollowPath { username }: FollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let author = fetch_author(&db, username).await?;

    // Following yourself is silently ignored.
    if let Some(follow) = Follow::new(user.user_id(), author.id)
        && db.follow(follow).await?
    {
        info!(follower = %follow.follower, author = %follow.author, "Followed author");
    }

    Ok(found(&profile_url(&author)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/unfollow/", rejection(ServerError))]
struct UnfollowPath {
    username: String,
}

async fn profile_unfollow(
    UnfollowPath { username }: UnfollowPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let author = fetch_author(&db, username).await?;

    if let Some(follow) = Follow::new(user.user_id(), author.id)
        && db.unfollow(follow).await?
    {
        info!(follower = %follow.follower, author = %follow.author, "Unfollowed author");
    }

    Ok(found(&profile_url(&author)))
}
