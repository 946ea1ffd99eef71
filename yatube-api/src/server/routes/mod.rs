use crate::server::ServerRouter;

mod about;
mod follow;
mod posts;
mod users;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(posts::routes())
        .merge(follow::routes())
        .merge(users::routes())
        .merge(about::routes())
}
