use crate::server::{
    ServerError, ServerRouter,
    auth::Viewer,
    templates::{self, Rendered},
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(author).typed_get(tech)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/about/author/", rejection(ServerError))]
struct AuthorPath();

async fn author(AuthorPath(): AuthorPath, viewer: Viewer) -> Rendered {
    templates::about::author(viewer.user())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/about/tech/", rejection(ServerError))]
struct TechPath();

async fn tech(TechPath(): TechPath, viewer: Viewer) -> Rendered {
    templates::about::tech(viewer.user())
}

#[cfg(test)]
mod tests {
    use crate::server::{templates::Template, test_support::TestApp};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn static_pages_are_public() {
        let app = TestApp::new().await;

        for (path, template) in [
            ("/about/author/", Template::AboutAuthor),
            ("/about/tech/", Template::AboutTech),
        ] {
            let response = app.get(path, None).await;
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.template, Some(template));
        }
    }
}
