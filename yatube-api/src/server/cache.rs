use crate::server::templates::{Rendered, Template};
use axum::{
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::CacheControl;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;
use yatube_common::model::{Id, user::UserMarker};

const CACHE_CAPACITY: u64 = 1_000;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PageKey {
    viewer: Option<Id<UserMarker>>,
    uri: String,
}

impl PageKey {
    #[must_use]
    pub fn new(viewer: Option<Id<UserMarker>>, uri: &Uri) -> Self {
        Self {
            viewer,
            uri: uri.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CachedPage {
    template: Template,
    html: String,
    max_age: Duration,
}

impl IntoResponse for CachedPage {
    fn into_response(self) -> Response {
        let cache_control = CacheControl::new().with_max_age(self.max_age);
        let mut response = (TypedHeader(cache_control), Html(self.html)).into_response();
        response.extensions_mut().insert(self.template);
        response
    }
}

/// Rendered pages kept for a fixed time, keyed by viewer and URI.
#[derive(Clone, Debug)]
pub struct PageCache {
    pages: Option<Cache<PageKey, CachedPage>>,
    ttl: Duration,
}

impl PageCache {
    /// A zero `ttl` disables caching.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let pages = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(ttl)
                .build()
        });

        Self { pages, ttl }
    }

    pub async fn get(&self, key: &PageKey) -> Option<CachedPage> {
        let page = self.pages.as_ref()?.get(key).await;
        if page.is_some() {
            debug!(uri = %key.uri, "Serving page from cache");
        }
        page
    }

    /// Remembers a successful render and turns it into the response to send.
    pub async fn store(&self, key: PageKey, rendered: Rendered) -> Response {
        if rendered.status() != StatusCode::OK {
            return rendered.into_response();
        }

        let page = CachedPage {
            template: rendered.template(),
            html: rendered.into_html(),
            max_age: self.ttl,
        };

        if let Some(pages) = &self.pages {
            pages.insert(key, page.clone()).await;
        }

        page.into_response()
    }

    pub fn clear(&self) {
        if let Some(pages) = &self.pages {
            pages.invalidate_all();
        }
    }
}
