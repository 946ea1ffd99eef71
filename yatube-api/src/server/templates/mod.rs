//! Server-rendered pages.
//!
//! Every page is a maud function returning a [`Rendered`], which remembers the
//! [`Template`] it came from. The template travels with the response as an
//! extension, so callers further up (the page cache, tests) can tell which
//! page a handler produced without parsing HTML.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fmt::{Display, Formatter};
use time::UtcDateTime;
use yatube_common::{
    model::{group::Group, post::Post, user::User},
    paginate::Page,
};

pub mod about;
pub mod error_pages;
pub mod posts;
pub mod users;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Template {
    Index,
    GroupList,
    Profile,
    PostDetail,
    CreatePost,
    Follow,
    Signup,
    Login,
    LoggedOut,
    PasswordChangeForm,
    PasswordChangeDone,
    PasswordResetForm,
    PasswordResetDone,
    PasswordResetConfirm,
    PasswordResetComplete,
    AboutAuthor,
    AboutTech,
    BadRequest,
    NotFound,
    ServerError,
}

impl Template {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Template::Index => "posts/index.html",
            Template::GroupList => "posts/group_list.html",
            Template::Profile => "posts/profile.html",
            Template::PostDetail => "posts/post_detail.html",
            Template::CreatePost => "posts/create_post.html",
            Template::Follow => "posts/follow.html",
            Template::Signup => "users/signup.html",
            Template::Login => "users/login.html",
            Template::LoggedOut => "users/logged_out.html",
            Template::PasswordChangeForm => "users/password_change_form.html",
            Template::PasswordChangeDone => "users/password_change_done.html",
            Template::PasswordResetForm => "users/password_reset_form.html",
            Template::PasswordResetDone => "users/password_reset_done.html",
            Template::PasswordResetConfirm => "users/password_reset_confirm.html",
            Template::PasswordResetComplete => "users/password_reset_complete.html",
            Template::AboutAuthor => "about/author.html",
            Template::AboutTech => "about/tech.html",
            Template::BadRequest => "core/400.html",
            Template::NotFound => "core/404.html",
            Template::ServerError => "core/500.html",
        }
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A finished page plus the template that produced it.
#[derive(Clone, Debug)]
pub struct Rendered {
    template: Template,
    status: StatusCode,
    markup: Markup,
}

impl Rendered {
    #[must_use]
    pub fn new(template: Template, markup: Markup) -> Self {
        Self {
            template,
            status: StatusCode::OK,
            markup,
        }
    }

    #[must_use]
    pub fn with_status(self, status: StatusCode) -> Self {
        Self { status, ..self }
    }

    #[must_use]
    pub fn template(&self) -> Template {
        self.template
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn into_html(self) -> String {
        self.markup.into_string()
    }
}

impl IntoResponse for Rendered {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.markup).into_response();
        response.extensions_mut().insert(self.template);
        response
    }
}

const SITE_CSS: &str = "
*{box-sizing:border-box}
body{font-family:-apple-system,BlinkMacSystemFont,\"Segoe UI\",Roboto,sans-serif;margin:0;color:#212529;background:#fff;line-height:1.5}
header,footer{background:#f8f9fa;padding:.75rem 1.5rem}
header nav{display:flex;gap:1rem;flex-wrap:wrap;align-items:center}
header .brand{font-weight:700;margin-right:auto;color:#dc3545}
main{max-width:960px;margin:0 auto;padding:1.5rem}
a{color:#0d6efd;text-decoration:none}
a:hover{text-decoration:underline}
article.post{border-bottom:1px solid #dee2e6;padding:1rem 0}
article.post ul{list-style:none;padding:0;margin:0 0 .5rem;color:#6c757d}
img.post-image{max-width:100%;height:auto;display:block;margin:.5rem 0}
.errorlist{color:#dc3545;list-style:none;padding:0;margin:.25rem 0}
.pagination{display:flex;gap:.5rem;list-style:none;padding:0}
.pagination .current{font-weight:700}
form p{margin:.75rem 0}
label{display:block;font-weight:600}
input[type=text],input[type=email],input[type=password],textarea,select{width:100%;padding:.375rem .75rem;border:1px solid #ced4da;border-radius:.25rem}
textarea{min-height:10rem}
footer{text-align:center;color:#6c757d;margin-top:2rem}
";

/// Shared page chrome: navigation and footer around `content`.
pub(crate) fn layout(viewer: Option<&User>, title: &str, content: &Markup) -> Markup {
    let year = UtcDateTime::now().year();

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " | Yatube" }
                style { (PreEscaped(SITE_CSS)) }
            }
            body {
                header {
                    nav {
                        a.brand href="/" { "Yatube" }
                        a href="/" { "Home" }
                        a href="/about/author/" { "About the author" }
                        a href="/about/tech/" { "Technologies" }
                        @if let Some(viewer) = viewer {
                            a href="/follow/" { "Subscriptions" }
                            a href="/create/" { "New post" }
                            a href="/auth/password_change/" { "Change password" }
                            a href="/auth/logout/" { "Log out" }
                            span.username { "User: " (viewer.username.get()) }
                        } @else {
                            a href="/auth/login/" { "Log in" }
                            a href="/auth/signup/" { "Sign up" }
                        }
                    }
                }
                main {
                    (content)
                }
                footer {
                    p { "© " (year) " Copyright " span { "Yatube" } }
                }
            }
        }
    }
}

pub(crate) fn profile_url(user: &User) -> String {
    format!("/profile/{}/", user.username.get())
}

pub(crate) fn group_url(group: &Group) -> String {
    format!("/group/{}/", group.slug.get())
}

pub(crate) fn post_url(post: &Post) -> String {
    format!("/posts/{}/", post.id)
}

pub(crate) fn media_url(path: &str) -> String {
    format!("/media/{path}")
}

pub(crate) fn format_date(date_time: UtcDateTime) -> String {
    format!(
        "{} {}, {}",
        date_time.day(),
        date_time.month(),
        date_time.year()
    )
}

/// Keeps the author's line breaks.
pub(crate) fn multiline(text: &str) -> Markup {
    html! {
        @for (index, line) in text.lines().enumerate() {
            @if index > 0 { br; }
            (line)
        }
    }
}

pub(crate) fn post_card(post: &Post, show_group_link: bool) -> Markup {
    html! {
        article.post data-post-id=(post.id) {
            ul {
                li {
                    "Author: "
                    a href=(profile_url(&post.author)) { (post.author.display_name()) }
                }
                li { "Published: " (format_date(post.created_at)) }
            }
            @if let Some(image) = &post.image {
                img.post-image src=(media_url(image)) alt="";
            }
            p { (multiline(&post.text)) }
            a href=(post_url(post)) { "Details" }
            @if show_group_link {
                @if let Some(group) = &post.group {
                    " "
                    a href=(group_url(group)) { "All posts of the group " (group.title) }
                }
            }
        }
    }
}

pub(crate) fn pagination<T>(page: &Page<T>) -> Markup {
    html! {
        @if page.num_pages() > 1 {
            nav aria-label="Pagination" {
                ul.pagination {
                    @if let Some(previous) = page.previous_page_number() {
                        li { a href="?page=1" { "First" } }
                        li { a href={ "?page=" (previous) } { "Previous" } }
                    }
                    li.current { "Page " (page.number()) " of " (page.num_pages()) }
                    @if let Some(next) = page.next_page_number() {
                        li { a href={ "?page=" (next) } { "Next" } }
                        li { a href={ "?page=" (page.num_pages()) } { "Last" } }
                    }
                }
            }
        }
    }
}

pub(crate) fn error_list(errors: &[String]) -> Markup {
    html! {
        @if !errors.is_empty() {
            ul.errorlist {
                @for error in errors {
                    li { (error) }
                }
            }
        }
    }
}
