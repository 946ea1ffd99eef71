use crate::server::templates::{Rendered, Template, layout};
use maud::html;
use yatube_common::model::user::User;

pub fn author(viewer: Option<&User>) -> Rendered {
    let content = html! {
        h1 { "About the author" }
        p {
            "Yatube is a small blogging platform: write posts, file them under groups, "
            "comment on what others write and follow the authors you like."
        }
        p { "This page is a place for the author to introduce themselves." }
    };

    Rendered::new(
        Template::AboutAuthor,
        layout(viewer, "About the author", &content),
    )
}

pub fn tech(viewer: Option<&User>) -> Rendered {
    let content = html! {
        h1 { "Technologies" }
        ul {
            li { "axum for routing and request handling" }
            li { "sqlx over SQLite for storage" }
            li { "maud for the server-rendered pages" }
            li { "argon2 for password and session hashing" }
        }
    };

    Rendered::new(Template::AboutTech, layout(viewer, "Technologies", &content))
}
