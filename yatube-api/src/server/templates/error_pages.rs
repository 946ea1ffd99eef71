use crate::server::templates::{Rendered, Template, layout};
use maud::html;

pub fn not_found() -> Rendered {
    let content = html! {
        h1 { "Page not found" }
        p { "The page you requested does not exist." }
        a href="/" { "Back to the home page" }
    };

    Rendered::new(Template::NotFound, layout(None, "Page not found", &content))
}

pub fn bad_request() -> Rendered {
    let content = html! {
        h1 { "Bad request" }
        p { "The request could not be understood." }
        a href="/" { "Back to the home page" }
    };

    Rendered::new(Template::BadRequest, layout(None, "Bad request", &content))
}

pub fn server_error() -> Rendered {
    let content = html! {
        h1 { "Server error" }
        p { "Something went wrong on our side. Please try again later." }
    };

    Rendered::new(Template::ServerError, layout(None, "Server error", &content))
}
