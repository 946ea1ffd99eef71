use crate::server::{
    forms::{FieldErrors, LoginForm, PasswordResetForm, SignupForm},
    templates::{Rendered, Template, error_list, layout},
};
use maud::{Markup, html};
use yatube_common::model::user::User;

fn input(label: &str, name: &'static str, kind: &str, value: &str, errors: &FieldErrors) -> Markup {
    let id = format!("id_{name}");
    html! {
        p {
            label for=(id) { (label) }
            input id=(id) type=(kind) name=(name) value=(value);
            (error_list(errors.get(name)))
        }
    }
}

fn password(label: &str, name: &'static str, errors: &FieldErrors) -> Markup {
    input(label, name, "password", "", errors)
}

pub fn signup(viewer: Option<&User>, form: &SignupForm, errors: &FieldErrors) -> Rendered {
    let content = html! {
        h1 { "Sign up" }
        (error_list(errors.non_field()))
        form method="post" action="/auth/signup/" {
            (input("First name", "first_name", "text", &form.first_name, errors))
            (input("Last name", "last_name", "text", &form.last_name, errors))
            (input("Username", "username", "text", &form.username, errors))
            (input("Email address", "email", "email", &form.email, errors))
            (password("Password", "password1", errors))
            (password("Password confirmation", "password2", errors))
            button type="submit" { "Sign up" }
        }
    };

    Rendered::new(Template::Signup, layout(viewer, "Sign up", &content))
}

pub fn login(viewer: Option<&User>, form: &LoginForm, errors: &FieldErrors) -> Rendered {
    let content = html! {
        h1 { "Log in" }
        (error_list(errors.non_field()))
        form method="post" action="/auth/login/" {
            (input("Username", "username", "text", &form.username, errors))
            (password("Password", "password", errors))
            input type="hidden" name="next" value=(form.next);
            button type="submit" { "Log in" }
        }
        p { a href="/auth/password_reset/" { "Forgot your password?" } }
    };

    Rendered::new(Template::Login, layout(viewer, "Log in", &content))
}

pub fn logged_out() -> Rendered {
    let content = html! {
        h1 { "You have logged out" }
        p { a href="/auth/login/" { "Log in again" } }
    };

    Rendered::new(Template::LoggedOut, layout(None, "Logged out", &content))
}

pub fn password_change_form(viewer: Option<&User>, errors: &FieldErrors) -> Rendered {
    let content = html! {
        h1 { "Change password" }
        (error_list(errors.non_field()))
        form method="post" action="/auth/password_change/" {
            (password("Old password", "old_password", errors))
            (password("New password", "new_password1", errors))
            (password("New password confirmation", "new_password2", errors))
            button type="submit" { "Change password" }
        }
    };

    Rendered::new(
        Template::PasswordChangeForm,
        layout(viewer, "Change password", &content),
    )
}

pub fn password_change_done(viewer: Option<&User>) -> Rendered {
    let content = html! {
        h1 { "Password changed" }
        p { "Your password was changed." }
    };

    Rendered::new(
        Template::PasswordChangeDone,
        layout(viewer, "Password changed", &content),
    )
}

pub fn password_reset_form(
    viewer: Option<&User>,
    form: &PasswordResetForm,
    errors: &FieldErrors,
) -> Rendered {
    let content = html! {
        h1 { "Reset password" }
        p { "Enter the email address you signed up with to receive a reset link." }
        form method="post" action="/auth/password_reset/" {
            (input("Email address", "email", "email", &form.email, errors))
            button type="submit" { "Reset password" }
        }
    };

    Rendered::new(
        Template::PasswordResetForm,
        layout(viewer, "Reset password", &content),
    )
}

pub fn password_reset_done(viewer: Option<&User>) -> Rendered {
    let content = html! {
        h1 { "Check your email" }
        p {
            "If an account exists for the address you entered, "
            "a message with instructions for setting a new password is on its way."
        }
    };

    Rendered::new(
        Template::PasswordResetDone,
        layout(viewer, "Password reset sent", &content),
    )
}

/// `errors` is `None` for a link that cannot be used.
pub fn password_reset_confirm(viewer: Option<&User>, errors: Option<&FieldErrors>) -> Rendered {
    let content = html! {
        h1 { "Enter new password" }
        @if let Some(errors) = errors {
            (error_list(errors.non_field()))
            form method="post" {
                (password("New password", "new_password1", errors))
                (password("New password confirmation", "new_password2", errors))
                button type="submit" { "Set password" }
            }
        } @else {
            p.invalid-link {
                "The password reset link was invalid, possibly because it has already been used "
                "or has expired. Please request a new password reset."
            }
            a href="/auth/password_reset/" { "Request a new link" }
        }
    };

    Rendered::new(
        Template::PasswordResetConfirm,
        layout(viewer, "Enter new password", &content),
    )
}

pub fn password_reset_complete(viewer: Option<&User>) -> Rendered {
    let content = html! {
        h1 { "Password set" }
        p { "Your password has been set. You may go ahead and log in now." }
        a href="/auth/login/" { "Log in" }
    };

    Rendered::new(
        Template::PasswordResetComplete,
        layout(viewer, "Password set", &content),
    )
}
