use crate::server::Result;
use axum::{body::Bytes, extract::Multipart};
use serde::Deserialize;
use std::collections::BTreeMap;
use yatube_common::model::{
    Id,
    auth::validate_password,
    group::{Group, GroupMarker},
    post::Post,
};

pub const NON_FIELD_ERRORS: &str = "__all__";

pub const REQUIRED: &str = "This field is required.";

/// Validation messages keyed by form field.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    #[must_use]
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn non_field(&self) -> &[String] {
        self.get(NON_FIELD_ERRORS)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Upload {
    /// Checks the declared type, then decodes the data as the format its header names.
    #[must_use]
    pub fn is_image(&self) -> bool {
        let declared_image = self
            .content_type
            .as_deref()
            .is_some_and(|content_type| content_type.starts_with("image/"));
        if !declared_image {
            return false;
        }

        image::guess_format(&self.data)
            .is_ok_and(|format| image::load_from_memory_with_format(&self.data, format).is_ok())
    }
}

/// Create and edit form for posts, sent as `multipart/form-data`.
#[derive(Clone, Debug, Default)]
pub struct PostForm {
    pub text: String,
    /// Raw id of the selected group, empty for none.
    pub group: String,
    pub image: Option<Upload>,
}

impl PostForm {
    pub fn from_post(post: &Post) -> Self {
        Self {
            text: post.text.clone(),
            group: post
                .group
                .as_ref()
                .map(|group| group.id.to_string())
                .unwrap_or_default(),
            image: None,
        }
    }

    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(ToOwned::to_owned);
            match name.as_deref() {
                Some("text") => form.text = field.text().await?,
                Some("group") => form.group = field.text().await?,
                Some("image") => {
                    let file_name = field.file_name().unwrap_or_default().to_owned();
                    let content_type = field.content_type().map(ToOwned::to_owned);
                    let data = field.bytes().await?;

                    // Browsers send an empty, nameless part for an untouched file input.
                    if !file_name.is_empty() || !data.is_empty() {
                        form.image = Some(Upload {
                            file_name,
                            content_type,
                            data,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }

    #[must_use]
    pub fn group_id(&self) -> Option<Id<GroupMarker>> {
        self.group.trim().parse().ok()
    }

    #[must_use]
    pub fn validate(&self, groups: &[Group]) -> FieldErrors {
        let mut errors = FieldErrors::default();

        if self.text.trim().is_empty() {
            errors.add("text", REQUIRED);
        }

        if !self.group.trim().is_empty() {
            let known = self
                .group_id()
                .is_some_and(|group_id| groups.iter().any(|group| group.id == group_id));
            if !known {
                errors.add(
                    "group",
                    "Select a valid choice. That choice is not one of the available choices.",
                );
            }
        }

        if let Some(upload) = &self.image {
            if upload.file_name.is_empty() {
                errors.add("image", "No file was submitted.");
            } else if upload.data.is_empty() {
                errors.add("image", "The submitted file is empty.");
            } else if !upload.is_image() {
                errors.add(
                    "image",
                    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
                );
            }
        }

        errors
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub text: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PasswordChangeForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PasswordResetForm {
    pub email: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetPasswordForm {
    pub new_password1: String,
    pub new_password2: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize)]
#[serde(default)]
pub struct NextQuery {
    pub next: String,
}

/// Checks a password pair, reporting problems on `field`.
pub fn validate_new_password(
    errors: &mut FieldErrors,
    field: &'static str,
    password1: &str,
    password2: &str,
    username: &str,
) {
    if password1.is_empty() || password2.is_empty() {
        errors.add(field, REQUIRED);
        return;
    }
    if password1 != password2 {
        errors.add(field, "The two password fields didn't match.");
        return;
    }
    if let Err(err) = validate_password(password2, username) {
        errors.add(field, err.to_string());
    }
}

/// Only paths on this site are followed after login.
#[must_use]
pub fn safe_next(next: &str) -> &str {
    let local = next.starts_with('/') && !next.starts_with("//") && !next.contains('\\');
    if local { next } else { "/" }
}

#[cfg(test)]
mod tests {
    use crate::server::{
        forms::{FieldErrors, PostForm, Upload, safe_next, validate_new_password},
        test_support::SMALL_GIF,
    };
    use axum::body::Bytes;
    use yatube_common::model::group::{Group, Slug};

    fn group() -> Group {
        Group {
            id: 3.into(),
            title: "Test group".to_owned(),
            slug: Slug::new("test-slug".to_owned()).unwrap(),
            description: String::new(),
        }
    }

    #[test]
    fn post_form_requires_text() {
        let form = PostForm {
            text: "   ".to_owned(),
            ..PostForm::default()
        };

        let errors = form.validate(&[]);
        assert_eq!(errors.get("text").len(), 1);
        assert!(errors.get("group").is_empty());
    }

    #[test]
    fn post_form_group_must_exist() {
        let mut form = PostForm {
            text: "text".to_owned(),
            group: "3".to_owned(),
            image: None,
        };
        assert!(form.validate(&[group()]).is_empty());
        assert_eq!(form.group_id(), Some(3.into()));

        form.group = "4".to_owned();
        assert_eq!(form.validate(&[group()]).get("group").len(), 1);

        form.group = "nope".to_owned();
        assert_eq!(form.validate(&[group()]).get("group").len(), 1);
    }

    #[test]
    fn post_form_image_checks() {
        let mut form = PostForm {
            text: "text".to_owned(),
            group: String::new(),
            image: Some(Upload {
                file_name: "small.gif".to_owned(),
                content_type: Some("image/gif".to_owned()),
                data: Bytes::from_static(SMALL_GIF),
            }),
        };
        assert!(form.validate(&[]).is_empty());

        form.image = Some(Upload {
            file_name: "notes.txt".to_owned(),
            content_type: Some("text/plain".to_owned()),
            data: Bytes::from_static(b"hello"),
        });
        assert_eq!(form.validate(&[]).get("image").len(), 1);

        form.image = Some(Upload {
            file_name: "small.gif".to_owned(),
            content_type: Some("text/plain".to_owned()),
            data: Bytes::from_static(SMALL_GIF),
        });
        assert_eq!(form.validate(&[]).get("image").len(), 1);
    }

    #[test]
    fn image_headers_alone_are_not_enough() {
        let upload = |file_name: &str, content_type: &str, data: &'static [u8]| Upload {
            file_name: file_name.to_owned(),
            content_type: Some(content_type.to_owned()),
            data: Bytes::from_static(data),
        };

        for fake in [
            upload("song.png", "image/png", b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00"),
            upload("notes.gif", "image/gif", b"BM this is plain text"),
            upload("cut.gif", "image/gif", &SMALL_GIF[..12]),
            upload("photo.jpg", "image/jpeg", b"\xFF\xD8\xFF\xE0 not really a jpeg"),
        ] {
            assert!(!fake.is_image(), "{} passed as an image", fake.file_name);

            let form = PostForm {
                text: "text".to_owned(),
                group: String::new(),
                image: Some(fake),
            };
            assert_eq!(form.validate(&[]).get("image").len(), 1);
        }

        assert!(upload("small.gif", "image/gif", SMALL_GIF).is_image());
    }

    #[test]
    fn password_pairs() {
        let mut errors = FieldErrors::default();
        validate_new_password(&mut errors, "password2", "rgwrghwr34125", "rgwrghwr34125", "new");
        assert!(errors.is_empty());

        validate_new_password(&mut errors, "password2", "rgwrghwr34125", "different1", "new");
        validate_new_password(&mut errors, "password2", "12345678", "12345678", "new");
        assert_eq!(errors.get("password2").len(), 2);
    }

    #[test]
    fn next_must_be_local() {
        assert_eq!(safe_next("/create/"), "/create/");
        assert_eq!(safe_next("https://evil.example/"), "/");
        assert_eq!(safe_next("//evil.example/"), "/");
        assert_eq!(safe_next(""), "/");
    }
}
