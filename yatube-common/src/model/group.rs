use crate::model::Id;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;

pub const SLUG_MAX_LEN: usize = 50;
pub const GROUP_TITLE_MAX_LEN: usize = 200;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct GroupMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct Group {
    pub id: Id<GroupMarker>,
    pub title: String,
    pub slug: Slug,
    pub description: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreateGroup {
    pub title: String,
    pub slug: Slug,
    pub description: String,
}

/// URL-safe group identifier: ASCII letters, digits, `-` and `_`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Slug(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The slug is invalid: {0}")]
pub struct InvalidSlugError(String);

impl Slug {
    pub fn new(slug: String) -> Result<Self, InvalidSlugError> {
        let valid_chars = slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));

        if (1..=SLUG_MAX_LEN).contains(&slug.len()) && valid_chars {
            Ok(Slug(slug))
        } else {
            Err(InvalidSlugError(slug))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Slug::new(inner).map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Slug"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::group::{SLUG_MAX_LEN, Slug};

    #[test]
    fn slug_validation() {
        for slug in ["test-slug", "test-slug_2", "cats", "A1"] {
            assert!(Slug::new(slug.to_owned()).is_ok(), "{slug}");
        }

        let too_long = "s".repeat(SLUG_MAX_LEN + 1);
        for slug in ["", "with space", "котики", "a/b", too_long.as_str()] {
            assert!(Slug::new(slug.to_owned()).is_err(), "{slug}");
        }
    }
}
