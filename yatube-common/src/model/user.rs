use crate::model::{Id, auth::HashedPassword};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::UtcDateTime;

pub const USERNAME_MAX_LEN: usize = 150;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct User {
    pub id: Id<UserMarker>,
    pub username: Username,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_joined: UtcDateTime,
}

impl User {
    /// First and last name joined by a space, falling back to the username.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full_name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full_name = full_name.trim();

        if full_name.is_empty() {
            self.username.get().to_owned()
        } else {
            full_name.to_owned()
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreateUser {
    pub username: Username,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: HashedPassword,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0}")]
pub struct InvalidUsernameError(String);

impl Username {
    /// Letters, digits and `@.+-_`, between one and 150 characters.
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        let length = username.chars().count();
        let valid_chars = username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));

        if (1..=USERNAME_MAX_LEN).contains(&length) && valid_chars {
            Ok(Username(username))
        } else {
            Err(InvalidUsernameError(username))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::user::{USERNAME_MAX_LEN, User, Username};
    use time::macros::utc_datetime;

    #[test]
    fn username_validation() {
        let legal = ["User", "authorUser", "New_User", "a.b+c-d@e", "Юзер"];
        for username in legal {
            assert!(Username::new(username.to_owned()).is_ok(), "{username}");
        }

        let too_long = "a".repeat(USERNAME_MAX_LEN + 1);
        let illegal = ["", "with space", "semi;colon", "slash/", too_long.as_str()];
        for username in illegal {
            assert!(Username::new(username.to_owned()).is_err(), "{username}");
        }
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut user = User {
            id: 1.into(),
            username: Username::new("leo".to_owned()).unwrap(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            date_joined: utc_datetime!(2025-01-01 00:00),
        };
        assert_eq!(user.display_name(), "leo");

        user.first_name = "Leo".to_owned();
        assert_eq!(user.display_name(), "Leo");

        user.last_name = "Tolstoy".to_owned();
        assert_eq!(user.display_name(), "Leo Tolstoy");
    }
}
