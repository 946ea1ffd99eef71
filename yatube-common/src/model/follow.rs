use crate::model::{Id, user::UserMarker};

/// Directed subscription: `follower` sees `author`'s posts in their feed.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Follow {
    pub follower: Id<UserMarker>,
    pub author: Id<UserMarker>,
}

impl Follow {
    /// `None` for self edges, which are never stored.
    #[must_use]
    pub fn new(follower: Id<UserMarker>, author: Id<UserMarker>) -> Option<Self> {
        (follower != author).then_some(Self { follower, author })
    }
}
