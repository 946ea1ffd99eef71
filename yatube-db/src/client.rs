use crate::record::{
    AuthenticationRecord, CommentRecord, CredentialsRecord, FullPostRecord, GroupRecord,
    PasswordResetRecord, UserRecord, to_primitive,
};
use sqlx::{
    SqlitePool, query, query_as, query_scalar,
    migrate::{MigrateError, Migrator},
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::str::FromStr;
use thiserror::Error;
use time::UtcDateTime;
use tracing::{debug, info};
use yatube_common::{
    model::{
        Id, ModelValidationError,
        auth::{Authentication, AuthTokenHash, HashedPassword, PasswordReset},
        comment::{Comment, CommentMarker, CreateComment},
        follow::Follow,
        group::{CreateGroup, Group, GroupMarker},
        post::{CreatePost, Post, PostContent, PostMarker},
        user::{CreateUser, User, UserMarker},
    },
    paginate::{Page, Paginator},
};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Applying migrations failed: {0}")]
    Migrate(#[from] MigrateError),
}

impl DbError {
    /// True when a `UNIQUE` constraint rejected the write.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlx(err) => err
                .as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation()),
            _ => false,
        }
    }
}

/// Which posts a listing shows.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostFilter {
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
    /// Posts by every author the given user follows.
    FollowedBy(Id<UserMarker>),
}

impl PostFilter {
    fn where_clause(self) -> &'static str {
        match self {
            PostFilter::All => "",
            PostFilter::Group(_) => "WHERE posts.group_id = $1",
            PostFilter::Author(_) => "WHERE posts.author_id = $1",
            PostFilter::FollowedBy(_) => {
                "WHERE posts.author_id IN (SELECT follows.author_id FROM follows WHERE follows.user_id = $1)"
            }
        }
    }

    fn bound_id(self) -> Option<i64> {
        match self {
            PostFilter::All => None,
            PostFilter::Group(group_id) => Some(group_id.get()),
            PostFilter::Author(user_id) | PostFilter::FollowedBy(user_id) => Some(user_id.get()),
        }
    }
}

const POST_SELECT: &str = "
    SELECT
        posts.post_id,
        posts.text,
        posts.image,
        posts.created_at,
        users.user_id,
        users.username,
        users.email,
        users.first_name,
        users.last_name,
        users.date_joined,
        post_groups.group_id,
        post_groups.title AS group_title,
        post_groups.slug AS group_slug,
        post_groups.description AS group_description
    FROM
        posts
        JOIN users ON users.user_id = posts.author_id
        LEFT JOIN post_groups ON post_groups.group_id = posts.group_id
    ";

const USER_SELECT: &str = "
    SELECT
        users.user_id,
        users.username,
        users.email,
        users.first_name,
        users.last_name,
        users.date_joined
    FROM
        users
    ";

#[derive(Debug)]
pub struct DbClient {
    pool: SqlitePool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        info!(url, "connected to database");

        Self::migrated(pool).await
    }

    /// A private database that lives as long as the client.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Every connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self> {
        MIGRATOR.run(&pool).await?;
        debug!("database migrations applied");

        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(&format!(
            "{USER_SELECT} WHERE users.user_id = $1"
        ))
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(&format!(
            "{USER_SELECT} WHERE users.username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_users_by_email(&self, email: &str) -> Result<Vec<User>> {
        let records = query_as::<_, UserRecord>(&format!(
            "{USER_SELECT} WHERE users.email = $1 COLLATE NOCASE ORDER BY users.user_id"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        let users = records
            .into_iter()
            .map(User::try_from)
            .collect::<Result<_, _>>()?;
        Ok(users)
    }

    pub async fn fetch_credentials(
        &self,
        username: &str,
    ) -> Result<Option<(User, HashedPassword)>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT
                users.user_id,
                users.username,
                users.email,
                users.first_name,
                users.last_name,
                users.date_joined,
                users.password_hash
            FROM
                users
            WHERE
                users.username = $1
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(TryInto::try_into).transpose()?;
        Ok(credentials)
    }

    pub async fn create_user(&self, user: &CreateUser) -> Result<Id<UserMarker>> {
        let user_id = query_scalar::<_, i64>(
            "
            INSERT INTO users (username, email, first_name, last_name, password_hash, date_joined)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING user_id
            ",
        )
        .bind(user.username.get())
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.password.as_phc())
        .bind(to_primitive(UtcDateTime::now()))
        .fetch_one(&self.pool)
        .await?;

        Ok(user_id.into())
    }

    pub async fn set_password(
        &self,
        user_id: Id<UserMarker>,
        password: &HashedPassword,
    ) -> Result<bool> {
        let result = query("UPDATE users SET password_hash = $1 WHERE user_id = $2")
            .bind(password.as_phc())
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Removes the user together with everything they authored.
    pub async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let result = query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_users(&self) -> Result<u64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn create_group(&self, group: &CreateGroup) -> Result<Id<GroupMarker>> {
        let group_id = query_scalar::<_, i64>(
            "
            INSERT INTO post_groups (title, slug, description)
            VALUES ($1, $2, $3)
            RETURNING group_id
            ",
        )
        .bind(&group.title)
        .bind(group.slug.get())
        .bind(&group.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(group_id.into())
    }

    pub async fn fetch_group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT group_id, title, slug, description
            FROM post_groups
            WHERE slug = $1
            ",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    pub async fn fetch_group(&self, group_id: Id<GroupMarker>) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "
            SELECT group_id, title, slug, description
            FROM post_groups
            WHERE group_id = $1
            ",
        )
        .bind(group_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let group = record.map(Group::try_from).transpose()?;
        Ok(group)
    }

    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        let records = query_as::<_, GroupRecord>(
            "
            SELECT group_id, title, slug, description
            FROM post_groups
            ORDER BY title, group_id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let groups = records
            .into_iter()
            .map(Group::try_from)
            .collect::<Result<_, _>>()?;
        Ok(groups)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, FullPostRecord>(&format!(
            "{POST_SELECT} WHERE posts.post_id = $1"
        ))
        .bind(post_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    pub async fn count_posts(&self, filter: PostFilter) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM posts {}", filter.where_clause());

        let mut count_query = query_scalar::<_, i64>(&sql);
        if let Some(id) = filter.bound_id() {
            count_query = count_query.bind(id);
        }
        let count = count_query.fetch_one(&self.pool).await?;

        Ok(count.cast_unsigned())
    }

    /// One page of posts, newest first.
    pub async fn fetch_post_page(
        &self,
        filter: PostFilter,
        paginator: Paginator,
        requested_page: Option<&str>,
    ) -> Result<Page<Post>> {
        let total_count = usize::try_from(self.count_posts(filter).await?).unwrap_or(usize::MAX);
        let window = paginator.window(total_count, requested_page);

        let (limit_param, offset_param) = match filter.bound_id() {
            Some(_) => ("$2", "$3"),
            None => ("$1", "$2"),
        };
        let sql = format!(
            "{POST_SELECT} {} ORDER BY posts.created_at DESC, posts.post_id DESC LIMIT {limit_param} OFFSET {offset_param}",
            filter.where_clause(),
        );

        let mut page_query = query_as::<_, FullPostRecord>(&sql);
        if let Some(id) = filter.bound_id() {
            page_query = page_query.bind(id);
        }
        let records = page_query
            .bind(i64::try_from(window.limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(window.offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(Page::new(posts, window))
    }

    pub async fn create_post(&self, post: &CreatePost) -> Result<Id<PostMarker>> {
        let post_id = query_scalar::<_, i64>(
            "
            INSERT INTO posts (text, created_at, author_id, group_id, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING post_id
            ",
        )
        .bind(&post.content.text)
        .bind(to_primitive(UtcDateTime::now()))
        .bind(post.author.get())
        .bind(post.content.group.map(Id::get))
        .bind(post.content.image.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(post_id.into())
    }

    /// Replaces text and group. The image is only replaced when a new one is given.
    pub async fn update_post(&self, post_id: Id<PostMarker>, content: &PostContent) -> Result<bool> {
        let result = query(
            "
            UPDATE posts
            SET text = $1, group_id = $2, image = COALESCE($3, image)
            WHERE post_id = $4
            ",
        )
        .bind(&content.text)
        .bind(content.group.map(Id::get))
        .bind(content.image.as_deref())
        .bind(post_id.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_comment(&self, comment: &CreateComment) -> Result<Id<CommentMarker>> {
        let comment_id = query_scalar::<_, i64>(
            "
            INSERT INTO comments (post_id, author_id, text, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING comment_id
            ",
        )
        .bind(comment.post.get())
        .bind(comment.author.get())
        .bind(&comment.text)
        .bind(to_primitive(UtcDateTime::now()))
        .fetch_one(&self.pool)
        .await?;

        Ok(comment_id.into())
    }

    /// Comments on a post, oldest first.
    pub async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.comment_id,
                comments.post_id,
                comments.text,
                comments.created_at,
                users.user_id,
                users.username,
                users.email,
                users.first_name,
                users.last_name,
                users.date_joined
            FROM
                comments
                JOIN users ON users.user_id = comments.author_id
            WHERE
                comments.post_id = $1
            ORDER BY
                comments.created_at, comments.comment_id
            ",
        )
        .bind(post_id.get())
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    /// Returns `false` when the edge already existed.
    pub async fn follow(&self, follow: Follow) -> Result<bool> {
        let result = query(
            "
            INSERT INTO follows (user_id, author_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, author_id) DO NOTHING
            ",
        )
        .bind(follow.follower.get())
        .bind(follow.author.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns `false` when there was no edge to remove.
    pub async fn unfollow(&self, follow: Follow) -> Result<bool> {
        let result = query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(follow.follower.get())
            .bind(follow.author.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, follow: Follow) -> Result<bool> {
        let exists = query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(follow.follower.get())
        .bind(follow.author.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    pub async fn count_followers(&self, author: Id<UserMarker>) -> Result<u64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE author_id = $1")
            .bind(author.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn count_following(&self, follower: Id<UserMarker>) -> Result<u64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE user_id = $1")
            .bind(follower.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        query(
            "
            INSERT INTO sessions (user_id, token_hash, created_at, expires_after_seconds)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(authentication.user.get())
        .bind(authentication.token_hash.0.as_slice())
        .bind(to_primitive(authentication.created_at))
        .bind(
            authentication
                .expires_after
                .map(|expires_after| expires_after.whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT user_id, token_hash, created_at, expires_after_seconds
            FROM sessions
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash.0.as_slice())
        .fetch_optional(&self.pool)
        .await?;

        let authentication = record.map(Authentication::try_from).transpose()?;
        Ok(authentication)
    }

    pub async fn delete_auth(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let result = query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash.0.as_slice())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Logs the user out everywhere.
    pub async fn delete_user_auths(&self, user_id: Id<UserMarker>) -> Result<u64> {
        let result = query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn create_password_reset(&self, reset: &PasswordReset) -> Result<()> {
        query(
            "
            INSERT INTO password_resets (user_id, token_hash, created_at, used)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(reset.user.get())
        .bind(reset.token_hash.0.as_slice())
        .bind(to_primitive(reset.created_at))
        .bind(reset.used)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_password_reset(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<PasswordReset>> {
        let record = query_as::<_, PasswordResetRecord>(
            "
            SELECT user_id, token_hash, created_at, used
            FROM password_resets
            WHERE token_hash = $1
            ",
        )
        .bind(token_hash.0.as_slice())
        .fetch_optional(&self.pool)
        .await?;

        let reset = record.map(PasswordReset::try_from).transpose()?;
        Ok(reset)
    }

    /// Returns `false` if the token was unknown or already used.
    pub async fn use_password_reset(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let result =
            query("UPDATE password_resets SET used = 1 WHERE token_hash = $1 AND used = 0")
                .bind(token_hash.0.as_slice())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
