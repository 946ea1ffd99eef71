use crate::server::{
    forms::{FieldErrors, PostForm},
    templates::{
        Rendered, Template, error_list, format_date, group_url, layout, media_url, multiline,
        pagination, post_card, post_url, profile_url,
    },
};
use maud::{Markup, html};
use yatube_common::{
    model::{comment::Comment, group::Group, post::Post, user::User},
    paginate::Page,
};

const TITLE_PREVIEW_CHARS: usize = 30;

fn post_list(posts: &Page<Post>, show_group_links: bool) -> Markup {
    html! {
        @for post in posts {
            (post_card(post, show_group_links))
        }
        @if posts.is_empty() {
            p.empty { "No posts yet." }
        }
        (pagination(posts))
    }
}

pub fn index(viewer: Option<&User>, posts: &Page<Post>) -> Rendered {
    let content = html! {
        h1 { "Latest updates on the site" }
        (post_list(posts, true))
    };

    Rendered::new(Template::Index, layout(viewer, "Latest updates", &content))
}

pub fn group_list(viewer: Option<&User>, group: &Group, posts: &Page<Post>) -> Rendered {
    let content = html! {
        h1 { "Posts of the group " (group.title) }
        p.group-description { (multiline(&group.description)) }
        (post_list(posts, false))
    };

    Rendered::new(
        Template::GroupList,
        layout(viewer, &format!("Group {}", group.title), &content),
    )
}

/// Everything the profile page shows besides the viewer.
#[derive(Clone, Debug)]
pub struct ProfileView<'a> {
    pub author: &'a User,
    pub posts: &'a Page<Post>,
    pub followers: u64,
    pub following: u64,
    /// `Some` when the viewer may follow or unfollow, holding whether they already do.
    pub viewer_follows: Option<bool>,
}

pub fn profile(viewer: Option<&User>, view: &ProfileView<'_>) -> Rendered {
    let author = view.author;
    let profile = profile_url(author);

    let content = html! {
        div.profile {
            h1 { "All posts of " (author.display_name()) }
            p { "Total posts: " span.post-count { (view.posts.total_count()) } }
            p { "Followers: " (view.followers) ", following: " (view.following) }
            @match view.viewer_follows {
                Some(true) => a.unfollow href={ (profile) "unfollow/" } { "Unfollow" },
                Some(false) => a.follow href={ (profile) "follow/" } { "Follow" },
                None => {},
            }
        }
        (post_list(view.posts, true))
    };

    Rendered::new(
        Template::Profile,
        layout(
            viewer,
            &format!("Profile of {}", author.display_name()),
            &content,
        ),
    )
}

pub fn post_detail(
    viewer: Option<&User>,
    post: &Post,
    author_post_count: u64,
    comments: &[Comment],
) -> Rendered {
    let can_edit = viewer.is_some_and(|viewer| viewer.id == post.author.id);
    let title: String = post.text.chars().take(TITLE_PREVIEW_CHARS).collect();

    let content = html! {
        div.post-detail data-post-id=(post.id) {
            aside {
                ul {
                    li { "Published: " (format_date(post.created_at)) }
                    @if let Some(group) = &post.group {
                        li {
                            "Group: "
                            a href=(group_url(group)) { (group.title) }
                        }
                    }
                    li {
                        "Author: "
                        a href=(profile_url(&post.author)) { (post.author.display_name()) }
                    }
                    li { "Total posts by the author: " span.post-count { (author_post_count) } }
                }
            }
            article {
                @if let Some(image) = &post.image {
                    img.post-image src=(media_url(image)) alt="";
                }
                p { (multiline(&post.text)) }
                @if can_edit {
                    a.edit href={ (post_url(post)) "edit/" } { "Edit post" }
                }
            }
            section.comments {
                @if viewer.is_some() {
                    h2 { "Add a comment:" }
                    form method="post" action={ (post_url(post)) "comment/" } {
                        p {
                            textarea name="text" required {}
                        }
                        button type="submit" { "Send" }
                    }
                }
                @for comment in comments {
                    div.comment data-comment-id=(comment.id) {
                        h5 {
                            a href=(profile_url(&comment.author)) { (comment.author.username.get()) }
                        }
                        p { (multiline(&comment.text)) }
                    }
                }
            }
        }
    };

    Rendered::new(
        Template::PostDetail,
        layout(viewer, &format!("Post {title}"), &content),
    )
}

/// The create form, or the edit form when `editing` names the post.
pub fn create_post(
    viewer: Option<&User>,
    form: &PostForm,
    errors: &FieldErrors,
    groups: &[Group],
    editing: Option<&Post>,
) -> Rendered {
    let (heading, action, submit) = match editing {
        Some(post) => ("Edit post", format!("{}edit/", post_url(post)), "Save"),
        None => ("New post", "/create/".to_owned(), "Add"),
    };

    let content = html! {
        h1 { (heading) }
        (error_list(errors.non_field()))
        form method="post" enctype="multipart/form-data" action=(action) {
            p {
                label for="id_text" { "Post text" }
                textarea #id_text name="text" required { (form.text) }
                (error_list(errors.get("text")))
            }
            p {
                label for="id_group" { "Group" }
                select #id_group name="group" {
                    option value="" selected[form.group.is_empty()] { "---------" }
                    @for group in groups {
                        @let value = group.id.to_string();
                        option value=(value) selected[form.group == value] { (group.title) }
                    }
                }
                (error_list(errors.get("group")))
            }
            p {
                label for="id_image" { "Picture" }
                @if let Some(image) = editing.and_then(|post| post.image.as_deref()) {
                    "Currently: "
                    a href=(media_url(image)) { (image) }
                    br;
                }
                input #id_image type="file" name="image" accept="image/*";
                (error_list(errors.get("image")))
            }
            button type="submit" { (submit) }
        }
    };

    Rendered::new(Template::CreatePost, layout(viewer, heading, &content))
}

pub fn follow(viewer: Option<&User>, posts: &Page<Post>) -> Rendered {
    let content = html! {
        h1 { "Posts of the authors you follow" }
        (post_list(posts, true))
    };

    Rendered::new(Template::Follow, layout(viewer, "Subscriptions", &content))
}
