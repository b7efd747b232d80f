//! Who may see and act on a post.
//!
//! A post is addressed either to every member or to an explicit id list.
//! With `announce_to_all` set the stored list is ignored entirely. An empty
//! explicit list means nobody but the owner and the author.

use crate::db::entities::{classroom, post};

use super::from_json_list;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Audience {
    All,
    Only(Vec<i32>),
}

impl Audience {
    pub fn from_columns(announce_to_all: bool, raw_ids: &str) -> Self {
        if announce_to_all {
            Audience::All
        } else {
            Audience::Only(from_json_list(raw_ids)).normalized()
        }
    }

    pub fn of(post: &post::Model) -> Self {
        Self::from_columns(post.announce_to_all, &post.audience)
    }

    /// Sorted, duplicate-free form used for storage and comparison
    pub fn normalized(self) -> Self {
        match self {
            Audience::All => Audience::All,
            Audience::Only(mut ids) => {
                ids.sort_unstable();
                ids.dedup();
                Audience::Only(ids)
            }
        }
    }

    pub fn announce_to_all(&self) -> bool {
        matches!(self, Audience::All)
    }

    /// The id list as persisted; empty when addressed to everyone
    pub fn explicit_ids(&self) -> &[i32] {
        match self {
            Audience::All => &[],
            Audience::Only(ids) => ids,
        }
    }

    /// Whether the post is addressed to `user_id` (membership not checked)
    pub fn includes(&self, user_id: i32) -> bool {
        match self {
            Audience::All => true,
            Audience::Only(ids) => ids.contains(&user_id),
        }
    }
}

/// Whether `user_id` appears in the post's rendered audience.
/// The classroom owner always does.
pub fn in_audience(classroom: &classroom::Model, post: &post::Model, user_id: i32, is_member: bool) -> bool {
    classroom.is_owner(user_id) || (is_member && Audience::of(post).includes(user_id))
}

/// Whether `user_id` may view the post at time `now`.
///
/// Owner and author always can; other members only once the post is
/// published and only when addressed.
pub fn can_view(
    classroom: &classroom::Model,
    post: &post::Model,
    user_id: i32,
    is_member: bool,
    now: i64,
) -> bool {
    if classroom.is_owner(user_id) || post.author_id == user_id {
        return true;
    }
    if post.scheduled_at.is_some_and(|at| at > now) {
        return false;
    }
    in_audience(classroom, post, user_id, is_member)
}

/// Everyone to notify about the post, excluding its author
pub fn recipients(classroom: &classroom::Model, post: &post::Model, member_ids: &[i32]) -> Vec<i32> {
    let audience = Audience::of(post);
    let mut ids: Vec<i32> = member_ids
        .iter()
        .copied()
        .filter(|id| audience.includes(*id))
        .collect();
    ids.push(classroom.teacher_id);
    ids.sort_unstable();
    ids.dedup();
    ids.retain(|id| *id != post.author_id);
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> classroom::Model {
        classroom::Model {
            id: 1,
            name: "Chemistry".into(),
            subject: None,
            section: None,
            teacher_id: 10,
            teacher_name: "Teacher".into(),
            join_code: "CHEM001".into(),
            card_color: "#000000".into(),
            card_banner: None,
            allow_member_posts: true,
            allow_member_comments: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn post(announce_to_all: bool, audience: &str) -> post::Model {
        post::Model {
            id: 1,
            classroom_id: 1,
            author_id: 20,
            author_name: "author".into(),
            kind: "announcement".into(),
            caption: "hello".into(),
            title: None,
            attachments: "[]".into(),
            links: "[]".into(),
            audience: audience.into(),
            announce_to_all,
            due_at: None,
            scheduled_at: None,
            is_graded: false,
            total_points: None,
            accept_submissions: false,
            close_after_due: false,
            topic_id: None,
            topic_name: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_announce_to_all_ignores_stale_list() {
        let room = room();
        for stale in ["[]", "[30]", "[999, 998]", "not json"] {
            let p = post(true, stale);
            assert_eq!(Audience::of(&p), Audience::All);
            assert!(can_view(&room, &p, 31, true, 0));
            assert!(can_view(&room, &p, 30, true, 0));
        }
    }

    #[test]
    fn test_empty_explicit_list_is_owner_and_author_only() {
        let room = room();
        let p = post(false, "[]");

        assert!(can_view(&room, &p, 10, false, 0)); // owner
        assert!(can_view(&room, &p, 20, true, 0)); // author
        assert!(!can_view(&room, &p, 30, true, 0));
        assert!(!in_audience(&room, &p, 30, true));
    }

    #[test]
    fn test_explicit_list_requires_membership() {
        let room = room();
        let p = post(false, "[30, 30, 31]");

        assert_eq!(Audience::of(&p), Audience::Only(vec![30, 31]));
        assert!(in_audience(&room, &p, 30, true));
        assert!(!in_audience(&room, &p, 30, false));
        assert!(!in_audience(&room, &p, 32, true));
        assert!(in_audience(&room, &p, 10, false));
    }

    #[test]
    fn test_scheduled_post_hidden_until_published() {
        let room = room();
        let mut p = post(true, "[]");
        p.scheduled_at = Some(1_000);

        assert!(!can_view(&room, &p, 30, true, 999));
        assert!(can_view(&room, &p, 30, true, 1_000));
        assert!(can_view(&room, &p, 10, false, 0));
        assert!(can_view(&room, &p, 20, true, 0));
    }

    #[test]
    fn test_recipients_include_owner_exclude_author() {
        let room = room();
        let p = post(false, "[30]");
        assert_eq!(recipients(&room, &p, &[20, 30, 31]), vec![10, 30]);

        let p = post(true, "[30]");
        assert_eq!(recipients(&room, &p, &[20, 30, 31]), vec![10, 30, 31]);

        let mut p = post(true, "[]");
        p.author_id = 10;
        assert_eq!(recipients(&room, &p, &[30]), vec![30]);
    }
}
