//! Per-member classwork records and grading.

use std::collections::HashSet;

use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use super::attachments::{normalize_links, Upload};
use super::audience;
use super::notify::{post_link, Event, Notice, ResourceKind, ResourceRef};
use super::stream::PostKind;
use super::{from_json_list, now, to_json_list, Actor, Engine, Outcome};
use crate::db::entities::{classroom, post, submission};
use crate::error::{ClassroomError, Result};
use crate::storage::buckets;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionState {
    NotSubmitted,
    TurnedIn,
    Graded,
}

impl SubmissionState {
    pub fn of(record: Option<&submission::Model>) -> Self {
        match record {
            Some(r) if r.is_graded => SubmissionState::Graded,
            Some(r) if r.is_turned_in => SubmissionState::TurnedIn,
            _ => SubmissionState::NotSubmitted,
        }
    }
}

/// Files and links a member hands in
#[derive(Clone, Debug, Default)]
pub struct Work {
    pub files: Vec<Upload>,
    pub links: Vec<String>,
}

impl Work {
    pub fn new(files: Vec<Upload>, links: Vec<String>) -> Self {
        Self { files, links }
    }
}

fn submissions_closed(post: &post::Model, at: i64) -> bool {
    post.close_after_due && post.due_at.is_some_and(|due| due < at)
}

fn post_title(post: &post::Model) -> String {
    post.title.clone().unwrap_or_else(|| post.caption.clone())
}

impl Engine {
    pub(crate) async fn find_submission(&self, post_id: i32, user_id: i32) -> Result<Option<submission::Model>> {
        Ok(submission::Entity::find()
            .filter(submission::Column::PostId.eq(post_id))
            .filter(submission::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?)
    }

    /// Checks shared by every member-side submission operation
    async fn submission_context(&self, actor: &Actor, post_id: i32) -> Result<(classroom::Model, post::Model)> {
        if !actor.can_author() {
            return Err(ClassroomError::rejected("admins cannot hand in work"));
        }

        let post = self.load_post(post_id).await?;
        let room = self.load_classroom(post.classroom_id).await?;
        let gradeable = post.kind.parse::<PostKind>().is_ok_and(|k| k.is_gradeable());
        if !gradeable || !post.accept_submissions {
            return Err(ClassroomError::rejected("this post does not take submissions"));
        }
        if room.is_owner(actor.id) {
            return Err(ClassroomError::rejected("the teacher does not hand in work"));
        }

        let is_member = self.is_member(room.id, actor.id).await?;
        if !audience::can_view(&room, &post, actor.id, is_member, now()) {
            return Err(ClassroomError::rejected("this post is not assigned to you"));
        }
        if submissions_closed(&post, now()) {
            return Err(ClassroomError::rejected("submissions are closed"));
        }

        Ok((room, post))
    }

    /// Turn in work, or revise work already on record.
    ///
    /// `kept` lists the stored files of an existing record to retain.
    pub async fn submit(&self, actor: &Actor, post_id: i32, work: Work, kept: Vec<String>) -> Result<Outcome> {
        let (room, post) = self.submission_context(actor, post_id).await?;
        let links = normalize_links(work.links);

        if let Some(existing) = self.find_submission(post.id, actor.id).await? {
            return self.revise_submission(actor, &room, &post, existing, work.files, links, kept).await;
        }

        let files = self.files.upload_all(buckets::SUBMISSIONS, room.id, work.files).await;
        let at = now();
        let saved = submission::ActiveModel {
            post_id: Set(post.id),
            classroom_id: Set(room.id),
            user_id: Set(actor.id),
            user_name: Set(actor.name.clone()),
            post_title: Set(post_title(&post)),
            attachments: Set(to_json_list(&files)),
            links: Set(to_json_list(&links)),
            is_turned_in: Set(true),
            turned_in_at: Set(Some(at)),
            is_graded: Set(false),
            points: Set(None),
            created_at: Set(at),
            updated_at: Set(at),
            ..Default::default()
        }
        .insert(&self.db)
        .await;
        if saved.is_err() {
            self.files.discard(buckets::SUBMISSIONS, &files).await;
        }
        let saved = saved?;

        tracing::info!("user {} turned in post {}", actor.id, post.id);
        self.notify_turned_in(actor, &room, &post, saved.id).await;
        Ok(Outcome::Created(saved.id))
    }

    #[allow(clippy::too_many_arguments)]
    async fn revise_submission(
        &self,
        actor: &Actor,
        room: &classroom::Model,
        post: &post::Model,
        existing: submission::Model,
        incoming: Vec<Upload>,
        links: Vec<String>,
        kept: Vec<String>,
    ) -> Result<Outcome> {
        let previous_files: Vec<String> = from_json_list(&existing.attachments);
        let previous_links: Vec<String> = from_json_list(&existing.links);
        let previous_set: HashSet<&String> = previous_files.iter().collect();
        let kept_set: HashSet<&String> = kept.iter().filter(|u| previous_set.contains(u)).collect();

        let was_turned_in = existing.is_turned_in;
        if was_turned_in && incoming.is_empty() && kept_set == previous_set && links == previous_links {
            tracing::debug!("submission {} update carries no changes", existing.id);
            return Ok(Outcome::Unchanged);
        }

        let plan = self
            .files
            .reconcile(buckets::SUBMISSIONS, room.id, &previous_files, &kept, incoming, links)
            .await;

        let at = now();
        let submission_id = existing.id;
        let turned_in_at = if was_turned_in { existing.turned_in_at } else { Some(at) };
        let mut active: submission::ActiveModel = existing.into();
        active.attachments = Set(to_json_list(&plan.set.files));
        active.links = Set(to_json_list(&plan.set.links));
        active.is_turned_in = Set(true);
        active.turned_in_at = Set(turned_in_at);
        active.updated_at = Set(at);
        let written = active.update(&self.db).await;
        self.files.settle(buckets::SUBMISSIONS, &plan, written.is_ok()).await;
        written?;

        tracing::info!("submission {} revised by user {}", submission_id, actor.id);
        if !was_turned_in {
            self.notify_turned_in(actor, room, post, submission_id).await;
        }
        Ok(Outcome::Updated)
    }

    async fn notify_turned_in(&self, actor: &Actor, room: &classroom::Model, post: &post::Model, submission_id: i32) {
        self.notify(Notice {
            event: Event::SubmissionTurnedIn,
            classroom_id: room.id,
            actor_id: actor.id,
            recipients: vec![room.teacher_id],
            resource: ResourceRef::new(ResourceKind::Submission, submission_id),
            summary: format!("{} turned in {}", actor.name, post_title(post)),
            link: post_link(room.id, post.id),
        })
        .await;
    }

    /// Take back turned-in work; its files stay on the record
    pub async fn unsubmit(&self, actor: &Actor, post_id: i32) -> Result<Outcome> {
        let (_, post) = self.submission_context(actor, post_id).await?;
        let existing = self
            .find_submission(post.id, actor.id)
            .await?
            .filter(|s| s.is_turned_in)
            .ok_or_else(|| ClassroomError::InvalidState("nothing is turned in for this post".into()))?;

        let submission_id = existing.id;
        let mut active: submission::ActiveModel = existing.into();
        active.is_turned_in = Set(false);
        active.turned_in_at = Set(None);
        active.updated_at = Set(now());
        active.update(&self.db).await?;

        tracing::info!("submission {} unsubmitted by user {}", submission_id, actor.id);
        Ok(Outcome::Updated)
    }

    /// Record `points` for `member_id`, creating an empty record when the
    /// member never handed anything in
    pub async fn grade(&self, actor: &Actor, post_id: i32, member_id: i32, points: i32) -> Result<Outcome> {
        let post = self.load_post(post_id).await?;
        let room = self.load_classroom(post.classroom_id).await?;
        if !room.is_owner(actor.id) {
            return Err(ClassroomError::denied("only the teacher can grade"));
        }
        if !post.is_graded {
            return Err(ClassroomError::invalid("this post is not graded"));
        }
        if points < 0 {
            return Err(ClassroomError::invalid("points cannot be negative"));
        }
        if let Some(total) = post.total_points {
            if points > total {
                return Err(ClassroomError::invalid(format!("points cannot exceed {}", total)));
            }
        }

        let is_member = self.is_member(room.id, member_id).await?;
        if room.is_owner(member_id) || !audience::in_audience(&room, &post, member_id, is_member) {
            return Err(ClassroomError::rejected(format!("user {} is not assigned this post", member_id)));
        }

        let at = now();
        let (outcome, submission_id) = match self.find_submission(post.id, member_id).await? {
            Some(existing) if existing.is_graded && existing.points == Some(points) => {
                return Ok(Outcome::Unchanged);
            }
            Some(existing) => {
                let submission_id = existing.id;
                let mut active: submission::ActiveModel = existing.into();
                active.is_graded = Set(true);
                active.points = Set(Some(points));
                active.updated_at = Set(at);
                active.update(&self.db).await?;
                (Outcome::Updated, submission_id)
            }
            None => {
                let membership = self.find_membership(room.id, member_id).await?;
                let saved = submission::ActiveModel {
                    post_id: Set(post.id),
                    classroom_id: Set(room.id),
                    user_id: Set(member_id),
                    user_name: Set(membership.map(|m| m.user_name).unwrap_or_default()),
                    post_title: Set(post_title(&post)),
                    attachments: Set(to_json_list::<String>(&[])),
                    links: Set(to_json_list::<String>(&[])),
                    is_turned_in: Set(false),
                    turned_in_at: Set(None),
                    is_graded: Set(true),
                    points: Set(Some(points)),
                    created_at: Set(at),
                    updated_at: Set(at),
                    ..Default::default()
                }
                .insert(&self.db)
                .await?;
                (Outcome::Created(saved.id), saved.id)
            }
        };

        tracing::info!("user {} graded {} on post {}: {}", actor.id, member_id, post.id, points);
        self.notify(Notice {
            event: Event::SubmissionGraded,
            classroom_id: room.id,
            actor_id: actor.id,
            recipients: vec![member_id],
            resource: ResourceRef::new(ResourceKind::Submission, submission_id),
            summary: format!("{} graded {}", actor.name, post_title(&post)),
            link: post_link(room.id, post.id),
        })
        .await;

        Ok(outcome)
    }

    /// Submissions for a post: every record for the owner, one's own otherwise
    pub async fn submissions(&self, actor: &Actor, post_id: i32) -> Result<Vec<submission::Model>> {
        let post = self.load_post(post_id).await?;
        let room = self.load_classroom(post.classroom_id).await?;

        let mut query = submission::Entity::find().filter(submission::Column::PostId.eq(post.id));
        if !room.is_owner(actor.id) {
            if !self.is_member(room.id, actor.id).await? {
                return Err(ClassroomError::denied("not a member of this class"));
            }
            query = query.filter(submission::Column::UserId.eq(actor.id));
        }

        Ok(query.order_by_asc(submission::Column::Id).all(&self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::audience::Audience;
    use crate::classroom::schedule::LocalTime;
    use crate::classroom::stream::{Classwork, PostDraft};
    use crate::test_support::{alice, bob, teacher, Harness};

    async fn assignment(h: &Harness, room_id: i32, audience: Audience, classwork: Classwork) -> i32 {
        h.engine
            .create_post(
                &teacher(),
                room_id,
                PostDraft::new(PostKind::Assignment, "show your work")
                    .titled("Worksheet")
                    .to(audience)
                    .with_classwork(classwork),
            )
            .await
            .unwrap()
            .created_id()
            .unwrap()
    }

    fn graded(points: i32) -> Classwork {
        Classwork {
            total_points: Some(points),
            ..Classwork::default()
        }
    }

    #[tokio::test]
    async fn test_closed_assignment_can_still_be_graded() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice(), &bob()]).await;
        let post_id = assignment(
            &h,
            room.id,
            Audience::Only(vec![alice().id]),
            Classwork {
                due: Some(LocalTime::parse("2020-01-01T00:00", 0).unwrap()),
                total_points: Some(10),
                accept_submissions: true,
                close_after_due: true,
            },
        )
        .await;

        let err = h
            .engine
            .submit(&alice(), post_id, Work::new(vec![Upload::new("late.pdf", "x")], vec![]), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ClassroomError::Rejected(_)));

        let outcome = h.engine.grade(&teacher(), post_id, alice().id, 8).await.unwrap();
        assert!(matches!(outcome, Outcome::Created(_)));

        let record = h.engine.find_submission(post_id, alice().id).await.unwrap().unwrap();
        assert!(!record.is_turned_in);
        assert!(record.is_graded);
        assert_eq!(record.points, Some(8));
        assert_eq!(record.attachments, "[]");
        assert_eq!(SubmissionState::of(Some(&record)), SubmissionState::Graded);
    }

    #[tokio::test]
    async fn test_grading_outside_audience_fails() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice(), &bob()]).await;
        let post_id = assignment(&h, room.id, Audience::Only(vec![alice().id]), graded(10)).await;

        let err = h.engine.grade(&teacher(), post_id, bob().id, 5).await.unwrap_err();
        assert!(matches!(err, ClassroomError::Rejected(_)));
        assert!(h.engine.find_submission(post_id, bob().id).await.unwrap().is_none());

        let err = h.engine.grade(&alice(), post_id, alice().id, 5).await.unwrap_err();
        assert!(matches!(err, ClassroomError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_grade_validation_and_idempotence() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice()]).await;
        let post_id = assignment(&h, room.id, Audience::All, graded(10)).await;
        let ungraded = assignment(&h, room.id, Audience::All, Classwork::default()).await;

        for bad in [-1, 11] {
            let err = h.engine.grade(&teacher(), post_id, alice().id, bad).await.unwrap_err();
            assert!(matches!(err, ClassroomError::InvalidRequest(_)));
        }
        assert!(h.engine.grade(&teacher(), ungraded, alice().id, 1).await.is_err());

        h.engine
            .submit(&alice(), post_id, Work::new(vec![], vec!["https://docs.example/essay".into()]), vec![])
            .await
            .unwrap();
        assert_eq!(h.engine.grade(&teacher(), post_id, alice().id, 7).await.unwrap(), Outcome::Updated);
        assert_eq!(h.engine.grade(&teacher(), post_id, alice().id, 7).await.unwrap(), Outcome::Unchanged);
        assert_eq!(h.engine.grade(&teacher(), post_id, alice().id, 9).await.unwrap(), Outcome::Updated);

        let graded_notices = h
            .dispatched()
            .into_iter()
            .filter(|n| n.event == Event::SubmissionGraded)
            .count();
        assert_eq!(graded_notices, 2);
    }

    #[tokio::test]
    async fn test_state_machine_transitions() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice()]).await;
        let post_id = assignment(&h, room.id, Audience::All, graded(10)).await;
        let a = alice();

        // NotSubmitted: unsubmit is not a valid move
        let err = h.engine.unsubmit(&a, post_id).await.unwrap_err();
        assert!(matches!(err, ClassroomError::InvalidState(_)));

        let created = h
            .engine
            .submit(&a, post_id, Work::new(vec![Upload::new("essay.txt", "draft")], vec![]), vec![])
            .await
            .unwrap();
        assert!(matches!(created, Outcome::Created(_)));
        let record = h.engine.find_submission(post_id, a.id).await.unwrap().unwrap();
        assert_eq!(SubmissionState::of(Some(&record)), SubmissionState::TurnedIn);
        assert!(record.turned_in_at.is_some());
        let files: Vec<String> = from_json_list(&record.attachments);

        // Same files again is a no-op
        let again = h.engine.submit(&a, post_id, Work::default(), files.clone()).await.unwrap();
        assert_eq!(again, Outcome::Unchanged);

        assert_eq!(h.engine.unsubmit(&a, post_id).await.unwrap(), Outcome::Updated);
        let record = h.engine.find_submission(post_id, a.id).await.unwrap().unwrap();
        assert_eq!(SubmissionState::of(Some(&record)), SubmissionState::NotSubmitted);
        assert_eq!(from_json_list::<String>(&record.attachments), files);
        assert!(h.object_exists(buckets::SUBMISSIONS, &files[0]).await);

        // Resubmitting restores the prior files
        let resubmitted = h.engine.submit(&a, post_id, Work::default(), files.clone()).await.unwrap();
        assert_eq!(resubmitted, Outcome::Updated);
        let record = h.engine.find_submission(post_id, a.id).await.unwrap().unwrap();
        assert!(record.is_turned_in);
        assert_eq!(from_json_list::<String>(&record.attachments), files);

        let turned_in = h
            .dispatched()
            .into_iter()
            .filter(|n| n.event == Event::SubmissionTurnedIn)
            .count();
        assert_eq!(turned_in, 2);
    }

    #[tokio::test]
    async fn test_submission_policy() {
        let h = Harness::new().await;
        let room = h.classroom_with(&[&alice()]).await;
        let closed = assignment(
            &h,
            room.id,
            Audience::All,
            Classwork {
                accept_submissions: false,
                ..Classwork::default()
            },
        )
        .await;
        let open = assignment(&h, room.id, Audience::All, Classwork::default()).await;

        let err = h.engine.submit(&alice(), closed, Work::default(), vec![]).await.unwrap_err();
        assert!(matches!(err, ClassroomError::Rejected(_)));

        // Non-members are not in any audience
        let err = h.engine.submit(&bob(), open, Work::default(), vec![]).await.unwrap_err();
        assert!(matches!(err, ClassroomError::Rejected(_)));

        let err = h.engine.submit(&teacher(), open, Work::default(), vec![]).await.unwrap_err();
        assert!(err.is_expected());

        h.engine.submit(&alice(), open, Work::default(), vec![]).await.unwrap();
        assert_eq!(h.engine.submissions(&teacher(), open).await.unwrap().len(), 1);
        assert_eq!(h.engine.submissions(&alice(), open).await.unwrap().len(), 1);
        assert!(h.engine.submissions(&bob(), open).await.is_err());
    }
}
