use super::StoreActor;
use crate::async_message_handler_with_span;
use crate::poll::{Poll, PollId, StudentId, Vote, VoteError};
use crate::span::AsyncSpanHandler;
use actix::prelude::*;
use actix_interop::with_ctx;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use std::collections::HashMap;
use tracing::debug;

/// In-memory poll document map. Mutations only happen through `StoreActor`
/// messages, which keeps each of these calls atomic.
#[derive(Default)]
pub struct PollStore {
    polls: HashMap<PollId, Poll>,
}

impl PollStore {
    pub fn insert(&mut self, poll: Poll) -> Poll {
        self.polls.insert(poll.id.clone(), poll.clone());
        poll
    }

    pub fn find_by_id(&self, id: &PollId) -> Option<Poll> {
        self.polls.get(id).cloned()
    }

    pub fn active(&self) -> Option<Poll> {
        self.polls.values().find(|p| p.is_active).cloned()
    }

    /// Flips the active poll inactive once its deadline has passed, touching
    /// nothing else in the document. Votes accepted between an earlier read
    /// and this call stay recorded. Returns whether a poll was closed.
    pub fn close_active_if_expired(&mut self, now: DateTime<Utc>) -> bool {
        match self
            .polls
            .values_mut()
            .find(|p| p.is_active && p.has_expired(now))
        {
            Some(poll) => {
                poll.is_active = false;
                true
            }
            None => false,
        }
    }

    /// Bulk active -> inactive transition. Idempotent.
    pub fn end_active(&mut self) {
        for poll in self.polls.values_mut() {
            poll.is_active = false;
        }
    }

    /// Inactive polls, most recently created first
    pub fn inactive_sorted(&self) -> Vec<Poll> {
        let mut history: Vec<Poll> = self
            .polls
            .values()
            .filter(|p| !p.is_active)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history
    }

    /// Conditional vote append: lookup, validation chain and append happen in
    /// one call so two concurrent votes from the same student can never both
    /// pass the duplicate check.
    pub fn append_vote(
        &mut self,
        poll_id: &PollId,
        student_id: StudentId,
        student_name: String,
        option_index: i32,
        now: DateTime<Utc>,
    ) -> Result<Poll, VoteError> {
        let poll = self.polls.get_mut(poll_id).ok_or(VoteError::PollNotFound)?;
        poll.check_vote(&student_id, now)?;
        poll.votes.push(Vote {
            student_id,
            student_name,
            option_index,
            answered_at: now,
        });
        Ok(poll.clone())
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Poll, Report>")]
pub struct InsertPoll(pub Poll);

async_message_handler_with_span! {
    impl AsyncSpanHandler<InsertPoll> for StoreActor {
        async fn handle(msg: InsertPoll) -> Result<Poll, Report> {
            debug!("Persisting new poll");
            Ok(with_ctx(|a: &mut StoreActor, _| a.polls.insert(msg.0)))
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Option<Poll>, Report>")]
pub struct ActivePoll;

async_message_handler_with_span! {
    impl AsyncSpanHandler<ActivePoll> for StoreActor {
        async fn handle(_msg: ActivePoll) -> Result<Option<Poll>, Report> {
            debug!("Retrieving active poll");
            Ok(with_ctx(|a: &mut StoreActor, _| a.polls.active()))
        }
    }
}

/// Lazy expiration write. Re-reads the live document inside the store so a
/// vote appended after the caller's snapshot is never lost.
#[derive(Message, Clone)]
#[rtype(result = "Result<bool, Report>")]
pub struct CloseActiveIfExpired(pub DateTime<Utc>);

async_message_handler_with_span! {
    impl AsyncSpanHandler<CloseActiveIfExpired> for StoreActor {
        async fn handle(msg: CloseActiveIfExpired) -> Result<bool, Report> {
            debug!("Closing active poll if expired");
            Ok(with_ctx(|a: &mut StoreActor, _| {
                a.polls.close_active_if_expired(msg.0)
            }))
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<(), Report>")]
pub struct EndActivePolls;

async_message_handler_with_span! {
    impl AsyncSpanHandler<EndActivePolls> for StoreActor {
        async fn handle(_msg: EndActivePolls) -> Result<(), Report> {
            debug!("Ending all active polls");
            with_ctx(|a: &mut StoreActor, _| a.polls.end_active());
            Ok(())
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Vec<Poll>, Report>")]
pub struct InactivePolls;

async_message_handler_with_span! {
    impl AsyncSpanHandler<InactivePolls> for StoreActor {
        async fn handle(_msg: InactivePolls) -> Result<Vec<Poll>, Report> {
            debug!("Retrieving poll history");
            Ok(with_ctx(|a: &mut StoreActor, _| a.polls.inactive_sorted()))
        }
    }
}

#[derive(Message, Clone)]
#[rtype(result = "Result<Poll, Report>")]
pub struct AppendVote {
    pub poll_id: PollId,
    pub student_id: StudentId,
    pub student_name: String,
    pub option_index: i32,
    pub now: DateTime<Utc>,
}

async_message_handler_with_span! {
    impl AsyncSpanHandler<AppendVote> for StoreActor {
        async fn handle(msg: AppendVote) -> Result<Poll, Report> {
            debug!("Appending vote to poll {id}", id = msg.poll_id.0);
            let poll = with_ctx(|a: &mut StoreActor, _| {
                a.polls.append_vote(
                    &msg.poll_id,
                    msg.student_id,
                    msg.student_name,
                    msg.option_index,
                    msg.now,
                )
            })?;
            Ok(poll)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_poll(question: &str, now: DateTime<Utc>) -> Poll {
        Poll::new(
            question.to_owned(),
            vec!["A".to_owned(), "B".to_owned(), "C".to_owned()],
            60,
            now,
        )
    }

    #[test]
    fn end_active_is_idempotent() {
        let now = Utc::now();
        let mut store = PollStore::default();
        store.insert(new_poll("one", now));
        store.insert(new_poll("two", now));

        store.end_active();
        let after_first: Vec<PollId> = store.inactive_sorted().into_iter().map(|p| p.id).collect();
        store.end_active();
        let after_second: Vec<PollId> = store.inactive_sorted().into_iter().map(|p| p.id).collect();

        assert_eq!(after_first.len(), 2);
        assert_eq!(after_first, after_second);
        assert!(store.active().is_none());
    }

    #[test]
    fn create_sequence_leaves_exactly_one_active() {
        let now = Utc::now();
        let mut store = PollStore::default();
        // The engine force-closes before every insert
        for i in 0..3 {
            store.end_active();
            store.insert(new_poll(&format!("poll {}", i), now + Duration::seconds(i)));
        }

        let active = store.active().expect("most recent poll should be active");
        assert_eq!(active.question, "poll 2");
        assert_eq!(store.inactive_sorted().len(), 2);
    }

    #[test]
    fn history_is_sorted_most_recent_first() {
        let now = Utc::now();
        let mut store = PollStore::default();
        for i in 0..3 {
            store.insert(new_poll(&format!("poll {}", i), now + Duration::seconds(i)));
        }
        store.end_active();

        let history = store.inactive_sorted();
        let questions: Vec<&str> = history.iter().map(|p| p.question.as_str()).collect();
        assert_eq!(questions, vec!["poll 2", "poll 1", "poll 0"]);
    }

    #[test]
    fn append_vote_counts_student_once() {
        let now = Utc::now();
        let mut store = PollStore::default();
        let poll = store.insert(new_poll("q", now));

        let updated = store
            .append_vote(
                &poll.id,
                StudentId("s1".to_owned()),
                "S1".to_owned(),
                1,
                now,
            )
            .expect("first vote should pass");
        assert_eq!(updated.results().votes, vec![0, 1, 0]);

        // Same student again, any option
        let err = store
            .append_vote(
                &poll.id,
                StudentId("s1".to_owned()),
                "S1".to_owned(),
                2,
                now,
            )
            .unwrap_err();
        assert_eq!(err, VoteError::DuplicateVote);
        let counts = store.find_by_id(&poll.id).unwrap().results().votes;
        assert_eq!(counts, vec![0, 1, 0]);
    }

    #[test]
    fn closing_expired_poll_keeps_vote_from_the_expiry_window() {
        let now = Utc::now();
        let mut store = PollStore::default();
        let poll = store.insert(Poll::new(
            "q".to_owned(),
            vec!["A".to_owned(), "B".to_owned()],
            1,
            now,
        ));

        // A reader takes a snapshot, then a vote lands before the deadline
        let snapshot = store.active().expect("poll starts active");
        assert!(snapshot.votes.is_empty());
        store
            .append_vote(
                &poll.id,
                StudentId("s1".to_owned()),
                "S1".to_owned(),
                0,
                now,
            )
            .expect("vote before expiry passes");

        // The reader now observes expiry and closes the poll
        let later = now + Duration::seconds(2);
        assert!(store.close_active_if_expired(later));

        let closed = store.find_by_id(&poll.id).unwrap();
        assert!(!closed.is_active);
        assert_eq!(closed.results().votes, vec![1, 0]);
        assert_eq!(store.inactive_sorted()[0].votes.len(), 1);
    }

    #[test]
    fn close_active_if_expired_leaves_live_poll_alone() {
        let now = Utc::now();
        let mut store = PollStore::default();
        store.insert(new_poll("q", now));

        assert!(!store.close_active_if_expired(now));
        assert!(store.active().is_some());
        // Nothing active at all is also a no-op
        store.end_active();
        assert!(!store.close_active_if_expired(now + Duration::seconds(120)));
    }

    #[test]
    fn append_vote_rejects_unknown_poll() {
        let now = Utc::now();
        let mut store = PollStore::default();
        let err = store
            .append_vote(
                &PollId::new(),
                StudentId("s1".to_owned()),
                "S1".to_owned(),
                0,
                now,
            )
            .unwrap_err();
        assert_eq!(err, VoteError::PollNotFound);
    }

    #[test]
    fn append_vote_rejects_after_expiry_without_mutation() {
        let now = Utc::now();
        let mut store = PollStore::default();
        let poll = store.insert(Poll::new(
            "q".to_owned(),
            vec!["A".to_owned(), "B".to_owned()],
            1,
            now,
        ));

        let later = now + Duration::seconds(2);
        let err = store
            .append_vote(
                &poll.id,
                StudentId("s1".to_owned()),
                "S1".to_owned(),
                0,
                later,
            )
            .unwrap_err();
        assert_eq!(err, VoteError::TimeExpired);
        assert!(store.find_by_id(&poll.id).unwrap().votes.is_empty());
    }

    #[test]
    fn append_vote_rejects_closed_poll() {
        let now = Utc::now();
        let mut store = PollStore::default();
        let poll = store.insert(new_poll("q", now));
        store.end_active();

        let err = store
            .append_vote(
                &poll.id,
                StudentId("s1".to_owned()),
                "S1".to_owned(),
                0,
                now,
            )
            .unwrap_err();
        assert_eq!(err, VoteError::PollClosed);
    }
}
