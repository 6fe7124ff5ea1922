use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_POLL_DURATION_SECS: i64 = 60;

#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct PollId(pub String);

impl PollId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_hyphenated().to_string())
    }
}

/// Opaque identity generated by the client and persisted in its own session.
/// Never validated server-side; only used for duplicate-vote detection.
#[derive(Clone, Hash, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct StudentId(pub String);

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub student_id: StudentId,
    pub student_name: String,
    /// Kept signed: legacy records may carry indices outside the option
    /// range and the derivation must skip them rather than fail.
    pub option_index: i32,
    #[serde(with = "ts_milliseconds")]
    pub answered_at: DateTime<Utc>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    pub options: Vec<String>,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub votes: Vec<Vote>,
}

/// Derived tallies for one poll. Recomputed from `Poll::votes` on every
/// observation, never persisted. The client reducer recomputes the same
/// numbers independently from the broadcast snapshot.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub poll_id: PollId,
    pub question: String,
    pub options: Vec<String>,
    /// Per-option counts, same length and order as `options`.
    pub votes: Vec<u32>,
    pub total_votes: usize,
    pub student_answers: Vec<Answer>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub student_id: StudentId,
    pub student_name: String,
    pub poll_id: PollId,
    pub option_index: i32,
    #[serde(with = "ts_milliseconds")]
    pub answered_at: DateTime<Utc>,
}

#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum VoteError {
    #[error("Poll not found")]
    PollNotFound,
    #[error("Poll is closed")]
    PollClosed,
    #[error("Time is up")]
    TimeExpired,
    #[error("Student has already voted")]
    DuplicateVote,
}

#[derive(Error, Clone, PartialEq, Eq, Debug)]
pub enum CreatePollError {
    #[error("A poll needs at least two options")]
    NotEnoughOptions,
    #[error("Poll duration must be positive")]
    NonPositiveDuration,
}

impl Poll {
    /// `expires_at` is fixed here and never recalculated or extended.
    pub fn new(
        question: String,
        options: Vec<String>,
        duration_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PollId::new(),
            question,
            options,
            created_at: now,
            expires_at: now + Duration::seconds(duration_secs),
            is_active: true,
            votes: Vec::new(),
        }
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Validation chain for an incoming vote, in fixed order: closed,
    /// expired, duplicate. Existence is checked by the store lookup before
    /// this runs.
    pub fn check_vote(&self, student_id: &StudentId, now: DateTime<Utc>) -> Result<(), VoteError> {
        if !self.is_active {
            return Err(VoteError::PollClosed);
        }
        if self.has_expired(now) {
            return Err(VoteError::TimeExpired);
        }
        if self.votes.iter().any(|v| &v.student_id == student_id) {
            return Err(VoteError::DuplicateVote);
        }
        Ok(())
    }

    /// Tally derivation. Out-of-range indices are skipped from the counts
    /// but still echoed into `student_answers` (and therefore into
    /// `total_votes`), keeping an audit trail for malformed records.
    pub fn results(&self) -> PollResult {
        let mut counts = vec![0u32; self.options.len()];
        let mut student_answers = Vec::with_capacity(self.votes.len());
        for vote in &self.votes {
            if vote.option_index >= 0 && (vote.option_index as usize) < counts.len() {
                counts[vote.option_index as usize] += 1;
            }
            student_answers.push(Answer {
                student_id: vote.student_id.clone(),
                student_name: vote.student_name.clone(),
                poll_id: self.id.clone(),
                option_index: vote.option_index,
                answered_at: vote.answered_at,
            });
        }
        PollResult {
            poll_id: self.id.clone(),
            question: self.question.clone(),
            options: self.options.clone(),
            votes: counts,
            total_votes: student_answers.len(),
            student_answers,
        }
    }
}

pub fn check_create(options: &[String], duration_secs: i64) -> Result<(), CreatePollError> {
    if options.len() < 2 {
        return Err(CreatePollError::NotEnoughOptions);
    }
    if duration_secs <= 0 {
        return Err(CreatePollError::NonPositiveDuration);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(id: &str, index: i32, at: DateTime<Utc>) -> Vote {
        Vote {
            student_id: StudentId(id.to_owned()),
            student_name: id.to_uppercase(),
            option_index: index,
            answered_at: at,
        }
    }

    fn sample_poll(now: DateTime<Utc>) -> Poll {
        Poll::new(
            "Color?".to_owned(),
            vec!["Red".to_owned(), "Blue".to_owned()],
            60,
            now,
        )
    }

    #[test]
    fn results_counts_in_range_votes() {
        let now = Utc::now();
        let mut poll = sample_poll(now);
        poll.votes.push(vote("s1", 0, now));
        poll.votes.push(vote("s2", 1, now));
        poll.votes.push(vote("s3", 1, now));

        let results = poll.results();
        assert_eq!(results.votes, vec![1, 2]);
        assert_eq!(results.total_votes, 3);
        assert_eq!(results.student_answers.len(), 3);
    }

    #[test]
    fn results_skips_out_of_range_but_keeps_answers() {
        let now = Utc::now();
        let mut poll = sample_poll(now);
        poll.votes.push(vote("s1", 0, now));
        poll.votes.push(vote("s2", 5, now));
        poll.votes.push(vote("s3", -1, now));

        let results = poll.results();
        assert_eq!(results.votes, vec![1, 0]);
        // All votes land in the answer list and in the total
        assert_eq!(results.total_votes, 3);
        assert_eq!(results.student_answers.len(), 3);
        let counted: u32 = results.votes.iter().sum();
        assert!(counted as usize <= results.total_votes);
    }

    #[test]
    fn counts_sum_equals_total_when_all_in_range() {
        let now = Utc::now();
        let mut poll = sample_poll(now);
        poll.votes.push(vote("s1", 0, now));
        poll.votes.push(vote("s2", 1, now));

        let results = poll.results();
        let counted: u32 = results.votes.iter().sum();
        assert_eq!(counted as usize, results.total_votes);
    }

    #[test]
    fn check_vote_rejects_closed_before_expiry_check() {
        let now = Utc::now();
        let mut poll = sample_poll(now);
        poll.is_active = false;
        poll.expires_at = now - Duration::seconds(10);
        // Closed wins over expired
        assert_eq!(
            poll.check_vote(&StudentId("s1".to_owned()), now),
            Err(VoteError::PollClosed)
        );
    }

    #[test]
    fn check_vote_rejects_expired() {
        let now = Utc::now();
        let poll = sample_poll(now);
        let later = now + Duration::seconds(61);
        assert_eq!(
            poll.check_vote(&StudentId("s1".to_owned()), later),
            Err(VoteError::TimeExpired)
        );
    }

    #[test]
    fn check_vote_rejects_duplicate_student() {
        let now = Utc::now();
        let mut poll = sample_poll(now);
        poll.votes.push(vote("s1", 1, now));
        assert_eq!(
            poll.check_vote(&StudentId("s1".to_owned()), now),
            Err(VoteError::DuplicateVote)
        );
        // A different student is still allowed
        assert_eq!(poll.check_vote(&StudentId("s2".to_owned()), now), Ok(()));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let poll = sample_poll(now);
        // Exactly at expires_at still counts as open
        assert!(!poll.has_expired(poll.expires_at));
        assert!(poll.has_expired(poll.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn check_create_requires_two_options_and_positive_duration() {
        assert_eq!(
            check_create(&["A".to_owned()], 60),
            Err(CreatePollError::NotEnoughOptions)
        );
        assert_eq!(
            check_create(&["A".to_owned(), "B".to_owned()], 0),
            Err(CreatePollError::NonPositiveDuration)
        );
        assert_eq!(check_create(&["A".to_owned(), "B".to_owned()], 60), Ok(()));
    }

    #[test]
    fn poll_snapshot_uses_wire_field_names() {
        let now = Utc::now();
        let mut poll = sample_poll(now);
        poll.votes.push(vote("s1", 0, now));
        let json = serde_json::to_value(&poll).unwrap();
        assert!(json.get("isActive").is_some());
        assert!(json.get("expiresAt").is_some());
        assert!(json["votes"][0].get("studentId").is_some());
        assert!(json["votes"][0].get("optionIndex").is_some());
    }
}
