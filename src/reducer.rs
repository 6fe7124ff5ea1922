//! Client-side view state. Every observer runs this reducer over the events
//! its transport delivers, in arrival order, and rebuilds the derived
//! tallies locally so it can keep rendering from the last snapshot while
//! offline. The counting loop here intentionally repeats the engine's
//! derivation instead of calling it; both must agree on every snapshot.

use crate::poll::{Answer, Poll, PollResult, StudentId};
use crate::websocket::{ChatMessage, OutgoingMessage};
use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client-local identity. Registration is not validated by the server and
/// "kicked" is cosmetic bookkeeping on this side only.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    #[serde(with = "ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    pub is_kicked: bool,
}

#[derive(Clone, Default, PartialEq, Debug)]
pub struct ClientState {
    pub current_poll: Option<Poll>,
    pub history: Vec<Poll>,
    pub answers: Vec<Answer>,
    pub students: Vec<Student>,
    pub results: Option<PollResult>,
    pub chat_messages: Vec<ChatMessage>,
    pub kicked_students: Vec<StudentId>,
}

pub enum ClientAction {
    SetPoll(Option<Poll>),
    UpdatePoll(Poll),
    AddMessage(ChatMessage),
    RegisterStudent(Student),
    KickStudent(StudentId),
    SetHistory(Vec<Poll>),
}

pub fn reduce(mut state: ClientState, action: ClientAction) -> ClientState {
    match action {
        ClientAction::SetPoll(poll) => {
            state.current_poll = poll;
            state
        }
        ClientAction::UpdatePoll(poll) => {
            // Recompute derived results from the snapshot's raw votes. The
            // snapshot is authoritative; no vote is re-validated here.
            let mut counts = vec![0u32; poll.options.len()];
            let mut student_answers = Vec::with_capacity(poll.votes.len());
            for vote in &poll.votes {
                if vote.option_index >= 0 && (vote.option_index as usize) < counts.len() {
                    counts[vote.option_index as usize] += 1;
                }
                student_answers.push(Answer {
                    student_id: vote.student_id.clone(),
                    student_name: vote.student_name.clone(),
                    poll_id: poll.id.clone(),
                    option_index: vote.option_index,
                    answered_at: vote.answered_at,
                });
            }
            state.results = Some(PollResult {
                poll_id: poll.id.clone(),
                question: poll.question.clone(),
                options: poll.options.clone(),
                votes: counts,
                total_votes: student_answers.len(),
                student_answers: student_answers.clone(),
            });
            state.answers = student_answers;
            state.current_poll = Some(poll);
            state
        }
        ClientAction::AddMessage(message) => {
            state.chat_messages.push(message);
            state
        }
        ClientAction::RegisterStudent(student) => {
            state.students.push(student);
            state
        }
        ClientAction::KickStudent(student_id) => {
            state.kicked_students.push(student_id);
            state
        }
        ClientAction::SetHistory(polls) => {
            state.history = polls;
            state
        }
    }
}

/// Maps a server event onto the reducer. On `poll_update` a snapshot that is
/// already past its expiry is shown as inactive; this is display-only and is
/// never reported back as authoritative state.
pub fn receive(state: ClientState, event: OutgoingMessage, now: DateTime<Utc>) -> ClientState {
    match event {
        OutgoingMessage::PollUpdate(mut poll) => {
            if poll.has_expired(now) {
                poll.is_active = false;
            }
            reduce(state, ClientAction::UpdatePoll(poll))
        }
        OutgoingMessage::PollEnded => reduce(state, ClientAction::SetPoll(None)),
        OutgoingMessage::ReceiveMessage(message) => reduce(state, ClientAction::AddMessage(message)),
        OutgoingMessage::PollHistory { polls } => reduce(state, ClientAction::SetHistory(polls)),
        // Errors go to the UI layer, not into derived state
        OutgoingMessage::Error { .. } => state,
    }
}

/// Seconds left on the current poll, rounded up and clamped at zero.
/// Advisory countdown only; the engine decides actual expiry.
pub fn time_remaining(state: &ClientState, now: DateTime<Utc>) -> i64 {
    match &state.current_poll {
        Some(poll) if poll.is_active => {
            let remaining_ms = (poll.expires_at - now).num_milliseconds().max(0);
            (remaining_ms + 999) / 1000
        }
        _ => 0,
    }
}

pub fn student_by_id<'a>(state: &'a ClientState, id: &StudentId) -> Option<&'a Student> {
    state.students.iter().find(|student| &student.id == id)
}

pub fn can_create_new_poll(state: &ClientState) -> bool {
    match &state.current_poll {
        Some(poll) => !poll.is_active,
        None => true,
    }
}
