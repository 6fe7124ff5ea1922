use super::broadcast::BroadcastActor;
use super::{ErrorMessage, PollHistoryLoaded, PollUpdated};
use crate::message_handler_with_span;
use crate::poll::{check_create, Poll, PollId, StudentId, DEFAULT_POLL_DURATION_SECS};
use crate::span::{SpanHandler, SpanMessage};
use crate::store::{self, StoreActor};
use crate::websocket::WsClient;
use actix::prelude::*;
use actix_interop::FutureInterop;
use chrono::Utc;
use color_eyre::eyre::Report;
use tracing::{debug, info, Span};

/// Owns the poll lifecycle: create with force-close, lazy expiration on
/// read, the vote path and history. All document mutations go through the
/// store actor; this actor decides and broadcasts.
#[derive(Default)]
pub struct PollEngine;

impl PollEngine {
    pub fn new() -> Self {
        PollEngine
    }
}

impl Actor for PollEngine {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Poll engine started");
    }
}

/// Engine-level active poll lookup. Performs lazy expiration: an expired
/// poll found active is flipped inactive and reported absent. There is no
/// background timer; expiry is only ever observed here and on the vote path.
#[derive(Message, Clone)]
#[rtype(result = "Result<Option<Poll>, Report>")]
pub struct ActivePoll;

#[derive(Message)]
#[rtype(result = "Result<(), Report>")]
pub struct IncomingCreatePoll {
    pub addr: Addr<WsClient>,
    pub question: String,
    pub options: Vec<String>,
    pub duration: Option<i64>,
}

#[derive(Message)]
#[rtype(result = "Result<(), Report>")]
pub struct IncomingVoteMessage {
    pub addr: Addr<WsClient>,
    pub poll_id: PollId,
    pub student_id: StudentId,
    pub student_name: String,
    pub option_index: i32,
}

#[derive(Message)]
#[rtype(result = "Result<(), Report>")]
pub struct IncomingGetHistory {
    pub addr: Addr<WsClient>,
}

async fn active_poll() -> Result<Option<Poll>, Report> {
    let store = StoreActor::from_registry();
    let poll = store
        .send(SpanMessage::new(store::poll::ActivePoll))
        .await??;
    match poll {
        Some(poll) if poll.has_expired(Utc::now()) => {
            debug!("Active poll has expired, closing it");
            // The store re-reads the live document before flipping it, so a
            // vote landing between our read and this write is not clobbered
            store
                .send(SpanMessage::new(store::poll::CloseActiveIfExpired(
                    Utc::now(),
                )))
                .await??;
            Ok(None)
        }
        other => Ok(other),
    }
}

async fn create_poll(question: String, options: Vec<String>, duration: i64) -> Result<Poll, Report> {
    check_create(&options, duration)?;
    let store = StoreActor::from_registry();
    // Best-effort sequence: a short window with two active polls self-heals
    // on the next read
    store
        .send(SpanMessage::new(store::poll::EndActivePolls))
        .await??;
    let poll = store
        .send(SpanMessage::new(store::poll::InsertPoll(Poll::new(
            question,
            options,
            duration,
            Utc::now(),
        ))))
        .await??;
    Ok(poll)
}

async fn submit_vote(msg: IncomingVoteMessage) -> Result<Poll, Report> {
    let poll = StoreActor::from_registry()
        .send(SpanMessage::new(store::poll::AppendVote {
            poll_id: msg.poll_id,
            student_id: msg.student_id,
            student_name: msg.student_name,
            option_index: msg.option_index,
            now: Utc::now(),
        }))
        .await??;
    Ok(poll)
}

async fn poll_history() -> Result<Vec<Poll>, Report> {
    let history = StoreActor::from_registry()
        .send(SpanMessage::new(store::poll::InactivePolls))
        .await??;
    Ok(history)
}

message_handler_with_span! {
    impl SpanHandler<ActivePoll> for PollEngine {
        type Result = ResponseActFuture<Self, <ActivePoll as Message>::Result>;

        fn handle(&mut self, _msg: ActivePoll, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Looking up active poll");
            active_poll().interop_actor_boxed(self)
        }
    }
}

message_handler_with_span! {
    impl SpanHandler<IncomingCreatePoll> for PollEngine {
        type Result = ResponseActFuture<Self, <IncomingCreatePoll as Message>::Result>;

        fn handle(&mut self, msg: IncomingCreatePoll, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling create_poll");
            async {
                let IncomingCreatePoll { addr, question, options, duration } = msg;
                let duration = duration.unwrap_or(DEFAULT_POLL_DURATION_SECS);
                match create_poll(question, options, duration).await {
                    Ok(poll) => {
                        BroadcastActor::from_registry().do_send(PollUpdated(poll));
                    }
                    Err(err) => {
                        addr.do_send(ErrorMessage(err.to_string()));
                    }
                }
                Ok(())
            }
            .interop_actor_boxed(self)
        }
    }
}

message_handler_with_span! {
    impl SpanHandler<IncomingVoteMessage> for PollEngine {
        type Result = ResponseActFuture<Self, <IncomingVoteMessage as Message>::Result>;

        fn handle(&mut self, msg: IncomingVoteMessage, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling submit_vote");
            async {
                let addr = msg.addr.clone();
                match submit_vote(msg).await {
                    Ok(poll) => {
                        BroadcastActor::from_registry().do_send(PollUpdated(poll));
                    }
                    Err(err) => {
                        addr.do_send(ErrorMessage(err.to_string()));
                    }
                }
                Ok(())
            }
            .interop_actor_boxed(self)
        }
    }
}

message_handler_with_span! {
    impl SpanHandler<IncomingGetHistory> for PollEngine {
        type Result = ResponseActFuture<Self, <IncomingGetHistory as Message>::Result>;

        fn handle(&mut self, msg: IncomingGetHistory, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling get_history");
            async move {
                match poll_history().await {
                    Ok(history) => {
                        msg.addr.do_send(PollHistoryLoaded(history));
                    }
                    Err(err) => {
                        msg.addr.do_send(ErrorMessage(err.to_string()));
                    }
                }
                Ok(())
            }
            .interop_actor_boxed(self)
        }
    }
}

impl SystemService for PollEngine {}
impl Supervised for PollEngine {}
