use crate::message_handler_with_span;
use crate::poll::Poll;
use crate::span::{SpanHandler, SpanMessage};
use crate::websocket::{ChatMessage, WsClient};
use actix::prelude::*;
use actix_interop::FutureInterop;
use std::fmt;
use tracing::{debug, error, info, instrument, Span};

pub mod broadcast;
pub mod poll;

#[derive(Message, Clone)]
#[rtype(result = "Result<(), ()>")]
pub struct Connect {
    pub addr: Addr<WsClient>,
}

impl fmt::Debug for Connect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connect").finish()
    }
}

#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub addr: Addr<WsClient>,
}

/// Full poll snapshot pushed to observers after any mutation
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct PollUpdated(pub Poll);

/// Sent to a single client connecting while no poll is active
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct PollEnded;

#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct PollHistoryLoaded(pub Vec<Poll>);

/// Validation or store failure, surfaced to the originating client only
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct ErrorMessage(pub String);

/// Chat relay, no validation and no engine involvement
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct ChatRelay(pub ChatMessage);

/// Per-connection entry point; pushes the current poll state to every
/// client that connects.
#[derive(Default)]
pub struct Service;

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service").finish()
    }
}

impl Service {
    pub fn new() -> Service {
        Service
    }
}

impl Actor for Service {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Service actor started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("Service actor stopped");
    }
}

#[instrument]
async fn handle_connect(msg: Connect) -> Result<(), ()> {
    let res = poll::PollEngine::from_registry()
        .send(SpanMessage::new(poll::ActivePoll))
        .await;
    match res {
        Ok(Ok(Some(active))) => {
            let _res = msg.addr.send(PollUpdated(active)).await;
        }
        Ok(Ok(None)) => {
            let _res = msg.addr.send(PollEnded).await;
        }
        Ok(Err(err)) => {
            error!("Failed to load active poll on connect {:#?}", err);
        }
        Err(err) => {
            error!("Engine did not answer connect request {:#?}", err);
        }
    }
    Ok(())
}

message_handler_with_span! {
    impl SpanHandler<Connect> for Service {
        type Result = ResponseActFuture<Self, <Connect as Message>::Result>;

        fn handle(&mut self, msg: Connect, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling connect");
            handle_connect(msg).interop_actor_boxed(self)
        }
    }
}

impl Supervised for Service {}
impl ArbiterService for Service {}
