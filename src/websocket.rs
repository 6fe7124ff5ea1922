use crate::poll::{Poll, PollId, StudentId};
use crate::services;
use crate::services::broadcast::BroadcastActor;
use crate::services::poll::{IncomingCreatePoll, IncomingGetHistory, IncomingVoteMessage, PollEngine};
use crate::services::Service;
use crate::span::SpanMessage;
use actix::prelude::*;
use actix_web_actors::ws;
use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum SenderType {
    #[serde(rename = "teacher")]
    Teacher,
    #[serde(rename = "student")]
    Student,
}

/// Relayed verbatim to all clients, never validated or stored
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub message: String,
    pub sender_type: SenderType,
    pub sender_name: String,
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    #[serde(rename = "create_poll")]
    CreatePoll {
        question: String,
        options: Vec<String>,
        duration: Option<i64>,
    },
    #[serde(rename = "submit_vote")]
    #[serde(rename_all = "camelCase")]
    SubmitVote {
        poll_id: PollId,
        student_id: StudentId,
        student_name: String,
        option_index: i32,
    },
    #[serde(rename = "get_history")]
    GetHistory,
    #[serde(rename = "send_message")]
    SendMessage(ChatMessage),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "poll_update")]
    PollUpdate(Poll),
    #[serde(rename = "poll_ended")]
    PollEnded,
    #[serde(rename = "receive_message")]
    ReceiveMessage(ChatMessage),
    #[serde(rename = "poll_history")]
    PollHistory { polls: Vec<Poll> },
    #[serde(rename = "error")]
    Error { message: String },
}

pub struct WsClient {
    service: Addr<Service>,
}

impl WsClient {
    pub fn new(service: Addr<Service>) -> WsClient {
        WsClient { service }
    }

    fn send_json<T: Serialize>(&self, ctx: &mut ws::WebsocketContext<Self>, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => ctx.text(json),
            Err(err) => error!(
                "Failed to convert to JSON {error}",
                error = err.to_string()
            ),
        }
    }
}

impl Actor for WsClient {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("New ws client");
        let addr = ctx.address();
        let connect = services::Connect { addr };
        self.service.do_send(SpanMessage::new(connect.clone()));
        BroadcastActor::from_registry().do_send(connect);
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        info!("Ws client left");
        let addr = ctx.address();
        BroadcastActor::from_registry().do_send(services::Disconnect { addr });
    }
}

// Incoming messages from ws
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsClient {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(message) => match message {
                ws::Message::Text(text) => {
                    let m = match serde_json::from_str(&text) {
                        Ok(m) => m,
                        Err(serde_error) => {
                            warn!("Discarding malformed message {:#?}", serde_error);
                            return;
                        }
                    };
                    match m {
                        IncomingMessage::CreatePoll {
                            question,
                            options,
                            duration,
                        } => {
                            debug!("Incoming create_poll");
                            PollEngine::from_registry().do_send(SpanMessage::new(
                                IncomingCreatePoll {
                                    addr: ctx.address(),
                                    question,
                                    options,
                                    duration,
                                },
                            ));
                        }
                        IncomingMessage::SubmitVote {
                            poll_id,
                            student_id,
                            student_name,
                            option_index,
                        } => {
                            debug!("Incoming submit_vote");
                            PollEngine::from_registry().do_send(SpanMessage::new(
                                IncomingVoteMessage {
                                    addr: ctx.address(),
                                    poll_id,
                                    student_id,
                                    student_name,
                                    option_index,
                                },
                            ));
                        }
                        IncomingMessage::GetHistory => {
                            debug!("Incoming get_history");
                            PollEngine::from_registry().do_send(SpanMessage::new(
                                IncomingGetHistory { addr: ctx.address() },
                            ));
                        }
                        IncomingMessage::SendMessage(chat) => {
                            debug!("Incoming chat message");
                            BroadcastActor::from_registry().do_send(services::ChatRelay(chat));
                        }
                    }
                }
                ws::Message::Close(reason) => {
                    debug!(
                        "Got close message from WS. Reason: {:#?}", reason
                    );
                    ctx.close(reason)
                }
                message => {
                    warn!(
                        "Client sent something else than text: {:#?}", message
                    );
                }
            },
            Err(err) => {
                error!("ProtocolError in StreamHandler {:#?}", err);
            }
        }
    }
}

impl Handler<services::PollUpdated> for WsClient {
    type Result = ();

    fn handle(&mut self, msg: services::PollUpdated, ctx: &mut Self::Context) {
        debug!("Sending poll_update to client");
        self.send_json(ctx, &OutgoingMessage::PollUpdate(msg.0))
    }
}

impl Handler<services::PollEnded> for WsClient {
    type Result = ();

    fn handle(&mut self, _msg: services::PollEnded, ctx: &mut Self::Context) {
        debug!("Sending poll_ended to client");
        self.send_json(ctx, &OutgoingMessage::PollEnded)
    }
}

impl Handler<services::ChatRelay> for WsClient {
    type Result = ();

    fn handle(&mut self, msg: services::ChatRelay, ctx: &mut Self::Context) {
        self.send_json(ctx, &OutgoingMessage::ReceiveMessage(msg.0))
    }
}

impl Handler<services::PollHistoryLoaded> for WsClient {
    type Result = ();

    fn handle(&mut self, msg: services::PollHistoryLoaded, ctx: &mut Self::Context) {
        debug!("Sending poll_history to client");
        self.send_json(ctx, &OutgoingMessage::PollHistory { polls: msg.0 })
    }
}

impl Handler<services::ErrorMessage> for WsClient {
    type Result = ();

    fn handle(&mut self, msg: services::ErrorMessage, ctx: &mut Self::Context) {
        debug!("Sending error to client");
        self.send_json(ctx, &OutgoingMessage::Error { message: msg.0 })
    }
}
