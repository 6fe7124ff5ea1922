pub mod poll;

use actix::prelude::*;
use self::poll::PollStore;

/// Document store for poll records. Every operation is a message handled
/// inside this actor, so each read-modify-write runs to completion before
/// the next one starts (single-writer-per-document discipline).
#[derive(Default)]
pub struct StoreActor {
    pub polls: PollStore,
}

impl Actor for StoreActor {
    type Context = Context<Self>;
}

impl SystemService for StoreActor {}
impl Supervised for StoreActor {}
