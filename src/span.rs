use actix::dev::MessageResponse;
use actix::prelude::*;
use async_trait::async_trait;
use pin_project::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::Span;

/// Wrapper that carries the sender's tracing span across an actor mailbox
pub struct SpanMessage<I> {
    pub msg: I,
    pub span: Span,
}

impl<M> SpanMessage<M> {
    pub fn new(msg: M) -> Self {
        Self {
            msg,
            span: Span::current(),
        }
    }
}

impl<M, R: 'static> Message for SpanMessage<M>
where
    M: Message<Result = R>,
{
    type Result = R;
}

/// Handler invoked inside the span the message was sent from
pub trait SpanHandler<M>
where
    Self: Actor,
    M: Message,
{
    type Result: MessageResponse<Self, M>;

    fn handle(&mut self, msg: M, ctx: &mut Self::Context, span: Span) -> Self::Result;
}

#[async_trait]
pub trait AsyncSpanHandler<M>
where
    Self: Actor,
    M: Message,
{
    async fn handle(msg: M) -> <M as Message>::Result;
}

/// ActorFuture wrapper that enters the span on every poll
#[pin_project]
#[derive(Debug)]
pub struct SpannedActorFuture<F> {
    #[pin]
    inner: F,
    span: Span,
}

impl<F: ActorFuture> SpannedActorFuture<F> {
    pub fn new(inner: F, span: Span) -> Self {
        Self { inner, span }
    }
}

impl<F: ActorFuture> ActorFuture for SpannedActorFuture<F> {
    type Actor = F::Actor;
    type Output = F::Output;

    fn poll(
        self: Pin<&mut Self>,
        actor: &mut Self::Actor,
        ctx: &mut <Self::Actor as Actor>::Context,
        task: &mut Context,
    ) -> Poll<Self::Output> {
        let this = self.project();
        let _enter = this.span.enter();
        this.inner.poll(actor, ctx, task)
    }
}

/// Emits the `SpanHandler` impl from the body, plus the `Handler` impl for
/// the wrapped message that re-enters the captured span.
#[macro_export]
macro_rules! message_handler_with_span {
    (impl SpanHandler<$M:ident> for $A:ident $body:tt) => {
        impl SpanHandler<$M> for $A $body

        impl Handler<$crate::span::SpanMessage<$M>> for $A {
            type Result = ResponseActFuture<Self, <$M as Message>::Result>;

            fn handle(
                &mut self,
                msg: $crate::span::SpanMessage<$M>,
                ctx: &mut Context<Self>,
            ) -> Self::Result {
                let $crate::span::SpanMessage { span, msg } = msg;
                let _enter = span.enter();
                Box::new($crate::span::SpannedActorFuture::new(
                    <Self as SpanHandler<$M>>::handle(self, msg, ctx, span.clone()),
                    span.clone(),
                ))
            }
        }
    };
}

/// Async flavor: the handler body runs as a future instrumented with the
/// sender's span and interops back onto the actor.
#[macro_export]
macro_rules! async_message_handler_with_span {
    (impl AsyncSpanHandler<$M:ident> for $A:ident $body:tt) => {
        #[async_trait::async_trait]
        impl AsyncSpanHandler<$M> for $A $body

        impl Handler<$crate::span::SpanMessage<$M>> for $A {
            type Result = ResponseActFuture<Self, <$M as Message>::Result>;

            fn handle(
                &mut self,
                msg: $crate::span::SpanMessage<$M>,
                _ctx: &mut Context<Self>,
            ) -> Self::Result {
                use actix_interop::FutureInterop;
                use tracing_futures::Instrument;
                let $crate::span::SpanMessage { span, msg } = msg;
                let _enter = span.enter();
                <Self as AsyncSpanHandler<$M>>::handle(msg)
                    .in_current_span()
                    .interop_actor_boxed(self)
            }
        }
    };
}
