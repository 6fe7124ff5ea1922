use actix::prelude::*;
use actix::registry::SystemRegistry;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use crate::services::broadcast::BroadcastActor;
use crate::services::poll::PollEngine;
use crate::store::StoreActor;
use crate::{services, websocket};

async fn ws_route(
    req: HttpRequest,
    stream: web::Payload,
    service_addr: web::Data<Addr<services::Service>>,
) -> Result<HttpResponse, Error> {
    ws::start(
        websocket::WsClient::new(service_addr.get_ref().clone()),
        &req,
        stream,
    )
}

pub fn register_system_actors() {
    SystemRegistry::set(StoreActor::default().start());
    SystemRegistry::set(PollEngine::new().start());
    SystemRegistry::set(BroadcastActor::new().start());
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    let service_addr = services::Service::new().start();
    // websocket
    cfg.data(service_addr)
        .service(web::resource("/ws/").to(ws_route));
}
