use actix_web::{App, HttpServer};
use classpoll_server::{log, server};
use color_eyre::eyre::Report;
use dotenv::dotenv;
use std::env;
use tracing::info;

#[actix_rt::main]
async fn main() -> Result<(), Report> {
    dotenv().ok();
    log::init()?;

    server::register_system_actors();

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_owned());
    let address = format!("127.0.0.1:{}", port);
    info!("Starting WS server on {}", address);

    HttpServer::new(move || App::new().configure(server::configure))
        .bind(&address)?
        .run()
        .await?;
    Ok(())
}
