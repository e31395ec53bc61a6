use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use tracing::info;

use splitex::config::ServerConfig;
use splitex::logging::init_tracing;
use splitex::server::store::Store;
use splitex::server::{routes, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    init_tracing("info,splitex=debug");

    let config = ServerConfig::from_env().expect("invalid server configuration");
    let store = Store::connect(&config).await.expect("failed to connect");
    store.ensure_indexes().await.expect("failed to create indexes");
    info!(database = %config.database, "connected to MongoDB");

    let state = web::Data::new(AppState::new(store, &config));
    let origins = config.allowed_origins.clone();

    info!(address = %config.bind_address, port = config.port, "starting server");
    HttpServer::new(move || {
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
            .supports_credentials();
        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}
