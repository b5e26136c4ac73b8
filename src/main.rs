use std::{sync::Arc, time::Duration};

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use exam_portal::{
    app_state::AppState,
    config::Config,
    handlers::{api_routes, public_routes},
    middleware::RequestIdMiddleware,
    services::attempt_sweeper,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();
    if std::env::var("APP_ENV").as_deref() == Ok("production") {
        config.validate_for_production();
    }
    let host = config.web_server_host.clone();
    let port = config.web_server_port;
    let sweep_interval = Duration::from_secs(config.auto_submit_interval_secs.max(1));

    let state = AppState::new(config)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let state = Arc::new(state);
    let jwt_service = state.jwt_service.clone();

    let sweeper = attempt_sweeper::spawn(state.attempt_service.clone(), sweep_interval);

    log::info!("starting HTTP server on {}:{}", host, port);
    let result = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(jwt_service.clone()))
            .wrap(Cors::default().allow_any_origin().allow_any_method().allow_any_header())
            .wrap(Logger::default())
            .wrap(RequestIdMiddleware)
            .configure(public_routes)
            .configure(api_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await;

    sweeper.abort();
    result
}
