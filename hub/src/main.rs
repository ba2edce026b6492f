use std::sync::Arc;
use std::time::Duration;

use bus::{BusAdapter, NoopBus, RedisBus};
use hub::auth::{Auth0Validator, DevBypassValidator, TokenValidator};
use hub::config::AppConfig;
use hub::health;
use hub::hub::Hub;
use reqwest::Method;
use salvo::affix_state;
use salvo::cors::{Any, Cors};
use salvo::prelude::*;
use salvo::websocket::WebSocketUpgrade;
use sfu_client::{GrpcSfuClient, SfuClient};
use tracing::info;

const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[handler]
async fn ws_connect(req: &mut Request, depot: &mut Depot, res: &mut Response) -> Result<(), StatusError> {
    let room_id = req
        .param::<String>("room_id")
        .ok_or_else(StatusError::bad_request)?;
    let token = req
        .query::<String>("token")
        .ok_or_else(StatusError::unauthorized)?;
    let display_name = req
        .query::<String>("display_name")
        .unwrap_or_else(|| "Guest".to_string());
    let target_lang = req.query::<String>("target_lang");

    let validator = depot.obtain::<Arc<dyn TokenValidator>>().unwrap().clone();
    let hub = depot.obtain::<Arc<Hub>>().unwrap().clone();

    let client_id = validator
        .validate(&token)
        .await
        .map_err(|_| StatusError::unauthorized())?;

    WebSocketUpgrade::new()
        .upgrade(req, res, move |ws| async move {
            hub.serve_ws(room_id, ws, client_id, display_name, target_lang).await;
        })
        .await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::new();

    let bus: Arc<dyn BusAdapter> = if config.redis.enabled {
        Arc::new(
            RedisBus::connect(&config.redis.addr, config.redis.password.as_deref())
                .await
                .expect("failed to connect to redis bus"),
        )
    } else {
        Arc::new(NoopBus)
    };

    let sfu: Arc<dyn SfuClient> = Arc::new(
        GrpcSfuClient::connect(config.sfu_addr.clone())
            .await
            .expect("failed to connect to SFU"),
    );

    let validator: Arc<dyn TokenValidator> = if config.auth.skip_auth {
        Arc::new(DevBypassValidator)
    } else {
        Arc::new(Auth0Validator::new(&config.auth))
    };

    let hub = Hub::new(bus, sfu, config.summary_service_addr.clone());

    let cors = Cors::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET])
        .allow_headers(vec!["Authorization", "Content-Type"])
        .into_handler();

    let ws_router = Router::with_path("ws/hub/{room_id}").get(ws_connect);
    let health_router = Router::with_path("health")
        .push(Router::with_path("live").get(health::live))
        .push(Router::with_path("ready").get(health::ready));

    let router = Router::new()
        .hoop(Logger::new())
        .hoop(affix_state::inject(hub.clone()))
        .hoop(affix_state::inject(validator))
        .hoop(CatchPanic::new())
        .push(ws_router)
        .push(health_router);

    let service = Service::new(router).hoop(cors);

    let http_addr = format!("0.0.0.0:{}", config.app_port);
    let acceptor = TcpListener::new(&http_addr).bind().await;
    let server = Server::new(acceptor);
    let handle = server.handle();

    let shutdown_hub = hub.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("signal received, shutting down gracefully");
        handle.stop_graceful(Some(GRACEFUL_SHUTDOWN_TIMEOUT));
        shutdown_hub.shutdown(GRACEFUL_SHUTDOWN_TIMEOUT).await;
    });

    info!(addr = %http_addr, "hub listening");
    server.serve(service).await;

    Ok(())
}
