use std::sync::Arc;

use salvo::prelude::*;

use crate::auth::TokenValidator;
use crate::hub::Hub;

/// Liveness: the process is up and serving requests at all. Always 200
/// once the server has bound its listener.
#[endpoint]
pub async fn live() -> &'static str {
    "ok"
}

/// Readiness: safe to route traffic here. Ready iff the token validator
/// has finished its own startup and, when the bus is enabled, its circuit
/// breaker isn't open — an open breaker means this instance can't see
/// other instances' rosters, so it shouldn't claim to serve new joins.
#[handler]
pub async fn ready(depot: &mut Depot, res: &mut Response) {
    let hub = depot.obtain::<Arc<Hub>>().expect("Hub missing from depot");
    let validator = depot
        .obtain::<Arc<dyn TokenValidator>>()
        .expect("TokenValidator missing from depot");

    if !validator.is_ready() {
        res.status_code(StatusCode::SERVICE_UNAVAILABLE);
        res.render("auth validator not ready");
        return;
    }

    if hub.bus_breaker_open() {
        res.status_code(StatusCode::SERVICE_UNAVAILABLE);
        res.render("bus unavailable");
        return;
    }

    res.render("ok");
}
