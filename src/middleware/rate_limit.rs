use crate::errors::AppError;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use log::{debug, warn};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    rc::Rc,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

// Idle per-IP buckets are pruned once every this many requests.
const PRUNE_EVERY: u64 = 1024;

/// Per-client-IP token bucket shared by every worker.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    seen: Arc<AtomicU64>,
}

impl RateLimit {
    pub fn new(per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_second(per_second).allow_burst(burst);
        RateLimit {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            seen: Arc::new(AtomicU64::new(0)),
        }
    }
}

// Prefers the forwarded client address, then the socket peer.
fn client_ip(req: &ServiceRequest) -> Option<IpAddr> {
    let forwarded = req
        .connection_info()
        .realip_remote_addr()
        .and_then(|addr| {
            addr.parse::<IpAddr>()
                .ok()
                .or_else(|| addr.parse::<SocketAddr>().ok().map(|s| s.ip()))
        });
    forwarded.or_else(|| req.peer_addr().map(|addr| addr.ip()))
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitMiddleware {
            service: Rc::new(service),
            limit: self.clone(),
        })
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limit: RateLimit,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.limit.seen.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.limit.limiter.retain_recent();
        }

        match client_ip(&req) {
            Some(ip) => {
                if self.limit.limiter.check_key(&ip).is_err() {
                    warn!("[JOBLY-RATE-LIMIT] {} exceeded the request quota on {}", ip, req.path());
                    return Box::pin(async {
                        Err(AppError::too_many_requests("Too many requests").into())
                    });
                }
            }
            None => debug!("No client address for {}; skipping rate limit", req.path()),
        }

        let service = self.service.clone();
        Box::pin(async move { service.call(req).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::status_of;
    use actix_web::{http::StatusCode, test as actix_test, web, App, HttpResponse};

    fn quota(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn from_ip(ip: &str) -> actix_test::TestRequest {
        actix_test::TestRequest::get()
            .uri("/")
            .peer_addr(format!("{}:40000", ip).parse().unwrap())
    }

    #[actix_web::test]
    async fn burst_is_allowed_then_requests_are_throttled() {
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimit::new(quota(1), quota(2)))
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;

        for _ in 0..2 {
            let res = actix_test::try_call_service(&app, from_ip("10.0.0.1").to_request()).await;
            assert_eq!(status_of(res), StatusCode::OK);
        }
        let res = actix_test::try_call_service(&app, from_ip("10.0.0.1").to_request()).await;
        assert_eq!(status_of(res), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn clients_are_limited_independently() {
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimit::new(quota(1), quota(1)))
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let first = actix_test::try_call_service(&app, from_ip("10.0.0.1").to_request()).await;
        assert_eq!(status_of(first), StatusCode::OK);
        let throttled = actix_test::try_call_service(&app, from_ip("10.0.0.1").to_request()).await;
        assert_eq!(status_of(throttled), StatusCode::TOO_MANY_REQUESTS);
        let other = actix_test::try_call_service(&app, from_ip("10.0.0.2").to_request()).await;
        assert_eq!(status_of(other), StatusCode::OK);
    }

    #[actix_web::test]
    async fn forwarded_address_is_the_key() {
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimit::new(quota(1), quota(1)))
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;

        // Same proxy peer, different forwarded clients.
        for client in ["203.0.113.5", "203.0.113.6"] {
            let req = from_ip("10.0.0.9")
                .insert_header(("X-Forwarded-For", client))
                .to_request();
            assert_eq!(status_of(actix_test::try_call_service(&app, req).await), StatusCode::OK);
        }
    }
}
