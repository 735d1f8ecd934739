use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use log::{error, info, warn};
use std::{rc::Rc, time::Instant};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identifier assigned to each request, also echoed back in `X-Request-ID`.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

// Request logger middleware
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestLoggerMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
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
        let start_time = Instant::now();
        let method = req.method().clone();
        let path = req.path().to_owned();
        let client_ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_owned();

        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        req.extensions_mut().insert(RequestId(request_id.clone()));

        info!("[JOBLY-REQUEST] {} {} {} from {}", request_id, method, path, client_ip);

        let service = self.service.clone();
        Box::pin(async move {
            let res = service.call(req).await;
            let elapsed = start_time.elapsed();

            match res {
                Ok(mut response) => {
                    let status = response.status();
                    if status.is_server_error() {
                        warn!(
                            "[JOBLY-RESPONSE] {} {} {} -> {} in {:.2?}",
                            request_id, method, path, status.as_u16(), elapsed
                        );
                    } else {
                        info!(
                            "[JOBLY-RESPONSE] {} {} {} -> {} in {:.2?}",
                            request_id, method, path, status.as_u16(), elapsed
                        );
                    }
                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }
                    Ok(response)
                }
                Err(err) => {
                    error!(
                        "[JOBLY-ERROR] {} {} {} -> {} in {:.2?}",
                        request_id, method, path, err, elapsed
                    );
                    Err(err)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpRequest, HttpResponse};

    async fn echo_id(req: HttpRequest) -> HttpResponse {
        let id = req
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default();
        HttpResponse::Ok().body(id)
    }

    #[actix_web::test]
    async fn assigns_and_echoes_a_request_id() {
        let app = test::init_service(
            App::new().wrap(RequestLogger).route("/", web::get().to(echo_id)),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let header = res
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .unwrap();
        let body = test::read_body(res).await;
        assert_eq!(body, header.as_bytes());
        assert!(Uuid::parse_str(&header).is_ok());
    }

    #[actix_web::test]
    async fn keeps_a_caller_supplied_request_id() {
        let app = test::init_service(
            App::new().wrap(RequestLogger).route("/", web::get().to(echo_id)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header((REQUEST_ID_HEADER, "abc-123"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.headers().get(REQUEST_ID_HEADER).unwrap(), "abc-123");
    }
}
