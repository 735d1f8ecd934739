use crate::errors::AppError;
use crate::handlers::auth::{AuthUser, Claims, TokenError, TokenService};
use actix_web::{
    cookie::{time, Cookie},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue, AUTHORIZATION},
    web, Error, HttpMessage,
};
use futures_util::future::{ok, Ready};
use log::{debug, warn};
use std::{
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

/// Request header carrying the refresh token once the access token has expired.
pub const REFRESH_TOKEN_HEADER: &str = "RefreshToken";

/// Response header carrying a freshly minted access token.
pub const NEW_ACCESS_TOKEN_HEADER: &str = "X-Access-Token";

pub const ACCESS_TOKEN_COOKIE: &str = "token";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Middleware for bearer-token authentication with silent refresh
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct AuthMiddlewareMiddleware<S> {
    pub service: Rc<S>,
}

/// Outcome of checking the credentials on one request.
enum Authenticated {
    Current(Claims),
    /// The access token had expired and was re-issued; the identity comes from
    /// the expired token.
    Refreshed { claims: Claims, access_token: String },
}

fn header_str<'a>(req: &'a ServiceRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}

fn bearer_token(req: &ServiceRequest) -> Result<&str, AppError> {
    let header = header_str(req, AUTHORIZATION.as_str())
        .ok_or_else(|| AppError::unauthorized("Access token not provided"))?;

    match header.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AppError::unauthorized("Invalid access token format")),
    }
}

fn authenticate(req: &ServiceRequest, tokens: &TokenService) -> Result<Authenticated, AppError> {
    let access_token = bearer_token(req)?;

    match tokens.validate(access_token) {
        Ok(claims) => Ok(Authenticated::Current(claims)),
        Err(TokenError::Expired(claims)) => {
            let refresh_token = header_str(req, REFRESH_TOKEN_HEADER)
                .filter(|token| !token.is_empty())
                .ok_or_else(|| AppError::unauthorized("Refresh token not provided"))?;

            let access_token = tokens.refresh(refresh_token).map_err(|e| {
                debug!("Refresh rejected: {}", e);
                AppError::unauthorized("Invalid refresh token")
            })?;

            Ok(Authenticated::Refreshed {
                claims: *claims,
                access_token,
            })
        }
        Err(e) => {
            debug!("Access token rejected: {}", e);
            Err(AppError::unauthorized("Invalid access token"))
        }
    }
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let tokens = req
                .app_data::<web::Data<TokenService>>()
                .cloned()
                .ok_or_else(|| AppError::internal("token service not configured"))?;

            let (claims, refreshed) = match authenticate(&req, &tokens)? {
                Authenticated::Current(claims) => (claims, None),
                Authenticated::Refreshed {
                    claims,
                    access_token,
                } => (claims, Some(access_token)),
            };

            req.extensions_mut().insert(AuthUser::from(claims));

            let mut res = service.call(req).await?;

            if let Some(access_token) = refreshed {
                match HeaderValue::from_str(&access_token) {
                    Ok(value) => {
                        res.headers_mut()
                            .insert(HeaderName::from_static("x-access-token"), value);
                    }
                    Err(e) => warn!("Refreshed token is not a valid header value: {}", e),
                }

                let max_age = time::Duration::seconds(tokens.access_ttl().num_seconds());
                let cookie = Cookie::build(ACCESS_TOKEN_COOKIE, access_token)
                    .path("/")
                    .http_only(true)
                    .max_age(max_age)
                    .finish();
                if let Err(e) = res.response_mut().add_cookie(&cookie) {
                    warn!("Failed to set refreshed token cookie: {}", e);
                }
            }

            Ok(res)
        })
    }
}
