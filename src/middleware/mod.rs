pub mod auth_middleware;
pub mod rate_limit;
pub mod request_logger;
