//! # Request Logging Middleware
//!
//! One structured log line per finished request: method, path, status and
//! duration. Requests that run long get a warning - for this service that
//! usually means a synchronous transcription of a long recording, which the
//! caller should be running in streaming mode instead.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{debug, info, warn};

/// Above this, a completed request is logged as a warning.
const SLOW_REQUEST_MS: u128 = 5_000;

pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();

        debug!(method = %method, path = %path, "Request started");

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis();

            match &result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if duration_ms > SLOW_REQUEST_MS {
                        warn!(
                            method = %method,
                            path = %path,
                            status = %status,
                            duration_ms = %duration_ms,
                            "Slow request"
                        );
                    } else {
                        info!(
                            method = %method,
                            path = %path,
                            status = %status,
                            duration_ms = %duration_ms,
                            "Request completed"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        method = %method,
                        path = %path,
                        duration_ms = %duration_ms,
                        error = %err,
                        "Request failed"
                    );
                }
            }

            result
        })
    }
}
