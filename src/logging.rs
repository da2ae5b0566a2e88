/*!
Request logging for the tide app, written through our slog logger
instead of tide's own `log` based middleware.
*/
use std::time::Instant;

use crate::LOG;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logs method, path, status and timing of every request and tags
/// the response with a generated request id.
#[derive(Debug, Default, Clone)]
pub struct LogMiddleware {
    _priv: (),
}

impl LogMiddleware {
    pub fn new() -> Self {
        Self { _priv: () }
    }
}

#[async_trait::async_trait]
impl<State: Clone + Send + Sync + 'static> tide::Middleware<State> for LogMiddleware {
    async fn handle(&self, req: tide::Request<State>, next: tide::Next<'_, State>) -> tide::Result {
        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let method = req.method().to_string();
        let path = req.url().path().to_string();

        let mut resp = next.run(req).await;

        let status = resp.status() as u16;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if let Some(err) = resp.error() {
            slog::error!(
                LOG, "request error";
                "request_id" => &request_id,
                "method" => &method,
                "path" => &path,
                "status" => status,
                "error" => %err,
            );
        }
        if status >= 500 {
            slog::warn!(
                LOG, "request";
                "request_id" => &request_id,
                "method" => &method,
                "path" => &path,
                "status" => status,
                "elapsed_ms" => elapsed_ms,
            );
        } else {
            slog::info!(
                LOG, "request";
                "request_id" => &request_id,
                "method" => &method,
                "path" => &path,
                "status" => status,
                "elapsed_ms" => elapsed_ms,
            );
        }
        resp.insert_header(REQUEST_ID_HEADER, request_id.as_str());
        Ok(resp)
    }
}
