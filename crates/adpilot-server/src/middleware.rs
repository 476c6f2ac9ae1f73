use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Request correlation id, stored as a request extension and echoed in
/// every response envelope.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// A caller-supplied id is kept when it is short printable ASCII; anything
/// else is replaced so it cannot pollute logs.
fn caller_request_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    let acceptable = !raw.is_empty()
        && raw.len() <= MAX_REQUEST_ID_LEN
        && raw.bytes().all(|b| b.is_ascii_graphic());
    acceptable.then(|| raw.to_string())
}

/// Tags the request with a [`RequestId`] and runs the rest of the stack
/// inside a span carrying it.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = caller_request_id(req.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::info_span!("request", request_id = %id);
    let mut res = next.run(req).instrument(span).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn caller_id_is_kept() {
        assert_eq!(
            caller_request_id(&headers_with("run-42")).as_deref(),
            Some("run-42")
        );
    }

    #[test]
    fn missing_or_blank_id_is_replaced() {
        assert!(caller_request_id(&HeaderMap::new()).is_none());
        assert!(caller_request_id(&headers_with("   ")).is_none());
    }

    #[test]
    fn oversized_or_spaced_id_is_replaced() {
        assert!(caller_request_id(&headers_with(&"a".repeat(129))).is_none());
        assert!(caller_request_id(&headers_with("two words")).is_none());
    }
}
