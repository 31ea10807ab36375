//! Axum adapter for the page cache.
//!
//! Hosts install [`page_cache_layer`] with `axum::middleware::from_fn_with_state` and
//! attach a [`StorefrontContext`] to the request extensions before it runs. Handlers
//! may attach an updated context to the response extensions; capture then judges
//! eligibility against that instead.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use bytes::BytesMut;
use futures::stream::{self, StreamExt};
use http_body_util::BodyExt;
use tracing::{debug, instrument, warn};

use super::capture::CaptureOutcome;
use super::context::{RequestContext, StorefrontContext};
use super::orchestrator::{CachedPage, NO_CACHE_HEADERS, PageCache, PreDispatch};

/// Largest rendered body buffered for capture.
pub const MAX_CAPTURE_BYTES: usize = 8 * 1024 * 1024;

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<Arc<PageCache>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let ctx = RequestContext::from_parts(&parts, cache.config().debug_mode);

    if let PreDispatch::Serve(page) = cache.pre_dispatch(&ctx).await {
        return cached_response(page);
    }

    let response = next.run(Request::from_parts(parts, body)).await;
    if !is_capturable(&response) {
        return response;
    }

    let ctx = match response.extensions().get::<StorefrontContext>() {
        Some(rendered) => ctx.with_storefront(rendered),
        None => ctx,
    };
    if !cache.classifier().is_eligible(&ctx) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match buffer_body(body, MAX_CAPTURE_BYTES).await {
        Ok(Buffered::Complete(bytes)) => bytes,
        Ok(Buffered::Oversized(body)) => {
            debug!(cache = "page", "Rendered page exceeds capture limit");
            return Response::from_parts(parts, body);
        }
        Err(err) => {
            warn!(error = %err, "Failed to buffer rendered page, sending it without a body");
            return Response::from_parts(parts, Body::empty());
        }
    };

    if let CaptureOutcome::Stored { key, bytes } = cache.post_render(&ctx, &bytes).await {
        debug!(cache = "page", key = %key, bytes, "Stored rendered page");
    }

    Response::from_parts(parts, Body::from(bytes))
}

enum Buffered {
    Complete(Bytes),
    /// Already-read prefix chained with the unread remainder.
    Oversized(Body),
}

async fn buffer_body(mut body: Body, limit: usize) -> Result<Buffered, axum::Error> {
    let mut buffered = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };
        buffered.extend_from_slice(&data);
        if buffered.len() > limit {
            let head = buffered.freeze();
            let rest = stream::once(async move { Ok::<_, axum::Error>(head) })
                .chain(body.into_data_stream());
            return Ok(Buffered::Oversized(Body::from_stream(rest)));
        }
    }
    Ok(Buffered::Complete(buffered.freeze()))
}

/// Only complete, unencoded HTML pages are captured.
fn is_capturable(response: &Response) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }

    let unencoded = response
        .headers()
        .get(header::CONTENT_ENCODING)
        .is_none_or(|value| {
            value
                .to_str()
                .is_ok_and(|value| value.trim().eq_ignore_ascii_case("identity"))
        });
    if !unencoded {
        return false;
    }

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|value| {
            value
                .to_str()
                .is_ok_and(|value| value.trim_start().starts_with("text/html"))
        })
        .unwrap_or(true);

    let within_limit = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
        .is_none_or(|length| length <= MAX_CAPTURE_BYTES);

    is_html && within_limit
}

fn cached_response(page: CachedPage) -> Response {
    let mut response = Response::new(Body::from(page.body));
    let headers = response.headers_mut();
    for (name, value) in NO_CACHE_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(HTML_CONTENT_TYPE),
    );
    response
}
