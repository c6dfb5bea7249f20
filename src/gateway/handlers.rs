//! File API handlers
//!
//! Every request walks the same path: parse the route, authorize, (stream the
//! body), run the transfer call on the offloader, emit. Errors at any step
//! surface as a [`GatewayError`] and are turned into a response by actix.

use crate::app_state::AppState;
use crate::auth::Verb;
use crate::error::GatewayError;
use crate::gateway::context::RequestContext;
use crate::gateway::response::{self, RetrievedPayload};
use crate::gateway::route::FileRoute;
use crate::transfer::StorageObject;
use crate::usage::UsageEvent;
use actix_web::http::header::{AUTHORIZATION, IF_NONE_MATCH};
use actix_web::{web, HttpRequest, HttpResponse};
use futures::StreamExt;
use log::{debug, info};

/// Route, verb and credential from the request, then the authorizer's answer.
async fn open_context(req: &HttpRequest, state: &AppState) -> Result<RequestContext, GatewayError> {
    let route = FileRoute::from_request(req)?;
    let verb = Verb::from_method(req.method())
        .ok_or_else(|| GatewayError::Routing(format!("unsupported method {}", req.method())))?;
    let credential = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut ctx = RequestContext::new(route, verb, credential);
    let granted = match &state.authorizer {
        Some(authorizer) => {
            authorizer
                .authorize(ctx.auth_token(), ctx.prefix(), ctx.path(), verb)
                .await
        }
        None => true,
    };
    debug!("{} {}/{} authorized: {}", verb, ctx.prefix(), ctx.path(), granted);
    ctx.resolve_auth(granted, &state.upload_dir())?;
    Ok(ctx)
}

/// `If-None-Match` without quotes or weak marker; `*` and empty values are ignored
fn conditional_etag(req: &HttpRequest) -> Option<String> {
    let raw = req.headers().get(IF_NONE_MATCH)?.to_str().ok()?.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    let etag = raw.trim_matches('"');
    if etag.is_empty() || etag == "*" {
        None
    } else {
        Some(etag.to_string())
    }
}

/// POST /api/v0/files/{prefix}/{path}
pub async fn post_file(
    req: HttpRequest,
    mut payload: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let mut ctx = open_context(&req, &state).await?;
    let limit = state.config.server.max_payload_size;

    while let Some(chunk) = payload.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                ctx.reject();
                return Err(GatewayError::Payload(e.to_string()));
            }
        };
        if ctx.staged_bytes() + chunk.len() as u64 > limit {
            ctx.reject();
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        ctx.accept_chunk(&chunk).await?;
    }
    let staged = ctx.complete_body().await?;
    ctx.begin_backend_call()?;

    let object = StorageObject::for_store(ctx.prefix(), ctx.path(), staged.path());
    let transfer = state.transfer.clone();
    // The staged file moves with the call and is removed once the backend is done with it
    let receipt = state
        .offloader
        .run(move || {
            let receipt = transfer.store(&object);
            drop(staged);
            receipt
        })
        .await?;

    ctx.begin_response()?;
    info!("Stored {}/{} ({} bytes, etag {})", ctx.prefix(), ctx.path(), receipt.size, receipt.etag);
    state.usage.report(ctx.auth_token(), UsageEvent::stored(ctx.prefix(), ctx.path(), &receipt));
    let resp = response::stored(&receipt);
    ctx.finish()?;
    Ok(resp)
}

/// GET /api/v0/files/{prefix}/{path}
pub async fn get_file(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, GatewayError> {
    let mut ctx = open_context(&req, &state).await?;
    ctx.begin_backend_call()?;

    let object = StorageObject::for_retrieve(ctx.prefix(), ctx.path(), conditional_etag(&req));
    let transfer = state.transfer.clone();
    let retrieved = state
        .offloader
        .run(move || Ok(transfer.retrieve(&object)?.map(RetrievedPayload::from_receipt).transpose()?))
        .await?;
    let Some(retrieved) = retrieved else {
        ctx.reject();
        return Err(GatewayError::NotFound);
    };

    ctx.begin_response()?;
    let resp = if retrieved.is_unchanged() {
        debug!("{}/{} not modified", ctx.prefix(), ctx.path());
        response::not_modified(&retrieved.etag)
    } else {
        let size = retrieved.size;
        let resp = response::payload(retrieved).await.map_err(GatewayError::Staging)?;
        state.usage.report(ctx.auth_token(), UsageEvent::served(ctx.prefix(), ctx.path(), size));
        resp
    };
    ctx.finish()?;
    Ok(resp)
}

/// DELETE /api/v0/files/{prefix}/{path}
pub async fn delete_file(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, GatewayError> {
    let mut ctx = open_context(&req, &state).await?;
    ctx.begin_backend_call()?;

    let object = StorageObject::for_delete(ctx.prefix(), ctx.path());
    let transfer = state.transfer.clone();
    let freed = state.offloader.run(move || transfer.delete(&object)).await?;

    ctx.begin_response()?;
    match freed {
        Some(freed) => {
            info!("Deleted {}/{} ({} bytes)", ctx.prefix(), ctx.path(), freed);
            state.usage.report(ctx.auth_token(), UsageEvent::deleted(ctx.prefix(), ctx.path(), freed));
        }
        None => debug!("Nothing stored under {}/{}", ctx.prefix(), ctx.path()),
    }
    ctx.finish()?;
    Ok(response::deleted())
}

/// GET /health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Anything under the files root that is not `{prefix}/{path}`
pub async fn reject_route(req: HttpRequest) -> Result<HttpResponse, GatewayError> {
    Err(GatewayError::Routing(req.path().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_conditional_etag_normalization() {
        let cases = [
            ("abc", Some("abc")),
            ("\"abc\"", Some("abc")),
            ("W/\"abc\"", Some("abc")),
            ("  abc  ", Some("abc")),
            ("*", None),
            ("\"\"", None),
        ];
        for (header, expected) in cases {
            let req = TestRequest::default()
                .insert_header((IF_NONE_MATCH, header))
                .to_http_request();
            assert_eq!(conditional_etag(&req).as_deref(), expected, "header {:?}", header);
        }
        assert_eq!(conditional_etag(&TestRequest::default().to_http_request()), None);
    }
}
