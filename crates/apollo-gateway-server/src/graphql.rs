use crate::AppState;
use apollo_gateway::Context;
use apollo_gateway::Gateway;
use apollo_gateway::Response as GraphQLResponse;
use axum::body::Bytes;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::http::header;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use futures::SinkExt;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;

/// Sent when a response cannot be serialized
const INTERNAL_FAILURE_BODY: &str =
    r#"{"errors":[{"message":"internal server error","extensions":{"code":"INTERNAL_SERVER_ERROR"}}]}"#;

pub(crate) async fn post_graphql(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected `Content-Type: application/json`",
        )
            .into_response();
    }
    let context = state.extractor.extract(&headers);
    match state.gateway.execute_json(&body, &context).await {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(malformed) => {
            let status =
                StatusCode::from_u16(malformed.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
            json_response(status, &malformed.to_response())
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn json_response(status: StatusCode, response: &GraphQLResponse) -> Response {
    let json = HeaderValue::from_static("application/json");
    match response.to_json() {
        Ok(body) => (status, [(header::CONTENT_TYPE, json)], body).into_response(),
        Err(error) => {
            tracing::error!(%error, "failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, json)],
                INTERNAL_FAILURE_BODY,
            )
                .into_response()
        }
    }
}

/// The context is extracted once, from the headers of the upgrade request
pub(crate) async fn upgrade_websocket(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let context = state.extractor.extract(&headers);
    upgrade.on_upgrade(move |socket| serve_socket(socket, state.gateway, context))
}

/// One envelope per incoming frame, one response per outgoing frame, in order.
///
/// The socket keeps being read while a request runs:
/// frames are queued and a close drops the in-flight execution.
async fn serve_socket(socket: WebSocket, gateway: Arc<Gateway>, context: Context) {
    let (mut sender, mut receiver) = socket.split();
    let mut pending = VecDeque::new();
    loop {
        let message = match pending.pop_front() {
            Some(message) => message,
            None => match receiver.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => {
                    tracing::debug!(%error, "websocket receive failed");
                    return;
                }
                None => return,
            },
        };
        let frame = match message {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bytes) => bytes,
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return,
        };
        let execution = respond_to_frame(&gateway, &frame, &context);
        tokio::pin!(execution);
        let reply = loop {
            tokio::select! {
                reply = &mut execution => break reply,
                message = receiver.next() => match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        tracing::debug!("websocket closed, cancelling in-flight request");
                        return;
                    }
                    Some(Ok(message)) => pending.push_back(message),
                },
            }
        };
        if let Err(error) = sender.send(Message::Text(reply)).await {
            tracing::debug!(%error, "websocket send failed");
            return;
        }
    }
}

/// Malformed envelopes get an error frame instead of a status code
pub(crate) async fn respond_to_frame(gateway: &Gateway, frame: &[u8], context: &Context) -> String {
    let response = match gateway.execute_json(frame, context).await {
        Ok(response) => response,
        Err(malformed) => malformed.to_response(),
    };
    serde_json::to_string(&response).unwrap_or_else(|error| {
        tracing::error!(%error, "failed to serialize response");
        INTERNAL_FAILURE_BODY.to_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts;
    use pretty_assertions::assert_eq;

    #[test]
    fn content_type_parameters_are_ignored() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        assert!(is_json(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json(&headers));
    }

    #[tokio::test]
    async fn frames() {
        let gateway = accounts::gateway(Default::default()).unwrap();
        let context = accounts::viewer_context("1");

        let reply = respond_to_frame(&gateway, br#"{"query": "{ viewer { name } }"}"#, &context).await;
        assert_eq!(reply, r#"{"data":{"viewer":{"name":"Ada"}}}"#);

        let reply = respond_to_frame(&gateway, b"not json", &context).await;
        assert!(reply.contains(r#""code":"MALFORMED_REQUEST""#), "{reply}");
        assert!(!reply.contains(r#""data""#), "{reply}");
    }
}
