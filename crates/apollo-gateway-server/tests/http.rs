use crate::json_request;
use crate::send;
use crate::state;
use apollo_gateway::GatewayConfig;
use apollo_gateway::RegistryMode;
use apollo_gateway_server::router;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use expect_test::expect;
use pretty_assertions::assert_eq;

fn app() -> axum::Router {
    router(state(GatewayConfig::default()))
}

#[tokio::test]
async fn viewer_comes_from_headers() {
    let app = app();
    let query = r#"{"query": "{ viewer { name email } }"}"#;

    let mut request = json_request("POST", "/graphql", query);
    request
        .headers_mut()
        .insert("x-user-id", "2".parse().unwrap());
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        r#"{"data":{"viewer":{"name":"Grace","email":"grace@example.com"}}}"#
    );

    let (status, body) = send(&app, json_request("POST", "/graphql", query)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"data":{"viewer":null}}"#);
}

#[tokio::test]
async fn graphql_errors_are_ok_responses() {
    let (status, body) = send(
        &app(),
        json_request("POST", "/graphql", r#"{"query": "{ viewer { age } }"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("GRAPHQL_VALIDATION_FAILED"), "{body}");
    assert!(!body.contains(r#""data""#), "{body}");
}

#[tokio::test]
async fn malformed_envelopes_are_bad_requests() {
    let (status, body) = send(
        &app(),
        json_request("POST", "/graphql", r#"{"query": "{ users { id } }", "id": "abc"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    expect![[r#"{"errors":[{"message":"request must not contain both `query` and `id`","extensions":{"code":"MALFORMED_REQUEST"}}]}"#]]
        .assert_eq(&body);
}

#[tokio::test]
async fn content_type_and_method() {
    let request = Request::builder()
        .method("POST")
        .uri("/graphql")
        .header("content-type", "text/plain")
        .body(Body::from("{ users { id } }"))
        .unwrap();
    let (status, _) = send(&app(), request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let request = Request::builder()
        .method("PUT")
        .uri("/graphql")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app(), request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn mutations_over_http() {
    let app = app();
    let mutation = r#"{
        "query": "mutation ($input: CreateUserInput!) { createUser(input: $input) { result { __typename ... on MutationError { code } } query { users { name } } } }",
        "variables": {"input": {"name": "Edsger", "email": "edsger@example.com"}}
    }"#;

    let (status, body) = send(&app, json_request("POST", "/graphql", mutation)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        r#"{"data":{"createUser":{"result":{"__typename":"CreateUserSuccess"},"query":{"users":[{"name":"Ada"},{"name":"Grace"},{"name":"Edsger"}]}}}}"#
    );

    let (status, body) = send(&app, json_request("POST", "/graphql", mutation)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        r#"{"data":{"createUser":{"result":{"__typename":"EmailTakenError","code":"EMAIL_TAKEN"},"query":{"users":[{"name":"Ada"},{"name":"Grace"},{"name":"Edsger"}]}}}}"#
    );
}

#[tokio::test]
async fn whitelist_refuses_query_text() {
    let app = router(state(GatewayConfig {
        registry_mode: RegistryMode::Whitelist,
        ..GatewayConfig::default()
    }));
    let (status, body) = send(
        &app,
        json_request("POST", "/graphql", r#"{"query": "{ users { id } }"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("PERSISTED_QUERY_REQUIRED"), "{body}");
}
