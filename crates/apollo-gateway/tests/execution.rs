use crate::fixtures::alice;
use crate::fixtures::gateway;
use crate::fixtures::pretty;
use crate::fixtures::run;
use crate::fixtures::Admin;
use crate::fixtures::Suspended;
use apollo_gateway::Context;
use apollo_gateway::ExecutionConfig;
use apollo_gateway::ExecutionRequest;
use apollo_gateway::GatewayConfig;
use apollo_gateway::PathElement;
use expect_test::expect;
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test]
async fn resolves_nested_selections() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let response = run(
        &gateway,
        "{ viewer { name team { name members { id } } } }",
        &alice(),
    )
    .await;
    expect![[r#"
        {
          "data": {
            "viewer": {
              "name": "Alice",
              "team": {
                "name": "Core",
                "members": [
                  {
                    "id": "u1"
                  },
                  {
                    "id": "u2"
                  }
                ]
              }
            }
          }
        }"#]]
    .assert_eq(&pretty(&response));
}

#[tokio::test]
async fn failing_sibling_does_not_affect_the_other() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let response = run(&gateway, "{ failing viewer { name } }", &alice()).await;
    expect![[r#"
        {
          "errors": [
            {
              "message": "boom",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "failing"
              ],
              "extensions": {
                "code": "BOOM"
              }
            }
          ],
          "data": {
            "failing": null,
            "viewer": {
              "name": "Alice"
            }
          }
        }"#]]
    .assert_eq(&pretty(&response));
}

#[tokio::test]
async fn non_null_failure_nulls_the_nearest_nullable_parent() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let response = run(&gateway, "{ viewer { id strict } }", &alice()).await;
    expect![[r#"
        {
          "errors": [
            {
              "message": "strict is never available",
              "locations": [
                {
                  "line": 1,
                  "column": 15
                }
              ],
              "path": [
                "viewer",
                "strict"
              ]
            }
          ],
          "data": {
            "viewer": null
          }
        }"#]]
    .assert_eq(&pretty(&response));
}

#[tokio::test]
async fn non_null_root_failure_nulls_data() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let response = run(&gateway, "{ requiredFailing viewer { id } }", &alice()).await;
    expect![[r#"
        {
          "errors": [
            {
              "message": "required boom",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "requiredFailing"
              ]
            }
          ],
          "data": null
        }"#]]
    .assert_eq(&pretty(&response));
}

#[tokio::test]
async fn list_items_are_nullified_individually() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let response = run(&gateway, "{ numbers maybeNumbers }", &Context::new()).await;
    expect![[r#"
        {
          "errors": [
            {
              "message": "resolver returned \"two\", expected Int",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "numbers",
                1
              ]
            },
            {
              "message": "unlucky",
              "locations": [
                {
                  "line": 1,
                  "column": 11
                }
              ],
              "path": [
                "maybeNumbers",
                1
              ]
            }
          ],
          "data": {
            "numbers": null,
            "maybeNumbers": [
              1,
              null,
              3
            ]
          }
        }"#]]
    .assert_eq(&pretty(&response));
}

#[tokio::test]
async fn abstract_types_and_typename() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let query = r#"{
        __typename
        user: node(id: "u2") { __typename id ... on User { name } }
        team: node(id: "t1") { __typename ... on Team { name } }
    }"#;
    let response = run(&gateway, query, &Context::new()).await;
    expect![[r#"
        {
          "data": {
            "__typename": "Query",
            "user": {
              "__typename": "User",
              "id": "u2",
              "name": "Bob"
            },
            "team": {
              "__typename": "Team",
              "name": "Core"
            }
          }
        }"#]]
    .assert_eq(&pretty(&response));
}

#[tokio::test]
async fn introspection_is_disabled() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let response = run(&gateway, "{ __schema { queryType { name } } }", &Context::new()).await;
    expect![[r#"
        {
          "errors": [
            {
              "message": "schema introspection is disabled",
              "locations": [
                {
                  "line": 1,
                  "column": 3
                }
              ],
              "path": [
                "__schema"
              ]
            }
          ],
          "data": null
        }"#]]
    .assert_eq(&pretty(&response));
}

#[tokio::test]
async fn skip_and_include() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let response = gateway
        .execute(
            &apollo_gateway::ExecutionRequest::query(
                "query ($skip: Boolean!) { viewer { id @skip(if: $skip) name @include(if: false) email } }",
            )
            .with_variable("skip", true),
            &alice(),
        )
        .await;
    assert_eq!(
        serde_json::to_string(&response).unwrap(),
        r#"{"data":{"viewer":{"email":"alice@example.com"}}}"#
    );
}

#[tokio::test]
async fn authorization_applies_on_every_path() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let query = "{ viewer { secret { value } } secrets { value } }";

    let response = run(&gateway, query, &alice()).await;
    expect![[r#"
        {
          "errors": [
            {
              "message": "not authorized",
              "locations": [
                {
                  "line": 1,
                  "column": 12
                }
              ],
              "path": [
                "viewer",
                "secret"
              ],
              "extensions": {
                "code": "FORBIDDEN"
              }
            },
            {
              "message": "not authorized",
              "locations": [
                {
                  "line": 1,
                  "column": 31
                }
              ],
              "path": [
                "secrets",
                0
              ],
              "extensions": {
                "code": "FORBIDDEN"
              }
            }
          ],
          "data": {
            "viewer": {
              "secret": null
            },
            "secrets": null
          }
        }"#]]
    .assert_eq(&pretty(&response));

    let response = run(&gateway, query, &alice().with(Admin)).await;
    expect![[r#"
        {
          "data": {
            "viewer": {
              "secret": {
                "value": "Alice likes tea"
              }
            },
            "secrets": [
              {
                "value": "first"
              },
              {
                "value": "second"
              }
            ]
          }
        }"#]]
    .assert_eq(&pretty(&response));
}

#[tokio::test(start_paused = true)]
async fn slow_resolvers_time_out() {
    let config = GatewayConfig {
        execution: ExecutionConfig {
            resolver_timeout_ms: Some(100),
            ..ExecutionConfig::default()
        },
        ..GatewayConfig::default()
    };
    let (gateway, _) = gateway(config);
    let response = run(
        &gateway,
        "{ slow: sleep(ms: 1000) fast: sleep(ms: 10) }",
        &Context::new(),
    )
    .await;
    assert_eq!(response.errors.len(), 1);
    let error = &response.errors[0];
    assert_eq!(error.code(), Some("TIMEOUT"));
    assert_eq!(error.message, "resolver timed out after 100ms");
    assert_eq!(error.path, [PathElement::Field(apollo_compiler_name("slow"))]);
    assert_eq!(
        serde_json::to_string(&response.data).unwrap(),
        r#"{"slow":null,"fast":10}"#
    );
}

fn apollo_compiler_name(name: &str) -> apollo_compiler::Name {
    apollo_compiler::Name::new(name).unwrap()
}

#[tokio::test(start_paused = true)]
async fn siblings_run_concurrently_up_to_the_limit() {
    let query = "{ a: sleep(ms: 50) b: sleep(ms: 50) c: sleep(ms: 50) }";

    let (gateway, _) = gateway(GatewayConfig::default());
    let start = tokio::time::Instant::now();
    let response = run(&gateway, query, &Context::new()).await;
    assert!(response.errors.is_empty());
    assert!(start.elapsed() < Duration::from_millis(100));

    let config = GatewayConfig {
        execution: ExecutionConfig {
            max_concurrent_fields: 1,
            ..ExecutionConfig::default()
        },
        ..GatewayConfig::default()
    };
    let (gateway, _) = self::gateway(config);
    let start = tokio::time::Instant::now();
    let response = run(&gateway, query, &Context::new()).await;
    assert!(response.errors.is_empty());
    assert!(start.elapsed() >= Duration::from_millis(150));
    // Response order follows the query, not completion order
    assert_eq!(
        serde_json::to_string(&response.data).unwrap(),
        r#"{"a":50,"b":50,"c":50}"#
    );
}

#[tokio::test]
async fn internal_errors_fail_the_whole_request() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let response = run(&gateway, "{ crash viewer { id } }", &alice()).await;
    assert!(response.is_request_error());
    expect![[r#"{"errors":[{"message":"internal server error","extensions":{"code":"INTERNAL_SERVER_ERROR"}}]}"#]]
        .assert_eq(&serde_json::to_string(&response).unwrap());
}

#[tokio::test]
async fn integer_ids_are_coerced_to_strings() {
    let (gateway, _) = gateway(GatewayConfig::default());
    let response = run(&gateway, "{ user(id: 7) { id name } }", &Context::new()).await;
    assert_eq!(
        serde_json::to_string(&response).unwrap(),
        r#"{"data":{"user":{"id":"7","name":"Carol"}}}"#
    );

    let request = ExecutionRequest::query("query($id: ID!) { user(id: $id) { name } }")
        .with_variable("id", 7);
    let response = gateway.execute(&request, &Context::new()).await;
    assert_eq!(
        serde_json::to_string(&response).unwrap(),
        r#"{"data":{"user":{"name":"Carol"}}}"#
    );
}

#[tokio::test]
async fn the_query_root_is_authorized_on_every_path() {
    let (gateway, store) = gateway(GatewayConfig::default());
    let suspended = alice().with(Suspended);

    let response = run(&gateway, "{ viewer { id } }", &suspended).await;
    assert_eq!(response.data, Some(apollo_gateway::JsonValue::Null));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].code(), Some("FORBIDDEN"));
    assert!(response.errors[0].path.is_empty());

    let response = run(
        &gateway,
        r#"mutation { appendLog(input: { entry: "x" }) { query { viewer { id } } } }"#,
        &suspended,
    )
    .await;
    assert_eq!(response.data, Some(apollo_gateway::JsonValue::Null));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].code(), Some("FORBIDDEN"));
    assert_eq!(
        response.errors[0].path,
        [
            PathElement::Field(apollo_compiler_name("appendLog")),
            PathElement::Field(apollo_compiler_name("query")),
        ]
    );
    assert_eq!(store.log(), ["x"]);

    let response = run(&gateway, "{ viewer { id } }", &alice()).await;
    assert_eq!(
        serde_json::to_string(&response).unwrap(),
        r#"{"data":{"viewer":{"id":"u1"}}}"#
    );
}
