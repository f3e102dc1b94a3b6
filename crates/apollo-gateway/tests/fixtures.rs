//! A small accounts service shared by the integration tests

use apollo_gateway::impl_resolver;
use apollo_gateway::BusinessFailure;
use apollo_gateway::Context;
use apollo_gateway::ExecutionRequest;
use apollo_gateway::FailureDef;
use apollo_gateway::FieldDef;
use apollo_gateway::FieldError;
use apollo_gateway::Gateway;
use apollo_gateway::GatewayConfig;
use apollo_gateway::GatewaySchema;
use apollo_gateway::InterfaceDef;
use apollo_gateway::JsonMap;
use apollo_gateway::JsonValue;
use apollo_gateway::MutationDef;
use apollo_gateway::MutationFailure;
use apollo_gateway::MutationResolver;
use apollo_gateway::ObjectDef;
use apollo_gateway::ObjectValue;
use apollo_gateway::ResolvedValue;
use apollo_gateway::Response;
use futures::future::BoxFuture;
use futures::stream;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// Context value: the authenticated user
pub struct Viewer(pub String);

/// Context value: grants access to `Secret` objects
pub struct Admin;

/// Context value: denies access to the `Query` root object
pub struct Suspended;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub team: Option<String>,
}

pub struct Store {
    users: Mutex<Vec<UserRecord>>,
    log: Mutex<Vec<String>>,
}

impl Store {
    pub fn new() -> Self {
        let user = |id: &str, name: &str, email: &str| UserRecord {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            team: Some("t1".into()),
        };
        Self {
            users: Mutex::new(vec![
                user("u1", "Alice", "alice@example.com"),
                user("u2", "Bob", "bob@example.com"),
                UserRecord {
                    id: "7".into(),
                    name: "Carol".into(),
                    email: "carol@example.com".into(),
                    team: None,
                },
            ]),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn user(&self, id: &str) -> Option<UserRecord> {
        let users = self.users.lock().unwrap();
        users.iter().find(|user| user.id == id).cloned()
    }

    fn members(&self, team: &str) -> Vec<UserRecord> {
        let users = self.users.lock().unwrap();
        users
            .iter()
            .filter(|user| user.team.as_deref() == Some(team))
            .cloned()
            .collect()
    }

    fn set_email(&self, id: &str, email: &str) -> Result<UserRecord, MutationFailure> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|user| user.id != id && user.email == email) {
            return Err(BusinessFailure::new(
                "EmailTakenError",
                "EMAIL_TAKEN",
                format!("{email} is already in use"),
            )
            .with_field("email", email)
            .into());
        }
        let Some(user) = users.iter_mut().find(|user| user.id == id) else {
            return Err(MutationFailure::business(
                "UserNotFoundError",
                "USER_NOT_FOUND",
                format!("no user with id {id}"),
            ));
        };
        user.email = email.into();
        Ok(user.clone())
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

pub fn schema() -> GatewaySchema {
    GatewaySchema::builder()
        .interface(InterfaceDef::new("Node").field("id", "ID!"))
        .object(
            ObjectDef::new("Query")
                .field("viewer", "User")
                .field_def(FieldDef::new("user", "User").argument("id", "ID!"))
                .field_def(FieldDef::new("node", "Node").argument("id", "ID!"))
                .field("secrets", "[Secret!]")
                .field_def(FieldDef::new("sleep", "Int").argument("ms", "Int!"))
                .field("failing", "String")
                .field("requiredFailing", "String!")
                .field("crash", "String")
                .field("numbers", "[Int!]")
                .field("maybeNumbers", "[Int]"),
        )
        .object(
            ObjectDef::new("User")
                .implements("Node")
                .field("id", "ID!")
                .field("name", "String!")
                .field("email", "String!")
                .field("team", "Team")
                .field("secret", "Secret")
                .field("strict", "String!"),
        )
        .object(
            ObjectDef::new("Team")
                .implements("Node")
                .field("id", "ID!")
                .field("name", "String!")
                .field("members", "[User!]!"),
        )
        .object(ObjectDef::new("Secret").field("value", "String!"))
        .mutation(
            MutationDef::new("setUserEmail")
                .input_field("userId", "ID!")
                .input_field("email", "String!")
                .success(ObjectDef::new("SetUserEmailSuccess").field("user", "User!"))
                .failure(FailureDef::new("EmailTakenError").field("email", "String!"))
                .failure(FailureDef::new("UserNotFoundError")),
        )
        .mutation(
            MutationDef::new("appendLog")
                .input_field("entry", "String!")
                .input_field("delayMs", "Int")
                .success(ObjectDef::new("AppendLogSuccess").field("length", "Int!"))
                .failure("UserNotFoundError"),
        )
        .build()
        .unwrap()
}

pub fn gateway(config: GatewayConfig) -> (Gateway, Arc<Store>) {
    let store = Arc::new(Store::new());
    let gateway = Gateway::builder(schema())
        .config(config)
        .query_root(Root {
            store: store.clone(),
        })
        .mutation_handler(
            "setUserEmail",
            SetUserEmail {
                store: store.clone(),
            },
        )
        .mutation_handler(
            "appendLog",
            AppendLog {
                store: store.clone(),
            },
        )
        .build()
        .unwrap();
    (gateway, store)
}

pub fn alice() -> Context {
    Context::new().with(Viewer("u1".into()))
}

pub async fn run(gateway: &Gateway, query: &str, context: &Context) -> Response {
    gateway
        .execute(&ExecutionRequest::query(query), context)
        .await
}

pub fn pretty(response: &Response) -> String {
    serde_json::to_string_pretty(response).unwrap()
}

pub struct Root {
    store: Arc<Store>,
}

impl_resolver! {
    for Root:

    __typename = "Query";

    authorize(&_self, context) {
        if context.contains::<Suspended>() {
            Err(FieldError::Forbidden)
        } else {
            Ok(())
        }
    }

    async fn viewer(&self_, info) {
        let viewer = info
            .context()
            .get::<Viewer>()
            .and_then(|viewer| self_.store.user(&viewer.0));
        Ok(ResolvedValue::opt_object(viewer.map(|record| self_.user(record))))
    }

    async fn user(&self_, info) {
        let id = info.argument("id").and_then(JsonValue::as_str).unwrap_or_default();
        Ok(ResolvedValue::opt_object(self_.store.user(id).map(|record| self_.user(record))))
    }

    async fn node(&self_, info) {
        let id = info.argument("id").and_then(JsonValue::as_str).unwrap_or_default();
        if id == "t1" {
            return Ok(ResolvedValue::object(self_.team()));
        }
        Ok(ResolvedValue::opt_object(self_.store.user(id).map(|record| self_.user(record))))
    }

    async fn secrets() {
        Ok(ResolvedValue::list([
            ResolvedValue::object(Secret { value: "first".into() }),
            ResolvedValue::object(Secret { value: "second".into() }),
        ]))
    }

    async fn sleep(&_self, info) {
        let ms = info.argument("ms").and_then(JsonValue::as_u64).unwrap_or_default();
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(ResolvedValue::leaf(ms))
    }

    async fn failing() {
        Err(FieldError::new("boom").with_code("BOOM"))
    }

    async fn requiredFailing() {
        Err(FieldError::new("required boom"))
    }

    async fn crash() {
        Err(FieldError::internal("connection pool exhausted"))
    }

    async fn numbers() {
        Ok(ResolvedValue::list([
            ResolvedValue::leaf(1),
            ResolvedValue::leaf("two"),
            ResolvedValue::leaf(3),
        ]))
    }

    async fn maybeNumbers() {
        Ok(ResolvedValue::list_stream(stream::iter([
            Ok(ResolvedValue::leaf(1)),
            Err(FieldError::new("unlucky")),
            Ok(ResolvedValue::leaf(3)),
        ])))
    }
}

impl Root {
    fn user(&self, record: UserRecord) -> User {
        User {
            store: self.store.clone(),
            record,
        }
    }

    fn team(&self) -> Team {
        Team {
            store: self.store.clone(),
            id: "t1".into(),
            name: "Core".into(),
        }
    }
}

struct User {
    store: Arc<Store>,
    record: UserRecord,
}

impl_resolver! {
    for User:

    __typename = "User";

    async fn id(&self_) {
        Ok(ResolvedValue::leaf(self_.record.id.as_str()))
    }

    async fn name(&self_) {
        Ok(ResolvedValue::leaf(self_.record.name.as_str()))
    }

    async fn email(&self_) {
        Ok(ResolvedValue::leaf(self_.record.email.as_str()))
    }

    async fn team(&self_) {
        let team = self_.record.team.as_ref().map(|id| Team {
            store: self_.store.clone(),
            id: id.clone(),
            name: "Core".into(),
        });
        Ok(ResolvedValue::opt_object(team))
    }

    async fn secret(&self_) {
        Ok(ResolvedValue::object(Secret {
            value: format!("{} likes tea", self_.record.name),
        }))
    }

    async fn strict() {
        Err(FieldError::new("strict is never available"))
    }
}

struct Team {
    store: Arc<Store>,
    id: String,
    name: String,
}

impl_resolver! {
    for Team:

    __typename = "Team";

    async fn id(&self_) {
        Ok(ResolvedValue::leaf(self_.id.as_str()))
    }

    async fn name(&self_) {
        Ok(ResolvedValue::leaf(self_.name.as_str()))
    }

    async fn members(&self_) {
        let members = self_.store.members(&self_.id).into_iter().map(|record| {
            ResolvedValue::object(User {
                store: self_.store.clone(),
                record,
            })
        });
        Ok(ResolvedValue::list(members))
    }
}

struct Secret {
    value: String,
}

impl_resolver! {
    for Secret:

    __typename = "Secret";

    authorize(&_self, context) {
        if context.contains::<Admin>() {
            Ok(())
        } else {
            Err(FieldError::Forbidden)
        }
    }

    async fn value(&self_) {
        Ok(ResolvedValue::leaf(self_.value.as_str()))
    }
}

struct SetUserEmailSuccess {
    user: User,
}

impl_resolver! {
    for SetUserEmailSuccess:

    __typename = "SetUserEmailSuccess";

    async fn user(&self_) {
        Ok(ResolvedValue::object(&self_.user))
    }
}

struct AppendLogSuccess {
    length: u64,
}

impl_resolver! {
    for AppendLogSuccess:

    __typename = "AppendLogSuccess";

    async fn length(&self_) {
        Ok(ResolvedValue::leaf(self_.length))
    }
}

struct SetUserEmail {
    store: Arc<Store>,
}

impl MutationResolver for SetUserEmail {
    fn resolve<'a>(
        &'a self,
        input: &'a JsonMap,
        _context: &'a Context,
    ) -> BoxFuture<'a, Result<Box<ObjectValue<'static>>, MutationFailure>> {
        Box::pin(async move {
            let user_id = input.get("userId").and_then(JsonValue::as_str).unwrap_or_default();
            let email = input.get("email").and_then(JsonValue::as_str).unwrap_or_default();
            self.store.set_email(user_id, email).map(|record| {
                let user = User {
                    store: self.store.clone(),
                    record,
                };
                Box::new(SetUserEmailSuccess { user }) as Box<ObjectValue<'static>>
            })
        })
    }
}

/// Appends `entry` to the store log after `delayMs`.
/// The entry `undeclared` fails with a type that is not part of the result union.
struct AppendLog {
    store: Arc<Store>,
}

impl MutationResolver for AppendLog {
    fn resolve<'a>(
        &'a self,
        input: &'a JsonMap,
        _context: &'a Context,
    ) -> BoxFuture<'a, Result<Box<ObjectValue<'static>>, MutationFailure>> {
        Box::pin(async move {
            let entry = input
                .get("entry")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_owned();
            if let Some(delay) = input.get("delayMs").and_then(JsonValue::as_u64) {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if entry == "undeclared" {
                return Err(MutationFailure::business(
                    "QuotaExceededError",
                    "QUOTA_EXCEEDED",
                    "too many entries",
                ));
            }
            let length = {
                let mut log = self.store.log.lock().unwrap();
                log.push(entry);
                log.len() as u64
            };
            Ok(Box::new(AppendLogSuccess { length }) as Box<ObjectValue<'static>>)
        })
    }
}
