//! A small in-memory accounts service, served by the binary when no other
//! resolvers are wired in.
//!
//! The authenticated user comes from the `x-user-id` header, see [`extract_viewer`].

use apollo_gateway::impl_resolver;
use apollo_gateway::BusinessFailure;
use apollo_gateway::Context;
use apollo_gateway::FailureDef;
use apollo_gateway::FieldDef;
use apollo_gateway::FieldError;
use apollo_gateway::Gateway;
use apollo_gateway::GatewayConfig;
use apollo_gateway::GatewaySchema;
use apollo_gateway::JsonMap;
use apollo_gateway::JsonValue;
use apollo_gateway::MutationDef;
use apollo_gateway::MutationFailure;
use apollo_gateway::MutationResolver;
use apollo_gateway::ObjectDef;
use apollo_gateway::ObjectValue;
use apollo_gateway::ResolveInfo;
use apollo_gateway::ResolvedValue;
use apollo_gateway::Resolver;
use axum::http::HeaderMap;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

pub const VIEWER_HEADER: &str = "x-user-id";

/// Context value: id of the authenticated user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer(pub String);

#[derive(Debug, Clone)]
struct Account {
    id: String,
    name: String,
    email: String,
}

#[derive(Debug)]
pub struct Accounts {
    accounts: Mutex<Vec<Account>>,
}

impl Default for Accounts {
    fn default() -> Self {
        let account = |id: &str, name: &str, email: &str| Account {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        };
        Self {
            accounts: Mutex::new(vec![
                account("1", "Ada", "ada@example.com"),
                account("2", "Grace", "grace@example.com"),
            ]),
        }
    }
}

impl Accounts {
    fn get(&self, id: &str) -> Option<Account> {
        let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        accounts.iter().find(|account| account.id == id).cloned()
    }

    fn all(&self) -> Vec<Account> {
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_email(&self, id: &str, email: &str) -> Result<Account, MutationFailure> {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        if accounts
            .iter()
            .any(|account| account.id != id && account.email == email)
        {
            return Err(email_taken(email));
        }
        let Some(account) = accounts.iter_mut().find(|account| account.id == id) else {
            return Err(MutationFailure::business(
                "UserNotFoundError",
                "USER_NOT_FOUND",
                format!("no user with id {id}"),
            ));
        };
        account.email = email.into();
        Ok(account.clone())
    }

    fn create(&self, name: &str, email: &str) -> Result<Account, MutationFailure> {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        if accounts.iter().any(|account| account.email == email) {
            return Err(email_taken(email));
        }
        let account = Account {
            id: (accounts.len() + 1).to_string(),
            name: name.into(),
            email: email.into(),
        };
        accounts.push(account.clone());
        Ok(account)
    }
}

fn email_taken(email: &str) -> MutationFailure {
    BusinessFailure::new(
        "EmailTakenError",
        "EMAIL_TAKEN",
        format!("{email} is already in use"),
    )
    .with_field("email", email)
    .into()
}

pub fn schema() -> anyhow::Result<GatewaySchema> {
    let schema = GatewaySchema::builder()
        .object(
            ObjectDef::new("Query")
                .field("viewer", "User")
                .field_def(FieldDef::new("user", "User").argument("id", "ID!"))
                .field("users", "[User!]!"),
        )
        .object(
            ObjectDef::new("User")
                .field("id", "ID!")
                .field("name", "String!")
                .field("email", "String!"),
        )
        .mutation(
            MutationDef::new("setUserEmail")
                .input_field("userId", "ID!")
                .input_field("email", "String!")
                .success(ObjectDef::new("SetUserEmailSuccess").field("user", "User!"))
                .failure(FailureDef::new("EmailTakenError").field("email", "String!"))
                .failure(FailureDef::new("UserNotFoundError")),
        )
        .mutation(
            MutationDef::new("createUser")
                .input_field("name", "String!")
                .input_field("email", "String!")
                .success(ObjectDef::new("CreateUserSuccess").field("user", "User!"))
                .failure(FailureDef::new("EmailTakenError").field("email", "String!")),
        )
        .build()?;
    Ok(schema)
}

/// The demo gateway with a fresh store
pub fn gateway(config: GatewayConfig) -> anyhow::Result<Gateway> {
    let accounts = Arc::new(Accounts::default());
    let gateway = Gateway::builder(schema()?)
        .config(config)
        .query_root(Root {
            accounts: accounts.clone(),
        })
        .mutation_handler(
            "setUserEmail",
            SetUserEmail {
                accounts: accounts.clone(),
            },
        )
        .mutation_handler("createUser", CreateUser { accounts })
        .build()?;
    Ok(gateway)
}

pub fn viewer_context(id: &str) -> Context {
    Context::new().with(Viewer(id.to_owned()))
}

/// Stores the raw headers and, when `x-user-id` is present, the [`Viewer`]
pub fn extract_viewer(headers: &HeaderMap) -> Context {
    let mut context = Context::new().with(headers.clone());
    if let Some(id) = headers
        .get(VIEWER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty())
    {
        context.insert(Viewer(id.to_owned()));
    }
    context
}

struct Root {
    accounts: Arc<Accounts>,
}

impl_resolver! {
    for Root:

    __typename = "Query";

    async fn viewer(&self_, info) {
        let account = info
            .context()
            .get::<Viewer>()
            .and_then(|viewer| self_.accounts.get(&viewer.0));
        Ok(ResolvedValue::opt_object(account.map(User)))
    }

    async fn user(&self_, info) {
        let id = info.argument("id").and_then(JsonValue::as_str).unwrap_or_default();
        Ok(ResolvedValue::opt_object(self_.accounts.get(id).map(User)))
    }

    async fn users(&self_) {
        let users = self_.accounts.all().into_iter().map(|account| ResolvedValue::object(User(account)));
        Ok(ResolvedValue::list(users))
    }
}

struct User(Account);

impl_resolver! {
    for User:

    __typename = "User";

    async fn id(&self_) {
        Ok(ResolvedValue::leaf(self_.0.id.as_str()))
    }

    async fn name(&self_) {
        Ok(ResolvedValue::leaf(self_.0.name.as_str()))
    }

    async fn email(&self_) {
        Ok(ResolvedValue::leaf(self_.0.email.as_str()))
    }
}

/// Success payload of both mutations, which only differ by type name
struct UserPayload {
    typename: &'static str,
    user: User,
}

impl Resolver for UserPayload {
    fn type_name(&self) -> &str {
        self.typename
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> BoxFuture<'a, Result<ResolvedValue<'a>, FieldError>> {
        Box::pin(async move {
            match info.field_name() {
                "user" => Ok(ResolvedValue::object(&self.user)),
                field_name => Err(FieldError::new(format!(
                    "no resolver for field {field_name} of {}",
                    self.typename
                ))),
            }
        })
    }
}

fn string_input<'a>(input: &'a JsonMap, name: &str) -> &'a str {
    input.get(name).and_then(JsonValue::as_str).unwrap_or_default()
}

struct SetUserEmail {
    accounts: Arc<Accounts>,
}

impl MutationResolver for SetUserEmail {
    fn resolve<'a>(
        &'a self,
        input: &'a JsonMap,
        _context: &'a Context,
    ) -> BoxFuture<'a, Result<Box<ObjectValue<'static>>, MutationFailure>> {
        Box::pin(async move {
            self.accounts
                .set_email(string_input(input, "userId"), string_input(input, "email"))
                .map(|account| {
                    Box::new(UserPayload {
                        typename: "SetUserEmailSuccess",
                        user: User(account),
                    }) as Box<ObjectValue<'static>>
                })
        })
    }
}

struct CreateUser {
    accounts: Arc<Accounts>,
}

impl MutationResolver for CreateUser {
    fn resolve<'a>(
        &'a self,
        input: &'a JsonMap,
        _context: &'a Context,
    ) -> BoxFuture<'a, Result<Box<ObjectValue<'static>>, MutationFailure>> {
        Box::pin(async move {
            self.accounts
                .create(string_input(input, "name"), string_input(input, "email"))
                .map(|account| {
                    Box::new(UserPayload {
                        typename: "CreateUserSuccess",
                        user: User(account),
                    }) as Box<ObjectValue<'static>>
                })
        })
    }
}
