//! 用户控制器示例
//!
//! 运行：`cargo run -p hydra-web --example users`
//!
//! ```text
//! curl -H 'Authorization: x' http://127.0.0.1:8080/users/
//! curl -H 'Authorization: x' -H 'X-Requested-With: XMLHttpRequest' -d alice http://127.0.0.1:8080/users/
//! curl -H 'Authorization: x' http://127.0.0.1:8080/users/0
//! ```

use hydra_web::prelude::*;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;

const APPLICATION_TOML: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[logging]
level = "debug"
format = "compact"

[controllers.users]
root = "/users"
before = "checkAuth"

[controllers.users.map]
"get /" = "index"
"get /:id" = ["load", "show"]
"post /" = { action = "create", ajax = true }
"#;

#[derive(Default)]
struct UserStore {
    users: RwLock<Vec<String>>,
}

fn methods() -> MethodTable<UserStore> {
    MethodTable::new()
        .with(
            "checkAuth",
            sync_fn(|_: &UserStore, exchange: &mut Exchange| {
                if exchange.request.headers().contains_key(http::header::AUTHORIZATION) {
                    Outcome::Next
                } else {
                    DispatchError::status(StatusCode::UNAUTHORIZED, "Login required").into()
                }
            }),
        )
        .with(
            "index",
            sync_fn(|store: &UserStore, exchange: &mut Exchange| {
                exchange.response.json(StatusCode::OK, &*store.users.read());
                Outcome::Done
            }),
        )
        .with(
            "load",
            sync_fn(|store: &UserStore, exchange: &mut Exchange| {
                let found = exchange
                    .request
                    .param("id")
                    .and_then(|id| id.parse::<usize>().ok())
                    .is_some_and(|id| id < store.users.read().len());

                if found {
                    Outcome::Next
                } else {
                    DispatchError::status(StatusCode::NOT_FOUND, "No such user").into()
                }
            }),
        )
        .with(
            "show",
            sync_fn(|store: &UserStore, exchange: &mut Exchange| {
                let id = exchange
                    .request
                    .param("id")
                    .and_then(|id| id.parse::<usize>().ok())
                    .unwrap_or_default();
                let name = store.users.read().get(id).cloned();
                exchange
                    .response
                    .json(StatusCode::OK, &json!({ "id": id, "name": name }));
                Outcome::Done
            }),
        )
        .with(
            "create",
            sync_fn(|store: &UserStore, exchange: &mut Exchange| {
                let name = String::from_utf8_lossy(exchange.request.body()).trim().to_string();
                if name.is_empty() {
                    return DispatchError::status(StatusCode::BAD_REQUEST, "Empty user name").into();
                }

                let mut users = store.users.write();
                users.push(name.clone());
                exchange
                    .response
                    .json(StatusCode::CREATED, &json!({ "id": users.len() - 1, "name": name }));
                Outcome::Done
            }),
        )
}

#[tokio::main]
async fn main() -> ApplicationResult<()> {
    let env = Environment::new();
    env.add_property_source(Box::new(TomlPropertySource::parse(
        APPLICATION_TOML,
        "application.toml",
    )?));
    env.add_property_source(Box::new(EnvironmentPropertySource::new("HYDRA_")));

    LoggingConfig::from_environment(&env).init()?;

    let class = ControllerClass::<UserStore>::builder("users")
        .populate(sync_fn(|_: &UserStore, exchange: &mut Exchange| {
            tracing::debug!(path = %exchange.request.path(), "Users request");
            Outcome::Next
        }))
        .build();

    let config_error = |e: ConfigError| ApplicationError::Config(e.to_string());

    let mut users = Controller::new(
        class,
        UserStore::default(),
        methods(),
        config_from_environment(&env, "users"),
    )
    .map_err(config_error)?;
    users.compile().map_err(config_error)?;
    users
        .error(error_fn(|_: &UserStore, error: &DispatchError, exchange: &mut Exchange| {
            let body = ErrorResponse::from_error(error, exchange.request.path());
            exchange.response.json(error.status_code(), &body);
            Outcome::Done
        }))
        .end();

    let root = Arc::new(MemoryRouter::new());
    root.mount(Arc::clone(users.router()));

    WebServer::from_environment(&env, root).run().await
}
