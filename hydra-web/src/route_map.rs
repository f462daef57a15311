//! 声明式路由表
//!
//! 路由表的键是 `"METHOD /path"`，值是处理器描述：
//!
//! - 单个方法名或处理器
//! - 一组方法名/处理器
//! - 带 `action` 字段的对象，其余字段是这条路由自己的选项覆盖
//!
//! 路由表按插入顺序保存，编译时也按这个顺序注册。

use http::Method;
use serde_json::{Map, Value};
use std::fmt;

use crate::constants::ACTION_FIELD;
use crate::error::ConfigError;
use crate::handler::{BoxedHandler, ControllerState, HandlerRef, MethodTable};
use crate::options::RouteOptions;

/// 路由表中一条路由的处理器描述
pub enum HandlerSpec<S: ControllerState> {
    /// 处理器引用列表，没有路由选项
    Refs(Vec<HandlerRef<S>>),

    /// `action` 加上路由选项覆盖
    Detailed {
        action: Vec<HandlerRef<S>>,
        options: RouteOptions<S>,
    },
}

impl<S: ControllerState> Clone for HandlerSpec<S> {
    fn clone(&self) -> Self {
        match self {
            HandlerSpec::Refs(refs) => HandlerSpec::Refs(refs.clone()),
            HandlerSpec::Detailed { action, options } => HandlerSpec::Detailed {
                action: action.clone(),
                options: options.clone(),
            },
        }
    }
}

impl<S: ControllerState> fmt::Debug for HandlerSpec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerSpec::Refs(refs) => f.debug_tuple("Refs").field(refs).finish(),
            HandlerSpec::Detailed { action, options } => f
                .debug_struct("Detailed")
                .field("action", action)
                .field("options", options)
                .finish(),
        }
    }
}

impl<S: ControllerState> HandlerSpec<S> {
    /// 单个处理器引用
    pub fn one(handler: impl Into<HandlerRef<S>>) -> Self {
        HandlerSpec::Refs(vec![handler.into()])
    }

    /// 一组处理器引用
    pub fn many<I, H>(handlers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HandlerRef<S>>,
    {
        HandlerSpec::Refs(handlers.into_iter().map(Into::into).collect())
    }

    /// 带路由选项的描述
    pub fn detailed<I, H>(action: I, options: RouteOptions<S>) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HandlerRef<S>>,
    {
        HandlerSpec::Detailed {
            action: action.into_iter().map(Into::into).collect(),
            options,
        }
    }

    /// 从配置值解析
    ///
    /// 形状不对时返回 `None`，由调用方记录日志并跳过
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(name) => Some(HandlerSpec::Refs(vec![HandlerRef::Named(name)])),
            Value::Array(items) => Some(HandlerSpec::Refs(named_refs(items)?)),
            Value::Object(mut object) => {
                let action = match object.remove(ACTION_FIELD)? {
                    Value::String(name) => vec![HandlerRef::Named(name)],
                    Value::Array(items) => named_refs(items)?,
                    _ => return None,
                };
                Some(HandlerSpec::Detailed {
                    action,
                    options: RouteOptions::from_object(object),
                })
            }
            _ => None,
        }
    }
}

fn named_refs<S: ControllerState>(items: Vec<Value>) -> Option<Vec<HandlerRef<S>>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(name) => Some(HandlerRef::Named(name)),
            _ => None,
        })
        .collect()
}

/// 声明式路由表
pub struct RouteMap<S: ControllerState> {
    entries: Vec<(String, HandlerSpec<S>)>,
}

impl<S: ControllerState> Default for RouteMap<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S: ControllerState> Clone for RouteMap<S> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<S: ControllerState> fmt::Debug for RouteMap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<S: ControllerState> RouteMap<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一条路由（构建器风格）
    pub fn route(mut self, key: impl Into<String>, spec: HandlerSpec<S>) -> Self {
        self.insert(key, spec);
        self
    }

    /// 添加一条路由，同名键覆盖原值但保留原位置
    pub fn insert(&mut self, key: impl Into<String>, spec: HandlerSpec<S>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = spec,
            None => self.entries.push((key, spec)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HandlerSpec<S>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 从配置对象解析，无法识别的条目记录日志后跳过
    pub fn from_json(object: Map<String, Value>) -> Self {
        let mut map = Self::new();
        for (key, value) in object {
            match HandlerSpec::from_value(value.clone()) {
                Some(spec) => map.insert(key, spec),
                None => {
                    tracing::error!(route = %key, value = %value, "Invalid route map entry, skipping");
                }
            }
        }
        map
    }

    /// 从任意配置值解析，非对象返回 `None`
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(object) => Some(Self::from_json(object)),
            _ => None,
        }
    }

    /// 把路由表展开为待注册的路由，方法名在这里解析
    pub fn plan(&self, methods: &MethodTable<S>) -> Result<Vec<PlannedRoute<S>>, ConfigError> {
        let mut planned = Vec::with_capacity(self.entries.len());

        for (key, spec) in &self.entries {
            let Some((method, path)) = parse_key(key)? else {
                tracing::error!(route = %key, "Empty route map key, skipping");
                continue;
            };

            let (refs, options) = match spec {
                HandlerSpec::Refs(refs) => (refs, RouteOptions::default()),
                HandlerSpec::Detailed { action, options } => (action, options.clone()),
            };

            planned.push(PlannedRoute {
                method,
                path,
                options,
                handlers: methods.resolve_all(refs)?,
            });
        }

        Ok(planned)
    }
}

/// 路由表展开后的一条路由
pub struct PlannedRoute<S: ControllerState> {
    pub method: Method,
    pub path: String,
    pub options: RouteOptions<S>,
    pub handlers: Vec<BoxedHandler<S>>,
}

/// 解析 `"METHOD /path"` 形式的键
///
/// 空键返回 `None`；只有方法没有路径时路径为 `/`
pub fn parse_key(key: &str) -> Result<Option<(Method, String)>, ConfigError> {
    let mut parts = key.split_whitespace();

    let Some(method) = parts.next() else {
        return Ok(None);
    };
    let path = parts.next().unwrap_or("/").to_string();

    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(|_| {
        ConfigError::InvalidMethod {
            method: method.to_string(),
            route: key.to_string(),
        }
    })?;

    Ok(Some((method, path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Exchange;
    use crate::handler::{sync_fn, Outcome};
    use serde_json::json;
    use std::sync::Arc;

    struct Users;

    fn noop() -> BoxedHandler<Users> {
        sync_fn(|_: &Users, _: &mut Exchange| Outcome::Next)
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(
            parse_key("get /users/:id").unwrap(),
            Some((Method::GET, "/users/:id".to_string()))
        );
        assert_eq!(
            parse_key("POST\t  /users").unwrap(),
            Some((Method::POST, "/users".to_string()))
        );
        assert_eq!(parse_key("delete").unwrap(), Some((Method::DELETE, "/".to_string())));
        assert_eq!(parse_key("   ").unwrap(), None);
        assert!(matches!(
            parse_key("g(t /x"),
            Err(ConfigError::InvalidMethod { .. })
        ));
    }

    #[test]
    fn test_from_json_shapes_and_order() {
        let map: RouteMap<Users> = RouteMap::from_json(
            json!({
                "get /": "index",
                "get /users/:id": ["load", "show"],
                "post /users": { "action": "create", "ajax": true },
                "put /users/:id": 42,
                "patch /users/:id": { "ajax": false }
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );

        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["get /", "get /users/:id", "post /users"]);

        let create = map.iter().nth(2).map(|(_, spec)| spec);
        match create {
            Some(HandlerSpec::Detailed { action, options }) => {
                assert_eq!(action.len(), 1);
                assert_eq!(options.values.get("ajax"), Some(&json!(true)));
                assert!(!options.values.contains_key("action"));
            }
            other => panic!("unexpected spec: {:?}", other),
        };
    }

    #[test]
    fn test_plan_resolves_names_in_order() {
        let load = noop();
        let show = noop();
        let methods = MethodTable::new()
            .with("load", Arc::clone(&load))
            .with("show", Arc::clone(&show));

        let map = RouteMap::new()
            .route("get /users/:id", HandlerSpec::many(["load", "show"]))
            .route("delete /users/:id", HandlerSpec::one(&show));

        let planned = map.plan(&methods).unwrap();
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].method, Method::GET);
        assert_eq!(planned[0].path, "/users/:id");
        assert!(Arc::ptr_eq(&planned[0].handlers[0], &load));
        assert!(Arc::ptr_eq(&planned[0].handlers[1], &show));
        assert_eq!(planned[1].method, Method::DELETE);
    }

    #[test]
    fn test_plan_unknown_method_name() {
        let map = RouteMap::<Users>::new().route("get /", HandlerSpec::one("index"));
        let err = map.plan(&MethodTable::new()).err().unwrap();
        assert_eq!(err, ConfigError::UnknownMethod { name: "index".into() });
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut map = RouteMap::<Users>::new()
            .route("get /a", HandlerSpec::one("a"))
            .route("get /b", HandlerSpec::one("b"));
        map.insert("get /a", HandlerSpec::many(["x", "y"]));

        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["get /a", "get /b"]);
        assert!(matches!(map.iter().next(), Some((_, HandlerSpec::Refs(refs))) if refs.len() == 2));
    }
}
