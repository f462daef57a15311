//! 配置处理管道
//!
//! 控制器构造时，原始配置依次经过控制器类型上注册的所有配置处理器，
//! 每个处理器都可以读取前面处理器写入的字段，也可以覆盖它们。
//! 单条路由的选项覆盖项在注册时会再经过一遍同样的处理器。
//!
//! 默认注册两个处理器：
//!
//! 1. **路由表校验**：`map` 不是一张表时置空
//! 2. **before 解析**：把 `before` 规整为处理器列表

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::handler::{BoxedHandler, ControllerState, HandlerRef, MethodTable};
use crate::route_map::RouteMap;

/// 宿主路由选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RouterOptions {
    /// 路径匹配是否区分大小写
    #[serde(alias = "caseSensitive", alias = "case_sensitive")]
    pub case_sensitive: bool,

    /// 是否严格区分结尾的 `/`
    pub strict: bool,
}

/// 配置中的 `map` 字段
pub enum MapSlot<S: ControllerState> {
    Absent,
    Table(RouteMap<S>),
    /// 形状不对的值，由路由表校验处理器置空
    Malformed(Value),
}

impl<S: ControllerState> fmt::Debug for MapSlot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapSlot::Absent => f.write_str("Absent"),
            MapSlot::Table(map) => write!(f, "Table({} routes)", map.len()),
            MapSlot::Malformed(value) => write!(f, "Malformed({})", value),
        }
    }
}

/// 配置中的 `before` 字段
pub enum BeforeSpec<S: ControllerState> {
    Absent,
    One(HandlerRef<S>),
    Many(Vec<HandlerRef<S>>),
    /// 无法识别的形状，解析为空列表
    Other(Value),
    Resolved(Vec<BoxedHandler<S>>),
}

impl<S: ControllerState> Clone for BeforeSpec<S> {
    fn clone(&self) -> Self {
        match self {
            BeforeSpec::Absent => BeforeSpec::Absent,
            BeforeSpec::One(handler) => BeforeSpec::One(handler.clone()),
            BeforeSpec::Many(handlers) => BeforeSpec::Many(handlers.clone()),
            BeforeSpec::Other(value) => BeforeSpec::Other(value.clone()),
            BeforeSpec::Resolved(handlers) => BeforeSpec::Resolved(handlers.clone()),
        }
    }
}

impl<S: ControllerState> fmt::Debug for BeforeSpec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeforeSpec::Absent => f.write_str("Absent"),
            BeforeSpec::One(handler) => write!(f, "One({:?})", handler),
            BeforeSpec::Many(handlers) => write!(f, "Many({:?})", handlers),
            BeforeSpec::Other(value) => write!(f, "Other({})", value),
            BeforeSpec::Resolved(handlers) => write!(f, "Resolved({} hooks)", handlers.len()),
        }
    }
}

impl<S: ControllerState> BeforeSpec<S> {
    /// 从配置文件里的值构造：字符串是方法名，数组里的字符串逐个作为方法名
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(name) => BeforeSpec::One(HandlerRef::Named(name)),
            Value::Array(items) => BeforeSpec::Many(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(name) => Some(HandlerRef::Named(name)),
                        other => {
                            tracing::error!(entry = %other, "Ignoring non-string before hook in configuration");
                            None
                        }
                    })
                    .collect(),
            ),
            other => BeforeSpec::Other(other),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, BeforeSpec::Absent)
    }

    /// 取出解析后的处理器列表，未解析的形状视为空
    pub fn into_resolved(self) -> Vec<BoxedHandler<S>> {
        match self {
            BeforeSpec::Resolved(handlers) => handlers,
            _ => Vec::new(),
        }
    }
}

/// 控制器原始配置
///
/// 识别 `name`、`root`、`router`、`map`、`before` 五个字段，
/// 其余字段原样保留在 `extra` 中，供自定义配置处理器和中间件工厂使用
pub struct RawConfig<S: ControllerState> {
    pub name: Option<String>,
    pub root: Option<String>,
    pub router: RouterOptions,
    pub map: MapSlot<S>,
    pub before: BeforeSpec<S>,
    pub extra: Map<String, Value>,
}

impl<S: ControllerState> Default for RawConfig<S> {
    fn default() -> Self {
        Self {
            name: None,
            root: None,
            router: RouterOptions::default(),
            map: MapSlot::Absent,
            before: BeforeSpec::Absent,
            extra: Map::new(),
        }
    }
}

impl<S: ControllerState> fmt::Debug for RawConfig<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawConfig")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("router", &self.router)
            .field("map", &self.map)
            .field("before", &self.before)
            .field("extra", &self.extra)
            .finish()
    }
}

impl<S: ControllerState> RawConfig<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 对象构造
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let name = object
            .remove("name")
            .and_then(|v| v.as_str().map(String::from));
        let root = object
            .remove("root")
            .and_then(|v| v.as_str().map(String::from));

        let router = match object.remove("router") {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Invalid router options, using defaults");
                RouterOptions::default()
            }),
            None => RouterOptions::default(),
        };

        let map = match object.remove("map") {
            None => MapSlot::Absent,
            Some(Value::Object(table)) => MapSlot::Table(RouteMap::from_json(table)),
            Some(other) => MapSlot::Malformed(other),
        };

        let before = object
            .remove("before")
            .map(BeforeSpec::from_json)
            .unwrap_or(BeforeSpec::Absent);

        Self {
            name,
            root,
            router,
            map,
            before,
            extra: object,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn router(mut self, router: RouterOptions) -> Self {
        self.router = router;
        self
    }

    pub fn map(mut self, map: RouteMap<S>) -> Self {
        self.map = MapSlot::Table(map);
        self
    }

    /// 单个 before 钩子
    pub fn before_one(mut self, hook: impl Into<HandlerRef<S>>) -> Self {
        self.before = BeforeSpec::One(hook.into());
        self
    }

    /// 一组 before 钩子，可以混合方法名和处理器
    pub fn before<I, H>(mut self, hooks: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HandlerRef<S>>,
    {
        self.before = BeforeSpec::Many(hooks.into_iter().map(Into::into).collect());
        self
    }

    /// 设置扩展字段
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// 管道的输入
///
/// 只有对象形式的配置才会经过处理器，其它输入一律替换为空配置
pub enum ConfigInput<S: ControllerState> {
    Config(RawConfig<S>),
    Json(Value),
    Empty,
}

impl<S: ControllerState> From<RawConfig<S>> for ConfigInput<S> {
    fn from(config: RawConfig<S>) -> Self {
        ConfigInput::Config(config)
    }
}

impl<S: ControllerState> From<Value> for ConfigInput<S> {
    fn from(value: Value) -> Self {
        ConfigInput::Json(value)
    }
}

impl<S: ControllerState> From<Option<Value>> for ConfigInput<S> {
    fn from(value: Option<Value>) -> Self {
        value.map(ConfigInput::Json).unwrap_or(ConfigInput::Empty)
    }
}

/// 配置处理器
pub trait ConfigProcessor<S: ControllerState>: Send + Sync {
    fn name(&self) -> &str {
        "config-processor"
    }

    fn process(&self, config: &mut RawConfig<S>, methods: &MethodTable<S>) -> Result<(), ConfigError>;
}

impl<S, F> ConfigProcessor<S> for F
where
    S: ControllerState,
    F: Fn(&mut RawConfig<S>, &MethodTable<S>) -> Result<(), ConfigError> + Send + Sync,
{
    fn process(&self, config: &mut RawConfig<S>, methods: &MethodTable<S>) -> Result<(), ConfigError> {
        self(config, methods)
    }
}

/// 路由表校验：`map` 只接受一张表
pub struct MapValidator;

impl<S: ControllerState> ConfigProcessor<S> for MapValidator {
    fn name(&self) -> &str {
        "map-validator"
    }

    fn process(&self, config: &mut RawConfig<S>, _methods: &MethodTable<S>) -> Result<(), ConfigError> {
        match &config.map {
            MapSlot::Table(_) | MapSlot::Absent => {}
            MapSlot::Malformed(value) => {
                tracing::error!(map = %value, "Controller map must be a table, ignoring it");
                config.map = MapSlot::Absent;
            }
        }
        Ok(())
    }
}

/// before 解析：方法名解析为控制器方法，处理器原样保留，其它形状得到空列表
pub struct BeforeResolver;

impl<S: ControllerState> ConfigProcessor<S> for BeforeResolver {
    fn name(&self) -> &str {
        "before-resolver"
    }

    fn process(&self, config: &mut RawConfig<S>, methods: &MethodTable<S>) -> Result<(), ConfigError> {
        let resolved = match std::mem::replace(&mut config.before, BeforeSpec::Absent) {
            BeforeSpec::One(hook) => vec![methods.resolve(&hook)?],
            BeforeSpec::Many(hooks) => methods.resolve_all(&hooks)?,
            BeforeSpec::Resolved(hooks) => hooks,
            BeforeSpec::Absent => Vec::new(),
            BeforeSpec::Other(value) => {
                tracing::debug!(before = %value, "Unrecognized before hooks, using none");
                Vec::new()
            }
        };

        config.before = BeforeSpec::Resolved(resolved);
        Ok(())
    }
}

/// 有序的配置处理器列表
pub struct ConfigPipeline<S: ControllerState> {
    processors: Vec<Arc<dyn ConfigProcessor<S>>>,
}

impl<S: ControllerState> Clone for ConfigPipeline<S> {
    fn clone(&self) -> Self {
        Self {
            processors: self.processors.clone(),
        }
    }
}

impl<S: ControllerState> Default for ConfigPipeline<S> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<S: ControllerState> ConfigPipeline<S> {
    /// 空管道
    pub fn empty() -> Self {
        Self {
            processors: Vec::new(),
        }
    }

    /// 带有默认处理器的管道
    pub fn with_defaults() -> Self {
        let mut pipeline = Self::empty();
        pipeline.push(Arc::new(MapValidator));
        pipeline.push(Arc::new(BeforeResolver));
        pipeline
    }

    /// 追加处理器
    pub fn push(&mut self, processor: Arc<dyn ConfigProcessor<S>>) {
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// 处理器名称，按执行顺序
    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// 就地运行所有处理器
    pub fn apply(&self, config: &mut RawConfig<S>, methods: &MethodTable<S>) -> Result<(), ConfigError> {
        for processor in &self.processors {
            processor.process(config, methods)?;
        }
        Ok(())
    }

    /// 处理一份输入配置
    ///
    /// 非对象输入被替换为空配置，此时不运行任何处理器
    pub fn process(
        &self,
        input: ConfigInput<S>,
        methods: &MethodTable<S>,
    ) -> Result<RawConfig<S>, ConfigError> {
        let mut config = match input {
            ConfigInput::Config(config) => config,
            ConfigInput::Json(Value::Object(object)) => RawConfig::from_object(object),
            ConfigInput::Json(other) => {
                tracing::debug!(config = %other, "Controller config is not an object, using an empty one");
                return Ok(RawConfig::default());
            }
            ConfigInput::Empty => return Ok(RawConfig::default()),
        };

        self.apply(&mut config, methods)?;
        Ok(config)
    }
}
