//! 路由选项
//!
//! - [`RouteOptions`]：调用方为单条路由提供的覆盖项
//! - [`CommonOptions`]：控制器级别的默认选项（before 钩子 + 扩展字段），before 钩子对每条路由都生效
//! - [`ResolvedOptions`]：路由最终生效的选项，覆盖项优先，未设置的字段继承默认值

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::constants::AJAX_OPTION;
use crate::handler::{BoxedHandler, ControllerState, HandlerRef};
use crate::pipeline::BeforeSpec;

/// 单条路由的选项覆盖
pub struct RouteOptions<S: ControllerState> {
    pub before: BeforeSpec<S>,
    pub values: Map<String, Value>,
}

impl<S: ControllerState> Default for RouteOptions<S> {
    fn default() -> Self {
        Self {
            before: BeforeSpec::Absent,
            values: Map::new(),
        }
    }
}

impl<S: ControllerState> Clone for RouteOptions<S> {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
            values: self.values.clone(),
        }
    }
}

impl<S: ControllerState> std::fmt::Debug for RouteOptions<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteOptions")
            .field("before", &self.before)
            .field("values", &self.values)
            .finish()
    }
}

impl<S: ControllerState> RouteOptions<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 对象构造，`before` 字段按 before 规则解释，其余字段作为扩展字段
    pub fn from_object(mut values: Map<String, Value>) -> Self {
        let before = values
            .remove("before")
            .map(BeforeSpec::from_json)
            .unwrap_or(BeforeSpec::Absent);

        Self { before, values }
    }

    /// 设置任意扩展字段
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// 限制（`true`）或拒绝（`false`）AJAX 请求
    pub fn ajax(self, ajax: bool) -> Self {
        self.set(AJAX_OPTION, ajax)
    }

    /// 路由选项里的 `before` 字段
    ///
    /// 和其他字段一样经过配置处理器（引用的方法名必须存在），
    /// 处理器链仍然使用控制器的 before 钩子
    pub fn before<I, H>(mut self, hooks: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HandlerRef<S>>,
    {
        self.before = BeforeSpec::Many(hooks.into_iter().map(Into::into).collect());
        self
    }
}

/// 控制器级别的默认选项
pub struct CommonOptions<S: ControllerState> {
    pub before: Vec<BoxedHandler<S>>,
    pub values: Map<String, Value>,
}

impl<S: ControllerState> Default for CommonOptions<S> {
    fn default() -> Self {
        Self {
            before: Vec::new(),
            values: Map::new(),
        }
    }
}

impl<S: ControllerState> Clone for CommonOptions<S> {
    fn clone(&self) -> Self {
        Self {
            before: self.before.clone(),
            values: self.values.clone(),
        }
    }
}

impl<S: ControllerState> CommonOptions<S> {
    /// 控制器默认选项本身作为路由选项
    pub fn resolved(&self) -> ResolvedOptions {
        ResolvedOptions {
            values: self.values.clone(),
        }
    }

    /// 把已经过配置处理器处理的路由覆盖项叠加到默认选项上
    pub fn layer(&self, route_values: Map<String, Value>) -> ResolvedOptions {
        let mut values = self.values.clone();
        for (key, value) in route_values {
            values.insert(key, value);
        }

        ResolvedOptions { values }
    }
}

/// 路由最终生效的选项
///
/// 在注册时生成一次，之后以 `Arc` 的形式挂到该路由的每个请求上
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOptions {
    values: Map<String, Value>,
}

impl ResolvedOptions {
    pub fn from_values(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// `ajax` 字段，只有布尔值才算设置
    pub fn ajax(&self) -> Option<bool> {
        self.get(AJAX_OPTION).and_then(Value::as_bool)
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
