use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::error::{ContainerError, ContainerResult};

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            ConfigValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// 转换为 JSON 值，供 serde 反序列化使用
    pub fn to_json(&self) -> Value {
        match self {
            ConfigValue::String(s) => Value::String(s.clone()),
            ConfigValue::Int(i) => Value::Number((*i).into()),
            ConfigValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Array(values) => Value::Array(values.iter().map(ConfigValue::to_json).collect()),
            ConfigValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(s) => write!(f, "{}", s),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Array(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            ConfigValue::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 获取配置源名称
    fn name(&self) -> &str;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 获取所有配置键
    fn keys(&self) -> Vec<String>;

    /// 配置源优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// 操作系统类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
    Solaris,
    Other,
}

impl OsFamily {
    /// 当前编译目标的操作系统类别
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            OsFamily::Linux
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else if cfg!(target_os = "windows") {
            OsFamily::Windows
        } else if cfg!(any(target_os = "solaris", target_os = "illumos")) {
            OsFamily::Solaris
        } else {
            OsFamily::Other
        }
    }
}

/// Environment - 配置管理器
///
/// 统一的配置访问接口，同时作为条件求值使用的环境描述：
/// 激活的 profile、操作系统类别以及声明可用的类型。
pub struct Environment {
    /// 配置源列表（按优先级排序）
    sources: RwLock<Vec<Box<dyn PropertySource>>>,

    /// 当前激活的 profile
    active_profiles: RwLock<Vec<String>>,

    os_family: RwLock<OsFamily>,

    /// 声明为可用的类型名（用于 class-presence 条件）
    available_types: RwLock<HashSet<String>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("active_profiles", &*self.active_profiles.read())
            .field("os_family", &*self.os_family.read())
            .field("sources_count", &self.sources.read().len())
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            active_profiles: RwLock::new(Vec::new()),
            os_family: RwLock::new(OsFamily::current()),
            available_types: RwLock::new(HashSet::new()),
        }
    }

    /// 添加配置源
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        tracing::debug!(
            "Adding property source '{}' (priority: {})",
            source.name(),
            source.priority()
        );
        let mut sources = self.sources.write();
        sources.push(source);
        // 按优先级降序排序，相同优先级后添加的优先
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// 获取配置值
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::trace!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        tracing::trace!("Config '{}' not found in any source", key);
        None
    }

    pub fn contains_property(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// 获取字符串数组配置
    ///
    /// 支持 TOML 数组和逗号分隔字符串两种形式
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            ConfigValue::Array(arr) => Some(arr.iter().map(|v| v.to_string()).collect()),
            ConfigValue::String(s) => Some(
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            other => Some(vec![other.to_string()]),
        }
    }

    /// 读取并转换配置值
    ///
    /// 字符串值（例如来自环境变量）会再尝试按 JSON 字面量解析，
    /// 所以 `"8080"` 可以读取为数字，`"true"` 可以读取为布尔值。
    pub fn get_property<T: DeserializeOwned>(&self, key: &str) -> ContainerResult<Option<T>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        convert(key, &value).map(Some)
    }

    /// 读取必填配置值
    pub fn get_required_property<T: DeserializeOwned>(&self, key: &str) -> ContainerResult<T> {
        self.get_property(key)?
            .ok_or_else(|| ContainerError::MissingProperty(key.to_string()))
    }

    /// 将 `prefix.` 开头的所有配置绑定到结构体
    pub fn bind<T: DeserializeOwned>(&self, prefix: &str) -> ContainerResult<T> {
        let sources = self.sources.read();
        let prefix_dot = format!("{}.", prefix);
        let mut root = Map::new();

        // 低优先级先写入，高优先级覆盖
        for source in sources.iter().rev() {
            for key in source.keys() {
                let Some(relative) = key.strip_prefix(&prefix_dot) else {
                    continue;
                };
                if let Some(value) = source.get(&key) {
                    insert_path(&mut root, relative, value.to_json());
                }
            }
        }
        drop(sources);

        tracing::debug!("Binding {} configuration key(s) under '{}'", root.len(), prefix);
        serde_json::from_value(Value::Object(root)).map_err(|e| ContainerError::PropertyConversion {
            key: prefix.to_string(),
            message: e.to_string(),
        })
    }

    /// 设置激活的 profile
    pub fn set_active_profiles(&self, profiles: Vec<String>) {
        *self.active_profiles.write() = profiles;
    }

    pub fn get_active_profiles(&self) -> Vec<String> {
        self.active_profiles.read().clone()
    }

    /// 检查是否包含指定的 profile
    pub fn accepts_profiles(&self, profile: &str) -> bool {
        self.active_profiles.read().iter().any(|p| p == profile)
    }

    pub fn os_family(&self) -> OsFamily {
        *self.os_family.read()
    }

    pub fn set_os_family(&self, family: OsFamily) {
        *self.os_family.write() = family;
    }

    /// 声明某个类型可用
    pub fn add_available_type(&self, type_name: impl Into<String>) {
        self.available_types.write().insert(type_name.into());
    }

    pub fn is_type_available(&self, type_name: &str) -> bool {
        self.available_types.read().contains(type_name)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

fn convert<T: DeserializeOwned>(key: &str, value: &ConfigValue) -> ContainerResult<T> {
    match serde_json::from_value::<T>(value.to_json()) {
        Ok(v) => Ok(v),
        Err(first) => {
            if let ConfigValue::String(raw) = value {
                if let Ok(v) = serde_json::from_str::<T>(raw.trim()) {
                    return Ok(v);
                }
            }
            Err(ContainerError::PropertyConversion {
                key: key.to_string(),
                message: first.to_string(),
            })
        }
    }
}

fn insert_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            root.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = root
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    /// 创建环境变量配置源
    ///
    /// # 参数
    /// * `prefix` - 环境变量前缀，例如 "APP_"
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100,
        }
    }

    /// APP_DATABASE_URL -> database.url
    fn env_to_key(&self, env_key: &str) -> String {
        let stripped = env_key.strip_prefix(&self.prefix).unwrap_or(env_key);
        stripped.to_lowercase().replace('_', ".")
    }

    /// database.url -> APP_DATABASE_URL
    fn key_to_env(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.replace(['.', '-'], "_").to_uppercase())
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key)).ok().map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| self.env_to_key(&k))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 文件配置源
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    /// 从文件加载 TOML 配置
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&content, path.to_string_lossy())
    }

    /// 从字符串解析 TOML 配置
    pub fn parse(content: &str, name: impl Into<String>) -> anyhow::Result<Self> {
        let value: toml::Value = toml::from_str(content).context("Failed to parse TOML")?;

        let mut properties = HashMap::new();
        Self::flatten(&value, String::new(), &mut properties);

        Ok(Self {
            name: name.into(),
            properties,
            priority: 0,
        })
    }

    /// 展平 TOML 表：{ database: { url: "xxx" } } -> { "database.url": "xxx" }
    fn flatten(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
        match value {
            toml::Value::Table(table) => {
                for (key, val) in table {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten(val, path, result);
                }
            }
            other => {
                result.insert(prefix, Self::to_config_value(other));
            }
        }
    }

    fn to_config_value(value: &toml::Value) -> ConfigValue {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Array(arr) => ConfigValue::Array(arr.iter().map(Self::to_config_value).collect()),
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::to_config_value(v)))
                    .collect(),
            ),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时配置）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_priority_order() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("low").with_property("server.port", 8080).with_priority(0),
        ));
        env.add_property_source(Box::new(
            MapPropertySource::new("high").with_property("server.port", 9090).with_priority(100),
        ));

        assert_eq!(env.get_i64("server.port"), Some(9090));
        assert_eq!(env.get_property::<u16>("server.port").unwrap(), Some(9090));
        assert_eq!(env.get_property::<u16>("server.host").unwrap(), None);
    }

    #[test]
    fn test_string_values_are_converted() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("env")
                .with_property("pool.size", "16")
                .with_property("pool.enabled", "true")
                .with_property("pool.name", "primary"),
        ));

        assert_eq!(env.get_property::<u32>("pool.size").unwrap(), Some(16));
        assert_eq!(env.get_property::<bool>("pool.enabled").unwrap(), Some(true));
        assert_eq!(
            env.get_property::<String>("pool.name").unwrap(),
            Some("primary".to_string())
        );
        assert!(matches!(
            env.get_property::<u32>("pool.name"),
            Err(ContainerError::PropertyConversion { .. })
        ));
        assert!(matches!(
            env.get_required_property::<u32>("pool.max"),
            Err(ContainerError::MissingProperty(key)) if key == "pool.max"
        ));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct DatabaseConfig {
        url: String,
        pool: PoolConfig,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct PoolConfig {
        size: u32,
    }

    #[test]
    fn test_bind_prefix() {
        let toml = r#"
            [database]
            url = "postgres://localhost/app"

            [database.pool]
            size = 4
        "#;
        let env = Environment::new();
        env.add_property_source(Box::new(TomlPropertySource::parse(toml, "inline").unwrap()));
        env.add_property_source(Box::new(
            MapPropertySource::new("override").with_property("database.pool.size", 8),
        ));

        let config: DatabaseConfig = env.bind("database").unwrap();
        assert_eq!(
            config,
            DatabaseConfig {
                url: "postgres://localhost/app".to_string(),
                pool: PoolConfig { size: 8 },
            }
        );
    }

    #[test]
    fn test_flatten_toml() {
        let source = TomlPropertySource::parse(
            r#"
            name = "demo"
            [features]
            cache = true
            regions = ["eu", "us"]
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(source.get("name"), Some(ConfigValue::String("demo".into())));
        assert_eq!(source.get("features.cache"), Some(ConfigValue::Bool(true)));
        assert_eq!(source.get("features.regions").map(|v| v.to_string()), Some("eu,us".into()));
    }

    #[test]
    fn test_profiles_and_descriptor() {
        let env = Environment::new();
        env.set_active_profiles(vec!["dev".to_string(), "local".to_string()]);
        env.set_os_family(OsFamily::Windows);
        env.add_available_type("serde_json::Value");

        assert!(env.accepts_profiles("dev"));
        assert!(!env.accepts_profiles("prod"));
        assert_eq!(env.os_family(), OsFamily::Windows);
        assert!(env.is_type_available("serde_json::Value"));
    }

    #[test]
    fn test_environment_source_key_mapping() {
        let source = EnvironmentPropertySource::new("TRELLIS_TEST_");
        assert_eq!(source.key_to_env("server.port"), "TRELLIS_TEST_SERVER_PORT");
        assert_eq!(source.env_to_key("TRELLIS_TEST_SERVER_PORT"), "server.port");
    }
}
