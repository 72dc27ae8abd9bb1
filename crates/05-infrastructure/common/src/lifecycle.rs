//! 实例生命周期与参数标识

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 实例生命周期类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// 瞬时模式 - 每次解析都创建新实例
    #[default]
    Transient,
    /// 单例模式 - 注册有效期内按参数标识只创建一个实例
    Singleton,
    /// 解析模式 - 同一次根解析调用内按参数标识共享实例
    Resolution,
}

impl Lifecycle {
    /// 是否按参数标识缓存实例
    pub fn is_cached(self) -> bool {
        !matches!(self, Self::Transient)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::Singleton => "singleton",
            Self::Resolution => "resolution",
        };
        f.write_str(name)
    }
}

/// 参数标识
///
/// 生命周期缓存的键。默认由有效参数的规范化 JSON 文本得到，
/// 也可以由注册选项中的参数标识提供者计算。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArgumentIdentity(Option<String>);

impl ArgumentIdentity {
    /// 无参数时的标识
    pub const NONE: Self = Self(None);

    /// 由自定义键创建标识
    pub fn new(key: impl Into<String>) -> Self {
        Self(Some(key.into()))
    }

    /// 由有效参数计算标识，对象键按字典序排列
    pub fn of(argument: Option<&Value>) -> Self {
        Self(argument.map(stable_stringify))
    }

    /// 标识键
    pub fn key(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for ArgumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key().unwrap_or("<none>"))
    }
}

/// 对象键有序的 JSON 序列化
pub fn stable_stringify(value: &Value) -> String {
    let mut output = String::new();
    write_stable(value, &mut output);
    output
}

fn write_stable(value: &Value, output: &mut String) {
    match value {
        Value::Array(items) => {
            output.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                write_stable(item, output);
            }
            output.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            output.push('{');
            for (index, (key, item)) in entries.into_iter().enumerate() {
                if index > 0 {
                    output.push(',');
                }
                output.push_str(&Value::String(key.clone()).to_string());
                output.push(':');
                write_stable(item, output);
            }
            output.push('}');
        }
        scalar => output.push_str(&scalar.to_string()),
    }
}
