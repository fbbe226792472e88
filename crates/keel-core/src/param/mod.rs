//! # param：参数声明、绑定与校验
//!
//! ## 设计背景（Why）
//! - 任务的可配置面通过 `declare_parameters` 每次重绑时声明一遍：名字、默认值、
//!   单位、约束、作用域与可见性。没有反射，重绑就是重跑声明；
//! - 约束违例是绑定期的致命错误——任务根本不会启动，而不是带病运行。
//!
//! ## 行为契约（What）
//! - 文本值来自配置节（缺省回退声明的默认值，二者皆缺是错误）；
//! - 解析成功后依次校验：取值集合、min/max（经 `scalar()`）、序列尺寸；
//! - 新值与旧字段值不同则记 `changed` 标志，任务在 `on_update_parameters`
//!   里读取并重算派生状态。

mod value;

pub use value::ParamValue;

use std::collections::BTreeMap;

use thiserror::Error;

/// 参数作用域：全局、计划期、机动期。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    Global,
    Plan,
    Maneuver,
}

/// 参数可见性。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Developer,
    User,
}

/// 参数值的单位标注（文档与外部工具用途，解析本身按类型进行）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Units {
    #[default]
    None,
    Meter,
    MeterPerSecond,
    Radian,
    RadianPerSecond,
    Degree,
    Hertz,
    Second,
    Percent,
    Rpm,
}

/// 参数绑定错误域，绑定期致命。
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("parameter `{name}` has no value and no default")]
    Missing { name: String },
    #[error("parameter `{name}` failed to parse: {reason}")]
    Parse { name: String, reason: String },
    #[error("parameter `{name}` value {value} violates bound {bound}")]
    OutOfBounds {
        name: String,
        value: f64,
        bound: String,
    },
    #[error("parameter `{name}` sequence length {len} violates bound {bound}")]
    SizeOutOfBounds {
        name: String,
        len: usize,
        bound: String,
    },
    #[error("parameter `{name}` value `{value}` is not one of the allowed values")]
    InvalidValue { name: String, value: String },
}

/// 单次绑定会话：吃进配置节，吐出 changed 标志表。
#[derive(Debug)]
pub struct ParamBinder {
    section: BTreeMap<String, String>,
    changes: BTreeMap<String, bool>,
}

impl ParamBinder {
    /// 以某任务的配置节（合并视图）开始绑定。
    pub fn new(section: BTreeMap<String, String>) -> Self {
        ParamBinder {
            section,
            changes: BTreeMap::new(),
        }
    }

    /// 声明一个参数并把它绑定到 `field`。
    ///
    /// 终结方法是 [`Param::commit`]；所有约束在那里一次校验。
    pub fn param<'h, T: ParamValue>(&'h mut self, name: &str, field: &'h mut T) -> Param<'h, T> {
        Param {
            raw: self.section.get(name).cloned(),
            name: name.to_owned(),
            field,
            changes: &mut self.changes,
            default: None,
            min: None,
            max: None,
            min_size: None,
            max_size: None,
            values: None,
            units: Units::None,
            scope: Scope::Global,
            visibility: Visibility::Developer,
        }
    }

    /// 绑定会话结束，交出 changed 标志表。
    pub fn into_changes(self) -> BTreeMap<String, bool> {
        self.changes
    }
}

/// 单个参数的声明构建器。
pub struct Param<'h, T: ParamValue> {
    name: String,
    raw: Option<String>,
    field: &'h mut T,
    changes: &'h mut BTreeMap<String, bool>,
    default: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    min_size: Option<usize>,
    max_size: Option<usize>,
    values: Option<Vec<String>>,
    units: Units,
    scope: Scope,
    visibility: Visibility,
}

impl<'h, T: ParamValue> Param<'h, T> {
    pub fn defaults(mut self, text: &str) -> Self {
        self.default = Some(text.to_owned());
        self
    }

    pub fn units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    pub fn minimum(mut self, bound: f64) -> Self {
        self.min = Some(bound);
        self
    }

    pub fn maximum(mut self, bound: f64) -> Self {
        self.max = Some(bound);
        self
    }

    pub fn min_size(mut self, bound: usize) -> Self {
        self.min_size = Some(bound);
        self
    }

    pub fn max_size(mut self, bound: usize) -> Self {
        self.max_size = Some(bound);
        self
    }

    /// 限定取值集合（按原始文本比较）。
    pub fn values(mut self, allowed: &[&str]) -> Self {
        self.values = Some(allowed.iter().map(|s| (*s).to_owned()).collect());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// 解析、校验并写入字段；违例即绑定期致命错误。
    pub fn commit(self) -> Result<(), ParamError> {
        let _ = (self.units, self.scope, self.visibility);
        let raw = self
            .raw
            .or(self.default)
            .ok_or_else(|| ParamError::Missing {
                name: self.name.clone(),
            })?;
        if let Some(allowed) = &self.values {
            let trimmed = raw.trim();
            if !allowed.iter().any(|v| v == trimmed) {
                return Err(ParamError::InvalidValue {
                    name: self.name,
                    value: raw,
                });
            }
        }
        let parsed = T::parse(&raw).map_err(|reason| ParamError::Parse {
            name: self.name.clone(),
            reason,
        })?;
        if let Some(scalar) = parsed.scalar() {
            if let Some(min) = self.min {
                if scalar < min {
                    return Err(ParamError::OutOfBounds {
                        name: self.name,
                        value: scalar,
                        bound: format!("min {min}"),
                    });
                }
            }
            if let Some(max) = self.max {
                if scalar > max {
                    return Err(ParamError::OutOfBounds {
                        name: self.name,
                        value: scalar,
                        bound: format!("max {max}"),
                    });
                }
            }
        }
        if let Some(len) = parsed.sequence_len() {
            if let Some(bound) = self.min_size {
                if len < bound {
                    return Err(ParamError::SizeOutOfBounds {
                        name: self.name,
                        len,
                        bound: format!("min-size {bound}"),
                    });
                }
            }
            if let Some(bound) = self.max_size {
                if len > bound {
                    return Err(ParamError::SizeOutOfBounds {
                        name: self.name,
                        len,
                        bound: format!("max-size {bound}"),
                    });
                }
            }
        }
        let changed = *self.field != parsed;
        self.changes.insert(self.name, changed);
        *self.field = parsed;
        Ok(())
    }
}
