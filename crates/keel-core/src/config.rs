//! # config：节/键/值配置存储与 Profile 覆盖
//!
//! ## 设计背景（Why）
//! - 参数绑定层只关心“某任务的节里某键的文本值”；文件如何到达这里（磁盘、
//!   网络、内存）是装配层的事；
//! - Profile（如 `Simulation` 与 `Hardware`）通过 `[Name/Profile]` 覆盖节调制
//!   参数默认值；
//! - 快照整体以 `arc-swap` 原子热换：读路径无锁，写路径 copy-on-write。
//!
//! ## 行为契约（What）
//! - [`Config::section`] 返回基础节与活动 Profile 覆盖节的合并视图，覆盖键胜出；
//! - 文本摄取接受 INI 式语法：`[Section]`、`Key = Value`、`;`/`#` 注释、
//!   对称双引号剥除；节外出现键值行是语法错误。

use std::collections::BTreeMap;

use arc_swap::ArcSwap;
use thiserror::Error;

/// 配置错误域。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("syntax error at line {line}: `{content}`")]
    Syntax { line: usize, content: String },
}

#[derive(Clone, Debug, Default)]
struct Snapshot {
    profile: Option<String>,
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

/// 进程级配置存储。
#[derive(Debug)]
pub struct Config {
    inner: ArcSwap<Snapshot>,
}

impl Config {
    /// 空配置，无活动 Profile。
    pub fn new() -> Self {
        Config {
            inner: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// 空配置并选定 Profile。
    pub fn with_profile(profile: &str) -> Self {
        Config {
            inner: ArcSwap::from_pointee(Snapshot {
                profile: Some(profile.to_owned()),
                sections: BTreeMap::new(),
            }),
        }
    }

    /// 从 INI 式文本摄取。
    pub fn from_text(text: &str, profile: Option<&str>) -> Result<Self, ConfigError> {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut current: Option<String> = None;
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim();
                sections.entry(name.to_owned()).or_default();
                current = Some(name.to_owned());
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Syntax {
                    line: idx + 1,
                    content: line.to_owned(),
                });
            };
            let Some(section) = current.clone() else {
                return Err(ConfigError::Syntax {
                    line: idx + 1,
                    content: line.to_owned(),
                });
            };
            sections
                .entry(section)
                .or_default()
                .insert(key.trim().to_owned(), strip_quotes(value.trim()).to_owned());
        }
        Ok(Config {
            inner: ArcSwap::from_pointee(Snapshot {
                profile: profile.map(str::to_owned),
                sections,
            }),
        })
    }

    /// 活动 Profile。
    pub fn profile(&self) -> Option<String> {
        self.inner.load().profile.clone()
    }

    /// 写入单个键值（copy-on-write 热换快照）。
    pub fn set(&self, section: &str, key: &str, value: &str) {
        self.inner.rcu(|snapshot| {
            let mut next = (**snapshot).clone();
            next.sections
                .entry(section.to_owned())
                .or_default()
                .insert(key.to_owned(), value.to_owned());
            next
        });
    }

    /// 取某节的合并视图：基础节 + `Name/Profile` 覆盖节。
    pub fn section(&self, name: &str) -> BTreeMap<String, String> {
        let snapshot = self.inner.load();
        let mut merged = snapshot.sections.get(name).cloned().unwrap_or_default();
        if let Some(profile) = snapshot.profile.as_deref() {
            let overlay = format!("{name}/{profile}");
            if let Some(section) = snapshot.sections.get(&overlay) {
                for (k, v) in section {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        merged
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"' {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
