//! 参数文本到类型化值的解析。
//!
//! 覆盖配置里出现的全部值形态：裸标量、带单位后缀的浮点（`"1.5 m/s"`）、
//! 逗号分隔序列、对称双引号字符串。

/// 可被参数绑定的值类型。
///
/// - **契约 (What)**：`parse` 失败返回人类可读原因；`scalar` 供 min/max 校验，
///   非数值类型返回 `None`；`sequence_len` 供序列尺寸校验。
pub trait ParamValue: Clone + PartialEq + std::fmt::Debug + Send + 'static {
    fn parse(text: &str) -> Result<Self, String>;

    fn scalar(&self) -> Option<f64> {
        None
    }

    fn sequence_len(&self) -> Option<usize> {
        None
    }
}

/// 截取文本开头的数值记号，丢掉单位后缀。
fn numeric_prefix(text: &str) -> &str {
    let t = text.trim();
    let end = t
        .char_indices()
        .find(|&(_, c)| !(c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')))
        .map(|(i, _)| i)
        .unwrap_or(t.len());
    &t[..end]
}

fn parse_numeric<T: std::str::FromStr>(text: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    let token = numeric_prefix(text);
    if token.is_empty() {
        return Err(format!("`{text}` does not start with a number"));
    }
    token.parse::<T>().map_err(|e| format!("`{text}`: {e}"))
}

macro_rules! numeric_param_value {
    ($($ty:ty),+) => {
        $(impl ParamValue for $ty {
            fn parse(text: &str) -> Result<Self, String> {
                parse_numeric(text)
            }

            fn scalar(&self) -> Option<f64> {
                Some(*self as f64)
            }
        })+
    };
}

numeric_param_value!(f64, f32, i64, i32, u64, u32, u16, u8);

impl ParamValue for bool {
    fn parse(text: &str) -> Result<Self, String> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            other => Err(format!("`{other}` is not a boolean")),
        }
    }
}

fn strip_quotes(text: &str) -> &str {
    let t = text.trim();
    let b = t.as_bytes();
    if b.len() >= 2 && b[0] == b'"' && b[b.len() - 1] == b'"' {
        &t[1..t.len() - 1]
    } else {
        t
    }
}

impl ParamValue for String {
    fn parse(text: &str) -> Result<Self, String> {
        Ok(strip_quotes(text).to_owned())
    }
}

impl ParamValue for Vec<String> {
    fn parse(text: &str) -> Result<Self, String> {
        let t = text.trim();
        if t.is_empty() {
            return Ok(Vec::new());
        }
        Ok(t.split(',').map(|s| strip_quotes(s).to_owned()).collect())
    }

    fn sequence_len(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl ParamValue for Vec<f64> {
    fn parse(text: &str) -> Result<Self, String> {
        let t = text.trim();
        if t.is_empty() {
            return Ok(Vec::new());
        }
        t.split(',').map(parse_numeric).collect()
    }

    fn sequence_len(&self) -> Option<usize> {
        Some(self.len())
    }
}
