// crates/am_config/src/env.rs

//! 环境变量展开与覆盖
//!
//! 路径字段支持 `$VAR` 与 `${VAR}`，未定义的变量展开为空串。
//! 以 `AIRMESH_` 为前缀的环境变量覆盖对应的标量配置。

/// 环境变量前缀
pub const ENV_PREFIX: &str = "AIRMESH_";

/// 使用给定查找函数展开 `$VAR` / `${VAR}`
pub fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let name: String = if chars.peek() == Some(&'{') {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                out.push_str("${");
                out.push_str(&name);
                continue;
            }
            name
        } else {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('$');
                continue;
            }
            name
        };
        out.push_str(&lookup(&name).unwrap_or_default());
    }
    out
}

/// 使用进程环境展开
pub fn expand_env(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/am".to_string()),
            "RUN" => Some("r1".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_both_forms() {
        assert_eq!(expand_with("$HOME/data/${RUN}.bin", lookup), "/home/am/data/r1.bin");
    }

    #[test]
    fn test_undefined_is_empty() {
        assert_eq!(expand_with("a/$MISSING/b", lookup), "a//b");
    }

    #[test]
    fn test_literal_dollar() {
        assert_eq!(expand_with("cost$ 5", lookup), "cost$ 5");
        assert_eq!(expand_with("${UNCLOSED", lookup), "${UNCLOSED");
    }
}
