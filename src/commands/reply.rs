//! Command replies.

use std::fmt;

use serde_json::json;

use crate::error::BucketError;

/// Reply returned to the caller of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status line such as `OK`.
    SimpleString(String),
    /// Signed integer.
    Integer(i64),
    /// Ordered list of nested replies.
    Array(Vec<Reply>),
    /// Error line; the first word is the error class.
    Error(String),
}

impl Reply {
    /// The `OK` acknowledgement.
    pub fn ok() -> Self {
        Reply::SimpleString("OK".to_string())
    }

    /// True for [`Reply::Error`].
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Wire encoding in the host's text protocol.
    pub fn to_resp(&self) -> String {
        let mut out = String::new();
        self.write_resp(&mut out);
        out
    }

    fn write_resp(&self, out: &mut String) {
        match self {
            Reply::SimpleString(s) => {
                out.push('+');
                out.push_str(s);
                out.push_str("\r\n");
            }
            Reply::Integer(n) => {
                out.push(':');
                out.push_str(&n.to_string());
                out.push_str("\r\n");
            }
            Reply::Array(items) => {
                out.push('*');
                out.push_str(&items.len().to_string());
                out.push_str("\r\n");
                for item in items {
                    item.write_resp(out);
                }
            }
            Reply::Error(msg) => {
                out.push('-');
                out.push_str(msg);
                out.push_str("\r\n");
            }
        }
    }

    /// Structured form for `--json` output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Reply::SimpleString(s) => json!(s),
            Reply::Integer(n) => json!(n),
            Reply::Array(items) => serde_json::Value::Array(items.iter().map(Reply::to_json).collect()),
            Reply::Error(msg) => json!({ "error": msg }),
        }
    }

    /// Rendering in the style of an interactive client.
    pub fn to_human(&self) -> String {
        let mut out = String::new();
        self.write_human(&mut out, 0);
        out
    }

    fn write_human(&self, out: &mut String, depth: usize) {
        match self {
            Reply::SimpleString(s) => out.push_str(s),
            Reply::Integer(n) => {
                out.push_str("(integer) ");
                out.push_str(&n.to_string());
            }
            Reply::Error(msg) => {
                out.push_str("(error) ");
                out.push_str(msg);
            }
            Reply::Array(items) if items.is_empty() => out.push_str("(empty array)"),
            Reply::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                        out.push_str(&"   ".repeat(depth));
                    }
                    out.push_str(&format!("{}) ", i + 1));
                    item.write_human(out, depth + 1);
                }
            }
        }
    }
}

impl From<BucketError> for Reply {
    fn from(err: BucketError) -> Self {
        Reply::Error(err.reply_message())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_reply() -> Reply {
        Reply::Array(vec![
            Reply::SimpleString("update_time: 5".into()),
            Reply::SimpleString("rate: 2".into()),
        ])
    }

    #[test]
    fn test_resp_encoding() {
        assert_eq!(Reply::ok().to_resp(), "+OK\r\n");
        assert_eq!(Reply::Integer(5).to_resp(), ":5\r\n");
        assert_eq!(Reply::Error("ERR no such bucket".into()).to_resp(), "-ERR no such bucket\r\n");
        assert_eq!(info_reply().to_resp(), "*2\r\n+update_time: 5\r\n+rate: 2\r\n");
    }

    #[test]
    fn test_human_rendering() {
        assert_eq!(Reply::Integer(0).to_human(), "(integer) 0");
        assert_eq!(info_reply().to_human(), "1) update_time: 5\n2) rate: 2");
        assert_eq!(Reply::Array(vec![]).to_human(), "(empty array)");
    }

    #[test]
    fn test_json_rendering() {
        assert_eq!(info_reply().to_json(), json!(["update_time: 5", "rate: 2"]));
        assert_eq!(Reply::Error("ERR x".into()).to_json(), json!({ "error": "ERR x" }));
    }
}
