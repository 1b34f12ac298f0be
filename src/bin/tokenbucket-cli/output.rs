//! Output formatting for command replies.

use tokenbucket::Reply;

/// How replies are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `redis-cli` style text.
    Human,
    /// One JSON value per reply.
    Json,
    /// Raw wire encoding.
    Resp,
}

/// Trait for types that can be output in multiple formats.
pub trait Outputable {
    /// Convert to JSON value for structured output.
    fn to_json(&self) -> serde_json::Value;

    /// Convert to human-readable string.
    fn to_human(&self) -> String;

    /// Convert to the wire encoding.
    fn to_resp(&self) -> String;
}

impl Outputable for Reply {
    fn to_json(&self) -> serde_json::Value {
        Reply::to_json(self)
    }

    fn to_human(&self) -> String {
        Reply::to_human(self)
    }

    fn to_resp(&self) -> String {
        Reply::to_resp(self)
    }
}

/// Print a value in the requested format.
pub fn print_output<T: Outputable>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Human => println!("{}", value.to_human()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&value.to_json())
                .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize: {}\"}}", e))
        ),
        OutputFormat::Resp => print!("{}", value.to_resp()),
    }
}
