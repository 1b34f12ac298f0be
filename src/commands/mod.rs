//! Command surface and its static registration table.
//!
//! The host hands each command an argument vector whose first element is the
//! command name and whose second is the bucket name. [`COMMAND_TABLE`] maps
//! command names to handlers; it is fixed at compile time and never mutated.
//!
//! | Command | Arguments | Reply |
//! |---|---|---|
//! | `tokenbucket.set` | name capacity rate \[initial_tokens\] | `OK` |
//! | `tokenbucket.info` | name | four `field: value` lines |
//! | `tokenbucket.get` | name requested | tokens granted |

mod reply;

pub use reply::Reply;
use tracing::debug;

use crate::engine::BucketOperations;
use crate::error::Argument;
use crate::error::BucketError;

/// Registration flags, as declared to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlags {
    /// May modify the keyspace.
    Write,
    /// Never modifies the keyspace.
    ReadOnly,
}

impl CommandFlags {
    /// Flag string understood by the host.
    pub const fn as_str(self) -> &'static str {
        match self {
            CommandFlags::Write => "write",
            CommandFlags::ReadOnly => "readonly",
        }
    }
}

/// Accepted argument counts, command name included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    const fn exact(n: usize) -> Self {
        Self { min: n, max: n }
    }

    const fn range(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// True if `argc` arguments are acceptable.
    pub fn accepts(&self, argc: usize) -> bool {
        (self.min..=self.max).contains(&argc)
    }
}

/// Handler run for a command once its arity has been checked.
type Handler = fn(&dyn BucketOperations, &[&str]) -> Result<Reply, BucketError>;

/// One row of the registration table.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    /// Full command name.
    pub name: &'static str,
    /// Host flags.
    pub flags: CommandFlags,
    /// Accepted argument counts.
    pub arity: Arity,
    /// Function implementing the command; only [`dispatch`] calls it, after the arity check.
    handler: Handler,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Every command this module registers.
pub static COMMAND_TABLE: &[CommandSpec] = &[
    CommandSpec {
        name: "tokenbucket.set",
        flags: CommandFlags::Write,
        arity: Arity::range(4, 5),
        handler: set_command,
    },
    CommandSpec {
        name: "tokenbucket.info",
        flags: CommandFlags::ReadOnly,
        arity: Arity::exact(2),
        handler: info_command,
    },
    CommandSpec {
        name: "tokenbucket.get",
        flags: CommandFlags::Write,
        arity: Arity::exact(3),
        handler: get_command,
    },
];

/// Find a command by name, ignoring ASCII case.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE.iter().find(|spec| spec.name.eq_ignore_ascii_case(name))
}

/// Run one command and build its reply.
///
/// Never panics on user input; every failure becomes a [`Reply::Error`].
pub fn dispatch<A: AsRef<str>>(engine: &dyn BucketOperations, argv: &[A]) -> Reply {
    let Some(command) = argv.first().map(|arg| arg.as_ref()) else {
        return Reply::Error("ERR empty command".to_string());
    };
    let Some(spec) = lookup(command) else {
        return Reply::Error(format!("ERR unknown command '{command}'"));
    };

    let args: Vec<&str> = argv.iter().map(|arg| arg.as_ref()).collect();
    let result = if spec.arity.accepts(args.len()) {
        (spec.handler)(engine, &args)
    } else {
        Err(BucketError::WrongArity {
            command: command.to_string(),
            got: args.len(),
        })
    };

    match result {
        Ok(reply) => reply,
        Err(err) => {
            debug!(command = spec.name, category = %err.category(), error = %err, "command failed");
            Reply::from(err)
        }
    }
}

/// `tokenbucket.set name capacity rate [initial_tokens]`
fn set_command(engine: &dyn BucketOperations, args: &[&str]) -> Result<Reply, BucketError> {
    let capacity = parse_integer(Argument::Capacity, args[2])?;
    let rate = parse_integer(Argument::Rate, args[3])?;
    let initial = args.get(4).map(|raw| parse_integer(Argument::InitialTokens, raw)).transpose()?;
    engine.initialize(args[1], capacity, rate, initial)?;
    Ok(Reply::ok())
}

/// `tokenbucket.info name`
fn info_command(engine: &dyn BucketOperations, args: &[&str]) -> Result<Reply, BucketError> {
    let bucket = engine.inspect(args[1])?;
    Ok(Reply::Array(vec![
        Reply::SimpleString(format!("update_time: {}", bucket.update_time)),
        Reply::SimpleString(format!("max_permits: {}", bucket.max_permits)),
        Reply::SimpleString(format!("curr_permits: {}", bucket.curr_permits)),
        Reply::SimpleString(format!("rate: {}", bucket.rate)),
    ]))
}

/// `tokenbucket.get name requested`
fn get_command(engine: &dyn BucketOperations, args: &[&str]) -> Result<Reply, BucketError> {
    let requested = parse_integer(Argument::Requested, args[2])?;
    let granted = engine.consume(args[1], requested)?;
    // granted is either 0 or the non-negative i64 the caller sent.
    Ok(Reply::Integer(i64::try_from(granted).unwrap_or(i64::MAX)))
}

/// Parse a decimal integer argument the way the host does.
///
/// Accepts `0` or an optional `-` followed by digits with no leading zero.
/// Rejects whitespace, `+`, leading zeros, `-0`, and values outside `i64`.
fn parse_integer(argument: Argument, raw: &str) -> Result<i64, BucketError> {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let canonical = raw == "0"
        || (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) && !digits.starts_with('0'));
    match raw.parse::<i64>() {
        Ok(value) if canonical => Ok(value),
        _ => Err(BucketError::InvalidArgument {
            argument,
            reason: format!("'{raw}' is not an integer"),
        }),
    }
}
