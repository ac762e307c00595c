use std::str::FromStr;

use thiserror::Error;

use super::{Address, AllocationSize, EventState, RefEvent};

/// Number of fields in a record without a pointer column.
const LEGACY_FIELDS: usize = 8;
/// Number of fields in a record with a pointer column.
const POINTER_FIELDS: usize = 9;

/// Tokens producers write for a reference that is not held through a pointer.
const NULL_POINTERS: [&str; 6] = ["(nil)", "(null)", "none", "0x0", "0", "(none)"];

/// Log format revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Detect from the input: pointer-aware when the eighth field looks like
    /// a pointer. [`parse_line`] decides per line; the analyzer settles the
    /// format on the first record it accepts and keeps it for the run.
    #[default]
    Auto,
    /// `address,delta,thread,file,line,function,state,tag`
    Legacy,
    /// `address,delta,thread,file,line,function,state,pointer,tag`
    PointerAware,
}

impl LogFormat {
    /// Resolve `Auto` against the layout of `line`. Concrete formats are
    /// returned unchanged.
    pub fn settle(self, line: &str) -> LogFormat {
        match self {
            LogFormat::Auto => {
                let wide: Vec<&str> = line.splitn(POINTER_FIELDS, ',').collect();
                if wide.len() == POINTER_FIELDS && looks_like_pointer(wide[7]) {
                    LogFormat::PointerAware
                } else {
                    LogFormat::Legacy
                }
            }
            concrete => concrete,
        }
    }

    fn field_count(self) -> usize {
        match self {
            LogFormat::PointerAware => POINTER_FIELDS,
            LogFormat::Legacy | LogFormat::Auto => LEGACY_FIELDS,
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(LogFormat::Auto),
            "legacy" => Ok(LogFormat::Legacy),
            "pointer" | "pointer-aware" => Ok(LogFormat::PointerAware),
            other => Err(format!(
                "unknown log format '{other}' (expected auto, legacy or pointer)"
            )),
        }
    }
}

/// Reasons a log line could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Fewer comma-separated fields than the format requires.
    #[error("object {address}: expected {expected} fields, found {found}")]
    TooFewFields {
        /// First field of the line, if any.
        address: String,
        /// Fields present.
        found: usize,
        /// Fields required.
        expected: usize,
    },

    /// The delta column is not an integer.
    #[error("object {address}: invalid delta '{value}'")]
    InvalidDelta {
        /// Object the line refers to.
        address: String,
        /// Offending text.
        value: String,
    },

    /// The state column is neither a known tag nor a non-negative integer.
    #[error("object {address}: unknown state '{value}'")]
    UnknownState {
        /// Object the line refers to.
        address: String,
        /// Offending text.
        value: String,
    },

    /// A constructor record with malformed size sub-fields.
    #[error("object {address}: invalid constructor size '{value}'")]
    InvalidSize {
        /// Object the line refers to.
        address: String,
        /// Offending text.
        value: String,
    },
}

/// Parse one log record.
///
/// Only the first N-1 commas separate fields; the trailing tag keeps any
/// commas it contains.
pub fn parse_line(line: &str, line_no: usize, format: LogFormat) -> Result<RefEvent, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields = split_fields(line, format);

    let expected = format.field_count();
    if fields.len() < expected {
        return Err(ParseError::TooFewFields {
            address: fields.first().map(|f| f.trim().to_string()).unwrap_or_default(),
            found: fields.len(),
            expected,
        });
    }

    let address = fields[0].trim();
    let delta = parse_delta(fields[1]).ok_or_else(|| ParseError::InvalidDelta {
        address: address.to_string(),
        value: fields[1].to_string(),
    })?;
    let state = parse_state(address, fields[6])?;

    let (pointer, tag) = if fields.len() == POINTER_FIELDS {
        (parse_pointer(fields[7]), fields[8])
    } else {
        (None, fields[7])
    };

    Ok(RefEvent {
        address: Address::new(address),
        delta,
        thread_id: fields[2].trim().to_string(),
        source_file: fields[3].trim().to_string(),
        source_line: fields[4].trim().to_string(),
        function: fields[5].trim().to_string(),
        state,
        pointer,
        tag: tag.to_string(),
        line_no,
    })
}

fn split_fields(line: &str, format: LogFormat) -> Vec<&str> {
    match format.settle(line) {
        LogFormat::PointerAware => line.splitn(POINTER_FIELDS, ',').collect(),
        _ => line.splitn(LEGACY_FIELDS, ',').collect(),
    }
}

fn looks_like_pointer(field: &str) -> bool {
    let field = field.trim();
    if NULL_POINTERS.contains(&field) {
        return true;
    }
    field
        .strip_prefix("0x")
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()))
}

fn parse_delta(field: &str) -> Option<i64> {
    let field = field.trim();
    field.strip_prefix('+').unwrap_or(field).parse().ok()
}

fn parse_pointer(field: &str) -> Option<Address> {
    let field = field.trim();
    if field.is_empty() || NULL_POINTERS.contains(&field) {
        None
    } else {
        Some(Address::new(field))
    }
}

fn parse_state(address: &str, field: &str) -> Result<EventState, ParseError> {
    let raw = field.trim();
    let mut parts = raw.split("**").filter(|part| !part.is_empty());
    let unknown = || ParseError::UnknownState {
        address: address.to_string(),
        value: raw.to_string(),
    };

    let kind = parts.next().ok_or_else(unknown)?;
    match kind {
        "constructor" => {
            let sizes: Vec<&str> = parts.by_ref().collect();
            let size = match sizes.as_slice() {
                [] => None,
                [overhead, user_data] => Some(AllocationSize {
                    overhead: parse_size(address, raw, overhead)?,
                    user_data: parse_size(address, raw, user_data)?,
                }),
                _ => {
                    return Err(ParseError::InvalidSize {
                        address: address.to_string(),
                        value: raw.to_string(),
                    })
                }
            };
            Ok(EventState::Constructor { size })
        }
        "destructor" => Ok(EventState::Destructor),
        "invalid" => Ok(EventState::Invalid),
        numeric if parts.next().is_none() => numeric
            .parse()
            .map(EventState::Count)
            .map_err(|_| unknown()),
        _ => Err(unknown()),
    }
}

fn parse_size(address: &str, raw: &str, field: &str) -> Result<u64, ParseError> {
    field.trim().parse().map_err(|_| ParseError::InvalidSize {
        address: address.to_string(),
        value: raw.to_string(),
    })
}
