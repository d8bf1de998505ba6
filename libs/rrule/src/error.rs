//! Recurrence rule errors.

use thiserror::Error;

/// Errors produced while parsing or validating a recurrence rule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RRuleError {
    /// The rule string is empty.
    #[error("rrule is empty")]
    Empty,

    /// The rule has no FREQ part.
    #[error("rrule is missing FREQ")]
    MissingFrequency,

    /// A part is not a recognised RFC 5545 recurrence part.
    #[error("unknown rrule part: {0}")]
    UnknownPart(String),

    /// A part that RFC 5545 forbids for the rule's frequency.
    #[error("{part} is not allowed with FREQ={freq}")]
    PartNotAllowed {
        part: &'static str,
        freq: &'static str,
    },

    /// BYSETPOS needs another BYxxx part to select from.
    #[error("BYSETPOS requires another BYxxx part")]
    SetPosWithoutFilter,

    /// A part appears more than once.
    #[error("duplicate rrule part: {0}")]
    DuplicatePart(String),

    /// A part is not in `NAME=VALUE` form.
    #[error("malformed rrule part: {0:?}")]
    MalformedPart(String),

    /// A part has a value outside its domain.
    #[error("invalid value for {part}: {value:?}")]
    InvalidValue { part: &'static str, value: String },

    /// COUNT and UNTIL are mutually exclusive.
    #[error("COUNT and UNTIL must not both be set")]
    CountAndUntil,

    /// COUNT is only meaningful relative to an explicit DTSTART.
    #[error("COUNT requires an explicit DTSTART")]
    CountWithoutStart,

    /// BYDAY ordinals are only allowed for MONTHLY and YEARLY rules.
    #[error("BYDAY ordinals are not allowed with FREQ={0}")]
    OrdinalNotAllowed(&'static str),
}
