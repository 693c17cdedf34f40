//! Wire parser for the newline-delimited ingestion protocol using nom.
//!
//! Each line has the shape `<name>:<value>|<kind>`. Lines that do not fit
//! are dropped on their own; the rest of the packet is still processed.
//! The parser does not interpret the kind tag or the sign of the value.

use nom::{
    bytes::complete::{tag, take_till},
    character::complete::{char, i64 as signed},
    combinator::{all_consuming, not, rest},
    sequence::{preceded, separated_pair},
    IResult,
};

/// One parsed line, borrowing from the packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub name: &'a [u8],
    pub kind: &'a [u8],
    pub value: i64,
}

/// Parse every non-empty line of `packet`, invoking `callback` with
/// `(name, kind_text, value)` for each well-formed one.
///
/// Returns the number of lines rejected.
pub fn parse_packet<F>(packet: &[u8], mut callback: F) -> usize
where
    F: FnMut(&[u8], &[u8], i64),
{
    packet
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .filter(|line| !parse_metric(line, &mut callback))
        .count()
}

/// Parse a single line. Returns `false` if the line was dropped.
pub fn parse_metric<F>(line: &[u8], mut callback: F) -> bool
where
    F: FnMut(&[u8], &[u8], i64),
{
    match parse_line(line) {
        Some(parsed) => {
            callback(parsed.name, parsed.kind, parsed.value);
            true
        },
        None => false,
    }
}

/// Parse a single line into its parts
pub fn parse_line(line: &[u8]) -> Option<ParsedLine<'_>> {
    let (_, (name, (value_text, kind))) = metric_line(line).ok()?;
    let (_, value) = integer(value_text).ok()?;
    Some(ParsedLine { name, kind, value })
}

/// `name ':' value_text '|' kind`, splitting on the first `:` and the
/// first `|` after it
fn metric_line(input: &[u8]) -> IResult<&[u8], (&[u8], (&[u8], &[u8]))> {
    separated_pair(
        take_till(|b| b == b':'),
        tag(":"),
        separated_pair(take_till(|b| b == b'|'), tag("|"), rest),
    )(input)
}

/// Base-10 signed 64-bit integer spanning the whole input. Only `-` may
/// lead; an explicit `+` is rejected.
fn integer(input: &[u8]) -> IResult<&[u8], i64> {
    all_consuming(preceded(not(char('+')), signed))(input)
}
