//! Field grammars shared by the header and page parsers

use chrono::{NaiveDate, NaiveDateTime};
use nom::{
    bytes::complete::{tag_no_case, take_while_m_n},
    character::complete::{char, digit1, one_of, space0, space1},
    combinator::{all_consuming, map_res, opt, recognize},
    number::complete::double,
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

/// One classified line of the line-oriented layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// Empty or padding-only line
    Blank,
    /// Line without a colon: a section title, a page marker or a payload
    Title(&'a str),
    /// `Key:Value` line, both sides trimmed
    Field(&'a str, &'a str),
}

/// Strip whitespace and the NUL padding some firmware leaves behind
pub fn trim_padding(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}

/// Classify a line. Only the first colon separates key from value, so
/// times such as `12:34:56:000` stay intact.
pub fn classify(line: &str) -> Line<'_> {
    let line = trim_padding(line);
    if line.is_empty() {
        return Line::Blank;
    }
    match line.split_once(':') {
        Some((key, value)) => Line::Field(trim_padding(key), trim_padding(value)),
        None => Line::Title(line),
    }
}

fn fixed_digits(n: usize) -> impl FnMut(&str) -> IResult<&str, u32> {
    move |input| {
        map_res(take_while_m_n(n, n, |c: char| c.is_ascii_digit()), |s: &str| {
            s.parse::<u32>()
        })(input)
    }
}

/// Fractional seconds after `:` or `.`, one to three digits, scaled to ms
fn millis(input: &str) -> IResult<&str, u32> {
    map_res(
        preceded(
            one_of(":."),
            take_while_m_n(1, 3, |c: char| c.is_ascii_digit()),
        ),
        |s: &str| s.parse::<u32>().map(|v| v * 10u32.pow(3 - s.len() as u32)),
    )(input)
}

fn device_time(input: &str) -> IResult<&str, (u32, u32, u32, u32, u32, u32, Option<u32>)> {
    let (input, (year, _, month, _, day)) = tuple((
        fixed_digits(4),
        char('-'),
        fixed_digits(2),
        char('-'),
        fixed_digits(2),
    ))(input)?;
    let (input, _) = space1(input)?;
    let (input, (hour, _, minute, _, second, ms)) = tuple((
        fixed_digits(2),
        char(':'),
        fixed_digits(2),
        char(':'),
        fixed_digits(2),
        opt(millis),
    ))(input)?;
    Ok((input, (year, month, day, hour, minute, second, ms)))
}

/// Parse a device time such as `2012-05-17 12:34:56:000`
pub fn parse_device_time(s: &str) -> Option<NaiveDateTime> {
    let (_, (year, month, day, hour, minute, second, ms)) =
        all_consuming(device_time)(trim_padding(s)).ok()?;
    NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_milli_opt(
        hour,
        minute,
        second,
        ms.unwrap_or(0),
    )
}

/// Parse a frequency such as `100 Hz` or `12.5`
pub fn parse_frequency(s: &str) -> Option<f64> {
    let parsed: IResult<&str, f64> = all_consuming(terminated(
        double,
        pair(space0, opt(tag_no_case("hz"))),
    ))(trim_padding(s));
    parsed.ok().map(|(_, value)| value)
}

/// Parse a decimal number such as `22.1` or `-3`
pub fn parse_decimal(s: &str) -> Option<f64> {
    let parsed: IResult<&str, f64> = all_consuming(double)(trim_padding(s));
    parsed.ok().map(|(_, value)| value)
}

/// Parse a signed integer such as `25548` or `-53`
pub fn parse_integer(s: &str) -> Option<i64> {
    let parsed: IResult<&str, i64> = all_consuming(map_res(
        recognize(pair(opt(one_of("+-")), digit1)),
        |s: &str| s.parse::<i64>(),
    ))(trim_padding(s));
    parsed.ok().map(|(_, value)| value)
}
