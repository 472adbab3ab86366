use crate::core::value::{parse_date, parse_timestamp};
use crate::core::{DataType, Value};
use rust_decimal::Decimal;
use std::str::FromStr;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_while, take_while1},
    character::complete::{alpha1, char, digit0, digit1, one_of, satisfy},
    combinator::{map, map_res, not, opt, recognize, verify},
    multi::fold_many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// Words that end an expression or a table reference and therefore cannot be
/// used as bare identifiers or implicit aliases.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "HAVING", "ORDER", "LIMIT", "OFFSET", "JOIN",
    "INNER", "LEFT", "OUTER", "ON", "AND", "OR", "NOT", "IS", "NULL", "IN", "LIKE", "BETWEEN",
    "AS", "ASC", "DESC", "DISTINCT", "TRUE", "FALSE", "VALUES", "SET",
];

pub fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}

/// Skips whitespace and `--` line comments
#[allow(clippy::unnecessary_wraps)]
pub fn sp(input: &str) -> IResult<&str, ()> {
    let mut rest = input.trim_start();
    while let Some(comment) = rest.strip_prefix("--") {
        rest = comment.find('\n').map_or("", |i| &comment[i..]).trim_start();
    }
    Ok((rest, ()))
}

pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(sp, inner, sp)
}

/// Case-insensitive keyword that must not run into a following identifier
/// character (`IN` does not match the start of `INNER`).
pub fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(terminated(tag_no_case(kw), not(satisfy(is_ident_char))))
}

/// `kw1 kw2 ...` separated by arbitrary whitespace
pub fn keywords<'a>(kws: &'static [&'static str]) -> impl FnMut(&'a str) -> IResult<&'a str, ()> {
    move |mut input: &'a str| {
        for kw in kws {
            let (rest, _) = keyword(*kw)(input)?;
            input = rest;
        }
        Ok((input, ()))
    }
}

pub fn symbol<'a>(s: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(tag(s))
}

fn bare_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(alt((alpha1, tag("_"))), take_while(is_ident_char)))(input)
}

/// Bare or `"quoted"` identifier; bare identifiers may not be reserved words
pub fn identifier(input: &str) -> IResult<&str, String> {
    ws(alt((
        map(delimited(char('"'), is_not("\""), char('"')), str::to_string),
        map(verify(bare_identifier, |s: &str| !is_reserved(s)), str::to_string),
    )))(input)
}

pub fn comma_list<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    nom::multi::separated_list1(symbol(","), inner)
}

pub fn parenthesized<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(symbol("("), inner, symbol(")"))
}

fn type_length(input: &str) -> IResult<&str, ()> {
    map(
        opt(parenthesized(pair(digit1, opt(preceded(symbol(","), ws(digit1)))))),
        |_| (),
    )(input)
}

pub fn data_type(input: &str) -> IResult<&str, DataType> {
    alt((
        map(
            alt((
                keyword("INTEGER"),
                keyword("INT"),
                keyword("BIGINT"),
                keyword("SMALLINT"),
            )),
            |_| DataType::Integer,
        ),
        map(
            alt((
                keyword("FLOAT"),
                keyword("REAL"),
                map(pair(keyword("DOUBLE"), opt(keyword("PRECISION"))), |(kw, _)| kw),
            )),
            |_| DataType::Float,
        ),
        map(
            terminated(alt((keyword("DECIMAL"), keyword("NUMERIC"))), type_length),
            |_| DataType::Decimal,
        ),
        map(
            alt((
                keyword("TEXT"),
                terminated(keyword("VARCHAR"), type_length),
                terminated(keyword("CHAR"), type_length),
            )),
            |_| DataType::Text,
        ),
        map(alt((keyword("BOOLEAN"), keyword("BOOL"))), |_| DataType::Boolean),
        map(keyword("DATE"), |_| DataType::Date),
        map(keyword("TIMESTAMP"), |_| DataType::Timestamp),
        map(keyword("UUID"), |_| DataType::Uuid),
        map(keyword("BYTEA"), |_| DataType::Bytea),
    ))(input)
}

/// `'text'` with `''` as the escaped quote
pub fn string_literal(input: &str) -> IResult<&str, String> {
    ws(delimited(
        char('\''),
        fold_many0(
            alt((is_not("'"), map(tag("''"), |_| "'"))),
            String::new,
            |mut acc, part| {
                acc.push_str(part);
                acc
            },
        ),
        char('\''),
    ))(input)
}

fn number(input: &str) -> IResult<&str, Value> {
    map_res(
        ws(recognize(tuple((
            digit1,
            opt(pair(char('.'), digit0)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        )))),
        |s: &str| -> Result<Value, String> {
            if s.contains(['.', 'e', 'E']) {
                return s.parse().map(Value::Float).map_err(|e| e.to_string());
            }
            match s.parse::<i64>() {
                Ok(i) => Ok(Value::Integer(i)),
                Err(_) => Decimal::from_str(s)
                    .map(Value::Decimal)
                    .map_err(|e| e.to_string()),
            }
        },
    )(input)
}

fn hex_literal(input: &str) -> IResult<&str, Value> {
    map_res(
        ws(preceded(
            one_of("xX"),
            delimited(char('\''), take_while(|c: char| c.is_ascii_hexdigit()), char('\'')),
        )),
        |s: &str| hex::decode(s).map(Value::Bytea),
    )(input)
}

/// Literal value: NULL, TRUE, FALSE, numbers, strings, `DATE '...'`,
/// `TIMESTAMP '...'` and `X'...'`
pub fn literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(keyword("NULL"), |_| Value::Null),
        map(keyword("TRUE"), |_| Value::Boolean(true)),
        map(keyword("FALSE"), |_| Value::Boolean(false)),
        map_res(preceded(keyword("DATE"), string_literal), |s: String| {
            parse_date(&s).map(Value::Date).ok_or("invalid date")
        }),
        map_res(preceded(keyword("TIMESTAMP"), string_literal), |s: String| {
            parse_timestamp(&s).map(Value::Timestamp).ok_or("invalid timestamp")
        }),
        hex_literal,
        number,
        map(string_literal, Value::Text),
    ))(input)
}

pub fn unsigned(input: &str) -> IResult<&str, usize> {
    map_res(ws(take_while1(|c: char| c.is_ascii_digit())), |s: &str| {
        s.parse::<usize>()
    })(input)
}
