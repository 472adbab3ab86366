use super::common::{comma_list, identifier, keyword, keywords, parenthesized, symbol};
use super::expr::expr;
use super::queries::query;
use super::statement::{InsertSource, Statement};
use nom::{
    branch::alt,
    combinator::{cut, map, opt},
    sequence::{preceded, separated_pair, tuple},
    IResult,
};

pub fn insert(input: &str) -> IResult<&str, Statement> {
    let (input, _) = keywords(&["INSERT", "INTO"])(input)?;
    let (input, (table, columns, source)) = cut(tuple((
        identifier,
        opt(parenthesized(comma_list(identifier))),
        alt((
            map(
                preceded(keyword("VALUES"), comma_list(parenthesized(comma_list(expr)))),
                InsertSource::Values,
            ),
            map(query, |q| InsertSource::Select(Box::new(q))),
        )),
    )))(input)?;

    Ok((
        input,
        Statement::Insert {
            table,
            columns,
            source,
        },
    ))
}

pub fn update(input: &str) -> IResult<&str, Statement> {
    let (input, _) = keyword("UPDATE")(input)?;
    let (input, (table, _, assignments)) = cut(tuple((
        identifier,
        keyword("SET"),
        comma_list(separated_pair(identifier, symbol("="), expr)),
    )))(input)?;
    let (input, filter) = opt(preceded(keyword("WHERE"), expr))(input)?;

    Ok((
        input,
        Statement::Update {
            table,
            assignments,
            filter,
        },
    ))
}

pub fn delete(input: &str) -> IResult<&str, Statement> {
    let (input, _) = keywords(&["DELETE", "FROM"])(input)?;
    let (input, from) = cut(identifier)(input)?;
    let (input, filter) = opt(preceded(keyword("WHERE"), expr))(input)?;

    Ok((input, Statement::Delete { from, filter }))
}
