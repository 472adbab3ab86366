use super::common::{identifier, keyword, keywords};
use super::statement::Statement;
use nom::{
    branch::alt,
    combinator::{cut, map},
    sequence::preceded,
    IResult,
};

// SHOW TABLES | SHOW COLUMNS FROM t | SHOW VERSION
pub fn show(input: &str) -> IResult<&str, Statement> {
    preceded(
        keyword("SHOW"),
        cut(alt((
            map(keyword("TABLES"), |_| Statement::ShowTables),
            map(keyword("VERSION"), |_| Statement::ShowVersion),
            map(preceded(keywords(&["COLUMNS", "FROM"]), identifier), |table| {
                Statement::ShowColumns { table }
            }),
        ))),
    )(input)
}
