use super::common::keyword;
use super::statement::Statement;
use nom::{
    branch::alt,
    combinator::{map, opt},
    sequence::pair,
    IResult,
};

pub fn begin_transaction(input: &str) -> IResult<&str, Statement> {
    map(
        alt((
            map(pair(keyword("BEGIN"), opt(keyword("TRANSACTION"))), |_| ()),
            map(pair(keyword("START"), keyword("TRANSACTION")), |_| ()),
        )),
        |()| Statement::Begin,
    )(input)
}

pub fn commit_transaction(input: &str) -> IResult<&str, Statement> {
    map(pair(keyword("COMMIT"), opt(keyword("TRANSACTION"))), |_| Statement::Commit)(input)
}

pub fn rollback_transaction(input: &str) -> IResult<&str, Statement> {
    map(pair(keyword("ROLLBACK"), opt(keyword("TRANSACTION"))), |_| Statement::Rollback)(input)
}
