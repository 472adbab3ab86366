// Module declarations
mod statement;
mod common;
mod expr;
mod ddl;
mod dml;
mod queries;
mod meta;
mod transaction;

pub use statement::{
    AggregateFunction, AlterTableOperation, BinaryOp, ColumnDef, Expr, InsertSource, JoinClause,
    JoinType, OrderByExpr, Query, SelectItem, SortOrder, Statement, TableRef, UnaryOp,
};

use crate::core::EngineError;
use nom::branch::alt;
use nom::IResult;

fn statement(input: &str) -> IResult<&str, Statement> {
    alt((
        queries::select,
        dml::insert,
        dml::update,
        dml::delete,
        ddl::create_table,
        ddl::drop_table,
        ddl::alter_table,
        ddl::create_index,
        ddl::drop_index,
        transaction::begin_transaction,
        transaction::commit_transaction,
        transaction::rollback_transaction,
        meta::show,
    ))(input)
}

/// Parses a single statement, ignoring a trailing `;`
pub fn parse_statement(sql: &str) -> Result<Statement, EngineError> {
    let mut statements = parse_batch(sql)?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        n => Err(syntax_error(
            sql,
            sql,
            &format!("expected exactly one statement, found {n}"),
        )),
    }
}

/// Parses `;`-separated statements; the final terminator is optional.
///
/// The whole text is parsed up front, so a syntax error anywhere means no
/// statement of the batch is returned.
pub fn parse_batch(sql: &str) -> Result<Vec<Statement>, EngineError> {
    let mut statements = Vec::new();
    let mut input = skip_separators(sql);

    while !input.is_empty() {
        match statement(input) {
            Ok((rest, stmt)) => {
                statements.push(stmt);
                let (rest, ()) = common::sp(rest).unwrap_or((rest, ()));
                if rest.is_empty() {
                    break;
                }
                let Some(rest) = rest.strip_prefix(';') else {
                    return Err(syntax_error(sql, rest, &unexpected(rest)));
                };
                input = skip_separators(rest);
            }
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                let at = common::sp(e.input).map_or(e.input, |(rest, ())| rest);
                return Err(syntax_error(sql, at, &unexpected(at)));
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(syntax_error(sql, "", "unexpected end of input"));
            }
        }
    }

    Ok(statements)
}

fn skip_separators(mut input: &str) -> &str {
    loop {
        input = common::sp(input).map_or(input, |(rest, ())| rest);
        match input.strip_prefix(';') {
            Some(rest) => input = rest,
            None => return input,
        }
    }
}

fn unexpected(rest: &str) -> String {
    let token: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace())
        .take(20)
        .collect();
    if token.is_empty() {
        "unexpected end of input".to_string()
    } else {
        format!("unexpected input near '{token}'")
    }
}

/// Builds a syntax error for `rest`, a suffix of `sql`
fn syntax_error(sql: &str, rest: &str, message: &str) -> EngineError {
    let position = sql.len().saturating_sub(rest.len());
    let consumed = &sql[..position];
    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rsplit('\n')
        .next()
        .map_or(0, |l| l.chars().count())
        + 1;

    EngineError::Syntax {
        position,
        line,
        column,
        message: message.to_string(),
    }
}
