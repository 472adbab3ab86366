use super::common::{comma_list, data_type, identifier, keyword, literal, parenthesized, symbol, ws};
use super::statement::{AggregateFunction, BinaryOp, Expr, UnaryOp};
use nom::{
    branch::alt,
    bytes::complete::tag,
    combinator::{map, opt},
    multi::many0,
    sequence::{pair, preceded, separated_pair, tuple},
    IResult,
};

// Precedence, loosest first:
// OR, AND, NOT, comparison / IS / BETWEEN / IN / LIKE, + - ||, * / %, unary minus

pub fn expr(input: &str) -> IResult<&str, Expr> {
    or_expr(input)
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |left, (op, right)| Expr::binary(left, op, right))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(map(preceded(keyword("OR"), and_expr), |e| (BinaryOp::Or, e)))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(map(preceded(keyword("AND"), not_expr), |e| (BinaryOp::And, e)))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(keyword("NOT"), not_expr), |e| Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(e),
        }),
        predicate,
    ))(input)
}

enum Suffix {
    IsNull(bool),
    Between(bool, Expr, Expr),
    In(bool, Vec<Expr>),
    Like(bool, Expr),
    Compare(BinaryOp, Expr),
}

fn negation(input: &str) -> IResult<&str, bool> {
    map(opt(keyword("NOT")), |not| not.is_some())(input)
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        map(tag("<="), |_| BinaryOp::LtEq),
        map(tag(">="), |_| BinaryOp::GtEq),
        map(tag("<>"), |_| BinaryOp::NotEq),
        map(tag("!="), |_| BinaryOp::NotEq),
        map(tag("="), |_| BinaryOp::Eq),
        map(tag("<"), |_| BinaryOp::Lt),
        map(tag(">"), |_| BinaryOp::Gt),
    )))(input)
}

fn suffix(input: &str) -> IResult<&str, Suffix> {
    alt((
        map(
            tuple((keyword("IS"), negation, keyword("NULL"))),
            |(_, negated, _)| Suffix::IsNull(negated),
        ),
        map(
            tuple((
                negation,
                keyword("BETWEEN"),
                separated_pair(additive, keyword("AND"), additive),
            )),
            |(negated, _, (low, high))| Suffix::Between(negated, low, high),
        ),
        map(
            tuple((negation, keyword("IN"), parenthesized(comma_list(expr)))),
            |(negated, _, list)| Suffix::In(negated, list),
        ),
        map(
            tuple((negation, keyword("LIKE"), additive)),
            |(negated, _, pattern)| Suffix::Like(negated, pattern),
        ),
        map(pair(comparison_op, additive), |(op, right)| Suffix::Compare(op, right)),
    ))(input)
}

fn predicate(input: &str) -> IResult<&str, Expr> {
    let (input, left) = additive(input)?;
    let (input, suffix) = opt(suffix)(input)?;

    let expr = match suffix {
        None => left,
        Some(Suffix::IsNull(negated)) => Expr::IsNull {
            expr: Box::new(left),
            negated,
        },
        Some(Suffix::Between(negated, low, high)) => Expr::Between {
            expr: Box::new(left),
            low: Box::new(low),
            high: Box::new(high),
            negated,
        },
        Some(Suffix::In(negated, list)) => Expr::InList {
            expr: Box::new(left),
            list,
            negated,
        },
        Some(Suffix::Like(negated, pattern)) => Expr::Like {
            expr: Box::new(left),
            pattern: Box::new(pattern),
            negated,
        },
        Some(Suffix::Compare(op, right)) => Expr::binary(left, op, right),
    };
    Ok((input, expr))
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = multiplicative(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(tag("||"), |_| BinaryOp::Concat),
            map(tag("+"), |_| BinaryOp::Plus),
            map(tag("-"), |_| BinaryOp::Minus),
        ))),
        multiplicative,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            map(tag("*"), |_| BinaryOp::Multiply),
            map(tag("/"), |_| BinaryOp::Divide),
            map(tag("%"), |_| BinaryOp::Modulo),
        ))),
        unary,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(symbol("-"), unary), |e| Expr::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(e),
        }),
        preceded(symbol("+"), unary),
        primary,
    ))(input)
}

fn aggregate_name(input: &str) -> IResult<&str, AggregateFunction> {
    alt((
        map(keyword("COUNT"), |_| AggregateFunction::Count),
        map(keyword("SUM"), |_| AggregateFunction::Sum),
        map(keyword("AVG"), |_| AggregateFunction::Avg),
        map(keyword("MIN"), |_| AggregateFunction::Min),
        map(keyword("MAX"), |_| AggregateFunction::Max),
    ))(input)
}

// COUNT(*), COUNT([DISTINCT] e), SUM(e), AVG(e), MIN(e), MAX(e)
fn aggregate(input: &str) -> IResult<&str, Expr> {
    let (input, func) = aggregate_name(input)?;
    let (input, (distinct, arg)) = parenthesized(alt((
        map(symbol("*"), |_| (false, None)),
        map(pair(opt(keyword("DISTINCT")), expr), |(distinct, e)| {
            (distinct.is_some(), Some(Box::new(e)))
        }),
    )))(input)?;

    if arg.is_none() && func != AggregateFunction::Count {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }

    Ok((input, Expr::Aggregate { func, arg, distinct }))
}

fn cast(input: &str) -> IResult<&str, Expr> {
    map(
        preceded(
            keyword("CAST"),
            parenthesized(separated_pair(expr, keyword("AS"), data_type)),
        ),
        |(e, data_type)| Expr::Cast {
            expr: Box::new(e),
            data_type,
        },
    )(input)
}

fn function_call(input: &str) -> IResult<&str, Expr> {
    map(
        pair(
            identifier,
            parenthesized(map(opt(comma_list(expr)), Option::unwrap_or_default)),
        ),
        |(name, args)| Expr::Function {
            name: name.to_uppercase(),
            args,
        },
    )(input)
}

fn column_ref(input: &str) -> IResult<&str, Expr> {
    map(
        pair(identifier, opt(preceded(symbol("."), identifier))),
        |(first, second)| match second {
            Some(name) => Expr::Column {
                table: Some(first),
                name,
            },
            None => Expr::Column {
                table: None,
                name: first,
            },
        },
    )(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    alt((
        parenthesized(expr),
        map(literal, Expr::Literal),
        cast,
        aggregate,
        function_call,
        column_ref,
    ))(input)
}
