use super::common::{comma_list, identifier, keyword, keywords, symbol, unsigned};
use super::expr::expr;
use super::statement::{
    JoinClause, JoinType, OrderByExpr, Query, SelectItem, SortOrder, Statement, TableRef,
};
use nom::{
    branch::alt,
    combinator::{consumed, map, opt},
    multi::many0,
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};

fn alias(input: &str) -> IResult<&str, String> {
    preceded(opt(keyword("AS")), identifier)(input)
}

// Parse select item: *, t.*, or expression with optional alias
fn select_item(input: &str) -> IResult<&str, SelectItem> {
    alt((
        map(symbol("*"), |_| SelectItem::Wildcard),
        map(
            terminated(identifier, pair(symbol("."), symbol("*"))),
            SelectItem::QualifiedWildcard,
        ),
        map(pair(consumed(expr), opt(alias)), |((text, expr), alias)| {
            SelectItem::Expr {
                expr,
                alias,
                text: text.trim().to_string(),
            }
        }),
    ))(input)
}

pub fn table_ref(input: &str) -> IResult<&str, TableRef> {
    map(pair(identifier, opt(alias)), |(name, alias)| TableRef { name, alias })(input)
}

// Parse JOIN clause: [INNER | LEFT [OUTER]] JOIN table [alias] ON expr
fn join_clause(input: &str) -> IResult<&str, JoinClause> {
    let (input, join_type) = alt((
        map(keywords(&["INNER", "JOIN"]), |_| JoinType::Inner),
        map(
            tuple((keyword("LEFT"), opt(keyword("OUTER")), keyword("JOIN"))),
            |_| JoinType::Left,
        ),
        map(keyword("JOIN"), |_| JoinType::Inner),
    ))(input)?;
    let (input, table) = table_ref(input)?;
    let (input, on) = preceded(keyword("ON"), expr)(input)?;

    Ok((input, JoinClause { join_type, table, on }))
}

fn order_by_item(input: &str) -> IResult<&str, OrderByExpr> {
    map(
        pair(
            expr,
            opt(alt((
                map(keyword("ASC"), |_| SortOrder::Asc),
                map(keyword("DESC"), |_| SortOrder::Desc),
            ))),
        ),
        |(expr, order)| OrderByExpr {
            expr,
            order: order.unwrap_or(SortOrder::Asc),
        },
    )(input)
}

pub fn query(input: &str) -> IResult<&str, Query> {
    let (input, _) = keyword("SELECT")(input)?;
    let (input, distinct) = map(opt(keyword("DISTINCT")), |d| d.is_some())(input)?;
    let (input, projection) = comma_list(select_item)(input)?;

    let (input, from) = opt(preceded(keyword("FROM"), table_ref))(input)?;
    let (input, joins) = if from.is_some() {
        many0(join_clause)(input)?
    } else {
        (input, Vec::new())
    };

    let (input, filter) = opt(preceded(keyword("WHERE"), expr))(input)?;
    let (input, group_by) = map(
        opt(preceded(keywords(&["GROUP", "BY"]), comma_list(expr))),
        Option::unwrap_or_default,
    )(input)?;
    let (input, having) = opt(preceded(keyword("HAVING"), expr))(input)?;
    let (input, order_by) = map(
        opt(preceded(keywords(&["ORDER", "BY"]), comma_list(order_by_item))),
        Option::unwrap_or_default,
    )(input)?;
    let (input, limit) = opt(preceded(keyword("LIMIT"), unsigned))(input)?;
    let (input, offset) = opt(preceded(keyword("OFFSET"), unsigned))(input)?;

    Ok((
        input,
        Query {
            distinct,
            projection,
            from,
            joins,
            filter,
            group_by,
            having,
            order_by,
            limit,
            offset,
        },
    ))
}

pub fn select(input: &str) -> IResult<&str, Statement> {
    map(query, |q| Statement::Select(Box::new(q)))(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::statement::{BinaryOp, Expr};

    fn parse(sql: &str) -> Query {
        let (rest, q) = query(sql).unwrap();
        assert!(rest.is_empty(), "unparsed input: {rest}");
        q
    }

    #[test]
    fn test_select_without_from() {
        let q = parse("SELECT 1 + 1");
        assert!(q.from.is_none());
        assert_eq!(q.projection[0].label().as_deref(), Some("1 + 1"));
    }

    #[test]
    fn test_select_aliases() {
        let q = parse("SELECT u.name AS n, age years FROM users u");
        assert_eq!(q.projection[0].label().as_deref(), Some("n"));
        assert_eq!(q.projection[1].label().as_deref(), Some("years"));
        let from = q.from.unwrap();
        assert_eq!(from.name, "users");
        assert_eq!(from.visible_name(), "u");
    }

    #[test]
    fn test_select_wildcards() {
        let q = parse("SELECT *, o.* FROM users JOIN orders o ON users.id = o.user_id");
        assert_eq!(q.projection[0], SelectItem::Wildcard);
        assert_eq!(q.projection[1], SelectItem::QualifiedWildcard("o".to_string()));
    }

    #[test]
    fn test_joins() {
        let q = parse(
            "SELECT * FROM a INNER JOIN b ON a.id = b.a_id LEFT OUTER JOIN c ON c.id = b.c_id",
        );
        assert_eq!(q.joins.len(), 2);
        assert_eq!(q.joins[0].join_type, JoinType::Inner);
        assert_eq!(q.joins[1].join_type, JoinType::Left);
        assert!(matches!(q.joins[1].on, Expr::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_full_clause_chain() {
        let q = parse(
            "SELECT DISTINCT city, COUNT(*) AS n FROM users WHERE age > 18 \
             GROUP BY city HAVING COUNT(*) > 1 ORDER BY n DESC, city LIMIT 10 OFFSET 5",
        );
        assert!(q.distinct);
        assert!(q.filter.is_some());
        assert_eq!(q.group_by.len(), 1);
        assert!(q.having.is_some());
        assert_eq!(q.order_by.len(), 2);
        assert_eq!(q.order_by[0].order, SortOrder::Desc);
        assert_eq!(q.order_by[1].order, SortOrder::Asc);
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, Some(5));
    }

    #[test]
    fn test_where_stops_before_keywords() {
        let (rest, q) = query("SELECT * FROM t WHERE a = 1 LIMIT 1 garbage").unwrap();
        assert_eq!(q.limit, Some(1));
        assert_eq!(rest, "garbage");
    }
}
