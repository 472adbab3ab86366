use super::common::{
    comma_list, data_type, identifier, keyword, keywords, parenthesized, symbol,
};
use super::expr::expr;
use super::queries::query;
use super::statement::{AlterTableOperation, ColumnDef, Expr, Statement};
use nom::{
    branch::alt,
    combinator::{cut, map, opt},
    multi::many0,
    sequence::{pair, preceded, separated_pair, tuple},
    IResult,
};

enum ColumnOption {
    NotNull,
    Null,
    PrimaryKey,
    Unique,
    Default(Expr),
}

fn column_option(input: &str) -> IResult<&str, ColumnOption> {
    alt((
        map(keywords(&["NOT", "NULL"]), |_| ColumnOption::NotNull),
        map(keyword("NULL"), |_| ColumnOption::Null),
        map(keywords(&["PRIMARY", "KEY"]), |_| ColumnOption::PrimaryKey),
        map(keyword("UNIQUE"), |_| ColumnOption::Unique),
        map(preceded(keyword("DEFAULT"), expr), ColumnOption::Default),
    ))(input)
}

pub fn column_def(input: &str) -> IResult<&str, ColumnDef> {
    let (input, name) = identifier(input)?;
    let (input, data_type) = data_type(input)?;
    let (input, options) = many0(column_option)(input)?;

    let mut column = ColumnDef {
        name,
        data_type,
        nullable: true,
        primary_key: false,
        unique: false,
        default: None,
    };
    for option in options {
        match option {
            ColumnOption::NotNull => column.nullable = false,
            ColumnOption::Null => column.nullable = true,
            ColumnOption::PrimaryKey => {
                column.primary_key = true;
                column.unique = true;
                column.nullable = false;
            }
            ColumnOption::Unique => column.unique = true,
            ColumnOption::Default(e) => column.default = Some(e),
        }
    }

    Ok((input, column))
}

fn if_not_exists(input: &str) -> IResult<&str, bool> {
    map(opt(keywords(&["IF", "NOT", "EXISTS"])), |kw| kw.is_some())(input)
}

fn if_exists(input: &str) -> IResult<&str, bool> {
    map(opt(keywords(&["IF", "EXISTS"])), |kw| kw.is_some())(input)
}

pub fn create_table(input: &str) -> IResult<&str, Statement> {
    let (input, _) = keywords(&["CREATE", "TABLE"])(input)?;
    let (input, (if_not_exists, name)) = cut(pair(if_not_exists, identifier))(input)?;
    let (input, (columns, as_select)) = cut(alt((
        map(preceded(keyword("AS"), query), |q| (Vec::new(), Some(Box::new(q)))),
        map(parenthesized(comma_list(column_def)), |columns| (columns, None)),
    )))(input)?;

    Ok((
        input,
        Statement::CreateTable {
            name,
            if_not_exists,
            columns,
            as_select,
        },
    ))
}

pub fn drop_table(input: &str) -> IResult<&str, Statement> {
    let (input, _) = keywords(&["DROP", "TABLE"])(input)?;
    let (input, (if_exists, names)) = cut(pair(if_exists, comma_list(identifier)))(input)?;

    Ok((input, Statement::DropTable { names, if_exists }))
}

fn alter_operation(input: &str) -> IResult<&str, AlterTableOperation> {
    alt((
        map(
            preceded(keywords(&["RENAME", "TO"]), identifier),
            AlterTableOperation::RenameTable,
        ),
        map(
            tuple((
                keyword("RENAME"),
                opt(keyword("COLUMN")),
                identifier,
                keyword("TO"),
                identifier,
            )),
            |(_, _, old_name, _, new_name)| AlterTableOperation::RenameColumn { old_name, new_name },
        ),
        map(
            preceded(pair(keyword("ADD"), opt(keyword("COLUMN"))), column_def),
            AlterTableOperation::AddColumn,
        ),
        map(
            preceded(
                pair(keyword("DROP"), opt(keyword("COLUMN"))),
                pair(if_exists, identifier),
            ),
            |(if_exists, name)| AlterTableOperation::DropColumn { name, if_exists },
        ),
    ))(input)
}

pub fn alter_table(input: &str) -> IResult<&str, Statement> {
    let (input, _) = keywords(&["ALTER", "TABLE"])(input)?;
    let (input, (name, operation)) = cut(pair(identifier, alter_operation))(input)?;

    Ok((input, Statement::AlterTable { name, operation }))
}

/// `CREATE INDEX name ON table (column)`
pub fn create_index(input: &str) -> IResult<&str, Statement> {
    let (input, _) = keywords(&["CREATE", "INDEX"])(input)?;
    let (input, (name, _, table, column)) = cut(tuple((
        identifier,
        keyword("ON"),
        identifier,
        parenthesized(identifier),
    )))(input)?;

    Ok((input, Statement::CreateIndex { name, table, column }))
}

/// `DROP INDEX table.name`
pub fn drop_index(input: &str) -> IResult<&str, Statement> {
    let (input, _) = keywords(&["DROP", "INDEX"])(input)?;
    let (input, (table, name)) = cut(separated_pair(identifier, symbol("."), identifier))(input)?;

    Ok((input, Statement::DropIndex { table, name }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Value};

    #[test]
    fn test_column_options() {
        let (_, col) = column_def("id INTEGER PRIMARY KEY").unwrap();
        assert!(col.primary_key && col.unique && !col.nullable);

        let (_, col) = column_def("age INT NOT NULL DEFAULT 0").unwrap();
        assert!(!col.nullable);
        assert_eq!(col.default, Some(Expr::Literal(Value::Integer(0))));

        let (_, col) = column_def("email TEXT UNIQUE NULL").unwrap();
        assert!(col.unique && col.nullable);
        assert_eq!(col.data_type, DataType::Text);
    }

    #[test]
    fn test_create_table_variants() {
        let (_, stmt) = create_table("CREATE TABLE IF NOT EXISTS t (a INT, b TEXT)").unwrap();
        match stmt {
            Statement::CreateTable { name, if_not_exists, columns, as_select } => {
                assert_eq!(name, "t");
                assert!(if_not_exists);
                assert_eq!(columns.len(), 2);
                assert!(as_select.is_none());
            }
            other => panic!("Expected CREATE TABLE, got {other:?}"),
        }

        let (_, stmt) = create_table("CREATE TABLE copy AS SELECT * FROM t").unwrap();
        assert!(matches!(stmt, Statement::CreateTable { as_select: Some(_), .. }));
    }

    #[test]
    fn test_create_table_bad_type_is_failure() {
        assert!(matches!(
            create_table("CREATE TABLE t (a INTEGR)"),
            Err(nom::Err::Failure(_))
        ));
    }

    #[test]
    fn test_drop_table_list() {
        let (_, stmt) = drop_table("DROP TABLE IF EXISTS a, b").unwrap();
        assert_eq!(
            stmt,
            Statement::DropTable {
                names: vec!["a".to_string(), "b".to_string()],
                if_exists: true
            }
        );
    }

    #[test]
    fn test_alter_table_operations() {
        let (_, stmt) = alter_table("ALTER TABLE t RENAME TO u").unwrap();
        assert!(matches!(
            stmt,
            Statement::AlterTable { operation: AlterTableOperation::RenameTable(ref n), .. } if n == "u"
        ));

        let (_, stmt) = alter_table("ALTER TABLE t RENAME COLUMN a TO b").unwrap();
        assert!(matches!(
            stmt,
            Statement::AlterTable { operation: AlterTableOperation::RenameColumn { .. }, .. }
        ));

        let (_, stmt) = alter_table("ALTER TABLE t ADD COLUMN c BOOLEAN DEFAULT TRUE").unwrap();
        assert!(matches!(
            stmt,
            Statement::AlterTable { operation: AlterTableOperation::AddColumn(_), .. }
        ));

        let (_, stmt) = alter_table("ALTER TABLE t DROP COLUMN IF EXISTS c").unwrap();
        assert!(matches!(
            stmt,
            Statement::AlterTable {
                operation: AlterTableOperation::DropColumn { if_exists: true, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_index_statements() {
        let (_, stmt) = create_index("CREATE INDEX by_name ON users (name)").unwrap();
        assert_eq!(
            stmt,
            Statement::CreateIndex {
                name: "by_name".to_string(),
                table: "users".to_string(),
                column: "name".to_string(),
            }
        );

        let (_, stmt) = drop_index("DROP INDEX users.by_name").unwrap();
        assert_eq!(
            stmt,
            Statement::DropIndex {
                table: "users".to_string(),
                name: "by_name".to_string(),
            }
        );

        assert!(matches!(
            create_index("CREATE INDEX i ON t (a, b)"),
            Err(nom::Err::Failure(_))
        ));
        assert!(matches!(drop_index("DROP INDEX i"), Err(nom::Err::Failure(_))));
    }
}
