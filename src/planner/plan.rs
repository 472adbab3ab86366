use crate::core::{DataType, Schema, SchemaIndex, Value};
use crate::parser::{AggregateFunction, BinaryOp, JoinType, SortOrder, UnaryOp};

/// Validated, schema-bound form of one statement
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    CreateTable {
        schema: Schema,
        if_not_exists: bool,
    },
    /// `CREATE TABLE ... AS SELECT`; column types come from the query
    CreateTableAs {
        name: String,
        if_not_exists: bool,
        query: Box<SelectPlan>,
    },
    DropTable {
        names: Vec<String>,
        if_exists: bool,
    },
    AlterTable {
        table: String,
        schema: Schema,
        rewrite: RowRewrite,
    },
    CreateIndex {
        table: String,
        index: SchemaIndex,
    },
    DropIndex {
        table: String,
        name: String,
    },
    Insert {
        schema: Schema,
        source: InsertPlan,
    },
    Update {
        schema: Schema,
        /// Column index and its new value, in SET order
        assignments: Vec<(usize, BoundExpr)>,
        filter: Option<BoundExpr>,
    },
    Delete {
        table: String,
        filter: Option<BoundExpr>,
    },
    Select(Box<SelectPlan>),
    Begin,
    Commit,
    Rollback,
    ShowTables,
    ShowColumns {
        schema: Schema,
    },
    ShowVersion,
    /// Statement that does nothing, e.g. `CREATE TABLE IF NOT EXISTS` on an
    /// existing table
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TableExists,
    ColumnMissing,
}

/// How existing rows change when a table is altered
#[derive(Debug, Clone, PartialEq)]
pub enum RowRewrite {
    Keep,
    Append(Value),
    Remove(usize),
}

/// Source rows of an INSERT, already laid out in table column order
#[derive(Debug, Clone, PartialEq)]
pub enum InsertPlan {
    Values(Vec<Vec<BoundExpr>>),
    /// `targets[i]` is the table column receiving the query's i-th output;
    /// untargeted columns take their default
    Query {
        query: Box<SelectPlan>,
        targets: Vec<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    /// FROM table followed by joined tables; empty for `SELECT 1`
    pub sources: Vec<Source>,
    /// WHERE conjuncts not pushed to a single source
    pub filter: Option<BoundExpr>,
    pub aggregate: Option<AggregatePlan>,
    pub having: Option<BoundExpr>,
    pub order_by: Vec<(BoundExpr, SortOrder)>,
    pub projection: Vec<BoundExpr>,
    pub labels: Vec<String>,
    /// Statically known output types, `None` where only the data can tell
    pub types: Vec<Option<DataType>>,
    pub distinct: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub table: String,
    pub width: usize,
    /// `None` for the FROM table
    pub join: Option<Join>,
    /// Filter over this table's own row, pushed below the joins
    pub filter: Option<BoundExpr>,
    /// Index lookup narrowing the scan; `filter` still applies to its rows
    pub index: Option<IndexScan>,
}

/// Rows whose indexed column equals `value`
#[derive(Debug, Clone, PartialEq)]
pub struct IndexScan {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub on: BoundExpr,
}

/// GROUP BY keys and the aggregate calls of a grouped query.
///
/// Expressions above the aggregation see a row made of the key values
/// followed by one value per aggregate call.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePlan {
    pub group_by: Vec<BoundExpr>,
    pub calls: Vec<AggregateCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub func: AggregateFunction,
    /// `None` for `COUNT(*)`
    pub arg: Option<BoundExpr>,
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunction {
    Upper,
    Lower,
    Length,
    Abs,
    Round,
    Coalesce,
    Now,
    GenerateUuid,
}

impl ScalarFunction {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_uppercase().as_str() {
            "UPPER" => Self::Upper,
            "LOWER" => Self::Lower,
            "LENGTH" | "CHAR_LENGTH" => Self::Length,
            "ABS" => Self::Abs,
            "ROUND" => Self::Round,
            "COALESCE" => Self::Coalesce,
            "NOW" | "CURRENT_TIMESTAMP" => Self::Now,
            "GENERATE_UUID" | "GEN_RANDOM_UUID" => Self::GenerateUuid,
            _ => return None,
        })
    }

    /// Accepted argument counts, inclusive
    #[must_use]
    pub const fn arity(self) -> (usize, usize) {
        match self {
            Self::Upper | Self::Lower | Self::Length | Self::Abs => (1, 1),
            Self::Round => (1, 2),
            Self::Coalesce => (1, usize::MAX),
            Self::Now | Self::GenerateUuid => (0, 0),
        }
    }
}

/// Expression with column references resolved to row positions
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    Literal(Value),
    Column(usize),
    Unary {
        op: UnaryOp,
        expr: Box<BoundExpr>,
    },
    Binary {
        left: Box<BoundExpr>,
        op: BinaryOp,
        right: Box<BoundExpr>,
    },
    IsNull {
        expr: Box<BoundExpr>,
        negated: bool,
    },
    Between {
        expr: Box<BoundExpr>,
        low: Box<BoundExpr>,
        high: Box<BoundExpr>,
        negated: bool,
    },
    InList {
        expr: Box<BoundExpr>,
        list: Vec<BoundExpr>,
        negated: bool,
    },
    Like {
        expr: Box<BoundExpr>,
        pattern: Box<BoundExpr>,
        negated: bool,
    },
    Cast {
        expr: Box<BoundExpr>,
        data_type: DataType,
    },
    Function {
        func: ScalarFunction,
        args: Vec<BoundExpr>,
    },
}

impl BoundExpr {
    /// Row positions this expression reads
    pub fn columns(&self, out: &mut Vec<usize>) {
        match self {
            Self::Literal(_) => {}
            Self::Column(idx) => out.push(*idx),
            Self::Unary { expr, .. }
            | Self::IsNull { expr, .. }
            | Self::Cast { expr, .. } => expr.columns(out),
            Self::Binary { left, right, .. } => {
                left.columns(out);
                right.columns(out);
            }
            Self::Between { expr, low, high, .. } => {
                expr.columns(out);
                low.columns(out);
                high.columns(out);
            }
            Self::InList { expr, list, .. } => {
                expr.columns(out);
                list.iter().for_each(|e| e.columns(out));
            }
            Self::Like { expr, pattern, .. } => {
                expr.columns(out);
                pattern.columns(out);
            }
            Self::Function { args, .. } => args.iter().for_each(|e| e.columns(out)),
        }
    }

    /// Same expression with every column position moved down by `offset`
    #[must_use]
    pub fn shifted(self, offset: usize) -> Self {
        let shift = |e: Box<Self>| Box::new(e.shifted(offset));
        match self {
            Self::Literal(v) => Self::Literal(v),
            Self::Column(idx) => Self::Column(idx - offset),
            Self::Unary { op, expr } => Self::Unary { op, expr: shift(expr) },
            Self::Binary { left, op, right } => Self::Binary {
                left: shift(left),
                op,
                right: shift(right),
            },
            Self::IsNull { expr, negated } => Self::IsNull {
                expr: shift(expr),
                negated,
            },
            Self::Between {
                expr,
                low,
                high,
                negated,
            } => Self::Between {
                expr: shift(expr),
                low: shift(low),
                high: shift(high),
                negated,
            },
            Self::InList {
                expr,
                list,
                negated,
            } => Self::InList {
                expr: shift(expr),
                list: list.into_iter().map(|e| e.shifted(offset)).collect(),
                negated,
            },
            Self::Like {
                expr,
                pattern,
                negated,
            } => Self::Like {
                expr: shift(expr),
                pattern: shift(pattern),
                negated,
            },
            Self::Cast { expr, data_type } => Self::Cast {
                expr: shift(expr),
                data_type,
            },
            Self::Function { func, args } => Self::Function {
                func,
                args: args.into_iter().map(|e| e.shifted(offset)).collect(),
            },
        }
    }

    /// Splits a conjunction into its `AND`ed parts
    #[must_use]
    pub fn into_conjuncts(self) -> Vec<Self> {
        match self {
            Self::Binary {
                left,
                op: BinaryOp::And,
                right,
            } => {
                let mut parts = left.into_conjuncts();
                parts.extend(right.into_conjuncts());
                parts
            }
            other => vec![other],
        }
    }

    #[must_use]
    pub fn conjunction(parts: Vec<Self>) -> Option<Self> {
        parts.into_iter().reduce(|left, right| Self::Binary {
            left: Box::new(left),
            op: BinaryOp::And,
            right: Box::new(right),
        })
    }
}
