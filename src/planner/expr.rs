use crate::core::{DataType, SemanticError, Value};
use crate::parser::{AggregateFunction, BinaryOp, Expr, UnaryOp};
use super::plan::{AggregateCall, BoundExpr, ScalarFunction};
use super::scope::Scope;

/// GROUP BY keys of a grouped query and the aggregate calls collected
/// while binding the clauses above the aggregation
#[derive(Debug, Default)]
pub struct Grouping {
    pub keys: Vec<BoundExpr>,
    pub calls: Vec<AggregateCall>,
}

impl Grouping {
    #[must_use]
    pub const fn new(keys: Vec<BoundExpr>) -> Self {
        Self {
            keys,
            calls: Vec::new(),
        }
    }

    fn slot_type(&self, idx: usize, scope: &Scope) -> Option<DataType> {
        let source = |i: usize| Some(scope.column(i).data_type);
        match self.keys.get(idx) {
            Some(key) => infer_type(key, &source),
            None => {
                let call = &self.calls[idx - self.keys.len()];
                let arg = call.arg.as_ref().and_then(|a| infer_type(a, &source));
                aggregate_type(call.func, arg)
            }
        }
    }
}

/// Resolves AST expressions against a scope.
///
/// A plain binder rejects aggregates. A grouped binder maps GROUP BY keys
/// and aggregate calls to positions of the aggregated row and rejects bare
/// columns that are not grouped.
pub struct Binder<'a> {
    scope: &'a Scope,
    clause: &'static str,
    grouping: Option<&'a mut Grouping>,
}

impl<'a> Binder<'a> {
    /// `clause` names the clause in aggregate misuse errors
    #[must_use]
    pub const fn new(scope: &'a Scope, clause: &'static str) -> Self {
        Self {
            scope,
            clause,
            grouping: None,
        }
    }

    #[must_use]
    pub const fn grouped(scope: &'a Scope, clause: &'static str, grouping: &'a mut Grouping) -> Self {
        Self {
            scope,
            clause,
            grouping: Some(grouping),
        }
    }

    pub fn bind(&mut self, expr: &Expr) -> Result<BoundExpr, SemanticError> {
        if let Some(grouping) = self.grouping.as_deref() {
            if !expr.contains_aggregate() {
                if let Ok(bound) = Binder::new(self.scope, self.clause).bind(expr) {
                    if let Some(idx) = grouping.keys.iter().position(|k| *k == bound) {
                        return Ok(BoundExpr::Column(idx));
                    }
                }
            }
        }

        let bound = match expr {
            Expr::Literal(value) => BoundExpr::Literal(value.clone()),
            Expr::Column { table, name } => {
                let idx = self.scope.resolve(table.as_deref(), name)?;
                if self.grouping.is_some() {
                    return Err(SemanticError::NotGrouped(name.clone()));
                }
                BoundExpr::Column(idx)
            }
            Expr::Aggregate {
                func,
                arg,
                distinct,
            } => return self.bind_aggregate(*func, arg.as_deref(), *distinct),
            Expr::Unary { op, expr } => BoundExpr::Unary {
                op: *op,
                expr: Box::new(self.bind(expr)?),
            },
            Expr::Binary { left, op, right } => {
                let mut left = self.bind(left)?;
                let mut right = self.bind(right)?;
                if op.is_comparison() {
                    right = self.coerce_against(&left, right)?;
                    left = self.coerce_against(&right, left)?;
                }
                BoundExpr::Binary {
                    left: Box::new(left),
                    op: *op,
                    right: Box::new(right),
                }
            }
            Expr::IsNull { expr, negated } => BoundExpr::IsNull {
                expr: Box::new(self.bind(expr)?),
                negated: *negated,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let expr = self.bind(expr)?;
                let low = self.bind(low)?;
                let low = self.coerce_against(&expr, low)?;
                let high = self.bind(high)?;
                let high = self.coerce_against(&expr, high)?;
                BoundExpr::Between {
                    expr: Box::new(expr),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated: *negated,
                }
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let expr = self.bind(expr)?;
                let list = list
                    .iter()
                    .map(|item| {
                        let item = self.bind(item)?;
                        self.coerce_against(&expr, item)
                    })
                    .collect::<Result<_, _>>()?;
                BoundExpr::InList {
                    expr: Box::new(expr),
                    list,
                    negated: *negated,
                }
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => BoundExpr::Like {
                expr: Box::new(self.bind(expr)?),
                pattern: Box::new(self.bind(pattern)?),
                negated: *negated,
            },
            Expr::Cast { expr, data_type } => BoundExpr::Cast {
                expr: Box::new(self.bind(expr)?),
                data_type: *data_type,
            },
            Expr::Function { name, args } => {
                let func = ScalarFunction::from_name(name)
                    .ok_or_else(|| SemanticError::UnknownFunction(name.clone()))?;
                let (min, max) = func.arity();
                if args.len() < min || args.len() > max {
                    return Err(SemanticError::FunctionArity {
                        name: name.clone(),
                        expected: min,
                        found: args.len(),
                    });
                }
                BoundExpr::Function {
                    func,
                    args: args.iter().map(|a| self.bind(a)).collect::<Result<_, _>>()?,
                }
            }
        };
        Ok(bound)
    }

    fn bind_aggregate(
        &mut self,
        func: AggregateFunction,
        arg: Option<&Expr>,
        distinct: bool,
    ) -> Result<BoundExpr, SemanticError> {
        let Some(grouping) = self.grouping.as_deref_mut() else {
            return Err(SemanticError::MisplacedAggregate(self.clause));
        };
        let arg = arg
            .map(|a| Binder::new(self.scope, "aggregate arguments").bind(a))
            .transpose()?;

        let call = AggregateCall {
            func,
            arg,
            distinct,
        };
        let idx = grouping
            .calls
            .iter()
            .position(|c| *c == call)
            .unwrap_or_else(|| {
                grouping.calls.push(call);
                grouping.calls.len() - 1
            });
        Ok(BoundExpr::Column(grouping.keys.len() + idx))
    }

    /// Coerces a literal compared with a source column to the column's type
    fn coerce_against(
        &self,
        target: &BoundExpr,
        other: BoundExpr,
    ) -> Result<BoundExpr, SemanticError> {
        if self.grouping.is_some() {
            return Ok(other);
        }
        let (BoundExpr::Column(idx), BoundExpr::Literal(value)) = (target, &other) else {
            return Ok(other);
        };

        let column = self.scope.column(*idx);
        let lenient = value
            .data_type()
            .is_some_and(|t| t.is_numeric() && column.data_type.is_numeric());
        if lenient {
            return Ok(other);
        }
        Ok(BoundExpr::Literal(coerce_literal(value, &column.name, column.data_type)?))
    }

    /// Static type of a bound expression, where one can be derived
    #[must_use]
    pub fn type_of(&self, expr: &BoundExpr) -> Option<DataType> {
        match self.grouping.as_deref() {
            None => infer_type(expr, &|i| Some(self.scope.column(i).data_type)),
            Some(grouping) => infer_type(expr, &|i| grouping.slot_type(i, self.scope)),
        }
    }
}

/// Converts a literal stored into or compared with `column`
pub fn coerce_literal(value: &Value, column: &str, target: DataType) -> Result<Value, SemanticError> {
    value.coerce(target).ok_or_else(|| SemanticError::TypeMismatch {
        column: column.to_string(),
        expected: target.to_string(),
        found: value
            .data_type()
            .map_or_else(|| "NULL".to_string(), |t| t.to_string()),
    })
}

pub fn infer_type(expr: &BoundExpr, slot: &dyn Fn(usize) -> Option<DataType>) -> Option<DataType> {
    match expr {
        BoundExpr::Literal(value) => value.data_type(),
        BoundExpr::Column(idx) => slot(*idx),
        BoundExpr::Unary {
            op: UnaryOp::Not, ..
        }
        | BoundExpr::IsNull { .. }
        | BoundExpr::Between { .. }
        | BoundExpr::InList { .. }
        | BoundExpr::Like { .. } => Some(DataType::Boolean),
        BoundExpr::Unary {
            op: UnaryOp::Neg,
            expr,
        } => infer_type(expr, slot),
        BoundExpr::Binary { op, .. } if op.is_comparison() => Some(DataType::Boolean),
        BoundExpr::Binary {
            op: BinaryOp::And | BinaryOp::Or,
            ..
        } => Some(DataType::Boolean),
        BoundExpr::Binary {
            op: BinaryOp::Concat,
            ..
        } => Some(DataType::Text),
        BoundExpr::Binary { left, right, .. } => {
            numeric_result(infer_type(left, slot)?, infer_type(right, slot)?)
        }
        BoundExpr::Cast { data_type, .. } => Some(*data_type),
        BoundExpr::Function { func, args } => match func {
            ScalarFunction::Upper | ScalarFunction::Lower => Some(DataType::Text),
            ScalarFunction::Length => Some(DataType::Integer),
            ScalarFunction::Abs | ScalarFunction::Round => {
                args.first().and_then(|a| infer_type(a, slot))
            }
            ScalarFunction::Coalesce => args.iter().find_map(|a| infer_type(a, slot)),
            ScalarFunction::Now => Some(DataType::Timestamp),
            ScalarFunction::GenerateUuid => Some(DataType::Uuid),
        },
    }
}

fn numeric_result(left: DataType, right: DataType) -> Option<DataType> {
    match (left, right) {
        (l, r) if l == r => Some(l),
        (DataType::Float, _) | (_, DataType::Float) => Some(DataType::Float),
        (DataType::Decimal, _) | (_, DataType::Decimal) => Some(DataType::Decimal),
        _ => None,
    }
}

#[must_use]
pub const fn aggregate_type(func: AggregateFunction, arg: Option<DataType>) -> Option<DataType> {
    match func {
        AggregateFunction::Count => Some(DataType::Integer),
        AggregateFunction::Avg => match arg {
            Some(DataType::Decimal) => Some(DataType::Decimal),
            _ => Some(DataType::Float),
        },
        AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => arg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, Schema};
    use crate::parser::parse_statement;
    use crate::parser::{SelectItem, Statement};
    use chrono::NaiveDate;

    fn scope() -> Scope {
        Scope::for_table(&Schema::new(
            "events",
            vec![
                Column::new("id", DataType::Integer),
                Column::new("day", DataType::Date),
                Column::new("name", DataType::Text),
            ],
        ))
    }

    /// Parses `SELECT <sql>` and returns the single projected expression
    fn parse_expr(sql: &str) -> Expr {
        match parse_statement(&format!("SELECT {sql}")).unwrap() {
            Statement::Select(q) => match q.projection.into_iter().next().unwrap() {
                SelectItem::Expr { expr, .. } => expr,
                other => panic!("Expected expression, got {other:?}"),
            },
            other => panic!("Expected SELECT, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_coerced_to_column_type() {
        let scope = scope();
        let bound = Binder::new(&scope, "WHERE")
            .bind(&parse_expr("day = '2024-01-01'"))
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            bound,
            BoundExpr::Binary {
                left: Box::new(BoundExpr::Column(1)),
                op: BinaryOp::Eq,
                right: Box::new(BoundExpr::Literal(Value::Date(day))),
            }
        );
    }

    #[test]
    fn test_incompatible_literal_names_column() {
        let scope = scope();
        let err = Binder::new(&scope, "WHERE")
            .bind(&parse_expr("id = 'abc'"))
            .unwrap_err();
        assert!(matches!(err, SemanticError::TypeMismatch { ref column, .. } if column == "id"));
    }

    #[test]
    fn test_numeric_literals_compare_across_types() {
        let scope = scope();
        assert!(Binder::new(&scope, "WHERE").bind(&parse_expr("id > 1.5")).is_ok());
    }

    #[test]
    fn test_aggregate_outside_grouping_is_rejected() {
        let scope = scope();
        let err = Binder::new(&scope, "WHERE")
            .bind(&parse_expr("COUNT(*) > 1"))
            .unwrap_err();
        assert_eq!(err, SemanticError::MisplacedAggregate("WHERE"));
    }

    #[test]
    fn test_grouped_binding() {
        let scope = scope();
        let mut grouping = Grouping::new(vec![BoundExpr::Column(2)]);

        let mut binder = Binder::grouped(&scope, "SELECT", &mut grouping);
        assert_eq!(binder.bind(&parse_expr("name")).unwrap(), BoundExpr::Column(0));
        assert_eq!(binder.bind(&parse_expr("MAX(id)")).unwrap(), BoundExpr::Column(1));
        assert_eq!(binder.bind(&parse_expr("max(id)")).unwrap(), BoundExpr::Column(1));
        assert_eq!(binder.type_of(&BoundExpr::Column(1)), Some(DataType::Integer));
        assert_eq!(
            binder.bind(&parse_expr("id")),
            Err(SemanticError::NotGrouped("id".to_string()))
        );
        assert_eq!(grouping.calls.len(), 1);
    }

    #[test]
    fn test_unknown_function_and_arity() {
        let scope = scope();
        let mut binder = Binder::new(&scope, "SELECT");
        assert_eq!(
            binder.bind(&parse_expr("FROBNICATE(id)")),
            Err(SemanticError::UnknownFunction("FROBNICATE".to_string()))
        );
        assert!(matches!(
            binder.bind(&parse_expr("UPPER(name, name)")),
            Err(SemanticError::FunctionArity { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn test_infer_type() {
        let scope = scope();
        let mut binder = Binder::new(&scope, "SELECT");
        let bound = binder.bind(&parse_expr("id * 2.5")).unwrap();
        assert_eq!(binder.type_of(&bound), Some(DataType::Float));
        let bound = binder.bind(&parse_expr("name || '!'")).unwrap();
        assert_eq!(binder.type_of(&bound), Some(DataType::Text));
    }
}
