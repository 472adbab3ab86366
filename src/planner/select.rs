use crate::core::{EngineError, Schema, SemanticError, Value};
use crate::parser::{BinaryOp, Expr, JoinType, Query, SelectItem};
use crate::storage::Storage;
use super::expr::{Binder, Grouping};
use super::plan::{AggregatePlan, BoundExpr, IndexScan, Join, SelectPlan, Source};
use super::scope::Scope;
use super::table_schema;

/// One projected column before binding
struct OutputItem {
    expr: Expr,
    label: String,
    /// Alias given with AS, which ORDER BY may refer to
    alias: Option<String>,
}

/// Builds the plan of a SELECT:
/// scan -> pushed filters -> joins -> filter -> aggregate -> having ->
/// order -> project -> distinct -> limit
pub fn plan_select(storage: &dyn Storage, query: &Query) -> Result<SelectPlan, EngineError> {
    let mut scope = Scope::new();
    let mut sources = Vec::new();
    let mut schemas = Vec::new();

    if let Some(from) = &query.from {
        let schema = table_schema(storage, &from.name)?;
        scope.push_table(from.visible_name(), &schema);
        sources.push(Source {
            table: from.name.clone(),
            width: schema.columns.len(),
            join: None,
            filter: None,
            index: None,
        });
        schemas.push(schema);
    }

    for join in &query.joins {
        let schema = table_schema(storage, &join.table.name)?;
        scope.push_table(join.table.visible_name(), &schema);
        // ON sees the tables joined so far, including this one
        let on = Binder::new(&scope, "JOIN conditions").bind(&join.on)?;
        sources.push(Source {
            table: join.table.name.clone(),
            width: schema.columns.len(),
            join: Some(Join {
                join_type: join.join_type,
                on,
            }),
            filter: None,
            index: None,
        });
        schemas.push(schema);
    }

    let filter = match &query.filter {
        Some(filter) => {
            let bound = Binder::new(&scope, "WHERE").bind(filter)?;
            push_down(bound, &scope, &mut sources)
        }
        None => None,
    };

    // With a single table the WHERE clause restricts it directly
    let single = sources.len() == 1;
    for (source, schema) in sources.iter_mut().zip(&schemas) {
        let conjuncts = source
            .filter
            .iter()
            .chain(filter.iter().filter(|_| single))
            .cloned()
            .flat_map(BoundExpr::into_conjuncts)
            .collect();
        source.index = choose_index(schema, conjuncts);
    }

    let items = expand_projection(query, &scope)?;

    let grouped = !query.group_by.is_empty()
        || query.having.is_some()
        || items.iter().any(|item| item.expr.contains_aggregate())
        || query.order_by.iter().any(|o| o.expr.contains_aggregate());

    let mut plan = SelectPlan {
        sources,
        filter,
        aggregate: None,
        having: None,
        order_by: Vec::new(),
        projection: Vec::with_capacity(items.len()),
        labels: items.iter().map(|item| item.label.clone()).collect(),
        types: Vec::with_capacity(items.len()),
        distinct: query.distinct,
        limit: query.limit,
        offset: query.offset,
    };

    if grouped {
        let keys = query
            .group_by
            .iter()
            .map(|e| Binder::new(&scope, "GROUP BY").bind(e))
            .collect::<Result<Vec<_>, _>>()?;
        let mut grouping = Grouping::new(keys);
        {
            let mut binder = Binder::grouped(&scope, "SELECT", &mut grouping);
            bind_outputs(&mut binder, query, &items, &mut plan)?;
            plan.having = query
                .having
                .as_ref()
                .map(|h| binder.bind(h))
                .transpose()?;
        }
        plan.aggregate = Some(AggregatePlan {
            group_by: grouping.keys,
            calls: grouping.calls,
        });
    } else {
        let mut binder = Binder::new(&scope, "SELECT");
        bind_outputs(&mut binder, query, &items, &mut plan)?;
    }

    Ok(plan)
}

fn expand_projection(query: &Query, scope: &Scope) -> Result<Vec<OutputItem>, SemanticError> {
    let mut items = Vec::new();
    let column_item = |idx: usize| {
        let column = scope.column(idx);
        OutputItem {
            expr: Expr::Column {
                table: Some(column.table.clone()),
                name: column.name.clone(),
            },
            label: column.name.clone(),
            alias: None,
        }
    };

    for item in &query.projection {
        match item {
            SelectItem::Wildcard => items.extend((0..scope.len()).map(column_item)),
            SelectItem::QualifiedWildcard(table) => {
                items.extend(scope.table_range(table)?.map(column_item));
            }
            SelectItem::Expr { expr, alias, .. } => items.push(OutputItem {
                expr: expr.clone(),
                label: item.label().unwrap_or_default(),
                alias: alias.clone(),
            }),
        }
    }
    Ok(items)
}

fn bind_outputs(
    binder: &mut Binder<'_>,
    query: &Query,
    items: &[OutputItem],
    plan: &mut SelectPlan,
) -> Result<(), SemanticError> {
    for item in items {
        let bound = binder.bind(&item.expr)?;
        plan.types.push(binder.type_of(&bound));
        plan.projection.push(bound);
    }

    for order in &query.order_by {
        let bound = match output_reference(&order.expr, items) {
            Some(idx) => plan.projection[idx].clone(),
            None => binder.bind(&order.expr)?,
        };
        plan.order_by.push((bound, order.order));
    }
    Ok(())
}

/// ORDER BY may name an output alias or a 1-based output position
fn output_reference(expr: &Expr, items: &[OutputItem]) -> Option<usize> {
    match expr {
        Expr::Column { table: None, name } => items.iter().position(|item| {
            item.alias
                .as_ref()
                .is_some_and(|alias| alias.eq_ignore_ascii_case(name))
        }),
        Expr::Literal(Value::Integer(n)) => usize::try_from(*n)
            .ok()
            .filter(|n| (1..=items.len()).contains(n))
            .map(|n| n - 1),
        _ => None,
    }
}

/// Moves WHERE conjuncts that read a single table below the joins; returns
/// the remaining filter
fn push_down(filter: BoundExpr, scope: &Scope, sources: &mut [Source]) -> Option<BoundExpr> {
    let mut residual = Vec::new();
    let mut offsets = Vec::with_capacity(sources.len());
    let mut offset = 0;
    for source in sources.iter() {
        offsets.push(offset);
        offset += source.width;
    }

    for conjunct in filter.into_conjuncts() {
        let mut columns = Vec::new();
        conjunct.columns(&mut columns);
        let mut tables = columns.iter().filter_map(|&idx| scope.table_of(idx));
        let Some(table) = tables.next() else {
            residual.push(conjunct);
            continue;
        };

        // A LEFT JOIN's right side is null-extended after the join, so
        // filtering it before the join would change the result
        let single = tables.all(|t| t == table);
        let pushable = single
            && sources[table]
                .join
                .as_ref()
                .is_none_or(|j| j.join_type == JoinType::Inner);

        if pushable && sources.len() > 1 {
            let shifted = conjunct.shifted(offsets[table]);
            let source = &mut sources[table];
            source.filter = BoundExpr::conjunction(source.filter.take().into_iter().chain([shifted]).collect());
        } else {
            residual.push(conjunct);
        }
    }

    BoundExpr::conjunction(residual)
}

/// First `column = literal` conjunct over an indexed column. The literal
/// must already have the column's type, so the lookup finds every row the
/// comparison would accept.
fn choose_index(schema: &Schema, conjuncts: Vec<BoundExpr>) -> Option<IndexScan> {
    conjuncts.into_iter().find_map(|conjunct| {
        let BoundExpr::Binary {
            left,
            op: BinaryOp::Eq,
            right,
        } = conjunct
        else {
            return None;
        };
        let (idx, value) = match (*left, *right) {
            (BoundExpr::Column(idx), BoundExpr::Literal(value))
            | (BoundExpr::Literal(value), BoundExpr::Column(idx)) => (idx, value),
            _ => return None,
        };
        let column = schema.columns.get(idx)?;
        if value.data_type() != Some(column.data_type) || matches!(value, Value::Float(f) if f.is_nan())
        {
            return None;
        }
        let index = schema.index_on(idx)?;
        Some(IndexScan {
            name: index.name.clone(),
            value,
        })
    })
}
