//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with the SQLite dialect. Anything that fails to parse or
//! is not recognised is treated as destructive.

use sqlparser::ast::{Query, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use super::{ClassificationResult, SafetyLevel, StatementType};

type Verdict = (SafetyLevel, StatementType);

const READ_ONLY_SELECT: Verdict = (SafetyLevel::ReadOnly, StatementType::Select);

/// SQL classifier that parses and classifies SQL strings.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: SQLiteDialect,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    pub fn new() -> Self {
        Self {
            dialect: SQLiteDialect {},
        }
    }

    /// Classifies a SQL string. Multiple statements take the most dangerous level.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        let statements = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => statements,
            Err(e) => {
                return ClassificationResult::with_warning(
                    SafetyLevel::Destructive,
                    StatementType::Unknown,
                    format!("Could not parse SQL: {e}"),
                )
            }
        };

        let mut verdicts = statements.iter().map(classify_statement);
        let Some(first) = verdicts.next() else {
            return ClassificationResult::with_warning(
                SafetyLevel::Destructive,
                StatementType::Unknown,
                "Empty SQL statement",
            );
        };

        if statements.len() == 1 {
            return ClassificationResult::new(first.0, first.1);
        }

        let (level, stmt_type) = verdicts.fold(first, most_dangerous);
        ClassificationResult::new(level, StatementType::Multiple(Box::new(stmt_type)))
    }
}

/// Convenience function to classify SQL without creating a classifier instance.
pub fn classify_sql(sql: &str) -> ClassificationResult {
    SqlClassifier::new().classify(sql)
}

fn most_dangerous(current: Verdict, candidate: Verdict) -> Verdict {
    if candidate.0 > current.0 {
        candidate
    } else {
        current
    }
}

fn classify_statement(statement: &Statement) -> Verdict {
    match statement {
        Statement::Query(query) => classify_query(query),
        // SQLite's EXPLAIN describes the program without running it.
        Statement::Explain { .. } => (SafetyLevel::ReadOnly, StatementType::Explain),

        Statement::Insert { .. } => (SafetyLevel::Mutating, StatementType::Insert),
        Statement::Update { .. } => (SafetyLevel::Mutating, StatementType::Update),

        Statement::Delete { .. } => (SafetyLevel::Destructive, StatementType::Delete),
        Statement::Drop { .. } => (SafetyLevel::Destructive, StatementType::Drop),
        Statement::AlterTable { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateVirtualTable { .. } => {
            (SafetyLevel::Destructive, StatementType::Create)
        }
        Statement::Pragma { .. } => (SafetyLevel::Destructive, StatementType::Pragma),
        Statement::AttachDatabase { .. } => (SafetyLevel::Destructive, StatementType::Attach),

        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

fn classify_query(query: &Query) -> Verdict {
    let ctes = query
        .with
        .iter()
        .flat_map(|with| with.cte_tables.iter())
        .map(|cte| classify_query(&cte.query));

    ctes.fold(classify_set_expr(&query.body), most_dangerous)
}

#[allow(unreachable_patterns)]
fn classify_set_expr(set_expr: &SetExpr) -> Verdict {
    match set_expr {
        SetExpr::Select(select) => select
            .from
            .iter()
            .map(classify_table_with_joins)
            .fold(READ_ONLY_SELECT, most_dangerous),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            most_dangerous(classify_set_expr(left), classify_set_expr(right))
        }
        SetExpr::Values(_) | SetExpr::Table(_) => READ_ONLY_SELECT,
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => classify_statement(stmt),
        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

fn classify_table_with_joins(twj: &TableWithJoins) -> Verdict {
    twj.joins
        .iter()
        .map(|join| classify_table_factor(&join.relation))
        .fold(classify_table_factor(&twj.relation), most_dangerous)
}

fn classify_table_factor(factor: &TableFactor) -> Verdict {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => READ_ONLY_SELECT,
    }
}
