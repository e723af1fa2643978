//! SQL Safety Validator
//!
//! Parses a candidate statement with the MySQL dialect and decides whether it
//! is a single, side-effect-free SELECT. The decision is made on the parsed
//! tree, never on the raw text, so casing, comments and nesting cannot hide a
//! write. Anything the validator cannot classify is rejected.

use serde::{Deserialize, Serialize};
use sqlparser::ast::{Expr, Query, SetExpr, Statement, TableFactor, Visit, Visitor};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use std::fmt;
use std::ops::ControlFlow;

/// Accept/reject decision for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Accepted,
    Rejected(String),
}

impl ValidationVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationVerdict::Accepted)
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_accepted()
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationVerdict::Accepted => None,
            ValidationVerdict::Rejected(reason) => Some(reason),
        }
    }
}

/// SQL text that passed validation. Only [`SqlValidator::accept`] creates one,
/// so holding an `AcceptedSql` is proof the gate ran on exactly this text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedSql(String);

impl AcceptedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AcceptedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operation kind of a parsed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    Drop,
    Create,
    Alter,
    Truncate,
    Grant,
    Revoke,
    /// Locking read (`FOR UPDATE` / `FOR SHARE`).
    Lock,
    /// Parsed fine but is not a plain SELECT (SHOW, EXPLAIN, UNION, VALUES, ...).
    Other(&'static str),
}

/// Kinds that reject a statement wherever they appear in the tree.
pub const FORBIDDEN: [OperationKind; 11] = [
    OperationKind::Insert,
    OperationKind::Update,
    OperationKind::Delete,
    OperationKind::Merge,
    OperationKind::Drop,
    OperationKind::Create,
    OperationKind::Alter,
    OperationKind::Truncate,
    OperationKind::Grant,
    OperationKind::Revoke,
    OperationKind::Lock,
];

impl OperationKind {
    pub fn is_forbidden(self) -> bool {
        // No wildcard arm: a new kind has to be placed on one side explicitly.
        match self {
            OperationKind::Insert
            | OperationKind::Update
            | OperationKind::Delete
            | OperationKind::Merge
            | OperationKind::Drop
            | OperationKind::Create
            | OperationKind::Alter
            | OperationKind::Truncate
            | OperationKind::Grant
            | OperationKind::Revoke
            | OperationKind::Lock => true,
            OperationKind::Select | OperationKind::Other(_) => false,
        }
    }

    /// Classify a statement node. Every variant is listed; statements that
    /// change data, schema or privileges map to a forbidden kind.
    pub fn of_statement(statement: &Statement) -> Self {
        match statement {
            Statement::Query(query) => Self::of_query(query),
            Statement::Insert { .. }
            | Statement::Directory { .. }
            | Statement::Copy { .. }
            | Statement::CopyIntoSnowflake { .. } => OperationKind::Insert,
            Statement::Update { .. } => OperationKind::Update,
            Statement::Delete { .. } => OperationKind::Delete,
            Statement::Merge { .. } => OperationKind::Merge,
            Statement::Drop { .. } | Statement::DropFunction { .. } => OperationKind::Drop,
            Statement::CreateView { .. }
            | Statement::CreateTable { .. }
            | Statement::CreateVirtualTable { .. }
            | Statement::CreateIndex { .. }
            | Statement::CreateRole { .. }
            | Statement::CreateSchema { .. }
            | Statement::CreateDatabase { .. }
            | Statement::CreateFunction { .. }
            | Statement::CreateProcedure { .. }
            | Statement::CreateMacro { .. }
            | Statement::CreateStage { .. }
            | Statement::CreateSequence { .. }
            | Statement::CreateType { .. }
            | Statement::AttachDatabase { .. } => OperationKind::Create,
            Statement::AlterTable { .. }
            | Statement::AlterIndex { .. }
            | Statement::AlterView { .. }
            | Statement::AlterRole { .. }
            | Statement::Comment { .. }
            | Statement::Msck { .. } => OperationKind::Alter,
            Statement::Truncate { .. } => OperationKind::Truncate,
            Statement::Grant { .. } => OperationKind::Grant,
            Statement::Revoke { .. } => OperationKind::Revoke,
            Statement::Explain { .. } | Statement::ExplainTable { .. } => {
                OperationKind::Other("EXPLAIN")
            }
            Statement::ShowFunctions { .. }
            | Statement::ShowVariable { .. }
            | Statement::ShowVariables { .. }
            | Statement::ShowCreate { .. }
            | Statement::ShowColumns { .. }
            | Statement::ShowTables { .. }
            | Statement::ShowCollation { .. } => OperationKind::Other("SHOW"),
            Statement::SetRole { .. }
            | Statement::SetVariable { .. }
            | Statement::SetTimeZone { .. }
            | Statement::SetNames { .. }
            | Statement::SetNamesDefault { .. }
            | Statement::SetTransaction { .. } => OperationKind::Other("SET"),
            Statement::StartTransaction { .. }
            | Statement::Commit { .. }
            | Statement::Rollback { .. }
            | Statement::Savepoint { .. } => OperationKind::Other("TRANSACTION"),
            Statement::Declare { .. }
            | Statement::Fetch { .. }
            | Statement::Close { .. } => OperationKind::Other("CURSOR"),
            Statement::Prepare { .. }
            | Statement::Execute { .. }
            | Statement::Deallocate { .. } => OperationKind::Other("PREPARED STATEMENT"),
            Statement::Analyze { .. } => OperationKind::Other("ANALYZE"),
            Statement::Discard { .. } => OperationKind::Other("DISCARD"),
            Statement::Use { .. } => OperationKind::Other("USE"),
            Statement::Assert { .. } => OperationKind::Other("ASSERT"),
            Statement::Kill { .. } => OperationKind::Other("KILL"),
            Statement::Cache { .. } | Statement::UNCache { .. } => OperationKind::Other("CACHE"),
            Statement::Pragma { .. } => OperationKind::Other("PRAGMA"),
        }
    }

    /// Classify a query. Locking clauses and forbidden CTE bodies win over the
    /// body; otherwise only a plain SELECT (possibly parenthesized) is `Select`.
    pub fn of_query(query: &Query) -> Self {
        if !query.locks.is_empty() {
            return OperationKind::Lock;
        }
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let kind = Self::of_query(&cte.query);
                if kind.is_forbidden() {
                    return kind;
                }
            }
        }
        Self::of_set_expr(&query.body)
    }

    fn of_set_expr(body: &SetExpr) -> Self {
        match body {
            SetExpr::Select(select) => {
                if select.into.is_some() {
                    OperationKind::Create
                } else {
                    OperationKind::Select
                }
            }
            SetExpr::Query(inner) => Self::of_query(inner),
            SetExpr::Insert(_) => OperationKind::Insert,
            SetExpr::Update(_) => OperationKind::Update,
            SetExpr::SetOperation { left, right, .. } => {
                for side in [left, right] {
                    let kind = Self::of_set_expr(side);
                    if kind.is_forbidden() {
                        return kind;
                    }
                }
                OperationKind::Other("set operation")
            }
            SetExpr::Values(_) => OperationKind::Other("VALUES"),
            SetExpr::Table(_) => OperationKind::Other("TABLE"),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Select => write!(f, "Select"),
            OperationKind::Insert => write!(f, "Insert"),
            OperationKind::Update => write!(f, "Update"),
            OperationKind::Delete => write!(f, "Delete"),
            OperationKind::Merge => write!(f, "Merge"),
            OperationKind::Drop => write!(f, "Drop"),
            OperationKind::Create => write!(f, "Create"),
            OperationKind::Alter => write!(f, "Alter"),
            OperationKind::Truncate => write!(f, "Truncate"),
            OperationKind::Grant => write!(f, "Grant"),
            OperationKind::Revoke => write!(f, "Revoke"),
            OperationKind::Lock => write!(f, "Lock"),
            OperationKind::Other(label) => write!(f, "{}", label),
        }
    }
}

/// Structural walk over every statement, subquery and derived table of a
/// parsed tree.
/// Breaks on the first forbidden kind.
#[derive(Default)]
struct ForbiddenOperationFinder {
    statements_seen: usize,
    unclassified_nested: Option<OperationKind>,
}

impl Visitor for ForbiddenOperationFinder {
    type Break = OperationKind;

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        let kind = OperationKind::of_statement(statement);
        if kind.is_forbidden() {
            return ControlFlow::Break(kind);
        }
        // The root is visited first; any statement below it is nested.
        let nested = self.statements_seen > 0;
        if nested && kind != OperationKind::Select && self.unclassified_nested.is_none() {
            self.unclassified_nested = Some(kind);
        }
        self.statements_seen += 1;
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        match table_factor {
            TableFactor::Derived { subquery, .. } => check_subquery(subquery),
            _ => ControlFlow::Continue(()),
        }
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Subquery(subquery)
            | Expr::ArraySubquery(subquery)
            | Expr::Exists { subquery, .. }
            | Expr::InSubquery { subquery, .. } => check_subquery(subquery),
            _ => ControlFlow::Continue(()),
        }
    }
}

fn check_subquery(query: &Query) -> ControlFlow<OperationKind> {
    let kind = OperationKind::of_query(query);
    if kind.is_forbidden() {
        ControlFlow::Break(kind)
    } else {
        ControlFlow::Continue(())
    }
}

/// Read-only SQL gate. Stateless; one instance can be shared by every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlValidator;

impl SqlValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        let dialect = MySqlDialect {};
        let statements = match Parser::parse_sql(&dialect, sql) {
            Ok(statements) => statements,
            Err(e) => return ValidationVerdict::Rejected(format!("parsing error: {}", e)),
        };

        let statement = match statements.as_slice() {
            [] => {
                return ValidationVerdict::Rejected(
                    "parsing error: no SQL statement found".to_string(),
                )
            }
            [statement] => statement,
            _ => {
                return ValidationVerdict::Rejected(format!(
                    "multiple statements are not allowed (found {})",
                    statements.len()
                ))
            }
        };

        let mut finder = ForbiddenOperationFinder::default();
        if let ControlFlow::Break(kind) = statement.visit(&mut finder) {
            return ValidationVerdict::Rejected(format!("prohibited operation: {}", kind));
        }

        let root = OperationKind::of_statement(statement);
        if root != OperationKind::Select {
            return ValidationVerdict::Rejected(format!(
                "only SELECT queries allowed (found {})",
                root
            ));
        }

        if let Some(kind) = finder.unclassified_nested {
            return ValidationVerdict::Rejected(format!(
                "unclassified nested statement: {}",
                kind
            ));
        }

        ValidationVerdict::Accepted
    }

    /// Validate and, on acceptance, wrap the unchanged text. The error is the
    /// rejection reason.
    pub fn accept(&self, sql: String) -> Result<AcceptedSql, String> {
        match self.validate(&sql) {
            ValidationVerdict::Accepted => Ok(AcceptedSql(sql)),
            ValidationVerdict::Rejected(reason) => Err(reason),
        }
    }
}
