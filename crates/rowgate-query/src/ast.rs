//! Syntax tree of queries and access rules.
//!
//! Every node prints back to source syntax through `Display`. Printing a
//! parsed tree reproduces the input modulo whitespace: explicit parentheses
//! survive as [`Expr::Nested`], optional keywords (`AS`, `OUTER`, `INNER`,
//! `OF`) are recorded, and numeric literals keep their spelling. Trees built
//! programmatically get the parentheses operator precedence requires.

use rowgate_core::AccessType;
use std::fmt;

use crate::path::{Alias, Path};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl Statement {
    pub fn where_clause(&self) -> Option<&Expr> {
        match self {
            Statement::Select(select) => select.where_clause.as_ref(),
            Statement::Update(update) => update.where_clause.as_ref(),
            Statement::Delete(delete) => delete.where_clause.as_ref(),
        }
    }

    pub fn where_clause_mut(&mut self) -> &mut Option<Expr> {
        match self {
            Statement::Select(select) => &mut select.where_clause,
            Statement::Update(update) => &mut update.where_clause,
            Statement::Delete(delete) => &mut delete.where_clause,
        }
    }
}

/// A SELECT statement or subquery.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Vec<FromItem>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
}

impl SelectStatement {
    /// Every range and join alias declared in the FROM clause.
    pub fn declared_aliases(&self) -> Vec<&Alias> {
        let mut aliases = Vec::new();
        for item in &self.from {
            aliases.push(&item.range.alias);
            for join in &item.joins {
                if let Some(alias) = &join.alias {
                    aliases.push(alias);
                }
            }
        }
        aliases
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub result_variable: Option<Alias>,
    /// Whether the result variable was introduced with `AS`.
    pub explicit_as: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub range: RangeDeclaration,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeDeclaration {
    pub source: RangeSource,
    pub alias: Alias,
    pub explicit_as: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeSource {
    /// `Contact c`
    Entity(String),
    /// `c.phones p`, in subqueries
    Path(Path),
    /// `IN (c.phones) p`
    CollectionMember(Path),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `JOIN` or `INNER JOIN`
    Inner { explicit: bool },
    /// `LEFT JOIN` or `LEFT OUTER JOIN`
    Left { outer: bool },
}

impl JoinKind {
    pub fn is_outer(&self) -> bool {
        matches!(self, JoinKind::Left { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub fetch: bool,
    pub path: Path,
    pub alias: Option<Alias>,
    pub explicit_as: bool,
    pub condition: Option<JoinCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKeyword {
    With,
    On,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub keyword: ConditionKeyword,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub entity: String,
    pub alias: Alias,
    pub explicit_as: bool,
    pub set: Vec<SetItem>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetItem {
    pub path: Path,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub entity: String,
    pub alias: Alias,
    pub explicit_as: bool,
    pub where_clause: Option<Expr>,
}

/// `GRANT READ UPDATE ACCESS TO Contact c WHERE ...`
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRuleStatement {
    /// Access types as written; empty means none were listed.
    pub access_types: Vec<AccessType>,
    pub entity: String,
    pub alias: Alias,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Numeric literal as written.
    Number(String),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Subtract => PREC_ADDITIVE,
            BinaryOp::Multiply | BinaryOp::Divide => PREC_MULTIPLICATIVE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    /// `<>`
    NotEqual,
    /// `!=`
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl ComparisonOp {
    fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::BangEqual => "!=",
            ComparisonOp::Less => "<",
            ComparisonOp::LessEqual => "<=",
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    All,
    Any,
    Some,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Concat,
    Substring,
    Lower,
    Upper,
    Length,
    Locate,
    Abs,
    Sqrt,
    Mod,
    Size,
    Index,
}

impl Function {
    pub const ALL: [Function; 11] = [
        Function::Concat,
        Function::Substring,
        Function::Lower,
        Function::Upper,
        Function::Length,
        Function::Locate,
        Function::Abs,
        Function::Sqrt,
        Function::Mod,
        Function::Size,
        Function::Index,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Function::Concat => "CONCAT",
            Function::Substring => "SUBSTRING",
            Function::Lower => "LOWER",
            Function::Upper => "UPPER",
            Function::Length => "LENGTH",
            Function::Locate => "LOCATE",
            Function::Abs => "ABS",
            Function::Sqrt => "SQRT",
            Function::Mod => "MOD",
            Function::Size => "SIZE",
            Function::Index => "INDEX",
        }
    }

    /// Accepted argument counts.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Function::Concat => (2, usize::MAX),
            Function::Substring | Function::Locate => (2, 3),
            Function::Mod => (2, 2),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimSpec {
    Leading,
    Trailing,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Avg,
    Max,
    Min,
    Sum,
    Count,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Count => "COUNT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    Values(Vec<Expr>),
    Subquery(Box<SelectStatement>),
    /// `IN :ids` or `IN ?1`
    Parameter(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    /// Operand of a simple CASE; `None` for a searched CASE.
    pub operand: Option<Expr>,
    pub whens: Vec<(Expr, Expr)>,
    pub else_expr: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(Path),
    Literal(Literal),
    NamedParameter(String),
    PositionalParameter(u32),
    /// An explicitly parenthesised expression.
    Nested(Box<Expr>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Comparison {
        left: Box<Expr>,
        op: ComparisonOp,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Between {
        expr: Box<Expr>,
        negated: bool,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        negated: bool,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
    },
    In {
        expr: Box<Expr>,
        negated: bool,
        list: InList,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    IsEmpty {
        expr: Box<Expr>,
        negated: bool,
    },
    MemberOf {
        expr: Box<Expr>,
        negated: bool,
        /// Whether `OF` was written.
        of: bool,
        collection: Path,
    },
    Exists(Box<SelectStatement>),
    Quantified {
        quantifier: Quantifier,
        subquery: Box<SelectStatement>,
    },
    Subquery(Box<SelectStatement>),
    Case(Box<CaseExpr>),
    Coalesce(Vec<Expr>),
    NullIf(Box<Expr>, Box<Expr>),
    Function {
        function: Function,
        args: Vec<Expr>,
    },
    Trim {
        spec: Option<TrimSpec>,
        character: Option<Box<Expr>>,
        /// Whether `FROM` was written.
        from: bool,
        expr: Box<Expr>,
    },
    Aggregate {
        function: AggregateFunction,
        distinct: bool,
        arg: Box<Expr>,
    },
    CurrentDate,
    CurrentTime,
    CurrentTimestamp,
    Type(Box<Expr>),
    Key(Path),
    Value(Path),
    Entry(Path),
    Object(Path),
    /// `NEW org.example.Dto(a, b)` in a SELECT clause.
    Constructor {
        class_name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn path(path: Path) -> Self {
        Expr::Path(path)
    }

    pub fn boolean(value: bool) -> Self {
        Expr::Literal(Literal::Boolean(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn named_parameter(name: impl Into<String>) -> Self {
        Expr::NamedParameter(name.into())
    }

    pub fn nested(expr: Expr) -> Self {
        Expr::Nested(Box::new(expr))
    }

    pub fn comparison(left: Expr, op: ComparisonOp, right: Expr) -> Self {
        Expr::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Conjunction; a single operand is returned as is.
    pub fn and(mut items: Vec<Expr>) -> Self {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        }
    }

    /// Disjunction; a single operand is returned as is.
    pub fn or(mut items: Vec<Expr>) -> Self {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        }
    }

    pub fn is_literal_true(&self) -> bool {
        match self {
            Expr::Literal(Literal::Boolean(true)) => true,
            Expr::Nested(inner) => inner.is_literal_true(),
            _ => false,
        }
    }

    /// Strip explicit parentheses.
    pub fn unnested(&self) -> &Expr {
        match self {
            Expr::Nested(inner) => inner.unnested(),
            other => other,
        }
    }

    /// Top-level conjuncts, looking through parentheses.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self.unnested() {
            Expr::And(items) => items.iter().flat_map(|item| item.conjuncts()).collect(),
            other => vec![other],
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(_) => PREC_OR,
            Expr::And(_) => PREC_AND,
            Expr::Not(_) => PREC_NOT,
            Expr::Comparison { .. }
            | Expr::Between { .. }
            | Expr::Like { .. }
            | Expr::In { .. }
            | Expr::IsNull { .. }
            | Expr::IsEmpty { .. }
            | Expr::MemberOf { .. } => PREC_PREDICATE,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary { .. } => PREC_UNARY,
            _ => PREC_PRIMARY,
        }
    }
}

const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_PREDICATE: u8 = 4;
const PREC_ADDITIVE: u8 = 5;
const PREC_MULTIPLICATIVE: u8 = 6;
const PREC_UNARY: u8 = 7;
const PREC_PRIMARY: u8 = 8;

/// Prints `expr`, parenthesised when it binds looser than `min`.
struct Operand<'a>(&'a Expr, u8);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.precedence() < self.1 {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn not_kw(negated: bool) -> &'static str {
    if negated { "NOT " } else { "" }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => f.write_str(n),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Boolean(true) => f.write_str("TRUE"),
            Literal::Boolean(false) => f.write_str("FALSE"),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

impl fmt::Display for InList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InList::Values(values) => {
                f.write_str("(")?;
                write_list(f, values, ", ")?;
                f.write_str(")")
            }
            InList::Subquery(subquery) => write!(f, "({})", subquery),
            InList::Parameter(parameter) => write!(f, "{}", parameter),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Path(path) => write!(f, "{}", path),
            Expr::Literal(literal) => write!(f, "{}", literal),
            Expr::NamedParameter(name) => write!(f, ":{}", name),
            Expr::PositionalParameter(n) => write!(f, "?{}", n),
            Expr::Nested(inner) => write!(f, "({})", inner),
            Expr::Unary { op, expr } => {
                let sign = match op {
                    UnaryOp::Plus => "+",
                    UnaryOp::Minus => "-",
                };
                write!(f, "{}{}", sign, Operand(expr, PREC_UNARY))
            }
            Expr::Binary { left, op, right } => {
                let prec = op.precedence();
                write!(
                    f,
                    "{} {} {}",
                    Operand(left, prec),
                    op.symbol(),
                    Operand(right, prec + 1)
                )
            }
            Expr::Comparison { left, op, right } => write!(
                f,
                "{} {} {}",
                Operand(left, PREC_ADDITIVE),
                op.symbol(),
                Operand(right, PREC_ADDITIVE)
            ),
            Expr::And(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    write!(f, "{}", Operand(item, PREC_NOT))?;
                }
                Ok(())
            }
            Expr::Or(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    write!(f, "{}", Operand(item, PREC_AND))?;
                }
                Ok(())
            }
            Expr::Not(inner) => write!(f, "NOT {}", Operand(inner, PREC_NOT)),
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                Operand(expr, PREC_ADDITIVE),
                not_kw(*negated),
                Operand(low, PREC_ADDITIVE),
                Operand(high, PREC_ADDITIVE)
            ),
            Expr::Like {
                expr,
                negated,
                pattern,
                escape,
            } => {
                write!(
                    f,
                    "{} {}LIKE {}",
                    Operand(expr, PREC_ADDITIVE),
                    not_kw(*negated),
                    Operand(pattern, PREC_ADDITIVE)
                )?;
                if let Some(escape) = escape {
                    write!(f, " ESCAPE {}", Operand(escape, PREC_PRIMARY))?;
                }
                Ok(())
            }
            Expr::In {
                expr,
                negated,
                list,
            } => write!(
                f,
                "{} {}IN {}",
                Operand(expr, PREC_ADDITIVE),
                not_kw(*negated),
                list
            ),
            Expr::IsNull { expr, negated } => write!(
                f,
                "{} IS {}NULL",
                Operand(expr, PREC_ADDITIVE),
                not_kw(*negated)
            ),
            Expr::IsEmpty { expr, negated } => write!(
                f,
                "{} IS {}EMPTY",
                Operand(expr, PREC_ADDITIVE),
                not_kw(*negated)
            ),
            Expr::MemberOf {
                expr,
                negated,
                of,
                collection,
            } => write!(
                f,
                "{} {}MEMBER {}{}",
                Operand(expr, PREC_ADDITIVE),
                not_kw(*negated),
                if *of { "OF " } else { "" },
                collection
            ),
            Expr::Exists(subquery) => write!(f, "EXISTS ({})", subquery),
            Expr::Quantified {
                quantifier,
                subquery,
            } => {
                let keyword = match quantifier {
                    Quantifier::All => "ALL",
                    Quantifier::Any => "ANY",
                    Quantifier::Some => "SOME",
                };
                write!(f, "{} ({})", keyword, subquery)
            }
            Expr::Subquery(subquery) => write!(f, "({})", subquery),
            Expr::Case(case) => {
                f.write_str("CASE ")?;
                if let Some(operand) = &case.operand {
                    write!(f, "{} ", operand)?;
                }
                for (condition, result) in &case.whens {
                    write!(f, "WHEN {} THEN {} ", condition, result)?;
                }
                if let Some(else_expr) = &case.else_expr {
                    write!(f, "ELSE {} ", else_expr)?;
                }
                f.write_str("END")
            }
            Expr::Coalesce(args) => {
                f.write_str("COALESCE(")?;
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            Expr::NullIf(a, b) => write!(f, "NULLIF({}, {})", a, b),
            Expr::Function { function, args } => {
                write!(f, "{}(", function.name())?;
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            Expr::Trim {
                spec,
                character,
                from,
                expr,
            } => {
                f.write_str("TRIM(")?;
                if let Some(spec) = spec {
                    f.write_str(match spec {
                        TrimSpec::Leading => "LEADING ",
                        TrimSpec::Trailing => "TRAILING ",
                        TrimSpec::Both => "BOTH ",
                    })?;
                }
                if let Some(character) = character {
                    write!(f, "{} ", character)?;
                }
                if *from {
                    f.write_str("FROM ")?;
                }
                write!(f, "{})", expr)
            }
            Expr::Aggregate {
                function,
                distinct,
                arg,
            } => write!(
                f,
                "{}({}{})",
                function.name(),
                if *distinct { "DISTINCT " } else { "" },
                arg
            ),
            Expr::CurrentDate => f.write_str("CURRENT_DATE"),
            Expr::CurrentTime => f.write_str("CURRENT_TIME"),
            Expr::CurrentTimestamp => f.write_str("CURRENT_TIMESTAMP"),
            Expr::Type(inner) => write!(f, "TYPE({})", inner),
            Expr::Key(path) => write!(f, "KEY({})", path),
            Expr::Value(path) => write!(f, "VALUE({})", path),
            Expr::Entry(path) => write!(f, "ENTRY({})", path),
            Expr::Object(path) => write!(f, "OBJECT({})", path),
            Expr::Constructor { class_name, args } => {
                write!(f, "NEW {}(", class_name)?;
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(variable) = &self.result_variable {
            let sep = if self.explicit_as { " AS " } else { " " };
            write!(f, "{}{}", sep, variable)?;
        }
        Ok(())
    }
}

impl fmt::Display for RangeDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            RangeSource::Entity(entity) => write!(f, "{}", entity)?,
            RangeSource::Path(path) => write!(f, "{}", path)?,
            RangeSource::CollectionMember(path) => write!(f, "IN ({})", path)?,
        }
        let sep = if self.explicit_as { " AS " } else { " " };
        write!(f, "{}{}", sep, self.alias)
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.kind {
            JoinKind::Inner { explicit: false } => "JOIN",
            JoinKind::Inner { explicit: true } => "INNER JOIN",
            JoinKind::Left { outer: false } => "LEFT JOIN",
            JoinKind::Left { outer: true } => "LEFT OUTER JOIN",
        })?;
        if self.fetch {
            f.write_str(" FETCH")?;
        }
        write!(f, " {}", self.path)?;
        if let Some(alias) = &self.alias {
            let sep = if self.explicit_as { " AS " } else { " " };
            write!(f, "{}{}", sep, alias)?;
        }
        if let Some(condition) = &self.condition {
            let keyword = match condition.keyword {
                ConditionKeyword::With => "WITH",
                ConditionKeyword::On => "ON",
            };
            write!(f, " {} {}", keyword, condition.expr)?;
        }
        Ok(())
    }
}

impl fmt::Display for FromItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.range)?;
        for join in &self.joins {
            write!(f, " {}", join)?;
        }
        Ok(())
    }
}

impl fmt::Display for OrderItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        match self.direction {
            Some(SortDirection::Asc) => f.write_str(" ASC"),
            Some(SortDirection::Desc) => f.write_str(" DESC"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        write_list(f, &self.items, ", ")?;
        f.write_str(" FROM ")?;
        write_list(f, &self.from, ", ")?;
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        if !self.group_by.is_empty() {
            f.write_str(" GROUP BY ")?;
            write_list(f, &self.group_by, ", ")?;
        }
        if let Some(having) = &self.having {
            write!(f, " HAVING {}", having)?;
        }
        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY ")?;
            write_list(f, &self.order_by, ", ")?;
        }
        Ok(())
    }
}

impl fmt::Display for SetItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.path, self.value)
    }
}

impl fmt::Display for UpdateStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.explicit_as { " AS " } else { " " };
        write!(f, "UPDATE {}{}{} SET ", self.entity, sep, self.alias)?;
        write_list(f, &self.set, ", ")?;
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        Ok(())
    }
}

impl fmt::Display for DeleteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.explicit_as { " AS " } else { " " };
        write!(f, "DELETE FROM {}{}{}", self.entity, sep, self.alias)?;
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Select(select) => write!(f, "{}", select),
            Statement::Update(update) => write!(f, "{}", update),
            Statement::Delete(delete) => write!(f, "{}", delete),
        }
    }
}

impl fmt::Display for AccessRuleStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GRANT ")?;
        for access_type in &self.access_types {
            write!(f, "{} ", access_type)?;
        }
        write!(f, "ACCESS TO {} {}", self.entity, self.alias)?;
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {}", where_clause)?;
        }
        Ok(())
    }
}
