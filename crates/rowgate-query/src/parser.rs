//! Recursive-descent parser.
//!
//! Operator precedence, loosest first: `OR`, `AND`, `NOT`, predicates
//! (comparison, `BETWEEN`, `LIKE`, `IN`, `IS`, `MEMBER OF`), additive,
//! multiplicative, unary sign, primary.

use rowgate_core::AccessType;

use crate::ast::{
    AccessRuleStatement, AggregateFunction, BinaryOp, CaseExpr, ComparisonOp, ConditionKeyword,
    DeleteStatement, Expr, FromItem, Function, InList, Join, JoinCondition, JoinKind, Literal,
    OrderItem, Quantifier, RangeDeclaration, RangeSource, SelectItem, SelectStatement, SetItem,
    SortDirection, Statement, TrimSpec, UnaryOp, UpdateStatement,
};
use crate::error::ParseError;
use crate::lexer::{TokenKind, tokenize};
use crate::path::{Alias, Path};
use crate::stream::TokenStream;

/// Words that cannot be used as identification variables.
const RESERVED: &[&str] = &[
    "ACCESS", "ALL", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CURRENT_DATE",
    "CURRENT_TIME", "CURRENT_TIMESTAMP", "DELETE", "DESC", "DISTINCT", "ELSE", "EMPTY", "END",
    "ESCAPE", "EXISTS", "FALSE", "FETCH", "FROM", "GRANT", "GROUP", "HAVING", "IN", "INNER", "IS",
    "JOIN", "LEFT", "LIKE", "MEMBER", "NEW", "NOT", "NULL", "OF", "ON", "OR", "ORDER", "OUTER",
    "SELECT", "SET", "SOME", "THEN", "TO", "TRUE", "UPDATE", "WHEN", "WHERE", "WITH",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|reserved| reserved.eq_ignore_ascii_case(word))
}

/// Parse a SELECT, UPDATE or DELETE statement.
pub fn parse_query(text: &str) -> Result<Statement, ParseError> {
    let mut parser = Parser::new(text)?;
    let statement = parser.statement()?;
    parser.finish()?;
    Ok(statement)
}

/// Parse a SELECT statement.
pub fn parse_select(text: &str) -> Result<SelectStatement, ParseError> {
    let mut parser = Parser::new(text)?;
    let select = parser.select()?;
    parser.finish()?;
    Ok(select)
}

/// Parse a `GRANT ... ACCESS TO ...` rule.
pub fn parse_rule(text: &str) -> Result<AccessRuleStatement, ParseError> {
    let mut parser = Parser::new(text)?;
    let rule = parser.rule()?;
    parser.finish()?;
    Ok(rule)
}

/// Parse a standalone conditional or scalar expression.
pub fn parse_expression(text: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(text)?;
    let expr = parser.expr()?;
    parser.finish()?;
    Ok(expr)
}

struct Parser<'a> {
    stream: TokenStream<'a>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, ParseError> {
        let tokens = tokenize(source)?;
        Ok(Self {
            stream: TokenStream::new(source, tokens),
        })
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        if self.stream.is_eof() {
            Ok(())
        } else {
            Err(self.stream.unexpected("end of input"))
        }
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        if self.stream.check_keyword("SELECT") {
            Ok(Statement::Select(self.select()?))
        } else if self.stream.check_keyword("UPDATE") {
            Ok(Statement::Update(self.update()?))
        } else if self.stream.check_keyword("DELETE") {
            Ok(Statement::Delete(self.delete()?))
        } else {
            Err(self.stream.unexpected("SELECT, UPDATE or DELETE"))
        }
    }

    fn comma_list<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let mut items = vec![item(self)?];
        while self.stream.match_token(&TokenKind::Comma) {
            items.push(item(self)?);
        }
        Ok(items)
    }

    fn select(&mut self) -> Result<SelectStatement, ParseError> {
        self.stream.expect_keyword("SELECT")?;
        let distinct = self.stream.match_keyword("DISTINCT");
        let items = self.comma_list(Self::select_item)?;
        self.stream.expect_keyword("FROM")?;
        let from = self.comma_list(Self::from_item)?;

        let where_clause = if self.stream.match_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };
        let group_by = if self.stream.match_keyword("GROUP") {
            self.stream.expect_keyword("BY")?;
            self.comma_list(Self::expr)?
        } else {
            Vec::new()
        };
        let having = if self.stream.match_keyword("HAVING") {
            Some(self.expr()?)
        } else {
            None
        };
        let order_by = if self.stream.match_keyword("ORDER") {
            self.stream.expect_keyword("BY")?;
            self.comma_list(Self::order_item)?
        } else {
            Vec::new()
        };

        Ok(SelectStatement {
            distinct,
            items,
            from,
            where_clause,
            group_by,
            having,
            order_by,
        })
    }

    fn select_item(&mut self) -> Result<SelectItem, ParseError> {
        let expr = self.expr()?;
        let (result_variable, explicit_as) = self.optional_alias()?;
        Ok(SelectItem {
            expr,
            result_variable,
            explicit_as,
        })
    }

    /// `[AS] alias`, where the alias is optional.
    fn optional_alias(&mut self) -> Result<(Option<Alias>, bool), ParseError> {
        if self.stream.match_keyword("AS") {
            return Ok((Some(self.alias_name()?), true));
        }
        match &self.stream.peek().kind {
            TokenKind::Ident(name) if !is_reserved(name) => {
                let alias = Alias::new(name.clone());
                self.stream.advance();
                Ok((Some(alias), false))
            }
            _ => Ok((None, false)),
        }
    }

    fn alias_name(&mut self) -> Result<Alias, ParseError> {
        match &self.stream.peek().kind {
            TokenKind::Ident(name) if !is_reserved(name) => {
                let alias = Alias::new(name.clone());
                self.stream.advance();
                Ok(alias)
            }
            _ => Err(self.stream.unexpected("identification variable")),
        }
    }

    fn path(&mut self) -> Result<Path, ParseError> {
        let root = self.alias_name()?;
        self.path_segments(root)
    }

    fn path_segments(&mut self, root: Alias) -> Result<Path, ParseError> {
        let mut segments = Vec::new();
        while self.stream.match_token(&TokenKind::Dot) {
            segments.push(self.stream.expect_ident("property name")?);
        }
        Ok(Path::from_parts(root, segments))
    }

    fn from_item(&mut self) -> Result<FromItem, ParseError> {
        let source = if self.stream.match_keyword("IN") {
            self.stream.expect(&TokenKind::LParen)?;
            let path = self.path()?;
            self.stream.expect(&TokenKind::RParen)?;
            RangeSource::CollectionMember(path)
        } else {
            let name = self.stream.expect_ident("entity name")?;
            if self.stream.check(&TokenKind::Dot) {
                RangeSource::Path(self.path_segments(Alias::new(name))?)
            } else {
                RangeSource::Entity(name)
            }
        };
        let (alias, explicit_as) = match self.optional_alias()? {
            (Some(alias), explicit_as) => (alias, explicit_as),
            (None, _) => return Err(self.stream.unexpected("identification variable")),
        };

        let mut joins = Vec::new();
        while self.stream.check_keyword("JOIN")
            || self.stream.check_keyword("INNER")
            || self.stream.check_keyword("LEFT")
        {
            joins.push(self.join()?);
        }

        Ok(FromItem {
            range: RangeDeclaration {
                source,
                alias,
                explicit_as,
            },
            joins,
        })
    }

    fn join(&mut self) -> Result<Join, ParseError> {
        let kind = if self.stream.match_keyword("INNER") {
            self.stream.expect_keyword("JOIN")?;
            JoinKind::Inner { explicit: true }
        } else if self.stream.match_keyword("LEFT") {
            let outer = self.stream.match_keyword("OUTER");
            self.stream.expect_keyword("JOIN")?;
            JoinKind::Left { outer }
        } else {
            self.stream.expect_keyword("JOIN")?;
            JoinKind::Inner { explicit: false }
        };
        let fetch = self.stream.match_keyword("FETCH");
        let path = self.path()?;
        if !path.has_subpath() {
            return Err(self.stream.error(format!("join path {path} has no property")));
        }
        let (alias, explicit_as) = self.optional_alias()?;
        let condition = if self.stream.match_keyword("WITH") {
            Some(JoinCondition {
                keyword: ConditionKeyword::With,
                expr: self.expr()?,
            })
        } else if self.stream.match_keyword("ON") {
            Some(JoinCondition {
                keyword: ConditionKeyword::On,
                expr: self.expr()?,
            })
        } else {
            None
        };
        Ok(Join {
            kind,
            fetch,
            path,
            alias,
            explicit_as,
            condition,
        })
    }

    fn order_item(&mut self) -> Result<OrderItem, ParseError> {
        let expr = self.expr()?;
        let direction = if self.stream.match_keyword("ASC") {
            Some(SortDirection::Asc)
        } else if self.stream.match_keyword("DESC") {
            Some(SortDirection::Desc)
        } else {
            None
        };
        Ok(OrderItem { expr, direction })
    }

    fn range_alias(&mut self) -> Result<(Alias, bool), ParseError> {
        match self.optional_alias()? {
            (Some(alias), explicit_as) => Ok((alias, explicit_as)),
            (None, _) => Err(self.stream.unexpected("identification variable")),
        }
    }

    fn update(&mut self) -> Result<UpdateStatement, ParseError> {
        self.stream.expect_keyword("UPDATE")?;
        let entity = self.stream.expect_ident("entity name")?;
        let (alias, explicit_as) = self.range_alias()?;
        self.stream.expect_keyword("SET")?;
        let set = self.comma_list(|parser| {
            let path = parser.path()?;
            parser.stream.expect(&TokenKind::Eq)?;
            let value = parser.expr()?;
            Ok(SetItem { path, value })
        })?;
        let where_clause = if self.stream.match_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(UpdateStatement {
            entity,
            alias,
            explicit_as,
            set,
            where_clause,
        })
    }

    fn delete(&mut self) -> Result<DeleteStatement, ParseError> {
        self.stream.expect_keyword("DELETE")?;
        self.stream.expect_keyword("FROM")?;
        let entity = self.stream.expect_ident("entity name")?;
        let (alias, explicit_as) = self.range_alias()?;
        let where_clause = if self.stream.match_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(DeleteStatement {
            entity,
            alias,
            explicit_as,
            where_clause,
        })
    }

    fn rule(&mut self) -> Result<AccessRuleStatement, ParseError> {
        self.stream.expect_keyword("GRANT")?;
        let mut access_types = Vec::new();
        while let TokenKind::Ident(name) = &self.stream.peek().kind {
            let Some(access_type) = AccessType::from_keyword(name) else {
                break;
            };
            if access_types.contains(&access_type) {
                return Err(self
                    .stream
                    .error(format!("access type {access_type} listed twice")));
            }
            access_types.push(access_type);
            self.stream.advance();
        }
        self.stream.expect_keyword("ACCESS")?;
        self.stream.expect_keyword("TO")?;
        let entity = self.stream.expect_ident("entity name")?;
        let alias = self.alias_name()?;
        let where_clause = if self.stream.match_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(AccessRuleStatement {
            access_types,
            entity,
            alias,
            where_clause,
        })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.and_expr()?];
        while self.stream.match_keyword("OR") {
            items.push(self.and_expr()?);
        }
        Ok(Expr::or(items))
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.not_expr()?];
        while self.stream.match_keyword("AND") {
            items.push(self.not_expr()?);
        }
        Ok(Expr::and(items))
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.stream.match_keyword("NOT") {
            Ok(Expr::Not(Box::new(self.not_expr()?)))
        } else {
            self.predicate()
        }
    }

    fn predicate(&mut self) -> Result<Expr, ParseError> {
        let left = self.additive()?;

        let negated = self.stream.check_keyword("NOT")
            && ["BETWEEN", "LIKE", "IN", "MEMBER"]
                .iter()
                .any(|keyword| self.stream.peek_n(1).is_keyword(keyword));
        if negated {
            self.stream.advance();
        }

        if self.stream.match_keyword("BETWEEN") {
            let low = self.additive()?;
            self.stream.expect_keyword("AND")?;
            let high = self.additive()?;
            return Ok(Expr::Between {
                expr: Box::new(left),
                negated,
                low: Box::new(low),
                high: Box::new(high),
            });
        }
        if self.stream.match_keyword("LIKE") {
            let pattern = self.additive()?;
            let escape = if self.stream.match_keyword("ESCAPE") {
                Some(Box::new(self.primary()?))
            } else {
                None
            };
            return Ok(Expr::Like {
                expr: Box::new(left),
                negated,
                pattern: Box::new(pattern),
                escape,
            });
        }
        if self.stream.match_keyword("IN") {
            let list = self.in_list()?;
            return Ok(Expr::In {
                expr: Box::new(left),
                negated,
                list,
            });
        }
        if self.stream.match_keyword("MEMBER") {
            let of = self.stream.match_keyword("OF");
            let collection = self.path()?;
            return Ok(Expr::MemberOf {
                expr: Box::new(left),
                negated,
                of,
                collection,
            });
        }
        if self.stream.match_keyword("IS") {
            let negated = self.stream.match_keyword("NOT");
            if self.stream.match_keyword("NULL") {
                return Ok(Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                });
            }
            if self.stream.match_keyword("EMPTY") {
                return Ok(Expr::IsEmpty {
                    expr: Box::new(left),
                    negated,
                });
            }
            return Err(self.stream.unexpected("NULL or EMPTY"));
        }

        let op = match self.stream.peek().kind {
            TokenKind::Eq => ComparisonOp::Equal,
            TokenKind::Ne => ComparisonOp::NotEqual,
            TokenKind::BangEq => ComparisonOp::BangEqual,
            TokenKind::Lt => ComparisonOp::Less,
            TokenKind::Le => ComparisonOp::LessEqual,
            TokenKind::Gt => ComparisonOp::Greater,
            TokenKind::Ge => ComparisonOp::GreaterEqual,
            _ => return Ok(left),
        };
        self.stream.advance();
        let right = self.additive()?;
        Ok(Expr::comparison(left, op, right))
    }

    fn in_list(&mut self) -> Result<InList, ParseError> {
        if matches!(
            self.stream.peek().kind,
            TokenKind::NamedParam(_) | TokenKind::PositionalParam(_)
        ) {
            return Ok(InList::Parameter(Box::new(self.primary()?)));
        }
        self.stream.expect(&TokenKind::LParen)?;
        if self.stream.check_keyword("SELECT") {
            let subquery = self.select()?;
            self.stream.expect(&TokenKind::RParen)?;
            return Ok(InList::Subquery(Box::new(subquery)));
        }
        let values = self.comma_list(Self::expr)?;
        self.stream.expect(&TokenKind::RParen)?;
        Ok(InList::Values(values))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.stream.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.stream.advance();
            let right = self.multiplicative()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.stream.peek().kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                _ => return Ok(left),
            };
            self.stream.advance();
            let right = self.unary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.stream.peek().kind {
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            _ => return self.primary(),
        };
        self.stream.advance();
        Ok(Expr::Unary {
            op,
            expr: Box::new(self.unary()?),
        })
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let kind = self.stream.peek().kind.clone();
        match kind {
            TokenKind::Str(value) => {
                self.stream.advance();
                Ok(Expr::Literal(Literal::String(value)))
            }
            TokenKind::Number(value) => {
                self.stream.advance();
                Ok(Expr::Literal(Literal::Number(value)))
            }
            TokenKind::NamedParam(name) => {
                self.stream.advance();
                Ok(Expr::NamedParameter(name))
            }
            TokenKind::PositionalParam(n) => {
                self.stream.advance();
                Ok(Expr::PositionalParameter(n))
            }
            TokenKind::LParen => {
                self.stream.advance();
                if self.stream.check_keyword("SELECT") {
                    let subquery = self.select()?;
                    self.stream.expect(&TokenKind::RParen)?;
                    Ok(Expr::Subquery(Box::new(subquery)))
                } else {
                    let inner = self.expr()?;
                    self.stream.expect(&TokenKind::RParen)?;
                    Ok(Expr::Nested(Box::new(inner)))
                }
            }
            TokenKind::Ident(name) => self.identifier_expr(&name),
            _ => Err(self.stream.unexpected("expression")),
        }
    }

    fn identifier_expr(&mut self, name: &str) -> Result<Expr, ParseError> {
        let upper = name.to_ascii_uppercase();
        let call = self.stream.peek_n(1).kind == TokenKind::LParen;
        match upper.as_str() {
            "TRUE" | "FALSE" | "NULL" => {
                self.stream.advance();
                Ok(Expr::Literal(match upper.as_str() {
                    "TRUE" => Literal::Boolean(true),
                    "FALSE" => Literal::Boolean(false),
                    _ => Literal::Null,
                }))
            }
            "CURRENT_DATE" => {
                self.stream.advance();
                Ok(Expr::CurrentDate)
            }
            "CURRENT_TIME" => {
                self.stream.advance();
                Ok(Expr::CurrentTime)
            }
            "CURRENT_TIMESTAMP" => {
                self.stream.advance();
                Ok(Expr::CurrentTimestamp)
            }
            "CASE" => self.case(),
            "NEW" => self.constructor(),
            "EXISTS" => {
                self.stream.advance();
                Ok(Expr::Exists(Box::new(self.parenthesised_select()?)))
            }
            "ALL" | "ANY" | "SOME" if call => {
                self.stream.advance();
                let quantifier = match upper.as_str() {
                    "ALL" => Quantifier::All,
                    "ANY" => Quantifier::Any,
                    _ => Quantifier::Some,
                };
                Ok(Expr::Quantified {
                    quantifier,
                    subquery: Box::new(self.parenthesised_select()?),
                })
            }
            _ if call => self.function_call(&upper),
            _ if is_reserved(&upper) => Err(self.stream.unexpected("expression")),
            _ => Ok(Expr::Path(self.path()?)),
        }
    }

    fn parenthesised_select(&mut self) -> Result<SelectStatement, ParseError> {
        self.stream.expect(&TokenKind::LParen)?;
        let select = self.select()?;
        self.stream.expect(&TokenKind::RParen)?;
        Ok(select)
    }

    fn parenthesised_path(&mut self) -> Result<Path, ParseError> {
        self.stream.expect(&TokenKind::LParen)?;
        let path = self.path()?;
        self.stream.expect(&TokenKind::RParen)?;
        Ok(path)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.stream.expect(&TokenKind::LParen)?;
        let args = self.comma_list(Self::expr)?;
        self.stream.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn function_call(&mut self, upper: &str) -> Result<Expr, ParseError> {
        let start = self.stream.position();
        self.stream.advance();
        let aggregate = match upper {
            "AVG" => Some(AggregateFunction::Avg),
            "MAX" => Some(AggregateFunction::Max),
            "MIN" => Some(AggregateFunction::Min),
            "SUM" => Some(AggregateFunction::Sum),
            "COUNT" => Some(AggregateFunction::Count),
            _ => None,
        };
        if let Some(function) = aggregate {
            self.stream.expect(&TokenKind::LParen)?;
            let distinct = self.stream.match_keyword("DISTINCT");
            let arg = self.expr()?;
            self.stream.expect(&TokenKind::RParen)?;
            return Ok(Expr::Aggregate {
                function,
                distinct,
                arg: Box::new(arg),
            });
        }

        match upper {
            "COALESCE" => {
                let args = self.arguments()?;
                if args.len() < 2 {
                    self.stream.restore(start);
                    return Err(self.stream.error("COALESCE takes at least two arguments"));
                }
                Ok(Expr::Coalesce(args))
            }
            "NULLIF" => {
                let mut args = self.arguments()?;
                if args.len() != 2 {
                    self.stream.restore(start);
                    return Err(self.stream.error("NULLIF takes two arguments"));
                }
                let second = args.remove(1);
                let first = args.remove(0);
                Ok(Expr::NullIf(Box::new(first), Box::new(second)))
            }
            "TRIM" => self.trim(),
            "TYPE" => {
                self.stream.expect(&TokenKind::LParen)?;
                let inner = self.expr()?;
                self.stream.expect(&TokenKind::RParen)?;
                Ok(Expr::Type(Box::new(inner)))
            }
            "KEY" => Ok(Expr::Key(self.parenthesised_path()?)),
            "VALUE" => Ok(Expr::Value(self.parenthesised_path()?)),
            "ENTRY" => Ok(Expr::Entry(self.parenthesised_path()?)),
            "OBJECT" => Ok(Expr::Object(self.parenthesised_path()?)),
            _ => {
                let Some(function) = Function::ALL
                    .into_iter()
                    .find(|function| function.name() == upper)
                else {
                    self.stream.restore(start);
                    return Err(self.stream.error(format!("unknown function {upper}")));
                };
                let args = self.arguments()?;
                let (min, max) = function.arity();
                if args.len() < min || args.len() > max {
                    self.stream.restore(start);
                    return Err(self.stream.error(format!(
                        "wrong number of arguments for {}",
                        function.name()
                    )));
                }
                Ok(Expr::Function { function, args })
            }
        }
    }

    fn trim(&mut self) -> Result<Expr, ParseError> {
        self.stream.expect(&TokenKind::LParen)?;
        let spec = if self.stream.match_keyword("LEADING") {
            Some(TrimSpec::Leading)
        } else if self.stream.match_keyword("TRAILING") {
            Some(TrimSpec::Trailing)
        } else if self.stream.match_keyword("BOTH") {
            Some(TrimSpec::Both)
        } else {
            None
        };

        let (character, from, expr) = if self.stream.match_keyword("FROM") {
            (None, true, self.expr()?)
        } else {
            let first = self.expr()?;
            if self.stream.match_keyword("FROM") {
                (Some(Box::new(first)), true, self.expr()?)
            } else if spec.is_some() {
                return Err(self.stream.unexpected("FROM"));
            } else {
                (None, false, first)
            }
        };
        self.stream.expect(&TokenKind::RParen)?;
        Ok(Expr::Trim {
            spec,
            character,
            from,
            expr: Box::new(expr),
        })
    }

    fn case(&mut self) -> Result<Expr, ParseError> {
        self.stream.expect_keyword("CASE")?;
        let operand = if self.stream.check_keyword("WHEN") {
            None
        } else {
            Some(self.expr()?)
        };
        let mut whens = Vec::new();
        while self.stream.match_keyword("WHEN") {
            let condition = self.expr()?;
            self.stream.expect_keyword("THEN")?;
            let result = self.expr()?;
            whens.push((condition, result));
        }
        if whens.is_empty() {
            return Err(self.stream.unexpected("WHEN"));
        }
        let else_expr = if self.stream.match_keyword("ELSE") {
            Some(self.expr()?)
        } else {
            None
        };
        self.stream.expect_keyword("END")?;
        Ok(Expr::Case(Box::new(CaseExpr {
            operand,
            whens,
            else_expr,
        })))
    }

    fn constructor(&mut self) -> Result<Expr, ParseError> {
        self.stream.expect_keyword("NEW")?;
        let mut class_name = self.stream.expect_ident("class name")?;
        while self.stream.match_token(&TokenKind::Dot) {
            class_name.push('.');
            class_name.push_str(&self.stream.expect_ident("class name")?);
        }
        let args = self.arguments()?;
        Ok(Expr::Constructor { class_name, args })
    }
}
