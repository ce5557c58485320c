//! Recursive descent parser for Tessera templates.
//!
//! Builds elements bottom-up through a [`TreeBuilder`]: each directive body is
//! collected in a [`ChildList`] and handed to its element once the closing
//! tag is seen.

use std::sync::Arc;

use tracing::debug;

use crate::builder::{ChildList, TreeBuilder};
use crate::element::{
    Assignment, Branch, CapturingAssignment, Comment, ConditionalBlock, ElementId, ElementKind,
    Include, ListBlock, MacroCall, MacroDefinition, TextBlock,
};
use crate::expression::{ComparisonOp, Expression, ExpressionKind};
use crate::lexer::{tokenize, tokenize_expression};
use crate::location::{Location, Span, TemplateSource, RUNTIME_EVAL_LINE_DISPLACEMENT};
use crate::node::Node;
use crate::token::{Token, TokenType};
use crate::tree::Template;
use crate::ParseError;

/// Parse a template and run the cleanup pass on it.
pub fn parse_template(
    name: Option<&str>,
    text: &str,
    strip_whitespace: bool,
) -> Result<Template, ParseError> {
    let (builder, root) = build_tree(name, text)?;
    Ok(builder.finish(root, strip_whitespace))
}

/// Parse a template into a builder without cleaning it up.
pub(crate) fn build_tree(
    name: Option<&str>,
    text: &str,
) -> Result<(TreeBuilder, ElementId), ParseError> {
    let source = Arc::new(TemplateSource::new(name.map(str::to_string), text));
    let tokens = tokenize(text)?;
    debug!(
        template = name.unwrap_or("<nameless>"),
        tokens = tokens.len(),
        "tokenized template"
    );
    let mut parser = Parser::new(tokens, TreeBuilder::new(source.clone()), Some(source));
    let root = parser.parse_root()?;
    Ok((parser.builder, root))
}

/// Parse a standalone expression, such as the operand of `?eval`.
///
/// The result has no template and lives in the runtime-eval line space.
pub fn parse_expression_fragment(text: &str) -> Result<Expression, ParseError> {
    let tokens = tokenize_expression(text, RUNTIME_EVAL_LINE_DISPLACEMENT)?;
    let scratch = TreeBuilder::new(Arc::new(TemplateSource::new(None, "")));
    let mut parser = Parser::new(tokens, scratch, None);
    let expression = parser.parse_expression()?;
    if parser.current_type() != TokenType::Eof {
        return parser.unexpected_token("expected end of expression");
    }
    Ok(expression)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    builder: TreeBuilder,
    template: Option<Arc<TemplateSource>>,
}

impl Parser {
    fn new(tokens: Vec<Token>, builder: TreeBuilder, template: Option<Arc<TemplateSource>>) -> Self {
        Self {
            tokens,
            pos: 0,
            builder,
            template,
        }
    }

    fn span(&self, begin: &impl Span, end: &impl Span) -> Location {
        Location::spanning(self.template.as_ref(), begin, end)
    }

    fn parse_root(&mut self) -> Result<ElementId, ParseError> {
        let body = self.parse_body()?;
        if self.current_type() != TokenType::Eof {
            return self.unexpected_token("closing tag without an open directive");
        }
        let location = match (self.tokens.first(), self.tokens.len().checked_sub(2)) {
            (Some(first), Some(last)) => self.span(first, &self.tokens[last]),
            _ => Location::new(self.template.clone(), 1, 1, 1, 0),
        };
        let root = self.builder.create(ElementKind::ImplicitParent, location);
        self.builder.set_children(root, body);
        Ok(root)
    }

    /// Elements up to the next closing, `#elseif`, or `#else` tag.
    fn parse_body(&mut self) -> Result<ChildList, ParseError> {
        let mut body = ChildList::new();
        while self.current_type() != TokenType::Eof && !self.at_body_end() {
            let child = self.parse_node()?;
            body.push(child);
        }
        Ok(body)
    }

    fn parse_node(&mut self) -> Result<ElementId, ParseError> {
        match self.current_type() {
            TokenType::Text => {
                let token = self.consume(TokenType::Text)?;
                let location = self.span(&token, &token);
                Ok(self
                    .builder
                    .create(ElementKind::Text(TextBlock::new(token.value)), location))
            }
            TokenType::Comment => {
                let token = self.consume(TokenType::Comment)?;
                let location = self.span(&token, &token);
                Ok(self
                    .builder
                    .create(ElementKind::Comment(Comment { text: token.value }), location))
            }
            TokenType::Open => self.parse_tag(),
            _ => self.unexpected_token("unexpected token"),
        }
    }

    fn parse_tag(&mut self) -> Result<ElementId, ParseError> {
        let open = self.consume(TokenType::Open)?;
        match self.current_type() {
            TokenType::Hash => self.parse_directive(open),
            TokenType::At => self.parse_macro_call(open),
            _ => {
                let expression = self.parse_expression()?;
                let close = self.consume(TokenType::Close)?;
                let location = self.span(&open, &close);
                Ok(self
                    .builder
                    .create(ElementKind::Interpolation(expression), location))
            }
        }
    }

    fn parse_directive(&mut self, open: Token) -> Result<ElementId, ParseError> {
        self.consume(TokenType::Hash)?;
        let name = self.current_token().clone();
        if name.token_type != TokenType::Ident {
            return self.unexpected_token("expected a directive name");
        }
        match name.value.as_str() {
            "if" => {
                self.advance();
                self.parse_if(open)
            }
            "list" => {
                self.advance();
                self.parse_list(open)
            }
            "assign" => {
                self.advance();
                self.parse_assign(open)
            }
            "macro" => {
                self.advance();
                self.parse_macro(open)
            }
            "include" => {
                self.advance();
                self.parse_include(open)
            }
            "elseif" | "else" => self.unexpected_token("branch without an enclosing '#if'"),
            _ => Err(ParseError::UnknownDirective {
                name: name.value,
                line: name.begin.line,
                column: name.begin.column,
            }),
        }
    }

    fn parse_if(&mut self, open: Token) -> Result<ElementId, ParseError> {
        let mut branches = ChildList::new();
        let mut header_open = open.clone();
        let mut branch = Branch::If;
        let mut condition = Some(self.parse_expression()?);
        let mut header_close = self.consume(TokenType::Close)?;

        let end = loop {
            let body = self.parse_body()?;
            let last = body.last().map(|id| self.builder.get(id).location().clone());
            let location = Location::enclosing(
                self.template.as_ref(),
                &header_open,
                &header_close,
                last.as_ref(),
            );
            let kind = ElementKind::Conditional(ConditionalBlock {
                condition: condition.take(),
                branch,
            });
            let element = self.builder.create(kind, location);
            self.builder.set_children(element, body);
            branches.push(element);

            match self.branch_keyword() {
                Some(Branch::ElseIf) if branch != Branch::Else => {
                    header_open = self.consume_branch_start()?;
                    branch = Branch::ElseIf;
                    condition = Some(self.parse_expression()?);
                    header_close = self.consume(TokenType::Close)?;
                }
                Some(Branch::Else) if branch != Branch::Else => {
                    header_open = self.consume_branch_start()?;
                    branch = Branch::Else;
                    header_close = self.consume(TokenType::Close)?;
                }
                Some(_) => return self.unexpected_token("branch after '#else'"),
                None => break self.consume_block_close("if", &open)?,
            }
        };

        let location = self.span(&open, &end);
        let block = self.builder.create(ElementKind::IfBlock, location);
        self.builder.set_children(block, branches);
        Ok(block)
    }

    fn parse_list(&mut self, open: Token) -> Result<ElementId, ParseError> {
        let source = self.parse_expression()?;
        self.consume(TokenType::KwAs)?;
        let loop_variable = self.parse_identifier()?;
        self.consume(TokenType::Close)?;
        let body = self.parse_body()?;
        let end = self.consume_block_close("list", &open)?;

        let location = self.span(&open, &end);
        let kind = ElementKind::List(ListBlock {
            source,
            loop_variable,
        });
        let list = self.builder.create(kind, location);
        self.builder.set_children(list, body);
        Ok(list)
    }

    fn parse_assign(&mut self, open: Token) -> Result<ElementId, ParseError> {
        let target = self.parse_identifier()?;
        if self.current_type() == TokenType::Equal {
            self.advance();
            let value = self.parse_expression()?;
            let close = self.consume(TokenType::Close)?;
            let location = self.span(&open, &close);
            return Ok(self
                .builder
                .create(ElementKind::Assignment(Assignment { target, value }), location));
        }

        self.consume(TokenType::Close)?;
        let body = self.parse_body()?;
        let end = self.consume_block_close("assign", &open)?;
        let location = self.span(&open, &end);
        let kind = ElementKind::CapturingAssignment(CapturingAssignment { target });
        let capture = self.builder.create(kind, location);
        self.builder.set_children(capture, body);
        Ok(capture)
    }

    fn parse_macro(&mut self, open: Token) -> Result<ElementId, ParseError> {
        let name = self.parse_identifier()?;
        let mut parameters: Vec<String> = Vec::new();
        while self.current_type() != TokenType::Close {
            let parameter_token = self.current_token().clone();
            let parameter = self.parse_identifier()?;
            if parameters.contains(&parameter) {
                return Err(ParseError::UnexpectedToken {
                    message: format!("duplicate macro parameter '{parameter}'"),
                    line: parameter_token.begin.line,
                    column: parameter_token.begin.column,
                });
            }
            parameters.push(parameter);
        }
        self.consume(TokenType::Close)?;
        let body = self.parse_body()?;
        let end = self.consume_block_close("macro", &open)?;

        let location = self.span(&open, &end);
        let kind = ElementKind::Macro(MacroDefinition { name, parameters });
        let definition = self.builder.create(kind, location);
        self.builder.set_children(definition, body);
        Ok(definition)
    }

    fn parse_include(&mut self, open: Token) -> Result<ElementId, ParseError> {
        let path = self.parse_expression()?;
        let close = self.consume(TokenType::Close)?;
        let location = self.span(&open, &close);
        Ok(self
            .builder
            .create(ElementKind::Include(Include { path }), location))
    }

    fn parse_macro_call(&mut self, open: Token) -> Result<ElementId, ParseError> {
        self.consume(TokenType::At)?;
        let name = self.parse_identifier()?;
        let mut arguments = Vec::new();
        if self.current_type() != TokenType::Close {
            loop {
                arguments.push(self.parse_expression()?);
                if self.current_type() != TokenType::Comma {
                    break;
                }
                self.advance();
            }
        }
        let close = self.consume(TokenType::Close)?;
        let location = self.span(&open, &close);
        Ok(self
            .builder
            .create(ElementKind::MacroCall(MacroCall { name, arguments }), location))
    }

    // ========================================================================
    // Expressions, lowest precedence first
    // ========================================================================

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_and()?;
        while self.current_type() == TokenType::OrOr {
            self.advance();
            let right = self.parse_and()?;
            let location = self.span(&left, &right);
            let kind = ExpressionKind::Or {
                left: Box::new(left),
                right: Box::new(right),
            };
            left = Expression::new(kind, location);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_equality()?;
        while self.current_type() == TokenType::AndAnd {
            self.advance();
            let right = self.parse_equality()?;
            let location = self.span(&left, &right);
            let kind = ExpressionKind::And {
                left: Box::new(left),
                right: Box::new(right),
            };
            left = Expression::new(kind, location);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current_type() {
                TokenType::EqEq => ComparisonOp::Equal,
                TokenType::NotEq => ComparisonOp::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            let location = self.span(&left, &right);
            let kind = ExpressionKind::Comparison {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            left = Expression::new(kind, location);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;
        while self.current_type() == TokenType::Plus {
            self.advance();
            let right = self.parse_unary()?;
            let location = self.span(&left, &right);
            let kind = ExpressionKind::Add {
                left: Box::new(left),
                right: Box::new(right),
            };
            left = Expression::new(kind, location);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if self.current_type() == TokenType::Bang {
            let bang = self.consume(TokenType::Bang)?;
            let operand = self.parse_unary()?;
            let location = self.span(&bang, &operand);
            return Ok(Expression::new(
                ExpressionKind::Not(Box::new(operand)),
                location,
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_primary()?;
        loop {
            match self.current_type() {
                TokenType::Dot => {
                    self.advance();
                    let key = self.consume(TokenType::Ident)?;
                    let location = self.span(&expression, &key);
                    let kind = ExpressionKind::Dot {
                        target: Box::new(expression),
                        key: key.value,
                    };
                    expression = Expression::new(kind, location);
                }
                TokenType::Question => {
                    self.advance();
                    let builtin = self.consume(TokenType::Ident)?;
                    if builtin.value != "eval" {
                        return Err(ParseError::UnexpectedToken {
                            message: format!("unknown built-in '?{}'", builtin.value),
                            line: builtin.begin.line,
                            column: builtin.begin.column,
                        });
                    }
                    let location = self.span(&expression, &builtin);
                    expression = Expression::new(ExpressionKind::Eval(Box::new(expression)), location);
                }
                _ => return Ok(expression),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let token = self.current_token().clone();
        let kind = match token.token_type {
            TokenType::String => ExpressionKind::StringLiteral(token.value.clone()),
            TokenType::Integer => match token.value.parse::<i64>() {
                Ok(value) => ExpressionKind::IntegerLiteral(value),
                Err(_) => {
                    return Err(ParseError::IntegerOutOfRange {
                        literal: token.value,
                        line: token.begin.line,
                        column: token.begin.column,
                    })
                }
            },
            TokenType::KwTrue => ExpressionKind::BooleanLiteral(true),
            TokenType::KwFalse => ExpressionKind::BooleanLiteral(false),
            TokenType::KwNull => ExpressionKind::NullLiteral,
            TokenType::Ident => ExpressionKind::Variable(token.value.clone()),
            TokenType::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                let close = self.consume(TokenType::RParen)?;
                let location = self.span(&token, &close);
                return Ok(Expression::new(
                    ExpressionKind::Parenthetical(Box::new(inner)),
                    location,
                ));
            }
            TokenType::KwAs => return Err(reserved_word(&token)),
            _ => return self.unexpected_token("expected an expression"),
        };
        self.advance();
        let location = self.span(&token, &token);
        Ok(Expression::new(kind, location))
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let token = self.current_token().clone();
        match token.token_type {
            TokenType::Ident => {
                self.advance();
                Ok(token.value)
            }
            TokenType::KwTrue | TokenType::KwFalse | TokenType::KwNull | TokenType::KwAs => {
                Err(reserved_word(&token))
            }
            _ => self.unexpected_token("expected an identifier"),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn peek_type(&self, offset: usize) -> TokenType {
        self.tokens
            .get(self.pos + offset)
            .map_or(TokenType::Eof, |t| t.token_type)
    }

    /// The branch a `{[#elseif` or `{[#else` tag at the cursor starts.
    fn branch_keyword(&self) -> Option<Branch> {
        if self.current_type() != TokenType::Open || self.peek_type(1) != TokenType::Hash {
            return None;
        }
        let name = self.tokens.get(self.pos + 2)?;
        match (name.token_type, name.value.as_str()) {
            (TokenType::Ident, "elseif") => Some(Branch::ElseIf),
            (TokenType::Ident, "else") => Some(Branch::Else),
            _ => None,
        }
    }

    fn at_body_end(&self) -> bool {
        (self.current_type() == TokenType::Open && self.peek_type(1) == TokenType::Slash)
            || self.branch_keyword().is_some()
    }

    /// Consumes `{[#elseif` or `{[#else`, returning the `{[` token.
    fn consume_branch_start(&mut self) -> Result<Token, ParseError> {
        let open = self.consume(TokenType::Open)?;
        self.consume(TokenType::Hash)?;
        self.consume(TokenType::Ident)?;
        Ok(open)
    }

    /// Consumes `{[/keyword]}`, returning its `]}` token.
    fn consume_block_close(&mut self, keyword: &'static str, open: &Token) -> Result<Token, ParseError> {
        if self.current_type() == TokenType::Eof {
            return Err(ParseError::Unterminated {
                what: directive_name(keyword),
                line: open.begin.line,
                column: open.begin.column,
            });
        }
        self.consume(TokenType::Open)?;
        self.consume(TokenType::Slash)?;
        let name = self.current_token().clone();
        if name.token_type != TokenType::Ident || name.value != keyword {
            return Err(ParseError::MismatchedClose {
                expected: keyword.to_string(),
                found: name.value,
                line: name.begin.line,
                column: name.begin.column,
            });
        }
        self.advance();
        self.consume(TokenType::Close)
    }

    fn current_token(&self) -> &Token {
        // The lexer always ends the stream with an Eof token.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_type(&self) -> TokenType {
        self.peek_type(0)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn consume(&mut self, expected: TokenType) -> Result<Token, ParseError> {
        let token = self.current_token().clone();
        if token.token_type != expected {
            let expected = expected
                .literal()
                .map_or_else(|| format!("{expected:?}"), |literal| format!("'{literal}'"));
            return Err(ParseError::UnexpectedToken {
                message: format!("expected {expected}, got {}", describe(&token)),
                line: token.begin.line,
                column: token.begin.column,
            });
        }
        self.advance();
        Ok(token)
    }

    fn unexpected_token<T>(&self, message: &str) -> Result<T, ParseError> {
        let token = self.current_token();
        Err(ParseError::UnexpectedToken {
            message: format!("{message}: {}", describe(token)),
            line: token.begin.line,
            column: token.begin.column,
        })
    }
}

fn describe(token: &Token) -> String {
    match token.token_type {
        TokenType::Eof => "end of input".to_string(),
        TokenType::Text => "text".to_string(),
        TokenType::String => format!("string {:?}", token.value),
        _ => format!("'{}'", token.value),
    }
}

fn reserved_word(token: &Token) -> ParseError {
    ParseError::ReservedWord {
        word: token.value.clone(),
        line: token.begin.line,
        column: token.begin.column,
    }
}

fn directive_name(keyword: &str) -> &'static str {
    match keyword {
        "if" => "#if",
        "list" => "#list",
        "assign" => "#assign",
        _ => "#macro",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Position;

    fn parse(text: &str) -> Template {
        parse_template(Some("t.tsr"), text, false).unwrap()
    }

    #[test]
    fn test_parse_simple_interpolation() {
        let tpl = parse("{[ name ]}");
        let root = tpl.root();
        assert!(matches!(root.kind(), ElementKind::Interpolation(_)));
        assert_eq!(root.location().begin(), Position::new(1, 1));
        assert_eq!(root.location().end(), Position::new(1, 10));
        assert_eq!(root.source(), "{[ name ]}");
    }

    #[test]
    fn test_parse_if_chain() {
        let tpl = parse("{[#if a]}x{[#elseif b]}y{[#else]}z{[/if]}");
        let root = tpl.root();
        assert!(matches!(root.kind(), ElementKind::IfBlock));
        let branches: Vec<String> = root.children().map(|b| b.descriptor()).collect();
        assert_eq!(branches, vec!["#if", "#elseif", "#else"]);
        assert_eq!(root.location().end(), Position::new(1, 41));
        assert_eq!(root.child(1).source(), "{[#elseif b]}y");
    }

    #[test]
    fn test_empty_branch_ends_at_its_tag() {
        let tpl = parse("{[#if a]}{[#else]}z{[/if]}");
        let first = tpl.root().child(0);
        assert!(first.is_leaf());
        assert_eq!(first.source(), "{[#if a]}");
    }

    #[test]
    fn test_lone_if_takes_the_container_location() {
        let tpl = parse("{[#if a]}x{[/if]}");
        let root = tpl.root();
        assert!(matches!(root.kind(), ElementKind::Conditional(_)));
        assert_eq!(root.source(), "{[#if a]}x{[/if]}");
    }

    #[test]
    fn test_parse_nested_blocks() {
        let tpl = parse("{[#list items as item]}{[#if item.show]}{[ item.name ]}{[/if]}{[/list]}");
        let list = tpl.root();
        assert!(list.is_nested_block_repeater());
        let branch = list.child(0);
        assert_eq!(branch.child(0).canonical_form(), "{[ item.name ]}");
    }

    #[test]
    fn test_expression_precedence() {
        let tpl = parse("{[ !a || b && c == d + 1 ]}");
        assert_eq!(
            crate::printer::dump_tree(&tpl).lines().nth(1),
            Some("  - content: !a || b && c == d + 1")
        );
        let ElementKind::Interpolation(expression) = tpl.root().kind() else {
            panic!("expected an interpolation");
        };
        assert_eq!(expression.descriptor(), "||");
        let ExpressionKind::Or { right, .. } = &expression.kind else {
            panic!("expected ||");
        };
        assert_eq!(right.descriptor(), "&&");
    }

    #[test]
    fn test_macro_and_call() {
        let tpl = parse("{[#macro card title body]}{[ title ]}{[/macro]}{[@card \"a\", 1 + 2]}");
        let root = tpl.root();
        assert_eq!(root.child(0).description(), "{[#macro card title body]}");
        assert_eq!(root.child(1).canonical_form(), "{[@card \"a\", 1 + 2]}");
        assert_eq!(root.child(1).parameter_count(), 3);
    }

    #[test]
    fn test_reserved_word_error() {
        assert!(matches!(
            parse_template(None, "{[#assign true = 1]}", true),
            Err(ParseError::ReservedWord { .. })
        ));
        assert!(matches!(
            parse_template(None, "{[#list xs as as]}{[/list]}", true),
            Err(ParseError::ReservedWord { .. })
        ));
    }

    #[test]
    fn test_structure_errors() {
        assert!(matches!(
            parse_template(None, "{[#if a]}x{[/list]}", true),
            Err(ParseError::MismatchedClose { .. })
        ));
        assert!(matches!(
            parse_template(None, "{[#if a]}x", true),
            Err(ParseError::Unterminated { what: "#if", line: 1, column: 1 })
        ));
        assert!(matches!(
            parse_template(None, "{[#unless a]}", true),
            Err(ParseError::UnknownDirective { .. })
        ));
        assert!(parse_template(None, "x{[/if]}", true).is_err());
        assert!(parse_template(None, "{[#else]}", true).is_err());
        assert!(parse_template(None, "{[#if a]}{[#else]}{[#else]}{[/if]}", true).is_err());
        assert!(parse_template(None, "{[#macro m a a]}{[/macro]}", true).is_err());
        assert!(parse_template(None, "{[ x?upper ]}", true).is_err());
    }

    #[test]
    fn test_integer_out_of_range() {
        assert!(matches!(
            parse_template(None, "{[ 99999999999999999999 ]}", true),
            Err(ParseError::IntegerOutOfRange { .. })
        ));
    }

    #[test]
    fn test_expression_fragment_is_runtime_evaluated() {
        let expression = parse_expression_fragment("user.name + \"!\"").unwrap();
        assert!(expression.location().is_runtime_evaluated());
        assert_eq!(expression.location().template(), None);
        assert_eq!(expression.location().to_string(), "evaluated string:1:1");
        assert_eq!(expression.source(), "user.name + \"!\"");

        assert!(parse_expression_fragment("a b").is_err());
    }
}
