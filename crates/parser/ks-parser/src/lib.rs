//! Parser for the Kestrel language
//!
//! Declarations and statements are parsed by recursive descent; expressions
//! go through an explicit two-stack precedence-climbing algorithm (see
//! [`expr`]). The parser works over the fully buffered token stream and
//! saves/restores its position for the speculative variable-definition
//! parse that disambiguates `Type name;` from expression statements.
//!
//! Error recovery is at declaration granularity: a malformed top-level
//! declaration is discarded and parsing resumes at the next token that can
//! start a new declaration.

pub mod error;
mod expr;

pub use error::ParseError;

use ks_intern::{Interner, Symbol};
use ks_lexer::{LexError, Token, TokenKind, TokenStream};
use ks_span::Span;
use ks_syntax::{
    AliasDecl, ClassDecl, Decl, FnDecl, MemberVar, NamespaceDecl, ParamDecl, Stmt, TypeArg,
    TypeName, Unit,
};
use miette::SourceSpan;

/// Result of parsing a source file
#[derive(Debug)]
pub struct ParseResult {
    /// The parsed unit; malformed declarations are absent
    pub unit: Unit,
    /// Parse errors, one per abandoned declaration at most
    pub errors: Vec<ParseError>,
    /// Characters the token grammar rejected
    pub lex_errors: Vec<LexError>,
}

/// Tokenize and parse a whole source file
pub fn parse_source(source: &str, file_name: &str, interner: &Interner) -> ParseResult {
    let (stream, lex_errors) = ks_lexer::tokenize(source);
    let mut parser = Parser::new(stream, file_name, interner);
    let unit = parser.parse_unit();
    ParseResult {
        unit,
        errors: parser.errors,
        lex_errors,
    }
}

/// Saved parser position for speculative parsing
#[derive(Copy, Clone)]
struct Checkpoint {
    pos: usize,
    pending_gt: bool,
}

pub(crate) struct Parser<'src, 'i> {
    stream: TokenStream<'src>,
    interner: &'i Interner,
    file_name: String,
    /// Linkage mode toggled by `external:` / `internal:` markers
    external_mode: bool,
    /// Set when a `>>` token was consumed as the first of two closing `>`
    pending_gt: bool,
    errors: Vec<ParseError>,
}

type ParseOutcome<T> = Result<T, ParseError>;

impl<'src, 'i> Parser<'src, 'i> {
    fn new(stream: TokenStream<'src>, file_name: &str, interner: &'i Interner) -> Self {
        Self {
            stream,
            interner,
            file_name: file_name.to_string(),
            external_mode: false,
            pending_gt: false,
            errors: Vec::new(),
        }
    }

    // ---- diagnostics -----------------------------------------------------

    fn src(&self) -> miette::NamedSource<String> {
        miette::NamedSource::new(&self.file_name, self.stream.source().to_string())
    }

    fn miette_span(span: Span) -> SourceSpan {
        (span.start as usize, span.len().max(1) as usize).into()
    }

    fn token_text(&self, token: Token) -> String {
        if token.kind == TokenKind::Eof {
            "end of file".to_string()
        } else {
            self.stream.text(token).to_string()
        }
    }

    fn unexpected(&self, token: Token) -> ParseError {
        ParseError::UnexpectedToken {
            token: self.token_text(token),
            span: Self::miette_span(token.span),
            src: self.src(),
        }
    }

    fn invalid(&self, construct: &str, suggestion: Option<&str>, span: Span) -> ParseError {
        ParseError::InvalidSyntax {
            construct: construct.to_string(),
            suggestion: suggestion.map(str::to_string),
            span: Self::miette_span(span),
            src: self.src(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseOutcome<Token> {
        if self.stream.at(kind) {
            return Ok(self.stream.advance());
        }
        let found = self.stream.peek();
        Err(ParseError::MissingToken {
            expected: kind.to_string(),
            found: self.token_text(found),
            span: Self::miette_span(found.span),
            src: self.src(),
        })
    }

    fn intern_token(&self, token: Token) -> Symbol {
        self.interner.intern(self.stream.text(token))
    }

    // ---- speculation -----------------------------------------------------

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.stream.pos(),
            pending_gt: self.pending_gt,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.stream.restore(checkpoint.pos);
        self.pending_gt = checkpoint.pending_gt;
    }

    // ---- recovery --------------------------------------------------------

    /// Skip the offending token, then everything up to the next token that
    /// can start a top-level declaration
    fn recover(&mut self) {
        self.pending_gt = false;
        self.stream.advance();
        loop {
            match self.stream.peek_kind() {
                TokenKind::Fn
                | TokenKind::Class
                | TokenKind::Namespace
                | TokenKind::Using
                | TokenKind::External
                | TokenKind::Internal
                | TokenKind::RBrace
                | TokenKind::Eof => return,
                _ => {
                    self.stream.advance();
                }
            }
        }
    }

    // ---- declarations ----------------------------------------------------

    fn parse_unit(&mut self) -> Unit {
        let mut unit = Unit::default();
        while !self.stream.at(TokenKind::Eof) {
            match self.parse_decl() {
                Ok(Some(decl)) => unit.decls.push(decl),
                Ok(None) => {}
                Err(error) => {
                    self.errors.push(error);
                    self.recover();
                }
            }
        }
        unit
    }

    /// Parse one declaration; `Ok(None)` for linkage markers
    fn parse_decl(&mut self) -> ParseOutcome<Option<Decl>> {
        match self.stream.peek_kind() {
            TokenKind::External => {
                self.stream.advance();
                self.expect(TokenKind::Colon)?;
                self.external_mode = true;
                Ok(None)
            }
            TokenKind::Internal => {
                self.stream.advance();
                self.expect(TokenKind::Colon)?;
                self.external_mode = false;
                Ok(None)
            }
            TokenKind::Class => Ok(Some(Decl::Class(self.parse_class()?))),
            TokenKind::Fn => {
                let external = self.external_mode;
                Ok(Some(Decl::Function(self.parse_function(external)?)))
            }
            TokenKind::Namespace => Ok(Some(Decl::Namespace(self.parse_namespace()?))),
            TokenKind::Using => Ok(Some(Decl::Alias(self.parse_alias()?))),
            _ => Err(self.unexpected(self.stream.peek())),
        }
    }

    fn parse_namespace(&mut self) -> ParseOutcome<NamespaceDecl> {
        let keyword = self.expect(TokenKind::Namespace)?;
        let name_token = self.expect(TokenKind::Ident)?;
        let name = self.intern_token(name_token);
        self.expect(TokenKind::LBrace)?;

        let mut decls = Vec::new();
        while !self.stream.at(TokenKind::RBrace) && !self.stream.at(TokenKind::Eof) {
            match self.parse_decl() {
                Ok(Some(decl)) => decls.push(decl),
                Ok(None) => {}
                Err(error) => {
                    self.errors.push(error);
                    self.recover();
                }
            }
        }
        self.expect(TokenKind::RBrace)?;

        Ok(NamespaceDecl {
            name,
            decls,
            span: keyword.span.to(self.stream.prev_span()),
        })
    }

    fn parse_alias(&mut self) -> ParseOutcome<AliasDecl> {
        let keyword = self.expect(TokenKind::Using)?;
        let name_token = self.expect(TokenKind::Ident)?;
        let name = self.intern_token(name_token);
        self.expect(TokenKind::Assign)?;
        let target = self.parse_type_name()?;
        self.expect(TokenKind::Semi)?;
        Ok(AliasDecl {
            name,
            target,
            span: keyword.span.to(self.stream.prev_span()),
        })
    }

    fn parse_class(&mut self) -> ParseOutcome<ClassDecl> {
        let keyword = self.expect(TokenKind::Class)?;
        let name_token = self.expect(TokenKind::Ident)?;
        let name = self.intern_token(name_token);
        let class_text = self.stream.text(name_token).to_string();

        let mut template_params = Vec::new();
        if self.stream.eat(TokenKind::Lt) {
            loop {
                let param = self.expect(TokenKind::Ident)?;
                template_params.push(self.intern_token(param));
                if !self.stream.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt)?;
        }

        self.expect(TokenKind::LBrace)?;

        let mut class = ClassDecl {
            name,
            template_params,
            members: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            destructor: None,
            span: keyword.span,
        };

        while !self.stream.at(TokenKind::RBrace) && !self.stream.at(TokenKind::Eof) {
            match self.stream.peek_kind() {
                TokenKind::Tilde => {
                    let dtor = self.parse_destructor(&class_text)?;
                    if class.destructor.is_some() {
                        return Err(self.invalid(
                            "destructor",
                            Some("a class has at most one destructor"),
                            dtor.span,
                        ));
                    }
                    class.destructor = Some(dtor);
                }
                TokenKind::Fn => {
                    class.methods.push(self.parse_function(false)?);
                }
                TokenKind::Ident
                    if self.stream.text(self.stream.peek()) == class_text
                        && self.stream.nth_kind(1) == TokenKind::LParen =>
                {
                    class.constructors.push(self.parse_constructor()?);
                }
                TokenKind::Ident => {
                    let ty = self.parse_type_name()?;
                    let member_token = self.expect(TokenKind::Ident)?;
                    let member = self.intern_token(member_token);
                    self.expect(TokenKind::Semi)?;
                    class.members.push(MemberVar {
                        ty,
                        name: member,
                        span: member_token.span,
                    });
                }
                _ => return Err(self.unexpected(self.stream.peek())),
            }
        }
        self.expect(TokenKind::RBrace)?;
        class.span = keyword.span.to(self.stream.prev_span());
        Ok(class)
    }

    fn parse_destructor(&mut self, class_text: &str) -> ParseOutcome<FnDecl> {
        let tilde = self.expect(TokenKind::Tilde)?;
        let name_token = self.expect(TokenKind::Ident)?;
        if self.stream.text(name_token) != class_text {
            return Err(self.invalid(
                "destructor",
                Some("a destructor must be named after its class"),
                tilde.span.to(name_token.span),
            ));
        }
        let name = self.interner.intern(&format!("~{class_text}"));
        self.expect(TokenKind::LParen)?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_braced_block()?;
        Ok(FnDecl {
            name,
            params: Vec::new(),
            ret: None,
            body: Some(body),
            external: false,
            span: tilde.span.to(self.stream.prev_span()),
        })
    }

    fn parse_constructor(&mut self) -> ParseOutcome<FnDecl> {
        let name_token = self.expect(TokenKind::Ident)?;
        let name = self.intern_token(name_token);
        let params = self.parse_params()?;
        let body = self.parse_braced_block()?;
        Ok(FnDecl {
            name,
            params,
            ret: None,
            body: Some(body),
            external: false,
            span: name_token.span.to(self.stream.prev_span()),
        })
    }

    fn parse_function(&mut self, external: bool) -> ParseOutcome<FnDecl> {
        let keyword = self.expect(TokenKind::Fn)?;
        let name_token = self.expect(TokenKind::Ident)?;
        let name = self.intern_token(name_token);
        let params = self.parse_params()?;

        let ret = if self.stream.eat(TokenKind::Arrow) {
            Some(self.parse_type_name()?)
        } else {
            None
        };

        let body = if self.stream.at(TokenKind::LBrace) {
            Some(self.parse_braced_block()?)
        } else {
            self.expect(TokenKind::Semi)?;
            None
        };

        // A prototype cannot default its return type; a braced body can.
        if body.is_none() && ret.is_none() {
            return Err(self.invalid(
                "function declaration",
                Some("a prototype needs an explicit `-> Type` return type"),
                keyword.span.to(self.stream.prev_span()),
            ));
        }

        Ok(FnDecl {
            name,
            params,
            ret,
            body,
            external,
            span: keyword.span.to(self.stream.prev_span()),
        })
    }

    fn parse_params(&mut self) -> ParseOutcome<Vec<ParamDecl>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.stream.at(TokenKind::RParen) {
            loop {
                let ty = self.parse_type_name()?;
                let name_token = self.expect(TokenKind::Ident)?;
                params.push(ParamDecl {
                    ty,
                    name: self.intern_token(name_token),
                    span: name_token.span,
                });
                if !self.stream.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    // ---- types -----------------------------------------------------------

    /// Consume one closing `>` of a template argument list, splitting a
    /// `>>` token across two nested lists when needed
    fn expect_close_angle(&mut self) -> ParseOutcome<()> {
        if self.pending_gt {
            self.pending_gt = false;
            return Ok(());
        }
        if self.stream.eat(TokenKind::Gt) {
            return Ok(());
        }
        if self.stream.at(TokenKind::Shr) {
            self.stream.advance();
            self.pending_gt = true;
            return Ok(());
        }
        self.expect(TokenKind::Gt).map(|_| ())
    }

    fn parse_type_name(&mut self) -> ParseOutcome<TypeName> {
        let first = self.expect(TokenKind::Ident)?;
        let mut path = vec![self.intern_token(first)];
        let start = first.span;

        while self.stream.at(TokenKind::ColonColon) {
            self.stream.advance();
            let segment = self.expect(TokenKind::Ident)?;
            path.push(self.intern_token(segment));
        }

        let mut args = Vec::new();
        if self.stream.eat(TokenKind::Lt) {
            loop {
                args.push(self.parse_type_arg()?);
                if self.pending_gt {
                    self.expect_close_angle()?;
                    break;
                }
                if self.stream.eat(TokenKind::Comma) {
                    continue;
                }
                self.expect_close_angle()?;
                break;
            }
        }

        Ok(TypeName {
            path,
            args,
            span: start.to(self.stream.prev_span()),
        })
    }

    fn parse_type_arg(&mut self) -> ParseOutcome<TypeArg> {
        if self.stream.at(TokenKind::Integer) {
            let token = self.stream.advance();
            let value = self.parse_int_value(token)?;
            return Ok(TypeArg::Literal(value));
        }
        Ok(TypeArg::Type(self.parse_type_name()?))
    }

    fn parse_int_value(&self, token: Token) -> ParseOutcome<i64> {
        self.stream.text(token).parse::<i64>().map_err(|_| {
            self.invalid(
                "integer literal",
                Some("the value does not fit in 64 bits"),
                token.span,
            )
        })
    }

    fn parse_float_value(&self, token: Token) -> ParseOutcome<f64> {
        self.stream.text(token).parse::<f64>().map_err(|_| {
            self.invalid("float literal", None, token.span)
        })
    }

    // ---- statements ------------------------------------------------------

    fn parse_braced_block(&mut self) -> ParseOutcome<Stmt> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.stream.at(TokenKind::RBrace) && !self.stream.at(TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Stmt::Compound {
            stmts,
            span: open.span.to(self.stream.prev_span()),
        })
    }

    /// A brace-enclosed block or a single statement
    fn parse_block_or_stmt(&mut self) -> ParseOutcome<Stmt> {
        if self.stream.at(TokenKind::LBrace) {
            self.parse_braced_block()
        } else {
            self.parse_stmt()
        }
    }

    fn parse_stmt(&mut self) -> ParseOutcome<Stmt> {
        match self.stream.peek_kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LBrace => self.parse_braced_block(),
            _ => {
                let stmt = self.parse_def_or_expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(stmt)
            }
        }
    }

    fn parse_if(&mut self) -> ParseOutcome<Stmt> {
        let keyword = self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = self.parse_block_or_stmt()?;
        let else_branch = if self.stream.eat(TokenKind::Else) {
            Some(Box::new(self.parse_block_or_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch,
            span: keyword.span.to(self.stream.prev_span()),
        })
    }

    fn parse_for(&mut self) -> ParseOutcome<Stmt> {
        let keyword = self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        let init = if self.stream.at(TokenKind::Semi) {
            None
        } else {
            Some(Box::new(self.parse_def_or_expr()?))
        };
        self.expect(TokenKind::Semi)?;

        let cond = if self.stream.at(TokenKind::Semi) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.expect(TokenKind::Semi)?;

        let step = if self.stream.at(TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.expect(TokenKind::RParen)?;

        let body = self.parse_block_or_stmt()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body: Box::new(body),
            span: keyword.span.to(self.stream.prev_span()),
        })
    }

    fn parse_return(&mut self) -> ParseOutcome<Stmt> {
        let keyword = self.expect(TokenKind::Return)?;
        let value = if self.stream.at(TokenKind::Semi) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.expect(TokenKind::Semi)?;
        Ok(Stmt::Return {
            value,
            span: keyword.span.to(self.stream.prev_span()),
        })
    }

    /// Statement body that is either a variable definition or an expression
    ///
    /// A statement beginning with an identifier is speculatively parsed as a
    /// definition (`Type name [= expr]`); on failure the token position is
    /// rewound and the text reparses as a plain expression. The terminating
    /// `;` is left for the caller.
    fn parse_def_or_expr(&mut self) -> ParseOutcome<Stmt> {
        if self.stream.at(TokenKind::Ident) {
            let checkpoint = self.checkpoint();
            match self.try_parse_var_def() {
                Ok(def) => return Ok(def),
                Err(_) => self.restore(checkpoint),
            }
        }
        self.parse_expression()
    }

    fn try_parse_var_def(&mut self) -> ParseOutcome<Stmt> {
        let ty = self.parse_type_name()?;
        let name_token = self.expect(TokenKind::Ident)?;
        let name = self.intern_token(name_token);

        let init = if self.stream.eat(TokenKind::Assign) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        // A definition must end the statement; anything else means the
        // speculation was wrong.
        if !self.stream.at(TokenKind::Semi) {
            return Err(self.unexpected(self.stream.peek()));
        }

        Ok(Stmt::VarDef {
            span: ty.span.to(self.stream.prev_span()),
            ty,
            name,
            init,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Unit {
        let interner = Interner::new();
        let result = parse_source(source, "<test>", &interner);
        assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
        assert!(result.lex_errors.is_empty());
        result.unit
    }

    #[test]
    fn parses_function_with_default_void_return() {
        let unit = parse_ok("fn main() { return; }");
        assert_eq!(unit.decls.len(), 1);
        let Decl::Function(func) = &unit.decls[0] else {
            panic!("expected a function");
        };
        assert!(func.ret.is_none());
        assert!(func.body.is_some());
        assert!(!func.external);
    }

    #[test]
    fn prototype_requires_explicit_return_type() {
        let interner = Interner::new();
        let result = parse_source("fn f();", "<test>", &interner);
        assert_eq!(result.unit.decls.len(), 0);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn linkage_markers_toggle_external_flag() {
        let unit = parse_ok(
            "external: fn alloc(u64 size) -> __ptr<i32>; internal: fn helper() -> i32 { return 0; }",
        );
        let Decl::Function(alloc) = &unit.decls[0] else {
            panic!("expected a function");
        };
        let Decl::Function(helper) = &unit.decls[1] else {
            panic!("expected a function");
        };
        assert!(alloc.external);
        assert!(alloc.body.is_none());
        assert!(!helper.external);
    }

    #[test]
    fn parses_class_with_members_methods_ctor_and_dtor() {
        let unit = parse_ok(
            "class Point {
                i32 x;
                i32 y;
                Point(i32 px, i32 py) { x = px; }
                ~Point() { }
                fn norm() -> i32 { return 0; }
            }",
        );
        let Decl::Class(class) = &unit.decls[0] else {
            panic!("expected a class");
        };
        assert_eq!(class.members.len(), 2);
        assert_eq!(class.constructors.len(), 1);
        assert_eq!(class.constructors[0].params.len(), 2);
        assert!(class.destructor.is_some());
        assert_eq!(class.methods.len(), 1);
    }

    #[test]
    fn second_destructor_is_rejected() {
        let interner = Interner::new();
        let result = parse_source(
            "class A { ~A() { } ~A() { } } fn main() { }",
            "<test>",
            &interner,
        );
        assert_eq!(result.errors.len(), 1);
        // The class is abandoned but the following function survives.
        assert_eq!(result.unit.decls.len(), 1);
    }

    #[test]
    fn variable_definition_wins_over_expression() {
        let unit = parse_ok("fn main() { Point p; p = q; }");
        let Decl::Function(func) = &unit.decls[0] else {
            panic!("expected a function");
        };
        let Some(Stmt::Compound { stmts, .. }) = &func.body else {
            panic!("expected a block body");
        };
        assert!(matches!(stmts[0], Stmt::VarDef { .. }));
        assert!(matches!(stmts[1], Stmt::Binary { .. }));
    }

    #[test]
    fn constructor_call_statement_parses_as_expression() {
        let unit = parse_ok("fn main() { Point(1, 2); }");
        let Decl::Function(func) = &unit.decls[0] else {
            panic!("expected a function");
        };
        let Some(Stmt::Compound { stmts, .. }) = &func.body else {
            panic!("expected a block body");
        };
        assert!(matches!(stmts[0], Stmt::Call { .. }));
    }

    #[test]
    fn nested_template_arguments_split_shift_tokens() {
        let unit = parse_ok("fn main() { __ptr<__ptr<i32>> p; }");
        let Decl::Function(func) = &unit.decls[0] else {
            panic!("expected a function");
        };
        let Some(Stmt::Compound { stmts, .. }) = &func.body else {
            panic!("expected a block body");
        };
        let Stmt::VarDef { ty, .. } = &stmts[0] else {
            panic!("expected a definition");
        };
        assert_eq!(ty.args.len(), 1);
        let TypeArg::Type(inner) = &ty.args[0] else {
            panic!("expected a type argument");
        };
        assert_eq!(inner.args.len(), 1);
    }

    #[test]
    fn array_type_takes_value_arguments() {
        let unit = parse_ok("fn main() { __arr<i32, 4> xs; }");
        let Decl::Function(func) = &unit.decls[0] else {
            panic!("expected a function");
        };
        let Some(Stmt::Compound { stmts, .. }) = &func.body else {
            panic!("expected a block body");
        };
        let Stmt::VarDef { ty, .. } = &stmts[0] else {
            panic!("expected a definition");
        };
        assert!(matches!(ty.args[1], TypeArg::Literal(4)));
    }

    #[test]
    fn namespaces_and_aliases_parse() {
        let unit = parse_ok(
            "namespace math { fn abs(i32 x) -> i32 { return x; } }
             using Id = i32;",
        );
        assert!(matches!(unit.decls[0], Decl::Namespace(_)));
        assert!(matches!(unit.decls[1], Decl::Alias(_)));
    }

    #[test]
    fn malformed_declaration_is_abandoned_and_parsing_resumes() {
        let interner = Interner::new();
        let result = parse_source(
            "fn broken( { fn good() -> i32 { return 1; }",
            "<test>",
            &interner,
        );
        assert!(!result.errors.is_empty());
        assert_eq!(result.unit.decls.len(), 1);
        let Decl::Function(func) = &result.unit.decls[0] else {
            panic!("expected a function");
        };
        assert_eq!(interner.resolve(&func.name), "good");
    }

    #[test]
    fn reserved_keywords_are_rejected() {
        let interner = Interner::new();
        let result = parse_source("trait Show { } fn main() { }", "<test>", &interner);
        assert!(!result.errors.is_empty());
        assert_eq!(result.unit.decls.len(), 1);
    }

    #[test]
    fn single_statement_bodies_need_no_braces() {
        let unit = parse_ok("fn f(i32 n) -> i32 { if (n < 2) return n; return f(n - 1); }");
        let Decl::Function(func) = &unit.decls[0] else {
            panic!("expected a function");
        };
        let Some(Stmt::Compound { stmts, .. }) = &func.body else {
            panic!("expected a block body");
        };
        let Stmt::If { then_branch, .. } = &stmts[0] else {
            panic!("expected an if");
        };
        assert!(matches!(**then_branch, Stmt::Return { .. }));
    }
}
