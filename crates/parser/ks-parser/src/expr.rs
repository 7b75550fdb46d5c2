//! Expression parsing
//!
//! A primary parser (identifier paths, literals, parenthesized expressions,
//! prefix unaries applied recursively) feeds postfix absorption (calls,
//! subscripts, member access, `++`/`--`) left to right; binary combination
//! then runs on explicit operand/operator stacks: whenever the incoming
//! operator binds less tightly than the stack top, the whole top precedence
//! level is popped and combined as one left-associative batch.

use crate::{ParseOutcome, Parser};
use ks_lexer::TokenKind;
use ks_syntax::{BinOp, Stmt, UnOp};

impl Parser<'_, '_> {
    /// Parse a full expression
    pub(crate) fn parse_expression(&mut self) -> ParseOutcome<Stmt> {
        let mut operands = vec![self.parse_unary()?];
        let mut ops: Vec<BinOp> = Vec::new();

        while let Some(op) = self.peek_binop() {
            while let Some(&top) = ops.last() {
                if top.precedence() >= op.precedence() {
                    Self::collapse(&mut operands, &mut ops);
                } else {
                    break;
                }
            }
            self.stream.advance();
            ops.push(op);
            operands.push(self.parse_unary()?);
        }

        while !ops.is_empty() {
            Self::collapse(&mut operands, &mut ops);
        }

        Ok(operands.pop().expect("operand stack holds the result"))
    }

    /// Pop every operator at the stack's top precedence level and combine
    /// the batch left-associatively
    fn collapse(operands: &mut Vec<Stmt>, ops: &mut Vec<BinOp>) {
        let level = ops.last().expect("collapse needs an operator").precedence();
        let mut count = 0;
        while count < ops.len() && ops[ops.len() - 1 - count].precedence() == level {
            count += 1;
        }

        let batch = ops.split_off(ops.len() - count);
        let mut batch_operands = operands.split_off(operands.len() - count - 1);

        let mut acc = batch_operands.remove(0);
        for (op, rhs) in batch.into_iter().zip(batch_operands) {
            let span = acc.span().to(rhs.span());
            acc = Stmt::Binary {
                op,
                lhs: Box::new(acc),
                rhs: Box::new(rhs),
                span,
            };
        }
        operands.push(acc);
    }

    fn peek_binop(&self) -> Option<BinOp> {
        Some(match self.stream.peek_kind() {
            TokenKind::Assign => BinOp::Assign,
            TokenKind::PlusEq => BinOp::AddAssign,
            TokenKind::MinusEq => BinOp::SubAssign,
            TokenKind::StarEq => BinOp::MulAssign,
            TokenKind::SlashEq => BinOp::DivAssign,
            TokenKind::PercentEq => BinOp::ModAssign,
            TokenKind::AmpEq => BinOp::AndAssign,
            TokenKind::PipeEq => BinOp::OrAssign,
            TokenKind::CaretEq => BinOp::XorAssign,
            TokenKind::ShlEq => BinOp::ShlAssign,
            TokenKind::ShrEq => BinOp::ShrAssign,
            TokenKind::PipePipe => BinOp::LogicalOr,
            TokenKind::AmpAmp => BinOp::LogicalAnd,
            TokenKind::Pipe => BinOp::BitOr,
            TokenKind::Caret => BinOp::BitXor,
            TokenKind::Amp => BinOp::BitAnd,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            _ => return None,
        })
    }

    /// Prefix unaries applied recursively, then postfix absorption
    fn parse_unary(&mut self) -> ParseOutcome<Stmt> {
        let prefix = match self.stream.peek_kind() {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::Star => Some(UnOp::Deref),
            TokenKind::Amp => Some(UnOp::AddrOf),
            TokenKind::PlusPlus => Some(UnOp::PreInc),
            TokenKind::MinusMinus => Some(UnOp::PreDec),
            _ => None,
        };
        if let Some(op) = prefix {
            let token = self.stream.advance();
            let operand = self.parse_unary()?;
            let span = token.span.to(operand.span());
            return Ok(Stmt::Unary {
                op,
                operand: Box::new(operand),
                span,
            });
        }

        let mut expr = self.parse_primary()?;
        loop {
            match self.stream.peek_kind() {
                TokenKind::LParen => {
                    self.stream.advance();
                    let args = self.parse_arg_list(TokenKind::RParen)?;
                    let span = expr.span().to(self.stream.prev_span());
                    expr = Stmt::Call {
                        callee: Box::new(expr),
                        args,
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.stream.advance();
                    let args = self.parse_arg_list(TokenKind::RBracket)?;
                    let span = expr.span().to(self.stream.prev_span());
                    expr = Stmt::Index {
                        base: Box::new(expr),
                        args,
                        span,
                    };
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = self.stream.advance().kind == TokenKind::Arrow;
                    let field_token = self.expect(TokenKind::Ident)?;
                    let field = self.intern_token(field_token);
                    let span = expr.span().to(field_token.span);
                    expr = Stmt::Member {
                        base: Box::new(expr),
                        field,
                        arrow,
                        span,
                    };
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let token = self.stream.advance();
                    let op = if token.kind == TokenKind::PlusPlus {
                        UnOp::PostInc
                    } else {
                        UnOp::PostDec
                    };
                    let span = expr.span().to(token.span);
                    expr = Stmt::Unary {
                        op,
                        operand: Box::new(expr),
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Comma-separated expressions up to (and consuming) `close`
    fn parse_arg_list(&mut self, close: TokenKind) -> ParseOutcome<Vec<Stmt>> {
        let mut args = Vec::new();
        if !self.stream.at(close) {
            loop {
                args.push(self.parse_expression()?);
                if !self.stream.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(close)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseOutcome<Stmt> {
        match self.stream.peek_kind() {
            TokenKind::LParen => {
                self.stream.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Integer => {
                let token = self.stream.advance();
                let value = self.parse_int_value(token)?;
                Ok(Stmt::Integer {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Float => {
                let token = self.stream.advance();
                let value = self.parse_float_value(token)?;
                Ok(Stmt::Float {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Ident => {
                // A templated name followed by `(` is a constructor callee;
                // anything else rewinds to a plain identifier path so that
                // `a < b` stays a comparison.
                let checkpoint = self.checkpoint();
                if let Ok(name) = self.parse_type_name() {
                    if !name.args.is_empty() && self.stream.at(TokenKind::LParen) {
                        return Ok(Stmt::TypeRef {
                            span: name.span,
                            name,
                        });
                    }
                }
                self.restore(checkpoint);

                let first = self.expect(TokenKind::Ident)?;
                let mut path = vec![self.intern_token(first)];
                let start = first.span;
                while self.stream.at(TokenKind::ColonColon) {
                    self.stream.advance();
                    let segment = self.expect(TokenKind::Ident)?;
                    path.push(self.intern_token(segment));
                }
                Ok(Stmt::Variable {
                    path,
                    span: start.to(self.stream.prev_span()),
                })
            }
            _ => Err(self.unexpected(self.stream.peek())),
        }
    }
}
