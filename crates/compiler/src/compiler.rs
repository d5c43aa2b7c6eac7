//! Single-pass Pratt parser, scope resolver and bytecode emitter.
//!
//! There is no separate AST: parsing a construct and emitting the bytecode
//! for it happen in the same recursive call. Lexical scope, upvalue capture
//! and jump patching are all threaded through one left-to-right pass over
//! the token stream.

use std::rc::Rc;

use loxi_core::{intern, Chunk, Obj, ObjFunction, OpCode, Table, Value};
use tracing::debug;

use crate::error::CompileError;
use crate::scanner::{Scanner, Token, TokenKind};

const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;
const MAX_ARGS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
}

struct Local<'src> {
    name: &'src str,
    /// `-1` means declared but not yet initialized.
    depth: i32,
    is_captured: bool,
}

#[derive(Clone, Copy)]
struct UpvalueInfo {
    index: u8,
    is_local: bool,
}

/// Per-function compilation record. Nested functions push a new record onto
/// `enclosing`, forming an owned stack rather than a process-wide mutable
/// pointer chain.
struct FunctionCompiler<'src> {
    enclosing: Option<Box<FunctionCompiler<'src>>>,
    function: ObjFunction,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    scope_depth: i32,
    upvalues: Vec<UpvalueInfo>,
}

impl<'src> FunctionCompiler<'src> {
    fn new(kind: FunctionKind, name: Option<Rc<Obj>>) -> Self {
        FunctionCompiler {
            enclosing: None,
            function: ObjFunction::new(name),
            kind,
            // Slot 0 is reserved for the callee itself (or the top-level
            // script), never addressable by source identifiers.
            locals: vec![Local { name: "", depth: 0, is_captured: false }],
            scope_depth: 0,
            upvalues: Vec::new(),
        }
    }

    fn resolve_local(&self, name: &str) -> Result<Option<u8>, &'static str> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    return Err("Can't read local variable in its own initializer.");
                }
                return Ok(Some(u8::try_from(i).expect("locals bounded by MAX_LOCALS")));
            }
        }
        Ok(None)
    }

    fn add_upvalue(&mut self, index: u8, is_local: bool) -> Result<u8, &'static str> {
        for (i, up) in self.upvalues.iter().enumerate() {
            if up.index == index && up.is_local == is_local {
                return Ok(u8::try_from(i).expect("upvalues bounded by MAX_UPVALUES"));
            }
        }
        if self.upvalues.len() >= MAX_UPVALUES {
            return Err("Too many closure variables in function.");
        }
        self.upvalues.push(UpvalueInfo { index, is_local });
        self.function.upvalue_count =
            u8::try_from(self.upvalues.len()).expect("checked against MAX_UPVALUES");
        Ok(u8::try_from(self.upvalues.len() - 1).expect("checked against MAX_UPVALUES"))
    }

    fn resolve_upvalue(&mut self, name: &str) -> Result<Option<u8>, &'static str> {
        let Some(enclosing) = self.enclosing.as_mut() else {
            return Ok(None);
        };
        if let Some(local_idx) = enclosing.resolve_local(name)? {
            enclosing.locals[local_idx as usize].is_captured = true;
            return Ok(Some(self.add_upvalue(local_idx, true)?));
        }
        if let Some(up_idx) = enclosing.resolve_upvalue(name)? {
            return Ok(Some(self.add_upvalue(up_idx, false)?));
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Ternary,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Ternary,
            Precedence::Ternary => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn<'src> = fn(&mut Compiler<'src, '_>, bool);

struct ParseRule<'src> {
    prefix: Option<ParseFn<'src>>,
    infix: Option<ParseFn<'src>>,
    precedence: Precedence,
}

fn get_rule<'src>(kind: TokenKind) -> ParseRule<'src> {
    let rule = |prefix, infix, precedence| ParseRule { prefix, infix, precedence };
    match kind {
        TokenKind::LeftParen => {
            rule(Some(Compiler::grouping), Some(Compiler::call), Precedence::Call)
        }
        TokenKind::Minus => {
            rule(Some(Compiler::unary), Some(Compiler::binary), Precedence::Term)
        }
        TokenKind::Plus => rule(None, Some(Compiler::binary), Precedence::Term),
        TokenKind::Slash | TokenKind::Star => {
            rule(None, Some(Compiler::binary), Precedence::Factor)
        }
        TokenKind::Bang => rule(Some(Compiler::unary), None, Precedence::None),
        TokenKind::BangEqual | TokenKind::EqualEqual => {
            rule(None, Some(Compiler::binary), Precedence::Equality)
        }
        TokenKind::Greater | TokenKind::GreaterEqual | TokenKind::Less | TokenKind::LessEqual => {
            rule(None, Some(Compiler::binary), Precedence::Comparison)
        }
        TokenKind::Identifier => rule(Some(Compiler::variable), None, Precedence::None),
        TokenKind::String => rule(Some(Compiler::string_literal), None, Precedence::None),
        TokenKind::Number => rule(Some(Compiler::number), None, Precedence::None),
        TokenKind::And => rule(None, Some(Compiler::and_), Precedence::And),
        TokenKind::Or => rule(None, Some(Compiler::or_), Precedence::Or),
        TokenKind::Question => rule(None, Some(Compiler::ternary), Precedence::Ternary),
        TokenKind::False | TokenKind::Nil | TokenKind::True => {
            rule(Some(Compiler::literal), None, Precedence::None)
        }
        _ => rule(None, None, Precedence::None),
    }
}

struct Compiler<'src, 'strings> {
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompileError>,
    strings: &'strings mut Table,
    current_fn: Box<FunctionCompiler<'src>>,
}

impl<'src, 'strings> Compiler<'src, 'strings> {
    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn error_at_current(&mut self, message: &str) {
        let line = self.current.line;
        self.error_at(line, message);
    }

    fn error(&mut self, message: &str) {
        let line = self.previous.line;
        self.error_at(line, message);
    }

    fn error_at(&mut self, line: u32, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        debug!("compile error at line {line}: {message}");
        self.errors.push(CompileError { message: message.to_string(), line });
    }

    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.current_fn.function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk().write_byte(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op.into());
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.current_chunk().code.len() - loop_start + 2;
        if offset > usize::from(u16::MAX) {
            self.error("Loop body too large.");
        }
        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    fn emit_jump(&mut self, instruction: OpCode) -> usize {
        self.emit_op(instruction);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.current_chunk().code.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.current_chunk().code.len() - offset - 2;
        if jump > usize::from(u16::MAX) {
            self.error("Too much code to jump over.");
        }
        let bytes = (jump as u16).to_be_bytes();
        self.current_chunk().code[offset] = bytes[0];
        self.current_chunk().code[offset + 1] = bytes[1];
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);
    }

    fn emit_constant(&mut self, value: Value) {
        let line = self.previous.line;
        if self
            .current_chunk()
            .write_constant(OpCode::Constant, OpCode::ConstantLong, value, line)
            .is_none()
        {
            self.error("Too many constants in one chunk.");
        }
    }

    fn identifier_constant(&mut self, name: &str) -> u32 {
        let interned = intern(self.strings, name);
        match self.current_chunk().add_constant(Value::Obj(interned)) {
            Some(idx) => idx,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn begin_scope(&mut self) {
        self.current_fn.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.current_fn.scope_depth -= 1;
        let depth = self.current_fn.scope_depth;
        while let Some(local) = self.current_fn.locals.last() {
            if local.depth <= depth {
                break;
            }
            if local.is_captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.current_fn.locals.pop();
        }
    }

    fn add_local(&mut self, name: &'src str) {
        if self.current_fn.locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.current_fn.locals.push(Local { name, depth: -1, is_captured: false });
    }

    fn declare_variable(&mut self) {
        if self.current_fn.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let scope_depth = self.current_fn.scope_depth;
        let mut duplicate = false;
        for local in self.current_fn.locals.iter().rev() {
            if local.depth != -1 && local.depth < scope_depth {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
            return;
        }
        self.add_local(name);
    }

    fn mark_initialized(&mut self) {
        if self.current_fn.scope_depth == 0 {
            return;
        }
        let depth = self.current_fn.scope_depth;
        if let Some(local) = self.current_fn.locals.last_mut() {
            local.depth = depth;
        }
    }

    fn parse_variable(&mut self, error_message: &str) -> u32 {
        self.consume(TokenKind::Identifier, error_message);
        self.declare_variable();
        if self.current_fn.scope_depth > 0 {
            return 0;
        }
        let name = self.previous.lexeme;
        self.identifier_constant(name)
    }

    fn define_variable(&mut self, global: u32) {
        if self.current_fn.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        let line = self.previous.line;
        self.current_chunk().write_indexed(
            OpCode::DefineGlobal,
            OpCode::DefineGlobalLong,
            global,
            line,
        );
    }

    fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        enum Target {
            Local(u8),
            Upvalue(u8),
            Global(u32),
        }

        let target = match self.current_fn.resolve_local(name) {
            Ok(Some(slot)) => Target::Local(slot),
            Ok(None) => match self.current_fn.resolve_upvalue(name) {
                Ok(Some(slot)) => Target::Upvalue(slot),
                Ok(None) => Target::Global(self.identifier_constant(name)),
                Err(message) => {
                    self.error(message);
                    return;
                }
            },
            Err(message) => {
                self.error(message);
                return;
            }
        };

        let line = self.previous.line;
        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            match target {
                Target::Local(slot) => {
                    self.emit_byte(OpCode::SetLocal.into());
                    self.emit_byte(slot);
                }
                Target::Upvalue(slot) => {
                    self.emit_byte(OpCode::SetUpvalue.into());
                    self.emit_byte(slot);
                }
                Target::Global(idx) => {
                    self.current_chunk().write_indexed(
                        OpCode::SetGlobal,
                        OpCode::SetGlobalLong,
                        idx,
                        line,
                    );
                }
            }
        } else {
            match target {
                Target::Local(slot) => {
                    self.emit_byte(OpCode::GetLocal.into());
                    self.emit_byte(slot);
                }
                Target::Upvalue(slot) => {
                    self.emit_byte(OpCode::GetUpvalue.into());
                    self.emit_byte(slot);
                }
                Target::Global(idx) => {
                    self.current_chunk().write_indexed(
                        OpCode::GetGlobal,
                        OpCode::GetGlobalLong,
                        idx,
                        line,
                    );
                }
            }
        }
    }

    // -- statements --

    fn declaration(&mut self) {
        if self.matches(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind) {
        debug!("compiling function '{}'", self.previous.lexeme);
        let name = intern(self.strings, self.previous.lexeme);
        let child = Box::new(FunctionCompiler::new(kind, Some(name)));
        let parent = std::mem::replace(&mut self.current_fn, child);
        self.current_fn.enclosing = Some(parent);

        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                if usize::from(self.current_fn.function.arity) == MAX_ARGS {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.current_fn.function.arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        self.emit_return();
        let Some(parent) = self.current_fn.enclosing.take() else {
            unreachable!("function() is only called with an enclosing compiler present")
        };
        let finished = std::mem::replace(&mut self.current_fn, parent);
        let upvalues = finished.upvalues;
        let function_idx_line = self.previous.line;
        let value = Value::Obj(Rc::new(Obj::Function(finished.function)));
        match self.current_chunk().add_constant(value) {
            Some(idx) => {
                self.current_chunk().write_indexed(
                    OpCode::Closure,
                    OpCode::ClosureLong,
                    idx,
                    function_idx_line,
                );
            }
            None => self.error("Too many constants in one chunk."),
        }
        for upvalue in upvalues {
            self.emit_byte(u8::from(upvalue.is_local));
            self.emit_byte(upvalue.index);
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::For) {
            self.for_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.matches(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.matches(TokenKind::Semicolon) {
            // no initializer
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.current_chunk().code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.matches(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.matches(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.current_chunk().code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.current_fn.kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.matches(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // -- expressions --

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix_rule) = get_rule(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix_rule(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix_rule = get_rule(self.previous.kind)
                .infix
                .expect("precedence table only advances into tokens with an infix rule");
            infix_rule(self, can_assign);
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary rule only registered for ! and -"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let rule = get_rule(operator);
        self.parse_precedence(rule.precedence.next());
        match operator {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => unreachable!("binary rule only registered for arithmetic/comparison operators"),
        }
    }

    /// `a ? b : c` desugars exactly like `if`/`else`: the
    /// `?` arm is parsed at `Assignment` so any expression may appear
    /// there, the `:` arm at `Ternary` itself so `a ? b : c ? d : e`
    /// associates to the right.
    fn ternary(&mut self, _can_assign: bool) {
        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Assignment);
        self.consume(TokenKind::Colon, "Expect ':' after then branch of ternary expression.");

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Ternary);
        self.patch_jump(else_jump);
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_byte(OpCode::Call.into());
        self.emit_byte(arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u8 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if usize::from(count) == MAX_ARGS {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    count += 1;
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count
    }

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or(0.0);
        self.emit_constant(Value::Number(value));
    }

    fn string_literal(&mut self, _can_assign: bool) {
        let lexeme = self.previous.lexeme;
        let bytes = &lexeme[1..lexeme.len() - 1];
        let interned = intern(self.strings, bytes);
        self.emit_constant(Value::Obj(interned));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!("literal rule only registered for false/nil/true"),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        self.named_variable(name, can_assign);
    }
}

/// Compile `source` into a top-level script function. Identifiers and
/// string literals are interned into `strings` as they are encountered, so
/// the returned function's constant pool shares storage with whatever table
/// the caller goes on to use for globals and runtime string operations.
pub fn compile(source: &str, strings: &mut Table) -> Result<ObjFunction, Vec<CompileError>> {
    debug!("compiling script ({} bytes)", source.len());
    let eof = Token { kind: TokenKind::Eof, lexeme: "", line: 0 };
    let mut compiler = Compiler {
        scanner: Scanner::new(source),
        previous: eof,
        current: eof,
        had_error: false,
        panic_mode: false,
        errors: Vec::new(),
        strings,
        current_fn: Box::new(FunctionCompiler::new(FunctionKind::Script, None)),
    };

    compiler.advance();
    while !compiler.matches(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.emit_return();

    if compiler.had_error {
        Err(compiler.errors)
    } else {
        Ok(compiler.current_fn.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> ObjFunction {
        let mut strings = Table::new();
        compile(source, &mut strings).unwrap_or_else(|errors| {
            panic!("unexpected compile errors: {errors:?}");
        })
    }

    #[test]
    fn arithmetic_expression_compiles() {
        let function = compile_ok("print 1 + 2 * 3;");
        assert!(!function.chunk.code.is_empty());
    }

    #[test]
    fn undefined_variable_reference_compiles_as_global_lookup() {
        // resolution of unknown names defers to a runtime check, not a
        // compile error.
        let function = compile_ok("print missing;");
        assert!(function.chunk.code.contains(&(OpCode::GetGlobal as u8)));
    }

    #[test]
    fn redeclaring_a_local_in_the_same_scope_is_an_error() {
        let mut strings = Table::new();
        let result = compile("{ var a = 1; var a = 2; }", &mut strings);
        assert!(result.is_err());
    }

    #[test]
    fn own_initializer_reference_is_an_error() {
        let mut strings = Table::new();
        let result = compile("{ var a = a; }", &mut strings);
        assert!(result.is_err());
    }

    #[test]
    fn return_at_top_level_is_an_error() {
        let mut strings = Table::new();
        let result = compile("return 1;", &mut strings);
        assert!(result.is_err());
    }

    #[test]
    fn nested_closure_compiles_with_upvalues() {
        let function =
            compile_ok("fun make() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }");
        assert!(function.chunk.code.contains(&(OpCode::Closure as u8)));
    }

    #[test]
    fn for_loop_desugars_without_error() {
        compile_ok("for (var i = 0; i < 5; i = i + 1) print i;");
    }

    #[test]
    fn ternary_expression_compiles() {
        compile_ok("print true ? 1 : 2;");
    }
}
