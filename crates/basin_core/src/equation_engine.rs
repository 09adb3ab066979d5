use crate::traits::ComplexFunction;
use anyhow::{anyhow, bail, Context, Result};
use num_complex::Complex64;
use std::cell::RefCell;
use std::f64::consts::PI;

/// OpCodes for the stack-based virtual machine.
/// The VM operates on a stack of `Complex64` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant onto the stack.
    LoadConst(Complex64),
    /// Pushes the free variable `z` onto the stack.
    LoadVar,
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top value (a), pushes a^n for a fixed integer n.
    PowI(i32),
    /// Pops top two values (b, a), pushes a^b.
    Pow,
    Sin,
    Cos,
    Exp,
    /// Pops top value (a), pushes -a.
    Neg,
}

/// A compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

/// Stack-based virtual machine for evaluating compiled expressions.
///
/// The VM is stateless; `execute` receives the stack as a scratch buffer so
/// repeated evaluation does not allocate.
pub struct VM;

impl VM {
    pub fn execute(bytecode: &Bytecode, z: Complex64, stack: &mut Vec<Complex64>) -> Complex64 {
        stack.clear();

        for op in &bytecode.ops {
            let value = match *op {
                OpCode::LoadConst(c) => c,
                OpCode::LoadVar => z,
                OpCode::Add => {
                    let (a, b) = pop_pair(stack);
                    a + b
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack);
                    a - b
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack);
                    a * b
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack);
                    a / b
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack);
                    a.powc(b)
                }
                OpCode::PowI(n) => pop(stack).powi(n),
                OpCode::Sin => pop(stack).sin(),
                OpCode::Cos => pop(stack).cos(),
                OpCode::Exp => pop(stack).exp(),
                OpCode::Neg => -pop(stack),
            };
            stack.push(value);
        }

        pop(stack)
    }
}

// Compiled bytecode is balanced, so an empty pop only happens on hand-built
// programs; NaN then flows into the solver as divergence.
fn pop(stack: &mut Vec<Complex64>) -> Complex64 {
    stack.pop().unwrap_or(Complex64::new(f64::NAN, f64::NAN))
}

fn pop_pair(stack: &mut Vec<Complex64>) -> (Complex64, Complex64) {
    let b = pop(stack);
    let a = pop(stack);
    (a, b)
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // -
    Call(String, Box<Expr>),            // sin(z), cos(z), exp(z)
}

/// Compiles an AST into `Bytecode`, resolving `z`, `i` and `pi`.
pub struct Compiler {
    variable: String,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new("z")
    }
}

impl Compiler {
    pub fn new(variable: &str) -> Self {
        Self {
            variable: variable.to_string(),
        }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<()> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(Complex64::new(*n, 0.0))),
            Expr::Variable(name) if *name == self.variable => ops.push(OpCode::LoadVar),
            Expr::Variable(name) => match name.as_str() {
                "i" => ops.push(OpCode::LoadConst(Complex64::i())),
                "pi" => ops.push(OpCode::LoadConst(Complex64::new(PI, 0.0))),
                _ => bail!("Unknown variable: {name}"),
            },
            Expr::Binary(left, '^', right) => {
                self.compile_recursive(left, ops)?;
                match integer_exponent(right) {
                    Some(n) => ops.push(OpCode::PowI(n)),
                    None => {
                        self.compile_recursive(right, ops)?;
                        ops.push(OpCode::Pow);
                    }
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                match op {
                    '+' => ops.push(OpCode::Add),
                    '-' => ops.push(OpCode::Sub),
                    '*' => ops.push(OpCode::Mul),
                    '/' => ops.push(OpCode::Div),
                    _ => bail!("Unknown binary operator: {op}"),
                }
            }
            Expr::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                match op {
                    '-' => ops.push(OpCode::Neg),
                    _ => bail!("Unknown unary operator: {op}"),
                }
            }
            Expr::Call(func, arg) => {
                self.compile_recursive(arg, ops)?;
                match func.as_str() {
                    "sin" => ops.push(OpCode::Sin),
                    "cos" => ops.push(OpCode::Cos),
                    "exp" => ops.push(OpCode::Exp),
                    _ => bail!("Unknown function: {func}"),
                }
            }
        }
        Ok(())
    }
}

/// Small literal integer exponents are evaluated with `powi`, which stays
/// exact on the real axis where `powc` would go through logarithms.
fn integer_exponent(expr: &Expr) -> Option<i32> {
    let value = match expr {
        Expr::Number(n) => *n,
        Expr::Unary('-', inner) => match inner.as_ref() {
            Expr::Number(n) => -*n,
            _ => return None,
        },
        _ => return None,
    };
    if value.fract() == 0.0 && value.abs() <= 64.0 {
        Some(value as i32)
    } else {
        None
    }
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!(
            "Unexpected trailing input at token {}",
            parser.pos + 1
        ));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| format!("Malformed number: {num_str}"))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(format!("Unexpected character: {c}")),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // expression := term (('+' | '-') term)*
    fn parse_expression(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_term()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // term := unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // unary := '-' unary | power
    fn parse_unary(&mut self) -> Result<Expr, String> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary('-', Box::new(expr)));
        }
        self.parse_power()
    }

    // power := primary ('^' unary)?   (right associative)
    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let arg = self.parse_expression()?;
                    if let Some(Token::RParen) = self.consume() {
                        Ok(Expr::Call(name, Box::new(arg)))
                    } else {
                        Err("Expected ')'".to_string())
                    }
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                if let Some(Token::RParen) = self.consume() {
                    Ok(expr)
                } else {
                    Err("Expected ')'".to_string())
                }
            }
            Some(token) => Err(format!("Unexpected token: {token:?}")),
            None => Err("Unexpected end of input".to_string()),
        }
    }
}

/// Parses and compiles one expression in the variable `z`.
pub fn compile_expression(expression: &str) -> Result<Bytecode> {
    let parsed = parse(expression).map_err(|err| anyhow!(err))?;
    Compiler::default().compile(&parsed)
}

// --- ExpressionFunction ---

thread_local! {
    // One VM stack per worker thread; never shared between workers.
    static SCRATCH: RefCell<Vec<Complex64>> = RefCell::new(Vec::with_capacity(64));
}

fn evaluate(bytecode: &Bytecode, z: Complex64) -> Complex64 {
    SCRATCH.with(|stack| match stack.try_borrow_mut() {
        Ok(mut stack) => VM::execute(bytecode, z, &mut stack),
        // Re-entrant evaluation on the same thread gets a private stack.
        Err(_) => VM::execute(bytecode, z, &mut Vec::new()),
    })
}

/// A `ComplexFunction` compiled from expression text for f(z) and f'(z).
#[derive(Debug, Clone)]
pub struct ExpressionFunction {
    pub value_source: String,
    pub derivative_source: String,
    value: Bytecode,
    derivative: Bytecode,
}

impl ExpressionFunction {
    pub fn compile(value: &str, derivative: &str) -> Result<Self> {
        let value_code = compile_expression(value)
            .with_context(|| format!("Failed to compile f(z) = {value}"))?;
        let derivative_code = compile_expression(derivative)
            .with_context(|| format!("Failed to compile f'(z) = {derivative}"))?;
        Ok(Self {
            value_source: value.to_string(),
            derivative_source: derivative.to_string(),
            value: value_code,
            derivative: derivative_code,
        })
    }
}

impl ComplexFunction for ExpressionFunction {
    fn value(&self, z: Complex64) -> Complex64 {
        evaluate(&self.value, z)
    }

    fn derivative(&self, z: Complex64) -> Complex64 {
        evaluate(&self.derivative, z)
    }
}
