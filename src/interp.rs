//! Executing a token tree directly.
//!
//! The [`Interpreter`] never recurses natively. Instead, it drains a double-ended
//! work-list which is seeded with the top-level tokens. Conditionals and calls
//! splice their bodies onto the *front* of the list, and each call also queues a
//! synthetic return item behind its body. This keeps deeply nested programs and
//! deep call chains from exhausting the host stack.
//!
//! ```
//! use bmc_ensemble::interp::interpret;
//! use bmc_ensemble::io::BufferedIO;
//! use bmc_ensemble::parse::parse_tokens;
//!
//! let tokens = parse_tokens("fn (x) { x 1 + } is inc  4 inc ! .").unwrap();
//! let io = BufferedIO::new();
//! let stack = interpret(&tokens, io.clone()).unwrap();
//!
//! assert_eq!(io.output_values(), [5]);
//! assert!(stack.is_empty());
//! ```
//!
//! Values are 16-bit signed integers with wrapping arithmetic,
//! matching the accumulator of the emulated machine.

use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};

use crate::ast::{Operator, Token};
use crate::io::{AnyIO, IODevice};

/// Interprets a token tree, returning the final evaluation stack.
pub fn interpret(tokens: &[Token], io: impl Into<AnyIO>) -> Result<Vec<i16>, InterpErr> {
    let mut interp = Interpreter::new();
    interp.io = io.into();
    interp.run(tokens)?;
    Ok(interp.into_stack())
}

/// Errors that can occur during interpretation.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum InterpErr {
    /// A name was referenced that is not bound in any scope.
    UndefinedName(String),
    /// An operation needed more values than the stack had.
    StackUnderflow,
    /// A call was made on a value which is not a function address.
    InvalidCallee(i16),
    /// A function was called with fewer values on the stack than it has parameters.
    ArityMismatch {
        /// The function's parameter count.
        expected: usize,
        /// The number of values on the stack.
        found: usize
    },
    /// A function body did not leave exactly one value above its frame.
    FrameMismatch,
    /// `/` or `%` with a right operand of 0.
    DivisionByZero,
    /// The output device rejected a value.
    OutputUnavailable,
}
impl std::fmt::Display for InterpErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterpErr::UndefinedName(n)      => write!(f, "undefined name '{n}'"),
            InterpErr::StackUnderflow        => f.write_str("stack underflow"),
            InterpErr::InvalidCallee(v)      => write!(f, "{v} is not a function address"),
            InterpErr::ArityMismatch { expected, found } => write!(f, "function expects {expected} arguments, but the stack only has {found}"),
            InterpErr::FrameMismatch         => f.write_str("function did not return exactly one value"),
            InterpErr::DivisionByZero        => f.write_str("division by zero"),
            InterpErr::OutputUnavailable     => f.write_str("could not write to output"),
        }
    }
}
impl std::error::Error for InterpErr {}
impl crate::err::Error for InterpErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            InterpErr::UndefinedName(n)   => Some(format!("bind '{n}' with 'is {n}' before using it").into()),
            InterpErr::InvalidCallee(_)   => Some("only values produced by a 'fn' literal can be called with '!'".into()),
            InterpErr::FrameMismatch      => Some("a function body should push exactly one value more than it pops".into()),
            InterpErr::OutputUnavailable  => Some("the interpreter needs an IO device that accepts output".into()),
            _ => None
        }
    }
}

/// A registered function literal.
#[derive(Clone, Copy)]
struct FunctionDef<'t> {
    params: &'t [String],
    body: &'t [Token]
}

/// An item on the work-list.
enum Work<'t> {
    /// Execute a token.
    Exec(&'t Token),
    /// Leave the function whose frame marker is `frame`, dropping its `arity` arguments.
    Return { arity: usize, frame: i16 }
}

/// The tree interpreter.
///
/// A fresh interpreter should be created for every program run.
pub struct Interpreter<'t> {
    /// The evaluation stack.
    stack: Vec<i16>,
    /// Name bindings, innermost last. There is always at least one (global) scope.
    scopes: Vec<HashMap<&'t str, i16>>,
    /// Every function literal evaluated so far, indexed by function address.
    functions: Vec<FunctionDef<'t>>,
    work: VecDeque<Work<'t>>,

    /// The number of work items processed since this `Interpreter` was created.
    pub steps_run: u64,

    /// The IO device that `.` writes to.
    pub io: AnyIO
}
impl Default for Interpreter<'_> {
    fn default() -> Self {
        Self::new()
    }
}
impl<'t> Interpreter<'t> {
    /// Creates a new interpreter with no IO.
    pub fn new() -> Self {
        Self {
            stack: vec![],
            scopes: vec![HashMap::new()],
            functions: vec![],
            work: VecDeque::new(),
            steps_run: 0,
            io: AnyIO::Empty
        }
    }

    /// The current evaluation stack (bottom first).
    pub fn stack(&self) -> &[i16] {
        &self.stack
    }

    /// Consumes the interpreter, returning its evaluation stack.
    pub fn into_stack(self) -> Vec<i16> {
        self.stack
    }

    /// Runs a token sequence to completion.
    ///
    /// Any error aborts the run and discards the remaining work.
    pub fn run(&mut self, tokens: &'t [Token]) -> Result<(), InterpErr> {
        self.work.extend(tokens.iter().map(Work::Exec));

        while let Some(item) = self.work.pop_front() {
            self.steps_run += 1;

            let result = match item {
                Work::Exec(token) => self.exec(token),
                Work::Return { arity, frame } => self.ret(arity, frame),
            };
            if let Err(e) = result {
                log::debug!("interpreter stopped after {} steps: {e}", self.steps_run);
                self.work.clear();
                return Err(e);
            }
        }

        Ok(())
    }

    fn push(&mut self, value: i16) {
        self.stack.push(value);
    }
    fn pop(&mut self) -> Result<i16, InterpErr> {
        self.stack.pop().ok_or(InterpErr::StackUnderflow)
    }
    /// Pops the right operand, then the left operand.
    fn pop2(&mut self) -> Result<(i16, i16), InterpErr> {
        let right = self.pop()?;
        let left = self.pop()?;
        Ok((left, right))
    }

    /// Places the given tokens at the front of the work-list, in order.
    fn splice(&mut self, body: &'t [Token]) {
        for token in body.iter().rev() {
            self.work.push_front(Work::Exec(token));
        }
    }

    fn lookup(&self, name: &str) -> Result<i16, InterpErr> {
        self.scopes.iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
            .ok_or_else(|| InterpErr::UndefinedName(name.to_string()))
    }

    fn exec(&mut self, token: &'t Token) -> Result<(), InterpErr> {
        log::trace!("exec {token:?} on {:?}", self.stack);

        match token {
            Token::Number(n) => self.push(*n as i16),
            Token::NoOp => {},
            Token::Operator(op) => self.apply(*op)?,
            Token::If(body) => {
                if self.pop()? != 0 {
                    self.splice(body);
                }
            },
            Token::IfElse(then, otherwise) => {
                match self.pop()? != 0 {
                    true  => self.splice(then),
                    false => self.splice(otherwise),
                }
            },
            Token::Function { params, body } => {
                let addr = self.functions.len() as i16;
                self.functions.push(FunctionDef { params, body });
                self.push(addr);
            },
            Token::Constant(name) => {
                let value = self.pop()?;
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name, value);
                }
            },
            Token::Reference(name) => {
                let value = self.lookup(name)?;
                self.push(value);
            },
        }

        Ok(())
    }

    fn apply(&mut self, op: Operator) -> Result<(), InterpErr> {
        match op {
            Operator::Add => {
                let (l, r) = self.pop2()?;
                self.push(l.wrapping_add(r));
            },
            Operator::Sub => {
                let (l, r) = self.pop2()?;
                self.push(l.wrapping_sub(r));
            },
            Operator::Mul => {
                let (l, r) = self.pop2()?;
                self.push(l.wrapping_mul(r));
            },
            Operator::Div => {
                let (l, r) = self.pop2()?;
                let (q, _) = floor_div(l, r)?;
                self.push(q);
            },
            Operator::Mod => {
                let (l, r) = self.pop2()?;
                let (_, m) = floor_div(l, r)?;
                self.push(m);
            },
            Operator::Eq => {
                let (l, r) = self.pop2()?;
                self.push(i16::from(l == r));
            },
            Operator::Not => {
                let v = self.pop()?;
                self.push(i16::from(v == 0));
            },
            Operator::Print => {
                let v = self.pop()?;
                if !self.io.write_int(v) {
                    return Err(InterpErr::OutputUnavailable);
                }
            },
            Operator::Void => {
                self.pop()?;
            },
            Operator::Peek => {
                let n = self.pop()?;
                let value = usize::try_from(n).ok()
                    .and_then(|n| self.stack.len().checked_sub(n + 1))
                    .map(|i| self.stack[i])
                    .ok_or(InterpErr::StackUnderflow)?;
                self.push(value);
            },
            Operator::Call => self.call()?,
        }

        Ok(())
    }

    fn call(&mut self) -> Result<(), InterpErr> {
        let callee = self.pop()?;
        let FunctionDef { params, body } = usize::try_from(callee).ok()
            .and_then(|i| self.functions.get(i))
            .copied()
            .ok_or(InterpErr::InvalidCallee(callee))?;

        let arity = params.len();
        let Some(base) = self.stack.len().checked_sub(arity) else {
            return Err(InterpErr::ArityMismatch { expected: arity, found: self.stack.len() });
        };

        // Arguments stay on the stack; the new scope holds copies.
        let scope = params.iter()
            .map(String::as_str)
            .zip(self.stack[base..].iter().copied())
            .collect();
        self.scopes.push(scope);

        // Bookkeeping cells, laid out as the compiled calling convention does:
        // the return position, then the frame marker.
        let ret_ip = self.work.len() as i16;
        self.push(ret_ip);
        let frame = (self.stack.len() + 1) as i16;
        self.push(frame);

        self.work.push_front(Work::Return { arity, frame });
        self.splice(body);
        Ok(())
    }

    fn ret(&mut self, arity: usize, frame: i16) -> Result<(), InterpErr> {
        let value = self.pop()?;
        if self.pop()? != frame {
            return Err(InterpErr::FrameMismatch);
        }
        let _ret_ip = self.pop()?;
        for _ in 0..arity {
            self.pop()?;
        }
        self.push(value);
        self.scopes.pop();
        Ok(())
    }
}

/// Floor division, returning the quotient and remainder.
///
/// The remainder has the same sign as the divisor.
fn floor_div(l: i16, r: i16) -> Result<(i16, i16), InterpErr> {
    if r == 0 {
        return Err(InterpErr::DivisionByZero);
    }

    let (q, m) = (l.wrapping_div(r), l.wrapping_rem(r));
    match m != 0 && (m < 0) != (r < 0) {
        true  => Ok((q.wrapping_sub(1), m.wrapping_add(r))),
        false => Ok((q, m)),
    }
}

#[cfg(test)]
mod tests {
    use crate::io::BufferedIO;
    use crate::parse::parse_tokens;

    use super::{floor_div, interpret, InterpErr, Interpreter};

    /// Runs the source, returning the final stack and the output.
    fn run_src(src: &str) -> Result<(Vec<i16>, Vec<i16>), InterpErr> {
        let tokens = parse_tokens(src).unwrap();
        let io = BufferedIO::new();
        let stack = interpret(&tokens, io.clone())?;
        Ok((stack, io.output_values()))
    }
    fn output(src: &str) -> Vec<i16> {
        run_src(src).unwrap().1
    }
    fn stack(src: &str) -> Vec<i16> {
        run_src(src).unwrap().0
    }
    fn assert_interp_fail(src: &str, err: InterpErr) {
        assert_eq!(run_src(src).unwrap_err(), err, "wrong error for {src:?}");
    }

    #[test]
    fn test_arith() {
        assert_eq!(output("5 3 - ."), [2]);
        assert_eq!(output("5 3 + . 5 3 * ."), [8, 15]);
        assert_eq!(output("7 2 / . 7 2 % ."), [3, 1]);

        // wrapping
        assert_eq!(output("0 1 - ."), [-1]);
        assert_eq!(output("200 200 * ."), [-25536]);
    }

    #[test]
    fn test_floor_division() {
        assert_eq!(floor_div(-7, 2), Ok((-4, 1)));
        assert_eq!(floor_div(7, -2), Ok((-4, -1)));
        assert_eq!(floor_div(-7, -2), Ok((3, -1)));
        assert_eq!(floor_div(-6, 2), Ok((-3, 0)));

        assert_eq!(output("0 7 - 2 / . 0 7 - 2 % ."), [-4, 1]);
        assert_eq!(output("7 0 2 - / . 7 0 2 - % ."), [-4, -1]);
    }

    #[test]
    fn test_compare() {
        assert_eq!(output("4 4 = . 4 5 = ."), [1, 0]);
        assert_eq!(output("0 ~ . 3 ~ ."), [1, 0]);
    }

    #[test]
    fn test_stack_ops() {
        assert_eq!(stack("1 2 3 2 @"), [1, 2, 3, 1]);
        assert_eq!(stack("1 0 @"), [1, 1]);
        assert_eq!(stack("1 2 void"), [1]);
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(run_src("1 ? { 9 . }").unwrap(), (vec![], vec![9]));
        // zero condition: nothing runs and the depth is unchanged
        assert_eq!(run_src("5 0 ? { 9 . }").unwrap(), (vec![5], vec![]));

        assert_eq!(output("1 ? { 1 . } : { 2 . }"), [1]);
        assert_eq!(output("0 ? { 1 . } : { 2 . }"), [2]);
        assert_eq!(output("1 ? { 0 ? { 1 . } : { 2 . } 3 . }"), [2, 3]);
    }

    #[test]
    fn test_functions() {
        assert_eq!(stack("8 4 fn (x) { x 1 + } !"), [8, 5]);
        assert_eq!(output("fn (a b) { a b - } is sub 10 3 sub ! ."), [7]);

        // zero-parameter function
        assert_eq!(stack("fn () { 42 } !"), [42]);

        // function addresses are stable and distinct
        assert_eq!(stack("fn () { 1 } fn () { 2 }"), [0, 1]);
    }

    #[test]
    fn test_scopes() {
        // a parameter shadows a global, which is visible again after returning
        assert_eq!(stack("3 is x fn (x) { x } is f 9 f ! x"), [9, 3]);
        // globals are visible inside functions
        assert_eq!(stack("2 is two 3 fn (x) { x two * } !"), [6]);
        // and the call leaves nothing behind but its result
        assert_eq!(stack("1 2 is two 3 fn (x) { x two * } !"), [1, 6]);
    }

    #[test]
    fn test_recursion() {
        let fact = "fn (n) { n ? { n n 1 - fact ! * } : { 1 } } is fact ";
        assert_eq!(output(&format!("{fact} 5 fact ! .")), [120]);
        assert_eq!(output(&format!("{fact} 0 fact ! .")), [1]);

        // thousands of nested calls don't touch the host stack
        let countdown = "fn (n) { n ? { n 1 - down ! } : { 0 } } is down 999 3 * down ! .";
        assert_eq!(output(countdown), [0]);
    }

    #[test]
    fn test_errors() {
        assert_interp_fail("x", InterpErr::UndefinedName("x".to_string()));
        assert_interp_fail("1 +", InterpErr::StackUnderflow);
        assert_interp_fail("1 5 @", InterpErr::StackUnderflow);
        assert_interp_fail("5 !", InterpErr::InvalidCallee(5));
        assert_interp_fail("fn (a b) { a } is f 1 f !", InterpErr::ArityMismatch { expected: 2, found: 1 });
        assert_interp_fail("fn () { void 1 } !", InterpErr::FrameMismatch);
        assert_interp_fail("1 0 /", InterpErr::DivisionByZero);
        assert_interp_fail("1 0 %", InterpErr::DivisionByZero);

        // a parameter is not visible after its function returns
        assert_interp_fail("fn (y) { y } is f 1 f ! y", InterpErr::UndefinedName("y".to_string()));
    }

    #[test]
    fn test_no_output_device() {
        let tokens = parse_tokens("1 .").unwrap();
        let mut interp = Interpreter::new();
        assert_eq!(interp.run(&tokens), Err(InterpErr::OutputUnavailable));
        assert!(interp.stack().is_empty());
    }
}
