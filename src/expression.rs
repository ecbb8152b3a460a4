use core::fmt;
use std::{cell::RefCell, collections::HashSet, hash::{Hash, Hasher}, rc::Rc};

use itertools::Itertools;

use crate::{
    analyzer::{EvalProc, Parameters},
    context::RuntimeContext,
    environment::Environment,
    error::LootResult,
    number::{format_float, Rational},
};


/// An interned symbol. Two symbols are equal exactly when they share the
/// same allocation, which the [`SymbolTable`] guarantees for equal text.
#[derive(Clone)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as *const u8 as usize).hash(state)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}", self.0)
    }
}

#[derive(Default)]
pub struct SymbolTable {
    symbols: RefCell<HashSet<Rc<str>>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, name: &str) -> Symbol {
        let mut symbols = self.symbols.borrow_mut();
        if let Some(existing) = symbols.get(name) {
            return Symbol(existing.clone());
        }

        let symbol: Rc<str> = Rc::from(name);
        symbols.insert(symbol.clone());
        Symbol(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.borrow().len()
    }
}

/// A mutable cons cell. Cells are shared through `Rc`, so rewriting a slot
/// is visible to every holder of the pair.
pub struct Pair {
    car: RefCell<Expr>,
    cdr: RefCell<Expr>,
}

impl Pair {
    pub fn car(&self) -> Expr {
        self.car.borrow().clone()
    }

    pub fn cdr(&self) -> Expr {
        self.cdr.borrow().clone()
    }

    pub fn set_car(&self, value: Expr) {
        *self.car.borrow_mut() = value;
    }

    pub fn set_cdr(&self, value: Expr) {
        *self.cdr.borrow_mut() = value;
    }
}

/// Unlink the cdr chain one cell at a time so that freeing a long list
/// does not recurse once per element.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut next = std::mem::replace(self.cdr.get_mut(), Expr::Null);
        while let Expr::Pair(pair) = next {
            next = match Rc::try_unwrap(pair) {
                Ok(mut cell) => std::mem::replace(cell.cdr.get_mut(), Expr::Null),
                Err(_) => break,
            };
        }
    }
}

pub type PrimitiveFn = fn(Expr, &RuntimeContext) -> LootResult<Option<Expr>>;

pub struct Lambda {
    pub(crate) parameters: Rc<Parameters>,
    pub(crate) body: Rc<EvalProc>,
    pub(crate) environment: Environment,
}

pub enum ProcedureKind {
    Primitive(PrimitiveFn),
    Compound(Lambda),
}

pub struct Procedure {
    label: RefCell<Option<Symbol>>,
    pub(crate) kind: ProcedureKind,
}

impl Procedure {
    pub fn primitive(name: Symbol, function: PrimitiveFn) -> Self {
        Self { label: RefCell::new(Some(name)), kind: ProcedureKind::Primitive(function) }
    }

    pub fn compound(lambda: Lambda) -> Self {
        Self { label: RefCell::new(None), kind: ProcedureKind::Compound(lambda) }
    }

    pub fn label(&self) -> Option<Symbol> {
        self.label.borrow().clone()
    }

    /// Name an anonymous procedure. A procedure keeps its first label.
    pub fn label_if_anonymous(&self, name: &Symbol) {
        let mut label = self.label.borrow_mut();
        if label.is_none() {
            *label = Some(name.clone());
        }
    }
}

#[derive(Clone)]
pub enum Expr {
    Null,
    Boolean(bool),
    /// Placeholder held by a binding that has been introduced but not yet assigned.
    Undefined,
    Atom(Symbol),
    Pair(Rc<Pair>),
    Procedure(Rc<Procedure>),
    Fixnum(i64),
    Rational(Rational),
    Float(f64),
    Char(u8),
    String(Rc<str>),
}

impl Expr {
    pub fn cons(car: Expr, cdr: Expr) -> Self {
        Self::Pair(Rc::new(Pair { car: RefCell::new(car), cdr: RefCell::new(cdr) }))
    }

    pub fn list(items: impl IntoIterator<Item = Expr>) -> Self {
        Self::list_with_tail(items, Expr::Null)
    }

    pub fn list_with_tail(items: impl IntoIterator<Item = Expr>, tail: Expr) -> Self {
        let items = items.into_iter().collect_vec();
        items.into_iter().rev().fold(tail, |cdr, car| Self::cons(car, cdr))
    }

    pub fn string(text: &str) -> Self {
        Self::String(Rc::from(text))
    }

    pub fn procedure(procedure: Procedure) -> Self {
        Self::Procedure(Rc::new(procedure))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Self::Pair(_))
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, Self::Atom(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Fixnum(_) | Self::Rational(_) | Self::Float(_))
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Self::Procedure(_))
    }

    /// Everything except the canonical false value counts as true.
    pub fn is_true(&self) -> bool {
        !matches!(self, Self::Boolean(false))
    }

    pub fn is_self_evaluating(&self) -> bool {
        !matches!(self, Self::Atom(_) | Self::Pair(_))
    }

    /// A null-terminated chain of pairs. Cyclic chains are not lists.
    pub fn is_list(&self) -> bool {
        let mut slow = self.clone();
        let mut fast = self.clone();
        loop {
            for _ in 0..2 {
                fast = match &fast {
                    Self::Null => return true,
                    Self::Pair(pair) => pair.cdr(),
                    _ => return false,
                };
            }
            slow = match &slow {
                Self::Pair(pair) => pair.cdr(),
                _ => return false,
            };
            if let (Self::Pair(a), Self::Pair(b)) = (&slow, &fast) {
                if Rc::ptr_eq(a, b) { return false; }
            }
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Atom(symbol) => Some(symbol),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<&Rc<Pair>> {
        match self {
            Self::Pair(pair) => Some(pair),
            _ => None,
        }
    }

    pub fn car(&self) -> Option<Expr> {
        self.as_pair().map(|pair| pair.car())
    }

    pub fn cdr(&self) -> Option<Expr> {
        self.as_pair().map(|pair| pair.cdr())
    }

    /// Iterate over the cars of a chain of pairs. The iterator stops at the
    /// first non-pair, which [`ListIter::rest`] then reports.
    pub fn iter(&self) -> ListIter {
        ListIter { current: self.clone() }
    }

    /// Elements of a proper list, or `None` for anything else.
    pub fn to_vec(&self) -> Option<Vec<Expr>> {
        if !self.is_list() { return None; }
        Some(self.iter().collect())
    }

    pub fn display(&self) -> Displayed<'_> {
        Displayed(self)
    }
}

pub struct ListIter {
    current: Expr,
}

impl ListIter {
    pub fn rest(&self) -> &Expr {
        &self.current
    }
}

impl Iterator for ListIter {
    type Item = Expr;

    fn next(&mut self) -> Option<Self::Item> {
        let (car, cdr) = match &self.current {
            Expr::Pair(pair) => (pair.car(), pair.cdr()),
            _ => return None,
        };
        self.current = cdr;
        Some(car)
    }
}

/// Identity comparison, the meaning of `eq?`.
pub fn iseq(a: &Expr, b: &Expr) -> bool {
    match (a, b) {
        (Expr::Null, Expr::Null) | (Expr::Undefined, Expr::Undefined) => true,
        (Expr::Boolean(a), Expr::Boolean(b)) => a == b,
        (Expr::Atom(a), Expr::Atom(b)) => a == b,
        (Expr::Pair(a), Expr::Pair(b)) => Rc::ptr_eq(a, b),
        (Expr::Procedure(a), Expr::Procedure(b)) => Rc::ptr_eq(a, b),
        (Expr::String(a), Expr::String(b)) => Rc::ptr_eq(a, b),
        (Expr::Fixnum(a), Expr::Fixnum(b)) => a == b,
        (Expr::Rational(a), Expr::Rational(b)) => a == b,
        (Expr::Float(a), Expr::Float(b)) => a.to_bits() == b.to_bits(),
        (Expr::Char(a), Expr::Char(b)) => a == b,
        _ => false,
    }
}

/// Structural comparison, the meaning of `equal?`.
pub fn is_equal(a: &Expr, b: &Expr) -> bool {
    let (mut a, mut b) = (a.clone(), b.clone());
    loop {
        // Recurse into cars only; cdrs are followed in place.
        let (next_a, next_b) = match (&a, &b) {
            (Expr::Pair(x), Expr::Pair(y)) => {
                if Rc::ptr_eq(x, y) { return true; }
                if !is_equal(&x.car(), &y.car()) { return false; }
                (x.cdr(), y.cdr())
            }
            (Expr::String(x), Expr::String(y)) => return x == y,
            (Expr::Float(x), Expr::Float(y)) => return x == y,
            _ => return iseq(&a, &b),
        };
        a = next_a;
        b = next_b;
    }
}

fn write_char(f: &mut fmt::Formatter<'_>, c: u8) -> fmt::Result {
    match c {
        b'\n' => f.write_str("#\\newline"),
        b' ' => f.write_str("#\\space"),
        c => write!(f, "#\\{}", c as char),
    }
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, readable: bool) -> fmt::Result {
    match expr {
        Expr::Null => f.write_str("()"),
        Expr::Boolean(true) => f.write_str("#t"),
        Expr::Boolean(false) => f.write_str("#f"),
        Expr::Undefined => f.write_str("#<undefined>"),
        Expr::Atom(symbol) => f.write_str(symbol.as_str()),
        Expr::Procedure(procedure) => match procedure.label() {
            Some(label) => write!(f, "#<procedure:{}>", label),
            None => f.write_str("#<procedure>"),
        },
        Expr::Fixnum(value) => write!(f, "{}", value),
        Expr::Rational(value) => write!(f, "{}", value),
        Expr::Float(value) => f.write_str(&format_float(*value)),
        Expr::Char(c) if readable => write_char(f, *c),
        Expr::Char(c) => write!(f, "{}", *c as char),
        Expr::String(text) if readable => write!(f, "\"{}\"", text),
        Expr::String(text) => f.write_str(text),
        Expr::Pair(_) => {
            f.write_str("(")?;
            let mut items = expr.iter();
            let mut first = true;
            for item in items.by_ref() {
                if !first { f.write_str(" ")?; }
                write_expr(f, &item, readable)?;
                first = false;
            }
            if !items.rest().is_null() {
                f.write_str(" . ")?;
                write_expr(f, items.rest(), readable)?;
            }
            f.write_str(")")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, true)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}

/// Human-oriented rendering used by `display`: strings and characters
/// appear without their read syntax.
pub struct Displayed<'a>(&'a Expr);

impl<'a> fmt::Display for Displayed<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self.0, false)
    }
}
