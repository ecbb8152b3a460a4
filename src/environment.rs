use core::fmt;
use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::expression::{Expr, Symbol};


/// A mutable value cell. Captured bindings observe later assignments.
pub type Binding = Rc<RefCell<Expr>>;

/// One scope level.
#[derive(Default)]
pub struct Frame {
    bindings: RefCell<HashMap<Symbol, Binding>>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, symbol: &Symbol) -> Option<Binding> {
        self.bindings.borrow().get(symbol).cloned()
    }

    fn insert(&self, symbol: Symbol, value: Expr) -> Binding {
        let mut bindings = self.bindings.borrow_mut();
        match bindings.get(&symbol) {
            Some(binding) => {
                *binding.borrow_mut() = value;
                binding.clone()
            }
            None => {
                let binding = Rc::new(RefCell::new(value));
                bindings.insert(symbol, binding.clone());
                binding
            }
        }
    }

    /// Remove `symbol` from this frame. Returns whether it was present.
    pub fn undefine(&self, symbol: &Symbol) -> bool {
        self.bindings.borrow_mut().remove(symbol).is_some()
    }

    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Scope {
    frame: Frame,
    parent: Option<Environment>,
}

/// A chain of frames, innermost first. Cloning an environment shares it;
/// closures keep their defining chain alive for as long as they live.
#[derive(Clone)]
pub struct Environment(Rc<Scope>);

impl Environment {
    pub fn new() -> Self {
        Self(Rc::new(Scope { frame: Frame::new(), parent: None }))
    }

    /// A new environment whose single frame holds `bindings`, enclosed by `parent`.
    pub fn extend(bindings: impl IntoIterator<Item = (Symbol, Expr)>, parent: &Environment) -> Self {
        let frame = Frame::new();
        for (symbol, value) in bindings {
            frame.insert(symbol, value);
        }
        Self(Rc::new(Scope { frame, parent: Some(parent.clone()) }))
    }

    pub fn frame(&self) -> &Frame {
        &self.0.frame
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    pub fn lookup(&self, symbol: &Symbol) -> Option<Binding> {
        let mut environment = Some(self);
        while let Some(current) = environment {
            if let Some(binding) = current.frame().find(symbol) {
                return Some(binding);
            }
            environment = current.parent();
        }
        None
    }

    /// Bind `symbol` in the innermost frame, overwriting any binding there.
    pub fn install(&self, symbol: Symbol, value: Expr) -> Binding {
        self.frame().insert(symbol, value)
    }

    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut environment = self.parent();
        while let Some(current) = environment {
            depth += 1;
            environment = current.parent();
        }
        depth
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment(depth: {}, bindings: {})", self.depth(), self.frame().len())
    }
}


#[cfg(test)]
mod tests {
    use crate::expression::SymbolTable;

    use super::*;

    fn value(environment: &Environment, symbol: &Symbol) -> Option<String> {
        environment.lookup(symbol).map(|binding| binding.borrow().to_string())
    }

    #[test]
    fn install_shadows_without_touching_parents() {
        let symbols = SymbolTable::new();
        let x = symbols.intern("x");

        let global = Environment::new();
        global.install(x.clone(), Expr::Fixnum(1));
        {
            let inner = Environment::extend([(x.clone(), Expr::Fixnum(2))], &global);
            assert_eq!(value(&inner, &x).as_deref(), Some("2"));
            inner.install(x.clone(), Expr::Fixnum(3));
            assert_eq!(value(&inner, &x).as_deref(), Some("3"));
        }
        assert_eq!(value(&global, &x).as_deref(), Some("1"));
    }

    #[test]
    fn assignment_through_binding_is_shared() {
        let symbols = SymbolTable::new();
        let x = symbols.intern("x");

        let global = Environment::new();
        global.install(x.clone(), Expr::Fixnum(1));
        let inner = Environment::extend([], &global);

        let binding = inner.lookup(&x).expect("x is bound in the parent");
        *binding.borrow_mut() = Expr::Fixnum(10);
        assert_eq!(value(&global, &x).as_deref(), Some("10"));
    }

    #[test]
    fn reinstall_keeps_captured_binding() {
        let symbols = SymbolTable::new();
        let x = symbols.intern("x");

        let global = Environment::new();
        let captured = global.install(x.clone(), Expr::Fixnum(1));
        global.install(x.clone(), Expr::Fixnum(2));
        assert_eq!(captured.borrow().to_string(), "2");
    }

    #[test]
    fn lookup_misses_and_undefine() {
        let symbols = SymbolTable::new();
        let (x, y) = (symbols.intern("x"), symbols.intern("y"));

        let global = Environment::new();
        global.install(x.clone(), Expr::Null);
        assert!(global.lookup(&y).is_none());

        assert!(global.frame().undefine(&x));
        assert!(!global.frame().undefine(&x));
        assert!(global.lookup(&x).is_none());
        assert!(global.frame().is_empty());
    }

    #[test]
    fn extended_environments_outlive_their_creator() {
        let symbols = SymbolTable::new();
        let x = symbols.intern("x");

        let escaped = {
            let global = Environment::new();
            let call = Environment::extend([(x.clone(), Expr::Fixnum(7))], &global);
            call.clone()
        };
        assert_eq!(escaped.depth(), 2);
        assert_eq!(value(&escaped, &x).as_deref(), Some("7"));
    }
}
