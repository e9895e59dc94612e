//! Tiger types
//!
//! Primitive types compare by kind. Array and record types are nominal: each
//! `array of` / `{ ... }` type expression creates a new identity and aliases
//! share it. Names are placeholders bound after their whole declaration group
//! has been seen, which is what allows mutually recursive type declarations.

use std::{
    cell::RefCell,
    rc::Rc,
    sync::atomic::{AtomicU32, Ordering},
};

use itertools::Itertools;

use crate::frontend::intern::Symbol;

static NEXT_TYPE_IDENTITY: AtomicU32 = AtomicU32::new(0);

fn next_identity() -> u32 {
    NEXT_TYPE_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub enum Type {
    Int,
    String,
    Void,
    Nil,
    Array(Rc<ArrayType>),
    Record(Rc<RecordType>),
    Name(Rc<NameType>),
}

#[derive(Debug)]
pub struct ArrayType {
    identity: u32,
    pub element: Type,
}

#[derive(Debug)]
pub struct RecordType {
    identity: u32,
    pub fields: Vec<(Symbol, Type)>,
}

impl RecordType {
    /// The record with no fields. Also used as the stand-in when a record
    /// type can't be resolved.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn find_field(&self, name: Symbol) -> Option<&Type> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, ty)| ty)
    }

    pub fn field_index(&self, name: Symbol) -> Option<usize> {
        self.fields.iter().position(|(field, _)| *field == name)
    }
}

#[derive(Debug)]
pub struct NameType {
    pub name: Symbol,
    binding: RefCell<Option<Type>>,
}

impl NameType {
    pub fn bind(&self, ty: Type) {
        *self.binding.borrow_mut() = Some(ty);
    }

    pub fn binding(&self) -> Option<Type> {
        self.binding.borrow().clone()
    }

    /// Whether following name bindings from this name leads back to it
    /// without ever reaching a concrete type
    pub fn is_cycle(self: &Rc<Self>) -> bool {
        let mut current = self.binding();
        let mut steps = 0;

        while let Some(Type::Name(name)) = current {
            if Rc::ptr_eq(&name, self) {
                return true;
            }

            // A chain longer than this must loop somewhere else
            steps += 1;
            if steps > MAX_NAME_CHAIN {
                return false;
            }

            current = name.binding();
        }

        false
    }
}

const MAX_NAME_CHAIN: usize = 1024;

impl Type {
    pub fn array(element: Type) -> Self {
        Type::Array(Rc::new(ArrayType {
            identity: next_identity(),
            element,
        }))
    }

    pub fn record(fields: Vec<(Symbol, Type)>) -> Self {
        Type::Record(Rc::new(RecordType {
            identity: next_identity(),
            fields,
        }))
    }

    pub fn empty_record() -> Self {
        Self::record(Vec::new())
    }

    pub fn name(name: Symbol) -> Self {
        Type::Name(Rc::new(NameType {
            name,
            binding: RefCell::new(None),
        }))
    }

    /// Resolves names to the type they are bound to. An unbound or cyclic
    /// name resolves to itself.
    pub fn actual(&self) -> Type {
        let mut current = self.clone();

        for _ in 0..MAX_NAME_CHAIN {
            match &current {
                Type::Name(name) => match name.binding() {
                    Some(ty) => current = ty,
                    None => return current,
                },
                _ => return current,
            }
        }

        current
    }

    /// Whether a value of this type can be stored in a location of type
    /// `target`
    pub fn fits(&self, target: &Type) -> bool {
        match (self.actual(), target.actual()) {
            (Type::Int, Type::Int)
            | (Type::String, Type::String)
            | (Type::Void, Type::Void)
            | (Type::Nil, Type::Nil)
            | (Type::Nil, Type::Record(_))
            | (Type::Nil, Type::Array(_)) => true,
            (Type::Array(a), Type::Array(b)) => a.identity == b.identity,
            (Type::Record(a), Type::Record(b)) => a.identity == b.identity,
            (Type::Name(a), Type::Name(b)) => Rc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self.actual(), Type::Int)
    }

    pub fn is_string(&self) -> bool {
        matches!(self.actual(), Type::String)
    }

    pub fn is_void(&self) -> bool {
        matches!(self.actual(), Type::Void)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self.actual(), Type::Nil)
    }

    /// Arrays and records, the types that live on the heap and can be nil
    pub fn is_reference(&self) -> bool {
        matches!(self.actual(), Type::Array(_) | Type::Record(_))
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::String => write!(f, "string"),
            Type::Void => write!(f, "void"),
            Type::Nil => write!(f, "nil"),
            Type::Array(array) => write!(f, "array of {}", array.element),
            Type::Record(record) => write!(
                f,
                "{{{}}}",
                record
                    .fields
                    .iter()
                    .map(|(name, ty)| format!("{name}: {ty}"))
                    .join(", ")
            ),
            Type::Name(name) => write!(f, "{}", name.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_fit_themselves_only() {
        assert!(Type::Int.fits(&Type::Int));
        assert!(Type::String.fits(&Type::String));
        assert!(!Type::Int.fits(&Type::String));
        assert!(!Type::Void.fits(&Type::Int));
        assert!(!Type::Int.fits(&Type::Void));
    }

    #[test]
    fn nil_fits_references() {
        let list = Type::record(vec![(Symbol::new("head"), Type::Int)]);
        let ints = Type::array(Type::Int);

        assert!(Type::Nil.fits(&list));
        assert!(Type::Nil.fits(&ints));
        assert!(!Type::Nil.fits(&Type::Int));
        assert!(!list.fits(&Type::Nil));
    }

    #[test]
    fn records_and_arrays_are_nominal() {
        let a = Type::array(Type::Int);
        let b = Type::array(Type::Int);
        assert!(a.fits(&a.clone()));
        assert!(!a.fits(&b));

        let p = Type::record(vec![(Symbol::new("x"), Type::Int)]);
        let q = Type::record(vec![(Symbol::new("x"), Type::Int)]);
        assert!(!p.fits(&q));
    }

    #[test]
    fn names_resolve_through_bindings() {
        let ints = Type::array(Type::Int);
        let alias = Type::name(Symbol::new("intArray"));
        let Type::Name(name) = &alias else {
            unreachable!()
        };
        name.bind(ints.clone());

        assert!(alias.fits(&ints));
        assert!(ints.fits(&alias));
        assert!(Type::Nil.fits(&alias));
        assert_eq!(alias.to_string(), "intArray");
        assert_eq!(alias.actual().to_string(), "array of int");
    }

    #[test]
    fn detects_name_cycles() {
        let a = Type::name(Symbol::new("a"));
        let b = Type::name(Symbol::new("b"));
        let (Type::Name(na), Type::Name(nb)) = (&a, &b) else {
            unreachable!()
        };

        na.bind(b.clone());
        nb.bind(a.clone());
        assert!(na.is_cycle());
        assert!(nb.is_cycle());

        nb.bind(Type::Int);
        assert!(!na.is_cycle());
        assert!(a.is_int());
    }

    #[test]
    fn recursive_records_go_through_names() {
        let list = Type::name(Symbol::new("list"));
        let Type::Name(name) = &list else {
            unreachable!()
        };
        let record = Type::record(vec![
            (Symbol::new("head"), Type::Int),
            (Symbol::new("tail"), list.clone()),
        ]);
        name.bind(record.clone());

        assert!(!name.is_cycle());
        let Type::Record(fields) = list.actual() else {
            panic!("expected a record")
        };
        assert_eq!(fields.field_index(Symbol::new("tail")), Some(1));
        assert!(fields.find_field(Symbol::new("tail")).unwrap().fits(&record));
        assert_eq!(record.to_string(), "{head: int, tail: list}");
    }
}
