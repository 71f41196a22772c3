//! Type context for managing types and type interning

use crate::error::TypeError;
use crate::numeric::NumericKind;
use crate::ty::{ClassHierarchy, ClassType, GenericType, PrimitiveKind, Type, TypeId, TypeVar};
use rustc_hash::FxHashMap;

/// Ids of the types every compilation unit starts with
#[derive(Debug, Clone)]
pub struct WellKnown {
    /// `boolean`
    pub boolean: TypeId,
    /// `byte`
    pub byte: TypeId,
    /// `short`
    pub short: TypeId,
    /// `char`
    pub char: TypeId,
    /// `int`
    pub int: TypeId,
    /// `long`
    pub long: TypeId,
    /// `float`
    pub float: TypeId,
    /// `double`
    pub double: TypeId,
    /// `void`
    pub void: TypeId,
    /// `Object`, the root class
    pub object: TypeId,
    /// `Number`, superclass of every boxed numeric
    pub number: TypeId,
    /// `String`
    pub string: TypeId,
    /// `BigInteger`
    pub big_integer: TypeId,
    /// `BigDecimal`
    pub big_decimal: TypeId,
    /// `Comparable`
    pub comparable: TypeId,
    /// `Iterable`, the iterator-producing capability
    pub iterable: TypeId,
    /// `Iterator`
    pub iterator: TypeId,
    /// `Enumeration`, the pull-style enumerator capability
    pub enumeration: TypeId,
    /// `Collection`
    pub collection: TypeId,
    /// `List`
    pub list: TypeId,
    /// `Range`
    pub range: TypeId,
    /// `Tuple`
    pub tuple: TypeId,
    /// `Closure`
    pub closure: TypeId,
    /// Statically unknown type
    pub dynamic: TypeId,
    /// Type of `null`
    pub null: TypeId,
}

/// Type context that manages all types in a compilation unit
///
/// Identical types share a [`TypeId`], so type equality is id equality. Types
/// are immutable once interned, except that a [`TypeVar`] placeholder may be
/// bound to a concrete type exactly once.
#[derive(Debug, Clone)]
pub struct TypeContext {
    /// Storage for all types, indexed by TypeId
    types: Vec<Type>,

    /// Reverse mapping from Type to TypeId for interning
    type_to_id: FxHashMap<Type, TypeId>,

    /// Supertype information for class and interface types
    hierarchy: FxHashMap<TypeId, ClassHierarchy>,

    /// Placeholder bindings
    bindings: FxHashMap<TypeId, TypeId>,

    /// Boxed wrapper class for each primitive
    wrappers: FxHashMap<PrimitiveKind, TypeId>,

    next_type_var: u32,

    well_known: Option<WellKnown>,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    /// Create a context pre-populated with the builtin types
    pub fn new() -> Self {
        let mut ctx = TypeContext {
            types: Vec::new(),
            type_to_id: FxHashMap::default(),
            hierarchy: FxHashMap::default(),
            bindings: FxHashMap::default(),
            wrappers: FxHashMap::default(),
            next_type_var: 0,
            well_known: None,
        };

        let prim = |ctx: &mut TypeContext, kind| ctx.intern(Type::Primitive(kind));
        let boolean = prim(&mut ctx, PrimitiveKind::Boolean);
        let byte = prim(&mut ctx, PrimitiveKind::Byte);
        let short = prim(&mut ctx, PrimitiveKind::Short);
        let char = prim(&mut ctx, PrimitiveKind::Char);
        let int = prim(&mut ctx, PrimitiveKind::Int);
        let long = prim(&mut ctx, PrimitiveKind::Long);
        let float = prim(&mut ctx, PrimitiveKind::Float);
        let double = prim(&mut ctx, PrimitiveKind::Double);
        let void = prim(&mut ctx, PrimitiveKind::Void);
        let dynamic = ctx.intern(Type::Dynamic);
        let null = ctx.intern(Type::Null);

        let object = ctx.builtin_class("Object", None, &[], false);
        let comparable = ctx.builtin_class("Comparable", None, &[], true);
        let iterable = ctx.builtin_class("Iterable", None, &[], true);
        let iterator = ctx.builtin_class("Iterator", None, &[], true);
        let enumeration = ctx.builtin_class("Enumeration", None, &[], true);
        let collection = ctx.builtin_class("Collection", None, &[iterable], true);
        let list = ctx.builtin_class("List", None, &[collection], true);
        let number = ctx.builtin_class("Number", Some(object), &[], false);
        let string = ctx.builtin_class("String", Some(object), &[comparable], false);
        let big_integer = ctx.builtin_class("BigInteger", Some(number), &[comparable], false);
        let big_decimal = ctx.builtin_class("BigDecimal", Some(number), &[comparable], false);
        let range = ctx.builtin_class("Range", Some(object), &[list], false);
        let tuple = ctx.builtin_class("Tuple", Some(object), &[list, comparable], false);
        let closure = ctx.builtin_class("Closure", Some(object), &[], false);

        for kind in PrimitiveKind::VALUES {
            let Some(name) = kind.wrapper_name() else { continue };
            let superclass = if NumericKind::of_primitive(kind).is_some() {
                number
            } else {
                object
            };
            let wrapper = ctx.builtin_class(name, Some(superclass), &[comparable], false);
            ctx.wrappers.insert(kind, wrapper);
        }

        ctx.well_known = Some(WellKnown {
            boolean,
            byte,
            short,
            char,
            int,
            long,
            float,
            double,
            void,
            object,
            number,
            string,
            big_integer,
            big_decimal,
            comparable,
            iterable,
            iterator,
            enumeration,
            collection,
            list,
            range,
            tuple,
            closure,
            dynamic,
            null,
        });
        ctx
    }

    fn builtin_class(
        &mut self,
        name: &str,
        superclass: Option<TypeId>,
        interfaces: &[TypeId],
        is_interface: bool,
    ) -> TypeId {
        let id = self.declare_class(name);
        self.hierarchy.insert(
            id,
            ClassHierarchy {
                superclass,
                interfaces: interfaces.to_vec(),
                is_interface,
            },
        );
        id
    }

    /// Well-known builtin type ids
    pub fn well_known(&self) -> &WellKnown {
        match &self.well_known {
            Some(wk) => wk,
            None => unreachable!("TypeContext::new always installs well-known types"),
        }
    }

    /// Intern a type, returning its TypeId
    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.type_to_id.get(&ty) {
            return id;
        }

        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.type_to_id.insert(ty, id);
        id
    }

    /// Get a type by its TypeId
    pub fn get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.0 as usize)
    }

    /// Get a type after following placeholder bindings
    pub fn resolved(&self, id: TypeId) -> Option<&Type> {
        self.get(self.resolve(id))
    }

    /// Number of interned types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are interned (never true after `new`)
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    // ===== Construction =====

    /// Get or create the class type with this name
    ///
    /// The hierarchy defaults to `extends Object` until [`set_supertypes`] is
    /// called, so forward references between declared classes work.
    ///
    /// [`set_supertypes`]: TypeContext::set_supertypes
    pub fn declare_class(&mut self, name: &str) -> TypeId {
        let id = self.intern(Type::Class(ClassType { name: name.to_string() }));
        if !self.hierarchy.contains_key(&id) {
            let superclass = self.well_known.as_ref().map(|wk| wk.object);
            self.hierarchy.insert(
                id,
                ClassHierarchy {
                    superclass,
                    interfaces: Vec::new(),
                    is_interface: false,
                },
            );
        }
        id
    }

    /// Set the supertypes of a declared class
    pub fn set_supertypes(
        &mut self,
        class: TypeId,
        superclass: Option<TypeId>,
        interfaces: Vec<TypeId>,
        is_interface: bool,
    ) -> Result<(), TypeError> {
        if self.get(class).and_then(Type::as_class).is_none() {
            return Err(TypeError::NotAClass { name: self.display(class) });
        }
        if let Some(sup) = superclass {
            if sup == class || self.is_subtype(sup, class) {
                return Err(TypeError::CircularReference {
                    cycle: format!("{} extends {}", self.display(class), self.display(sup)),
                });
            }
        }
        self.hierarchy.insert(
            class,
            ClassHierarchy {
                superclass,
                interfaces,
                is_interface,
            },
        );
        Ok(())
    }

    /// Look up a class by name
    pub fn class_named(&self, name: &str) -> Option<TypeId> {
        self.type_to_id
            .get(&Type::Class(ClassType { name: name.to_string() }))
            .copied()
    }

    /// Resolve a source-level type name: primitives, `def`/`Object`-like
    /// dynamic markers, and declared classes
    pub fn lookup_name(&self, name: &str) -> Result<TypeId, TypeError> {
        if name == "def" || name == "var" {
            return Ok(self.well_known().dynamic);
        }
        if let Some(kind) = PrimitiveKind::from_name(name) {
            let id = self.type_to_id.get(&Type::Primitive(kind)).copied();
            return id.ok_or_else(|| TypeError::UndefinedType { name: name.to_string() });
        }
        self.class_named(name)
            .ok_or_else(|| TypeError::UndefinedType { name: name.to_string() })
    }

    /// Array type with the given component
    pub fn array_of(&mut self, component: TypeId) -> TypeId {
        self.intern(Type::Array(component))
    }

    /// Parameterized type
    pub fn generic(&mut self, base: TypeId, args: Vec<TypeId>) -> TypeId {
        if args.is_empty() {
            return base;
        }
        self.intern(Type::Generic(GenericType { base, args }))
    }

    /// Fresh, unbound placeholder
    pub fn fresh_type_var(&mut self, name: impl Into<String>) -> TypeId {
        let id = self.next_type_var;
        self.next_type_var += 1;
        self.intern(Type::TypeVar(TypeVar { id, name: name.into() }))
    }

    /// Bind a placeholder to a concrete type; a placeholder binds only once
    pub fn bind_placeholder(&mut self, var: TypeId, ty: TypeId) -> Result<(), TypeError> {
        match self.get(var) {
            Some(Type::TypeVar(tv)) => {
                if let Some(&existing) = self.bindings.get(&var) {
                    if existing == ty {
                        return Ok(());
                    }
                    return Err(TypeError::PlaceholderRebound {
                        name: tv.name.clone(),
                        existing: self.display(existing),
                        attempted: self.display(ty),
                    });
                }
                self.bindings.insert(var, ty);
                Ok(())
            }
            _ => Err(TypeError::NotAPlaceholder {
                name: self.display(var),
            }),
        }
    }

    /// Follow placeholder bindings to the concrete type
    pub fn resolve(&self, mut id: TypeId) -> TypeId {
        while let Some(&bound) = self.bindings.get(&id) {
            id = bound;
        }
        id
    }

    // ===== Queries =====

    /// Supertype information for a class, if any
    pub fn hierarchy(&self, class: TypeId) -> Option<&ClassHierarchy> {
        self.hierarchy.get(&self.erase(class))
    }

    /// Strip generic arguments and placeholder bindings
    pub fn erase(&self, id: TypeId) -> TypeId {
        let id = self.resolve(id);
        match self.get(id) {
            Some(Type::Generic(g)) => g.base,
            _ => id,
        }
    }

    /// Whether the type is statically unknown (or an unbound placeholder)
    pub fn is_dynamic(&self, id: TypeId) -> bool {
        matches!(self.resolved(id), Some(Type::Dynamic) | Some(Type::TypeVar(_)) | None)
    }

    /// Whether the type is a primitive
    pub fn is_primitive(&self, id: TypeId) -> bool {
        matches!(self.resolved(id), Some(Type::Primitive(_)))
    }

    /// Primitive kind of a type, if primitive
    pub fn primitive(&self, id: TypeId) -> Option<PrimitiveKind> {
        self.resolved(id).and_then(Type::as_primitive)
    }

    /// Whether the type is an interface
    pub fn is_interface(&self, id: TypeId) -> bool {
        self.hierarchy(id).map(|h| h.is_interface).unwrap_or(false)
    }

    /// Component type of an array type
    pub fn component(&self, id: TypeId) -> Option<TypeId> {
        self.resolved(id).and_then(Type::as_array)
    }

    /// Type arguments of a parameterized type
    pub fn type_args(&self, id: TypeId) -> &[TypeId] {
        match self.resolved(id) {
            Some(Type::Generic(g)) => &g.args,
            _ => &[],
        }
    }

    /// Wrapper class for a primitive
    pub fn boxed(&self, kind: PrimitiveKind) -> Option<TypeId> {
        self.wrappers.get(&kind).copied()
    }

    /// Box a type if primitive, otherwise return it unchanged
    pub fn box_if_primitive(&self, id: TypeId) -> TypeId {
        self.primitive(id)
            .and_then(|kind| self.boxed(kind))
            .unwrap_or(id)
    }

    /// Primitive carried by a wrapper class
    pub fn unboxed(&self, id: TypeId) -> Option<PrimitiveKind> {
        let id = self.erase(id);
        self.wrappers
            .iter()
            .find(|(_, &wrapper)| wrapper == id)
            .map(|(&kind, _)| kind)
    }

    /// Numeric kind of a primitive, wrapper or arbitrary-precision type
    pub fn numeric_kind(&self, id: TypeId) -> Option<NumericKind> {
        if let Some(kind) = self.primitive(id) {
            return NumericKind::of_primitive(kind);
        }
        let id = self.erase(id);
        let wk = self.well_known();
        if id == wk.big_integer {
            return Some(NumericKind::BigInteger);
        }
        if id == wk.big_decimal {
            return Some(NumericKind::BigDecimal);
        }
        self.unboxed(id).and_then(NumericKind::of_primitive)
    }

    /// The type that represents a numeric kind in arithmetic results
    pub fn numeric_type(&self, kind: NumericKind) -> TypeId {
        let wk = self.well_known();
        match kind {
            NumericKind::Byte => wk.byte,
            NumericKind::Short => wk.short,
            NumericKind::Char => wk.char,
            NumericKind::Int => wk.int,
            NumericKind::Long => wk.long,
            NumericKind::Float => wk.float,
            NumericKind::Double => wk.double,
            NumericKind::BigInteger => wk.big_integer,
            NumericKind::BigDecimal => wk.big_decimal,
        }
    }

    /// Whether the type is boolean or its wrapper
    pub fn is_boolean(&self, id: TypeId) -> bool {
        self.primitive(id) == Some(PrimitiveKind::Boolean)
            || self.unboxed(id) == Some(PrimitiveKind::Boolean)
    }

    /// Superclass chain starting at `class` itself
    pub fn superclass_chain(&self, class: TypeId) -> Vec<TypeId> {
        let mut chain = Vec::new();
        let mut current = Some(self.erase(class));
        while let Some(id) = current {
            if chain.contains(&id) {
                break;
            }
            chain.push(id);
            current = self.hierarchy.get(&id).and_then(|h| h.superclass);
        }
        chain
    }

    /// Every interface implemented by `class`, directly or transitively
    pub fn all_interfaces(&self, class: TypeId) -> Vec<TypeId> {
        let mut result = Vec::new();
        let mut pending: Vec<TypeId> = Vec::new();
        for id in self.superclass_chain(class) {
            if let Some(h) = self.hierarchy.get(&id) {
                if h.is_interface {
                    pending.push(id);
                }
                pending.extend(h.interfaces.iter().copied());
            }
        }
        while let Some(iface) = pending.pop() {
            if result.contains(&iface) {
                continue;
            }
            result.push(iface);
            if let Some(h) = self.hierarchy.get(&iface) {
                pending.extend(h.interfaces.iter().copied());
            }
        }
        result
    }

    /// Whether `ty` implements (or is) the interface `iface`
    pub fn implements(&self, ty: TypeId, iface: TypeId) -> bool {
        let ty = self.erase(ty);
        ty == iface || self.all_interfaces(ty).contains(&iface)
    }

    /// Check `sub <: sup`
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        crate::subtyping::SubtypingContext::new(self).is_subtype(sub, sup)
    }

    /// Human-readable name of a type
    pub fn display(&self, id: TypeId) -> String {
        let id = self.resolve(id);
        match self.get(id) {
            Some(Type::Primitive(kind)) => kind.name().to_string(),
            Some(Type::Class(class)) => class.name.clone(),
            Some(Type::Array(component)) => format!("{}[]", self.display(*component)),
            Some(Type::Generic(g)) => {
                let args: Vec<String> = g.args.iter().map(|&a| self.display(a)).collect();
                format!("{}<{}>", self.display(g.base), args.join(", "))
            }
            Some(Type::TypeVar(tv)) => tv.name.clone(),
            Some(Type::Dynamic) => "def".to_string(),
            Some(Type::Null) => "null".to_string(),
            None => format!("<invalid {}>", id),
        }
    }
}
