//! Method and field tables for builtin and declared classes
//!
//! The builtin method sets mirror what the runtime implements natively; the
//! declared ones come from `ClassDecl`s. Overload selection lives in
//! [`crate::resolve`].

use crate::error::CheckError;
use kestrel_ast::{ClassDecl, CompileMode, MethodDecl, SourceUnit, TypeRef};
use kestrel_types::{PrimitiveKind, TypeContext, TypeError, TypeId};
use rustc_hash::FxHashMap;

/// How a resolved method is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Through an interface method
    Interface,
    /// Concrete (possibly overridden) instance method
    Virtual,
    /// Class method
    Static,
    /// Method of a dynamic-mode class; may be replaced at runtime
    Dynamic,
}

/// A resolved callable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodTarget {
    /// Declaring class
    pub owner: TypeId,
    /// Declaring class name
    pub owner_name: String,
    /// Method name (`<init>` for constructors)
    pub name: String,
    /// Parameter types
    pub params: Vec<TypeId>,
    /// Return type
    pub return_type: TypeId,
    /// Invocation discriminator
    pub kind: CallKind,
}

impl MethodTarget {
    /// Whether this is a class method
    pub fn is_static(&self) -> bool {
        self.kind == CallKind::Static
    }

    /// Whether this is a constructor
    pub fn is_constructor(&self) -> bool {
        self.name == MethodDecl::CONSTRUCTOR
    }

    /// Source-like signature, e.g. `substring(int, int)`
    pub fn signature(&self, ctx: &TypeContext) -> String {
        let params: Vec<String> = self.params.iter().map(|&p| ctx.display(p)).collect();
        format!("{}({})", self.name, params.join(", "))
    }

    /// Descriptor used in class-file method references
    pub fn descriptor(&self, ctx: &TypeContext) -> String {
        method_descriptor(ctx, &self.params, self.return_type)
    }
}

/// `(int,String)boolean`
pub fn method_descriptor(ctx: &TypeContext, params: &[TypeId], return_type: TypeId) -> String {
    let params: Vec<String> = params.iter().map(|&p| ctx.display(ctx.erase(p))).collect();
    format!("({}){}", params.join(","), ctx.display(ctx.erase(return_type)))
}

/// A resolved field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldTarget {
    /// Declaring class
    pub owner: TypeId,
    /// Declaring class name
    pub owner_name: String,
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeId,
    /// Class field
    pub is_static: bool,
}

/// Method signature stored in a class
#[derive(Debug, Clone)]
pub struct MethodSig {
    /// Method name
    pub name: String,
    /// Parameter types
    pub params: Vec<TypeId>,
    /// Return type
    pub return_type: TypeId,
    /// Invocation discriminator
    pub kind: CallKind,
}

/// Field signature stored in a class
#[derive(Debug, Clone)]
pub struct FieldSig {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeId,
    /// Class field
    pub is_static: bool,
}

/// Members of one class
#[derive(Debug, Clone)]
pub struct ClassInfo {
    /// Class type
    pub ty: TypeId,
    /// Class name
    pub name: String,
    /// Compilation mode (builtins count as static)
    pub mode: CompileMode,
    /// Provided by the runtime
    pub builtin: bool,
    /// Methods, constructors included
    pub methods: Vec<MethodSig>,
    /// Fields
    pub fields: Vec<FieldSig>,
}

/// Method and field tables for every class known to a compilation
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    classes: FxHashMap<TypeId, ClassInfo>,
}

impl ClassTable {
    /// Table populated with the builtin classes
    pub fn with_builtins(ctx: &mut TypeContext) -> Self {
        let mut table = ClassTable::default();
        install_builtins(&mut table, ctx);
        table
    }

    /// Class info by type
    pub fn get(&self, ty: TypeId) -> Option<&ClassInfo> {
        self.classes.get(&ty)
    }

    /// Whether the class was declared in source (not builtin)
    pub fn is_declared(&self, ty: TypeId) -> bool {
        self.classes.get(&ty).map(|c| !c.builtin).unwrap_or(false)
    }

    /// Register the names of a unit's classes so later units can refer to them
    pub fn declare_classes(&mut self, ctx: &mut TypeContext, unit: &SourceUnit) {
        for class in &unit.classes {
            let ty = ctx.declare_class(&class.name);
            self.classes.entry(ty).or_insert_with(|| ClassInfo {
                ty,
                name: class.name.clone(),
                mode: class.mode,
                builtin: false,
                methods: Vec::new(),
                fields: Vec::new(),
            });
        }
    }

    /// Resolve supertypes and member signatures of a unit's classes
    ///
    /// Every class of every unit must already be registered with
    /// [`declare_classes`](Self::declare_classes).
    pub fn declare_members(&mut self, ctx: &mut TypeContext, unit: &SourceUnit) -> Vec<CheckError> {
        let mut errors = Vec::new();
        for class in &unit.classes {
            self.declare_class_members(ctx, class, &mut errors);
        }
        errors
    }

    /// Both declaration passes for a single unit
    pub fn declare_unit(&mut self, ctx: &mut TypeContext, unit: &SourceUnit) -> Vec<CheckError> {
        self.declare_classes(ctx, unit);
        self.declare_members(ctx, unit)
    }

    fn declare_class_members(
        &mut self,
        ctx: &mut TypeContext,
        class: &ClassDecl,
        errors: &mut Vec<CheckError>,
    ) {
        let ty = ctx.declare_class(&class.name);

        let superclass = match &class.superclass {
            Some(name) => match ctx.class_named(name) {
                Some(sup) => Some(sup),
                None => {
                    errors.push(CheckError::UndefinedType {
                        name: name.clone(),
                        span: class.span,
                    });
                    Some(ctx.well_known().object)
                }
            },
            None => Some(ctx.well_known().object),
        };
        let mut interfaces = Vec::new();
        for name in &class.interfaces {
            match ctx.class_named(name) {
                Some(iface) if ctx.is_interface(iface) => interfaces.push(iface),
                Some(_) => errors.push(CheckError::InvalidHierarchy {
                    message: format!("'{}' is not an interface", name),
                    span: class.span,
                }),
                None => errors.push(CheckError::UndefinedType {
                    name: name.clone(),
                    span: class.span,
                }),
            }
        }
        if let Err(e) = ctx.set_supertypes(ty, superclass, interfaces, false) {
            errors.push(CheckError::InvalidHierarchy {
                message: e.to_string(),
                span: class.span,
            });
        }

        let member_kind = match class.mode {
            CompileMode::Static => CallKind::Virtual,
            CompileMode::Dynamic => CallKind::Dynamic,
        };

        let mut fields = Vec::new();
        for field in &class.fields {
            let field_ty = resolve_type_ref(ctx, &field.ty).unwrap_or_else(|e| {
                errors.push(type_error_at(e, field.span));
                ctx.well_known().dynamic
            });
            fields.push(FieldSig {
                name: field.name.clone(),
                ty: field_ty,
                is_static: field.is_static,
            });
        }

        let mut methods = Vec::new();
        for method in &class.methods {
            let mut params = Vec::new();
            for param in &method.params {
                params.push(resolve_type_ref(ctx, &param.ty).unwrap_or_else(|e| {
                    errors.push(type_error_at(e, method.span));
                    ctx.well_known().dynamic
                }));
            }
            let return_type = if method.is_constructor() {
                ctx.well_known().void
            } else {
                resolve_type_ref(ctx, &method.return_type).unwrap_or_else(|e| {
                    errors.push(type_error_at(e, method.span));
                    ctx.well_known().dynamic
                })
            };
            let kind = if method.is_static {
                CallKind::Static
            } else {
                member_kind
            };
            methods.push(MethodSig {
                name: method.name.clone(),
                params,
                return_type,
                kind,
            });
        }

        let info = self.classes.entry(ty).or_insert_with(|| ClassInfo {
            ty,
            name: class.name.clone(),
            mode: class.mode,
            builtin: false,
            methods: Vec::new(),
            fields: Vec::new(),
        });
        info.mode = class.mode;
        info.methods = methods;
        info.fields = fields;
    }

    /// Every method named `name` with `arity` parameters visible on `ty`
    ///
    /// Walks the superclass chain, then interfaces. A method overridden in a
    /// subclass (same parameter types) hides the inherited one.
    pub fn candidates(
        &self,
        ctx: &TypeContext,
        ty: TypeId,
        name: &str,
        arity: usize,
    ) -> Vec<MethodTarget> {
        let mut owners = ctx.superclass_chain(ty);
        owners.extend(ctx.all_interfaces(ty));
        if ctx.is_interface(ty) {
            owners.push(ctx.well_known().object);
        }

        let mut found: Vec<MethodTarget> = Vec::new();
        for owner in owners {
            let Some(info) = self.classes.get(&owner) else { continue };
            for sig in info.methods.iter().filter(|m| m.name == name && m.params.len() == arity) {
                if found.iter().any(|f| f.params == sig.params) {
                    continue;
                }
                found.push(MethodTarget {
                    owner,
                    owner_name: info.name.clone(),
                    name: sig.name.clone(),
                    params: sig.params.clone(),
                    return_type: sig.return_type,
                    kind: sig.kind,
                });
            }
        }
        found
    }

    /// Constructors declared by `ty` itself
    ///
    /// A declared class without constructors gets the implicit no-argument
    /// one.
    pub fn constructors(&self, ctx: &TypeContext, ty: TypeId, arity: usize) -> Vec<MethodTarget> {
        let Some(info) = self.classes.get(&ty) else { return Vec::new() };
        let ctors: Vec<MethodTarget> = info
            .methods
            .iter()
            .filter(|m| m.name == MethodDecl::CONSTRUCTOR)
            .filter(|m| m.params.len() == arity)
            .map(|sig| MethodTarget {
                owner: ty,
                owner_name: info.name.clone(),
                name: sig.name.clone(),
                params: sig.params.clone(),
                return_type: sig.return_type,
                kind: CallKind::Virtual,
            })
            .collect();
        let declares_any = info.methods.iter().any(|m| m.name == MethodDecl::CONSTRUCTOR);
        if ctors.is_empty() && !declares_any && !info.builtin && arity == 0 {
            return vec![MethodTarget {
                owner: ty,
                owner_name: info.name.clone(),
                name: MethodDecl::CONSTRUCTOR.to_string(),
                params: Vec::new(),
                return_type: ctx.well_known().void,
                kind: CallKind::Virtual,
            }];
        }
        ctors
    }

    /// Field named `name` on `ty` or a superclass
    pub fn find_field(&self, ctx: &TypeContext, ty: TypeId, name: &str) -> Option<FieldTarget> {
        for owner in ctx.superclass_chain(ty) {
            let Some(info) = self.classes.get(&owner) else { continue };
            if let Some(field) = info.fields.iter().find(|f| f.name == name) {
                return Some(FieldTarget {
                    owner,
                    owner_name: info.name.clone(),
                    name: field.name.clone(),
                    ty: field.ty,
                    is_static: field.is_static,
                });
            }
        }
        None
    }

    /// Whether any method of this name exists on `ty` (any arity)
    pub fn has_method_named(&self, ctx: &TypeContext, ty: TypeId, name: &str) -> bool {
        ctx.superclass_chain(ty)
            .into_iter()
            .chain(ctx.all_interfaces(ty))
            .filter_map(|owner| self.classes.get(&owner))
            .any(|info| info.methods.iter().any(|m| m.name == name))
    }

    fn builtin(&mut self, ty: TypeId, name: &str) -> &mut ClassInfo {
        self.classes.entry(ty).or_insert_with(|| ClassInfo {
            ty,
            name: name.to_string(),
            mode: CompileMode::Static,
            builtin: true,
            methods: Vec::new(),
            fields: Vec::new(),
        })
    }
}

/// Resolve a source type reference
pub fn resolve_type_ref(ctx: &mut TypeContext, ty: &TypeRef) -> Result<TypeId, TypeError> {
    match ty {
        TypeRef::Dynamic => Ok(ctx.well_known().dynamic),
        TypeRef::Named { name, args } => {
            let base = ctx.lookup_name(name)?;
            let mut resolved = Vec::with_capacity(args.len());
            for arg in args {
                let arg = resolve_type_ref(ctx, arg)?;
                resolved.push(ctx.box_if_primitive(arg));
            }
            Ok(ctx.generic(base, resolved))
        }
        TypeRef::Array(component) => {
            let component = resolve_type_ref(ctx, component)?;
            Ok(ctx.array_of(component))
        }
    }
}

pub(crate) fn type_error_at(error: TypeError, span: kestrel_ast::Span) -> CheckError {
    match error {
        TypeError::UndefinedType { name } => CheckError::UndefinedType { name, span },
        other => CheckError::InvalidHierarchy {
            message: other.to_string(),
            span,
        },
    }
}

/// Builtin classes
///
/// Each entry is `(class, method, params, return, kind)` with type names
/// resolved through the context. These mirror the runtime's native classes.
const BUILTIN_METHODS: &[(&str, &str, &[&str], &str, CallKind)] = &[
    ("Object", "toString", &[], "String", CallKind::Virtual),
    ("Object", "equals", &["Object"], "boolean", CallKind::Virtual),
    ("Object", "hashCode", &[], "int", CallKind::Virtual),
    ("Comparable", "compareTo", &["Object"], "int", CallKind::Interface),
    ("Iterable", "iterator", &[], "Iterator", CallKind::Interface),
    ("Iterator", "hasNext", &[], "boolean", CallKind::Interface),
    ("Iterator", "next", &[], "Object", CallKind::Interface),
    ("Enumeration", "hasMoreElements", &[], "boolean", CallKind::Interface),
    ("Enumeration", "nextElement", &[], "Object", CallKind::Interface),
    ("Collection", "size", &[], "int", CallKind::Interface),
    ("Collection", "isEmpty", &[], "boolean", CallKind::Interface),
    ("Collection", "contains", &["Object"], "boolean", CallKind::Interface),
    ("List", "get", &["int"], "Object", CallKind::Interface),
    ("List", "set", &["int", "Object"], "Object", CallKind::Interface),
    ("List", "add", &["Object"], "boolean", CallKind::Interface),
    ("List", "plus", &["Object"], "List", CallKind::Interface),
    ("String", "length", &[], "int", CallKind::Virtual),
    ("String", "charAt", &["int"], "char", CallKind::Virtual),
    ("String", "substring", &["int", "int"], "String", CallKind::Virtual),
    ("String", "toUpperCase", &[], "String", CallKind::Virtual),
    ("String", "isEmpty", &[], "boolean", CallKind::Virtual),
    ("String", "plus", &["Object"], "String", CallKind::Virtual),
    ("String", "next", &[], "String", CallKind::Virtual),
    ("String", "previous", &[], "String", CallKind::Virtual),
    ("String", "valueOf", &["Object"], "String", CallKind::Static),
    ("Number", "intValue", &[], "int", CallKind::Virtual),
    ("Number", "longValue", &[], "long", CallKind::Virtual),
    ("Number", "doubleValue", &[], "double", CallKind::Virtual),
    ("Integer", "parseInt", &["String"], "int", CallKind::Static),
    ("BigInteger", "plus", &["BigInteger"], "BigInteger", CallKind::Virtual),
    ("BigInteger", "minus", &["BigInteger"], "BigInteger", CallKind::Virtual),
    ("BigInteger", "multiply", &["BigInteger"], "BigInteger", CallKind::Virtual),
    ("BigDecimal", "plus", &["BigDecimal"], "BigDecimal", CallKind::Virtual),
    ("BigDecimal", "minus", &["BigDecimal"], "BigDecimal", CallKind::Virtual),
    ("BigDecimal", "multiply", &["BigDecimal"], "BigDecimal", CallKind::Virtual),
    ("Range", "getFrom", &[], "Object", CallKind::Virtual),
    ("Range", "getTo", &[], "Object", CallKind::Virtual),
    ("Range", "isReverse", &[], "boolean", CallKind::Virtual),
    ("Range", "step", &["int"], "List", CallKind::Virtual),
    ("Tuple", "subTuple", &["int", "int"], "Tuple", CallKind::Virtual),
    ("Console", "println", &["Object"], "void", CallKind::Static),
    ("Console", "print", &["Object"], "void", CallKind::Static),
    ("Helpers", "iterator", &["Object"], "Iterator", CallKind::Static),
    ("Helpers", "concat", &["Object", "Object"], "String", CallKind::Static),
    ("Helpers", "equals", &["Object", "Object"], "boolean", CallKind::Static),
];

fn install_builtins(table: &mut ClassTable, ctx: &mut TypeContext) {
    for class in ["Console", "Helpers"] {
        ctx.declare_class(class);
    }

    for &(class, method, params, ret, kind) in BUILTIN_METHODS {
        let (Some(owner), Ok(return_type)) = (ctx.class_named(class), ctx.lookup_name(ret)) else {
            continue;
        };
        let params: Vec<TypeId> = params
            .iter()
            .filter_map(|p| ctx.lookup_name(p).ok())
            .collect();
        table.builtin(owner, class).methods.push(MethodSig {
            name: method.to_string(),
            params,
            return_type,
            kind,
        });
    }

    // Wrapper classes exist even without methods of their own
    for kind in PrimitiveKind::VALUES {
        if let (Some(name), Some(ty)) = (kind.wrapper_name(), ctx.boxed(kind)) {
            table.builtin(ty, name);
        }
    }
    let wk = ctx.well_known().clone();
    for (ty, name) in [(wk.closure, "Closure"), (wk.number, "Number"), (wk.object, "Object")] {
        table.builtin(ty, name);
    }
}
