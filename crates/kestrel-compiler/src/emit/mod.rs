//! Bytecode emission
//!
//! Walks annotated class declarations and produces one [`ClassFile`] per
//! class. Each expression is emitted through the static path when the
//! annotator resolved it, and through an `INVOKEDYNAMIC` call site otherwise;
//! the choice is recorded in an [`EmissionReport`].

mod code;
mod expr;
mod locals;
mod loops;
mod method;
mod report;
mod stack;
mod stmt;

pub use report::{EmissionPath, EmissionReport};

use crate::error::{CompileError, CompileResult};
use kestrel_ast::{ClassDecl, CompileMode, MethodDecl, SourceUnit};
use kestrel_bytecode::{flags, ClassFile, ClassMode, FieldInfo, Opcode};
use kestrel_checker::{method_descriptor, Annotations, ClassInfo, ClassTable, MethodKey};
use kestrel_types::TypeContext;
use method::{BodyKind, MethodEmitter};
use tracing::debug;

/// Shared state while emitting one class
pub(crate) struct ClassState<'a> {
    pub ctx: &'a TypeContext,
    pub classes: &'a ClassTable,
    pub ann: &'a Annotations,
    pub file: ClassFile,
    pub report: EmissionReport,
    closure_count: u32,
}

impl<'a> ClassState<'a> {
    /// `closure$0`, `closure$1`, ...
    pub fn next_closure_name(&mut self) -> String {
        let name = format!("closure${}", self.closure_count);
        self.closure_count += 1;
        name
    }
}

/// A class file together with the strategy record of its expressions
#[derive(Debug, Clone)]
pub struct EmittedClass {
    /// Verified-ready class file
    pub class: ClassFile,
    /// Path taken per node and loop form per for-in
    pub report: EmissionReport,
}

/// Emit every class of an annotated unit
pub fn emit_unit(
    ctx: &TypeContext,
    classes: &ClassTable,
    ann: &Annotations,
    unit: &SourceUnit,
) -> CompileResult<Vec<EmittedClass>> {
    unit.classes
        .iter()
        .map(|decl| emit_class(ctx, classes, ann, decl))
        .collect()
}

/// Emit one annotated class
pub fn emit_class(
    ctx: &TypeContext,
    classes: &ClassTable,
    ann: &Annotations,
    decl: &ClassDecl,
) -> CompileResult<EmittedClass> {
    let info = ctx
        .class_named(&decl.name)
        .and_then(|ty| classes.get(ty))
        .ok_or_else(|| CompileError::internal(format!("class {} was never declared", decl.name)))?;

    let mut file = ClassFile::new(decl.name.clone());
    if let Some(superclass) = &decl.superclass {
        file.superclass = superclass.clone();
    }
    file.interfaces = decl.interfaces.clone();
    file.mode = match decl.mode {
        CompileMode::Static => ClassMode::Static,
        CompileMode::Dynamic => ClassMode::Dynamic,
    };
    for field in &info.fields {
        file.fields.push(FieldInfo {
            name: field.name.clone(),
            descriptor: ctx.display(ctx.erase(field.ty)),
            flags: if field.is_static { flags::STATIC } else { 0 },
        });
    }

    let mut state = ClassState {
        ctx,
        classes,
        ann,
        file,
        report: EmissionReport::new(),
        closure_count: 0,
    };

    for (index, method) in decl.methods.iter().enumerate() {
        let key = MethodKey {
            class: decl.name.clone(),
            index,
        };
        let sig = info.methods.get(index).ok_or_else(|| {
            CompileError::internal(format!("{}.{} has no signature", decl.name, method.name))
        })?;
        let descriptor = method_descriptor(ctx, &sig.params, sig.return_type);
        let emitted = if method.is_constructor() {
            let mut emitter = MethodEmitter::new(&mut state, BodyKind::Constructor, ctx.well_known().void);
            emitter.locals.reserve_receiver()?;
            emitter.bind_params(&key)?;
            emitter.constructor_prologue(decl)?;
            emitter.block(&method.body)?;
            emitter.implicit_return()?;
            emitter.finish(&method.name, &descriptor, 0)?
        } else {
            let kind = BodyKind::Method {
                is_static: method.is_static,
            };
            let mut emitter = MethodEmitter::new(&mut state, kind, sig.return_type);
            if !method.is_static {
                emitter.locals.reserve_receiver()?;
            }
            emitter.bind_params(&key)?;
            emitter.block(&method.body)?;
            emitter.implicit_return()?;
            let member_flags = if method.is_static { flags::STATIC } else { 0 };
            emitter.finish(&method.name, &descriptor, member_flags)?
        };
        state.file.methods.push(emitted);
    }

    if !decl.methods.iter().any(MethodDecl::is_constructor) {
        let mut emitter = MethodEmitter::new(&mut state, BodyKind::Constructor, ctx.well_known().void);
        emitter.locals.reserve_receiver()?;
        emitter.constructor_prologue(decl)?;
        emitter.implicit_return()?;
        let method = emitter.finish(MethodDecl::CONSTRUCTOR, "()void", 0)?;
        state.file.methods.push(method);
    }

    if decl.fields.iter().any(|f| f.is_static && f.init.is_some()) {
        let kind = BodyKind::Method { is_static: true };
        let mut emitter = MethodEmitter::new(&mut state, kind, ctx.well_known().void);
        emitter.field_initializers(decl, info, true)?;
        emitter.implicit_return()?;
        let method = emitter.finish("<clinit>", "()void", flags::STATIC)?;
        state.file.methods.push(method);
    }

    debug!(
        class = %decl.name,
        methods = state.file.methods.len(),
        call_sites = state.file.call_sites.len(),
        dynamic = state.report.count(EmissionPath::Dynamic),
        "emitted class"
    );
    Ok(EmittedClass {
        class: state.file,
        report: state.report,
    })
}

impl<'s, 'a> MethodEmitter<'s, 'a> {
    /// Super constructor call followed by instance field initializers
    fn constructor_prologue(&mut self, decl: &ClassDecl) -> CompileResult<()> {
        let ctx = self.cls.ctx;
        let classes = self.cls.classes;
        if let Some(superclass) = decl.superclass.as_deref() {
            let declared = ctx
                .class_named(superclass)
                .filter(|&ty| classes.is_declared(ty))
                .filter(|&ty| !classes.constructors(ctx, ty, 0).is_empty());
            if declared.is_some() {
                self.op_local(Opcode::Aload, 0)?;
                self.invoke(Opcode::InvokeSpecial, superclass, MethodDecl::CONSTRUCTOR, "()void")?;
            }
        }
        let info = ctx
            .class_named(&decl.name)
            .and_then(|ty| classes.get(ty))
            .ok_or_else(|| CompileError::internal(format!("class {} was never declared", decl.name)))?;
        self.field_initializers(decl, info, false)
    }

    fn field_initializers(&mut self, decl: &ClassDecl, info: &ClassInfo, statics: bool) -> CompileResult<()> {
        for (field, sig) in decl.fields.iter().zip(&info.fields) {
            if field.is_static != statics {
                continue;
            }
            let Some(init) = &field.init else { continue };
            let descriptor = self.type_name(sig.ty);
            if statics {
                self.value(init, sig.ty)?;
                self.field_op(Opcode::PutStatic, &decl.name, &sig.name, &descriptor)?;
            } else {
                self.op_local(Opcode::Aload, 0)?;
                self.value(init, sig.ty)?;
                self.field_op(Opcode::PutField, &decl.name, &sig.name, &descriptor)?;
            }
        }
        Ok(())
    }
}
