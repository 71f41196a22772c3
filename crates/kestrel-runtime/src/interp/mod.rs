//! Bytecode interpreter
//!
//! Loaded classes are verified, pre-decoded and registered as metaclasses
//! whose methods dispatch back into the interpreter. Statically bound
//! invocations go straight to the target method; `INVOKEDYNAMIC` goes
//! through the call-site caches.
//!
//! Locals and the operand stack hold slot values (see [`crate::value`]).
//! Anything crossing a dynamic boundary is boxed, and parameters are
//! unboxed again per the callee's descriptor.

mod exec;

use crate::callsite::{CallSiteTable, SiteId};
use crate::field_site::{FieldSite, PropertyMode};
use crate::invoke::{invoke, Invoker};
use crate::metaclass::{FieldSlot, Implementation, MetaClass, MethodTarget};
use crate::registry::MetaClassRegistry;
use crate::value::{box_for, default_boxed, unbox_for, ArrayValue, Closure, Instance, Value};
use crate::{RuntimeError, RuntimeResult};
use dashmap::DashMap;
use kestrel_bytecode::{decode_instructions, verify_class, ClassFile, Instruction, MethodDescriptor, MethodInfo};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, trace};

/// Default nesting limit for method invocations
pub const DEFAULT_MAX_DEPTH: usize = 200;

const CONSTRUCTOR: &str = "<init>";
const INITIALIZER: &str = "<clinit>";
const MISSING_METHOD: &str = "methodMissing";

/// A method's instructions with a branch-target index
#[derive(Debug)]
pub(crate) struct DecodedMethod {
    code: Vec<Instruction>,
    index_of: FxHashMap<usize, usize>,
}

impl DecodedMethod {
    fn new(method: &MethodInfo) -> RuntimeResult<Self> {
        let code = decode_instructions(&method.code)?;
        let index_of = code.iter().enumerate().map(|(i, instr)| (instr.offset, i)).collect();
        Ok(Self { code, index_of })
    }
}

/// A verified class ready to run
#[derive(Debug)]
pub struct LoadedClass {
    file: ClassFile,
    methods: Vec<DecodedMethod>,
}

impl LoadedClass {
    /// Decode every method of `file`
    pub fn new(file: ClassFile) -> RuntimeResult<Self> {
        let methods = file
            .methods
            .iter()
            .map(DecodedMethod::new)
            .collect::<RuntimeResult<Vec<_>>>()?;
        Ok(Self { file, methods })
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.file.name
    }

    /// Underlying class file
    pub fn file(&self) -> &ClassFile {
        &self.file
    }

    fn method(&self, index: usize) -> RuntimeResult<&MethodInfo> {
        self.file
            .methods
            .get(index)
            .ok_or_else(|| RuntimeError::InvalidBytecode(format!("{} has no method #{}", self.file.name, index)))
    }
}

/// In-memory program output that can be read back
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    /// Empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs loaded classes
pub struct Interpreter {
    registry: Arc<MetaClassRegistry>,
    classes: FxHashMap<String, Arc<LoadedClass>>,
    initialized: FxHashSet<String>,
    sites: CallSiteTable,
    field_sites: DashMap<SiteId, Arc<FieldSite>>,
    output: Box<dyn Write + Send>,
    verify: bool,
    depth: usize,
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter with its own registry of built-ins, printing to stdout
    pub fn new() -> Self {
        Self::with_registry(Arc::new(MetaClassRegistry::with_builtins()))
    }

    /// Interpreter over an existing registry
    pub fn with_registry(registry: Arc<MetaClassRegistry>) -> Self {
        Self {
            registry,
            classes: FxHashMap::default(),
            initialized: FxHashSet::default(),
            sites: CallSiteTable::new(),
            field_sites: DashMap::new(),
            output: Box::new(io::stdout()),
            verify: true,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Send program output to `output`
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Skip verification when loading
    pub fn without_verification(mut self) -> Self {
        self.verify = false;
        self
    }

    /// Limit invocation nesting
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Metaclass registry used for dispatch
    pub fn metaclasses(&self) -> &Arc<MetaClassRegistry> {
        &self.registry
    }

    /// Dynamic call sites created so far
    pub fn call_sites(&self) -> &CallSiteTable {
        &self.sites
    }

    /// Loaded class by name
    pub fn class(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.classes.get(name).cloned()
    }

    fn loaded(&self, name: &str) -> RuntimeResult<Arc<LoadedClass>> {
        self.class(name).ok_or_else(|| RuntimeError::ClassNotFound(name.to_string()))
    }

    /// Verify, decode and register a class
    pub fn load(&mut self, file: ClassFile) -> RuntimeResult<()> {
        if self.verify {
            verify_class(&file)?;
        }
        let loaded = Arc::new(LoadedClass::new(file)?);
        let file = &loaded.file;

        let interfaces: Vec<&str> = file.interfaces.iter().map(String::as_str).collect();
        let superclass = (!file.superclass.is_empty()).then_some(file.superclass.as_str());
        let meta = MetaClass::new(&file.name, superclass).with_interfaces(&interfaces);
        for (index, method) in file.methods.iter().enumerate() {
            if method.name == CONSTRUCTOR || method.name == INITIALIZER || method.is_synthetic() {
                continue;
            }
            let descriptor = method.signature().ok_or_else(|| {
                RuntimeError::InvalidBytecode(format!("bad descriptor {}", method.descriptor))
            })?;
            let target = MethodTarget::bytecode(&file.name, &method.name, &descriptor, method.is_static(), index);
            if method.name == MISSING_METHOD && descriptor.arity() == 2 {
                meta.set_missing_method(Some(target));
            } else {
                meta.add_method(target);
            }
        }
        for field in &file.fields {
            meta.add_field(FieldSlot {
                name: field.name.clone(),
                descriptor: field.descriptor.clone(),
                is_static: field.is_static(),
            });
            if field.is_static() {
                meta.set_static(&field.name, default_boxed(&field.descriptor));
            }
        }
        debug!(
            class = %file.name,
            methods = file.methods.len(),
            fields = file.fields.len(),
            "class loaded"
        );
        self.registry.register(Arc::new(meta));
        self.initialized.remove(&file.name);
        self.classes.insert(file.name.clone(), Arc::clone(&loaded));
        Ok(())
    }

    /// Load several classes
    pub fn load_all(&mut self, files: impl IntoIterator<Item = ClassFile>) -> RuntimeResult<()> {
        for file in files {
            self.load(file)?;
        }
        Ok(())
    }

    /// Run `<clinit>` of `name` and its superclasses once
    pub fn ensure_initialized(&mut self, name: &str) -> RuntimeResult<()> {
        if self.initialized.contains(name) {
            return Ok(());
        }
        let Some(class) = self.class(name) else {
            return Ok(());
        };
        self.initialized.insert(name.to_string());
        let superclass = class.file.superclass.clone();
        if superclass != name {
            self.ensure_initialized(&superclass)?;
        }
        if let Some(index) = class.file.find_method(INITIALIZER, "()void") {
            trace!(class = name, "running class initializer");
            self.call_loaded(&class, index, None, &[])?;
        }
        Ok(())
    }

    /// Run the static `main` method of `class`
    pub fn run_main(&mut self, class: &str) -> RuntimeResult<()> {
        self.ensure_initialized(class)?;
        let loaded = self.loaded(class)?;
        let main = loaded
            .file
            .methods_named("main")
            .find(|(_, m)| m.is_static() && m.arity() <= 1)
            .map(|(index, m)| (index, m.arity()));
        let Some((index, arity)) = main else {
            return Err(RuntimeError::NoSuchMethod {
                receiver: class.to_string(),
                method: "main".to_string(),
                args: String::new(),
            });
        };
        debug!(class, "running main");
        let args = if arity == 1 {
            vec![Value::Array(Arc::new(ArrayValue::new("String", 0)))]
        } else {
            Vec::new()
        };
        let result = self.call_loaded(&loaded, index, None, &args);
        self.output.flush()?;
        result.map(drop)
    }

    /// Call a static method by name with boxed arguments
    pub fn invoke_static(&mut self, class: &str, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        self.ensure_initialized(class)?;
        let receiver = Value::class(class);
        let target = crate::callsite::resolve_uncached(&self.registry, &receiver, name, args)?;
        let result = invoke(self, &target, &receiver, args);
        self.output.flush()?;
        result
    }

    /// New instance of a loaded class with default field values
    fn allocate(&mut self, name: &str) -> RuntimeResult<Value> {
        if name == "Object" && !self.classes.contains_key(name) {
            return Ok(Value::Object(Arc::new(Instance::new(name, FxHashMap::default()))));
        }
        self.ensure_initialized(name)?;
        let mut fields = FxHashMap::default();
        let mut current = Some(self.loaded(name)?);
        let mut seen = 0;
        while let Some(class) = current {
            for field in class.file.fields.iter().filter(|f| !f.is_static()) {
                fields
                    .entry(field.name.clone())
                    .or_insert_with(|| default_boxed(&field.descriptor));
            }
            seen += 1;
            current = if seen < 64 { self.class(&class.file.superclass) } else { None };
        }
        Ok(Value::Object(Arc::new(Instance::new(name, fields))))
    }

    /// Construct `name` with boxed arguments, picking `<init>` by arity
    fn construct(&mut self, name: &str, args: &[Value]) -> RuntimeResult<Value> {
        let class = self.loaded(name)?;
        let instance = self.allocate(name)?;
        let candidates: Vec<(usize, MethodDescriptor)> = class
            .file
            .methods_named(CONSTRUCTOR)
            .filter_map(|(index, m)| m.signature().map(|d| (index, d)))
            .filter(|(_, d)| d.arity() == args.len())
            .collect();
        let chosen = candidates
            .iter()
            .find(|(_, d)| {
                d.params
                    .iter()
                    .zip(args)
                    .all(|(param, arg)| arg.is_null() || self.registry.is_instance(arg, param))
            })
            .or_else(|| candidates.first());
        match chosen {
            Some((index, _)) => {
                self.call_loaded(&class, *index, Some(instance.clone()), args)?;
            }
            None if args.is_empty() => {}
            None => {
                return Err(RuntimeError::NoSuchMethod {
                    receiver: name.to_string(),
                    method: CONSTRUCTOR.to_string(),
                    args: args.iter().map(Value::type_name).collect::<Vec<_>>().join(", "),
                })
            }
        }
        Ok(instance)
    }

    /// Instance method of a loaded class or its loaded superclasses
    fn find_virtual(&self, class: &str, name: &str, descriptor: &str, arity: usize) -> Option<(Arc<LoadedClass>, usize)> {
        let mut current = self.class(class);
        let mut seen = 0;
        while let Some(loaded) = current {
            let exact = loaded
                .file
                .find_method(name, descriptor)
                .filter(|&i| !loaded.file.methods[i].is_static());
            let by_arity = || {
                loaded
                    .file
                    .methods_named(name)
                    .find(|(_, m)| !m.is_static() && !m.is_synthetic() && m.arity() == arity)
                    .map(|(i, _)| i)
            };
            if let Some(index) = exact.or_else(by_arity) {
                return Some((Arc::clone(&loaded), index));
            }
            seen += 1;
            if seen >= 64 {
                return None;
            }
            current = self.class(&loaded.file.superclass);
        }
        None
    }

    /// Static method of a loaded class or its loaded superclasses
    fn find_static(&self, class: &str, name: &str, descriptor: &str) -> Option<(Arc<LoadedClass>, usize)> {
        let mut current = self.class(class);
        let mut seen = 0;
        while let Some(loaded) = current {
            if let Some(index) = loaded.file.find_method(name, descriptor) {
                return Some((Arc::clone(&loaded), index));
            }
            seen += 1;
            if seen >= 64 {
                return None;
            }
            current = self.class(&loaded.file.superclass);
        }
        None
    }

    /// Run a loaded method with boxed arguments, returning a boxed result
    fn call_loaded(
        &mut self,
        class: &Arc<LoadedClass>,
        index: usize,
        receiver: Option<Value>,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        let method = class.method(index)?;
        let descriptor = method
            .signature()
            .ok_or_else(|| RuntimeError::InvalidBytecode(format!("bad descriptor {}", method.descriptor)))?;
        if descriptor.arity() != args.len() {
            return Err(RuntimeError::ArityMismatch {
                callable: format!("{}.{}", class.name(), method.name),
                expected: descriptor.arity(),
                actual: args.len(),
            });
        }
        let receiver_slots = usize::from(!method.is_static());
        let size = usize::from(method.max_locals).max(receiver_slots + args.len());
        let mut locals = vec![Value::Null; size];
        if !method.is_static() {
            locals[0] = receiver.unwrap_or_default();
        }
        for (slot, (arg, param)) in locals[receiver_slots..].iter_mut().zip(args.iter().zip(&descriptor.params)) {
            *slot = unbox_for(arg.clone(), param)?;
        }
        let result = self.run_method(class, index, locals)?;
        match result {
            Some(value) => box_for(value, &descriptor.return_type),
            None => Ok(Value::Null),
        }
    }

    fn run_method(&mut self, class: &Arc<LoadedClass>, index: usize, locals: Vec<Value>) -> RuntimeResult<Option<Value>> {
        if self.depth >= self.max_depth {
            return Err(RuntimeError::StackOverflow(self.depth));
        }
        self.depth += 1;
        let result = self.execute(Arc::clone(class), index, locals);
        self.depth -= 1;
        result
    }

    fn property_site(&self, id: SiteId, name: &str, mode: PropertyMode) -> Arc<FieldSite> {
        Arc::clone(
            self.field_sites
                .entry(id)
                .or_insert_with(|| Arc::new(FieldSite::new(name, mode)))
                .value(),
        )
    }

    /// Class receivers of loaded classes run their initializer first
    fn prepare_receiver(&mut self, receiver: &Value) -> RuntimeResult<()> {
        match receiver {
            Value::Class(name) => self.ensure_initialized(name),
            _ => Ok(()),
        }
    }
}

impl Invoker for Interpreter {
    fn registry(&self) -> &MetaClassRegistry {
        &self.registry
    }

    fn invoke_bytecode(&mut self, target: &MethodTarget, receiver: &Value, args: &[Value]) -> RuntimeResult<Value> {
        let Implementation::Bytecode { method } = target.implementation else {
            return Err(RuntimeError::InvalidBytecode(format!(
                "{}.{} is not a bytecode method",
                target.owner, target.name
            )));
        };
        let class = self.loaded(&target.owner)?;
        if target.is_static {
            self.ensure_initialized(&target.owner)?;
            self.call_loaded(&class, method, None, args)
        } else {
            self.call_loaded(&class, method, Some(receiver.clone()), args)
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: &[Value]) -> RuntimeResult<Value> {
        let class = self.loaded(&closure.owner)?;
        let index = class
            .file
            .find_method(&closure.method, &closure.descriptor)
            .ok_or_else(|| RuntimeError::ClassNotFound(format!("{}.{}", closure.owner, closure.method)))?;
        let expected = closure.param_count();
        if expected != args.len() {
            return Err(RuntimeError::ArityMismatch {
                callable: format!("{}.{}", closure.owner, closure.method),
                expected,
                actual: args.len(),
            });
        }
        let mut all = closure.captures.clone();
        all.extend_from_slice(args);
        self.call_loaded(&class, index, Some(closure.this.clone()), &all)
    }

    fn write_output(&mut self, text: &str) -> RuntimeResult<()> {
        self.output.write_all(text.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_bytecode::{flags, BytecodeWriter, CallSiteDescriptor, CallSiteKind, FieldInfo, Opcode};

    fn method(name: &str, descriptor: &str, method_flags: u32, max_locals: u16, code: Vec<u8>) -> MethodInfo {
        MethodInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            flags: method_flags,
            max_locals,
            max_stack: 8,
            code,
        }
    }

    /// `static int add(int a, int b) { return a + b }`
    fn adder() -> ClassFile {
        let mut class = ClassFile::new("Adder");
        let mut w = BytecodeWriter::new();
        w.emit_local(Opcode::Iload, 0);
        w.emit_local(Opcode::Iload, 1);
        w.emit_opcode(Opcode::Iadd);
        w.emit_opcode(Opcode::Ireturn);
        class
            .methods
            .push(method("add", "(int,int)int", flags::STATIC, 2, w.into_bytes()));
        class
    }

    #[test]
    fn test_invoke_static_boxes_and_unboxes() {
        let mut interp = Interpreter::new();
        interp.load(adder()).unwrap();
        let sum = interp.invoke_static("Adder", "add", &[Value::Int(2), Value::Long(40)]).unwrap();
        assert!(matches!(sum, Value::Int(42)));
    }

    #[test]
    fn test_static_initializer_runs_once() {
        let mut class = ClassFile::new("Counter");
        class.fields.push(FieldInfo {
            name: "count".into(),
            descriptor: "int".into(),
            flags: flags::STATIC,
        });
        let field = class.constants.add_field("Counter", "count", "int");

        let mut init = BytecodeWriter::new();
        init.emit_pool(Opcode::GetStatic, field);
        init.emit_iconst(1);
        init.emit_opcode(Opcode::Iadd);
        init.emit_pool(Opcode::PutStatic, field);
        init.emit_opcode(Opcode::Return);
        class
            .methods
            .push(method(INITIALIZER, "()void", flags::STATIC, 0, init.into_bytes()));

        let mut read = BytecodeWriter::new();
        read.emit_pool(Opcode::GetStatic, field);
        read.emit_opcode(Opcode::Ireturn);
        class
            .methods
            .push(method("count", "()int", flags::STATIC, 0, read.into_bytes()));

        let mut interp = Interpreter::new();
        interp.load(class).unwrap();
        assert!(matches!(interp.invoke_static("Counter", "count", &[]).unwrap(), Value::Int(1)));
        assert!(matches!(interp.invoke_static("Counter", "count", &[]).unwrap(), Value::Int(1)));
    }

    #[test]
    fn test_dynamic_site_dispatches_builtins() {
        let mut class = ClassFile::new("Dyn");
        let site = class.add_call_site(CallSiteDescriptor::new("plus", 1, CallSiteKind::Method));
        let mut w = BytecodeWriter::new();
        w.emit_local(Opcode::Aload, 0);
        w.emit_local(Opcode::Aload, 1);
        w.emit_invoke_dynamic(site);
        w.emit_opcode(Opcode::Areturn);
        class
            .methods
            .push(method("plus", "(Object,Object)Object", flags::STATIC, 2, w.into_bytes()));

        let mut interp = Interpreter::new();
        interp.load(class).unwrap();
        let joined = interp
            .invoke_static("Dyn", "plus", &[Value::string("a"), Value::Int(1)])
            .unwrap();
        assert_eq!(joined.to_string(), "a1");
        let sum = interp.invoke_static("Dyn", "plus", &[Value::Int(1), Value::Int(2)]).unwrap();
        assert!(matches!(sum, Value::Int(3)));
        interp.invoke_static("Dyn", "plus", &[Value::Int(5), Value::Int(6)]).unwrap();
        let totals = interp.call_sites().totals();
        assert_eq!(totals.misses(), 2);
        assert_eq!(totals.hits(), 1);
    }

    #[test]
    fn test_recursion_limit() {
        let mut class = ClassFile::new("Loop");
        let target = class.constants.add_method("Loop", "spin", "()void");
        let mut w = BytecodeWriter::new();
        w.emit_pool(Opcode::InvokeStatic, target);
        w.emit_opcode(Opcode::Return);
        class
            .methods
            .push(method("spin", "()void", flags::STATIC, 0, w.into_bytes()));

        let mut interp = Interpreter::new().with_max_depth(16);
        interp.load(class).unwrap();
        let err = interp.invoke_static("Loop", "spin", &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::StackOverflow(16)));
    }

    #[test]
    fn test_verification_rejects_bad_code() {
        let mut class = ClassFile::new("Bad");
        let mut w = BytecodeWriter::new();
        w.emit_opcode(Opcode::Iadd);
        w.emit_opcode(Opcode::Return);
        class
            .methods
            .push(method("broken", "()void", flags::STATIC, 0, w.into_bytes()));
        let mut interp = Interpreter::new();
        assert!(matches!(interp.load(class), Err(RuntimeError::Verify(_))));
    }

    #[test]
    fn test_captured_output() {
        let output = CapturedOutput::new();
        let mut interp = Interpreter::new().with_output(output.clone());
        interp.write_output("hi").unwrap();
        assert_eq!(output.contents(), "hi");
    }
}
