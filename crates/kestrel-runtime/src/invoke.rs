//! Invoking resolved method targets

use crate::callsite::resolve_uncached;
use crate::metaclass::{Implementation, MethodTarget};
use crate::registry::MetaClassRegistry;
use crate::value::{Closure, Value};
use crate::{RuntimeError, RuntimeResult};

/// Execution services a method target may need
///
/// Native methods receive the invoker so they can call back into user
/// code, for example `Helpers.equals` dispatching a user-defined `equals`.
pub trait Invoker {
    /// Registry used for dispatch
    fn registry(&self) -> &MetaClassRegistry;

    /// Run a bytecode method with boxed arguments, returning a boxed result
    fn invoke_bytecode(&mut self, target: &MethodTarget, receiver: &Value, args: &[Value]) -> RuntimeResult<Value>;

    /// Call a closure with boxed arguments
    fn call_closure(&mut self, closure: &Closure, args: &[Value]) -> RuntimeResult<Value>;

    /// Program output
    fn write_output(&mut self, text: &str) -> RuntimeResult<()>;
}

/// Run `target` against `receiver`
pub fn invoke(
    invoker: &mut dyn Invoker,
    target: &MethodTarget,
    receiver: &Value,
    args: &[Value],
) -> RuntimeResult<Value> {
    match &target.implementation {
        Implementation::Native(body) => body(invoker, receiver, args),
        Implementation::Bytecode { .. } => invoker.invoke_bytecode(target, receiver, args),
        Implementation::MissingMethod(hook) => {
            let forwarded = [Value::string(&target.name), Value::list(args.to_vec())];
            invoke(invoker, hook, receiver, &forwarded)
        }
    }
}

/// Resolve `name` on `receiver` without a cache and invoke it
pub fn call_method(invoker: &mut dyn Invoker, receiver: &Value, name: &str, args: &[Value]) -> RuntimeResult<Value> {
    let target = resolve_uncached(invoker.registry(), receiver, name, args)?;
    invoke(invoker, &target, receiver, args)
}

/// Invoker for native-only contexts
///
/// Output is collected in memory. Bytecode methods and closures cannot run
/// without an interpreter.
pub struct NativeInvoker<'r> {
    registry: &'r MetaClassRegistry,
    output: String,
}

impl<'r> NativeInvoker<'r> {
    /// Invoker over `registry`
    pub fn new(registry: &'r MetaClassRegistry) -> Self {
        Self {
            registry,
            output: String::new(),
        }
    }

    /// Everything written so far
    pub fn output(&self) -> &str {
        &self.output
    }
}

impl Invoker for NativeInvoker<'_> {
    fn registry(&self) -> &MetaClassRegistry {
        self.registry
    }

    fn invoke_bytecode(&mut self, target: &MethodTarget, _receiver: &Value, _args: &[Value]) -> RuntimeResult<Value> {
        Err(RuntimeError::Unsupported(format!(
            "{}.{} needs an interpreter",
            target.owner, target.name
        )))
    }

    fn call_closure(&mut self, closure: &Closure, _args: &[Value]) -> RuntimeResult<Value> {
        Err(RuntimeError::Unsupported(format!(
            "closure {}.{} needs an interpreter",
            closure.owner, closure.method
        )))
    }

    fn write_output(&mut self, text: &str) -> RuntimeResult<()> {
        self.output.push_str(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metaclass::MetaClass;
    use std::sync::Arc;

    #[test]
    fn test_missing_method_receives_name_and_args() {
        let registry = MetaClassRegistry::with_builtins();
        let class = MetaClass::new("Ghost", Some("Object"));
        class.set_missing_method(Some(MethodTarget::native(
            "Ghost",
            "methodMissing",
            &["String", "Object"],
            "Object",
            |_, _, args| Ok(Value::string(&format!("{}:{}", args[0], args[1]))),
        )));
        registry.register(Arc::new(class));

        let mut invoker = NativeInvoker::new(&registry);
        let receiver = Value::Object(Arc::new(crate::value::Instance::new("Ghost", Default::default())));
        let result = call_method(&mut invoker, &receiver, "haunt", &[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(result.to_string(), "haunt:[1, 2]");
    }

    #[test]
    fn test_native_invoker_collects_output() {
        let registry = MetaClassRegistry::with_builtins();
        let mut invoker = NativeInvoker::new(&registry);
        call_method(&mut invoker, &Value::class("Console"), "println", &[Value::Int(42)]).unwrap();
        call_method(&mut invoker, &Value::class("Console"), "print", &[Value::string("x")]).unwrap();
        assert_eq!(invoker.output(), "42\nx");
    }

    #[test]
    fn test_bytecode_targets_need_an_interpreter() {
        let registry = MetaClassRegistry::new();
        let mut invoker = NativeInvoker::new(&registry);
        let descriptor = kestrel_bytecode::MethodDescriptor::parse("()void").unwrap();
        let target = MethodTarget::bytecode("Main", "run", &descriptor, true, 0);
        assert!(matches!(
            invoke(&mut invoker, &target, &Value::Null, &[]),
            Err(RuntimeError::Unsupported(_))
        ));
    }
}
