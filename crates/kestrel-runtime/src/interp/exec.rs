//! The instruction loop

use super::{Interpreter, LoadedClass, CONSTRUCTOR};
use crate::callsite::{resolve_uncached, SiteId};
use crate::decimal::BigDecimal;
use crate::field_site::PropertyMode;
use crate::invoke::{call_method, invoke, Invoker};
use crate::numeric;
use crate::range::ObjectRange;
use crate::value::{box_for, box_slot, default_boxed, unbox, unbox_for, ArrayValue, Closure, Value};
use crate::{RuntimeError, RuntimeResult};
use kestrel_bytecode::{CallSiteKind, Constant, Instruction, MemberRef, MethodDescriptor, Opcode, Operand};
use kestrel_types::{NumericKind, PrimitiveKind};
use num_bigint::BigInt;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::trace;

/// Operand stack and locals of one activation
struct Frame {
    stack: Vec<Value>,
    locals: Vec<Value>,
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> RuntimeResult<Value> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pop `count` values, oldest first
    fn pop_n(&mut self, count: usize) -> RuntimeResult<Vec<Value>> {
        if self.stack.len() < count {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn peek(&self) -> RuntimeResult<&Value> {
        self.stack.last().ok_or(RuntimeError::StackUnderflow)
    }

    fn pop_int(&mut self) -> RuntimeResult<i32> {
        Ok(int_of(&self.pop()?))
    }

    fn pop_long(&mut self) -> RuntimeResult<i64> {
        Ok(long_of(&self.pop()?))
    }

    fn pop_float(&mut self) -> RuntimeResult<f32> {
        Ok(double_of(&self.pop()?) as f32)
    }

    fn pop_double(&mut self) -> RuntimeResult<f64> {
        Ok(double_of(&self.pop()?))
    }

    fn load(&self, slot: u16) -> RuntimeResult<Value> {
        self.locals
            .get(usize::from(slot))
            .cloned()
            .ok_or_else(|| RuntimeError::InvalidBytecode(format!("local {} out of range", slot)))
    }

    fn store(&mut self, slot: u16, value: Value) {
        let slot = usize::from(slot);
        if slot >= self.locals.len() {
            self.locals.resize(slot + 1, Value::Null);
        }
        self.locals[slot] = value;
    }
}

fn int_of(value: &Value) -> i32 {
    match value {
        Value::Int(v) => *v,
        Value::Boolean(b) => i32::from(*b),
        Value::Char(c) => *c as i32,
        Value::Byte(v) => i32::from(*v),
        Value::Short(v) => i32::from(*v),
        Value::Ref(cell) => int_of(&cell.lock()),
        other => numeric::as_i64_wrapping(other) as i32,
    }
}

fn long_of(value: &Value) -> i64 {
    match value {
        Value::Long(v) => *v,
        other => i64::from(int_of(other)),
    }
}

fn double_of(value: &Value) -> f64 {
    match value {
        Value::Float(v) => f64::from(*v),
        Value::Double(v) => *v,
        Value::Long(v) => *v as f64,
        other => numeric::as_f64(other).unwrap_or_else(|| f64::from(int_of(other))),
    }
}

fn division_by_zero() -> RuntimeError {
    RuntimeError::Arithmetic("Division by zero".to_string())
}

fn int_op(frame: &mut Frame, op: impl FnOnce(i32, i32) -> RuntimeResult<i32>) -> RuntimeResult<()> {
    let b = frame.pop_int()?;
    let a = frame.pop_int()?;
    frame.push(Value::Int(op(a, b)?));
    Ok(())
}

fn long_op(frame: &mut Frame, op: impl FnOnce(i64, i64) -> RuntimeResult<i64>) -> RuntimeResult<()> {
    let b = frame.pop_long()?;
    let a = frame.pop_long()?;
    frame.push(Value::Long(op(a, b)?));
    Ok(())
}

fn float_op(frame: &mut Frame, op: impl FnOnce(f32, f32) -> f32) -> RuntimeResult<()> {
    let b = frame.pop_float()?;
    let a = frame.pop_float()?;
    frame.push(Value::Float(op(a, b)));
    Ok(())
}

fn double_op(frame: &mut Frame, op: impl FnOnce(f64, f64) -> f64) -> RuntimeResult<()> {
    let b = frame.pop_double()?;
    let a = frame.pop_double()?;
    frame.push(Value::Double(op(a, b)));
    Ok(())
}

/// -1, 0 or 1; unordered operands give -1
fn ordering_int(ordering: Option<Ordering>) -> Value {
    Value::Int(ordering.map_or(-1, |o| o as i32))
}

/// Array operand of an array instruction
fn array_ref(value: Value, member: &str) -> RuntimeResult<Arc<ArrayValue>> {
    match value {
        Value::Array(array) => Ok(array),
        Value::Null => Err(RuntimeError::NullPointer(format!("Cannot {} of a null array", member))),
        other => Err(other.cast_error("array")),
    }
}

fn signature(member: &MemberRef) -> RuntimeResult<MethodDescriptor> {
    MethodDescriptor::parse(&member.descriptor)
        .ok_or_else(|| RuntimeError::InvalidBytecode(format!("bad descriptor {}", member.descriptor)))
}

/// Box slot arguments per the parameter types of `descriptor`
fn box_args(args: Vec<Value>, descriptor: &MethodDescriptor) -> RuntimeResult<Vec<Value>> {
    args.into_iter()
        .zip(&descriptor.params)
        .map(|(arg, param)| box_for(arg, param))
        .collect()
}

fn bad_constant(index: u32) -> RuntimeError {
    RuntimeError::InvalidBytecode(format!("bad constant #{}", index))
}

fn primitive_tag(tag: u8) -> RuntimeResult<PrimitiveKind> {
    PrimitiveKind::from_tag(tag).ok_or_else(|| RuntimeError::InvalidBytecode(format!("bad primitive tag {}", tag)))
}

impl Interpreter {
    /// Run method `index` of `class` with prepared locals
    pub(super) fn execute(
        &mut self,
        class: Arc<LoadedClass>,
        index: usize,
        locals: Vec<Value>,
    ) -> RuntimeResult<Option<Value>> {
        let info = class.method(index)?;
        let decoded = &class.methods[index];
        trace!(class = %class.name(), method = %info.name, "enter");
        let mut frame = Frame {
            stack: Vec::with_capacity(usize::from(info.max_stack)),
            locals,
        };
        let mut pc = 0;

        while let Some(&instr) = decoded.code.get(pc) {
            pc += 1;
            let Instruction { opcode, operand, .. } = instr;
            match opcode {
                Opcode::Nop => {}
                Opcode::AconstNull => frame.push(Value::Null),
                Opcode::Iconst | Opcode::Lconst | Opcode::Fconst | Opcode::Dconst => {
                    frame.push(match operand {
                        Operand::I32(v) => Value::Int(v),
                        Operand::I64(v) => Value::Long(v),
                        Operand::F32(v) => Value::Float(v),
                        Operand::F64(v) => Value::Double(v),
                        _ => return Err(RuntimeError::InvalidBytecode(format!("bad operand for {}", opcode))),
                    });
                }
                Opcode::Ldc => {
                    let index = pool(operand)?;
                    let value = match class.file.constants.get(index) {
                        Some(Constant::Utf8(text)) => Value::string(text),
                        Some(Constant::BigInteger(digits)) => {
                            Value::big_integer(digits.parse::<BigInt>().map_err(|_| bad_constant(index))?)
                        }
                        Some(Constant::BigDecimal(plain)) => {
                            Value::big_decimal(BigDecimal::parse(plain).ok_or_else(|| bad_constant(index))?)
                        }
                        Some(Constant::Class(name)) => Value::class(name),
                        _ => return Err(bad_constant(index)),
                    };
                    frame.push(value);
                }

                Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload => {
                    let value = frame.load(local(operand)?)?;
                    frame.push(value);
                }
                Opcode::Istore | Opcode::Lstore | Opcode::Fstore | Opcode::Dstore | Opcode::Astore => {
                    let value = frame.pop()?;
                    frame.store(local(operand)?, value);
                }
                Opcode::Iinc => {
                    let Operand::Iinc { slot, delta } = operand else {
                        return Err(RuntimeError::InvalidBytecode("bad IINC operand".to_string()));
                    };
                    let current = int_of(&frame.load(slot)?);
                    frame.store(slot, Value::Int(current.wrapping_add(i32::from(delta))));
                }

                Opcode::Iaload
                | Opcode::Laload
                | Opcode::Faload
                | Opcode::Daload
                | Opcode::Baload
                | Opcode::Zaload
                | Opcode::Caload
                | Opcode::Saload
                | Opcode::Aaload => {
                    let at = frame.pop_int()?;
                    let array = array_ref(frame.pop()?, "load an element")?;
                    frame.push(array.get(i64::from(at))?);
                }
                Opcode::Iastore
                | Opcode::Lastore
                | Opcode::Fastore
                | Opcode::Dastore
                | Opcode::Bastore
                | Opcode::Zastore
                | Opcode::Castore
                | Opcode::Sastore
                | Opcode::Aastore => {
                    let value = frame.pop()?;
                    let at = frame.pop_int()?;
                    let array = array_ref(frame.pop()?, "store an element")?;
                    array.set_boxed(i64::from(at), value)?;
                }
                Opcode::ArrayLength => {
                    let array = array_ref(frame.pop()?, "read the length")?;
                    frame.push(Value::Int(i32::try_from(array.len()).unwrap_or(i32::MAX)));
                }
                Opcode::NewArray => {
                    let component = self.class_constant(&class, operand)?;
                    let length = frame.pop_int()?;
                    let length = usize::try_from(length)
                        .map_err(|_| RuntimeError::IllegalArgument(format!("negative array size {}", length)))?;
                    frame.push(Value::Array(Arc::new(ArrayValue::new(component, length))));
                }

                Opcode::Iadd => int_op(&mut frame, |a, b| Ok(a.wrapping_add(b)))?,
                Opcode::Isub => int_op(&mut frame, |a, b| Ok(a.wrapping_sub(b)))?,
                Opcode::Imul => int_op(&mut frame, |a, b| Ok(a.wrapping_mul(b)))?,
                Opcode::Idiv => int_op(&mut frame, |a, b| {
                    if b == 0 {
                        Err(division_by_zero())
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                Opcode::Irem => int_op(&mut frame, |a, b| {
                    if b == 0 {
                        Err(division_by_zero())
                    } else {
                        Ok(a.wrapping_rem(b))
                    }
                })?,
                Opcode::Ineg => {
                    let v = frame.pop_int()?;
                    frame.push(Value::Int(v.wrapping_neg()));
                }
                Opcode::Ladd => long_op(&mut frame, |a, b| Ok(a.wrapping_add(b)))?,
                Opcode::Lsub => long_op(&mut frame, |a, b| Ok(a.wrapping_sub(b)))?,
                Opcode::Lmul => long_op(&mut frame, |a, b| Ok(a.wrapping_mul(b)))?,
                Opcode::Ldiv => long_op(&mut frame, |a, b| {
                    if b == 0 {
                        Err(division_by_zero())
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,
                Opcode::Lrem => long_op(&mut frame, |a, b| {
                    if b == 0 {
                        Err(division_by_zero())
                    } else {
                        Ok(a.wrapping_rem(b))
                    }
                })?,
                Opcode::Lneg => {
                    let v = frame.pop_long()?;
                    frame.push(Value::Long(v.wrapping_neg()));
                }
                Opcode::Fadd => float_op(&mut frame, |a, b| a + b)?,
                Opcode::Fsub => float_op(&mut frame, |a, b| a - b)?,
                Opcode::Fmul => float_op(&mut frame, |a, b| a * b)?,
                Opcode::Fdiv => float_op(&mut frame, |a, b| a / b)?,
                Opcode::Frem => float_op(&mut frame, |a, b| a % b)?,
                Opcode::Fneg => {
                    let v = frame.pop_float()?;
                    frame.push(Value::Float(-v));
                }
                Opcode::Dadd => double_op(&mut frame, |a, b| a + b)?,
                Opcode::Dsub => double_op(&mut frame, |a, b| a - b)?,
                Opcode::Dmul => double_op(&mut frame, |a, b| a * b)?,
                Opcode::Ddiv => double_op(&mut frame, |a, b| a / b)?,
                Opcode::Drem => double_op(&mut frame, |a, b| a % b)?,
                Opcode::Dneg => {
                    let v = frame.pop_double()?;
                    frame.push(Value::Double(-v));
                }

                Opcode::I2l => {
                    let v = frame.pop_int()?;
                    frame.push(Value::Long(i64::from(v)));
                }
                Opcode::I2f => {
                    let v = frame.pop_int()?;
                    frame.push(Value::Float(v as f32));
                }
                Opcode::I2d => {
                    let v = frame.pop_int()?;
                    frame.push(Value::Double(f64::from(v)));
                }
                Opcode::L2i => {
                    let v = frame.pop_long()?;
                    frame.push(Value::Int(v as i32));
                }
                Opcode::L2f => {
                    let v = frame.pop_long()?;
                    frame.push(Value::Float(v as f32));
                }
                Opcode::L2d => {
                    let v = frame.pop_long()?;
                    frame.push(Value::Double(v as f64));
                }
                Opcode::F2i | Opcode::D2i => {
                    let v = frame.pop_double()?;
                    frame.push(Value::Int(v as i32));
                }
                Opcode::F2l | Opcode::D2l => {
                    let v = frame.pop_double()?;
                    frame.push(Value::Long(v as i64));
                }
                Opcode::F2d => {
                    let v = frame.pop_float()?;
                    frame.push(Value::Double(f64::from(v)));
                }
                Opcode::D2f => {
                    let v = frame.pop_double()?;
                    frame.push(Value::Float(v as f32));
                }
                Opcode::I2b => {
                    let v = frame.pop_int()?;
                    frame.push(Value::Int(i32::from(v as i8)));
                }
                Opcode::I2c => {
                    let v = frame.pop_int()?;
                    frame.push(Value::Int((v as u32 & 0x1F_FFFF) as i32));
                }
                Opcode::I2s => {
                    let v = frame.pop_int()?;
                    frame.push(Value::Int(i32::from(v as i16)));
                }
                Opcode::ToNumeric => {
                    let kind = NumericKind::from_tag(tag(operand)?)
                        .ok_or_else(|| RuntimeError::InvalidBytecode("bad numeric tag".to_string()))?;
                    let converted = numeric::convert(&frame.pop()?, kind)?;
                    frame.push(match kind.primitive() {
                        Some(primitive) => unbox(converted, primitive)?,
                        None => converted,
                    });
                }

                Opcode::Lcmp => {
                    let b = frame.pop_long()?;
                    let a = frame.pop_long()?;
                    frame.push(ordering_int(Some(a.cmp(&b))));
                }
                Opcode::Fcmpl => {
                    let b = frame.pop_float()?;
                    let a = frame.pop_float()?;
                    frame.push(ordering_int(a.partial_cmp(&b)));
                }
                Opcode::Dcmpl => {
                    let b = frame.pop_double()?;
                    let a = frame.pop_double()?;
                    frame.push(ordering_int(a.partial_cmp(&b)));
                }
                Opcode::IfEq | Opcode::IfNe | Opcode::IfLt | Opcode::IfGe | Opcode::IfGt | Opcode::IfLe => {
                    let v = frame.pop_int()?;
                    let taken = match opcode {
                        Opcode::IfEq => v == 0,
                        Opcode::IfNe => v != 0,
                        Opcode::IfLt => v < 0,
                        Opcode::IfGe => v >= 0,
                        Opcode::IfGt => v > 0,
                        _ => v <= 0,
                    };
                    if taken {
                        pc = jump(decoded, operand)?;
                    }
                }
                Opcode::IfIcmpEq
                | Opcode::IfIcmpNe
                | Opcode::IfIcmpLt
                | Opcode::IfIcmpGe
                | Opcode::IfIcmpGt
                | Opcode::IfIcmpLe => {
                    let b = frame.pop_int()?;
                    let a = frame.pop_int()?;
                    let taken = match opcode {
                        Opcode::IfIcmpEq => a == b,
                        Opcode::IfIcmpNe => a != b,
                        Opcode::IfIcmpLt => a < b,
                        Opcode::IfIcmpGe => a >= b,
                        Opcode::IfIcmpGt => a > b,
                        _ => a <= b,
                    };
                    if taken {
                        pc = jump(decoded, operand)?;
                    }
                }
                Opcode::IfNull | Opcode::IfNonNull => {
                    let is_null = frame.pop()?.is_null();
                    if is_null == (opcode == Opcode::IfNull) {
                        pc = jump(decoded, operand)?;
                    }
                }
                Opcode::Goto => pc = jump(decoded, operand)?,

                Opcode::Dup => {
                    let top = frame.peek()?.clone();
                    frame.push(top);
                }
                Opcode::Pop => {
                    frame.pop()?;
                }
                Opcode::Swap => {
                    let b = frame.pop()?;
                    let a = frame.pop()?;
                    frame.push(b);
                    frame.push(a);
                }

                Opcode::New => {
                    let name = self.class_constant(&class, operand)?;
                    let instance = self.allocate(&name)?;
                    frame.push(instance);
                }
                Opcode::GetField => {
                    let field = self.field_constant(&class, operand)?;
                    let value = match frame.pop()? {
                        Value::Object(instance) => instance
                            .get(&field.name)
                            .unwrap_or_else(|| default_boxed(&field.descriptor)),
                        Value::Null => {
                            return Err(RuntimeError::NullPointer(format!("Cannot read field {} of null", field.name)))
                        }
                        other => {
                            return Err(RuntimeError::NoSuchProperty {
                                receiver: other.class_name().to_string(),
                                property: field.name,
                            })
                        }
                    };
                    frame.push(unbox_for(value, &field.descriptor)?);
                }
                Opcode::PutField => {
                    let field = self.field_constant(&class, operand)?;
                    let value = box_for(frame.pop()?, &field.descriptor)?;
                    match frame.pop()? {
                        Value::Object(instance) => instance.set(&field.name, value),
                        Value::Null => {
                            return Err(RuntimeError::NullPointer(format!("Cannot set field {} of null", field.name)))
                        }
                        other => {
                            return Err(RuntimeError::NoSuchProperty {
                                receiver: other.class_name().to_string(),
                                property: field.name,
                            })
                        }
                    }
                }
                Opcode::GetStatic => {
                    let field = self.field_constant(&class, operand)?;
                    let owner = self.static_owner(&field)?;
                    let value = owner
                        .get_static(&field.name)
                        .unwrap_or_else(|| default_boxed(&field.descriptor));
                    frame.push(unbox_for(value, &field.descriptor)?);
                }
                Opcode::PutStatic => {
                    let field = self.field_constant(&class, operand)?;
                    let value = box_for(frame.pop()?, &field.descriptor)?;
                    let owner = self.static_owner(&field)?;
                    owner.set_static(&field.name, value);
                }
                Opcode::CheckCast => {
                    let target = self.class_constant(&class, operand)?;
                    let top = frame.peek()?;
                    if !top.is_null() && !self.registry.is_instance(top, &target) {
                        return Err(top.cast_error(&target));
                    }
                }

                Opcode::InvokeVirtual | Opcode::InvokeInterface | Opcode::InvokeStatic | Opcode::InvokeSpecial => {
                    let member = self.method_constant(&class, operand)?;
                    let descriptor = signature(&member)?;
                    let args = box_args(frame.pop_n(descriptor.arity())?, &descriptor)?;
                    let result = match opcode {
                        Opcode::InvokeStatic => self.invoke_static_ref(&member, &descriptor, &args)?,
                        Opcode::InvokeSpecial => {
                            let receiver = frame.pop()?;
                            self.invoke_special(&member, receiver, &args)?
                        }
                        _ => {
                            let receiver = frame.pop()?;
                            self.invoke_virtual(&member, receiver, &args)?
                        }
                    };
                    if !descriptor.is_void() {
                        frame.push(unbox_for(result, &descriptor.return_type)?);
                    }
                }
                Opcode::InvokeDynamic => {
                    let Operand::Site(site) = operand else {
                        return Err(RuntimeError::InvalidBytecode("bad INVOKEDYNAMIC operand".to_string()));
                    };
                    let descriptor = class
                        .file
                        .call_sites
                        .get(site as usize)
                        .ok_or_else(|| RuntimeError::InvalidBytecode(format!("no call site @{}", site)))?
                        .clone();
                    let id = SiteId {
                        class: class.name().to_string(),
                        index: site,
                    };
                    let arity = usize::from(descriptor.arg_count);
                    match descriptor.kind {
                        CallSiteKind::Method => {
                            let args = frame.pop_n(arity)?;
                            let receiver = frame.pop()?;
                            self.prepare_receiver(&receiver)?;
                            let site = self.sites.site(id, &descriptor.name, arity);
                            let registry = Arc::clone(&self.registry);
                            let target = site.resolve(&registry, &receiver, &args)?;
                            let result = invoke(self, &target, &receiver, &args)?;
                            frame.push(result);
                        }
                        CallSiteKind::Call => {
                            let args = frame.pop_n(arity)?;
                            let callee = frame.pop()?;
                            let result = match &callee {
                                Value::Closure(closure) => self.call_closure(closure, &args)?,
                                Value::Null => {
                                    return Err(RuntimeError::NullReceiver {
                                        member: descriptor.name.clone(),
                                    })
                                }
                                _ => call_method(self, &callee, "call", &args)?,
                            };
                            frame.push(result);
                        }
                        CallSiteKind::GetProperty => {
                            let receiver = frame.pop()?;
                            self.prepare_receiver(&receiver)?;
                            let site = self.property_site(id, &descriptor.name, PropertyMode::Get);
                            let value = site.get(self, &receiver)?;
                            frame.push(value);
                        }
                        CallSiteKind::SetProperty => {
                            let value = frame.pop()?;
                            let receiver = frame.pop()?;
                            self.prepare_receiver(&receiver)?;
                            let site = self.property_site(id, &descriptor.name, PropertyMode::Set);
                            site.set(self, &receiver, value)?;
                        }
                        CallSiteKind::Constructor => {
                            let args = frame.pop_n(arity)?;
                            let instance = self.construct(&descriptor.name, &args)?;
                            frame.push(instance);
                        }
                    }
                }

                Opcode::Box => {
                    let kind = primitive_tag(tag(operand)?)?;
                    let value = box_slot(frame.pop()?, kind)?;
                    frame.push(value);
                }
                Opcode::Unbox => {
                    let kind = primitive_tag(tag(operand)?)?;
                    let value = unbox(frame.pop()?, kind)?;
                    frame.push(value);
                }
                Opcode::Truthy => {
                    let truthy = frame.pop()?.is_truthy();
                    frame.push(Value::Int(i32::from(truthy)));
                }
                Opcode::NewList => {
                    let Operand::Count(count) = operand else {
                        return Err(RuntimeError::InvalidBytecode("bad NEWLIST operand".to_string()));
                    };
                    let values = frame.pop_n(usize::from(count))?;
                    frame.push(Value::list(values));
                }
                Opcode::NewRange => {
                    let to = frame.pop()?;
                    let from = frame.pop()?;
                    let range = if tag(operand)? == 1 {
                        ObjectRange::exclusive(from, to)?
                    } else {
                        ObjectRange::new(from, to)?
                    };
                    frame.push(Value::Range(Arc::new(range)));
                }
                Opcode::MakeClosure => {
                    let Operand::Closure { method, captures } = operand else {
                        return Err(RuntimeError::InvalidBytecode("bad MAKECLOSURE operand".to_string()));
                    };
                    let target = class.file.constants.method(method).ok_or_else(|| bad_constant(method))?;
                    let captures = frame.pop_n(usize::from(captures))?;
                    let this = frame.pop()?;
                    frame.push(Value::Closure(Arc::new(Closure {
                        owner: target.class.clone(),
                        method: target.name.clone(),
                        descriptor: target.descriptor.clone(),
                        this,
                        captures,
                    })));
                }
                Opcode::NewRef => {
                    let value = frame.pop()?;
                    frame.push(Value::Ref(Arc::new(Mutex::new(value))));
                }
                Opcode::RefGet => match frame.pop()? {
                    Value::Ref(cell) => {
                        let value = cell.lock().clone();
                        frame.push(value);
                    }
                    other => return Err(RuntimeError::InvalidBytecode(format!("REFGET on {}", other.type_name()))),
                },
                Opcode::RefSet => {
                    let value = frame.pop()?;
                    match frame.pop()? {
                        Value::Ref(cell) => *cell.lock() = value,
                        other => {
                            return Err(RuntimeError::InvalidBytecode(format!("REFSET on {}", other.type_name())))
                        }
                    }
                }

                Opcode::Ireturn | Opcode::Lreturn | Opcode::Freturn | Opcode::Dreturn | Opcode::Areturn => {
                    return frame.pop().map(Some);
                }
                Opcode::Return => return Ok(None),
            }
        }
        Ok(None)
    }

    fn class_constant(&self, class: &LoadedClass, operand: Operand) -> RuntimeResult<String> {
        let index = pool(operand)?;
        class
            .file
            .constants
            .class_name(index)
            .map(str::to_string)
            .ok_or_else(|| bad_constant(index))
    }

    fn field_constant(&self, class: &LoadedClass, operand: Operand) -> RuntimeResult<MemberRef> {
        let index = pool(operand)?;
        class.file.constants.field(index).cloned().ok_or_else(|| bad_constant(index))
    }

    fn method_constant(&self, class: &LoadedClass, operand: Operand) -> RuntimeResult<MemberRef> {
        let index = pool(operand)?;
        class.file.constants.method(index).cloned().ok_or_else(|| bad_constant(index))
    }

    /// Metaclass declaring static field `field`, searching superclasses
    fn static_owner(&mut self, field: &MemberRef) -> RuntimeResult<Arc<crate::metaclass::MetaClass>> {
        self.ensure_initialized(&field.class)?;
        let class = self.registry.require(&field.class)?;
        self.registry
            .superclass_chain(&class)
            .into_iter()
            .find(|meta| meta.field(&field.name).is_some_and(|slot| slot.is_static))
            .ok_or_else(|| RuntimeError::NoSuchProperty {
                receiver: field.class.clone(),
                property: field.name.clone(),
            })
    }

    fn invoke_static_ref(
        &mut self,
        member: &MemberRef,
        descriptor: &MethodDescriptor,
        args: &[Value],
    ) -> RuntimeResult<Value> {
        self.ensure_initialized(&member.class)?;
        if let Some((owner, index)) = self.find_static(&member.class, &member.name, &member.descriptor) {
            return self.call_loaded(&owner, index, None, args);
        }
        let receiver = Value::class(&member.class);
        let target = resolve_uncached(&self.registry, &receiver, &member.name, args)?;
        trace!(class = %member.class, method = %member.name, arity = descriptor.arity(), "static call via registry");
        invoke(self, &target, &receiver, args)
    }

    fn invoke_virtual(&mut self, member: &MemberRef, receiver: Value, args: &[Value]) -> RuntimeResult<Value> {
        if receiver.is_null() {
            return Err(RuntimeError::NullReceiver {
                member: member.name.clone(),
            });
        }
        if let Value::Object(instance) = &receiver {
            if let Some((owner, index)) = self.find_virtual(instance.class(), &member.name, &member.descriptor, args.len()) {
                return self.call_loaded(&owner, index, Some(receiver.clone()), args);
            }
        }
        call_method(self, &receiver, &member.name, args)
    }

    /// Non-virtual call: constructors, super calls and private methods
    fn invoke_special(&mut self, member: &MemberRef, receiver: Value, args: &[Value]) -> RuntimeResult<Value> {
        if receiver.is_null() {
            return Err(RuntimeError::NullReceiver {
                member: member.name.clone(),
            });
        }
        if let Some(owner) = self.class(&member.class) {
            if let Some(index) = owner.file.find_method(&member.name, &member.descriptor) {
                return self.call_loaded(&owner, index, Some(receiver), args);
            }
        }
        if member.name == CONSTRUCTOR {
            return Ok(Value::Null);
        }
        let class = self.registry.require(&member.class)?;
        let target = self
            .registry
            .superclass_chain(&class)
            .iter()
            .find_map(|meta| meta.select(&self.registry, &member.name, args, false))
            .ok_or_else(|| RuntimeError::NoSuchMethod {
                receiver: member.class.clone(),
                method: member.name.clone(),
                args: args.iter().map(Value::type_name).collect::<Vec<_>>().join(", "),
            })?;
        invoke(self, &target, &receiver, args)
    }
}

fn pool(operand: Operand) -> RuntimeResult<u32> {
    match operand {
        Operand::Pool(index) => Ok(index),
        other => Err(RuntimeError::InvalidBytecode(format!("expected a pool operand, got {:?}", other))),
    }
}

fn local(operand: Operand) -> RuntimeResult<u16> {
    match operand {
        Operand::Local(slot) => Ok(slot),
        other => Err(RuntimeError::InvalidBytecode(format!("expected a local operand, got {:?}", other))),
    }
}

fn tag(operand: Operand) -> RuntimeResult<u8> {
    match operand {
        Operand::Tag(tag) => Ok(tag),
        other => Err(RuntimeError::InvalidBytecode(format!("expected a tag operand, got {:?}", other))),
    }
}

fn jump(decoded: &super::DecodedMethod, operand: Operand) -> RuntimeResult<usize> {
    let Operand::Branch(target) = operand else {
        return Err(RuntimeError::InvalidBytecode("expected a branch operand".to_string()));
    };
    decoded
        .index_of
        .get(&target)
        .copied()
        .ok_or_else(|| RuntimeError::InvalidBytecode(format!("branch to {} is not an instruction", target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_bytecode::{flags, BytecodeWriter, ClassFile, MethodInfo};

    fn run(descriptor: &str, max_locals: u16, args: &[Value], build: impl FnOnce(&mut BytecodeWriter, &mut ClassFile)) -> RuntimeResult<Value> {
        let mut class = ClassFile::new("T");
        let mut w = BytecodeWriter::new();
        build(&mut w, &mut class);
        class.methods.push(MethodInfo {
            name: "f".to_string(),
            descriptor: descriptor.to_string(),
            flags: flags::STATIC,
            max_locals,
            max_stack: 8,
            code: w.into_bytes(),
        });
        let mut interp = Interpreter::new().without_verification();
        interp.load(class)?;
        interp.invoke_static("T", "f", args)
    }

    #[test]
    fn test_int_arithmetic_wraps() {
        let result = run("()int", 0, &[], |w, _| {
            w.emit_iconst(i32::MAX);
            w.emit_iconst(1);
            w.emit_opcode(Opcode::Iadd);
            w.emit_opcode(Opcode::Ireturn);
        })
        .unwrap();
        assert!(matches!(result, Value::Int(i32::MIN)));
    }

    #[test]
    fn test_division_by_zero() {
        let err = run("()int", 0, &[], |w, _| {
            w.emit_iconst(1);
            w.emit_iconst(0);
            w.emit_opcode(Opcode::Idiv);
            w.emit_opcode(Opcode::Ireturn);
        })
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Arithmetic(_)));
    }

    #[test]
    fn test_loop_sums_to_ten() {
        // int s = 0; for (int i = 1; i <= 4; i++) s += i; return s
        let result = run("()int", 2, &[], |w, _| {
            w.emit_iconst(0);
            w.emit_local(Opcode::Istore, 0);
            w.emit_iconst(1);
            w.emit_local(Opcode::Istore, 1);
            let top = w.offset();
            w.emit_local(Opcode::Iload, 1);
            w.emit_iconst(4);
            let exit = w.emit_branch(Opcode::IfIcmpGt);
            w.emit_local(Opcode::Iload, 0);
            w.emit_local(Opcode::Iload, 1);
            w.emit_opcode(Opcode::Iadd);
            w.emit_local(Opcode::Istore, 0);
            w.emit_iinc(1, 1);
            let back = w.emit_branch(Opcode::Goto);
            w.patch_branch(back, top);
            let end = w.offset();
            w.patch_branch(exit, end);
            w.emit_local(Opcode::Iload, 0);
            w.emit_opcode(Opcode::Ireturn);
        })
        .unwrap();
        assert!(matches!(result, Value::Int(10)));
    }

    #[test]
    fn test_nan_compares_as_less() {
        let result = run("()int", 0, &[], |w, _| {
            w.emit_dconst(f64::NAN);
            w.emit_dconst(1.0);
            w.emit_opcode(Opcode::Dcmpl);
            w.emit_opcode(Opcode::Ireturn);
        })
        .unwrap();
        assert!(matches!(result, Value::Int(-1)));
    }

    #[test]
    fn test_narrowing_conversions() {
        let result = run("()int", 0, &[], |w, _| {
            w.emit_iconst(300);
            w.emit_opcode(Opcode::I2b);
            w.emit_opcode(Opcode::Ireturn);
        })
        .unwrap();
        assert!(matches!(result, Value::Int(44)));
        let result = run("()char", 0, &[], |w, _| {
            w.emit_iconst(65);
            w.emit_opcode(Opcode::I2c);
            w.emit_opcode(Opcode::Ireturn);
        })
        .unwrap();
        assert!(matches!(result, Value::Char('A')));
    }

    #[test]
    fn test_check_cast_failure() {
        let err = run("()Object", 0, &[], |w, class| {
            let text = class.constants.add_string("x");
            let target = class.constants.add_class("Integer");
            w.emit_pool(Opcode::Ldc, text);
            w.emit_pool(Opcode::CheckCast, target);
            w.emit_opcode(Opcode::Areturn);
        })
        .unwrap_err();
        assert!(matches!(err, RuntimeError::ClassCast { .. }));
    }

    #[test]
    fn test_ref_cells_share_updates() {
        let result = run("()Object", 1, &[], |w, _| {
            w.emit_iconst(1);
            w.emit_opcode(Opcode::NewRef);
            w.emit_local(Opcode::Astore, 0);
            w.emit_local(Opcode::Aload, 0);
            w.emit_iconst(5);
            w.emit_opcode(Opcode::RefSet);
            w.emit_local(Opcode::Aload, 0);
            w.emit_opcode(Opcode::RefGet);
            w.emit_opcode(Opcode::Areturn);
        })
        .unwrap();
        assert!(matches!(result, Value::Int(5)));
    }

    #[test]
    fn test_exclusive_range_and_list() {
        let result = run("()Object", 0, &[], |w, _| {
            w.emit_iconst(1);
            w.emit_iconst(4);
            w.emit_tag(Opcode::NewRange, 1);
            w.emit_iconst(9);
            w.emit_count(Opcode::NewList, 2);
            w.emit_opcode(Opcode::Areturn);
        })
        .unwrap();
        assert_eq!(result.to_string(), "[1..3, 9]");
    }
}
