//! Integration tests for class files: build, encode, decode, verify

use kestrel_bytecode::{
    decode_instructions, disassemble, flags, verify_class, CallSiteDescriptor, CallSiteKind,
    ClassFile, ClassFileError, ClassMode, BytecodeWriter, MethodInfo, Opcode, Operand,
    VerifyError,
};

/// `static int sum(int[] xs)` using the indexed loop shape the emitter produces
fn sum_method() -> MethodInfo {
    let mut w = BytecodeWriter::new();
    // total = 0
    w.emit_iconst(0);
    w.emit_local(Opcode::Istore, 1);
    // arr = xs; if arr == null goto exit
    w.emit_local(Opcode::Aload, 0);
    w.emit_local(Opcode::Astore, 2);
    w.emit_local(Opcode::Aload, 2);
    let null_exit = w.emit_branch(Opcode::IfNull);
    // len = arr.length; i = 0
    w.emit_local(Opcode::Aload, 2);
    w.emit_opcode(Opcode::ArrayLength);
    w.emit_local(Opcode::Istore, 3);
    w.emit_iconst(0);
    w.emit_local(Opcode::Istore, 4);
    let head = w.offset();
    w.emit_local(Opcode::Iload, 4);
    w.emit_local(Opcode::Iload, 3);
    let done = w.emit_branch(Opcode::IfIcmpGe);
    w.emit_local(Opcode::Iload, 1);
    w.emit_local(Opcode::Aload, 2);
    w.emit_local(Opcode::Iload, 4);
    w.emit_opcode(Opcode::Iaload);
    w.emit_opcode(Opcode::Iadd);
    w.emit_local(Opcode::Istore, 1);
    w.emit_iinc(4, 1);
    let back = w.emit_branch(Opcode::Goto);
    w.patch_branch(back, head);
    let exit = w.offset();
    w.patch_branch(null_exit, exit);
    w.patch_branch(done, exit);
    w.emit_local(Opcode::Iload, 1);
    w.emit_opcode(Opcode::Ireturn);

    MethodInfo {
        name: "sum".to_string(),
        descriptor: "(int[])int".to_string(),
        flags: flags::STATIC,
        max_locals: 5,
        max_stack: 3,
        code: w.into_bytes(),
    }
}

#[test]
fn test_indexed_loop_verifies_after_decode() {
    let mut class = ClassFile::new("Sums");
    class.mode = ClassMode::Static;
    let method = sum_method();
    class.methods.push(method);

    let bytes = class.encode();
    let decoded = ClassFile::decode(&bytes).unwrap();
    verify_class(&decoded).unwrap();

    let text = disassemble(&decoded.methods[0].code).unwrap();
    assert!(text.contains("IALOAD"));
    assert!(text.contains("IINC 4 1"));
}

#[test]
fn test_backward_branch_resolves_to_loop_head() {
    let method = sum_method();
    let instructions = decode_instructions(&method.code).unwrap();
    let goto = instructions
        .iter()
        .find(|i| i.opcode == Opcode::Goto)
        .unwrap();
    let head = goto.branch_target().unwrap();
    assert!(head < goto.offset);
    let at_head = instructions.iter().find(|i| i.offset == head).unwrap();
    assert_eq!(at_head.operand, Operand::Local(4));
}

#[test]
fn test_corrupted_method_code_is_rejected() {
    let mut class = ClassFile::new("Sums");
    let method = sum_method();
    class.methods.push(method);
    let mut bytes = class.encode();
    let last = bytes.len() - 1;
    bytes[last] = 0xEE;
    assert!(matches!(
        ClassFile::decode(&bytes),
        Err(ClassFileError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_dynamic_site_arity_must_match_stack() {
    let mut class = ClassFile::new("Dyn");
    let site = class.add_call_site(CallSiteDescriptor::new("plus", 1, CallSiteKind::Method));
    let mut w = BytecodeWriter::new();
    // Only the receiver is pushed; the site needs receiver plus one argument
    w.emit_local(Opcode::Aload, 0);
    w.emit_invoke_dynamic(site);
    w.emit_opcode(Opcode::Areturn);
    class.methods.push(MethodInfo {
        name: "bad".to_string(),
        descriptor: "(Object)Object".to_string(),
        flags: flags::STATIC,
        max_locals: 1,
        max_stack: 2,
        code: w.into_bytes(),
    });

    match verify_class(&class) {
        Err(VerifyError::InMethod { error, .. }) => {
            assert_eq!(*error, VerifyError::StackUnderflow(3));
        }
        other => panic!("expected underflow, got {other:?}"),
    }
}

#[test]
fn test_json_summary_omits_code() {
    let mut class = ClassFile::new("Sums");
    let method = sum_method();
    class.methods.push(method);
    let json = class.to_json().unwrap();
    assert!(json.contains("\"name\": \"sum\""));
    assert!(!json.contains("\"code\""));
}
