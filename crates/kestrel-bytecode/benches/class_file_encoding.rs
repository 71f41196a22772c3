use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kestrel_bytecode::{
    decode_instructions, flags, verify_class, BytecodeWriter, ClassFile, MethodInfo, Opcode,
};

fn sample_class(methods: usize) -> ClassFile {
    let mut class = ClassFile::new("Bench");
    for n in 0..methods {
        let callee = class.constants.add_method("Bench", &format!("m{n}"), "(int)int");
        let mut w = BytecodeWriter::new();
        w.emit_local(Opcode::Iload, 0);
        w.emit_iconst(n as i32);
        w.emit_opcode(Opcode::Iadd);
        w.emit_pool(Opcode::InvokeStatic, callee);
        w.emit_opcode(Opcode::Ireturn);
        class.methods.push(MethodInfo {
            name: format!("m{n}"),
            descriptor: "(int)int".to_string(),
            flags: flags::STATIC,
            max_locals: 1,
            max_stack: 2,
            code: w.into_bytes(),
        });
    }
    class
}

fn bench_encode(c: &mut Criterion) {
    let class = sample_class(64);
    c.bench_function("class_file_encode", |b| b.iter(|| black_box(&class).encode()));
}

fn bench_decode(c: &mut Criterion) {
    let bytes = sample_class(64).encode();
    c.bench_function("class_file_decode", |b| {
        b.iter(|| ClassFile::decode(black_box(&bytes)))
    });
}

fn bench_verify(c: &mut Criterion) {
    let class = sample_class(64);
    let mut group = c.benchmark_group("verify");
    group.bench_function("decode_instructions", |b| {
        b.iter(|| decode_instructions(black_box(&class.methods[0].code)))
    });
    group.bench_function("verify_class", |b| b.iter(|| verify_class(black_box(&class))));
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_verify);
criterion_main!(benches);
