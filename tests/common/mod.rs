//! Shared test fixtures: a small class-image assembler.
//!
//! Builds real class-file bytes (constant pool, Code attributes, line
//! tables, annotations) so decoder and pipeline tests run against the same
//! format javac produces, without shipping binary fixtures.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_ENUM: u16 = 0x4000;

const OP_DUP: u8 = 0x59;
const OP_RETURN: u8 = 0xb1;
const OP_INVOKEVIRTUAL: u8 = 0xb6;
const OP_INVOKESPECIAL: u8 = 0xb7;
const OP_INVOKESTATIC: u8 = 0xb8;
const OP_NEW: u8 = 0xbb;

/// Growing constant pool with interning.
#[derive(Default)]
struct ConstPool {
    entries: Vec<Vec<u8>>,
}

impl ConstPool {
    /// 1-based index of the next entry.
    fn push(&mut self, encoded: Vec<u8>) -> u16 {
        self.entries.push(encoded);
        self.entries.len() as u16
    }

    fn utf8(&mut self, text: &str) -> u16 {
        let mut encoded = vec![1u8];
        encoded.extend_from_slice(&(text.len() as u16).to_be_bytes());
        encoded.extend_from_slice(text.as_bytes());
        self.intern(encoded)
    }

    fn class(&mut self, internal_name: &str) -> u16 {
        let name_index = self.utf8(internal_name);
        let mut encoded = vec![7u8];
        encoded.extend_from_slice(&name_index.to_be_bytes());
        self.intern(encoded)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut encoded = vec![12u8];
        encoded.extend_from_slice(&name_index.to_be_bytes());
        encoded.extend_from_slice(&descriptor_index.to_be_bytes());
        self.intern(encoded)
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let nat_index = self.name_and_type(name, descriptor);
        let mut encoded = vec![10u8];
        encoded.extend_from_slice(&class_index.to_be_bytes());
        encoded.extend_from_slice(&nat_index.to_be_bytes());
        self.intern(encoded)
    }

    fn intern(&mut self, encoded: Vec<u8>) -> u16 {
        if let Some(position) = self.entries.iter().position(|e| *e == encoded) {
            return (position + 1) as u16;
        }
        self.push(encoded)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&((self.entries.len() + 1) as u16).to_be_bytes());
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
    }
}

struct MethodData {
    access_flags: u16,
    name_index: u16,
    descriptor_index: u16,
    /// `(code bytes, line table)`; `None` for abstract methods.
    code: Option<(Vec<u8>, Vec<(u16, u16)>)>,
    annotation_type_indexes: Vec<u16>,
}

/// Assembles one class image.
pub struct ClassBuilder {
    pool: ConstPool,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<(u16, u16, u16)>,
    methods: Vec<MethodData>,
}

impl ClassBuilder {
    /// New public class extending `java/lang/Object`.
    pub fn new(internal_name: &str, access_flags: u16) -> Self {
        let mut pool = ConstPool::default();
        let this_class = pool.class(internal_name);
        let super_class = pool.class("java/lang/Object");
        Self {
            pool,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn extends(mut self, internal_name: &str) -> Self {
        self.super_class = self.pool.class(internal_name);
        self
    }

    pub fn implements(mut self, internal_name: &str) -> Self {
        let index = self.pool.class(internal_name);
        self.interfaces.push(index);
        self
    }

    /// Declare a field by descriptor, e.g. `Lcom/ex/Model;`.
    pub fn field(mut self, name: &str, descriptor: &str, access_flags: u16) -> Self {
        let name_index = self.pool.utf8(name);
        let descriptor_index = self.pool.utf8(descriptor);
        self.fields.push((access_flags, name_index, descriptor_index));
        self
    }

    /// Start a method; finish with [`MethodBuilder::done`].
    pub fn method(self, name: &str, descriptor: &str, access_flags: u16) -> MethodBuilder {
        MethodBuilder {
            class: self,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags,
            code: Vec::new(),
            lines: Vec::new(),
            current_line: 10,
            emit_lines: true,
            emit_code: true,
            annotations: Vec::new(),
        }
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // minor
        out.extend_from_slice(&52u16.to_be_bytes()); // major: Java 8

        let code_utf8 = {
            // Attribute names must be interned before the pool is frozen.
            let mut pool = self.pool;
            let code = pool.utf8("Code");
            let lines = pool.utf8("LineNumberTable");
            let annotations = pool.utf8("RuntimeVisibleAnnotations");
            pool.write(&mut out);
            (code, lines, annotations)
        };
        let (code_name, line_table_name, annotations_name) = code_utf8;

        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());

        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }

        out.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for (access, name, descriptor) in &self.fields {
            out.extend_from_slice(&access.to_be_bytes());
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&descriptor.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // no attributes
        }

        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            write_method(
                &mut out,
                method,
                code_name,
                line_table_name,
                annotations_name,
            );
        }

        out.extend_from_slice(&0u16.to_be_bytes()); // no class attributes
        out
    }
}

fn write_method(
    out: &mut Vec<u8>,
    method: &MethodData,
    code_name: u16,
    line_table_name: u16,
    annotations_name: u16,
) {
    out.extend_from_slice(&method.access_flags.to_be_bytes());
    out.extend_from_slice(&method.name_index.to_be_bytes());
    out.extend_from_slice(&method.descriptor_index.to_be_bytes());

    let mut attribute_count = 0u16;
    if method.code.is_some() {
        attribute_count += 1;
    }
    if !method.annotation_type_indexes.is_empty() {
        attribute_count += 1;
    }
    out.extend_from_slice(&attribute_count.to_be_bytes());

    if let Some((code, lines)) = &method.code {
        let line_table_len: u32 = if lines.is_empty() {
            0
        } else {
            6 + 4 * lines.len() as u32 + 2 // name + len + count + entries
        };
        let content_len = 2 + 2 + 4 + code.len() as u32 + 2 + 2 + line_table_len;

        out.extend_from_slice(&code_name.to_be_bytes());
        out.extend_from_slice(&content_len.to_be_bytes());
        out.extend_from_slice(&4u16.to_be_bytes()); // max_stack
        out.extend_from_slice(&4u16.to_be_bytes()); // max_locals
        out.extend_from_slice(&(code.len() as u32).to_be_bytes());
        out.extend_from_slice(code);
        out.extend_from_slice(&0u16.to_be_bytes()); // exception table

        if lines.is_empty() {
            out.extend_from_slice(&0u16.to_be_bytes()); // no code attributes
        } else {
            out.extend_from_slice(&1u16.to_be_bytes());
            out.extend_from_slice(&line_table_name.to_be_bytes());
            out.extend_from_slice(&(2 + 4 * lines.len() as u32).to_be_bytes());
            out.extend_from_slice(&(lines.len() as u16).to_be_bytes());
            for (start_pc, line) in lines {
                out.extend_from_slice(&start_pc.to_be_bytes());
                out.extend_from_slice(&line.to_be_bytes());
            }
        }
    }

    if !method.annotation_type_indexes.is_empty() {
        out.extend_from_slice(&annotations_name.to_be_bytes());
        let content_len = 2 + 4 * method.annotation_type_indexes.len() as u32;
        out.extend_from_slice(&content_len.to_be_bytes());
        out.extend_from_slice(&(method.annotation_type_indexes.len() as u16).to_be_bytes());
        for type_index in &method.annotation_type_indexes {
            out.extend_from_slice(&type_index.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // no element pairs
        }
    }
}

/// Builds one method body instruction by instruction.
pub struct MethodBuilder {
    class: ClassBuilder,
    name: String,
    descriptor: String,
    access_flags: u16,
    code: Vec<u8>,
    lines: Vec<(u16, u16)>,
    current_line: u16,
    emit_lines: bool,
    emit_code: bool,
    annotations: Vec<String>,
}

impl MethodBuilder {
    /// Attach an annotation by descriptor, e.g. `Ljava/lang/Override;`.
    pub fn annotate(mut self, type_descriptor: &str) -> Self {
        self.annotations.push(type_descriptor.to_string());
        self
    }

    /// Source line for subsequent instructions.
    pub fn line(mut self, line: u16) -> Self {
        self.current_line = line;
        self
    }

    /// Omit the LineNumberTable entirely.
    pub fn no_lines(mut self) -> Self {
        self.emit_lines = false;
        self
    }

    /// Abstract method: no Code attribute.
    pub fn no_code(mut self) -> Self {
        self.emit_code = false;
        self
    }

    /// `new` + `dup` + `invokespecial <init>`.
    pub fn construct(mut self, owner: &str, init_descriptor: &str) -> Self {
        self.mark_line();
        let class_index = self.class.pool.class(owner);
        self.code.push(OP_NEW);
        self.code.extend_from_slice(&class_index.to_be_bytes());
        self.code.push(OP_DUP);
        let init_ref = self.class.pool.method_ref(owner, "<init>", init_descriptor);
        self.code.push(OP_INVOKESPECIAL);
        self.code.extend_from_slice(&init_ref.to_be_bytes());
        self
    }

    pub fn invoke_virtual(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(OP_INVOKEVIRTUAL, owner, name, descriptor)
    }

    pub fn invoke_static(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(OP_INVOKESTATIC, owner, name, descriptor)
    }

    pub fn invoke_special(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(OP_INVOKESPECIAL, owner, name, descriptor)
    }

    fn invoke(mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        self.mark_line();
        let method_index = self.class.pool.method_ref(owner, name, descriptor);
        self.code.push(opcode);
        self.code.extend_from_slice(&method_index.to_be_bytes());
        self
    }

    fn mark_line(&mut self) {
        if self.emit_lines {
            self.lines.push((self.code.len() as u16, self.current_line));
        }
    }

    /// Finish the method and return to the class builder.
    pub fn done(mut self) -> ClassBuilder {
        let code = if self.emit_code {
            if self.emit_lines && self.lines.is_empty() {
                self.lines.push((0, self.current_line));
            }
            self.code.push(OP_RETURN);
            Some((self.code, self.lines))
        } else {
            None
        };

        let name_index = self.class.pool.utf8(&self.name);
        let descriptor_index = self.class.pool.utf8(&self.descriptor);
        let annotation_type_indexes = self
            .annotations
            .iter()
            .map(|descriptor| self.class.pool.utf8(descriptor))
            .collect();

        self.class.methods.push(MethodData {
            access_flags: self.access_flags,
            name_index,
            descriptor_index,
            code,
            annotation_type_indexes,
        });
        self.class
    }
}

/// Write class bytes under `root` at the internal-name path.
pub fn write_class_file(root: &Path, internal_name: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(format!("{}.class", internal_name));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A minimal public class with no members.
pub fn empty_class(internal_name: &str) -> Vec<u8> {
    ClassBuilder::new(internal_name, ACC_PUBLIC | ACC_SUPER).build()
}
