//! Class image decoder.
//!
//! Parses one compiled class into a [`ClassView`]: names in canonical
//! dotted form, access flags, inheritance, field types, and methods with
//! their annotations, line tables, and invocation sites. The decoder
//! performs no I/O; callers hand it bytes and get back a complete view or
//! an error, never a partial view.

mod code;
mod constant_pool;
mod descriptor;
mod error;
mod reader;

pub use code::{CallSite, InvokeKind};
pub use descriptor::{
    canonical_class_name, decode_field_descriptor, decode_method_descriptor, MethodSignature,
};
pub use error::{Error, Result};

use constant_pool::ConstantPool;
use reader::Reader;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ENUM: u16 = 0x4000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;

/// Decoded view of one class image.
#[derive(Debug, Clone)]
pub struct ClassView {
    /// Canonical FQN (`com.ex.Outer.Inner`).
    pub fqn: String,
    pub access_flags: u16,
    /// Canonical superclass FQN; `None` only for `java.lang.Object` itself
    /// and module-info images.
    pub super_fqn: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldView>,
    pub methods: Vec<MethodView>,
}

#[derive(Debug, Clone)]
pub struct FieldView {
    pub name: String,
    pub access_flags: u16,
    /// Canonical declared type.
    pub type_fqn: String,
}

#[derive(Debug, Clone)]
pub struct MethodView {
    /// Simple name; constructors keep `<init>`.
    pub name: String,
    pub access_flags: u16,
    pub params: Vec<String>,
    pub return_type: String,
    /// Canonical FQNs of runtime-visible and -invisible annotations.
    pub annotations: Vec<String>,
    /// Earliest source line associated with any instruction, if the image
    /// carries a line-number table.
    pub line: Option<u32>,
    pub calls: Vec<CallSite>,
}

impl ClassView {
    /// Decode one class image.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::InvalidMagic(magic));
        }

        let _minor = reader.read_u2()?;
        let _major = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let fqn = canonical_class_name(&cp.get_class_name(reader.read_u2()?)?);
        let super_index = reader.read_u2()?;
        let super_fqn = if super_index == 0 {
            None
        } else {
            Some(canonical_class_name(&cp.get_class_name(super_index)?))
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(canonical_class_name(&cp.get_class_name(reader.read_u2()?)?));
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            fields.push(parse_field(&mut reader, &cp)?);
        }

        let methods_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            methods.push(parse_method(&mut reader, &cp)?);
        }

        // Class-level attributes carry nothing the fact base needs.

        Ok(Self {
            fqn,
            access_flags,
            super_fqn,
            interfaces,
            fields,
            methods,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_enum(&self) -> bool {
        self.access_flags & ACC_ENUM != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    /// Node type per the fact taxonomy: `class`, `interface`, or `enum`.
    /// Annotation types decode as interfaces.
    pub fn node_type(&self) -> &'static str {
        if self.is_enum() {
            "enum"
        } else if self.is_interface() {
            "interface"
        } else {
            "class"
        }
    }
}

/// Visibility keyword for a set of access flags; absence of all three
/// explicit modifiers means package-private.
pub fn visibility(access_flags: u16) -> &'static str {
    if access_flags & ACC_PUBLIC != 0 {
        "public"
    } else if access_flags & ACC_PRIVATE != 0 {
        "private"
    } else if access_flags & ACC_PROTECTED != 0 {
        "protected"
    } else {
        "package"
    }
}

fn parse_field(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<FieldView> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
    skip_attributes(reader)?;
    Ok(FieldView {
        name,
        access_flags,
        type_fqn: decode_field_descriptor(&descriptor)?,
    })
}

fn parse_method(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<MethodView> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();
    let sig = decode_method_descriptor(&descriptor)?;

    let mut annotations = Vec::new();
    let mut line_table: Vec<(u16, u16)> = Vec::new();
    let mut code_bytes: Option<Vec<u8>> = None;

    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let attr_name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let attr_name = cp.get_utf8(attr_name_index)?;

        let mut sub = Reader::new(info);
        match attr_name {
            "Code" => {
                let _max_stack = sub.read_u2()?;
                let _max_locals = sub.read_u2()?;
                let code_length = sub.read_u4()? as usize;
                code_bytes = Some(sub.read_bytes(code_length)?.to_vec());

                let exception_count = sub.read_u2()? as usize;
                for _ in 0..exception_count {
                    sub.read_bytes(8)?;
                }

                let code_attr_count = sub.read_u2()? as usize;
                for _ in 0..code_attr_count {
                    let inner_name_index = sub.read_u2()?;
                    let inner_length = sub.read_u4()? as usize;
                    let inner_info = sub.read_bytes(inner_length)?;
                    if cp.get_utf8(inner_name_index)? == "LineNumberTable" {
                        let mut table = Reader::new(inner_info);
                        let entries = table.read_u2()? as usize;
                        for _ in 0..entries {
                            let start_pc = table.read_u2()?;
                            let line = table.read_u2()?;
                            line_table.push((start_pc, line));
                        }
                    }
                }
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    annotations.push(parse_annotation_type(&mut sub, cp)?);
                }
            }
            _ => {}
        }
    }

    // The JVM spec does not require line-table ordering.
    line_table.sort_unstable_by_key(|&(start_pc, _)| start_pc);

    let calls = match &code_bytes {
        Some(code) => code::scan_invocations(code, cp, &line_table)?,
        None => Vec::new(),
    };

    let line = line_table.iter().map(|&(_, line)| line as u32).min();

    Ok(MethodView {
        name,
        access_flags,
        params: sig.params,
        return_type: sig.return_type,
        annotations,
        line,
        calls,
    })
}

/// Read one annotation, returning its canonical type FQN and skipping its
/// element-value pairs.
fn parse_annotation_type(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<String> {
    let type_index = reader.read_u2()?;
    let type_fqn = descriptor::decode_annotation_type(cp.get_utf8(type_index)?)?;
    let num_pairs = reader.read_u2()? as usize;
    for _ in 0..num_pairs {
        let _element_name_index = reader.read_u2()?;
        skip_element_value(reader, cp)?;
    }
    Ok(type_fqn)
}

fn skip_element_value(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<()> {
    let tag = reader.read_u1()?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            let _index = reader.read_u2()?;
        }
        b'e' => {
            let _type_name_index = reader.read_u2()?;
            let _const_name_index = reader.read_u2()?;
        }
        b'@' => {
            parse_annotation_type(reader, cp)?;
        }
        b'[' => {
            let num = reader.read_u2()? as usize;
            for _ in 0..num {
                skip_element_value(reader, cp)?;
            }
        }
        _ => return Err(Error::Malformed("unknown element_value tag")),
    }
    Ok(())
}

fn skip_attributes(reader: &mut Reader<'_>) -> Result<()> {
    let count = reader.read_u2()? as usize;
    for _ in 0..count {
        let _name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        reader.read_bytes(length)?;
    }
    Ok(())
}
