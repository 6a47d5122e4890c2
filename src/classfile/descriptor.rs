//! JVM descriptor decoding into canonical type names.
//!
//! Canonical form is the dotted source notation: `Lcom/axelor/db/Model;`
//! becomes `com.axelor.db.Model`, `[Ljava/lang/String;` becomes
//! `java.lang.String[]`, nested classes use `.` instead of `$`.

use super::error::{Error, Result};

/// Decoded method descriptor with canonical parameter and return names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub params: Vec<String>,
    pub return_type: String,
}

/// Canonicalize an internal binary class name (`com/ex/Outer$Inner`).
///
/// Array classes referenced from the constant pool arrive as descriptors
/// (`[Ljava/lang/String;`) and are canonicalized as `java.lang.String[]`.
pub fn canonical_class_name(internal: &str) -> String {
    if internal.starts_with('[') {
        if let Ok((name, rest)) = decode_field_type(internal) {
            if rest.is_empty() {
                return name;
            }
        }
        // Fall through for malformed array names: dot-convert what we have.
    }
    internal.replace('/', ".").replace('$', ".")
}

/// Decode a field descriptor into a canonical type name.
pub fn decode_field_descriptor(desc: &str) -> Result<String> {
    let (name, rest) = decode_field_type(desc)?;
    if !rest.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }
    Ok(name)
}

/// Decode a method descriptor such as `(Ljava/util/List;I)V`.
pub fn decode_method_descriptor(desc: &str) -> Result<MethodSignature> {
    let rest = desc
        .strip_prefix('(')
        .ok_or_else(|| Error::InvalidDescriptor(desc.to_string()))?;

    let mut params = Vec::new();
    let mut cursor = rest;
    loop {
        if let Some(after) = cursor.strip_prefix(')') {
            cursor = after;
            break;
        }
        if cursor.is_empty() {
            return Err(Error::InvalidDescriptor(desc.to_string()));
        }
        let (param, next) = decode_field_type(cursor)?;
        params.push(param);
        cursor = next;
    }

    let (return_type, rest) = if let Some(after) = cursor.strip_prefix('V') {
        ("void".to_string(), after)
    } else {
        decode_field_type(cursor)?
    };
    if !rest.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }

    Ok(MethodSignature {
        params,
        return_type,
    })
}

fn decode_field_type(input: &str) -> Result<(String, &str)> {
    let bytes = input.as_bytes();
    if bytes.is_empty() {
        return Err(Error::InvalidDescriptor(input.to_string()));
    }
    match bytes[0] {
        b'B' => Ok(("byte".to_string(), &input[1..])),
        b'C' => Ok(("char".to_string(), &input[1..])),
        b'D' => Ok(("double".to_string(), &input[1..])),
        b'F' => Ok(("float".to_string(), &input[1..])),
        b'I' => Ok(("int".to_string(), &input[1..])),
        b'J' => Ok(("long".to_string(), &input[1..])),
        b'S' => Ok(("short".to_string(), &input[1..])),
        b'Z' => Ok(("boolean".to_string(), &input[1..])),
        b'L' => {
            let end = input
                .find(';')
                .ok_or_else(|| Error::InvalidDescriptor(input.to_string()))?;
            let name = input[1..end].replace('/', ".").replace('$', ".");
            Ok((name, &input[end + 1..]))
        }
        b'[' => {
            let (component, rest) = decode_field_type(&input[1..])?;
            Ok((format!("{}[]", component), rest))
        }
        _ => Err(Error::InvalidDescriptor(input.to_string())),
    }
}

/// Canonicalize an annotation type descriptor (`Ljava/lang/Override;`).
pub fn decode_annotation_type(desc: &str) -> Result<String> {
    decode_field_descriptor(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_descriptor_object() {
        assert_eq!(
            decode_field_descriptor("Lcom/axelor/db/Model;").unwrap(),
            "com.axelor.db.Model"
        );
    }

    #[test]
    fn test_field_descriptor_array() {
        assert_eq!(
            decode_field_descriptor("[Ljava/lang/String;").unwrap(),
            "java.lang.String[]"
        );
        assert_eq!(decode_field_descriptor("[[I").unwrap(), "int[][]");
    }

    #[test]
    fn test_field_descriptor_nested_class() {
        assert_eq!(
            decode_field_descriptor("Lcom/ex/Outer$Inner;").unwrap(),
            "com.ex.Outer.Inner"
        );
    }

    #[test]
    fn test_method_descriptor() {
        let sig = decode_method_descriptor("(Ljava/util/List;I)V").unwrap();
        assert_eq!(sig.params, vec!["java.util.List", "int"]);
        assert_eq!(sig.return_type, "void");
    }

    #[test]
    fn test_method_descriptor_array_return() {
        let sig = decode_method_descriptor("()[Ljava/lang/String;").unwrap();
        assert!(sig.params.is_empty());
        assert_eq!(sig.return_type, "java.lang.String[]");
    }

    #[test]
    fn test_method_descriptor_rejects_garbage() {
        assert!(decode_method_descriptor("IV").is_err());
        assert!(decode_method_descriptor("(Q)V").is_err());
        assert!(decode_method_descriptor("()Vx").is_err());
    }

    #[test]
    fn test_canonical_class_name_array_owner() {
        assert_eq!(
            canonical_class_name("[Ljava/lang/Object;"),
            "java.lang.Object[]"
        );
        assert_eq!(canonical_class_name("com/ex/Outer$Inner"), "com.ex.Outer.Inner");
    }
}
