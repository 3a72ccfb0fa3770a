use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::scanner::{for_each_unit, ScanError};

/// Marker interface implemented by application-declared native interfaces.
const NATIVE_INTERFACE_MARKER: &str = "com/appforge/system/NativeInterface";

/// Interface access flag (JVM `ACC_INTERFACE`).
const ACC_INTERFACE: u16 = 0x0200;

/// A Java type as it appears in a native-interface signature, carried in
/// source form (dotted names) because its only consumers are source
/// generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JavaType {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object(String),
    Array(Box<JavaType>),
}

impl JavaType {
    /// How the type is written in Java source.
    pub fn java_name(&self) -> String {
        match self {
            JavaType::Void => "void".to_string(),
            JavaType::Boolean => "boolean".to_string(),
            JavaType::Byte => "byte".to_string(),
            JavaType::Char => "char".to_string(),
            JavaType::Short => "short".to_string(),
            JavaType::Int => "int".to_string(),
            JavaType::Long => "long".to_string(),
            JavaType::Float => "float".to_string(),
            JavaType::Double => "double".to_string(),
            JavaType::Object(name) => name.clone(),
            JavaType::Array(inner) => format!("{}[]", inner.java_name()),
        }
    }

    /// Cross-language UI handles need conversion thunks in generated glue.
    pub fn is_peer_component(&self) -> bool {
        matches!(self, JavaType::Object(name) if name == "com.appforge.ui.PeerComponent")
    }

    fn parse(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<Self> {
        match chars.next()? {
            'V' => Some(JavaType::Void),
            'Z' => Some(JavaType::Boolean),
            'B' => Some(JavaType::Byte),
            'C' => Some(JavaType::Char),
            'S' => Some(JavaType::Short),
            'I' => Some(JavaType::Int),
            'J' => Some(JavaType::Long),
            'F' => Some(JavaType::Float),
            'D' => Some(JavaType::Double),
            'L' => {
                let mut name = String::new();
                loop {
                    match chars.next()? {
                        ';' => break,
                        c => name.push(if c == '/' { '.' } else { c }),
                    }
                }
                Some(JavaType::Object(name))
            }
            '[' => Some(JavaType::Array(Box::new(Self::parse(chars)?))),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeMethodDesc {
    pub name: String,
    pub params: Vec<JavaType>,
    pub ret: JavaType,
}

/// Serializable description of one application-declared native interface:
/// everything a stub generator needs, nothing about how glue is worded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeInterfaceDesc {
    pub package: String,
    pub name: String,
    pub methods: Vec<NativeMethodDesc>,
}

impl NativeInterfaceDesc {
    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }
}

/// Finds every interface under `root` (directories and jars) that extends
/// the native-interface marker, describing its declared methods. Inner
/// classes and the Object protocol methods are skipped, mirroring what the
/// stub generators can meaningfully forward.
pub fn extract_native_interfaces(root: &Path) -> Result<Vec<NativeInterfaceDesc>, ScanError> {
    let mut interfaces = Vec::new();
    for_each_unit(root, &mut |unit| {
        if unit.access_flags & ACC_INTERFACE == 0 {
            return Ok(());
        }
        let name = unit.name().into_owned();
        if name.contains('$') {
            return Ok(());
        }
        if !unit.interface_names().any(|i| i == NATIVE_INTERFACE_MARKER) {
            return Ok(());
        }
        debug!("{name} is a native interface");

        let (package, simple_name) = match name.rsplit_once('/') {
            Some((pkg, simple)) => (pkg.replace('/', "."), simple.to_string()),
            None => (String::new(), name.clone()),
        };
        let mut methods = Vec::new();
        for method in &unit.methods {
            let Some(method_name) = unit.member_name(method) else {
                continue;
            };
            if matches!(
                method_name.as_ref(),
                "<init>" | "<clinit>" | "hashCode" | "equals" | "toString"
            ) {
                continue;
            }
            let Some(descriptor) = unit.member_descriptor(method) else {
                continue;
            };
            if let Some((params, ret)) = parse_method_descriptor(&descriptor) {
                methods.push(NativeMethodDesc {
                    name: method_name.into_owned(),
                    params,
                    ret,
                });
            }
        }
        interfaces.push(NativeInterfaceDesc {
            package,
            name: simple_name,
            methods,
        });
        Ok(())
    })?;
    Ok(interfaces)
}

fn parse_method_descriptor(descriptor: &str) -> Option<(Vec<JavaType>, JavaType)> {
    let inner = descriptor.strip_prefix('(')?;
    let (params_part, ret_part) = inner.split_once(')')?;
    let mut params = Vec::new();
    let mut chars = params_part.chars().peekable();
    while chars.peek().is_some() {
        params.push(JavaType::parse(&mut chars)?);
    }
    let mut ret_chars = ret_part.chars().peekable();
    let ret = JavaType::parse(&mut ret_chars)?;
    Some((params, ret))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_descriptors() {
        let (params, ret) =
            parse_method_descriptor("(Ljava/lang/String;I[B)Lcom/appforge/ui/PeerComponent;")
                .unwrap();
        assert_eq!(
            params,
            vec![
                JavaType::Object("java.lang.String".to_string()),
                JavaType::Int,
                JavaType::Array(Box::new(JavaType::Byte)),
            ]
        );
        assert!(ret.is_peer_component());
    }

    #[test]
    fn renders_java_names() {
        assert_eq!(
            JavaType::Array(Box::new(JavaType::Object("java.lang.String".into()))).java_name(),
            "java.lang.String[]"
        );
        assert_eq!(JavaType::Long.java_name(), "long");
    }

    #[test]
    fn rejects_malformed_descriptor() {
        assert!(parse_method_descriptor("(Q)V").is_none());
        assert!(parse_method_descriptor("missing-parens").is_none());
    }
}
