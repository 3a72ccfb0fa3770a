use crate::scan::{JavaType, NativeInterfaceDesc, NativeMethodDesc};

/// Objective-C rendering of a native-interface signature type. Peer
/// components cross the boundary as views; byte arrays as NSData.
fn objc_type(java_type: &JavaType) -> &'static str {
    match java_type {
        JavaType::Void => "void",
        JavaType::Boolean => "BOOL",
        JavaType::Byte => "char",
        JavaType::Char => "unichar",
        JavaType::Short => "short",
        JavaType::Int => "int",
        JavaType::Long => "long long",
        JavaType::Float => "float",
        JavaType::Double => "double",
        JavaType::Object(name) if name == "java.lang.String" => "NSString*",
        JavaType::Object(name) if name == "com.appforge.ui.PeerComponent" => "UIView*",
        JavaType::Object(_) => "NSObject*",
        JavaType::Array(inner) if **inner == JavaType::Byte => "NSData*",
        JavaType::Array(_) => "NSArray*",
    }
}

fn method_signature(method: &NativeMethodDesc) -> String {
    let mut signature = format!("- ({}){}", objc_type(&method.ret), method.name);
    for (index, param) in method.params.iter().enumerate() {
        if index == 0 {
            signature.push_str(&format!(":({})param0", objc_type(param)));
        } else {
            signature.push_str(&format!(" param{index}:({})param{index}", objc_type(param)));
        }
    }
    signature
}

/// Renders the header of the Objective-C adapter for one native interface.
pub fn render_objc_header(desc: &NativeInterfaceDesc) -> String {
    let mut out = String::new();
    out.push_str("#import <Foundation/Foundation.h>\n");
    out.push_str("#import <UIKit/UIKit.h>\n");
    out.push_str(&format!("#import \"{}Impl.h\"\n\n", desc.name));
    out.push_str(&format!("@interface {}Stub : NSObject {{\n", desc.name));
    out.push_str(&format!("    {}Impl* impl;\n", desc.name));
    out.push_str("}\n");
    for method in &desc.methods {
        out.push_str(&format!("{};\n", method_signature(method)));
    }
    out.push_str("@end\n");
    out
}

/// Renders the implementation: each method forwards to the hand-written
/// `<Name>Impl` counterpart, wrapping and unwrapping peer views where the
/// signature crosses the UI boundary.
pub fn render_objc_impl(desc: &NativeInterfaceDesc) -> String {
    let mut out = String::new();
    out.push_str(&format!("#import \"{}Stub.h\"\n", desc.name));
    out.push_str("#import \"AppForgePeer.h\"\n\n");
    out.push_str(&format!("@implementation {}Stub\n\n", desc.name));
    out.push_str("- (instancetype)init {\n");
    out.push_str("    self = [super init];\n");
    out.push_str(&format!("    impl = [[{}Impl alloc] init];\n", desc.name));
    out.push_str("    return self;\n}\n\n");

    for method in &desc.methods {
        out.push_str(&format!("{} {{\n", method_signature(method)));
        let args: Vec<String> = method
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| {
                let name = format!("param{index}");
                if param.is_peer_component() {
                    format!("[AppForgePeer unwrap:{name}]")
                } else {
                    name
                }
            })
            .collect();
        let call = if args.is_empty() {
            format!("[impl {}]", method.name)
        } else {
            let mut call = format!("[impl {}:{}", method.name, args[0]);
            for (index, arg) in args.iter().enumerate().skip(1) {
                call.push_str(&format!(" param{index}:{arg}"));
            }
            call.push(']');
            call
        };
        match &method.ret {
            JavaType::Void => out.push_str(&format!("    {call};\n")),
            ret if ret.is_peer_component() => {
                out.push_str(&format!("    return [AppForgePeer wrap:{call}];\n"))
            }
            _ => out.push_str(&format!("    return {call};\n")),
        }
        out.push_str("}\n\n");
    }

    out.push_str("@end\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_interface() -> NativeInterfaceDesc {
        NativeInterfaceDesc {
            package: "com.mycompany.natives".to_string(),
            name: "Camera".to_string(),
            methods: vec![
                NativeMethodDesc {
                    name: "capture".to_string(),
                    params: vec![JavaType::Int],
                    ret: JavaType::Boolean,
                },
                NativeMethodDesc {
                    name: "preview".to_string(),
                    params: vec![],
                    ret: JavaType::Object("com.appforge.ui.PeerComponent".into()),
                },
            ],
        }
    }

    #[test]
    fn header_declares_forwarded_methods() {
        let header = render_objc_header(&sample_interface());
        assert!(header.contains("@interface CameraStub : NSObject"));
        assert!(header.contains("- (BOOL)capture:(int)param0;"));
        assert!(header.contains("CameraImpl* impl;"));
    }

    #[test]
    fn implementation_wraps_peer_returns() {
        let implementation = render_objc_impl(&sample_interface());
        assert!(implementation.contains("impl = [[CameraImpl alloc] init];"));
        assert!(implementation.contains("return [impl capture:param0];"));
        assert!(implementation.contains("return [AppForgePeer wrap:[impl preview]];"));
    }
}
