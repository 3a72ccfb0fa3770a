use crate::scan::{JavaType, NativeInterfaceDesc};

/// Renders the concrete Java adapter for one declared native interface.
/// The stub forwards every method to the hand-written `<Name>Impl`
/// counterpart shipped in the payload sources, converting peer-component
/// handles to and from native views at the boundary.
pub fn render_java_stub(desc: &NativeInterfaceDesc) -> String {
    let mut out = String::new();
    if !desc.package.is_empty() {
        out.push_str(&format!("package {};\n\n", desc.package));
    }
    out.push_str("import com.appforge.ui.PeerComponent;\n");
    out.push_str("import com.appforge.android.AndroidNativeUtil;\n\n");
    out.push_str(&format!(
        "public class {name}Stub implements {name} {{\n",
        name = desc.name
    ));
    out.push_str(&format!(
        "    private {name}Impl impl = new {name}Impl();\n\n",
        name = desc.name
    ));

    for method in &desc.methods {
        let params: Vec<String> = method
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} param{i}", p.java_name()))
            .collect();
        out.push_str(&format!(
            "    public {} {}({}) {{\n",
            method.ret.java_name(),
            method.name,
            params.join(", ")
        ));

        let args: Vec<String> = method
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if p.is_peer_component() {
                    format!("AndroidNativeUtil.unwrapPeer(param{i})")
                } else {
                    format!("param{i}")
                }
            })
            .collect();
        let call = format!("impl.{}({})", method.name, args.join(", "));
        match &method.ret {
            JavaType::Void => out.push_str(&format!("        {call};\n")),
            ret if ret.is_peer_component() => out.push_str(&format!(
                "        return AndroidNativeUtil.wrapPeer({call});\n"
            )),
            _ => out.push_str(&format!("        return {call};\n")),
        }
        out.push_str("    }\n\n");
    }

    out.push_str("}\n");
    out
}

/// The registration statement inserted into the generated activity.
pub fn registration_line(desc: &NativeInterfaceDesc) -> String {
    let qualified = desc.qualified_name();
    format!("NativeLookup.register({qualified}.class, {qualified}Stub.class);")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::NativeMethodDesc;

    fn sample_interface() -> NativeInterfaceDesc {
        NativeInterfaceDesc {
            package: "com.mycompany.natives".to_string(),
            name: "Camera".to_string(),
            methods: vec![
                NativeMethodDesc {
                    name: "capture".to_string(),
                    params: vec![JavaType::Int, JavaType::Object("java.lang.String".into())],
                    ret: JavaType::Boolean,
                },
                NativeMethodDesc {
                    name: "preview".to_string(),
                    params: vec![],
                    ret: JavaType::Object("com.appforge.ui.PeerComponent".into()),
                },
                NativeMethodDesc {
                    name: "attach".to_string(),
                    params: vec![JavaType::Object("com.appforge.ui.PeerComponent".into())],
                    ret: JavaType::Void,
                },
            ],
        }
    }

    #[test]
    fn stub_forwards_to_impl() {
        let source = render_java_stub(&sample_interface());
        assert!(source.contains("package com.mycompany.natives;"));
        assert!(source.contains("public class CameraStub implements Camera {"));
        assert!(source.contains("private CameraImpl impl = new CameraImpl();"));
        assert!(source.contains("return impl.capture(param0, param1);"));
    }

    #[test]
    fn peer_components_are_converted_at_the_boundary() {
        let source = render_java_stub(&sample_interface());
        assert!(source.contains("return AndroidNativeUtil.wrapPeer(impl.preview());"));
        assert!(source.contains("impl.attach(AndroidNativeUtil.unwrapPeer(param0));"));
    }

    #[test]
    fn registration_names_both_classes() {
        assert_eq!(
            registration_line(&sample_interface()),
            "NativeLookup.register(com.mycompany.natives.Camera.class, \
             com.mycompany.natives.CameraStub.class);"
        );
    }
}
