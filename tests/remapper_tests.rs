mod common;

use std::io::Write;

use appforge::classfile::ObjectCodeUnit;
use appforge::remap::{remap_tree, remap_unit, RemapContext, RemapError, RemappingTable};
use common::{invoke_virtual, ClassBuilder};

fn support_table() -> RemappingTable {
    let mut table = RemappingTable::new();
    table.insert_class(
        "android/support/v4/app/Fragment",
        "androidx/fragment/app/Fragment",
    );
    table
}

fn sample_class_bytes() -> Vec<u8> {
    let mut builder = ClassBuilder::new("com/example/Screen", "android/support/v4/app/Fragment");
    builder.add_field("other", "Lcom/example/Other;");
    let call = builder.pool.method_ref(
        "android/support/v4/app/Fragment",
        "getActivity",
        "()Landroid/support/v4/app/FragmentActivity;",
    );
    builder.add_method_with_code("parent", "()V", invoke_virtual(call));
    builder.build()
}

#[test]
fn empty_table_is_a_byte_identical_noop() {
    let bytes = sample_class_bytes();
    let mut unit = ObjectCodeUnit::parse(&bytes).unwrap();
    let changed = remap_unit(&mut unit, &RemappingTable::new()).unwrap();
    assert!(!changed);
    assert_eq!(unit.to_bytes(), bytes);
}

#[test]
fn superclass_only_rename_changes_exactly_that_reference() {
    let mut builder = ClassBuilder::new("com/example/Screen", "android/support/v4/app/Fragment");
    builder.add_field("name", "Ljava/lang/String;");
    let bytes = builder.build();

    let mut unit = ObjectCodeUnit::parse(&bytes).unwrap();
    let changed = remap_unit(&mut unit, &support_table()).unwrap();
    assert!(changed);
    assert_eq!(
        unit.super_name().as_deref(),
        Some("androidx/fragment/app/Fragment")
    );
    assert_eq!(unit.name(), "com/example/Screen");
    let field_desc = unit.member_descriptor(&unit.fields[0]).unwrap();
    assert_eq!(field_desc, "Ljava/lang/String;");
}

#[test]
fn remapping_twice_is_idempotent() {
    let bytes = sample_class_bytes();
    let table = support_table();

    let mut unit = ObjectCodeUnit::parse(&bytes).unwrap();
    assert!(remap_unit(&mut unit, &table).unwrap());
    let once = unit.to_bytes();

    let mut unit = ObjectCodeUnit::parse(&once).unwrap();
    assert!(!remap_unit(&mut unit, &table).unwrap());
    assert_eq!(unit.to_bytes(), once);
}

#[test]
fn instruction_owner_and_descriptor_references_are_rewritten() {
    let mut table = support_table();
    table.insert_class(
        "android/support/v4/app/FragmentActivity",
        "androidx/fragment/app/FragmentActivity",
    );
    let bytes = sample_class_bytes();
    let mut unit = ObjectCodeUnit::parse(&bytes).unwrap();
    assert!(remap_unit(&mut unit, &table).unwrap());

    let serialized = unit.to_bytes();
    let reparsed = ObjectCodeUnit::parse(&serialized).unwrap();
    let mut found_call = false;
    for method in &reparsed.methods {
        if let Some(code) = reparsed.code_attribute(method) {
            for code_ref in appforge::classfile::decode_code_refs(&reparsed.pool, code).unwrap() {
                if let appforge::classfile::CodeRef::Call { owner, name } = code_ref {
                    assert_eq!(owner, "androidx/fragment/app/Fragment");
                    assert_eq!(name, "getActivity");
                    found_call = true;
                }
            }
        }
    }
    assert!(found_call);
}

#[test]
fn remap_tree_rewrites_class_files_and_jars_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let class_path = dir.path().join("com").join("example").join("Screen.class");
    std::fs::create_dir_all(class_path.parent().unwrap()).unwrap();
    std::fs::write(&class_path, sample_class_bytes()).unwrap();

    let jar_path = dir.path().join("vendor.jar");
    let file = std::fs::File::create(&jar_path).unwrap();
    let mut jar = zip::ZipWriter::new(file);
    let options: zip::write::SimpleFileOptions = Default::default();
    jar.start_file("com/example/Screen.class", options).unwrap();
    jar.write_all(&sample_class_bytes()).unwrap();
    jar.finish().unwrap();

    let changed = remap_tree(dir.path(), &support_table()).unwrap();
    assert_eq!(changed, 2);

    let rewritten = ObjectCodeUnit::parse(&std::fs::read(&class_path).unwrap()).unwrap();
    assert_eq!(
        rewritten.super_name().as_deref(),
        Some("androidx/fragment/app/Fragment")
    );

    let jar_file = std::fs::File::open(&jar_path).unwrap();
    let mut archive = zip::ZipArchive::new(jar_file).unwrap();
    let mut entry = archive.by_name("com/example/Screen.class").unwrap();
    let mut data = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut data).unwrap();
    let jar_unit = ObjectCodeUnit::parse(&data).unwrap();
    assert_eq!(
        jar_unit.super_name().as_deref(),
        Some("androidx/fragment/app/Fragment")
    );
}

#[test]
fn malformed_mapping_file_fails_before_any_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let class_csv = dir.path().join("classes.csv");
    let artifact_csv = dir.path().join("artifacts.csv");
    std::fs::write(&class_csv, "header\nbroken-line-without-comma\n").unwrap();
    std::fs::write(&artifact_csv, "header\n").unwrap();

    let mut context = RemapContext::new();
    let result = context.migration_table(&class_csv, &artifact_csv);
    assert!(matches!(
        result,
        Err(RemapError::MalformedMapping { line: 2, .. })
    ));
}

#[test]
fn migration_table_is_memoized_by_file_digest() {
    let dir = tempfile::tempdir().unwrap();
    let class_csv = dir.path().join("classes.csv");
    let artifact_csv = dir.path().join("artifacts.csv");
    std::fs::write(&class_csv, "header\na.b.C,x.y.C\n").unwrap();
    std::fs::write(&artifact_csv, "header\nold:a,new:a\n").unwrap();

    let mut context = RemapContext::new();
    let first = context.migration_table(&class_csv, &artifact_csv).unwrap();
    let second = context.migration_table(&class_csv, &artifact_csv).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    std::fs::write(&class_csv, "header\na.b.C,x.y.C\nd.e.F,x.y.F\n").unwrap();
    let third = context.migration_table(&class_csv, &artifact_csv).unwrap();
    assert!(!std::sync::Arc::ptr_eq(&first, &third));
    assert_eq!(third.class_count(), 2);
}

#[test]
fn source_migration_replaces_dotted_names_and_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let java = dir.path().join("Main.java");
    std::fs::write(
        &java,
        "import android.support.v4.app.Fragment;\nclass Main {}\n",
    )
    .unwrap();
    let gradle = dir.path().join("build.gradle");
    std::fs::write(
        &gradle,
        "implementation \"com.android.support:support-v4:28.0.0\"\n",
    )
    .unwrap();

    let migration = RemappingTable::from_csv(
        "h\nandroid.support.v4.app.Fragment,androidx.fragment.app.Fragment\n",
        "classes",
        "h\ncom.android.support:support-v4,androidx.legacy:legacy-support-v4\n",
        "artifacts",
    )
    .unwrap();
    appforge::remap::migrate_sources(dir.path(), &migration).unwrap();

    let java_text = std::fs::read_to_string(&java).unwrap();
    assert!(java_text.contains("androidx.fragment.app.Fragment"));
    assert!(!java_text.contains("android.support.v4.app.Fragment"));
    let gradle_text = std::fs::read_to_string(&gradle).unwrap();
    assert!(gradle_text.contains("androidx.legacy:legacy-support-v4"));
}
