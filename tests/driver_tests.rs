mod common;

use std::io::Write;

use appforge::config::BuildConfig;
use appforge::driver::{BuildDriver, BuildState};
use appforge::synth::BuildTarget;
use common::ClassBuilder;

fn payload_zip(dir: &std::path::Path) -> std::path::PathBuf {
    let class_bytes = ClassBuilder::new("com/mycompany/ChatApp", "com/appforge/ui/Form").build();
    let mut buffer = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut buffer);
    let options: zip::write::SimpleFileOptions = Default::default();
    writer
        .start_file("com/mycompany/ChatApp.class", options)
        .unwrap();
    writer.write_all(&class_bytes).unwrap();
    writer.finish().unwrap();

    let path = dir.join("payload.zip");
    std::fs::write(&path, buffer.into_inner()).unwrap();
    path
}

#[tokio::test]
async fn missing_main_class_fails_before_any_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let payload = payload_zip(dir.path());
    let driver = BuildDriver::new(BuildConfig::new(), BuildTarget::AndroidSource);
    let outcome = driver.run(&payload, &dir.path().join("build")).await;
    assert_eq!(outcome.state, BuildState::Failed);
    assert!(!outcome.succeeded());
    let error = outcome.error.expect("failure carries a structured cause");
    assert!(error.to_string().contains("app.mainClass"));
}

#[tokio::test]
async fn missing_payload_fails_with_log_attached() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = BuildConfig::new();
    config.put("app.mainClass", "com.mycompany.ChatApp");
    config.put("app.packageName", "com.mycompany.chat");
    let driver = BuildDriver::new(config, BuildTarget::AndroidSource);
    let outcome = driver
        .run(&dir.path().join("missing.zip"), &dir.path().join("build"))
        .await;
    assert_eq!(outcome.state, BuildState::Failed);
    assert!(outcome.log.contains("Build started"));
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn export_build_without_sdk_reports_toolchain_failure() {
    let dir = tempfile::tempdir().unwrap();
    let payload = payload_zip(dir.path());
    let mut config = BuildConfig::new();
    config.put("app.mainClass", "com.mycompany.ChatApp");
    config.put("app.packageName", "com.mycompany.chat");
    config.put("android.sdkPath", "/definitely/not/an/sdk");
    let driver = BuildDriver::new(config, BuildTarget::AndroidSource);
    let outcome = driver.run(&payload, &dir.path().join("build")).await;
    assert_eq!(outcome.state, BuildState::Failed);
    let message = outcome.error.expect("structured cause").to_string();
    assert!(message.contains("Android SDK"));
}
