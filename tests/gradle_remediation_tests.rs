//! Toolchain discovery and the one-shot managed-Gradle remediation path.

#![cfg(unix)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use appforge::exec::{BuildLog, CancelFlag, Orchestrator};
use appforge::synth::android::toolchain::{discover, ToolchainSearch, MIN_GRADLE_MAJOR};
use appforge::synth::SynthError;

fn orchestrator() -> Orchestrator {
    Orchestrator::new(BuildLog::new(), CancelFlag::new())
}

/// Writes an executable fake `gradle` that reports the given version.
fn fake_gradle(dir: &Path, name: &str, version: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\necho \"Gradle {version}\"\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn search(dir: &Path, gradle: std::path::PathBuf, url: &str) -> ToolchainSearch {
    let sdk = dir.join("sdk");
    std::fs::create_dir_all(&sdk).unwrap();
    ToolchainSearch {
        sdk_override: Some(sdk),
        gradle_override: Some(gradle),
        managed_home: dir.join("managed").join("gradle"),
        distribution_url: url.to_string(),
    }
}

#[tokio::test]
async fn compatible_gradle_is_used_without_remediation() {
    let dir = tempfile::tempdir().unwrap();
    let gradle = fake_gradle(dir.path(), "gradle", "7.5.1");
    // Unreachable URL proves no download is attempted.
    let search = search(dir.path(), gradle, "http://127.0.0.1:9/gradle.zip");

    let toolchain = discover(&orchestrator(), &search, dir.path()).await.unwrap();
    assert_eq!(toolchain.gradle_version.major(), 7);
    assert!(!search.managed_home.exists());
}

#[tokio::test]
async fn old_gradle_with_failing_download_attempts_remediation_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let gradle = fake_gradle(dir.path(), "gradle", "4.10.3");
    let search = search(dir.path(), gradle, "http://127.0.0.1:9/gradle.zip");

    let result = discover(&orchestrator(), &search, dir.path()).await;
    match result {
        Err(SynthError::RemediationFailed { tool, .. }) => assert_eq!(tool, "gradle"),
        other => panic!("expected RemediationFailed, got {other:?}"),
    }
    assert!(!search.managed_home.exists());
}

/// Builds a gradle-style distribution zip whose `bin/gradle` is an
/// executable script reporting the minimum acceptable version.
fn distribution_zip() -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut buffer);
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    writer.start_file("gradle-6.8.3/bin/gradle", options).unwrap();
    writer
        .write_all(b"#!/bin/sh\necho \"Gradle 6.8.3\"\n")
        .unwrap();
    writer.finish().unwrap();
    buffer.into_inner()
}

/// Minimal single-request HTTP server handing out the distribution zip.
fn serve_once(payload: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut request = [0u8; 2048];
            let _ = stream.read(&mut request);
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                payload.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&payload);
        }
    });
    format!("http://{address}/gradle-6.8.3-bin.zip")
}

#[tokio::test]
async fn scenario_c_old_gradle_installs_managed_copy_and_reprobes() {
    let dir = tempfile::tempdir().unwrap();
    let gradle = fake_gradle(dir.path(), "gradle", "4.10.3");
    let url = serve_once(distribution_zip());
    let search = search(dir.path(), gradle, &url);

    let toolchain = discover(&orchestrator(), &search, dir.path()).await.unwrap();
    assert!(toolchain.gradle_version.major() >= MIN_GRADLE_MAJOR);
    assert!(search.managed_home.join("bin").join("gradle").exists());
    assert_eq!(
        toolchain.gradle_exe,
        search.managed_home.join("bin").join("gradle")
    );
}

#[tokio::test]
async fn missing_sdk_is_a_toolchain_error() {
    let dir = tempfile::tempdir().unwrap();
    let gradle = fake_gradle(dir.path(), "gradle", "7.5.1");
    let search = ToolchainSearch {
        sdk_override: Some(dir.path().join("no-such-sdk")),
        gradle_override: Some(gradle),
        managed_home: dir.path().join("managed").join("gradle"),
        distribution_url: "http://127.0.0.1:9/gradle.zip".to_string(),
    };
    let result = discover(&orchestrator(), &search, dir.path()).await;
    assert!(matches!(
        result,
        Err(SynthError::ToolchainMissing { .. })
    ));
}
