//! Exercises the compiled binary end-to-end rather than its internals, since `main.rs`'s
//! subcommand handlers are private to the `tapehoard` binary crate.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use tempfile::TempDir;

fn tapehoard_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tapehoard"))
}

fn qic_packed_date(year: i32) -> u32 {
    ((year - 1970) as u32 & 0x7F) << 25
}

fn qicstream_v1_record(name: &str, data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x33, 0xCC, 0x33, 0xCC];
    let mut meta = Vec::new();
    meta.push(0x02); // not read-only
    meta.extend_from_slice(&qic_packed_date(2001).to_le_bytes());
    let header_len = 1 + 9 + 1 + name.len() + 1;
    meta.extend_from_slice(&((header_len + data.len()) as u32).to_le_bytes());
    out.push(meta.len() as u8);
    out.extend_from_slice(&meta);
    out.push(name.len() as u8);
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    out.extend_from_slice(data);
    out
}

#[test]
fn recover_qicstream_v1_writes_file_to_output_dir() {
    let dir = TempDir::new().expect("TempDir::new");
    let image_path = dir.path().join("image.bin");
    fs::write(&image_path, qicstream_v1_record("README.TXT", b"hi there")).expect("write image");

    let out_dir = dir.path().join("out");
    let status = Command::new(tapehoard_bin())
        .args([
            "recover",
            "qicstream-v1",
            "--input",
            image_path.to_str().unwrap(),
            "--dir",
            out_dir.to_str().unwrap(),
        ])
        .status()
        .expect("spawn tapehoard");
    assert!(status.success(), "recover failed: {status}");

    let recovered = fs::read(out_dir.join("README.TXT")).expect("recovered file exists");
    assert_eq!(recovered, b"hi there");
}

#[test]
fn recover_dry_run_does_not_create_output_dir() {
    let dir = TempDir::new().expect("TempDir::new");
    let image_path = dir.path().join("image.bin");
    fs::write(&image_path, qicstream_v1_record("README.TXT", b"hi there")).expect("write image");

    let out_dir = dir.path().join("out");
    let status = Command::new(tapehoard_bin())
        .args([
            "recover",
            "qicstream-v1",
            "--input",
            image_path.to_str().unwrap(),
            "--dir",
            out_dir.to_str().unwrap(),
            "--dry",
        ])
        .status()
        .expect("spawn tapehoard");
    assert!(status.success(), "dry run failed: {status}");
    assert!(!out_dir.exists(), "dry run must not materialize the output directory");
}

#[test]
fn ecc_strips_trailing_bytes_per_segment() {
    let dir = TempDir::new().expect("TempDir::new");
    let input_path = dir.path().join("raw.bin");
    let mut data = vec![b'a'; 8];
    data.extend_from_slice(&[0xEE; 2]); // ECC tail for the only 10-byte segment
    fs::write(&input_path, &data).expect("write input");

    let output_path = dir.path().join("stripped.bin");
    let status = Command::new(tapehoard_bin())
        .args([
            "ecc",
            "--input",
            input_path.to_str().unwrap(),
            "--output",
            output_path.to_str().unwrap(),
            "--segsize",
            "10",
            "--eccsize",
            "2",
        ])
        .status()
        .expect("spawn tapehoard");
    assert!(status.success(), "ecc failed: {status}");

    let stripped = fs::read(&output_path).expect("stripped output exists");
    assert_eq!(stripped, vec![b'a'; 8]);
}

#[test]
fn hp_backup_exec_requires_catalog_flag() {
    let dir = TempDir::new().expect("TempDir::new");
    let image_path = dir.path().join("image.bin");
    fs::write(&image_path, b"irrelevant").expect("write image");

    let output = Command::new(tapehoard_bin())
        .args([
            "recover",
            "hp-backup-exec",
            "--input",
            image_path.to_str().unwrap(),
            "--dry",
        ])
        .output()
        .expect("spawn tapehoard");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--catalog"), "stderr was: {stderr}");
}
