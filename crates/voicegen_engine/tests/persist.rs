use std::fs;
use std::io::Write;

use tempfile::TempDir;
use voicegen_engine::{ensure_output_dir, AtomicFileWriter, PersistError, Synthesis};

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("outputs");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("take.txt", "hello").unwrap();
    assert_eq!(first.file_name().unwrap(), "take.txt");
    assert_eq!(fs::read_to_string(&first).unwrap(), "hello");

    let second = writer.write("take.txt", "world").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "world");
}

#[test]
fn wav_written_through_writer_reads_back() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().join("outputs"));
    let audio = Synthesis {
        samples: vec![0.5, -0.5, 0.0],
        sample_rate: 24_000,
    };

    let path = writer
        .write_with("take.wav", |out| audio.write_wav(out).map_err(|e| e.to_string()))
        .unwrap();

    assert_eq!(Synthesis::read_wav(&path).unwrap(), audio);
}

#[test]
fn encoder_error_leaves_no_file() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let result = writer.write_with("broken.wav", |out| {
        out.write_all(b"RIFF").map_err(|e| e.to_string())?;
        Err("encoder gave up".to_string())
    });

    assert!(matches!(
        result,
        Err(PersistError::Encode { ref filename, .. }) if filename == "broken.wav"
    ));
    let leftovers: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn no_partial_file_when_dir_is_a_file() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("take.wav", "data");
    assert!(result.is_err());
    assert!(!file_path.with_file_name("take.wav").exists());
}
