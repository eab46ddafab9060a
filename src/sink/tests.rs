use super::*;
use crate::pipeline::{Measurement, Verdict};
use tempfile::TempDir;

fn row(id: u64) -> ResultRow {
    ResultRow {
        id,
        question: format!("Question {id}, with a comma?"),
        generated_answer: "Paris".to_string(),
        uncertainty: Measurement::Value(0.5),
        correct: Verdict::Correct(true),
        similarity: Measurement::NotApplicable,
    }
}

fn lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

const HEADER: &str = "id,question,generated_answer,uncertainty,correct,similarity_score";

#[test]
fn test_destination_mode_parse() {
    for mode in DestinationMode::ALL {
        assert_eq!(mode.as_str().parse::<DestinationMode>().unwrap(), mode);
    }
    assert_eq!(
        "error_if_exists".parse::<DestinationMode>().unwrap(),
        DestinationMode::ErrorIfExists
    );
    assert_eq!(DestinationMode::default(), DestinationMode::Append);
    assert!(matches!(
        "merge".parse::<DestinationMode>(),
        Err(SinkError::InvalidMode { .. })
    ));
}

#[test]
fn test_csv_sink_writes_header_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results_sampleqa.csv");

    let mut sink = CsvSink::open(&path, DestinationMode::Append).unwrap();
    sink.append(&row(0)).unwrap();
    sink.append(&row(1)).unwrap();

    let lines = lines(&path);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines[1], "0,\"Question 0, with a comma?\",Paris,0.5,true,NA");
    assert_eq!(sink.rows_written(), 2);
    assert_eq!(sink.resume_after(), None);
}

#[test]
fn test_csv_sink_creates_parent_dirs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/out/results.csv");

    let mut sink = CsvSink::open(&path, DestinationMode::Append).unwrap();
    sink.append(&row(0)).unwrap();
    assert!(path.exists());
    assert_eq!(sink.path(), path.as_path());
}

#[test]
fn test_append_mode_repeats_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");

    CsvSink::open(&path, DestinationMode::Append)
        .unwrap()
        .append(&row(0))
        .unwrap();
    CsvSink::open(&path, DestinationMode::Append)
        .unwrap()
        .append(&row(0))
        .unwrap();

    let lines = lines(&path);
    assert_eq!(lines.len(), 4);
    assert_eq!(lines.iter().filter(|l| l.as_str() == HEADER).count(), 2);
}

#[test]
fn test_overwrite_mode_truncates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    std::fs::write(&path, "stale\ncontent\n").unwrap();

    let mut sink = CsvSink::open(&path, DestinationMode::Overwrite).unwrap();
    sink.append(&row(0)).unwrap();

    let lines = lines(&path);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], HEADER);
}

#[test]
fn test_error_if_exists_mode() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");

    assert!(CsvSink::open(&path, DestinationMode::ErrorIfExists).is_ok());

    std::fs::write(&path, "").unwrap();
    let err = CsvSink::open(&path, DestinationMode::ErrorIfExists).unwrap_err();
    assert!(matches!(err, SinkError::DestinationExists { .. }));
}

#[test]
fn test_resume_mode_suppresses_header_and_reports_last_id() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");

    {
        let mut sink = CsvSink::open(&path, DestinationMode::Append).unwrap();
        for id in 0..3 {
            sink.append(&row(id)).unwrap();
        }
    }

    let mut sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    assert_eq!(sink.resume_after(), Some(2));
    sink.append(&row(3)).unwrap();

    let lines = lines(&path);
    assert_eq!(lines.len(), 5);
    assert_eq!(lines.iter().filter(|l| l.as_str() == HEADER).count(), 1);
    assert!(lines[4].starts_with("3,"));
}

#[test]
fn test_resume_mode_fresh_destination() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");

    let mut sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    assert_eq!(sink.resume_after(), None);
    sink.append(&row(0)).unwrap();
    assert_eq!(lines(&path)[0], HEADER);
}

#[test]
fn test_resume_skips_repeated_headers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    std::fs::write(
        &path,
        format!("{HEADER}\n0,q,a,1,true,NA\n{HEADER}\n1,q,a,undefined,false,NA\n"),
    )
    .unwrap();

    let sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    assert_eq!(sink.resume_after(), Some(1));
}

#[test]
fn test_resume_discards_torn_trailing_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    std::fs::write(&path, format!("{HEADER}\n0,q,a,1.0,true,NA\n1,What is")).unwrap();

    let mut sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    assert_eq!(sink.resume_after(), Some(0));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        format!("{HEADER}\n0,q,a,1.0,true,NA\n")
    );

    sink.append(&row(1)).unwrap();
    let lines = lines(&path);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2], "1,\"Question 1, with a comma?\",Paris,0.5,true,NA");
}

#[test]
fn test_resume_discards_unterminated_full_width_record() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    std::fs::write(
        &path,
        format!("{HEADER}\n0,q,a,1.0,true,NA\n1,q,a,0.5,false,N"),
    )
    .unwrap();

    let sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    assert_eq!(sink.resume_after(), Some(0));
    assert_eq!(lines(&path).len(), 2);
}

#[test]
fn test_resume_with_torn_header_starts_over() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    std::fs::write(&path, "id,question,gener").unwrap();

    let mut sink = CsvSink::open(&path, DestinationMode::Resume).unwrap();
    assert_eq!(sink.resume_after(), None);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

    sink.append(&row(0)).unwrap();
    let lines = lines(&path);
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines.len(), 2);
}

#[test]
fn test_overwrite_keeps_existing_file_until_first_row() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    std::fs::write(&path, "previous results\n").unwrap();

    let mut sink = CsvSink::open(&path, DestinationMode::Overwrite).unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "previous results\n"
    );

    sink.append(&row(0)).unwrap();
    sink.append(&row(1)).unwrap();
    let lines = lines(&path);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], HEADER);
    assert!(lines[2].starts_with("1,"));
}

#[test]
fn test_write_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("results.csv");
    let mut sink = CsvSink::open(&path, DestinationMode::Append).unwrap();

    // A directory where the file should be makes every open fail.
    std::fs::create_dir(&path).unwrap();
    let err = sink.append(&row(7)).unwrap_err();
    assert!(matches!(err, SinkError::WriteFailed { id: 7, .. }));
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(sink.rows_written(), 0);
}

#[test]
fn test_memory_sink_failure_injection() {
    let mut sink = MemorySink::failing_after(1);
    sink.append(&row(0)).unwrap();
    assert!(sink.append(&row(1)).is_err());
    assert_eq!(sink.ids(), vec![0]);
    assert_eq!(sink.rows_written(), 1);
}
