//! Per-corpus JSONL loaders.
//!
//! Each corpus is read from `{data_dir}/{name}.jsonl`, one record per line, using the
//! field names of its public release. `sampleqa` is built in and needs no file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::error::{DatasetError, DatasetResult};
use super::{DatasetName, Sample};

#[derive(Debug, Deserialize)]
struct SciQRecord {
    question: String,
    correct_answer: String,
}

#[derive(Debug, Deserialize)]
struct CoQaAnswers {
    input_text: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CoQaRecord {
    story: String,
    questions: Vec<String>,
    answers: CoQaAnswers,
}

#[derive(Debug, Deserialize)]
struct TriviaQaAnswer {
    value: String,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TriviaQaRecord {
    question: String,
    answer: TriviaQaAnswer,
}

/// Loads `name` in file order. The order is the batch order of the run.
pub fn load_dataset(name: DatasetName, data_dir: &Path) -> DatasetResult<Vec<Sample>> {
    let samples = match name {
        DatasetName::SampleQa => sample_qa(),
        DatasetName::SciQ => load_sciq(&dataset_path(name, data_dir))?,
        DatasetName::CoQa => load_coqa(&dataset_path(name, data_dir))?,
        DatasetName::TriviaQa => load_triviaqa(&dataset_path(name, data_dir))?,
    };

    info!(dataset = %name, samples = samples.len(), "Dataset loaded");
    Ok(samples)
}

fn dataset_path(name: DatasetName, data_dir: &Path) -> PathBuf {
    data_dir.join(format!("{}.jsonl", name.as_str()))
}

fn load_sciq(path: &Path) -> DatasetResult<Vec<Sample>> {
    read_jsonl::<SciQRecord>(path)?
        .into_iter()
        .map(|(line, record)| {
            require_text(path, line, "question", &record.question)?;
            Ok(Sample::new(record.question, record.correct_answer))
        })
        .collect()
}

fn load_coqa(path: &Path) -> DatasetResult<Vec<Sample>> {
    let mut samples = Vec::new();

    for (line, record) in read_jsonl::<CoQaRecord>(path)? {
        if record.questions.len() != record.answers.input_text.len() {
            return Err(DatasetError::InvalidRecord {
                path: path.to_path_buf(),
                line,
                reason: format!(
                    "{} questions but {} answers",
                    record.questions.len(),
                    record.answers.input_text.len()
                ),
            });
        }

        for (question, answer) in record
            .questions
            .into_iter()
            .zip(record.answers.input_text)
        {
            require_text(path, line, "question", &question)?;
            samples.push(Sample::new(question, answer).context(record.story.clone()));
        }
    }

    Ok(samples)
}

fn load_triviaqa(path: &Path) -> DatasetResult<Vec<Sample>> {
    read_jsonl::<TriviaQaRecord>(path)?
        .into_iter()
        .map(|(line, record)| {
            require_text(path, line, "question", &record.question)?;

            let mut references = vec![record.answer.value];
            for alias in record.answer.aliases {
                if !references.contains(&alias) {
                    references.push(alias);
                }
            }

            Ok(Sample::with_references(record.question, references))
        })
        .collect()
}

/// Small built-in corpus for smoke runs.
pub fn sample_qa() -> Vec<Sample> {
    vec![
        Sample::new("What is the capital of France?", "Paris"),
        Sample::new("How many legs does a spider have?", "eight"),
        Sample::new("What gas do plants absorb from the air?", "carbon dioxide"),
        Sample::new("Who wrote Romeo and Juliet?", "William Shakespeare"),
        Sample::new("What is the largest planet in the solar system?", "Jupiter"),
        Sample::new("What is the chemical symbol for gold?", "Au"),
        Sample::new("How many continents are there?", "seven"),
        Sample::new("What is the boiling point of water in Celsius?", "100"),
    ]
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> DatasetResult<Vec<(usize, T)>> {
    if !path.exists() {
        return Err(DatasetError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str(&line).map_err(|e| DatasetError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            source: e,
        })?;
        records.push((line_no, record));
    }

    debug!(path = %path.display(), records = records.len(), "Read JSONL records");
    Ok(records)
}

fn require_text(path: &Path, line: usize, field: &str, value: &str) -> DatasetResult<()> {
    if value.trim().is_empty() {
        return Err(DatasetError::InvalidRecord {
            path: path.to_path_buf(),
            line,
            reason: format!("empty {field}"),
        });
    }
    Ok(())
}
