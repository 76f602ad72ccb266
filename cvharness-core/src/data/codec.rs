//! Plain-text training-data format.
//!
//! ```text
//! <num_data> <num_input> <num_output>
//! <input values of example 0>
//! <output values of example 0>
//! ...
//! ```

use crate::data::corpus::{Corpus, Example};
use crate::error::{HarnessError, Result};
use crate::persistence::atomic_write;
use std::fmt::Write as _;
use std::path::Path;

/// Parse a corpus from its text form. `origin` names the source in error messages.
pub fn parse_corpus(text: &str, origin: &str) -> Result<Corpus> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (header_line, header) = lines
        .next()
        .ok_or_else(|| HarnessError::data(format!("{origin}: empty file")))?;
    let header = parse_values::<usize>(header, origin, header_line)?;
    let &[num_data, num_input, num_output] = header.as_slice() else {
        return Err(HarnessError::data(format!(
            "{origin}:{header_line}: header needs 3 fields, found {}",
            header.len()
        )));
    };

    // two lines per example bound what a header count can claim
    let mut examples = Vec::with_capacity(num_data.min(text.lines().count() / 2));
    for _ in 0..num_data {
        let (in_line, input) = lines.next().ok_or_else(|| {
            HarnessError::data(format!(
                "{origin}: expected {num_data} examples, found {}",
                examples.len()
            ))
        })?;
        let input = parse_values::<f32>(input, origin, in_line)?;
        check_width(input.len(), num_input, origin, in_line)?;

        let (out_line, output) = lines.next().ok_or_else(|| {
            HarnessError::data(format!("{origin}:{in_line}: example has no output line"))
        })?;
        let output = parse_values::<f32>(output, origin, out_line)?;
        check_width(output.len(), num_output, origin, out_line)?;

        examples.push(Example::new(input, output));
    }

    if let Some((line, _)) = lines.next() {
        return Err(HarnessError::data(format!(
            "{origin}:{line}: trailing data after {num_data} examples"
        )));
    }

    Corpus::from_examples(num_input, num_output, examples)
}

fn parse_values<T: std::str::FromStr>(line: &str, origin: &str, number: usize) -> Result<Vec<T>> {
    line.split_whitespace()
        .map(|field| {
            field.parse::<T>().map_err(|_| {
                HarnessError::data(format!("{origin}:{number}: invalid value '{field}'"))
            })
        })
        .collect()
}

fn check_width(found: usize, expected: usize, origin: &str, number: usize) -> Result<()> {
    if found != expected {
        return Err(HarnessError::data(format!(
            "{origin}:{number}: expected {expected} values, found {found}"
        )));
    }
    Ok(())
}

/// Render a corpus in its text form.
pub fn format_corpus(corpus: &Corpus) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} {}",
        corpus.len(),
        corpus.num_input(),
        corpus.num_output()
    );
    for example in corpus {
        write_row(&mut out, &example.input);
        write_row(&mut out, &example.output);
    }
    out
}

fn write_row(out: &mut String, values: &[f32]) {
    let row: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    out.push_str(&row.join(" "));
    out.push('\n');
}

/// Read a corpus file.
pub fn read_corpus(path: &Path) -> Result<Corpus> {
    let text = std::fs::read_to_string(path)?;
    parse_corpus(&text, &path.display().to_string())
}

/// Write a corpus file atomically.
pub fn write_corpus(path: &Path, corpus: &Corpus) -> Result<()> {
    atomic_write(path, format_corpus(corpus).as_bytes())?;
    Ok(())
}

/// Write `predictions` as the outputs of the examples of `inputs`.
pub fn write_predictions(path: &Path, inputs: &Corpus, predictions: &[Vec<f32>]) -> Result<()> {
    if predictions.len() != inputs.len() {
        return Err(HarnessError::partition(
            "prediction export",
            inputs.len(),
            predictions.len(),
        ));
    }
    let num_output = predictions.first().map_or(inputs.num_output(), Vec::len);
    let examples = inputs
        .iter()
        .zip(predictions)
        .map(|(example, predicted)| Example::new(example.input.clone(), predicted.clone()))
        .collect();
    let corpus = Corpus::from_examples(inputs.num_input(), num_output, examples)?;
    write_corpus(path, &corpus)
}
