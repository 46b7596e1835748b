//! Offline parsing of a saved response.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tagstream_core::{Config, ResponseAssembler, SessionSnapshot};

use crate::cli::render;

pub fn run(config: &Config, file: Option<&Path>, chunk_size: Option<usize>, json: bool) -> Result<()> {
    let input = read_input(file)?;
    let snapshot = assemble(config, &input, chunk_size)?;

    if json {
        let out = serde_json::to_string_pretty(&snapshot.parsed).context("serialize response")?;
        println!("{out}");
    } else {
        print!("{}", render::response(&snapshot.parsed));
    }
    Ok(())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => {
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        _ => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("read stdin")?;
            Ok(input)
        }
    }
}

/// Runs `input` through an assembler, `chunk_size` characters at a time.
fn assemble(config: &Config, input: &str, chunk_size: Option<usize>) -> Result<SessionSnapshot> {
    let mut assembler = ResponseAssembler::new(Arc::new(config.vocabulary()));
    assembler.begin_turn(None);

    match chunk_size {
        Some(0) => bail!("--chunk-size must be at least 1"),
        Some(size) => {
            for chunk in chunks(input, size) {
                assembler.apply_delta(chunk);
            }
        }
        None => {
            assembler.apply_delta(input);
        }
    }
    Ok(assembler.mark_complete())
}

/// Splits on character boundaries.
fn chunks(input: &str, size: usize) -> impl Iterator<Item = &str> {
    let mut rest = input;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let end = rest
            .char_indices()
            .nth(size)
            .map_or(rest.len(), |(index, _)| index);
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_respect_char_boundaries() {
        let parts: Vec<&str> = chunks("héllo", 2).collect();
        assert_eq!(parts, vec!["hé", "ll", "o"]);
    }

    #[test]
    fn test_assemble_is_chunk_invariant() {
        let config = Config::default();
        let input = "<response><thought>plan</thought><result>ok</result></response>";
        let whole = assemble(&config, input, None).unwrap();
        for size in [1, 3, 7] {
            let chunked = assemble(&config, input, Some(size)).unwrap();
            assert_eq!(chunked.parsed, whole.parsed, "chunk size {size}");
        }
        assert_eq!(whole.parsed.text("result"), Some("ok"));
        assert!(whole.complete);
    }

    #[test]
    fn test_assemble_rejects_zero_chunk_size() {
        let err = assemble(&Config::default(), "<result>x</result>", Some(0)).unwrap_err();
        assert!(err.to_string().contains("chunk-size"));
    }
}
