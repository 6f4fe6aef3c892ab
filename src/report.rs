//! Prints an [AggregatedResult] for people to read.
//!
//! [print_result] locks stdout for the whole report and hands it to [_print_result], which holds
//! all of the formatting logic and writes to anything that implements [Write] so it can be tested
//! against a buffer.
//!
//! The layout, for each host in inventory order:
//!
//! ```text
//! * veos01 ** changed : false ***************************************************
//! vvvv Task example and explanation function. ** changed : false vvvvvvvvvvvvvvvv INFO
//! Example task finished!
//! ---- Logging example. ** changed : false -------------------------------------- INFO
//! Task Logging example. made some log updates
//! ...
//! ^^^^ END Task example and explanation function. ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^
//! ```

use crate::task::{AggregatedResult, TaskResult};
use serde_json::Value;
use std::io::{self, Write};

/// Banner lines are padded out to this many columns.
pub const WIDTH: usize = 80;

/// Prints `result` to stdout.
pub fn print_result(result: &AggregatedResult) -> io::Result<()> {
    // Hold the lock for the whole report so nothing else interleaves with it.
    let mut stdout = io::stdout().lock();
    _print_result(&mut stdout, result)?;
    stdout.flush()
}

/// A testable method containing the logic for printing an [AggregatedResult].
pub fn _print_result<W: Write>(mut out: W, result: &AggregatedResult) -> io::Result<()> {
    writeln!(out, "{}", pad(&result.name, '*'))?;
    for (host, host_result) in result.iter() {
        let header = format!("* {host} ** changed : {} ", host_result.any_changed());
        writeln!(out, "{}", pad(&header, '*'))?;
        print_task(&mut out, host_result, true)?;
        writeln!(out, "{}", pad(&format!("^^^^ END {} ", host_result.name), '^'))?;
    }
    Ok(())
}

fn print_task<W: Write>(out: &mut W, result: &TaskResult, top: bool) -> io::Result<()> {
    let (marker, fill) = if top { ("vvvv", 'v') } else { ("----", '-') };
    let header = format!("{marker} {} ** changed : {} ", result.name, result.changed);
    writeln!(out, "{} {}", pad(&header, fill), result.severity)?;

    match &result.result {
        Value::Null => {}
        Value::String(text) => writeln!(out, "{text}")?,
        other => {
            let pretty = serde_json::to_string_pretty(other).map_err(io::Error::from)?;
            writeln!(out, "{pretty}")?;
        }
    }

    if !result.diff.is_empty() {
        write!(out, "{}", result.diff)?;
        if !result.diff.ends_with('\n') {
            writeln!(out)?;
        }
    }

    if let Some(exception) = &result.exception {
        writeln!(out, "{exception}")?;
    }

    for subtask in &result.subtasks {
        print_task(out, subtask, false)?;
    }
    Ok(())
}

/// Pads `line` with `fill` out to [WIDTH] columns. Longer lines are left alone.
fn pad(line: &str, fill: char) -> String {
    let len = line.chars().count();
    let mut padded = line.to_string();
    padded.extend(std::iter::repeat(fill).take(WIDTH.saturating_sub(len)));
    padded
}
