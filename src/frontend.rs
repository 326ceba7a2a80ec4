//! Terminal front end for a running sweep.
//!
//! [`drive`] drains the worker's events on the calling thread: progress goes
//! to an indicatif bar, status lines replace its message, and duplicate
//! groups are put to the user on stdin while the bar is hidden.

use std::io::{self, BufRead, Write};

use bytesize::ByteSize;
use yansi::Paint;

use crate::duplicates::{Decision, FinderError, ResolutionRequest, RunHandle, RunSummary};
use crate::events::EngineEvent;
use crate::progress::ProgressRenderer;

/// Drain events until the worker finishes, then join it.
///
/// # Errors
///
/// Whatever the worker returned, or [`FinderError::WorkerPanicked`].
pub fn drive(handle: RunHandle, quiet: bool) -> Result<RunSummary, FinderError> {
    let renderer = ProgressRenderer::new(quiet);

    for event in handle.events.iter() {
        match event {
            EngineEvent::Progress(snapshot) => renderer.update(&snapshot),
            EngineEvent::Status(message) => renderer.status(&message),
            EngineEvent::DuplicateGroupFound(request) => {
                let decision = renderer.suspend(|| {
                    let stdin = io::stdin();
                    let mut input = stdin.lock();
                    let mut output = io::stderr();
                    prompt_decision(&request, &mut input, &mut output)
                });
                let decision = decision.unwrap_or_else(|e| {
                    log::warn!("Could not read answer: {}", e);
                    Decision::Cancel
                });
                if !request.respond(decision) {
                    log::debug!("Worker stopped waiting for an answer");
                }
            }
            EngineEvent::Error {
                message,
                user_facing,
            } => {
                if user_facing && !quiet {
                    renderer.suspend(|| {
                        let _ = writeln!(io::stderr(), "{} {}", "error:".red().bold(), message);
                    });
                }
            }
            EngineEvent::Finished(_) => {
                renderer.finish();
                break;
            }
        }
    }
    renderer.finish();

    handle.join()
}

/// Ask about one group until a well-formed answer or end of input.
///
/// End of input is a cancellation. Answers that parse but name members the
/// group does not have go back to the resolver, which re-asks.
///
/// # Errors
///
/// I/O errors on either stream.
pub fn prompt_decision<R: BufRead, W: Write>(
    request: &ResolutionRequest,
    input: &mut R,
    output: &mut W,
) -> io::Result<Decision> {
    writeln!(
        output,
        "\n{} {} ({} files, {} each)",
        "Duplicate group".bold(),
        request.group_id + 1,
        request.paths.len(),
        ByteSize(request.size)
    )?;
    if let Some(error) = &request.previous_error {
        writeln!(output, "{} {}", "Rejected:".yellow(), error)?;
    }
    for (i, path) in request.paths.iter().enumerate() {
        let tag = if i == 0 { " (original)" } else { "" };
        writeln!(output, "  {:>3}. {}{}", i + 1, path.display(), tag.dim())?;
    }

    loop {
        write!(output, "Keep which? [numbers, a=all, n=none, s=skip]: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Decision::Cancel);
        }
        match parse_decision(&line, request.paths.len()) {
            Ok(decision) => return Ok(decision),
            Err(message) => writeln!(output, "{} {}", "Invalid:".yellow(), message)?,
        }
    }
}

/// Parse one answer line.
///
/// Numbers are 1-based and may be separated by commas or spaces.
///
/// # Errors
///
/// A message for the user when the line is not an answer at all.
pub fn parse_decision(input: &str, len: usize) -> Result<Decision, String> {
    let trimmed = input.trim().to_ascii_lowercase();
    match trimmed.as_str() {
        "" => return Err("no answer given".to_string()),
        "c" | "cancel" | "s" | "skip" => return Ok(Decision::Cancel),
        "n" | "none" => return Ok(Decision::KeepNone),
        "a" | "all" => return Ok(Decision::Keep((0..len).collect())),
        _ => {}
    }

    let mut indices = Vec::new();
    for token in trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let number: usize = token
            .parse()
            .map_err(|_| format!("'{}' is not a number", token))?;
        if number == 0 {
            return Err("numbering starts at 1".to_string());
        }
        indices.push(number - 1);
    }
    Ok(Decision::Keep(indices))
}
