//! Interactive overwrite confirmation.

use std::io::{self, BufRead, Write};
use std::path::Path;

/// Asks whether `path` may be removed; any answer starting with `y` accepts.
pub fn ask_overwrite<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    path: &Path,
) -> io::Result<bool> {
    write!(
        output,
        "'{}' exists. Do you want to remove it ? (y/n): ",
        path.display()
    )?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().to_ascii_lowercase().starts_with('y'))
}
