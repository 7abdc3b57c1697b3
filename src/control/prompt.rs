//! Interactive prompts.
//!
//! Both prompts take their input and output streams as parameters so they
//! can be driven from tests; the binary passes locked stdin and stderr.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::endpoint::Endpoint;

/// Ask for an endpoint until the input resolves.
///
/// Blank input (or end of input) selects the default endpoint. Invalid
/// input prints the reason and asks again.
pub fn prompt_endpoint<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> io::Result<Endpoint> {
    loop {
        write!(
            output,
            "Enter LiDAR TCP endpoint [host:port] (default {}): ",
            Endpoint::default()
        )?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(Endpoint::default());
        }

        match Endpoint::parse_or_default(&line) {
            Ok(endpoint) => return Ok(endpoint),
            Err(e) => writeln!(output, "{}", e)?,
        }
    }
}

/// Ask where to save the capture.
///
/// Returns `None` if the user leaves the answer blank.
pub fn prompt_output_path<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> io::Result<Option<PathBuf>> {
    write!(
        output,
        "Enter output path for the merged PCD file (leave empty to cancel): "
    )?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    let path = line.trim();
    if path.is_empty() {
        return Ok(None);
    }
    Ok(Some(PathBuf::from(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_blank_endpoint_uses_default() {
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        let endpoint = prompt_endpoint(&mut input, &mut output).unwrap();

        assert_eq!(endpoint, Endpoint::default());
        assert!(String::from_utf8(output).unwrap().contains("127.0.0.1:23511"));
    }

    #[test]
    fn test_invalid_endpoint_reprompts() {
        let mut input = Cursor::new("badinput\nhost:99999\n[::1]:23511\n");
        let mut output = Vec::new();

        let endpoint = prompt_endpoint(&mut input, &mut output).unwrap();

        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.port(), 23511);
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("Enter LiDAR TCP endpoint").count(), 3);
        assert!(text.contains("host:port"));
    }

    #[test]
    fn test_end_of_input_uses_default() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();

        let endpoint = prompt_endpoint(&mut input, &mut output).unwrap();
        assert_eq!(endpoint, Endpoint::default());
    }

    #[test]
    fn test_output_path() {
        let mut input = Cursor::new("  /tmp/scan.pcd \r\n");
        let mut output = Vec::new();

        let path = prompt_output_path(&mut input, &mut output).unwrap();
        assert_eq!(path, Some(PathBuf::from("/tmp/scan.pcd")));
    }

    #[test]
    fn test_blank_output_path_cancels() {
        let mut input = Cursor::new("\n");
        let mut output = Vec::new();

        assert_eq!(prompt_output_path(&mut input, &mut output).unwrap(), None);
    }
}
