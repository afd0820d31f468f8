//! Synchronous "run and capture" for the external tools.
//!
//! A tool runs in the run directory with stdin closed and stdout/stderr merged
//! into a single pipe. Each output line goes to a caller-supplied sink.

use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::Error;
use crate::tsv::is_nonempty_file;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs `cmd` in `run_dir` and blocks until it exits, passing every output
/// line to `sink`. A non-zero exit status or death by signal is an error.
pub fn run_tool(cmd: &ToolCommand, run_dir: &Path, sink: &mut dyn FnMut(&str)) -> Result<(), Error> {
    let tool_error = |reason: String| Error::Tool {
        command: cmd.to_string(),
        reason,
    };

    let (reader, writer) = std::io::pipe().map_err(|e| tool_error(format!("pipe: {e}")))?;
    let stdout_writer = writer
        .try_clone()
        .map_err(|e| tool_error(format!("pipe: {e}")))?;

    // The Command holds the only copies of the write end; dropping it at the
    // end of this statement lets the reader see EOF when the child exits.
    let mut child = Command::new(&cmd.program)
        .args(&cmd.args)
        .current_dir(run_dir)
        .stdin(Stdio::null())
        .stdout(stdout_writer)
        .stderr(writer)
        .spawn()
        .map_err(|e| tool_error(format!("failed to start: {e}")))?;

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| tool_error(format!("failed reading output: {e}")))?;
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        sink(line.trim_end_matches(['\r', '\n']));
    }

    let status = child
        .wait()
        .map_err(|e| tool_error(format!("failed waiting for exit: {e}")))?;
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(tool_error(format!("exited with code {code}"))),
        None => Err(tool_error("terminated by a signal".to_string())),
    }
}

/// Whether a stage producing `output` has to run.
pub fn needs_run(output: &Path, force_redo: bool) -> bool {
    force_redo || !is_nonempty_file(output)
}

/// Outcome of a memoized stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Ran,
    Cached,
}

/// Runs `cmd` unless `output` already holds a previous result. The output
/// must exist and be non-empty afterwards.
pub fn run_memoized(
    cmd: &ToolCommand,
    run_dir: &Path,
    output: &Path,
    force_redo: bool,
    sink: &mut dyn FnMut(&str),
) -> Result<StageStatus, Error> {
    if !needs_run(output, force_redo) {
        return Ok(StageStatus::Cached);
    }
    run_tool(cmd, run_dir, sink)?;
    if !is_nonempty_file(output) {
        return Err(Error::Tool {
            command: cmd.to_string(),
            reason: format!("expected output {} is missing or empty", output.display()),
        });
    }
    Ok(StageStatus::Ran)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("/bin/sh").args(["-c", script])
    }

    #[test]
    fn display_is_full_command_line() {
        let cmd = ToolCommand::new("mmseqs")
            .arg("easy-cluster")
            .args(["in.faa", "out"]);
        assert_eq!(cmd.to_string(), "mmseqs easy-cluster in.faa out");
    }

    #[test]
    fn merges_stdout_and_stderr_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();
        run_tool(
            &sh("echo one; echo two 1>&2; echo three"),
            dir.path(),
            &mut |l| lines.push(l.to_string()),
        )
        .unwrap();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn runs_in_run_dir_with_closed_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();
        run_tool(
            &sh("touch marker; cat; echo done"),
            dir.path(),
            &mut |l| lines.push(l.to_string()),
        )
        .unwrap();
        assert!(dir.path().join("marker").exists());
        assert_eq!(lines, vec!["done"]);
    }

    #[test]
    fn nonzero_exit_reports_command_and_code() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_tool(&sh("exit 3"), dir.path(), &mut |_| {}).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("/bin/sh -c exit 3"), "{msg}");
        assert!(msg.contains("code 3"), "{msg}");
    }

    #[test]
    fn missing_program_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_tool(
            &ToolCommand::new("/nonexistent/tool"),
            dir.path(),
            &mut |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }

    #[test]
    fn memoized_stage_skips_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let cmd = sh("echo run >> log; echo result > out.txt");

        let status = run_memoized(&cmd, dir.path(), &out, false, &mut |_| {}).unwrap();
        assert_eq!(status, StageStatus::Ran);
        let status = run_memoized(&cmd, dir.path(), &out, false, &mut |_| {}).unwrap();
        assert_eq!(status, StageStatus::Cached);
        assert_eq!(fs::read_to_string(dir.path().join("log")).unwrap(), "run\n");

        let status = run_memoized(&cmd, dir.path(), &out, true, &mut |_| {}).unwrap();
        assert_eq!(status, StageStatus::Ran);
        assert_eq!(fs::read_to_string(dir.path().join("log")).unwrap(), "run\nrun\n");
    }

    #[test]
    fn memoized_stage_requires_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never.txt");
        let err = run_memoized(&sh("true"), dir.path(), &out, false, &mut |_| {}).unwrap_err();
        assert!(err.to_string().contains("missing or empty"));
    }
}
