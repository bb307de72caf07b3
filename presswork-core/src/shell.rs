//! External command execution for handlers that shell out to Ghostscript
//! and friends.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use crate::error::{EngineError, Result};
use crate::logger::JobLogger;

/// Runs a binary to completion, capturing combined output. The child is
/// placed in its own process group so a termination signal aimed at the
/// runner reaches every descendant the tool may have spawned.
///
/// On a non-zero exit the captured output is written to the job log line by
/// line and an `External` error is returned.
pub async fn exec_subgroup<I, S>(logger: &JobLogger, binary: &Path, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut std_cmd = std::process::Command::new(binary);
    std_cmd.args(args);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_cmd.process_group(0);
    }

    let mut cmd = tokio::process::Command::from(std_cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd.output().await.map_err(|e| {
        EngineError::External(format!("unable to run {}: {e}", binary.display()))
    })?;

    if !output.status.success() {
        for chunk in [&output.stdout, &output.stderr] {
            for line in String::from_utf8_lossy(chunk).lines() {
                if !line.is_empty() {
                    logger.debug(&format!("--> {line}")).await;
                }
            }
        }
        return Err(EngineError::External(format!(
            "{} exited with {}",
            binary.display(),
            output.status
        )));
    }

    Ok(())
}
