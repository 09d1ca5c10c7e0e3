//! External render step — hands the persisted CV to the `rendercv` tool.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::info;

use crate::errors::AppError;

/// Invokes the external renderer on the persisted CV, forwarding its output
/// streams line by line as they are produced.
///
/// Any failure (the binary missing, a non-zero exit, the timeout) comes back
/// as `AppError::Render` for the caller to report. The persisted CV is
/// untouched either way.
pub async fn run_render(
    command: &str,
    cv_path: &Path,
    timeout: Duration,
) -> Result<(), AppError> {
    info!("Rendering {} with '{command} render'", cv_path.display());

    let mut child = Command::new(command)
        .arg("render")
        .arg(cv_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AppError::Render(format!("could not start '{command}': {e}")))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = tokio::spawn(async move {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                println!("{line}");
            }
        }
    });
    let err_task = tokio::spawn(async move {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                eprintln!("{line}");
            }
        }
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(waited) => {
            waited.map_err(|e| AppError::Render(format!("renderer failed: {e}")))?
        }
        Err(_) => {
            let _ = child.kill().await;
            return Err(AppError::Render(format!(
                "renderer did not finish within {}s",
                timeout.as_secs()
            )));
        }
    };

    let _ = out_task.await;
    let _ = err_task.await;

    if !status.success() {
        return Err(AppError::Render(format!("renderer exited with {status}")));
    }

    info!("Render complete");
    Ok(())
}
