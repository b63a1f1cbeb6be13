//! Before/after hook execution.
//!
//! Hooks run through the platform shell with the spec file's directory
//! as working directory. A bare command token resolves first as an
//! absolute path, then as a file under the base directory, then through
//! PATH.

use std::path::Path;

use crate::error::{Error, Result};

/// Runs a hook command. Non-zero exit is an execution error carrying
/// the exit code.
pub async fn run_hook(command: &str, base_dir: &Path) -> Result<()> {
    let command = prepare_command(command, base_dir);
    let (shell, flag) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };

    let status = tokio::process::Command::new(shell)
        .arg(flag)
        .arg(&command)
        .current_dir(base_dir)
        .status()
        .await
        .map_err(|e| Error::Execution(format!("hook '{command}' failed to start: {e}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::Execution(format!(
            "hook '{command}' exited with {}",
            status.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
        )))
    }
}

/// Rewrites the leading token so scripts that live next to the spec
/// file run without an explicit `./` prefix.
fn prepare_command(command: &str, base_dir: &Path) -> String {
    let mut parts = command.splitn(2, char::is_whitespace);
    let head = match parts.next() {
        Some(head) if !head.is_empty() => head,
        _ => return command.to_string(),
    };
    let rest = parts.next().unwrap_or("");

    if Path::new(head).is_absolute() {
        return command.to_string();
    }
    if !head.contains('/') && base_dir.join(head).is_file() {
        let rewritten = format!("./{head}");
        return if rest.is_empty() {
            rewritten
        } else {
            format!("{rewritten} {rest}")
        };
    }
    command.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_hook() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_hook("true", dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_hook_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_hook("exit 3", dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("exited with 3"));
    }

    #[tokio::test]
    async fn test_hook_runs_in_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        run_hook("pwd > cwd.txt", dir.path()).await.unwrap();
        let recorded = std::fs::read_to_string(dir.path().join("cwd.txt")).unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::fs::canonicalize(recorded.trim()).unwrap(),
            canonical
        );
    }

    #[tokio::test]
    async fn test_base_dir_script_resolves_without_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("seed.sh");
        std::fs::write(&script, "#!/bin/sh\necho seeded > out.txt\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        run_hook("seed.sh", dir.path()).await.unwrap();
        assert!(dir.path().join("out.txt").exists());
    }
}
