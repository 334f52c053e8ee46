// src/exec/launch.rs

//! Spawn parameters for one process, and how they are resolved against the
//! filesystem before the OS is asked to create anything.

use std::env;
use std::path::{Path, PathBuf};

use crate::errors::{ProcregError, Result};

/// Everything needed to start one process.
///
/// Arguments are an explicit list; no shell ever sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable: String,
    pub args: Vec<String>,
    /// Empty means the current directory of the registry process.
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    pub fn new<I, S>(executable: impl Into<String>, args: I, working_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: working_dir.into(),
        }
    }

    /// Build a spec from a single argument string, split with shell-words
    /// quoting rules (`a "b c"` gives two arguments).
    pub fn from_command_line(
        executable: impl Into<String>,
        arguments: &str,
        working_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let executable = executable.into();
        let args = shell_words::split(arguments).map_err(|e| {
            ProcregError::spawn(&executable, format!("cannot split arguments '{arguments}': {e}"))
        })?;
        Ok(Self {
            executable,
            args,
            working_dir: working_dir.into(),
        })
    }

    /// Resolve working directory and executable into concrete paths.
    pub fn resolve(&self) -> Result<ResolvedLaunch> {
        let working_dir = resolve_working_dir(&self.executable, &self.working_dir)?;
        let program = resolve_executable(&self.executable, &working_dir)?;
        Ok(ResolvedLaunch {
            program,
            working_dir,
        })
    }
}

/// Concrete paths produced by [`LaunchSpec::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLaunch {
    pub program: PathBuf,
    pub working_dir: PathBuf,
}

fn resolve_working_dir(executable: &str, dir: &Path) -> Result<PathBuf> {
    if dir.as_os_str().is_empty() {
        return env::current_dir().map_err(|e| {
            ProcregError::spawn(executable, format!("cannot determine current directory: {e}"))
        });
    }
    if !dir.is_dir() {
        return Err(ProcregError::spawn(
            executable,
            format!("working directory {:?} does not exist or is not a directory", dir),
        ));
    }
    Ok(dir.to_path_buf())
}

/// Resolution order:
/// - names containing a path separator are joined onto the working
///   directory (absolute paths stay absolute);
/// - bare names are tried as `<working_dir>/<name>` first, then on `PATH`.
fn resolve_executable(executable: &str, working_dir: &Path) -> Result<PathBuf> {
    if executable.trim().is_empty() {
        return Err(ProcregError::spawn(executable, "executable name is empty"));
    }

    let as_path = Path::new(executable);
    if as_path.is_absolute() || as_path.components().count() > 1 {
        let candidate = working_dir.join(as_path);
        return if is_executable_file(&candidate) {
            Ok(candidate)
        } else {
            Err(ProcregError::spawn(
                executable,
                format!("{:?} is not an executable file", candidate),
            ))
        };
    }

    let local = working_dir.join(executable);
    if is_executable_file(&local) {
        return Ok(local);
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let candidate = dir.join(executable);
            if is_executable_file(&candidate) {
                return Ok(candidate);
            }
        }
    }

    Err(ProcregError::spawn(
        executable,
        format!("not found in {:?} or on PATH", working_dir),
    ))
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}
