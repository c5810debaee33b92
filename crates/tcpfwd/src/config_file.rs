//! Task file loading.
//!
//! The task file is a JSON array of task configs. When it does not exist a
//! sample file is written in its place so it can be edited, and loading
//! fails.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use tcpfwd_core::constants::CONFIG_FILE_NAME;
use tcpfwd_core::{Error, PortMapping, Result, TaskConfig};

/// `config.json` in the directory of the running executable.
pub fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or_else(|| Error::Config {
        message: format!("executable path has no parent: {}", exe.display()),
    })?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Task written to a fresh task file.
pub fn sample_tasks() -> Vec<TaskConfig> {
    vec![TaskConfig::new(
        "default",
        "192.168.100.132",
        vec![
            PortMapping::new(5500, 5500),
            PortMapping::new(5700, 5700),
            PortMapping::new(5900, 5900),
        ],
    )]
}

/// Load the task file at `path`.
///
/// A missing file is replaced by the sample tasks and reported as an error.
/// Nameless entries are named `task-<index>`, and duplicate names are
/// rejected.
pub fn load_or_init(path: &Path) -> Result<Vec<TaskConfig>> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            write_tasks(path, &sample_tasks())?;
            info!(path = %path.display(), "Wrote sample task file");
            return Err(Error::Config {
                message: format!(
                    "{} not found; a sample was written, edit it and restart",
                    path.display()
                ),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let mut tasks = TaskConfig::list_from_json(&json).map_err(|e| Error::Config {
        message: format!("{}: {}", path.display(), e),
    })?;
    assign_default_names(&mut tasks);
    check_unique_names(&tasks)?;

    debug!(path = %path.display(), tasks = tasks.len(), "Loaded task file");
    Ok(tasks)
}

/// Write `tasks` to `path` as pretty-printed JSON.
pub fn write_tasks(path: &Path, tasks: &[TaskConfig]) -> Result<()> {
    let json = TaskConfig::list_to_json(tasks)?;
    fs::write(path, json)?;
    Ok(())
}

/// Name every nameless task `task-<index>`.
pub fn assign_default_names(tasks: &mut [TaskConfig]) {
    for (index, task) in tasks.iter_mut().enumerate() {
        if task.name.trim().is_empty() {
            task.name = format!("task-{}", index);
        }
    }
}

fn check_unique_names(tasks: &[TaskConfig]) -> Result<()> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(task.name.as_str()) {
            return Err(Error::Config {
                message: format!("task name {} is used more than once", task.name),
            });
        }
    }
    Ok(())
}
