use aiden_proto::{GitBranches, GitCommand, GitFileStatus, GitLogEntry, GitStatus};
use serde_json::{json, Value};
use std::path::Path;
use std::process::{Command, Output};

use crate::error::HostError;

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

pub(crate) fn run_git(cwd: &Path, args: &[&str]) -> Result<Output, HostError> {
    Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| HostError::Git(format!("Failed to run git: {e}")))
}

fn command_stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn run_git_ok(cwd: &Path, args: &[&str]) -> Result<String, HostError> {
    let output = run_git(cwd, args)?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).to_string());
    }
    let stderr = command_stderr(&output);
    Err(HostError::Git(format!("git {} failed: {stderr}", args.join(" "))))
}

/// Run one git command in `work_dir` and shape its reply.
pub fn execute(work_dir: &Path, command: GitCommand) -> Result<Value, HostError> {
    if !work_dir.is_dir() {
        return Err(HostError::NotFound(format!(
            "Working directory not found: {}",
            work_dir.display()
        )));
    }
    tracing::debug!(work_dir = %work_dir.display(), ?command, "git");
    match command {
        GitCommand::Status => Ok(json!(status(work_dir)?)),
        GitCommand::Init => {
            run_git_ok(work_dir, &["init"])?;
            Ok(Value::Null)
        }
        GitCommand::Commit { message } => Ok(json!(commit(work_dir, &message)?)),
        GitCommand::Diff { staged } => {
            let args: &[&str] = if staged { &["diff", "--staged"] } else { &["diff"] };
            Ok(json!(run_git_ok(work_dir, args)?))
        }
        GitCommand::Log { limit } => Ok(json!(log(work_dir, limit)?)),
        GitCommand::Branch => Ok(json!(branches(work_dir)?)),
        GitCommand::Checkout { branch, create } => {
            if create {
                run_git_ok(work_dir, &["checkout", "-b", &branch])?;
            } else {
                run_git_ok(work_dir, &["checkout", &branch])?;
            }
            Ok(Value::Null)
        }
        GitCommand::Push { remote, branch } => {
            sync(work_dir, "push", remote, branch)?;
            Ok(Value::Null)
        }
        GitCommand::Pull { remote, branch } => {
            sync(work_dir, "pull", remote, branch)?;
            Ok(Value::Null)
        }
        GitCommand::Add { files } => {
            if files.is_empty() {
                return Err(HostError::InvalidRequest("No files to add".to_string()));
            }
            let mut args = vec!["add", "--"];
            args.extend(files.iter().map(String::as_str));
            run_git_ok(work_dir, &args)?;
            Ok(Value::Null)
        }
    }
}

pub fn status(work_dir: &Path) -> Result<GitStatus, HostError> {
    let raw = run_git_ok(work_dir, &["status", "--porcelain=v1", "--branch", "-z"])?;
    Ok(parse_status(&raw))
}

pub fn commit(work_dir: &Path, message: &str) -> Result<String, HostError> {
    run_git_ok(work_dir, &["commit", "-m", message])?;
    Ok(run_git_ok(work_dir, &["rev-parse", "HEAD"])?.trim().to_string())
}

pub fn log(work_dir: &Path, limit: usize) -> Result<Vec<GitLogEntry>, HostError> {
    let count = format!("-n{limit}");
    let format = format!("--pretty=format:%H{FIELD_SEP}%aI{FIELD_SEP}%s{FIELD_SEP}%an{FIELD_SEP}%ae{RECORD_SEP}");
    Ok(parse_log(&run_git_ok(work_dir, &["log", &count, &format])?))
}

pub fn branches(work_dir: &Path) -> Result<GitBranches, HostError> {
    let raw = run_git_ok(work_dir, &["branch", "--list", "--format=%(HEAD)%(refname:short)"])?;
    Ok(parse_branches(&raw))
}

fn sync(
    work_dir: &Path,
    verb: &str,
    remote: Option<String>,
    branch: Option<String>,
) -> Result<(), HostError> {
    let remote = remote.unwrap_or_else(|| "origin".to_string());
    let mut args = vec![verb, remote.as_str()];
    if let Some(branch) = branch.as_deref() {
        args.push(branch);
    }
    run_git_ok(work_dir, &args).map(|_| ())
}

/// `git clone [-b branch] <url> <dest>`, run from `dest`'s parent.
pub fn clone(url: &str, dest: &Path, branch: Option<&str>) -> Result<(), HostError> {
    let parent = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)
        .map_err(|e| HostError::Git(format!("Failed to create {}: {e}", parent.display())))?;
    let target = dest.to_string_lossy();
    let mut args = vec!["clone"];
    if let Some(branch) = branch {
        args.extend(["-b", branch]);
    }
    args.push(url);
    args.push(&target);
    let output = run_git(parent, &args)?;
    if output.status.success() {
        Ok(())
    } else {
        // the URL may carry a token
        Err(HostError::Git(format!("git clone failed: {}", command_stderr(&output))))
    }
}

// ── parsing ──────────────────────────────────────────────────────────

/// `git status --porcelain=v1 --branch -z`.
fn parse_status(raw: &str) -> GitStatus {
    let mut status = GitStatus {
        is_clean: true,
        current: None,
        tracking: None,
        ahead: 0,
        behind: 0,
        files: Vec::new(),
    };
    let mut entries = raw.split('\0');
    while let Some(entry) = entries.next() {
        if let Some(header) = entry.strip_prefix("## ") {
            parse_branch_header(header, &mut status);
            continue;
        }
        if entry.len() < 4 {
            continue;
        }
        let (codes, path) = entry.split_at(3);
        let mut chars = codes.chars();
        let index = chars.next().unwrap_or(' ');
        let working_dir = chars.next().unwrap_or(' ');
        if index == 'R' || index == 'C' {
            // -z puts the source path of a rename in the next entry
            let _ = entries.next();
        }
        status.files.push(GitFileStatus {
            path: path.to_string(),
            index: index.to_string(),
            working_dir: working_dir.to_string(),
        });
    }
    status.is_clean = status.files.is_empty();
    status
}

/// `main...origin/main [ahead 1, behind 2]`, `No commits yet on main`,
/// `HEAD (no branch)`.
fn parse_branch_header(header: &str, status: &mut GitStatus) {
    if let Some(branch) = header
        .strip_prefix("No commits yet on ")
        .or_else(|| header.strip_prefix("Initial commit on "))
    {
        status.current = Some(branch.to_string());
        return;
    }
    if header.starts_with("HEAD (no branch)") {
        return;
    }

    let (refs, counts) = match header.split_once(" [") {
        Some((refs, rest)) => (refs, rest.trim_end_matches(']')),
        None => (header, ""),
    };
    match refs.split_once("...") {
        Some((current, tracking)) => {
            status.current = Some(current.to_string());
            status.tracking = Some(tracking.to_string());
        }
        None => status.current = Some(refs.to_string()),
    }
    for part in counts.split(", ") {
        if let Some(n) = part.strip_prefix("ahead ") {
            status.ahead = n.parse().unwrap_or(0);
        } else if let Some(n) = part.strip_prefix("behind ") {
            status.behind = n.parse().unwrap_or(0);
        }
    }
}

fn parse_log(raw: &str) -> Vec<GitLogEntry> {
    raw.split(RECORD_SEP)
        .filter_map(|record| {
            let mut fields = record.trim_start_matches('\n').split(FIELD_SEP);
            let hash = fields.next().filter(|h| !h.is_empty())?;
            Some(GitLogEntry {
                hash: hash.to_string(),
                date: fields.next()?.to_string(),
                message: fields.next()?.to_string(),
                author_name: fields.next()?.to_string(),
                author_email: fields.next()?.to_string(),
            })
        })
        .collect()
}

fn parse_branches(raw: &str) -> GitBranches {
    let mut current = None;
    let mut all = Vec::new();
    for line in raw.lines() {
        let (marker, name) = line.split_at(line.len().min(1));
        if name.is_empty() {
            continue;
        }
        if marker == "*" {
            current = Some(name.to_string());
        }
        all.push(name.to_string());
    }
    GitBranches { current, all }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path();
        run_git_ok(path, &["init", "-b", "main"]).unwrap();
        run_git_ok(path, &["config", "user.email", "dev@example.com"]).unwrap();
        run_git_ok(path, &["config", "user.name", "Dev"]).unwrap();
        run_git_ok(path, &["config", "commit.gpgsign", "false"]).unwrap();
        dir
    }

    // ── parsing ──────────────────────────────────────────────────────

    #[test]
    fn status_header_with_tracking_and_counts() {
        let status = parse_status("## main...origin/main [ahead 2, behind 1]\0 M src/lib.rs\0?? notes.txt\0");
        assert_eq!(status.current.as_deref(), Some("main"));
        assert_eq!(status.tracking.as_deref(), Some("origin/main"));
        assert_eq!((status.ahead, status.behind), (2, 1));
        assert!(!status.is_clean);
        assert_eq!(status.files.len(), 2);
        assert_eq!(status.files[0].path, "src/lib.rs");
        assert_eq!(status.files[0].index, " ");
        assert_eq!(status.files[0].working_dir, "M");
        assert_eq!(status.files[1].index, "?");
    }

    #[test]
    fn status_rename_consumes_source_path() {
        let status = parse_status("## main\0R  new.rs\0old.rs\0A  added.rs\0");
        let paths: Vec<&str> = status.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["new.rs", "added.rs"]);
    }

    #[test]
    fn status_of_unborn_branch() {
        let status = parse_status("## No commits yet on main\0");
        assert_eq!(status.current.as_deref(), Some("main"));
        assert!(status.is_clean);
    }

    #[test]
    fn log_records_split_on_separators() {
        let raw = format!(
            "abc{FIELD_SEP}2024-01-02T03:04:05+00:00{FIELD_SEP}Fix it{FIELD_SEP}Dev{FIELD_SEP}dev@example.com{RECORD_SEP}\n"
        );
        let entries = parse_log(&raw);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hash, "abc");
        assert_eq!(entries[0].message, "Fix it");
        assert_eq!(entries[0].author_email, "dev@example.com");
    }

    #[test]
    fn branches_mark_current() {
        let branches = parse_branches(" feature\n*main\n");
        assert_eq!(branches.current.as_deref(), Some("main"));
        assert_eq!(branches.all, vec!["feature", "main"]);
    }

    // ── against a real repository ────────────────────────────────────

    #[test]
    fn add_commit_log_roundtrip() {
        let dir = repo();
        let path = dir.path();
        std::fs::write(path.join("a.txt"), "hello\n").unwrap();

        let status = status(path).unwrap();
        assert_eq!(status.current.as_deref(), Some("main"));
        assert_eq!(status.files[0].path, "a.txt");

        execute(path, GitCommand::Add { files: vec!["a.txt".into()] }).unwrap();
        let staged = execute(path, GitCommand::Diff { staged: true }).unwrap();
        assert!(staged.as_str().unwrap().contains("+hello"));

        let hash = commit(path, "first").unwrap();
        assert_eq!(hash.len(), 40);

        let entries = log(path, 20).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hash, hash);
        assert_eq!(entries[0].message, "first");
        assert!(super::status(path).unwrap().is_clean);
    }

    #[test]
    fn checkout_create_switches_branch() {
        let dir = repo();
        let path = dir.path();
        std::fs::write(path.join("a.txt"), "x").unwrap();
        execute(path, GitCommand::Add { files: vec!["a.txt".into()] }).unwrap();
        commit(path, "init").unwrap();

        execute(
            path,
            GitCommand::Checkout {
                branch: "feature".into(),
                create: true,
            },
        )
        .unwrap();
        let branches = branches(path).unwrap();
        assert_eq!(branches.current.as_deref(), Some("feature"));
        assert_eq!(branches.all, vec!["feature", "main"]);
    }

    #[test]
    fn failing_command_reports_stderr() {
        let dir = repo();
        let err = execute(
            dir.path(),
            GitCommand::Checkout {
                branch: "nope".into(),
                create: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, HostError::Git(ref m) if m.starts_with("git checkout nope failed")));
    }

    #[test]
    fn missing_work_dir_is_not_found() {
        let err = execute(Path::new("/definitely/not/here"), GitCommand::Status).unwrap_err();
        assert!(matches!(err, HostError::NotFound(_)));
    }

    #[test]
    fn add_without_files_is_rejected() {
        let dir = repo();
        let err = execute(dir.path(), GitCommand::Add { files: vec![] }).unwrap_err();
        assert!(matches!(err, HostError::InvalidRequest(_)));
    }
}
