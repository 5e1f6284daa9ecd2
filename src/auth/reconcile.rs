//! Boot-time comparison of the access table with the last approved snapshot. A changed role set
//! is a `ConflictWarning`: not an error, but it must be approved before the new table is saved.

use crate::auth::PermissionTable;
use crate::config::Settings;
use crate::error::ConfigError;
use crate::resource::Action;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::IsTerminal;
use std::path::Path;

pub type PermissionSnapshot = BTreeMap<String, BTreeMap<Action, BTreeSet<String>>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictWarning {
    pub resource: String,
    pub action: Action,
    pub previous: BTreeSet<String>,
    pub current: BTreeSet<String>,
}

impl fmt::Display for ConflictWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |s: &BTreeSet<String>| s.iter().cloned().collect::<Vec<_>>().join(", ");
        write!(
            f,
            "{}.{}: [{}] -> [{}]",
            self.resource,
            self.action,
            join(&self.previous),
            join(&self.current)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmPolicy {
    AutoApprove,
    /// Ask on the terminal.
    Prompt,
    Reject,
}

impl ConfirmPolicy {
    /// Auto-approval only when configured; otherwise prompt on a terminal and reject elsewhere.
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.auto_approve_permission_changes {
            ConfirmPolicy::AutoApprove
        } else if std::io::stdin().is_terminal() {
            ConfirmPolicy::Prompt
        } else {
            ConfirmPolicy::Reject
        }
    }
}

/// One warning per (resource, action) whose allowed role set differs.
pub fn diff(previous: &PermissionSnapshot, current: &PermissionSnapshot) -> Vec<ConflictWarning> {
    let empty = BTreeSet::new();
    let resources: BTreeSet<&String> = previous.keys().chain(current.keys()).collect();
    let mut warnings = Vec::new();
    for resource in resources {
        let before = previous.get(resource);
        let after = current.get(resource);
        let actions: BTreeSet<Action> = before
            .into_iter()
            .chain(after)
            .flat_map(|t| t.keys().copied())
            .collect();
        for action in actions {
            let prev = before.and_then(|t| t.get(&action)).unwrap_or(&empty);
            let curr = after.and_then(|t| t.get(&action)).unwrap_or(&empty);
            if prev != curr {
                warnings.push(ConflictWarning {
                    resource: resource.clone(),
                    action,
                    previous: prev.clone(),
                    current: curr.clone(),
                });
            }
        }
    }
    warnings
}

/// Compares `table` with the snapshot at `path`, asks for approval per `policy`, and saves the
/// table as the new snapshot. Without a snapshot the table is saved as-is.
pub async fn reconcile(
    path: &Path,
    table: &PermissionTable,
    policy: ConfirmPolicy,
) -> Result<Vec<ConflictWarning>, ConfigError> {
    let current = table.entries().clone();
    let previous: Option<PermissionSnapshot> = match tokio::fs::read(path).await {
        Ok(bytes) => Some(
            serde_json::from_slice(&bytes)
                .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?,
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };

    let warnings = previous
        .as_ref()
        .map(|p| diff(p, &current))
        .unwrap_or_default();
    for w in &warnings {
        tracing::warn!(resource = %w.resource, action = %w.action, "permission change: {}", w);
    }
    if !warnings.is_empty() {
        let approved = match policy {
            ConfirmPolicy::AutoApprove => true,
            ConfirmPolicy::Reject => false,
            ConfirmPolicy::Prompt => prompt(&warnings).await?,
        };
        if !approved {
            return Err(ConfigError::Validation(format!(
                "{} permission change(s) not approved; review them or set AUTO_APPROVE_PERMISSION_CHANGES=true",
                warnings.len()
            )));
        }
    }

    if previous.as_ref() != Some(&current) {
        let json = serde_json::to_vec_pretty(&current)
            .map_err(|e| ConfigError::Load(format!("permission snapshot: {}", e)))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "permission snapshot saved");
    }
    Ok(warnings)
}

async fn prompt(warnings: &[ConflictWarning]) -> Result<bool, ConfigError> {
    let lines: Vec<String> = warnings.iter().map(ToString::to_string).collect();
    tokio::task::spawn_blocking(move || {
        eprintln!("Access table changed since the last approved snapshot:");
        for line in &lines {
            eprintln!("  {}", line);
        }
        eprint!("Apply these changes? [y/N] ");
        let mut answer = String::new();
        std::io::stdin()
            .read_line(&mut answer)
            .map_err(|e| ConfigError::Load(format!("reading confirmation: {}", e)))?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    })
    .await
    .map_err(|e| ConfigError::Load(format!("confirmation prompt: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(roles: &[&str]) -> PermissionTable {
        PermissionTable::default().allow("post", Action::DeleteOne, roles.iter().copied())
    }

    #[test]
    fn diff_reports_changed_role_sets_only() {
        let before = table(&["admin"]).entries().clone();
        let after = table(&["admin", "editor"])
            .allow("post", Action::CreateOne, ["editor"])
            .entries()
            .clone();
        let warnings = diff(&before, &after);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].action, Action::CreateOne);
        assert!(warnings[0].previous.is_empty());
        assert_eq!(warnings[1].to_string(), "post.deleteOne: [admin] -> [admin, editor]");
        assert!(diff(&after, &after).is_empty());
    }

    #[tokio::test]
    async fn first_boot_saves_and_changes_need_approval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".permissions.json");

        let warnings = reconcile(&path, &table(&["admin"]), ConfirmPolicy::Reject).await.unwrap();
        assert!(warnings.is_empty());
        assert!(path.exists());

        let changed = table(&["editor"]);
        assert!(reconcile(&path, &changed, ConfirmPolicy::Reject).await.is_err());
        let warnings = reconcile(&path, &changed, ConfirmPolicy::AutoApprove).await.unwrap();
        assert_eq!(warnings.len(), 1);
        let warnings = reconcile(&path, &changed, ConfirmPolicy::Reject).await.unwrap();
        assert!(warnings.is_empty());
    }
}
