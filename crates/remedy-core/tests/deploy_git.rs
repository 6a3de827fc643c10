//! Deploy and rollback against a real git repository.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use remedy_core::fakes::{ScriptedTestRunner, StaticHealthProbe};
use remedy_core::{DeployConfig, DeployOptions, DeploymentManager, GitCli, SourceControl};
use tempfile::TempDir;

fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_file(repo: &Path, name: &str, contents: &str, message: &str) {
    std::fs::write(repo.join(name), contents).unwrap();
    git(repo, &["add", name]);
    git(repo, &["commit", "-m", message]);
}

/// `main` with one commit and `fix/error-42` one commit ahead of it.
fn platform_repo() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path();
    git(repo, &["init", "-b", "main"]);
    git(repo, &["config", "user.name", "test-user"]);
    git(repo, &["config", "user.email", "test@example.com"]);
    commit_file(repo, "invoice.ts", "export const total = undefined;\n", "initial");
    git(repo, &["checkout", "-b", "fix/error-42"]);
    commit_file(repo, "invoice.ts", "export const total = 0;\n", "fix error 42");
    git(repo, &["checkout", "main"]);
    dir
}

fn manager(repo: &Path, tests: ScriptedTestRunner) -> DeploymentManager {
    let config = DeployConfig {
        stabilization_delay_secs: 0,
        ..DeployConfig::default()
    };
    DeploymentManager::new(
        Arc::new(GitCli::new(repo)),
        Arc::new(tests),
        Arc::new(StaticHealthProbe::healthy()),
        "main",
        &config,
    )
}

fn read(repo: &Path, name: &str) -> String {
    std::fs::read_to_string(repo.join(name)).unwrap()
}

#[tokio::test]
async fn deploy_then_rollback_restores_mainline() {
    let dir = platform_repo();
    let repo = dir.path();
    let before = git(repo, &["rev-parse", "HEAD"]);
    let deployer = manager(repo, ScriptedTestRunner::passing());

    let deploy = deployer
        .deploy_patch(
            "fix/error-42",
            DeployOptions {
                skip_tests: false,
                create_backup: true,
            },
        )
        .await;

    assert!(deploy.success, "errors: {:?}", deploy.errors);
    assert_eq!(deploy.previous_branch.as_deref(), Some("main"));
    assert_eq!(deploy.backup_commit.as_deref(), Some(before.as_str()));
    assert!(deploy.test_report.as_ref().unwrap().success);
    assert_eq!(git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    assert_eq!(read(repo, "invoice.ts"), "export const total = 0;\n");

    let rollback = deployer.rollback_deployment(None, None).await;

    assert!(rollback.success, "errors: {:?}", rollback.errors);
    assert_eq!(rollback.reset_to, "HEAD~1");
    assert_eq!(git(repo, &["rev-parse", "HEAD"]), before);
    assert_eq!(read(repo, "invoice.ts"), "export const total = undefined;\n");
}

#[tokio::test]
async fn rollback_to_backup_commit() {
    let dir = platform_repo();
    let repo = dir.path();
    let deployer = manager(repo, ScriptedTestRunner::passing());

    let deploy = deployer
        .deploy_patch(
            "fix/error-42",
            DeployOptions {
                skip_tests: true,
                create_backup: true,
            },
        )
        .await;
    assert!(deploy.success);
    assert!(deploy.test_report.is_none());

    let backup = deploy.backup_commit.unwrap();
    let rollback = deployer.rollback_deployment(Some("main"), Some(&backup)).await;

    assert!(rollback.success);
    assert_eq!(git(repo, &["rev-parse", "HEAD"]), backup);
    assert!(rollback.previous_head.is_some());
    assert_ne!(rollback.previous_head.as_deref(), Some(backup.as_str()));
}

#[tokio::test]
async fn failing_tests_restore_starting_branch() {
    let dir = platform_repo();
    let repo = dir.path();
    let before = git(repo, &["rev-parse", "HEAD"]);
    let deployer = manager(repo, ScriptedTestRunner::failing());

    let deploy = deployer
        .deploy_patch("fix/error-42", DeployOptions::default())
        .await;

    assert!(!deploy.success);
    assert!(deploy.rollback_attempted);
    assert!(!deploy.rollback_failed);
    assert!(deploy.errors[0].contains("tests failed"));
    assert_eq!(git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    assert_eq!(git(repo, &["rev-parse", "HEAD"]), before);
}

#[tokio::test]
async fn merge_conflict_is_aborted_cleanly() {
    let dir = platform_repo();
    let repo = dir.path();
    commit_file(repo, "invoice.ts", "export const total = null;\n", "conflicting change");
    let before = git(repo, &["rev-parse", "HEAD"]);
    let deployer = manager(repo, ScriptedTestRunner::passing());

    let deploy = deployer
        .deploy_patch("fix/error-42", DeployOptions::default())
        .await;

    assert!(!deploy.success);
    assert!(deploy.errors[0].contains("merge"));
    assert_eq!(git(repo, &["rev-parse", "HEAD"]), before);
    assert_eq!(git(repo, &["status", "--porcelain"]), "");
    assert_eq!(
        GitCli::new(repo).current_branch().await.unwrap(),
        "main"
    );
}

#[tokio::test]
async fn missing_branch_fails_without_moving_head() {
    let dir = platform_repo();
    let repo = dir.path();
    let deployer = manager(repo, ScriptedTestRunner::passing());

    let deploy = deployer
        .deploy_patch("fix/does-not-exist", DeployOptions::default())
        .await;

    assert!(!deploy.success);
    assert_eq!(git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
}
