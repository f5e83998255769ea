//! # Install and Test Stage Unit Tests / 安装与测试阶段单元测试
//!
//! Tests `CommandInstaller` and `CommandTestRunner` against local and
//! container handles backed by a scripted executor: how commands are
//! wrapped, how exit codes map to results, the test timeout, and coverage
//! artifact retrieval.
//!
//! 使用脚本化执行器支持的本地与容器句柄测试 `CommandInstaller` 与
//! `CommandTestRunner`：命令如何被包装、退出码如何映射为结果、测试超时以及覆盖率产物的获取。

mod common;

use common::{local_entry, test_settings, FakeExecutor, Reply};
use env_matrix::core::config::Settings;
use env_matrix::core::error::ExecutionError;
use env_matrix::core::install::{CommandInstaller, Installer};
use env_matrix::core::provision::{ContainerEnvironment, EnvironmentHandle, LocalEnvironment};
use env_matrix::core::test_runner::{CommandTestRunner, TestRunner, TIMEOUT_EXIT_CODE};
use env_matrix::infra::command::SharedExecutor;
use env_matrix::infra::container::ContainerCli;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn local_handle(root: &TempDir) -> EnvironmentHandle {
    let prefix = root.path().join("env");
    std::fs::create_dir_all(&prefix).unwrap();
    let mut env = LocalEnvironment::new(vec!["conda".to_string()], prefix, root.path().to_path_buf());
    env.env.insert("PIP_NO_INPUT".to_string(), "1".to_string());
    EnvironmentHandle::Local(env)
}

fn container_handle() -> EnvironmentHandle {
    EnvironmentHandle::Container(ContainerEnvironment::new(
        ContainerCli::new("docker"),
        "env-matrix-c-1".to_string(),
        "/workspace".to_string(),
    ))
}

fn shared(executor: &Arc<FakeExecutor>) -> SharedExecutor {
    executor.clone()
}

#[cfg(test)]
mod installer_tests {
    use super::*;

    #[tokio::test]
    async fn test_install_runs_inside_the_prefix() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new().on(
            "pip install",
            Reply::Exit(0, "Successfully installed pkg-1.0".to_string()),
        );
        let installer = CommandInstaller::new(Arc::new(test_settings(&root)), shared(&executor));
        let handle = local_handle(&root);

        let result = installer.install(&handle, &local_entry("py39")).await.unwrap();

        assert!(result.success);
        assert!(result.log.contains("Successfully installed pkg-1.0"));
        let call = &executor.calls()[0];
        assert_eq!(call.program, "conda");
        assert_eq!(&call.args[..2], &["run", "-p"]);
        assert!(call.args.contains(&"--no-capture-output".to_string()));
        assert_eq!(call.cwd.as_deref(), Some(root.path()));
        assert_eq!(call.env.get("PIP_NO_INPUT").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_failed_install_is_a_result_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new().on(
            "pip install",
            Reply::Exit(1, "error: metadata-generation-failed".to_string()),
        );
        let installer = CommandInstaller::new(Arc::new(test_settings(&root)), shared(&executor));

        let result = installer
            .install(&local_handle(&root), &local_entry("py39"))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.log.contains("metadata-generation-failed"));
        assert!(result.log.starts_with("$ conda run -p"));
    }

    #[tokio::test]
    async fn test_install_in_container_uses_exec() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new().on("inspect", Reply::Exit(0, "true\n".to_string()));
        let installer = CommandInstaller::new(Arc::new(test_settings(&root)), shared(&executor));

        installer
            .install(&container_handle(), &local_entry("c"))
            .await
            .unwrap();
        let lines = executor.lines();
        assert!(lines[0].starts_with("docker inspect"));
        assert_eq!(
            lines[1],
            "docker exec -w /workspace env-matrix-c-1 python -m pip install --no-deps ."
        );
    }

    #[tokio::test]
    async fn test_vanished_environment_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new();
        let installer = CommandInstaller::new(Arc::new(test_settings(&root)), shared(&executor));
        let handle = local_handle(&root);
        std::fs::remove_dir_all(root.path().join("env")).unwrap();

        let err = installer.install(&handle, &local_entry("py39")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::EnvironmentGone(_)));
        assert!(executor.calls().is_empty());
    }
}

#[cfg(test)]
mod test_runner_tests {
    use super::*;

    fn runner(root: &TempDir, executor: &Arc<FakeExecutor>, tweak: impl FnOnce(&mut Settings)) -> CommandTestRunner {
        let mut settings = test_settings(root);
        tweak(&mut settings);
        CommandTestRunner::new(Arc::new(settings), shared(executor))
    }

    #[tokio::test]
    async fn test_exit_code_is_recorded() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new().on("pytest", Reply::Exit(1, "1 failed, 4 passed".to_string()));
        let runner = runner(&root, &executor, |_| {});

        let result = runner.run(&local_handle(&root), &local_entry("py39")).await.unwrap();
        assert_eq!(result.exit_code, 1);
        assert!(!result.passed());
        assert!(result.log.contains("1 failed, 4 passed"));
        assert!(result.coverage_artifact.is_none());
    }

    #[tokio::test]
    async fn test_ineligible_entry_gets_no_coverage_arguments() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new();
        let runner = runner(&root, &executor, |_| {});

        runner.run(&local_handle(&root), &local_entry("py39")).await.unwrap();
        assert_eq!(executor.count_containing("--cov"), 0);
    }

    #[tokio::test]
    async fn test_eligible_entry_collects_coverage() {
        let root = tempfile::tempdir().unwrap();
        common::write_file(root.path(), "coverage.xml", "<coverage line-rate=\"0.9\"/>");
        let executor = FakeExecutor::new();
        let runner = runner(&root, &executor, |_| {});
        let mut entry = local_entry("py39");
        entry.reporting_eligible = true;

        let result = runner.run(&local_handle(&root), &entry).await.unwrap();

        let call = &executor.calls()[0];
        assert!(call.args.ends_with(&[
            "--cov".to_string(),
            "--cov-config=.coveragerc".to_string(),
            "--cov-report=xml:coverage.xml".to_string(),
        ]));
        let artifact = result.coverage_artifact.expect("artifact should be collected");
        assert_eq!(artifact, root.path().join("artifacts").join("py39").join("coverage.xml"));
        assert_eq!(
            std::fs::read_to_string(artifact).unwrap(),
            "<coverage line-rate=\"0.9\"/>"
        );
    }

    #[tokio::test]
    async fn test_missing_coverage_file_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new();
        let runner = runner(&root, &executor, |_| {});
        let mut entry = local_entry("py39");
        entry.reporting_eligible = true;

        let result = runner.run(&local_handle(&root), &entry).await.unwrap();
        assert!(result.passed());
        assert!(result.coverage_artifact.is_none());
    }

    #[tokio::test]
    async fn test_container_coverage_is_copied_out() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new().on("inspect", Reply::Exit(0, "true\n".to_string()));
        let runner = runner(&root, &executor, |_| {});
        let mut entry = local_entry("c");
        entry.reporting_eligible = true;

        let result = runner.run(&container_handle(), &entry).await.unwrap();
        assert!(result.coverage_artifact.is_some());
        assert_eq!(
            executor.count_containing("docker cp env-matrix-c-1:/workspace/coverage.xml"),
            1
        );
    }

    #[tokio::test]
    async fn test_timeout_marks_the_run_failed() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new().on("pytest", Reply::Hang);
        let runner = runner(&root, &executor, |s| s.test_timeout = Some(Duration::from_secs(30)));
        let mut entry = local_entry("py39");
        entry.test_timeout = Some(Duration::from_millis(100));

        let result = runner.run(&local_handle(&root), &entry).await.unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(!result.passed());
    }

    #[tokio::test]
    async fn test_global_timeout_applies_without_entry_override() {
        let root = tempfile::tempdir().unwrap();
        let executor = FakeExecutor::new().on("pytest", Reply::Delayed(Duration::from_secs(5), 0));
        let runner = runner(&root, &executor, |s| s.test_timeout = Some(Duration::from_millis(50)));

        let result = runner.run(&local_handle(&root), &local_entry("py39")).await.unwrap();
        assert!(result.timed_out);
    }
}
