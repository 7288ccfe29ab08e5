//! Integration tests for the shared execution environment.
//!
//! `/bin/sh` stands in for the interpreter and a pair of shell scripts stand
//! in for pip, so these run on any Unix host.

use codeboard::{Config, ExecutionEngine, PackageManager, SharedBuffer};
use std::path::Path;
use std::time::{Duration, Instant};

fn sh_config(dir: &Path) -> Config {
    Config::with_interpreter("/bin/sh").in_dir(dir)
}

/// Install appends the name to a registry file; list prints it as pip JSON.
fn fake_pip(config: &mut Config, dir: &Path) {
    let registry = dir.join("installed.txt");
    std::fs::write(&registry, "").unwrap();
    let registry = registry.display().to_string();

    let install = r#"case "$0" in -*) echo "bad name" >&2; exit 1;; esac; printf '%s\n' "$0" >> REGISTRY; echo "Successfully installed $0""#;
    let list = r#"printf '['; sep=''; while read -r p; do printf '%s{"name":"%s","version":"1.0"}' "$sep" "$p"; sep=','; done < REGISTRY; printf ']'"#;

    config.install_command = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        install.replace("REGISTRY", &registry),
    ];
    config.list_command = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        list.replace("REGISTRY", &registry),
    ];
}

#[tokio::test]
async fn test_saved_buffer_runs_without_argument() {
    let tmp = tempfile::tempdir().unwrap();
    let config = sh_config(tmp.path());
    let buffer = SharedBuffer::new(&config.buffer_path);
    let engine = ExecutionEngine::new(&config);

    assert_eq!(buffer.load().unwrap(), codeboard::buffer::PLACEHOLDER);
    buffer.save("echo 1").unwrap();

    let result = engine.execute_saved(&buffer).await.unwrap();
    assert_eq!(result.stdout, "1\n");
    assert_eq!(result.exit_code, Some(0));
    assert!(!result.timed_out);
}

#[tokio::test]
async fn test_long_output_is_cut_to_exactly_the_limit() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = ExecutionEngine::new(&sh_config(tmp.path()));

    let result = engine
        .execute("head -c 30000 /dev/zero | tr '\\000' 'a'; head -c 25000 /dev/zero | tr '\\000' 'e' >&2")
        .await
        .unwrap();
    assert_eq!(result.stdout.chars().count(), 20_000);
    assert_eq!(result.stderr.chars().count(), 20_000);
    assert!(result.stdout.chars().all(|c| c == 'a'));
    assert!(result.stdout_truncated && result.stderr_truncated);
}

#[tokio::test]
async fn test_short_output_is_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = ExecutionEngine::new(&sh_config(tmp.path()));
    let result = engine.execute("printf 'héllo'").await.unwrap();
    assert_eq!(result.stdout, "héllo");
    assert!(!result.stdout_truncated);
}

#[tokio::test]
async fn test_runaway_program_is_killed_at_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = sh_config(tmp.path());
    config.exec_timeout = Duration::from_secs(1);
    let engine = ExecutionEngine::new(&config);

    let started = Instant::now();
    let result = engine.execute("echo started; sleep 30").await.unwrap();
    let elapsed = started.elapsed();

    assert!(result.timed_out);
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
    assert_eq!(result.stdout, "started\n");
}

#[tokio::test]
async fn test_background_children_die_with_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = sh_config(tmp.path());
    config.exec_timeout = Duration::from_secs(1);
    let engine = ExecutionEngine::new(&config);

    // The orphaned sleep holds stdout open; only a group kill releases it
    let started = Instant::now();
    let result = engine.execute("sleep 30 & echo spawned").await.unwrap();
    assert!(result.timed_out);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_exit_code_is_transparent() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = ExecutionEngine::new(&sh_config(tmp.path()));
    let result = engine.execute("exit 3").await.unwrap();
    assert_eq!(result.exit_code, Some(3));
    assert!(!result.timed_out);
}

#[tokio::test]
async fn test_concurrent_executions_run_side_by_side() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = ExecutionEngine::new(&sh_config(tmp.path()));

    let started = Instant::now();
    let (a, b) = tokio::join!(engine.execute("sleep 1; echo a"), engine.execute("sleep 1; echo b"));
    let (a, b) = (a.unwrap(), b.unwrap());

    // Both race on one scratch file; a run may even catch it mid-rewrite
    for result in [&a, &b] {
        assert!(["a\n", "b\n", ""].contains(&result.stdout.as_str()));
    }
    assert!(started.elapsed() < Duration::from_secs(2) + Duration::from_millis(900));
}

#[tokio::test]
async fn test_installed_package_shows_up_in_listing() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = sh_config(tmp.path());
    fake_pip(&mut config, tmp.path());
    let manager = PackageManager::new(&config);

    assert!(manager.list_installed().await.unwrap().is_empty());

    let result = manager.install("somepkg").await.unwrap();
    assert!(result.success);
    assert_eq!(result.stdout, "Successfully installed somepkg\n");

    let installed = manager.list_installed().await.unwrap();
    assert!(installed.contains("somepkg"));
    assert_eq!(installed.iter().next().unwrap().version, "1.0");
}

#[tokio::test]
async fn test_failed_install_reports_exit_code() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = sh_config(tmp.path());
    fake_pip(&mut config, tmp.path());
    let manager = PackageManager::new(&config);

    let result = manager.install("--index-url").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.exit_code, Some(1));
    assert_eq!(result.stderr, "bad name\n");
    assert!(!manager.list_installed().await.unwrap().contains("--index-url"));
}

#[tokio::test]
async fn test_install_timeout_is_a_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = sh_config(tmp.path());
    config.install_command = vec!["/bin/sh".to_string(), "-c".to_string(), "sleep 30".to_string()];
    config.install_timeout = Duration::from_millis(500);
    let manager = PackageManager::new(&config);

    let result = manager.install("slowpkg").await.unwrap();
    assert!(result.timed_out);
    assert!(!result.success);
}
