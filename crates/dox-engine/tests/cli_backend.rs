//! Client-binary backend tests, using a shell script in place of the client

mod common;

use common::session;
use dox_engine::backends::CliBackend;
use dox_engine::{
    Backend, CommandSpec, Error, ExecutionRequest, ExecutionState, HostEnvironment, Signal,
};
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tempfile::TempDir;

/// Stand-in client: records its arguments, then acts on the last one
const CLIENT_SCRIPT: &str = r#"#!/bin/sh
if [ -n "$DOX_FAKE_ARGS" ]; then
    printf '%s\n' "$@" > "$DOX_FAKE_ARGS"
fi
for last in "$@"; do :; done
case "$last" in
    exit-7) exit 7 ;;
    hang) exec sleep 30 ;;
esac
exit 0
"#;

struct FakeClient {
    _dir: TempDir,
    path: PathBuf,
}

// Written once, before any test spawns a process, so no child can inherit
// the script's write handle
static CLIENT: LazyLock<FakeClient> = LazyLock::new(|| {
    let dir = TempDir::new_in(env!("CARGO_TARGET_TMPDIR")).unwrap();
    let path = dir.path().join("fake-client");
    fs::write(&path, CLIENT_SCRIPT).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    FakeClient { _dir: dir, path }
});

fn backend() -> CliBackend {
    CliBackend::new(CLIENT.path.display().to_string())
}

fn host(cwd: &Path, vars: &[(&str, String)]) -> HostEnvironment {
    HostEnvironment {
        cwd: cwd.to_path_buf(),
        uid: 1000,
        gid: 1000,
        vars: vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect::<HashMap<_, _>>(),
        interactive: false,
        terminal_size: None,
    }
}

fn request(last_arg: &str, host: &HostEnvironment) -> ExecutionRequest {
    let spec = CommandSpec::from_image("alpine:3.19").with_env("DOX_FAKE_ARGS");
    ExecutionRequest::build(&spec, "tool", &[last_arg.to_string()], host).unwrap()
}

#[tokio::test]
async fn test_client_exit_code_passes_through() {
    let work = TempDir::new().unwrap();
    let args_file = work.path().join("args");
    let host = host(
        work.path(),
        &[("DOX_FAKE_ARGS", args_file.display().to_string())],
    );
    let (session, _captured) = session();
    let lifecycle = session.lifecycle.clone();

    let code = backend()
        .create_and_run(&request("exit-7", &host), session)
        .await
        .unwrap();

    assert_eq!(code, 7);
    assert_eq!(lifecycle.current(), ExecutionState::Waiting);

    // The forwarded variable reached the client, which recorded its arguments
    let recorded: Vec<String> = fs::read_to_string(&args_file)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(&recorded[..3], &["run", "--rm", "-i"]);
    assert!(recorded.contains(&"DOX_FAKE_ARGS".to_string()));
    assert_eq!(&recorded[recorded.len() - 2..], &["alpine:3.19", "exit-7"]);
}

#[tokio::test]
async fn test_interrupt_is_relayed_to_the_client() {
    let work = TempDir::new().unwrap();
    let host = host(work.path(), &[]);
    let (session, captured) = session();

    captured.signals.send(Signal::SIGINT).unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        backend().create_and_run(&request("hang", &host), session),
    )
    .await
    .unwrap();

    // Killed by SIGINT
    assert_eq!(result.unwrap(), 130);
}

#[tokio::test]
async fn test_cancellation_kills_the_client() {
    let work = TempDir::new().unwrap();
    let host = host(work.path(), &[]);
    let (session, _captured) = session();

    let cancel = session.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        backend().create_and_run(&request("hang", &host), session),
    )
    .await
    .unwrap();

    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_missing_client_fails_to_spawn() {
    LazyLock::force(&CLIENT);
    let work = TempDir::new().unwrap();
    let host = host(work.path(), &[]);
    let (session, _captured) = session();

    let result = CliBackend::new(work.path().join("no-such-client").display().to_string())
        .create_and_run(&request("exit-7", &host), session)
        .await;

    assert!(matches!(result, Err(Error::SpawnFailed { .. })));
}

#[tokio::test]
async fn test_fake_client_is_available() {
    backend().is_available().await.unwrap();
}
