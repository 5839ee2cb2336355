use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_the_lifecycle_commands() {
    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("snapshot"))
        .stdout(predicate::str::contains("ip"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn up_help_shows_the_global_flags() {
    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.arg("up")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--cloud"))
        .stdout(predicate::str::contains("--name"));
}

#[test]
fn down_is_an_alias_for_destroy() {
    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.arg("down").arg("--help").assert().success();
}

#[test]
fn unknown_subcommands_fail() {
    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.arg("launch").assert().failure();
}

#[test]
fn missing_user_config_is_a_clear_error() {
    let home = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.env("HOME", home.path())
        .current_dir(home.path())
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains(".skiff.yml"));
}

#[test]
fn missing_project_config_is_a_clear_error() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(
        home.path().join(".skiff.yml"),
        "clouds:\n  east:\n    os_auth_url: http://keystone.example:5000/v2.0\n    os_username: dev\n    os_password: hunter2\n    os_tenant_name: devteam\n",
    )
    .unwrap();

    let workdir = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.env("HOME", home.path())
        .current_dir(workdir.path())
        .arg("up")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Skifffile"));
}

#[test]
fn unknown_cloud_is_rejected_before_any_network_io() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(
        home.path().join(".skiff.yml"),
        "clouds:\n  east:\n    os_auth_url: http://keystone.example:5000/v2.0\n    os_username: dev\n    os_password: hunter2\n    os_tenant_name: devteam\n",
    )
    .unwrap();
    std::fs::write(
        home.path().join("Skifffile.yml"),
        "name: proj\nimage: ubuntu-22.04\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.env("HOME", home.path())
        .current_dir(home.path())
        .args(["up", "--cloud", "north"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("north"));
}
