use std::fs;

use predicates::prelude::*;
use serial_test::serial;

use super::common::TestEnv;

fn installed_json(env: &TestEnv) -> String {
  fs::read_to_string(env.tools_dir().join("manifest.json")).unwrap()
}

#[test]
#[ignore] // Requires git and cargo on PATH
#[serial]
fn add_then_upgrade_replaces_the_binary() {
  let env = TestEnv::new();
  let repo = env.tool_repo("hello");
  repo.release("1.0.1");
  repo.release("1.0.3");

  env
    .toolpin_cmd()
    .args(["add", &repo.location(), "v1.0.1"])
    .assert()
    .success()
    .stdout(predicate::str::contains("installed [hello"));
  env
    .toolpin_cmd()
    .args(["do", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0.1"));
  let before = installed_json(&env);

  env.toolpin_cmd().args(["upgrade", "hello", "v1.0.3"]).assert().success();
  env
    .toolpin_cmd()
    .args(["do", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0.3"));

  assert_ne!(before, installed_json(&env));
  let legal = fs::read_dir(env.tools_dir().join("legal")).unwrap().count();
  assert_eq!(legal, 1);
}

#[test]
#[ignore] // Requires git and cargo on PATH
#[serial]
fn second_sync_is_up_to_date() {
  let env = TestEnv::new();
  let repo = env.tool_repo("hello");
  repo.release("1.0.1");

  env.toolpin_cmd().args(["add", &repo.location(), "v1.0.1"]).assert().success();
  env
    .toolpin_cmd()
    .arg("sync")
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));
}

#[test]
#[ignore] // Requires git and cargo on PATH
#[serial]
fn failed_build_does_not_block_a_good_revision() {
  let env = TestEnv::new();
  let repo = env.tool_repo("hello");
  repo.release("1.0.1");
  repo.release_broken("v2.0.0");

  env
    .toolpin_cmd()
    .args(["add", &repo.location(), "v2.0.0"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("BuildFailed"));
  assert!(!env.tools_dir().join("manifest.json").exists());

  env.toolpin_cmd().args(["upgrade", "hello", "v1.0.1"]).assert().success();
  env
    .toolpin_cmd()
    .args(["do", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0.1"));
}

#[test]
#[ignore] // Requires git and cargo on PATH
#[serial]
fn build_restores_binaries_from_cache_without_the_source() {
  let env = TestEnv::new();
  let repo = env.tool_repo("hello");
  repo.release("1.0.1");

  env.toolpin_cmd().args(["add", &repo.location(), "v1.0.1"]).assert().success();

  fs::remove_dir_all(env.tools_dir().join("bin")).unwrap();
  fs::remove_file(env.tools_dir().join("manifest.json")).unwrap();
  let moved = repo.dir.with_file_name("moved-away");
  fs::rename(&repo.dir, &moved).unwrap();

  env.toolpin_cmd().arg("build").assert().success();
  env
    .toolpin_cmd()
    .args(["do", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0.1"));
}

#[test]
#[ignore] // Requires git and cargo on PATH
#[serial]
fn build_ignores_ambient_install_root() {
  let env = TestEnv::new();
  let repo = env.tool_repo("hello");
  repo.release("1.0.1");
  let elsewhere = env.temp.path().join("elsewhere");

  env
    .toolpin_cmd()
    .args(["add", &repo.location(), "v1.0.1"])
    .env("CARGO_INSTALL_ROOT", &elsewhere)
    .assert()
    .success();
  env
    .toolpin_cmd()
    .arg("build")
    .env("CARGO_INSTALL_ROOT", &elsewhere)
    .assert()
    .success();

  assert!(env.tools_dir().join("bin").join(format!("hello{}", std::env::consts::EXE_SUFFIX)).is_file());
  assert!(!elsewhere.exists());
}

#[test]
#[ignore] // Requires git and cargo on PATH
#[serial]
fn status_reports_stale_after_declaration_change() {
  let env = TestEnv::new();
  let repo = env.tool_repo("hello");
  repo.release("1.0.1");
  repo.release("1.0.3");

  env.toolpin_cmd().args(["add", &repo.location(), "v1.0.1"]).assert().success();
  env
    .toolpin_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("up to date"));

  let declarations = env.project().join("tools.json");
  let edited = fs::read_to_string(&declarations).unwrap().replace("v1.0.1", "v1.0.3");
  fs::write(&declarations, edited).unwrap();

  env
    .toolpin_cmd()
    .arg("status")
    .assert()
    .success()
    .stderr(predicate::str::contains("stale"));
  env
    .toolpin_cmd()
    .args(["do", "hello"])
    .assert()
    .success()
    .stdout(predicate::str::contains("hello 1.0.1"));
}
