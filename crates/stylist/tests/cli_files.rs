use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn stylist() -> Command {
    Command::cargo_bin("stylist").unwrap()
}

const CONFIG: &str = r#"
processors:
  - name: sh-lint
    tags: [shell]
    includes: ["**/*.sh"]
    check:
      command: "true"
      format: none
  - name: md-lint
    tags: [docs]
    includes: ["**/*.md"]
    check:
      command: "true"
      format: none
"#;

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();
    fs::write(temp.path().join("src/a.sh"), "echo a\n").unwrap();
    fs::write(temp.path().join("src/b.sh"), "echo b\n").unwrap();
    fs::write(temp.path().join("README.md"), "# hi\n").unwrap();
    fs::write(temp.path().join(".stylist.yml"), CONFIG).unwrap();
    temp
}

#[test]
fn files_lists_matches_per_processor() {
    let temp = project();

    stylist()
        .current_dir(temp.path())
        .arg("files")
        .assert()
        .success()
        .stdout(predicate::str::contains("Processor: sh-lint"))
        .stdout(predicate::str::contains(" - src/a.sh"))
        .stdout(predicate::str::contains(" - src/b.sh"))
        .stdout(predicate::str::contains("Processor: md-lint"))
        .stdout(predicate::str::contains(" - README.md"));
}

#[test]
fn files_honors_path_specs() {
    let temp = project();

    stylist()
        .current_dir(temp.path())
        .args(["files", "README.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Processor: sh-lint"))
        .stdout(predicate::str::contains(" [no matching files]"))
        .stdout(predicate::str::contains(" - README.md"));
}

#[test]
fn files_filters_by_tag() {
    let temp = project();

    stylist()
        .current_dir(temp.path())
        .args(["files", "--tags", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Processor: md-lint"))
        .stdout(predicate::str::contains("Processor: sh-lint").not());
}

#[test]
fn files_unknown_tag_is_an_error() {
    let temp = project();

    stylist()
        .current_dir(temp.path())
        .args(["files", "--tags", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no processor tagged nope"));
}
