mod common;

use assert_cmd::Command;
use common::{PEOPLE_CATALOG, PEOPLE_WITH_AGE_CATALOG, TestWorkspace, tsv};
use predicates::prelude::*;
use predicates::str::contains;

const MAPPING: &str = r#"{"table":"people","map":{"NAME":"name"},"synthetics":{"source":"import"},"timestamps":["loaded_at"]}"#;

struct Fixture {
    workspace: TestWorkspace,
}

impl Fixture {
    fn new(catalog: &str, mapping: &str, input: &str) -> Self {
        let workspace = TestWorkspace::new();
        workspace.write("catalog.yaml", catalog);
        workspace.write("mapping.json", mapping);
        workspace.write("input.tsv", input);
        Self { workspace }
    }

    fn file(&self, name: &str) -> String {
        self.workspace.path().join(name).display().to_string()
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::cargo_bin("columnar-loader").expect("binary exists");
        cmd.env_remove("RUST_LOG")
            .env_remove("COLUMNAR_LOADER_KEYSPACE")
            .env_remove("COLUMNAR_LOADER_BATCH_SIZE")
            .args([
                subcommand,
                "-i",
                &self.file("input.tsv"),
                "-m",
                &self.file("mapping.json"),
                "--catalog",
                &self.file("catalog.yaml"),
            ]);
        cmd
    }
}

#[test]
fn load_reports_inserted_rows() {
    let fixture = Fixture::new(
        PEOPLE_CATALOG,
        MAPPING,
        &tsv(&[&["NAME", "AGE"], &["Alice", "30"], &["Bob", "41"]]),
    );
    fixture
        .command("load")
        .args(["-k", "demo", "--batch-size", "1"])
        .assert()
        .success()
        .stderr(contains("Loaded 2 of 2 row(s) into demo.people"));
}

#[test]
fn keyspace_can_come_from_the_environment() {
    let fixture = Fixture::new(PEOPLE_CATALOG, MAPPING, &tsv(&[&["NAME"], &["Alice"]]));
    fixture
        .command("load")
        .env("COLUMNAR_LOADER_KEYSPACE", "demo")
        .assert()
        .success();
}

#[test]
fn settings_file_supplies_tunables() {
    let fixture = Fixture::new(PEOPLE_CATALOG, MAPPING, "NAME,AGE\nAlice,30\n");
    let settings = fixture
        .workspace
        .write("settings.yaml", "keyspace: demo\ndelimiter: ','\nbatch_size: 4\n");
    fixture
        .command("load")
        .args(["--config", TestWorkspace::arg(&settings)])
        .assert()
        .success()
        .stderr(contains("batch size 4"))
        .stderr(contains("Loaded 1 of 1 row(s)"));
}

#[test]
fn stdin_input_is_loaded() {
    let fixture = Fixture::new(PEOPLE_CATALOG, MAPPING, "");
    let mut cmd = Command::cargo_bin("columnar-loader").expect("binary exists");
    cmd.env_remove("RUST_LOG")
        .args([
            "load",
            "-i",
            "-",
            "-m",
            &fixture.file("mapping.json"),
            "--catalog",
            &fixture.file("catalog.yaml"),
            "-k",
            "demo",
        ])
        .write_stdin(tsv(&[&["NAME"], &["a"], &["b"], &["c"]]))
        .assert()
        .success()
        .stderr(contains("Loaded 3 of 3 row(s)"));
}

#[test]
fn plan_prints_every_column_source() {
    let fixture = Fixture::new(
        PEOPLE_WITH_AGE_CATALOG,
        MAPPING,
        &tsv(&[&["NAME", "AGE"], &["Alice", "30"]]),
    );
    fixture
        .command("plan")
        .args(["-k", "demo"])
        .assert()
        .success()
        .stdout(contains("column"))
        .stdout(contains("header 'NAME' (field 1)"))
        .stdout(contains("header 'AGE' (field 2), auto-matched"))
        .stdout(contains("synthetic 'import'"))
        .stdout(contains("run timestamp"));
}

#[test]
fn strict_plan_rejects_unmapped_headers() {
    let fixture = Fixture::new(
        PEOPLE_WITH_AGE_CATALOG,
        MAPPING,
        &tsv(&[&["NAME", "AGE"], &["Alice", "30"]]),
    );
    fixture
        .command("plan")
        .args(["-k", "demo", "--strict-mapping", "true"])
        .assert()
        .code(255)
        .stderr(contains("Header 'AGE' has no mapping"));
}

#[test]
fn conflicting_mapping_fails_before_loading() {
    let fixture = Fixture::new(
        PEOPLE_CATALOG,
        r#"{"table":"people","map":{"NAME":"name"},"synthetics":{"name":"x"}}"#,
        &tsv(&[&["NAME"], &["Alice"]]),
    );
    fixture
        .command("load")
        .args(["-k", "demo"])
        .assert()
        .code(255)
        .stderr(contains("claimed by both"))
        .stderr(contains("Loaded").not());
}

#[test]
fn conversion_failure_names_line_and_field() {
    let fixture = Fixture::new(
        PEOPLE_WITH_AGE_CATALOG,
        r#"{"table":"people","map":{"NAME":"name","AGE":"age"}}"#,
        &tsv(&[&["NAME", "AGE"], &["Alice", "30"], &["Bob", "old"]]),
    );
    fixture
        .command("load")
        .args(["-k", "demo"])
        .assert()
        .code(255)
        .stderr(contains("line 3, field 2"))
        .stderr(contains("'old'"));
}

#[test]
fn missing_keyspace_names_the_environment_variable() {
    let fixture = Fixture::new(PEOPLE_CATALOG, MAPPING, &tsv(&[&["NAME"], &["Alice"]]));
    fixture
        .command("load")
        .assert()
        .code(255)
        .stderr(contains("COLUMNAR_LOADER_KEYSPACE"));
}

#[test]
fn missing_table_is_reported() {
    let fixture = Fixture::new(PEOPLE_CATALOG, MAPPING, &tsv(&[&["NAME"], &["Alice"]]));
    fixture
        .command("load")
        .args(["-k", "demo", "--table", "pets"])
        .assert()
        .code(255)
        .stderr(contains("Table demo.pets does not exist"));
}
