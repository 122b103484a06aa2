use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use taxonomy_reorder::api::{self, TermStore};

const SEED: &str = r#"
taxonomies:
  category:
    terms:
      - { id: 1, name: News }
      - { id: 2, name: Sport }
      - { id: 3, name: Tennis, parent: 2 }
  genre:
    terms: []
"#;

/// Serves the seeded taxonomies on an ephemeral port and returns the REST base.
async fn spawn_server() -> String {
    let store = TermStore::from_yaml_str(SEED).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::create_router(store, "")).await.unwrap();
    });
    format!("http://{}/reorder/v1", addr)
}

fn client(base: &str) -> Command {
    let mut cmd = Command::cargo_bin("cli").unwrap();
    cmd.env_remove("REORDER_NONCE")
        .env_remove("REORDER_REST_BASE")
        .args(["client", "--url", base]);
    cmd
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("cli")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("client"))
        .stdout(predicate::str::contains("check-config"));
}

#[test]
fn test_check_config_accepts_valid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "taxonomies:\n  - name: category\n    label: Categories\n  - name: genre\n    label: Genres\ndefault_taxonomy: genre"
    )
    .unwrap();

    Command::cargo_bin("cli")
        .unwrap()
        .arg("check-config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: 2 taxonomies, default genre"));
}

#[test]
fn test_check_config_rejects_invalid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "taxonomies: []").unwrap();

    Command::cargo_bin("cli")
        .unwrap()
        .arg("check-config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one taxonomy is required"));
}

#[test]
fn test_move_requires_target_parent() {
    Command::cargo_bin("cli")
        .unwrap()
        .args(["client", "move", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--to"));
}

// The binary blocks the test thread, so the server needs its own worker threads.

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_move_saves_and_prints_outline() {
    let base = spawn_server().await;

    client(&base)
        .args(["--taxonomy", "category", "move", "3", "--to", "0", "--index", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Order and hierarchy saved successfully!",
        ))
        .stdout(predicate::str::contains(
            "- Tennis (3)\n- News (1)\n- Sport (2)\n",
        ));

    // without --index the term goes to the end of its new siblings
    client(&base)
        .args(["move", "1", "--to", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "- Tennis (3)\n- Sport (2)\n  - News (1)\n",
        ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_move_into_own_subtree_fails() {
    let base = spawn_server().await;

    client(&base)
        .args(["move", "2", "--to", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Move rejected"));

    // nothing was saved
    client(&base)
        .args(["tree"])
        .assert()
        .success()
        .stdout("- News (1)\n- Sport (2)\n  - Tennis (3)\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_move_unknown_and_noop() {
    let base = spawn_server().await;

    client(&base)
        .args(["move", "42", "--to", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Term 42 not found in category"));

    client(&base)
        .args(["move", "1", "--to", "0", "--index", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to do, term 1 is already there."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_tree_all_prints_every_label() {
    let base = spawn_server().await;
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        config,
        "rest_base: {}\ntaxonomies:\n  - name: category\n    label: Categories\n  - name: genre\n    label: Genres",
        base
    )
    .unwrap();

    Command::cargo_bin("cli")
        .unwrap()
        .env_remove("REORDER_NONCE")
        .env_remove("REORDER_REST_BASE")
        .arg("client")
        .arg("--config")
        .arg(config.path())
        .args(["tree", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Categories:\n- News (1)\n- Sport (2)\n  - Tennis (3)\n",
        ))
        .stdout(predicate::str::contains("Genres:\nNo terms found for genre.\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_taxonomy_is_sanitized() {
    let base = spawn_server().await;

    client(&base)
        .args(["--taxonomy", "Gen re!", "tree"])
        .assert()
        .success()
        .stdout("No terms found for genre.\n");
}
